use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::AppError,
    jobs,
    session::SessionMember,
    state::{
        AppState, DeleteOutcome, create_organization, delete_organization, get_organization_by_id,
        list_organizations, set_organization_enabled, update_organization,
    },
};

use super::{
    helpers::{clean_opt, parse_object_id, present, required},
    views::{OrganizationView, collect},
};

#[derive(Deserialize)]
pub struct OrganizationRequest {
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Absent keeps the current override; `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub unit_price: Option<Option<f64>>,
}

impl OrganizationRequest {
    fn validate(self) -> Result<(String, Option<String>, Option<Option<f64>>), AppError> {
        let name = required(&self.name, "nombre")?;
        if let Some(Some(price)) = self.unit_price {
            if !price.is_finite() || price < 0.0 {
                return Err(AppError::validation("el precio por asociado no puede ser negativo"));
            }
        }
        Ok((name, clean_opt(self.notes), self.unit_price))
    }
}

/// Platform administrators see every organization; members see their own.
pub async fn organizations_index(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OrganizationView>>, AppError> {
    let all = list_organizations(&state).await?;
    let visible = if session.is_superadmin() {
        all
    } else {
        all.into_iter()
            .filter(|org| {
                org.id
                    .is_some_and(|id| session.member().organizations.iter().any(|o| o.organization_id == id))
            })
            .collect()
    };
    Ok(Json(collect(visible)))
}

pub async fn organizations_create(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Json(body): Json<OrganizationRequest>,
) -> Result<(StatusCode, Json<OrganizationView>), AppError> {
    let (name, notes, _) = body.validate()?;
    let id = create_organization(&state, &name, notes, Some(session.member_id()), jobs::today()).await?;
    let org = get_organization_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("organización"))?;
    Ok((StatusCode::CREATED, Json(org.into())))
}

pub async fn organizations_show(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrganizationView>, AppError> {
    let id = parse_object_id(&id, "id de organización")?;
    if !session.is_superadmin() && !session.member().organizations.iter().any(|o| o.organization_id == id) {
        return Err(AppError::forbidden());
    }
    let org = get_organization_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("organización"))?;
    if !org.enabled && !session.is_superadmin() {
        return Err(AppError::PaymentRequired);
    }
    Ok(Json(org.into()))
}

/// Name and notes by the organization's admins; the price override only by platform administrators.
pub async fn organizations_update(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<OrganizationRequest>,
) -> Result<Json<OrganizationView>, AppError> {
    let id = parse_object_id(&id, "id de organización")?;
    let is_org_admin = session.member().access_to(&id).is_some_and(|o| o.admin);
    if !session.is_superadmin() && !is_org_admin {
        return Err(AppError::forbidden());
    }
    let current = get_organization_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("organización"))?;
    if !current.enabled && !session.is_superadmin() {
        return Err(AppError::PaymentRequired);
    }

    let (name, notes, unit_price) = body.validate()?;
    let unit_price = match unit_price {
        Some(price) if session.is_superadmin() => price,
        _ => current.unit_price,
    };
    update_organization(&state, &id, &name, notes, unit_price).await?;

    let org = get_organization_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("organización"))?;
    Ok(Json(org.into()))
}

pub async fn organizations_delete(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    session.require_superadmin()?;
    let id = parse_object_id(&id, "id de organización")?;
    get_organization_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("organización"))?;
    let outcome = match delete_organization(&state, &id).await? {
        DeleteOutcome::Deleted => "deleted",
        DeleteOutcome::Disabled => "disabled",
    };
    Ok(Json(json!({ "result": outcome })))
}

pub async fn organizations_enable(
    session: SessionMember,
    state: State<Arc<AppState>>,
    id: Path<String>,
) -> Result<Json<OrganizationView>, AppError> {
    toggle(session, state, id, true).await
}

pub async fn organizations_disable(
    session: SessionMember,
    state: State<Arc<AppState>>,
    id: Path<String>,
) -> Result<Json<OrganizationView>, AppError> {
    toggle(session, state, id, false).await
}

async fn toggle(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    enabled: bool,
) -> Result<Json<OrganizationView>, AppError> {
    session.require_superadmin()?;
    let id = parse_object_id(&id, "id de organización")?;
    set_organization_enabled(&state, &id, enabled).await?;
    let org = get_organization_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("organización"))?;
    Ok(Json(org.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_validation() {
        let ok = OrganizationRequest {
            name: "  Cooperativa  ".into(),
            notes: Some(" ".into()),
            unit_price: Some(Some(12.0)),
        };
        let (name, notes, price) = ok.validate().unwrap();
        assert_eq!(name, "Cooperativa");
        assert_eq!(notes, None);
        assert_eq!(price, Some(Some(12.0)));

        let blank = OrganizationRequest {
            name: " ".into(),
            notes: None,
            unit_price: None,
        };
        assert!(matches!(blank.validate(), Err(AppError::Validation(_))));

        let negative = OrganizationRequest {
            name: "Coop".into(),
            notes: None,
            unit_price: Some(Some(-1.0)),
        };
        assert!(matches!(negative.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn price_override_distinguishes_absent_from_null() {
        let absent: OrganizationRequest = serde_json::from_str(r#"{"name":"Coop"}"#).unwrap();
        assert_eq!(absent.unit_price, None);
        let cleared: OrganizationRequest = serde_json::from_str(r#"{"name":"Coop","unit_price":null}"#).unwrap();
        assert_eq!(cleared.unit_price, Some(None));
        let set: OrganizationRequest = serde_json::from_str(r#"{"name":"Coop","unit_price":15}"#).unwrap();
        assert_eq!(set.unit_price, Some(Some(15.0)));
    }
}
