use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;

use crate::{
    error::AppError,
    models::{Movement, MovementStatus, MovementType},
    session::SessionMember,
    state::{
        AppState, MovementFilter, MovementInput, MovementSummary, create_movement, delete_movement,
        get_movement_by_id, list_movements, movement_summary, update_movement,
    },
};

use super::{
    helpers::{clean_opt, ensure_same_organization, parse_date, parse_object_id, parse_optional_date, parse_optional_object_id, required},
    views::{MovementView, collect},
};

#[derive(Deserialize, Default)]
pub struct MovementQuery {
    #[serde(default, rename = "type")]
    pub movement_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

impl MovementQuery {
    fn into_filter(self) -> Result<MovementFilter, AppError> {
        let movement_type = clean_opt(self.movement_type)
            .map(|t| MovementType::parse(&t).ok_or_else(|| AppError::validation("tipo de movimiento inválido")))
            .transpose()?;
        let status = clean_opt(self.status)
            .map(|s| MovementStatus::parse(&s).ok_or_else(|| AppError::validation("estado inválido")))
            .transpose()?;
        let filter = MovementFilter {
            movement_type,
            status,
            project_id: parse_optional_object_id(self.project_id, "proyecto")?,
            from: parse_optional_date(self.from, "desde")?,
            to: parse_optional_date(self.to, "hasta")?,
        };
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(AppError::validation("el rango de fechas está invertido"));
            }
        }
        Ok(filter)
    }
}

#[derive(Deserialize)]
pub struct MovementRequest {
    pub date: String,
    pub amount: f64,
    #[serde(alias = "type")]
    pub movement_type: String,
    #[serde(default)]
    pub status: Option<String>,
    pub description: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub supplier_id: Option<String>,
    #[serde(default)]
    pub payment_mode_id: Option<String>,
}

impl MovementRequest {
    fn validate(self) -> Result<MovementInput, AppError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(AppError::validation("el monto debe ser mayor a cero"));
        }
        let movement_type = MovementType::parse(&self.movement_type)
            .ok_or_else(|| AppError::validation("tipo de movimiento inválido"))?;
        let status = match clean_opt(self.status) {
            Some(s) => MovementStatus::parse(&s).ok_or_else(|| AppError::validation("estado inválido"))?,
            None => MovementStatus::default(),
        };
        Ok(MovementInput {
            date: parse_date(&self.date, "fecha")?,
            amount: self.amount,
            movement_type,
            status,
            description: required(&self.description, "descripción")?,
            reference: clean_opt(self.reference),
            project_id: parse_optional_object_id(self.project_id, "proyecto")?,
            member_id: parse_optional_object_id(self.member_id, "asociado")?,
            supplier_id: parse_optional_object_id(self.supplier_id, "proveedor")?,
            payment_mode_id: parse_optional_object_id(self.payment_mode_id, "forma de pago")?,
        })
    }
}

pub async fn movements_index(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Query(query): Query<MovementQuery>,
) -> Result<Json<Vec<MovementView>>, AppError> {
    let org_id = session.enabled_organization()?;
    let filter = query.into_filter()?;
    Ok(Json(collect(list_movements(&state, &org_id, &filter).await?)))
}

/// Confirmed movements only; `from`/`to` narrow the range.
pub async fn movements_summary(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Query(query): Query<MovementQuery>,
) -> Result<Json<MovementSummary>, AppError> {
    let org_id = session.enabled_organization()?;
    let filter = query.into_filter()?;
    let summary = movement_summary(&state, &org_id, filter.from, filter.to).await?;
    Ok(Json(summary))
}

pub async fn movements_show(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MovementView>, AppError> {
    let org_id = session.enabled_organization()?;
    let movement = load_movement(&state, &id, &org_id).await?;
    Ok(Json(movement.into()))
}

pub async fn movements_create(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Json(body): Json<MovementRequest>,
) -> Result<(StatusCode, Json<MovementView>), AppError> {
    let org_id = session.admin_organization()?;
    let input = body.validate()?;
    let id = create_movement(&state, &org_id, input).await?;
    let movement = get_movement_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("movimiento"))?;
    tracing::info!(organization_id = %org_id, movement_id = %id, amount = movement.amount, "movement recorded");
    Ok((StatusCode::CREATED, Json(movement.into())))
}

pub async fn movements_update(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<MovementRequest>,
) -> Result<Json<MovementView>, AppError> {
    let org_id = session.admin_organization()?;
    let movement = load_movement(&state, &id, &org_id).await?;
    let id = movement.id.ok_or(AppError::NotFound("movimiento"))?;
    update_movement(&state, &id, &org_id, body.validate()?).await?;
    let movement = get_movement_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("movimiento"))?;
    Ok(Json(movement.into()))
}

pub async fn movements_delete(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let org_id = session.admin_organization()?;
    let movement = load_movement(&state, &id, &org_id).await?;
    if let Some(id) = movement.id {
        delete_movement(&state, &id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn load_movement(state: &AppState, id: &str, org_id: &ObjectId) -> Result<Movement, AppError> {
    let id = parse_object_id(id, "id de movimiento")?;
    let movement = get_movement_by_id(state, &id)
        .await?
        .ok_or(AppError::NotFound("movimiento"))?;
    ensure_same_organization(&movement.organization_id, org_id)?;
    Ok(movement)
}
