use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::{
    error::AppError,
    session::SessionMember,
    state::{
        AppState, NewMember, create_member, get_organization_member, list_organization_members,
        normalize_email, remove_member, set_membership_flags, update_member,
    },
};

use super::{
    helpers::{clean_opt, is_valid_email, parse_object_id, required},
    views::{MemberView, collect},
};

#[derive(Deserialize)]
pub struct MemberRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub admin: bool,
}

struct ValidMember {
    name: String,
    email: String,
    phone: Option<String>,
    admin: bool,
}

impl MemberRequest {
    fn validate(self) -> Result<ValidMember, AppError> {
        let name = required(&self.name, "nombre")?;
        let email = required(&self.email, "correo")?;
        if !is_valid_email(&email) {
            return Err(AppError::validation("correo inválido"));
        }
        Ok(ValidMember {
            name,
            email,
            phone: clean_opt(self.phone),
            admin: self.admin,
        })
    }
}

#[derive(Deserialize)]
pub struct MembershipRequest {
    pub active: bool,
    pub admin: bool,
}

pub async fn members_index(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MemberView>>, AppError> {
    let org_id = session.enabled_organization()?;
    let members = list_organization_members(&state, &org_id).await?;
    Ok(Json(collect(members)))
}

pub async fn members_show(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MemberView>, AppError> {
    let org_id = session.enabled_organization()?;
    let member_id = parse_object_id(&id, "id de asociado")?;
    let member = get_organization_member(&state, &org_id, &member_id)
        .await?
        .ok_or(AppError::NotFound("asociado"))?;
    Ok(Json(member.into()))
}

pub async fn members_create(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Json(body): Json<MemberRequest>,
) -> Result<(StatusCode, Json<MemberView>), AppError> {
    let org_id = session.admin_organization()?;
    let input = body.validate()?;
    let member_id = create_member(
        &state,
        &org_id,
        NewMember {
            name: &input.name,
            email: &input.email,
            phone: input.phone,
            admin: input.admin,
        },
    )
    .await?;
    tracing::info!(organization_id = %org_id, member_id = %member_id, "member added");

    let member = get_organization_member(&state, &org_id, &member_id)
        .await?
        .ok_or(AppError::NotFound("asociado"))?;
    Ok((StatusCode::CREATED, Json(member.into())))
}

/// Contact fields. Admins edit name and phone of anyone in the organization; the email,
/// shared by every organization of the member, changes only by the member or a platform admin.
pub async fn members_update(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<MemberRequest>,
) -> Result<Json<MemberView>, AppError> {
    let org_id = session.enabled_organization()?;
    let member_id = parse_object_id(&id, "id de asociado")?;
    let current = get_organization_member(&state, &org_id, &member_id)
        .await?
        .ok_or(AppError::NotFound("asociado"))?;

    let input = body.validate()?;
    let editor = Editor {
        is_self: session.member_id() == &member_id,
        is_admin: session.is_admin(),
        is_superadmin: session.is_superadmin(),
    };
    let email_changed = normalize_email(&input.email) != current.member.email;
    editor.check(current.member.is_superadmin, email_changed)?;
    update_member(&state, &member_id, &input.name, &input.email, input.phone).await?;

    let member = get_organization_member(&state, &org_id, &member_id)
        .await?
        .ok_or(AppError::NotFound("asociado"))?;
    Ok(Json(member.into()))
}

struct Editor {
    is_self: bool,
    is_admin: bool,
    is_superadmin: bool,
}

impl Editor {
    fn check(&self, target_is_superadmin: bool, email_changed: bool) -> Result<(), AppError> {
        if self.is_self || self.is_superadmin {
            return Ok(());
        }
        if !self.is_admin || target_is_superadmin {
            return Err(AppError::forbidden());
        }
        if email_changed {
            return Err(AppError::Forbidden("solo el asociado puede cambiar su correo".into()));
        }
        Ok(())
    }
}

pub async fn members_membership(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<MembershipRequest>,
) -> Result<Json<MemberView>, AppError> {
    let org_id = session.admin_organization()?;
    let member_id = parse_object_id(&id, "id de asociado")?;
    set_membership_flags(&state, &org_id, &member_id, body.active, body.admin).await?;

    let member = get_organization_member(&state, &org_id, &member_id)
        .await?
        .ok_or(AppError::NotFound("asociado"))?;
    Ok(Json(member.into()))
}

pub async fn members_delete(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let org_id = session.admin_organization()?;
    let member_id = parse_object_id(&id, "id de asociado")?;
    remove_member(&state, &org_id, &member_id).await?;
    tracing::info!(organization_id = %org_id, member_id = %member_id, "member removed");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, email: &str) -> MemberRequest {
        MemberRequest {
            name: name.into(),
            email: email.into(),
            phone: Some("".into()),
            admin: false,
        }
    }

    #[test]
    fn validates_name_and_email() {
        let valid = request(" Ana ", "ana@coop.mx").validate().unwrap();
        assert_eq!(valid.name, "Ana");
        assert_eq!(valid.phone, None);
        assert!(matches!(request("", "ana@coop.mx").validate(), Err(AppError::Validation(_))));
        assert!(matches!(request("Ana", "ana").validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn email_changes_are_reserved_to_the_member() {
        let admin = Editor {
            is_self: false,
            is_admin: true,
            is_superadmin: false,
        };
        assert!(admin.check(false, false).is_ok());
        assert!(matches!(admin.check(false, true), Err(AppError::Forbidden(_))));
        assert!(matches!(admin.check(true, false), Err(AppError::Forbidden(_))));

        let own = Editor {
            is_self: true,
            is_admin: false,
            is_superadmin: false,
        };
        assert!(own.check(false, true).is_ok());

        let plain = Editor {
            is_self: false,
            is_admin: false,
            is_superadmin: false,
        };
        assert!(plain.check(false, false).is_err());

        let platform = Editor {
            is_self: false,
            is_admin: false,
            is_superadmin: true,
        };
        assert!(platform.check(true, true).is_ok());
    }
}
