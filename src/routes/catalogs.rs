// Projects, suppliers and payment modes of the active organization.
// Any member reads; admins write.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;

use crate::{
    error::AppError,
    models::{PaymentMode, Project, Supplier},
    session::SessionMember,
    state::{
        AppState, SupplierFields, create_payment_mode, create_project, create_supplier, delete_payment_mode,
        delete_project, delete_supplier, get_payment_mode_by_id, get_project_by_id, get_supplier_by_id,
        list_payment_modes, list_projects, list_suppliers, update_payment_mode, update_project,
        update_supplier,
    },
};

use super::{
    helpers::{clean_opt, ensure_same_organization, is_valid_email, parse_object_id, required},
    views::{PaymentModeView, ProjectView, SupplierView, collect},
};

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
pub struct ProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Deserialize)]
pub struct SupplierRequest {
    pub name: String,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SupplierRequest {
    fn validate(self) -> Result<SupplierFields, AppError> {
        let email = clean_opt(self.email);
        if let Some(email) = &email {
            if !is_valid_email(email) {
                return Err(AppError::validation("correo inválido"));
            }
        }
        Ok(SupplierFields {
            name: required(&self.name, "nombre")?,
            tax_id: clean_opt(self.tax_id).map(|t| t.to_uppercase()),
            email,
            phone: clean_opt(self.phone),
            notes: clean_opt(self.notes),
        })
    }
}

#[derive(Deserialize)]
pub struct PaymentModeRequest {
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

// projects

pub async fn projects_index(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProjectView>>, AppError> {
    let org_id = session.enabled_organization()?;
    Ok(Json(collect(list_projects(&state, &org_id).await?)))
}

pub async fn projects_show(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProjectView>, AppError> {
    let org_id = session.enabled_organization()?;
    let project = load_project(&state, &id, &org_id).await?;
    Ok(Json(project.into()))
}

pub async fn projects_create(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProjectRequest>,
) -> Result<(StatusCode, Json<ProjectView>), AppError> {
    let org_id = session.admin_organization()?;
    let name = required(&body.name, "nombre")?;
    let id = create_project(&state, &org_id, &name, clean_opt(body.description), body.active).await?;
    let project = get_project_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("proyecto"))?;
    Ok((StatusCode::CREATED, Json(project.into())))
}

pub async fn projects_update(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ProjectRequest>,
) -> Result<Json<ProjectView>, AppError> {
    let org_id = session.admin_organization()?;
    let project = load_project(&state, &id, &org_id).await?;
    let id = project.id.ok_or(AppError::NotFound("proyecto"))?;
    let name = required(&body.name, "nombre")?;
    update_project(&state, &id, &name, clean_opt(body.description), body.active).await?;
    let project = get_project_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("proyecto"))?;
    Ok(Json(project.into()))
}

pub async fn projects_delete(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let org_id = session.admin_organization()?;
    let project = load_project(&state, &id, &org_id).await?;
    if let Some(id) = project.id {
        delete_project(&state, &id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn load_project(state: &AppState, id: &str, org_id: &ObjectId) -> Result<Project, AppError> {
    let id = parse_object_id(id, "id de proyecto")?;
    let project = get_project_by_id(state, &id)
        .await?
        .ok_or(AppError::NotFound("proyecto"))?;
    ensure_same_organization(&project.organization_id, org_id)?;
    Ok(project)
}

// suppliers

pub async fn suppliers_index(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SupplierView>>, AppError> {
    let org_id = session.enabled_organization()?;
    Ok(Json(collect(list_suppliers(&state, &org_id).await?)))
}

pub async fn suppliers_show(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SupplierView>, AppError> {
    let org_id = session.enabled_organization()?;
    let supplier = load_supplier(&state, &id, &org_id).await?;
    Ok(Json(supplier.into()))
}

pub async fn suppliers_create(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Json(body): Json<SupplierRequest>,
) -> Result<(StatusCode, Json<SupplierView>), AppError> {
    let org_id = session.admin_organization()?;
    let id = create_supplier(&state, &org_id, body.validate()?).await?;
    let supplier = get_supplier_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("proveedor"))?;
    Ok((StatusCode::CREATED, Json(supplier.into())))
}

pub async fn suppliers_update(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SupplierRequest>,
) -> Result<Json<SupplierView>, AppError> {
    let org_id = session.admin_organization()?;
    let supplier = load_supplier(&state, &id, &org_id).await?;
    let id = supplier.id.ok_or(AppError::NotFound("proveedor"))?;
    update_supplier(&state, &id, body.validate()?).await?;
    let supplier = get_supplier_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("proveedor"))?;
    Ok(Json(supplier.into()))
}

pub async fn suppliers_delete(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let org_id = session.admin_organization()?;
    let supplier = load_supplier(&state, &id, &org_id).await?;
    if let Some(id) = supplier.id {
        delete_supplier(&state, &id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn load_supplier(state: &AppState, id: &str, org_id: &ObjectId) -> Result<Supplier, AppError> {
    let id = parse_object_id(id, "id de proveedor")?;
    let supplier = get_supplier_by_id(state, &id)
        .await?
        .ok_or(AppError::NotFound("proveedor"))?;
    ensure_same_organization(&supplier.organization_id, org_id)?;
    Ok(supplier)
}

// payment modes

pub async fn payment_modes_index(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PaymentModeView>>, AppError> {
    let org_id = session.enabled_organization()?;
    Ok(Json(collect(list_payment_modes(&state, &org_id).await?)))
}

pub async fn payment_modes_show(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentModeView>, AppError> {
    let org_id = session.enabled_organization()?;
    let mode = load_payment_mode(&state, &id, &org_id).await?;
    Ok(Json(mode.into()))
}

pub async fn payment_modes_create(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PaymentModeRequest>,
) -> Result<(StatusCode, Json<PaymentModeView>), AppError> {
    let org_id = session.admin_organization()?;
    let name = required(&body.name, "nombre")?;
    let id = create_payment_mode(&state, &org_id, &name, body.active).await?;
    let mode = get_payment_mode_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("forma de pago"))?;
    Ok((StatusCode::CREATED, Json(mode.into())))
}

pub async fn payment_modes_update(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<PaymentModeRequest>,
) -> Result<Json<PaymentModeView>, AppError> {
    let org_id = session.admin_organization()?;
    let mode = load_payment_mode(&state, &id, &org_id).await?;
    let id = mode.id.ok_or(AppError::NotFound("forma de pago"))?;
    let name = required(&body.name, "nombre")?;
    update_payment_mode(&state, &id, &name, body.active).await?;
    let mode = get_payment_mode_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("forma de pago"))?;
    Ok(Json(mode.into()))
}

pub async fn payment_modes_delete(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let org_id = session.admin_organization()?;
    let mode = load_payment_mode(&state, &id, &org_id).await?;
    if let Some(id) = mode.id {
        delete_payment_mode(&state, &id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn load_payment_mode(state: &AppState, id: &str, org_id: &ObjectId) -> Result<PaymentMode, AppError> {
    let id = parse_object_id(id, "id de forma de pago")?;
    let mode = get_payment_mode_by_id(state, &id)
        .await?
        .ok_or(AppError::NotFound("forma de pago"))?;
    ensure_same_organization(&mode.organization_id, org_id)?;
    Ok(mode)
}
