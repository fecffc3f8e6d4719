use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::AppError,
    models::ContactList,
    session::SessionMember,
    state::{
        AppState, add_contact_list_member, create_contact_list, delete_contact_list, get_contact_list_by_id,
        list_contact_lists, remove_contact_list_member, send_contact_list_message, update_contact_list,
    },
};

use super::{
    helpers::{clean_opt, ensure_same_organization, parse_object_id, required},
    views::{ContactListView, collect},
};

#[derive(Deserialize)]
pub struct ContactListRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct MessageRequest {
    pub subject: String,
    pub body: String,
}

pub async fn contact_lists_index(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ContactListView>>, AppError> {
    let org_id = session.enabled_organization()?;
    Ok(Json(collect(list_contact_lists(&state, &org_id).await?)))
}

pub async fn contact_lists_show(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ContactListView>, AppError> {
    let org_id = session.enabled_organization()?;
    Ok(Json(load_list(&state, &id, &org_id).await?.into()))
}

pub async fn contact_lists_create(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Json(body): Json<ContactListRequest>,
) -> Result<(StatusCode, Json<ContactListView>), AppError> {
    let org_id = session.admin_organization()?;
    let name = required(&body.name, "nombre")?;
    let member_ids = body
        .member_ids
        .iter()
        .map(|id| parse_object_id(id, "id de asociado").map_err(|_| AppError::validation("id de asociado inválido")))
        .collect::<Result<Vec<ObjectId>, AppError>>()?;
    let id = create_contact_list(&state, &org_id, &name, clean_opt(body.description), member_ids).await?;
    let list = get_contact_list_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("lista de contactos"))?;
    Ok((StatusCode::CREATED, Json(list.into())))
}

/// Renames or re-describes the list; membership changes go through the member endpoints.
pub async fn contact_lists_update(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ContactListRequest>,
) -> Result<Json<ContactListView>, AppError> {
    let org_id = session.admin_organization()?;
    let list = load_list(&state, &id, &org_id).await?;
    let id = list.id.ok_or(AppError::NotFound("lista de contactos"))?;
    let name = required(&body.name, "nombre")?;
    update_contact_list(&state, &id, &name, clean_opt(body.description)).await?;
    let list = get_contact_list_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("lista de contactos"))?;
    Ok(Json(list.into()))
}

pub async fn contact_lists_delete(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let org_id = session.admin_organization()?;
    let list = load_list(&state, &id, &org_id).await?;
    if let Some(id) = list.id {
        delete_contact_list(&state, &id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn contact_lists_add_member(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path((id, member_id)): Path<(String, String)>,
) -> Result<Json<ContactListView>, AppError> {
    let org_id = session.admin_organization()?;
    let list = load_list(&state, &id, &org_id).await?;
    let member_id = parse_object_id(&member_id, "id de asociado")?;
    add_contact_list_member(&state, &list, &member_id).await?;
    reload(&state, &list).await
}

pub async fn contact_lists_remove_member(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path((id, member_id)): Path<(String, String)>,
) -> Result<Json<ContactListView>, AppError> {
    let org_id = session.admin_organization()?;
    let list = load_list(&state, &id, &org_id).await?;
    let member_id = parse_object_id(&member_id, "id de asociado")?;
    remove_contact_list_member(&state, &list, &member_id).await?;
    reload(&state, &list).await
}

pub async fn contact_lists_send(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let org_id = session.admin_organization()?;
    let list = load_list(&state, &id, &org_id).await?;
    let subject = required(&body.subject, "asunto")?;
    let message = required(&body.body, "mensaje")?;
    let recipients = send_contact_list_message(&state, &list, &subject, &message).await?;
    Ok(Json(json!({ "recipients": recipients })))
}

async fn load_list(state: &AppState, id: &str, org_id: &ObjectId) -> Result<ContactList, AppError> {
    let id = parse_object_id(id, "id de lista")?;
    let list = get_contact_list_by_id(state, &id)
        .await?
        .ok_or(AppError::NotFound("lista de contactos"))?;
    ensure_same_organization(&list.organization_id, org_id)?;
    Ok(list)
}

async fn reload(state: &AppState, list: &ContactList) -> Result<Json<ContactListView>, AppError> {
    let id = list.id.ok_or(AppError::NotFound("lista de contactos"))?;
    let list = get_contact_list_by_id(state, &id)
        .await?
        .ok_or(AppError::NotFound("lista de contactos"))?;
    Ok(Json(list.into()))
}
