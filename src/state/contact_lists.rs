use anyhow::{Context, Result};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};

use crate::{
    error::AppError,
    mail::{self, templates},
    models::ContactList,
};

use super::{AppState, get_organization_by_id, get_organization_member, now};

pub async fn list_contact_lists(state: &AppState, organization_id: &ObjectId) -> Result<Vec<ContactList>> {
    let mut cursor = state
        .contact_lists
        .find(doc! { "organization_id": organization_id })
        .sort(doc! { "name": 1 })
        .await?;
    let mut items = Vec::new();
    while let Some(list) = cursor.try_next().await? {
        items.push(list);
    }
    Ok(items)
}

pub async fn get_contact_list_by_id(state: &AppState, id: &ObjectId) -> Result<Option<ContactList>> {
    state
        .contact_lists
        .find_one(doc! { "_id": id })
        .await
        .map_err(Into::into)
}

pub async fn create_contact_list(
    state: &AppState,
    organization_id: &ObjectId,
    name: &str,
    description: Option<String>,
    member_ids: Vec<ObjectId>,
) -> Result<ObjectId> {
    for member_id in &member_ids {
        ensure_member_in_organization(state, organization_id, member_id).await?;
    }
    let mut member_ids = member_ids;
    member_ids.sort();
    member_ids.dedup();

    let res = state
        .contact_lists
        .insert_one(ContactList {
            id: None,
            organization_id: *organization_id,
            name: name.to_string(),
            description,
            member_ids,
            created_at: Some(now()),
            updated_at: None,
        })
        .await?;
    res.inserted_id
        .as_object_id()
        .context("contact list insert missing _id")
}

pub async fn update_contact_list(
    state: &AppState,
    id: &ObjectId,
    name: &str,
    description: Option<String>,
) -> Result<()> {
    state
        .contact_lists
        .update_one(
            doc! { "_id": id },
            doc! { "$set": {
                "name": name,
                "description": description,
                "updated_at": now(),
            } },
        )
        .await?;
    Ok(())
}

pub async fn delete_contact_list(state: &AppState, id: &ObjectId) -> Result<()> {
    state.contact_lists.delete_one(doc! { "_id": id }).await?;
    Ok(())
}

pub async fn add_contact_list_member(state: &AppState, list: &ContactList, member_id: &ObjectId) -> Result<()> {
    ensure_member_in_organization(state, &list.organization_id, member_id).await?;
    state
        .contact_lists
        .update_one(
            doc! { "_id": list.id },
            doc! {
                "$addToSet": { "member_ids": member_id },
                "$set": { "updated_at": now() },
            },
        )
        .await?;
    Ok(())
}

pub async fn remove_contact_list_member(state: &AppState, list: &ContactList, member_id: &ObjectId) -> Result<()> {
    state
        .contact_lists
        .update_one(
            doc! { "_id": list.id },
            doc! {
                "$pull": { "member_ids": member_id },
                "$set": { "updated_at": now() },
            },
        )
        .await?;
    Ok(())
}

/// Emails of the list's members that are still active in the organization.
pub async fn contact_list_recipients(state: &AppState, list: &ContactList) -> Result<Vec<String>> {
    if list.member_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut cursor = state
        .memberships
        .find(doc! {
            "organization_id": list.organization_id,
            "member_id": { "$in": list.member_ids.clone() },
            "active": true,
        })
        .await?;
    let mut active_ids = Vec::new();
    while let Some(m) = cursor.try_next().await? {
        active_ids.push(m.member_id);
    }
    if active_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut cursor = state
        .members
        .find(doc! { "_id": { "$in": active_ids } })
        .await?;
    let mut emails = Vec::new();
    while let Some(member) = cursor.try_next().await? {
        emails.push(member.email);
    }
    emails.sort();
    Ok(emails)
}

/// Emails `subject`/`body` to every active member in the list. Returns how many recipients it had.
pub async fn send_contact_list_message(
    state: &AppState,
    list: &ContactList,
    subject: &str,
    body: &str,
) -> Result<usize> {
    let org = get_organization_by_id(state, &list.organization_id)
        .await?
        .ok_or(AppError::NotFound("organización"))?;
    let recipients = contact_list_recipients(state, list).await?;
    let count = recipients.len();
    let email = templates::contact_list_message(recipients, &org, &list.name, subject, body);
    mail::deliver(state.mailer.as_ref(), email).await;
    tracing::info!(contact_list = %list.name, recipients = count, "contact list message sent");
    Ok(count)
}

async fn ensure_member_in_organization(
    state: &AppState,
    organization_id: &ObjectId,
    member_id: &ObjectId,
) -> Result<()> {
    if get_organization_member(state, organization_id, member_id)
        .await?
        .is_none()
    {
        return Err(AppError::validation("el asociado no pertenece a la organización").into());
    }
    Ok(())
}
