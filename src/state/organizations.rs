use anyhow::{Context, Result};
use chrono::NaiveDate;
use futures::stream::TryStreamExt;
use mongodb::bson::{Bson, doc, oid::ObjectId};
use slug::slugify;

use crate::{billing, error::AppError, models::Organization};

use super::{AppState, add_membership, now};

/// Result of deleting an organization that may still own records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Disabled,
}

pub async fn list_organizations(state: &AppState) -> Result<Vec<Organization>> {
    let mut cursor = state
        .organizations
        .find(doc! {})
        .sort(doc! { "name": 1 })
        .await?;
    let mut organizations = Vec::new();
    while let Some(org) = cursor.try_next().await? {
        organizations.push(org);
    }
    Ok(organizations)
}

pub async fn get_organization_by_id(state: &AppState, id: &ObjectId) -> Result<Option<Organization>> {
    state
        .organizations
        .find_one(doc! { "_id": id })
        .await
        .map_err(Into::into)
}

pub async fn get_organization_by_slug(state: &AppState, slug: &str) -> Result<Option<Organization>> {
    state
        .organizations
        .find_one(doc! { "slug": slug.to_lowercase() })
        .await
        .map_err(Into::into)
}

/// Creates an organization in trial. When `creator` is given it becomes an active admin member.
pub async fn create_organization(
    state: &AppState,
    name: &str,
    notes: Option<String>,
    creator: Option<&ObjectId>,
    today: NaiveDate,
) -> Result<ObjectId> {
    let slug = unique_slug(state, name).await?;
    let trial_ends_at = billing::add_days(today, state.config.billing.trial_days);

    let res = state
        .organizations
        .insert_one(Organization {
            id: None,
            name: name.to_string(),
            slug,
            trial: true,
            trial_ends_at: Some(trial_ends_at),
            enabled: true,
            expires_at: Some(trial_ends_at),
            unit_price: None,
            notes,
            trial_reminder_sent_at: None,
            created_at: Some(now()),
            updated_at: None,
        })
        .await?;
    let id = res
        .inserted_id
        .as_object_id()
        .context("organization insert missing _id")?;

    if let Some(member_id) = creator {
        add_membership(state, &id, member_id, true).await?;
    }

    tracing::info!(organization_id = %id, name, %trial_ends_at, "organization created");
    Ok(id)
}

pub async fn update_organization(
    state: &AppState,
    id: &ObjectId,
    name: &str,
    notes: Option<String>,
    unit_price: Option<f64>,
) -> Result<()> {
    state
        .organizations
        .update_one(
            doc! { "_id": id },
            doc! { "$set": {
                "name": name,
                "notes": notes,
                "unit_price": unit_price,
                "updated_at": now(),
            } },
        )
        .await?;
    Ok(())
}

pub async fn set_organization_enabled(state: &AppState, id: &ObjectId, enabled: bool) -> Result<()> {
    let res = state
        .organizations
        .update_one(
            doc! { "_id": id },
            doc! { "$set": { "enabled": enabled, "updated_at": now() } },
        )
        .await?;
    if res.matched_count == 0 {
        return Err(AppError::NotFound("organización").into());
    }
    tracing::info!(organization_id = %id, enabled, "organization toggled");
    Ok(())
}

/// Organizations with movements or invoices are disabled instead of removed.
pub async fn delete_organization(state: &AppState, id: &ObjectId) -> Result<DeleteOutcome> {
    let has_dependents = state
        .movements
        .find_one(doc! { "organization_id": id })
        .await?
        .is_some()
        || state
            .invoices
            .find_one(doc! { "organization_id": id })
            .await?
            .is_some();

    if has_dependents {
        state
            .organizations
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "enabled": false, "updated_at": now() } },
            )
            .await?;
        return Ok(DeleteOutcome::Disabled);
    }

    state.projects.delete_many(doc! { "organization_id": id }).await?;
    state.suppliers.delete_many(doc! { "organization_id": id }).await?;
    state.payment_modes.delete_many(doc! { "organization_id": id }).await?;
    state.contact_lists.delete_many(doc! { "organization_id": id }).await?;
    state
        .memberships
        .delete_many(doc! { "organization_id": id })
        .await?;
    state.organizations.delete_one(doc! { "_id": id }).await?;
    Ok(DeleteOutcome::Deleted)
}

/// Emails of active admins, the recipients of billing notices.
pub async fn organization_admin_emails(state: &AppState, organization_id: &ObjectId) -> Result<Vec<String>> {
    let mut cursor = state
        .memberships
        .find(doc! { "organization_id": organization_id, "active": true, "admin": true })
        .await?;
    let mut member_ids = Vec::new();
    while let Some(m) = cursor.try_next().await? {
        member_ids.push(m.member_id);
    }
    if member_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut cursor = state
        .members
        .find(doc! { "_id": { "$in": member_ids } })
        .await?;
    let mut emails = Vec::new();
    while let Some(member) = cursor.try_next().await? {
        emails.push(member.email);
    }
    Ok(emails)
}

/// Disables paid organizations whose expiration date passed. Already disabled ones are untouched.
pub async fn disable_expired_organizations(state: &AppState, today: NaiveDate) -> Result<Vec<Organization>> {
    let filter = doc! {
        "enabled": true,
        "trial": false,
        "expires_at": { "$lt": today.to_string() },
    };
    disable_matching(state, filter, doc! {}).await
}

/// Ends trials whose end date passed: trial flag cleared and organization disabled.
pub async fn expire_trials(state: &AppState, today: NaiveDate) -> Result<Vec<Organization>> {
    let filter = doc! {
        "trial": true,
        "trial_ends_at": { "$lt": today.to_string() },
    };
    disable_matching(state, filter, doc! { "trial": false }).await
}

async fn disable_matching(
    state: &AppState,
    filter: mongodb::bson::Document,
    extra_set: mongodb::bson::Document,
) -> Result<Vec<Organization>> {
    let mut cursor = state.organizations.find(filter.clone()).await?;
    let mut candidates = Vec::new();
    while let Some(org) = cursor.try_next().await? {
        candidates.push(org);
    }

    let mut disabled = Vec::new();
    for mut org in candidates {
        let Some(id) = org.id else { continue };
        let mut set = doc! { "enabled": false, "updated_at": now() };
        set.extend(extra_set.clone());
        // Filter re-applied: only documents that still match are disabled.
        let mut guarded = filter.clone();
        guarded.insert("_id", id);
        let res = state
            .organizations
            .update_one(guarded, doc! { "$set": set })
            .await?;
        if res.modified_count == 1 {
            org.enabled = false;
            if let Some(Bson::Boolean(trial)) = extra_set.get("trial") {
                org.trial = *trial;
            }
            tracing::info!(organization_id = %id, name = %org.name, "organization disabled");
            disabled.push(org);
        }
    }
    Ok(disabled)
}

/// Trials ending within `days` that have not been reminded yet.
pub async fn trials_ending_soon(state: &AppState, today: NaiveDate, days: i64) -> Result<Vec<Organization>> {
    let limit = billing::add_days(today, days);
    let mut cursor = state
        .organizations
        .find(doc! {
            "trial": true,
            "trial_reminder_sent_at": Bson::Null,
            "trial_ends_at": { "$gte": today.to_string(), "$lte": limit.to_string() },
        })
        .await?;
    let mut organizations = Vec::new();
    while let Some(org) = cursor.try_next().await? {
        organizations.push(org);
    }
    Ok(organizations)
}

pub async fn mark_trial_reminded(state: &AppState, id: &ObjectId) -> Result<()> {
    state
        .organizations
        .update_one(
            doc! { "_id": id },
            doc! { "$set": { "trial_reminder_sent_at": now() } },
        )
        .await?;
    Ok(())
}

async fn unique_slug(state: &AppState, name: &str) -> Result<String> {
    let base = slugify(name);
    let base = if base.is_empty() { "organizacion".to_string() } else { base };
    let mut candidate = base.clone();
    let mut n = 2;
    while state
        .organizations
        .find_one(doc! { "slug": &candidate })
        .await?
        .is_some()
    {
        candidate = format!("{base}-{n}");
        n += 1;
    }
    Ok(candidate)
}
