use anyhow::{Context, Result};
use chrono::Local;
use mongodb::{
    Database,
    bson::{doc, oid::ObjectId},
};
use slug::slugify;
use std::{collections::HashMap, fs, io::ErrorKind};

use crate::{
    billing,
    config::AppConfig,
    models::{Member, Membership, Organization, SeedData, SeedMember, SeedOrganization},
};

use super::{members::normalize_email, now};

pub(super) async fn is_database_empty(db: &Database) -> Result<bool> {
    let count = db
        .collection::<Member>("members")
        .estimated_document_count()
        .await?;
    Ok(count == 0)
}

/// Reads the seed file. A missing file seeds nothing.
pub(super) fn load_seed_data(path: &str) -> Result<SeedData> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str::<SeedData>(&contents)
            .with_context(|| format!("invalid seed file {path}")),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::warn!(path, "seed file not found; starting with an empty database");
            Ok(SeedData::default())
        }
        Err(err) => Err(err).with_context(|| format!("failed to read seed file {path}")),
    }
}

pub(super) async fn seed_database(db: &Database, data: &SeedData, config: &AppConfig) -> Result<()> {
    let org_ids = seed_organizations(db, &data.organizations, config).await?;
    for member in &data.members {
        seed_member(db, member, &org_ids).await?;
    }
    tracing::info!(
        organizations = org_ids.len(),
        members = data.members.len(),
        "database seeded"
    );
    Ok(())
}

async fn seed_organizations(
    db: &Database,
    organizations: &[SeedOrganization],
    config: &AppConfig,
) -> Result<HashMap<String, ObjectId>> {
    let coll = db.collection::<Organization>("organizations");
    let today = Local::now().date_naive();
    let mut ids = HashMap::new();

    for seed in organizations {
        let slug = slugify(&seed.name);
        if let Some(id) = coll.find_one(doc! { "slug": &slug }).await?.and_then(|o| o.id) {
            ids.insert(seed.name.clone(), id);
            continue;
        }

        let (trial_ends_at, expires_at) = if seed.trial {
            let ends = crate::billing::add_days(today, config.billing.trial_days);
            (Some(ends), Some(ends))
        } else {
            (None, Some(billing::end_of_next_month(today)))
        };

        let res = coll
            .insert_one(Organization {
                id: None,
                name: seed.name.clone(),
                slug,
                trial: seed.trial,
                trial_ends_at,
                enabled: true,
                expires_at,
                unit_price: None,
                notes: None,
                trial_reminder_sent_at: None,
                created_at: Some(now()),
                updated_at: None,
            })
            .await?;
        let id = res
            .inserted_id
            .as_object_id()
            .context("organization insert missing _id")?;
        ids.insert(seed.name.clone(), id);
    }
    Ok(ids)
}

async fn seed_member(db: &Database, seed: &SeedMember, org_ids: &HashMap<String, ObjectId>) -> Result<()> {
    let members = db.collection::<Member>("members");
    let memberships = db.collection::<Membership>("memberships");
    let email = normalize_email(&seed.email);

    let member_id = match members.find_one(doc! { "email": &email }).await?.and_then(|m| m.id) {
        Some(id) => id,
        None => members
            .insert_one(Member {
                id: None,
                name: seed.name.clone(),
                email: email.clone(),
                phone: seed.phone.clone(),
                secret: seed.secret.clone(),
                is_superadmin: seed.is_superadmin,
                created_at: Some(now()),
                updated_at: None,
            })
            .await?
            .inserted_id
            .as_object_id()
            .context("member insert missing _id")?,
    };

    for name in &seed.organizations {
        let organization_id = *org_ids
            .get(name)
            .with_context(|| format!("seed member {email} references unknown organization {name}"))?;
        let exists = memberships
            .find_one(doc! { "organization_id": organization_id, "member_id": member_id })
            .await?
            .is_some();
        if exists {
            continue;
        }
        memberships
            .insert_one(Membership {
                id: None,
                organization_id,
                member_id,
                active: true,
                admin: seed.admin,
                joined_at: Some(now()),
            })
            .await?;
    }
    Ok(())
}
