use anyhow::{Context, Result};
use data_encoding::BASE32_NOPAD;
use futures::stream::TryStreamExt;
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use rand::RngCore;
use std::{
    collections::HashMap,
    time::{Duration, SystemTime},
};

use crate::{
    error::AppError,
    models::{Member, Membership, Session},
    totp::{DEFAULT_SECRET_BYTES, generate_base32_secret_n},
};

use super::{AppState, SESSION_TTL_SECONDS, is_duplicate_key, now};

/// One organization the member can act in, with the pivot flags.
#[derive(Debug, Clone)]
pub struct OrganizationAccess {
    pub organization_id: ObjectId,
    pub slug: String,
    pub name: String,
    pub enabled: bool,
    pub active: bool,
    pub admin: bool,
}

#[derive(Debug, Clone)]
pub struct MemberWithOrganizations {
    pub id: ObjectId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub secret: String,
    pub is_superadmin: bool,
    pub organizations: Vec<OrganizationAccess>,
}

impl MemberWithOrganizations {
    pub fn access_to(&self, organization_id: &ObjectId) -> Option<&OrganizationAccess> {
        self.organizations
            .iter()
            .find(|o| &o.organization_id == organization_id && o.active)
    }
}

/// Member as seen from one organization.
#[derive(Debug, Clone)]
pub struct OrganizationMember {
    pub member: Member,
    pub membership: Membership,
}

pub struct NewMember<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: Option<String>,
    pub admin: bool,
}

pub async fn find_member_by_email(state: &AppState, email: &str) -> Result<Option<MemberWithOrganizations>> {
    let email = normalize_email(email);
    if let Some(member) = state.members.find_one(doc! { "email": &email }).await? {
        build_member_with_organizations(state, member).await.map(Some)
    } else {
        Ok(None)
    }
}

pub async fn get_member_by_id(state: &AppState, id: &ObjectId) -> Result<Option<MemberWithOrganizations>> {
    if let Some(member) = state.members.find_one(doc! { "_id": id }).await? {
        build_member_with_organizations(state, member).await.map(Some)
    } else {
        Ok(None)
    }
}

pub async fn create_session(state: &AppState, member_id: &ObjectId) -> Result<String> {
    let _ = state
        .sessions
        .delete_many(doc! { "member_id": member_id })
        .await;

    let mut token_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut token_bytes);
    let token = BASE32_NOPAD.encode(&token_bytes);

    let expires_at =
        DateTime::from_system_time(SystemTime::now() + Duration::from_secs(SESSION_TTL_SECONDS));

    state
        .sessions
        .insert_one(Session {
            id: None,
            token: token.clone(),
            member_id: *member_id,
            expires_at,
        })
        .await?;

    Ok(token)
}

pub async fn find_member_by_session(
    state: &AppState,
    token: &str,
) -> Result<Option<MemberWithOrganizations>> {
    if let Some(session) = state.sessions.find_one(doc! { "token": token }).await? {
        let expires_at = session.expires_at.to_system_time();
        if expires_at <= SystemTime::now() {
            // Remove expired session, ignore result
            let _ = state.sessions.delete_one(doc! { "token": token }).await;
            return Ok(None);
        }
        get_member_by_id(state, &session.member_id).await
    } else {
        Ok(None)
    }
}

pub async fn delete_session(state: &AppState, token: &str) -> Result<()> {
    state.sessions.delete_one(doc! { "token": token }).await?;
    Ok(())
}

pub async fn list_organization_members(
    state: &AppState,
    organization_id: &ObjectId,
) -> Result<Vec<OrganizationMember>> {
    let mut cursor = state
        .memberships
        .find(doc! { "organization_id": organization_id })
        .await?;
    let mut memberships = HashMap::new();
    while let Some(m) = cursor.try_next().await? {
        memberships.insert(m.member_id, m);
    }
    if memberships.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<ObjectId> = memberships.keys().copied().collect();
    let mut cursor = state
        .members
        .find(doc! { "_id": { "$in": ids } })
        .sort(doc! { "name": 1 })
        .await?;
    let mut items = Vec::new();
    while let Some(member) = cursor.try_next().await? {
        let Some(id) = member.id else { continue };
        if let Some(membership) = memberships.remove(&id) {
            items.push(OrganizationMember { member, membership });
        }
    }
    Ok(items)
}

pub async fn get_organization_member(
    state: &AppState,
    organization_id: &ObjectId,
    member_id: &ObjectId,
) -> Result<Option<OrganizationMember>> {
    let Some(membership) = state
        .memberships
        .find_one(doc! { "organization_id": organization_id, "member_id": member_id })
        .await?
    else {
        return Ok(None);
    };
    let member = state.members.find_one(doc! { "_id": member_id }).await?;
    Ok(member.map(|member| OrganizationMember { member, membership }))
}

/// Registers a member in the organization, reusing the member document when the email is known.
pub async fn create_member(state: &AppState, organization_id: &ObjectId, input: NewMember<'_>) -> Result<ObjectId> {
    let email = normalize_email(input.email);
    let member_id = match state.members.find_one(doc! { "email": &email }).await? {
        Some(existing) => existing.id.context("member without _id")?,
        None => {
            let res = state
                .members
                .insert_one(Member {
                    id: None,
                    name: input.name.to_string(),
                    email: email.clone(),
                    phone: input.phone,
                    secret: generate_base32_secret_n(DEFAULT_SECRET_BYTES),
                    is_superadmin: false,
                    created_at: Some(now()),
                    updated_at: None,
                })
                .await?;
            res.inserted_id
                .as_object_id()
                .context("member insert missing _id")?
        }
    };

    add_membership(state, organization_id, &member_id, input.admin).await?;
    Ok(member_id)
}

pub async fn add_membership(
    state: &AppState,
    organization_id: &ObjectId,
    member_id: &ObjectId,
    admin: bool,
) -> Result<()> {
    let res = state
        .memberships
        .insert_one(Membership {
            id: None,
            organization_id: *organization_id,
            member_id: *member_id,
            active: true,
            admin,
            joined_at: Some(now()),
        })
        .await;
    match res {
        Ok(_) => Ok(()),
        Err(err) if is_duplicate_key(&err) => Err(AppError::Conflict(
            "el asociado ya pertenece a la organización".into(),
        )
        .into()),
        Err(err) => Err(err.into()),
    }
}

pub async fn update_member(
    state: &AppState,
    id: &ObjectId,
    name: &str,
    email: &str,
    phone: Option<String>,
) -> Result<()> {
    let res = state
        .members
        .update_one(
            doc! { "_id": id },
            doc! { "$set": {
                "name": name,
                "email": normalize_email(email),
                "phone": phone,
                "updated_at": now(),
            } },
        )
        .await;
    match res {
        Ok(_) => Ok(()),
        Err(err) if is_duplicate_key(&err) => {
            Err(AppError::Conflict("el correo ya está registrado".into()).into())
        }
        Err(err) => Err(err.into()),
    }
}

/// Updates the pivot flags. The organization always keeps at least one active admin.
pub async fn set_membership_flags(
    state: &AppState,
    organization_id: &ObjectId,
    member_id: &ObjectId,
    active: bool,
    admin: bool,
) -> Result<()> {
    let current = state
        .memberships
        .find_one(doc! { "organization_id": organization_id, "member_id": member_id })
        .await?
        .ok_or(AppError::NotFound("asociado"))?;

    if current.active && current.admin && !(active && admin) {
        ensure_other_admin(state, organization_id).await?;
    }

    state
        .memberships
        .update_one(
            doc! { "organization_id": organization_id, "member_id": member_id },
            doc! { "$set": { "active": active, "admin": admin } },
        )
        .await?;
    Ok(())
}

/// Removes the pivot only; the member document stays for other organizations.
pub async fn remove_member(state: &AppState, organization_id: &ObjectId, member_id: &ObjectId) -> Result<()> {
    let current = state
        .memberships
        .find_one(doc! { "organization_id": organization_id, "member_id": member_id })
        .await?
        .ok_or(AppError::NotFound("asociado"))?;

    if current.active && current.admin {
        ensure_other_admin(state, organization_id).await?;
    }

    state
        .memberships
        .delete_one(doc! { "organization_id": organization_id, "member_id": member_id })
        .await?;
    state
        .contact_lists
        .update_many(
            doc! { "organization_id": organization_id },
            doc! { "$pull": { "member_ids": member_id } },
        )
        .await?;
    Ok(())
}

pub async fn count_active_members(state: &AppState, organization_id: &ObjectId) -> Result<i64> {
    let count = state
        .memberships
        .count_documents(doc! { "organization_id": organization_id, "active": true })
        .await?;
    Ok(count as i64)
}

async fn ensure_other_admin(state: &AppState, organization_id: &ObjectId) -> Result<()> {
    let admins = state
        .memberships
        .count_documents(doc! { "organization_id": organization_id, "active": true, "admin": true })
        .await?;
    if admins <= 1 {
        return Err(AppError::Conflict(
            "la organización debe conservar al menos un administrador activo".into(),
        )
        .into());
    }
    Ok(())
}

async fn build_member_with_organizations(state: &AppState, member: Member) -> Result<MemberWithOrganizations> {
    let id = member.id.context("member without _id")?;

    let mut cursor = state.memberships.find(doc! { "member_id": &id }).await?;
    let mut organizations = Vec::new();
    while let Some(membership) = cursor.try_next().await? {
        let org = state
            .organizations
            .find_one(doc! { "_id": &membership.organization_id })
            .await?;
        if let Some(org) = org {
            organizations.push(OrganizationAccess {
                organization_id: membership.organization_id,
                slug: org.slug,
                name: org.name,
                enabled: org.enabled,
                active: membership.active,
                admin: membership.admin,
            });
        }
    }
    organizations.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(MemberWithOrganizations {
        id,
        name: member.name,
        email: member.email,
        phone: member.phone,
        secret: member.secret,
        is_superadmin: member.is_superadmin,
        organizations,
    })
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
