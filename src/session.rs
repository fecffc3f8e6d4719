// session.rs
// Session middleware for the API and the extractor handlers use to read the session.
// The active organization is picked by subdomain, then X-Organization, then the first
// active membership.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, COOKIE, HOST},
        request::Parts,
    },
    middleware::Next,
    response::Response,
};
use futures::future::BoxFuture;
use mongodb::bson::oid::ObjectId;

use crate::{
    error::AppError,
    models::Organization,
    state::{
        AppState, MemberWithOrganizations, OrganizationAccess, find_member_by_session,
        get_organization_by_id, get_organization_by_slug,
    },
};

pub const SESSION_COOKIE_NAME: &str = "session";
pub const ORGANIZATION_HEADER: &str = "x-organization";

#[derive(Clone)]
pub struct SessionData {
    pub member: MemberWithOrganizations,
    pub token: String,
    pub organization: Option<OrganizationAccess>,
}

pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let tokens = session_tokens(request.headers());
    if tokens.is_empty() {
        return Err(AppError::Unauthorized);
    }

    let mut found = None;
    for token in tokens {
        if let Some(member) = find_member_by_session(&state, &token).await? {
            found = Some((member, token));
            break;
        }
    }
    let (member, token) = found.ok_or(AppError::Unauthorized)?;

    let organization = select_organization(&state, &member, request.headers()).await?;
    request.extensions_mut().insert(SessionData {
        member,
        token,
        organization,
    });
    Ok(next.run(request).await)
}

async fn select_organization(
    state: &AppState,
    member: &MemberWithOrganizations,
    headers: &HeaderMap,
) -> Result<Option<OrganizationAccess>, AppError> {
    let requested = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .and_then(subdomain)
        .or_else(|| {
            headers
                .get(ORGANIZATION_HEADER)
                .and_then(|h| h.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        });

    let Some(requested) = requested else {
        return Ok(member.organizations.iter().find(|o| o.active).cloned());
    };

    let own = member.organizations.iter().find(|o| {
        o.active
            && (o.slug.eq_ignore_ascii_case(&requested)
                || o.organization_id.to_hex() == requested)
    });
    if let Some(access) = own {
        return Ok(Some(access.clone()));
    }

    // Platform administrators may act inside any organization.
    if member.is_superadmin {
        let org = match ObjectId::parse_str(&requested) {
            Ok(id) => get_organization_by_id(state, &id).await?,
            Err(_) => get_organization_by_slug(state, &requested.to_lowercase()).await?,
        };
        if let Some(org) = org {
            return Ok(Some(superadmin_access(org)?));
        }
    }
    Err(AppError::Unauthorized)
}

fn superadmin_access(org: Organization) -> Result<OrganizationAccess, AppError> {
    Ok(OrganizationAccess {
        organization_id: org
            .id
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("organization without _id")))?,
        slug: org.slug,
        name: org.name,
        enabled: org.enabled,
        active: true,
        admin: true,
    })
}

/// `coop.example.com` and `coop.localhost` carry a subdomain; `example.com` and `localhost` do not.
fn subdomain(host: &str) -> Option<String> {
    let host = host.split(':').next().unwrap_or(host);
    if host.parse::<std::net::IpAddr>().is_ok() {
        return None;
    }
    let parts: Vec<&str> = host.split('.').collect();
    let has_local_sub = parts.len() == 2 && parts[1].eq_ignore_ascii_case("localhost");
    let has_std_sub = parts.len() >= 3;
    if (has_std_sub || has_local_sub) && !parts[0].eq_ignore_ascii_case("www") {
        Some(parts[0].to_lowercase())
    } else {
        None
    }
}

pub struct SessionMember(pub SessionData);

impl SessionMember {
    pub fn member(&self) -> &MemberWithOrganizations {
        &self.0.member
    }

    pub fn token(&self) -> &str {
        &self.0.token
    }

    pub fn member_id(&self) -> &ObjectId {
        &self.0.member.id
    }

    pub fn is_superadmin(&self) -> bool {
        self.0.member.is_superadmin
    }

    pub fn organization(&self) -> Result<&OrganizationAccess, AppError> {
        self.0
            .organization
            .as_ref()
            .ok_or_else(|| AppError::Forbidden("no hay una organización activa".into()))
    }

    pub fn organization_id(&self) -> Result<ObjectId, AppError> {
        Ok(self.organization()?.organization_id)
    }

    pub fn is_admin(&self) -> bool {
        self.is_superadmin() || self.0.organization.as_ref().is_some_and(|o| o.admin)
    }

    /// Active organization, refused with 402 while it is disabled.
    pub fn enabled_organization(&self) -> Result<ObjectId, AppError> {
        let org = self.organization()?;
        if !org.enabled && !self.is_superadmin() {
            return Err(AppError::PaymentRequired);
        }
        Ok(org.organization_id)
    }

    /// Enabled organization the member administers.
    pub fn admin_organization(&self) -> Result<ObjectId, AppError> {
        let id = self.enabled_organization()?;
        self.require_admin()?;
        Ok(id)
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden())
        }
    }

    pub fn require_superadmin(&self) -> Result<(), AppError> {
        if self.is_superadmin() {
            Ok(())
        } else {
            Err(AppError::forbidden())
        }
    }
}

#[allow(refining_impl_trait)]
impl<S> FromRequestParts<S> for SessionMember
where
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> BoxFuture<'static, Result<Self, Self::Rejection>> {
        let data = parts.extensions.get::<SessionData>().cloned();
        Box::pin(async move { data.map(SessionMember).ok_or(AppError::Unauthorized) })
    }
}

/// Cookie values first, then a bearer token.
pub fn session_tokens(headers: &HeaderMap) -> Vec<String> {
    let mut tokens = extract_cookies(headers, SESSION_COOKIE_NAME);
    if let Some(bearer) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        tokens.push(bearer.to_string());
    }
    tokens
}

fn extract_cookies(headers: &HeaderMap, name: &str) -> Vec<String> {
    headers
        .get_all(COOKIE)
        .into_iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name && !value.trim().is_empty()).then(|| value.trim().to_owned())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn subdomain_detection() {
        assert_eq!(subdomain("coop.example.com").as_deref(), Some("coop"));
        assert_eq!(subdomain("Coop.localhost:8080").as_deref(), Some("coop"));
        assert_eq!(subdomain("example.com"), None);
        assert_eq!(subdomain("localhost:8080"), None);
        assert_eq!(subdomain("127.0.0.1:8080"), None);
        assert_eq!(subdomain("www.example.com"), None);
    }

    #[test]
    fn tokens_from_cookie_and_bearer() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; session=ABC"));
        headers.append(AUTHORIZATION, HeaderValue::from_static("Bearer XYZ"));
        assert_eq!(session_tokens(&headers), vec!["ABC".to_string(), "XYZ".to_string()]);
    }

    #[test]
    fn empty_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("session="));
        assert!(session_tokens(&headers).is_empty());
    }
}
