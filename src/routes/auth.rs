// routes/auth.rs
// POST /login, POST /logout, GET /me, GET /me/totp, GET /me/totp/qrcode.

use std::{io::Cursor, net::IpAddr, sync::Arc};

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header::{CONTENT_TYPE, HOST, SET_COOKIE}},
    response::{IntoResponse, Response},
};
use image::{ImageFormat, Luma};
use qrcode::QrCode;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::AppError,
    session::{SESSION_COOKIE_NAME, SessionMember},
    state::{AppState, SESSION_TTL_SECONDS, create_session, delete_session, find_member_by_email},
    totp::{self, DEFAULT_ISSUER, build_totp},
};

use super::views::MeView;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub code: String,
}

/// Verifies the TOTP code and opens a session. Unknown emails and wrong codes look the same.
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let member = find_member_by_email(&state, &body.email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !totp::verify_code(&member.email, &member.secret, &body.code)? {
        tracing::info!(email = %member.email, "rejected login code");
        return Err(AppError::Unauthorized);
    }

    let token = create_session(&state, &member.id).await?;
    tracing::info!(member_id = %member.id, "member logged in");

    let active = member.organizations.iter().find(|o| o.active);
    let mut response = (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "token": token,
            "member": MeView::new(&member, active),
        })),
    )
        .into_response();

    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    for cookie in session_cookies(&token, SESSION_TTL_SECONDS, host) {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    Ok(response)
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    session: SessionMember,
) -> Result<Response, AppError> {
    delete_session(&state, session.token()).await?;

    let mut response = Json(json!({ "ok": true })).into_response();
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    for cookie in session_cookies("", 0, host) {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    Ok(response)
}

pub async fn me(session: SessionMember) -> Json<MeView> {
    Json(MeView::new(session.member(), session.0.organization.as_ref()))
}

/// otpauth:// URL for enrolling the member's secret in an authenticator app.
pub async fn me_totp(session: SessionMember) -> Result<Json<serde_json::Value>, AppError> {
    let issuer = issuer(&session);
    let member = session.member();
    let totp = build_totp(&issuer, &member.email, &member.secret)?;
    Ok(Json(json!({
        "email": member.email,
        "issuer": issuer,
        "otpauth_url": totp.get_url(),
    })))
}

pub async fn me_totp_qrcode(session: SessionMember) -> Result<Response, AppError> {
    let member = session.member();
    let totp = build_totp(&issuer(&session), &member.email, &member.secret)?;
    let code = QrCode::new(totp.get_url().as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to build qr: {e}")))?;
    let img = code.render::<Luma<u8>>().min_dimensions(200, 200).build();

    let mut cursor = Cursor::new(Vec::<u8>::new());
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to encode png: {e}")))?;

    Ok(([(CONTENT_TYPE, "image/png")], Body::from(cursor.into_inner())).into_response())
}

fn issuer(session: &SessionMember) -> String {
    session
        .0
        .organization
        .as_ref()
        .map(|o| o.name.clone())
        .unwrap_or_else(|| DEFAULT_ISSUER.to_string())
}

/// Host-only cookie plus one on the root domain so organization subdomains share the session.
fn session_cookies(token: &str, max_age: u64, host: &str) -> Vec<String> {
    let base = host.split(':').next().unwrap_or(host).trim_start_matches('.');
    let mut cookies = vec![format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    )];
    if let Some(root) = root_domain(base) {
        cookies.push(format!(
            "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}; Domain={root}"
        ));
    }
    cookies
}

fn root_domain(base: &str) -> Option<String> {
    if base.eq_ignore_ascii_case("localhost") || base.parse::<IpAddr>().is_ok() {
        return None;
    }
    let parts: Vec<&str> = base.split('.').collect();
    match parts.len() {
        // coop.example.com -> example.com, coop.localhost -> localhost
        n if n >= 3 => Some(parts[1..].join(".")),
        2 if parts[1].eq_ignore_ascii_case("localhost") => Some("localhost".to_string()),
        2 => Some(base.to_string()),
        _ => None,
    }
}
