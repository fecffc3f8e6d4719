#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use mongodb::bson::doc;
use serde_json::{Value, json};
use tower::ServiceExt; // for oneshot

use tesoreria::{
    router,
    session::{ORGANIZATION_HEADER, SESSION_COOKIE_NAME},
    state::{AppState, create_session, find_member_by_email, set_organization_enabled},
    totp::{DEFAULT_ISSUER, build_totp},
};

use common::{add_plain_member, date, make_paying, organization_with_admin, setup_state, teardown};

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn put_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn token_for(state: &AppState, email: &str) -> String {
    let member = find_member_by_email(state, email).await.unwrap().unwrap();
    create_session(state, &member.id).await.unwrap()
}

#[tokio::test]
async fn health_is_public_and_api_requires_session() {
    let Some(ctx) = setup_state().await else {
        return;
    };
    let app = router(Arc::new(ctx.state.clone()));

    let (status, body) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(
        &app,
        Request::builder().uri("/api/projects").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = send(&app, get("/me", "not-a-session")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    teardown(ctx).await;
}

#[tokio::test]
async fn login_with_totp_code_opens_a_session() {
    let Some(ctx) = setup_state().await else {
        return;
    };
    let state = &ctx.state;
    organization_with_admin(state, "Acceso", date(2024, 1, 1)).await;
    let app = router(Arc::new(state.clone()));
    let member = find_member_by_email(state, "admin@acceso.test").await.unwrap().unwrap();

    let (status, _) = send(
        &app,
        post_json(
            "/login",
            "",
            json!({ "email": "admin@acceso.test", "code": "000000x" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        post_json("/login", "", json!({ "email": "nadie@acceso.test", "code": "123456" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let code = build_totp(DEFAULT_ISSUER, &member.email, &member.secret)
        .unwrap()
        .generate_current()
        .unwrap();
    let response = app
        .clone()
        .oneshot(post_json(
            "/login",
            "",
            json!({ "email": "ADMIN@acceso.test", "code": code }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with(&format!("{SESSION_COOKIE_NAME}=")));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["member"]["email"], "admin@acceso.test");

    // The cookie works as well as the bearer token.
    let cookie_pair = cookie.split(';').next().unwrap().to_string();
    let (status, me) = send(
        &app,
        Request::builder()
            .uri("/me")
            .header(header::COOKIE, cookie_pair)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["organization"]["slug"], "acceso");
    assert_eq!(me["organization"]["admin"], true);

    let (status, totp) = send(&app, get("/me/totp", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(totp["otpauth_url"].as_str().unwrap().starts_with("otpauth://totp/"));

    let response = app.clone().oneshot(get("/me/totp/qrcode", &token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");

    let (status, _) = send(&app, post_json("/logout", &token, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, get("/me", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    teardown(ctx).await;
}

#[tokio::test]
async fn disabled_organizations_get_payment_required_but_see_invoices() {
    let Some(ctx) = setup_state().await else {
        return;
    };
    let state = &ctx.state;
    let (org, _) = organization_with_admin(state, "Morosa", date(2024, 1, 1)).await;
    let app = router(Arc::new(state.clone()));
    let token = token_for(state, "admin@morosa.test").await;

    let (status, project) = send(
        &app,
        post_json("/api/projects", &token, json!({ "name": "Techo" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(project["name"], "Techo");
    assert_eq!(project["active"], true);

    let (status, body) = send(&app, get("/api/projects/no-es-un-id", &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, body) = send(
        &app,
        post_json("/api/movements", &token, json!({ "movement_type": "income", "amount": -5, "date": "2024-01-02", "description": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    set_organization_enabled(state, &org, false).await.unwrap();

    let (status, body) = send(&app, get("/api/projects", &token)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "organization_disabled");

    let org_uri = format!("/api/organizations/{}", org.to_hex());
    let (status, _) = send(&app, put_json(&org_uri, &token, json!({ "name": "Morosa Renombrada" }))).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    let (status, _) = send(&app, get(&org_uri, &token)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    let (status, invoices) = send(&app, get("/api/invoices", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(invoices.as_array().unwrap().is_empty());

    let (status, _) = send(&app, get("/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    teardown(ctx).await;
}

#[tokio::test]
async fn platform_admin_runs_billing_over_http() {
    let Some(ctx) = setup_state().await else {
        return;
    };
    let state = &ctx.state;
    let (org, _) = organization_with_admin(state, "Facturada", date(2024, 1, 1)).await;
    make_paying(state, &org, date(2030, 12, 31)).await;
    let (platform_org, _) = organization_with_admin(state, "Plataforma", date(2024, 1, 1)).await;
    state
        .members
        .update_one(
            doc! { "email": "admin@plataforma.test" },
            doc! { "$set": { "is_superadmin": true } },
        )
        .await
        .unwrap();
    let app = router(Arc::new(state.clone()));
    let admin = token_for(state, "admin@plataforma.test").await;
    let customer = token_for(state, "admin@facturada.test").await;

    let (status, _) = send(&app, get("/api/admin/invoices", &customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        post_json(
            "/api/admin/invoices/generate",
            &admin,
            json!({ "period": "2024-02", "organization_id": org.to_hex() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let invoice = &body["invoices"][0];
    assert_eq!(invoice["period"], "2024-02");
    assert_eq!(invoice["member_count"], 1);
    assert_eq!(invoice["status"], "pending");
    let invoice_id = invoice["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        post_json(
            "/api/admin/invoices/generate",
            &admin,
            json!({ "period": "2024-02", "organization_id": org.to_hex() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = send(
        &app,
        post_json("/api/admin/invoices/generate", &admin, json!({ "period": "2024-13" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    // The customer sees its own invoice; the platform organization does not.
    let (status, list) = send(&app, get("/api/invoices", &customer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    let other = Request::builder()
        .uri(format!("/api/invoices/{invoice_id}"))
        .header(header::AUTHORIZATION, format!("Bearer {admin}"))
        .header(ORGANIZATION_HEADER, platform_org.to_hex())
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, other).await;
    assert_eq!(status, StatusCode::OK);

    let (status, paid) = send(
        &app,
        post_json(
            &format!("/api/admin/invoices/{invoice_id}/pay"),
            &admin,
            json!({ "date": "2024-02-05" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "paid");

    let (status, body) = send(
        &app,
        post_json(&format!("/api/admin/invoices/{invoice_id}/cancel"), &admin, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, orgs) = send(&app, get("/api/organizations", &admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orgs.as_array().unwrap().len(), 2);

    // A rename without `unit_price` keeps the override; `null` clears it.
    let org_uri = format!("/api/organizations/{}", org.to_hex());
    let (status, body) = send(&app, put_json(&org_uri, &admin, json!({ "name": "Facturada", "unit_price": 15.0 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unit_price"], 15.0);
    let (status, body) = send(&app, put_json(&org_uri, &admin, json!({ "name": "Facturada SA" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Facturada SA");
    assert_eq!(body["unit_price"], 15.0);
    let (_, body) = send(&app, put_json(&org_uri, &customer, json!({ "name": "Facturada", "unit_price": 1.0 }))).await;
    assert_eq!(body["unit_price"], 15.0);
    let (_, body) = send(&app, put_json(&org_uri, &admin, json!({ "name": "Facturada", "unit_price": null }))).await;
    assert_eq!(body["unit_price"], Value::Null);
    let (status, orgs) = send(&app, get("/api/organizations", &customer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orgs.as_array().unwrap().len(), 1);
    assert_eq!(orgs[0]["expires_at"], "2024-03-31");
    teardown(ctx).await;
}

#[tokio::test]
async fn organization_admins_cannot_change_a_members_email() {
    let Some(ctx) = setup_state().await else {
        return;
    };
    let state = &ctx.state;
    let (org, _) = organization_with_admin(state, "Compartida", date(2024, 1, 1)).await;
    let ana = add_plain_member(state, &org, "ana@compartida.test").await;
    let app = router(Arc::new(state.clone()));
    let admin = token_for(state, "admin@compartida.test").await;
    let uri = format!("/api/members/{}", ana.to_hex());

    let (status, body) = send(
        &app,
        put_json(&uri, &admin, json!({ "name": "Ana María", "email": "ana@compartida.test" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Ana María");

    let (status, _) = send(
        &app,
        put_json(&uri, &admin, json!({ "name": "Ana María", "email": "otra@correo.test" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(find_member_by_email(state, "otra@correo.test").await.unwrap().is_none());

    let own = token_for(state, "ana@compartida.test").await;
    let (status, body) = send(
        &app,
        put_json(&uri, &own, json!({ "name": "Ana María", "email": "Ana.Maria@Correo.test" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ana.maria@correo.test");
    teardown(ctx).await;
}
