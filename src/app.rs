// app.rs
// Router wiring. Everything except /health and /login sits behind the session middleware.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::{routes, session, state::AppState};

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/logout", post(routes::logout))
        .route("/me", get(routes::me))
        .route("/me/totp", get(routes::me_totp))
        .route("/me/totp/qrcode", get(routes::me_totp_qrcode))
        // organizations
        .route(
            "/api/organizations",
            get(routes::organizations_index).post(routes::organizations_create),
        )
        .route(
            "/api/organizations/{id}",
            get(routes::organizations_show)
                .put(routes::organizations_update)
                .delete(routes::organizations_delete),
        )
        .route("/api/organizations/{id}/enable", post(routes::organizations_enable))
        .route("/api/organizations/{id}/disable", post(routes::organizations_disable))
        // members
        .route(
            "/api/members",
            get(routes::members_index).post(routes::members_create),
        )
        .route(
            "/api/members/{id}",
            get(routes::members_show)
                .put(routes::members_update)
                .delete(routes::members_delete),
        )
        .route("/api/members/{id}/membership", put(routes::members_membership))
        // catalogs
        .route(
            "/api/projects",
            get(routes::projects_index).post(routes::projects_create),
        )
        .route(
            "/api/projects/{id}",
            get(routes::projects_show)
                .put(routes::projects_update)
                .delete(routes::projects_delete),
        )
        .route(
            "/api/suppliers",
            get(routes::suppliers_index).post(routes::suppliers_create),
        )
        .route(
            "/api/suppliers/{id}",
            get(routes::suppliers_show)
                .put(routes::suppliers_update)
                .delete(routes::suppliers_delete),
        )
        .route(
            "/api/payment-modes",
            get(routes::payment_modes_index).post(routes::payment_modes_create),
        )
        .route(
            "/api/payment-modes/{id}",
            get(routes::payment_modes_show)
                .put(routes::payment_modes_update)
                .delete(routes::payment_modes_delete),
        )
        // movements
        .route(
            "/api/movements",
            get(routes::movements_index).post(routes::movements_create),
        )
        .route("/api/movements/summary", get(routes::movements_summary))
        .route(
            "/api/movements/{id}",
            get(routes::movements_show)
                .put(routes::movements_update)
                .delete(routes::movements_delete),
        )
        // contact lists
        .route(
            "/api/contact-lists",
            get(routes::contact_lists_index).post(routes::contact_lists_create),
        )
        .route(
            "/api/contact-lists/{id}",
            get(routes::contact_lists_show)
                .put(routes::contact_lists_update)
                .delete(routes::contact_lists_delete),
        )
        .route(
            "/api/contact-lists/{id}/members/{member_id}",
            post(routes::contact_lists_add_member).delete(routes::contact_lists_remove_member),
        )
        .route("/api/contact-lists/{id}/send", post(routes::contact_lists_send))
        // invoices
        .route("/api/invoices", get(routes::invoices_index))
        .route("/api/invoices/{id}", get(routes::invoices_show))
        .route("/api/admin/invoices", get(routes::admin_invoices_index))
        .route("/api/admin/invoices/generate", post(routes::admin_invoices_generate))
        .route("/api/admin/invoices/{id}/pay", post(routes::admin_invoices_pay))
        .route("/api/admin/invoices/{id}/cancel", post(routes::admin_invoices_cancel))
        .route("/api/admin/jobs/run", post(routes::admin_jobs_run))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_session,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .route("/login", post(routes::login))
        .merge(protected)
        .with_state(state)
}
