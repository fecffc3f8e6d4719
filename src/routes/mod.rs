// routes/mod.rs
// HTTP handlers grouped by resource.

mod helpers;
pub mod views;

pub mod auth;
pub mod catalogs;
pub mod contact_lists;
pub mod invoices;
pub mod members;
pub mod movements;
pub mod organizations;

use axum::Json;
use serde_json::{Value, json};

pub use auth::{login, logout, me, me_totp, me_totp_qrcode};
pub use catalogs::*;
pub use contact_lists::*;
pub use invoices::*;
pub use members::*;
pub use movements::*;
pub use organizations::*;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
