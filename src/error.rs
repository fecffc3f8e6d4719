// error.rs
// HTTP-facing error type. State functions return anyhow::Result; handlers map into AppError.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::models::InvoiceStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} no encontrado")]
    NotFound(&'static str),
    #[error("no autenticado")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("la organización está deshabilitada; regularice sus facturas")]
    PaymentRequired,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn forbidden() -> Self {
        AppError::Forbidden("sin permisos para esta operación".into())
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::PaymentRequired => (StatusCode::PAYMENT_REQUIRED, "organization_disabled"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            AppError::Internal(err) => {
                tracing::error!(error = ?err, "request failed");
                "error interno".to_string()
            }
            other => other.to_string(),
        };
        json_error(status, code, message)
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Rejected invoice lifecycle transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BillingError {
    #[error("la organización ya tiene una factura para el periodo {0}")]
    DuplicatePeriod(String),
    #[error("la factura ya está pagada")]
    AlreadyPaid,
    #[error("no se puede {} una factura {}", .action, .from.as_str())]
    InvalidTransition {
        from: InvoiceStatus,
        action: &'static str,
    },
    #[error("la organización no tiene asociados activos")]
    NoActiveMembers,
    #[error("periodo inválido `{0}` (se espera AAAA-MM)")]
    InvalidPeriod(String),
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvalidPeriod(_) | BillingError::NoActiveMembers => {
                AppError::Validation(err.to_string())
            }
            _ => AppError::Conflict(err.to_string()),
        }
    }
}

// Domain errors raised inside state functions travel through anyhow and keep their HTTP meaning.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<AppError>() {
            Ok(app) => return app,
            Err(err) => err,
        };
        match err.downcast::<BillingError>() {
            Ok(billing) => billing.into(),
            Err(err) => AppError::Internal(err),
        }
    }
}
