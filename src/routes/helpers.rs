use std::str::FromStr;

use axum::body::Bytes;
use chrono::NaiveDate;
use mongodb::bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Deserializer, de::DeserializeOwned};

use crate::error::AppError;

pub(super) fn parse_object_id(value: &str, label: &str) -> Result<ObjectId, AppError> {
    ObjectId::from_str(value.trim()).map_err(|_| AppError::BadRequest(format!("{label} inválido")))
}

pub(super) fn parse_optional_object_id(
    value: Option<String>,
    label: &str,
) -> Result<Option<ObjectId>, AppError> {
    match clean_opt(value) {
        Some(v) => Ok(Some(
            ObjectId::from_str(&v).map_err(|_| AppError::validation(format!("{label} inválido")))?,
        )),
        None => Ok(None),
    }
}

/// Tells a missing field (`None`) apart from an explicit `null` (`Some(None)`).
pub(super) fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// JSON body that may be omitted entirely.
pub(super) fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("JSON inválido: {e}")))
}

pub(super) fn clean_opt(input: Option<String>) -> Option<String> {
    input.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub(super) fn required(value: &str, label: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{label} es obligatorio")));
    }
    Ok(trimmed.to_string())
}

pub(super) fn parse_date(value: &str, label: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("{label} debe tener formato AAAA-MM-DD")))
}

pub(super) fn parse_optional_date(value: Option<String>, label: &str) -> Result<Option<NaiveDate>, AppError> {
    clean_opt(value).map(|v| parse_date(&v, label)).transpose()
}

/// Minimal shape check; delivery is what proves an address.
pub(super) fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.trim().split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.contains(char::is_whitespace)
}

pub(super) fn ensure_same_organization(entity: &ObjectId, active: &ObjectId) -> Result<(), AppError> {
    if entity != active {
        Err(AppError::Forbidden(
            "el registro pertenece a otra organización".into(),
        ))
    } else {
        Ok(())
    }
}

pub(super) fn datetime_to_string(dt: &DateTime) -> String {
    dt.try_to_rfc3339_string().unwrap_or_else(|_| dt.to_string())
}

pub(super) fn opt_datetime(dt: &Option<DateTime>) -> Option<String> {
    dt.as_ref().map(datetime_to_string)
}

pub(super) fn opt_hex(id: &Option<ObjectId>) -> Option<String> {
    id.as_ref().map(|o| o.to_hex())
}
