// Invoices as seen by an organization, and the platform-administrator billing endpoints.
// Organization routes stay reachable while the organization is disabled so it can see what it owes.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::{
    billing::Period,
    error::AppError,
    jobs::{self, JobReport},
    models::InvoiceStatus,
    session::SessionMember,
    state::{
        AppState, InvoiceFilter, cancel_invoice, generate_invoice_for_organization, generate_invoices,
        get_invoice_by_id, get_organization_by_id, list_invoices, mark_invoice_paid,
    },
};

use super::{
    helpers::{clean_opt, optional_json, parse_object_id, parse_optional_date, parse_optional_object_id},
    views::{InvoiceView, collect},
};

#[derive(Deserialize, Default)]
pub struct InvoiceQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
}

impl InvoiceQuery {
    fn into_filter(self) -> Result<InvoiceFilter, AppError> {
        let status = clean_opt(self.status)
            .map(|s| InvoiceStatus::parse(&s).ok_or_else(|| AppError::validation("estado de factura inválido")))
            .transpose()?;
        let period = clean_opt(self.period)
            .map(|p| p.parse::<Period>().map(|p| p.to_string()))
            .transpose()?;
        Ok(InvoiceFilter {
            organization_id: parse_optional_object_id(self.organization_id, "organización")?,
            status,
            period,
        })
    }
}

#[derive(Deserialize, Default)]
pub struct GenerateRequest {
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct DateRequest {
    #[serde(default)]
    pub date: Option<String>,
}

impl DateRequest {
    fn date_or_today(self) -> Result<NaiveDate, AppError> {
        Ok(parse_optional_date(self.date, "fecha")?.unwrap_or_else(jobs::today))
    }
}

pub async fn invoices_index(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<Vec<InvoiceView>>, AppError> {
    let mut filter = query.into_filter()?;
    filter.organization_id = Some(session.organization_id()?);
    Ok(Json(collect(list_invoices(&state, &filter).await?)))
}

pub async fn invoices_show(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceView>, AppError> {
    let id = parse_object_id(&id, "id de factura")?;
    let invoice = get_invoice_by_id(&state, &id)
        .await?
        .ok_or(AppError::NotFound("factura"))?;
    if !session.is_superadmin() && invoice.organization_id != session.organization_id()? {
        return Err(AppError::NotFound("factura"));
    }
    Ok(Json(invoice.into()))
}

// platform administration

pub async fn admin_invoices_index(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<Vec<InvoiceView>>, AppError> {
    session.require_superadmin()?;
    let filter = query.into_filter()?;
    Ok(Json(collect(list_invoices(&state, &filter).await?)))
}

/// Bulk generation for a period, or a single organization when `organization_id` is given.
pub async fn admin_invoices_generate(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    session.require_superadmin()?;
    let body: GenerateRequest = optional_json(&body)?;
    let today = jobs::today();
    let period = match clean_opt(body.period) {
        Some(p) => p.parse::<Period>()?,
        None => Period::containing(today),
    };

    if let Some(org_id) = parse_optional_object_id(body.organization_id, "organización")? {
        let org = get_organization_by_id(&state, &org_id)
            .await?
            .ok_or(AppError::NotFound("organización"))?;
        let invoice = generate_invoice_for_organization(&state, &org, &period, today).await?;
        return Ok((
            StatusCode::CREATED,
            Json(json!({ "period": period.to_string(), "invoices": [InvoiceView::from(invoice)] })),
        ));
    }

    let report = generate_invoices(&state, &period, today).await?;
    let created: Vec<InvoiceView> = collect(report.created);
    Ok((
        StatusCode::OK,
        Json(json!({
            "period": report.period,
            "invoices": created,
            "skipped_existing": report.skipped_existing,
            "skipped_trial": report.skipped_trial,
            "skipped_empty": report.skipped_empty,
        })),
    ))
}

/// Manual payment registration; `date` defaults to today.
pub async fn admin_invoices_pay(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<InvoiceView>, AppError> {
    session.require_superadmin()?;
    let id = parse_object_id(&id, "id de factura")?;
    let paid_on = optional_json::<DateRequest>(&body)?.date_or_today()?;
    let invoice = mark_invoice_paid(&state, &id, paid_on).await?;
    Ok(Json(invoice.into()))
}

pub async fn admin_invoices_cancel(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceView>, AppError> {
    session.require_superadmin()?;
    let id = parse_object_id(&id, "id de factura")?;
    let invoice = cancel_invoice(&state, &id).await?;
    Ok(Json(invoice.into()))
}

/// Runs every batch job once, as the scheduler would.
pub async fn admin_jobs_run(
    session: SessionMember,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<JobReport>, AppError> {
    session.require_superadmin()?;
    let today = optional_json::<DateRequest>(&body)?.date_or_today()?;
    let report = jobs::run_all(&state, today).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_query_parses_status_and_period() {
        let filter = InvoiceQuery {
            status: Some("expired".into()),
            period: Some("2024-05".into()),
            organization_id: None,
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.status, Some(InvoiceStatus::Expired));
        assert_eq!(filter.period.as_deref(), Some("2024-05"));
    }

    #[test]
    fn invoice_query_rejects_bad_values() {
        let bad_status = InvoiceQuery {
            status: Some("overdue".into()),
            ..Default::default()
        };
        assert!(matches!(bad_status.into_filter(), Err(AppError::Validation(_))));

        let bad_period = InvoiceQuery {
            period: Some("mayo".into()),
            ..Default::default()
        };
        assert!(matches!(bad_period.into_filter(), Err(AppError::Validation(_))));
    }
}
