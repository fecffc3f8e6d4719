// Invoice (factura) persistence and lifecycle: generate, pay, expire, cancel, remind.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{Bson, doc, oid::ObjectId},
    options::ReturnDocument,
};

use crate::{
    billing::{self, Period},
    error::{AppError, BillingError},
    mail::{self, templates},
    models::{Invoice, InvoiceStatus, Organization},
};

use super::{
    AppState, count_active_members, get_organization_by_id, is_duplicate_key, list_organizations,
    now, organization_admin_emails,
};

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub organization_id: Option<ObjectId>,
    pub status: Option<InvoiceStatus>,
    pub period: Option<String>,
}

/// Outcome of a bulk generation run.
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    pub period: String,
    pub created: Vec<Invoice>,
    pub skipped_existing: usize,
    pub skipped_trial: usize,
    pub skipped_empty: usize,
}

pub async fn list_invoices(state: &AppState, filter: &InvoiceFilter) -> Result<Vec<Invoice>> {
    let mut query = doc! {};
    if let Some(org) = filter.organization_id {
        query.insert("organization_id", org);
    }
    if let Some(status) = filter.status {
        query.insert("status", status.as_str());
    }
    if let Some(period) = &filter.period {
        query.insert("period", period.as_str());
    }
    let mut cursor = state
        .invoices
        .find(query)
        .sort(doc! { "period": -1, "organization_id": 1 })
        .await?;
    let mut items = Vec::new();
    while let Some(invoice) = cursor.try_next().await? {
        items.push(invoice);
    }
    Ok(items)
}

pub async fn get_invoice_by_id(state: &AppState, id: &ObjectId) -> Result<Option<Invoice>> {
    state
        .invoices
        .find_one(doc! { "_id": id })
        .await
        .map_err(Into::into)
}

pub async fn find_invoice_for_period(
    state: &AppState,
    organization_id: &ObjectId,
    period: &Period,
) -> Result<Option<Invoice>> {
    state
        .invoices
        .find_one(doc! { "organization_id": organization_id, "period": period.to_string() })
        .await
        .map_err(Into::into)
}

/// Issues the pending invoice of `period` for one organization, freezing its active member count.
pub async fn generate_invoice_for_organization(
    state: &AppState,
    org: &Organization,
    period: &Period,
    today: NaiveDate,
) -> Result<Invoice> {
    let org_id = org.id.context("organization without _id")?;

    if find_invoice_for_period(state, &org_id, period).await?.is_some() {
        return Err(BillingError::DuplicatePeriod(period.to_string()).into());
    }

    let member_count = count_active_members(state, &org_id).await?;
    if member_count == 0 {
        return Err(BillingError::NoActiveMembers.into());
    }

    let billing_cfg = &state.config.billing;
    let unit_price = org.unit_price.unwrap_or(billing_cfg.unit_price);
    let mut invoice = Invoice {
        id: None,
        organization_id: org_id,
        period: period.to_string(),
        member_count,
        unit_price,
        total: billing::invoice_total(member_count, unit_price),
        currency: billing_cfg.currency.clone(),
        due_date: billing::invoice_due_date(period, billing_cfg.due_day, today, billing_cfg.grace_days),
        status: InvoiceStatus::Pending,
        paid_at: None,
        cancelled_at: None,
        reminder_sent_at: None,
        created_at: Some(now()),
        updated_at: None,
    };

    let res = match state.invoices.insert_one(&invoice).await {
        Ok(res) => res,
        Err(err) if is_duplicate_key(&err) => {
            return Err(BillingError::DuplicatePeriod(period.to_string()).into());
        }
        Err(err) => return Err(err.into()),
    };
    invoice.id = res.inserted_id.as_object_id();

    tracing::info!(
        organization_id = %org_id,
        period = %invoice.period,
        member_count,
        total = invoice.total,
        "invoice generated"
    );

    let admins = organization_admin_emails(state, &org_id).await?;
    mail::deliver(
        state.mailer.as_ref(),
        templates::invoice_issued(admins, org, &invoice),
    )
    .await;

    Ok(invoice)
}

/// Generates invoices for every billable organization. Existing periods, trials and
/// organizations without active members are skipped, so the run can be repeated.
pub async fn generate_invoices(state: &AppState, period: &Period, today: NaiveDate) -> Result<GenerationReport> {
    let mut report = GenerationReport {
        period: period.to_string(),
        ..Default::default()
    };

    for org in list_organizations(state).await? {
        if org.trial {
            report.skipped_trial += 1;
            continue;
        }
        match generate_invoice_for_organization(state, &org, period, today).await {
            Ok(invoice) => report.created.push(invoice),
            Err(err) => match err.downcast_ref::<BillingError>() {
                Some(BillingError::DuplicatePeriod(_)) => report.skipped_existing += 1,
                Some(BillingError::NoActiveMembers) => {
                    tracing::debug!(organization = %org.name, "no active members; not billed");
                    report.skipped_empty += 1;
                }
                _ => return Err(err),
            },
        }
    }

    tracing::info!(
        period = %report.period,
        created = report.created.len(),
        skipped_existing = report.skipped_existing,
        skipped_trial = report.skipped_trial,
        skipped_empty = report.skipped_empty,
        "invoice generation finished"
    );
    Ok(report)
}

/// Marks the invoice paid and re-enables its organization through the end of next month,
/// unless another of its invoices is still expired.
pub async fn mark_invoice_paid(state: &AppState, id: &ObjectId, paid_on: NaiveDate) -> Result<Invoice> {
    let invoice = get_invoice_by_id(state, id)
        .await?
        .ok_or(AppError::NotFound("factura"))?;
    billing::check_pay(invoice.status)?;

    let updated = state
        .invoices
        .find_one_and_update(
            doc! { "_id": id, "status": invoice.status.as_str() },
            doc! { "$set": {
                "status": InvoiceStatus::Paid.as_str(),
                "paid_at": now(),
                "updated_at": now(),
            } },
        )
        .return_document(ReturnDocument::After)
        .await?;
    let Some(updated) = updated else {
        // Status changed since it was read; report against the fresh state.
        let fresh = get_invoice_by_id(state, id)
            .await?
            .ok_or(AppError::NotFound("factura"))?;
        billing::check_pay(fresh.status)?;
        return Err(anyhow::anyhow!("invoice {id} changed while being paid"));
    };

    // Another expired invoice keeps the organization disabled until it is settled too.
    let still_expired = state
        .invoices
        .count_documents(doc! {
            "organization_id": updated.organization_id,
            "status": InvoiceStatus::Expired.as_str(),
        })
        .await?;
    if still_expired > 0 {
        tracing::info!(
            invoice_id = %id,
            organization_id = %updated.organization_id,
            still_expired,
            "invoice paid; organization stays disabled"
        );
    } else {
        let expires_at = billing::end_of_next_month(paid_on);
        state
            .organizations
            .update_one(
                doc! { "_id": updated.organization_id },
                doc! { "$set": {
                    "enabled": true,
                    "trial": false,
                    "expires_at": expires_at.to_string(),
                    "updated_at": now(),
                } },
            )
            .await?;

        tracing::info!(
            invoice_id = %id,
            organization_id = %updated.organization_id,
            %expires_at,
            "invoice paid; organization enabled"
        );
    }

    if let Some(org) = get_organization_by_id(state, &updated.organization_id).await? {
        let admins = organization_admin_emails(state, &updated.organization_id).await?;
        mail::deliver(
            state.mailer.as_ref(),
            templates::invoice_paid(admins, &org, &updated),
        )
        .await;
    }

    Ok(updated)
}

/// Cancels a pending or expired invoice. Paid invoices are refused; cancelled ones are returned as is.
pub async fn cancel_invoice(state: &AppState, id: &ObjectId) -> Result<Invoice> {
    let invoice = get_invoice_by_id(state, id)
        .await?
        .ok_or(AppError::NotFound("factura"))?;
    if !billing::check_cancel(invoice.status)? {
        return Ok(invoice);
    }

    let updated = state
        .invoices
        .find_one_and_update(
            doc! { "_id": id, "status": invoice.status.as_str() },
            doc! { "$set": {
                "status": InvoiceStatus::Cancelled.as_str(),
                "cancelled_at": now(),
                "updated_at": now(),
            } },
        )
        .return_document(ReturnDocument::After)
        .await?;
    let Some(updated) = updated else {
        let fresh = get_invoice_by_id(state, id)
            .await?
            .ok_or(AppError::NotFound("factura"))?;
        billing::check_cancel(fresh.status)?;
        return Ok(fresh);
    };

    tracing::info!(invoice_id = %id, organization_id = %updated.organization_id, "invoice cancelled");
    Ok(updated)
}

/// Pending invoices due before `today` become expired and their organizations are disabled.
pub async fn expire_overdue_invoices(state: &AppState, today: NaiveDate) -> Result<Vec<Invoice>> {
    let filter = doc! {
        "status": InvoiceStatus::Pending.as_str(),
        "due_date": { "$lt": today.to_string() },
    };
    let mut cursor = state.invoices.find(filter).await?;
    let mut overdue = Vec::new();
    while let Some(invoice) = cursor.try_next().await? {
        overdue.push(invoice);
    }

    let mut expired = Vec::new();
    for mut invoice in overdue {
        let Some(id) = invoice.id else { continue };
        if !billing::is_overdue(invoice.status, invoice.due_date, today) {
            continue;
        }
        let res = state
            .invoices
            .update_one(
                doc! { "_id": id, "status": InvoiceStatus::Pending.as_str() },
                doc! { "$set": {
                    "status": InvoiceStatus::Expired.as_str(),
                    "updated_at": now(),
                } },
            )
            .await?;
        if res.modified_count == 0 {
            continue;
        }
        invoice.status = InvoiceStatus::Expired;

        state
            .organizations
            .update_one(
                doc! { "_id": invoice.organization_id },
                doc! { "$set": { "enabled": false, "updated_at": now() } },
            )
            .await?;

        tracing::info!(
            invoice_id = %id,
            organization_id = %invoice.organization_id,
            period = %invoice.period,
            "invoice expired; organization disabled"
        );

        if let Some(org) = get_organization_by_id(state, &invoice.organization_id).await? {
            let admins = organization_admin_emails(state, &invoice.organization_id).await?;
            mail::deliver(
                state.mailer.as_ref(),
                templates::invoice_expired(admins, &org, &invoice),
            )
            .await;
        }
        expired.push(invoice);
    }
    Ok(expired)
}

/// Sends one reminder per pending invoice due within `days`.
pub async fn send_invoice_reminders(state: &AppState, today: NaiveDate, days: i64) -> Result<usize> {
    let limit = billing::add_days(today, days);
    let mut cursor = state
        .invoices
        .find(doc! {
            "status": InvoiceStatus::Pending.as_str(),
            "reminder_sent_at": Bson::Null,
            "due_date": { "$gte": today.to_string(), "$lte": limit.to_string() },
        })
        .await?;
    let mut due = Vec::new();
    while let Some(invoice) = cursor.try_next().await? {
        due.push(invoice);
    }

    let mut sent = 0;
    for invoice in due {
        let Some(id) = invoice.id else { continue };
        if !billing::within_reminder_window(invoice.due_date, today, days) {
            continue;
        }
        let res = state
            .invoices
            .update_one(
                doc! { "_id": id, "reminder_sent_at": Bson::Null },
                doc! { "$set": { "reminder_sent_at": now() } },
            )
            .await?;
        if res.modified_count == 0 {
            continue;
        }
        if let Some(org) = get_organization_by_id(state, &invoice.organization_id).await? {
            let admins = organization_admin_emails(state, &invoice.organization_id).await?;
            mail::deliver(
                state.mailer.as_ref(),
                templates::invoice_reminder(admins, &org, &invoice),
            )
            .await;
        }
        sent += 1;
    }
    tracing::info!(sent, "invoice reminders sent");
    Ok(sent)
}
