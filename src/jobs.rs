// jobs.rs
// Batch jobs shared by the console commands, the admin endpoint and the scheduler loop.
// Every job is safe to run repeatedly for the same day.

use anyhow::Result;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::{sync::Arc, time::Duration};

use crate::{
    billing::Period,
    mail::{self, templates},
    state::{self, AppState},
};

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateSummary {
    pub period: String,
    pub created: usize,
    pub skipped_existing: usize,
    pub skipped_trial: usize,
    pub skipped_empty: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DisableSummary {
    pub expired_organizations: usize,
    pub expired_trials: usize,
}

/// Result of one `schedule:run` pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobReport {
    pub date: String,
    pub disabled: DisableSummary,
    pub generated: GenerateSummary,
    pub expired_invoices: usize,
    pub invoice_reminders: usize,
    pub trial_reminders: usize,
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `billing:generate`. Without a period the month containing `today` is billed.
pub async fn run_generate(state: &AppState, period: Option<Period>, today: NaiveDate) -> Result<GenerateSummary> {
    let period = period.unwrap_or_else(|| Period::containing(today));
    let report = state::generate_invoices(state, &period, today).await?;
    Ok(GenerateSummary {
        period: report.period,
        created: report.created.len(),
        skipped_existing: report.skipped_existing,
        skipped_trial: report.skipped_trial,
        skipped_empty: report.skipped_empty,
    })
}

/// `billing:expire`.
pub async fn run_expire(state: &AppState, today: NaiveDate) -> Result<usize> {
    let expired = state::expire_overdue_invoices(state, today).await?;
    tracing::info!(expired = expired.len(), %today, "overdue invoices expired");
    Ok(expired.len())
}

/// `billing:remind`.
pub async fn run_remind(state: &AppState, today: NaiveDate) -> Result<usize> {
    state::send_invoice_reminders(state, today, state.config.billing.reminder_days).await
}

/// `organizations:disable-expired`: paid periods that ran out, then finished trials.
pub async fn run_disable_expired(state: &AppState, today: NaiveDate) -> Result<DisableSummary> {
    let expired = state::disable_expired_organizations(state, today).await?;
    for org in &expired {
        let Some(id) = org.id else { continue };
        let admins = state::organization_admin_emails(state, &id).await?;
        mail::deliver(
            state.mailer.as_ref(),
            templates::organization_disabled(admins, org),
        )
        .await;
    }

    let trials = state::expire_trials(state, today).await?;
    for org in &trials {
        let Some(id) = org.id else { continue };
        let admins = state::organization_admin_emails(state, &id).await?;
        mail::deliver(state.mailer.as_ref(), templates::trial_expired(admins, org)).await;
    }

    tracing::info!(
        expired_organizations = expired.len(),
        expired_trials = trials.len(),
        %today,
        "expired organizations disabled"
    );
    Ok(DisableSummary {
        expired_organizations: expired.len(),
        expired_trials: trials.len(),
    })
}

/// `trials:remind`: one notice per trial about to end.
pub async fn run_trial_reminders(state: &AppState, today: NaiveDate) -> Result<usize> {
    let days = state.config.billing.trial_reminder_days;
    let mut sent = 0;
    for org in state::trials_ending_soon(state, today, days).await? {
        let Some(id) = org.id else { continue };
        let days_left = org
            .trial_ends_at
            .map(|ends| (ends - today).num_days())
            .unwrap_or(0);
        state::mark_trial_reminded(state, &id).await?;
        let admins = state::organization_admin_emails(state, &id).await?;
        mail::deliver(
            state.mailer.as_ref(),
            templates::trial_ending(admins, &org, days_left),
        )
        .await;
        sent += 1;
    }
    tracing::info!(sent, "trial reminders sent");
    Ok(sent)
}

/// `schedule:run`. Organizations are disabled first so that trials ending today
/// are billed in the same pass.
pub async fn run_all(state: &AppState, today: NaiveDate) -> Result<JobReport> {
    let disabled = run_disable_expired(state, today).await?;
    let generated = run_generate(state, None, today).await?;
    let expired_invoices = run_expire(state, today).await?;
    let invoice_reminders = run_remind(state, today).await?;
    let trial_reminders = run_trial_reminders(state, today).await?;

    Ok(JobReport {
        date: today.to_string(),
        disabled,
        generated,
        expired_invoices,
        invoice_reminders,
        trial_reminders,
    })
}

/// Runs `run_all` every `interval` until the process exits. A failed pass is logged
/// and retried on the next tick.
pub fn spawn_scheduler(state: Arc<AppState>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match run_all(&state, today()).await {
                Ok(report) => tracing::info!(
                    created = report.generated.created,
                    expired = report.expired_invoices,
                    disabled = report.disabled.expired_organizations + report.disabled.expired_trials,
                    "scheduled jobs finished"
                ),
                Err(err) => tracing::error!(error = %format!("{err:#}"), "scheduled jobs failed"),
            }
        }
    })
}
