// main.rs
// Entry point: loads .env, reads configuration, then either serves the API or runs one batch command.
//
//   tesoreria [serve]                          HTTP API (+ scheduler loop when enabled)
//   tesoreria billing:generate [--period YYYY-MM]
//   tesoreria billing:expire | billing:remind
//   tesoreria organizations:disable-expired
//   tesoreria trials:remind
//   tesoreria schedule:run

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use tokio::net::TcpListener;

use tesoreria::{
    cli::{Cli, Command},
    config::AppConfig,
    jobs, router,
    state::{self, AppState},
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    telemetry::init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let state = Arc::new(
        state::init_state(config)
            .await
            .context("failed to initialize MongoDB state")?,
    );
    let today = cli.today.unwrap_or_else(jobs::today);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::BillingGenerate { period } => print(jobs::run_generate(&state, period, today).await?),
        Command::BillingExpire => print(jobs::run_expire(&state, today).await?),
        Command::BillingRemind => print(jobs::run_remind(&state, today).await?),
        Command::OrganizationsDisableExpired => print(jobs::run_disable_expired(&state, today).await?),
        Command::TrialsRemind => print(jobs::run_trial_reminders(&state, today).await?),
        Command::ScheduleRun => print(jobs::run_all(&state, today).await?),
    }
}

async fn serve(state: Arc<AppState>) -> Result<()> {
    if state.config.scheduler_enabled {
        let every = Duration::from_secs(state.config.scheduler_interval_secs.max(60));
        jobs::spawn_scheduler(state.clone(), every);
        tracing::info!(interval_secs = every.as_secs(), "scheduler started");
    }

    let addr = state.config.bind_addr.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn print<T: serde::Serialize>(report: T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
