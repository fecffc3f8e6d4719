// config.rs
// Process configuration read from the environment (after dotenvy loads .env).

use anyhow::{Context, Result};
use std::{env, str::FromStr};

/// Which transport delivers outbound email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailDriver {
    Smtp,
    Log,
    Array,
}

impl FromStr for MailDriver {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "smtp" => Ok(MailDriver::Smtp),
            "log" => Ok(MailDriver::Log),
            "array" | "memory" => Ok(MailDriver::Array),
            other => anyhow::bail!("unknown mail driver `{other}` (expected smtp, log or array)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub driver: MailDriver,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub from_address: String,
    pub from_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub unit_price: f64,
    pub currency: String,
    pub due_day: u32,
    pub grace_days: i64,
    pub reminder_days: i64,
    pub trial_days: i64,
    pub trial_reminder_days: i64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mongodb_uri: String,
    pub mongodb_db: String,
    pub bind_addr: String,
    pub seed_file: String,
    pub scheduler_enabled: bool,
    pub scheduler_interval_secs: u64,
    pub billing: BillingConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(AppConfig {
            mongodb_uri: var_or("MONGODB_URI", "mongodb://localhost:27017"),
            mongodb_db: var_or("MONGODB_DB", "tesoreria"),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8080"),
            seed_file: var_or("SEED_FILE", "./data/seed.json"),
            scheduler_enabled: parse_var("SCHEDULER_ENABLED", true)?,
            scheduler_interval_secs: parse_var("SCHEDULER_INTERVAL_SECS", 3600)?,
            billing: BillingConfig {
                unit_price: parse_var("BILLING_UNIT_PRICE", 10.0)?,
                currency: var_or("BILLING_CURRENCY", "MXN"),
                due_day: parse_var("BILLING_DUE_DAY", 10)?,
                grace_days: parse_days("BILLING_GRACE_DAYS", 10)?,
                reminder_days: parse_days("BILLING_REMINDER_DAYS", 3)?,
                trial_days: parse_days("TRIAL_DAYS", 30)?,
                trial_reminder_days: parse_days("TRIAL_REMINDER_DAYS", 5)?,
            },
            mail: MailConfig {
                driver: parse_var("MAIL_MAILER", MailDriver::Log)?,
                host: var_or("MAIL_HOST", "localhost"),
                port: parse_var("MAIL_PORT", 587)?,
                username: env::var("MAIL_USERNAME").ok().filter(|v| !v.is_empty()),
                password: env::var("MAIL_PASSWORD").ok().filter(|v| !v.is_empty()),
                use_tls: parse_var("MAIL_TLS", true)?,
                from_address: var_or("MAIL_FROM_ADDRESS", "no-reply@tesoreria.local"),
                from_name: env::var("MAIL_FROM_NAME").ok().filter(|v| !v.is_empty()),
            },
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(key, &raw),
        _ => Ok(default),
    }
}

/// Day counts stay within a year.
const MAX_DAYS: i64 = 366;

fn parse_days(key: &str, default: i64) -> Result<i64> {
    let days = parse_var(key, default)?;
    check_days(key, days)
}

fn check_days(key: &str, days: i64) -> Result<i64> {
    if !(0..=MAX_DAYS).contains(&days) {
        anyhow::bail!("{key} must be between 0 and {MAX_DAYS}, got {days}");
    }
    Ok(days)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("invalid value for {key}: `{raw}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mail_driver_names() {
        assert_eq!("SMTP".parse::<MailDriver>().unwrap(), MailDriver::Smtp);
        assert_eq!("memory".parse::<MailDriver>().unwrap(), MailDriver::Array);
        assert!("carrier-pigeon".parse::<MailDriver>().is_err());
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let err = parse_value::<u32>("BILLING_DUE_DAY", "diez").unwrap_err();
        assert!(format!("{err:#}").contains("BILLING_DUE_DAY"));
        assert_eq!(parse_value::<f64>("BILLING_UNIT_PRICE", " 12.5 ").unwrap(), 12.5);
    }

    #[test]
    fn day_counts_are_bounded() {
        assert_eq!(check_days("TRIAL_DAYS", 30).unwrap(), 30);
        assert_eq!(check_days("BILLING_GRACE_DAYS", 0).unwrap(), 0);
        let err = check_days("BILLING_GRACE_DAYS", 100_000_000_000).unwrap_err();
        assert!(err.to_string().contains("BILLING_GRACE_DAYS"));
        assert!(check_days("TRIAL_DAYS", -1).is_err());
    }
}
