#![allow(dead_code)]

use std::{
    env,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::NaiveDate;
use mongodb::{Client, bson::oid::ObjectId};

use tesoreria::{
    config::{AppConfig, BillingConfig, MailConfig, MailDriver},
    mail::ArrayMailer,
    state::{self, AppState, NewMember},
};

/// Global lock so integration tests that mutate the DB run one-at-a-time.
static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestContext {
    pub state: AppState,
    pub mailer: Arc<ArrayMailer>,
    pub db_name: String,
    uri: String,
    _guard: MutexGuard<'static, ()>,
}

pub fn test_config(uri: &str, db_name: &str) -> AppConfig {
    AppConfig {
        mongodb_uri: uri.to_string(),
        mongodb_db: db_name.to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        // Never seeded: tests build their own fixtures.
        seed_file: "./tests/does-not-exist.json".to_string(),
        scheduler_enabled: false,
        scheduler_interval_secs: 3600,
        billing: BillingConfig {
            unit_price: 10.0,
            currency: "MXN".to_string(),
            due_day: 10,
            grace_days: 10,
            reminder_days: 3,
            trial_days: 30,
            trial_reminder_days: 5,
        },
        mail: MailConfig {
            driver: MailDriver::Array,
            host: "localhost".to_string(),
            port: 25,
            username: None,
            password: None,
            use_tls: false,
            from_address: "no-reply@tesoreria.test".to_string(),
            from_name: None,
        },
    }
}

pub async fn setup_state() -> Option<TestContext> {
    setup_state_seeded(None).await
}

/// Like `setup_state`, seeding the fresh database from `seed_file` when given.
pub async fn setup_state_seeded(seed_file: Option<&str>) -> Option<TestContext> {
    let guard = TEST_DB_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let uri = env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let db_name = format!(
        "tesoreriatest_{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    );

    let client = match Client::with_uri_str(&uri).await {
        Ok(c) => c,
        Err(err) => {
            eprintln!("Skipping test; cannot connect to MongoDB: {err:?}");
            return None;
        }
    };
    if let Err(err) = client.database(&db_name).drop().await {
        eprintln!("Skipping test; cannot drop test DB: {err:?}");
        return None;
    }

    let mut config = test_config(&uri, &db_name);
    if let Some(path) = seed_file {
        config.seed_file = path.to_string();
    }
    let mailer = Arc::new(ArrayMailer::default());
    match state::init_state_with_mailer(config, mailer.clone()).await {
        Ok(state) => Some(TestContext {
            state,
            mailer,
            db_name,
            uri,
            _guard: guard,
        }),
        Err(err) => {
            eprintln!("Skipping test; init_state failed: {err:?}");
            None
        }
    }
}

/// Opens a second state on the same database, as a restarted process would.
pub async fn reopen(ctx: &TestContext) -> AppState {
    let mut config = ctx.state.config.as_ref().clone();
    config.mongodb_db = ctx.db_name.clone();
    state::init_state_with_mailer(config, ctx.mailer.clone()).await.unwrap()
}

pub async fn teardown(ctx: TestContext) {
    if let Ok(client) = Client::with_uri_str(&ctx.uri).await {
        let _ = client.database(&ctx.db_name).drop().await;
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Trial organization with one admin. Returns (organization id, admin id).
pub async fn organization_with_admin(state: &AppState, name: &str, today: NaiveDate) -> (ObjectId, ObjectId) {
    let org_id = state::create_organization(state, name, None, None, today)
        .await
        .unwrap();
    let email = format!("admin@{}.test", name.to_lowercase().replace(' ', "-"));
    let admin_id = state::create_member(
        state,
        &org_id,
        NewMember {
            name: "Administración",
            email: &email,
            phone: None,
            admin: true,
        },
    )
    .await
    .unwrap();
    (org_id, admin_id)
}

/// Converts an organization into a paying one that expires at `expires_at`.
pub async fn make_paying(state: &AppState, org_id: &ObjectId, expires_at: NaiveDate) {
    use mongodb::bson::doc;
    state
        .organizations
        .update_one(
            doc! { "_id": org_id },
            doc! { "$set": { "trial": false, "enabled": true, "expires_at": expires_at.to_string() } },
        )
        .await
        .unwrap();
}

pub async fn add_plain_member(state: &AppState, org_id: &ObjectId, email: &str) -> ObjectId {
    state::create_member(
        state,
        org_id,
        NewMember {
            name: "Asociado",
            email,
            phone: None,
            admin: false,
        },
    )
    .await
    .unwrap()
}
