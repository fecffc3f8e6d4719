// state module: AppState, initialization, and re-exports of submodules.

use anyhow::{Context, Result};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
};
use std::sync::Arc;

use crate::{
    config::AppConfig,
    mail::{self, Mailer},
    models::{
        ContactList, Invoice, Member, Membership, Movement, Organization, PaymentMode, Project,
        Session, Supplier,
    },
};

mod catalogs;
mod contact_lists;
mod invoices;
mod members;
mod movements;
mod organizations;
mod seed;

pub use catalogs::*;
pub use contact_lists::*;
pub use invoices::*;
pub use members::*;
pub use movements::*;
pub use organizations::*;

pub const SESSION_TTL_SECONDS: u64 = 60 * 60 * 24; // 1 day

#[derive(Clone)]
pub struct AppState {
    pub organizations: Collection<Organization>,
    pub members: Collection<Member>,
    pub memberships: Collection<Membership>,
    pub sessions: Collection<Session>,
    pub projects: Collection<Project>,
    pub suppliers: Collection<Supplier>,
    pub payment_modes: Collection<PaymentMode>,
    pub movements: Collection<Movement>,
    pub contact_lists: Collection<ContactList>,
    pub invoices: Collection<Invoice>,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<dyn Mailer>,
}

pub async fn init_state(config: AppConfig) -> Result<AppState> {
    let mailer = mail::create_mailer(&config.mail).context("failed to configure mailer")?;
    init_state_with_mailer(config, mailer).await
}

pub async fn init_state_with_mailer(config: AppConfig, mailer: Arc<dyn Mailer>) -> Result<AppState> {
    let client = Client::with_uri_str(&config.mongodb_uri).await?;
    let db = client.database(&config.mongodb_db);

    ensure_collections(&db).await?;

    // Only seed when the database is effectively empty (no members).
    if seed::is_database_empty(&db).await? {
        let data = seed::load_seed_data(&config.seed_file)?;
        seed::seed_database(&db, &data, &config).await?;
    }

    Ok(AppState {
        organizations: db.collection::<Organization>("organizations"),
        members: db.collection::<Member>("members"),
        memberships: db.collection::<Membership>("memberships"),
        sessions: db.collection::<Session>("sessions"),
        projects: db.collection::<Project>("projects"),
        suppliers: db.collection::<Supplier>("suppliers"),
        payment_modes: db.collection::<PaymentMode>("payment_modes"),
        movements: db.collection::<Movement>("movements"),
        contact_lists: db.collection::<ContactList>("contact_lists"),
        invoices: db.collection::<Invoice>("invoices"),
        config: Arc::new(config),
        mailer,
    })
}

const COLLECTIONS: &[&str] = &[
    "organizations",
    "members",
    "memberships",
    "sessions",
    "projects",
    "suppliers",
    "payment_modes",
    "movements",
    "contact_lists",
    "invoices",
];

async fn ensure_collections(db: &Database) -> Result<()> {
    let existing = db.list_collection_names().await?;
    for name in COLLECTIONS {
        if !existing.iter().any(|e| e == name) {
            db.create_collection(*name).await?;
        }
    }

    ensure_unique_index(db, "organizations", doc! { "slug": 1 }, "slug_unique").await?;
    ensure_unique_index(db, "members", doc! { "email": 1 }, "email_unique").await?;
    ensure_unique_index(
        db,
        "memberships",
        doc! { "organization_id": 1, "member_id": 1 },
        "organization_member_unique",
    )
    .await?;
    ensure_unique_index(
        db,
        "invoices",
        doc! { "organization_id": 1, "period": 1 },
        "organization_period_unique",
    )
    .await?;
    ensure_unique_index(db, "sessions", doc! { "token": 1 }, "token_unique").await?;
    Ok(())
}

async fn ensure_unique_index(db: &Database, collection: &str, keys: Document, name: &str) -> Result<()> {
    db.collection::<Document>(collection)
        .create_index(
            IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name(name.to_string())
                        .build(),
                )
                .build(),
        )
        .await
        .with_context(|| format!("failed to create index {name} on {collection}"))?;
    Ok(())
}

pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == 11000
    )
}

pub(crate) fn now() -> mongodb::bson::DateTime {
    mongodb::bson::DateTime::now()
}
