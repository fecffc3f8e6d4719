// lib.rs
// Library surface shared by the binary and the integration tests.

pub mod app;
pub mod billing;
pub mod cli;
pub mod config;
pub mod error;
pub mod jobs;
pub mod mail;
pub mod models;
pub mod routes;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod totp;

pub use app::router;
