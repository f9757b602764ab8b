//! HTTP API.

mod auth;
mod discovery;
mod news;
mod routes;
mod search_config;
mod sources;
mod types;

pub use routes::{serve, AppState};
