pub mod app;
pub mod config;
pub mod consumer;
pub mod db;
pub mod envelope;
pub mod health;
pub mod identity;
pub mod metrics;
pub mod middleware;
pub mod payload;
pub mod query;
pub mod repos;
pub mod routes;
pub mod services;

pub use app::{build_router, AppState};
pub use consumer::start_event_consumer;
