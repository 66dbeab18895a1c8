use config::Config;
use redis::Client as RedisClient;
use sqlx::PgPool;
use std::sync::Arc;

pub mod billing;
pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod payfast;
pub mod routes;
pub mod utils;
pub mod validation;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    /// Outbound client for gateway callbacks.
    pub http: reqwest::Client,
}
