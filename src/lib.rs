pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use cache::{CacheService, NoCache, SeatCache};
use ledger::{LedgerStore, PgLedgerStore, SeatLedger};
use middleware::JwtKeys;
use services::{AvailabilityQuery, OrderService};

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub ledger: SeatLedger,
    pub availability: AvailabilityQuery,
    pub orders: OrderService,
    pub jwt: JwtKeys,
}

impl AppState {
    /// Connects Postgres (running migrations) and, if configured, Redis.
    ///
    /// An unreachable Redis is not fatal: the service starts without a cache.
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;
        info!("Database connected");

        db.run_migrations().await?;

        let cache: Arc<dyn SeatCache> = match &config.redis.url {
            Some(url) => match redis_client::RedisClient::new(url).await {
                Ok(redis) => {
                    info!("Redis connected");
                    Arc::new(CacheService::new(redis))
                }
                Err(e) => {
                    warn!("Redis unavailable, running without seat cache: {}", e);
                    Arc::new(NoCache)
                }
            },
            None => {
                info!("REDIS_URL not set, running without seat cache");
                Arc::new(NoCache)
            }
        };

        let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(&db));
        Ok(Self::from_parts(&config, store, cache))
    }

    /// Wires the services over an already-built store and cache.
    pub fn from_parts(
        config: &config::Config,
        store: Arc<dyn LedgerStore>,
        cache: Arc<dyn SeatCache>,
    ) -> Arc<Self> {
        let ledger = SeatLedger::new(store);
        let availability = AvailabilityQuery::new(ledger.clone(), cache, config.cache.ttl());
        let orders = OrderService::new(ledger.clone(), availability.clone(), config.orders.timeout());
        let jwt = JwtKeys::new(&config.jwt.secret);

        Arc::new(Self {
            ledger,
            availability,
            orders,
            jwt,
        })
    }
}

/// The full HTTP surface, with tracing and CORS layers applied.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Cinema Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .merge(controllers::routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
