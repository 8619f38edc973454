use async_trait::async_trait;
use std::time::Duration;

use crate::models::Seat;
use crate::redis_client::RedisClient;

pub mod seats;

pub fn booked_seats_key(showing_id: i64) -> String {
    format!("cinemas:booked-seats:{}", showing_id)
}

pub fn available_seats_key(showing_id: i64) -> String {
    format!("cinemas:available-seats:{}", showing_id)
}

/// Read-through cache for seat lists.
///
/// Entries are derived data. Every method may fail and callers treat a
/// failure as a miss; the ledger is always the source of truth.
#[async_trait]
pub trait SeatCache: Send + Sync + 'static {
    async fn get_seats(&self, key: &str) -> anyhow::Result<Option<Vec<Seat>>>;

    async fn put_seats(&self, key: &str, seats: &[Seat], ttl: Duration) -> anyhow::Result<()>;

    async fn invalidate(&self, keys: &[String]) -> anyhow::Result<()>;
}

/// Redis-backed seat cache.
#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
}

impl CacheService {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

/// Cache that never holds anything. Used when `REDIS_URL` is unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl SeatCache for NoCache {
    async fn get_seats(&self, _key: &str) -> anyhow::Result<Option<Vec<Seat>>> {
        Ok(None)
    }

    async fn put_seats(&self, _key: &str, _seats: &[Seat], _ttl: Duration) -> anyhow::Result<()> {
        Ok(())
    }

    async fn invalidate(&self, _keys: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
}
