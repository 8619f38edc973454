use anyhow::Context;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

use super::{CacheService, SeatCache};
use crate::models::Seat;

#[async_trait]
impl SeatCache for CacheService {
    async fn get_seats(&self, key: &str) -> anyhow::Result<Option<Vec<Seat>>> {
        let mut conn = self.redis.conn.clone();
        let data: Option<String> = conn.get(key).await?;
        match data {
            Some(data) => {
                let seats = serde_json::from_str(&data)
                    .with_context(|| format!("corrupt cache entry {}", key))?;
                debug!("cache hit {}", key);
                Ok(Some(seats))
            }
            None => Ok(None),
        }
    }

    async fn put_seats(&self, key: &str, seats: &[Seat], ttl: Duration) -> anyhow::Result<()> {
        let data = serde_json::to_string(seats)?;
        let mut conn = self.redis.conn.clone();
        let _: () = conn.set_ex(key, data, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn invalidate(&self, keys: &[String]) -> anyhow::Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.redis.conn.clone();
        let _: () = conn.del(keys.to_vec()).await?;
        Ok(())
    }
}
