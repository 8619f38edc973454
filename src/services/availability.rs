use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{available_seats_key, booked_seats_key, SeatCache};
use crate::error::{BookingError, StoreResult};
use crate::ledger::SeatLedger;
use crate::models::{Seat, Showing};

/// Seat listings per showing, served through the seat cache.
///
/// Cached lists may trail the ledger by up to the TTL. Order placement never
/// reads them.
#[derive(Clone)]
pub struct AvailabilityQuery {
    ledger: SeatLedger,
    cache: Arc<dyn SeatCache>,
    ttl: Duration,
}

impl AvailabilityQuery {
    pub fn new(ledger: SeatLedger, cache: Arc<dyn SeatCache>, ttl: Duration) -> Self {
        Self { ledger, cache, ttl }
    }

    /// Booked seats of the showing. Fails with `NotFound` for an unknown showing.
    pub async fn booked_seats(&self, showing_id: i64) -> Result<Vec<Seat>, BookingError> {
        self.require_showing(showing_id).await?;
        let store = self.ledger.store().clone();
        self.read_through(&booked_seats_key(showing_id), || async move {
            store.booked_seats(showing_id).await
        })
        .await
    }

    /// Seats of the showing's cinema that are not booked.
    pub async fn available_seats(&self, showing_id: i64) -> Result<Vec<Seat>, BookingError> {
        self.require_showing(showing_id).await?;
        let store = self.ledger.store().clone();
        self.read_through(&available_seats_key(showing_id), || async move {
            let all = store.seats_for_showing(showing_id).await?;
            let booked: HashSet<i64> = store
                .booked_seats(showing_id)
                .await?
                .into_iter()
                .map(|s| s.seat_id)
                .collect();
            Ok(all
                .into_iter()
                .filter(|s| !booked.contains(&s.seat_id))
                .collect())
        })
        .await
    }

    /// Drops cached listings for the showing. Failures are logged only.
    pub async fn invalidate(&self, showing_id: i64) {
        let keys = [booked_seats_key(showing_id), available_seats_key(showing_id)];
        if let Err(e) = self.cache.invalidate(&keys).await {
            warn!("failed to invalidate seat cache for showing {}: {:?}", showing_id, e);
        }
    }

    async fn require_showing(&self, showing_id: i64) -> Result<Showing, BookingError> {
        self.ledger
            .store()
            .showing(showing_id)
            .await?
            .ok_or_else(|| BookingError::NotFound("Cinema schedule not found".to_string()))
    }

    async fn read_through<F, Fut>(&self, key: &str, load: F) -> Result<Vec<Seat>, BookingError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<Vec<Seat>>>,
    {
        match self.cache.get_seats(key).await {
            Ok(Some(seats)) => return Ok(seats),
            Ok(None) => debug!("cache miss {}", key),
            Err(e) => warn!("seat cache read failed for {}: {:?}", key, e),
        }

        let seats = load().await?;

        if let Err(e) = self.cache.put_seats(key, &seats, self.ttl).await {
            warn!("seat cache write failed for {}: {:?}", key, e);
        }
        Ok(seats)
    }
}
