#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cinema_booking::cache::{NoCache, SeatCache};
use cinema_booking::config::Config;
use cinema_booking::ledger::InMemoryLedger;
use cinema_booking::middleware::Claims;
use cinema_booking::models::{OrderRequest, OrderSeatInput, Seat, SeatType};
use cinema_booking::AppState;

pub const SHOWING: i64 = 1;
pub const OTHER_SHOWING: i64 = 2;
pub const CINEMA: i64 = 1;
pub const JWT_SECRET: &str = "test-secret";

pub fn seat(id: i64) -> Seat {
    Seat {
        seat_id: id,
        seat_number: format!("A{}", id),
        seat_type: if id > 8 { SeatType::Vip } else { SeatType::Regular },
    }
}

/// Two showings in the same ten-seat cinema, payable with method 1.
pub fn seeded_ledger() -> InMemoryLedger {
    let ledger = InMemoryLedger::new();
    ledger.seed_payment_method(1);
    let seats: Vec<Seat> = (1..=10).map(seat).collect();
    ledger.seed_showing(SHOWING, CINEMA, seats.clone());
    ledger.seed_showing(OTHER_SHOWING, CINEMA, seats);
    ledger
}

pub fn config() -> Config {
    let mut config = Config::default();
    config.jwt.secret = JWT_SECRET.to_string();
    config
}

pub fn state(ledger: &InMemoryLedger) -> Arc<AppState> {
    state_with(ledger, Arc::new(NoCache), config())
}

pub fn state_with(
    ledger: &InMemoryLedger,
    cache: Arc<dyn SeatCache>,
    config: Config,
) -> Arc<AppState> {
    AppState::from_parts(&config, Arc::new(ledger.clone()), cache)
}

pub fn order_request(showing_id: i64, seats: &[i64]) -> OrderRequest {
    OrderRequest {
        total_price: 45000.0 * seats.len().max(1) as f64,
        showing_id,
        payment_method_id: 1,
        seats: seats
            .iter()
            .map(|&seat_id| OrderSeatInput {
                seat_id,
                status: Some("booked".to_string()),
            })
            .collect(),
        is_paid: false,
        is_active: true,
    }
}

pub fn token(state: &AppState, user_id: i64, role: &str) -> String {
    let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
    state
        .jwt
        .issue(&Claims {
            id: user_id,
            role: role.to_string(),
            exp,
        })
        .unwrap()
}

/// In-process cache that counts traffic and can be switched to fail.
#[derive(Default)]
pub struct RecordingCache {
    entries: Mutex<HashMap<String, Vec<Seat>>>,
    pub hits: AtomicUsize,
    pub puts: AtomicUsize,
    failing: Mutex<bool>,
}

impl RecordingCache {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn check(&self) -> anyhow::Result<()> {
        if *self.failing.lock() {
            anyhow::bail!("cache unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl SeatCache for RecordingCache {
    async fn get_seats(&self, key: &str) -> anyhow::Result<Option<Vec<Seat>>> {
        self.check()?;
        let found = self.entries.lock().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(found)
    }

    async fn put_seats(&self, key: &str, seats: &[Seat], _ttl: Duration) -> anyhow::Result<()> {
        self.check()?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().insert(key.to_string(), seats.to_vec());
        Ok(())
    }

    async fn invalidate(&self, keys: &[String]) -> anyhow::Result<()> {
        self.check()?;
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}
