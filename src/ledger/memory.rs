//! In-memory ledger store.
//!
//! Behaves like the PostgreSQL store under read-committed isolation: reads see
//! committed state only, writes are staged per unit and applied on commit,
//! and the booked-seat constraint is checked both when reservations are
//! inserted and again when the unit commits. Used by the test-suite and for
//! running the service without a database.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use tracing::debug;

use super::{LedgerStore, LedgerUnit};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    NewOrder, Order, OrderHistory, ReservationStatus, Seat, SeatReservation, Showing,
};

/// Catalog fields joined into order history.
#[derive(Debug, Clone, Default)]
pub struct ShowingDetails {
    pub title: Option<String>,
    pub age_rating: Option<String>,
    pub cinema: Option<String>,
    pub cinema_image: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
}

#[derive(Default)]
struct MemoryState {
    showings: HashMap<i64, Showing>,
    details: HashMap<i64, ShowingDetails>,
    // seat id -> (cinema id, seat)
    seats: BTreeMap<i64, (i64, Seat)>,
    payment_methods: BTreeSet<i64>,
    virtual_accounts: HashMap<i64, String>,
    orders: BTreeMap<i64, Order>,
    reservations: Vec<SeatReservation>,
}

impl MemoryState {
    fn is_booked(&self, showing_id: i64, seat_id: i64) -> bool {
        self.reservations.iter().any(|r| {
            r.showing_id == showing_id
                && r.seat_id == seat_id
                && r.status == ReservationStatus::Booked
        })
    }

    fn booked_among(&self, showing_id: i64, seat_ids: &[i64]) -> Vec<i64> {
        let booked: BTreeSet<i64> = seat_ids
            .iter()
            .copied()
            .filter(|id| self.is_booked(showing_id, *id))
            .collect();
        booked.into_iter().collect()
    }

    fn seats_of_cinema(&self, cinema_id: i64) -> Vec<Seat> {
        self.seats
            .values()
            .filter(|(cinema, _)| *cinema == cinema_id)
            .map(|(_, seat)| seat.clone())
            .collect()
    }
}

#[derive(Default)]
struct Faults {
    fail_reservation_inserts: bool,
    reservation_insert_delay: Option<Duration>,
    commit_barrier: Option<Arc<Barrier>>,
}

#[derive(Default)]
struct Sequences {
    order: AtomicI64,
    reservation: AtomicI64,
}

impl Sequences {
    fn next_order(&self) -> i64 {
        self.order.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_reservation(&self) -> i64 {
        self.reservation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<MemoryState>>,
    faults: Arc<Mutex<Faults>>,
    sequences: Arc<Sequences>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a showing in `cinema_id` together with the cinema's seats.
    /// Seats already known are replaced.
    pub fn seed_showing(&self, showing_id: i64, cinema_id: i64, seats: Vec<Seat>) {
        let mut state = self.state.write();
        state.showings.insert(
            showing_id,
            Showing {
                id: showing_id,
                cinema_id,
            },
        );
        for seat in seats {
            state.seats.insert(seat.seat_id, (cinema_id, seat));
        }
    }

    pub fn describe_showing(&self, showing_id: i64, details: ShowingDetails) {
        self.state.write().details.insert(showing_id, details);
    }

    /// Orders may only reference payment methods registered here.
    pub fn seed_payment_method(&self, payment_method_id: i64) {
        self.state.write().payment_methods.insert(payment_method_id);
    }

    pub fn set_virtual_account(&self, user_id: i64, virtual_account: &str) {
        self.state
            .write()
            .virtual_accounts
            .insert(user_id, virtual_account.to_string());
    }

    /// Makes every subsequent reservation insert fail with a backend error.
    pub fn fail_reservation_inserts(&self, fail: bool) {
        self.faults.lock().fail_reservation_inserts = fail;
    }

    /// Stalls every subsequent reservation insert for `delay`.
    pub fn delay_reservation_inserts(&self, delay: Option<Duration>) {
        self.faults.lock().reservation_insert_delay = delay;
    }

    /// Makes every commit wait on `barrier` before applying its writes.
    pub fn hold_commits_at(&self, barrier: Option<Arc<Barrier>>) {
        self.faults.lock().commit_barrier = barrier;
    }

    pub fn orders(&self) -> Vec<Order> {
        self.state.read().orders.values().cloned().collect()
    }

    pub fn reservations(&self) -> Vec<SeatReservation> {
        self.state.read().reservations.clone()
    }

    /// Number of `booked` reservations for one seat of one showing.
    pub fn booked_count(&self, showing_id: i64, seat_id: i64) -> usize {
        self.state
            .read()
            .reservations
            .iter()
            .filter(|r| {
                r.showing_id == showing_id
                    && r.seat_id == seat_id
                    && r.status == ReservationStatus::Booked
            })
            .count()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn showing(&self, showing_id: i64) -> StoreResult<Option<Showing>> {
        Ok(self.state.read().showings.get(&showing_id).cloned())
    }

    async fn seats_for_showing(&self, showing_id: i64) -> StoreResult<Vec<Seat>> {
        let state = self.state.read();
        Ok(state
            .showings
            .get(&showing_id)
            .map(|s| state.seats_of_cinema(s.cinema_id))
            .unwrap_or_default())
    }

    async fn booked_seats(&self, showing_id: i64) -> StoreResult<Vec<Seat>> {
        let state = self.state.read();
        let booked: BTreeSet<i64> = state
            .reservations
            .iter()
            .filter(|r| r.showing_id == showing_id && r.status == ReservationStatus::Booked)
            .map(|r| r.seat_id)
            .collect();
        Ok(booked
            .into_iter()
            .filter_map(|id| state.seats.get(&id).map(|(_, seat)| seat.clone()))
            .collect())
    }

    async fn booked_among(&self, showing_id: i64, seat_ids: &[i64]) -> StoreResult<Vec<i64>> {
        Ok(self.state.read().booked_among(showing_id, seat_ids))
    }

    async fn order_history(&self, user_id: i64) -> StoreResult<Vec<OrderHistory>> {
        let state = self.state.read();
        let mut orders: Vec<&Order> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .collect();
        orders.sort_by_key(|o| (o.created_at, o.id));

        Ok(orders
            .into_iter()
            .map(|o| {
                let details = state.details.get(&o.showing_id).cloned().unwrap_or_default();
                let mut seats: Vec<&Seat> = state
                    .reservations
                    .iter()
                    .filter(|r| r.order_id == o.id && r.status == ReservationStatus::Booked)
                    .filter_map(|r| state.seats.get(&r.seat_id).map(|(_, seat)| seat))
                    .collect();
                seats.sort_by_key(|s| s.seat_id);
                let seat_types: BTreeSet<String> =
                    seats.iter().map(|s| s.seat_type.to_string()).collect();

                OrderHistory {
                    id: o.id,
                    is_active: o.is_active,
                    is_paid: o.is_paid,
                    qr_code: o.qr_code.clone(),
                    total_price: o.total_price,
                    user_id: o.user_id,
                    virtual_account: state.virtual_accounts.get(&o.user_id).cloned(),
                    title: details.title,
                    age_rating: details.age_rating,
                    cinema: details.cinema,
                    cinema_image: details.cinema_image,
                    location: details.location,
                    date: details.date,
                    time: details.time,
                    seat_numbers: seats.iter().map(|s| s.seat_number.clone()).collect(),
                    seat_types: seat_types.into_iter().collect(),
                    created_at: o.created_at,
                }
            })
            .collect())
    }

    async fn begin(&self) -> StoreResult<Box<dyn LedgerUnit>> {
        Ok(Box::new(MemoryUnit {
            ledger: self.clone(),
            order: None,
            reservations: Vec::new(),
        }))
    }
}

/// Staged writes of one unit. Dropping it discards them.
pub struct MemoryUnit {
    ledger: InMemoryLedger,
    order: Option<Order>,
    reservations: Vec<SeatReservation>,
}

#[async_trait]
impl LedgerUnit for MemoryUnit {
    async fn showing(&mut self, showing_id: i64) -> StoreResult<Option<Showing>> {
        Ok(self.ledger.state.read().showings.get(&showing_id).cloned())
    }

    async fn unknown_seats(&mut self, cinema_id: i64, seat_ids: &[i64]) -> StoreResult<Vec<i64>> {
        let state = self.ledger.state.read();
        let unknown: BTreeSet<i64> = seat_ids
            .iter()
            .copied()
            .filter(|id| !matches!(state.seats.get(id), Some((cinema, _)) if *cinema == cinema_id))
            .collect();
        Ok(unknown.into_iter().collect())
    }

    async fn booked_among(&mut self, showing_id: i64, seat_ids: &[i64]) -> StoreResult<Vec<i64>> {
        let mut booked = self.ledger.state.read().booked_among(showing_id, seat_ids);
        for r in &self.reservations {
            if r.showing_id == showing_id && seat_ids.contains(&r.seat_id) {
                booked.push(r.seat_id);
            }
        }
        booked.sort_unstable();
        booked.dedup();
        Ok(booked)
    }

    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<Order> {
        {
            let state = self.ledger.state.read();
            if !state.showings.contains_key(&order.showing_id) {
                return Err(StoreError::ForeignKeyViolation(
                    "orders_cinemas_schedule_id_fkey".to_string(),
                ));
            }
            if !state.payment_methods.contains(&order.payment_method_id) {
                return Err(StoreError::ForeignKeyViolation(
                    "orders_payment_method_id_fkey".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let created = Order {
            id: self.ledger.sequences.next_order(),
            qr_code: order.qr_code.clone(),
            is_paid: order.is_paid,
            is_active: order.is_active,
            total_price: order.total_price,
            user_id: order.user_id,
            showing_id: order.showing_id,
            payment_method_id: order.payment_method_id,
            created_at: now,
            updated_at: now,
            seats: Vec::new(),
        };
        self.order = Some(created.clone());
        Ok(created)
    }

    async fn insert_reservations(
        &mut self,
        order_id: i64,
        showing_id: i64,
        seat_ids: &[i64],
    ) -> StoreResult<Vec<SeatReservation>> {
        let (fail, delay) = {
            let faults = self.ledger.faults.lock();
            (faults.fail_reservation_inserts, faults.reservation_insert_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(StoreError::Backend("injected reservation insert failure".to_string()));
        }

        let taken = {
            let state = self.ledger.state.read();
            if let Some(missing) = seat_ids.iter().find(|id| !state.seats.contains_key(id)) {
                debug!("reservation references unknown seat {}", missing);
                return Err(StoreError::ForeignKeyViolation(
                    "orders_seats_seat_id_fkey".to_string(),
                ));
            }
            state.booked_among(showing_id, seat_ids)
        };
        if !taken.is_empty() {
            return Err(StoreError::UniqueViolation(taken));
        }

        let mut ordered = seat_ids.to_vec();
        ordered.sort_unstable();
        let now = Utc::now();
        let inserted: Vec<SeatReservation> = ordered
            .iter()
            .map(|seat_id| SeatReservation {
                id: self.ledger.sequences.next_reservation(),
                order_id,
                showing_id,
                seat_id: *seat_id,
                status: ReservationStatus::Booked,
                created_at: now,
            })
            .collect();
        self.reservations.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let barrier = self.ledger.faults.lock().commit_barrier.clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        let MemoryUnit {
            ledger,
            order,
            reservations,
        } = *self;

        let mut state = ledger.state.write();
        let mut conflicts: Vec<i64> = reservations
            .iter()
            .filter(|r| state.is_booked(r.showing_id, r.seat_id))
            .map(|r| r.seat_id)
            .collect();
        if !conflicts.is_empty() {
            conflicts.sort_unstable();
            conflicts.dedup();
            debug!("commit rejected, seats {:?} already booked", conflicts);
            return Err(StoreError::UniqueViolation(conflicts));
        }

        if let Some(mut order) = order {
            order.seats = reservations
                .iter()
                .filter(|r| r.order_id == order.id)
                .cloned()
                .collect();
            state.orders.insert(order.id, order);
        }
        state.reservations.extend(reservations);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
