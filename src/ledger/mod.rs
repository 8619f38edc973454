//! Seat ledger: the authoritative booked/available state per showing.
//!
//! Storage is reached through two traits. [`LedgerStore`] is the shared,
//! read-mostly handle (one per process, injected at start-up); [`LedgerUnit`]
//! is a single atomic unit of work obtained from [`LedgerStore::begin`].
//! Writes made through a unit become visible only after [`LedgerUnit::commit`];
//! dropping a unit without committing discards them.
//!
//! Every store must enforce the booked-seat constraint itself: at most one
//! `booked` reservation per `(showing_id, seat_id)`. A write that would break
//! it fails with [`crate::error::StoreError::UniqueViolation`], either at
//! insert time or at commit time.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{BookingError, StoreResult};
use crate::models::{NewOrder, Order, OrderHistory, Seat, SeatReservation, Showing};

pub use memory::{InMemoryLedger, ShowingDetails};
pub use postgres::PgLedgerStore;

#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    async fn showing(&self, showing_id: i64) -> StoreResult<Option<Showing>>;

    /// Every seat of the showing's cinema, ordered by seat id.
    async fn seats_for_showing(&self, showing_id: i64) -> StoreResult<Vec<Seat>>;

    /// Seats holding a `booked` reservation for the showing, ordered by seat id.
    async fn booked_seats(&self, showing_id: i64) -> StoreResult<Vec<Seat>>;

    /// The subset of `seat_ids` that is booked for the showing, ascending.
    async fn booked_among(&self, showing_id: i64, seat_ids: &[i64]) -> StoreResult<Vec<i64>>;

    async fn order_history(&self, user_id: i64) -> StoreResult<Vec<OrderHistory>>;

    async fn begin(&self) -> StoreResult<Box<dyn LedgerUnit>>;
}

#[async_trait]
pub trait LedgerUnit: Send {
    async fn showing(&mut self, showing_id: i64) -> StoreResult<Option<Showing>>;

    /// Ids from `seat_ids` that are not seats of `cinema_id`, ascending.
    async fn unknown_seats(&mut self, cinema_id: i64, seat_ids: &[i64]) -> StoreResult<Vec<i64>>;

    async fn booked_among(&mut self, showing_id: i64, seat_ids: &[i64]) -> StoreResult<Vec<i64>>;

    /// Inserts the order row. The returned order has no seats yet.
    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<Order>;

    /// Inserts one `booked` reservation per seat.
    async fn insert_reservations(
        &mut self,
        order_id: i64,
        showing_id: i64,
        seat_ids: &[i64],
    ) -> StoreResult<Vec<SeatReservation>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Rejects an empty selection or one naming the same seat twice.
pub fn validate_selection(seat_ids: &[i64]) -> Result<(), BookingError> {
    if seat_ids.is_empty() {
        return Err(BookingError::InvalidInput(
            "at least one seat is required".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(seat_ids.len());
    let mut duplicates: Vec<i64> = seat_ids
        .iter()
        .copied()
        .filter(|id| !seen.insert(*id))
        .collect();
    if !duplicates.is_empty() {
        duplicates.sort_unstable();
        duplicates.dedup();
        return Err(BookingError::InvalidInput(format!(
            "duplicate seat ids: {:?}",
            duplicates
        )));
    }

    Ok(())
}

/// Ledger operations on top of an injected store.
#[derive(Clone)]
pub struct SeatLedger {
    store: Arc<dyn LedgerStore>,
}

impl SeatLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// True iff none of `seat_ids` is booked for the showing.
    ///
    /// Read outside any unit: the answer may be stale by the time a write
    /// commits, so it is advisory only.
    pub async fn check_availability(&self, showing_id: i64, seat_ids: &[i64]) -> StoreResult<bool> {
        Ok(self.store.booked_among(showing_id, seat_ids).await?.is_empty())
    }

    /// The availability re-check performed inside a placement unit.
    ///
    /// Returns the already-booked subset; empty means the selection is free
    /// as seen by this unit.
    pub async fn booked_in_unit(
        &self,
        unit: &mut dyn LedgerUnit,
        showing_id: i64,
        seat_ids: &[i64],
    ) -> StoreResult<Vec<i64>> {
        unit.booked_among(showing_id, seat_ids).await
    }

    /// Writes one `booked` reservation per seat into `unit`, in ascending
    /// seat order whatever order the caller used.
    ///
    /// Must follow a successful [`SeatLedger::booked_in_unit`] check in the
    /// same unit. Store errors, including a uniqueness violation raised by a
    /// concurrent booking, are returned unchanged.
    pub async fn reserve(
        &self,
        unit: &mut dyn LedgerUnit,
        order_id: i64,
        showing_id: i64,
        seat_ids: &[i64],
    ) -> Result<Vec<SeatReservation>, BookingError> {
        validate_selection(seat_ids)?;
        let mut ordered = seat_ids.to_vec();
        ordered.sort_unstable();
        let reservations = unit
            .insert_reservations(order_id, showing_id, &ordered)
            .await
            .map_err(BookingError::Store)?;
        Ok(reservations)
    }
}

impl std::fmt::Debug for SeatLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeatLedger").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_is_invalid() {
        assert!(matches!(
            validate_selection(&[]),
            Err(BookingError::InvalidInput(_))
        ));
    }

    #[test]
    fn duplicate_selection_names_the_duplicates() {
        let err = validate_selection(&[4, 1, 4, 2, 1, 4]).unwrap_err();
        match err {
            BookingError::InvalidInput(msg) => assert_eq!(msg, "duplicate seat ids: [1, 4]"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn distinct_selection_is_valid() {
        assert!(validate_selection(&[3, 1, 2]).is_ok());
    }
}
