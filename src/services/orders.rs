use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{BookingError, StoreError};
use crate::ledger::{validate_selection, LedgerUnit, SeatLedger};
use crate::models::{NewOrder, Order, OrderHistory, OrderRequest};
use crate::services::AvailabilityQuery;

/// Where a placement attempt currently is. Logged, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStage {
    Requested,
    Validating,
    Committed,
    Rejected,
}

/// Order placement and order history.
#[derive(Clone)]
pub struct OrderService {
    ledger: SeatLedger,
    availability: AvailabilityQuery,
    timeout: Duration,
}

impl OrderService {
    pub fn new(ledger: SeatLedger, availability: AvailabilityQuery, timeout: Duration) -> Self {
        Self {
            ledger,
            availability,
            timeout,
        }
    }

    /// Places an order and books every requested seat, or books nothing.
    ///
    /// The order row and all reservations are written in one ledger unit.
    /// Availability is re-checked inside that unit, and the store's
    /// booked-seat constraint catches any booking that commits in between.
    /// Either way the loser gets `Conflict` naming the contested seats.
    pub async fn place_order(&self, user_id: i64, req: OrderRequest) -> Result<Order, BookingError> {
        let showing_id = req.showing_id;
        debug!(stage = ?PlacementStage::Requested, user_id, showing_id, "placing order");

        let mut seat_ids = match validate_request(&req) {
            Ok(ids) => ids,
            Err(e) => {
                debug!(stage = ?PlacementStage::Rejected, showing_id, "invalid order: {}", e);
                return Err(e);
            }
        };
        // One lock order for every writer: concurrent orders sharing seats
        // cannot deadlock on the booked-seat index.
        seat_ids.sort_unstable();

        let new_order = NewOrder {
            qr_code: generate_qr_code(),
            is_paid: req.is_paid,
            is_active: req.is_active,
            total_price: req.total_price,
            user_id,
            showing_id,
            payment_method_id: req.payment_method_id,
        };

        // Dropping the unit on timeout rolls it back.
        let outcome = match tokio::time::timeout(self.timeout, self.run_unit(&new_order, &seat_ids)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("order placement for showing {} timed out after {:?}", showing_id, self.timeout);
                Err(BookingError::Internal("order placement timed out".to_string()))
            }
        };

        match outcome {
            Ok(order) => {
                info!(
                    stage = ?PlacementStage::Committed,
                    order_id = order.id,
                    showing_id,
                    "order committed with {} seats",
                    order.seats.len()
                );
                self.availability.invalidate(showing_id).await;
                Ok(order)
            }
            Err(BookingError::Store(StoreError::ForeignKeyViolation(constraint))) => {
                debug!(stage = ?PlacementStage::Rejected, showing_id, "dangling reference: {}", constraint);
                Err(BookingError::InvalidInput(
                    "Unknown user or payment method".to_string(),
                ))
            }
            Err(BookingError::Store(StoreError::UniqueViolation(contested))) => {
                let seat_ids = self.contested_seats(showing_id, &seat_ids, contested).await;
                debug!(stage = ?PlacementStage::Rejected, showing_id, "lost race for seats {:?}", seat_ids);
                Err(BookingError::Conflict { seat_ids })
            }
            Err(e) => {
                debug!(stage = ?PlacementStage::Rejected, showing_id, "order rejected: {}", e);
                Err(e)
            }
        }
    }

    /// Orders of a user, oldest first. An empty history is `NotFound`.
    pub async fn order_history(&self, user_id: i64) -> Result<Vec<OrderHistory>, BookingError> {
        if user_id <= 0 {
            return Err(BookingError::InvalidInput("Invalid user id".to_string()));
        }
        let history = self.ledger.store().order_history(user_id).await?;
        if history.is_empty() {
            return Err(BookingError::NotFound("Order history not found".to_string()));
        }
        Ok(history)
    }

    async fn run_unit(&self, new_order: &NewOrder, seat_ids: &[i64]) -> Result<Order, BookingError> {
        let mut unit = self.ledger.store().begin().await?;

        let written = self.write_order(unit.as_mut(), new_order, seat_ids).await;
        match written {
            Ok(order) => {
                unit.commit().await?;
                Ok(order)
            }
            Err(e) => {
                if let Err(rb) = unit.rollback().await {
                    warn!("rollback failed: {}", rb);
                }
                Err(e)
            }
        }
    }

    async fn write_order(
        &self,
        unit: &mut dyn LedgerUnit,
        new_order: &NewOrder,
        seat_ids: &[i64],
    ) -> Result<Order, BookingError> {
        debug!(stage = ?PlacementStage::Validating, showing_id = new_order.showing_id);

        let showing = unit
            .showing(new_order.showing_id)
            .await?
            .ok_or_else(|| BookingError::NotFound("Cinema schedule not found".to_string()))?;

        let unknown = unit.unknown_seats(showing.cinema_id, seat_ids).await?;
        if !unknown.is_empty() {
            return Err(BookingError::InvalidInput(format!(
                "seats {:?} do not exist for cinema schedule {}",
                unknown, showing.id
            )));
        }

        let taken = self.ledger.booked_in_unit(unit, showing.id, seat_ids).await?;
        if !taken.is_empty() {
            return Err(BookingError::Conflict { seat_ids: taken });
        }

        let mut order = unit.insert_order(new_order).await?;
        order.seats = self.ledger.reserve(unit, order.id, showing.id, seat_ids).await?;
        Ok(order)
    }

    /// Names the seats behind a uniqueness violation. Postgres does not say
    /// which row collided, so the booked subset is re-read after the fact.
    async fn contested_seats(&self, showing_id: i64, requested: &[i64], reported: Vec<i64>) -> Vec<i64> {
        if !reported.is_empty() {
            return reported;
        }
        match self.ledger.store().booked_among(showing_id, requested).await {
            Ok(booked) if !booked.is_empty() => booked,
            Ok(_) => requested.to_vec(),
            Err(e) => {
                warn!("could not re-read contested seats for showing {}: {}", showing_id, e);
                requested.to_vec()
            }
        }
    }
}

fn validate_request(req: &OrderRequest) -> Result<Vec<i64>, BookingError> {
    req.validate()
        .map_err(|e| BookingError::InvalidInput(e.to_string()))?;

    if !req.total_price.is_finite() {
        return Err(BookingError::InvalidInput(
            "total_price must be a finite number".to_string(),
        ));
    }

    if let Some(seat) = req
        .seats
        .iter()
        .find(|s| s.status.as_deref().is_some_and(|st| st != "booked"))
    {
        return Err(BookingError::InvalidInput(format!(
            "unsupported status for seat {}",
            seat.seat_id
        )));
    }

    let seat_ids = req.seat_ids();
    validate_selection(&seat_ids)?;
    Ok(seat_ids)
}

/// `QR-` followed by 12 upper-case hex digits.
fn generate_qr_code() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("QR-{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSeatInput;

    fn request(seats: &[i64]) -> OrderRequest {
        OrderRequest {
            total_price: 90000.0,
            showing_id: 1,
            payment_method_id: 1,
            seats: seats
                .iter()
                .map(|&seat_id| OrderSeatInput {
                    seat_id,
                    status: None,
                })
                .collect(),
            is_paid: false,
            is_active: false,
        }
    }

    #[test]
    fn qr_codes_have_fixed_shape_and_differ() {
        let a = generate_qr_code();
        let b = generate_qr_code();
        assert_eq!(a.len(), 15);
        assert!(a.starts_with("QR-"));
        assert!(a[3..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn request_validation_returns_seat_ids_in_order() {
        assert_eq!(validate_request(&request(&[5, 2, 9])).unwrap(), vec![5, 2, 9]);
    }

    #[test]
    fn request_validation_rejects_duplicates() {
        assert!(matches!(
            validate_request(&request(&[1, 1])),
            Err(BookingError::InvalidInput(_))
        ));
    }

    #[test]
    fn request_validation_rejects_non_finite_price() {
        let mut req = request(&[1]);
        req.total_price = f64::INFINITY;
        assert!(matches!(
            validate_request(&req),
            Err(BookingError::InvalidInput(_))
        ));
    }

    #[test]
    fn request_validation_rejects_other_statuses() {
        let mut req = request(&[1, 2]);
        req.seats[1].status = Some("released".to_string());
        match validate_request(&req) {
            Err(BookingError::InvalidInput(msg)) => assert_eq!(msg, "unsupported status for seat 2"),
            other => panic!("unexpected result: {:?}", other),
        }

        req.seats[1].status = Some("booked".to_string());
        assert!(validate_request(&req).is_ok());
    }
}
