use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::reservation::SeatReservation;

/// Body of `POST /orders`.
///
/// Field names of the older API (`cinemas_schedule_id`, `total_prices`) are
/// accepted as aliases.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrderRequest {
    #[serde(alias = "total_prices")]
    #[validate(range(exclusive_min = 0.0, message = "total_price must be positive"))]
    pub total_price: f64,
    #[serde(alias = "cinemas_schedule_id")]
    #[validate(range(min = 1, message = "showing_id must be positive"))]
    pub showing_id: i64,
    #[validate(range(min = 1, message = "payment_method_id must be positive"))]
    pub payment_method_id: i64,
    #[validate(length(min = 1, message = "at least one seat is required"), nested)]
    pub seats: Vec<OrderSeatInput>,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub is_active: bool,
}

impl OrderRequest {
    pub fn seat_ids(&self) -> Vec<i64> {
        self.seats.iter().map(|s| s.seat_id).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderSeatInput {
    #[validate(range(min = 1, message = "seat_id must be positive"))]
    pub seat_id: i64,
    /// Clients of the older API send `"booked"` here. Anything else is rejected.
    #[serde(default)]
    pub status: Option<String>,
}

/// Order row as written inside the placement unit.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub qr_code: String,
    pub is_paid: bool,
    pub is_active: bool,
    pub total_price: f64,
    pub user_id: i64,
    pub showing_id: i64,
    pub payment_method_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: i64,
    pub qr_code: String,
    pub is_paid: bool,
    pub is_active: bool,
    pub total_price: f64,
    pub user_id: i64,
    pub showing_id: i64,
    pub payment_method_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub seats: Vec<SeatReservation>,
}

/// Denormalised read model for `GET /orders/history/{user_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHistory {
    pub id: i64,
    pub is_active: bool,
    pub is_paid: bool,
    pub qr_code: String,
    pub total_price: f64,
    pub user_id: i64,
    pub virtual_account: Option<String>,
    pub title: Option<String>,
    pub age_rating: Option<String>,
    pub cinema: Option<String>,
    pub cinema_image: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub seat_numbers: Vec<String>,
    pub seat_types: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_legacy_field_names() {
        let req: OrderRequest = serde_json::from_value(serde_json::json!({
            "total_prices": 90000.0,
            "cinemas_schedule_id": 3,
            "payment_method_id": 2,
            "seats": [{"seat_id": 1, "status": "booked"}, {"seat_id": 2}]
        }))
        .unwrap();

        assert_eq!(req.showing_id, 3);
        assert_eq!(req.total_price, 90000.0);
        assert_eq!(req.seat_ids(), vec![1, 2]);
        assert!(!req.is_paid);
        assert!(!req.is_active);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn validation_rejects_empty_seats_and_bad_ids() {
        let req: OrderRequest = serde_json::from_value(serde_json::json!({
            "total_price": 10.0,
            "showing_id": 0,
            "payment_method_id": 1,
            "seats": []
        }))
        .unwrap();

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("showing_id"));
        assert!(fields.contains_key("seats"));
    }

    #[test]
    fn validation_rejects_non_positive_price_and_nested_seat_ids() {
        let req: OrderRequest = serde_json::from_value(serde_json::json!({
            "total_price": 0.0,
            "showing_id": 1,
            "payment_method_id": 1,
            "seats": [{"seat_id": -4}]
        }))
        .unwrap();

        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("total_price"));
        assert!(errors.errors().contains_key("seats"));
    }
}
