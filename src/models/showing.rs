use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A scheduled screening: one movie, one cinema, one location, one slot.
///
/// Read-only for the booking core. Only the identifiers needed to resolve
/// the seat map are carried here.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Showing {
    pub id: i64,
    pub cinema_id: i64,
}
