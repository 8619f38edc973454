use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure reported by a ledger store.
///
/// A uniqueness violation is kept distinct from other backend failures: it is
/// the storage-level signal that a seat was booked concurrently. Only the
/// order placement protocol turns it into a conflict.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The booked-seat constraint rejected a write. Carries the contested
    /// seat ids when the store can tell which ones they are.
    #[error("seat already booked for showing")]
    UniqueViolation(Vec<i64>),
    /// A referenced row (user, payment method, showing, seat) does not exist.
    #[error("referenced row does not exist: {0}")]
    ForeignKeyViolation(String),
    #[error("store error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation(Vec::new());
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::ForeignKeyViolation(
                    db_err.constraint().unwrap_or("unknown").to_string(),
                );
            }
        }
        StoreError::Backend(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("One or more seats are already booked")]
    Conflict { seat_ids: Vec<i64> },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BookingError {
    pub fn status(&self) -> StatusCode {
        match self {
            BookingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::Conflict { .. } => StatusCode::CONFLICT,
            BookingError::Store(_) | BookingError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            BookingError::Conflict { seat_ids } => json!({
                "success": false,
                "error": self.to_string(),
                "conflicting_seats": seat_ids,
            }),
            BookingError::Store(_) | BookingError::Internal(_) => {
                tracing::error!("request failed: {}", self);
                json!({
                    "success": false,
                    "error": "Internal server error",
                })
            }
            _ => json!({
                "success": false,
                "error": self.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}
