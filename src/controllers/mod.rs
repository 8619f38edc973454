pub mod cinemas;
pub mod orders;

use axum::Router;
use std::sync::Arc;

use crate::error::BookingError;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(cinemas::routes())
        .merge(orders::routes())
}

/// Path ids must be positive integers; anything else is a 400.
pub(crate) fn parse_id(raw: &str, name: &str) -> Result<i64, BookingError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| BookingError::InvalidInput(format!("Invalid {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_accepts_positive_integers_only() {
        assert_eq!(parse_id("12", "id").unwrap(), 12);
        assert!(parse_id("0", "id").is_err());
        assert!(parse_id("-3", "id").is_err());
        assert!(parse_id("abc", "id").is_err());
    }
}
