use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use super::parse_id;
use crate::error::BookingError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cinemas/available-seats/{showing_id}", get(get_booked_seats))
        .route("/cinemas/free-seats/{showing_id}", get(get_free_seats))
}

// GET /cinemas/available-seats/{showing_id}
// Lists the seats already booked for the showing.
async fn get_booked_seats(
    State(state): State<Arc<AppState>>,
    Path(showing_id): Path<String>,
) -> Result<impl IntoResponse, BookingError> {
    let showing_id = parse_id(&showing_id, "cinemas_schedule_id")?;
    let seats = state.availability.booked_seats(showing_id).await?;

    if seats.is_empty() {
        return Ok(Json(json!({
            "success": true,
            "message": "All seats are available",
            "data": [],
        })));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Booked seats retrieved successfully",
        "data": seats,
    })))
}

// GET /cinemas/free-seats/{showing_id}
async fn get_free_seats(
    State(state): State<Arc<AppState>>,
    Path(showing_id): Path<String>,
) -> Result<impl IntoResponse, BookingError> {
    let showing_id = parse_id(&showing_id, "cinemas_schedule_id")?;
    let seats = state.availability.available_seats(showing_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Available seats retrieved successfully",
        "data": seats,
    })))
}
