use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use super::parse_id;
use crate::error::BookingError;
use crate::middleware::{AuthError, AuthUser};
use crate::models::OrderRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/history/{user_id}", get(get_order_history))
}

// POST /orders
async fn create_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<OrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, BookingError> {
    let Json(req) = body.map_err(|e| BookingError::InvalidInput(e.body_text()))?;

    let order = state.orders.place_order(user.user_id, req).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Order created successfully",
        "order": order,
    })))
}

// GET /orders/history/{user_id}
async fn get_order_history(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(user_id): Path<String>,
) -> Result<axum::response::Response, BookingError> {
    let user_id = parse_id(&user_id, "user id")?;
    if !user.may_access(user_id) {
        return Ok(AuthError::Forbidden.into_response());
    }

    let history = state.orders.order_history(user_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Order history retrieved successfully",
        "data": history,
    }))
    .into_response())
}
