use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use tracing::{info, warn};

use crate::core::types::*;
use crate::core::AppState;
use crate::session::{MessagingIntent, OrderIntent, SessionError, SessionId, SessionIntent, SessionSnapshot};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn reject(status: StatusCode, err: &SessionError) -> ApiError {
    let body = ErrorResponse::new(err.to_string());
    let body = match err {
        SessionError::NotFound(_) => body.with_code("NOT_FOUND"),
        SessionError::InvalidOperation(_) => body.with_code("INVALID_OPERATION"),
        SessionError::InvalidIntent(_) => body.with_code("INVALID_REQUEST"),
        _ => body,
    };
    (status, Json(body))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let counts = state.manager.active_counts().await;
    Json(HealthResponse {
        success: true,
        message: "handoff server is running".to_string(),
        active_orders: counts.orders,
        active_messaging_sessions: counts.messaging,
    })
}

pub async fn start_order(
    State(state): State<AppState>,
    Json(request): Json<StartOrderRequest>,
) -> Json<StartOrderResponse> {
    let order = &state.settings.order;
    let intent = OrderIntent::normalized(
        request.delivery_address,
        request.item_preference,
        request.quantity,
        order,
    );
    info!(
        "order requested: {} x {:?}",
        intent.quantity, intent.item_preference
    );
    let session_id = state.manager.start(SessionIntent::Order(intent)).await;
    let seconds = order.cancel_window.as_secs();
    Json(StartOrderResponse {
        success: true,
        session_id,
        cancel_window_seconds: seconds,
        message: format!("Order initiated. Cancel within {} seconds.", seconds),
    })
}

pub async fn start_messaging(
    State(state): State<AppState>,
    Json(request): Json<StartMessagingRequest>,
) -> Result<Json<StartMessagingResponse>, ApiError> {
    let intent = MessagingIntent::new(
        request.search_term,
        request.target_count,
        &state.settings.messaging,
    )
    .map_err(|e| {
        warn!("messaging request rejected: {}", e);
        reject(StatusCode::BAD_REQUEST, &e)
    })?;

    let message = format!(
        "Messaging started for \"{}\" (target {} seller(s))",
        intent.search_term, intent.target_count
    );
    let target_count = intent.target_count;
    let session_id = state.manager.start(SessionIntent::Messaging(intent)).await;
    Ok(Json(StartMessagingResponse {
        success: true,
        session_id,
        target_count,
        message,
    }))
}

pub async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Json<SessionSnapshot> {
    Json(state.manager.status(id).await)
}

pub async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<CancelResponse>, ApiError> {
    match state.manager.cancel(id).await {
        Ok(()) => Ok(Json(CancelResponse {
            success: true,
            message: "Order cancelled successfully".to_string(),
        })),
        Err(e @ SessionError::NotFound(_)) => Err(reject(StatusCode::NOT_FOUND, &e)),
        Err(e) => Err(reject(StatusCode::CONFLICT, &e)),
    }
}
