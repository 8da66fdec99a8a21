use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/period", get(handlers::get_period))
        .route("/api/devices", post(handlers::register_device))
        .route("/api/devices/:device/dashboard", get(handlers::get_dashboard))
        .route("/api/devices/:device/events", get(handlers::dashboard_events))
        .route("/api/devices/:device/join", post(handlers::join_room))
        .route("/api/devices/:device/rooms", post(handlers::create_room))
        .route("/api/devices/:device/leave", post(handlers::leave_room))
        .route("/api/devices/:device/toggle", post(handlers::toggle))
        .with_state(state)
}
