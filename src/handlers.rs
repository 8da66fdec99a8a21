use crate::errors::AppError;
use crate::models::{
    Avatar, CreateRoomRequest, Dashboard, DeviceId, DeviceResponse, JoinRequest, PeriodResponse,
    RoomResponse, ToggleRequest, ToggleResponse,
};
use crate::period::{format_date_key, parse_date_key};
use crate::state::{AppState, DeviceSession};
use crate::ui::render_index;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html,
    },
    Json,
};
use futures_util::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_index(&state.period))
}

pub async fn get_period(State(state): State<AppState>) -> Json<PeriodResponse> {
    let period = state.period;
    Json(PeriodResponse {
        label: period.label(),
        start: format_date_key(period.start()),
        end_exclusive: format_date_key(period.end_exclusive()),
        days: period.days().into_iter().map(format_date_key).collect(),
        avatars: Avatar::ALL.to_vec(),
    })
}

pub async fn register_device(State(state): State<AppState>) -> (StatusCode, Json<DeviceResponse>) {
    let device_id = Uuid::new_v4();
    state.register(device_id).await;
    (StatusCode::CREATED, Json(DeviceResponse { device_id }))
}

async fn known_device(state: &AppState, device_id: DeviceId) -> Result<Arc<DeviceSession>, AppError> {
    state
        .session(device_id)
        .await
        .ok_or_else(|| AppError::not_found(format!("unknown device {device_id}")))
}

pub async fn get_dashboard(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
) -> Result<Json<Dashboard>, AppError> {
    let device = known_device(&state, device_id).await?;
    let dashboard = device.session.lock().await.dashboard().await;
    Ok(Json(dashboard))
}

/// Server-sent events carrying every dashboard rendered for the device.
pub async fn dashboard_events(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let device = known_device(&state, device_id).await?;
    let frames = device.dashboards.clone();
    let closing = state.closing();

    let stream = stream::unfold(
        (frames, closing, true),
        |(mut frames, mut closing, first)| async move {
            if !first {
                let open = tokio::select! {
                    changed = frames.changed() => changed.is_ok(),
                    _ = closing.wait_for(|closed| *closed) => false,
                };
                if !open {
                    return None;
                }
            }
            let payload = serde_json::to_string(&*frames.borrow_and_update()).ok()?;
            let event = Event::default().event("dashboard").data(payload);
            Some((Ok::<_, Infallible>(event), (frames, closing, false)))
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn join_room(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    Json(payload): Json<JoinRequest>,
) -> Result<Json<RoomResponse>, AppError> {
    let device = known_device(&state, device_id).await?;
    let room = device
        .session
        .lock()
        .await
        .join_room(&payload.code, &payload.nickname, payload.avatar)
        .await?;

    Ok(Json(RoomResponse {
        room_id: room.id,
        code: room.code,
    }))
}

pub async fn create_room(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomResponse>), AppError> {
    let device = known_device(&state, device_id).await?;
    let room = device
        .session
        .lock()
        .await
        .create_room(payload.code.as_deref(), &payload.nickname, payload.avatar)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RoomResponse {
            room_id: room.id,
            code: room.code,
        }),
    ))
}

pub async fn leave_room(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
) -> Result<StatusCode, AppError> {
    let device = known_device(&state, device_id).await?;
    device.session.lock().await.leave_room().await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    Json(payload): Json<ToggleRequest>,
) -> Result<Json<ToggleResponse>, AppError> {
    let day = parse_date_key(&payload.day)
        .ok_or_else(|| AppError::bad_request("day must be YYYY-MM-DD"))?;

    let device = known_device(&state, device_id).await?;
    let done = device.session.lock().await.toggle(day).await?;

    Ok(Json(ToggleResponse {
        day: format_date_key(day),
        done,
    }))
}
