use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;

use mercado_types::api::{Principal, StatusMessage, UpdateNotificationRequest};
use mercado_types::models::Notification;

use crate::auth::AppState;
use crate::blocking;

async fn owned_notification(
    state: &AppState,
    notification_id: i64,
    principal: &Principal,
) -> Result<Notification, StatusCode> {
    let notification = blocking(state, move |db| db.get_notification(notification_id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    if notification.user_id != principal.id {
        warn!(
            "{} ({}) tried to touch notification {} of user {}",
            principal.email, principal.id, notification_id, notification.user_id
        );
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(notification)
}

/// Caller's notifications, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = principal.id;
    let notifications = blocking(&state, move |db| db.list_notifications(user_id)).await?;
    Ok(Json(notifications))
}

pub async fn update_notification(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(notification_id): Path<i64>,
    Json(req): Json<UpdateNotificationRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let mut notification = owned_notification(&state, notification_id, &principal).await?;

    let read = req.read;
    blocking(&state, move |db| db.set_notification_read(notification_id, read)).await?;
    notification.read = read;

    Ok(Json(notification))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(notification_id): Path<i64>,
) -> Result<impl IntoResponse, StatusCode> {
    owned_notification(&state, notification_id, &principal).await?;
    blocking(&state, move |db| db.delete_notification(notification_id)).await?;

    Ok(Json(StatusMessage {
        message: "Notification deleted".to_string(),
    }))
}
