use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use tower_sessions::Session;
use tracing::{info, warn};

use super::AppJson;
use crate::auth::{current_user_id, sign_in, sign_out};
use crate::error::AppError;
use crate::models::user::{LoginRequest, UserResponse};
use crate::state::AppState;

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    // Validate input
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("Username and password are required"));
    }

    let user = state
        .storage
        .get_user_by_username(payload.username.trim())
        .await?;

    // Unknown user and wrong password look the same to the caller
    let user = match user {
        Some(user) if user.password_matches(&payload.password) => user,
        _ => {
            warn!("Failed login attempt for {:?}", payload.username);
            return Err(AppError::InvalidCredentials);
        }
    };

    sign_in(&session, &user).await?;
    info!("User {} signed in", user.username);

    Ok(Json(json!({
        "user": UserResponse::from(&user)
    })))
}

pub async fn logout(session: Session) -> Result<Json<Value>, AppError> {
    sign_out(&session).await?;
    Ok(Json(json!({
        "message": "Logged out successfully"
    })))
}

pub async fn status(session: Session) -> Result<Json<Value>, AppError> {
    let body = match current_user_id(&session).await? {
        Some(user_id) => json!({
            "isAuthenticated": true,
            "userId": user_id
        }),
        None => json!({
            "isAuthenticated": false
        }),
    };
    Ok(Json(body))
}
