use axum::{extract::State, http::StatusCode, response::Json};
use tracing::info;

use super::AppJson;
use crate::auth::RequireAdmin;
use crate::error::AppError;
use crate::models::{CustomerRequest, NewCustomerRequest};
use crate::state::AppState;

/// Stores a contact request from the public site and relays it to Telegram.
///
/// The notification runs in the background; its outcome never changes the
/// response.
pub async fn create_request(
    State(state): State<AppState>,
    AppJson(payload): AppJson<NewCustomerRequest>,
) -> Result<(StatusCode, Json<CustomerRequest>), AppError> {
    let payload = payload.validated()?;
    let request = state.storage.create_request(payload).await?;
    info!("Received customer request {}", request.id);

    if let Some(notifier) = &state.notifier {
        notifier.spawn_send(request.clone());
    }

    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_requests(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<CustomerRequest>>, AppError> {
    Ok(Json(state.storage.list_requests().await?))
}
