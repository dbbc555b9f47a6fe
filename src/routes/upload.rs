use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use super::AppMultipart;
use crate::auth::RequireAdmin;
use crate::error::AppError;
use crate::images::UploadError;
use crate::state::AppState;

/// Multipart form field carrying the file.
const IMAGE_FIELD: &str = "image";

pub async fn upload_image(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    AppMultipart(mut multipart): AppMultipart,
) -> Result<Json<Value>, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        // Reject by type before reading the body
        let content_type = field.content_type().map(str::to_string);
        state.images.check_content_type(content_type.as_deref())?;

        let bytes = field.bytes().await?;
        let stored = state.images.ingest(content_type.as_deref(), bytes).await?;

        return Ok(Json(json!({
            "url": stored.url,
            "imagePath": stored.url
        })));
    }

    Err(UploadError::MissingFile.into())
}
