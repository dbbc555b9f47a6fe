use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use tracing::info;

use super::{parse_id, AppJson, AppPath};
use crate::auth::RequireAdmin;
use crate::error::AppError;
use crate::models::{Category, CategoryPatch, NewCategory};
use crate::state::AppState;

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(state.storage.list_categories().await?))
}

pub async fn get_category(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<Json<Category>, AppError> {
    let id = parse_id(&id)?;
    state
        .storage
        .get_category(id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Category"))
}

pub async fn create_category(
    admin: RequireAdmin,
    State(state): State<AppState>,
    AppJson(payload): AppJson<NewCategory>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let payload = payload.validated()?;
    let category = state.storage.create_category(payload).await?;
    info!(
        "User {} created category {} ({})",
        admin.user_id, category.id, category.name_ru
    );
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    admin: RequireAdmin,
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(payload): AppJson<CategoryPatch>,
) -> Result<Json<Category>, AppError> {
    let id = parse_id(&id)?;
    let patch = payload.validated()?;
    let category = state
        .storage
        .update_category(id, patch)
        .await?
        .ok_or(AppError::NotFound("Category"))?;
    info!("User {} updated category {}", admin.user_id, category.id);
    Ok(Json(category))
}

pub async fn delete_category(
    admin: RequireAdmin,
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    if !state.storage.delete_category(id).await? {
        return Err(AppError::NotFound("Category"));
    }
    info!("User {} deleted category {id}", admin.user_id);
    Ok(StatusCode::NO_CONTENT)
}
