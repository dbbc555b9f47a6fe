use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing::{debug, info};

use super::{parse_id, AppJson, AppPath, AppQuery};
use crate::auth::RequireAdmin;
use crate::error::AppError;
use crate::models::{NewProduct, Product, ProductPatch};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<String>,
}

/// Lists products. A non-empty `search` wins over `category`.
pub async fn list_products(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ProductQuery>,
) -> Result<Json<Vec<Product>>, AppError> {
    let search = query.search.as_deref().filter(|s| !s.is_empty());

    let products = match (search, query.category.as_deref()) {
        (Some(search), _) => {
            debug!("Searching products for {search:?}");
            state.storage.search_products(search).await?
        }
        (None, Some(category)) if !category.trim().is_empty() => {
            let category_id = category.trim().parse().map_err(|_| {
                AppError::validation(format!("Invalid category: {category}"))
            })?;
            state.storage.products_by_category(category_id).await?
        }
        _ => state.storage.list_products().await?,
    };

    Ok(Json(products))
}

pub async fn get_product(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<Json<Product>, AppError> {
    let id = parse_id(&id)?;
    state
        .storage
        .get_product(id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Product"))
}

pub async fn create_product(
    admin: RequireAdmin,
    State(state): State<AppState>,
    AppJson(payload): AppJson<NewProduct>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let payload = payload.validated()?;
    let product = state.storage.create_product(payload).await?;
    info!(
        "User {} created product {} ({})",
        admin.user_id, product.id, product.name_ru
    );
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    admin: RequireAdmin,
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(payload): AppJson<ProductPatch>,
) -> Result<Json<Product>, AppError> {
    let id = parse_id(&id)?;
    let patch = payload.validated()?;
    let product = state
        .storage
        .update_product(id, patch)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    info!("User {} updated product {}", admin.user_id, product.id);
    Ok(Json(product))
}

pub async fn delete_product(
    admin: RequireAdmin,
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    if !state.storage.delete_product(id).await? {
        return Err(AppError::NotFound("Product"));
    }
    info!("User {} deleted product {id}", admin.user_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    use crate::routes::test_support::{app, json_request, login, send};

    fn profnastil() -> Value {
        json!({
            "name_ru": "Профнастил С8",
            "name_kz": "С8 профнастил",
            "price": "1850.50",
            "unit_ru": "лист",
            "unit_kz": "парақ",
            "category_id": 1,
            "in_stock": false
        })
    }

    fn ids(body: &Value) -> Vec<i64> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn create_then_filter_by_category_and_search() {
        let test = app().await;
        let cookie = login(&test.app).await;

        let created = send(
            &test.app,
            json_request(Method::POST, "/api/products", Some(&cookie), Some(profnastil())),
        )
        .await;
        assert_eq!(created.status, StatusCode::CREATED);
        assert_eq!(created.body["id"], 2);
        assert_eq!(created.body["price"], "1850.50");
        assert_eq!(created.body["in_stock"], false);

        let all = send(&test.app, json_request(Method::GET, "/api/products", None, None)).await;
        assert_eq!(ids(&all.body), vec![1, 2]);

        let by_category = send(
            &test.app,
            json_request(Method::GET, "/api/products?category=2", None, None),
        )
        .await;
        assert!(ids(&by_category.body).is_empty());

        let search = send(
            &test.app,
            json_request(
                Method::GET,
                "/api/products?search=%D0%9F%D0%A0%D0%9E%D0%A4&category=2",
                None,
                None,
            ),
        )
        .await;
        assert_eq!(search.status, StatusCode::OK);
        assert_eq!(ids(&search.body), vec![2]);
    }

    #[tokio::test]
    async fn non_numeric_category_is_a_bad_request() {
        let test = app().await;
        let reply = send(
            &test.app,
            json_request(Method::GET, "/api/products?category=roof", None, None),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn whitespace_search_is_still_a_search() {
        let test = app().await;
        let cookie = login(&test.app).await;
        send(
            &test.app,
            json_request(Method::POST, "/api/products", Some(&cookie), Some(profnastil())),
        )
        .await;

        let reply = send(
            &test.app,
            json_request(Method::GET, "/api/products?search=%20&category=2", None, None),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(ids(&reply.body), vec![1, 2]);

        let empty = send(
            &test.app,
            json_request(Method::GET, "/api/products?search=&category=2", None, None),
        )
        .await;
        assert!(ids(&empty.body).is_empty());
    }

    #[tokio::test]
    async fn malformed_query_and_path_are_json_errors() {
        let test = app().await;

        let repeated = send(
            &test.app,
            json_request(Method::GET, "/api/products?search=a&search=b", None, None),
        )
        .await;
        assert_eq!(repeated.status, StatusCode::BAD_REQUEST);
        assert_eq!(repeated.body["status"], "error");
        assert!(repeated.body["message"].as_str().unwrap().starts_with("Invalid query"));

        let bad_utf8 = send(
            &test.app,
            json_request(Method::GET, "/api/products/%FF", None, None),
        )
        .await;
        assert_eq!(bad_utf8.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad_utf8.body["status"], "error");
        assert!(bad_utf8.body["message"].as_str().unwrap().starts_with("Invalid path"));
    }

    #[tokio::test]
    async fn invalid_price_is_rejected() {
        let test = app().await;
        let cookie = login(&test.app).await;

        let mut body = profnastil();
        body["price"] = json!("-5");
        let reply = send(
            &test.app,
            json_request(Method::POST, "/api/products", Some(&cookie), Some(body)),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let mut body = profnastil();
        body.as_object_mut().unwrap().remove("price");
        let reply = send(
            &test.app,
            json_request(Method::POST, "/api/products", Some(&cookie), Some(body)),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let test = app().await;
        let cookie = login(&test.app).await;

        let reply = send(
            &test.app,
            json_request(
                Method::PUT,
                "/api/products/1",
                Some(&cookie),
                Some(json!({"in_stock": false, "category_id": null})),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["in_stock"], false);
        assert!(reply.body["category_id"].is_null());
        assert_eq!(reply.body["name_ru"], "Металлочерепица Монтеррей");
        assert_eq!(reply.body["price"], "2500");
    }

    #[tokio::test]
    async fn mutations_require_a_session() {
        let test = app().await;
        let update = send(
            &test.app,
            json_request(Method::PUT, "/api/products/1", None, Some(json!({"in_stock": false}))),
        )
        .await;
        assert_eq!(update.status, StatusCode::UNAUTHORIZED);

        let delete = send(
            &test.app,
            json_request(Method::DELETE, "/api/products/1", None, None),
        )
        .await;
        assert_eq!(delete.status, StatusCode::UNAUTHORIZED);

        let product = test.state.storage.get_product(1).await.unwrap().unwrap();
        assert!(product.in_stock);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let test = app().await;
        let cookie = login(&test.app).await;

        let deleted = send(
            &test.app,
            json_request(Method::DELETE, "/api/products/1", Some(&cookie), None),
        )
        .await;
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);

        let reply = send(&test.app, json_request(Method::GET, "/api/products/1", None, None)).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body["message"], "Product not found");
    }
}
