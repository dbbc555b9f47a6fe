pub mod auth;
pub mod categories;
pub mod products;
pub mod requests;
pub mod upload;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Multipart, Request},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::auth::session_layer;
use crate::error::AppError;
use crate::images::UPLOAD_URL_PREFIX;
use crate::state::AppState;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// JSON body extractor whose rejection is an [`AppError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Query string extractor whose rejection is an [`AppError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

/// Path parameter extractor whose rejection is an [`AppError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

/// Multipart extractor whose rejection is an [`AppError`].
pub struct AppMultipart(pub Multipart);

#[async_trait]
impl<S> FromRequest<S> for AppMultipart
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(Multipart::from_request(req, state).await?))
    }
}

/// Parses an entity id from the path.
pub(crate) fn parse_id(raw: &str) -> Result<i32, AppError> {
    raw.parse()
        .map_err(|_| AppError::validation(format!("Invalid id: {raw}")))
}

async fn api_not_found() -> AppError {
    AppError::NotFound("Endpoint")
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.images.max_upload_bytes() + MULTIPART_OVERHEAD;

    let api = Router::new()
        // Auth
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/status", get(auth::status))
        // Catalog
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/categories/:id",
            get(categories::get_category)
                .put(categories::update_category)
                .delete(categories::delete_category),
        )
        .route(
            "/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        // Customer requests
        .route(
            "/requests",
            get(requests::list_requests).post(requests::create_request),
        )
        // Images
        .route(
            "/upload/image",
            post(upload::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .fallback(api_not_found);

    // Built frontend, with index.html for client-side routes
    let static_dir = state.config.static_dir.clone();
    let frontend =
        ServeDir::new(&static_dir).not_found_service(ServeFile::new(static_dir.join("index.html")));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let session = session_layer(&state.config);
    let uploads = ServeDir::new(state.images.upload_dir());

    Router::new()
        .nest("/api", api)
        .nest_service(UPLOAD_URL_PREFIX, uploads)
        .fallback_service(frontend)
        .layer(session)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::router;
    use crate::config::Config;
    use crate::state::AppState;
    use crate::storage::{ensure_admin, MemoryStorage, StorageDocument};
    use crate::telegram::TelegramNotifier;

    pub(crate) struct TestApp {
        pub app: Router,
        pub state: AppState,
        pub dir: TempDir,
    }

    pub(crate) async fn app() -> TestApp {
        app_with(|_| {}, None).await
    }

    /// Like [`app`], with the config adjusted and an optional notifier.
    pub(crate) async fn app_with(
        configure: impl FnOnce(&mut Config),
        notifier: Option<TelegramNotifier>,
    ) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(MemoryStorage::from_document(StorageDocument::initial()));
        ensure_admin(storage.as_ref(), "admin", "admin123")
            .await
            .unwrap();
        let mut config = Config::for_tests(dir.path());
        configure(&mut config);
        let state = AppState::with_storage(config, storage, notifier);
        TestApp {
            app: router(state.clone()),
            state,
            dir,
        }
    }

    pub(crate) struct Reply {
        pub status: StatusCode,
        pub cookie: Option<String>,
        pub body: Value,
    }

    pub(crate) async fn send(app: &Router, request: Request<Body>) -> Reply {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        Reply {
            status,
            cookie,
            body,
        }
    }

    pub(crate) fn json_request(
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    /// Logs in as the seeded admin and returns the session cookie.
    pub(crate) async fn login(app: &Router) -> String {
        let reply = send(
            app,
            json_request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(serde_json::json!({"username": "admin", "password": "admin123"})),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.cookie.expect("login sets a session cookie")
    }
}
