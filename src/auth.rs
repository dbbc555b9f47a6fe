//! Session-cookie authentication for the admin back-office.
//!
//! A successful login stores the user id and an authenticated flag in the
//! server-side session. [`RequireAdmin`] guards handlers that need it.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use time::Duration;
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};
use tracing::debug;

use crate::config::Config;
use crate::error::AppError;
use crate::models::User;

const USER_ID_KEY: &str = "user_id";
const AUTHENTICATED_KEY: &str = "is_authenticated";

pub fn session_layer(config: &Config) -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.session_secure)
        .with_http_only(true)
        .with_expiry(Expiry::OnInactivity(Duration::hours(config.session_ttl_hours)))
}

/// Marks the session as belonging to `user`. The session id is rotated first.
pub async fn sign_in(session: &Session, user: &User) -> Result<(), AppError> {
    session.cycle_id().await?;
    session.insert(USER_ID_KEY, user.id).await?;
    session.insert(AUTHENTICATED_KEY, true).await?;
    Ok(())
}

pub async fn sign_out(session: &Session) -> Result<(), AppError> {
    session.flush().await?;
    Ok(())
}

/// Id of the signed-in user, if the session is authenticated.
pub async fn current_user_id(session: &Session) -> Result<Option<i32>, AppError> {
    let authenticated = session
        .get::<bool>(AUTHENTICATED_KEY)
        .await?
        .unwrap_or(false);
    if !authenticated {
        return Ok(None);
    }
    Ok(session.get::<i32>(USER_ID_KEY).await?)
}

/// Extractor that rejects the request with 401 unless an admin is signed in.
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin {
    pub user_id: i32,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, message)| AppError::internal(message))?;

        match current_user_id(&session).await? {
            Some(user_id) => Ok(Self { user_id }),
            None => {
                debug!("Rejected unauthenticated request to {}", parts.uri.path());
                Err(AppError::Unauthorized)
            }
        }
    }
}
