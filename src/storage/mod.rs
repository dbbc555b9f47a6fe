//! Storage layer.
//!
//! [`Storage`] is the contract every backend implements: lookups, listings and
//! create/update/delete for users, categories, products and customer requests.
//! Three backends are available:
//!
//! - [`MemoryStorage`]: ordered maps behind a lock, lost on restart
//! - [`FileStorage`]: one JSON document read on every call and rewritten on every mutation
//! - [`PgStorage`]: PostgreSQL through an sqlx pool
//!
//! Ids come from per-entity counters and are never reused. Listings are in
//! ascending id order. None of the backends offer transactions across entities.

pub mod document;
pub mod file;
pub mod memory;
pub mod postgres;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::models::{
    Category, CategoryPatch, CustomerRequest, NewCategory, NewCustomerRequest, NewProduct,
    NewUser, Product, ProductPatch, User,
};

pub use document::StorageDocument;
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use postgres::PgStorage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage document {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize storage document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("username {0:?} is already taken")]
    DuplicateUsername(String),

    #[error("no {0} ids left")]
    IdsExhausted(&'static str),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Short backend name used in logs.
    fn backend(&self) -> &'static str;

    // Users
    async fn get_user(&self, id: i32) -> Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn create_user(&self, user: NewUser) -> Result<User>;

    // Categories
    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn get_category(&self, id: i32) -> Result<Option<Category>>;
    async fn create_category(&self, category: NewCategory) -> Result<Category>;
    async fn update_category(&self, id: i32, patch: CategoryPatch) -> Result<Option<Category>>;
    async fn delete_category(&self, id: i32) -> Result<bool>;

    // Products
    async fn list_products(&self) -> Result<Vec<Product>>;
    async fn get_product(&self, id: i32) -> Result<Option<Product>>;
    async fn products_by_category(&self, category_id: i32) -> Result<Vec<Product>>;
    async fn search_products(&self, query: &str) -> Result<Vec<Product>>;
    async fn create_product(&self, product: NewProduct) -> Result<Product>;
    async fn update_product(&self, id: i32, patch: ProductPatch) -> Result<Option<Product>>;
    async fn delete_product(&self, id: i32) -> Result<bool>;

    // Customer requests
    async fn create_request(&self, request: NewCustomerRequest) -> Result<CustomerRequest>;
    async fn list_requests(&self) -> Result<Vec<CustomerRequest>>;
}

/// Makes sure the admin account exists. An existing account is left as is.
pub async fn ensure_admin(storage: &dyn Storage, username: &str, password: &str) -> Result<User> {
    if let Some(user) = storage.get_user_by_username(username).await? {
        return Ok(user);
    }

    let user = storage
        .create_user(NewUser {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await?;
    info!("Created admin user {:?} with id {}", user.username, user.id);
    Ok(user)
}
