use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::document::{take, Counters};
use super::{Result, Storage, StorageDocument, StorageError};
use crate::models::{
    Category, CategoryPatch, CustomerRequest, NewCategory, NewCustomerRequest, NewProduct,
    NewUser, Product, ProductPatch, User,
};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    categories: BTreeMap<i32, Category>,
    products: BTreeMap<i32, Product>,
    requests: BTreeMap<i32, CustomerRequest>,
    counters: Counters,
}

/// Volatile backend: ordered maps keyed by id. Everything is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    /// Starts from the rows and counters of an existing document.
    pub fn from_document(mut document: StorageDocument) -> Self {
        document.repair_counters();
        let tables = Tables {
            users: document.users.into_iter().map(|u| (u.id, u)).collect(),
            categories: document.categories.into_iter().map(|c| (c.id, c)).collect(),
            products: document.products.into_iter().map(|p| (p.id, p)).collect(),
            requests: document.requests.into_iter().map(|r| (r.id, r)).collect(),
            counters: document.counters,
        };
        Self {
            tables: RwLock::new(tables),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get_user(&self, id: i32) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StorageError::DuplicateUsername(user.username));
        }
        let user = User {
            id: take(&mut tables.counters.user_id, "user")?,
            username: user.username,
            password: user.password,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.tables.read().await.categories.values().cloned().collect())
    }

    async fn get_category(&self, id: i32) -> Result<Option<Category>> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category> {
        let mut tables = self.tables.write().await;
        let category = category.into_category(take(&mut tables.counters.category_id, "category")?);
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, id: i32, patch: CategoryPatch) -> Result<Option<Category>> {
        let mut tables = self.tables.write().await;
        Ok(tables.categories.get_mut(&id).map(|category| {
            patch.apply(category);
            category.clone()
        }))
    }

    async fn delete_category(&self, id: i32) -> Result<bool> {
        Ok(self.tables.write().await.categories.remove(&id).is_some())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.tables.read().await.products.values().cloned().collect())
    }

    async fn get_product(&self, id: i32) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn products_by_category(&self, category_id: i32) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .values()
            .filter(|p| p.category_id == Some(category_id))
            .cloned()
            .collect())
    }

    async fn search_products(&self, query: &str) -> Result<Vec<Product>> {
        let needle = query.to_lowercase();
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .values()
            .filter(|p| p.matches(&needle))
            .cloned()
            .collect())
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let mut tables = self.tables.write().await;
        let product = product.into_product(take(&mut tables.counters.product_id, "product")?);
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: i32, patch: ProductPatch) -> Result<Option<Product>> {
        let mut tables = self.tables.write().await;
        Ok(tables.products.get_mut(&id).map(|product| {
            patch.apply(product);
            product.clone()
        }))
    }

    async fn delete_product(&self, id: i32) -> Result<bool> {
        Ok(self.tables.write().await.products.remove(&id).is_some())
    }

    async fn create_request(&self, request: NewCustomerRequest) -> Result<CustomerRequest> {
        let mut tables = self.tables.write().await;
        let id = take(&mut tables.counters.request_id, "request")?;
        let request = request.into_request(id, Utc::now());
        tables.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn list_requests(&self) -> Result<Vec<CustomerRequest>> {
        Ok(self.tables.read().await.requests.values().cloned().collect())
    }
}
