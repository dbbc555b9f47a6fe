//! The JSON document persisted by [`FileStorage`](super::FileStorage).
//!
//! The layout is `{users, categories, products, requests, counters}` with
//! camelCase counter keys, so documents written by earlier deployments of
//! the storefront load unchanged.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{Result, StorageError};
use crate::models::{
    Category, CategoryPatch, CustomerRequest, NewCategory, NewCustomerRequest, NewProduct,
    NewUser, Price, Product, ProductPatch, User,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub user_id: i32,
    pub category_id: i32,
    pub product_id: i32,
    pub request_id: i32,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            user_id: 1,
            category_id: 1,
            product_id: 1,
            request_id: 1,
        }
    }
}

impl Counters {
    /// Moves every counter past the largest id already in use.
    ///
    /// Documents written without counters, or edited by hand, would otherwise
    /// hand out ids that already exist.
    pub fn raise_past(&mut self, document: &StorageDocument) {
        fn past(counter: &mut i32, ids: impl Iterator<Item = i32>) {
            if let Some(max) = ids.max() {
                *counter = (*counter).max(max.saturating_add(1));
            }
        }

        past(&mut self.user_id, document.users.iter().map(|u| u.id));
        past(&mut self.category_id, document.categories.iter().map(|c| c.id));
        past(&mut self.product_id, document.products.iter().map(|p| p.id));
        past(&mut self.request_id, document.requests.iter().map(|r| r.id));
    }
}

/// Hands out the current value and advances the counter.
///
/// `i32::MAX` itself is never handed out, so a counter that reached it
/// (or a document holding that id) stays exhausted.
pub(crate) fn take(counter: &mut i32, entity: &'static str) -> Result<i32> {
    let id = *counter;
    *counter = id
        .checked_add(1)
        .ok_or(StorageError::IdsExhausted(entity))?;
    Ok(id)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDocument {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub requests: Vec<CustomerRequest>,
    #[serde(default)]
    pub counters: Counters,
}

impl StorageDocument {
    /// Starter catalog written when no document exists yet.
    pub fn initial() -> Self {
        let categories = vec![
            Category {
                id: 1,
                name_ru: "Кровельные материалы".into(),
                name_kz: "Шатыр материалдары".into(),
                description_ru: Some(
                    "Металлочерепица, профнастил, ондулин и другие кровельные покрытия".into(),
                ),
                description_kz: Some(
                    "Металл плитка, профнастил, ондулин және басқа шатыр жабындары".into(),
                ),
                image_url: None,
            },
            Category {
                id: 2,
                name_ru: "Утеплители".into(),
                name_kz: "Жылу оқшаулағыштар".into(),
                description_ru: Some(
                    "Минеральная вата, пенопласт, пенополистирол для утепления зданий".into(),
                ),
                description_kz: Some(
                    "Минералды мақта, көбік, ғимараттарды жылытуға арналған көбікті полистирол"
                        .into(),
                ),
                image_url: None,
            },
        ];

        let products = vec![Product {
            id: 1,
            name_ru: "Металлочерепица Монтеррей".into(),
            name_kz: "Монтеррей металл плиткасы".into(),
            description_ru: Some(
                "Высококачественная металлочерепица с полимерным покрытием. Толщина 0.5мм, гарантия 15 лет."
                    .into(),
            ),
            description_kz: Some(
                "Полимерлі жабынды жоғары сапалы металл плитка. Қалыңдығы 0,5мм, кепілдік 15 жыл."
                    .into(),
            ),
            price: Price::from(2500u16),
            unit_ru: "м²".into(),
            unit_kz: "м²".into(),
            category_id: Some(1),
            image_url: None,
            in_stock: true,
        }];

        Self {
            users: Vec::new(),
            categories,
            products,
            requests: Vec::new(),
            counters: Counters {
                user_id: 1,
                category_id: 3,
                product_id: 2,
                request_id: 1,
            },
        }
    }

    pub fn user(&self, id: i32) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn user_by_username(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn insert_user(&mut self, user: NewUser) -> Result<User> {
        if self.user_by_username(&user.username).is_some() {
            return Err(StorageError::DuplicateUsername(user.username));
        }
        let user = User {
            id: take(&mut self.counters.user_id, "user")?,
            username: user.username,
            password: user.password,
        };
        self.users.push(user.clone());
        Ok(user)
    }

    pub fn category(&self, id: i32) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn insert_category(&mut self, category: NewCategory) -> Result<Category> {
        let category = category.into_category(take(&mut self.counters.category_id, "category")?);
        self.categories.push(category.clone());
        Ok(category)
    }

    pub fn update_category(&mut self, id: i32, patch: CategoryPatch) -> Option<Category> {
        let category = self.categories.iter_mut().find(|c| c.id == id)?;
        patch.apply(category);
        Some(category.clone())
    }

    pub fn remove_category(&mut self, id: i32) -> bool {
        let before = self.categories.len();
        self.categories.retain(|c| c.id != id);
        self.categories.len() < before
    }

    pub fn product(&self, id: i32) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn products_by_category(&self, category_id: i32) -> Vec<Product> {
        self.products
            .iter()
            .filter(|p| p.category_id == Some(category_id))
            .cloned()
            .collect()
    }

    pub fn search_products(&self, query: &str) -> Vec<Product> {
        let needle = query.to_lowercase();
        self.products
            .iter()
            .filter(|p| p.matches(&needle))
            .cloned()
            .collect()
    }

    pub fn insert_product(&mut self, product: NewProduct) -> Result<Product> {
        let product = product.into_product(take(&mut self.counters.product_id, "product")?);
        self.products.push(product.clone());
        Ok(product)
    }

    pub fn update_product(&mut self, id: i32, patch: ProductPatch) -> Option<Product> {
        let product = self.products.iter_mut().find(|p| p.id == id)?;
        patch.apply(product);
        Some(product.clone())
    }

    pub fn remove_product(&mut self, id: i32) -> bool {
        let before = self.products.len();
        self.products.retain(|p| p.id != id);
        self.products.len() < before
    }

    pub fn insert_request(&mut self, request: NewCustomerRequest) -> Result<CustomerRequest> {
        let id = take(&mut self.counters.request_id, "request")?;
        let request = request.into_request(id, Utc::now());
        self.requests.push(request.clone());
        Ok(request)
    }

    /// Brings the counters in line with the rows after loading.
    pub fn repair_counters(&mut self) {
        let mut counters = self.counters;
        counters.raise_past(self);
        self.counters = counters;
    }
}
