use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::{Result, Storage, StorageError};
use crate::database::{create_database_connection, run_migrations, Database};
use crate::models::{
    Category, CategoryPatch, CustomerRequest, NewCategory, NewCustomerRequest, NewProduct,
    NewUser, Product, ProductPatch, User,
};

// NUMERIC is read back as text so prices keep their string form.
const PRODUCT_COLUMNS: &str = "id, name_ru, name_kz, description_ru, description_kz, \
     price::text AS price, unit_ru, unit_kz, category_id, image_url, in_stock";

/// PostgreSQL backend. Schema comes from the embedded migrations.
#[derive(Debug, Clone)]
pub struct PgStorage {
    db: Database,
}

impl PgStorage {
    /// Connects to `database_url` and brings the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let db = create_database_connection(database_url, max_connections).await?;
        run_migrations(&db).await?;
        Ok(Self { db })
    }

    async fn write_category(&self, category: &Category) -> Result<Category> {
        let updated = sqlx::query_as::<_, Category>(
            "UPDATE categories SET name_ru = $1, name_kz = $2, description_ru = $3, \
             description_kz = $4, image_url = $5 WHERE id = $6 RETURNING *",
        )
        .bind(&category.name_ru)
        .bind(&category.name_kz)
        .bind(&category.description_ru)
        .bind(&category.description_kz)
        .bind(&category.image_url)
        .bind(category.id)
        .fetch_one(&self.db)
        .await?;
        Ok(updated)
    }

    async fn write_product(&self, product: &Product) -> Result<Product> {
        let sql = format!(
            "UPDATE products SET name_ru = $1, name_kz = $2, description_ru = $3, \
             description_kz = $4, price = $5::numeric, unit_ru = $6, unit_kz = $7, \
             category_id = $8, image_url = $9, in_stock = $10 WHERE id = $11 \
             RETURNING {PRODUCT_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Product>(&sql)
            .bind(&product.name_ru)
            .bind(&product.name_kz)
            .bind(&product.description_ru)
            .bind(&product.description_kz)
            .bind(product.price.as_str())
            .bind(&product.unit_ru)
            .bind(&product.unit_kz)
            .bind(product.category_id)
            .bind(&product.image_url)
            .bind(product.in_stock)
            .bind(product.id)
            .fetch_one(&self.db)
            .await?;
        Ok(updated)
    }
}

#[async_trait]
impl Storage for PgStorage {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get_user(&self, id: i32) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (username, password) VALUES ($1, $2) RETURNING *",
        )
        .bind(&user.username)
        .bind(&user.password)
        .fetch_one(&self.db)
        .await
        .map_err(|err| {
            let duplicate = matches!(
                &err,
                sqlx::Error::Database(db_err) if db_err.is_unique_violation()
            );
            if duplicate {
                StorageError::DuplicateUsername(user.username.clone())
            } else {
                err.into()
            }
        })
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY id")
            .fetch_all(&self.db)
            .await?;
        Ok(categories)
    }

    async fn get_category(&self, id: i32) -> Result<Option<Category>> {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(category)
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category> {
        let created = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name_ru, name_kz, description_ru, description_kz, image_url) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(&category.name_ru)
        .bind(&category.name_kz)
        .bind(&category.description_ru)
        .bind(&category.description_kz)
        .bind(&category.image_url)
        .fetch_one(&self.db)
        .await?;
        debug!("Inserted category with id {}", created.id);
        Ok(created)
    }

    async fn update_category(&self, id: i32, patch: CategoryPatch) -> Result<Option<Category>> {
        let Some(mut category) = self.get_category(id).await? else {
            return Ok(None);
        };
        patch.apply(&mut category);
        self.write_category(&category).await.map(Some)
    }

    async fn delete_category(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id");
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.db)
            .await?;
        Ok(products)
    }

    async fn get_product(&self, id: i32) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(product)
    }

    async fn products_by_category(&self, category_id: i32) -> Result<Vec<Product>> {
        let sql =
            format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE category_id = $1 ORDER BY id");
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(category_id)
            .fetch_all(&self.db)
            .await?;
        Ok(products)
    }

    async fn search_products(&self, query: &str) -> Result<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE strpos(lower(name_ru), $1) > 0 \
                OR strpos(lower(name_kz), $1) > 0 \
                OR strpos(lower(coalesce(description_ru, '')), $1) > 0 \
                OR strpos(lower(coalesce(description_kz, '')), $1) > 0 \
             ORDER BY id"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(query.to_lowercase())
            .fetch_all(&self.db)
            .await?;
        Ok(products)
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let product = product.into_product(0);
        let sql = format!(
            "INSERT INTO products (name_ru, name_kz, description_ru, description_kz, price, \
             unit_ru, unit_kz, category_id, image_url, in_stock) \
             VALUES ($1, $2, $3, $4, $5::numeric, $6, $7, $8, $9, $10) \
             RETURNING {PRODUCT_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Product>(&sql)
            .bind(&product.name_ru)
            .bind(&product.name_kz)
            .bind(&product.description_ru)
            .bind(&product.description_kz)
            .bind(product.price.as_str())
            .bind(&product.unit_ru)
            .bind(&product.unit_kz)
            .bind(product.category_id)
            .bind(&product.image_url)
            .bind(product.in_stock)
            .fetch_one(&self.db)
            .await?;
        debug!("Inserted product with id {}", created.id);
        Ok(created)
    }

    async fn update_product(&self, id: i32, patch: ProductPatch) -> Result<Option<Product>> {
        let Some(mut product) = self.get_product(id).await? else {
            return Ok(None);
        };
        patch.apply(&mut product);
        self.write_product(&product).await.map(Some)
    }

    async fn delete_product(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_request(&self, request: NewCustomerRequest) -> Result<CustomerRequest> {
        let created = sqlx::query_as::<_, CustomerRequest>(
            "INSERT INTO requests (name, phone, comment, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(&request.name)
        .bind(&request.phone)
        .bind(&request.comment)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;
        Ok(created)
    }

    async fn list_requests(&self) -> Result<Vec<CustomerRequest>> {
        let requests = sqlx::query_as::<_, CustomerRequest>("SELECT * FROM requests ORDER BY id")
            .fetch_all(&self.db)
            .await?;
        Ok(requests)
    }
}
