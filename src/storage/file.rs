use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Result, Storage, StorageDocument, StorageError};
use crate::models::{
    Category, CategoryPatch, CustomerRequest, NewCategory, NewCustomerRequest, NewProduct,
    NewUser, Product, ProductPatch, User,
};

/// Backend that keeps everything in one JSON document on disk.
///
/// The document is read and parsed on every call and rewritten in full on
/// every mutation. Mutations within this process are serialized; separate
/// processes sharing the file still race and the last writer wins.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Opens the document at `path`, creating it with the starter catalog
    /// (and any missing parent directories) when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be created or an existing file
    /// is not a valid document.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let storage = Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        };

        let document = storage.load().await?;
        info!(
            "Storage document at {} holds {} categories and {} products",
            storage.path.display(),
            document.categories.len(),
            document.products.len()
        );
        Ok(storage)
    }

    async fn read(&self) -> Result<Option<StorageDocument>> {
        match fs::read(&self.path).await {
            Ok(bytes) => {
                let mut document: StorageDocument =
                    serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
                        path: self.path.clone(),
                        source,
                    })?;
                document.repair_counters();
                Ok(Some(document))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::io(&self.path, err)),
        }
    }

    async fn load(&self) -> Result<StorageDocument> {
        if let Some(document) = self.read().await? {
            return Ok(document);
        }
        let _guard = self.write_lock.lock().await;
        self.read_or_seed().await
    }

    /// Reads the document, writing the starter catalog first when the file
    /// is missing. Callers hold `write_lock`.
    async fn read_or_seed(&self) -> Result<StorageDocument> {
        if let Some(document) = self.read().await? {
            return Ok(document);
        }
        info!("No storage document at {}, writing initial data", self.path.display());
        let document = StorageDocument::initial();
        self.save(&document).await?;
        Ok(document)
    }

    /// Writes to a sibling temp file, then renames it over the document.
    async fn save(&self, document: &StorageDocument) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| StorageError::io(parent, err))?;
        }

        let json = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|err| StorageError::io(&tmp, err))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| StorageError::io(&self.path, err))?;

        debug!("Saved storage document to {}", self.path.display());
        Ok(())
    }

    /// Runs a read-modify-write cycle. The document is saved only when
    /// `apply` reports that it changed something.
    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut StorageDocument) -> Result<(T, bool)>,
    ) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_or_seed().await?;
        let (value, changed) = apply(&mut document)?;
        if changed {
            self.save(&document).await?;
        }
        Ok(value)
    }
}

#[async_trait]
impl Storage for FileStorage {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn get_user(&self, id: i32) -> Result<Option<User>> {
        Ok(self.load().await?.user(id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.load().await?.user_by_username(username).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.mutate(|doc| Ok((doc.insert_user(user)?, true))).await
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.load().await?.categories)
    }

    async fn get_category(&self, id: i32) -> Result<Option<Category>> {
        Ok(self.load().await?.category(id).cloned())
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category> {
        self.mutate(|doc| Ok((doc.insert_category(category)?, true)))
            .await
    }

    async fn update_category(&self, id: i32, patch: CategoryPatch) -> Result<Option<Category>> {
        self.mutate(|doc| {
            let updated = doc.update_category(id, patch);
            let changed = updated.is_some();
            Ok((updated, changed))
        })
        .await
    }

    async fn delete_category(&self, id: i32) -> Result<bool> {
        self.mutate(|doc| {
            let removed = doc.remove_category(id);
            Ok((removed, removed))
        })
        .await
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.load().await?.products)
    }

    async fn get_product(&self, id: i32) -> Result<Option<Product>> {
        Ok(self.load().await?.product(id).cloned())
    }

    async fn products_by_category(&self, category_id: i32) -> Result<Vec<Product>> {
        Ok(self.load().await?.products_by_category(category_id))
    }

    async fn search_products(&self, query: &str) -> Result<Vec<Product>> {
        Ok(self.load().await?.search_products(query))
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        self.mutate(|doc| Ok((doc.insert_product(product)?, true))).await
    }

    async fn update_product(&self, id: i32, patch: ProductPatch) -> Result<Option<Product>> {
        self.mutate(|doc| {
            let updated = doc.update_product(id, patch);
            let changed = updated.is_some();
            Ok((updated, changed))
        })
        .await
    }

    async fn delete_product(&self, id: i32) -> Result<bool> {
        self.mutate(|doc| {
            let removed = doc.remove_product(id);
            Ok((removed, removed))
        })
        .await
    }

    async fn create_request(&self, request: NewCustomerRequest) -> Result<CustomerRequest> {
        self.mutate(|doc| Ok((doc.insert_request(request)?, true))).await
    }

    async fn list_requests(&self) -> Result<Vec<CustomerRequest>> {
        Ok(self.load().await?.requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::contract;

    #[tokio::test]
    async fn file_backend_honours_contract() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("storage.json")).await.unwrap();
        contract::run_all(&storage).await;
    }

    #[tokio::test]
    async fn creates_missing_document_with_starter_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data").join("storage.json");

        let storage = FileStorage::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(storage.list_categories().await.unwrap().len(), 2);
        assert_eq!(storage.list_products().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn changes_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let created = {
            let storage = FileStorage::open(&path).await.unwrap();
            storage
                .create_product(contract::product("Профнастил С8", Some(1)))
                .await
                .unwrap()
        };

        let reopened = FileStorage::open(&path).await.unwrap();
        assert_eq!(reopened.get_product(created.id).await.unwrap(), Some(created));

        let raw = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["counters"]["productId"], 3);
    }

    #[tokio::test]
    async fn corrupt_document_is_reported_and_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = FileStorage::open(&path).await;
        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn concurrent_creates_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let storage =
            std::sync::Arc::new(FileStorage::open(dir.path().join("storage.json")).await.unwrap());

        let mut handles = Vec::new();
        for n in 0..8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage
                    .create_category(contract::category(&format!("Категория {n}")))
                    .await
                    .unwrap()
                    .id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(storage.list_categories().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn document_without_counters_never_reuses_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(
            &path,
            r#"{"categories": [{"id": 1, "name_ru": "Кровля", "name_kz": "Шатыр",
                "description_ru": null, "description_kz": null, "image_url": null}],
                "products": [], "users": [], "requests": []}"#,
        )
        .unwrap();

        let storage = FileStorage::open(&path).await.unwrap();
        let created = storage
            .create_category(contract::category("Утеплители"))
            .await
            .unwrap();
        assert_eq!(created.id, 2);

        assert!(storage.delete_category(1).await.unwrap());
        let left: Vec<i32> = storage
            .list_categories()
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(left, vec![2]);
    }

    #[tokio::test]
    async fn document_removed_while_running_is_seeded_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let storage = std::sync::Arc::new(FileStorage::open(&path).await.unwrap());
        std::fs::remove_file(&path).unwrap();

        let reader = {
            let storage = storage.clone();
            tokio::spawn(async move { storage.list_categories().await.unwrap() })
        };
        let writer = {
            let storage = storage.clone();
            tokio::spawn(async move {
                storage
                    .create_category(contract::category("Смеси"))
                    .await
                    .unwrap()
            })
        };
        reader.await.unwrap();
        let created = writer.await.unwrap();

        assert_eq!(created.id, 3);
        let categories = storage.list_categories().await.unwrap();
        assert_eq!(categories.len(), 3);
        assert!(categories.iter().any(|c| c.id == created.id));
    }
}
