use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::config::{Config, StorageBackend};
use crate::images::ImagePipeline;
use crate::storage::{
    ensure_admin, FileStorage, MemoryStorage, PgStorage, Storage, StorageDocument,
};
use crate::telegram::TelegramNotifier;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn Storage>,
    pub images: Arc<ImagePipeline>,
    pub notifier: Option<TelegramNotifier>,
}

impl AppState {
    /// Opens the configured storage backend, seeds the admin account and
    /// prepares the image pipeline and Telegram client.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let storage = open_storage(&config).await?;
        ensure_admin(
            storage.as_ref(),
            &config.admin_username,
            &config.admin_password,
        )
        .await
        .context("failed to create the admin account")?;

        let notifier = match config.telegram.clone() {
            Some(telegram) => Some(
                TelegramNotifier::new(telegram).context("failed to build Telegram client")?,
            ),
            None => None,
        };

        Ok(Self::with_storage(config, storage, notifier))
    }

    pub fn with_storage(
        config: Config,
        storage: Arc<dyn Storage>,
        notifier: Option<TelegramNotifier>,
    ) -> Self {
        let images = Arc::new(ImagePipeline::new(config.images, config.upload_dir.clone()));
        Self {
            config: Arc::new(config),
            storage,
            images,
            notifier,
        }
    }
}

async fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.storage_backend {
        StorageBackend::File => {
            let path = config.data_file();
            Arc::new(
                FileStorage::open(&path)
                    .await
                    .with_context(|| format!("failed to open {}", path.display()))?,
            )
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage, all changes are lost on restart");
            Arc::new(MemoryStorage::from_document(StorageDocument::initial()))
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres backend")?;
            Arc::new(
                PgStorage::connect(url, config.database_max_connections)
                    .await
                    .context("failed to connect to PostgreSQL")?,
            )
        }
    };

    info!("Storage backend: {}", storage.backend());
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_state_seeds_admin_and_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Config::for_tests(dir.path())).await.unwrap();

        let admin = state.storage.get_user_by_username("admin").await.unwrap();
        assert!(admin.is_some());
        assert_eq!(state.storage.list_categories().await.unwrap().len(), 2);
        assert!(state.notifier.is_none());
    }

    #[tokio::test]
    async fn file_state_writes_document_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_tests(dir.path());
        config.storage_backend = StorageBackend::File;

        let state = AppState::new(config).await.unwrap();
        assert_eq!(state.storage.backend(), "file");
        assert!(dir.path().join("data").join("storage.json").exists());
    }
}
