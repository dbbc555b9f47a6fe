//! Runtime configuration read from environment variables.
//!
//! A `.env` file in the working directory is loaded first. Every key has a
//! default except `DATABASE_URL`, which is only needed by the postgres backend.

use std::{env, fmt, path::PathBuf, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
/// Ten years. Longer lifetimes overflow the cookie expiry arithmetic.
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {message}")]
    Invalid {
        key: &'static str,
        value: String,
        message: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    File,
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(Self::File),
            "memory" | "mem" => Ok(Self::Memory),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(format!("unknown storage backend {other:?}")),
        }
    }
}

#[derive(Clone)]
pub struct TelegramConfig {
    pub api_url: String,
    pub bot_token: String,
    pub chat_id: String,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_url", &self.api_url)
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Limits and output settings for uploaded images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageConfig {
    pub max_upload_bytes: usize,
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 5 * 1024 * 1024,
            max_width: 800,
            max_height: 600,
            quality: 85,
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub storage_backend: StorageBackend,
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
    pub admin_username: String,
    pub admin_password: String,
    pub session_secure: bool,
    pub session_ttl_hours: i64,
    pub telegram: Option<TelegramConfig>,
    pub images: ImageConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_backend", &self.storage_backend)
            .field("data_dir", &self.data_dir)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("upload_dir", &self.upload_dir)
            .field("static_dir", &self.static_dir)
            .field("admin_username", &self.admin_username)
            .field("session_secure", &self.session_secure)
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("telegram", &self.telegram)
            .field("images", &self.images)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                warn!("Failed to read .env file: {err}");
            }
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let storage_backend = vars.parse("STORAGE_BACKEND", StorageBackend::File)?;
        let database_url = vars.get("DATABASE_URL");
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let admin_password = vars.text("ADMIN_PASSWORD", DEFAULT_ADMIN_PASSWORD);
        if admin_password == DEFAULT_ADMIN_PASSWORD {
            warn!("ADMIN_PASSWORD not set, the admin account uses the default password");
        }

        let images = ImageConfig {
            max_upload_bytes: vars.parse("MAX_UPLOAD_BYTES", ImageConfig::default().max_upload_bytes)?,
            max_width: vars.parse("IMAGE_MAX_WIDTH", ImageConfig::default().max_width)?,
            max_height: vars.parse("IMAGE_MAX_HEIGHT", ImageConfig::default().max_height)?,
            quality: vars.parse("IMAGE_QUALITY", ImageConfig::default().quality)?,
        };
        if !(1..=100).contains(&images.quality) {
            return Err(ConfigError::Invalid {
                key: "IMAGE_QUALITY",
                value: images.quality.to_string(),
                message: "must be between 1 and 100".into(),
            });
        }
        if images.max_width == 0 || images.max_height == 0 {
            return Err(ConfigError::Invalid {
                key: "IMAGE_MAX_WIDTH",
                value: format!("{}x{}", images.max_width, images.max_height),
                message: "image bounds must be positive".into(),
            });
        }

        let session_ttl_hours: i64 = vars.parse("SESSION_TTL_HOURS", 24)?;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&session_ttl_hours) {
            return Err(ConfigError::Invalid {
                key: "SESSION_TTL_HOURS",
                value: session_ttl_hours.to_string(),
                message: format!("must be between 1 and {MAX_SESSION_TTL_HOURS}"),
            });
        }

        Ok(Self {
            host: vars.text("HOST", "127.0.0.1"),
            port: vars.parse("PORT", 3000)?,
            storage_backend,
            data_dir: vars.text("DATA_DIR", "data").into(),
            database_url,
            database_max_connections: vars.parse("DATABASE_MAX_CONNECTIONS", 5)?,
            upload_dir: vars.text("UPLOAD_DIR", "uploads").into(),
            static_dir: vars.text("STATIC_DIR", "dist/public").into(),
            admin_username: vars.text("ADMIN_USERNAME", "admin"),
            admin_password,
            session_secure: vars.parse("SESSION_SECURE", false)?,
            session_ttl_hours,
            telegram: telegram_config(&vars),
            images,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn data_file(&self) -> PathBuf {
        self.data_dir.join("storage.json")
    }

    /// Defaults rooted in a scratch directory, memory storage, no Telegram.
    #[cfg(test)]
    pub(crate) fn for_tests(root: &std::path::Path) -> Self {
        let mut config = Self::from_lookup(|_| None).unwrap();
        config.storage_backend = StorageBackend::Memory;
        config.data_dir = root.join("data");
        config.upload_dir = root.join("uploads");
        config.static_dir = root.join("public");
        config
    }
}

fn telegram_config<F>(vars: &Vars<F>) -> Option<TelegramConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let bot_token = vars.get("TELEGRAM_BOT_TOKEN").or_else(|| vars.get("BOT_TOKEN"));
    let chat_id = vars.get("TELEGRAM_CHAT_ID").or_else(|| vars.get("CHAT_ID"));

    match (bot_token, chat_id) {
        (Some(bot_token), Some(chat_id)) => Some(TelegramConfig {
            api_url: vars.text("TELEGRAM_API_URL", "https://api.telegram.org"),
            bot_token,
            chat_id,
        }),
        _ => {
            warn!("Telegram bot token or chat ID not configured, notifications are disabled");
            None
        }
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty value for `key`, if any.
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn text(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + fmt::Display,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                message: e.to_string(),
                value,
            }),
            None => {
                info!("{key} not set, using default: {default}");
                Ok(default)
            }
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::Memory => "memory",
            Self::Postgres => "postgres",
        })
    }
}
