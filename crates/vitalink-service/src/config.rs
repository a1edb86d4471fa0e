use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Directory that cached product images are written to.
    pub assets_dir: PathBuf,
    /// URL prefix under which `assets_dir` is served.
    pub public_image_prefix: String,
    /// Timeout for outbound scraping requests.
    pub http_timeout: Duration,
    /// Time-to-live of resolved previews; zero disables the cache.
    pub preview_cache_ttl: Duration,
    /// Maximum number of resolved previews held in memory.
    pub preview_cache_capacity: usize,
    /// Server-side timeout for a whole inbound request.
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }

        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let public_image_prefix = try_load::<String>("PUBLIC_IMAGE_PREFIX", "/images/products")?
            .trim_end_matches('/')
            .to_string();
        if !public_image_prefix.starts_with('/') {
            return Err(ConfigError::Invalid {
                key: "PUBLIC_IMAGE_PREFIX",
                message: "must be an absolute path below the site root".to_string(),
            });
        }

        Ok(Self {
            database_url,
            bind_address: try_load("BIND_ADDRESS", "0.0.0.0:3000")?,
            assets_dir: PathBuf::from(try_load::<String>("ASSETS_DIR", "public/images/products")?),
            public_image_prefix,
            http_timeout: Duration::from_secs(try_load("HTTP_TIMEOUT_SECS", "15")?),
            preview_cache_ttl: Duration::from_secs(try_load("PREVIEW_CACHE_TTL_SECS", "1800")?),
            preview_cache_capacity: try_load("PREVIEW_CACHE_CAPACITY", "512")?,
            request_timeout: Duration::from_secs(try_load("REQUEST_TIMEOUT_SECS", "30")?),
        })
    }
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: e.to_string(),
    })
}
