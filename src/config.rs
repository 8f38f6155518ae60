use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Origin used when building share URLs. Derived from request headers when unset.
    pub public_url: Option<String>,
    /// Honour `X-Forwarded-Host`/`X-Forwarded-Proto`. Only enable behind a
    /// proxy that overwrites them; otherwise any client picks the share origin.
    pub trust_forwarded_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub ttl_secs: u32,
    pub max_file_size: usize,
}

#[derive(Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: String,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_path_style: bool,
    pub memory_sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    pub dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            public_url: None,
            trust_forwarded_headers: false,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_file_size: 100 * 1024 * 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: "s3".to_string(),
            s3_bucket: String::new(),
            s3_region: "us-east-1".to_string(),
            s3_access_key_id: None,
            s3_secret_access_key: None,
            s3_endpoint: None,
            s3_path_style: false,
            memory_sweep_interval_secs: 60,
        }
    }
}

// Credentials stay out of the logs.
impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("provider", &self.provider)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_access_key_id", &self.s3_access_key_id.as_ref().map(|_| "***"))
            .field("s3_secret_access_key", &self.s3_secret_access_key.as_ref().map(|_| "***"))
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_path_style", &self.s3_path_style)
            .field("memory_sweep_interval_secs", &self.memory_sweep_interval_secs)
            .finish()
    }
}

impl UploadConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.ttl_secs))
    }

    /// Human readable lifetime, e.g. "1 hour" or "90 seconds".
    pub fn ttl_label(&self) -> String {
        let secs = self.ttl_secs;
        let (amount, unit) = if secs % 86_400 == 0 {
            (secs / 86_400, "day")
        } else if secs % 3600 == 0 {
            (secs / 3600, "hour")
        } else if secs % 60 == 0 {
            (secs / 60, "minute")
        } else {
            (secs, "second")
        };
        if amount == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", amount, unit)
        }
    }

    pub fn max_file_size_label(&self) -> String {
        const MIB: usize = 1024 * 1024;
        if self.max_file_size >= MIB && self.max_file_size % MIB == 0 {
            format!("{}MB", self.max_file_size / MIB)
        } else {
            format!("{} bytes", self.max_file_size)
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            server: ServerConfig {
                port: parse_or(&var, "PORT", defaults.server.port)?,
                host: var("HOST").unwrap_or(defaults.server.host),
                public_url: var("PUBLIC_URL").map(|url| url.trim_end_matches('/').to_string()),
                trust_forwarded_headers: parse_or(
                    &var,
                    "TRUST_FORWARDED_HEADERS",
                    defaults.server.trust_forwarded_headers,
                )?,
            },
            upload: UploadConfig {
                ttl_secs: parse_or(&var, "FILE_TTL_SECS", defaults.upload.ttl_secs)?,
                max_file_size: parse_or(&var, "MAX_UPLOAD_BYTES", defaults.upload.max_file_size)?,
            },
            storage: StorageConfig {
                provider: var("STORAGE_PROVIDER")
                    .map(|p| p.trim().to_ascii_lowercase())
                    .unwrap_or(defaults.storage.provider),
                s3_bucket: var("S3_BUCKET").unwrap_or_default(),
                s3_region: var("S3_REGION").unwrap_or(defaults.storage.s3_region),
                s3_access_key_id: var("AWS_ACCESS_KEY_ID"),
                s3_secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
                s3_endpoint: var("S3_ENDPOINT"),
                s3_path_style: parse_or(&var, "S3_PATH_STYLE", defaults.storage.s3_path_style)?,
                memory_sweep_interval_secs: parse_or(
                    &var,
                    "MEMORY_SWEEP_INTERVAL_SECS",
                    defaults.storage.memory_sweep_interval_secs,
                )?,
            },
            logging: LoggingConfig { dir: var("LOG_DIR") },
        };

        if config.upload.ttl_secs == 0 {
            return Err(anyhow!("FILE_TTL_SECS must be greater than zero"));
        }
        if config.storage.memory_sweep_interval_secs == 0 {
            return Err(anyhow!("MEMORY_SWEEP_INTERVAL_SECS must be greater than zero"));
        }

        Ok(config)
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
