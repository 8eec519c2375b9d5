use serde::{Deserialize, Serialize};
use tlsb2_bucket::{RetryPolicy, S3Config};
use tlsb2_types::{Namespace, DEFAULT_PREFIX};

use crate::error::{StorageError, StorageResult};

/// Account id or application key id.
pub const ENV_ACCOUNT_ID: &str = "B2_ACCOUNT_ID";
/// Account master key or application key.
pub const ENV_ACCOUNT_KEY: &str = "B2_ACCOUNT_KEY";
/// Bucket holding the objects.
pub const ENV_BUCKET: &str = "B2_BUCKET";
/// Optional region, e.g. `us-west-004`.
pub const ENV_REGION: &str = "B2_REGION";
/// Optional S3 endpoint override.
pub const ENV_ENDPOINT: &str = "B2_ENDPOINT";
/// Set to `1` to enable debug logging in the CLI.
pub const ENV_DEBUG: &str = "B2_DEBUG";

const DEFAULT_REGION: &str = "us-west-004";

/// Credentials and target bucket.
#[derive(Clone)]
pub struct B2Credentials {
    pub account_id: String,
    pub account_key: String,
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
}

impl B2Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read credentials through `lookup`. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let account_id = get(ENV_ACCOUNT_ID).ok_or_else(|| {
            StorageError::Config(format!(
                "no account ID set, please set ${ENV_ACCOUNT_ID} with either your master account ID or an application key ID"
            ))
        })?;
        let account_key = get(ENV_ACCOUNT_KEY).ok_or_else(|| {
            StorageError::Config(format!(
                "no account key set, please set ${ENV_ACCOUNT_KEY} with either your master account key or an application key"
            ))
        })?;
        let bucket = get(ENV_BUCKET).ok_or_else(|| {
            StorageError::Config(format!("no bucket set, please set ${ENV_BUCKET}"))
        })?;

        Ok(Self {
            account_id,
            account_key,
            bucket,
            region: get(ENV_REGION).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint: get(ENV_ENDPOINT),
        })
    }

    /// S3 endpoint, derived from the region unless overridden.
    pub fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://s3.{}.backblazeb2.com", self.region),
        }
    }

    pub fn to_s3_config(&self) -> S3Config {
        S3Config {
            endpoint: self.endpoint(),
            region: self.region.clone(),
            bucket: self.bucket.clone(),
            access_key_id: self.account_id.clone(),
            secret_access_key: self.account_key.clone(),
        }
    }
}

impl std::fmt::Debug for B2Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("B2Credentials")
            .field("account_id", &self.account_id)
            .field("account_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Behaviour of a [`B2Storage`](crate::B2Storage).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root prefix of every object written.
    pub prefix: String,
    /// Keep a metadata index document to avoid bucket listings.
    pub use_index: bool,
    /// Retry policy for uploads.
    pub retry: RetryPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            use_index: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl StorageConfig {
    /// Parse a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(s: &str) -> StorageResult<Self> {
        toml::from_str(s).map_err(|e| StorageError::Config(format!("invalid storage config: {e}")))
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.prefix)
    }
}
