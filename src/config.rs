//! Runtime configuration for the local and remote stores.
//!
//! Both configs have sensible defaults and can be read from the environment,
//! falling back to the default whenever a variable is unset or unparsable.

use std::env;
use std::path::PathBuf;

pub const DEFAULT_NAMESPACE: &str = "wellbeing-tracker";
pub const DEFAULT_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_MAP_SIZE_MB: usize = 64;
pub const DEFAULT_TABLE: &str = "records";
pub const DEFAULT_IMPORT_CHUNK: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Base path; the environment lives in `<path>.lmdb/`.
    pub path: PathBuf,
    pub namespace: String,
    pub version: u32,
    pub map_size_mb: usize,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            version: DEFAULT_SCHEMA_VERSION,
            map_size_mb: DEFAULT_MAP_SIZE_MB,
        }
    }

    pub fn from_env() -> Self {
        let path = env::var("WELLBEING_DB_PATH").unwrap_or_else(|_| "wellbeing".to_string());

        let namespace =
            env::var("WELLBEING_NAMESPACE").unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());

        let version = env::var("WELLBEING_SCHEMA_VERSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SCHEMA_VERSION);

        let map_size_mb = env::var("WELLBEING_MAP_SIZE_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|mb| *mb > 0)
            .unwrap_or(DEFAULT_MAP_SIZE_MB);

        Self {
            path: PathBuf::from(path),
            namespace,
            version,
            map_size_mb,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Directory holding the LMDB data and lock files.
    pub fn lmdb_dir(&self) -> PathBuf {
        let mut dir = self.path.clone().into_os_string();
        dir.push(".lmdb");
        PathBuf::from(dir)
    }

    /// `<namespace>:v<version>:<collection>`
    pub fn key_for(&self, collection: &str) -> String {
        format!("{}:v{}:{}", self.namespace, self.version, collection)
    }

    /// Prefix shared by every key this store owns, regardless of version.
    pub fn namespace_prefix(&self) -> String {
        format!("{}:", self.namespace)
    }

    pub fn map_size_bytes(&self) -> usize {
        self.map_size_mb * 1024 * 1024
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    pub anon_key: String,
    pub table: String,
    pub import_chunk_size: usize,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            table: DEFAULT_TABLE.to_string(),
            import_chunk_size: DEFAULT_IMPORT_CHUNK,
        }
    }

    /// Returns `None` when `SUPABASE_URL` or `SUPABASE_ANON_KEY` is missing.
    pub fn from_env() -> Option<Self> {
        let url = env::var("SUPABASE_URL").ok()?;
        let anon_key = env::var("SUPABASE_ANON_KEY").ok()?;
        Some(Self::new(url, anon_key))
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }

    pub fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{}", self.url, endpoint)
    }
}
