//! # Configuration
//!
//! Two layers, used together:
//!
//! - [`ConfigStore`]: a plain string key/value store. Applications fill it
//!   however they like, typically with [`load_env_config`].
//! - [`DraftConfig`]: the typed view the session reads, built with
//!   [`DraftConfig::from_snapshot`] or with its builder methods.
//!
//! ```rust
//! use inkdraft_core::config::{ConfigStore, DraftConfig, ReferenceMode};
//!
//! let mut store = ConfigStore::new();
//! store.set("compression.max_dimension", "1280");
//! store.set("reference.mode", "inline_data");
//!
//! let config = DraftConfig::from_snapshot(&store.snapshot());
//! assert_eq!(config.compression.max_dimension, 1280);
//! assert_eq!(config.reference_mode, ReferenceMode::InlineData);
//! ```
//!
//! Environment variables map onto keys by stripping the prefix, lowercasing
//! and turning `__` into `.`:
//!
//! ```bash
//! export INKDRAFT__COMPRESSION__MAX_BYTES=524288
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use inkdraft_blob::{
    placeholder, BlobResult, CachedImage, FsLocalStore, LocalStore, MemoryLocalStore,
};
use tracing::{debug, warn};

/// Default prefix for environment overrides
pub const ENV_PREFIX: &str = "INKDRAFT__";

#[derive(Debug, Default)]
pub struct ConfigStore {
    values: HashMap<String, String>,
}

impl ConfigStore {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Check whether a key is present.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    map: HashMap<String, String>,
}

impl ConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.parsed(key)
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.parsed(key)
    }

    pub fn get_u8(&self, key: &str) -> Option<u8> {
        self.parsed(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.parsed(key)
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = raw, "Ignoring unparseable config value");
                None
            }
        }
    }
}

/// Copy `PREFIX`-ed environment variables into `store`
///
/// `INKDRAFT__COMPRESSION__MAX_DIMENSION` becomes `compression.max_dimension`.
pub fn load_env_config(store: &mut ConfigStore, prefix: &str) {
    load_config_pairs(store, prefix, std::env::vars());
}

fn load_config_pairs<I>(store: &mut ConfigStore, prefix: &str, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(prefix) {
            let normalized = stripped.to_lowercase().replace("__", ".");
            store.set(normalized, value);
        }
    }
}

/// How a staged image is referenced from the document body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceMode {
    /// `local-image://<id>`; unique per staged image
    #[default]
    Placeholder,
    /// The image's `data:` URL; renders anywhere but two identical pictures
    /// share one reference
    InlineData,
}

impl ReferenceMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "placeholder" => Some(Self::Placeholder),
            "inline_data" | "inline" | "data_url" => Some(Self::InlineData),
            _ => None,
        }
    }

    /// The string a body embeds for `image`
    pub fn body_reference(&self, image: &CachedImage) -> String {
        match self {
            Self::Placeholder => placeholder(image.id()),
            Self::InlineData => image.record().inline_reference.as_str().to_string(),
        }
    }
}

/// Limits applied by the image compressor
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// When false, staged files are stored as-is
    pub enabled: bool,

    /// Neither output dimension exceeds this many pixels
    pub max_dimension: u32,

    /// Best-effort cap on the encoded size
    pub max_bytes: u64,

    /// First encoder quality tried
    pub initial_quality: u8,

    /// Lowest encoder quality tried before giving up on `max_bytes`
    pub min_quality: u8,

    /// Quality decrement between attempts
    pub quality_step: u8,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_dimension: 1920,
            max_bytes: 1024 * 1024, // 1MB
            initial_quality: 90,
            min_quality: 40,
            quality_step: 10,
        }
    }
}

impl CompressionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_max_dimension(mut self, pixels: u32) -> Self {
        self.max_dimension = pixels;
        self
    }

    pub fn with_max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = bytes;
        self
    }

    pub fn with_quality_range(mut self, initial: u8, min: u8, step: u8) -> Self {
        self.initial_quality = initial;
        self.min_quality = min.min(initial);
        self.quality_step = step;
        self
    }
}

/// Configuration for an editing session
#[derive(Debug, Clone, Default)]
pub struct DraftConfig {
    pub compression: CompressionConfig,

    pub reference_mode: ReferenceMode,

    /// Root directory of the filesystem store, when one is used
    pub store_root: Option<PathBuf>,
}

impl DraftConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every known key from `snapshot`, keeping defaults for the rest
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        let defaults = CompressionConfig::default();
        let compression = CompressionConfig {
            enabled: snapshot.get_bool("compression.enabled").unwrap_or(defaults.enabled),
            max_dimension: snapshot
                .get_u32("compression.max_dimension")
                .unwrap_or(defaults.max_dimension),
            max_bytes: snapshot.get_u64("compression.max_bytes").unwrap_or(defaults.max_bytes),
            initial_quality: snapshot
                .get_u8("compression.initial_quality")
                .unwrap_or(defaults.initial_quality),
            min_quality: snapshot
                .get_u8("compression.min_quality")
                .unwrap_or(defaults.min_quality),
            quality_step: snapshot
                .get_u8("compression.quality_step")
                .unwrap_or(defaults.quality_step),
        };

        let reference_mode = match snapshot.get("reference.mode") {
            Some(raw) => ReferenceMode::parse(raw).unwrap_or_else(|| {
                warn!(value = raw, "Unknown reference.mode, using placeholder");
                ReferenceMode::Placeholder
            }),
            None => ReferenceMode::default(),
        };

        Self {
            compression,
            reference_mode,
            store_root: snapshot.get_string("store.root").map(PathBuf::from),
        }
    }

    /// Defaults overlaid with `INKDRAFT__*` environment variables
    pub fn from_env() -> Self {
        let mut store = ConfigStore::new();
        load_env_config(&mut store, ENV_PREFIX);
        Self::from_snapshot(&store.snapshot())
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_reference_mode(mut self, mode: ReferenceMode) -> Self {
        self.reference_mode = mode;
        self
    }

    pub fn with_store_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.store_root = Some(root.into());
        self
    }

    /// Open the local store this config names
    ///
    /// A filesystem store under `store_root` when one is set, otherwise an
    /// in-memory store that does not survive a reload.
    pub async fn open_store(&self) -> BlobResult<Arc<dyn LocalStore>> {
        match &self.store_root {
            Some(root) => {
                let store = FsLocalStore::open(root.clone()).await?;
                debug!(root = %root.display(), "Opened filesystem draft store");
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(MemoryLocalStore::new())),
        }
    }
}
