//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`APP_EMBEDDING__BATCH_SIZE=32` sets `embedding.batch_size`). Provides
//! helpers to expand `~` and `${VAR}` and to resolve relative paths against the
//! data directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    /// Extracts and validates the full typed settings tree.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingSettings,
    pub search: SearchSettings,
    /// Re-embed chunks that have no vector right after opening the engine.
    pub reconcile_on_open: bool,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        self.chunking.validate()?;
        self.embedding.validate()?;
        if !(0.0..=1.0).contains(&self.search.default_alpha) {
            return Err(Error::Configuration(format!(
                "search.default_alpha must be within [0, 1], got {}",
                self.search.default_alpha
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: String,
    /// Tantivy directory of the content store. Defaults to `<data_dir>/content`.
    pub content_dir: Option<String>,
    /// Vector index snapshot file. Defaults to `<data_dir>/vectors.arrow`.
    pub index_path: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { data_dir: "./data".to_string(), content_dir: None, index_path: None }
    }
}

impl StorageSettings {
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }

    pub fn content_dir(&self) -> PathBuf {
        let base = self.data_dir();
        match &self.content_dir {
            Some(p) => resolve_with_base(&base, p),
            None => base.join("content"),
        }
    }

    pub fn index_path(&self) -> PathBuf {
        let base = self.data_dir();
        match &self.index_path {
            Some(p) => resolve_with_base(&base, p),
            None => base.join("vectors.arrow"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbedderKind {
    /// Local XLM-RoBERTa (BGE-M3) weights run with candle.
    XlmRoberta,
    /// Deterministic hashed-token vectors; no model files needed.
    Hash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbedderKind,
    pub model_dir: Option<String>,
    /// Dimension of the hash provider. Model providers report their own.
    pub dim: usize,
    pub max_len: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbedderKind::XlmRoberta,
            model_dir: None,
            dim: 384,
            max_len: 256,
            batch_size: 64,
            timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 250,
        }
    }
}

impl EmbeddingSettings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.batch_size == 0 {
            return Err(Error::Configuration("embedding.batch_size must be positive".into()));
        }
        if self.dim == 0 {
            return Err(Error::Configuration("embedding.dim must be positive".into()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Configuration("embedding.timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_k: usize,
    pub default_alpha: f32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { default_k: 5, default_alpha: 0.5 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
