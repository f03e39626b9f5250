//! Remote loaders and locator policies.
//!
//! A remote loader fetches the source text that declares an object, given the locator
//! computed for its name by a [LocatorPolicy].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::config::LocatorConfig;
use crate::error::LoadError;

/// Fetch source text for a locator
#[async_trait]
pub trait RemoteLoader: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<String, LoadError>;
}

/// Map object names to load locators
pub trait LocatorPolicy: Send + Sync {
    fn resolve_url(&self, name: &str) -> String;
}

impl<F> LocatorPolicy for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn resolve_url(&self, name: &str) -> String {
        self(name)
    }
}

/// Default policy: surround the name with a fixed prefix and suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffixLocator {
    prefix: String,
    suffix: String,
}

impl AffixLocator {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }
}

impl Default for AffixLocator {
    fn default() -> Self {
        Self::from(&LocatorConfig::default())
    }
}

impl From<&LocatorConfig> for AffixLocator {
    fn from(config: &LocatorConfig) -> Self {
        Self::new(config.prefix.clone(), config.suffix.clone())
    }
}

impl LocatorPolicy for AffixLocator {
    fn resolve_url(&self, name: &str) -> String {
        format!("{}{}{}", self.prefix, name, self.suffix)
    }
}

/// Read sources from files below a base directory
#[derive(Debug, Clone)]
pub struct FileLoader {
    base_dir: PathBuf,
}

impl FileLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl RemoteLoader for FileLoader {
    async fn fetch(&self, locator: &str) -> Result<String, LoadError> {
        let path = self.base_dir.join(locator.trim_start_matches('/'));
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| LoadError::Transport(format!("{}: {e}", path.display())))
    }
}

/// In-memory sources, keyed by locator
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    sources: Arc<RwLock<HashMap<String, String>>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source, replacing any previous one for the same locator
    pub fn with_source(self, locator: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(locator, source);
        self
    }

    pub fn insert(&self, locator: impl Into<String>, source: impl Into<String>) {
        self.sources
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(locator.into(), source.into());
    }
}

#[async_trait]
impl RemoteLoader for StaticLoader {
    async fn fetch(&self, locator: &str) -> Result<String, LoadError> {
        let sources = self.sources.read().unwrap_or_else(|p| p.into_inner());
        sources.get(locator).cloned().ok_or_else(|| LoadError::Status {
            code: 404,
            reason: "Not Found".to_string(),
        })
    }
}

/// Fetch sources over HTTP(S)
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct HttpLoader {
    client: reqwest::Client,
    base_url: Option<reqwest::Url>,
}

#[cfg(feature = "http")]
impl HttpLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative locators against a base URL
    pub fn with_base_url(mut self, base_url: reqwest::Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    fn url(&self, locator: &str) -> Result<reqwest::Url, LoadError> {
        let parsed = match &self.base_url {
            Some(base) => base.join(locator),
            None => reqwest::Url::parse(locator),
        };
        parsed.map_err(|e| LoadError::Transport(format!("invalid locator \"{locator}\": {e}")))
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl RemoteLoader for HttpLoader {
    async fn fetch(&self, locator: &str) -> Result<String, LoadError> {
        let response = self
            .client
            .get(self.url(locator)?)
            .header(reqwest::header::ACCEPT, "text/plain")
            .send()
            .await
            .map_err(|e| LoadError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_MODIFIED {
            return Err(LoadError::Status {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("abort").to_string(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| LoadError::Transport(e.to_string()))
    }
}
