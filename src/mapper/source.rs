//! Where map data documents come from.
//!
//! All map data is static JSON addressed by a path relative to a data root
//! (`arda.json`, `roomindex/{xx}.json`, `zone/{x},{y}.json`). A missing
//! document is reported as [`FetchError::NotFound`], which callers treat as
//! a valid answer rather than a failure.

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::mapper::errors::FetchError;

/// Read-only access to the map data tree.
#[async_trait]
pub trait MapDataSource: Send + Sync {
    /// Fetch and decode the JSON document at `path`.
    async fn fetch_json(&self, path: &str) -> Result<Value, FetchError>;

    /// Human readable location of the data root, for logs.
    fn describe(&self) -> String;
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fetches documents over HTTP(S) relative to a base URL.
#[cfg(feature = "http")]
pub struct HttpSource {
    base_url: String,
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpSource {
    /// `timeout` bounds each request; there is no other cancellation.
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self { base_url, client })
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl MapDataSource for HttpSource {
    async fn fetch_json(&self, path: &str) -> Result<Value, FetchError> {
        let url = self.url_for(path);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// Reads documents from a local mirror of the map data tree.
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MapDataSource for DirSource {
    async fn fetch_json(&self, path: &str) -> Result<Value, FetchError> {
        let file = self.root.join(path);
        debug!("Reading {}", file.display());
        let content = match tokio::fs::read_to_string(&file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(FetchError::NotFound),
            Err(e) => return Err(FetchError::Io(format!("{}: {}", file.display(), e))),
        };
        serde_json::from_str(&content).map_err(|e| FetchError::Decode(e.to_string()))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// In-memory documents with a log of every fetch.
///
/// Paths without a document answer `NotFound`; paths registered with
/// [`MemorySource::fail`] answer a transport error until replaced.
#[derive(Default)]
pub struct MemorySource {
    documents: Mutex<HashMap<String, Result<Value, FetchError>>>,
    fetches: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, document: Value) {
        lock(&self.documents).insert(path.into(), Ok(document));
    }

    pub fn fail(&self, path: impl Into<String>, reason: &str) {
        lock(&self.documents).insert(path.into(), Err(FetchError::Transport(reason.to_string())));
    }

    /// Every path fetched so far, in order.
    pub fn fetches(&self) -> Vec<String> {
        lock(&self.fetches).clone()
    }

    pub fn fetch_count(&self, path: &str) -> usize {
        lock(&self.fetches).iter().filter(|p| *p == path).count()
    }
}

#[async_trait]
impl MapDataSource for MemorySource {
    async fn fetch_json(&self, path: &str) -> Result<Value, FetchError> {
        lock(&self.fetches).push(path.to_string());
        // Let concurrent callers interleave the way a real download would.
        tokio::task::yield_now().await;
        lock(&self.documents)
            .get(path)
            .cloned()
            .unwrap_or(Err(FetchError::NotFound))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
