//! Read-through cache of bundled resource text (templates, stylesheets, scripts).
//!
//! Entries are loaded lazily on first request and never change afterwards:
//! resources ship with the application and are not expected to move while the
//! process is running.

use std::{
    collections::HashMap,
    io,
    path::{Component, Path, PathBuf},
    sync::{Arc, RwLock},
};

use metrics::counter;
use thiserror::Error;
use tracing::debug;

use super::{
    lock::{self, LockSite},
    telemetry::{RESOURCE_CACHE_HIT, RESOURCE_CACHE_MISS},
};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("invalid resource path `{0}`")]
    InvalidPath(String),
    #[error("failed to load resource `{path}`: {source}")]
    Load {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Process-lifetime cache of resource files keyed by logical path.
#[derive(Debug)]
pub struct ResourceStore {
    root: PathBuf,
    entries: RwLock<HashMap<String, Arc<str>>>,
}

impl ResourceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Directory that logical paths are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the text of `logical_path`, loading it on first use.
    pub fn get(&self, logical_path: &str) -> Result<Arc<str>, ResourceError> {
        let cached = lock::read(&self.entries, LockSite::ResourceCache, "get")
            .get(logical_path)
            .cloned();
        if let Some(text) = cached {
            counter!(RESOURCE_CACHE_HIT).increment(1);
            return Ok(text);
        }

        counter!(RESOURCE_CACHE_MISS).increment(1);
        let absolute = self.resolve(logical_path)?;
        let text: Arc<str> = std::fs::read_to_string(&absolute)
            .map_err(|source| ResourceError::Load {
                path: logical_path.to_string(),
                source,
            })?
            .into();

        debug!(
            target = "infra::resources",
            op = "resources::get",
            result = "loaded",
            path = logical_path,
            bytes = text.len(),
            "Resource loaded from disk"
        );

        // A concurrent loader may have won the race; keep whichever landed first.
        let mut entries = lock::write(&self.entries, LockSite::ResourceCache, "insert");
        let stored = entries
            .entry(logical_path.to_string())
            .or_insert_with(|| Arc::clone(&text));
        Ok(Arc::clone(stored))
    }

    /// Number of resources currently held in memory.
    pub fn len(&self) -> usize {
        lock::read(&self.entries, LockSite::ResourceCache, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve(&self, logical_path: &str) -> Result<PathBuf, ResourceError> {
        let relative = Path::new(logical_path);
        if logical_path.is_empty()
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(ResourceError::InvalidPath(logical_path.to_string()));
        }

        Ok(self.root.join(relative))
    }
}
