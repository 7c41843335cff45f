//! Stable URL identities backed by a JSON mapping file.
//!
//! Every source URL gets a UUID that names its directory under the data
//! root (`<data_dir>/<id>/index.json`). The id-to-URL mapping lives in
//! `<data_dir>/url_mapping.json` so identities survive restarts: the same
//! URL always resolves to the same id, and therefore to the same persisted
//! index.
//!
//! The whole read-modify-write cycle runs under one mutex. Lookups are
//! rare (one per request) and the file is small, so a single lock is
//! simpler and safer than anything finer-grained.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PipelineError;

const MAPPING_FILE: &str = "url_mapping.json";

pub struct UrlRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl UrlRegistry {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(MAPPING_FILE),
            lock: Mutex::new(()),
        }
    }

    /// Path of the mapping file this registry persists to.
    pub fn mapping_path(&self) -> &Path {
        &self.path
    }

    /// Return the id for `url`, minting and persisting a fresh one if the
    /// URL has never been seen.
    pub async fn resolve_or_create(&self, url: &str) -> Result<String, PipelineError> {
        let _guard = self.lock.lock().await;

        let mut mapping = self.read_mapping().await?;
        if let Some(id) = mapping
            .iter()
            .find_map(|(id, mapped)| (mapped == url).then(|| id.clone()))
        {
            return Ok(id);
        }

        let id = Uuid::new_v4().to_string();
        mapping.insert(id.clone(), url.to_string());
        self.write_mapping(&mapping).await?;
        info!(id = %id, url = %url, "registered new source URL");
        Ok(id)
    }

    async fn read_mapping(&self) -> Result<BTreeMap<String, String>, PipelineError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(mapping) => Ok(mapping),
            Err(_) => {
                // A damaged mapping only costs re-indexing, not data loss.
                warn!(
                    path = %self.path.display(),
                    "invalid JSON in URL mapping file, creating a new mapping"
                );
                Ok(BTreeMap::new())
            }
        }
    }

    async fn write_mapping(&self, mapping: &BTreeMap<String, String>) -> Result<(), PipelineError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(mapping)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
