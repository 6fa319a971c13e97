//! Persisted listing and filename-to-document resolution.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::models::artifact_file_name;
use crate::document_api::DocumentRef;
use crate::file_persistence::atomic_write;

/// The last listing fetched from the document service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub fetched_at: DateTime<Utc>,
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
}

impl Manifest {
    pub fn new(range_start: NaiveDate, range_end: NaiveDate, documents: Vec<DocumentRef>) -> Self {
        Self {
            fetched_at: Utc::now(),
            range_start,
            range_end,
            documents,
        }
    }

    /// Persist with the atomic write protocol.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize manifest")?;
        atomic_write(path, &json).with_context(|| format!("Failed to write manifest {:?}", path))
    }

    /// Load the manifest, `None` if it was never written.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };
        let manifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest {:?}", path))?;
        Ok(Some(manifest))
    }
}

/// Maps an artifact file name back to the document it was downloaded from.
#[derive(Debug, Default)]
pub struct ManifestMapper {
    by_file_name: HashMap<String, DocumentRef>,
}

impl ManifestMapper {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut by_file_name = HashMap::with_capacity(manifest.documents.len());
        for document in &manifest.documents {
            let file_name = artifact_file_name(&document.source_id);
            if let Some(previous) = by_file_name.insert(file_name.clone(), document.clone()) {
                warn!(
                    "Manifest maps {} to both {} and {}, keeping the latter",
                    file_name, previous.source_id, document.source_id
                );
            }
        }
        Self { by_file_name }
    }

    /// Load the mapper from a persisted manifest.
    ///
    /// Returns `None` when the manifest is missing or unreadable, which
    /// disables retries for the run.
    pub fn load(path: &Path) -> Option<Self> {
        match Manifest::load(path) {
            Ok(Some(manifest)) => {
                debug!(
                    "Loaded manifest with {} documents ({}..{})",
                    manifest.documents.len(),
                    manifest.range_start,
                    manifest.range_end
                );
                Some(Self::from_manifest(&manifest))
            }
            Ok(None) => {
                warn!("No manifest at {:?}", path);
                None
            }
            Err(e) => {
                warn!("Manifest unavailable: {:#}", e);
                None
            }
        }
    }

    /// Resolve an artifact path by its file name.
    pub fn resolve(&self, artifact: &Path) -> Option<&DocumentRef> {
        let file_name = artifact.file_name()?.to_str()?;
        self.by_file_name.get(file_name)
    }

    pub fn len(&self) -> usize {
        self.by_file_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_file_name.is_empty()
    }
}
