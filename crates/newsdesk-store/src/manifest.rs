//! Persisted model identity of a vector store.
//!
//! Both backends keep a `manifest.json` next to their data. Vectors written
//! under one manifest are not comparable with queries embedded under another,
//! so opening a store with a different manifest is refused.

use std::path::Path;

use newsdesk_core::{IndexManifest, StoreError};
use tracing::{debug, info};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Read the manifest in `dir`, if one was written.
pub async fn read_manifest(dir: &Path) -> Result<Option<IndexManifest>, StoreError> {
    let path = dir.join(MANIFEST_FILE);
    match tokio::fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Schema(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Init(format!("{}: {e}", path.display()))),
    }
}

/// Write `manifest` into `dir`, creating the directory if needed.
pub async fn write_manifest(dir: &Path, manifest: &IndexManifest) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|e| StoreError::Schema(format!("manifest: {e}")))?;
    write_atomic(&dir.join(MANIFEST_FILE), &bytes).await
}

/// Accept `configured` if it matches `stored` or nothing was stored yet.
pub fn check_manifest(
    stored: Option<&IndexManifest>,
    configured: &IndexManifest,
) -> Result<(), StoreError> {
    match stored {
        Some(stored) if stored != configured => Err(StoreError::ManifestMismatch {
            stored: stored.to_string(),
            configured: configured.to_string(),
        }),
        Some(_) => {
            debug!("Manifest {} matches", configured);
            Ok(())
        }
        None => {
            info!("New index with manifest {}", configured);
            Ok(())
        }
    }
}

/// Write through a sibling temp file and rename, so readers never see a
/// partial file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::Init(format!("create {}: {e}", parent.display())))?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| StoreError::Insert(format!("write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::Insert(format!("rename {}: {e}", path.display())))
}
