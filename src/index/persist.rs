//! Load/save a `SymbolIndex` as an on-disk artifact with a sidecar manifest.
//!
//! The artifact itself is an opaque binary blob (postcard over the document
//! map); `manifest.json` carries the human-readable provenance next to it.
//! Saves are atomic: write to a temp file in the same directory, then rename.

use crate::error::{Result, SymdexError};
use crate::index::SymbolIndex;
use crate::model::DocumentRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const ARTIFACT_FILE: &str = "index.bin";
pub const MANIFEST_FILE: &str = "manifest.json";

const ARTIFACT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IndexManifest {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub source_path: PathBuf,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct ArtifactPayload {
    version: u32,
    documents: BTreeMap<String, DocumentRecord>,
}

pub fn artifact_exists(dir: &Path) -> bool {
    dir.join(ARTIFACT_FILE).is_file() && dir.join(MANIFEST_FILE).is_file()
}

pub fn read_manifest(dir: &Path) -> Result<IndexManifest> {
    let bytes = fs::read(dir.join(MANIFEST_FILE))?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn save(
    index: &SymbolIndex,
    dir: &Path,
    kind: &str,
    name: &str,
    version: Option<&str>,
) -> Result<()> {
    fs::create_dir_all(dir)?;

    let payload = ArtifactPayload {
        version: ARTIFACT_VERSION,
        documents: index.documents().clone(),
    };
    let bytes = postcard::to_stdvec(&payload)
        .map_err(|e| SymdexError::Persistence(format!("artifact encode failed: {}", e)))?;
    write_atomic(&dir.join(ARTIFACT_FILE), &bytes)?;

    let manifest = IndexManifest {
        kind: kind.to_string(),
        name: name.to_string(),
        version: version.map(str::to_string),
        source_path: index.source_root().to_path_buf(),
        indexed_at: Utc::now(),
    };
    write_atomic(&dir.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?)?;

    tracing::debug!("saved index artifact to {}", dir.display());
    Ok(())
}

/// Loads an artifact directory back into a `SymbolIndex`.
///
/// The source root falls back: explicit argument, then the manifest's
/// `sourcePath`, then `project_root`.
pub fn load(dir: &Path, project_root: &Path, source_root: Option<&Path>) -> Result<SymbolIndex> {
    let bytes = fs::read(dir.join(ARTIFACT_FILE))?;
    let payload: ArtifactPayload = postcard::from_bytes(&bytes)
        .map_err(|e| SymdexError::Persistence(format!("artifact decode failed: {}", e)))?;
    if payload.version != ARTIFACT_VERSION {
        return Err(SymdexError::Persistence(format!(
            "unsupported artifact version {}",
            payload.version
        )));
    }

    let manifest_source = read_manifest(dir).ok().map(|m| m.source_path);
    let source_root = source_root
        .map(Path::to_path_buf)
        .or(manifest_source)
        .unwrap_or_else(|| project_root.to_path_buf());

    Ok(SymbolIndex::from_documents(
        project_root.to_path_buf(),
        Some(source_root),
        payload.documents,
    ))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&temp, bytes)?;
    fs::rename(&temp, path)?;
    Ok(())
}
