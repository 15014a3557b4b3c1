//! The persisted registry document.
//!
//! All loops live in one versioned JSON file. Loads never fail: a missing,
//! unparseable, or wrong-version store reads as empty and the next write
//! rewrites it. Writes go through a sibling temp file and rename so readers
//! never observe a torn document.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::LoopRecord;
use crate::error::Result;
use crate::sanitize;

/// Current store schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// The whole registry: schema version plus every loop keyed by id.
///
/// `BTreeMap` keeps the serialized key order deterministic across rewrites.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryDocument {
    pub version: u32,
    pub loops: BTreeMap<String, LoopRecord>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            loops: BTreeMap::new(),
        }
    }
}

impl RegistryDocument {
    /// An empty document at the current schema version.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Load and normalize the registry document.
///
/// Corruption is not surfaced: anything that cannot be read as a version-1
/// document comes back empty.
pub fn load_document(path: &Path) -> RegistryDocument {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return RegistryDocument::empty(),
    };

    let mut document: RegistryDocument = match serde_json::from_str(&contents) {
        Ok(document) => document,
        Err(e) => {
            log::warn!("unreadable registry store {}: {}; treating as empty", path.display(), e);
            return RegistryDocument::empty();
        }
    };

    if document.version != SCHEMA_VERSION {
        log::warn!(
            "registry store {} has version {}, expected {}; treating as empty",
            path.display(),
            document.version,
            SCHEMA_VERSION
        );
        return RegistryDocument::empty();
    }

    for record in document.loops.values_mut() {
        sanitize::normalize_loop(record);
    }
    document
}

/// Normalize and persist the registry document atomically.
pub fn save_document(path: &Path, document: &mut RegistryDocument) -> Result<()> {
    document.version = SCHEMA_VERSION;
    for record in document.loops.values_mut() {
        sanitize::normalize_loop(record);
    }

    let mut contents = serde_json::to_string_pretty(document)?;
    contents.push('\n');

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_atomic(path, contents.as_bytes())
}

/// Rename-based atomic write: sibling temp file, rename over the target,
/// then restrict the final file to owner-only.
#[cfg(not(windows))]
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    use rand::Rng;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "loops.json".to_string());
    let temp_path = path.with_file_name(format!(
        "{}.{}.{:08x}.tmp",
        name,
        std::process::id(),
        rand::rng().random::<u32>()
    ));

    std::fs::write(&temp_path, contents)?;
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Windows has no atomic rename-over-existing guarantee worth relying on;
/// write the file directly.
#[cfg(windows)]
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    Ok(std::fs::write(path, contents)?)
}
