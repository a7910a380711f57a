//! On-disk archive of a collection.
//!
//! Layout: 4-byte magic, `u32` little-endian format version, then the
//! MessagePack encoding of [`CollectionArchive`]. The blob is always read and
//! written whole.

use crate::core::{Capabilities, CollectionError, ItemId, Result};
use crate::source::SourceDescriptor;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const ARCHIVE_MAGIC: &[u8; 4] = b"ITDK";
pub const ARCHIVE_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

// ============================================================================
// Collection Archive
// ============================================================================

/// Plain snapshot of a collection, detached from any live object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionArchive {
    pub item_type: String,
    pub source: SourceDescriptor,
    pub capabilities: Capabilities,
    pub count_limit: usize,
    pub page_size: usize,
    pub window: Vec<ItemId>,
    pub estimated_total: Option<usize>,
    pub next_offset: usize,
    pub exhausted: bool,
    pub metadata: ArchiveMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub saved_at: DateTime<Utc>,
    pub window_len: usize,
}

impl CollectionArchive {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        item_type: String,
        source: SourceDescriptor,
        capabilities: Capabilities,
        count_limit: usize,
        page_size: usize,
        window: Vec<ItemId>,
        estimated_total: Option<usize>,
        next_offset: usize,
        exhausted: bool,
    ) -> Self {
        let metadata = ArchiveMetadata {
            saved_at: Utc::now(),
            window_len: window.len(),
        };
        Self {
            item_type,
            source,
            capabilities,
            count_limit,
            page_size,
            window,
            estimated_total,
            next_offset,
            exhausted,
            metadata,
        }
    }

    /// Rejects archives whose content breaks the collection invariants.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(CollectionError::PersistenceFailure(
                "archive has a zero page size".to_string(),
            ));
        }
        if self.count_limit != 0 && self.window.len() > self.count_limit {
            return Err(CollectionError::PersistenceFailure(format!(
                "archive window holds {} ids over a limit of {}",
                self.window.len(),
                self.count_limit
            )));
        }
        let mut seen = HashSet::with_capacity(self.window.len());
        if let Some(duplicate) = self.window.iter().find(|id| !seen.insert(*id)) {
            return Err(CollectionError::PersistenceFailure(format!(
                "archive window contains '{}' twice",
                duplicate
            )));
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = rmp_serde::to_vec_named(self).map_err(|e| {
            CollectionError::PersistenceFailure(format!("Failed to serialize archive: {}", e))
        })?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
        bytes.extend_from_slice(ARCHIVE_MAGIC);
        bytes.extend_from_slice(&ARCHIVE_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != ARCHIVE_MAGIC {
            return Err(CollectionError::PersistenceFailure(
                "not a collection archive".to_string(),
            ));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[4..HEADER_LEN]);
        let version = u32::from_le_bytes(version);
        if version != ARCHIVE_VERSION {
            return Err(CollectionError::PersistenceFailure(format!(
                "incompatible archive version {} (expected {})",
                version, ARCHIVE_VERSION
            )));
        }

        let archive: Self = rmp_serde::from_slice(&bytes[HEADER_LEN..]).map_err(|e| {
            CollectionError::PersistenceFailure(format!("Failed to deserialize archive: {}", e))
        })?;
        archive.validate()?;
        Ok(archive)
    }
}

// ============================================================================
// Archive File
// ============================================================================

pub struct ArchiveFile {
    path: PathBuf,
}

impl ArchiveFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Writes the archive atomically: temp file in the target directory,
    /// fsync, rename.
    pub fn save(&self, archive: &CollectionArchive) -> Result<()> {
        let bytes = archive.encode()?;
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| {
            CollectionError::PersistenceFailure(format!("Failed to create archive directory: {}", e))
        })?;

        let mut temp = NamedTempFile::new_in(&parent).map_err(|e| {
            CollectionError::PersistenceFailure(format!("Failed to create temp file: {}", e))
        })?;
        temp.write_all(&bytes).map_err(|e| {
            CollectionError::PersistenceFailure(format!("Failed to write archive: {}", e))
        })?;
        temp.as_file().sync_all().map_err(|e| {
            CollectionError::PersistenceFailure(format!("Failed to sync archive: {}", e))
        })?;
        temp.persist(&self.path).map_err(|e| {
            CollectionError::PersistenceFailure(format!("Failed to rename archive: {}", e))
        })?;

        debug!(
            "Saved {} collection archive ({} ids, {} bytes) to {}",
            archive.item_type,
            archive.window.len(),
            bytes.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn load(&self) -> Result<CollectionArchive> {
        if !self.exists() {
            return Err(CollectionError::PersistenceFailure(format!(
                "no archive at {}",
                self.path.display()
            )));
        }
        let bytes = fs::read(&self.path).map_err(|e| {
            CollectionError::PersistenceFailure(format!(
                "Failed to read archive {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let archive = CollectionArchive::decode(&bytes)?;
        debug!(
            "Loaded {} collection archive ({} ids) from {}",
            archive.item_type,
            archive.window.len(),
            self.path.display()
        );
        Ok(archive)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
