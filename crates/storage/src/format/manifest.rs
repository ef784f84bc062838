//! MANIFEST file format
//!
//! The MANIFEST records which on-disk layout a store uses, so an older
//! store can be migrated before anything reads it.
//!
//! # Format
//!
//! ```text
//! +--------------------+
//! | Magic: "DCMF"      | 4 bytes
//! | Layout Version     | 4 bytes (u32 LE)
//! | Store UUID         | 16 bytes
//! | CRC32              | 4 bytes
//! +--------------------+
//! ```

use byteorder::{ByteOrder, LittleEndian};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// MANIFEST magic bytes: "DCMF"
pub const MANIFEST_MAGIC: [u8; 4] = *b"DCMF";

/// Serialized MANIFEST size in bytes
pub const MANIFEST_SIZE: usize = 28;

/// Physical metadata of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Manifest {
    /// Layout version the directory tree follows
    pub layout_version: u32,
    /// Unique store identifier (generated on creation)
    pub store_uuid: [u8; 16],
}

impl Manifest {
    /// Create a MANIFEST for a fresh store
    pub fn new(layout_version: u32, store_uuid: [u8; 16]) -> Self {
        Manifest {
            layout_version,
            store_uuid,
        }
    }

    /// Serialize MANIFEST to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; MANIFEST_SIZE];
        bytes[0..4].copy_from_slice(&MANIFEST_MAGIC);
        LittleEndian::write_u32(&mut bytes[4..8], self.layout_version);
        bytes[8..24].copy_from_slice(&self.store_uuid);
        let crc = crc32fast::hash(&bytes[..24]);
        LittleEndian::write_u32(&mut bytes[24..28], crc);
        bytes
    }

    /// Deserialize MANIFEST from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        if bytes.len() < MANIFEST_SIZE {
            return Err(ManifestError::TooShort);
        }
        if bytes[0..4] != MANIFEST_MAGIC {
            return Err(ManifestError::InvalidMagic);
        }

        let stored_crc = LittleEndian::read_u32(&bytes[24..28]);
        let computed_crc = crc32fast::hash(&bytes[..24]);
        if stored_crc != computed_crc {
            return Err(ManifestError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        let mut store_uuid = [0u8; 16];
        store_uuid.copy_from_slice(&bytes[8..24]);
        Ok(Manifest {
            layout_version: LittleEndian::read_u32(&bytes[4..8]),
            store_uuid,
        })
    }
}

/// MANIFEST persistence manager
///
/// Handles atomic MANIFEST persistence using write-fsync-rename.
#[derive(Debug)]
pub struct ManifestManager {
    path: PathBuf,
    manifest: Manifest,
}

impl ManifestManager {
    /// Write a MANIFEST for a new store
    pub fn create(path: PathBuf, manifest: Manifest) -> Result<Self, ManifestError> {
        let manager = ManifestManager { path, manifest };
        manager.persist()?;
        Ok(manager)
    }

    /// Load an existing MANIFEST
    pub fn load(path: PathBuf) -> Result<Self, ManifestError> {
        let bytes = std::fs::read(&path)?;
        let manifest = Manifest::from_bytes(&bytes)?;
        Ok(ManifestManager { path, manifest })
    }

    /// Check if a MANIFEST exists at the given path
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Persist MANIFEST atomically (write-fsync-rename)
    pub fn persist(&self) -> Result<(), ManifestError> {
        let temp_path = self.path.with_extension("tmp");

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&self.manifest.to_bytes())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            if parent.exists() {
                File::open(parent)?.sync_all()?;
            }
        }
        Ok(())
    }

    /// Get the current manifest
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Record a completed layout migration
    pub fn set_layout_version(&mut self, layout_version: u32) -> Result<(), ManifestError> {
        let previous = self.manifest.layout_version;
        self.manifest.layout_version = layout_version;
        if let Err(e) = self.persist() {
            self.manifest.layout_version = previous;
            return Err(e);
        }
        Ok(())
    }
}

/// Errors that can occur with MANIFEST operations
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// MANIFEST file too short
    #[error("MANIFEST too short")]
    TooShort,

    /// Invalid magic bytes
    #[error("Invalid magic bytes")]
    InvalidMagic,

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Expected CRC32 value (from file)
        expected: u32,
        /// Computed CRC32 value
        computed: u32,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ManifestError> for doccache_core::Error {
    fn from(e: ManifestError) -> Self {
        match e {
            ManifestError::Io(io) => doccache_core::Error::io("accessing MANIFEST", io),
            other => doccache_core::Error::Corruption(format!("MANIFEST: {}", other)),
        }
    }
}
