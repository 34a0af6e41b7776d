//! Binary index file format
//!
//! # File Structure
//!
//! ```text
//! Offset   Size     Type        Description
//! ─────────────────────────────────────────────
//! 0x00     8        [u8; 8]     Magic: "VEIDX001"
//! 0x08     1        u8          Kind: 0 = flat, 1 = mapped
//! 0x09     3        [u8; 3]     Reserved (zero)
//! 0x0C     4        u32 LE      D: Dimensions
//! 0x10     4        u32 LE      N: Number of vectors
//! 0x14     N*D*4    [f32]       Vector data (Little Endian, row-major)
//! ...      N*8      [u64]       Caller ids in row order (mapped only)
//! ...      32       [u8; 32]    SHA-256 of every preceding byte
//! ```
//!
//! Encoding is deterministic: restoring a file and persisting the result
//! reproduces the same bytes.

use std::io::Write;
use std::path::Path;

use ndarray::Array2;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use vitaledge_common::{Result, VectorDbError, VectorId};

use crate::flat::FlatIndex;
use crate::id_map::IdMap;
use crate::index::VectorIndex;
use crate::types::IndexKind;

/// Magic bytes identifying an index file: "VEIDX001"
pub const MAGIC: [u8; 8] = *b"VEIDX001";

/// Header size in bytes: 8 (magic) + 1 (kind) + 3 (reserved) + 4 (dims) + 4 (count) = 20
pub const HEADER_SIZE: usize = 20;

/// Trailing SHA-256 checksum size
pub const CHECKSUM_SIZE: usize = 32;

/// Parsed index file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub kind: IndexKind,
    pub dimensions: u32,
    pub count: u32,
}

impl IndexHeader {
    /// Parse header from the first `HEADER_SIZE` bytes of a file
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(VectorDbError::corrupt("file too small for header"));
        }

        if bytes[0..8] != MAGIC {
            return Err(VectorDbError::corrupt("invalid magic bytes"));
        }

        let kind = IndexKind::from_tag(bytes[8])
            .ok_or_else(|| VectorDbError::corrupt(format!("unknown index kind {}", bytes[8])))?;
        let dimensions = read_u32(&bytes[12..16]);
        let count = read_u32(&bytes[16..20]);

        Ok(Self {
            kind,
            dimensions,
            count,
        })
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8] = self.kind.tag();
        buf[12..16].copy_from_slice(&self.dimensions.to_le_bytes());
        buf[16..20].copy_from_slice(&self.count.to_le_bytes());
        buf
    }

    /// Total file size implied by this header
    ///
    /// Header fields come from untrusted files; a size that does not fit in
    /// `usize` is reported as corruption.
    pub fn file_size(&self) -> Result<usize> {
        let count = self.count as usize;
        let ids = match self.kind {
            IndexKind::Flat => 0,
            IndexKind::Mapped => count
                .checked_mul(std::mem::size_of::<u64>())
                .ok_or_else(size_overflow)?,
        };

        self.vector_bytes()?
            .checked_add(ids)
            .and_then(|size| size.checked_add(HEADER_SIZE + CHECKSUM_SIZE))
            .ok_or_else(size_overflow)
    }

    /// Size of the f32 payload
    fn vector_bytes(&self) -> Result<usize> {
        (self.count as usize)
            .checked_mul(self.dimensions as usize)
            .and_then(|values| values.checked_mul(std::mem::size_of::<f32>()))
            .ok_or_else(size_overflow)
    }
}

/// Index as found on disk
#[derive(Debug, Clone, PartialEq)]
pub enum StoredIndex {
    /// Bare structure without caller ids
    Flat(FlatIndex),

    /// Structure with its id mapping
    Mapped(VectorIndex),
}

impl StoredIndex {
    pub fn kind(&self) -> IndexKind {
        match self {
            Self::Flat(_) => IndexKind::Flat,
            Self::Mapped(_) => IndexKind::Mapped,
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            Self::Flat(flat) => flat.dimension(),
            Self::Mapped(index) => index.dimension(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Flat(flat) => flat.len(),
            Self::Mapped(index) => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize to the on-disk byte layout
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let (base, ids) = match self {
            Self::Flat(flat) => (flat, None),
            Self::Mapped(index) => (index.base(), Some(index.ids())),
        };
        encode(base, ids)
    }

    /// Parse the on-disk byte layout
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

impl VectorIndex {
    /// Serialize to the on-disk byte layout
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(self.base(), Some(self.ids()))
    }
}

fn encode(base: &FlatIndex, ids: Option<&[VectorId]>) -> Result<Vec<u8>> {
    let header = IndexHeader {
        kind: if ids.is_some() { IndexKind::Mapped } else { IndexKind::Flat },
        dimensions: to_u32(base.dimension(), "dimension")?,
        count: to_u32(base.len(), "vector count")?,
    };

    let mut buf = Vec::with_capacity(header.file_size()?);
    buf.extend_from_slice(&header.to_bytes());

    for &value in base.as_array().iter() {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    if let Some(ids) = ids {
        for &id in ids {
            buf.extend_from_slice(&id.to_le_bytes());
        }
    }

    let checksum = Sha256::digest(&buf);
    buf.extend_from_slice(&checksum);

    Ok(buf)
}

fn decode(bytes: &[u8]) -> Result<StoredIndex> {
    let header = IndexHeader::from_bytes(bytes)?;

    if header.dimensions == 0 {
        return Err(VectorDbError::corrupt("zero dimension"));
    }

    let expected = header.file_size()?;
    if bytes.len() != expected {
        return Err(VectorDbError::corrupt(format!(
            "expected {} bytes, found {}",
            expected,
            bytes.len()
        )));
    }

    let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
    if Sha256::digest(body).as_slice() != checksum {
        return Err(VectorDbError::corrupt("checksum mismatch"));
    }

    let count = header.count as usize;
    let dim = header.dimensions as usize;
    let vector_end = HEADER_SIZE + header.vector_bytes()?;

    let values: Vec<f32> = body[HEADER_SIZE..vector_end]
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    let vectors = Array2::from_shape_vec((count, dim), values)
        .map_err(|e| VectorDbError::corrupt(format!("bad vector block: {}", e)))?;
    let base = FlatIndex::from_array(vectors);

    match header.kind {
        IndexKind::Flat => Ok(StoredIndex::Flat(base)),
        IndexKind::Mapped => {
            let ids: Vec<VectorId> = body[vector_end..]
                .chunks_exact(8)
                .map(|chunk| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(chunk);
                    u64::from_le_bytes(raw)
                })
                .collect();
            let ids = IdMap::from_ids(ids)
                .ok_or_else(|| VectorDbError::corrupt("duplicate id in id map"))?;
            Ok(StoredIndex::Mapped(VectorIndex::from_parts(base, ids)))
        }
    }
}

/// Write `index` to `path` atomically
pub fn persist(index: &VectorIndex, path: &Path) -> Result<()> {
    let bytes = index.to_bytes()?;
    write_atomic(path, &bytes)
}

/// Replace `path` with `bytes` via a temporary file in the same directory
///
/// The live file is either the old version or the new one, never a
/// partially written mix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| VectorDbError::Io(e.error))?;

    debug!(
        "Index written: {} ({} bytes, sha256 {})",
        path.display(),
        bytes.len(),
        hex::encode(&bytes[bytes.len().saturating_sub(CHECKSUM_SIZE)..])
    );
    Ok(())
}

/// Read an index file
///
/// A missing file yields `IndexFileMissing`; an unreadable or malformed
/// one yields `IndexCorrupt`.
pub fn restore(path: &Path) -> Result<StoredIndex> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VectorDbError::IndexFileMissing(path.display().to_string()));
        }
        Err(e) => {
            return Err(VectorDbError::corrupt(format!(
                "cannot read {}: {}",
                path.display(),
                e
            )));
        }
    };

    let stored = StoredIndex::from_bytes(&bytes)?;
    info!(
        "Index restored from {} - kind={:?}, dim={}, vectors={}",
        path.display(),
        stored.kind(),
        stored.dimension(),
        stored.len()
    );
    Ok(stored)
}

fn size_overflow() -> VectorDbError {
    VectorDbError::corrupt("header sizes overflow")
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| VectorDbError::invalid_input(format!("{} {} exceeds file format limit", what, value)))
}
