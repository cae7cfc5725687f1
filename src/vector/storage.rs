//! Memory-mapped embedding file for chunk vectors.
//!
//! Each on-disk index keeps its chunk embeddings in a single append-only
//! `embeddings.vec` file. Reads go through a memory map, so opening an index
//! costs one header parse and the OS page cache does the rest.
//!
//! # Storage Format
//!
//! - Header (16 bytes): magic `QVEC`, version, dimension, record count
//! - Records: `u32` chunk id followed by `dimension` little-endian f32 values
//!
//! The vector payload of a record is exactly the portable embedding blob
//! produced by [`crate::vector::encode_embedding`].

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::MmapOptions;
use thiserror::Error;

use crate::vector::codec::{BYTES_PER_F32, decode_embedding, encode_embedding};
use crate::vector::types::{ChunkId, Embedding, VectorDimension, VectorError};

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the storage header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes to identify embedding files.
const MAGIC_BYTES: &[u8; 4] = b"QVEC";

/// Number of bytes per chunk ID (u32).
const BYTES_PER_ID: usize = 4;

/// Offset of the record count inside the header.
const COUNT_OFFSET: u64 = 12;

/// Errors specific to embedding file operations.
#[derive(Error, Debug)]
pub enum VectorStorageError {
    #[error("IO error: {0}\nSuggestion: Check disk space and file permissions")]
    Io(#[from] io::Error),

    #[error(
        "Invalid embedding file {path}: {reason}\nSuggestion: The index may be corrupted, re-import it"
    )]
    InvalidFormat { path: PathBuf, reason: String },

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),
}

/// Append-only embedding file for one index.
#[derive(Debug, Clone)]
pub struct EmbeddingFile {
    path: PathBuf,
    dimension: VectorDimension,
    vector_count: usize,
}

impl EmbeddingFile {
    /// Opens an existing embedding file and validates its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VectorStorageError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // SAFETY: the file is only appended to by this process while the
        // owning store holds its write lock; readers map a fresh view.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        let (dimension, vector_count) = read_header(&path, &mmap)?;

        Ok(Self {
            path,
            dimension,
            vector_count,
        })
    }

    /// Creates a new, empty embedding file, replacing any existing one.
    pub fn create(
        path: impl AsRef<Path>,
        dimension: VectorDimension,
    ) -> Result<Self, VectorStorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = File::create(&path)?;
        file.write_all(MAGIC_BYTES)?;
        file.write_all(&STORAGE_VERSION.to_le_bytes())?;
        file.write_all(&(dimension.get() as u32).to_le_bytes())?;
        file.write_all(&0u32.to_le_bytes())?;
        file.flush()?;

        Ok(Self {
            path,
            dimension,
            vector_count: 0,
        })
    }

    /// Opens the file if it exists, otherwise creates it.
    ///
    /// An existing file must have been written with the same dimension.
    pub fn open_or_create(
        path: impl AsRef<Path>,
        dimension: VectorDimension,
    ) -> Result<Self, VectorStorageError> {
        let path = path.as_ref();
        if path.exists() {
            let storage = Self::open(path)?;
            if storage.dimension != dimension {
                return Err(VectorError::DimensionMismatch {
                    expected: dimension.get(),
                    actual: storage.dimension.get(),
                }
                .into());
            }
            Ok(storage)
        } else {
            Self::create(path, dimension)
        }
    }

    /// Appends a batch of vectors and updates the header count.
    ///
    /// All vectors are validated before anything is written.
    pub fn write_batch(&mut self, vectors: &[(ChunkId, &[f32])]) -> Result<(), VectorStorageError> {
        for (_, vector) in vectors {
            self.dimension.validate_vector(vector)?;
        }

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let mut buffer = Vec::with_capacity(vectors.len() * self.record_size());
        for (id, vector) in vectors {
            buffer.extend_from_slice(&id.to_bytes());
            buffer.extend_from_slice(&encode_embedding(vector));
        }
        file.write_all(&buffer)?;
        file.flush()?;

        self.vector_count += vectors.len();
        self.update_header_count()?;
        Ok(())
    }

    /// Reads every record in file order.
    pub fn read_all_vectors(&self) -> Result<Vec<(ChunkId, Embedding)>, VectorStorageError> {
        let file = File::open(&self.path)?;
        // SAFETY: see `open`.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        let (_, vector_count) = read_header(&self.path, &mmap)?;

        let record_size = self.record_size();
        let body = &mmap[HEADER_SIZE..];
        if body.len() != vector_count * record_size {
            return Err(self.invalid(format!(
                "header declares {vector_count} records but body holds {} bytes",
                body.len()
            )));
        }

        let mut vectors = Vec::with_capacity(vector_count);
        for record in body.chunks_exact(record_size) {
            let id = ChunkId::from_bytes([record[0], record[1], record[2], record[3]])
                .ok_or_else(|| self.invalid("record with zero chunk id".to_string()))?;
            let embedding = decode_embedding(&record[BYTES_PER_ID..])?;
            vectors.push((id, embedding));
        }

        Ok(vectors)
    }

    /// Returns the number of vectors stored.
    #[must_use]
    pub fn vector_count(&self) -> usize {
        self.vector_count
    }

    /// Returns the vector dimension.
    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Returns the size of the storage file in bytes.
    pub fn file_size(&self) -> Result<u64, io::Error> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn record_size(&self) -> usize {
        BYTES_PER_ID + self.dimension.get() * BYTES_PER_F32
    }

    fn invalid(&self, reason: String) -> VectorStorageError {
        VectorStorageError::InvalidFormat {
            path: self.path.clone(),
            reason,
        }
    }

    fn update_header_count(&self) -> Result<(), VectorStorageError> {
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        file.write_all(&(self.vector_count as u32).to_le_bytes())?;
        file.flush()?;
        Ok(())
    }
}

fn read_header(path: &Path, bytes: &[u8]) -> Result<(VectorDimension, usize), VectorStorageError> {
    let invalid = |reason: &str| VectorStorageError::InvalidFormat {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if bytes.len() < HEADER_SIZE {
        return Err(invalid("file too small to contain header"));
    }
    if &bytes[0..4] != MAGIC_BYTES {
        return Err(invalid("invalid magic bytes"));
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != STORAGE_VERSION {
        return Err(VectorError::VersionMismatch {
            expected: STORAGE_VERSION,
            actual: version,
        }
        .into());
    }

    let dim_value = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let dimension = VectorDimension::new(dim_value as usize)?;
    let vector_count = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;

    Ok((dimension, vector_count))
}
