/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Memory-mapped file wrappers.
//!
//! Writers hold a [`MappedFile`]: a shared writable mapping of a fixed-length
//! file, forced to disk explicitly after each committed write. Query-time
//! readers (the replay query, tooling) take their own [`ReadOnlyMappedFile`]
//! over the same path; on the platforms this targets, shared mappings of the
//! same file observe each other's stores, so the seqlock protocol works
//! across processes.

use ferrofix_core::error::StoreError;
use memmap2::{Mmap, MmapMut};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// A writable shared memory mapping of fixed length.
#[derive(Debug)]
pub struct MappedFile {
    mmap: MmapMut,
    path: PathBuf,
}

impl MappedFile {
    /// Opens (creating if absent) `path` and maps exactly `length` bytes.
    ///
    /// A shorter existing file is extended with zeros; a longer one keeps its
    /// tail on disk but only `length` bytes are mapped.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] on any filesystem failure.
    pub fn create_or_map(path: impl AsRef<Path>, length: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| io_error(&path, &e))?;

        let existing = file.metadata().map_err(|e| io_error(&path, &e))?.len();
        if existing < length as u64 {
            file.set_len(length as u64).map_err(|e| io_error(&path, &e))?;
        }

        // SAFETY: the mapping is backed by a regular file we own read-write;
        // length is bounded by the file length set above.
        let mmap = unsafe {
            memmap2::MmapOptions::new()
                .len(length)
                .map_mut(&file)
                .map_err(|e| io_error(&path, &e))?
        };

        Ok(Self { mmap, path })
    }

    /// Returns the mapped bytes.
    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        &self.mmap
    }

    /// Returns the mapped bytes mutably.
    #[inline]
    #[must_use]
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Returns the mapped length in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.mmap.len()
    }

    /// Path of the underlying file.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the mapping to durable storage.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the msync fails.
    pub fn force(&self) -> Result<(), StoreError> {
        self.mmap.flush().map_err(|e| io_error(&self.path, &e))
    }

    /// Copies the current mapped bytes to `backup`.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the backup cannot be written.
    pub fn transfer_to(&self, backup: impl AsRef<Path>) -> Result<(), StoreError> {
        std::fs::write(backup.as_ref(), &self.mmap[..])
            .map_err(|e| io_error(backup.as_ref(), &e))
    }
}

/// A read-only mapping taken by query-time readers.
#[derive(Debug)]
pub struct ReadOnlyMappedFile {
    mmap: Mmap,
}

impl ReadOnlyMappedFile {
    /// Maps an existing file read-only, in full.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the file cannot be opened or mapped.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| io_error(path, &e))?;
        // SAFETY: read-only mapping of a regular file.
        let mmap = unsafe { Mmap::map(&file).map_err(|e| io_error(path, &e))? };
        Ok(Self { mmap })
    }

    /// Returns the mapped bytes.
    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        &self.mmap
    }
}

fn io_error(path: &Path, error: &std::io::Error) -> StoreError {
    StoreError::Io(format!("{}: {error}", path.display()))
}
