//! Memory mappings that back the pipeline ring buffers.
//!
//! Both sides of a ring buffer mutate it (the producer marks slots filled,
//! the consumer marks them free), so every mapping here is read-write.
//! A region is either backed by a file, which lets separate processes
//! attach to the same buffer, or anonymous, for stages that are threads
//! of one process.

use memmap2::{MmapMut, MmapOptions};
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

pub struct MmapRegion {
    _file: Option<File>,
    mmap: MmapMut,
}

impl MmapRegion {
    /// Create (or truncate) a file of `size_bytes` and map it read-write.
    /// The new region reads as zeroes.
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size_bytes as u64)?;

        // SAFETY: the file was just truncated and sized by us; nobody else
        // can have resized it underneath the mapping yet.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            _file: Some(file),
            mmap,
        })
    }

    /// Open an existing file and map it read-write.
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        // SAFETY: callers attach to regions created by `create_rw`, which are
        // never resized after creation.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            _file: Some(file),
            mmap,
        })
    }

    /// Map `size_bytes` of zeroed anonymous memory.
    pub fn anonymous(size_bytes: usize) -> io::Result<Self> {
        let mmap = MmapOptions::new().len(size_bytes).map_anon()?;
        Ok(Self { _file: None, mmap })
    }

    /// Return raw pointer to start of the mapped data
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn is_file_backed(&self) -> bool {
        self._file.is_some()
    }

    /// Flush outstanding changes of a file-backed region to disk.
    pub fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }
}
