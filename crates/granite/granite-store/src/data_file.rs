use crate::error::StoreError;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use strata_pff::{FilenameInfo, write_image, write_text};
use tracing::info;

/// One open PFF file and the name it was created under.
#[derive(Debug)]
pub struct DataFile {
    dir: PathBuf,
    info: FilenameInfo,
    writer: BufWriter<File>,
    written: u64,
}

pub(crate) fn create_file(path: &Path) -> Result<BufWriter<File>, StoreError> {
    let file = File::create(path).map_err(|source| StoreError::CreateFile {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "created data file");
    Ok(BufWriter::new(file))
}

impl DataFile {
    /// Creates (truncating) `dir/<info>`.
    pub fn create(dir: &Path, info: FilenameInfo) -> Result<Self, StoreError> {
        let writer = create_file(&dir.join(info.to_string()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            info,
            writer,
            written: 0,
        })
    }

    pub fn info(&self) -> &FilenameInfo {
        &self.info
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(self.info.to_string())
    }

    /// Bytes appended since the file was created, buffered or not.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn append_text(&mut self, text: &[u8]) -> io::Result<()> {
        let n = write_text(&mut self.writer, text)?;
        self.written += n as u64;
        Ok(())
    }

    pub fn append_image(&mut self, image: &[u8]) -> io::Result<()> {
        let n = write_image(&mut self.writer, image)?;
        self.written += n as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.writer.flush().map_err(|source| StoreError::Flush {
            path: self.path(),
            source,
        })
    }

    /// Flushes and closes this file, then continues in its successor
    /// (same product and module, `seqno + 1`, start time `now`).
    pub fn rotate(&mut self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.flush()?;
        let next = self.info.successor(now);
        self.writer = create_file(&self.dir.join(next.to_string()))?;
        self.info = next;
        self.written = 0;
        Ok(())
    }
}
