use std::io;
use std::path::PathBuf;
use strata_pff::NameError;

/// Failure to create or replace a file or directory the router needs.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid session directory name")]
    SessionName(#[source] NameError),

    #[error("failed to create directory '{}'", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create file '{}'", path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to flush '{}'", path.display())]
    Flush {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why a single record was not written.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("no file set for module {0}")]
    UnknownModule(u16),

    #[error("module {module}: unsupported image bit depth {mode}")]
    UnsupportedDepth { module: u16, mode: u8 },

    #[error("module {module}: unsupported acquisition mode {acq_mode:#x} for coincidence record")]
    UnsupportedAcqMode { module: u16, acq_mode: u8 },

    #[error("module {module}: payload holds {got} bytes, record needs {need}")]
    ShortPayload { module: u16, need: usize, got: usize },

    #[error("module {module}: could not create file set")]
    Create {
        module: u16,
        #[source]
        source: StoreError,
    },

    #[error("module {module}: write failed")]
    Write {
        module: u16,
        #[source]
        source: io::Error,
    },

    #[error("write to global metadata file failed")]
    GlobalWrite(#[source] io::Error),

    #[error("rotation failed")]
    Rotate(#[source] StoreError),
}

impl RecordError {
    /// Only a failed rotation leaves the router without a file to write to.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecordError::Rotate(_))
    }
}
