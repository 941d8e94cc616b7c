//! Per-module PFF file sets, record routing and size-based rotation.

mod data_file;
mod error;
mod file_set;
mod render;
mod router;

pub use data_file::DataFile;
pub use error::{RecordError, StoreError};
pub use file_set::{FileSet, ModuleFile};
pub use render::{COINC_IMAGE_BYTES, coinc_header_text, image_header_text};
pub use router::{DYNAMIC_META_FILE, FileRouter, RouterConfig, RouterStats};
