//! Panoseti file format (PFF): a stream of self-framed TEXT and IMAGE
//! records, plus the naming scheme for the files and directories that
//! hold them.

mod codec;
mod error;
mod names;

pub use codec::{
    PFF_TYPE_IMAGE, PFF_TYPE_TEXT, RecordKind, read_image, read_image_into, read_text, write_image,
    write_text,
};
pub use error::{NameError, PffError};
pub use names::{DataProduct, DirnameInfo, FilenameInfo, PFF_EXTENSION, TIMESTAMP_FORMAT};
