//! Mirrors key/value metadata into the session's PFF files.

mod mirror;
mod resp;
mod store;

pub use mirror::{MetadataMirror, MirrorStats, UPDATED_KEY, metadata_text};
pub use resp::{Reply, RespClient, read_reply};
pub use store::{KvError, KvStore, MemoryStore};
