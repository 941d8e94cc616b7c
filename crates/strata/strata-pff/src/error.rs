use crate::codec::RecordKind;

#[derive(Debug, thiserror::Error)]
pub enum PffError {
    #[error("expected {expected:?} record, found tag byte {found:#04x}")]
    BadType { expected: RecordKind, found: u8 },

    #[error("short read in {kind:?} record")]
    Read { kind: RecordKind },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NameError {
    #[error("malformed name component '{0}'")]
    BadComponent(String),

    #[error("unknown name key '{0}'")]
    UnknownKey(String),

    #[error("missing name key '{0}'")]
    MissingKey(&'static str),

    #[error("bad value '{value}' for key '{key}'")]
    BadValue { key: &'static str, value: String },

    #[error("file name must end in .{0}")]
    BadExtension(&'static str),
}
