//! The closed error taxonomy shared by every layer of the virtual file
//! system. Every public, fallible operation returns `Result<T, Error>`;
//! there is no out-of-band error mechanism (see spec.md section 7).

use thiserror::Error;

/// Reserved error kinds. Names, not numeric values: the negative-integer
/// syscall ABI is a calling-convention detail that belongs to the (out of
/// scope) syscall surface, not to this crate.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("bad file descriptor")]
    BadFileDescriptor,
    #[error("out of memory")]
    OutOfMemory,
    #[error("operation not supported")]
    NotSupported,
    #[error("no space left on device")]
    NoSpace,
    #[error("file too large")]
    FileTooLarge,
    #[error("no such entry")]
    NoSuchEntry,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("already exists")]
    AlreadyExists,
    #[error("address in use")]
    AddressInUse,
    #[error("bad address")]
    Fault,
    #[error("illegal seek")]
    IllegalSeek,
    #[error("stale inode")]
    Stale,
    #[error("permission denied")]
    PermissionDenied,
    #[error("no such device")]
    NoSuchDevice,
    #[error("no such device or address")]
    NoSuchDeviceOrAddress,
}

/// An error carrying its kind plus an optional static context string.
/// Cheap to construct and to propagate: no heap allocation beyond what
/// `ErrorKind` itself needs.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
#[error("{kind}{}", context.map(|c| format!(": {c}")).unwrap_or_default())]
pub struct Error {
    pub kind: ErrorKind,
    pub context: Option<&'static str>,
}

impl Error {
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub const fn with_context(kind: ErrorKind, context: &'static str) -> Self {
        Self {
            kind,
            context: Some(context),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Shorthand for constructing an `Err(Error::new(kind))`.
pub fn err<T>(kind: ErrorKind) -> Result<T> {
    Err(Error::new(kind))
}

pub fn err_ctx<T>(kind: ErrorKind, context: &'static str) -> Result<T> {
    Err(Error::with_context(kind, context))
}
