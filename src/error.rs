//! The flash driver's single flat error type.
//!
//! Every fallible operation in this crate returns [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. Lower layers (the archive adapter, the USB
//! transport) convert their own errors into [`Error::Io`], [`Error::Zip`] or
//! [`Error::Transport`] at the boundary; nothing here is retried automatically.

use thiserror::Error;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No entry ending in `/script.txt` was found in the archive.
    #[error("archive does not contain a script.txt entry")]
    ScriptMissing,

    /// A script line failed to tokenize, or had the wrong number of tokens
    /// for its keyword.
    #[error("malformed script line {line}")]
    MalformedLine { line: usize },

    /// A script line's first token is not a recognized keyword.
    #[error("unknown script command at line {line}")]
    UnknownCommand { line: usize },

    /// A `Flash` or `CheckRequirements` command names an entry that does not
    /// exist in the archive.
    #[error("archive is missing referenced entry '{file_ref}'")]
    MissingEntry { file_ref: String },

    /// The device does not satisfy the `check-requirements` manifest.
    #[error("device does not satisfy requirements: {detail}")]
    RequirementsFailed { detail: String },

    /// `check-var` returned a value other than the one the script expects.
    #[error("variable '{name}' mismatch: expected '{expected}', got '{actual}'")]
    VarMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// `current-slot` reported something other than `a` or `b`.
    #[error("current-slot reported an unknown value '{value}'")]
    UnknownSlot { value: String },

    /// [`crate::chunked_writer::ChunkedWriter::init`] was called with a size
    /// that does not match the declared stream length.
    #[error("chunked writer initialized with a size that does not match the declared stream length")]
    SizeMismatch,

    /// More bytes were written to a [`crate::chunked_writer::ChunkedWriter`]
    /// than its declared stream length.
    #[error("chunked writer received more bytes than its declared stream length")]
    StreamOverflow,

    /// A lower-layer fastboot transport failure, opaque to the core.
    #[error("fastboot transport error: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// No USB device matching the fastboot interface class was found.
    #[error("no fastboot-mode USB device found")]
    DeviceNotFound,

    /// An archive entry that was expected to be UTF-8 text was not.
    #[error("entry '{0}' is not valid UTF-8")]
    InvalidUtf8(String),

    /// The archive container could not be parsed as a zip file.
    #[error("malformed zip archive: {0}")]
    Zip(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Usb(#[from] rusb::Error),
}

impl Error {
    /// Wrap an arbitrary transport-layer error so it can cross the
    /// [`crate::connection::FastbootSession`] boundary as an [`Error`].
    pub fn transport<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Transport {
            source: Box::new(source),
        }
    }
}
