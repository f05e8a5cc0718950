//! Error types for numtable readers and writers.

use std::fmt;
use std::io;

/// The result type used throughout numtable.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for numtable operations.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred in the underlying source or sink.
    Io(io::Error),

    /// The requested key is not present in the table.
    NotFound,

    /// An append was attempted with a key that is not strictly greater
    /// than the previously appended key.
    OutOfOrder {
        /// The largest key appended so far.
        last: u64,
        /// The offending key.
        key: u64,
    },

    /// The writer is already closed.
    Closed,

    /// The file footer does not end in the expected magic byte sequence.
    BadMagic,

    /// A block carries an unknown compression tag byte.
    BadCompression(u8),

    /// Data corruption was detected.
    Corruption(String),

    /// The iterator was released and can no longer be used.
    Released,
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Returns true if this is a [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::NotFound => write!(f, "Key not found"),
            Error::OutOfOrder { last, key } => {
                write!(f, "Out-of-order append: {} must be > {}", key, last)
            }
            Error::Closed => write!(f, "Writer is closed"),
            Error::BadMagic => write!(f, "Bad magic byte sequence"),
            Error::BadCompression(tag) => write!(f, "Bad compression codec: {:#04x}", tag),
            Error::Corruption(msg) => write!(f, "Data corruption: {}", msg),
            Error::Released => write!(f, "Iterator was released"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<snap::Error> for Error {
    fn from(err: snap::Error) -> Self {
        Error::Corruption(err.to_string())
    }
}
