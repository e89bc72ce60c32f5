//! Error types emitted while decoding packages and their resources.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The bytes do not follow the expected layout.
    #[error("format error: {0}")]
    Format(String),

    /// A read or seek ran past the end of the buffer.
    #[error(
        "index out of bounds: needs {needed_bits} bits, {remaining} bytes left at position {position} (buffer length {length})"
    )]
    Bounds {
        needed_bits: usize,
        remaining: usize,
        position: usize,
        length: usize,
    },

    /// A recognised variant of the format that is not implemented.
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    BinRw(#[from] binrw::Error),
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Unsupported assets can be skipped; anything else means the data is broken.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }
}

pub type Result<T> = core::result::Result<T, Error>;
