pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while reading or writing a stream.
///
/// All of these are terminal for the operation that produced them. A failed
/// decode never yields a partial graph, and a failed encode leaves the sink
/// without a `MessageEnd` record.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown record type 0x{tag:02x} at offset {offset:#x}")]
    UnknownRecordType { tag: u8, offset: u64 },

    #[error("Invalid stream header: {0}")]
    InvalidHeader(String),

    #[error("Reference to undefined object id {id}")]
    DanglingReference { id: i32 },

    #[error("Malformed stream at offset {offset:#x}: {reason}")]
    MalformedStream { offset: u64, reason: String },

    #[error("Value cannot be encoded: {0}")]
    UnsupportedValue(String),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn malformed(offset: u64, reason: impl Into<String>) -> Error {
        Error::MalformedStream {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(reason: impl Into<String>) -> Error {
        Error::UnsupportedValue(reason.into())
    }

    /// Turns a short read into `MalformedStream`, leaving other errors alone.
    pub(crate) fn truncated_at(self, offset: u64) -> Error {
        match self {
            Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Error::malformed(offset, "unexpected end of stream")
            }
            other => other,
        }
    }

    pub fn is_truncation(&self) -> bool {
        matches!(self, Error::MalformedStream { reason, .. } if reason == "unexpected end of stream")
    }
}
