//! Wire model for the database server protocol
//!
//! Players answer metadata queries over a TCP protocol whose messages are
//! sequences of self-describing fields. This module holds a frozen
//! representation of one message plus a reader/writer that round-trips it
//! byte-identically, which the archive format depends on: archives store the
//! exact bytes a device produced, and must serve them back unchanged.
//!
//! Connection management and request transport live behind the [`crate::client`]
//! seam; this module only knows how to turn bytes into messages and back.

mod field;
mod message;

pub use field::Field;
pub use message::{MenuItemType, MenuTarget, Message, MessageKind, NO_MENU_RESULTS_AVAILABLE};

/// Errors reading or writing wire data
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// The stream ended in the middle of a field or message
    #[error("stream ended in the middle of a message")]
    Truncated,

    /// The bytes do not describe a well-formed field or message
    #[error("malformed wire data: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for ProtoError {
    fn from(e: std::io::Error) -> Self {
        // EOF mid-read means a partial message rather than a transport fault
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtoError::Truncated
        } else {
            ProtoError::Io(e)
        }
    }
}
