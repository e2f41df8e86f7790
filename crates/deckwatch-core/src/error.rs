//! Crate-level error type
//!
//! Background work never surfaces these: the handler thread and fetch
//! workers log and carry on. They are returned from the user-driven calls
//! (attach, create, explicit requests), which are the only places a caller
//! can meaningfully react.

use crate::archive::ArchiveError;
use crate::client::FetchError;

#[derive(Debug, thiserror::Error)]
pub enum FinderError {
    /// An operation that needs the finder running was called while stopped
    #[error("metadata finder is not running")]
    NotRunning,

    /// An argument failed validation
    #[error("invalid argument: {0}")]
    BadArgument(String),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
