//! On-disk metadata archives
//!
//! An archive is a ZIP container of raw protocol responses for every track
//! on one piece of media, built ahead of a show and attached in place of
//! live queries when the device network is too busy to interrogate. Entries
//! are named by rekordbox id under a fixed prefix, and the stored bytes are
//! exactly what the device returned, so serving from an archive is
//! indistinguishable from asking the device.

mod builder;
mod store;

pub use builder::{build_archive, BuildOutcome, BuildProgress};
pub use store::MetadataArchive;

use crate::client::FetchError;
use crate::proto::ProtoError;

/// Root under which all archive entries are created
pub const ARCHIVE_PREFIX: &str = "BLTMetaCache/";

/// The entry holding the format tag
pub const FORMAT_ENTRY: &str = "BLTMetaCache/version";

/// Contents of the format entry; anything else is not one of our archives
pub const FORMAT_TAG: &str = "BeatLink Metadata Cache version 1";

/// Entry holding the raw metadata menu items of a track
pub fn metadata_entry_name(rekordbox_id: u32) -> String {
    format!("{}metadata/{}", ARCHIVE_PREFIX, rekordbox_id)
}

/// Entry holding one album art image
pub fn artwork_entry_name(artwork_id: u32) -> String {
    format!("{}artwork/{}.jpg", ARCHIVE_PREFIX, artwork_id)
}

/// Entry holding the beat grid payload of a track
pub fn beat_grid_entry_name(rekordbox_id: u32) -> String {
    format!("{}beatGrid/{}", ARCHIVE_PREFIX, rekordbox_id)
}

/// Entry holding the raw cue list response of a track
pub fn cue_list_entry_name(rekordbox_id: u32) -> String {
    format!("{}cueList/{}", ARCHIVE_PREFIX, rekordbox_id)
}

/// Entry holding the raw waveform preview response of a track
pub fn waveform_preview_entry_name(rekordbox_id: u32) -> String {
    format!("{}wavePrev/{}", ARCHIVE_PREFIX, rekordbox_id)
}

/// Entry holding the raw waveform detail response of a track
pub fn waveform_detail_entry_name(rekordbox_id: u32) -> String {
    format!("{}waveform/{}", ARCHIVE_PREFIX, rekordbox_id)
}

/// Errors reading or building archives
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The file is missing the format tag or carries a different one
    #[error("not a metadata archive: {0}")]
    BadFormat(String),

    /// A track listing produced a row that is not a track entry
    #[error("unexpected item in track listing: {0}")]
    UnexpectedItem(String),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("wire data error: {0}")]
    Proto(#[from] ProtoError),

    #[error("container error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
