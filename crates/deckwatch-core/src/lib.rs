//! Deckwatch Core - Track metadata tracking for Pro DJ Link device networks
//!
//! Watches the status stream of a player network, keeps a hot cache of the
//! metadata for every loaded track, and can bake that metadata into on-disk
//! archives that answer queries when the network cannot.

pub mod archive;
pub mod client;
pub mod error;
pub mod finder;
pub mod metadata;
pub mod proto;
pub mod types;

#[cfg(test)]
mod testutil;

pub use archive::{BuildOutcome, BuildProgress, MetadataArchive};
pub use client::{Client, ClientPool, DeviceRegistry, FetchError};
pub use error::FinderError;
pub use finder::listeners::{
    ArchiveListener, LifecycleListener, MetadataListener, MetadataUpdate, MountListener,
};
pub use finder::{FinderConfig, MetadataFinder, StatusInlet};
pub use metadata::{AlbumArt, BeatGrid, CueEntry, CueList, TrackMetadata, WaveformDetail, WaveformPreview};
pub use types::{CdjStatus, DeckRef, DeviceId, LocalMediaState, SlotKind, SlotRef, TrackRef, TrackType};
