//! Reference types shared across the crate
//!
//! Everything a status packet or a metadata query talks about is identified
//! by small copyable value types: which device, which media slot, which deck
//! surface, which track. Tracks are identified by where they live, not by
//! the device currently playing them, because players can load tracks hosted
//! on another player's media.

use std::fmt;

/// Device (player) number on the network. Players use 1-4; mixers and
/// rekordbox instances use higher numbers.
pub type DeviceId = u8;

/// The physical or logical media slot a track can be loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// No track is loaded at all
    NoTrack,
    /// CD drive
    Cd,
    /// SD card slot
    Sd,
    /// USB port
    Usb,
    /// The rekordbox collection on a linked computer
    Collection,
    /// A slot value we do not recognize
    Unknown,
}

impl SlotKind {
    /// Parse the slot byte carried by status packets
    pub fn from_protocol(value: u8) -> Self {
        match value {
            0 => SlotKind::NoTrack,
            1 => SlotKind::Cd,
            2 => SlotKind::Sd,
            3 => SlotKind::Usb,
            4 => SlotKind::Collection,
            _ => SlotKind::Unknown,
        }
    }

    /// The byte value used on the wire for this slot
    pub fn protocol_number(&self) -> u8 {
        match self {
            SlotKind::NoTrack => 0,
            SlotKind::Cd => 1,
            SlotKind::Sd => 2,
            SlotKind::Usb => 3,
            SlotKind::Collection => 4,
            SlotKind::Unknown => 0xff,
        }
    }

    /// Only removable media slots can have a metadata archive attached
    pub fn supports_archives(&self) -> bool {
        matches!(self, SlotKind::Sd | SlotKind::Usb)
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotKind::NoTrack => "no-track",
            SlotKind::Cd => "CD",
            SlotKind::Sd => "SD",
            SlotKind::Usb => "USB",
            SlotKind::Collection => "collection",
            SlotKind::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// The kind of track a player reports having loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    /// Nothing loaded
    NoTrack,
    /// Audio CD track
    CdDigitalAudio,
    /// A track from a rekordbox database, the only kind we can query
    Rekordbox,
    /// Media file without rekordbox analysis
    Unanalyzed,
    /// A type value we do not recognize
    Unknown,
}

impl TrackType {
    /// Parse the track type byte carried by status packets
    pub fn from_protocol(value: u8) -> Self {
        match value {
            0 => TrackType::NoTrack,
            1 => TrackType::CdDigitalAudio,
            2 => TrackType::Rekordbox,
            5 => TrackType::Unanalyzed,
            _ => TrackType::Unknown,
        }
    }
}

/// State of the media in one of a player's local slots, as reported by its
/// status packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalMediaState {
    /// Media is mounted and readable
    Loaded,
    /// Media is in the process of being ejected
    Unloading,
    /// Nothing is in the slot
    Empty,
}

/// Identifies a media slot on a particular device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub device: DeviceId,
    pub slot: SlotKind,
}

impl SlotRef {
    pub fn new(device: DeviceId, slot: SlotKind) -> Self {
        Self { device, slot }
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player {} {} slot", self.device, self.slot)
    }
}

/// Identifies a playback surface on a device: the main deck (`hot_cue` 0) or
/// one of the numbered hot cue slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeckRef {
    pub device: DeviceId,
    pub hot_cue: u8,
}

impl DeckRef {
    pub fn new(device: DeviceId, hot_cue: u8) -> Self {
        Self { device, hot_cue }
    }

    /// The deck that plays when the user hits the play button
    pub fn main_deck(device: DeviceId) -> Self {
        Self { device, hot_cue: 0 }
    }

    pub fn is_main_deck(&self) -> bool {
        self.hot_cue == 0
    }
}

/// Uniquely identifies a track by the media it lives on and its rekordbox
/// database id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackRef {
    /// The device hosting the media, not necessarily the one playing it
    pub device: DeviceId,
    pub slot: SlotKind,
    pub rekordbox_id: u32,
}

impl TrackRef {
    pub fn new(device: DeviceId, slot: SlotKind, rekordbox_id: u32) -> Self {
        Self { device, slot, rekordbox_id }
    }

    /// The slot this track was loaded from
    pub fn slot_ref(&self) -> SlotRef {
        SlotRef::new(self.device, self.slot)
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track {} in {}", self.rekordbox_id, self.slot_ref())
    }
}

/// A decoded status packet from a player
///
/// Frozen snapshot of the fields the finder cares about; the upstream status
/// publisher owns the full packet format. One of these is enqueued for every
/// packet a player broadcasts, roughly five times per second per device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdjStatus {
    /// The device that sent the packet
    pub device: DeviceId,
    /// What kind of track is loaded on the main deck
    pub track_type: TrackType,
    /// The device hosting the loaded track's media
    pub source_device: DeviceId,
    /// The slot the loaded track came from
    pub source_slot: SlotKind,
    /// rekordbox id of the loaded track, 0 when nothing usable is loaded
    pub rekordbox_id: u32,
    /// State of this player's own USB port
    pub local_usb: LocalMediaState,
    /// State of this player's own SD slot
    pub local_sd: LocalMediaState,
}

impl CdjStatus {
    /// The reference for the loaded track, if the status describes one we
    /// can actually query: rekordbox type, a real slot, and a nonzero id.
    pub fn track_ref(&self) -> Option<TrackRef> {
        if self.track_type != TrackType::Rekordbox {
            return None;
        }
        if matches!(self.source_slot, SlotKind::NoTrack | SlotKind::Unknown) {
            return None;
        }
        if self.rekordbox_id == 0 {
            return None;
        }
        Some(TrackRef::new(self.source_device, self.source_slot, self.rekordbox_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(track_type: TrackType, slot: SlotKind, id: u32) -> CdjStatus {
        CdjStatus {
            device: 2,
            track_type,
            source_device: 3,
            source_slot: slot,
            rekordbox_id: id,
            local_usb: LocalMediaState::Empty,
            local_sd: LocalMediaState::Empty,
        }
    }

    #[test]
    fn test_slot_kind_round_trip() {
        for value in 0..=4u8 {
            let kind = SlotKind::from_protocol(value);
            assert_eq!(kind.protocol_number(), value);
        }
        assert_eq!(SlotKind::from_protocol(9), SlotKind::Unknown);
    }

    #[test]
    fn test_archive_support_is_removable_media_only() {
        assert!(SlotKind::Sd.supports_archives());
        assert!(SlotKind::Usb.supports_archives());
        assert!(!SlotKind::Cd.supports_archives());
        assert!(!SlotKind::Collection.supports_archives());
    }

    #[test]
    fn test_track_ref_requires_rekordbox_track() {
        assert!(status(TrackType::Rekordbox, SlotKind::Usb, 42).track_ref().is_some());
        assert!(status(TrackType::CdDigitalAudio, SlotKind::Cd, 42).track_ref().is_none());
        assert!(status(TrackType::Rekordbox, SlotKind::NoTrack, 42).track_ref().is_none());
        assert!(status(TrackType::Rekordbox, SlotKind::Unknown, 42).track_ref().is_none());
        assert!(status(TrackType::Rekordbox, SlotKind::Usb, 0).track_ref().is_none());
    }

    #[test]
    fn test_track_ref_uses_source_device() {
        let track = status(TrackType::Rekordbox, SlotKind::Usb, 42).track_ref().unwrap();
        assert_eq!(track.device, 3);
        assert_eq!(track.slot_ref(), SlotRef::new(3, SlotKind::Usb));
    }
}
