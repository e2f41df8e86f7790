//! Track metadata and its companion blobs
//!
//! Every type here keeps the raw response it was parsed from. The parsed
//! fields are conveniences for display and matching; the raw messages are
//! authoritative, because archives must store byte-identical copies of what
//! the device returned.

pub mod fetch;

use crate::proto::{MenuItemType, Message, MessageKind};
use crate::types::TrackRef;
use std::fmt;

/// One cue or loop position within a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueEntry {
    /// Position of the cue in milliseconds from the start of the track
    pub cue_time_ms: u32,
    /// Which hot cue button this is assigned to; 0 means a memory cue
    pub hot_cue_number: u8,
}

/// The memory points and hot cues stored with a track
///
/// Cue entry wire layout, 36 bytes each within the response's payload blob:
/// byte 0 hot cue number, byte 4 status (0 = inactive, skipped), bytes 8-11
/// big-endian cue time in ms, bytes 12-15 loop end time, remainder reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueList {
    pub entries: Vec<CueEntry>,
    /// The single raw response this was parsed from, re-emitted verbatim
    /// into archives
    pub raw_message: Message,
}

/// Size of one serialized cue entry
const CUE_ENTRY_LEN: usize = 36;

impl CueList {
    /// Parse a cue list response. Fails if the message carries no payload
    /// blob; inactive entries are skipped.
    pub fn from_message(raw_message: Message) -> Result<CueList, String> {
        let payload = raw_message
            .argument_binary(3)
            .ok_or_else(|| "cue list response carries no payload blob".to_string())?;
        let mut entries = Vec::new();
        for chunk in payload.chunks_exact(CUE_ENTRY_LEN) {
            if chunk[4] == 0 {
                continue;
            }
            let cue_time_ms = u32::from_be_bytes([chunk[8], chunk[9], chunk[10], chunk[11]]);
            entries.push(CueEntry { cue_time_ms, hot_cue_number: chunk[0] });
        }
        Ok(CueList { entries, raw_message })
    }
}

/// Everything we know about one loaded track
///
/// Immutable after construction. `raw_items` holds exactly the menu item
/// messages the server returned, in order; the named fields are derived from
/// them and never authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub track_ref: TrackRef,
    pub raw_items: Vec<Message>,
    pub cue_list: Option<CueList>,

    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub comment: Option<String>,
    pub key: Option<String>,
    pub date_added: Option<String>,
    pub duration_seconds: u32,
    /// Tempo in hundredths of a beat per minute
    pub tempo_cbpm: u32,
    /// Zero to five stars
    pub rating: u8,
    /// 0 when the track has no album art
    pub artwork_id: u32,
}

impl TrackMetadata {
    /// Build metadata from the rendered menu items of a metadata query
    pub fn new(track_ref: TrackRef, raw_items: Vec<Message>, cue_list: Option<CueList>) -> Self {
        let mut metadata = TrackMetadata {
            track_ref,
            raw_items: Vec::new(),
            cue_list,
            title: None,
            artist: None,
            album: None,
            genre: None,
            comment: None,
            key: None,
            date_added: None,
            duration_seconds: 0,
            tempo_cbpm: 0,
            rating: 0,
            artwork_id: 0,
        };
        for item in &raw_items {
            if item.kind != MessageKind::MenuItem {
                continue;
            }
            let label = || item.argument_text(3).map(str::to_string);
            match item.menu_item_type() {
                Some(MenuItemType::Title) => {
                    metadata.title = label();
                    if let Some(id) = item.argument_number(8) {
                        metadata.artwork_id = id as u32;
                    }
                }
                Some(MenuItemType::Artist) => metadata.artist = label(),
                Some(MenuItemType::AlbumTitle) => metadata.album = label(),
                Some(MenuItemType::Genre) => metadata.genre = label(),
                Some(MenuItemType::Comment) => metadata.comment = label(),
                Some(MenuItemType::Key) => metadata.key = label(),
                Some(MenuItemType::DateAdded) => metadata.date_added = label(),
                Some(MenuItemType::Duration) => {
                    metadata.duration_seconds = item.argument_number(1).unwrap_or(0) as u32;
                }
                Some(MenuItemType::Tempo) => {
                    metadata.tempo_cbpm = item.argument_number(1).unwrap_or(0) as u32;
                }
                Some(MenuItemType::Rating) => {
                    metadata.rating = item.argument_number(1).unwrap_or(0) as u8;
                }
                _ => {}
            }
        }
        metadata.raw_items = raw_items;
        metadata
    }
}

impl fmt::Display for TrackMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} [{}]",
            self.artist.as_deref().unwrap_or("?"),
            self.title.as_deref().unwrap_or("?"),
            self.track_ref
        )
    }
}

/// The beat positions and bar phases of an analyzed track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeatGrid {
    pub track_ref: TrackRef,
    /// The analysis payload, 16 bytes per beat
    pub payload: Vec<u8>,
    /// Present when this came off the wire; archive reads carry the bare
    /// payload
    pub raw_message: Option<Message>,
}

impl BeatGrid {
    pub fn from_message(track_ref: TrackRef, raw_message: Message) -> Option<BeatGrid> {
        let payload = raw_message.argument_binary(3)?.to_vec();
        Some(BeatGrid { track_ref, payload, raw_message: Some(raw_message) })
    }

    pub fn from_payload(track_ref: TrackRef, payload: Vec<u8>) -> BeatGrid {
        BeatGrid { track_ref, payload, raw_message: None }
    }

    pub fn beat_count(&self) -> usize {
        self.payload.len() / 16
    }
}

/// The small waveform image shown in a player's track overview
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformPreview {
    pub track_ref: TrackRef,
    pub payload: Vec<u8>,
    pub raw_message: Message,
}

impl WaveformPreview {
    pub fn from_message(track_ref: TrackRef, raw_message: Message) -> Option<WaveformPreview> {
        let payload = raw_message.argument_binary(3)?.to_vec();
        Some(WaveformPreview { track_ref, payload, raw_message })
    }
}

/// The scrolling full-resolution waveform, half-frame columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformDetail {
    pub track_ref: TrackRef,
    pub payload: Vec<u8>,
    pub raw_message: Message,
}

impl WaveformDetail {
    pub fn from_message(track_ref: TrackRef, raw_message: Message) -> Option<WaveformDetail> {
        let payload = raw_message.argument_binary(3)?.to_vec();
        Some(WaveformDetail { track_ref, payload, raw_message })
    }
}

/// Album art pixels as the device serves them (JPEG)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumArt {
    pub artwork_id: u32,
    pub payload: Vec<u8>,
    pub raw_message: Option<Message>,
}

impl AlbumArt {
    pub fn from_message(artwork_id: u32, raw_message: Message) -> Option<AlbumArt> {
        let payload = raw_message.argument_binary(3)?.to_vec();
        Some(AlbumArt { artwork_id, payload, raw_message: Some(raw_message) })
    }

    pub fn from_payload(artwork_id: u32, payload: Vec<u8>) -> AlbumArt {
        AlbumArt { artwork_id, payload, raw_message: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::Field;
    use crate::types::SlotKind;

    fn track() -> TrackRef {
        TrackRef::new(3, SlotKind::Usb, 42)
    }

    fn menu_item(item_type: MenuItemType, value: u64, label: &str, artwork: u32) -> Message {
        Message::new(
            1,
            MessageKind::MenuItem,
            vec![
                Field::number(0),
                Field::Number { value, width: 4 },
                Field::number(label.len() as u32),
                Field::Text(label.to_string()),
                Field::number(0),
                Field::Text(String::new()),
                Field::number2(item_type.value()),
                Field::number(0),
                Field::number(artwork),
            ],
        )
    }

    fn cue_blob(entries: &[(u8, u8, u32)]) -> Vec<u8> {
        let mut blob = Vec::new();
        for (hot_cue, status, time) in entries {
            let mut entry = [0u8; 36];
            entry[0] = *hot_cue;
            entry[4] = *status;
            entry[8..12].copy_from_slice(&time.to_be_bytes());
            blob.extend_from_slice(&entry);
        }
        blob
    }

    fn cue_list_message(entries: &[(u8, u8, u32)]) -> Message {
        Message::new(
            2,
            MessageKind::CueList,
            vec![
                Field::number(0),
                Field::number(0),
                Field::number(0),
                Field::Binary(cue_blob(entries)),
            ],
        )
    }

    #[test]
    fn test_metadata_parses_conveniences_and_keeps_raw_items() {
        let items = vec![
            menu_item(MenuItemType::Title, 42, "Earthbeat", 9001),
            menu_item(MenuItemType::Artist, 0, "Moodymann", 0),
            menu_item(MenuItemType::Duration, 312, "", 0),
            menu_item(MenuItemType::Tempo, 12250, "", 0),
            menu_item(MenuItemType::Rating, 4, "", 0),
        ];
        let metadata = TrackMetadata::new(track(), items.clone(), None);
        assert_eq!(metadata.title.as_deref(), Some("Earthbeat"));
        assert_eq!(metadata.artist.as_deref(), Some("Moodymann"));
        assert_eq!(metadata.artwork_id, 9001);
        assert_eq!(metadata.duration_seconds, 312);
        assert_eq!(metadata.tempo_cbpm, 12250);
        assert_eq!(metadata.rating, 4);
        assert_eq!(metadata.raw_items, items);
    }

    #[test]
    fn test_cue_list_skips_inactive_entries() {
        let cues = CueList::from_message(cue_list_message(&[
            (0, 1, 15_000),
            (2, 1, 62_000),
            (3, 0, 99_000),
        ]))
        .unwrap();
        assert_eq!(
            cues.entries,
            vec![
                CueEntry { cue_time_ms: 15_000, hot_cue_number: 0 },
                CueEntry { cue_time_ms: 62_000, hot_cue_number: 2 },
            ]
        );
    }

    #[test]
    fn test_cue_list_requires_payload() {
        let bare = Message::new(2, MessageKind::CueList, vec![]);
        assert!(CueList::from_message(bare).is_err());
    }

    #[test]
    fn test_beat_grid_counts_beats() {
        let grid = BeatGrid::from_payload(track(), vec![0u8; 64]);
        assert_eq!(grid.beat_count(), 4);
    }
}
