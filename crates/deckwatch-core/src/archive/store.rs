//! Read side of a metadata archive
//!
//! An open archive serves lookups keyed by rekordbox id. Readers tolerate
//! missing entries (archives built from playlists are sparse by design) and
//! treat corrupt entries as absent after logging, so a damaged archive
//! degrades to live queries instead of failing the finder.

use super::{
    artwork_entry_name, beat_grid_entry_name, cue_list_entry_name, metadata_entry_name,
    waveform_detail_entry_name, waveform_preview_entry_name, ArchiveError, FORMAT_ENTRY,
    FORMAT_TAG,
};
use crate::metadata::{AlbumArt, BeatGrid, CueList, TrackMetadata, WaveformDetail, WaveformPreview};
use crate::proto::{Message, MessageKind};
use crate::types::TrackRef;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use zip::result::ZipError;
use zip::ZipArchive;

/// An open, validated metadata archive
///
/// Shared behind an `Arc` by the archive registry; the container needs
/// exclusive access per read, so lookups serialize on an internal lock.
pub struct MetadataArchive {
    path: PathBuf,
    zip: Mutex<ZipArchive<File>>,
}

impl MetadataArchive {
    /// Open an archive and validate its format tag
    pub fn open(path: &Path) -> Result<MetadataArchive, ArchiveError> {
        let file = File::open(path)?;
        let mut zip = ZipArchive::new(file)?;
        let mut tag = String::new();
        match zip.by_name(FORMAT_ENTRY) {
            Ok(mut entry) => {
                entry.read_to_string(&mut tag)?;
            }
            Err(ZipError::FileNotFound) => {
                return Err(ArchiveError::BadFormat(format!(
                    "{} has no format entry",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        }
        if tag != FORMAT_TAG {
            return Err(ArchiveError::BadFormat(format!(
                "{} carries format tag {:?}, expected {:?}",
                path.display(),
                tag,
                FORMAT_TAG
            )));
        }
        Ok(MetadataArchive { path: path.to_path_buf(), zip: Mutex::new(zip) })
    }

    /// The file this archive was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The rekordbox ids this archive holds metadata for
    pub fn track_ids(&self) -> Vec<u32> {
        let prefix = format!("{}metadata/", super::ARCHIVE_PREFIX);
        let Ok(zip) = self.zip.lock() else { return Vec::new() };
        let mut ids: Vec<u32> = zip
            .file_names()
            .filter_map(|name| name.strip_prefix(prefix.as_str()))
            .filter_map(|id| id.parse().ok())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Look up the metadata stored for a track, including its cue list
    pub fn track_metadata(&self, track: &TrackRef) -> Option<TrackMetadata> {
        let bytes = self.entry_bytes(&metadata_entry_name(track.rekordbox_id))?;
        let mut input = bytes.as_slice();
        let mut items = Vec::new();
        loop {
            match Message::read(&mut input) {
                Ok(message) if message.kind == MessageKind::MenuItem => items.push(message),
                Ok(_) => break, // the footer ends the item stream
                Err(e) => {
                    log::error!(
                        "Corrupt metadata entry for {} in {}: {}",
                        track,
                        self.path.display(),
                        e
                    );
                    return None;
                }
            }
        }
        Some(TrackMetadata::new(*track, items, self.cue_list(track.rekordbox_id)))
    }

    /// Look up the stored cue list for a track
    pub fn cue_list(&self, rekordbox_id: u32) -> Option<CueList> {
        let bytes = self.entry_bytes(&cue_list_entry_name(rekordbox_id))?;
        let message = self.read_single(rekordbox_id, "cue list", &bytes)?;
        match CueList::from_message(message) {
            Ok(cues) => Some(cues),
            Err(reason) => {
                log::error!(
                    "Corrupt cue list entry for track {} in {}: {}",
                    rekordbox_id,
                    self.path.display(),
                    reason
                );
                None
            }
        }
    }

    /// Look up the stored beat grid for a track
    pub fn beat_grid(&self, track: &TrackRef) -> Option<BeatGrid> {
        let payload = self.entry_bytes(&beat_grid_entry_name(track.rekordbox_id))?;
        Some(BeatGrid::from_payload(*track, payload))
    }

    /// Look up the stored waveform preview for a track
    pub fn waveform_preview(&self, track: &TrackRef) -> Option<WaveformPreview> {
        let bytes = self.entry_bytes(&waveform_preview_entry_name(track.rekordbox_id))?;
        let message = self.read_single(track.rekordbox_id, "waveform preview", &bytes)?;
        WaveformPreview::from_message(*track, message)
    }

    /// Look up the stored waveform detail for a track
    pub fn waveform_detail(&self, track: &TrackRef) -> Option<WaveformDetail> {
        let bytes = self.entry_bytes(&waveform_detail_entry_name(track.rekordbox_id))?;
        let message = self.read_single(track.rekordbox_id, "waveform detail", &bytes)?;
        WaveformDetail::from_message(*track, message)
    }

    /// Look up a stored album art image
    pub fn artwork(&self, artwork_id: u32) -> Option<AlbumArt> {
        let payload = self.entry_bytes(&artwork_entry_name(artwork_id))?;
        Some(AlbumArt::from_payload(artwork_id, payload))
    }

    /// Read a whole entry, treating a missing entry as absent data
    fn entry_bytes(&self, name: &str) -> Option<Vec<u8>> {
        let Ok(mut zip) = self.zip.lock() else { return None };
        let result = match zip.by_name(name) {
            Ok(mut entry) => {
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                if let Err(e) = entry.read_to_end(&mut bytes) {
                    log::error!("Failed reading entry {} from {}: {}", name, self.path.display(), e);
                    return None;
                }
                Some(bytes)
            }
            Err(ZipError::FileNotFound) => None,
            Err(e) => {
                log::error!("Failed opening entry {} from {}: {}", name, self.path.display(), e);
                None
            }
        };
        result
    }

    /// Parse an entry that holds exactly one message
    fn read_single(&self, rekordbox_id: u32, what: &str, bytes: &[u8]) -> Option<Message> {
        match Message::read(&mut &bytes[..]) {
            Ok(message) => Some(message),
            Err(e) => {
                log::error!(
                    "Corrupt {} entry for track {} in {}: {}",
                    what,
                    rekordbox_id,
                    self.path.display(),
                    e
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for MetadataArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataArchive").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SlotKind;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        for (name, contents) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(contents).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_open_rejects_missing_format_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.zip");
        write_zip(&path, &[("some/file", b"hello")]);
        match MetadataArchive::open(&path) {
            Err(ArchiveError::BadFormat(_)) => {}
            other => panic!("expected BadFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_open_rejects_mismatched_format_tag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wrong.zip");
        write_zip(&path, &[(FORMAT_ENTRY, b"Some Other Cache version 9")]);
        match MetadataArchive::open(&path) {
            Err(ArchiveError::BadFormat(_)) => {}
            other => panic!("expected BadFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_entries_are_absent_not_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sparse.zip");
        write_zip(&path, &[(FORMAT_ENTRY, FORMAT_TAG.as_bytes())]);
        let archive = MetadataArchive::open(&path).unwrap();
        let track = TrackRef::new(1, SlotKind::Usb, 12345);
        assert!(archive.track_metadata(&track).is_none());
        assert!(archive.cue_list(12345).is_none());
        assert!(archive.beat_grid(&track).is_none());
        assert!(archive.waveform_preview(&track).is_none());
        assert!(archive.waveform_detail(&track).is_none());
        assert!(archive.artwork(12345).is_none());
        assert!(archive.track_ids().is_empty());
    }

    #[test]
    fn test_corrupt_metadata_entry_is_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.zip");
        write_zip(
            &path,
            &[
                (FORMAT_ENTRY, FORMAT_TAG.as_bytes()),
                ("BLTMetaCache/metadata/9", b"\x01\x02this is not a message"),
            ],
        );
        let archive = MetadataArchive::open(&path).unwrap();
        assert!(archive.track_metadata(&TrackRef::new(1, SlotKind::Usb, 9)).is_none());
    }
}
