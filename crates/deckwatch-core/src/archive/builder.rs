//! Building archives from a live device
//!
//! The build enumerates the tracks on the media, then streams every track's
//! raw responses into the container one at a time. Per track the entries are
//! written in a fixed order (metadata, artwork, beat grid, cue list,
//! waveform preview, waveform detail) so a streaming reader can follow
//! along. The progress listener is consulted after each track and may cancel
//! the build, in which case the partial output file is deleted.

use super::{
    artwork_entry_name, beat_grid_entry_name, cue_list_entry_name, metadata_entry_name,
    waveform_detail_entry_name, waveform_preview_entry_name, ArchiveError, FORMAT_ENTRY,
    FORMAT_TAG,
};
use crate::client::Client;
use crate::metadata::fetch::{
    query_artwork, query_beat_grid, query_cue_list, query_full_track_list, query_metadata,
    query_playlist_items, query_waveform_detail, query_waveform_preview,
};
use crate::metadata::TrackMetadata;
use crate::proto::MenuItemType;
use crate::types::{SlotRef, TrackRef};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Called after each track with the track's metadata (when it could be
/// retrieved), the number of tracks completed, and the total. Returning
/// false cancels the build.
pub type BuildProgress = Box<dyn FnMut(Option<&TrackMetadata>, usize, usize) -> bool + Send>;

/// How a build ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Completed { tracks_written: usize },
    /// The listener asked to stop; the output file has been deleted
    Cancelled,
}

/// Build a metadata archive for all tracks in a slot, or for one playlist
/// when `playlist_id` is nonzero. Any existing file at `destination` is
/// replaced.
pub fn build_archive(
    client: &mut dyn Client,
    slot: SlotRef,
    playlist_id: u32,
    destination: &Path,
    mut listener: Option<BuildProgress>,
) -> Result<BuildOutcome, ArchiveError> {
    if destination.exists() {
        if let Err(e) = std::fs::remove_file(destination) {
            log::warn!("Unable to delete existing archive {}: {}", destination.display(), e);
        }
    }

    let listing = if playlist_id == 0 {
        query_full_track_list(client, slot.slot)?
    } else {
        query_playlist_items(client, slot.slot, 0, playlist_id, false)?
    };

    let file = File::create(destination)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options: FileOptions = FileOptions::default().compression_method(CompressionMethod::Deflated);

    // The format tag goes first so attach can validate without scanning
    zip.start_file(FORMAT_ENTRY, options)?;
    zip.write_all(FORMAT_TAG.as_bytes())?;

    let total = listing.len();
    let mut completed = 0usize;
    let mut artwork_added: HashSet<u32> = HashSet::new();

    for entry in &listing {
        if entry.menu_item_type() != Some(MenuItemType::TrackListEntry) {
            return Err(ArchiveError::UnexpectedItem(format!(
                "needed a track list entry, got {:?}",
                entry.menu_item_type()
            )));
        }
        let rekordbox_id = entry
            .argument_number(1)
            .ok_or_else(|| ArchiveError::UnexpectedItem("track row carries no id".to_string()))?
            as u32;
        let track = TrackRef::new(slot.device, slot.slot, rekordbox_id);

        let metadata = query_metadata(client, &track)?;
        match &metadata {
            Some(metadata) => {
                log::debug!("Adding metadata for track {}", rekordbox_id);
                zip.start_file(metadata_entry_name(rekordbox_id), options)?;
                for item in &metadata.raw_items {
                    item.write(&mut zip)?;
                }
                crate::proto::Message::menu_footer().write(&mut zip)?;
            }
            None => {
                log::warn!("Unable to retrieve metadata for track {}", rekordbox_id);
            }
        }

        if let Some(metadata) = &metadata {
            if metadata.artwork_id != 0 && !artwork_added.contains(&metadata.artwork_id) {
                if let Some(art) = query_artwork(client, metadata.artwork_id, slot.slot)? {
                    log::debug!("Adding artwork {}", metadata.artwork_id);
                    zip.start_file(artwork_entry_name(metadata.artwork_id), options)?;
                    zip.write_all(&art.payload)?;
                    artwork_added.insert(metadata.artwork_id);
                }
            }
        }

        if let Some(grid) = query_beat_grid(client, &track)? {
            log::debug!("Adding beat grid for track {}", rekordbox_id);
            zip.start_file(beat_grid_entry_name(rekordbox_id), options)?;
            zip.write_all(&grid.payload)?;
        }

        // Fetched again rather than reusing the copy inside the metadata:
        // the archive stores the single raw response and the reader consumes
        // it separately from the metadata entry
        if let Some(cues) = query_cue_list(client, slot.slot, rekordbox_id)? {
            log::debug!("Adding cue list for track {}", rekordbox_id);
            zip.start_file(cue_list_entry_name(rekordbox_id), options)?;
            cues.raw_message.write(&mut zip)?;
        }

        if let Some(preview) = query_waveform_preview(client, &track)? {
            log::debug!("Adding waveform preview for track {}", rekordbox_id);
            zip.start_file(waveform_preview_entry_name(rekordbox_id), options)?;
            preview.raw_message.write(&mut zip)?;
        }

        if let Some(detail) = query_waveform_detail(client, &track)? {
            log::debug!("Adding waveform detail for track {}", rekordbox_id);
            zip.start_file(waveform_detail_entry_name(rekordbox_id), options)?;
            detail.raw_message.write(&mut zip)?;
        }

        completed += 1;
        if let Some(listener) = listener.as_mut() {
            if !listener(metadata.as_ref(), completed, total) {
                log::info!("Archive build cancelled by listener");
                finish_and_delete(zip, destination);
                return Ok(BuildOutcome::Cancelled);
            }
        }
    }

    zip.finish()?;
    Ok(BuildOutcome::Completed { tracks_written: completed })
}

/// Close the writer chain, then remove the partial output
fn finish_and_delete(mut zip: ZipWriter<BufWriter<File>>, destination: &Path) {
    if let Err(e) = zip.finish() {
        log::error!("Problem closing cancelled archive {}: {}", destination.display(), e);
    }
    if let Err(e) = std::fs::remove_file(destination) {
        log::warn!("Unable to delete cancelled archive {}: {}", destination.display(), e);
    }
}
