//! Single-track queries against a connected client session
//!
//! Each function performs one logical query as its request/response pairs,
//! against a session the caller has already leased. Absent data is `None`;
//! only transport and protocol failures are errors. A device occasionally
//! answers a cue list request with something else entirely, so unexpected
//! response kinds are logged and treated as absent rather than failing the
//! caller (an archive build must be able to ride through them).

use super::{AlbumArt, BeatGrid, CueList, TrackMetadata, WaveformDetail, WaveformPreview};
use crate::client::{Client, FetchError};
use crate::proto::{Field, MenuTarget, Message, MessageKind, NO_MENU_RESULTS_AVAILABLE};
use crate::types::{SlotKind, TrackRef};

/// Fetch the full metadata for one track, including its cue list
pub fn query_metadata(
    client: &mut dyn Client,
    track: &TrackRef,
) -> Result<Option<TrackMetadata>, FetchError> {
    let response = client.menu_request(
        MessageKind::MetadataReq,
        MenuTarget::MainMenu,
        track.slot,
        vec![Field::number(track.rekordbox_id)],
    )?;
    if is_empty_menu(&response) {
        return Ok(None);
    }
    let cue_list = query_cue_list(client, track.slot, track.rekordbox_id)?;
    let items = client.render_menu_items(MenuTarget::MainMenu, track.slot, &response)?;
    Ok(Some(TrackMetadata::new(*track, items, cue_list)))
}

/// Fetch the cue list for one track
pub fn query_cue_list(
    client: &mut dyn Client,
    slot: SlotKind,
    rekordbox_id: u32,
) -> Result<Option<CueList>, FetchError> {
    let response = client.simple_request(
        MessageKind::CueListReq,
        MenuTarget::Data,
        slot,
        vec![Field::number(rekordbox_id)],
    )?;
    if response.kind != MessageKind::CueList {
        log::error!(
            "Unexpected response type when requesting cue list for track {}: {:?}",
            rekordbox_id,
            response.kind
        );
        return Ok(None);
    }
    match CueList::from_message(response) {
        Ok(cues) => Ok(Some(cues)),
        Err(reason) => {
            log::error!("Discarding unusable cue list for track {}: {}", rekordbox_id, reason);
            Ok(None)
        }
    }
}

/// List every track on the media in a slot
pub fn query_full_track_list(
    client: &mut dyn Client,
    slot: SlotKind,
) -> Result<Vec<Message>, FetchError> {
    let response = client.menu_request(
        MessageKind::TrackListReq,
        MenuTarget::MainMenu,
        slot,
        vec![Field::number(0)],
    )?;
    if is_empty_menu(&response) {
        return Ok(Vec::new());
    }
    client.render_menu_items(MenuTarget::MainMenu, slot, &response)
}

/// List the entries of a playlist, or of a playlist folder when `folder` is
/// set. `sort_order` 0 is the device's default ordering.
pub fn query_playlist_items(
    client: &mut dyn Client,
    slot: SlotKind,
    sort_order: u32,
    playlist_or_folder_id: u32,
    folder: bool,
) -> Result<Vec<Message>, FetchError> {
    let response = client.menu_request(
        MessageKind::PlaylistReq,
        MenuTarget::MainMenu,
        slot,
        vec![
            Field::number(sort_order),
            Field::number(playlist_or_folder_id),
            Field::number(u32::from(folder)),
        ],
    )?;
    if is_empty_menu(&response) {
        return Ok(Vec::new());
    }
    client.render_menu_items(MenuTarget::MainMenu, slot, &response)
}

/// Fetch the beat grid of one track
pub fn query_beat_grid(
    client: &mut dyn Client,
    track: &TrackRef,
) -> Result<Option<BeatGrid>, FetchError> {
    let response = client.simple_request(
        MessageKind::BeatGridReq,
        MenuTarget::Data,
        track.slot,
        vec![Field::number(track.rekordbox_id)],
    )?;
    if response.kind != MessageKind::BeatGrid {
        log::error!("Unexpected response to beat grid request for {}: {:?}", track, response.kind);
        return Ok(None);
    }
    Ok(BeatGrid::from_message(*track, response))
}

/// Fetch the overview waveform of one track
pub fn query_waveform_preview(
    client: &mut dyn Client,
    track: &TrackRef,
) -> Result<Option<WaveformPreview>, FetchError> {
    let response = client.simple_request(
        MessageKind::WavePreviewReq,
        MenuTarget::Data,
        track.slot,
        vec![Field::number(track.rekordbox_id)],
    )?;
    if response.kind != MessageKind::WavePreview {
        log::error!(
            "Unexpected response to waveform preview request for {}: {:?}",
            track,
            response.kind
        );
        return Ok(None);
    }
    Ok(WaveformPreview::from_message(*track, response))
}

/// Fetch the scrolling waveform of one track
pub fn query_waveform_detail(
    client: &mut dyn Client,
    track: &TrackRef,
) -> Result<Option<WaveformDetail>, FetchError> {
    let response = client.simple_request(
        MessageKind::WaveDetailReq,
        MenuTarget::Data,
        track.slot,
        vec![Field::number(track.rekordbox_id)],
    )?;
    if response.kind != MessageKind::WaveDetail {
        log::error!(
            "Unexpected response to waveform detail request for {}: {:?}",
            track,
            response.kind
        );
        return Ok(None);
    }
    Ok(WaveformDetail::from_message(*track, response))
}

/// Fetch one album art image by its artwork id
pub fn query_artwork(
    client: &mut dyn Client,
    artwork_id: u32,
    slot: SlotKind,
) -> Result<Option<AlbumArt>, FetchError> {
    let response = client.simple_request(
        MessageKind::AlbumArtReq,
        MenuTarget::Data,
        slot,
        vec![Field::number(artwork_id)],
    )?;
    if response.kind != MessageKind::AlbumArt {
        log::error!(
            "Unexpected response to artwork request for id {}: {:?}",
            artwork_id,
            response.kind
        );
        return Ok(None);
    }
    Ok(AlbumArt::from_message(artwork_id, response))
}

/// True when a menu response header reports the no-results sentinel
fn is_empty_menu(response: &Message) -> bool {
    match response.menu_results_count() {
        Some(count) => count == NO_MENU_RESULTS_AVAILABLE || count == 0,
        None => true,
    }
}
