//! Shared stubs for exercising the finder without a device network
//!
//! A `StubLibrary` plays the part of one device's database server: the
//! tracks it knows, their cue lists, art and analysis blobs. `StubPool`
//! hands out `StubClient` sessions over it and counts every lease, so tests
//! can assert exactly how much network traffic a scenario produced.

use crate::client::{Client, ClientPool, DeviceRegistry, FetchError};
use crate::finder::listeners::{
    ArchiveListener, MetadataListener, MetadataUpdate, MountListener,
};
use crate::archive::MetadataArchive;
use crate::metadata::TrackMetadata;
use crate::proto::{Field, MenuItemType, MenuTarget, Message, MessageKind, NO_MENU_RESULTS_AVAILABLE};
use crate::types::{DeviceId, SlotKind, SlotRef};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One track a stub device can answer queries about
#[derive(Debug, Clone, Default)]
pub struct StubTrack {
    pub title: String,
    pub artist: String,
    pub artwork_id: u32,
    /// (hot cue number, status, time ms) triples for the cue list response
    pub cues: Vec<(u8, u8, u32)>,
    pub beat_grid: Option<Vec<u8>>,
    pub artwork: Option<Vec<u8>>,
}

/// The catalog a stub device serves
#[derive(Debug, Clone, Default)]
pub struct StubLibrary {
    pub tracks: HashMap<u32, StubTrack>,
    pub playlists: HashMap<u32, Vec<u32>>,
}

impl StubLibrary {
    pub fn with_track(mut self, id: u32, track: StubTrack) -> Self {
        self.tracks.insert(id, track);
        self
    }

    pub fn with_playlist(mut self, id: u32, track_ids: Vec<u32>) -> Self {
        self.playlists.insert(id, track_ids);
        self
    }
}

pub fn menu_item(item_type: MenuItemType, value: u64, label: &str, artwork: u32) -> Message {
    Message::new(
        0,
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

pub fn track_list_entry(id: u32) -> Message {
    menu_item(MenuItemType::TrackListEntry, id as u64, "", 0)
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

fn data_response(kind: MessageKind, payload: Vec<u8>) -> Message {
    Message::new(
        0,
        kind,
        vec![Field::number(0), Field::number(0), Field::number(0), Field::Binary(payload)],
    )
}

impl StubTrack {
    fn menu_items(&self, id: u32) -> Vec<Message> {
        vec![
            menu_item(MenuItemType::Title, id as u64, &self.title, self.artwork_id),
            menu_item(MenuItemType::Artist, 0, &self.artist, 0),
            menu_item(MenuItemType::Duration, 240, "", 0),
        ]
    }
}

/// Counters shared by every session a [`StubPool`] hands out
#[derive(Debug, Default)]
pub struct StubCounters {
    /// Sessions leased from the pool
    pub leases: AtomicUsize,
    /// Metadata menu requests answered
    pub metadata_requests: AtomicUsize,
}

/// One stub session over the library
pub struct StubClient {
    library: Arc<StubLibrary>,
    counters: Arc<StubCounters>,
    /// Items staged by the last menu request, served by the next render
    pending_menu: Vec<Message>,
}

impl StubClient {
    pub fn new(library: Arc<StubLibrary>) -> Self {
        Self { library, counters: Arc::new(StubCounters::default()), pending_menu: Vec::new() }
    }

    fn menu_header(count: u64) -> Message {
        Message::new(0, MessageKind::MenuAvailable, vec![Field::number(0), Field::Number { value: count, width: 4 }])
    }
}

impl Client for StubClient {
    fn menu_request(
        &mut self,
        kind: MessageKind,
        _menu: MenuTarget,
        _slot: SlotKind,
        arguments: Vec<Field>,
    ) -> Result<Message, FetchError> {
        match kind {
            MessageKind::MetadataReq => {
                self.counters.metadata_requests.fetch_add(1, Ordering::SeqCst);
                let id = arguments
                    .first()
                    .and_then(Field::as_number)
                    .unwrap_or(0) as u32;
                match self.library.tracks.get(&id) {
                    Some(track) => {
                        self.pending_menu = track.menu_items(id);
                        Ok(Self::menu_header(self.pending_menu.len() as u64))
                    }
                    None => Ok(Self::menu_header(NO_MENU_RESULTS_AVAILABLE)),
                }
            }
            MessageKind::TrackListReq => {
                let mut ids: Vec<u32> = self.library.tracks.keys().copied().collect();
                ids.sort_unstable();
                self.pending_menu = ids.into_iter().map(track_list_entry).collect();
                Ok(Self::menu_header(self.pending_menu.len() as u64))
            }
            MessageKind::PlaylistReq => {
                let id = arguments.get(1).and_then(Field::as_number).unwrap_or(0) as u32;
                match self.library.playlists.get(&id) {
                    Some(track_ids) => {
                        self.pending_menu =
                            track_ids.iter().map(|id| track_list_entry(*id)).collect();
                        Ok(Self::menu_header(self.pending_menu.len() as u64))
                    }
                    None => Ok(Self::menu_header(NO_MENU_RESULTS_AVAILABLE)),
                }
            }
            other => Err(FetchError::Session(format!("unsupported menu request {:?}", other))),
        }
    }

    fn simple_request(
        &mut self,
        kind: MessageKind,
        _menu: MenuTarget,
        _slot: SlotKind,
        arguments: Vec<Field>,
    ) -> Result<Message, FetchError> {
        let id = arguments.first().and_then(Field::as_number).unwrap_or(0) as u32;
        match kind {
            MessageKind::CueListReq => match self.library.tracks.get(&id) {
                Some(track) if !track.cues.is_empty() => {
                    Ok(data_response(MessageKind::CueList, cue_blob(&track.cues)))
                }
                _ => Ok(Message::new(0, MessageKind::Other(0xffff), vec![])),
            },
            MessageKind::BeatGridReq => match self.library.tracks.get(&id).and_then(|t| t.beat_grid.clone()) {
                Some(payload) => Ok(data_response(MessageKind::BeatGrid, payload)),
                None => Ok(Message::new(0, MessageKind::Other(0xffff), vec![])),
            },
            MessageKind::AlbumArtReq => {
                let art = self
                    .library
                    .tracks
                    .values()
                    .find(|t| t.artwork_id == id)
                    .and_then(|t| t.artwork.clone());
                match art {
                    Some(payload) => Ok(data_response(MessageKind::AlbumArt, payload)),
                    None => Ok(Message::new(0, MessageKind::Other(0xffff), vec![])),
                }
            }
            MessageKind::WavePreviewReq | MessageKind::WaveDetailReq => {
                Ok(Message::new(0, MessageKind::Other(0xffff), vec![]))
            }
            other => Err(FetchError::Session(format!("unsupported request {:?}", other))),
        }
    }

    fn render_menu_items(
        &mut self,
        _menu: MenuTarget,
        _slot: SlotKind,
        _response: &Message,
    ) -> Result<Vec<Message>, FetchError> {
        Ok(std::mem::take(&mut self.pending_menu))
    }
}

/// A pool that serves stub sessions and counts every lease
pub struct StubPool {
    pub library: Arc<StubLibrary>,
    pub counters: Arc<StubCounters>,
    /// When set, each lease blocks until a token arrives
    pub gate: Option<Receiver<()>>,
}

impl StubPool {
    pub fn new(library: StubLibrary) -> Arc<Self> {
        Arc::new(Self {
            library: Arc::new(library),
            counters: Arc::new(StubCounters::default()),
            gate: None,
        })
    }

    pub fn gated(library: StubLibrary) -> (Arc<Self>, Sender<()>) {
        let (tx, rx) = unbounded();
        let pool = Arc::new(Self {
            library: Arc::new(library),
            counters: Arc::new(StubCounters::default()),
            gate: Some(rx),
        });
        (pool, tx)
    }

    pub fn leases(&self) -> usize {
        self.counters.leases.load(Ordering::SeqCst)
    }
}

impl ClientPool for StubPool {
    fn lease(
        &self,
        _device: DeviceId,
        _description: &str,
    ) -> Result<Box<dyn Client + '_>, FetchError> {
        self.counters.leases.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        Ok(Box::new(StubClient {
            library: self.library.clone(),
            counters: self.counters.clone(),
            pending_menu: Vec::new(),
        }))
    }
}

/// A registry that announces a fixed set of devices
pub struct StubRegistry {
    pub announced: Vec<DeviceId>,
}

impl StubRegistry {
    pub fn announcing(devices: &[DeviceId]) -> Arc<Self> {
        Arc::new(Self { announced: devices.to_vec() })
    }
}

impl DeviceRegistry for StubRegistry {
    fn is_announced(&self, device: DeviceId) -> bool {
        self.announced.contains(&device)
    }
}

/// Events a recording listener saw, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeenEvent {
    Mounted(SlotRef),
    Unmounted(SlotRef),
    ArchiveAttached(SlotRef),
    ArchiveDetached(SlotRef),
}

/// Forwards mount and archive events on a channel so tests can wait for
/// asynchronous deliveries and assert their order
pub struct RecordingListener {
    tx: Sender<SeenEvent>,
}

impl RecordingListener {
    pub fn new() -> (Arc<Self>, Receiver<SeenEvent>) {
        let (tx, rx) = unbounded();
        (Arc::new(Self { tx }), rx)
    }

    fn record(&self, event: SeenEvent) {
        let _ = self.tx.send(event);
    }
}

impl MountListener for RecordingListener {
    fn media_mounted(&self, slot: SlotRef) {
        self.record(SeenEvent::Mounted(slot));
    }
    fn media_unmounted(&self, slot: SlotRef) {
        self.record(SeenEvent::Unmounted(slot));
    }
}

impl ArchiveListener for RecordingListener {
    fn archive_attached(&self, slot: SlotRef, _archive: &Arc<MetadataArchive>) {
        self.record(SeenEvent::ArchiveAttached(slot));
    }
    fn archive_detached(&self, slot: SlotRef) {
        self.record(SeenEvent::ArchiveDetached(slot));
    }
}

/// Forwards metadata updates on a channel so tests can wait for worker
/// completions
pub struct MetadataProbe {
    tx: Sender<(DeviceId, Option<Arc<TrackMetadata>>)>,
}

impl MetadataProbe {
    pub fn new() -> (Arc<Self>, Receiver<(DeviceId, Option<Arc<TrackMetadata>>)>) {
        let (tx, rx) = unbounded();
        (Arc::new(Self { tx }), rx)
    }
}

impl MetadataListener for MetadataProbe {
    fn metadata_changed(&self, update: &MetadataUpdate) {
        let _ = self.tx.send((update.device, update.metadata.clone()));
    }
}
