//! The metadata finder
//!
//! Watches status updates from the device network, keeps a hot cache of the
//! metadata for every loaded track, and transparently serves lookups from
//! attached archives when a slot has one.
//!
//! # Architecture
//!
//! ```text
//! status source thread(s)
//!     │
//!     │ StatusInlet::deliver (bounded queue, never blocks)
//!     ▼
//! handler thread
//!     ├── mount / archive bookkeeping per update
//!     ├── hot cache reuse decisions
//!     └── fetch workers (one per source device at most)
//!            │
//!            │ lease a client session, query, install result
//!            ▼
//!        hot cache + listener notifications
//! ```
//!
//! All the mutable state lives behind one shared value; the handler thread
//! owns pipeline-driven mutation, and caller threads only touch it through
//! the attach/detach/snapshot operations.

pub mod listeners;
mod pipeline;

use crate::archive::{build_archive, BuildOutcome, BuildProgress, MetadataArchive};
use crate::client::{ClientPool, DeviceRegistry};
use crate::error::FinderError;
use crate::metadata::{fetch, TrackMetadata};
use crate::proto::Message;
use crate::types::{CdjStatus, DeckRef, DeviceId, SlotKind, SlotRef, TrackRef};
use self::listeners::{
    ArchiveListener, LifecycleListener, MetadataListener, MountListener, Notifier,
};
use crossbeam::channel::{bounded, Sender, TrySendError};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Tuning knobs for the finder
#[derive(Debug, Clone)]
pub struct FinderConfig {
    /// How many status updates may wait for the handler before new ones are
    /// dropped. Status packets are idempotent refreshes, so dropping under
    /// pressure is safe.
    pub queue_capacity: usize,
    /// How often the handler thread rechecks the running flag while idle
    pub handler_poll: Duration,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self { queue_capacity: 100, handler_poll: Duration::from_millis(100) }
    }
}

/// State shared between the finder, its handler thread, and fetch workers
pub(crate) struct FinderShared {
    pub(crate) config: FinderConfig,
    pub(crate) pool: Arc<dyn ClientPool>,
    pub(crate) devices: Arc<dyn DeviceRegistry>,
    pub(crate) running: AtomicBool,
    pub(crate) passive: AtomicBool,
    pub(crate) hot_cache: RwLock<HashMap<DeckRef, Arc<TrackMetadata>>>,
    pub(crate) mounts: RwLock<HashSet<SlotRef>>,
    pub(crate) archives: RwLock<HashMap<SlotRef, Arc<MetadataArchive>>>,
    pub(crate) active_requests: Mutex<HashSet<DeviceId>>,
    pub(crate) notifier: Notifier,
    pub(crate) status_tx: Mutex<Option<Sender<CdjStatus>>>,
}

impl FinderShared {
    pub(crate) fn new(
        pool: Arc<dyn ClientPool>,
        devices: Arc<dyn DeviceRegistry>,
        config: FinderConfig,
    ) -> Self {
        Self {
            config,
            pool,
            devices,
            running: AtomicBool::new(false),
            passive: AtomicBool::new(false),
            hot_cache: RwLock::new(HashMap::new()),
            mounts: RwLock::new(HashSet::new()),
            archives: RwLock::new(HashMap::new()),
            active_requests: Mutex::new(HashSet::new()),
            notifier: Notifier::new(),
            status_tx: Mutex::new(None),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn is_passive(&self) -> bool {
        self.passive.load(Ordering::SeqCst)
    }

    /// Install metadata for a device's main deck, and for every hot cue the
    /// track carries, then tell metadata listeners
    pub(crate) fn update_metadata(&self, device: DeviceId, metadata: Arc<TrackMetadata>) {
        if !self.is_running() {
            return;
        }
        if let Ok(mut cache) = self.hot_cache.write() {
            cache.insert(DeckRef::main_deck(device), metadata.clone());
            if let Some(cues) = &metadata.cue_list {
                for entry in &cues.entries {
                    if entry.hot_cue_number != 0 {
                        cache.insert(DeckRef::new(device, entry.hot_cue_number), metadata.clone());
                    }
                }
            }
        }
        self.notifier.metadata_changed(device, Some(metadata));
    }

    /// Forget the main deck for a device. Hot cues stick around until the
    /// device loads a track that overwrites them.
    pub(crate) fn clear_deck(&self, device: DeviceId) {
        let removed = match self.hot_cache.write() {
            Ok(mut cache) => cache.remove(&DeckRef::main_deck(device)),
            Err(_) => None,
        };
        if removed.is_some() {
            self.notifier.metadata_changed(device, None);
        }
    }

    /// Forget everything cached for a device, main deck and hot cues alike
    pub(crate) fn clear_device(&self, device: DeviceId) {
        let mut cleared_main = false;
        if let Ok(mut cache) = self.hot_cache.write() {
            cache.retain(|deck, _| {
                if deck.device == device {
                    cleared_main |= deck.is_main_deck();
                    false
                } else {
                    true
                }
            });
        }
        if cleared_main {
            self.notifier.metadata_changed(device, None);
        }
    }

    /// Evict every cached track that was loaded from a now-unmounted slot.
    /// Collects the stale keys first, then removes them.
    pub(crate) fn flush_slot(&self, slot: SlotRef) {
        let stale: Vec<DeckRef> = match self.hot_cache.read() {
            Ok(cache) => cache
                .iter()
                .filter(|(_, metadata)| metadata.track_ref.slot_ref() == slot)
                .map(|(deck, _)| *deck)
                .collect(),
            Err(_) => Vec::new(),
        };
        if stale.is_empty() {
            return;
        }
        log::debug!("Evicting {} cached tracks in response to unmount of {}", stale.len(), slot);
        if let Ok(mut cache) = self.hot_cache.write() {
            for deck in &stale {
                cache.remove(deck);
            }
        }
        for deck in stale {
            if deck.is_main_deck() {
                self.notifier.metadata_changed(deck.device, None);
            }
        }
    }

    pub(crate) fn record_mount(&self, slot: SlotRef) {
        let added = self.mounts.write().map(|mut mounts| mounts.insert(slot)).unwrap_or(false);
        if added {
            self.notifier.mount_changed(slot, true);
        }
    }

    pub(crate) fn remove_mount(&self, slot: SlotRef) {
        let removed = self.mounts.write().map(|mut mounts| mounts.remove(&slot)).unwrap_or(false);
        if removed {
            self.notifier.mount_changed(slot, false);
        }
    }

    pub(crate) fn detach_archive(&self, slot: SlotRef) {
        let removed = match self.archives.write() {
            Ok(mut archives) => archives.remove(&slot),
            Err(_) => None,
        };
        if let Some(old) = removed {
            log::info!("Detached metadata archive {} from {}", old.path().display(), slot);
            drop(old);
            self.notifier.archive_detached(slot);
        }
    }

    pub(crate) fn get_archive(&self, slot: SlotRef) -> Option<Arc<MetadataArchive>> {
        self.archives.read().ok().and_then(|archives| archives.get(&slot).cloned())
    }

    /// Resolve metadata for a track: attached archive first, then the
    /// network unless passive mode forbids it for this call
    pub(crate) fn request_metadata_internal(
        &self,
        track: &TrackRef,
        fail_if_passive: bool,
    ) -> Result<Option<Arc<TrackMetadata>>, FinderError> {
        if let Some(archive) = self.get_archive(track.slot_ref()) {
            return Ok(archive.track_metadata(track).map(Arc::new));
        }
        if fail_if_passive && self.is_passive() {
            return Ok(None);
        }
        let mut client = self.pool.lease(track.device, "requesting metadata")?;
        Ok(fetch::query_metadata(client.as_mut(), track)?.map(Arc::new))
    }
}

/// Watches players and answers metadata questions about their loaded tracks
///
/// A constructed value: the client pool and the device registry are injected,
/// and status updates arrive through the [`StatusInlet`] handle rather than
/// any global hookup. Dropping the finder stops it.
pub struct MetadataFinder {
    shared: Arc<FinderShared>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl MetadataFinder {
    pub fn new(pool: Arc<dyn ClientPool>, devices: Arc<dyn DeviceRegistry>) -> Self {
        Self::with_config(pool, devices, FinderConfig::default())
    }

    pub fn with_config(
        pool: Arc<dyn ClientPool>,
        devices: Arc<dyn DeviceRegistry>,
        config: FinderConfig,
    ) -> Self {
        Self {
            shared: Arc::new(FinderShared::new(pool, devices, config)),
            handler: Mutex::new(None),
        }
    }

    /// Start watching status updates. Idempotent.
    pub fn start(&self) -> Result<(), FinderError> {
        let mut handler = match self.handler.lock() {
            Ok(guard) => guard,
            Err(_) => return Err(FinderError::BadArgument("finder state poisoned".to_string())),
        };
        if self.shared.is_running() {
            return Ok(());
        }
        let (tx, rx) = bounded(self.shared.config.queue_capacity);
        if let Ok(mut status_tx) = self.shared.status_tx.lock() {
            *status_tx = Some(tx);
        }
        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("deckwatch-status-handler".to_string())
            .spawn(move || pipeline::run_handler(shared, rx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                if let Ok(mut status_tx) = self.shared.status_tx.lock() {
                    *status_tx = None;
                }
                return Err(e.into());
            }
        };
        *handler = Some(handle);
        self.shared.notifier.lifecycle_changed(true);
        Ok(())
    }

    /// Stop watching and clear all cached state. Idempotent. In-flight
    /// archive builds are unaffected; they observe cancellation only through
    /// their own progress listener.
    pub fn stop(&self) {
        let Ok(mut handler) = self.handler.lock() else { return };
        if !self.shared.is_running() {
            return;
        }
        self.shared.running.store(false, Ordering::SeqCst);
        // Dropping the sender clears the queue once the handler exits
        if let Ok(mut status_tx) = self.shared.status_tx.lock() {
            *status_tx = None;
        }
        if let Some(handle) = handler.take() {
            if handle.join().is_err() {
                log::error!("Status handler thread panicked before shutdown");
            }
        }
        // Report the loss of every main deck, then forget everything
        let decks: Vec<DeviceId> = match self.shared.hot_cache.read() {
            Ok(cache) => cache
                .keys()
                .filter(|deck| deck.is_main_deck())
                .map(|deck| deck.device)
                .collect(),
            Err(_) => Vec::new(),
        };
        for device in decks {
            self.shared.notifier.metadata_changed(device, None);
        }
        if let Ok(mut cache) = self.shared.hot_cache.write() {
            cache.clear();
        }
        self.shared.notifier.lifecycle_changed(false);
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// In passive mode, status updates never trigger network queries; only
    /// attached archives answer them. Explicit requests and archive builds
    /// still go to the network.
    pub fn is_passive(&self) -> bool {
        self.shared.is_passive()
    }

    pub fn set_passive(&self, passive: bool) {
        self.shared.passive.store(passive, Ordering::SeqCst);
    }

    /// The handle the status source delivers updates through
    pub fn status_inlet(&self) -> StatusInlet {
        StatusInlet { shared: Arc::clone(&self.shared) }
    }

    /// Tell the finder a device disappeared from the network, evicting all
    /// cached state and archives for it
    pub fn device_lost(&self, device: DeviceId) {
        log::debug!("Discarding cached state for lost device {}", device);
        self.shared.clear_device(device);
        self.shared.detach_archive(SlotRef::new(device, SlotKind::Sd));
        self.shared.detach_archive(SlotRef::new(device, SlotKind::Usb));
    }

    /// Look up metadata for a track, from an attached archive if one covers
    /// its slot, otherwise from the device itself
    pub fn request_metadata(
        &self,
        track: &TrackRef,
    ) -> Result<Option<Arc<TrackMetadata>>, FinderError> {
        self.shared.request_metadata_internal(track, false)
    }

    /// Look up metadata for whatever track a status update reports loaded
    pub fn request_metadata_from(
        &self,
        status: &CdjStatus,
    ) -> Result<Option<Arc<TrackMetadata>>, FinderError> {
        match status.track_ref() {
            Some(track) => self.request_metadata(&track),
            None => Ok(None),
        }
    }

    /// Browse a playlist (or folder of playlists, when `folder` is set) on a
    /// device's media
    pub fn request_playlist_items(
        &self,
        device: DeviceId,
        slot: SlotKind,
        sort_order: u32,
        playlist_or_folder_id: u32,
        folder: bool,
    ) -> Result<Vec<Message>, FinderError> {
        let mut client = self.shared.pool.lease(device, "requesting playlist information")?;
        Ok(fetch::query_playlist_items(
            client.as_mut(),
            slot,
            sort_order,
            playlist_or_folder_id,
            folder,
        )?)
    }

    /// Attach a metadata archive to a media slot, so queries for tracks in
    /// that slot are answered from the archive instead of the device
    pub fn attach_archive(&self, slot: SlotRef, path: &Path) -> Result<(), FinderError> {
        self.ensure_running()?;
        if !(1..=4).contains(&slot.device) {
            return Err(FinderError::BadArgument(format!(
                "cannot attach archive for device {}",
                slot.device
            )));
        }
        if !self.shared.devices.is_announced(slot.device) {
            return Err(FinderError::BadArgument(format!(
                "device {} is not currently on the network",
                slot.device
            )));
        }
        if !slot.slot.supports_archives() {
            return Err(FinderError::BadArgument(format!(
                "archives can only be attached to SD and USB slots, not {}",
                slot.slot
            )));
        }
        let archive = Arc::new(MetadataArchive::open(path)?);
        log::info!("Attached metadata archive {} to {}", path.display(), slot);
        if let Ok(mut archives) = self.shared.archives.write() {
            // Replacing drops the previous handle exactly once
            archives.insert(slot, archive.clone());
        }
        self.shared.notifier.archive_attached(slot, &archive);
        Ok(())
    }

    /// Detach any archive from a media slot. A no-op when none is attached.
    pub fn detach_archive(&self, slot: SlotRef) {
        self.shared.detach_archive(slot);
    }

    /// The archive currently attached to a slot, if any
    pub fn get_archive(&self, slot: SlotRef) -> Option<Arc<MetadataArchive>> {
        self.shared.get_archive(slot)
    }

    /// Build a metadata archive of every track in a slot (`playlist_id` 0)
    /// or of one playlist. Long-running; runs on the caller's thread and is
    /// cancelled through the progress listener.
    pub fn create_archive(
        &self,
        slot: SlotRef,
        playlist_id: u32,
        destination: &Path,
        listener: Option<BuildProgress>,
    ) -> Result<BuildOutcome, FinderError> {
        if self.is_running() && !self.is_passive() {
            log::warn!(
                "Building an archive for {} while actively fetching metadata; consider passive mode",
                slot
            );
        }
        let mut client = self.shared.pool.lease(slot.device, "building metadata archive")?;
        Ok(build_archive(client.as_mut(), slot, playlist_id, destination, listener)?)
    }

    /// Snapshot of every deck's cached metadata, hot cues included
    pub fn loaded_tracks(&self) -> Result<HashMap<DeckRef, Arc<TrackMetadata>>, FinderError> {
        self.ensure_running()?;
        Ok(self.shared.hot_cache.read().map(|cache| cache.clone()).unwrap_or_default())
    }

    /// The metadata cached for a device's main deck, if any
    pub fn latest_metadata_for(
        &self,
        device: DeviceId,
    ) -> Result<Option<Arc<TrackMetadata>>, FinderError> {
        self.ensure_running()?;
        Ok(self
            .shared
            .hot_cache
            .read()
            .ok()
            .and_then(|cache| cache.get(&DeckRef::main_deck(device)).cloned()))
    }

    /// Snapshot of every slot currently reporting mounted media
    pub fn mounted_slots(&self) -> Result<HashSet<SlotRef>, FinderError> {
        self.ensure_running()?;
        Ok(self.shared.mounts.read().map(|mounts| mounts.clone()).unwrap_or_default())
    }

    pub fn add_mount_listener(&self, listener: Arc<dyn MountListener>) {
        self.shared.notifier.mount.add(listener);
    }

    pub fn remove_mount_listener(&self, listener: &Arc<dyn MountListener>) {
        self.shared.notifier.mount.remove(listener);
    }

    pub fn add_archive_listener(&self, listener: Arc<dyn ArchiveListener>) {
        self.shared.notifier.archive.add(listener);
    }

    pub fn remove_archive_listener(&self, listener: &Arc<dyn ArchiveListener>) {
        self.shared.notifier.archive.remove(listener);
    }

    pub fn add_metadata_listener(&self, listener: Arc<dyn MetadataListener>) {
        self.shared.notifier.metadata.add(listener);
    }

    pub fn remove_metadata_listener(&self, listener: &Arc<dyn MetadataListener>) {
        self.shared.notifier.metadata.remove(listener);
    }

    pub fn add_lifecycle_listener(&self, listener: Arc<dyn LifecycleListener>) {
        self.shared.notifier.lifecycle.add(listener);
    }

    pub fn remove_lifecycle_listener(&self, listener: &Arc<dyn LifecycleListener>) {
        self.shared.notifier.lifecycle.remove(listener);
    }

    fn ensure_running(&self) -> Result<(), FinderError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(FinderError::NotRunning)
        }
    }
}

impl Drop for MetadataFinder {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for MetadataFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("MetadataFinder");
        s.field("running", &self.is_running()).field("passive", &self.is_passive());
        if self.is_running() {
            if let Ok(cache) = self.shared.hot_cache.read() {
                s.field("loaded_decks", &cache.len());
            }
            if let Ok(mounts) = self.shared.mounts.read() {
                s.field("mounted_slots", &mounts.len());
            }
            if let Ok(archives) = self.shared.archives.read() {
                s.field("attached_archives", &archives.len());
            }
        }
        s.finish()
    }
}

/// Clone-able handle the status source uses to feed the finder
///
/// `deliver` never blocks: if the queue is full the update is dropped with a
/// warning, because a fresher status for the same device is already on its
/// way. Updates delivered while the finder is stopped are ignored.
#[derive(Clone)]
pub struct StatusInlet {
    shared: Arc<FinderShared>,
}

impl StatusInlet {
    pub fn deliver(&self, status: CdjStatus) {
        let Ok(status_tx) = self.shared.status_tx.lock() else { return };
        match status_tx.as_ref() {
            Some(tx) => match tx.try_send(status) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log::warn!("Discarding status update because the queue is backed up");
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::debug!("Ignoring status update delivered while stopping");
                }
            },
            None => log::debug!("Ignoring status update delivered while stopped"),
        }
    }
}
