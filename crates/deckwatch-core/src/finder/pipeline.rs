//! The status handler thread
//!
//! One thread drains the bounded status queue in FIFO order and applies the
//! per-update rules: slot bookkeeping first, then the track-loaded decision.
//! The handler itself never touches the network; when a fetch is needed it
//! spawns a short-lived worker, and the active-request set guarantees at
//! most one outstanding fetch per source device.

use super::FinderShared;
use crate::types::{CdjStatus, DeckRef, DeviceId, LocalMediaState, SlotKind, SlotRef};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

pub(crate) fn run_handler(shared: Arc<FinderShared>, updates: Receiver<CdjStatus>) {
    log::debug!("Status handler thread started");
    while shared.running.load(Ordering::SeqCst) {
        match updates.recv_timeout(shared.config.handler_poll) {
            Ok(update) => handle_update(&shared, update),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("Status handler thread exiting");
}

/// Apply one status update. Order matters: mount and archive state must be
/// settled before the track decision, so a fetch never races an eviction of
/// its own slot.
pub(crate) fn handle_update(shared: &Arc<FinderShared>, update: CdjStatus) {
    for (kind, state) in [(SlotKind::Usb, update.local_usb), (SlotKind::Sd, update.local_sd)] {
        let slot = SlotRef::new(update.device, kind);
        match state {
            LocalMediaState::Empty => {
                shared.detach_archive(slot);
                shared.flush_slot(slot);
                shared.remove_mount(slot);
            }
            LocalMediaState::Loaded => shared.record_mount(slot),
            LocalMediaState::Unloading => {}
        }
    }

    let Some(track) = update.track_ref() else {
        // Nothing queryable is loaded; hot cues survive until overwritten
        shared.clear_deck(update.device);
        return;
    };

    let hot_hit = match shared.hot_cache.read() {
        Ok(cache) => {
            if let Some(current) = cache.get(&DeckRef::main_deck(update.device)) {
                if current.track_ref == track {
                    return; // already tracking this load
                }
            }
            cache.values().find(|cached| cached.track_ref == track).cloned()
        }
        Err(_) => None,
    };
    if let Some(cached) = hot_hit {
        // Same track already cached for some deck, no network needed
        shared.update_metadata(update.device, cached);
        return;
    }

    let claimed = match shared.active_requests.lock() {
        Ok(mut active) => active.insert(track.device),
        Err(_) => false,
    };
    if !claimed {
        return; // a fetch against this source device is already in flight
    }

    // We will not know what is loaded until the request completes
    shared.clear_deck(update.device);

    let worker_shared = Arc::clone(shared);
    let device = update.device;
    let spawned = thread::Builder::new()
        .name(format!("deckwatch-fetch-{}", track.device))
        .spawn(move || {
            let guard = RequestGuard { shared: worker_shared, device: track.device };
            match guard.shared.request_metadata_internal(&track, true) {
                Ok(Some(metadata)) => guard.shared.update_metadata(device, metadata),
                Ok(None) => {}
                Err(e) => log::warn!("Problem requesting metadata for {}: {}", track, e),
            }
        });
    if let Err(e) = spawned {
        log::error!("Failed to spawn metadata fetch worker: {}", e);
        if let Ok(mut active) = shared.active_requests.lock() {
            active.remove(&track.device);
        }
    }
}

/// Releases the worker's claim on its source device on every exit path
struct RequestGuard {
    shared: Arc<FinderShared>,
    device: DeviceId,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.shared.active_requests.lock() {
            active.remove(&self.device);
        }
    }
}
