//! Listener registration and delivery
//!
//! Four listener families: mount changes, archive attach/detach, metadata
//! changes, and finder lifecycle. Delivery is synchronous on whatever thread
//! performed the mutation, so listeners must return quickly; anything slow
//! belongs on the listener's own thread. A panicking listener is isolated
//! and logged so it cannot take down the handler thread or starve its peers.

use crate::archive::MetadataArchive;
use crate::metadata::TrackMetadata;
use crate::types::{DeviceId, SlotRef};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// Told when media appears in or disappears from a slot
pub trait MountListener: Send + Sync {
    fn media_mounted(&self, slot: SlotRef);
    fn media_unmounted(&self, slot: SlotRef);
}

/// Told when a metadata archive is attached to or detached from a slot
pub trait ArchiveListener: Send + Sync {
    fn archive_attached(&self, slot: SlotRef, archive: &Arc<MetadataArchive>);
    fn archive_detached(&self, slot: SlotRef);
}

/// A change to the metadata known for a device's main deck
#[derive(Debug, Clone)]
pub struct MetadataUpdate {
    pub device: DeviceId,
    /// The new metadata, or None when the deck no longer has a known track
    pub metadata: Option<Arc<TrackMetadata>>,
}

/// Told whenever the main-deck metadata for any device changes
pub trait MetadataListener: Send + Sync {
    fn metadata_changed(&self, update: &MetadataUpdate);
}

/// Told when the finder starts and stops
pub trait LifecycleListener: Send + Sync {
    fn started(&self);
    fn stopped(&self);
}

/// A set of registered listeners with snapshot iteration
///
/// Registration is idempotent on `Arc` identity. Delivery walks a
/// point-in-time copy, so adding or removing listeners during delivery
/// affects the next delivery, not the current one.
pub(crate) struct ListenerSet<T: ?Sized> {
    listeners: Mutex<Vec<Arc<T>>>,
}

impl<T: ?Sized> ListenerSet<T> {
    pub fn new() -> Self {
        Self { listeners: Mutex::new(Vec::new()) }
    }

    pub fn add(&self, listener: Arc<T>) {
        if let Ok(mut listeners) = self.listeners.lock() {
            if !listeners.iter().any(|known| Arc::ptr_eq(known, &listener)) {
                listeners.push(listener);
            }
        }
    }

    pub fn remove(&self, listener: &Arc<T>) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|known| !Arc::ptr_eq(known, listener));
        }
    }

    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.listeners.lock().map(|listeners| listeners.clone()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().map(|listeners| listeners.is_empty()).unwrap_or(true)
    }
}

/// Run one listener callback, keeping its panic from reaching the caller
fn guarded(what: &str, deliver: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(deliver)).is_err() {
        log::warn!("Problem delivering {} update to listener", what);
    }
}

/// Owns the four listener sets and the delivery helpers
pub(crate) struct Notifier {
    pub mount: ListenerSet<dyn MountListener>,
    pub archive: ListenerSet<dyn ArchiveListener>,
    pub metadata: ListenerSet<dyn MetadataListener>,
    pub lifecycle: ListenerSet<dyn LifecycleListener>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            mount: ListenerSet::new(),
            archive: ListenerSet::new(),
            metadata: ListenerSet::new(),
            lifecycle: ListenerSet::new(),
        }
    }

    pub fn mount_changed(&self, slot: SlotRef, mounted: bool) {
        for listener in self.mount.snapshot() {
            guarded("mount", || {
                if mounted {
                    listener.media_mounted(slot);
                } else {
                    listener.media_unmounted(slot);
                }
            });
        }
    }

    pub fn archive_attached(&self, slot: SlotRef, archive: &Arc<MetadataArchive>) {
        for listener in self.archive.snapshot() {
            guarded("archive", || listener.archive_attached(slot, archive));
        }
    }

    pub fn archive_detached(&self, slot: SlotRef) {
        for listener in self.archive.snapshot() {
            guarded("archive", || listener.archive_detached(slot));
        }
    }

    pub fn metadata_changed(&self, device: DeviceId, metadata: Option<Arc<TrackMetadata>>) {
        if self.metadata.is_empty() {
            return;
        }
        let update = MetadataUpdate { device, metadata };
        for listener in self.metadata.snapshot() {
            guarded("metadata", || listener.metadata_changed(&update));
        }
    }

    pub fn lifecycle_changed(&self, running: bool) {
        for listener in self.lifecycle.snapshot() {
            guarded("lifecycle", || {
                if running {
                    listener.started();
                } else {
                    listener.stopped();
                }
            });
        }
    }
}
