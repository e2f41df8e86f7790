//! Interfaces onto the connection layer
//!
//! The finder never opens sockets itself. A [`ClientPool`] hands out
//! short-lived leases on connected database-server sessions, one per device,
//! and a [`DeviceRegistry`] reports which devices are currently announcing
//! themselves on the network. Both are injected when the finder is
//! constructed, so tests (and archive-only deployments) can supply stubs.

use crate::proto::{Field, MenuTarget, Message, MessageKind, ProtoError};
use crate::types::{DeviceId, SlotKind};

/// Errors from the connection layer and the queries that run over it
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// No connected client session could be produced for the device
    #[error("no client session available for device {0}")]
    Unavailable(DeviceId),

    /// The session-layer failed mid-exchange
    #[error("client session failed: {0}")]
    Session(String),

    #[error("protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One connected database-server session, bound to a single device
///
/// Implementations own transaction-id assignment and transport framing; the
/// queries in [`crate::metadata::fetch`] are written purely in terms of this
/// trait.
pub trait Client: Send {
    /// Send a menu-style request and return the response header message,
    /// whose result count says how many items a render will produce
    fn menu_request(
        &mut self,
        kind: MessageKind,
        menu: MenuTarget,
        slot: SlotKind,
        arguments: Vec<Field>,
    ) -> Result<Message, FetchError>;

    /// Send a request whose answer is a single message
    fn simple_request(
        &mut self,
        kind: MessageKind,
        menu: MenuTarget,
        slot: SlotKind,
        arguments: Vec<Field>,
    ) -> Result<Message, FetchError>;

    /// Render the items of a previously requested menu, in menu order
    fn render_menu_items(
        &mut self,
        menu: MenuTarget,
        slot: SlotKind,
        response: &Message,
    ) -> Result<Vec<Message>, FetchError>;
}

/// Hands out leases on connected client sessions
///
/// A lease is released when the returned box drops, on every exit path.
/// `description` names the operation for the pool's own logging.
pub trait ClientPool: Send + Sync {
    fn lease(
        &self,
        device: DeviceId,
        description: &str,
    ) -> Result<Box<dyn Client + '_>, FetchError>;
}

/// The announcement listener's view of which devices are on the network
pub trait DeviceRegistry: Send + Sync {
    fn is_announced(&self, device: DeviceId) -> bool;
}
