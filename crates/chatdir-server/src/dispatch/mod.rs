//! Protocol dispatch.
//!
//! A [`Dispatcher`] interprets complete frames according to the sending
//! connection's role. It may touch any connection in the registry: replies
//! and broadcasts are queued on the recipients' send buffers, and rejected
//! peers are marked for disconnect. Nothing here blocks or fails; every
//! malformed input ends in a reprompt or a disconnect.

mod chat;
mod directory;

pub use chat::{ChatDispatcher, ChatRole};
pub use directory::{DirectoryDispatcher, DirectoryRole};

use chatdir_protocol::Frame;

use crate::connection::{ConnId, Connection, ReceiveStatus};
use crate::registry::Registry;
use crate::transport::Transport;

/// Role-based protocol logic run by the reactor.
pub trait Dispatcher {
    /// Per-connection protocol state; new connections start at `default()`.
    type Role: Default;

    /// Called once per connection, when it is ready for protocol traffic.
    ///
    /// For TLS connections that is after the handshake, so a peer that
    /// fails it is never seen here.
    fn on_accept<T: Transport>(&mut self, id: ConnId, registry: &mut Registry<T, Self::Role>) {
        let _ = (id, registry);
    }

    /// Called for every complete inbound frame.
    fn on_frame<T: Transport>(
        &mut self,
        id: ConnId,
        frame: Frame,
        registry: &mut Registry<T, Self::Role>,
    );

    /// Called after a closed connection has been removed from the registry.
    fn on_departed<T: Transport>(
        &mut self,
        departed: &Connection<T, Self::Role>,
        registry: &mut Registry<T, Self::Role>,
    ) {
        let _ = (departed, registry);
    }
}

/// Reads everything available on `id`, dispatching each complete frame.
///
/// The dispatcher hears about the connection through
/// [`Dispatcher::on_accept`] once its transport finishes any handshake,
/// before its first frame. Stops at would-block, on close, or once the
/// dispatcher marks the connection for disconnect. Returns the number of
/// frames dispatched.
pub fn drain_input<T, D>(
    dispatcher: &mut D,
    registry: &mut Registry<T, D::Role>,
    id: ConnId,
) -> usize
where
    T: Transport,
    D: Dispatcher,
{
    let mut dispatched = 0;
    while let Some(conn) = registry.get_mut(id) {
        let status = conn.receive_once();
        establish(dispatcher, registry, id);
        match status {
            ReceiveStatus::Complete(frame) => {
                dispatched += 1;
                dispatcher.on_frame(id, frame, registry);
            }
            ReceiveStatus::Partial => {}
            ReceiveStatus::WouldBlock | ReceiveStatus::Closed => break,
        }
    }
    dispatched
}

/// Runs [`Dispatcher::on_accept`] for `id` if its transport just became
/// ready. Returns true if it did.
pub fn establish<T, D>(dispatcher: &mut D, registry: &mut Registry<T, D::Role>, id: ConnId) -> bool
where
    T: Transport,
    D: Dispatcher,
{
    let ready = registry
        .get_mut(id)
        .is_some_and(|conn| conn.try_establish());
    if ready {
        dispatcher.on_accept(id, registry);
    }
    ready
}

/// Removes closed connections and reports each departure to the dispatcher.
///
/// Returns the removed connections so the caller can release whatever it
/// still holds for them.
pub fn reap_departed<T, D>(
    dispatcher: &mut D,
    registry: &mut Registry<T, D::Role>,
) -> Vec<Connection<T, D::Role>>
where
    T: Transport,
    D: Dispatcher,
{
    let departed = registry.reap();
    for conn in &departed {
        dispatcher.on_departed(conn, registry);
    }
    departed
}
