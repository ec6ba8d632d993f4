//! Directory protocol.
//!
//! Rooms register with `s<topic>; <port>` and stay connected: the open
//! connection is the registration. Clients send `cl` for the topic list and
//! may then resolve one topic with `cr<topic>`, after which they are
//! disconnected.

use std::net::{Ipv4Addr, SocketAddr};

use chatdir_protocol::{
    DirectoryRequest, Frame, MAX_SERVERS, RoomEndpoint, Topic, encode_topic_list,
};
use tracing::{debug, info, warn};

use super::Dispatcher;
use crate::connection::{ConnId, Connection};
use crate::registry::Registry;
use crate::transport::Transport;

/// What a directory connection turned out to be.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DirectoryRole {
    #[default]
    Unassigned,
    /// A registered chat room.
    Server { topic: Topic, endpoint: RoomEndpoint },
    /// A client that has listed topics.
    Client,
}

#[derive(Debug, Default)]
pub struct DirectoryDispatcher;

impl DirectoryDispatcher {
    pub fn new() -> Self {
        Self
    }

    fn register<T: Transport>(
        &self,
        id: ConnId,
        topic: Topic,
        port: u16,
        registry: &mut Registry<T, DirectoryRole>,
    ) {
        let Some(conn) = registry.get(id) else {
            return;
        };
        if *conn.role() != DirectoryRole::Unassigned {
            return reject(registry, id, "registration from an assigned connection");
        }
        let Some(ip) = ipv4_of(conn.peer()) else {
            return reject(registry, id, "room is not reachable over IPv4");
        };

        let live: Vec<&Topic> = live_rooms(registry).map(|(t, _)| t).collect();
        if live.contains(&&topic) {
            return reject(registry, id, "topic already registered");
        }
        if live.len() >= MAX_SERVERS {
            return reject(registry, id, "directory is full");
        }

        let endpoint = RoomEndpoint::new(ip, port);
        info!(id = %id, topic = %topic, endpoint = %endpoint, "Room registered");
        if let Some(conn) = registry.get_mut(id) {
            conn.set_role(DirectoryRole::Server { topic, endpoint });
        }
    }

    fn list<T: Transport>(&self, id: ConnId, registry: &mut Registry<T, DirectoryRole>) {
        if matches!(
            registry.get(id).map(Connection::role),
            Some(DirectoryRole::Server { .. })
        ) {
            return reject(registry, id, "list from a room");
        }
        let reply = encode_topic_list(live_rooms(registry).map(|(topic, _)| topic.as_str()));
        debug!(id = %id, topics = %reply.text(), "Listing topics");
        if let Some(conn) = registry.get_mut(id) {
            conn.set_role(DirectoryRole::Client);
            conn.enqueue_send(reply);
        }
    }

    fn lookup<T: Transport>(
        &self,
        id: ConnId,
        topic: Topic,
        registry: &mut Registry<T, DirectoryRole>,
    ) {
        if registry.get(id).map(Connection::role) != Some(&DirectoryRole::Client) {
            return reject(registry, id, "lookup before listing topics");
        }
        let endpoint = live_rooms(registry)
            .find(|(t, _)| **t == topic)
            .map(|(_, endpoint)| *endpoint);
        let Some(endpoint) = endpoint else {
            return reject(registry, id, "unknown topic");
        };

        debug!(id = %id, topic = %topic, endpoint = %endpoint, "Resolved topic");
        if let Some(conn) = registry.get_mut(id) {
            conn.enqueue_send(endpoint.to_frame());
            conn.mark_disconnect();
        }
    }
}

impl Dispatcher for DirectoryDispatcher {
    type Role = DirectoryRole;

    fn on_frame<T: Transport>(
        &mut self,
        id: ConnId,
        frame: Frame,
        registry: &mut Registry<T, DirectoryRole>,
    ) {
        if let Some(DirectoryRole::Server { topic, .. }) = registry.get(id).map(Connection::role) {
            warn!(id = %id, topic = %topic, "Registered room sent data, deregistering");
            return reject(registry, id, "data from a registered room");
        }

        let request = match DirectoryRequest::parse(&frame) {
            Ok(request) => request,
            Err(e) => {
                warn!(id = %id, error = %e, "Malformed request");
                return reject(registry, id, "malformed request");
            }
        };

        match request {
            DirectoryRequest::Register { topic, port } => self.register(id, topic, port, registry),
            DirectoryRequest::List => self.list(id, registry),
            DirectoryRequest::Lookup { topic } => self.lookup(id, topic, registry),
        }
    }

    fn on_departed<T: Transport>(
        &mut self,
        departed: &Connection<T, DirectoryRole>,
        _registry: &mut Registry<T, DirectoryRole>,
    ) {
        if let DirectoryRole::Server { topic, endpoint } = departed.role() {
            info!(id = %departed.id(), topic = %topic, endpoint = %endpoint, "Room deregistered");
        }
    }
}

/// Registered rooms still connected, in registration order.
fn live_rooms<T: Transport>(
    registry: &Registry<T, DirectoryRole>,
) -> impl Iterator<Item = (&Topic, &RoomEndpoint)> {
    registry
        .iter()
        .filter(|conn| conn.is_live())
        .filter_map(|conn| match conn.role() {
            DirectoryRole::Server { topic, endpoint } => Some((topic, endpoint)),
            _ => None,
        })
}

fn ipv4_of(peer: SocketAddr) -> Option<Ipv4Addr> {
    match peer {
        SocketAddr::V4(addr) => Some(*addr.ip()),
        SocketAddr::V6(addr) => addr.ip().to_ipv4_mapped(),
    }
}

fn reject<T: Transport>(registry: &mut Registry<T, DirectoryRole>, id: ConnId, reason: &str) {
    debug!(id = %id, reason, "Rejecting connection");
    if let Some(conn) = registry.get_mut(id) {
        conn.mark_disconnect();
    }
}
