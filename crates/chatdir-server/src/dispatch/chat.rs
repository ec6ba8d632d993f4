//! Chat room protocol.

use chatdir_protocol::{Frame, Notice, truncate_message, truncate_name};
use tracing::{debug, info};

use super::Dispatcher;
use crate::connection::{ConnId, Connection};
use crate::registry::Registry;
use crate::transport::Transport;

/// Whether a chat connection has picked a display name yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChatRole {
    #[default]
    Unnamed,
    Named {
        name: String,
    },
}

impl ChatRole {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Unnamed => None,
            Self::Named { name } => Some(name.as_str()),
        }
    }
}

/// Names members and relays their messages to everyone else.
#[derive(Debug)]
pub struct ChatDispatcher {
    first_member_pending: bool,
}

impl Default for ChatDispatcher {
    fn default() -> Self {
        Self {
            first_member_pending: true,
        }
    }
}

impl ChatDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn admit<T: Transport>(
        &mut self,
        id: ConnId,
        frame: &Frame,
        registry: &mut Registry<T, ChatRole>,
    ) {
        let text = frame.text();
        let requested = text.trim_end_matches(['\r', '\n']);
        if requested.is_empty() {
            send(registry, id, Notice::EmptyName);
            return;
        }

        let (name, truncated) = truncate_name(requested);
        let taken = registry
            .iter()
            .any(|conn| conn.id() != id && conn.is_live() && conn.role().name() == Some(name));
        if taken {
            debug!(id = %id, name, "Name already taken");
            send(registry, id, Notice::NameTaken);
            return;
        }

        let Some(conn) = registry.get_mut(id) else {
            return;
        };
        conn.set_role(ChatRole::Named {
            name: name.to_string(),
        });
        if truncated {
            conn.enqueue_send(Notice::NameTruncated(name).to_frame());
        }
        if self.first_member_pending {
            self.first_member_pending = false;
            conn.enqueue_send(Notice::FirstMember.to_frame());
        }
        conn.enqueue_send(Notice::Welcome.to_frame());
        info!(id = %id, name, "Member joined");

        registry.broadcast(Notice::Joined(name).to_frame(), |other| {
            other.id() != id && other.role().name().is_some()
        });
    }

    fn relay<T: Transport>(
        &self,
        id: ConnId,
        name: &str,
        frame: &Frame,
        registry: &mut Registry<T, ChatRole>,
    ) {
        let text = frame.text();
        let (kept, truncated) = truncate_message(&text);
        if truncated {
            send(registry, id, Notice::Truncated(kept));
        }
        debug!(id = %id, name, "Relaying message");
        registry.broadcast(Notice::Message { name, text: kept }.to_frame(), |other| {
            other.id() != id && other.role().name().is_some()
        });
    }
}

impl Dispatcher for ChatDispatcher {
    type Role = ChatRole;

    fn on_accept<T: Transport>(&mut self, id: ConnId, registry: &mut Registry<T, ChatRole>) {
        send(registry, id, Notice::Prompt);
    }

    fn on_frame<T: Transport>(
        &mut self,
        id: ConnId,
        frame: Frame,
        registry: &mut Registry<T, ChatRole>,
    ) {
        let Some(conn) = registry.get(id) else {
            return;
        };
        match conn.role().name().map(str::to_string) {
            None => self.admit(id, &frame, registry),
            Some(name) => self.relay(id, &name, &frame, registry),
        }
    }

    fn on_departed<T: Transport>(
        &mut self,
        departed: &Connection<T, ChatRole>,
        registry: &mut Registry<T, ChatRole>,
    ) {
        if let Some(name) = departed.role().name() {
            info!(id = %departed.id(), name, "Member left");
            registry.broadcast(Notice::Left(name).to_frame(), |other| {
                other.role().name().is_some()
            });
        }
    }
}

fn send<T: Transport>(registry: &mut Registry<T, ChatRole>, id: ConnId, notice: Notice<'_>) {
    if let Some(conn) = registry.get_mut(id) {
        conn.enqueue_send(notice.to_frame());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::reap_departed;
    use crate::transport::mock::ScriptedTransport;

    struct Room {
        registry: Registry<ScriptedTransport, ChatRole>,
        dispatcher: ChatDispatcher,
    }

    impl Room {
        fn new() -> Self {
            Self {
                registry: Registry::new(16),
                dispatcher: ChatDispatcher::new(),
            }
        }

        fn connect(&mut self) -> ConnId {
            let id = self
                .registry
                .insert(ScriptedTransport::new(), "127.0.0.1:6000".parse().unwrap());
            self.dispatcher.on_accept(id, &mut self.registry);
            self.registry.flush_all();
            id
        }

        fn send(&mut self, id: ConnId, text: &str) {
            self.dispatcher
                .on_frame(id, Frame::from_text(text), &mut self.registry);
            self.registry.flush_all();
        }

        fn join(&mut self, name: &str) -> ConnId {
            let id = self.connect();
            self.send(id, name);
            id
        }

        fn leave(&mut self, id: ConnId) {
            self.registry.get_mut(id).unwrap().close();
            reap_departed(&mut self.dispatcher, &mut self.registry);
            self.registry.flush_all();
        }

        fn sent(&self, id: ConnId) -> Vec<String> {
            self.registry.get(id).unwrap().transport().sent_texts()
        }

        fn name(&self, id: ConnId) -> Option<&str> {
            self.registry.get(id).unwrap().role().name()
        }
    }

    #[test]
    fn new_connection_is_prompted() {
        let mut room = Room::new();
        let id = room.connect();
        assert_eq!(room.sent(id), vec!["Please input a username (max ten chars):"]);
    }

    #[test]
    fn first_member_is_told_so() {
        let mut room = Room::new();
        let alice = room.join("alice");
        let bob = room.join("bob");

        insta::assert_debug_snapshot!(room.sent(alice), @r#"
        [
            "Please input a username (max ten chars):",
            "You are the first user to join the chat",
            "You may now begin chatting (max message length is 87 chars)",
            "bob has joined the chat",
        ]
        "#);
        insta::assert_debug_snapshot!(room.sent(bob), @r#"
        [
            "Please input a username (max ten chars):",
            "You may now begin chatting (max message length is 87 chars)",
        ]
        "#);
    }

    #[test]
    fn empty_name_reprompts() {
        let mut room = Room::new();
        let id = room.connect();
        room.send(id, "");
        assert_eq!(room.name(id), None);
        assert_eq!(
            room.sent(id).last().unwrap(),
            "An empty username is invalid, please enter a new name:"
        );
    }

    #[test]
    fn long_name_is_truncated_and_collides_on_the_truncated_form() {
        let mut room = Room::new();
        let first = room.join("VeryLongName12");
        assert_eq!(room.name(first), Some("VeryLongNa"));
        assert!(
            room.sent(first)
                .contains(&"Your name was truncated to VeryLongNa".to_string())
        );

        let second = room.join("VeryLongNameXY");
        assert_eq!(room.name(second), None);
        assert!(room.registry.get(second).unwrap().is_live());
        assert_eq!(
            room.sent(second).last().unwrap(),
            "That username is already taken, please enter a new name:"
        );

        room.send(second, "Other");
        assert_eq!(room.name(second), Some("Other"));
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut room = Room::new();
        room.join("alice");
        let other = room.join("Alice");
        assert_eq!(room.name(other), Some("Alice"));
    }

    #[test]
    fn messages_never_echo_to_the_sender() {
        let mut room = Room::new();
        let alice = room.join("alice");
        let bob = room.join("bob");
        let lurker = room.connect();
        let before = room.sent(alice).len();

        room.send(alice, "hi all");

        assert_eq!(room.sent(alice).len(), before);
        assert_eq!(room.sent(bob).last().unwrap(), "alice: hi all");
        // unnamed connections only ever saw the prompt
        assert_eq!(room.sent(lurker).len(), 1);
    }

    #[test]
    fn long_message_is_truncated_with_a_private_notice() {
        let mut room = Room::new();
        let alice = room.join("alice");
        let bob = room.join("bob");
        let long = "x".repeat(95);
        let kept = "x".repeat(87);

        room.send(alice, &long);

        assert_eq!(room.sent(alice).last().unwrap(), &format!("Truncated: {kept}"));
        assert_eq!(room.sent(bob).last().unwrap(), &format!("alice: {kept}"));
    }

    #[test]
    fn departure_is_announced_to_remaining_members() {
        let mut room = Room::new();
        let alice = room.join("alice");
        let bob = room.join("bob");
        let carol = room.join("carol");

        room.leave(bob);

        assert_eq!(room.sent(alice).last().unwrap(), "bob has left the chat");
        assert_eq!(room.sent(carol).last().unwrap(), "bob has left the chat");
        assert!(room.registry.get(bob).is_none());
    }

    #[test]
    fn unnamed_departure_is_silent() {
        let mut room = Room::new();
        let alice = room.join("alice");
        let before = room.sent(alice).len();
        let lurker = room.connect();

        room.leave(lurker);
        assert_eq!(room.sent(alice).len(), before);
    }

    #[test]
    fn name_is_free_after_its_owner_leaves() {
        let mut room = Room::new();
        let alice = room.join("alice");
        room.leave(alice);

        let again = room.join("alice");
        assert_eq!(room.name(again), Some("alice"));
    }
}
