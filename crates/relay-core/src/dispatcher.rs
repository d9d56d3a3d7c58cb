//! Presence and broadcast routing.
//!
//! The dispatcher turns one inbound event from one connection into the list of
//! outbound events to fan out, and which connections receive each. It never
//! touches a socket, so the whole routing table is testable in isolation.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::ids::ConnectionId;
use crate::protocol::{ChatMessage, InboundEvent, OutboundEvent};
use crate::registry::Registry;

/// Sender name used when a connection talks before it has joined.
pub const ABSENT_SENDER: &str = "";

/// Shortest accepted display name when join validation is enabled.
pub const MIN_NAME_CHARS: usize = 2;

/// Source of the server-side chat timestamp.
pub trait Clock: Send {
    fn time_of_day(&self) -> String;
}

/// Local wall-clock time rendered as `h:mm:ss AM/PM`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn time_of_day(&self) -> String {
        chrono::Local::now().format("%-I:%M:%S %p").to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipients {
    All,
    AllExcept(ConnectionId),
}

impl Recipients {
    pub fn includes(&self, id: &ConnectionId) -> bool {
        match self {
            Self::All => true,
            Self::AllExcept(excluded) => excluded != id,
        }
    }
}

/// One outbound event and the connections it goes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub recipients: Recipients,
    pub event: OutboundEvent,
}

impl Delivery {
    fn to_all(event: OutboundEvent) -> Self {
        Self {
            recipients: Recipients::All,
            event,
        }
    }

    fn to_others(from: &ConnectionId, event: OutboundEvent) -> Self {
        Self {
            recipients: Recipients::AllExcept(from.clone()),
            event,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport session open, no join yet.
    Connected,
    Joined,
    /// Gone, or never seen. Terminal.
    Disconnected,
}

#[derive(Clone, Debug, Default)]
pub struct DispatcherOptions {
    /// Drop joins whose trimmed name is shorter than [`MIN_NAME_CHARS`].
    pub require_valid_names: bool,
}

pub struct Dispatcher {
    registry: Registry,
    live: HashSet<ConnectionId>,
    clock: Box<dyn Clock>,
    options: DispatcherOptions,
}

impl Dispatcher {
    pub fn new(options: DispatcherOptions) -> Self {
        Self::with_clock(options, Box::new(LocalClock))
    }

    pub fn with_clock(options: DispatcherOptions, clock: Box<dyn Clock>) -> Self {
        Self {
            registry: Registry::new(),
            live: HashSet::new(),
            clock,
            options,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn state(&self, id: &ConnectionId) -> ConnectionState {
        if !self.live.contains(id) {
            ConnectionState::Disconnected
        } else if self.registry.contains(id) {
            ConnectionState::Joined
        } else {
            ConnectionState::Connected
        }
    }

    /// Number of live transport sessions, joined or not.
    pub fn connection_count(&self) -> usize {
        self.live.len()
    }

    /// Apply one event from `from` and return what to fan out.
    pub fn dispatch(&mut self, from: &ConnectionId, event: InboundEvent) -> Vec<Delivery> {
        if let InboundEvent::Connect = event {
            self.live.insert(from.clone());
            return Vec::new();
        }
        if !self.live.contains(from) {
            debug!(
                connection_id = %from,
                event = event.name(),
                "Ignoring event from connection that is not live"
            );
            return Vec::new();
        }

        match event {
            InboundEvent::Connect => Vec::new(),
            InboundEvent::Join { name } => self.join(from, name),
            InboundEvent::ChatMessage { message } => self.chat_message(from, message),
            InboundEvent::Typing { name } => {
                let name = name.unwrap_or_else(|| ABSENT_SENDER.to_owned());
                vec![Delivery::to_others(from, OutboundEvent::Typing(name))]
            }
            InboundEvent::StopTyping => vec![Delivery::to_others(from, OutboundEvent::StopTyping)],
            InboundEvent::Disconnect => self.disconnect(from),
        }
    }

    fn join(&mut self, from: &ConnectionId, name: String) -> Vec<Delivery> {
        if self.options.require_valid_names && name.trim().chars().count() < MIN_NAME_CHARS {
            warn!(connection_id = %from, name = %name, "Rejected join with invalid display name");
            return Vec::new();
        }

        self.registry.put(from.clone(), name.clone());
        info!(connection_id = %from, name = %name, users = self.registry.len(), "User joined");

        vec![
            Delivery::to_others(from, OutboundEvent::UserJoined(name)),
            Delivery::to_all(OutboundEvent::UserList(self.registry.values())),
        ]
    }

    fn chat_message(&mut self, from: &ConnectionId, message: String) -> Vec<Delivery> {
        let username = match self.registry.get(from) {
            Some(name) => name.to_owned(),
            None => {
                debug!(connection_id = %from, "Chat message before join");
                ABSENT_SENDER.to_owned()
            }
        };
        let msg = ChatMessage {
            username,
            message,
            timestamp: self.clock.time_of_day(),
        };
        vec![Delivery::to_all(OutboundEvent::ChatMessage(msg))]
    }

    fn disconnect(&mut self, from: &ConnectionId) -> Vec<Delivery> {
        self.live.remove(from);
        let Some(name) = self.registry.remove(from) else {
            return Vec::new();
        };
        info!(connection_id = %from, name = %name, users = self.registry.len(), "User left");

        vec![
            Delivery::to_others(from, OutboundEvent::UserLeft(name)),
            Delivery::to_others(from, OutboundEvent::UserList(self.registry.values())),
        ]
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherOptions::default())
    }
}
