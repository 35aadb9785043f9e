//! Device lifecycle events and listeners
//!
//! An [`Event`] describes one thing that happened to a device connection. It
//! borrows everything it refers to, so building one allocates nothing and a
//! listener cannot keep it past its own invocation. A listener that needs the
//! message or encoded bytes later must copy them.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::device::Device;

/// Display name for event type values outside the known set
pub const INVALID_EVENT_STRING: &str = "!!INVALID DEVICE EVENT TYPE!!";

/// The kind of a device event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    Connect = 0,
    Disconnect = 1,
    MessageReceived = 2,
    MessageFailed = 3,
    Pong = 4,
}

impl EventType {
    /// Map a raw value back to an event type
    pub fn from_repr(value: u8) -> Option<Self> {
        match value {
            0 => Some(EventType::Connect),
            1 => Some(EventType::Disconnect),
            2 => Some(EventType::MessageReceived),
            3 => Some(EventType::MessageFailed),
            4 => Some(EventType::Pong),
            _ => None,
        }
    }

    /// Canonical name of this event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Connect => "Connect",
            EventType::Disconnect => "Disconnect",
            EventType::MessageReceived => "MessageReceived",
            EventType::MessageFailed => "MessageFailed",
            EventType::Pong => "Pong",
        }
    }

    /// Canonical name for a raw value, or [`INVALID_EVENT_STRING`]
    pub fn name_of(value: u8) -> &'static str {
        Self::from_repr(value).map_or(INVALID_EVENT_STRING, |event_type| event_type.as_str())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message travelling to or from a device.
///
/// The gateway core never interprets messages beyond these accessors.
pub trait Routable: fmt::Debug + Send + Sync {
    /// Who sent the message
    fn source(&self) -> &str;

    /// Who the message is addressed to
    fn destination(&self) -> &str;
}

/// Minimal [`Routable`] message carrying an opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub source: String,
    pub destination: String,
    pub payload: Bytes,
}

impl Message {
    pub fn new(source: impl Into<String>, destination: impl Into<String>, payload: Bytes) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            payload,
        }
    }
}

impl Routable for Message {
    fn source(&self) -> &str {
        &self.source
    }

    fn destination(&self) -> &str {
        &self.destination
    }
}

/// What an event carries besides its type and device
#[derive(Debug, Clone, Copy)]
enum Payload<'a> {
    None,
    Message {
        message: &'a dyn Routable,
        encoded: &'a [u8],
    },
    Pong(&'a str),
}

/// One occurrence in a device connection's lifecycle.
///
/// Constructors keep the payload consistent with the type: only
/// `MessageReceived` and `MessageFailed` carry a message and its encoded form,
/// only `Pong` carries pong data.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    event_type: EventType,
    device: &'a Arc<Device>,
    payload: Payload<'a>,
}

impl<'a> Event<'a> {
    pub fn connect(device: &'a Arc<Device>) -> Self {
        Self {
            event_type: EventType::Connect,
            device,
            payload: Payload::None,
        }
    }

    pub fn disconnect(device: &'a Arc<Device>) -> Self {
        Self {
            event_type: EventType::Disconnect,
            device,
            payload: Payload::None,
        }
    }

    pub fn message_received(
        device: &'a Arc<Device>,
        message: &'a dyn Routable,
        encoded: &'a [u8],
    ) -> Self {
        Self {
            event_type: EventType::MessageReceived,
            device,
            payload: Payload::Message { message, encoded },
        }
    }

    pub fn message_failed(
        device: &'a Arc<Device>,
        message: &'a dyn Routable,
        encoded: &'a [u8],
    ) -> Self {
        Self {
            event_type: EventType::MessageFailed,
            device,
            payload: Payload::Message { message, encoded },
        }
    }

    pub fn pong(device: &'a Arc<Device>, data: &'a str) -> Self {
        Self {
            event_type: EventType::Pong,
            device,
            payload: Payload::Pong(data),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// The device this event is about, possibly already disconnected
    pub fn device(&self) -> &'a Arc<Device> {
        self.device
    }

    /// The message, for `MessageReceived` and `MessageFailed` events
    pub fn message(&self) -> Option<&'a dyn Routable> {
        match self.payload {
            Payload::Message { message, .. } => Some(message),
            _ => None,
        }
    }

    /// The encoded form of [`message`](Event::message)
    pub fn encoded(&self) -> Option<&'a [u8]> {
        match self.payload {
            Payload::Message { encoded, .. } => Some(encoded),
            _ => None,
        }
    }

    /// Pong data, for `Pong` events
    pub fn data(&self) -> Option<&'a str> {
        match self.payload {
            Payload::Pong(data) => Some(data),
            _ => None,
        }
    }
}

/// An event sink.
///
/// Listeners must not block and must copy anything they need from the event
/// before returning.
pub type Listener = Arc<dyn Fn(&Event<'_>) + Send + Sync>;

/// Ordered set of listeners that all observe the same events
#[derive(Clone, Default)]
pub struct Listeners {
    listeners: Vec<Listener>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with<F>(mut self, listener: F) -> Self
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        self.push(listener);
        self
    }

    pub fn push<F>(&mut self, listener: F)
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Invoke every listener with `event`, in registration order
    pub fn dispatch(&self, event: &Event<'_>) {
        for listener in &self.listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

impl From<Vec<Listener>> for Listeners {
    fn from(listeners: Vec<Listener>) -> Self {
        Self { listeners }
    }
}
