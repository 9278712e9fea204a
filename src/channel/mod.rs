//! Live update channel.
//!
//! A channel is a persistent duplex connection to the telemetry server. It is
//! driven by its own task and talks to the rest of the client through a
//! [`ChannelHandle`]: connection state changes and server messages arrive on
//! `events`, outgoing messages and control requests go out on `commands`.
//!
//! ```text
//!   ┌──────────────┐   ChannelEvent    ┌──────────────┐
//!   │   channel    │──────────────────▶│  dashboard   │
//!   │    task      │◀──────────────────│              │
//!   └──────────────┘   ChannelCommand  └──────────────┘
//! ```
//!
//! [`WebSocketChannel`] is the network implementation. [`ChannelHandle::pair`]
//! gives both ends of an in-process channel, for embedding another transport
//! or driving a dashboard from tests.

mod websocket;

pub use websocket::WebSocketChannel;

use std::fmt;
use std::time::Duration;

use heatwatch_types::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;

/// Connection state of the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected. A retry may be scheduled.
    #[default]
    Disconnected,
    /// A connect attempt is in progress. `attempt` counts from 1 since the
    /// last successful connection.
    Connecting { attempt: u32 },
    /// Connected; server messages flow.
    Connected,
    /// The reconnect policy is exhausted. Only an explicit reconnect request
    /// starts a new round of attempts.
    GaveUp { attempts: u32 },
}

impl ConnectionState {
    /// Check if messages can currently be exchanged.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting { attempt } => write!(f, "connecting (attempt {})", attempt),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::GaveUp { attempts } => {
                write!(f, "gave up after {} attempts", attempts)
            }
        }
    }
}

/// Fixed-delay reconnect policy.
///
/// Retries happen at a constant interval; after `max_attempts` consecutive
/// failed connects the channel stops trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Delay before the next connect attempt, or `None` once
    /// `consecutive_failures` has reached the attempt limit.
    pub fn next_delay(&self, consecutive_failures: u32) -> Option<Duration> {
        if consecutive_failures >= self.max_attempts {
            None
        } else {
            Some(self.delay)
        }
    }
}

/// Something that happened on the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The connection state changed.
    State(ConnectionState),
    /// A server message arrived.
    Received(ServerMessage),
    /// A frame arrived that could not be decoded.
    Malformed(String),
}

/// A request to the channel task.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCommand {
    /// Send a message. Dropped if not connected.
    Send(ClientMessage),
    /// Start a new round of connect attempts after giving up.
    Reconnect,
    /// Close the connection and stop the task.
    Shutdown,
}

/// The client's end of a channel.
#[derive(Debug)]
pub struct ChannelHandle {
    pub events: mpsc::Receiver<ChannelEvent>,
    pub commands: mpsc::Sender<ChannelCommand>,
}

/// The transport's end of a channel.
#[derive(Debug)]
pub struct ChannelPeer {
    pub events: mpsc::Sender<ChannelEvent>,
    pub commands: mpsc::Receiver<ChannelCommand>,
}

impl ChannelHandle {
    /// Create both ends of an in-process channel.
    pub fn pair(buffer: usize) -> (ChannelHandle, ChannelPeer) {
        let (event_tx, event_rx) = mpsc::channel(buffer);
        let (command_tx, command_rx) = mpsc::channel(buffer);
        (
            ChannelHandle {
                events: event_rx,
                commands: command_tx,
            },
            ChannelPeer {
                events: event_tx,
                commands: command_rx,
            },
        )
    }
}
