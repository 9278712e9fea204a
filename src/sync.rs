//! Connection and range synchronization.
//!
//! [`Synchronizer`] is a reducer: it consumes one [`SyncEvent`] at a time,
//! drives the [`PresentationSink`], and returns the [`Command`]s the runtime
//! must carry out (snapshot pulls, channel messages, reconnects). It owns the
//! only copy of the connection and range state and performs no I/O itself.
//!
//! ## Staleness
//!
//! Every snapshot pull is tagged with the range it was issued for and a
//! sequence number. A result is applied only if its range is still active,
//! it was issued after the last range switch, and it is newer than the last
//! applied pull. A range reply received over the live channel counts as a
//! switch, so pulls issued before it are discarded as well.
//!
//! Range changes made while connected are answered over the channel, in the
//! order they were sent. Each `change_time_range` sent adds one outstanding
//! reply; only the reply to the latest request is applied, the others belong
//! to superseded ranges and are dropped.

use heatwatch_types::{ClientMessage, TimeRange, UpdateEvent};
use tracing::{debug, info, warn};

use crate::channel::ConnectionState;
use crate::sink::PresentationSink;
use crate::SyncError;

/// Identifies one snapshot pull.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadTag {
    pub range: TimeRange,
    pub seq: u64,
}

/// Input to the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The runtime started.
    Started,
    /// The user selected a range.
    RangeChanged(TimeRange),
    /// The user asked for fresh data for the current range.
    RefreshRequested,
    /// The user asked the live channel to try connecting again.
    ReconnectRequested,
    /// A snapshot pull finished.
    SnapshotLoaded {
        tag: LoadTag,
        result: Result<heatwatch_types::Snapshot, SyncError>,
    },
    /// The server pushed an update.
    UpdateReceived(UpdateEvent),
    /// The live channel changed state.
    ConnectionChanged(ConnectionState),
    /// Informational text from the server.
    StatusMessage(String),
    /// Something failed outside a snapshot pull.
    ErrorOccurred(SyncError),
    /// A message could not be handed to the live channel.
    SendFailed(ClientMessage),
}

/// Work the runtime must carry out for the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Pull a snapshot and feed the result back as [`SyncEvent::SnapshotLoaded`].
    LoadSnapshot(LoadTag),
    /// Send a message over the live channel.
    Send(ClientMessage),
    /// Ask the live channel to start a new round of connect attempts.
    Reconnect,
}

/// Connection and range state machine.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    active: TimeRange,
    price: Option<f64>,
    connection: ConnectionState,
    /// Range replies the server still owes us.
    pending_replies: u32,
    /// Whether the last pending reply answers the active range.
    reply_wanted: bool,
    /// Sequence number of the last issued pull.
    issued: u64,
    /// Pulls below this sequence number predate the current range state.
    floor: u64,
    /// Sequence number of the last applied pull.
    applied: u64,
}

impl Synchronizer {
    /// Create a synchronizer for the initial range.
    pub fn new(range: TimeRange) -> Self {
        Self {
            active: range,
            price: None,
            connection: ConnectionState::Disconnected,
            pending_replies: 0,
            reply_wanted: false,
            issued: 0,
            floor: 0,
            applied: 0,
        }
    }

    /// Electricity price sent with refresh requests.
    pub fn with_price(mut self, price: Option<f64>) -> Self {
        self.price = price;
        self
    }

    pub fn active_range(&self) -> &TimeRange {
        &self.active
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Whether the next live update is taken as the new range's full state.
    pub fn awaiting_range_reply(&self) -> bool {
        self.pending_replies > 0 && self.reply_wanted
    }

    /// Number of `change_time_range` requests not answered yet.
    pub fn pending_range_replies(&self) -> u32 {
        self.pending_replies
    }

    /// Handle one event.
    pub fn handle(&mut self, event: SyncEvent, sink: &mut dyn PresentationSink) -> Vec<Command> {
        match event {
            SyncEvent::Started => {
                info!(range = %self.active, "Starting");
                vec![self.pull()]
            }
            SyncEvent::RangeChanged(range) => self.change_range(range),
            SyncEvent::RefreshRequested => self.refresh(),
            SyncEvent::ReconnectRequested => {
                info!("Reconnect requested");
                vec![Command::Reconnect]
            }
            SyncEvent::SnapshotLoaded { tag, result } => {
                self.snapshot_loaded(tag, result, sink);
                Vec::new()
            }
            SyncEvent::UpdateReceived(update) => self.update_received(update, sink),
            SyncEvent::ConnectionChanged(state) => self.connection_changed(state, sink),
            SyncEvent::StatusMessage(message) => {
                info!("Server status: {}", message);
                Vec::new()
            }
            SyncEvent::ErrorOccurred(error) => {
                sink.report_error(error);
                Vec::new()
            }
            SyncEvent::SendFailed(msg) => self.send_failed(msg),
        }
    }

    fn pull(&mut self) -> Command {
        self.issued += 1;
        Command::LoadSnapshot(LoadTag {
            range: self.active.clone(),
            seq: self.issued,
        })
    }

    /// Make every pull issued so far stale.
    fn bump_floor(&mut self) {
        self.floor = self.issued + 1;
    }

    fn clear_replies(&mut self) {
        self.pending_replies = 0;
        self.reply_wanted = false;
    }

    fn change_range(&mut self, range: TimeRange) -> Vec<Command> {
        if range == self.active {
            return self.refresh();
        }

        info!(from = %self.active, to = %range, span = ?range.span(), "Time range changed");
        self.active = range;
        self.bump_floor();

        match self.connection {
            ConnectionState::Connected => {
                self.pending_replies += 1;
                self.reply_wanted = true;
                vec![Command::Send(ClientMessage::ChangeTimeRange {
                    range: self.active.clone(),
                })]
            }
            ConnectionState::GaveUp { .. } => {
                self.clear_replies();
                vec![self.pull(), Command::Reconnect]
            }
            _ => {
                self.clear_replies();
                vec![self.pull()]
            }
        }
    }

    fn refresh(&mut self) -> Vec<Command> {
        if self.connection.is_connected() {
            vec![Command::Send(ClientMessage::RequestUpdate {
                range: self.active.clone(),
                price: self.price,
            })]
        } else {
            vec![self.pull()]
        }
    }

    fn snapshot_loaded(
        &mut self,
        tag: LoadTag,
        result: Result<heatwatch_types::Snapshot, SyncError>,
        sink: &mut dyn PresentationSink,
    ) {
        if tag.range != self.active || tag.seq < self.floor || tag.seq <= self.applied {
            debug!(range = %tag.range, seq = tag.seq, active = %self.active, "Discarding stale snapshot");
            return;
        }

        match result {
            Ok(snapshot) => {
                debug!(range = %tag.range, seq = tag.seq, panels = snapshot.len(), "Applying snapshot");
                self.applied = tag.seq;
                sink.apply_snapshot(snapshot);
            }
            Err(error) => {
                warn!(range = %tag.range, "Snapshot load failed: {}", error);
                sink.report_error(error);
            }
        }
    }

    fn update_received(
        &mut self,
        update: UpdateEvent,
        sink: &mut dyn PresentationSink,
    ) -> Vec<Command> {
        if self.pending_replies == 0 {
            sink.apply_update(update);
            return Vec::new();
        }

        self.pending_replies -= 1;
        if self.pending_replies > 0 || !self.reply_wanted {
            debug!(
                pending = self.pending_replies,
                "Discarding reply to a superseded range request"
            );
            return Vec::new();
        }

        self.reply_wanted = false;
        match update.into_snapshot() {
            Ok(snapshot) => {
                debug!(range = %self.active, "Applying range reply");
                self.bump_floor();
                sink.apply_snapshot(snapshot);
                Vec::new()
            }
            Err(e) => {
                sink.report_error(SyncError::from(e));
                vec![self.pull()]
            }
        }
    }

    fn connection_changed(
        &mut self,
        state: ConnectionState,
        sink: &mut dyn PresentationSink,
    ) -> Vec<Command> {
        let was_connected = self.connection.is_connected();
        self.connection = state;

        match (was_connected, state.is_connected()) {
            (false, true) => {
                sink.set_connection_state(true);
                self.clear_replies();
                vec![self.pull()]
            }
            (true, false) => {
                sink.set_connection_state(false);
                let awaiting = self.awaiting_range_reply();
                self.clear_replies();
                if awaiting {
                    vec![self.pull()]
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    fn send_failed(&mut self, msg: ClientMessage) -> Vec<Command> {
        warn!(event = msg.event_name(), "Message not sent to live channel");
        match msg {
            ClientMessage::ChangeTimeRange { range } => {
                self.pending_replies = self.pending_replies.saturating_sub(1);
                if range != self.active {
                    // A superseded request; the latest one is still pending.
                    return Vec::new();
                }
                self.reply_wanted = false;
                vec![self.pull()]
            }
            ClientMessage::RequestUpdate { .. } => vec![self.pull()],
        }
    }
}
