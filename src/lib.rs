//! # heatwatch
//!
//! A live sync client for heat-pump telemetry dashboards.
//!
//! The telemetry server does the heavy lifting (time-series aggregation, KPI
//! computation, alarm detection). This crate keeps a rendered view of that
//! data in sync: it pulls a bulk snapshot for the selected time range, then
//! applies incremental updates pushed over a live channel, re-pulling whenever
//! the range changes or the connection comes back.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          dashboard                           │
//! │                                                              │
//! │  ┌─────────┐  SnapshotLoaded   ┌─────────┐    ┌───────────┐  │
//! │  │ source  │──────────────────▶│  sync   │───▶│   sink    │  │
//! │  │ (HTTP)  │◀──────────────────│(reducer)│    │(rendering)│  │
//! │  └─────────┘   LoadSnapshot    └────┬────┘    └───────────┘  │
//! │                                  ▲  │                        │
//! │                 UpdateReceived,  │  │ Send, Reconnect        │
//! │               ConnectionChanged  │  ▼                        │
//! │                               ┌─────────┐                    │
//! │                               │ channel │◀── WebSocket       │
//! │                               └─────────┘                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: Snapshot loader abstraction ([`SnapshotLoader`] trait) and
//!   the HTTP implementation
//! - **[`channel`]**: Live update channel: connection state machine, fixed-delay
//!   reconnect policy and the WebSocket transport
//! - **[`sync`]**: The [`Synchronizer`] reducer that owns connection and range
//!   state and decides what to pull, send and render
//! - **[`sink`]**: Presentation sinks; [`ViewModel`] keeps rendered state in
//!   memory, [`LogSink`] reports it through `tracing`
//! - **[`dashboard`]**: The async runtime tying the pieces together
//!
//! Data types (snapshots, updates, wire messages) live in the
//! [`heatwatch_types`] crate and are re-exported here.
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Follow a server with the default 24h range
//! heatwatch --url http://heatpump.local:5000
//!
//! # Write one 7-day snapshot to a file and exit
//! heatwatch --url http://heatpump.local:5000 --range 7d --export week.json
//! ```
//!
//! ### Driving the reducer headlessly
//!
//! ```
//! use heatwatch::{Command, Snapshot, SyncEvent, Synchronizer, TimeRange, UpdateEvent, ViewModel};
//! use serde_json::json;
//!
//! let mut sync = Synchronizer::new(TimeRange::default());
//! let mut view = ViewModel::new();
//!
//! let commands = sync.handle(SyncEvent::Started, &mut view);
//! let Command::LoadSnapshot(tag) = commands[0].clone() else { unreachable!() };
//!
//! let snapshot = Snapshot::from_value(json!({
//!     "temperature": { "timestamps": [0, 60000], "outdoor_temp": [-2.0, -1.5] }
//! }))
//! .unwrap();
//! sync.handle(SyncEvent::SnapshotLoaded { tag, result: Ok(snapshot) }, &mut view);
//!
//! let update = UpdateEvent::from_value(json!({ "temperature": { "outdoor_temp": [-1.0] } })).unwrap();
//! sync.handle(SyncEvent::UpdateReceived(update), &mut view);
//!
//! assert_eq!(
//!     view.snapshot().unwrap().field("temperature", "outdoor_temp"),
//!     Some(&json!([-1.0]))
//! );
//! ```

pub mod channel;
pub mod config;
pub mod dashboard;
pub mod duration;
mod error;
pub mod sink;
pub mod source;
pub mod sync;

pub use channel::{
    ChannelCommand, ChannelEvent, ChannelHandle, ChannelPeer, ConnectionState, ReconnectPolicy,
    WebSocketChannel,
};
pub use config::Settings;
pub use dashboard::{Dashboard, DashboardHandle};
pub use error::SyncError;
pub use sink::{LogSink, PresentationSink, ViewModel};
pub use source::{HttpSnapshotLoader, HttpSnapshotLoaderBuilder, SnapshotLoader};
pub use sync::{Command, LoadTag, SyncEvent, Synchronizer};

// Re-export the data model for convenience
pub use heatwatch_types::{
    ClientMessage, PayloadError, SeriesPanel, ServerMessage, Snapshot, TimeRange, UpdateEvent,
};
