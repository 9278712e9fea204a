//! # heatwatch-types
//!
//! Shared data model for heat-pump telemetry dashboards. This crate defines
//! what travels between the telemetry server and a dashboard client: the
//! bulk [`Snapshot`] returned by the initial-data endpoint, the incremental
//! [`UpdateEvent`] pushed over the live channel, and the [`ClientMessage`] /
//! [`ServerMessage`] envelopes of that channel.
//!
//! ## Design Goals
//!
//! - **No I/O**: pure data types, usable by any transport
//! - **Schema-light**: snapshots stay JSON objects so new server panels flow
//!   through untouched, with typed views for the panels we know about
//! - **Last-write-wins merging**: updates replace whole fields, never append
//!
//! ## Example
//!
//! ```rust
//! use heatwatch_types::{Snapshot, UpdateEvent};
//! use serde_json::json;
//!
//! let mut snapshot = Snapshot::from_value(json!({
//!     "temperature": { "timestamps": [0, 60000], "outdoor_temp": [-2.0, -1.5] }
//! }))
//! .unwrap();
//!
//! let update = UpdateEvent::from_value(json!({
//!     "temperature": { "outdoor_temp": [-1.0] }
//! }))
//! .unwrap();
//!
//! snapshot.apply(&update);
//! assert_eq!(snapshot.field("temperature", "outdoor_temp"), Some(&json!([-1.0])));
//! assert_eq!(snapshot.field("temperature", "timestamps"), Some(&json!([0, 60000])));
//! ```

mod error;
mod panels;
mod range;
mod snapshot;
mod wire;

pub use error::*;
pub use panels::*;
pub use range::*;
pub use snapshot::*;
pub use wire::*;
