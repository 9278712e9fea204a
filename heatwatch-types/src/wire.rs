//! Live channel messages.
//!
//! Every message travels as one JSON text frame of the form
//! `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{PayloadError, TimeRange, UpdateEvent};

/// Messages the dashboard sends to the telemetry server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the server to switch the pushed state to another range.
    ChangeTimeRange { range: TimeRange },

    /// Ask the server to push fresh state for the current range.
    RequestUpdate {
        range: TimeRange,
        /// Electricity price per kWh used for cost KPIs.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        price: Option<f64>,
    },
}

impl ClientMessage {
    /// Event name on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::ChangeTimeRange { .. } => "change_time_range",
            ClientMessage::RequestUpdate { .. } => "request_update",
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages the telemetry server pushes to the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// New state for some panels.
    GraphUpdate(UpdateEvent),

    /// Informational connection status text.
    ConnectionStatus { message: String },

    /// The server reported an error.
    Error { message: String },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct MessageBody {
    message: String,
}

impl ServerMessage {
    /// Decode a JSON text frame.
    ///
    /// Returns `Ok(None)` for event names this client does not know, so that
    /// newer servers can add events without breaking older dashboards.
    pub fn parse(text: &str) -> Result<Option<Self>, PayloadError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let invalid = |reason: String| PayloadError::InvalidMessage {
            event: envelope.event.clone(),
            reason,
        };

        let message = match envelope.event.as_str() {
            "graph_update" => ServerMessage::GraphUpdate(
                UpdateEvent::from_value(envelope.data.clone()).map_err(|e| invalid(e.to_string()))?,
            ),
            "connection_status" => {
                let body: MessageBody = serde_json::from_value(envelope.data.clone())
                    .map_err(|e| invalid(e.to_string()))?;
                ServerMessage::ConnectionStatus {
                    message: body.message,
                }
            }
            "error" => {
                let body: MessageBody = serde_json::from_value(envelope.data.clone())
                    .map_err(|e| invalid(e.to_string()))?;
                ServerMessage::Error {
                    message: body.message,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    /// Event name on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::GraphUpdate(_) => "graph_update",
            ServerMessage::ConnectionStatus { .. } => "connection_status",
            ServerMessage::Error { .. } => "error",
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, PayloadError> {
        let data = match self {
            ServerMessage::GraphUpdate(update) => serde_json::to_value(update)?,
            ServerMessage::ConnectionStatus { message } | ServerMessage::Error { message } => {
                serde_json::json!({ "message": message })
            }
        };
        Ok(serde_json::json!({ "event": self.event_name(), "data": data }).to_string())
    }
}
