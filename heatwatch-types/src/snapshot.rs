//! Snapshots and incremental updates.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::kind_of;
use crate::panels::{
    AlarmStatus, EventEntry, Kpis, LatestValue, MinMax, ALARM, CURRENT, EVENTS, KPIS, MIN_MAX,
    TIMESTAMPS,
};
use crate::PayloadError;

/// The full state needed to initialize a dashboard for one time range.
///
/// A snapshot maps panel names (`temperature`, `kpis`, `alarm`, ...) to
/// their JSON values. Panels the client has no typed view for are kept
/// as-is, so server additions pass through untouched.
///
/// # Example
///
/// ```rust
/// use heatwatch_types::{SeriesPanel, Snapshot};
/// use serde_json::json;
///
/// let snapshot = Snapshot::from_value(json!({
///     "temperature": { "timestamps": [0, 60000], "outdoor_temp": [-2.0, -1.5] }
/// }))
/// .unwrap();
///
/// let temps: SeriesPanel = snapshot.view("temperature").unwrap().unwrap();
/// assert_eq!(temps.latest("outdoor_temp"), Some(-1.5));
/// ```
///
/// Deserializing goes through [`Snapshot::from_value`], so serde input is
/// validated the same way.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    panels: Map<String, Value>,
}

/// An incremental payload with the shape of (a subset of) a [`Snapshot`].
///
/// Applied to a snapshot with [`Snapshot::apply`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct UpdateEvent {
    panels: Map<String, Value>,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a JSON value, validating it as a full snapshot.
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let panels = into_object(value)?;
        validate(&panels, true)?;
        Ok(Self { panels })
    }

    /// Parse and validate a snapshot from JSON text.
    pub fn from_json(text: &str) -> Result<Self, PayloadError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Apply an update: every field it carries replaces the current one.
    ///
    /// When both the current and the incoming panel are objects, each member
    /// of the incoming panel replaces the member of the same name. Any other
    /// panel value replaces the current panel outright. Arrays are never
    /// concatenated, so applying the same update twice is a no-op the second
    /// time.
    pub fn apply(&mut self, update: &UpdateEvent) {
        for (name, incoming) in &update.panels {
            match (self.panels.get_mut(name), incoming) {
                (Some(Value::Object(current)), Value::Object(fields)) => {
                    for (field, value) in fields {
                        current.insert(field.clone(), value.clone());
                    }
                }
                _ => {
                    self.panels.insert(name.clone(), incoming.clone());
                }
            }
        }
    }

    /// Raw value of a panel.
    pub fn panel(&self, name: &str) -> Option<&Value> {
        self.panels.get(name)
    }

    /// Raw value of one field inside an object panel.
    pub fn field(&self, panel: &str, field: &str) -> Option<&Value> {
        self.panels.get(panel)?.as_object()?.get(field)
    }

    /// Decode a panel into a typed view.
    ///
    /// Returns `Ok(None)` when the panel is absent.
    pub fn view<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, PayloadError> {
        decode_panel(&self.panels, name)
    }

    /// Names of all panels, in sorted order.
    pub fn panel_names(&self) -> impl Iterator<Item = &str> {
        self.panels.keys().map(String::as_str)
    }

    /// Check if the snapshot has no panels.
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Number of panels.
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    /// The snapshot as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.panels.clone())
    }
}

impl UpdateEvent {
    /// Build an update from a JSON value, validating it as a partial snapshot.
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let panels = into_object(value)?;
        validate(&panels, false)?;
        Ok(Self { panels })
    }

    /// Parse and validate an update from JSON text.
    pub fn from_json(text: &str) -> Result<Self, PayloadError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Treat this update as the complete state for a range.
    ///
    /// Used when the server answers a range change over the live channel;
    /// the payload must then pass full snapshot validation.
    pub fn into_snapshot(self) -> Result<Snapshot, PayloadError> {
        validate(&self.panels, true)?;
        Ok(Snapshot {
            panels: self.panels,
        })
    }

    /// Raw value of a panel.
    pub fn panel(&self, name: &str) -> Option<&Value> {
        self.panels.get(name)
    }

    /// Names of all panels carried by this update.
    pub fn panel_names(&self) -> impl Iterator<Item = &str> {
        self.panels.keys().map(String::as_str)
    }

    /// Number of fields this update replaces, counting each member of an
    /// object panel separately.
    pub fn field_count(&self) -> usize {
        self.panels
            .values()
            .map(|v| v.as_object().map_or(1, Map::len))
            .sum()
    }

    /// Check if the update carries nothing.
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}

impl From<Snapshot> for UpdateEvent {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            panels: snapshot.panels,
        }
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>, PayloadError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(PayloadError::NotAnObject(kind_of(&other))),
    }
}

fn decode_panel<T: DeserializeOwned>(
    panels: &Map<String, Value>,
    name: &str,
) -> Result<Option<T>, PayloadError> {
    match panels.get(name) {
        None => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| PayloadError::panel(name, e.to_string())),
    }
}

/// Check known panels decode into their typed views and series panels are
/// well formed. `complete` additionally requires aligned series lengths.
fn validate(panels: &Map<String, Value>, complete: bool) -> Result<(), PayloadError> {
    decode_panel::<Kpis>(panels, KPIS)?;
    decode_panel::<AlarmStatus>(panels, ALARM)?;
    decode_panel::<Vec<EventEntry>>(panels, EVENTS)?;
    decode_panel::<std::collections::BTreeMap<String, LatestValue>>(panels, CURRENT)?;
    decode_panel::<std::collections::BTreeMap<String, MinMax>>(panels, MIN_MAX)?;

    for (name, value) in panels {
        if let Value::Object(fields) = value {
            validate_series(name, fields, complete)?;
        }
    }
    Ok(())
}

fn validate_series(
    name: &str,
    fields: &Map<String, Value>,
    complete: bool,
) -> Result<(), PayloadError> {
    let expected_len = match fields.get(TIMESTAMPS) {
        None => return Ok(()),
        Some(Value::Array(ts)) => {
            if !ts.iter().all(|t| t.is_i64() || t.is_u64()) {
                return Err(PayloadError::panel(name, "timestamps must be integers"));
            }
            ts.len()
        }
        Some(other) => {
            return Err(PayloadError::panel(
                name,
                format!("timestamps must be an array, got {}", kind_of(other)),
            ));
        }
    };

    for (field, value) in fields {
        if field == TIMESTAMPS {
            continue;
        }
        let Value::Array(samples) = value else {
            continue;
        };
        if !samples.iter().all(|s| s.is_number() || s.is_null()) {
            return Err(PayloadError::panel(
                name,
                format!("series '{}' must contain only numbers or null", field),
            ));
        }
        if complete && samples.len() != expected_len {
            return Err(PayloadError::panel(
                name,
                format!(
                    "series '{}' has {} samples but there are {} timestamps",
                    field,
                    samples.len(),
                    expected_len
                ),
            ));
        }
    }
    Ok(())
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Snapshot::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for UpdateEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        UpdateEvent::from_value(value).map_err(serde::de::Error::custom)
    }
}
