//! Typed views over the panels the telemetry server is known to send.
//!
//! Snapshots keep panels as raw JSON; these types are decoded on demand with
//! [`Snapshot::view`](crate::Snapshot::view) and are also used to validate
//! incoming payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Panel holding computed KPIs.
pub const KPIS: &str = "kpis";
/// Panel holding the current alarm state.
pub const ALARM: &str = "alarm";
/// Panel holding the latest value of every metric.
pub const CURRENT: &str = "current";
/// Panel holding per-metric extremes over the active range.
pub const MIN_MAX: &str = "min_max";
/// Panel holding the recent event log.
pub const EVENTS: &str = "events";
/// Member that marks an object panel as a time series.
pub const TIMESTAMPS: &str = "timestamps";

/// A time-series panel: shared timestamps plus one value array per metric.
///
/// Values are `None` where the server had no sample.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeriesPanel {
    /// Sample times in milliseconds since the Unix epoch.
    pub timestamps: Vec<i64>,

    /// Metric name to samples.
    #[serde(flatten)]
    pub series: BTreeMap<String, Vec<Option<f64>>>,
}

impl SeriesPanel {
    /// Samples for one metric.
    pub fn get(&self, metric: &str) -> Option<&[Option<f64>]> {
        self.series.get(metric).map(Vec::as_slice)
    }

    /// Most recent non-null sample of a metric.
    pub fn latest(&self, metric: &str) -> Option<f64> {
        self.series.get(metric)?.iter().rev().find_map(|v| *v)
    }
}

/// Computed KPIs. Each group is optional; the server omits what it could not compute.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Kpis {
    /// Average estimated coefficient of performance over the range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cop: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<EnergyCosts>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeStats>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_water: Option<HotWaterStats>,
}

/// Energy consumption and cost over the range.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnergyCosts {
    pub total_kwh: f64,
    pub total_cost: f64,
    /// Watts.
    pub avg_power: f64,
    /// Watts.
    pub peak_power: f64,
}

/// Compressor and auxiliary heater runtime over the range.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuntimeStats {
    pub compressor_runtime_hours: f64,
    pub compressor_runtime_percent: f64,
    pub aux_heater_runtime_hours: f64,
    pub aux_heater_runtime_percent: f64,
    pub total_hours: f64,
}

/// Hot water heating cycle statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HotWaterStats {
    pub total_cycles: u32,
    pub avg_cycle_duration_minutes: f64,
    pub avg_energy_per_cycle_kwh: f64,
    pub cycles_per_day: f64,
}

/// Current alarm state as reported by the heat pump.
///
/// Every member is optional on the wire so updates may replace one at a time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmStatus {
    pub is_alarm: bool,
    pub alarm_code: i64,
    pub alarm_description: String,
    /// When the alarm was raised, if known.
    pub alarm_time: Option<String>,
    pub alarm_status_raw: f64,
}

/// Severity of an event log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Info,
    Warning,
    Danger,
    Success,
}

/// One state change from the event log (compressor on, alarm raised, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    pub time: String,
    pub event: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Latest reading of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestValue {
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub time: Option<String>,
}

/// Extremes of one metric over the active range.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MinMax {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}
