//! Presentation sinks.
//!
//! All effects of the sync logic go through a [`PresentationSink`], so the
//! protocol can be driven headlessly. [`ViewModel`] is the in-memory rendered
//! state; [`LogSink`] wraps it and reports every change through `tracing`.

use heatwatch_types::{AlarmStatus, Kpis, Snapshot, UpdateEvent, ALARM, KPIS};
use tracing::{debug, error, info, warn};

use crate::SyncError;

/// Consumer of normalized snapshots and updates.
pub trait PresentationSink: Send {
    /// Replace the rendered state with a snapshot.
    fn apply_snapshot(&mut self, snapshot: Snapshot);

    /// Merge an update into the rendered state.
    fn apply_update(&mut self, update: UpdateEvent);

    /// Show whether the live channel is connected.
    fn set_connection_state(&mut self, connected: bool);

    /// Show a non-fatal notice. Must not clear rendered data.
    fn report_error(&mut self, error: SyncError);
}

/// Headless rendered state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewModel {
    snapshot: Option<Snapshot>,
    connected: bool,
    notices: Vec<SyncError>,
    snapshots_applied: usize,
    updates_applied: usize,
}

impl ViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rendered state, if anything has been applied yet.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Notices reported so far, oldest first.
    pub fn notices(&self) -> &[SyncError] {
        &self.notices
    }

    pub fn snapshots_applied(&self) -> usize {
        self.snapshots_applied
    }

    pub fn updates_applied(&self) -> usize {
        self.updates_applied
    }

    /// Current alarm state, if the rendered state has a readable alarm panel.
    pub fn alarm(&self) -> Option<AlarmStatus> {
        self.snapshot.as_ref()?.view(ALARM).ok().flatten()
    }
}

impl PresentationSink for ViewModel {
    fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.snapshot = Some(snapshot);
        self.snapshots_applied += 1;
    }

    fn apply_update(&mut self, update: UpdateEvent) {
        self.snapshot.get_or_insert_with(Snapshot::new).apply(&update);
        self.updates_applied += 1;
    }

    fn set_connection_state(&mut self, connected: bool) {
        self.connected = connected;
    }

    fn report_error(&mut self, error: SyncError) {
        self.notices.push(error);
    }
}

/// A [`ViewModel`] that logs what it renders.
#[derive(Debug, Default)]
pub struct LogSink {
    view: ViewModel,
    alarm_active: bool,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &ViewModel {
        &self.view
    }

    pub fn into_view(self) -> ViewModel {
        self.view
    }

    fn check_alarm(&mut self) {
        let alarm = self.view.alarm();
        let active = alarm.as_ref().is_some_and(|a| a.is_alarm);
        match (self.alarm_active, active, alarm) {
            (false, true, Some(alarm)) => warn!(
                code = alarm.alarm_code,
                time = alarm.alarm_time.as_deref().unwrap_or("unknown"),
                "Heat pump alarm: {}",
                alarm.alarm_description
            ),
            (true, false, _) => info!("Heat pump alarm cleared"),
            _ => {}
        }
        self.alarm_active = active;
    }
}

impl PresentationSink for LogSink {
    fn apply_snapshot(&mut self, snapshot: Snapshot) {
        let panels: Vec<&str> = snapshot.panel_names().collect();
        info!(panels = panels.len(), "Snapshot applied: {}", panels.join(", "));
        match snapshot.view::<Kpis>(KPIS) {
            Ok(Some(kpis)) => {
                if let Some(cop) = kpis.cop {
                    info!(cop, "Average COP");
                }
                if let Some(energy) = kpis.energy {
                    info!(
                        total_kwh = energy.total_kwh,
                        total_cost = energy.total_cost,
                        "Energy use"
                    );
                }
            }
            Ok(None) => {}
            Err(e) => debug!("KPIs unreadable: {}", e),
        }
        self.view.apply_snapshot(snapshot);
        self.check_alarm();
    }

    fn apply_update(&mut self, update: UpdateEvent) {
        let panels: Vec<&str> = update.panel_names().collect();
        debug!(fields = update.field_count(), "Update applied: {}", panels.join(", "));
        self.view.apply_update(update);
        self.check_alarm();
    }

    fn set_connection_state(&mut self, connected: bool) {
        if connected {
            info!("Live updates connected");
        } else {
            warn!("Live updates disconnected, showing last known state");
        }
        self.view.set_connection_state(connected);
    }

    fn report_error(&mut self, error: SyncError) {
        error!(kind = error.kind(), "{}", error);
        self.view.report_error(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: serde_json::Value) -> Snapshot {
        Snapshot::from_value(value).unwrap()
    }

    #[test]
    fn test_view_model_snapshot_replaces() {
        let mut view = ViewModel::new();
        view.apply_snapshot(snapshot(json!({ "a": { "x": 1 } })));
        view.apply_snapshot(snapshot(json!({ "b": { "y": 2 } })));

        let rendered = view.snapshot().unwrap();
        assert!(rendered.panel("a").is_none());
        assert_eq!(rendered.field("b", "y"), Some(&json!(2)));
        assert_eq!(view.snapshots_applied(), 2);
    }

    #[test]
    fn test_view_model_update_merges() {
        let mut view = ViewModel::new();
        view.apply_snapshot(snapshot(json!({
            "temperature": { "timestamps": [0, 60000], "outdoor_temp": [-2.0, -1.5] }
        })));
        view.apply_update(UpdateEvent::from_value(json!({ "temperature": { "outdoor_temp": [-1.0] } })).unwrap());

        let rendered = view.snapshot().unwrap();
        assert_eq!(rendered.field("temperature", "outdoor_temp"), Some(&json!([-1.0])));
        assert_eq!(rendered.field("temperature", "timestamps"), Some(&json!([0, 60000])));
        assert_eq!(view.updates_applied(), 1);
    }

    #[test]
    fn test_update_before_snapshot_starts_from_empty() {
        let mut view = ViewModel::new();
        view.apply_update(UpdateEvent::from_value(json!({ "kpis": { "cop": 3.0 } })).unwrap());
        assert_eq!(view.snapshot().unwrap().field("kpis", "cop"), Some(&json!(3.0)));
    }

    #[test]
    fn test_report_error_keeps_data() {
        let mut view = ViewModel::new();
        view.apply_snapshot(snapshot(json!({ "kpis": { "cop": 3.0 } })));
        let before = view.snapshot().cloned();

        view.report_error(SyncError::Transport("server returned status 500".into()));

        assert_eq!(view.snapshot().cloned(), before);
        assert_eq!(view.notices().len(), 1);
    }

    #[test]
    fn test_alarm_view() {
        let mut view = ViewModel::new();
        assert!(view.alarm().is_none());

        view.apply_snapshot(snapshot(json!({
            "alarm": { "is_alarm": true, "alarm_code": 12, "alarm_description": "Low flow" }
        })));
        assert_eq!(view.alarm().unwrap().alarm_code, 12);
    }

    #[test]
    fn test_log_sink_tracks_alarm_transitions() {
        let mut sink = LogSink::new();
        sink.apply_snapshot(snapshot(json!({ "alarm": { "is_alarm": true, "alarm_code": 3 } })));
        assert!(sink.alarm_active);

        sink.apply_update(UpdateEvent::from_value(json!({ "alarm": { "is_alarm": false } })).unwrap());
        assert!(!sink.alarm_active);

        sink.set_connection_state(true);
        sink.report_error(SyncError::Channel("db down".into()));

        let view = sink.into_view();
        assert!(view.is_connected());
        assert_eq!(view.notices(), &[SyncError::Channel("db down".into())]);
        assert_eq!(view.snapshots_applied(), 1);
        assert_eq!(view.updates_applied(), 1);
    }
}
