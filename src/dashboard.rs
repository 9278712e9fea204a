//! Dashboard runtime.
//!
//! [`Dashboard::run`] is the single task that mutates rendered state. It
//! reacts to live channel events, snapshot pull completions and user control
//! requests, feeds each one through the [`Synchronizer`] and carries out the
//! resulting commands. Snapshot pulls run as their own tasks in a
//! [`JoinSet`], so a slow server never blocks other reactions. A pull that
//! panics still completes, as a transport error.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use heatwatch_types::{ServerMessage, Snapshot, TimeRange};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::channel::{ChannelCommand, ChannelEvent, ChannelHandle, ConnectionState};
use crate::sink::PresentationSink;
use crate::source::SnapshotLoader;
use crate::sync::{Command, LoadTag, SyncEvent, Synchronizer};
use crate::SyncError;

const CONTROL_QUEUE_SIZE: usize = 16;

type LoadOutcome = (LoadTag, Result<Snapshot, SyncError>);

/// User requests forwarded to the runtime.
#[derive(Debug, Clone, PartialEq)]
enum Control {
    ChangeRange(TimeRange),
    Refresh,
    Reconnect,
    Shutdown,
}

/// Handle for steering a running [`Dashboard`].
///
/// Each method returns `false` once the dashboard has stopped.
#[derive(Debug, Clone)]
pub struct DashboardHandle {
    tx: mpsc::Sender<Control>,
}

impl DashboardHandle {
    /// Switch to another time range.
    pub async fn change_range(&self, range: TimeRange) -> bool {
        self.tx.send(Control::ChangeRange(range)).await.is_ok()
    }

    /// Ask for fresh data for the current range.
    pub async fn refresh(&self) -> bool {
        self.tx.send(Control::Refresh).await.is_ok()
    }

    /// Retry the live channel after it gave up.
    pub async fn reconnect(&self) -> bool {
        self.tx.send(Control::Reconnect).await.is_ok()
    }

    /// Stop the dashboard. `run` returns once in-flight pulls have settled.
    pub async fn shutdown(&self) -> bool {
        self.tx.send(Control::Shutdown).await.is_ok()
    }
}

/// Owns the sync state, the sink and both data sources.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use heatwatch::{
///     Dashboard, HttpSnapshotLoader, LogSink, ReconnectPolicy, Synchronizer, TimeRange,
///     WebSocketChannel,
/// };
///
/// # tokio_test::block_on(async {
/// let loader = HttpSnapshotLoader::builder().build().unwrap();
/// let channel = WebSocketChannel::spawn(
///     "ws://localhost:5000/ws",
///     ReconnectPolicy::default(),
///     Duration::from_secs(10),
/// );
/// let (dashboard, handle) = Dashboard::new(
///     Synchronizer::new(TimeRange::default()),
///     LogSink::new(),
///     Arc::new(loader),
///     channel,
/// );
///
/// let task = tokio::spawn(dashboard.run());
/// handle.change_range("7d".parse().unwrap()).await;
/// handle.shutdown().await;
/// let sink = task.await.unwrap();
/// # });
/// ```
pub struct Dashboard<S> {
    sync: Synchronizer,
    sink: S,
    loader: Arc<dyn SnapshotLoader>,
    channel: ChannelHandle,
    channel_open: bool,
    control: mpsc::Receiver<Control>,
    loads: JoinSet<LoadOutcome>,
}

impl<S: PresentationSink> Dashboard<S> {
    pub fn new(
        sync: Synchronizer,
        sink: S,
        loader: Arc<dyn SnapshotLoader>,
        channel: ChannelHandle,
    ) -> (Self, DashboardHandle) {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_SIZE);
        let dashboard = Self {
            sync,
            sink,
            loader,
            channel,
            channel_open: true,
            control: control_rx,
            loads: JoinSet::new(),
        };
        (dashboard, DashboardHandle { tx: control_tx })
    }

    /// Run until shut down, then return the sink.
    ///
    /// Shutdown also happens when every [`DashboardHandle`] is dropped.
    pub async fn run(mut self) -> S {
        info!(source = self.loader.description(), range = %self.sync.active_range(), "Dashboard running");
        self.dispatch(SyncEvent::Started);

        loop {
            tokio::select! {
                biased;

                event = self.channel.events.recv(), if self.channel_open => match event {
                    Some(event) => self.on_channel_event(event),
                    None => {
                        warn!("Live channel task ended");
                        self.channel_open = false;
                        self.dispatch(SyncEvent::ConnectionChanged(ConnectionState::Disconnected));
                    }
                },

                Some(joined) = self.loads.join_next(), if !self.loads.is_empty() => {
                    self.on_load_joined(joined);
                }

                control = self.control.recv() => match control {
                    Some(Control::ChangeRange(range)) => self.dispatch(SyncEvent::RangeChanged(range)),
                    Some(Control::Refresh) => self.dispatch(SyncEvent::RefreshRequested),
                    Some(Control::Reconnect) => self.dispatch(SyncEvent::ReconnectRequested),
                    Some(Control::Shutdown) | None => break,
                },
            }
        }

        info!(in_flight = self.loads.len(), "Dashboard shutting down");
        self.send_to_channel(ChannelCommand::Shutdown);

        while let Some(joined) = self.loads.join_next().await {
            self.on_load_joined(joined);
        }

        self.sink
    }

    fn on_load_joined(&mut self, joined: Result<LoadOutcome, JoinError>) {
        match joined {
            Ok((tag, result)) => self.dispatch(SyncEvent::SnapshotLoaded { tag, result }),
            Err(e) => warn!("Snapshot pull task did not complete: {}", e),
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        let event = match event {
            ChannelEvent::State(state) => SyncEvent::ConnectionChanged(state),
            ChannelEvent::Received(ServerMessage::GraphUpdate(update)) => {
                SyncEvent::UpdateReceived(update)
            }
            ChannelEvent::Received(ServerMessage::ConnectionStatus { message }) => {
                SyncEvent::StatusMessage(message)
            }
            ChannelEvent::Received(ServerMessage::Error { message }) => {
                SyncEvent::ErrorOccurred(SyncError::Channel(message))
            }
            ChannelEvent::Malformed(reason) => SyncEvent::ErrorOccurred(SyncError::Protocol(reason)),
        };
        self.dispatch(event);
    }

    fn dispatch(&mut self, event: SyncEvent) {
        let commands = self.sync.handle(event, &mut self.sink);
        for command in commands {
            self.execute(command);
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::LoadSnapshot(tag) => {
                let loader = Arc::clone(&self.loader);
                self.loads.spawn(async move {
                    let outcome = AssertUnwindSafe(loader.load(&tag.range))
                        .catch_unwind()
                        .await;
                    let result = outcome.unwrap_or_else(|_| {
                        warn!(range = %tag.range, "Snapshot loader panicked");
                        Err(SyncError::Transport("snapshot load panicked".to_string()))
                    });
                    (tag, result)
                });
            }
            Command::Send(msg) => {
                let unsent = self.send_to_channel(ChannelCommand::Send(msg));
                if let Some(ChannelCommand::Send(msg)) = unsent {
                    self.dispatch(SyncEvent::SendFailed(msg));
                }
            }
            Command::Reconnect => {
                self.send_to_channel(ChannelCommand::Reconnect);
            }
        }
    }

    /// Hand a command to the channel task, returning it if it was not taken.
    fn send_to_channel(&mut self, command: ChannelCommand) -> Option<ChannelCommand> {
        match self.channel.commands.try_send(command) {
            Ok(()) => None,
            Err(TrySendError::Full(command)) => {
                warn!(?command, "Live channel busy, dropping command");
                Some(command)
            }
            Err(TrySendError::Closed(command)) => {
                debug!(?command, "Live channel gone, dropping command");
                Some(command)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use heatwatch_types::{ClientMessage, UpdateEvent};
    use serde_json::json;

    use crate::channel::ChannelPeer;
    use crate::sink::ViewModel;

    #[derive(Debug)]
    struct MockLoader {
        responses: HashMap<TimeRange, (Duration, Result<Snapshot, SyncError>)>,
        calls: mpsc::UnboundedSender<TimeRange>,
    }

    #[async_trait]
    impl SnapshotLoader for MockLoader {
        async fn load(&self, range: &TimeRange) -> Result<Snapshot, SyncError> {
            let _ = self.calls.send(range.clone());
            match self.responses.get(range) {
                Some((delay, result)) => {
                    tokio::time::sleep(*delay).await;
                    result.clone()
                }
                None => Err(SyncError::Transport(format!("no data for {}", range))),
            }
        }

        fn description(&self) -> &str {
            "mock"
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum SinkCall {
        Snapshot(Snapshot),
        Update(UpdateEvent),
        Connection(bool),
        Error(SyncError),
    }

    /// Forwards every call so tests can wait for them in order.
    struct RecordingSink {
        view: ViewModel,
        calls: mpsc::UnboundedSender<SinkCall>,
    }

    impl PresentationSink for RecordingSink {
        fn apply_snapshot(&mut self, snapshot: Snapshot) {
            let _ = self.calls.send(SinkCall::Snapshot(snapshot.clone()));
            self.view.apply_snapshot(snapshot);
        }

        fn apply_update(&mut self, update: UpdateEvent) {
            let _ = self.calls.send(SinkCall::Update(update.clone()));
            self.view.apply_update(update);
        }

        fn set_connection_state(&mut self, connected: bool) {
            let _ = self.calls.send(SinkCall::Connection(connected));
            self.view.set_connection_state(connected);
        }

        fn report_error(&mut self, error: SyncError) {
            let _ = self.calls.send(SinkCall::Error(error.clone()));
            self.view.report_error(error);
        }
    }

    struct Harness {
        handle: DashboardHandle,
        peer: ChannelPeer,
        loads: mpsc::UnboundedReceiver<TimeRange>,
        sink_calls: mpsc::UnboundedReceiver<SinkCall>,
        task: tokio::task::JoinHandle<RecordingSink>,
    }

    impl Harness {
        fn start(responses: Vec<(&str, Duration, Result<Snapshot, SyncError>)>) -> Self {
            let (calls_tx, loads) = mpsc::unbounded_channel();
            let loader = MockLoader {
                responses: responses
                    .into_iter()
                    .map(|(r, d, res)| (TimeRange::new(r).unwrap(), (d, res)))
                    .collect(),
                calls: calls_tx,
            };
            let (sink_tx, sink_calls) = mpsc::unbounded_channel();
            let sink = RecordingSink {
                view: ViewModel::new(),
                calls: sink_tx,
            };
            let (channel, peer) = ChannelHandle::pair(16);
            let (dashboard, handle) = Dashboard::new(
                Synchronizer::new(TimeRange::default()),
                sink,
                Arc::new(loader),
                channel,
            );
            Self {
                handle,
                peer,
                loads,
                sink_calls,
                task: tokio::spawn(dashboard.run()),
            }
        }

        async fn next_call(&mut self) -> SinkCall {
            tokio::time::timeout(Duration::from_secs(5), self.sink_calls.recv())
                .await
                .expect("timed out waiting for sink call")
                .expect("dashboard stopped")
        }

        async fn next_load(&mut self) -> TimeRange {
            tokio::time::timeout(Duration::from_secs(5), self.loads.recv())
                .await
                .expect("timed out waiting for load")
                .expect("loader dropped")
        }

        async fn push(&self, event: ChannelEvent) {
            self.peer.events.send(event).await.unwrap();
        }

        async fn stop(self) -> ViewModel {
            self.handle.shutdown().await;
            self.task.await.unwrap().view
        }
    }

    fn snapshot(value: serde_json::Value) -> Snapshot {
        Snapshot::from_value(value).unwrap()
    }

    fn temperatures() -> Snapshot {
        snapshot(json!({
            "temperature": { "timestamps": [0, 60000], "outdoor_temp": [-2.0, -1.5] }
        }))
    }

    #[tokio::test]
    async fn test_startup_connect_and_update() {
        let mut h = Harness::start(vec![("24h", Duration::ZERO, Ok(temperatures()))]);

        assert_eq!(h.next_load().await, TimeRange::default());
        assert_eq!(h.next_call().await, SinkCall::Snapshot(temperatures()));

        h.push(ChannelEvent::State(ConnectionState::Connected)).await;
        assert_eq!(h.next_call().await, SinkCall::Connection(true));
        assert_eq!(h.next_load().await, TimeRange::default());
        assert_eq!(h.next_call().await, SinkCall::Snapshot(temperatures()));

        let update = UpdateEvent::from_value(json!({ "temperature": { "outdoor_temp": [-1.0] } })).unwrap();
        h.push(ChannelEvent::Received(ServerMessage::GraphUpdate(update.clone())))
            .await;
        assert_eq!(h.next_call().await, SinkCall::Update(update));

        let view = h.stop().await;
        let rendered = view.snapshot().unwrap();
        assert_eq!(rendered.field("temperature", "outdoor_temp"), Some(&json!([-1.0])));
        assert_eq!(rendered.field("temperature", "timestamps"), Some(&json!([0, 60000])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stale_load_is_discarded() {
        let mut h = Harness::start(vec![
            ("24h", Duration::from_millis(100), Ok(snapshot(json!({ "kpis": { "cop": 24.0 } })))),
            ("7d", Duration::from_millis(10), Ok(snapshot(json!({ "kpis": { "cop": 7.0 } })))),
        ]);

        h.handle.change_range(TimeRange::new("7d").unwrap()).await;
        assert_eq!(h.next_load().await.as_str(), "24h");
        assert_eq!(h.next_load().await.as_str(), "7d");

        // Shutdown drains both pulls; only the 7d one may land.
        let view = h.stop().await;
        assert_eq!(view.snapshots_applied(), 1);
        assert_eq!(view.snapshot().unwrap().field("kpis", "cop"), Some(&json!(7.0)));
    }

    #[tokio::test]
    async fn test_load_failure_reports_once_and_keeps_state() {
        let mut h = Harness::start(vec![("24h", Duration::ZERO, Ok(temperatures()))]);
        h.next_call().await;

        // No data for 7d: the pull fails with a transport error.
        h.handle.change_range(TimeRange::new("7d").unwrap()).await;
        assert!(matches!(h.next_call().await, SinkCall::Error(SyncError::Transport(_))));

        let view = h.stop().await;
        assert_eq!(view.snapshot(), Some(&temperatures()));
        assert_eq!(view.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_connected_range_change_uses_channel() {
        let mut h = Harness::start(vec![("24h", Duration::ZERO, Ok(temperatures()))]);
        h.next_call().await;
        h.push(ChannelEvent::State(ConnectionState::Connected)).await;
        h.next_call().await;
        h.next_call().await;

        h.handle.change_range(TimeRange::new("7d").unwrap()).await;
        let sent = tokio::time::timeout(Duration::from_secs(5), h.peer.commands.recv())
            .await
            .unwrap();
        assert_eq!(
            sent,
            Some(ChannelCommand::Send(ClientMessage::ChangeTimeRange {
                range: TimeRange::new("7d").unwrap()
            }))
        );

        let reply = json!({ "temperature": { "timestamps": [0], "outdoor_temp": [5.0] } });
        h.push(ChannelEvent::Received(ServerMessage::GraphUpdate(
            UpdateEvent::from_value(reply.clone()).unwrap(),
        )))
        .await;
        assert_eq!(h.next_call().await, SinkCall::Snapshot(snapshot(reply)));
    }

    #[tokio::test]
    async fn test_server_errors_become_notices() {
        let mut h = Harness::start(vec![("24h", Duration::ZERO, Ok(temperatures()))]);
        h.next_call().await;

        h.push(ChannelEvent::Received(ServerMessage::ConnectionStatus {
            message: "Connected".into(),
        }))
        .await;
        h.push(ChannelEvent::Received(ServerMessage::Error {
            message: "InfluxDB unreachable".into(),
        }))
        .await;
        h.push(ChannelEvent::Malformed("invalid JSON".into())).await;

        assert_eq!(
            h.next_call().await,
            SinkCall::Error(SyncError::Channel("InfluxDB unreachable".into()))
        );
        assert_eq!(
            h.next_call().await,
            SinkCall::Error(SyncError::Protocol("invalid JSON".into()))
        );

        let view = h.stop().await;
        assert_eq!(view.snapshot(), Some(&temperatures()));
    }

    #[tokio::test]
    async fn test_shutdown_stops_channel() {
        let mut h = Harness::start(vec![("24h", Duration::ZERO, Ok(temperatures()))]);
        h.next_call().await;

        h.handle.shutdown().await;
        let command = tokio::time::timeout(Duration::from_secs(5), h.peer.commands.recv())
            .await
            .unwrap();
        assert_eq!(command, Some(ChannelCommand::Shutdown));
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_task_ending_counts_as_drop() {
        let mut h = Harness::start(vec![("24h", Duration::ZERO, Ok(temperatures()))]);
        h.next_call().await;
        h.push(ChannelEvent::State(ConnectionState::Connected)).await;
        assert_eq!(h.next_call().await, SinkCall::Connection(true));
        h.next_call().await;

        let Harness {
            handle,
            peer,
            mut sink_calls,
            task,
            ..
        } = h;
        drop(peer);

        let call = tokio::time::timeout(Duration::from_secs(5), sink_calls.recv())
            .await
            .unwrap();
        assert_eq!(call, Some(SinkCall::Connection(false)));

        // Still running without a channel; refresh falls back to a pull.
        assert!(handle.refresh().await);
        handle.shutdown().await;
        let view = task.await.unwrap().view;
        assert!(!view.is_connected());
    }

    #[tokio::test]
    async fn test_superseded_range_reply_never_renders() {
        let mut h = Harness::start(vec![("24h", Duration::ZERO, Ok(temperatures()))]);
        h.next_call().await;
        h.push(ChannelEvent::State(ConnectionState::Connected)).await;
        h.next_call().await;
        h.next_call().await;

        h.handle.change_range(TimeRange::new("7d").unwrap()).await;
        h.handle.change_range(TimeRange::new("24h").unwrap()).await;
        for expected in ["7d", "24h"] {
            let sent = tokio::time::timeout(Duration::from_secs(5), h.peer.commands.recv())
                .await
                .unwrap();
            assert_eq!(
                sent,
                Some(ChannelCommand::Send(ClientMessage::ChangeTimeRange {
                    range: TimeRange::new(expected).unwrap()
                }))
            );
        }

        let week = json!({ "range_only_7d": { "cop": 7.0 } });
        let day = json!({ "kpis": { "cop": 24.0 } });
        for reply in [week, day.clone()] {
            h.push(ChannelEvent::Received(ServerMessage::GraphUpdate(
                UpdateEvent::from_value(reply).unwrap(),
            )))
            .await;
        }
        assert_eq!(h.next_call().await, SinkCall::Snapshot(snapshot(day)));

        let view = h.stop().await;
        let rendered = view.snapshot().unwrap();
        assert!(rendered.panel("range_only_7d").is_none());
        assert_eq!(rendered.field("kpis", "cop"), Some(&json!(24.0)));
        assert_eq!(view.updates_applied(), 0);
    }

    #[tokio::test]
    async fn test_unsent_range_change_pulls_instead() {
        let week = snapshot(json!({ "kpis": { "cop": 7.0 } }));
        let h = Harness::start(vec![
            ("24h", Duration::ZERO, Ok(temperatures())),
            ("7d", Duration::ZERO, Ok(week.clone())),
        ]);
        let Harness {
            handle,
            peer,
            mut loads,
            mut sink_calls,
            task,
        } = h;
        let ChannelPeer { events, commands } = peer;
        drop(commands);

        events
            .send(ChannelEvent::State(ConnectionState::Connected))
            .await
            .unwrap();
        handle.change_range(TimeRange::new("7d").unwrap()).await;

        let pulled_week = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(range) = loads.recv().await {
                if range.as_str() == "7d" {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(pulled_week);

        let applied_week = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(call) = sink_calls.recv().await {
                if call == SinkCall::Snapshot(week.clone()) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(applied_week);

        // Pushes after the pull merge as updates.
        let update = UpdateEvent::from_value(json!({ "kpis": { "cop": 7.5 } })).unwrap();
        events
            .send(ChannelEvent::Received(ServerMessage::GraphUpdate(update.clone())))
            .await
            .unwrap();
        let call = tokio::time::timeout(Duration::from_secs(5), sink_calls.recv())
            .await
            .unwrap();
        assert_eq!(call, Some(SinkCall::Update(update)));

        handle.shutdown().await;
        let view = task.await.unwrap().view;
        assert_eq!(view.snapshot().unwrap().field("kpis", "cop"), Some(&json!(7.5)));
    }

    #[derive(Debug)]
    struct PanickingLoader;

    #[async_trait]
    impl SnapshotLoader for PanickingLoader {
        async fn load(&self, _range: &TimeRange) -> Result<Snapshot, SyncError> {
            panic!("loader bug");
        }

        fn description(&self) -> &str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_panicking_load_still_shuts_down() {
        let (sink_tx, mut sink_calls) = mpsc::unbounded_channel();
        let sink = RecordingSink {
            view: ViewModel::new(),
            calls: sink_tx,
        };
        let (channel, _peer) = ChannelHandle::pair(16);
        let (dashboard, handle) = Dashboard::new(
            Synchronizer::new(TimeRange::default()),
            sink,
            Arc::new(PanickingLoader),
            channel,
        );
        let task = tokio::spawn(dashboard.run());

        let call = tokio::time::timeout(Duration::from_secs(5), sink_calls.recv())
            .await
            .unwrap();
        assert!(matches!(call, Some(SinkCall::Error(SyncError::Transport(_)))));

        // A second pull is still in flight when shutdown arrives.
        handle.refresh().await;
        handle.shutdown().await;
        let view = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("dashboard hung on shutdown")
            .unwrap()
            .view;
        assert!(view.snapshot().is_none());
        assert!(!view.notices().is_empty());
        assert!(view
            .notices()
            .iter()
            .all(|notice| matches!(notice, SyncError::Transport(_))));
    }
}
