//! WebSocket transport for the live update channel.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use heatwatch_types::ServerMessage;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{
    ChannelCommand, ChannelEvent, ChannelHandle, ConnectionState, ReconnectPolicy,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Size of the event and command queues between the task and its handle.
const QUEUE_SIZE: usize = 64;

/// What the task does after a connection or a wait ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    /// Carry on with the reconnect loop.
    Retry,
    /// An explicit reconnect request; the failure count starts over.
    Reset,
    /// Stop the task.
    Stop,
}

/// A live update channel over a WebSocket.
///
/// Text frames carry one JSON message each. The task connects with a bounded
/// handshake, retries at a fixed interval, and gives up after the policy's
/// attempt limit until asked to reconnect.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use heatwatch::{ChannelEvent, ReconnectPolicy, WebSocketChannel};
///
/// # tokio_test::block_on(async {
/// let mut channel = WebSocketChannel::spawn(
///     "ws://localhost:5000/ws",
///     ReconnectPolicy::default(),
///     Duration::from_secs(10),
/// );
/// while let Some(event) = channel.events.recv().await {
///     println!("{:?}", event);
/// }
/// # });
/// ```
#[derive(Debug)]
pub struct WebSocketChannel {
    url: String,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    events: mpsc::Sender<ChannelEvent>,
    commands: mpsc::Receiver<ChannelCommand>,
}

impl WebSocketChannel {
    /// Spawn the channel task on the current tokio runtime.
    ///
    /// The task stops on [`ChannelCommand::Shutdown`] or when the handle is
    /// dropped.
    pub fn spawn(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        connect_timeout: Duration,
    ) -> ChannelHandle {
        let (handle, peer) = ChannelHandle::pair(QUEUE_SIZE);
        let channel = Self {
            url: url.into(),
            policy,
            connect_timeout,
            events: peer.events,
            commands: peer.commands,
        };
        tokio::spawn(channel.run());
        handle
    }

    async fn run(mut self) {
        let mut failures: u32 = 0;

        loop {
            let attempt = failures + 1;
            if !self.emit_state(ConnectionState::Connecting { attempt }).await {
                return;
            }

            let next = match self.connect().await {
                Ok(Some(socket)) => {
                    info!(url = %self.url, "Live channel connected");
                    failures = 0;
                    if !self.emit_state(ConnectionState::Connected).await {
                        return;
                    }
                    let next = self.serve(socket).await;
                    if next == Next::Stop {
                        return;
                    }
                    if !self.emit_state(ConnectionState::Disconnected).await {
                        return;
                    }
                    next
                }
                Ok(None) => return,
                Err(reason) => {
                    failures += 1;
                    warn!(url = %self.url, attempt, "Live channel connect failed: {}", reason);
                    if !self.emit_state(ConnectionState::Disconnected).await {
                        return;
                    }
                    Next::Retry
                }
            };

            if next == Next::Reset {
                failures = 0;
                continue;
            }

            let next = match self.policy.next_delay(failures) {
                Some(delay) => self.pause(delay).await,
                None => {
                    warn!(url = %self.url, attempts = failures, "Live channel giving up");
                    if !self.emit_state(ConnectionState::GaveUp { attempts: failures }).await {
                        return;
                    }
                    self.wait_for_reconnect().await
                }
            };

            match next {
                Next::Stop => return,
                Next::Reset => failures = 0,
                Next::Retry => {}
            }
        }
    }

    /// One connect attempt, bounded by the connect timeout.
    ///
    /// Returns `Ok(None)` if asked to stop while connecting.
    async fn connect(&mut self) -> Result<Option<Socket>, String> {
        let handshake = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()));
        tokio::pin!(handshake);

        loop {
            tokio::select! {
                result = &mut handshake => {
                    return match result {
                        Ok(Ok((socket, _response))) => Ok(Some(socket)),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err(format!("timed out after {:?}", self.connect_timeout)),
                    };
                }
                command = self.commands.recv() => match command {
                    Some(ChannelCommand::Send(msg)) => {
                        debug!(event = msg.event_name(), "Not connected, dropping outgoing message");
                    }
                    Some(ChannelCommand::Reconnect) => {}
                    Some(ChannelCommand::Shutdown) | None => return Ok(None),
                },
            }
        }
    }

    /// Pump frames and commands until the connection ends.
    async fn serve(&mut self, socket: Socket) -> Next {
        let (mut write, mut read) = socket.split();

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let event = match ServerMessage::parse(&text) {
                            Ok(Some(msg)) => ChannelEvent::Received(msg),
                            Ok(None) => {
                                debug!("Ignoring unknown live channel event");
                                continue;
                            }
                            Err(e) => ChannelEvent::Malformed(e.to_string()),
                        };
                        if self.events.send(event).await.is_err() {
                            let _ = write.close().await;
                            return Next::Stop;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "Live channel closed by server");
                        return Next::Retry;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Live channel read error: {}", e);
                        return Next::Retry;
                    }
                    None => return Next::Retry,
                },
                command = self.commands.recv() => match command {
                    Some(ChannelCommand::Send(msg)) => {
                        let text = match msg.to_json() {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Failed to encode {}: {}", msg.event_name(), e);
                                continue;
                            }
                        };
                        debug!(event = msg.event_name(), "Sending");
                        if let Err(e) = write.send(Message::text(text)).await {
                            warn!("Live channel write error: {}", e);
                            return Next::Retry;
                        }
                    }
                    Some(ChannelCommand::Reconnect) => {
                        let _ = write.close().await;
                        return Next::Reset;
                    }
                    Some(ChannelCommand::Shutdown) | None => {
                        let _ = write.close().await;
                        return Next::Stop;
                    }
                },
            }
        }
    }

    /// Sleep for the retry delay, still answering commands.
    async fn pause(&mut self, delay: Duration) -> Next {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Next::Retry,
                command = self.commands.recv() => match command {
                    Some(ChannelCommand::Send(msg)) => {
                        debug!(event = msg.event_name(), "Not connected, dropping outgoing message");
                    }
                    Some(ChannelCommand::Reconnect) => return Next::Reset,
                    Some(ChannelCommand::Shutdown) | None => return Next::Stop,
                },
            }
        }
    }

    async fn wait_for_reconnect(&mut self) -> Next {
        loop {
            match self.commands.recv().await {
                Some(ChannelCommand::Send(msg)) => {
                    debug!(event = msg.event_name(), "Not connected, dropping outgoing message");
                }
                Some(ChannelCommand::Reconnect) => return Next::Reset,
                Some(ChannelCommand::Shutdown) | None => return Next::Stop,
            }
        }
    }

    /// Returns false once nobody is listening.
    async fn emit_state(&self, state: ConnectionState) -> bool {
        debug!(state = %state, "Live channel state");
        self.events.send(ChannelEvent::State(state)).await.is_ok()
    }
}
