// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Generic WebSocket client with supervised reconnection.
//!
//! [`WebSocketClient`] owns the connection lifecycle: it opens the transport,
//! runs the injected post-connect hook (authentication and resubscription),
//! reads frames into the bounded ingestion queue, and on any failure consults
//! the reconnection policy for the next delay or terminal shutdown. There is
//! at most one outstanding connection attempt per client instance.
//!
//! The reader starts before the post-connect hook completes so that handshake
//! acknowledgments can flow through the processing pipeline while the hook
//! waits on them.

use std::{
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::BackoffState,
    config::WebSocketConfig,
    error::{ErrorKind, WsError, WsResult, classify},
    mode::{ConnectionState, ConnectionStateMachine, StateListener},
    queue::IngestQueue,
    transport::{Frame, Transport, TransportSink, TransportStream, TungsteniteTransport},
};

/// Sentinel text frame pushed through the queue after a successful reconnect.
pub const RECONNECTED: &str = "__RECONNECTED__";

enum WriterCommand {
    Frame(Frame),
    Close,
}

type SharedWriterTx = Arc<RwLock<mpsc::UnboundedSender<WriterCommand>>>;

/// Hook invoked on every established connection, before the session is
/// considered ready. Used for authentication and resubscription; a returned
/// error recycles the connection and counts as a failed attempt.
pub type PostConnectHook = Arc<dyn Fn(WsWriter) -> BoxFuture<'static, WsResult<()>> + Send + Sync>;

/// Cloneable handle for sending frames on the current connection.
///
/// Sends fail with [`WsError::NotConnected`] unless the connection is in
/// [`ConnectionState::Connected`]. The handle stays valid across reconnects.
#[derive(Clone)]
pub struct WsWriter {
    tx: SharedWriterTx,
    machine: Arc<ConnectionStateMachine>,
}

impl std::fmt::Debug for WsWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(WsWriter))
            .field("state", &self.machine.state())
            .finish_non_exhaustive()
    }
}

impl WsWriter {
    /// Sends a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected or the writer has shut down.
    pub fn send_text(&self, text: impl Into<String>) -> WsResult<()> {
        self.send_frame(Frame::Text(text.into()))
    }

    /// Sends a raw frame.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected or the writer has shut down.
    pub fn send_frame(&self, frame: Frame) -> WsResult<()> {
        if self.machine.state() != ConnectionState::Connected {
            return Err(WsError::NotConnected);
        }
        self.tx
            .read()
            .expect("writer lock poisoned")
            .send(WriterCommand::Frame(frame))
            .map_err(|_| WsError::Send("writer channel closed".to_string()))
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }
}

/// Generic WebSocket client with supervised reconnection.
pub struct WebSocketClient {
    config: WebSocketConfig,
    transport: Arc<dyn Transport>,
    machine: Arc<ConnectionStateMachine>,
    queue: Arc<IngestQueue>,
    writer_tx: SharedWriterTx,
    hook: Option<PostConnectHook>,
    cancel: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    reconnect_count: Arc<AtomicU64>,
}

impl std::fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(WebSocketClient))
            .field("url", &self.config.url)
            .field("state", &self.machine.state())
            .field("has_hook", &self.hook.is_some())
            .finish_non_exhaustive()
    }
}

impl WebSocketClient {
    /// Creates a new client over the given transport.
    #[must_use]
    pub fn new(
        config: WebSocketConfig,
        transport: Arc<dyn Transport>,
        hook: Option<PostConnectHook>,
    ) -> Self {
        let queue = Arc::new(IngestQueue::new(config.queue_capacity));
        let (tx, _rx) = mpsc::unbounded_channel();
        Self {
            config,
            transport,
            machine: Arc::new(ConnectionStateMachine::new()),
            queue,
            writer_tx: Arc::new(RwLock::new(tx)),
            hook,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            reconnect_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates a new client over the production tungstenite transport.
    #[must_use]
    pub fn with_tungstenite(config: WebSocketConfig, hook: Option<PostConnectHook>) -> Self {
        Self::new(config, Arc::new(TungsteniteTransport), hook)
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// Returns whether the connection is live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.machine.state() == ConnectionState::Connected
    }

    /// Returns whether the client is waiting out a backoff delay.
    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        matches!(
            self.machine.state(),
            ConnectionState::Reconnecting | ConnectionState::Error
        )
    }

    /// Returns whether the client has reached terminal state.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.machine.state() == ConnectionState::Closed
    }

    /// Returns the ingestion queue shared with the processor.
    #[must_use]
    pub fn queue(&self) -> Arc<IngestQueue> {
        self.queue.clone()
    }

    /// Returns the number of successful reconnects (excluding the first
    /// connection).
    #[must_use]
    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    /// Registers a listener invoked on every lifecycle transition.
    ///
    /// Register before [`Self::connect`] to observe the full sequence.
    pub fn add_state_listener(&self, listener: StateListener) {
        self.machine.add_listener(listener);
    }

    /// Returns a send handle valid across reconnects.
    #[must_use]
    pub fn writer(&self) -> WsWriter {
        WsWriter {
            tx: self.writer_tx.clone(),
            machine: self.machine.clone(),
        }
    }

    /// Starts the connection loop if not already running.
    ///
    /// Idempotent while the loop is alive. Returns immediately; use
    /// [`Self::wait_until_active`] to block until the session is live.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Closed`] if the client already reached terminal
    /// state; a new client must be constructed to connect again.
    pub fn connect(&self) -> WsResult<()> {
        let mut task = self.task.lock().expect("task lock poisoned");
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                tracing::debug!("Connection loop already running");
                return Ok(());
            }
        }
        if self.machine.state().is_terminal() {
            return Err(WsError::Closed);
        }

        let actor = ConnectionActor {
            config: self.config.clone(),
            transport: self.transport.clone(),
            machine: self.machine.clone(),
            queue: self.queue.clone(),
            writer_tx: self.writer_tx.clone(),
            hook: self.hook.clone(),
            cancel: self.cancel.clone(),
            reconnect_count: self.reconnect_count.clone(),
        };
        *task = Some(tokio::spawn(actor.run()));
        Ok(())
    }

    /// Waits until the client is active or the timeout expires.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Closed`] if the client reaches terminal state while
    /// waiting, or [`WsError::Timeout`] if the deadline passes first.
    pub async fn wait_until_active(&self, timeout_secs: f64) -> WsResult<()> {
        let timeout = Duration::from_secs_f64(timeout_secs);
        tokio::time::timeout(timeout, async {
            loop {
                match self.machine.state() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Closed => return Err(WsError::Closed),
                    _ => tokio::time::sleep(Duration::from_millis(10)).await,
                }
            }
        })
        .await
        .map_err(|_| {
            WsError::Timeout(format!(
                "connection not active after {timeout_secs} seconds"
            ))
        })?
    }

    /// Sends a text frame on the current connection.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::NotConnected`] unless the state is `Connected`.
    pub fn send_text(&self, text: impl Into<String>) -> WsResult<()> {
        self.writer().send_text(text)
    }

    /// Stops the connection loop and drives the state to terminal `Closed`.
    ///
    /// Cancels in-flight work, waits up to the configured grace period, then
    /// aborts. Queued-but-undelivered messages are discarded, not replayed.
    pub async fn close(&self) {
        tracing::info!("Closing connection to {}", self.config.url);
        self.cancel.cancel();

        let handle = self.task.lock().expect("task lock poisoned").take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(self.config.grace_period, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("Grace period expired, aborting connection loop");
                handle.abort();
                drive_to_closed(&self.machine);
                self.queue.drain();
                self.queue.close();
            }
        } else {
            drive_to_closed(&self.machine);
            self.queue.close();
        }
    }
}

/// Drives whatever state the machine ended in to terminal `Closed`.
fn drive_to_closed(machine: &ConnectionStateMachine) {
    let transition = |to: ConnectionState| {
        if let Err(e) = machine.transition(to) {
            tracing::debug!("{e}");
        }
    };
    match machine.state() {
        ConnectionState::Connected | ConnectionState::Disconnected => {
            transition(ConnectionState::Closing);
            transition(ConnectionState::Closed);
        }
        ConnectionState::Connecting => {
            transition(ConnectionState::Error);
            transition(ConnectionState::Closed);
        }
        ConnectionState::Error | ConnectionState::Reconnecting | ConnectionState::Closing => {
            transition(ConnectionState::Closed);
        }
        ConnectionState::Closed => {}
    }
}

enum SessionEnd {
    HookFailed(WsError),
    Serve(Option<WsError>),
}

struct ConnectionActor {
    config: WebSocketConfig,
    transport: Arc<dyn Transport>,
    machine: Arc<ConnectionStateMachine>,
    queue: Arc<IngestQueue>,
    writer_tx: SharedWriterTx,
    hook: Option<PostConnectHook>,
    cancel: CancellationToken,
    reconnect_count: Arc<AtomicU64>,
}

impl ConnectionActor {
    fn transition(&self, to: ConnectionState) {
        if let Err(e) = self.machine.transition(to) {
            tracing::error!("{e}");
        }
    }

    fn writer(&self) -> WsWriter {
        WsWriter {
            tx: self.writer_tx.clone(),
            machine: self.machine.clone(),
        }
    }

    /// Sleeps out a backoff delay; returns `true` when cancelled.
    async fn sleep_or_cancel(&self, delay: Duration) -> bool {
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            "Backing off before next connection attempt"
        );
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }

    async fn run(self) {
        let mut backoff = BackoffState::new();
        let mut first_session = true;

        'lifecycle: loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.transition(ConnectionState::Connecting);
            tracing::info!(url = %self.config.url, "Connecting");

            let open_result = tokio::select! {
                _ = self.cancel.cancelled() => Err(WsError::Closed),
                result = tokio::time::timeout(
                    self.config.open_timeout,
                    self.transport.open(&self.config.url, &self.config.headers),
                ) => match result {
                    Ok(inner) => inner,
                    Err(_) => Err(WsError::Timeout(format!(
                        "transport open timed out after {:?}",
                        self.config.open_timeout
                    ))),
                },
            };

            let (sink, stream) = match open_result {
                Ok(halves) => halves,
                Err(WsError::Closed) => break 'lifecycle,
                Err(e) => {
                    self.transition(ConnectionState::Error);
                    let kind = classify(&e);
                    tracing::warn!(error = %e, kind = %kind, "Transport open failed");
                    match backoff.on_failure(&self.config.policy, kind) {
                        Some(delay) => {
                            self.transition(ConnectionState::Reconnecting);
                            if self.sleep_or_cancel(delay).await {
                                break 'lifecycle;
                            }
                            continue 'lifecycle;
                        }
                        None => break 'lifecycle,
                    }
                }
            };

            self.transition(ConnectionState::Connected);
            backoff.reset();

            // Fresh writer per session; the shared sender is swapped so
            // existing WsWriter handles target the new connection
            let (tx, rx) = mpsc::unbounded_channel();
            *self.writer_tx.write().expect("writer lock poisoned") = tx.clone();
            let mut writer_task = tokio::spawn(writer_loop(sink, rx));

            let end = {
                let mut serve_fut = std::pin::pin!(self.serve(stream, &tx));
                let mut end: Option<SessionEnd> = None;
                if let Some(hook) = &self.hook {
                    let mut hook_fut = hook(self.writer());
                    tokio::select! {
                        result = &mut hook_fut => {
                            if let Err(e) = result {
                                end = Some(SessionEnd::HookFailed(e));
                            }
                        }
                        failure = &mut serve_fut => {
                            end = Some(SessionEnd::Serve(failure));
                        }
                    }
                }
                match end {
                    Some(end) => end,
                    None => {
                        if first_session {
                            first_session = false;
                        } else {
                            self.reconnect_count.fetch_add(1, Ordering::Relaxed);
                            self.queue.push(Frame::Text(RECONNECTED.to_string()));
                            tracing::info!(url = %self.config.url, "Reconnected");
                        }
                        SessionEnd::Serve(serve_fut.await)
                    }
                }
            };

            let _ = tx.send(WriterCommand::Close);
            if tokio::time::timeout(Duration::from_secs(1), &mut writer_task)
                .await
                .is_err()
            {
                writer_task.abort();
            }

            let failure = match end {
                SessionEnd::HookFailed(e) => {
                    tracing::error!(error = %e, "Post-connect hook failed, recycling connection");
                    Some(e)
                }
                SessionEnd::Serve(failure) => failure,
            };

            match failure {
                None => break 'lifecycle, // cancelled
                Some(e) => {
                    self.transition(ConnectionState::Reconnecting);
                    let kind = classify(&e);
                    tracing::warn!(error = %e, kind = %kind, "Connection lost");
                    match backoff.on_failure(&self.config.policy, kind) {
                        Some(delay) => {
                            if self.sleep_or_cancel(delay).await {
                                break 'lifecycle;
                            }
                        }
                        None => break 'lifecycle,
                    }
                }
            }
        }

        self.finalize();
    }

    /// Reads frames into the queue until the stream ends, errors, or the
    /// client is cancelled. Returns the failure, or `None` when cancelled.
    async fn serve(
        &self,
        mut stream: Box<dyn TransportStream>,
        tx: &mpsc::UnboundedSender<WriterCommand>,
    ) -> Option<WsError> {
        let mut heartbeat = self.config.heartbeat.map(|secs| {
            let mut interval = tokio::time::interval(Duration::from_secs(secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval
        });
        let heartbeat_enabled = heartbeat.is_some();
        if let Some(hb) = heartbeat.as_mut() {
            // The first tick completes immediately
            hb.tick().await;
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Ping(payload))) => {
                        let _ = tx.send(WriterCommand::Frame(Frame::Pong(payload)));
                    }
                    Some(Ok(Frame::Pong(_))) => {}
                    Some(Ok(Frame::Close)) => {
                        return Some(WsError::transport(
                            ErrorKind::AbnormalClosure,
                            "server closed the connection",
                        ));
                    }
                    Some(Ok(frame)) => self.queue.push(frame),
                    Some(Err(e)) => return Some(e),
                    None => {
                        return Some(WsError::transport(
                            ErrorKind::AbnormalClosure,
                            "transport stream ended",
                        ));
                    }
                },
                _ = async {
                    heartbeat
                        .as_mut()
                        .expect("heartbeat interval")
                        .tick()
                        .await
                }, if heartbeat_enabled => {
                    let frame = match &self.config.heartbeat_msg {
                        Some(msg) => Frame::Text(msg.clone()),
                        None => Frame::Ping(Vec::new()),
                    };
                    tracing::trace!("Sending heartbeat");
                    let _ = tx.send(WriterCommand::Frame(frame));
                }
            }
        }
    }

    fn finalize(&self) {
        drive_to_closed(&self.machine);
        let dropped = self.queue.drain();
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded undelivered messages");
        }
        self.queue.close();
        tracing::info!(url = %self.config.url, "Connection loop terminated");
    }
}

async fn writer_loop(
    mut sink: Box<dyn TransportSink>,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriterCommand::Frame(frame) => {
                if let Err(e) = sink.send(frame).await {
                    tracing::warn!(error = %e, "Outbound send failed");
                    break;
                }
            }
            WriterCommand::Close => {
                let _ = sink.close().await;
                break;
            }
        }
    }
}
