use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::bootstrap::bootstrap;
use crate::decode::decode_envelope;
use crate::dispatch::{dispatch_batch, EventHandler};
use crate::endpoints::Endpoints;
use crate::session::{AuthSession, SessionContext};
use crate::transport::{get_payload, Transport};
use crate::types::{value_to_string, ChannelError, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `ListenConfig` used across Pulse components.
pub struct ListenConfig {
    pub edge_host_template: String,
    /// Timeout for bootstrap and ping requests.
    pub request_timeout: Duration,
    /// Timeout for the blocking pull; the server holds the connection open, so
    /// expiry here is a normal outcome, not a failure.
    pub pull_timeout: Duration,
    /// Fixed delay before retrying after a connectivity failure. No growth,
    /// no cap, no retry limit.
    pub reconnect_delay: Duration,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            edge_host_template: crate::endpoints::DEFAULT_EDGE_HOST_TEMPLATE.to_string(),
            request_timeout: Duration::from_secs(30),
            pull_timeout: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `ListenState` values.
pub enum ListenState {
    Idle,
    Listening,
    Stopped,
}

#[derive(Debug, Clone)]
/// Cooperative stop signal, shareable across threads.
///
/// Consulted once per cycle boundary; it cannot abort a pull already in
/// flight.
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives the long-poll channel: bootstrap, then repeated ping/pull/decode/
/// dispatch cycles with self-healing failure classification.
///
/// One logical sequential flow; hosts either call [`run`](Self::run) or drive
/// [`step`](Self::step) from their own scheduler. All session state is owned
/// here, so embedding hosts must serialize calls into the listener.
pub struct ChannelListener {
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthSession>,
    handler: Arc<dyn EventHandler>,
    config: ListenConfig,
    endpoints: Endpoints,
    session: SessionContext,
    state: ListenState,
    stop: Arc<AtomicBool>,
}

impl ChannelListener {
    pub fn new(
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthSession>,
        handler: Arc<dyn EventHandler>,
        config: ListenConfig,
    ) -> Self {
        let session = SessionContext::new(auth.viewer_id(), auth.client_id());
        let endpoints = Endpoints::new(config.edge_host_template.clone());
        Self {
            transport,
            auth,
            handler,
            config,
            endpoints,
            session,
            state: ListenState::Idle,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> ListenState {
        self.state
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    /// Bootstraps the channel and enters `Listening`. Idempotent; safe to call
    /// again after a stop.
    pub async fn start_listening(&mut self) -> Result<(), ChannelError> {
        self.stop.store(false, Ordering::SeqCst);
        bootstrap(
            self.transport.as_ref(),
            &self.endpoints,
            &mut self.session,
            self.config.request_timeout,
        )
        .await?;
        self.state = ListenState::Listening;
        Ok(())
    }

    /// Runs one poll cycle and reports whether the loop should keep running.
    ///
    /// Exposed so an externally owned scheduler can drive the loop; `run` is
    /// the blocking convenience built on top of it.
    pub async fn step(&mut self, mark_alive: bool) -> Result<bool, ChannelError> {
        if self.stop.load(Ordering::SeqCst) {
            return Ok(false);
        }
        match self.cycle(mark_alive).await {
            Ok(keep_listening) => Ok(keep_listening),
            Err(error) => self.recover(error).await,
        }
    }

    /// Bootstraps and loops cycles until a stop condition, then clears the
    /// session's continuity tokens.
    pub async fn run(&mut self, mark_alive: bool) -> Result<(), ChannelError> {
        self.start_listening().await?;
        self.handler.on_listening();
        loop {
            match self.step(mark_alive).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(error) => {
                    self.stop_listening();
                    return Err(error);
                }
            }
        }
        self.stop_listening();
        Ok(())
    }

    /// Clears continuity state and marks the listener stopped. For a
    /// concurrent stop request while `run` is in flight, use the
    /// [`StopHandle`] instead.
    pub fn stop_listening(&mut self) {
        self.session.clear_continuity_tokens();
        self.state = ListenState::Stopped;
        info!("listener stopped");
    }

    async fn cycle(&mut self, mark_alive: bool) -> Result<bool, ChannelError> {
        if mark_alive {
            self.ping().await?;
        }
        let payload = self.pull().await?;
        if let Some(cursor) = payload.get("seq").and_then(value_to_string) {
            self.session.set_sequence_cursor(cursor);
        }
        let events = decode_envelope(&payload);
        if events.is_empty() {
            return Ok(true);
        }
        debug!(count = events.len(), "dispatching decoded events");
        Ok(dispatch_batch(self.handler.as_ref(), &events))
    }

    /// Failure classification for one cycle; first match governs. Everything
    /// except a failed re-bootstrap self-heals.
    async fn recover(&mut self, error: ChannelError) -> Result<bool, ChannelError> {
        match error {
            ChannelError::Transport(TransportError::Timeout) => {
                debug!("long poll expired without data");
                Ok(true)
            }
            ChannelError::Transport(TransportError::Connectivity { message }) => {
                warn!(
                    message = %message,
                    delay_ms = self.config.reconnect_delay.as_millis() as u64,
                    "connectivity lost; retrying after fixed delay"
                );
                sleep(self.config.reconnect_delay).await;
                Ok(true)
            }
            error if error.is_overload() => {
                self.endpoints.rotate();
                info!(
                    channel = self.endpoints.pull_channel(),
                    "pull edge overloaded; rotating channel"
                );
                bootstrap(
                    self.transport.as_ref(),
                    &self.endpoints,
                    &mut self.session,
                    self.config.request_timeout,
                )
                .await?;
                Ok(true)
            }
            error if error.is_stale_session() => {
                info!("session went stale; reauthenticating");
                match self.auth.reauthenticate().await {
                    Ok(()) => Ok(true),
                    Err(cause) => Ok(self
                        .handler
                        .on_listen_error(&ChannelError::Callback(cause))),
                }
            }
            error => Ok(self.handler.on_listen_error(&error)),
        }
    }

    /// Fire-and-forget keep-alive; the response is discarded entirely, so only
    /// transport-level failure is observable.
    async fn ping(&mut self) -> Result<(), ChannelError> {
        let mut query: Vec<(&str, String)> = vec![
            ("channel", self.session.channel_id().to_string()),
            ("clientid", self.session.client_id().to_string()),
            ("partition", "-2".to_string()),
            ("cap", "0".to_string()),
            ("uid", self.session.viewer_id().to_string()),
            ("viewer_uid", self.session.viewer_id().to_string()),
            ("state", "active".to_string()),
        ];
        if let Some(sticky) = self.session.sticky_token() {
            query.push(("sticky_token", sticky.to_string()));
        }
        if let Some(pool) = self.session.pool_token() {
            query.push(("sticky_pool", pool.to_string()));
        }
        let params = self.session.request_params(&query);
        self.transport
            .get(&self.endpoints.ping_url(), &params, self.config.request_timeout)
            .await?;
        Ok(())
    }

    async fn pull(&mut self) -> Result<Value, ChannelError> {
        let mut query: Vec<(&str, String)> = vec![
            ("msgs_recv", "0".to_string()),
            ("clientid", self.session.client_id().to_string()),
        ];
        if let Some(sticky) = self.session.sticky_token() {
            query.push(("sticky_token", sticky.to_string()));
        }
        if let Some(pool) = self.session.pool_token() {
            query.push(("sticky_pool", pool.to_string()));
        }
        let params = self.session.request_params(&query);
        get_payload(
            self.transport.as_ref(),
            &self.endpoints.pull_url(),
            &params,
            self.config.pull_timeout,
        )
        .await
    }
}
