//! `RollcallServer` builder and server loop.
//!
//! This is the entry point for running a Rollcall server. It ties
//! together all the layers: transport → protocol → session, plus the
//! optional presenter loop driven by the cadence.

use std::sync::Arc;
use std::time::Duration;

use rollcall_cadence::CadenceConfig;
use rollcall_protocol::{Codec, DisplayCode, JsonCodec};
use rollcall_session::{
    AttendanceDesk, AttendanceRecorder, Clock, ExpiringStore, SessionConfig,
    SessionIssuer, SessionVerifier, SystemClock,
};
use tokio::sync::{Notify, watch};

use crate::handler::handle_connection;
use crate::presenter::run_presenter;
use crate::{RollcallError, WsListener};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Holds no
/// session state: the issuer and desk both go to the store every time.
pub(crate) struct ServerState<S, R, K, C> {
    pub(crate) issuer: SessionIssuer<S, K>,
    pub(crate) desk: AttendanceDesk<S, R, K>,
    pub(crate) codec: C,
    /// Latest display code, for `WatchCodes` subscribers.
    pub(crate) codes: watch::Sender<Option<DisplayCode>>,
    /// Signalled when a client issues a session outside the cadence.
    pub(crate) reissued: Notify,
    pub(crate) idle_timeout: Duration,
}

impl<S, R, K, C> ServerState<S, R, K, C>
where
    S: ExpiringStore,
    R: AttendanceRecorder,
    K: Clock,
    C: Codec,
{
    /// Recomputes the display code and pushes it to watchers if it
    /// changed. A store failure keeps the last published code.
    pub(crate) async fn publish_current_code(&self) {
        match self.issuer.current_code().await {
            Ok(code) => {
                self.codes.send_if_modified(|current| {
                    if *current == code {
                        return false;
                    }
                    *current = code;
                    true
                });
            }
            Err(e) => tracing::warn!(error = %e, "could not refresh display code"),
        }
    }
}

/// Builder for configuring and starting a Rollcall server.
///
/// # Example
///
/// ```rust,ignore
/// use rollcall::prelude::*;
///
/// let server = RollcallServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .presenter(CadenceConfig::default())
///     .build(Arc::new(MemoryStore::new()), Arc::new(MemoryRecorder::new()))
///     .await?;
/// server.run().await
/// ```
pub struct RollcallServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    presenter: Option<CadenceConfig>,
    idle_timeout: Duration,
    handshake_timeout: Duration,
}

impl RollcallServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session_config: SessionConfig::default(),
            presenter: None,
            idle_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Runs a presenter loop that reissues and rotates on `cadence`.
    ///
    /// Without this, sessions are only issued when a client asks.
    pub fn presenter(mut self, cadence: CadenceConfig) -> Self {
        self.presenter = Some(cadence);
        self
    }

    /// How long a connection may stay silent before it is dropped.
    /// Connections watching codes are exempt.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// How long a new connection gets to finish its WebSocket upgrade.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Binds the listener and wires the session layer on the system clock.
    pub async fn build<S, R>(
        self,
        store: Arc<S>,
        recorder: Arc<R>,
    ) -> Result<RollcallServer<S, R, SystemClock, JsonCodec>, RollcallError>
    where
        S: ExpiringStore,
        R: AttendanceRecorder,
    {
        self.build_with_clock(store, recorder, SystemClock).await
    }

    /// Like [`build`](Self::build), with an explicit clock for the
    /// session windows.
    pub async fn build_with_clock<S, R, K>(
        self,
        store: Arc<S>,
        recorder: Arc<R>,
        clock: K,
    ) -> Result<RollcallServer<S, R, K, JsonCodec>, RollcallError>
    where
        S: ExpiringStore,
        R: AttendanceRecorder,
        K: Clock + Clone,
    {
        let listener = WsListener::bind(&self.bind_addr).await?;

        let issuer = SessionIssuer::with_clock(
            Arc::clone(&store),
            clock.clone(),
            self.session_config.clone(),
        );
        let verifier = SessionVerifier::with_clock(store, clock, self.session_config);
        let (codes, _) = watch::channel(None);

        let state = Arc::new(ServerState {
            issuer,
            desk: AttendanceDesk::new(verifier, recorder),
            codec: JsonCodec,
            codes,
            reissued: Notify::new(),
            idle_timeout: self.idle_timeout,
        });

        Ok(RollcallServer {
            listener,
            state,
            presenter: self.presenter,
            handshake_timeout: self.handshake_timeout,
        })
    }
}

impl Default for RollcallServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Rollcall server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RollcallServer<S, R, K, C> {
    listener: WsListener,
    state: Arc<ServerState<S, R, K, C>>,
    presenter: Option<CadenceConfig>,
    handshake_timeout: Duration,
}

impl<S, R, K, C> RollcallServer<S, R, K, C>
where
    S: ExpiringStore,
    R: AttendanceRecorder,
    K: Clock,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the server accept loop.
    ///
    /// Starts the presenter loop if one was configured, then accepts
    /// connections and spawns a task for each that upgrades it to
    /// WebSocket and runs the handler. Runs until the process is
    /// terminated.
    pub async fn run(self) -> Result<(), RollcallError> {
        tracing::info!(presenter = self.presenter.is_some(), "Rollcall server running");

        if let Some(cadence) = self.presenter {
            tokio::spawn(run_presenter(Arc::clone(&self.state), cadence));
        }

        loop {
            match self.listener.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    let limit = self.handshake_timeout;
                    tokio::spawn(async move {
                        let peer = pending.peer_addr();
                        let conn = match pending.upgrade(limit).await {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::debug!(%peer, error = %e, "websocket upgrade failed");
                                return;
                            }
                        };
                        let conn_id = conn.id();
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                %conn_id,
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
