//! `PairplayServer` builder and server loop.
//!
//! This is the entry point for running a matchmaking server. It ties the
//! layers together: transport → protocol → session → match.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pairplay_match::{CoreConfig, MatchmakingCore, ScoreReporter};
use pairplay_protocol::{Codec, JsonCodec};
use pairplay_sched::{SweepConfig, SweepTicker};
use pairplay_session::Authenticator;
use pairplay_transport::{Transport, WebSocketTransport};
use tokio::sync::watch;

use crate::PairplayError;
use crate::handler::handle_connection;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A: Authenticator, S: ScoreReporter, C: Codec> {
    pub(crate) core: MatchmakingCore<S>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) handshake_timeout: Duration,
    pub(crate) idle_timeout: Option<Duration>,
    /// Origin for `server_time` and envelope timestamps.
    pub(crate) started: Instant,
}

impl<A: Authenticator, S: ScoreReporter, C: Codec> ServerState<A, S, C> {
    pub(crate) fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Builder for configuring and starting a Pairplay server.
///
/// # Example
///
/// ```rust,ignore
/// use pairplay::prelude::*;
///
/// let server = PairplayServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(JwtAuthenticator::new(secret), Leaderboard::new())
///     .await?;
/// server.run().await
/// ```
pub struct PairplayServerBuilder {
    bind_addr: String,
    core_config: CoreConfig,
    sweep_config: SweepConfig,
    handshake_timeout: Duration,
    idle_timeout: Option<Duration>,
}

impl PairplayServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            core_config: CoreConfig::default(),
            sweep_config: SweepConfig::default(),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(60)),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn core_config(mut self, config: CoreConfig) -> Self {
        self.core_config = config;
        self
    }

    /// Sets how often dead connections are reconciled and stats logged.
    pub fn sweep_config(mut self, config: SweepConfig) -> Self {
        self.sweep_config = config;
        self
    }

    /// How long a new connection may take to send its `Handshake`.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Closes connections that send nothing for this long. `None`
    /// disables the check.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<A, S>(
        self,
        auth: A,
        reporter: S,
    ) -> Result<PairplayServer<A, S, JsonCodec>, PairplayError>
    where
        A: Authenticator,
        S: ScoreReporter,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let state = Arc::new(ServerState {
            core: MatchmakingCore::new(self.core_config, reporter),
            auth,
            codec: JsonCodec,
            handshake_timeout: self.handshake_timeout,
            idle_timeout: self.idle_timeout,
            started: Instant::now(),
        });

        Ok(PairplayServer {
            transport,
            state,
            sweep_config: self.sweep_config.validated(),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }
}

impl Default for PairplayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Stops a running server from another task.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Stops accepting, cancels pending teardowns and closes every
    /// connection. Idempotent.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// A bound Pairplay server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct PairplayServer<A: Authenticator, S: ScoreReporter, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, S, C>>,
    sweep_config: SweepConfig,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<A, S, C> PairplayServer<A, S, C>
where
    A: Authenticator,
    S: ScoreReporter,
    C: Codec,
{
    /// Creates a new builder.
    pub fn builder() -> PairplayServerBuilder {
        PairplayServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle on the matchmaking core, for triggers from outside the
    /// socket layer such as [`MatchmakingCore::request_match_for`].
    pub fn core(&self) -> MatchmakingCore<S> {
        self.state.core.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Runs the accept loop and the periodic sweep until shut down.
    pub async fn run(mut self) -> Result<(), PairplayError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "pairplay server running");

        let sweeper = tokio::spawn(run_sweeps(
            self.state.core.clone(),
            self.sweep_config.clone(),
            self.shutdown_rx.clone(),
        ));

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                _ = self.shutdown_rx.changed() => break,
            }
        }

        sweeper.abort();
        self.state.core.shutdown().await;
        self.transport.shutdown().await?;
        tracing::info!("pairplay server stopped");
        Ok(())
    }
}

/// Reconciles dead connections and logs stats every sweep interval.
async fn run_sweeps<S: ScoreReporter>(
    core: MatchmakingCore<S>,
    config: SweepConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    if !config.is_enabled() {
        tracing::debug!("periodic sweep disabled");
        return;
    }
    let mut ticker = SweepTicker::new(config);

    loop {
        tokio::select! {
            info = ticker.wait_for_sweep() => {
                if info.sweeps_skipped > 0 {
                    tracing::debug!(sweep = info.sweep, skipped = info.sweeps_skipped, "sweeps skipped");
                }
                core.sweep().await;
                if let Some(took) = ticker.record_sweep_end() {
                    tracing::trace!(sweep = info.sweep, took_ms = took.as_millis() as u64, "sweep finished");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
