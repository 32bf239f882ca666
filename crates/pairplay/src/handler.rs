//! Per-connection handler: handshake, auth, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version, verify the token if any
//!   2. Send HandshakeAck → attach to the core, register if verified
//!   3. Loop: drain the outbound channel and dispatch inbound envelopes
//!
//! Everything the client sees goes through the connection's outbound
//! channel, so replies from this handler and messages from the core keep
//! one order.

use std::sync::Arc;

use pairplay_match::{Outbound, OutboundSender, ScoreReporter};
use pairplay_protocol::{
    Channel, Codec, Envelope, Identity, MatchMessage, PROTOCOL_VERSION, Payload, ProtocolError,
    ReasonCode, SystemMessage,
};
use pairplay_session::Authenticator;
use pairplay_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::PairplayError;
use crate::server::ServerState;

/// Drop guard that reports the close to the core when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async lock.
struct CloseGuard<A: Authenticator, S: ScoreReporter, C: Codec> {
    conn_id: ConnectionId,
    state: Arc<ServerState<A, S, C>>,
}

impl<A: Authenticator, S: ScoreReporter, C: Codec> Drop for CloseGuard<A, S, C> {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.core.on_connection_closed(conn_id).await;
        });
    }
}

/// What to do after an inbound message.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, S, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, S, C>>,
) -> Result<(), PairplayError>
where
    A: Authenticator,
    S: ScoreReporter,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = ?conn.peer_addr(), "handling new connection");

    // --- Step 1: Handshake ---
    let identity = match perform_handshake(&conn, &state).await {
        Ok(identity) => identity,
        Err(e) => {
            let _ = conn.close("handshake failed").await;
            return Err(e);
        }
    };

    // --- Step 2: Attach and register ---
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.core.connect(conn_id, tx.clone()).await;
    let _guard = CloseGuard {
        conn_id,
        state: Arc::clone(&state),
    };
    match identity {
        Some(identity) => {
            tracing::info!(%conn_id, player_id = %identity.id, "player authenticated");
            state.core.register(identity, conn_id).await;
        }
        None => tracing::info!(%conn_id, "anonymous connection"),
    }

    // --- Step 3: Message loop ---
    //
    // Three things can wake this task:
    //   1. The core queued something for this connection (`rx`). This
    //      includes our own replies, which go through `tx` so they keep
    //      their order relative to core messages.
    //   2. The client sent a frame.
    //   3. Nothing arrived from the client for `idle_timeout`.
    //
    // `biased` drains outbound first, so a `Close` requested by the core
    // (superseded, session ended) wins over reading more input.
    let mut seq: u64 = 1;
    let mut last_inbound = Instant::now();

    loop {
        let idle_deadline = state.idle_timeout.map(|timeout| last_inbound + timeout);
        let idle = async move {
            match idle_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            outbound = rx.recv() => match outbound {
                Some(Outbound::Message { payload, channel }) => {
                    send_envelope(&conn, &state, &mut seq, payload, channel).await?;
                }
                Some(Outbound::Close { reason }) => {
                    tracing::debug!(%conn_id, %reason, "closing on request");
                    let _ = conn.close(&reason).await;
                    break;
                }
                None => break,
            },

            inbound = conn.recv() => {
                let data = match inbound {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%conn_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                };
                last_inbound = Instant::now();

                if dispatch(conn_id, &state, &tx, &data).await == Flow::Close {
                    // Flush what is already queued, then go.
                    while let Ok(Outbound::Message { payload, channel }) = rx.try_recv() {
                        send_envelope(&conn, &state, &mut seq, payload, channel).await?;
                    }
                    let _ = conn.close("client disconnected").await;
                    break;
                }
            }

            () = idle => {
                tracing::info!(%conn_id, "connection idle, closing");
                let _ = conn.close("idle timeout").await;
                break;
            }
        }
    }

    // _guard drops here → the core sees the close.
    Ok(())
}

/// Receives the `Handshake`, checks the version and verifies the token.
///
/// Returns `None` for an anonymous connection: no token, or a token that
/// did not verify. Anything other than a well-formed `Handshake` with the
/// right version, in time, ends the connection.
async fn perform_handshake<A, S, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, S, C>,
) -> Result<Option<Identity>, PairplayError>
where
    A: Authenticator,
    S: ScoreReporter,
    C: Codec,
{
    let data = match tokio::time::timeout(state.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let (version, token) = match state.codec.decode::<Envelope>(&data).map(|env| env.payload) {
        Ok(Payload::System(SystemMessage::Handshake { version, token })) => (version, token),
        _ => {
            send_direct(conn, state, SystemMessage::error(ReasonCode::Validation, "expected Handshake")).await?;
            return Err(ProtocolError::InvalidMessage("first message must be Handshake".into()).into());
        }
    };

    if version != PROTOCOL_VERSION {
        send_direct(
            conn,
            state,
            SystemMessage::error(
                ReasonCode::VersionMismatch,
                format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
            ),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let identity = match token.as_deref() {
        None | Some("") => None,
        Some(token) => match state.auth.authenticate(token).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::debug!(conn_id = %conn.id(), error = %e, "handshake token rejected");
                send_direct(conn, state, SystemMessage::error(ReasonCode::AuthFailed, e.to_string())).await?;
                None
            }
        },
    };

    send_direct(
        conn,
        state,
        SystemMessage::HandshakeAck {
            player_id: identity.as_ref().map(|i| i.id.clone()),
            display_name: identity.as_ref().map(|i| i.display_name.clone()),
            server_time: state.now_ms(),
        },
    )
    .await?;

    Ok(identity)
}

/// Decodes one inbound frame and routes it.
async fn dispatch<A, S, C>(
    conn_id: ConnectionId,
    state: &ServerState<A, S, C>,
    tx: &OutboundSender,
    data: &[u8],
) -> Flow
where
    A: Authenticator,
    S: ScoreReporter,
    C: Codec,
{
    let envelope: Envelope = match state.codec.decode(data) {
        Ok(env) => env,
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "failed to decode envelope");
            reply(tx, SystemMessage::error(ReasonCode::Validation, format!("invalid message: {e}")));
            return Flow::Continue;
        }
    };

    match envelope.payload {
        Payload::System(msg) => handle_system_message(conn_id, state, tx, msg).await,
        Payload::Match(msg) => {
            handle_match_message(conn_id, state, tx, msg).await;
            Flow::Continue
        }
    }
}

async fn handle_system_message<A, S, C>(
    conn_id: ConnectionId,
    state: &ServerState<A, S, C>,
    tx: &OutboundSender,
    msg: SystemMessage,
) -> Flow
where
    A: Authenticator,
    S: ScoreReporter,
    C: Codec,
{
    match msg {
        SystemMessage::Heartbeat { client_time } => {
            reply(
                tx,
                SystemMessage::HeartbeatAck {
                    client_time,
                    server_time: state.now_ms(),
                },
            );
        }

        SystemMessage::Register { token } => match state.auth.authenticate(&token).await {
            Ok(identity) => {
                let player_id = identity.id.clone();
                let display_name = identity.display_name.clone();
                // Acknowledge first so `Registered` precedes anything the
                // registration itself triggers.
                reply(
                    tx,
                    SystemMessage::Registered {
                        player_id: player_id.clone(),
                        display_name,
                    },
                );
                state.core.register(identity, conn_id).await;
                tracing::info!(%conn_id, %player_id, "player registered via Register");
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "register token rejected");
                reply(tx, SystemMessage::error(ReasonCode::AuthFailed, e.to_string()));
            }
        },

        SystemMessage::Disconnect { reason } => {
            tracing::info!(%conn_id, %reason, "client disconnected");
            return Flow::Close;
        }

        other => {
            tracing::debug!(%conn_id, msg = ?other, "unexpected system message");
            reply(
                tx,
                SystemMessage::error(ReasonCode::Validation, "unexpected system message"),
            );
        }
    }

    Flow::Continue
}

async fn handle_match_message<A, S, C>(
    conn_id: ConnectionId,
    state: &ServerState<A, S, C>,
    tx: &OutboundSender,
    msg: MatchMessage,
) where
    A: Authenticator,
    S: ScoreReporter,
    C: Codec,
{
    match msg {
        MatchMessage::RequestMatch => {
            // The core answers with `QueuedStatus` itself.
            if let Err(e) = state.core.request_match(conn_id).await {
                tracing::debug!(%conn_id, error = %e, "match request refused");
            }
        }

        MatchMessage::Move {
            session_id,
            cell_index,
        } => {
            if let Err(e) = state.core.handle_move(conn_id, session_id, cell_index).await {
                reply(tx, SystemMessage::error(e.reason_code(), e.to_string()));
            }
        }

        other => {
            tracing::debug!(%conn_id, msg = ?other, "unexpected match message");
            reply(
                tx,
                SystemMessage::error(ReasonCode::Validation, "unexpected match message"),
            );
        }
    }
}

/// Queues a reliable reply for this connection.
fn reply(tx: &OutboundSender, payload: impl Into<Payload>) {
    let _ = tx.send(Outbound::Message {
        payload: payload.into(),
        channel: Channel::ReliableOrdered,
    });
}

/// Encodes and writes one envelope. Unreliable sends that fail are
/// dropped.
async fn send_envelope<A, S, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, S, C>,
    seq: &mut u64,
    payload: Payload,
    channel: Channel,
) -> Result<(), PairplayError>
where
    A: Authenticator,
    S: ScoreReporter,
    C: Codec,
{
    let envelope = Envelope {
        seq: next_seq(seq),
        timestamp: state.now_ms(),
        channel,
        payload,
    };
    let bytes = state.codec.encode(&envelope)?;

    match channel {
        Channel::Unreliable => {
            if let Err(e) = conn.send_unreliable(&bytes).await {
                tracing::trace!(conn_id = %conn.id(), error = %e, "unreliable send dropped");
            }
        }
        Channel::ReliableOrdered | Channel::ReliableUnordered => conn.send(&bytes).await?,
    }
    Ok(())
}

/// Writes a system message before the connection is attached to the
/// core. Always sequence number 0.
async fn send_direct<A, S, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, S, C>,
    msg: SystemMessage,
) -> Result<(), PairplayError>
where
    A: Authenticator,
    S: ScoreReporter,
    C: Codec,
{
    let envelope = Envelope {
        seq: 0,
        timestamp: state.now_ms(),
        channel: Channel::ReliableOrdered,
        payload: Payload::System(msg),
    };
    let bytes = state.codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
