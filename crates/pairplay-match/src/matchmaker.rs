//! The matchmaking core: queue, sessions and connections behind one lock.
//!
//! Every operation that reads or changes matchmaking state takes the
//! single state mutex, so concurrent requests from different connections
//! are serialized. Delivery goes through unbounded channels and never
//! awaits, so messages leave in the order the state changed. Score reports
//! and session teardown run later on the [`Scheduler`], outside the lock.

use std::collections::HashMap;
use std::sync::Arc;

use pairplay_protocol::{
    Identity, MatchMessage, Outcome, PlayerId, QueueStatus, Role, Seats, SessionId,
    TerminationReason,
};
use pairplay_sched::Scheduler;
use pairplay_session::{
    ClosedConnection, ConnectionRegistry, PendingIntent, PendingIntentTracker, Registration,
};
use pairplay_transport::ConnectionId;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::gateway::{Gateway, OutboundSender};
use crate::queue::{EnqueueOutcome, MatchmakingQueue, QueueEntry};
use crate::{CoreConfig, GameSession, MatchError, MoveOutcome, ScoreReporter, ScoreResult};

/// What [`MatchmakingCore::request_match_for`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentOutcome {
    /// The player was online; the request went straight to the queue.
    Executed,
    /// Parked until the player connects.
    Pending,
    /// A request was already parked for the player.
    AlreadyPending,
}

/// A point-in-time view of the core's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreStats {
    /// Connections attached to the gateway, authenticated or not.
    pub connections: usize,
    /// Connections bound to an identity.
    pub registered: usize,
    pub identities: usize,
    pub queued: usize,
    pub sessions: usize,
    pub pending_intents: usize,
}

struct CoreState {
    registry: ConnectionRegistry,
    queue: MatchmakingQueue,
    sessions: HashMap<SessionId, GameSession>,
    /// Which session each participant is bound to, until teardown.
    session_of: HashMap<PlayerId, SessionId>,
    gateway: Gateway,
}

impl CoreState {
    fn stats(&self) -> CoreStats {
        CoreStats {
            connections: self.gateway.connection_count(),
            registered: self.registry.connection_count(),
            identities: self.registry.identity_count(),
            queued: self.queue.len(),
            sessions: self.sessions.len(),
            pending_intents: self.registry.pending().len(),
        }
    }
}

struct CoreInner<S> {
    state: Mutex<CoreState>,
    reporter: Arc<S>,
    scheduler: Scheduler,
    config: CoreConfig,
}

/// Shared handle to the matchmaking core.
///
/// Cheap to clone; clones share state. One core serves every connection
/// handler of a server.
pub struct MatchmakingCore<S: ScoreReporter> {
    inner: Arc<CoreInner<S>>,
}

impl<S: ScoreReporter> Clone for MatchmakingCore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ScoreReporter> MatchmakingCore<S> {
    pub fn new(config: CoreConfig, reporter: S) -> Self {
        Self::with_scheduler(config, reporter, Scheduler::new())
    }

    /// Builds a core that runs its deferred work on `scheduler`.
    pub fn with_scheduler(config: CoreConfig, reporter: S, scheduler: Scheduler) -> Self {
        let pending = match config.pending_intent_ttl {
            Some(ttl) => PendingIntentTracker::with_ttl(ttl),
            None => PendingIntentTracker::new(),
        };
        let registry = ConnectionRegistry::new(config.registry.clone()).with_pending_tracker(pending);

        Self {
            inner: Arc::new(CoreInner {
                state: Mutex::new(CoreState {
                    registry,
                    queue: MatchmakingQueue::new(),
                    sessions: HashMap::new(),
                    session_of: HashMap::new(),
                    gateway: Gateway::new(),
                }),
                reporter: Arc::new(reporter),
                scheduler,
                config,
            }),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn reporter(&self) -> &S {
        &self.inner.reporter
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Makes a new transport connection reachable. The connection stays
    /// anonymous until [`register`](Self::register) binds it.
    pub async fn connect(&self, connection_id: ConnectionId, sender: OutboundSender) {
        let mut state = self.inner.state.lock().await;
        state.gateway.attach(connection_id, sender);
        debug!(conn_id = %connection_id, "connection attached");
    }

    /// Binds an authenticated connection to `identity`.
    ///
    /// Superseded connections are closed, a connection that moved away
    /// from another identity is treated as closed for that identity, a
    /// running session is pointed at the new connection, and a parked
    /// match request is executed before this returns.
    pub async fn register(&self, identity: Identity, connection_id: ConnectionId) -> Registration {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let registration = state
            .registry
            .register_connection(identity.clone(), connection_id);

        for old in &registration.superseded {
            state.gateway.close(*old, "superseded by a newer connection");
        }
        if let Some(moved) = registration.moved_from.clone() {
            self.handle_closed(state, moved);
        }
        if let Some(session_id) = state.session_of.get(&identity.id).copied() {
            state
                .gateway
                .rebind(session_id, identity.id.clone(), connection_id);
            debug!(player_id = %identity.id, %session_id, conn_id = %connection_id, "session rebound to new connection");
        }

        info!(
            player_id = %identity.id,
            conn_id = %connection_id,
            superseded = registration.superseded.len(),
            "player registered"
        );
        state.gateway.broadcast_volatile(
            MatchMessage::PresenceChanged {
                player_id: identity.id.clone(),
                display_name: identity.display_name.clone(),
                online: true,
            },
            Some(connection_id),
        );

        if let Some(PendingIntent::EnqueueForMatch) = registration.flushed {
            debug!(player_id = %identity.id, "executing parked match request");
            if let Err(e) = self.enqueue_locked(state, &identity, connection_id) {
                debug!(player_id = %identity.id, error = %e, "parked match request refused");
            }
        }

        registration
    }

    /// The identity bound to `connection_id`, if any.
    pub async fn identity_of(&self, connection_id: ConnectionId) -> Option<Identity> {
        let state = self.inner.state.lock().await;
        state.registry.identity_of(connection_id).cloned()
    }

    /// Handles a transport close. Safe to call more than once and for
    /// connections the core already dropped.
    pub async fn on_connection_closed(&self, connection_id: ConnectionId) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        state.gateway.detach(connection_id);
        match state.registry.on_connection_closed(connection_id) {
            Some(closed) => {
                debug!(conn_id = %connection_id, player_id = %closed.identity().id, "registered connection closed");
                self.handle_closed(state, closed);
            }
            None => debug!(conn_id = %connection_id, "unbound connection closed"),
        }
    }

    /// Purges registry entries whose connection is no longer live and
    /// runs the usual close handling for each. Returns how many.
    pub async fn reconcile(&self) -> usize {
        let mut guard = self.inner.state.lock().await;
        self.reconcile_locked(&mut guard)
    }

    // =========================================================================
    // Matchmaking
    // =========================================================================

    /// Queues the identity bound to `connection_id` and runs a pairing
    /// pass. The requester gets a `QueuedStatus` either way.
    pub async fn request_match(&self, connection_id: ConnectionId) -> Result<EnqueueOutcome, MatchError> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let Some(identity) = state.registry.identity_of(connection_id).cloned() else {
            state.gateway.send_to_connection(
                connection_id,
                MatchMessage::QueuedStatus {
                    status: QueueStatus::Error,
                    message: "Not authenticated".into(),
                },
            );
            return Err(MatchError::Anonymous);
        };

        self.enqueue_locked(state, &identity, connection_id)
    }

    /// Requests a match on behalf of `player`, who may not be connected.
    ///
    /// If the player has a live connection the request is executed now;
    /// otherwise it is parked and executed when the player registers.
    pub async fn request_match_for(&self, player: &PlayerId) -> IntentOutcome {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let live = state
            .registry
            .resolve_active_connection(player)
            .filter(|c| state.gateway.is_live(*c));
        if let Some(connection_id) = live {
            if let Some(identity) = state.registry.identity_of(connection_id).cloned() {
                if let Err(e) = self.enqueue_locked(state, &identity, connection_id) {
                    debug!(player_id = %player, error = %e, "match request refused");
                }
                return IntentOutcome::Executed;
            }
        }

        if state.registry.pending_mut().request(player) {
            debug!(player_id = %player, "match request parked");
            IntentOutcome::Pending
        } else {
            IntentOutcome::AlreadyPending
        }
    }

    /// Applies a move from `connection_id` to `session_id`.
    ///
    /// Accepted moves are broadcast to the session. A move that ends the
    /// game also broadcasts the result, reports scores and schedules
    /// teardown. Rejections change nothing and are returned for the
    /// caller to report to the mover alone.
    pub async fn handle_move(
        &self,
        connection_id: ConnectionId,
        session_id: SessionId,
        cell_index: u32,
    ) -> Result<MoveOutcome, MatchError> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let identity = state
            .registry
            .identity_of(connection_id)
            .cloned()
            .ok_or(MatchError::Anonymous)?;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(MatchError::SessionNotFound(session_id))?;

        let applied = match session.apply_move(&identity.id, cell_index) {
            Ok(applied) => applied,
            Err(e) => {
                debug!(player_id = %identity.id, %session_id, cell_index, error = %e, "move rejected");
                return Err(e.into());
            }
        };
        let outcome = session.outcome();
        let seats = session.seats().clone();
        let age = session.created_at().elapsed();

        state.gateway.send_to_session(
            session_id,
            MatchMessage::MoveApplied {
                session_id,
                cell_index,
                role: applied.role,
                board: applied.board,
            },
        );

        if let Some(outcome) = outcome {
            info!(%session_id, ?outcome, duration_ms = age.as_millis() as u64, "session ended");
            state.gateway.send_to_session(
                session_id,
                MatchMessage::SessionEnded {
                    session_id,
                    outcome: outcome.clone(),
                    board: applied.board,
                },
            );
            self.report_scores(&seats, &outcome);
            self.schedule_teardown(session_id);
        }

        Ok(applied)
    }

    /// Removes a finished (or abandoned) session and disconnects its
    /// participants. Returns `false` if the session was already gone.
    pub async fn teardown_session(&self, session_id: SessionId) -> bool {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let Some(session) = state.sessions.remove(&session_id) else {
            debug!(%session_id, "teardown skipped, session already gone");
            return false;
        };
        state.gateway.remove_group(session_id);

        for identity in session.participants() {
            if state.session_of.get(&identity.id) == Some(&session_id) {
                state.session_of.remove(&identity.id);
            }
            state.queue.remove(&identity.id);
            let purged = state.registry.purge_identity(&identity.id);
            if purged.is_empty() {
                continue;
            }
            for conn in purged {
                state.gateway.close(conn, "session ended");
            }
            // The handlers' close reports will find nothing left to clean
            // up, so the offline notice has to go out here.
            announce_offline(&state.gateway, identity);
        }

        info!(%session_id, "session torn down");
        true
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    /// One maintenance pass: reconcile dead connections, expire stale
    /// parked requests, log the resulting counts.
    pub async fn sweep(&self) -> CoreStats {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let reconciled = self.reconcile_locked(state);
        let expired = state.registry.pending_mut().expire_stale();
        for player in &expired {
            debug!(player_id = %player, "parked match request expired");
        }

        let stats = state.stats();
        info!(
            connections = stats.connections,
            registered = stats.registered,
            identities = stats.identities,
            queued = stats.queued,
            sessions = stats.sessions,
            pending_intents = stats.pending_intents,
            reconciled,
            expired = expired.len(),
            "matchmaking stats"
        );
        stats
    }

    pub async fn stats(&self) -> CoreStats {
        self.inner.state.lock().await.stats()
    }

    pub async fn session_of(&self, player: &PlayerId) -> Option<SessionId> {
        self.inner.state.lock().await.session_of.get(player).copied()
    }

    /// A copy of the session as it is now.
    pub async fn session(&self, session_id: SessionId) -> Option<GameSession> {
        self.inner.state.lock().await.sessions.get(&session_id).cloned()
    }

    pub async fn queue_position(&self, player: &PlayerId) -> Option<usize> {
        self.inner.state.lock().await.queue.position(player)
    }

    /// Cancels deferred work and closes every connection.
    pub async fn shutdown(&self) {
        self.inner.scheduler.shutdown();
        let mut state = self.inner.state.lock().await;
        let closed = state.gateway.close_all("server shutting down");
        info!(closed, "matchmaking core shut down");
    }

    // =========================================================================
    // Internals (state lock held)
    // =========================================================================

    fn enqueue_locked(
        &self,
        state: &mut CoreState,
        identity: &Identity,
        connection_id: ConnectionId,
    ) -> Result<EnqueueOutcome, MatchError> {
        if let Some(session_id) = state.session_of.get(&identity.id).copied() {
            state.gateway.send_to_connection(
                connection_id,
                MatchMessage::QueuedStatus {
                    status: QueueStatus::Error,
                    message: "Already in a session".into(),
                },
            );
            return Err(MatchError::AlreadyInSession(session_id));
        }

        let outcome = state.queue.enqueue(identity.clone(), connection_id);
        let message = match outcome {
            EnqueueOutcome::Queued { .. } => "Searching for an opponent...",
            EnqueueOutcome::AlreadyQueued { .. } => "Already queued",
        };
        state.gateway.send_to_connection(
            connection_id,
            MatchMessage::QueuedStatus {
                status: QueueStatus::Waiting,
                message: message.into(),
            },
        );

        self.run_pairing(state);
        Ok(outcome)
    }

    fn run_pairing(&self, state: &mut CoreState) {
        let CoreState {
            registry,
            queue,
            gateway,
            ..
        } = &mut *state;
        let pass = queue.attempt_pairing(|player| {
            registry
                .resolve_active_connection(player)
                .filter(|c| gateway.is_live(*c))
        });

        for (a, b) in pass.pairs {
            self.start_session(state, a, b);
        }
    }

    fn start_session(&self, state: &mut CoreState, a: QueueEntry, b: QueueEntry) {
        let (x, o) = if rand::rng().random_bool(0.5) { (a, b) } else { (b, a) };
        let session_id = SessionId::new_v4();
        let seats = Seats {
            x: x.identity.clone(),
            o: o.identity.clone(),
        };
        let session = GameSession::new(session_id, seats.clone());

        state.gateway.create_group(
            session_id,
            [
                (x.identity.id.clone(), x.connection_id),
                (o.identity.id.clone(), o.connection_id),
            ],
        );
        state.session_of.insert(x.identity.id.clone(), session_id);
        state.session_of.insert(o.identity.id.clone(), session_id);

        state.gateway.send_to_session(
            session_id,
            MatchMessage::Matched {
                session_id,
                roles: seats,
                board: *session.board(),
                starting_role: Role::STARTING,
            },
        );
        for (entry, role) in [(&x, Role::X), (&o, Role::O)] {
            state
                .gateway
                .send_to_connection(entry.connection_id, MatchMessage::RoleAssigned { session_id, role });
        }
        state
            .gateway
            .send_to_session(session_id, MatchMessage::SessionStarted { session_id });

        state.sessions.insert(session_id, session);
        info!(
            %session_id,
            x = %x.identity.id,
            o = %o.identity.id,
            "session started"
        );
    }

    fn handle_closed(&self, state: &mut CoreState, closed: ClosedConnection) {
        match closed {
            ClosedConnection::IdentityGone { identity } => self.identity_gone(state, &identity),
            ClosedConnection::Promoted {
                identity,
                active,
                was_active: true,
            } => {
                if let Some(session_id) = state.session_of.get(&identity.id).copied() {
                    state.gateway.rebind(session_id, identity.id.clone(), active);
                }
                debug!(player_id = %identity.id, conn_id = %active, "active connection promoted");
            }
            ClosedConnection::Promoted { .. } => {}
        }
    }

    /// The player's last connection is gone: leave the queue, abandon any
    /// running session, tell everyone else they went offline.
    fn identity_gone(&self, state: &mut CoreState, identity: &Identity) {
        if state.queue.remove(&identity.id) {
            debug!(player_id = %identity.id, "removed from queue on disconnect");
        }

        if let Some(session_id) = state.session_of.remove(&identity.id) {
            if let Some(session) = state.sessions.remove(&session_id) {
                state.gateway.send_to_session(
                    session_id,
                    MatchMessage::MatchTerminated {
                        session_id,
                        player_id: identity.id.clone(),
                        reason: TerminationReason::Disconnect,
                    },
                );

                if let Some(opponent) = session.opponent_of(&identity.id) {
                    state.gateway.send_to_player(
                        &state.registry,
                        &opponent.id,
                        MatchMessage::OpponentDisconnected {
                            session_id,
                            opponent: identity.id.clone(),
                            message: format!("{} disconnected", identity.display_name),
                        },
                    );
                    if state.session_of.get(&opponent.id) == Some(&session_id) {
                        state.session_of.remove(&opponent.id);
                    }
                    state.queue.remove(&opponent.id);
                }

                state.gateway.remove_group(session_id);
                if session.status().is_terminal() {
                    debug!(%session_id, player_id = %identity.id, "finished session dropped early on disconnect");
                } else {
                    info!(%session_id, player_id = %identity.id, "session terminated by disconnect");
                }
            }
        }

        announce_offline(&state.gateway, identity);
    }

    fn reconcile_locked(&self, state: &mut CoreState) -> usize {
        let live = state.gateway.live_connections();
        let pruned = state.gateway.prune_closed();
        let reconciled = state.registry.reconcile(|c| live.contains(&c));
        let count = reconciled.len();

        for dead in reconciled {
            warn!(conn_id = %dead.connection_id, player_id = %dead.outcome.identity().id, "reconciled dead connection");
            self.handle_closed(state, dead.outcome);
        }
        if pruned > 0 {
            debug!(pruned, "pruned closed senders");
        }
        count
    }

    fn report_scores(&self, seats: &Seats, outcome: &Outcome) {
        let scoring = &self.inner.config.scoring;
        let reports = match outcome {
            Outcome::Win { role, .. } => [
                (seats.get(*role).clone(), scoring.delta(ScoreResult::Win)),
                (seats.get(role.opponent()).clone(), scoring.delta(ScoreResult::Loss)),
            ],
            Outcome::Draw => [
                (seats.x.clone(), scoring.delta(ScoreResult::Draw)),
                (seats.o.clone(), scoring.delta(ScoreResult::Draw)),
            ],
        };

        for (identity, delta) in reports {
            let reporter = Arc::clone(&self.inner.reporter);
            self.inner.scheduler.spawn_detached(async move {
                let player_id = identity.id.clone();
                if let Err(e) = reporter.record_outcome(identity, delta).await {
                    warn!(%player_id, error = %e, "score report failed");
                }
            });
        }
    }

    fn schedule_teardown(&self, session_id: SessionId) {
        let core = self.clone();
        self.inner
            .scheduler
            .schedule_after(self.inner.config.teardown_grace, async move {
                core.teardown_session(session_id).await;
            });
    }
}

fn announce_offline(gateway: &Gateway, identity: &Identity) {
    gateway.broadcast_volatile(
        MatchMessage::PresenceChanged {
            player_id: identity.id.clone(),
            display_name: identity.display_name.clone(),
            online: false,
        },
        None,
    );
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pairplay_protocol::{Payload, SessionStatus};
    use tokio::sync::mpsc;

    use super::*;
    use crate::gateway::{Outbound, OutboundReceiver};
    use crate::{Leaderboard, MoveError, NoopScoreReporter};

    fn ident(id: &str) -> Identity {
        Identity::new(id, id.to_uppercase())
    }

    async fn online<S: ScoreReporter>(core: &MatchmakingCore<S>, id: &str, conn: u64) -> OutboundReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        core.connect(ConnectionId::new(conn), tx).await;
        core.register(ident(id), ConnectionId::new(conn)).await;
        rx
    }

    fn drain(rx: &mut OutboundReceiver) -> Vec<MatchMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Outbound::Message {
                payload: Payload::Match(m),
                ..
            } = msg
            {
                out.push(m);
            }
        }
        out
    }

    fn matched_session(msgs: &[MatchMessage]) -> Option<(SessionId, Seats)> {
        msgs.iter().find_map(|m| match m {
            MatchMessage::Matched { session_id, roles, .. } => Some((*session_id, roles.clone())),
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_request_match_two_players_start_session() {
        let core = MatchmakingCore::new(CoreConfig::default(), NoopScoreReporter);
        let mut a = online(&core, "a", 1).await;
        let mut b = online(&core, "b", 2).await;

        core.request_match(ConnectionId::new(1)).await.unwrap();
        core.request_match(ConnectionId::new(2)).await.unwrap();

        let a_msgs = drain(&mut a);
        let b_msgs = drain(&mut b);
        let (sid, seats) = matched_session(&a_msgs).expect("a matched");
        assert_eq!(matched_session(&b_msgs).map(|m| m.0), Some(sid));
        assert_ne!(seats.x.id, seats.o.id);
        assert!(a_msgs.iter().any(|m| matches!(m, MatchMessage::RoleAssigned { .. })));
        assert!(b_msgs.iter().any(|m| matches!(m, MatchMessage::SessionStarted { .. })));

        let stats = core.stats().await;
        assert_eq!((stats.queued, stats.sessions), (0, 1));
    }

    #[tokio::test]
    async fn test_request_match_anonymous_rejected() {
        let core = MatchmakingCore::new(CoreConfig::default(), NoopScoreReporter);
        let (tx, mut rx) = mpsc::unbounded_channel();
        core.connect(ConnectionId::new(9), tx).await;

        let err = core.request_match(ConnectionId::new(9)).await.unwrap_err();

        assert!(matches!(err, MatchError::Anonymous));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [MatchMessage::QueuedStatus {
                status: QueueStatus::Error,
                ..
            }]
        ));
        assert_eq!(core.stats().await.queued, 0);
    }

    #[tokio::test]
    async fn test_handle_move_out_of_turn_reports_error_only() {
        let core = MatchmakingCore::new(CoreConfig::default(), NoopScoreReporter);
        let mut a = online(&core, "a", 1).await;
        let _b = online(&core, "b", 2).await;
        core.request_match(ConnectionId::new(1)).await.unwrap();
        core.request_match(ConnectionId::new(2)).await.unwrap();
        let (sid, seats) = matched_session(&drain(&mut a)).unwrap();
        let o_conn = if seats.o.id.as_str() == "a" { 1 } else { 2 };

        let err = core
            .handle_move(ConnectionId::new(o_conn), sid, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, MatchError::Move(MoveError::NotYourTurn)));
        let session = core.session(sid).await.unwrap();
        assert_eq!(session.board().occupied(), 0);
        assert!(drain(&mut a).is_empty(), "rejections are not broadcast");
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_move_win_reports_scores_and_tears_down() {
        let board = Arc::new(Leaderboard::new());
        let config = CoreConfig {
            teardown_grace: Duration::from_millis(50),
            ..CoreConfig::default()
        };
        let core = MatchmakingCore::new(config, Arc::clone(&board));
        let mut a = online(&core, "a", 1).await;
        let _b = online(&core, "b", 2).await;
        core.request_match(ConnectionId::new(1)).await.unwrap();
        core.request_match(ConnectionId::new(2)).await.unwrap();
        let (sid, seats) = matched_session(&drain(&mut a)).unwrap();
        let conn_of = |p: &PlayerId| ConnectionId::new(if p.as_str() == "a" { 1 } else { 2 });
        let (x, o) = (conn_of(&seats.x.id), conn_of(&seats.o.id));

        for (conn, cell) in [(x, 0), (o, 3), (x, 1), (o, 4)] {
            core.handle_move(conn, sid, cell).await.unwrap();
        }
        let last = core.handle_move(x, sid, 2).await.unwrap();
        assert_eq!(last.status, SessionStatus::Won(Role::X));

        tokio::time::sleep(Duration::from_millis(100)).await;

        let winner = board.get(&seats.x.id).await.unwrap();
        let loser = board.get(&seats.o.id).await.unwrap();
        assert_eq!((winner.wins, winner.total_points), (1, 10));
        assert_eq!((loser.losses, loser.total_points), (1, 0));
        assert!(core.session(sid).await.is_none(), "torn down after grace");
        assert_eq!(core.stats().await.identities, 0);
    }

    #[tokio::test]
    async fn test_request_match_for_offline_player_parks_intent() {
        let core = MatchmakingCore::new(CoreConfig::default(), NoopScoreReporter);
        let player = PlayerId::from("late");

        assert_eq!(core.request_match_for(&player).await, IntentOutcome::Pending);
        assert_eq!(core.request_match_for(&player).await, IntentOutcome::AlreadyPending);
        assert_eq!(core.stats().await.pending_intents, 1);

        let mut rx = online(&core, "late", 1).await;

        assert_eq!(core.queue_position(&player).await, Some(0));
        assert_eq!(core.stats().await.pending_intents, 0);
        assert!(drain(&mut rx).iter().any(|m| matches!(
            m,
            MatchMessage::QueuedStatus {
                status: QueueStatus::Waiting,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_teardown_session_twice_is_noop() {
        let core = MatchmakingCore::new(CoreConfig::default(), NoopScoreReporter);
        let mut a = online(&core, "a", 1).await;
        let _b = online(&core, "b", 2).await;
        core.request_match(ConnectionId::new(1)).await.unwrap();
        core.request_match(ConnectionId::new(2)).await.unwrap();
        let (sid, _) = matched_session(&drain(&mut a)).unwrap();

        assert!(core.teardown_session(sid).await);
        assert!(!core.teardown_session(sid).await);
        assert_eq!(core.stats().await.sessions, 0);
    }
}
