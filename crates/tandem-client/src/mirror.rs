//! The client's optimistic copy of its room's lifecycle.
//!
//! Local actions move the mirror immediately through [`Mirror::attempt`],
//! which hands back a [`Speculation`]: the undo value for that action. The
//! caller commits it when the server answers OK and rolls it back on any
//! failure. A speculation dropped without either is rolled back, so a
//! cancelled call never leaves the mirror stuck. Pushed server events go
//! through [`Mirror::apply_remote`] and are never undone.
//!
//! ```text
//!  Init ──SelfJoined──► AwaitingOpponent ──OpponentJoined──► RoomFilled
//!                                                              │    ▲
//!                        SelfReady / OpponentReady             │    │ reverts
//!                                                              ▼    │
//!            AwaitingOpponentReady / AwaitingSelfReady ──► AwaitingGameStart
//!                                                              │
//!                                                         GameStarted
//!                                                              ▼
//!                                        InGame ──OpponentLeft──► Recovery
//! ```

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tandem_protocol::{ClientId, EventKind, Roster, ServerEvent};

/// The client's view of its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MirrorState {
    /// Not in a room.
    #[default]
    Init,
    /// In a room that is not full yet.
    AwaitingOpponent,
    /// Full, nobody ready.
    RoomFilled,
    /// Full, everyone else ready, waiting on this client.
    AwaitingSelfReady,
    /// Full, this client ready, waiting on someone else.
    AwaitingOpponentReady,
    /// Everyone ready, waiting for `GameStarted`.
    AwaitingGameStart,
    InGame,
    /// Someone left mid-session.
    Recovery,
}

impl MirrorState {
    /// `true` for the states between joining and the session start.
    pub fn is_pre_game(self) -> bool {
        matches!(
            self,
            Self::AwaitingOpponent
                | Self::RoomFilled
                | Self::AwaitingSelfReady
                | Self::AwaitingOpponentReady
                | Self::AwaitingGameStart
        )
    }

    /// The state a local action leads to, or `None` if it may not be taken
    /// from here.
    pub fn after_local(self, event: LocalEvent) -> Option<Self> {
        use MirrorState::*;
        match (event, self) {
            (LocalEvent::SelfJoined, Init) => Some(AwaitingOpponent),
            (LocalEvent::SelfJoined, _) => None,

            (LocalEvent::SelfLeft, Init) => None,
            (LocalEvent::SelfLeft, _) => Some(Init),

            (LocalEvent::SelfReady, RoomFilled) => Some(AwaitingOpponentReady),
            (LocalEvent::SelfReady, AwaitingSelfReady) => Some(AwaitingGameStart),
            (LocalEvent::SelfReady, AwaitingOpponentReady | AwaitingGameStart) => Some(self),
            (LocalEvent::SelfReady, _) => None,

            (LocalEvent::SelfRevertedReady, AwaitingOpponentReady) => Some(RoomFilled),
            (LocalEvent::SelfRevertedReady, AwaitingGameStart) => Some(AwaitingSelfReady),
            (LocalEvent::SelfRevertedReady, RoomFilled | AwaitingSelfReady) => Some(self),
            (LocalEvent::SelfRevertedReady, _) => None,
        }
    }

    /// The state a pushed event leads to. Total: events that do not apply
    /// leave the state as it is.
    pub fn after_remote(self, event: &ServerEvent, me: &ClientId) -> Self {
        if self == Self::Init {
            return self;
        }
        match event.kind {
            EventKind::GameStarted => Self::InGame,
            EventKind::OpponentLeft => match self {
                Self::InGame | Self::Recovery => Self::Recovery,
                _ => Self::AwaitingOpponent,
            },
            EventKind::OpponentJoined
            | EventKind::OpponentReady
            | EventKind::OpponentRevertedReady => {
                if self.is_pre_game() {
                    Self::from_roster(&event.roster, me)
                } else {
                    self
                }
            }
        }
    }

    /// The pre-game state implied by a roster.
    pub fn from_roster(roster: &Roster, me: &ClientId) -> Self {
        if !roster.is_full() {
            return Self::AwaitingOpponent;
        }
        match (roster.is_ready(me), roster.others_ready(me)) {
            (false, false) => Self::RoomFilled,
            (false, true) => Self::AwaitingSelfReady,
            (true, false) => Self::AwaitingOpponentReady,
            (true, true) => Self::AwaitingGameStart,
        }
    }
}

impl fmt::Display for MirrorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A user action applied to the mirror before the server confirms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalEvent {
    SelfJoined,
    SelfLeft,
    SelfReady,
    SelfRevertedReady,
}

impl fmt::Display for LocalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Whether the event stream is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Connectivity {
    Connected,
    #[default]
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MirrorError {
    /// The action's precondition does not hold locally. Nothing was sent.
    #[error("{event} is not allowed in {state}")]
    Rejected { state: MirrorState, event: LocalEvent },

    /// Another speculative action is still waiting for its reply.
    #[error("another action is still pending")]
    SpeculationPending,
}

/// The undo value for one speculative action.
///
/// Hand it back to [`Mirror::commit`] or [`Mirror::rollback`]; until then
/// the mirror refuses further attempts. Dropping it rolls back.
#[must_use = "a speculation must be committed or rolled back"]
pub struct Speculation<'m> {
    mirror: &'m Mirror,
    event: LocalEvent,
    prior: MirrorState,
    applied: MirrorState,
    epoch: u64,
    settled: bool,
}

impl Speculation<'_> {
    pub fn event(&self) -> LocalEvent {
        self.event
    }

    /// Pushed events applied before the action. Pass it to
    /// [`Mirror::reconcile`] with the reply's roster.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The state before the action.
    pub fn prior(&self) -> MirrorState {
        self.prior
    }

    /// The state the action moved to.
    pub fn applied(&self) -> MirrorState {
        self.applied
    }
}

impl Drop for Speculation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.mirror.undo(self.event, self.prior);
        }
    }
}

impl fmt::Debug for Speculation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Speculation")
            .field("event", &self.event)
            .field("prior", &self.prior)
            .field("applied", &self.applied)
            .field("epoch", &self.epoch)
            .finish()
    }
}

type Observer = Box<dyn Fn(MirrorState, Connectivity) + Send + Sync>;

#[derive(Debug, Default)]
struct Inner {
    state: MirrorState,
    connectivity: Connectivity,
    pending: bool,
    /// Pushed events applied so far.
    epoch: u64,
}

/// The mirror for one client.
///
/// Shared between the caller's tasks and the reader task that feeds it
/// pushed events, so every method takes `&self`.
pub struct Mirror {
    me: ClientId,
    inner: Mutex<Inner>,
    observers: Mutex<Vec<Observer>>,
}

impl Mirror {
    pub fn new(me: ClientId) -> Self {
        Self {
            me,
            inner: Mutex::new(Inner::default()),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.me
    }

    pub fn state(&self) -> MirrorState {
        self.lock().state
    }

    pub fn connectivity(&self) -> Connectivity {
        self.lock().connectivity
    }

    /// `true` while a speculation is outstanding.
    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Registers a callback run after every state or connectivity change.
    ///
    /// Callbacks run on the task that made the change and must not call
    /// `subscribe` themselves.
    pub fn subscribe(&self, observer: impl Fn(MirrorState, Connectivity) + Send + Sync + 'static) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(observer));
    }

    /// Applies a local action now and returns its undo value.
    ///
    /// # Errors
    /// `SpeculationPending` if another action awaits its reply;
    /// `Rejected` if the action is not valid from the current state.
    pub fn attempt(&self, event: LocalEvent) -> Result<Speculation<'_>, MirrorError> {
        let speculation = {
            let mut inner = self.lock();
            if inner.pending {
                return Err(MirrorError::SpeculationPending);
            }
            let prior = inner.state;
            let applied = prior
                .after_local(event)
                .ok_or(MirrorError::Rejected { state: prior, event })?;
            inner.state = applied;
            inner.pending = true;
            Speculation {
                mirror: self,
                event,
                prior,
                applied,
                epoch: inner.epoch,
                settled: false,
            }
        };
        tracing::debug!(client_id = %self.me, %event, from = %speculation.prior, to = %speculation.applied, "speculative transition");
        self.notify();
        Ok(speculation)
    }

    /// Undoes a speculation, restoring exactly the state before it.
    pub fn rollback(&self, mut speculation: Speculation<'_>) {
        speculation.settled = true;
        self.undo(speculation.event, speculation.prior);
    }

    /// Keeps a speculation's effect. Events that arrived meanwhile stand.
    pub fn commit(&self, mut speculation: Speculation<'_>) {
        speculation.settled = true;
        self.lock().pending = false;
        tracing::trace!(client_id = %self.me, event = %speculation.event, "speculation committed");
    }

    fn undo(&self, event: LocalEvent, prior: MirrorState) {
        {
            let mut inner = self.lock();
            inner.state = prior;
            inner.pending = false;
        }
        tracing::debug!(client_id = %self.me, %event, to = %prior, "speculation rolled back");
        self.notify();
    }

    /// Applies a pushed event. Never rolled back.
    pub fn apply_remote(&self, event: &ServerEvent) -> MirrorState {
        let (before, after) = {
            let mut inner = self.lock();
            let before = inner.state;
            inner.state = before.after_remote(event, &self.me);
            inner.epoch += 1;
            (before, inner.state)
        };
        if before != after {
            tracing::debug!(client_id = %self.me, kind = %event.kind, from = %before, to = %after, "remote transition");
            self.notify();
        }
        after
    }

    /// Re-derives a pre-game state from the roster in a join or create
    /// reply.
    ///
    /// `epoch` is [`Speculation::epoch`] of the call that returned the
    /// roster. If a pushed event was applied since, its roster is newer
    /// and this one is ignored.
    pub fn reconcile(&self, roster: &Roster, epoch: u64) -> MirrorState {
        let (before, after) = {
            let mut inner = self.lock();
            let before = inner.state;
            if inner.epoch != epoch {
                tracing::debug!(client_id = %self.me, "reply roster superseded by pushed events");
            } else if before.is_pre_game() {
                inner.state = MirrorState::from_roster(roster, &self.me);
            }
            (before, inner.state)
        };
        if before != after {
            self.notify();
        }
        after
    }

    pub fn set_connectivity(&self, connectivity: Connectivity) {
        let changed = {
            let mut inner = self.lock();
            let changed = inner.connectivity != connectivity;
            inner.connectivity = connectivity;
            changed
        };
        if changed {
            tracing::info!(client_id = %self.me, ?connectivity, "connectivity changed");
            self.notify();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        let (state, connectivity) = {
            let inner = self.lock();
            (inner.state, inner.connectivity)
        };
        let observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer(state, connectivity);
        }
    }
}

impl fmt::Debug for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Mirror")
            .field("me", &self.me)
            .field("state", &inner.state)
            .field("connectivity", &inner.connectivity)
            .field("pending", &inner.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tandem_protocol::RoomId;

    use super::*;
    use MirrorState::*;

    const ALL: [MirrorState; 8] = [
        Init,
        AwaitingOpponent,
        RoomFilled,
        AwaitingSelfReady,
        AwaitingOpponentReady,
        AwaitingGameStart,
        InGame,
        Recovery,
    ];

    fn id(raw: &str) -> ClientId {
        ClientId::parse(raw).unwrap()
    }

    fn roster(members: &[&str], ready: &[&str], required: usize) -> Roster {
        Roster {
            members: members.iter().map(|m| id(m)).collect(),
            ready: ready.iter().map(|m| id(m)).collect(),
            required,
        }
    }

    fn event(kind: EventKind, roster: Roster) -> ServerEvent {
        ServerEvent {
            kind,
            room_id: RoomId::parse("ABCDEF"),
            from: id("BOB"),
            roster,
        }
    }

    fn mirror_in(state: MirrorState) -> Mirror {
        let mirror = Mirror::new(id("ALICE"));
        mirror.lock().state = state;
        mirror
    }

    // =====================================================================
    // Local transitions
    // =====================================================================

    #[test]
    fn test_self_joined_only_from_init() {
        for state in ALL {
            let expected = (state == Init).then_some(AwaitingOpponent);
            assert_eq!(state.after_local(LocalEvent::SelfJoined), expected, "from {state}");
        }
    }

    #[test]
    fn test_self_left_from_anywhere_but_init() {
        for state in ALL {
            let expected = (state != Init).then_some(Init);
            assert_eq!(state.after_local(LocalEvent::SelfLeft), expected, "from {state}");
        }
    }

    #[test]
    fn test_self_ready_transitions() {
        assert_eq!(RoomFilled.after_local(LocalEvent::SelfReady), Some(AwaitingOpponentReady));
        assert_eq!(AwaitingSelfReady.after_local(LocalEvent::SelfReady), Some(AwaitingGameStart));
        assert_eq!(
            AwaitingOpponentReady.after_local(LocalEvent::SelfReady),
            Some(AwaitingOpponentReady)
        );
        assert_eq!(AwaitingGameStart.after_local(LocalEvent::SelfReady), Some(AwaitingGameStart));
        for state in [Init, AwaitingOpponent, InGame, Recovery] {
            assert_eq!(state.after_local(LocalEvent::SelfReady), None, "from {state}");
        }
    }

    #[test]
    fn test_self_reverted_ready_transitions() {
        let revert = LocalEvent::SelfRevertedReady;
        assert_eq!(AwaitingOpponentReady.after_local(revert), Some(RoomFilled));
        assert_eq!(AwaitingGameStart.after_local(revert), Some(AwaitingSelfReady));
        assert_eq!(RoomFilled.after_local(revert), Some(RoomFilled));
        assert_eq!(AwaitingSelfReady.after_local(revert), Some(AwaitingSelfReady));
        for state in [Init, AwaitingOpponent, InGame, Recovery] {
            assert_eq!(state.after_local(revert), None, "from {state}");
        }
    }

    // =====================================================================
    // Remote transitions
    // =====================================================================

    #[test]
    fn test_init_ignores_every_event() {
        let me = id("ALICE");
        for kind in [
            EventKind::OpponentJoined,
            EventKind::OpponentReady,
            EventKind::OpponentRevertedReady,
            EventKind::OpponentLeft,
            EventKind::GameStarted,
        ] {
            let ev = event(kind, roster(&["ALICE", "BOB"], &[], 2));
            assert_eq!(Init.after_remote(&ev, &me), Init, "{kind}");
        }
    }

    #[test]
    fn test_opponent_joined_fills_room() {
        let me = id("ALICE");
        let ev = event(EventKind::OpponentJoined, roster(&["ALICE", "BOB"], &[], 2));
        assert_eq!(AwaitingOpponent.after_remote(&ev, &me), RoomFilled);
    }

    #[test]
    fn test_opponent_joined_keeps_own_readiness() {
        let me = id("ALICE");
        let ev = event(EventKind::OpponentJoined, roster(&["ALICE", "BOB"], &["ALICE"], 2));
        assert_eq!(AwaitingOpponent.after_remote(&ev, &me), AwaitingOpponentReady);
    }

    #[test]
    fn test_opponent_joined_partial_squad_still_awaiting() {
        let me = id("ALICE");
        let ev = event(EventKind::OpponentJoined, roster(&["ALICE", "BOB"], &[], 4));
        assert_eq!(AwaitingOpponent.after_remote(&ev, &me), AwaitingOpponent);
    }

    #[test]
    fn test_opponent_ready_and_revert() {
        let me = id("ALICE");
        let ready = event(EventKind::OpponentReady, roster(&["ALICE", "BOB"], &["BOB"], 2));
        assert_eq!(RoomFilled.after_remote(&ready, &me), AwaitingSelfReady);

        let both = event(EventKind::OpponentReady, roster(&["ALICE", "BOB"], &["ALICE", "BOB"], 2));
        assert_eq!(AwaitingOpponentReady.after_remote(&both, &me), AwaitingGameStart);

        let reverted = event(EventKind::OpponentRevertedReady, roster(&["ALICE", "BOB"], &[], 2));
        assert_eq!(AwaitingSelfReady.after_remote(&reverted, &me), RoomFilled);
    }

    #[test]
    fn test_game_started_from_pre_game() {
        let me = id("ALICE");
        let ev = event(EventKind::GameStarted, roster(&["ALICE", "BOB"], &["ALICE", "BOB"], 2));
        assert_eq!(AwaitingGameStart.after_remote(&ev, &me), InGame);
        assert_eq!(AwaitingSelfReady.after_remote(&ev, &me), InGame);
    }

    #[test]
    fn test_opponent_left_before_game_returns_to_matchmaking() {
        let me = id("ALICE");
        let ev = event(EventKind::OpponentLeft, roster(&["ALICE"], &[], 2));
        for state in [RoomFilled, AwaitingSelfReady, AwaitingOpponentReady, AwaitingGameStart] {
            assert_eq!(state.after_remote(&ev, &me), AwaitingOpponent, "from {state}");
        }
    }

    #[test]
    fn test_opponent_left_in_game_enters_recovery() {
        let me = id("ALICE");
        let ev = event(EventKind::OpponentLeft, roster(&["ALICE"], &["ALICE"], 2));
        assert_eq!(InGame.after_remote(&ev, &me), Recovery);
        assert_eq!(Recovery.after_remote(&ev, &me), Recovery);
    }

    #[test]
    fn test_readiness_events_ignored_in_game() {
        let me = id("ALICE");
        let ev = event(EventKind::OpponentReady, roster(&["ALICE", "BOB"], &["BOB"], 2));
        assert_eq!(InGame.after_remote(&ev, &me), InGame);
        assert_eq!(Recovery.after_remote(&ev, &me), Recovery);
    }

    // =====================================================================
    // Speculation
    // =====================================================================

    #[test]
    fn test_rollback_restores_exact_prior_state() {
        let cases = [
            (Init, LocalEvent::SelfJoined),
            (RoomFilled, LocalEvent::SelfReady),
            (AwaitingSelfReady, LocalEvent::SelfReady),
            (AwaitingGameStart, LocalEvent::SelfRevertedReady),
            (InGame, LocalEvent::SelfLeft),
        ];
        for (start, local) in cases {
            let mirror = mirror_in(start);
            let speculation = mirror.attempt(local).unwrap();
            assert_eq!(speculation.prior(), start);
            assert_eq!(mirror.state(), speculation.applied());

            mirror.rollback(speculation);

            assert_eq!(mirror.state(), start, "{local} from {start}");
            assert!(!mirror.is_pending());
        }
    }

    #[test]
    fn test_rejected_reply_rolls_back_ready() {
        // Readying up with no room on the server: the call comes back
        // NO_ROOM_JOINED_YET and the mirror returns to where it was.
        let mirror = mirror_in(RoomFilled);
        let speculation = mirror.attempt(LocalEvent::SelfReady).unwrap();
        assert_eq!(mirror.state(), AwaitingOpponentReady);

        mirror.rollback(speculation);

        assert_eq!(mirror.state(), RoomFilled);
    }

    #[test]
    fn test_invalid_precondition_fails_fast() {
        let mirror = mirror_in(InGame);

        let err = mirror.attempt(LocalEvent::SelfReady).unwrap_err();

        assert_eq!(
            err,
            MirrorError::Rejected {
                state: InGame,
                event: LocalEvent::SelfReady
            }
        );
        assert_eq!(mirror.state(), InGame);
        assert!(!mirror.is_pending());
    }

    #[test]
    fn test_second_attempt_while_pending_rejected() {
        let mirror = mirror_in(RoomFilled);
        let first = mirror.attempt(LocalEvent::SelfReady).unwrap();

        let err = mirror.attempt(LocalEvent::SelfRevertedReady).unwrap_err();
        assert_eq!(err, MirrorError::SpeculationPending);

        mirror.commit(first);
        assert!(mirror.attempt(LocalEvent::SelfRevertedReady).is_ok());
    }

    #[test]
    fn test_dropped_speculation_rolls_back() {
        let mirror = mirror_in(Init);
        {
            let _speculation = mirror.attempt(LocalEvent::SelfJoined).unwrap();
            assert_eq!(mirror.state(), AwaitingOpponent);
        }

        assert_eq!(mirror.state(), Init);
        assert!(!mirror.is_pending());
        let next = mirror.attempt(LocalEvent::SelfJoined).unwrap();
        mirror.commit(next);
        assert_eq!(mirror.state(), AwaitingOpponent);
    }

    #[tokio::test]
    async fn test_cancelled_call_releases_speculation() {
        let mirror = mirror_in(RoomFilled);
        let call = async {
            let speculation = mirror.attempt(LocalEvent::SelfReady).unwrap();
            std::future::pending::<()>().await;
            mirror.commit(speculation);
        };

        let cancelled = tokio::time::timeout(std::time::Duration::from_millis(10), call).await;

        assert!(cancelled.is_err());
        assert_eq!(mirror.state(), RoomFilled);
        assert!(mirror.attempt(LocalEvent::SelfReady).is_ok());
    }

    #[test]
    fn test_commit_keeps_remote_progress() {
        let mirror = mirror_in(AwaitingSelfReady);
        let speculation = mirror.attempt(LocalEvent::SelfReady).unwrap();
        let started = event(EventKind::GameStarted, roster(&["ALICE", "BOB"], &["ALICE", "BOB"], 2));
        mirror.apply_remote(&started);

        mirror.commit(speculation);

        assert_eq!(mirror.state(), InGame);
    }

    #[test]
    fn test_reconcile_after_join() {
        let mirror = mirror_in(Init);
        let speculation = mirror.attempt(LocalEvent::SelfJoined).unwrap();
        let epoch = speculation.epoch();
        mirror.commit(speculation);

        let state = mirror.reconcile(&roster(&["BOB", "ALICE"], &["BOB"], 2), epoch);

        assert_eq!(state, AwaitingSelfReady);
    }

    #[test]
    fn test_reconcile_ignored_outside_pre_game() {
        let mirror = mirror_in(Init);
        assert_eq!(mirror.reconcile(&roster(&["ALICE", "BOB"], &[], 2), 0), Init);
    }

    // An event pushed before the join reply was read carries a newer roster
    // than the reply; the reply must not undo it.
    #[test]
    fn test_reconcile_skips_roster_older_than_pushed_event() {
        let mirror = mirror_in(Init);
        let speculation = mirror.attempt(LocalEvent::SelfJoined).unwrap();
        let epoch = speculation.epoch();
        let ready = event(EventKind::OpponentReady, roster(&["ALICE", "BOB"], &["BOB"], 2));
        assert_eq!(mirror.apply_remote(&ready), AwaitingSelfReady);
        mirror.commit(speculation);

        let state = mirror.reconcile(&roster(&["ALICE", "BOB"], &[], 2), epoch);

        assert_eq!(state, AwaitingSelfReady);
    }

    // =====================================================================
    // Observers and connectivity
    // =====================================================================

    #[test]
    fn test_observers_see_every_change() {
        let mirror = Mirror::new(id("ALICE"));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        mirror.subscribe(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        mirror.set_connectivity(Connectivity::Connected);
        let speculation = mirror.attempt(LocalEvent::SelfJoined).unwrap();
        mirror.rollback(speculation);
        // No change, no call.
        mirror.set_connectivity(Connectivity::Connected);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_connectivity_independent_of_room_state() {
        let mirror = mirror_in(InGame);
        mirror.set_connectivity(Connectivity::Connected);
        mirror.set_connectivity(Connectivity::Disconnected);

        assert_eq!(mirror.connectivity(), Connectivity::Disconnected);
        assert_eq!(mirror.state(), InGame);
    }
}
