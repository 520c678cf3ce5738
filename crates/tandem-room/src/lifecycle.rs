//! The room lifecycle as a pure function.
//!
//! [`transition`] looks at a [`RoomView`] and an event and decides what
//! should happen, without doing any of it. The result is either a
//! [`Rejection`] (nothing changes) or a [`Transition`]: the next state, the
//! membership [`Change`]s to commit, and the [`Effect`]s the room actor
//! performs once the commit is done. Guards are evaluated before anything
//! is committed, so a rejected event never leaves a half-applied room.

use tandem_protocol::{ClientId, EventKind, ResponseStatus, Roster};

use crate::RoomState;
use crate::state::derive;

/// Something a member did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Join(ClientId),
    Leave(ClientId),
    SetReady(ClientId, bool),
}

impl RoomEvent {
    /// The member who caused the event.
    pub fn client(&self) -> &ClientId {
        match self {
            Self::Join(c) | Self::Leave(c) | Self::SetReady(c, _) => c,
        }
    }
}

/// Why the lifecycle refused an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("room is full")]
    RoomFull,
    #[error("a session is in progress")]
    SessionInProgress,
    #[error("already a member of this room")]
    AlreadyMember,
    #[error("not a member of this room")]
    NotMember,
    #[error("no session has started")]
    NoSession,
}

impl Rejection {
    /// The status a unary call reports for this rejection.
    pub fn status(self) -> ResponseStatus {
        match self {
            Self::RoomFull => ResponseStatus::RoomFull,
            Self::SessionInProgress => ResponseStatus::SessionInProgress,
            Self::AlreadyMember => ResponseStatus::AlreadyInRoom,
            Self::NotMember => ResponseStatus::NoRoomJoinedYet,
            Self::NoSession => ResponseStatus::SessionNotStarted,
        }
    }
}

/// Who receives a notification, resolved against membership after commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    /// Every member except this one.
    Others(ClientId),
    All,
}

/// A membership mutation to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Admit(ClientId),
    Remove(ClientId),
    MarkReady(ClientId, bool),
    ClearReadiness,
}

/// Work for the room actor after the commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Notify { to: Recipients, kind: EventKind },
    StartSession,
    ResetSession,
}

/// The outcome of an accepted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: RoomState,
    pub changes: Vec<Change>,
    pub effects: Vec<Effect>,
}

impl Transition {
    /// Accepted, but nothing to do.
    pub fn unchanged(state: RoomState) -> Self {
        Self {
            state,
            changes: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.changes.is_empty() && self.effects.is_empty()
    }
}

/// One member's place in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub client_id: ClientId,
    pub ready: bool,
}

/// The part of a room the lifecycle reasons about: state, seats in join
/// order, and the member count that fills the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomView {
    state: RoomState,
    required: usize,
    seats: Vec<Seat>,
}

impl RoomView {
    pub fn new(required: usize) -> Self {
        Self {
            state: RoomState::AwaitingPlayers,
            required,
            seats: Vec::with_capacity(required),
        }
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn seat(&self, client: &ClientId) -> Option<&Seat> {
        self.seats.iter().find(|s| &s.client_id == client)
    }

    pub fn is_member(&self, client: &ClientId) -> bool {
        self.seat(client).is_some()
    }

    pub fn ready_count(&self) -> usize {
        self.seats.iter().filter(|s| s.ready).count()
    }

    /// The state [`derive`] computes from the current counts.
    pub fn derived_state(&self) -> RoomState {
        derive(
            self.len(),
            self.ready_count(),
            self.required,
            self.state.in_session(),
        )
    }

    pub fn roster(&self) -> Roster {
        Roster {
            members: self.seats.iter().map(|s| s.client_id.clone()).collect(),
            ready: self
                .seats
                .iter()
                .filter(|s| s.ready)
                .map(|s| s.client_id.clone())
                .collect(),
            required: self.required,
        }
    }

    /// Evaluates `event` and commits it if accepted. Returns the effects the
    /// caller must perform.
    pub fn apply(&mut self, event: &RoomEvent) -> Result<Vec<Effect>, Rejection> {
        let transition = transition(self, event)?;
        Ok(self.commit(transition))
    }

    fn commit(&mut self, transition: Transition) -> Vec<Effect> {
        for change in transition.changes {
            match change {
                Change::Admit(client_id) => self.seats.push(Seat {
                    client_id,
                    ready: false,
                }),
                Change::Remove(client_id) => {
                    self.seats.retain(|s| s.client_id != client_id);
                }
                Change::MarkReady(client_id, ready) => {
                    if let Some(seat) =
                        self.seats.iter_mut().find(|s| s.client_id == client_id)
                    {
                        seat.ready = ready;
                    }
                }
                Change::ClearReadiness => {
                    for seat in &mut self.seats {
                        seat.ready = false;
                    }
                }
            }
        }
        self.state = transition.state;
        transition.effects
    }
}

/// Decides what `event` does to `view`.
///
/// # Errors
/// Returns the [`Rejection`] for a failed guard. The view is untouched
/// either way; use [`RoomView::apply`] to commit.
pub fn transition(view: &RoomView, event: &RoomEvent) -> Result<Transition, Rejection> {
    match event {
        RoomEvent::Join(client) => join(view, client),
        RoomEvent::Leave(client) => leave(view, client),
        RoomEvent::SetReady(client, ready) => set_ready(view, client, *ready),
    }
}

fn others(client: &ClientId, kind: EventKind) -> Effect {
    Effect::Notify {
        to: Recipients::Others(client.clone()),
        kind,
    }
}

fn join(view: &RoomView, client: &ClientId) -> Result<Transition, Rejection> {
    if view.is_member(client) {
        return Err(Rejection::AlreadyMember);
    }
    if view.state.in_session() {
        return Err(Rejection::SessionInProgress);
    }
    if view.len() >= view.required {
        return Err(Rejection::RoomFull);
    }

    let state = if view.len() + 1 >= view.required {
        RoomState::AwaitingReady
    } else {
        RoomState::AwaitingPlayers
    };
    Ok(Transition {
        state,
        changes: vec![Change::Admit(client.clone())],
        effects: vec![others(client, EventKind::OpponentJoined)],
    })
}

fn set_ready(view: &RoomView, client: &ClientId, ready: bool) -> Result<Transition, Rejection> {
    let seat = view.seat(client).ok_or(Rejection::NotMember)?;
    if view.state.in_session() {
        return Err(Rejection::SessionInProgress);
    }
    if seat.ready == ready {
        return Ok(Transition::unchanged(view.state));
    }

    let changes = vec![Change::MarkReady(client.clone(), ready)];
    if !ready {
        return Ok(Transition {
            state: view.state,
            changes,
            effects: vec![others(client, EventKind::OpponentRevertedReady)],
        });
    }

    let mut effects = vec![others(client, EventKind::OpponentReady)];
    let all_ready = view.len() == view.required && view.ready_count() + 1 == view.required;
    let state = if all_ready {
        effects.push(Effect::StartSession);
        effects.push(Effect::Notify {
            to: Recipients::All,
            kind: EventKind::GameStarted,
        });
        RoomState::InGame
    } else {
        view.state
    };
    Ok(Transition {
        state,
        changes,
        effects,
    })
}

fn leave(view: &RoomView, client: &ClientId) -> Result<Transition, Rejection> {
    if !view.is_member(client) {
        return Err(Rejection::NotMember);
    }

    let remaining = view.len() - 1;
    let mut changes = vec![Change::Remove(client.clone())];
    let mut effects = vec![others(client, EventKind::OpponentLeft)];

    let state = if view.state.in_session() {
        if remaining == 0 {
            effects.push(Effect::ResetSession);
            RoomState::AwaitingPlayers
        } else {
            RoomState::Recovery
        }
    } else {
        changes.push(Change::ClearReadiness);
        RoomState::AwaitingPlayers
    };
    Ok(Transition {
        state,
        changes,
        effects,
    })
}
