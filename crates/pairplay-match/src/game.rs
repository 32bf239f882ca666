//! The per-match state machine.
//!
//! A [`GameSession`] owns one board and validates every move against it.
//! It refers to players by identity only; reaching their connections is
//! the gateway's job.

use std::time::Instant;

use pairplay_protocol::{
    Board, CELL_COUNT, Identity, Outcome, PlayerId, Role, Seats, SessionId, SessionStatus,
};

use crate::MoveError;

/// The eight winning lines: rows, columns, diagonals.
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Returns the role holding a complete line, if any.
pub fn winning_role(board: &Board) -> Option<Role> {
    LINES.iter().find_map(|[a, b, c]| match board.get(*a) {
        Some(role) if board.get(*b) == Some(role) && board.get(*c) == Some(role) => Some(role),
        _ => None,
    })
}

/// What an accepted move did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub session_id: SessionId,
    pub role: Role,
    pub cell_index: u32,
    pub board: Board,
    /// Status after the move. Terminal statuses end the session.
    pub status: SessionStatus,
}

/// One two-player match.
///
/// ```text
/// Ongoing ──(line)──→ Won(role)
///    └────(full)───→ Draw
/// ```
#[derive(Debug, Clone)]
pub struct GameSession {
    id: SessionId,
    seats: Seats,
    board: Board,
    turn: Role,
    status: SessionStatus,
    created_at: Instant,
}

impl GameSession {
    pub fn new(id: SessionId, seats: Seats) -> Self {
        Self {
            id,
            seats,
            board: Board::new(),
            turn: Role::STARTING,
            status: SessionStatus::Ongoing,
            created_at: Instant::now(),
        }
    }

    /// Validates and applies a move by `player` on `cell_index`.
    ///
    /// Checks run in a fixed order: participant, still ongoing, turn,
    /// cell. On error nothing changes.
    pub fn apply_move(&mut self, player: &PlayerId, cell_index: u32) -> Result<MoveOutcome, MoveError> {
        let role = self.seats.role_of(player).ok_or(MoveError::NotParticipant)?;
        if self.status.is_terminal() {
            return Err(MoveError::SessionEnded);
        }
        if role != self.turn {
            return Err(MoveError::NotYourTurn);
        }
        let index = usize::try_from(cell_index).map_err(|_| MoveError::InvalidCell(cell_index))?;
        if index >= CELL_COUNT || !self.board.place(index, role) {
            return Err(MoveError::InvalidCell(cell_index));
        }

        if let Some(winner) = winning_role(&self.board) {
            self.status = SessionStatus::Won(winner);
        } else if self.board.is_full() {
            self.status = SessionStatus::Draw;
        } else {
            self.turn = role.opponent();
        }

        Ok(MoveOutcome {
            session_id: self.id,
            role,
            cell_index,
            board: self.board,
            status: self.status,
        })
    }

    /// The final result, once the session is terminal.
    pub fn outcome(&self) -> Option<Outcome> {
        match self.status {
            SessionStatus::Ongoing => None,
            SessionStatus::Draw => Some(Outcome::Draw),
            SessionStatus::Won(role) => Some(Outcome::Win {
                role,
                winner: self.seats.get(role).id.clone(),
                loser: self.seats.get(role.opponent()).id.clone(),
            }),
        }
    }

    pub fn is_participant(&self, player: &PlayerId) -> bool {
        self.seats.role_of(player).is_some()
    }

    /// The other participant.
    pub fn opponent_of(&self, player: &PlayerId) -> Option<&Identity> {
        let role = self.seats.role_of(player)?;
        Some(self.seats.get(role.opponent()))
    }

    pub fn participants(&self) -> [&Identity; 2] {
        [&self.seats.x, &self.seats.o]
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn seats(&self) -> &Seats {
        &self.seats
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> Role {
        self.turn
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}
