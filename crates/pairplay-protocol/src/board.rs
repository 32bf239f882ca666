//! Board and outcome types shared by the match state machine and the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::PlayerId;

/// Number of cells on the board (3×3).
pub const CELL_COUNT: usize = 9;

/// A session-scoped seat. `X` is the first seat and always moves first.
///
/// Roles are assigned at pairing time by a coin flip, so they say nothing
/// about which identity queued first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[doc(alias = "RoleA")]
    X,
    #[doc(alias = "RoleB")]
    O,
}

impl Role {
    /// The seat that takes the opening move.
    pub const STARTING: Role = Role::X;

    /// The other seat.
    pub fn opponent(self) -> Role {
        match self {
            Role::X => Role::O,
            Role::O => Role::X,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::X => write!(f, "X"),
            Role::O => write!(f, "O"),
        }
    }
}

/// A 3×3 board stored row-major. `None` is an empty cell.
///
/// Serializes as a flat 9-element array: `[null, "X", "O", ...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board([Option<Role>; CELL_COUNT]);

impl Board {
    /// An empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a board from explicit cells.
    pub fn from_cells(cells: [Option<Role>; CELL_COUNT]) -> Self {
        Self(cells)
    }

    /// Returns the occupant of `index`, or `None` if the cell is empty
    /// or the index is off the board.
    pub fn get(&self, index: usize) -> Option<Role> {
        self.0.get(index).copied().flatten()
    }

    /// Returns `true` if `index` is on the board and unoccupied.
    pub fn is_open(&self, index: usize) -> bool {
        index < CELL_COUNT && self.0[index].is_none()
    }

    /// Writes `role` into an open cell. Returns `false` (and leaves the
    /// board untouched) if the cell is occupied or off the board; cells
    /// are write-once.
    pub fn place(&mut self, index: usize, role: Role) -> bool {
        if !self.is_open(index) {
            return false;
        }
        self.0[index] = Some(role);
        true
    }

    /// Returns `true` when every cell is occupied.
    pub fn is_full(&self) -> bool {
        self.0.iter().all(Option::is_some)
    }

    /// Number of occupied cells.
    pub fn occupied(&self) -> usize {
        self.0.iter().filter(|c| c.is_some()).count()
    }

    /// The raw cells, row-major.
    pub fn cells(&self) -> &[Option<Role>; CELL_COUNT] {
        &self.0
    }
}

/// Lifecycle status of a game session.
///
/// ```text
/// Ongoing ──→ Draw
///    │
///    └────→ Won(X) | Won(O)
/// ```
///
/// Every status other than `Ongoing` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Ongoing,
    Draw,
    Won(Role),
}

impl SessionStatus {
    /// Returns `true` for `Draw` and `Won(_)`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Ongoing)
    }
}

/// How a finished session ended, as reported in `SessionEnded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Win {
        role: Role,
        winner: PlayerId,
        loser: PlayerId,
    },
    Draw,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_serializes_as_flat_array_with_nulls() {
        let mut board = Board::new();
        board.place(0, Role::X);
        board.place(4, Role::O);

        let json = serde_json::to_value(board).unwrap();

        assert_eq!(
            json,
            serde_json::json!(["X", null, null, null, "O", null, null, null, null])
        );
    }

    #[test]
    fn test_board_place_rejects_occupied_and_out_of_range() {
        let mut board = Board::new();
        assert!(board.place(3, Role::X));

        assert!(!board.place(3, Role::O), "cells are write-once");
        assert!(!board.place(9, Role::O));
        assert_eq!(board.get(3), Some(Role::X));
        assert_eq!(board.occupied(), 1);
    }

    #[test]
    fn test_board_get_off_board_is_none() {
        assert_eq!(Board::new().get(42), None);
    }

    #[test]
    fn test_board_is_full() {
        let mut board = Board::new();
        for i in 0..CELL_COUNT {
            assert!(!board.is_full());
            board.place(i, if i % 2 == 0 { Role::X } else { Role::O });
        }
        assert!(board.is_full());
    }

    #[test]
    fn test_role_opponent_and_starting_seat() {
        assert_eq!(Role::X.opponent(), Role::O);
        assert_eq!(Role::O.opponent(), Role::X);
        assert_eq!(Role::STARTING, Role::X);
    }

    #[test]
    fn test_session_status_terminal_states() {
        assert!(!SessionStatus::Ongoing.is_terminal());
        assert!(SessionStatus::Draw.is_terminal());
        assert!(SessionStatus::Won(Role::O).is_terminal());
    }

    #[test]
    fn test_outcome_json_is_tagged_by_result() {
        let outcome = Outcome::Win {
            role: Role::X,
            winner: PlayerId::from("alice"),
            loser: PlayerId::from("bob"),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "win");
        assert_eq!(json["winner"], "alice");

        let json = serde_json::to_value(Outcome::Draw).unwrap();
        assert_eq!(json, serde_json::json!({"result": "draw"}));
    }
}
