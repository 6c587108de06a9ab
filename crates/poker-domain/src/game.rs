use std::fmt;

use serde::{Deserialize, Serialize};

use crate::money::Chips;

/// Stage of a hand as mirrored by one agent. Declaration order is the
/// progression order within a hand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Waiting,
    Preflop,
    Flop,
    Turn,
    River,
    HandEnded,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Preflop => "preflop",
            Self::Flop => "flop",
            Self::Turn => "turn",
            Self::River => "river",
            Self::HandEnded => "hand_ended",
        }
    }

    /// Community card count the phase requires, if it pins one.
    #[must_use]
    pub fn board_len(self) -> Option<usize> {
        match self {
            Self::Waiting | Self::Preflop => Some(0),
            Self::Flop => Some(3),
            Self::Turn => Some(4),
            Self::River => Some(5),
            Self::HandEnded => None,
        }
    }

    /// Non-decreasing within a hand; `HandEnded` may wrap to `Preflop`
    /// (next hand) or `Waiting` (session over).
    #[must_use]
    pub fn may_advance_to(self, next: Self) -> bool {
        next >= self || (self == Self::HandEnded && matches!(next, Self::Preflop | Self::Waiting))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Card {
    Code(String),
    Parts { rank: String, suit: String },
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => f.write_str(code),
            Self::Parts { rank, suit } => write!(f, "{rank}{suit}"),
        }
    }
}

/// Roster entry; best effort and possibly stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSeat {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub chips: Chips,
}
