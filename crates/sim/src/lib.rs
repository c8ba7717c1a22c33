//! Flagfall Match Core
//!
//! This crate contains the capture-the-flag match model: flags, player
//! sessions, the per-arena match state machine, team balancing and the
//! winner-determination policy.
//!
//! # Architecture Constraints
//!
//! The Match Core MUST NOT:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time
//! - Use ambient/unseeded randomness (callers pass an `Rng`)
//! - Schedule timers (the orchestrator owns every timer)
//!
//! Every operation that can be refused in the current state returns a
//! `Result`/`bool` instead of panicking. Callers translate refusals into
//! player feedback.

#![deny(unsafe_code)]

pub mod flag;
pub mod match_session;
pub mod outcome;
pub mod player;
pub mod progression;
pub mod teams;

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

pub use flag::{Flag, FlagState};
pub use match_session::{
    ActionRejected, CaptureOutcome, ClockStep, CountdownStep, DeathOutcome, Detached, EndReason,
    KillCredit, MatchLimits, MatchResult, MatchRules, MatchSession, MatchState, PlayerSummary,
};
pub use outcome::determine_winner;
pub use player::{ConnectionState, PlayerSession, SessionStats};
pub use progression::{Progression, ProgressionRules};

// ============================================================================
// Type Aliases
// ============================================================================

/// A single scheduler step. The orchestrator decides how many ticks make a second.
pub type Tick = u64;

/// Stable external identity of a participant.
pub type ActorId = u64;

/// Arena identifier as used by the arena configuration provider.
pub type ArenaId = String;

// ============================================================================
// Team
// ============================================================================

/// One of the two sides of a match.
///
/// The declaration order is the fixed team ordering used for tie-breaks
/// during team balancing (Red before Blue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    /// Both teams in fixed order.
    pub const ALL: [Team; 2] = [Team::Red, Team::Blue];

    pub fn opponent(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Team::Red => "red",
            Team::Blue => "blue",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per team, indexable by [`Team`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMap<T> {
    pub red: T,
    pub blue: T,
}

impl<T> TeamMap<T> {
    pub fn new(red: T, blue: T) -> Self {
        Self { red, blue }
    }

    /// Build a map by evaluating `f` for each team in fixed order.
    pub fn from_fn(mut f: impl FnMut(Team) -> T) -> Self {
        Self {
            red: f(Team::Red),
            blue: f(Team::Blue),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Team, &T)> {
        [(Team::Red, &self.red), (Team::Blue, &self.blue)].into_iter()
    }
}

impl<T> Index<Team> for TeamMap<T> {
    type Output = T;

    fn index(&self, team: Team) -> &T {
        match team {
            Team::Red => &self.red,
            Team::Blue => &self.blue,
        }
    }
}

impl<T> IndexMut<Team> for TeamMap<T> {
    fn index_mut(&mut self, team: Team) -> &mut T {
        match team {
            Team::Red => &mut self.red,
            Team::Blue => &mut self.blue,
        }
    }
}

// ============================================================================
// Position
// ============================================================================

/// A point in arena space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        self.distance_sq(other).sqrt()
    }

    fn distance_sq(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Inclusive radius check. Non-finite coordinates are never within range.
    pub fn within(&self, other: &Position, radius: f64) -> bool {
        let d = self.distance_sq(other);
        d.is_finite() && d <= radius * radius
    }
}

// ============================================================================
// Tests
// ============================================================================
