//! Flag state machine.
//!
//! One flag exists per team per match. A flag is always in exactly one of
//! three states; the carrier is referenced by [`ActorId`] and the carrying
//! [`PlayerSession`](crate::PlayerSession) mirrors it with the flag's team.
//! The owning [`MatchSession`](crate::MatchSession) keeps both sides in sync.

use crate::{ActorId, Position, Team};

/// Where a flag currently is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlagState {
    /// Standing on its base.
    AtBase,
    /// Held by exactly one player.
    Carried { carrier: ActorId },
    /// Lying where its last carrier dropped it.
    Dropped { at: Position },
}

/// A team's flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Flag {
    team: Team,
    base: Position,
    state: FlagState,
    /// Where the world representation currently stands. `None` while carried
    /// or before the flag is first placed.
    marker: Option<Position>,
}

impl Flag {
    /// Create a flag for `team` with an immutable base position.
    ///
    /// The flag starts at base but without a world marker; call
    /// [`Flag::initialize_at_base`] to place it.
    pub fn new(team: Team, base: Position) -> Self {
        Self {
            team,
            base,
            state: FlagState::AtBase,
            marker: None,
        }
    }

    pub fn team(&self) -> Team {
        self.team
    }

    pub fn base(&self) -> Position {
        self.base
    }

    pub fn state(&self) -> FlagState {
        self.state
    }

    pub fn marker(&self) -> Option<Position> {
        self.marker
    }

    pub fn carrier(&self) -> Option<ActorId> {
        match self.state {
            FlagState::Carried { carrier } => Some(carrier),
            FlagState::AtBase | FlagState::Dropped { .. } => None,
        }
    }

    pub fn is_at_base(&self) -> bool {
        matches!(self.state, FlagState::AtBase)
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self.state, FlagState::Dropped { .. })
    }

    /// Place the world marker at base and reset to `AtBase`.
    ///
    /// Idempotent from any prior state.
    pub fn initialize_at_base(&mut self) {
        self.state = FlagState::AtBase;
        self.marker = Some(self.base);
    }

    /// Hand the flag to `carrier`. Only valid from `AtBase`.
    pub fn assign_carrier(&mut self, carrier: ActorId) -> bool {
        if !self.is_at_base() {
            return false;
        }
        self.state = FlagState::Carried { carrier };
        self.marker = None;
        true
    }

    /// Pick the flag up from where it was dropped. Only valid from `Dropped`.
    pub fn pick_up(&mut self, carrier: ActorId) -> bool {
        if !self.is_dropped() {
            return false;
        }
        self.state = FlagState::Carried { carrier };
        self.marker = None;
        true
    }

    /// Drop the flag at `position`. Only valid from `Carried`.
    ///
    /// The auto-return timer is owned by the orchestrator.
    pub fn drop_at(&mut self, position: Position) -> bool {
        if self.carrier().is_none() {
            return false;
        }
        self.state = FlagState::Dropped { at: position };
        self.marker = Some(position);
        true
    }

    /// Send the flag home from any state.
    ///
    /// Returns `false` (and changes nothing) when the flag is already at base.
    pub fn return_to_base(&mut self) -> bool {
        if self.is_at_base() && self.marker.is_some() {
            return false;
        }
        self.initialize_at_base();
        true
    }

    /// Whether the flag's world marker is within `radius` of `position`.
    ///
    /// A carried flag has no marker and is never near anything.
    pub fn is_near(&self, position: &Position, radius: f64) -> bool {
        self.marker
            .is_some_and(|marker| marker.within(position, radius))
    }

    /// Whether the flag's base is within `radius` of `position`, wherever
    /// the flag currently is.
    pub fn base_is_near(&self, position: &Position, radius: f64) -> bool {
        self.base.within(position, radius)
    }
}
