//! Per-participant match state.

use crate::progression::{Progression, ProgressionRules};
use crate::{ActorId, Team, Tick};

/// Connection state for reconnect support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// Disconnected, waiting for a reconnect within the grace period.
    Disconnected { since_tick: Tick },
}

/// Counters for the current match only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub kills: u32,
    pub deaths: u32,
    pub captures: u32,
    pub returns: u32,
}

impl SessionStats {
    /// MVP ranking score: `kills + captures*5 + returns*2`.
    pub fn score(&self) -> u32 {
        self.kills + self.captures * 5 + self.returns * 2
    }
}

/// A participant attached to a match.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    actor: ActorId,
    name: String,
    team: Option<Team>,
    /// Team of the flag being carried. Mirrors `FlagState::Carried`.
    carried_flag: Option<Team>,
    alive: bool,
    spawn_protected: bool,
    /// Team enhancement tier currently applied to this player's weapons.
    enhancement_tier: u8,
    connection: ConnectionState,
    stats: SessionStats,
    progression: Progression,
}

impl PlayerSession {
    pub fn new(actor: ActorId, name: impl Into<String>, progression: Progression) -> Self {
        Self {
            actor,
            name: name.into(),
            team: None,
            carried_flag: None,
            alive: true,
            spawn_protected: false,
            enhancement_tier: 0,
            connection: ConnectionState::Connected,
            stats: SessionStats::default(),
            progression,
        }
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn team(&self) -> Option<Team> {
        self.team
    }

    pub fn carried_flag(&self) -> Option<Team> {
        self.carried_flag
    }

    pub fn is_carrying(&self) -> bool {
        self.carried_flag.is_some()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_spawn_protected(&self) -> bool {
        self.spawn_protected
    }

    pub fn enhancement_tier(&self) -> u8 {
        self.enhancement_tier
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection, ConnectionState::Connected)
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn progression(&self) -> &Progression {
        &self.progression
    }

    pub fn score(&self) -> u32 {
        self.stats.score()
    }

    pub(crate) fn set_team(&mut self, team: Option<Team>) {
        self.team = team;
    }

    /// Mirror the flag's carrier pointer. Only the match session calls this,
    /// together with the matching `Flag` transition.
    pub(crate) fn set_carried_flag(&mut self, flag: Option<Team>) {
        self.carried_flag = flag;
    }

    pub fn set_spawn_protected(&mut self, protected: bool) {
        self.spawn_protected = protected;
    }

    pub(crate) fn set_enhancement_tier(&mut self, tier: u8) {
        self.enhancement_tier = tier;
    }

    pub fn set_connection(&mut self, connection: ConnectionState) {
        self.connection = connection;
    }

    /// Returns the levels reached by the XP grant.
    pub fn record_kill(&mut self, rules: &ProgressionRules) -> Vec<u32> {
        self.stats.kills += 1;
        self.progression.lifetime_kills += 1;
        self.progression.grant_xp(rules.kill_xp, rules)
    }

    pub fn record_death(&mut self) {
        self.stats.deaths += 1;
        self.progression.lifetime_deaths += 1;
        self.alive = false;
        self.spawn_protected = false;
    }

    /// Returns the levels reached by the XP grant.
    pub fn record_capture(&mut self, rules: &ProgressionRules) -> Vec<u32> {
        self.stats.captures += 1;
        self.progression.lifetime_captures += 1;
        self.progression.grant_xp(rules.capture_xp, rules)
    }

    /// Returns the levels reached by the XP grant.
    pub fn record_flag_return(&mut self, rules: &ProgressionRules) -> Vec<u32> {
        self.stats.returns += 1;
        self.progression.lifetime_returns += 1;
        self.progression.grant_xp(rules.return_xp, rules)
    }

    /// Count a finished match toward lifetime totals.
    pub fn record_game(&mut self, won: bool) {
        self.progression.games_played += 1;
        if won {
            self.progression.games_won += 1;
        }
    }

    pub(crate) fn revive(&mut self) {
        self.alive = true;
    }

    /// Hand the progression snapshot back for persistence.
    pub fn into_progression(self) -> Progression {
        self.progression
    }
}
