//! Per-arena match state machine.
//!
//! A `MatchSession` owns its flags and player sessions, the per-team score,
//! kill and enhancement counters, and the match clock. It never schedules
//! anything itself: the orchestrator drives `countdown_tick` and
//! `tick_clock` once per second and reacts to the returned steps.
//!
//! State transitions:
//!
//! ```text
//! Waiting <-> Starting -> Playing -> Ending
//! ```

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::flag::Flag;
use crate::player::PlayerSession;
use crate::progression::ProgressionRules;
use crate::{ActorId, ArenaId, Position, Team, TeamMap, teams};

// ============================================================================
// Configuration
// ============================================================================

/// Gameplay rules shared by every match on the server.
///
/// A limit of `0` disables the corresponding win condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRules {
    pub min_players: usize,
    pub max_players: usize,
    pub max_per_team: usize,
    pub countdown_secs: u32,
    pub duration_secs: u32,
    pub capture_limit: u32,
    pub kill_limit: u32,
    /// Team kills needed per enhancement tier.
    pub kills_per_enhancement: u32,
    pub max_enhancement_tier: u8,
    pub respawn_delay_secs: u32,
    pub spawn_protection_secs: u32,
    /// Seconds a dropped flag lies before returning home on its own.
    pub flag_return_secs: u32,
    /// Seconds between settlement and discarding the match.
    pub cleanup_delay_secs: u32,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 16,
            max_per_team: 8,
            countdown_secs: 10,
            duration_secs: 600,
            capture_limit: 3,
            kill_limit: 50,
            kills_per_enhancement: 5,
            max_enhancement_tier: 3,
            respawn_delay_secs: 5,
            spawn_protection_secs: 3,
            flag_return_secs: 30,
            cleanup_delay_secs: 10,
        }
    }
}

/// Capacity limits of one arena's match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchLimits {
    pub min_players: usize,
    pub max_players: usize,
    pub max_per_team: usize,
}

impl From<&MatchRules> for MatchLimits {
    fn from(rules: &MatchRules) -> Self {
        Self {
            min_players: rules.min_players,
            max_players: rules.max_players,
            max_per_team: rules.max_per_team,
        }
    }
}

// ============================================================================
// State and results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Waiting,
    Starting,
    Playing,
    Ending,
}

impl MatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Starting => "starting",
            Self::Playing => "playing",
            Self::Ending => "ending",
        }
    }
}

/// Why a match left `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    CaptureLimit,
    KillLimit,
    TimeExpired,
    NotEnoughPlayers,
    Aborted,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CaptureLimit => "capture_limit",
            Self::KillLimit => "kill_limit",
            Self::TimeExpired => "time_expired",
            Self::NotEnoughPlayers => "not_enough_players",
            Self::Aborted => "aborted",
        }
    }
}

/// Final result. `winner == None` is a draw or a no-winner ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub winner: Option<Team>,
    pub reason: EndReason,
}

/// Refusal of a match operation. Nothing was mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ActionRejected {
    #[error("match is not in progress")]
    NotPlaying,
    #[error("match already in progress")]
    MatchInProgress,
    #[error("match is full")]
    MatchFull,
    #[error("both teams are full")]
    TeamFull,
    #[error("player already attached")]
    AlreadyAttached,
    #[error("player not in this match")]
    UnknownPlayer,
    #[error("player has no team")]
    NoTeam,
    #[error("player is dead")]
    Dead,
    #[error("player is alive")]
    Alive,
    #[error("player already carries a flag")]
    AlreadyCarrying,
    #[error("player carries no flag")]
    NotCarrying,
    #[error("cannot take or pick up own flag")]
    OwnFlag,
    #[error("cannot return the enemy flag")]
    EnemyFlag,
    #[error("flag is not at base")]
    FlagNotAtBase,
    #[error("flag is not dropped")]
    FlagNotDropped,
    #[error("own flag must be at base first")]
    HomeFlagAway,
}

impl ActionRejected {
    /// Stable reason code for player messaging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotPlaying => "not_playing",
            Self::MatchInProgress => "match_in_progress",
            Self::MatchFull => "match_full",
            Self::TeamFull => "team_full",
            Self::AlreadyAttached => "already_attached",
            Self::UnknownPlayer => "unknown_player",
            Self::NoTeam => "no_team",
            Self::Dead => "dead",
            Self::Alive => "alive",
            Self::AlreadyCarrying => "already_carrying",
            Self::NotCarrying => "not_carrying",
            Self::OwnFlag => "own_flag",
            Self::EnemyFlag => "enemy_flag",
            Self::FlagNotAtBase => "flag_not_at_base",
            Self::FlagNotDropped => "flag_not_dropped",
            Self::HomeFlagAway => "home_flag_away",
        }
    }
}

/// Countdown progress while `Starting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    Remaining(u32),
    Elapsed,
    /// Not counting down (state changed under the timer).
    Inactive,
}

/// Match clock progress while `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockStep {
    Running(u32),
    Expired,
    Inactive,
}

/// A session removed from the match.
#[derive(Debug)]
pub struct Detached {
    pub session: PlayerSession,
    /// Flag sent home because the player was carrying it.
    pub returned_flag: Option<Team>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub team: Team,
    /// Team of the captured flag.
    pub flag_team: Team,
    pub score: u32,
    pub levels: Vec<u32>,
    pub limit_reached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillCredit {
    pub killer: ActorId,
    pub team: Team,
    pub team_kills: u32,
    pub levels: Vec<u32>,
    /// New tier when this kill crossed an enhancement boundary.
    pub enhancement_raised: Option<u8>,
    pub limit_reached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathOutcome {
    pub victim_team: Option<Team>,
    pub returned_flag: Option<Team>,
    pub credit: Option<KillCredit>,
}

/// End-of-match line for one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSummary {
    pub actor: ActorId,
    pub name: String,
    pub team: Option<Team>,
    pub kills: u32,
    pub deaths: u32,
    pub captures: u32,
    pub returns: u32,
    pub score: u32,
}

// ============================================================================
// MatchSession
// ============================================================================

/// One arena's match.
#[derive(Debug)]
pub struct MatchSession {
    arena: ArenaId,
    limits: MatchLimits,
    rules: MatchRules,
    progression: ProgressionRules,
    state: MatchState,
    countdown_remaining: u32,
    remaining_secs: u32,
    /// Ordered by actor id for deterministic iteration.
    players: BTreeMap<ActorId, PlayerSession>,
    /// Spawned when the match starts.
    flags: Option<TeamMap<Flag>>,
    scores: TeamMap<u32>,
    kills: TeamMap<u32>,
    enhancement: TeamMap<u8>,
    result: Option<MatchResult>,
}

impl MatchSession {
    pub fn new(
        arena: impl Into<ArenaId>,
        limits: MatchLimits,
        rules: MatchRules,
        progression: ProgressionRules,
    ) -> Self {
        Self {
            arena: arena.into(),
            limits,
            rules,
            progression,
            state: MatchState::Waiting,
            countdown_remaining: 0,
            remaining_secs: 0,
            players: BTreeMap::new(),
            flags: None,
            scores: TeamMap::default(),
            kills: TeamMap::default(),
            enhancement: TeamMap::default(),
            result: None,
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn arena(&self) -> &str {
        &self.arena
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn limits(&self) -> MatchLimits {
        self.limits
    }

    pub fn rules(&self) -> &MatchRules {
        &self.rules
    }

    pub fn countdown_remaining(&self) -> u32 {
        self.countdown_remaining
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn scores(&self) -> TeamMap<u32> {
        self.scores
    }

    pub fn kills(&self) -> TeamMap<u32> {
        self.kills
    }

    pub fn enhancement_tier(&self, team: Team) -> u8 {
        self.enhancement[team]
    }

    pub fn result(&self) -> Option<MatchResult> {
        self.result
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.limits.max_players
    }

    /// Whether team balancing could place no further player.
    pub fn teams_full(&self) -> bool {
        self.players.len() >= self.limits.max_per_team.saturating_mul(2)
    }

    pub fn contains(&self, actor: ActorId) -> bool {
        self.players.contains_key(&actor)
    }

    pub fn player(&self, actor: ActorId) -> Option<&PlayerSession> {
        self.players.get(&actor)
    }

    /// Mutable access for orchestrator-owned per-player flags
    /// (spawn protection, connection state).
    pub fn player_mut(&mut self, actor: ActorId) -> Option<&mut PlayerSession> {
        self.players.get_mut(&actor)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerSession> {
        self.players.values()
    }

    pub fn actors(&self) -> Vec<ActorId> {
        self.players.keys().copied().collect()
    }

    pub fn team_members(&self, team: Team) -> Vec<ActorId> {
        self.players
            .values()
            .filter(|p| p.team() == Some(team))
            .map(PlayerSession::actor)
            .collect()
    }

    pub fn flag(&self, team: Team) -> Option<&Flag> {
        self.flags.as_ref().map(|flags| &flags[team])
    }

    /// Every flag's state agrees with its carrier's `carried_flag`, and no
    /// session claims a flag that is not carried by it.
    pub fn flags_consistent(&self) -> bool {
        let Some(flags) = &self.flags else {
            return self.players.values().all(|p| p.carried_flag().is_none());
        };

        let flags_ok = flags.iter().all(|(team, flag)| match flag.carrier() {
            Some(carrier) => self
                .players
                .get(&carrier)
                .is_some_and(|p| p.carried_flag() == Some(team)),
            None => true,
        });
        let sessions_ok = self.players.values().all(|p| match p.carried_flag() {
            Some(team) => flags[team].carrier() == Some(p.actor()),
            None => true,
        });
        flags_ok && sessions_ok
    }

    // ------------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------------

    /// Attach a session. Only possible before the match starts.
    pub fn attach(&mut self, session: PlayerSession) -> Result<(), ActionRejected> {
        if !matches!(self.state, MatchState::Waiting | MatchState::Starting) {
            return Err(ActionRejected::MatchInProgress);
        }
        if self.players.contains_key(&session.actor()) {
            return Err(ActionRejected::AlreadyAttached);
        }
        if self.is_full() {
            return Err(ActionRejected::MatchFull);
        }
        if self.teams_full() {
            return Err(ActionRejected::TeamFull);
        }
        self.players.insert(session.actor(), session);
        Ok(())
    }

    /// Remove a session, sending home any flag it carries.
    pub fn detach(&mut self, actor: ActorId) -> Option<Detached> {
        let returned_flag = self.force_return_carried(actor);
        let session = self.players.remove(&actor)?;
        debug_assert!(self.flags_consistent());
        Some(Detached {
            session,
            returned_flag,
        })
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Waiting -> Starting once enough players are attached.
    pub fn begin_countdown(&mut self) -> bool {
        if self.state != MatchState::Waiting || self.players.len() < self.limits.min_players {
            return false;
        }
        self.state = MatchState::Starting;
        self.countdown_remaining = self.rules.countdown_secs;
        true
    }

    /// Starting -> Waiting when the player count fell below the minimum.
    pub fn cancel_countdown(&mut self) -> bool {
        if self.state != MatchState::Starting || self.players.len() >= self.limits.min_players {
            return false;
        }
        self.state = MatchState::Waiting;
        self.countdown_remaining = 0;
        true
    }

    /// One second of countdown.
    pub fn countdown_tick(&mut self) -> CountdownStep {
        if self.state != MatchState::Starting {
            return CountdownStep::Inactive;
        }
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        if self.countdown_remaining == 0 {
            CountdownStep::Elapsed
        } else {
            CountdownStep::Remaining(self.countdown_remaining)
        }
    }

    /// Starting -> Playing: assign teams, spawn flags, start the clock.
    pub fn start<R: Rng + ?Sized>(&mut self, flag_bases: TeamMap<Position>, rng: &mut R) -> bool {
        if self.state != MatchState::Starting {
            return false;
        }

        let actors = self.actors();
        for (actor, team) in teams::balance(&actors, self.limits.max_per_team, rng) {
            if let Some(session) = self.players.get_mut(&actor) {
                session.set_team(team);
                session.set_carried_flag(None);
                session.set_enhancement_tier(0);
                session.revive();
            }
        }

        self.flags = Some(TeamMap::from_fn(|team| {
            let mut flag = Flag::new(team, flag_bases[team]);
            flag.initialize_at_base();
            flag
        }));
        self.scores = TeamMap::default();
        self.kills = TeamMap::default();
        self.enhancement = TeamMap::default();
        self.remaining_secs = self.rules.duration_secs;
        self.countdown_remaining = 0;
        self.state = MatchState::Playing;
        true
    }

    /// One second of match clock.
    pub fn tick_clock(&mut self) -> ClockStep {
        if self.state != MatchState::Playing {
            return ClockStep::Inactive;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            ClockStep::Expired
        } else {
            ClockStep::Running(self.remaining_secs)
        }
    }

    /// Playing -> Ending. Every attached player gets the game counted.
    pub fn end(&mut self, result: MatchResult) -> bool {
        if self.state != MatchState::Playing {
            return false;
        }
        self.state = MatchState::Ending;
        self.result = Some(result);
        for session in self.players.values_mut() {
            let won = result.winner.is_some() && session.team() == result.winner;
            session.record_game(won);
        }
        true
    }

    /// Winner by the clock-expiry tie-break policy on current counters.
    pub fn timeout_winner(&self) -> Option<Team> {
        crate::determine_winner(self.scores, self.kills)
    }

    // ------------------------------------------------------------------------
    // Flag protocol
    // ------------------------------------------------------------------------

    /// Take the enemy flag from its base.
    pub fn take_flag(&mut self, actor: ActorId, flag_team: Team) -> Result<(), ActionRejected> {
        let team = self.ready_participant(actor)?;
        if flag_team == team {
            return Err(ActionRejected::OwnFlag);
        }
        let flags = self.flags.as_mut().ok_or(ActionRejected::NotPlaying)?;
        if !flags[team].is_at_base() {
            return Err(ActionRejected::HomeFlagAway);
        }
        if !flags[flag_team].assign_carrier(actor) {
            return Err(ActionRejected::FlagNotAtBase);
        }
        self.set_carried(actor, Some(flag_team));
        Ok(())
    }

    /// Pick up the dropped enemy flag.
    pub fn pickup_flag(&mut self, actor: ActorId, flag_team: Team) -> Result<(), ActionRejected> {
        let team = self.ready_participant(actor)?;
        if flag_team == team {
            return Err(ActionRejected::OwnFlag);
        }
        let flags = self.flags.as_mut().ok_or(ActionRejected::NotPlaying)?;
        if !flags[flag_team].pick_up(actor) {
            return Err(ActionRejected::FlagNotDropped);
        }
        self.set_carried(actor, Some(flag_team));
        Ok(())
    }

    /// Return the own dropped flag to base. Returns the levels reached.
    pub fn return_flag(
        &mut self,
        actor: ActorId,
        flag_team: Team,
    ) -> Result<Vec<u32>, ActionRejected> {
        let team = self.ready_participant(actor)?;
        if flag_team != team {
            return Err(ActionRejected::EnemyFlag);
        }
        let flags = self.flags.as_mut().ok_or(ActionRejected::NotPlaying)?;
        if !flags[flag_team].is_dropped() {
            return Err(ActionRejected::FlagNotDropped);
        }
        flags[flag_team].return_to_base();

        let rules = &self.progression;
        let levels = self
            .players
            .get_mut(&actor)
            .map(|p| p.record_flag_return(rules))
            .unwrap_or_default();
        Ok(levels)
    }

    /// Score the carried enemy flag. Position checks belong to the caller.
    pub fn capture_flag(&mut self, actor: ActorId) -> Result<CaptureOutcome, ActionRejected> {
        let team = self.participant(actor)?;
        let flag_team = self
            .players
            .get(&actor)
            .and_then(PlayerSession::carried_flag)
            .ok_or(ActionRejected::NotCarrying)?;
        let flags = self.flags.as_mut().ok_or(ActionRejected::NotPlaying)?;
        if !flags[team].is_at_base() {
            return Err(ActionRejected::HomeFlagAway);
        }

        flags[flag_team].return_to_base();
        self.set_carried(actor, None);
        self.scores[team] += 1;

        let rules = &self.progression;
        let levels = self
            .players
            .get_mut(&actor)
            .map(|p| p.record_capture(rules))
            .unwrap_or_default();

        let score = self.scores[team];
        Ok(CaptureOutcome {
            team,
            flag_team,
            score,
            levels,
            limit_reached: limit_hit(score, self.rules.capture_limit),
        })
    }

    /// Drop the carried flag at `at`. Returns the dropped flag's team.
    pub fn drop_carried(&mut self, actor: ActorId, at: Position) -> Result<Team, ActionRejected> {
        if self.state != MatchState::Playing {
            return Err(ActionRejected::NotPlaying);
        }
        let flag_team = self
            .players
            .get(&actor)
            .ok_or(ActionRejected::UnknownPlayer)?
            .carried_flag()
            .ok_or(ActionRejected::NotCarrying)?;
        let flags = self.flags.as_mut().ok_or(ActionRejected::NotPlaying)?;
        flags[flag_team].drop_at(at);
        self.set_carried(actor, None);
        Ok(flag_team)
    }

    /// Send home whatever `actor` carries. Valid in any state.
    pub fn force_return_carried(&mut self, actor: ActorId) -> Option<Team> {
        let flag_team = self.players.get(&actor)?.carried_flag()?;
        if let Some(flags) = self.flags.as_mut() {
            flags[flag_team].return_to_base();
        }
        self.set_carried(actor, None);
        Some(flag_team)
    }

    /// Auto-return timer expiry. Only acts on a flag that is still dropped.
    pub fn auto_return(&mut self, flag_team: Team) -> bool {
        match self.flags.as_mut() {
            Some(flags) if flags[flag_team].is_dropped() => flags[flag_team].return_to_base(),
            _ => false,
        }
    }

    // ------------------------------------------------------------------------
    // Combat
    // ------------------------------------------------------------------------

    /// Register a death, crediting `killer` when they are an enemy in this match.
    pub fn handle_death(
        &mut self,
        victim: ActorId,
        killer: Option<ActorId>,
    ) -> Result<DeathOutcome, ActionRejected> {
        if self.state != MatchState::Playing {
            return Err(ActionRejected::NotPlaying);
        }
        let victim_session = self
            .players
            .get(&victim)
            .ok_or(ActionRejected::UnknownPlayer)?;
        if !victim_session.is_alive() {
            return Err(ActionRejected::Dead);
        }
        let victim_team = victim_session.team();

        let returned_flag = self.force_return_carried(victim);
        if let Some(session) = self.players.get_mut(&victim) {
            session.record_death();
        }

        let credit = killer
            .filter(|&k| k != victim)
            .and_then(|k| self.credit_kill(k, victim_team));

        Ok(DeathOutcome {
            victim_team,
            returned_flag,
            credit,
        })
    }

    fn credit_kill(&mut self, killer: ActorId, victim_team: Option<Team>) -> Option<KillCredit> {
        let rules = &self.progression;
        let session = self.players.get_mut(&killer)?;
        let team = session.team()?;
        if victim_team == Some(team) {
            return None;
        }
        let levels = session.record_kill(rules);

        self.kills[team] += 1;
        let team_kills = self.kills[team];
        let enhancement_raised = self.raise_enhancement(team);

        Some(KillCredit {
            killer,
            team,
            team_kills,
            levels,
            enhancement_raised,
            limit_reached: limit_hit(team_kills, self.rules.kill_limit),
        })
    }

    fn raise_enhancement(&mut self, team: Team) -> Option<u8> {
        let per_tier = self.rules.kills_per_enhancement;
        if per_tier == 0 {
            return None;
        }
        let earned = u8::try_from(self.kills[team] / per_tier).unwrap_or(u8::MAX);
        let tier = earned.min(self.rules.max_enhancement_tier);
        if tier <= self.enhancement[team] {
            return None;
        }
        self.enhancement[team] = tier;
        for session in self.players.values_mut() {
            if session.team() == Some(team) {
                session.set_enhancement_tier(tier);
            }
        }
        Some(tier)
    }

    /// Bring a dead player back. Returns the enhancement tier now applied.
    pub fn respawn(&mut self, actor: ActorId) -> Result<u8, ActionRejected> {
        if self.state != MatchState::Playing {
            return Err(ActionRejected::NotPlaying);
        }
        let session = self
            .players
            .get_mut(&actor)
            .ok_or(ActionRejected::UnknownPlayer)?;
        if session.is_alive() {
            return Err(ActionRejected::Alive);
        }
        let tier = session
            .team()
            .map(|team| self.enhancement[team])
            .unwrap_or(0);
        session.revive();
        session.set_enhancement_tier(tier);
        Ok(tier)
    }

    // ------------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------------

    /// Per-player summaries, best score first (ties by actor id).
    pub fn summaries(&self) -> Vec<PlayerSummary> {
        let mut out: Vec<PlayerSummary> = self
            .players
            .values()
            .map(|p| {
                let stats = p.stats();
                PlayerSummary {
                    actor: p.actor(),
                    name: p.name().to_string(),
                    team: p.team(),
                    kills: stats.kills,
                    deaths: stats.deaths,
                    captures: stats.captures,
                    returns: stats.returns,
                    score: stats.score(),
                }
            })
            .collect();
        out.sort_by(|a, b| b.score.cmp(&a.score).then(a.actor.cmp(&b.actor)));
        out
    }

    /// Highest-scoring participant with a non-zero score.
    pub fn mvp(&self) -> Option<ActorId> {
        self.summaries()
            .first()
            .filter(|s| s.score > 0)
            .map(|s| s.actor)
    }

    // ------------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------------

    /// Playing, attached, teamed and alive. Returns the player's team.
    fn participant(&self, actor: ActorId) -> Result<Team, ActionRejected> {
        if self.state != MatchState::Playing {
            return Err(ActionRejected::NotPlaying);
        }
        let session = self
            .players
            .get(&actor)
            .ok_or(ActionRejected::UnknownPlayer)?;
        let team = session.team().ok_or(ActionRejected::NoTeam)?;
        if !session.is_alive() {
            return Err(ActionRejected::Dead);
        }
        Ok(team)
    }

    /// `participant` plus not carrying a flag.
    fn ready_participant(&self, actor: ActorId) -> Result<Team, ActionRejected> {
        let team = self.participant(actor)?;
        if self.players.get(&actor).is_some_and(PlayerSession::is_carrying) {
            return Err(ActionRejected::AlreadyCarrying);
        }
        Ok(team)
    }

    fn set_carried(&mut self, actor: ActorId, flag: Option<Team>) {
        if let Some(session) = self.players.get_mut(&actor) {
            session.set_carried_flag(flag);
        }
        debug_assert!(self.flags_consistent());
    }
}

fn limit_hit(value: u32, limit: u32) -> bool {
    limit > 0 && value >= limit
}

// ============================================================================
// Tests
// ============================================================================
