//! Flag interaction attempts.
//!
//! An attempt is a hold: the player stays within range for `hold_secs`
//! while the kind's precondition keeps holding, then the matching
//! `MatchSession` operation runs exactly once. The coordinator owns the
//! attempts; the orchestrator owns their timers and executes completions.

use std::collections::BTreeMap;

use flagfall_sim::{ActionRejected, ActorId, ArenaId, MatchSession, MatchState, Position, Team};

use crate::config::{InteractionConfig, InteractionMode};
use crate::error::InteractionRejected;
use crate::scheduler::TimerHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    /// Enemy flag from its base.
    Take,
    /// Enemy flag from where it was dropped.
    Pickup,
    /// Own dropped flag back to base.
    Return,
    /// Carried enemy flag at the own capture point.
    Capture,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Take => "take",
            Self::Pickup => "pickup",
            Self::Return => "return",
            Self::Capture => "capture",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Manual,
    Automatic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionAttempt {
    pub actor: ActorId,
    pub arena: ArenaId,
    pub kind: InteractionKind,
    /// Team of the flag involved.
    pub flag_team: Team,
    pub target: Position,
    pub remaining_secs: u32,
    pub origin: Origin,
    pub timer: Option<TimerHandle>,
}

/// Work out what `actor` means by interacting at `target`.
///
/// `capture_point` is the actor's own team capture point. Captures are only
/// offered in manual mode; automatic mode starts them from movement.
pub fn classify(
    session: &MatchSession,
    actor: ActorId,
    target: &Position,
    capture_point: Option<Position>,
    config: &InteractionConfig,
) -> Option<(InteractionKind, Team)> {
    let player = session.player(actor)?;
    let team = player.team()?;
    let enemy = team.opponent();

    if let Some(carried) = player.carried_flag() {
        let at_capture_point = capture_point.is_some_and(|cp| cp.within(target, config.radius));
        if at_capture_point && config.mode == InteractionMode::Manual {
            return Some((InteractionKind::Capture, carried));
        }
    }

    let enemy_flag = session.flag(enemy)?;
    if enemy_flag.is_near(target, config.radius) {
        if enemy_flag.is_at_base() {
            return Some((InteractionKind::Take, enemy));
        }
        if enemy_flag.is_dropped() {
            return Some((InteractionKind::Pickup, enemy));
        }
    }

    let own_flag = session.flag(team)?;
    if own_flag.is_dropped() && own_flag.is_near(target, config.radius) {
        return Some((InteractionKind::Return, team));
    }
    None
}

/// Check the precondition of `kind` without mutating anything.
///
/// Mirrors the guards of the corresponding `MatchSession` operation, plus
/// the flag still lying near `target` for the kinds that act on a placed flag.
pub fn precondition(
    session: &MatchSession,
    actor: ActorId,
    kind: InteractionKind,
    flag_team: Team,
    target: &Position,
    radius: f64,
) -> Result<(), ActionRejected> {
    if session.state() != MatchState::Playing {
        return Err(ActionRejected::NotPlaying);
    }
    let player = session.player(actor).ok_or(ActionRejected::UnknownPlayer)?;
    let team = player.team().ok_or(ActionRejected::NoTeam)?;
    if !player.is_alive() {
        return Err(ActionRejected::Dead);
    }
    let flag = session.flag(flag_team).ok_or(ActionRejected::NotPlaying)?;
    let home_at_base = session.flag(team).is_some_and(|f| f.is_at_base());

    if kind != InteractionKind::Capture && player.is_carrying() {
        return Err(ActionRejected::AlreadyCarrying);
    }
    match kind {
        InteractionKind::Take => {
            if flag_team == team {
                return Err(ActionRejected::OwnFlag);
            }
            if !home_at_base {
                return Err(ActionRejected::HomeFlagAway);
            }
            if !flag.is_at_base() {
                return Err(ActionRejected::FlagNotAtBase);
            }
        }
        InteractionKind::Pickup => {
            if flag_team == team {
                return Err(ActionRejected::OwnFlag);
            }
            if !flag.is_dropped() {
                return Err(ActionRejected::FlagNotDropped);
            }
        }
        InteractionKind::Return => {
            if flag_team != team {
                return Err(ActionRejected::EnemyFlag);
            }
            if !flag.is_dropped() {
                return Err(ActionRejected::FlagNotDropped);
            }
        }
        InteractionKind::Capture => {
            if player.carried_flag() != Some(flag_team) {
                return Err(ActionRejected::NotCarrying);
            }
            if !home_at_base {
                return Err(ActionRejected::HomeFlagAway);
            }
        }
    }

    if kind != InteractionKind::Capture && !flag.is_near(target, radius) {
        return Err(ActionRejected::FlagNotAtBase);
    }
    Ok(())
}

/// Active attempts, at most one per actor.
#[derive(Debug, Default)]
pub struct InteractionCoordinator {
    attempts: BTreeMap<ActorId, InteractionAttempt>,
}

impl InteractionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, actor: ActorId) -> Option<&InteractionAttempt> {
        self.attempts.get(&actor)
    }

    pub fn is_active(&self, actor: ActorId) -> bool {
        self.attempts.contains_key(&actor)
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn begin(&mut self, attempt: InteractionAttempt) -> Result<(), InteractionRejected> {
        if self.attempts.contains_key(&attempt.actor) {
            return Err(InteractionRejected::AlreadyInteracting);
        }
        self.attempts.insert(attempt.actor, attempt);
        Ok(())
    }

    /// Remove and return the actor's attempt.
    pub fn remove(&mut self, actor: ActorId) -> Option<InteractionAttempt> {
        self.attempts.remove(&actor)
    }

    /// Remove every attempt in `arena`.
    pub fn remove_arena(&mut self, arena: &str) -> Vec<InteractionAttempt> {
        let actors: Vec<ActorId> = self
            .attempts
            .values()
            .filter(|a| a.arena == arena)
            .map(|a| a.actor)
            .collect();
        actors
            .into_iter()
            .filter_map(|actor| self.attempts.remove(&actor))
            .collect()
    }

    /// One second of hold. Returns the seconds left, or `None` without an attempt.
    pub fn tick(&mut self, actor: ActorId) -> Option<u32> {
        let attempt = self.attempts.get_mut(&actor)?;
        attempt.remaining_secs = attempt.remaining_secs.saturating_sub(1);
        Some(attempt.remaining_secs)
    }

    /// Whether `position` has left the attempt's allowed radius.
    pub fn out_of_range(&self, actor: ActorId, position: &Position, radius: f64) -> bool {
        self.attempts
            .get(&actor)
            .is_some_and(|a| !a.target.within(position, radius))
    }
}
