//! Flagfall Match Orchestrator
//!
//! The orchestrator runs every arena's match on one server. It owns:
//! - The registries (`arena -> MatchEntry`, `actor -> ActorEntry`)
//! - Admission, release, disconnect/reconnect and quit confirmation
//! - The interaction coordinator (timed holds and automatic captures)
//! - The cooperative scheduler and every timer in it
//! - Settlement: summaries, rewards, progression persistence, match records
//!
//! # Architecture
//!
//! All mutation goes through `&mut MatchOrchestrator`; the host calls
//! [`MatchOrchestrator::step`] `tick_rate_hz` times per second and feeds
//! player input through the public operations. Game rules live in
//! `flagfall-sim`; this crate decides *when* they run and reports what
//! happened as [`MatchEvent`]s.
//!
//! Collaborators are reached only through the [`ArenaProvider`] and
//! [`ProgressionStore`] ports.

#![deny(unsafe_code)]

pub mod admission;
pub mod config;
pub mod error;
pub mod events;
pub mod interaction;
pub mod ports;
pub mod rewards;
pub mod scheduler;
pub mod session;

use std::collections::{BTreeMap, HashMap, btree_map};

use flagfall_journal::MatchJournal;
use flagfall_sim::{
    ActionRejected, ActorId, ArenaId, ClockStep, ConnectionState, CountdownStep, EndReason, Flag,
    MatchResult, MatchSession, MatchState, PlayerSession, Position, Progression, Team, TeamMap,
    Tick,
};
use flagfall_wire::MatchRecord;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

pub use config::{InteractionConfig, InteractionMode, ServerConfig, SessionConfig};
pub use error::{AdmissionError, ConfigError, InteractionRejected, StoreError};
pub use events::{CancelReason, EventEnvelope, EventSink, MatchEvent};
pub use interaction::{InteractionAttempt, InteractionKind, Origin};
pub use ports::{ArenaConfig, ArenaProvider, MemoryProgressionStore, ProgressionStore, StaticArenas};
pub use rewards::{RewardConfig, RewardLine, RewardReason};

use interaction::InteractionCoordinator;
use scheduler::{FiredTimer, Scheduler, TimerEvent, TimerOwner};
use session::{ActorEntry, MatchEntry};

// ============================================================================
// Defaults
// ============================================================================

/// Default scheduler tick rate in Hz.
pub const TICK_RATE_HZ: u32 = 20;

/// Default kill-streak lengths that are announced.
pub const DEFAULT_KILL_STREAK_MILESTONES: [u32; 3] = [3, 5, 10];

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs the matches of every arena on this server.
pub struct MatchOrchestrator<A: ArenaProvider, P: ProgressionStore> {
    config: ServerConfig,
    /// Sorted, de-duplicated kill-streak milestones.
    milestones: Vec<u32>,
    arenas: A,
    store: P,
    seed: u64,
    rng: StdRng,
    scheduler: Scheduler,
    interactions: InteractionCoordinator,
    matches: BTreeMap<ArenaId, MatchEntry>,
    actors: HashMap<ActorId, ActorEntry>,
    outbox: Vec<EventEnvelope>,
    finished: Vec<MatchRecord>,
}

impl<P: ProgressionStore> MatchOrchestrator<StaticArenas, P> {
    /// Orchestrator over the arenas listed in `config`.
    pub fn with_static_arenas(config: ServerConfig, store: P) -> Result<Self, ConfigError> {
        let arenas = StaticArenas::new(config.arenas.iter().cloned());
        Self::new(config, arenas, store)
    }
}

impl<A: ArenaProvider, P: ProgressionStore> MatchOrchestrator<A, P> {
    /// Create an orchestrator. Fails when `config` does not validate.
    pub fn new(config: ServerConfig, arenas: A, store: P) -> Result<Self, ConfigError> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        info!(seed, tick_rate_hz = config.tick_rate_hz, "orchestrator created");
        Ok(Self {
            milestones: config.milestones(),
            arenas,
            store,
            seed,
            rng: StdRng::seed_from_u64(seed),
            scheduler: Scheduler::new(),
            interactions: InteractionCoordinator::new(),
            matches: BTreeMap::new(),
            actors: HashMap::new(),
            outbox: Vec::new(),
            finished: Vec::new(),
            config,
        })
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Seed of the balancing RNG, configured or drawn at startup.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Current scheduler tick.
    pub fn now(&self) -> Tick {
        self.scheduler.now()
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut P {
        &mut self.store
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn match_session(&self, arena: &str) -> Option<&MatchSession> {
        self.matches.get(arena).map(|m| &m.session)
    }

    pub fn match_state(&self, arena: &str) -> Option<MatchState> {
        self.match_session(arena).map(MatchSession::state)
    }

    pub fn scores(&self, arena: &str) -> Option<TeamMap<u32>> {
        self.match_session(arena).map(MatchSession::scores)
    }

    pub fn remaining_secs(&self, arena: &str) -> Option<u32> {
        self.match_session(arena).map(MatchSession::remaining_secs)
    }

    pub fn flag(&self, arena: &str, team: Team) -> Option<&Flag> {
        self.match_session(arena)?.flag(team)
    }

    pub fn arena_of(&self, actor: ActorId) -> Option<&str> {
        self.actors.get(&actor).map(|a| a.arena.as_str())
    }

    pub fn session(&self, actor: ActorId) -> Option<&PlayerSession> {
        let arena = self.arena_of(actor)?;
        self.match_session(arena)?.player(actor)
    }

    pub fn position(&self, actor: ActorId) -> Option<Position> {
        self.actors.get(&actor)?.position
    }

    pub fn kill_streak(&self, actor: ActorId) -> u32 {
        self.actors.get(&actor).map_or(0, |a| a.kill_streak)
    }

    pub fn active_interaction(&self, actor: ActorId) -> Option<&InteractionAttempt> {
        self.interactions.get(actor)
    }

    /// Take every event emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<EventEnvelope> {
        std::mem::take(&mut self.outbox)
    }

    /// Publish and clear the outbox. Returns how many events were published.
    pub fn flush(&mut self, sink: &mut impl EventSink) -> usize {
        let events = self.drain_events();
        for envelope in &events {
            sink.publish(envelope);
        }
        events.len()
    }

    /// Take the records of every match settled since the last call.
    pub fn take_finished_records(&mut self) -> Vec<MatchRecord> {
        std::mem::take(&mut self.finished)
    }

    // ------------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------------

    /// Admit `actor` into the match on `arena`, creating the match if needed.
    ///
    /// # Errors
    /// `AdmissionError` when the actor already has a session, the arena is
    /// unknown, disabled or incomplete, or the match is full or running.
    pub fn admit(
        &mut self,
        actor: ActorId,
        name: impl Into<String>,
        arena: &str,
    ) -> Result<(), AdmissionError> {
        if let Some(existing) = self.actors.get(&actor) {
            return Err(AdmissionError::AlreadyInMatch {
                arena: existing.arena.clone(),
            });
        }
        let arena_config = admission::check_arena(self.arenas.arena(arena), arena)?;
        if let Some(existing) = self.matches.get(arena) {
            admission::check_capacity(&existing.session)?;
        }

        let progression = match self.store.load(actor) {
            Ok(stored) => stored.unwrap_or_default(),
            Err(err) => {
                warn!(actor, error = %err, "progression load failed, using defaults");
                Progression::default()
            }
        };

        let entry = match self.matches.entry(arena.to_string()) {
            btree_map::Entry::Occupied(slot) => slot.into_mut(),
            btree_map::Entry::Vacant(slot) => {
                info!(arena, "match created");
                let limits = arena_config.limits(&self.config.rules);
                let session = MatchSession::new(
                    arena,
                    limits,
                    self.config.rules.clone(),
                    self.config.progression.clone(),
                );
                let journal = MatchJournal::new(arena, self.seed, self.config.tick_rate_hz);
                slot.insert(MatchEntry::new(session, arena_config, journal))
            }
        };
        entry
            .session
            .attach(PlayerSession::new(actor, name, progression))?;
        self.actors.insert(actor, ActorEntry::new(arena));
        debug!(actor, arena, "actor admitted");

        self.evaluate_start(arena);
        Ok(())
    }

    /// Remove `actor` from its match and persist its progression.
    ///
    /// Returns `false` when the actor had no session.
    pub fn release(&mut self, actor: ActorId) -> bool {
        let Some(arena) = self.detach_actor(actor) else {
            return false;
        };
        self.after_departure(&arena);
        true
    }

    /// Keep the session of a dropped connection for the reconnect grace period.
    ///
    /// Returns `false` for unknown or already disconnected actors.
    pub fn handle_disconnect(&mut self, actor: ActorId) -> bool {
        let Some(arena) = self.arena_of(actor).map(str::to_string) else {
            return false;
        };
        if !self.session(actor).is_some_and(PlayerSession::is_connected) {
            return false;
        }

        self.cancel_interaction(actor, None);
        self.scheduler.cancel_owner(&TimerOwner::Actor(actor));
        if let Some(actor_entry) = self.actors.get_mut(&actor) {
            actor_entry.clear_timers();
        }

        let now = self.scheduler.now();
        let mut returned = None;
        if let Some(entry) = self.matches.get_mut(&arena) {
            if entry.session.state() == MatchState::Playing {
                returned = entry.session.force_return_carried(actor);
            }
            if let Some(player) = entry.session.player_mut(actor) {
                player.set_connection(ConnectionState::Disconnected { since_tick: now });
                player.set_spawn_protected(false);
            }
        }
        if let Some(flag_team) = returned {
            self.emit(&arena, MatchEvent::FlagReturned { flag_team, by: None });
        }

        let grace = self.config.session.reconnect_grace_secs;
        if grace == 0 {
            self.release(actor);
            return true;
        }
        let handle = self.scheduler.schedule(
            self.config.secs_to_ticks(grace),
            None,
            TimerOwner::Actor(actor),
            TimerEvent::ReconnectGrace { actor },
        );
        if let Some(actor_entry) = self.actors.get_mut(&actor) {
            actor_entry.grace_timer = Some(handle);
        }
        info!(actor, arena = %arena, grace_secs = grace, "actor disconnected");
        true
    }

    /// Resume a disconnected session inside its grace period.
    pub fn handle_reconnect(&mut self, actor: ActorId) -> bool {
        let Some(actor_entry) = self.actors.get_mut(&actor) else {
            return false;
        };
        let Some(entry) = self.matches.get_mut(&actor_entry.arena) else {
            return false;
        };
        let Some(player) = entry.session.player_mut(actor) else {
            return false;
        };
        if player.is_connected() {
            return false;
        }
        player.set_connection(ConnectionState::Connected);
        let needs_respawn = !player.is_alive() && entry.session.state() == MatchState::Playing;
        if let Some(handle) = actor_entry.grace_timer.take() {
            self.scheduler.cancel(handle);
        }
        info!(actor, arena = %actor_entry.arena, "actor reconnected");

        if needs_respawn {
            self.schedule_respawn(actor);
        }
        true
    }

    /// Open the quit-confirmation window. Returns its length in seconds.
    ///
    /// A zero-length window releases immediately.
    pub fn request_leave(&mut self, actor: ActorId) -> Result<u32, ActionRejected> {
        let secs = self.config.session.leave_confirm_secs;
        let actor_entry = self
            .actors
            .get_mut(&actor)
            .ok_or(ActionRejected::UnknownPlayer)?;
        if secs == 0 {
            self.release(actor);
            return Ok(0);
        }
        if let Some(handle) = actor_entry.leave_timer.take() {
            self.scheduler.cancel(handle);
        }
        actor_entry.leave_timer = Some(self.scheduler.schedule(
            self.config.secs_to_ticks(secs),
            None,
            TimerOwner::Actor(actor),
            TimerEvent::LeaveConfirmExpired { actor },
        ));
        Ok(secs)
    }

    /// Release `actor` if a leave request is still open.
    pub fn confirm_leave(&mut self, actor: ActorId) -> bool {
        let pending = self
            .actors
            .get(&actor)
            .is_some_and(ActorEntry::has_pending_leave);
        pending && self.release(actor)
    }

    // ------------------------------------------------------------------------
    // Gameplay input
    // ------------------------------------------------------------------------

    /// Record a position update and let it drive interactions.
    pub fn handle_move(&mut self, actor: ActorId, position: Position) {
        let Some(actor_entry) = self.actors.get_mut(&actor) else {
            return;
        };
        actor_entry.position = Some(position);
        let arena = actor_entry.arena.clone();

        let InteractionConfig {
            mode,
            radius,
            auto_capture_radius,
            ..
        } = self.config.interaction;
        let allowed = self.interactions.get(actor).map(|attempt| match attempt.origin {
            Origin::Manual => (radius, CancelReason::MovedAway),
            Origin::Automatic => (auto_capture_radius, CancelReason::LeftCaptureZone),
        });
        match allowed {
            Some((radius, reason)) if self.interactions.out_of_range(actor, &position, radius) => {
                self.cancel_interaction(actor, Some(reason));
            }
            Some(_) => {}
            None if mode == InteractionMode::Automatic => {
                self.try_auto_capture(actor, &arena, position);
            }
            None => {}
        }
    }

    /// Start a manual interaction at `target`.
    ///
    /// Returns the kind that started (or completed, for a zero hold time).
    pub fn interact(
        &mut self,
        actor: ActorId,
        target: Position,
    ) -> Result<InteractionKind, InteractionRejected> {
        let actor_entry = self
            .actors
            .get(&actor)
            .ok_or(InteractionRejected::NotInMatch)?;
        let entry = self
            .matches
            .get(&actor_entry.arena)
            .ok_or(InteractionRejected::NotInMatch)?;
        if entry.session.state() != MatchState::Playing {
            return Err(InteractionRejected::NotPlaying);
        }
        if self.interactions.is_active(actor) {
            return Err(InteractionRejected::AlreadyInteracting);
        }

        let config = &self.config.interaction;
        let capture_point = entry
            .session
            .player(actor)
            .and_then(PlayerSession::team)
            .and_then(|team| entry.arena.capture_point(team));
        let (kind, flag_team) =
            interaction::classify(&entry.session, actor, &target, capture_point, config)
                .ok_or(InteractionRejected::NothingToInteract)?;

        let radius = config.radius;
        let in_range = actor_entry
            .position
            .is_some_and(|p| p.within(&target, radius));
        if !in_range {
            let distance = actor_entry
                .position
                .map_or(f64::INFINITY, |p| p.distance(&target));
            return Err(InteractionRejected::OutOfRange { distance, radius });
        }
        interaction::precondition(&entry.session, actor, kind, flag_team, &target, radius)?;

        let arena = actor_entry.arena.clone();
        self.begin_interaction(actor, arena, kind, flag_team, target, Origin::Manual)?;
        Ok(kind)
    }

    /// Voluntarily drop the carried flag at `at`.
    pub fn drop_flag(&mut self, actor: ActorId, at: Position) -> Result<Team, ActionRejected> {
        let arena = self
            .arena_of(actor)
            .map(str::to_string)
            .ok_or(ActionRejected::UnknownPlayer)?;
        let entry = self
            .matches
            .get_mut(&arena)
            .ok_or(ActionRejected::UnknownPlayer)?;
        let flag_team = entry.session.drop_carried(actor, at)?;

        let return_in_secs = self.config.rules.flag_return_secs;
        if let Some(stale) = entry.flag_timers[flag_team].take() {
            self.scheduler.cancel(stale);
        }
        entry.flag_timers[flag_team] = Some(self.scheduler.schedule(
            self.config.secs_to_ticks(return_in_secs),
            None,
            TimerOwner::Match(arena.clone()),
            TimerEvent::FlagAutoReturn { team: flag_team },
        ));

        self.cancel_interaction(actor, None);
        self.emit(
            &arena,
            MatchEvent::FlagDropped {
                actor,
                flag_team,
                at,
                return_in_secs,
            },
        );
        Ok(flag_team)
    }

    /// Register a death reported by the host.
    ///
    /// A killer is credited only when it is an enemy in the same match.
    pub fn handle_death(
        &mut self,
        victim: ActorId,
        killer: Option<ActorId>,
    ) -> Result<(), ActionRejected> {
        let arena = self
            .arena_of(victim)
            .map(str::to_string)
            .ok_or(ActionRejected::UnknownPlayer)?;
        let entry = self
            .matches
            .get_mut(&arena)
            .ok_or(ActionRejected::UnknownPlayer)?;
        let outcome = entry.session.handle_death(victim, killer)?;

        self.cancel_interaction(victim, None);
        if let Some(handle) = self
            .actors
            .get_mut(&victim)
            .and_then(|a| a.protection_timer.take())
        {
            self.scheduler.cancel(handle);
        }

        if let Some(flag_team) = outcome.returned_flag {
            self.emit(&arena, MatchEvent::FlagReturned { flag_team, by: None });
        }
        let credit = outcome.credit;
        self.emit(
            &arena,
            MatchEvent::Kill {
                victim,
                killer,
                killer_team: credit.as_ref().map(|c| c.team),
                team_kills: credit.as_ref().map_or(0, |c| c.team_kills),
            },
        );

        if let Some(credit) = credit {
            self.emit_levels(&arena, credit.killer, &credit.levels);

            let streak = self.actors.get_mut(&credit.killer).map(|a| {
                a.kill_streak += 1;
                a.kill_streak
            });
            if let Some(streak) = streak
                && self.milestones.binary_search(&streak).is_ok()
            {
                self.emit(
                    &arena,
                    MatchEvent::KillStreak {
                        actor: credit.killer,
                        streak,
                    },
                );
            }

            if let Some(tier) = credit.enhancement_raised {
                self.emit(
                    &arena,
                    MatchEvent::TeamEnhancement {
                        team: credit.team,
                        tier,
                    },
                );
            }

            if credit.limit_reached {
                self.end_match(&arena, EndReason::KillLimit, Some(credit.team));
                return Ok(());
            }
        }

        if self.match_state(&arena) == Some(MatchState::Playing) {
            self.schedule_respawn(victim);
        }
        Ok(())
    }

    /// Whether `attacker` may hurt `victim` right now.
    pub fn can_damage(&self, attacker: ActorId, victim: ActorId) -> bool {
        let (Some(arena), Some(victim_arena)) = (self.arena_of(attacker), self.arena_of(victim))
        else {
            return false;
        };
        if arena != victim_arena {
            return false;
        }
        let Some(session) = self.match_session(arena) else {
            return false;
        };
        if session.state() != MatchState::Playing {
            return false;
        }
        let (Some(a), Some(v)) = (session.player(attacker), session.player(victim)) else {
            return false;
        };
        let (Some(attacker_team), Some(victim_team)) = (a.team(), v.team()) else {
            return false;
        };
        attacker_team != victim_team
            && a.is_alive()
            && v.is_alive()
            && !v.is_spawn_protected()
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Advance one tick and dispatch every timer that fired.
    ///
    /// Returns the new tick.
    pub fn step(&mut self) -> Tick {
        for fired in self.scheduler.advance() {
            if !self.scheduler.is_live(fired.handle) {
                continue;
            }
            debug!(
                tick = self.scheduler.now(),
                event = fired.event.as_str(),
                "timer fired"
            );
            self.dispatch(fired);
        }
        self.scheduler.now()
    }

    fn dispatch(&mut self, fired: FiredTimer) {
        match (fired.owner, fired.event) {
            (TimerOwner::Match(arena), TimerEvent::Countdown) => self.on_countdown(&arena),
            (TimerOwner::Match(arena), TimerEvent::MatchClock) => self.on_clock(&arena),
            (TimerOwner::Match(arena), TimerEvent::FlagAutoReturn { team }) => {
                self.on_flag_auto_return(&arena, team);
            }
            (TimerOwner::Match(arena), TimerEvent::Cleanup) => self.discard_match(&arena),
            (_, TimerEvent::InteractionHold { actor }) => self.on_interaction_hold(actor),
            (_, TimerEvent::Respawn { actor }) => self.on_respawn(actor),
            (_, TimerEvent::SpawnProtectionExpired { actor }) => {
                self.on_protection_expired(actor);
            }
            (_, TimerEvent::ReconnectGrace { actor }) => self.on_grace_expired(actor),
            (_, TimerEvent::LeaveConfirmExpired { actor }) => {
                if let Some(actor_entry) = self.actors.get_mut(&actor) {
                    actor_entry.leave_timer = None;
                }
                debug!(actor, "leave request expired");
            }
            (TimerOwner::Actor(_), _) => {}
        }
    }

    // ------------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------------

    /// End the match on `arena` from outside.
    ///
    /// A running match settles as `Aborted` and is discarded after the
    /// cleanup delay; any other match is discarded immediately.
    pub fn force_end(&mut self, arena: &str) -> bool {
        match self.match_state(arena) {
            None => false,
            Some(MatchState::Playing) => {
                self.end_match(arena, EndReason::Aborted, None);
                true
            }
            Some(_) => {
                self.discard_match(arena);
                true
            }
        }
    }

    /// Settle running matches and release everyone.
    pub fn shutdown(&mut self) {
        let arenas: Vec<ArenaId> = self.matches.keys().cloned().collect();
        for arena in &arenas {
            if self.match_state(arena) == Some(MatchState::Playing) {
                self.end_match(arena, EndReason::Aborted, None);
            }
            self.discard_match(arena);
        }
        info!(matches = arenas.len(), "orchestrator shut down");
    }

    // ------------------------------------------------------------------------
    // Lifecycle (internal)
    // ------------------------------------------------------------------------

    fn emit(&mut self, arena: &str, event: MatchEvent) {
        let envelope = EventEnvelope {
            tick: self.scheduler.now(),
            arena: arena.to_string(),
            event,
        };
        if let Some(journal) = self
            .matches
            .get_mut(arena)
            .and_then(|m| m.journal.as_mut())
        {
            journal.record(envelope.to_proto());
        }
        self.outbox.push(envelope);
    }

    fn emit_levels(&mut self, arena: &str, actor: ActorId, levels: &[u32]) {
        for &level in levels {
            self.emit(arena, MatchEvent::LevelUp { actor, level });
        }
    }

    fn second(&self) -> Tick {
        self.config.secs_to_ticks(1)
    }

    /// Waiting -> Starting once enough players are attached.
    fn evaluate_start(&mut self, arena: &str) {
        let second = self.second();
        let Some(entry) = self.matches.get_mut(arena) else {
            return;
        };
        if !entry.session.begin_countdown() {
            return;
        }
        let seconds = entry.session.countdown_remaining();
        if seconds == 0 {
            self.start_match(arena);
            return;
        }
        entry.countdown_timer = Some(self.scheduler.schedule(
            second,
            Some(second),
            TimerOwner::Match(arena.to_string()),
            TimerEvent::Countdown,
        ));
        info!(arena, seconds, "countdown started");
        self.emit(arena, MatchEvent::MatchStarting { seconds });
    }

    fn on_countdown(&mut self, arena: &str) {
        let Some(entry) = self.matches.get_mut(arena) else {
            return;
        };
        let step = entry.session.countdown_tick();
        match step {
            CountdownStep::Remaining(seconds) => {
                self.emit(arena, MatchEvent::MatchStarting { seconds });
            }
            CountdownStep::Elapsed => self.start_match(arena),
            CountdownStep::Inactive => {
                if let Some(handle) = entry.countdown_timer.take() {
                    self.scheduler.cancel(handle);
                }
            }
        }
    }

    /// Starting -> Playing: balance teams, spawn flags, start the clock.
    fn start_match(&mut self, arena: &str) {
        let second = self.second();
        let Some(entry) = self.matches.get_mut(arena) else {
            return;
        };
        if let Some(handle) = entry.countdown_timer.take() {
            self.scheduler.cancel(handle);
        }
        let Some(bases) = entry.arena.flag_bases() else {
            warn!(arena, "flag bases missing at start");
            return;
        };
        if !entry.session.start(bases, &mut self.rng) {
            return;
        }
        entry.clock_timer = Some(self.scheduler.schedule(
            second,
            Some(second),
            TimerOwner::Match(arena.to_string()),
            TimerEvent::MatchClock,
        ));

        let duration_secs = entry.session.remaining_secs();
        let teams = TeamMap::from_fn(|team| entry.session.team_members(team));
        let spawns: Vec<(ActorId, Team)> = entry
            .session
            .players()
            .filter_map(|p| p.team().map(|team| (p.actor(), team)))
            .collect();

        info!(
            arena,
            red = teams.red.len(),
            blue = teams.blue.len(),
            "match started"
        );
        self.emit(
            arena,
            MatchEvent::MatchStarted {
                duration_secs,
                teams,
            },
        );
        for (actor, team) in spawns {
            self.spawn_player(arena, actor, team, 0);
        }
    }

    /// Put `actor` at its team spawn with spawn protection.
    fn spawn_player(&mut self, arena: &str, actor: ActorId, team: Team, enhancement_tier: u8) {
        let protection_secs = self.config.rules.spawn_protection_secs;
        let Some(entry) = self.matches.get_mut(arena) else {
            return;
        };
        let at = entry.arena.spawn(team);
        if let Some(player) = entry.session.player_mut(actor) {
            player.set_spawn_protected(protection_secs > 0);
        }

        if let Some(actor_entry) = self.actors.get_mut(&actor) {
            if at.is_some() {
                actor_entry.position = at;
            }
            if let Some(stale) = actor_entry.protection_timer.take() {
                self.scheduler.cancel(stale);
            }
            if protection_secs > 0 {
                actor_entry.protection_timer = Some(self.scheduler.schedule(
                    self.config.secs_to_ticks(protection_secs),
                    None,
                    TimerOwner::Actor(actor),
                    TimerEvent::SpawnProtectionExpired { actor },
                ));
            }
        }

        self.emit(
            arena,
            MatchEvent::Spawned {
                actor,
                team,
                at,
                enhancement_tier,
                protection_secs,
            },
        );
    }

    fn schedule_respawn(&mut self, actor: ActorId) {
        let delay = self.config.secs_to_ticks(self.config.rules.respawn_delay_secs);
        let Some(actor_entry) = self.actors.get_mut(&actor) else {
            return;
        };
        if let Some(stale) = actor_entry.respawn_timer.take() {
            self.scheduler.cancel(stale);
        }
        actor_entry.respawn_timer = Some(self.scheduler.schedule(
            delay,
            None,
            TimerOwner::Actor(actor),
            TimerEvent::Respawn { actor },
        ));
    }

    fn on_respawn(&mut self, actor: ActorId) {
        let Some(actor_entry) = self.actors.get_mut(&actor) else {
            return;
        };
        actor_entry.respawn_timer = None;
        let arena = actor_entry.arena.clone();
        let Some(entry) = self.matches.get_mut(&arena) else {
            return;
        };
        let Ok(tier) = entry.session.respawn(actor) else {
            return;
        };
        let Some(team) = entry.session.player(actor).and_then(PlayerSession::team) else {
            return;
        };
        self.spawn_player(&arena, actor, team, tier);
    }

    fn on_protection_expired(&mut self, actor: ActorId) {
        let Some(actor_entry) = self.actors.get_mut(&actor) else {
            return;
        };
        actor_entry.protection_timer = None;
        if let Some(player) = self
            .matches
            .get_mut(&actor_entry.arena)
            .and_then(|m| m.session.player_mut(actor))
        {
            player.set_spawn_protected(false);
        }
    }

    fn on_grace_expired(&mut self, actor: ActorId) {
        let Some(actor_entry) = self.actors.get_mut(&actor) else {
            return;
        };
        actor_entry.grace_timer = None;
        let disconnected = self
            .session(actor)
            .is_some_and(|p| !p.is_connected());
        if disconnected {
            info!(actor, "reconnect grace expired");
            self.release(actor);
        }
    }

    fn on_clock(&mut self, arena: &str) {
        let Some(entry) = self.matches.get_mut(arena) else {
            return;
        };
        match entry.session.tick_clock() {
            ClockStep::Running(_) => {}
            ClockStep::Expired => {
                let winner = entry.session.timeout_winner();
                self.end_match(arena, EndReason::TimeExpired, winner);
            }
            ClockStep::Inactive => {
                if let Some(handle) = entry.clock_timer.take() {
                    self.scheduler.cancel(handle);
                }
            }
        }
    }

    fn on_flag_auto_return(&mut self, arena: &str, flag_team: Team) {
        let Some(entry) = self.matches.get_mut(arena) else {
            return;
        };
        entry.flag_timers[flag_team] = None;
        if entry.session.auto_return(flag_team) {
            self.emit(arena, MatchEvent::FlagReturned { flag_team, by: None });
        }
    }

    /// Housekeeping after an actor left `arena`.
    fn after_departure(&mut self, arena: &str) {
        let Some(entry) = self.matches.get_mut(arena) else {
            return;
        };
        if entry.session.is_empty() {
            self.remove_match(arena);
            return;
        }
        match entry.session.state() {
            MatchState::Starting => {
                if !entry.session.cancel_countdown() {
                    return;
                }
                if let Some(handle) = entry.countdown_timer.take() {
                    self.scheduler.cancel(handle);
                }
                let players = entry.session.player_count();
                let min_players = entry.session.limits().min_players;
                info!(arena, players, min_players, "countdown stopped");
                self.emit(
                    arena,
                    MatchEvent::CountdownStopped {
                        players,
                        min_players,
                    },
                );
            }
            MatchState::Playing if entry.session.player_count() < 2 => {
                self.end_match(arena, EndReason::NotEnoughPlayers, None);
            }
            MatchState::Waiting | MatchState::Playing | MatchState::Ending => {}
        }
    }

    /// Playing -> Ending: settle, pay out, seal the journal and schedule cleanup.
    fn end_match(&mut self, arena: &str, reason: EndReason, winner: Option<Team>) {
        let cleanup_delay = self
            .config
            .secs_to_ticks(self.config.rules.cleanup_delay_secs);
        let Some(entry) = self.matches.get_mut(arena) else {
            return;
        };
        let result = MatchResult { winner, reason };
        if !entry.session.end(result) {
            return;
        }
        for handle in entry.take_timers() {
            self.scheduler.cancel(handle);
        }

        let scores = entry.session.scores();
        let kills = entry.session.kills();
        let summaries = entry.session.summaries();
        let mvp = entry.session.mvp();
        let actors = entry.session.actors();

        for attempt in self.interactions.remove_arena(arena) {
            if let Some(handle) = attempt.timer {
                self.scheduler.cancel(handle);
            }
        }
        for actor in &actors {
            if let Some(actor_entry) = self.actors.get_mut(actor) {
                actor_entry.kill_streak = 0;
                for handle in [
                    actor_entry.respawn_timer.take(),
                    actor_entry.protection_timer.take(),
                ]
                .into_iter()
                .flatten()
                {
                    self.scheduler.cancel(handle);
                }
            }
        }

        info!(
            arena,
            reason = reason.as_str(),
            winner = winner.map_or("none", Team::as_str),
            red = scores.red,
            blue = scores.blue,
            "match ended"
        );
        self.emit(
            arena,
            MatchEvent::MatchEnded {
                result,
                scores,
                kills,
                summaries: summaries.clone(),
                mvp,
            },
        );
        for summary in &summaries {
            let lines = rewards::reward_lines(&self.config.rewards, summary, winner);
            if !lines.is_empty() {
                self.emit(
                    arena,
                    MatchEvent::Reward {
                        actor: summary.actor,
                        lines,
                    },
                );
            }
        }

        let end_tick = self.scheduler.now();
        if let Some(entry) = self.matches.get_mut(arena) {
            if let Some(journal) = entry.journal.take() {
                self.finished
                    .push(journal.finalize(end_tick, reason.as_str(), winner));
            }
            entry.cleanup_timer = Some(self.scheduler.schedule(
                cleanup_delay,
                None,
                TimerOwner::Match(arena.to_string()),
                TimerEvent::Cleanup,
            ));
        }
    }

    /// Release everyone still attached and drop the match.
    ///
    /// Departures skip `after_departure`: a match on its way out announces
    /// nothing further.
    fn discard_match(&mut self, arena: &str) {
        let actors = self
            .match_session(arena)
            .map(MatchSession::actors)
            .unwrap_or_default();
        for actor in actors {
            self.detach_actor(actor);
        }
        self.remove_match(arena);
    }

    /// Cancel the actor's attempt and timers, detach its session and persist
    /// its progression. Returns the arena it left.
    fn detach_actor(&mut self, actor: ActorId) -> Option<ArenaId> {
        let arena = self.actors.remove(&actor)?.arena;
        self.cancel_interaction(actor, None);
        self.scheduler.cancel_owner(&TimerOwner::Actor(actor));

        let Some(entry) = self.matches.get_mut(&arena) else {
            return Some(arena);
        };
        let playing = entry.session.state() == MatchState::Playing;
        let Some(detached) = entry.session.detach(actor) else {
            return Some(arena);
        };
        if playing && let Some(flag_team) = detached.returned_flag {
            self.emit(&arena, MatchEvent::FlagReturned { flag_team, by: None });
        }

        let progression = detached.session.into_progression();
        if let Err(err) = self.store.save(actor, &progression) {
            warn!(actor, error = %err, "progression save failed");
        }
        debug!(actor, arena = %arena, "actor released");
        Some(arena)
    }

    fn remove_match(&mut self, arena: &str) {
        let Some(mut entry) = self.matches.remove(arena) else {
            return;
        };
        for handle in entry.take_timers() {
            self.scheduler.cancel(handle);
        }
        self.scheduler
            .cancel_owner(&TimerOwner::Match(arena.to_string()));
        for attempt in self.interactions.remove_arena(arena) {
            if let Some(handle) = attempt.timer {
                self.scheduler.cancel(handle);
            }
        }
        info!(arena, "match discarded");
    }

    // ------------------------------------------------------------------------
    // Interactions (internal)
    // ------------------------------------------------------------------------

    fn begin_interaction(
        &mut self,
        actor: ActorId,
        arena: ArenaId,
        kind: InteractionKind,
        flag_team: Team,
        target: Position,
        origin: Origin,
    ) -> Result<(), InteractionRejected> {
        let hold_secs = self.config.interaction.hold_secs;
        let mut attempt = InteractionAttempt {
            actor,
            arena,
            kind,
            flag_team,
            target,
            remaining_secs: hold_secs,
            origin,
            timer: None,
        };
        if hold_secs == 0 {
            debug!(actor, kind = kind.as_str(), "instant interaction");
            return self.execute_interaction(&attempt).map_err(Into::into);
        }

        let second = self.second();
        let handle = self.scheduler.schedule(
            second,
            Some(second),
            TimerOwner::Actor(actor),
            TimerEvent::InteractionHold { actor },
        );
        attempt.timer = Some(handle);
        let arena = attempt.arena.clone();
        if let Err(err) = self.interactions.begin(attempt) {
            self.scheduler.cancel(handle);
            return Err(err);
        }
        debug!(actor, kind = kind.as_str(), hold_secs, "interaction started");
        self.emit(
            &arena,
            MatchEvent::InteractionProgress {
                actor,
                kind,
                remaining_secs: hold_secs,
            },
        );
        Ok(())
    }

    /// Automatic mode: a carrier entering its own capture zone starts a capture.
    fn try_auto_capture(&mut self, actor: ActorId, arena: &str, position: Position) {
        let Some(entry) = self.matches.get(arena) else {
            return;
        };
        if entry.session.state() != MatchState::Playing {
            return;
        }
        let Some(player) = entry.session.player(actor) else {
            return;
        };
        let (Some(team), Some(flag_team)) = (player.team(), player.carried_flag()) else {
            return;
        };
        let Some(capture_point) = entry.arena.capture_point(team) else {
            return;
        };
        let config = &self.config.interaction;
        if !capture_point.within(&position, config.auto_capture_radius) {
            return;
        }
        if interaction::precondition(
            &entry.session,
            actor,
            InteractionKind::Capture,
            flag_team,
            &capture_point,
            config.radius,
        )
        .is_err()
        {
            return;
        }
        if let Err(err) = self.begin_interaction(
            actor,
            arena.to_string(),
            InteractionKind::Capture,
            flag_team,
            capture_point,
            Origin::Automatic,
        ) {
            debug!(actor, error = %err, "automatic capture not started");
        }
    }

    fn on_interaction_hold(&mut self, actor: ActorId) {
        let Some(attempt) = self.interactions.get(actor) else {
            return;
        };
        let still_valid = self.matches.get(&attempt.arena).is_some_and(|entry| {
            interaction::precondition(
                &entry.session,
                actor,
                attempt.kind,
                attempt.flag_team,
                &attempt.target,
                self.config.interaction.radius,
            )
            .is_ok()
        });
        if !still_valid {
            debug!(actor, "interaction precondition lost");
            self.cancel_interaction(actor, None);
            return;
        }

        let kind = attempt.kind;
        let arena = attempt.arena.clone();
        match self.interactions.tick(actor) {
            Some(0) => self.complete_interaction(actor),
            Some(remaining_secs) => self.emit(
                &arena,
                MatchEvent::InteractionProgress {
                    actor,
                    kind,
                    remaining_secs,
                },
            ),
            None => {}
        }
    }

    fn complete_interaction(&mut self, actor: ActorId) {
        let Some(attempt) = self.interactions.remove(actor) else {
            return;
        };
        if let Some(handle) = attempt.timer {
            self.scheduler.cancel(handle);
        }
        if let Err(rejected) = self.execute_interaction(&attempt) {
            debug!(actor, code = rejected.code(), "interaction failed at completion");
        }
    }

    /// Remove the actor's attempt; announce it only when `reason` is given.
    fn cancel_interaction(&mut self, actor: ActorId, reason: Option<CancelReason>) {
        let Some(attempt) = self.interactions.remove(actor) else {
            return;
        };
        if let Some(handle) = attempt.timer {
            self.scheduler.cancel(handle);
        }
        debug!(actor, kind = attempt.kind.as_str(), "interaction cancelled");
        if let Some(reason) = reason {
            self.emit(
                &attempt.arena,
                MatchEvent::InteractionCancelled {
                    actor,
                    kind: attempt.kind,
                    reason,
                },
            );
        }
    }

    /// Run the match operation behind a finished attempt.
    fn execute_interaction(&mut self, attempt: &InteractionAttempt) -> Result<(), ActionRejected> {
        let arena = attempt.arena.as_str();
        let actor = attempt.actor;
        let flag_team = attempt.flag_team;
        let entry = self
            .matches
            .get_mut(arena)
            .ok_or(ActionRejected::NotPlaying)?;

        match attempt.kind {
            InteractionKind::Take => {
                entry.session.take_flag(actor, flag_team)?;
                self.emit(arena, MatchEvent::FlagTaken { actor, flag_team });
            }
            InteractionKind::Pickup => {
                entry.session.pickup_flag(actor, flag_team)?;
                if let Some(handle) = entry.flag_timers[flag_team].take() {
                    self.scheduler.cancel(handle);
                }
                self.emit(arena, MatchEvent::FlagPickedUp { actor, flag_team });
            }
            InteractionKind::Return => {
                let levels = entry.session.return_flag(actor, flag_team)?;
                if let Some(handle) = entry.flag_timers[flag_team].take() {
                    self.scheduler.cancel(handle);
                }
                self.emit(
                    arena,
                    MatchEvent::FlagReturned {
                        flag_team,
                        by: Some(actor),
                    },
                );
                self.emit_levels(arena, actor, &levels);
            }
            InteractionKind::Capture => {
                let outcome = entry.session.capture_flag(actor)?;
                info!(
                    arena,
                    actor,
                    team = outcome.team.as_str(),
                    score = outcome.score,
                    "flag captured"
                );
                self.emit(
                    arena,
                    MatchEvent::FlagCaptured {
                        actor,
                        team: outcome.team,
                        flag_team: outcome.flag_team,
                        score: outcome.score,
                    },
                );
                self.emit_levels(arena, actor, &outcome.levels);
                if outcome.limit_reached {
                    self.end_match(arena, EndReason::CaptureLimit, Some(outcome.team));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use flagfall_journal::verify_record;
    use flagfall_sim::MatchRules;

    const ARENA: &str = "canyon";
    const RED_BASE: Position = Position::new(-50.0, 64.0, 0.0);
    const BLUE_BASE: Position = Position::new(50.0, 64.0, 0.0);
    const RED_CAPTURE: Position = Position::new(-45.0, 64.0, 0.0);
    const BLUE_CAPTURE: Position = Position::new(45.0, 64.0, 0.0);
    const MIDFIELD: Position = Position::new(0.0, 64.0, 0.0);

    type Orchestrator = MatchOrchestrator<StaticArenas, MemoryProgressionStore>;

    fn canyon() -> ArenaConfig {
        ArenaConfig::new(
            ARENA,
            TeamMap::new(
                Position::new(-60.0, 64.0, 0.0),
                Position::new(60.0, 64.0, 0.0),
            ),
            TeamMap::new(RED_BASE, BLUE_BASE),
            TeamMap::new(RED_CAPTURE, BLUE_CAPTURE),
        )
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            seed: Some(7),
            rules: MatchRules {
                countdown_secs: 3,
                duration_secs: 60,
                respawn_delay_secs: 2,
                spawn_protection_secs: 1,
                flag_return_secs: 5,
                cleanup_delay_secs: 2,
                ..Default::default()
            },
            interaction: InteractionConfig {
                hold_secs: 2,
                ..Default::default()
            },
            session: SessionConfig {
                reconnect_grace_secs: 3,
                leave_confirm_secs: 2,
            },
            arenas: vec![canyon()],
            ..Default::default()
        }
    }

    fn orchestrator(config: ServerConfig) -> Orchestrator {
        MatchOrchestrator::with_static_arenas(config, MemoryProgressionStore::new()).unwrap()
    }

    fn advance_secs(o: &mut Orchestrator, secs: u32) {
        for _ in 0..o.config().secs_to_ticks(secs) {
            o.step();
        }
    }

    /// Two players, countdown elapsed. Returns `(orchestrator, red, blue)`.
    fn duel(config: ServerConfig) -> (Orchestrator, ActorId, ActorId) {
        let mut o = orchestrator(config);
        o.admit(1, "alice", ARENA).unwrap();
        o.admit(2, "bob", ARENA).unwrap();
        advance_secs(&mut o, 3);
        assert_eq!(o.match_state(ARENA), Some(MatchState::Playing));

        let session = o.match_session(ARENA).unwrap();
        let red = session.team_members(Team::Red)[0];
        let blue = session.team_members(Team::Blue)[0];
        (o, red, blue)
    }

    /// Walk `actor` to `at` and complete a manual hold there.
    fn hold_at(o: &mut Orchestrator, actor: ActorId, at: Position) -> InteractionKind {
        o.handle_move(actor, at);
        let kind = o.interact(actor, at).unwrap();
        advance_secs(o, 2);
        kind
    }

    fn names(events: &[EventEnvelope]) -> Vec<&'static str> {
        events.iter().map(|e| e.event.name()).collect()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ServerConfig {
            tick_rate_hz: 0,
            ..Default::default()
        };
        assert!(MatchOrchestrator::with_static_arenas(config, MemoryProgressionStore::new()).is_err());
    }

    #[test]
    fn test_min_to_start_with_eight_players() {
        let mut config = test_config();
        config.rules.min_players = 8;
        let mut o = orchestrator(config);

        for actor in 1..=7 {
            o.admit(actor, format!("p{actor}"), ARENA).unwrap();
        }
        assert_eq!(o.match_state(ARENA), Some(MatchState::Waiting));

        o.admit(8, "p8", ARENA).unwrap();
        assert_eq!(o.match_state(ARENA), Some(MatchState::Starting));
        let events = o.drain_events();
        assert_eq!(
            events.last().map(|e| &e.event),
            Some(&MatchEvent::MatchStarting { seconds: 3 })
        );

        advance_secs(&mut o, 1);
        assert!(o.release(8));
        assert_eq!(o.match_state(ARENA), Some(MatchState::Waiting));
        let events = o.drain_events();
        assert_eq!(
            events.last().map(|e| &e.event),
            Some(&MatchEvent::CountdownStopped {
                players: 7,
                min_players: 8
            })
        );

        // The stopped countdown never starts the match
        advance_secs(&mut o, 5);
        assert_eq!(o.match_state(ARENA), Some(MatchState::Waiting));

        o.admit(9, "p9", ARENA).unwrap();
        advance_secs(&mut o, 3);
        assert_eq!(o.match_state(ARENA), Some(MatchState::Playing));
        let session = o.match_session(ARENA).unwrap();
        assert_eq!(session.team_members(Team::Red).len(), 4);
        assert_eq!(session.team_members(Team::Blue).len(), 4);
    }

    #[test]
    fn test_countdown_announces_every_second() {
        let mut o = orchestrator(test_config());
        o.admit(1, "alice", ARENA).unwrap();
        o.admit(2, "bob", ARENA).unwrap();
        advance_secs(&mut o, 3);

        let events = o.drain_events();
        let countdown: Vec<u32> = events
            .iter()
            .filter_map(|e| match e.event {
                MatchEvent::MatchStarting { seconds } => Some(seconds),
                _ => None,
            })
            .collect();
        assert_eq!(countdown, vec![3, 2, 1]);
        assert_eq!(
            &names(&events)[3..],
            ["match_started", "spawned", "spawned"]
        );
    }

    #[test]
    fn test_zero_countdown_starts_immediately() {
        let mut config = test_config();
        config.rules.countdown_secs = 0;
        let mut o = orchestrator(config);
        o.admit(1, "alice", ARENA).unwrap();
        o.admit(2, "bob", ARENA).unwrap();
        assert_eq!(o.match_state(ARENA), Some(MatchState::Playing));
    }

    #[test]
    fn test_full_match_to_capture_limit() {
        let (mut o, red, blue) = duel(test_config());
        assert_eq!(o.position(red), Some(Position::new(-60.0, 64.0, 0.0)));

        for round in 1..=3 {
            assert_eq!(hold_at(&mut o, red, BLUE_BASE), InteractionKind::Take);
            assert_eq!(o.session(red).unwrap().carried_flag(), Some(Team::Blue));
            assert_eq!(hold_at(&mut o, red, RED_CAPTURE), InteractionKind::Capture);
            assert_eq!(o.scores(ARENA).map(|s| s.red), Some(round));
        }

        assert_eq!(o.match_state(ARENA), Some(MatchState::Ending));
        let session = o.match_session(ARENA).unwrap();
        assert_eq!(
            session.result(),
            Some(MatchResult {
                winner: Some(Team::Red),
                reason: EndReason::CaptureLimit,
            })
        );
        assert!(o.flag(ARENA, Team::Blue).unwrap().is_at_base());

        let events = o.drain_events();
        let ended = events
            .iter()
            .find_map(|e| match &e.event {
                MatchEvent::MatchEnded { mvp, summaries, .. } => Some((*mvp, summaries.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(ended.0, Some(red));
        assert_eq!(ended.1[0].captures, 3);
        let rewarded: Vec<ActorId> = events
            .iter()
            .filter_map(|e| match e.event {
                MatchEvent::Reward { actor, .. } => Some(actor),
                _ => None,
            })
            .collect();
        assert_eq!(rewarded.len(), 2);
        assert_eq!(names(&events).last(), Some(&"reward"));

        let records = o.take_finished_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].end_reason, "capture_limit");
        verify_record(&records[0]).unwrap();

        // Cleanup releases everyone and persists progression
        advance_secs(&mut o, 2);
        assert_eq!(o.match_state(ARENA), None);
        assert_eq!(o.arena_of(red), None);
        let stored = o.store().get(red).unwrap();
        assert_eq!(stored.games_played, 1);
        assert_eq!(stored.games_won, 1);
        assert_eq!(stored.lifetime_captures, 3);
        assert_eq!(o.store().get(blue).unwrap().games_won, 0);
    }

    #[test]
    fn test_killed_carrier_returns_flag_and_respawns_protected() {
        let (mut o, red, blue) = duel(test_config());
        hold_at(&mut o, red, BLUE_BASE);
        o.drain_events();

        assert!(o.can_damage(blue, red));
        o.handle_death(red, Some(blue)).unwrap();
        assert!(o.flag(ARENA, Team::Blue).unwrap().is_at_base());
        assert!(!o.session(red).unwrap().is_alive());
        assert!(!o.can_damage(blue, red));

        let events = o.drain_events();
        assert_eq!(
            events[0].event,
            MatchEvent::FlagReturned {
                flag_team: Team::Blue,
                by: None
            }
        );
        assert_eq!(
            events[1].event,
            MatchEvent::Kill {
                victim: red,
                killer: Some(blue),
                killer_team: Some(Team::Blue),
                team_kills: 1,
            }
        );

        // A dead player cannot die again
        assert_eq!(o.handle_death(red, Some(blue)), Err(ActionRejected::Dead));

        advance_secs(&mut o, 2);
        let player = o.session(red).unwrap();
        assert!(player.is_alive());
        assert!(player.is_spawn_protected());
        assert!(!o.can_damage(blue, red));
        assert!(
            o.drain_events()
                .iter()
                .any(|e| matches!(e.event, MatchEvent::Spawned { actor, .. } if actor == red))
        );

        advance_secs(&mut o, 1);
        assert!(o.can_damage(blue, red));
        assert!(!o.can_damage(red, red));
    }

    #[test]
    fn test_kill_limit_and_streak_milestone() {
        let mut config = test_config();
        config.rules.kill_limit = 2;
        config.kill_streak_milestones = vec![2];
        let (mut o, red, blue) = duel(config);

        o.handle_death(red, Some(blue)).unwrap();
        advance_secs(&mut o, 2);
        assert_eq!(o.kill_streak(blue), 1);
        o.handle_death(red, Some(blue)).unwrap();

        let events = o.drain_events();
        assert!(events.iter().any(|e| e.event
            == MatchEvent::KillStreak {
                actor: blue,
                streak: 2
            }));
        let session = o.match_session(ARENA).unwrap();
        assert_eq!(
            session.result(),
            Some(MatchResult {
                winner: Some(Team::Blue),
                reason: EndReason::KillLimit,
            })
        );
        // Streaks reset at match end
        assert_eq!(o.kill_streak(blue), 0);
    }

    #[test]
    fn test_suicide_is_not_credited() {
        let (mut o, red, _) = duel(test_config());
        o.handle_death(red, Some(red)).unwrap();
        assert_eq!(o.match_session(ARENA).unwrap().kills(), TeamMap::new(0, 0));
        assert_eq!(o.kill_streak(red), 0);
    }

    #[test]
    fn test_time_expiry_without_score_is_a_draw() {
        let mut config = test_config();
        config.rules.duration_secs = 5;
        let (mut o, _, _) = duel(config);
        advance_secs(&mut o, 4);
        assert_eq!(o.remaining_secs(ARENA), Some(1));
        advance_secs(&mut o, 1);

        let result = o.match_session(ARENA).unwrap().result().unwrap();
        assert_eq!(result.winner, None);
        assert_eq!(result.reason, EndReason::TimeExpired);
        let records = o.take_finished_records();
        verify_record(&records[0]).unwrap();
    }

    #[test]
    fn test_moving_away_cancels_hold() {
        let (mut o, red, _) = duel(test_config());
        o.handle_move(red, BLUE_BASE);
        o.interact(red, BLUE_BASE).unwrap();
        assert_eq!(
            o.interact(red, BLUE_BASE),
            Err(InteractionRejected::AlreadyInteracting)
        );
        o.drain_events();

        o.handle_move(red, Position::new(40.0, 64.0, 0.0));
        assert!(o.active_interaction(red).is_none());
        assert_eq!(
            o.drain_events()[0].event,
            MatchEvent::InteractionCancelled {
                actor: red,
                kind: InteractionKind::Take,
                reason: CancelReason::MovedAway,
            }
        );

        advance_secs(&mut o, 3);
        assert!(o.flag(ARENA, Team::Blue).unwrap().is_at_base());
    }

    #[test]
    fn test_interact_rejections() {
        let (mut o, red, _) = duel(test_config());
        assert_eq!(
            o.interact(99, BLUE_BASE),
            Err(InteractionRejected::NotInMatch)
        );
        assert_eq!(
            o.interact(red, MIDFIELD),
            Err(InteractionRejected::NothingToInteract)
        );
        // Red still stands at its spawn
        assert!(matches!(
            o.interact(red, BLUE_BASE),
            Err(InteractionRejected::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_instant_interaction_with_zero_hold() {
        let mut config = test_config();
        config.interaction.hold_secs = 0;
        let (mut o, red, _) = duel(config);
        o.handle_move(red, BLUE_BASE);
        assert_eq!(o.interact(red, BLUE_BASE), Ok(InteractionKind::Take));
        assert_eq!(o.session(red).unwrap().carried_flag(), Some(Team::Blue));
        assert!(o.active_interaction(red).is_none());
    }

    #[test]
    fn test_dropped_flag_returns_automatically() {
        let (mut o, red, _) = duel(test_config());
        hold_at(&mut o, red, BLUE_BASE);
        assert_eq!(o.drop_flag(red, MIDFIELD), Ok(Team::Blue));
        assert!(o.flag(ARENA, Team::Blue).unwrap().is_dropped());
        assert_eq!(o.drop_flag(red, MIDFIELD), Err(ActionRejected::NotCarrying));
        o.drain_events();

        advance_secs(&mut o, 5);
        assert!(o.flag(ARENA, Team::Blue).unwrap().is_at_base());
        assert_eq!(
            o.drain_events()
                .iter()
                .map(|e| &e.event)
                .find(|e| matches!(e, MatchEvent::FlagReturned { .. })),
            Some(&MatchEvent::FlagReturned {
                flag_team: Team::Blue,
                by: None
            })
        );
    }

    #[test]
    fn test_pickup_cancels_auto_return() {
        let (mut o, red, _) = duel(test_config());
        hold_at(&mut o, red, BLUE_BASE);
        o.drop_flag(red, MIDFIELD).unwrap();

        assert_eq!(hold_at(&mut o, red, MIDFIELD), InteractionKind::Pickup);
        advance_secs(&mut o, 5);
        assert_eq!(o.session(red).unwrap().carried_flag(), Some(Team::Blue));
    }

    #[test]
    fn test_defender_returns_dropped_flag() {
        let (mut o, red, blue) = duel(test_config());
        hold_at(&mut o, red, BLUE_BASE);
        o.drop_flag(red, MIDFIELD).unwrap();

        assert_eq!(hold_at(&mut o, blue, MIDFIELD), InteractionKind::Return);
        assert!(o.flag(ARENA, Team::Blue).unwrap().is_at_base());
        assert_eq!(o.session(blue).unwrap().stats().returns, 1);
        assert!(o.drain_events().iter().any(|e| e.event
            == MatchEvent::FlagReturned {
                flag_team: Team::Blue,
                by: Some(blue)
            }));
    }

    #[test]
    fn test_hold_cancelled_when_flag_taken_away() {
        let (mut o, red, blue) = duel(test_config());
        hold_at(&mut o, red, BLUE_BASE);
        o.drop_flag(red, MIDFIELD).unwrap();

        // Blue starts returning, red grabs it back first
        o.handle_move(blue, MIDFIELD);
        o.interact(blue, MIDFIELD).unwrap();
        o.handle_move(red, MIDFIELD);
        o.interact(red, MIDFIELD).unwrap();
        advance_secs(&mut o, 2);

        assert!(o.active_interaction(blue).is_none());
        assert!(o.active_interaction(red).is_none());
        let flag = o.flag(ARENA, Team::Blue).unwrap();
        assert!(flag.carrier().is_some() || flag.is_at_base());
        assert!(o.match_session(ARENA).unwrap().flags_consistent());
    }

    #[test]
    fn test_automatic_capture() {
        let mut config = test_config();
        config.interaction.mode = InteractionMode::Automatic;
        let (mut o, red, _) = duel(config);
        hold_at(&mut o, red, BLUE_BASE);

        // Manual capture is not offered in automatic mode
        o.handle_move(red, MIDFIELD);
        assert_eq!(
            o.interact(red, RED_CAPTURE),
            Err(InteractionRejected::NothingToInteract)
        );

        o.handle_move(red, RED_CAPTURE);
        let attempt = o.active_interaction(red).unwrap();
        assert_eq!(attempt.kind, InteractionKind::Capture);
        assert_eq!(attempt.origin, Origin::Automatic);

        advance_secs(&mut o, 2);
        assert_eq!(o.scores(ARENA).map(|s| s.red), Some(1));
    }

    #[test]
    fn test_leaving_capture_zone_cancels_automatic_capture() {
        let mut config = test_config();
        config.interaction.mode = InteractionMode::Automatic;
        let (mut o, red, _) = duel(config);
        hold_at(&mut o, red, BLUE_BASE);

        o.handle_move(red, RED_CAPTURE);
        o.drain_events();
        o.handle_move(red, MIDFIELD);
        assert_eq!(
            o.drain_events()[0].event,
            MatchEvent::InteractionCancelled {
                actor: red,
                kind: InteractionKind::Capture,
                reason: CancelReason::LeftCaptureZone,
            }
        );
        advance_secs(&mut o, 3);
        assert_eq!(o.scores(ARENA).map(|s| s.red), Some(0));
    }

    #[test]
    fn test_disconnect_and_reconnect_within_grace() {
        let (mut o, red, _) = duel(test_config());
        hold_at(&mut o, red, BLUE_BASE);

        assert!(o.handle_disconnect(red));
        assert!(!o.handle_disconnect(red));
        assert!(o.flag(ARENA, Team::Blue).unwrap().is_at_base());
        assert!(!o.session(red).unwrap().is_connected());

        advance_secs(&mut o, 2);
        assert!(o.handle_reconnect(red));
        assert!(o.session(red).unwrap().is_connected());

        // The cancelled grace timer never fires
        advance_secs(&mut o, 5);
        assert_eq!(o.arena_of(red), Some(ARENA));
        assert_eq!(o.match_state(ARENA), Some(MatchState::Playing));
    }

    #[test]
    fn test_grace_expiry_releases_and_ends_match() {
        let (mut o, red, blue) = duel(test_config());
        o.handle_disconnect(red);
        advance_secs(&mut o, 3);

        assert_eq!(o.arena_of(red), None);
        assert!(o.store().get(red).is_some());
        let result = o.match_session(ARENA).unwrap().result().unwrap();
        assert_eq!(result.reason, EndReason::NotEnoughPlayers);
        assert_eq!(result.winner, None);
        assert_eq!(o.arena_of(blue), Some(ARENA));
    }

    #[test]
    fn test_dead_player_reconnecting_respawns() {
        let (mut o, red, blue) = duel(test_config());
        o.handle_death(red, Some(blue)).unwrap();
        o.handle_disconnect(red);
        advance_secs(&mut o, 2);
        assert!(!o.session(red).unwrap().is_alive());

        o.handle_reconnect(red);
        advance_secs(&mut o, 2);
        assert!(o.session(red).unwrap().is_alive());
    }

    /// Start a manual take on the blue flag and clear the outbox.
    fn begin_take(o: &mut Orchestrator, red: ActorId) {
        o.handle_move(red, BLUE_BASE);
        assert_eq!(o.interact(red, BLUE_BASE), Ok(InteractionKind::Take));
        o.drain_events();
    }

    /// The hold left nothing behind: no attempt, no event, no take later on.
    fn assert_hold_dropped_silently(o: &mut Orchestrator, actor: ActorId) {
        assert!(o.active_interaction(actor).is_none());
        advance_secs(o, 3);
        let events = o.drain_events();
        assert!(!names(&events).contains(&"interaction_cancelled"));
        assert!(!names(&events).contains(&"flag_taken"));
        assert!(!names(&events).contains(&"interaction_progress"));
        assert!(o.flag(ARENA, Team::Blue).unwrap().is_at_base());
    }

    #[test]
    fn test_disconnect_mid_hold_cancels_silently() {
        let mut config = test_config();
        config.session.reconnect_grace_secs = 10;
        let (mut o, red, _) = duel(config);
        begin_take(&mut o, red);
        advance_secs(&mut o, 1);
        o.drain_events();

        assert!(o.handle_disconnect(red));
        assert_hold_dropped_silently(&mut o, red);
    }

    #[test]
    fn test_release_mid_hold_cancels_silently() {
        let mut o = orchestrator(test_config());
        for actor in 1..=3 {
            o.admit(actor, format!("p{actor}"), ARENA).unwrap();
        }
        advance_secs(&mut o, 3);
        let red = o.match_session(ARENA).unwrap().team_members(Team::Red)[0];
        begin_take(&mut o, red);

        assert!(o.release(red));
        assert_eq!(o.match_state(ARENA), Some(MatchState::Playing));
        assert_hold_dropped_silently(&mut o, red);
    }

    #[test]
    fn test_clock_expiry_mid_hold_cancels_silently() {
        let mut config = test_config();
        config.rules.duration_secs = 3;
        config.rules.cleanup_delay_secs = 10;
        let (mut o, red, _) = duel(config);
        advance_secs(&mut o, 2);
        begin_take(&mut o, red);

        advance_secs(&mut o, 1);
        assert_eq!(o.match_state(ARENA), Some(MatchState::Ending));
        let events = o.drain_events();
        assert!(names(&events).contains(&"match_ended"));
        assert!(!names(&events).contains(&"interaction_cancelled"));
        assert_hold_dropped_silently(&mut o, red);
    }

    #[test]
    fn test_force_end_during_countdown_announces_nothing() {
        let mut o = orchestrator(test_config());
        o.admit(1, "alice", ARENA).unwrap();
        o.admit(2, "bob", ARENA).unwrap();
        assert_eq!(o.match_state(ARENA), Some(MatchState::Starting));
        o.drain_events();

        assert!(o.force_end(ARENA));
        assert_eq!(o.match_count(), 0);
        assert!(o.drain_events().is_empty());
        assert!(o.store().get(1).is_some());
        assert!(o.store().get(2).is_some());

        advance_secs(&mut o, 5);
        assert!(o.drain_events().is_empty());
    }

    #[test]
    fn test_leave_confirmation() {
        let (mut o, red, blue) = duel(test_config());
        assert!(!o.confirm_leave(red));

        assert_eq!(o.request_leave(red), Ok(2));
        advance_secs(&mut o, 2);
        assert!(!o.confirm_leave(red));
        assert_eq!(o.arena_of(red), Some(ARENA));

        o.request_leave(blue).unwrap();
        assert!(o.confirm_leave(blue));
        assert_eq!(o.arena_of(blue), None);
        assert_eq!(
            o.request_leave(blue),
            Err(ActionRejected::UnknownPlayer)
        );
    }

    #[test]
    fn test_admission_errors() {
        let mut config = test_config();
        config.rules.max_players = 2;
        let mut disabled = canyon();
        disabled.id = "closed".to_string();
        disabled.enabled = false;
        let mut partial = canyon();
        partial.id = "unfinished".to_string();
        partial.spawns.blue = None;
        config.arenas.extend([disabled, partial]);
        let mut o = orchestrator(config);

        assert_eq!(
            o.admit(1, "alice", "nowhere"),
            Err(AdmissionError::UnknownArena("nowhere".to_string()))
        );
        assert_eq!(
            o.admit(1, "alice", "closed"),
            Err(AdmissionError::ArenaDisabled("closed".to_string()))
        );
        assert_eq!(
            o.admit(1, "alice", "unfinished"),
            Err(AdmissionError::ArenaIncomplete {
                arena: "unfinished".to_string(),
                missing: "blue spawn".to_string(),
            })
        );
        assert_eq!(o.match_count(), 0);

        o.admit(1, "alice", ARENA).unwrap();
        assert_eq!(
            o.admit(1, "alice", ARENA),
            Err(AdmissionError::AlreadyInMatch {
                arena: ARENA.to_string()
            })
        );
        o.admit(2, "bob", ARENA).unwrap();
        assert_eq!(o.admit(3, "carol", ARENA), Err(AdmissionError::MatchFull));

        advance_secs(&mut o, 3);
        o.release(2);
        assert_eq!(o.match_state(ARENA), Some(MatchState::Ending));
        assert_eq!(
            o.admit(3, "carol", ARENA),
            Err(AdmissionError::MatchInProgress)
        );
    }

    #[test]
    fn test_provider_arena_cannot_overfill_teams() {
        // Provider arenas are never run through config validation
        let mut arena = canyon();
        arena.min_players = Some(4);
        arena.max_players = Some(5);
        arena.max_per_team = Some(2);
        let config = ServerConfig {
            arenas: Vec::new(),
            ..test_config()
        };
        let mut o = MatchOrchestrator::new(
            config,
            StaticArenas::new([arena]),
            MemoryProgressionStore::new(),
        )
        .unwrap();

        for actor in 1..=4 {
            o.admit(actor, format!("p{actor}"), ARENA).unwrap();
        }
        let err = o.admit(5, "p5", ARENA).unwrap_err();
        assert_eq!(err, AdmissionError::TeamFull);
        assert_eq!(err.code(), "team_full");
        assert_eq!(o.arena_of(5), None);

        advance_secs(&mut o, 3);
        assert_eq!(o.match_state(ARENA), Some(MatchState::Playing));
        for actor in 1..=4 {
            assert!(o.session(actor).unwrap().team().is_some());
        }
    }

    #[test]
    fn test_store_failures_are_not_fatal() {
        let mut o = orchestrator(test_config());
        o.store_mut().insert(1, Progression {
            level: 7,
            ..Default::default()
        });
        o.store_mut().set_fail_loads(true);
        o.admit(1, "alice", ARENA).unwrap();
        assert_eq!(o.session(1).unwrap().progression().level, 1);

        o.store_mut().set_fail_saves(true);
        assert!(o.release(1));
        assert_eq!(o.store().get(1).map(|p| p.level), Some(7));
        assert_eq!(o.match_count(), 0);
    }

    #[test]
    fn test_progression_is_loaded_on_admission() {
        let mut o = orchestrator(test_config());
        o.store_mut().insert(1, Progression {
            level: 4,
            games_played: 9,
            ..Default::default()
        });
        o.admit(1, "alice", ARENA).unwrap();
        assert_eq!(o.session(1).unwrap().progression().level, 4);
        assert!(o.release(1));
        assert!(!o.release(1));
    }

    #[test]
    fn test_force_end_and_shutdown() {
        let (mut o, red, blue) = duel(test_config());
        assert!(o.force_end(ARENA));
        let result = o.match_session(ARENA).unwrap().result().unwrap();
        assert_eq!(result.reason, EndReason::Aborted);
        assert_eq!(o.take_finished_records().len(), 1);

        o.shutdown();
        assert_eq!(o.match_count(), 0);
        assert_eq!(o.arena_of(red), None);
        assert_eq!(o.arena_of(blue), None);
        assert!(!o.force_end(ARENA));

        // A waiting match is simply discarded
        o.admit(5, "eve", ARENA).unwrap();
        assert!(o.force_end(ARENA));
        assert_eq!(o.match_count(), 0);
        assert!(o.take_finished_records().is_empty());
    }

    #[test]
    fn test_same_seed_same_match() {
        let run = || {
            let (mut o, red, blue) = duel(test_config());
            hold_at(&mut o, red, BLUE_BASE);
            o.handle_death(red, Some(blue)).unwrap();
            advance_secs(&mut o, 3);
            let mut sink: Vec<EventEnvelope> = Vec::new();
            o.flush(&mut sink);
            (red, sink)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_flush_publishes_protos() {
        let (mut o, _, _) = duel(test_config());
        let mut sink: Vec<flagfall_wire::MatchEventProto> = Vec::new();
        let published = o.flush(&mut sink);
        assert_eq!(published, sink.len());
        assert!(published >= 6);
        assert!(o.drain_events().is_empty());
        assert!(sink.iter().all(|p| p.arena == ARENA));
    }
}
