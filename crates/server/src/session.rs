//! Orchestrator registry entries.
//!
//! `MatchEntry` wraps a [`MatchSession`] with everything the orchestrator
//! keeps next to it (arena snapshot, journal, match-owned timer handles);
//! `ActorEntry` is the per-actor counterpart.

use flagfall_journal::MatchJournal;
use flagfall_sim::{ArenaId, MatchSession, Position, TeamMap};

use crate::ports::ArenaConfig;
use crate::scheduler::TimerHandle;

/// A live match and its orchestrator-side state.
#[derive(Debug)]
pub struct MatchEntry {
    pub session: MatchSession,
    /// Arena configuration as it was when the match was created.
    pub arena: ArenaConfig,
    /// Taken when the match settles.
    pub journal: Option<MatchJournal>,
    pub countdown_timer: Option<TimerHandle>,
    pub clock_timer: Option<TimerHandle>,
    /// Auto-return timer of each dropped flag.
    pub flag_timers: TeamMap<Option<TimerHandle>>,
    pub cleanup_timer: Option<TimerHandle>,
}

impl MatchEntry {
    pub fn new(session: MatchSession, arena: ArenaConfig, journal: MatchJournal) -> Self {
        Self {
            session,
            arena,
            journal: Some(journal),
            countdown_timer: None,
            clock_timer: None,
            flag_timers: TeamMap::default(),
            cleanup_timer: None,
        }
    }

    /// Every timer handle still held, leaving the slots empty.
    pub fn take_timers(&mut self) -> Vec<TimerHandle> {
        [
            self.countdown_timer.take(),
            self.clock_timer.take(),
            self.flag_timers.red.take(),
            self.flag_timers.blue.take(),
            self.cleanup_timer.take(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Where an admitted actor is and which of its timers are pending.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorEntry {
    pub arena: ArenaId,
    /// Last reported position. `None` until the first spawn or move.
    pub position: Option<Position>,
    /// Credited kills since admission or the last match end.
    pub kill_streak: u32,
    pub respawn_timer: Option<TimerHandle>,
    pub protection_timer: Option<TimerHandle>,
    pub grace_timer: Option<TimerHandle>,
    pub leave_timer: Option<TimerHandle>,
}

impl ActorEntry {
    pub fn new(arena: impl Into<ArenaId>) -> Self {
        Self {
            arena: arena.into(),
            position: None,
            kill_streak: 0,
            respawn_timer: None,
            protection_timer: None,
            grace_timer: None,
            leave_timer: None,
        }
    }

    /// Forget every pending timer. The caller cancels them in the scheduler.
    pub fn clear_timers(&mut self) {
        self.respawn_timer = None;
        self.protection_timer = None;
        self.grace_timer = None;
        self.leave_timer = None;
    }

    pub fn has_pending_leave(&self) -> bool {
        self.leave_timer.is_some()
    }
}
