//! Cooperative tick scheduler.
//!
//! Single-threaded and explicit: the orchestrator calls [`Scheduler::advance`]
//! once per step and dispatches whatever fired. Timers carry a tagged
//! [`TimerEvent`] rather than a closure, and an owner whose teardown cancels
//! them in one call.
//!
//! A timer that fires in the same step another handler cancels it is still
//! returned by `advance`; dispatchers check [`Scheduler::is_live`] before
//! acting on each fired timer.

use std::collections::{BTreeMap, HashMap};

use flagfall_sim::{ActorId, ArenaId, Team, Tick};

/// Handle of a scheduled timer. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Entity whose lifetime bounds a timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerOwner {
    Match(ArenaId),
    Actor(ActorId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    Countdown,
    MatchClock,
    InteractionHold { actor: ActorId },
    Respawn { actor: ActorId },
    SpawnProtectionExpired { actor: ActorId },
    FlagAutoReturn { team: Team },
    ReconnectGrace { actor: ActorId },
    LeaveConfirmExpired { actor: ActorId },
    Cleanup,
}

impl TimerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Countdown => "countdown",
            Self::MatchClock => "match_clock",
            Self::InteractionHold { .. } => "interaction_hold",
            Self::Respawn { .. } => "respawn",
            Self::SpawnProtectionExpired { .. } => "spawn_protection_expired",
            Self::FlagAutoReturn { .. } => "flag_auto_return",
            Self::ReconnectGrace { .. } => "reconnect_grace",
            Self::LeaveConfirmExpired { .. } => "leave_confirm_expired",
            Self::Cleanup => "cleanup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimer {
    pub handle: TimerHandle,
    pub due: Tick,
    pub owner: TimerOwner,
    pub event: TimerEvent,
}

#[derive(Debug, Clone)]
struct Timer {
    due: Tick,
    /// Re-arm interval for repeating timers.
    interval: Option<Tick>,
    owner: TimerOwner,
    event: TimerEvent,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    now: Tick,
    next_handle: u64,
    timers: BTreeMap<TimerHandle, Timer>,
    /// One-shot timers returned by the last `advance` and not cancelled since.
    in_flight: HashMap<TimerHandle, TimerOwner>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Schedule `event` to fire `delay` ticks from now (a zero delay fires on
    /// the next advance), then every `repeat` ticks if set.
    pub fn schedule(
        &mut self,
        delay: Tick,
        repeat: Option<Tick>,
        owner: TimerOwner,
        event: TimerEvent,
    ) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.timers.insert(
            handle,
            Timer {
                due: self.now + delay.max(1),
                interval: repeat.map(|r| r.max(1)),
                owner,
                event,
            },
        );
        handle
    }

    /// Returns `false` for unknown or already-finished handles.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let in_flight = self.in_flight.remove(&handle).is_some();
        self.timers.remove(&handle).is_some() || in_flight
    }

    /// Cancel every timer owned by `owner`. Returns how many were cancelled.
    pub fn cancel_owner(&mut self, owner: &TimerOwner) -> usize {
        let handles: Vec<TimerHandle> = self
            .timers
            .iter()
            .filter(|(_, t)| &t.owner == owner)
            .map(|(h, _)| *h)
            .collect();
        for handle in &handles {
            self.timers.remove(handle);
        }
        self.in_flight.retain(|_, o| o != owner);
        handles.len()
    }

    /// Whether `handle` is armed, or fired in the last advance and was not
    /// cancelled since.
    pub fn is_live(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle) || self.in_flight.contains_key(&handle)
    }

    /// Move one tick forward and return every timer due, ordered by
    /// `(due, handle)`.
    pub fn advance(&mut self) -> Vec<FiredTimer> {
        self.now += 1;
        self.in_flight.clear();

        let mut fired: Vec<FiredTimer> = self
            .timers
            .iter()
            .filter(|(_, t)| t.due <= self.now)
            .map(|(handle, t)| FiredTimer {
                handle: *handle,
                due: t.due,
                owner: t.owner.clone(),
                event: t.event.clone(),
            })
            .collect();
        fired.sort_by_key(|f| (f.due, f.handle));

        for f in &fired {
            let repeat = self.timers.get(&f.handle).and_then(|t| t.interval);
            match repeat {
                Some(interval) => {
                    if let Some(timer) = self.timers.get_mut(&f.handle) {
                        timer.due = self.now + interval;
                    }
                }
                None => {
                    self.timers.remove(&f.handle);
                    self.in_flight.insert(f.handle, f.owner.clone());
                }
            }
        }
        fired
    }
}
