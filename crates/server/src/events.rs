//! Outbound events.
//!
//! The orchestrator never talks to players directly. Everything observable
//! (flag changes, countdowns, kills, settlement) becomes an [`EventEnvelope`]
//! in its outbox, which the host drains or flushes into an [`EventSink`].
//! Envelopes convert to `flagfall-wire` protos for transport and journaling.

use flagfall_sim::{ActorId, ArenaId, MatchResult, PlayerSummary, Position, Team, TeamMap, Tick};
use flagfall_wire::match_event_proto::Event;
use flagfall_wire::{self as wire, MatchEventProto, team_code};

use crate::interaction::InteractionKind;
use crate::rewards::RewardLine;

/// Why a visible interaction stopped.
///
/// Only cancellations the player caused are announced; precondition
/// failures and disconnects cancel silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    MovedAway,
    LeftCaptureZone,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MovedAway => "moved_away",
            Self::LeftCaptureZone => "left_capture_zone",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    FlagTaken {
        actor: ActorId,
        flag_team: Team,
    },
    FlagPickedUp {
        actor: ActorId,
        flag_team: Team,
    },
    FlagCaptured {
        actor: ActorId,
        team: Team,
        flag_team: Team,
        score: u32,
    },
    FlagDropped {
        actor: ActorId,
        flag_team: Team,
        at: Position,
        return_in_secs: u32,
    },
    /// `by == None` for automatic returns (timer, death, disconnect, release).
    FlagReturned {
        flag_team: Team,
        by: Option<ActorId>,
    },
    MatchStarting {
        seconds: u32,
    },
    CountdownStopped {
        players: usize,
        min_players: usize,
    },
    MatchStarted {
        duration_secs: u32,
        teams: TeamMap<Vec<ActorId>>,
    },
    Spawned {
        actor: ActorId,
        team: Team,
        at: Option<Position>,
        enhancement_tier: u8,
        protection_secs: u32,
    },
    Kill {
        victim: ActorId,
        killer: Option<ActorId>,
        killer_team: Option<Team>,
        team_kills: u32,
    },
    KillStreak {
        actor: ActorId,
        streak: u32,
    },
    LevelUp {
        actor: ActorId,
        level: u32,
    },
    TeamEnhancement {
        team: Team,
        tier: u8,
    },
    InteractionProgress {
        actor: ActorId,
        kind: InteractionKind,
        remaining_secs: u32,
    },
    InteractionCancelled {
        actor: ActorId,
        kind: InteractionKind,
        reason: CancelReason,
    },
    Reward {
        actor: ActorId,
        lines: Vec<RewardLine>,
    },
    MatchEnded {
        result: MatchResult,
        scores: TeamMap<u32>,
        kills: TeamMap<u32>,
        summaries: Vec<PlayerSummary>,
        mvp: Option<ActorId>,
    },
}

impl MatchEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FlagTaken { .. } => "flag_taken",
            Self::FlagPickedUp { .. } => "flag_picked_up",
            Self::FlagCaptured { .. } => "flag_captured",
            Self::FlagDropped { .. } => "flag_dropped",
            Self::FlagReturned { .. } => "flag_returned",
            Self::MatchStarting { .. } => "match_starting",
            Self::CountdownStopped { .. } => "countdown_stopped",
            Self::MatchStarted { .. } => "match_started",
            Self::Spawned { .. } => "spawned",
            Self::Kill { .. } => "kill",
            Self::KillStreak { .. } => "kill_streak",
            Self::LevelUp { .. } => "level_up",
            Self::TeamEnhancement { .. } => "team_enhancement",
            Self::InteractionProgress { .. } => "interaction_progress",
            Self::InteractionCancelled { .. } => "interaction_cancelled",
            Self::Reward { .. } => "reward",
            Self::MatchEnded { .. } => "match_ended",
        }
    }

    fn to_wire(&self) -> Event {
        match self {
            Self::FlagTaken { actor, flag_team } => Event::FlagTaken(wire::FlagTaken {
                actor: *actor,
                flag_team: team_code(Some(*flag_team)),
            }),
            Self::FlagPickedUp { actor, flag_team } => Event::FlagPickedUp(wire::FlagPickedUp {
                actor: *actor,
                flag_team: team_code(Some(*flag_team)),
            }),
            Self::FlagCaptured {
                actor,
                team,
                flag_team,
                score,
            } => Event::FlagCaptured(wire::FlagCaptured {
                actor: *actor,
                team: team_code(Some(*team)),
                flag_team: team_code(Some(*flag_team)),
                score: *score,
            }),
            Self::FlagDropped {
                actor,
                flag_team,
                at,
                return_in_secs,
            } => Event::FlagDropped(wire::FlagDropped {
                actor: *actor,
                flag_team: team_code(Some(*flag_team)),
                position: Some((*at).into()),
                return_in_secs: *return_in_secs,
            }),
            Self::FlagReturned { flag_team, by } => Event::FlagReturned(wire::FlagReturned {
                flag_team: team_code(Some(*flag_team)),
                actor: *by,
            }),
            Self::MatchStarting { seconds } => {
                Event::MatchStarting(wire::MatchStarting { seconds: *seconds })
            }
            Self::CountdownStopped {
                players,
                min_players,
            } => Event::CountdownStopped(wire::CountdownStopped {
                players: saturate(*players),
                min_players: saturate(*min_players),
            }),
            Self::MatchStarted {
                duration_secs,
                teams,
            } => Event::MatchStarted(wire::MatchStarted {
                duration_secs: *duration_secs,
                red: teams.red.clone(),
                blue: teams.blue.clone(),
            }),
            Self::Spawned {
                actor,
                team,
                at,
                enhancement_tier,
                protection_secs,
            } => Event::Spawned(wire::Spawned {
                actor: *actor,
                team: team_code(Some(*team)),
                position: at.map(Into::into),
                enhancement_tier: u32::from(*enhancement_tier),
                protection_secs: *protection_secs,
            }),
            Self::Kill {
                victim,
                killer,
                killer_team,
                team_kills,
            } => Event::Kill(wire::Kill {
                victim: *victim,
                killer: *killer,
                killer_team: team_code(*killer_team),
                team_kills: *team_kills,
            }),
            Self::KillStreak { actor, streak } => Event::KillStreak(wire::KillStreak {
                actor: *actor,
                streak: *streak,
            }),
            Self::LevelUp { actor, level } => Event::LevelUp(wire::LevelUp {
                actor: *actor,
                level: *level,
            }),
            Self::TeamEnhancement { team, tier } => {
                Event::TeamEnhancement(wire::TeamEnhancement {
                    team: team_code(Some(*team)),
                    tier: u32::from(*tier),
                })
            }
            Self::InteractionProgress {
                actor,
                kind,
                remaining_secs,
            } => Event::InteractionProgress(wire::InteractionProgress {
                actor: *actor,
                kind: kind.as_str().to_string(),
                remaining_secs: *remaining_secs,
            }),
            Self::InteractionCancelled {
                actor,
                kind,
                reason,
            } => Event::InteractionCancelled(wire::InteractionCancelled {
                actor: *actor,
                kind: kind.as_str().to_string(),
                reason: reason.as_str().to_string(),
            }),
            Self::Reward { actor, lines } => Event::Reward(wire::Reward {
                actor: *actor,
                lines: lines.iter().map(Into::into).collect(),
            }),
            Self::MatchEnded {
                result,
                scores,
                kills,
                summaries,
                mvp,
            } => Event::MatchEnded(wire::MatchEnded {
                winner: team_code(result.winner),
                reason: result.reason.as_str().to_string(),
                red_captures: scores.red,
                blue_captures: scores.blue,
                red_kills: kills.red,
                blue_kills: kills.blue,
                summaries: summaries.iter().map(Into::into).collect(),
                mvp: *mvp,
            }),
        }
    }
}

fn saturate(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// An event stamped with the tick and arena it happened in.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub tick: Tick,
    pub arena: ArenaId,
    pub event: MatchEvent,
}

impl EventEnvelope {
    pub fn to_proto(&self) -> MatchEventProto {
        MatchEventProto {
            tick: self.tick,
            arena: self.arena.clone(),
            event: Some(self.event.to_wire()),
        }
    }

    /// Protobuf encoding, identical for every recipient.
    pub fn to_bytes(&self) -> Vec<u8> {
        prost::Message::encode_to_vec(&self.to_proto())
    }
}

/// Destination for flushed events.
pub trait EventSink {
    fn publish(&mut self, envelope: &EventEnvelope);
}

impl EventSink for Vec<EventEnvelope> {
    fn publish(&mut self, envelope: &EventEnvelope) {
        self.push(envelope.clone());
    }
}

impl EventSink for Vec<MatchEventProto> {
    fn publish(&mut self, envelope: &EventEnvelope) {
        self.push(envelope.to_proto());
    }
}
