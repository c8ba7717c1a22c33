//! Flagfall Wire Types
//!
//! Protobuf message types (prost) for everything the orchestrator tells the
//! outside world: per-match gameplay events and the finished match record
//! written by the journal. Presentation layers decode these; they never see
//! `flagfall-sim` types directly.
//!
//! # Message Categories
//!
//! - **Events**: one `MatchEventProto` per outbound event, tagged with the
//!   scheduler tick and arena id. The payload is a oneof.
//! - **Records**: `MatchRecord`, the journal artifact of a finished match.
//!
//! Actor ids are wire `uint64`; teams use `TeamProto`, where `Unspecified`
//! stands for "no team" (draws, team-less actors).

#![deny(unsafe_code)]

use flagfall_sim::{PlayerSummary, Position, Team};

/// Tick type alias for wire protocol.
pub type Tick = u64;

/// ActorId type alias for wire protocol.
pub type ActorId = u64;

/// Current `MatchRecord` layout.
pub const RECORD_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Shared Types
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum TeamProto {
    Unspecified = 0,
    Red = 1,
    Blue = 2,
}

impl TeamProto {
    pub fn to_team(self) -> Option<Team> {
        match self {
            TeamProto::Unspecified => None,
            TeamProto::Red => Some(Team::Red),
            TeamProto::Blue => Some(Team::Blue),
        }
    }
}

impl From<Team> for TeamProto {
    fn from(team: Team) -> Self {
        match team {
            Team::Red => TeamProto::Red,
            Team::Blue => TeamProto::Blue,
        }
    }
}

impl From<Option<Team>> for TeamProto {
    fn from(team: Option<Team>) -> Self {
        team.map_or(TeamProto::Unspecified, Into::into)
    }
}

/// Wire value of an optional team.
pub fn team_code(team: Option<Team>) -> i32 {
    TeamProto::from(team) as i32
}

/// Decode a wire team value. Unknown values read as "no team".
pub fn team_from_code(code: i32) -> Option<Team> {
    TeamProto::try_from(code).ok().and_then(TeamProto::to_team)
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PositionProto {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
}

impl From<Position> for PositionProto {
    fn from(p: Position) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }
}

impl From<PositionProto> for Position {
    fn from(p: PositionProto) -> Self {
        Position::new(p.x, p.y, p.z)
    }
}

// ============================================================================
// Flag Events
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct FlagTaken {
    #[prost(uint64, tag = "1")]
    pub actor: ActorId,
    #[prost(enumeration = "TeamProto", tag = "2")]
    pub flag_team: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FlagPickedUp {
    #[prost(uint64, tag = "1")]
    pub actor: ActorId,
    #[prost(enumeration = "TeamProto", tag = "2")]
    pub flag_team: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FlagCaptured {
    #[prost(uint64, tag = "1")]
    pub actor: ActorId,
    /// Scoring team.
    #[prost(enumeration = "TeamProto", tag = "2")]
    pub team: i32,
    #[prost(enumeration = "TeamProto", tag = "3")]
    pub flag_team: i32,
    /// Scoring team's capture count after this capture.
    #[prost(uint32, tag = "4")]
    pub score: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FlagDropped {
    #[prost(uint64, tag = "1")]
    pub actor: ActorId,
    #[prost(enumeration = "TeamProto", tag = "2")]
    pub flag_team: i32,
    #[prost(message, optional, tag = "3")]
    pub position: Option<PositionProto>,
    /// Seconds until the flag returns on its own.
    #[prost(uint32, tag = "4")]
    pub return_in_secs: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FlagReturned {
    #[prost(enumeration = "TeamProto", tag = "1")]
    pub flag_team: i32,
    /// Returning player; absent for automatic returns.
    #[prost(uint64, optional, tag = "2")]
    pub actor: Option<ActorId>,
}

// ============================================================================
// Lifecycle Events
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct MatchStarting {
    #[prost(uint32, tag = "1")]
    pub seconds: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CountdownStopped {
    #[prost(uint32, tag = "1")]
    pub players: u32,
    #[prost(uint32, tag = "2")]
    pub min_players: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MatchStarted {
    #[prost(uint32, tag = "1")]
    pub duration_secs: u32,
    #[prost(uint64, repeated, tag = "2")]
    pub red: Vec<ActorId>,
    #[prost(uint64, repeated, tag = "3")]
    pub blue: Vec<ActorId>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Spawned {
    #[prost(uint64, tag = "1")]
    pub actor: ActorId,
    #[prost(enumeration = "TeamProto", tag = "2")]
    pub team: i32,
    #[prost(message, optional, tag = "3")]
    pub position: Option<PositionProto>,
    #[prost(uint32, tag = "4")]
    pub enhancement_tier: u32,
    #[prost(uint32, tag = "5")]
    pub protection_secs: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PlayerSummaryProto {
    #[prost(uint64, tag = "1")]
    pub actor: ActorId,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(enumeration = "TeamProto", tag = "3")]
    pub team: i32,
    #[prost(uint32, tag = "4")]
    pub kills: u32,
    #[prost(uint32, tag = "5")]
    pub deaths: u32,
    #[prost(uint32, tag = "6")]
    pub captures: u32,
    #[prost(uint32, tag = "7")]
    pub returns: u32,
    #[prost(uint32, tag = "8")]
    pub score: u32,
}

impl From<&PlayerSummary> for PlayerSummaryProto {
    fn from(s: &PlayerSummary) -> Self {
        Self {
            actor: s.actor,
            name: s.name.clone(),
            team: team_code(s.team),
            kills: s.kills,
            deaths: s.deaths,
            captures: s.captures,
            returns: s.returns,
            score: s.score,
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MatchEnded {
    /// `Unspecified` for a draw or a no-winner ending.
    #[prost(enumeration = "TeamProto", tag = "1")]
    pub winner: i32,
    #[prost(string, tag = "2")]
    pub reason: String,
    #[prost(uint32, tag = "3")]
    pub red_captures: u32,
    #[prost(uint32, tag = "4")]
    pub blue_captures: u32,
    #[prost(uint32, tag = "5")]
    pub red_kills: u32,
    #[prost(uint32, tag = "6")]
    pub blue_kills: u32,
    /// Sorted by score, best first.
    #[prost(message, repeated, tag = "7")]
    pub summaries: Vec<PlayerSummaryProto>,
    #[prost(uint64, optional, tag = "8")]
    pub mvp: Option<ActorId>,
}

// ============================================================================
// Combat & Progression Events
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct Kill {
    #[prost(uint64, tag = "1")]
    pub victim: ActorId,
    /// Credited killer; absent for environmental deaths and team kills.
    #[prost(uint64, optional, tag = "2")]
    pub killer: Option<ActorId>,
    #[prost(enumeration = "TeamProto", tag = "3")]
    pub killer_team: i32,
    #[prost(uint32, tag = "4")]
    pub team_kills: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct KillStreak {
    #[prost(uint64, tag = "1")]
    pub actor: ActorId,
    #[prost(uint32, tag = "2")]
    pub streak: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LevelUp {
    #[prost(uint64, tag = "1")]
    pub actor: ActorId,
    #[prost(uint32, tag = "2")]
    pub level: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TeamEnhancement {
    #[prost(enumeration = "TeamProto", tag = "1")]
    pub team: i32,
    #[prost(uint32, tag = "2")]
    pub tier: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RewardLineProto {
    #[prost(string, tag = "1")]
    pub reason: String,
    #[prost(uint64, tag = "2")]
    pub amount: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Reward {
    #[prost(uint64, tag = "1")]
    pub actor: ActorId,
    #[prost(message, repeated, tag = "2")]
    pub lines: Vec<RewardLineProto>,
}

// ============================================================================
// Interaction Events
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct InteractionProgress {
    #[prost(uint64, tag = "1")]
    pub actor: ActorId,
    /// `take`, `pickup`, `return` or `capture`.
    #[prost(string, tag = "2")]
    pub kind: String,
    #[prost(uint32, tag = "3")]
    pub remaining_secs: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InteractionCancelled {
    #[prost(uint64, tag = "1")]
    pub actor: ActorId,
    #[prost(string, tag = "2")]
    pub kind: String,
    #[prost(string, tag = "3")]
    pub reason: String,
}

// ============================================================================
// Envelope
// ============================================================================

/// One outbound event.
#[derive(Clone, PartialEq, prost::Message)]
pub struct MatchEventProto {
    /// Scheduler tick at which the event was emitted.
    #[prost(uint64, tag = "1")]
    pub tick: Tick,
    #[prost(string, tag = "2")]
    pub arena: String,
    #[prost(
        oneof = "match_event_proto::Event",
        tags = "10, 11, 12, 13, 14, 20, 21, 22, 23, 24, 30, 31, 32, 33, 34, 40, 41"
    )]
    pub event: Option<match_event_proto::Event>,
}

pub mod match_event_proto {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "10")]
        FlagTaken(super::FlagTaken),
        #[prost(message, tag = "11")]
        FlagPickedUp(super::FlagPickedUp),
        #[prost(message, tag = "12")]
        FlagCaptured(super::FlagCaptured),
        #[prost(message, tag = "13")]
        FlagDropped(super::FlagDropped),
        #[prost(message, tag = "14")]
        FlagReturned(super::FlagReturned),
        #[prost(message, tag = "20")]
        MatchStarting(super::MatchStarting),
        #[prost(message, tag = "21")]
        CountdownStopped(super::CountdownStopped),
        #[prost(message, tag = "22")]
        MatchStarted(super::MatchStarted),
        #[prost(message, tag = "23")]
        Spawned(super::Spawned),
        #[prost(message, tag = "24")]
        MatchEnded(super::MatchEnded),
        #[prost(message, tag = "30")]
        Kill(super::Kill),
        #[prost(message, tag = "31")]
        KillStreak(super::KillStreak),
        #[prost(message, tag = "32")]
        LevelUp(super::LevelUp),
        #[prost(message, tag = "33")]
        TeamEnhancement(super::TeamEnhancement),
        #[prost(message, tag = "34")]
        Reward(super::Reward),
        #[prost(message, tag = "40")]
        InteractionProgress(super::InteractionProgress),
        #[prost(message, tag = "41")]
        InteractionCancelled(super::InteractionCancelled),
    }
}

impl MatchEventProto {
    /// Whether this event changes the match record (as opposed to UI-only
    /// progress and settlement payouts).
    pub fn is_gameplay(&self) -> bool {
        use match_event_proto::Event;
        !matches!(
            self.event,
            None | Some(Event::InteractionProgress(_))
                | Some(Event::InteractionCancelled(_))
                | Some(Event::Reward(_))
                | Some(Event::LevelUp(_))
        )
    }
}

// ============================================================================
// Match Record
// ============================================================================

/// Journal artifact of one finished match.
#[derive(Clone, PartialEq, prost::Message)]
pub struct MatchRecord {
    #[prost(uint32, tag = "1")]
    pub format_version: u32,
    #[prost(string, tag = "2")]
    pub arena: String,
    /// Seed of the orchestrator RNG.
    #[prost(uint64, tag = "3")]
    pub seed: u64,
    #[prost(uint32, tag = "4")]
    pub tick_rate_hz: u32,
    #[prost(uint64, tag = "5")]
    pub start_tick: Tick,
    #[prost(uint64, tag = "6")]
    pub end_tick: Tick,
    #[prost(string, tag = "7")]
    pub end_reason: String,
    #[prost(enumeration = "TeamProto", tag = "8")]
    pub winner: i32,
    #[prost(message, repeated, tag = "9")]
    pub events: Vec<MatchEventProto>,
    /// Lowercase hex SHA-256 over the length-delimited encoded events.
    #[prost(string, tag = "10")]
    pub events_sha256: String,
}

// ============================================================================
// Tests
// ============================================================================
