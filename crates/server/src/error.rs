//! Error types of the orchestrator surface.
//!
//! Every refusal carries a stable `code()` so presentation layers can map it
//! to player-facing text without matching on variants.

use std::path::PathBuf;

use flagfall_sim::{ActionRejected, ActorId, ArenaId};

/// Why an actor could not join an arena's match.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("unknown arena {0}")]
    UnknownArena(ArenaId),

    #[error("arena {0} is disabled")]
    ArenaDisabled(ArenaId),

    #[error("arena {arena} is missing {missing}")]
    ArenaIncomplete { arena: ArenaId, missing: String },

    #[error("already in the match on {arena}")]
    AlreadyInMatch { arena: ArenaId },

    #[error("match is full")]
    MatchFull,

    #[error("both teams are full")]
    TeamFull,

    #[error("match already in progress")]
    MatchInProgress,
}

impl AdmissionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownArena(_) => "unknown_arena",
            Self::ArenaDisabled(_) => "arena_disabled",
            Self::ArenaIncomplete { .. } => "arena_incomplete",
            Self::AlreadyInMatch { .. } => "already_in_match",
            Self::MatchFull => "match_full",
            Self::TeamFull => "team_full",
            Self::MatchInProgress => "match_in_progress",
        }
    }
}

impl From<ActionRejected> for AdmissionError {
    fn from(rejected: ActionRejected) -> Self {
        match rejected {
            ActionRejected::MatchFull => Self::MatchFull,
            ActionRejected::TeamFull => Self::TeamFull,
            _ => Self::MatchInProgress,
        }
    }
}

/// Why an interaction could not begin.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InteractionRejected {
    #[error("not in a match")]
    NotInMatch,

    #[error("match is not in progress")]
    NotPlaying,

    #[error("nothing to interact with there")]
    NothingToInteract,

    #[error("already interacting")]
    AlreadyInteracting,

    #[error("too far away ({distance:.1} > {radius:.1})")]
    OutOfRange { distance: f64, radius: f64 },

    #[error(transparent)]
    Action(#[from] ActionRejected),
}

impl InteractionRejected {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInMatch => "not_in_match",
            Self::NotPlaying => "not_playing",
            Self::NothingToInteract => "nothing_to_interact",
            Self::AlreadyInteracting => "already_interacting",
            Self::OutOfRange { .. } => "out_of_range",
            Self::Action(rejected) => rejected.code(),
        }
    }
}

/// Progression persistence failure. Never fatal to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("progression store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt progression record for actor {actor}: {reason}")]
    Corrupt { actor: ActorId, reason: String },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "store_unavailable",
            Self::Corrupt { .. } => "store_corrupt",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "config_io",
            Self::Parse(_) => "config_parse",
            Self::Invalid(_) => "config_invalid",
        }
    }
}
