//! Collaborator ports: arena configuration and progression persistence.
//!
//! These are the only abstractions the orchestrator is generic over. The
//! in-memory implementations back tests and single-process deployments.

use std::collections::{BTreeMap, HashMap};

use flagfall_sim::{ActorId, ArenaId, MatchLimits, MatchRules, Position, Progression, Team, TeamMap};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ============================================================================
// Arena configuration
// ============================================================================

/// Axis-aligned box an arena occupies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Position,
    pub max: Position,
}

impl Bounds {
    pub fn contains(&self, p: &Position) -> bool {
        (self.min.x..=self.max.x).contains(&p.x)
            && (self.min.y..=self.max.y).contains(&p.y)
            && (self.min.z..=self.max.z).contains(&p.z)
    }
}

/// Static description of one arena.
///
/// Per-team locations are optional so a half-configured arena can be loaded
/// and reported as incomplete instead of failing the whole config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    pub id: ArenaId,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub lobby: Option<Position>,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    #[serde(default)]
    pub spawns: TeamMap<Option<Position>>,
    #[serde(default)]
    pub flag_bases: TeamMap<Option<Position>>,
    #[serde(default)]
    pub capture_points: TeamMap<Option<Position>>,
    /// Overrides of the server-wide `rules` limits.
    #[serde(default)]
    pub min_players: Option<usize>,
    #[serde(default)]
    pub max_players: Option<usize>,
    #[serde(default)]
    pub max_per_team: Option<usize>,
}

fn default_enabled() -> bool {
    true
}

impl ArenaConfig {
    /// A fully configured, enabled arena.
    pub fn new(
        id: impl Into<ArenaId>,
        spawns: TeamMap<Position>,
        flag_bases: TeamMap<Position>,
        capture_points: TeamMap<Position>,
    ) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            lobby: None,
            bounds: None,
            spawns: TeamMap::new(Some(spawns.red), Some(spawns.blue)),
            flag_bases: TeamMap::new(Some(flag_bases.red), Some(flag_bases.blue)),
            capture_points: TeamMap::new(Some(capture_points.red), Some(capture_points.blue)),
            min_players: None,
            max_players: None,
            max_per_team: None,
        }
    }

    /// Names of the locations still missing, e.g. `"blue flag base"`.
    pub fn missing(&self) -> Vec<String> {
        let mut out = Vec::new();
        for team in Team::ALL {
            if self.spawns[team].is_none() {
                out.push(format!("{team} spawn"));
            }
            if self.flag_bases[team].is_none() {
                out.push(format!("{team} flag base"));
            }
            if self.capture_points[team].is_none() {
                out.push(format!("{team} capture point"));
            }
        }
        out
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    pub fn spawn(&self, team: Team) -> Option<Position> {
        self.spawns[team]
    }

    pub fn capture_point(&self, team: Team) -> Option<Position> {
        self.capture_points[team]
    }

    /// Both flag bases, or `None` while either is unset.
    pub fn flag_bases(&self) -> Option<TeamMap<Position>> {
        Some(TeamMap::new(self.flag_bases.red?, self.flag_bases.blue?))
    }

    /// Server-wide limits with this arena's overrides applied.
    pub fn limits(&self, rules: &MatchRules) -> MatchLimits {
        let base = MatchLimits::from(rules);
        MatchLimits {
            min_players: self.min_players.unwrap_or(base.min_players),
            max_players: self.max_players.unwrap_or(base.max_players),
            max_per_team: self.max_per_team.unwrap_or(base.max_per_team),
        }
    }

    /// Every configured location, labelled, for bounds checks.
    pub(crate) fn locations(&self) -> Vec<(String, Position)> {
        let mut out = Vec::new();
        if let Some(lobby) = self.lobby {
            out.push(("lobby".to_string(), lobby));
        }
        for team in Team::ALL {
            let labelled = [
                ("spawn", self.spawns[team]),
                ("flag base", self.flag_bases[team]),
                ("capture point", self.capture_points[team]),
            ];
            for (label, position) in labelled {
                if let Some(p) = position {
                    out.push((format!("{team} {label}"), p));
                }
            }
        }
        out
    }
}

/// Source of arena definitions.
pub trait ArenaProvider {
    fn arena(&self, id: &str) -> Option<ArenaConfig>;
}

/// Arenas fixed at startup (typically from `ServerConfig::arenas`).
#[derive(Debug, Clone, Default)]
pub struct StaticArenas {
    arenas: BTreeMap<ArenaId, ArenaConfig>,
}

impl StaticArenas {
    pub fn new(arenas: impl IntoIterator<Item = ArenaConfig>) -> Self {
        Self {
            arenas: arenas.into_iter().map(|a| (a.id.clone(), a)).collect(),
        }
    }

    pub fn insert(&mut self, arena: ArenaConfig) {
        self.arenas.insert(arena.id.clone(), arena);
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.arenas.keys().map(String::as_str)
    }
}

impl ArenaProvider for StaticArenas {
    fn arena(&self, id: &str) -> Option<ArenaConfig> {
        self.arenas.get(id).cloned()
    }
}

// ============================================================================
// Progression persistence
// ============================================================================

/// Persistent store for per-actor progression.
///
/// `load` returns `Ok(None)` for actors never seen before.
pub trait ProgressionStore {
    fn load(&mut self, actor: ActorId) -> Result<Option<Progression>, StoreError>;
    fn save(&mut self, actor: ActorId, progression: &Progression) -> Result<(), StoreError>;
}

/// In-memory progression store.
#[derive(Debug, Clone, Default)]
pub struct MemoryProgressionStore {
    records: HashMap<ActorId, Progression>,
    fail_loads: bool,
    fail_saves: bool,
}

impl MemoryProgressionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, actor: ActorId) -> Option<&Progression> {
        self.records.get(&actor)
    }

    pub fn insert(&mut self, actor: ActorId, progression: Progression) {
        self.records.insert(actor, progression);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Make every `load` fail with `Unavailable`.
    pub fn set_fail_loads(&mut self, fail: bool) {
        self.fail_loads = fail;
    }

    /// Make every `save` fail with `Unavailable`.
    pub fn set_fail_saves(&mut self, fail: bool) {
        self.fail_saves = fail;
    }
}

impl ProgressionStore for MemoryProgressionStore {
    fn load(&mut self, actor: ActorId) -> Result<Option<Progression>, StoreError> {
        if self.fail_loads {
            return Err(StoreError::Unavailable("loads disabled".to_string()));
        }
        Ok(self.records.get(&actor).cloned())
    }

    fn save(&mut self, actor: ActorId, progression: &Progression) -> Result<(), StoreError> {
        if self.fail_saves {
            return Err(StoreError::Unavailable("saves disabled".to_string()));
        }
        self.records.insert(actor, progression.clone());
        Ok(())
    }
}
