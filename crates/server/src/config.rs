//! Server configuration.
//!
//! Loaded from TOML; every field has a default so a partial file (or none)
//! is valid. `validate` rejects combinations the orchestrator cannot run.

use std::collections::BTreeSet;
use std::path::Path;

use flagfall_sim::{MatchRules, ProgressionRules};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::ports::ArenaConfig;
use crate::rewards::RewardConfig;
use crate::{DEFAULT_KILL_STREAK_MILESTONES, TICK_RATE_HZ};

/// How flag interactions are started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Every interaction is an explicit hold.
    #[default]
    Manual,
    /// Captures start on entering the own capture zone while carrying;
    /// take, pickup and return stay manual holds.
    Automatic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub mode: InteractionMode,
    /// Hold duration in seconds. `0` completes instantly.
    pub hold_secs: u32,
    pub radius: f64,
    pub auto_capture_radius: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            mode: InteractionMode::Manual,
            hold_secs: 3,
            radius: 3.0,
            auto_capture_radius: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds a disconnected player keeps their session.
    pub reconnect_grace_secs: u32,
    /// Seconds a leave request waits for confirmation.
    pub leave_confirm_secs: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace_secs: 30,
            leave_confirm_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub tick_rate_hz: u32,
    /// RNG seed. Unset means seeded from entropy at startup.
    pub seed: Option<u64>,
    pub rules: MatchRules,
    pub interaction: InteractionConfig,
    pub progression: ProgressionRules,
    pub rewards: RewardConfig,
    pub session: SessionConfig,
    pub kill_streak_milestones: Vec<u32>,
    pub arenas: Vec<ArenaConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: TICK_RATE_HZ,
            seed: None,
            rules: MatchRules::default(),
            interaction: InteractionConfig::default(),
            progression: ProgressionRules::default(),
            rewards: RewardConfig::default(),
            session: SessionConfig::default(),
            kill_streak_milestones: DEFAULT_KILL_STREAK_MILESTONES.to_vec(),
            arenas: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| {
            warn!(reason = %msg, "rejected server config");
            Err(ConfigError::Invalid(msg))
        };

        if self.tick_rate_hz == 0 {
            return invalid("tick_rate_hz must be positive".into());
        }
        let rules = &self.rules;
        if rules.min_players < 2 {
            return invalid(format!("min_players {} is below 2", rules.min_players));
        }
        if rules.max_players < rules.min_players {
            return invalid(format!(
                "max_players {} is below min_players {}",
                rules.max_players, rules.min_players
            ));
        }
        if rules.max_per_team * 2 < rules.min_players {
            return invalid(format!(
                "two teams of {} cannot hold min_players {}",
                rules.max_per_team, rules.min_players
            ));
        }
        if rules.max_players > rules.max_per_team * 2 {
            return invalid(format!(
                "max_players {} exceeds two teams of {}",
                rules.max_players, rules.max_per_team
            ));
        }

        let interaction = &self.interaction;
        for (name, radius) in [
            ("radius", interaction.radius),
            ("auto_capture_radius", interaction.auto_capture_radius),
        ] {
            if !radius.is_finite() || radius <= 0.0 {
                return invalid(format!("interaction {name} must be positive"));
            }
        }

        if self.progression.max_level == 0 {
            return invalid("progression max_level must be at least 1".into());
        }
        if self.kill_streak_milestones.contains(&0) {
            return invalid("kill streak milestones must be positive".into());
        }

        let mut seen = BTreeSet::new();
        for arena in &self.arenas {
            if !seen.insert(arena.id.as_str()) {
                return invalid(format!("duplicate arena {}", arena.id));
            }
            let limits = arena.limits(rules);
            if limits.min_players < 2
                || limits.max_players < limits.min_players
                || limits.max_per_team * 2 < limits.min_players
                || limits.max_players > limits.max_per_team * 2
            {
                return invalid(format!("arena {} has inconsistent player limits", arena.id));
            }
            if let Some(bounds) = arena.bounds
                && let Some((label, _)) = arena
                    .locations()
                    .into_iter()
                    .find(|(_, p)| !bounds.contains(p))
            {
                return invalid(format!("arena {} {label} is outside its bounds", arena.id));
            }
        }

        Ok(())
    }

    /// Sorted, de-duplicated milestones.
    pub fn milestones(&self) -> Vec<u32> {
        let set: BTreeSet<u32> = self.kill_streak_milestones.iter().copied().collect();
        set.into_iter().collect()
    }

    /// Whole seconds to scheduler ticks.
    pub fn secs_to_ticks(&self, secs: u32) -> u64 {
        u64::from(secs) * u64::from(self.tick_rate_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
tick_rate_hz = 10
seed = 7
kill_streak_milestones = [5, 3, 5]

[rules]
min_players = 4
capture_limit = 5

[interaction]
mode = "automatic"
hold_secs = 0

[session]
reconnect_grace_secs = 60

[[arenas]]
id = "canyon"
max_players = 8

[arenas.spawns]
red = { x = -60.0, y = 64.0, z = 0.0 }
blue = { x = 60.0, y = 64.0, z = 0.0 }

[arenas.flag_bases]
red = { x = -50.0, y = 64.0, z = 0.0 }
blue = { x = 50.0, y = 64.0, z = 0.0 }

[arenas.capture_points]
red = { x = -45.0, y = 64.0, z = 0.0 }

[arenas.bounds]
min = { x = -100.0, y = 0.0, z = -100.0 }
max = { x = 100.0, y = 256.0, z = 100.0 }
"#;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_rate_hz, TICK_RATE_HZ);
        assert_eq!(config.seed, None);
        assert_eq!(config.interaction.mode, InteractionMode::Manual);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_sample_toml_parses() {
        let config = ServerConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.tick_rate_hz, 10);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.rules.min_players, 4);
        assert_eq!(config.rules.capture_limit, 5);
        // Unset rule fields keep their defaults
        assert_eq!(config.rules.countdown_secs, MatchRules::default().countdown_secs);
        assert_eq!(config.interaction.mode, InteractionMode::Automatic);
        assert_eq!(config.interaction.hold_secs, 0);
        assert_eq!(config.session.reconnect_grace_secs, 60);
        assert_eq!(config.milestones(), vec![3, 5]);

        let arena = &config.arenas[0];
        assert!(arena.enabled);
        assert_eq!(arena.max_players, Some(8));
        assert_eq!(arena.missing(), vec!["blue capture point".to_string()]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            ServerConfig {
                tick_rate_hz: 0,
                ..Default::default()
            },
            ServerConfig {
                rules: MatchRules {
                    min_players: 1,
                    ..Default::default()
                },
                ..Default::default()
            },
            ServerConfig {
                rules: MatchRules {
                    min_players: 10,
                    max_per_team: 4,
                    ..Default::default()
                },
                ..Default::default()
            },
            ServerConfig {
                rules: MatchRules {
                    min_players: 4,
                    max_players: 5,
                    max_per_team: 2,
                    ..Default::default()
                },
                ..Default::default()
            },
            ServerConfig {
                interaction: InteractionConfig {
                    radius: f64::NAN,
                    ..Default::default()
                },
                ..Default::default()
            },
            ServerConfig {
                kill_streak_milestones: vec![0, 3],
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "accepted {config:?}"
            );
        }
    }

    #[test]
    fn test_validate_rejects_location_outside_bounds() {
        let mut config = ServerConfig::from_toml_str(SAMPLE).unwrap();
        config.arenas[0].lobby = Some(flagfall_sim::Position::new(500.0, 64.0, 0.0));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lobby"));
    }

    #[test]
    fn test_arena_player_limit_must_fit_teams() {
        let mut config = ServerConfig::from_toml_str(SAMPLE).unwrap();
        config.arenas[0].max_per_team = Some(3);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("canyon"));

        config.arenas[0].max_players = Some(6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_arena_rejected() {
        let mut config = ServerConfig::from_toml_str(SAMPLE).unwrap();
        config.arenas.push(config.arenas[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error_and_missing_file() {
        assert!(matches!(
            ServerConfig::from_toml_str("tick_rate_hz = \"fast\""),
            Err(ConfigError::Parse(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let err = ServerConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert_eq!(err.code(), "config_io");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flagfall.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.arenas.len(), 1);
    }

    #[test]
    fn test_secs_to_ticks() {
        let config = ServerConfig::default();
        assert_eq!(config.secs_to_ticks(3), 3 * u64::from(TICK_RATE_HZ));
    }
}
