//! Admission checks.
//!
//! Pure checks run by `MatchOrchestrator::admit` before anything is mutated.
//! Order matters: arena problems are reported before capacity problems.

use flagfall_sim::{MatchSession, MatchState};

use crate::error::AdmissionError;
use crate::ports::ArenaConfig;

/// Resolve an arena lookup into a playable configuration.
///
/// # Errors
/// - `UnknownArena` when the provider has no such arena
/// - `ArenaDisabled` when it is switched off
/// - `ArenaIncomplete` listing every missing location
pub fn check_arena(config: Option<ArenaConfig>, id: &str) -> Result<ArenaConfig, AdmissionError> {
    let config = config.ok_or_else(|| AdmissionError::UnknownArena(id.to_string()))?;
    if !config.enabled {
        return Err(AdmissionError::ArenaDisabled(config.id));
    }
    let missing = config.missing();
    if !missing.is_empty() {
        return Err(AdmissionError::ArenaIncomplete {
            arena: config.id,
            missing: missing.join(", "),
        });
    }
    Ok(config)
}

/// Whether an existing match can take one more player.
pub fn check_capacity(session: &MatchSession) -> Result<(), AdmissionError> {
    match session.state() {
        MatchState::Waiting | MatchState::Starting => {}
        MatchState::Playing | MatchState::Ending => return Err(AdmissionError::MatchInProgress),
    }
    if session.is_full() {
        return Err(AdmissionError::MatchFull);
    }
    if session.teams_full() {
        return Err(AdmissionError::TeamFull);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagfall_sim::{
        MatchLimits, MatchRules, PlayerSession, Position, Progression, ProgressionRules, TeamMap,
    };
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn arena() -> ArenaConfig {
        let p = Position::default();
        ArenaConfig::new(
            "canyon",
            TeamMap::new(p, p),
            TeamMap::new(p, p),
            TeamMap::new(p, p),
        )
    }

    fn session(max_players: usize) -> MatchSession {
        session_with(max_players, MatchRules::default().max_per_team)
    }

    fn session_with(max_players: usize, max_per_team: usize) -> MatchSession {
        let rules = MatchRules::default();
        let limits = MatchLimits {
            max_players,
            max_per_team,
            ..MatchLimits::from(&rules)
        };
        MatchSession::new("canyon", limits, rules, ProgressionRules::default())
    }

    #[test]
    fn test_unknown_arena() {
        assert_eq!(
            check_arena(None, "nowhere"),
            Err(AdmissionError::UnknownArena("nowhere".to_string()))
        );
    }

    #[test]
    fn test_disabled_arena() {
        let mut config = arena();
        config.enabled = false;
        let err = check_arena(Some(config), "canyon").unwrap_err();
        assert_eq!(err.code(), "arena_disabled");
    }

    #[test]
    fn test_incomplete_arena_lists_missing() {
        let mut config = arena();
        config.flag_bases.blue = None;
        config.capture_points.red = None;
        assert_eq!(
            check_arena(Some(config), "canyon"),
            Err(AdmissionError::ArenaIncomplete {
                arena: "canyon".to_string(),
                missing: "red capture point, blue flag base".to_string(),
            })
        );
    }

    #[test]
    fn test_complete_arena_passes() {
        assert!(check_arena(Some(arena()), "canyon").is_ok());
    }

    #[test]
    fn test_capacity() {
        let mut m = session(2);
        assert!(check_capacity(&m).is_ok());

        for actor in 1..=2 {
            m.attach(PlayerSession::new(actor, "p", Progression::default()))
                .unwrap();
        }
        assert_eq!(check_capacity(&m), Err(AdmissionError::MatchFull));

        m.begin_countdown();
        let p = Position::default();
        m.start(TeamMap::new(p, p), &mut StdRng::seed_from_u64(1));
        assert_eq!(check_capacity(&m), Err(AdmissionError::MatchInProgress));
    }

    #[test]
    fn test_team_capacity_caps_admission() {
        let mut m = session_with(5, 2);
        for actor in 1..=3 {
            m.attach(PlayerSession::new(actor, "p", Progression::default()))
                .unwrap();
        }
        assert!(check_capacity(&m).is_ok());

        m.attach(PlayerSession::new(4, "p", Progression::default()))
            .unwrap();
        let err = check_capacity(&m).unwrap_err();
        assert_eq!(err, AdmissionError::TeamFull);
        assert_eq!(err.code(), "team_full");
    }
}
