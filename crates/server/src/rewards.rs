//! Settlement payouts.
//!
//! Rewards are data: the orchestrator emits a `Reward` event per participant
//! and the host decides what an amount means (currency, items, ...).

use flagfall_sim::{PlayerSummary, Team};
use flagfall_wire::RewardLineProto;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub participation: u64,
    pub win_bonus: u64,
    pub per_kill: u64,
    pub per_capture: u64,
    pub per_return: u64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            participation: 10,
            win_bonus: 50,
            per_kill: 2,
            per_capture: 10,
            per_return: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardReason {
    Participation,
    Win,
    Kills,
    Captures,
    Returns,
}

impl RewardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Participation => "participation",
            Self::Win => "win",
            Self::Kills => "kills",
            Self::Captures => "captures",
            Self::Returns => "returns",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardLine {
    pub reason: RewardReason,
    pub amount: u64,
}

impl From<&RewardLine> for RewardLineProto {
    fn from(line: &RewardLine) -> Self {
        Self {
            reason: line.reason.as_str().to_string(),
            amount: line.amount,
        }
    }
}

/// Payout lines for one participant. Zero-amount lines are omitted; a draw
/// (`winner == None`) pays no win bonus.
pub fn reward_lines(
    config: &RewardConfig,
    summary: &PlayerSummary,
    winner: Option<Team>,
) -> Vec<RewardLine> {
    let won = winner.is_some() && summary.team == winner;
    let lines = [
        (RewardReason::Participation, config.participation),
        (RewardReason::Win, if won { config.win_bonus } else { 0 }),
        (
            RewardReason::Kills,
            config.per_kill.saturating_mul(u64::from(summary.kills)),
        ),
        (
            RewardReason::Captures,
            config.per_capture.saturating_mul(u64::from(summary.captures)),
        ),
        (
            RewardReason::Returns,
            config.per_return.saturating_mul(u64::from(summary.returns)),
        ),
    ];
    lines
        .into_iter()
        .filter(|&(_, amount)| amount > 0)
        .map(|(reason, amount)| RewardLine { reason, amount })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(team: Option<Team>, kills: u32, captures: u32, returns: u32) -> PlayerSummary {
        PlayerSummary {
            actor: 1,
            name: "p1".to_string(),
            team,
            kills,
            deaths: 0,
            captures,
            returns,
            score: 0,
        }
    }

    #[test]
    fn test_winner_gets_bonus_and_per_action_lines() {
        let lines = reward_lines(
            &RewardConfig::default(),
            &summary(Some(Team::Red), 3, 1, 0),
            Some(Team::Red),
        );
        assert_eq!(
            lines,
            vec![
                RewardLine {
                    reason: RewardReason::Participation,
                    amount: 10
                },
                RewardLine {
                    reason: RewardReason::Win,
                    amount: 50
                },
                RewardLine {
                    reason: RewardReason::Kills,
                    amount: 6
                },
                RewardLine {
                    reason: RewardReason::Captures,
                    amount: 10
                },
            ]
        );
    }

    #[test]
    fn test_draw_and_teamless_get_no_win_bonus() {
        let config = RewardConfig::default();
        let draw = reward_lines(&config, &summary(Some(Team::Blue), 0, 0, 0), None);
        assert_eq!(draw.len(), 1);
        assert_eq!(draw[0].reason, RewardReason::Participation);

        let teamless = reward_lines(&config, &summary(None, 0, 0, 0), Some(Team::Red));
        assert!(teamless.iter().all(|l| l.reason != RewardReason::Win));
    }

    #[test]
    fn test_zero_config_pays_nothing() {
        let config = RewardConfig {
            participation: 0,
            win_bonus: 0,
            per_kill: 0,
            per_capture: 0,
            per_return: 0,
        };
        assert!(reward_lines(&config, &summary(Some(Team::Red), 9, 9, 9), Some(Team::Red)).is_empty());
    }
}
