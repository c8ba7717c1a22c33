//! Persistent player progression.
//!
//! The snapshot is loaded by the orchestrator on admission and saved on
//! release; this module only owns the XP/level arithmetic.

use serde::{Deserialize, Serialize};

/// Persisted progression record of a single actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Progression {
    pub level: u32,
    /// XP accumulated toward the next level.
    pub xp: u64,
    pub lifetime_kills: u64,
    pub lifetime_deaths: u64,
    pub lifetime_captures: u64,
    pub lifetime_returns: u64,
    pub games_played: u64,
    pub games_won: u64,
}

impl Default for Progression {
    fn default() -> Self {
        Self {
            level: 1,
            xp: 0,
            lifetime_kills: 0,
            lifetime_deaths: 0,
            lifetime_captures: 0,
            lifetime_returns: 0,
            games_played: 0,
            games_won: 0,
        }
    }
}

/// XP curve and per-action grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionRules {
    /// XP required to leave level 1.
    pub xp_base: u64,
    /// Additional XP required per level after the first.
    pub xp_increment: u64,
    pub kill_xp: u64,
    pub capture_xp: u64,
    pub return_xp: u64,
    pub max_level: u32,
}

impl Default for ProgressionRules {
    fn default() -> Self {
        Self {
            xp_base: 100,
            xp_increment: 50,
            kill_xp: 10,
            capture_xp: 50,
            return_xp: 20,
            max_level: 100,
        }
    }
}

impl ProgressionRules {
    /// XP needed to advance from `level` to `level + 1`.
    ///
    /// `xp_for_level(n) = base + (n - 1) * increment`
    pub fn xp_for_level(&self, level: u32) -> u64 {
        let steps = u64::from(level.saturating_sub(1));
        self.xp_base
            .saturating_add(steps.saturating_mul(self.xp_increment))
    }
}

impl Progression {
    /// Add XP and apply every level-up it pays for.
    ///
    /// Returns the levels reached, in order (empty when no level-up happened).
    /// At `max_level` XP keeps accumulating but no further level is granted.
    pub fn grant_xp(&mut self, amount: u64, rules: &ProgressionRules) -> Vec<u32> {
        self.xp = self.xp.saturating_add(amount);

        let mut reached = Vec::new();
        while self.level < rules.max_level {
            let needed = rules.xp_for_level(self.level);
            if needed == 0 || self.xp < needed {
                break;
            }
            self.xp -= needed;
            self.level += 1;
            reached.push(self.level);
        }
        reached
    }
}
