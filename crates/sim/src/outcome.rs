//! Winner determination on clock expiry.
//!
//! Rules, first applicable wins:
//! 1. Higher capture score.
//! 2. Captures tied at exactly 2-2: combined score `captures*10 + kills`.
//! 3. Otherwise (or combined tie): more kills; equal kills is a draw.

use crate::{Team, TeamMap};

/// Capture tie at which the combined score is consulted.
pub const COMBINED_SCORE_TIE: u32 = 2;

/// Weight of a capture in the combined score.
pub const COMBINED_CAPTURE_WEIGHT: u32 = 10;

/// Decide the winner from final captures and kills. `None` is a draw.
pub fn determine_winner(captures: TeamMap<u32>, kills: TeamMap<u32>) -> Option<Team> {
    if let Some(team) = leader(captures) {
        return Some(team);
    }

    if captures.red == COMBINED_SCORE_TIE {
        let combined = TeamMap::from_fn(|t| {
            captures[t]
                .saturating_mul(COMBINED_CAPTURE_WEIGHT)
                .saturating_add(kills[t])
        });
        if let Some(team) = leader(combined) {
            return Some(team);
        }
    }

    leader(kills)
}

fn leader(values: TeamMap<u32>) -> Option<Team> {
    match values.red.cmp(&values.blue) {
        std::cmp::Ordering::Greater => Some(Team::Red),
        std::cmp::Ordering::Less => Some(Team::Blue),
        std::cmp::Ordering::Equal => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn winner(caps: (u32, u32), kills: (u32, u32)) -> Option<Team> {
        determine_winner(TeamMap::new(caps.0, caps.1), TeamMap::new(kills.0, kills.1))
    }

    #[test]
    fn test_higher_captures_win() {
        assert_eq!(winner((3, 1), (0, 40)), Some(Team::Red));
        assert_eq!(winner((0, 1), (9, 0)), Some(Team::Blue));
    }

    #[test]
    fn test_two_all_uses_combined_score() {
        // 20+10=30 vs 20+7=27
        assert_eq!(winner((2, 2), (10, 7)), Some(Team::Red));
        assert_eq!(winner((2, 2), (3, 4)), Some(Team::Blue));
    }

    #[test]
    fn test_two_all_combined_tie_is_draw() {
        assert_eq!(winner((2, 2), (6, 6)), None);
    }

    #[test]
    fn test_other_ties_fall_to_kills() {
        assert_eq!(winner((1, 1), (5, 4)), Some(Team::Red));
        assert_eq!(winner((0, 0), (0, 2)), Some(Team::Blue));
        assert_eq!(winner((3, 3), (8, 9)), Some(Team::Blue));
    }

    #[test]
    fn test_one_all_equal_kills_is_draw() {
        assert_eq!(winner((1, 1), (5, 5)), None);
    }

    proptest! {
        /// Property: the outcome never depends on which side is called red.
        #[test]
        fn prop_winner_is_symmetric(
            rc in 0u32..6, bc in 0u32..6, rk in 0u32..60, bk in 0u32..60
        ) {
            let forward = winner((rc, bc), (rk, bk));
            let mirrored = winner((bc, rc), (bk, rk));
            prop_assert_eq!(forward, mirrored.map(Team::opponent));
        }

        /// Property: a capture lead always wins regardless of kills.
        #[test]
        fn prop_capture_lead_dominates(
            low in 0u32..5, lead in 1u32..5, rk in 0u32..60, bk in 0u32..60
        ) {
            prop_assert_eq!(winner((low + lead, low), (rk, bk)), Some(Team::Red));
        }

        /// Property: pure function of its inputs.
        #[test]
        fn prop_winner_is_deterministic(
            rc in 0u32..6, bc in 0u32..6, rk in 0u32..60, bk in 0u32..60
        ) {
            prop_assert_eq!(winner((rc, bc), (rk, bk)), winner((rc, bc), (rk, bk)));
        }
    }
}
