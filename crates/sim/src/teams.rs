//! Team auto-assignment.
//!
//! Run once when a match leaves the countdown. Participants are shuffled so
//! join order confers no side preference, then greedily placed on the team
//! with fewer members (Red on ties), never exceeding `max_per_team`.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::{ActorId, Team, TeamMap};

/// Assign teams to `actors`.
///
/// Returns `(actor, team)` pairs in shuffled order. Actors that do not fit
/// under `max_per_team` on either side get `None`.
pub fn balance<R: Rng + ?Sized>(
    actors: &[ActorId],
    max_per_team: usize,
    rng: &mut R,
) -> Vec<(ActorId, Option<Team>)> {
    let mut order = actors.to_vec();
    order.shuffle(rng);

    let mut counts: TeamMap<usize> = TeamMap::default();
    order
        .into_iter()
        .map(|actor| {
            let team = Team::ALL
                .into_iter()
                .filter(|&t| counts[t] < max_per_team)
                .min_by_key(|&t| counts[t]);
            if let Some(t) = team {
                counts[t] += 1;
            }
            (actor, team)
        })
        .collect()
}
