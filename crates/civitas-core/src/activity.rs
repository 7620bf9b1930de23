//! Personality-weighted choice of the next autonomous action.

use std::time::Duration;

use civitas_types::{ActionRequest, AgentStats, BuildParams, Personality};
use rand::Rng;
use rand::seq::IndexedRandom;

/// Food level below which hunting gets a strong boost.
pub const HUNGRY_FOOD: i64 = 12;

/// How long an idle agent rests.
pub const IDLE_REST: Duration = Duration::from_secs(5);

const STRUCTURES: [&str; 3] = ["shelter", "storage", "workshop"];

/// Pick the next action for an idle agent.
///
/// Every candidate carries a weight derived from the agent's traits and
/// vitals; the draw is proportional to those weights.
pub fn choose_activity<R: Rng + ?Sized>(
    personality: &Personality,
    stats: &AgentStats,
    rng: &mut R,
) -> ActionRequest {
    let p = personality;
    let hunger_boost = if stats.food < HUNGRY_FOOD { 1.5 } else { 0.0 };
    let structure = STRUCTURES.choose(rng).copied().unwrap_or("shelter");

    let candidates = [
        (p.work_ethic, ActionRequest::GatherWood { amount: 4 }),
        (p.work_ethic * 0.7, ActionRequest::GatherStone { amount: 4 }),
        (
            p.ambition * p.risk_tolerance,
            ActionRequest::MineOre {
                ore: "iron_ore".to_owned(),
            },
        ),
        (p.aggression * 0.5 + hunger_boost, ActionRequest::HuntFood),
        (
            p.curiosity,
            ActionRequest::Explore {
                distance: rng.random_range(20.0..60.0),
            },
        ),
        (
            p.ambition * p.creativity,
            ActionRequest::BuildStructure(BuildParams::new(structure)),
        ),
        (p.sociability, ActionRequest::Socialize { target: None }),
        (p.aggression * 0.3, ActionRequest::Defend),
        ((1.0 - p.work_ethic) * 0.5, ActionRequest::rest(IDLE_REST)),
    ];

    candidates
        .choose_weighted(rng, |(weight, _)| weight.max(0.0))
        .map_or_else(|_| ActionRequest::rest(IDLE_REST), |(_, request)| request.clone())
}
