//! Material planning and multi-step gathering.
//!
//! [`check_materials`] compares a bill of materials against an inventory.
//! [`gather_materials`] turns the shortfall into a tiered plan and works
//! through it with per-item retries and an overall time budget:
//!
//! 1. Wood (logs, and planks which are crafted straight from logs)
//! 2. Stone
//! 3. Ore
//! 4. Crafted intermediates (sticks, doors, chests...) and smelted items
//! 5. Anything with no known gathering method
//!
//! Gathering never returns an error. Shortfalls, exhausted retries and
//! budget overruns all end up in the [`GatherReport`].

use std::time::Duration;

use async_trait::async_trait;
use civitas_types::{ActionData, ActionRequest, ActionResult, FailureReason, Inventory};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::crafting;
use crate::error::WorldError;
use crate::inventory;

/// Planks produced per log.
const PLANKS_PER_LOG: u32 = 4;

// ---------------------------------------------------------------------------
// Gatherer
// ---------------------------------------------------------------------------

/// What the planner drives: an inventory view and a way to run actions.
#[async_trait]
pub trait Gatherer: Send + Sync {
    /// Who is gathering, for log fields.
    fn agent(&self) -> &str;

    /// Current inventory.
    async fn inventory(&self) -> Result<Inventory, WorldError>;

    /// Run one action to completion.
    async fn perform(&self, request: ActionRequest) -> ActionResult;
}

// ---------------------------------------------------------------------------
// Options and reports
// ---------------------------------------------------------------------------

/// Knobs for [`gather_materials`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherOptions {
    /// Attempts per plan item before it is marked failed.
    pub max_attempts: u32,
    /// Budget per plan item; the overall budget is this times plan length.
    pub timeout_per_material: Duration,
    /// Pause between attempts at the same item.
    pub retry_delay: Duration,
}

impl Default for GatherOptions {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            timeout_per_material: Duration::from_secs(30),
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl GatherOptions {
    /// Set the attempts per item (at least one).
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// Set the per-material budget.
    #[must_use]
    pub const fn with_timeout_per_material(mut self, timeout: Duration) -> Self {
        self.timeout_per_material = timeout;
        self
    }

    /// Set the retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Result of [`check_materials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialCheck {
    /// Whether nothing is missing.
    pub has_materials: bool,
    /// Shortfall per item.
    pub missing: Inventory,
    /// Held count for every required item.
    pub has: Inventory,
}

/// Result of [`gather_materials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherReport {
    /// Whether the final inventory covers every requirement.
    pub success: bool,
    /// Units obtained per plan item.
    pub gathered: Inventory,
    /// Plan items that exhausted their attempts, with the amount sought.
    pub failed: Inventory,
    /// Shortfall after gathering.
    pub still_missing: Inventory,
    /// Wall time spent.
    pub elapsed: Duration,
    /// Whether the overall budget ran out.
    pub timed_out: bool,
    /// Whether an action was cancelled mid-plan.
    pub cancelled: bool,
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// How a missing material is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum GatherMethod {
    /// Chop logs directly.
    ChopWood,
    /// Chop logs, then craft them into planks.
    CraftPlanks,
    /// Dig stone (drops cobblestone).
    DigStone,
    /// Mine one ore block per unit.
    MineOre,
    /// Craft from held intermediates.
    Craft,
    /// Needs a furnace.
    Smelt,
    /// No known way to obtain it.
    Unsupported,
}

impl GatherMethod {
    /// Classify a material name.
    pub fn for_material(material: &str) -> Self {
        if material.ends_with("_planks") {
            Self::CraftPlanks
        } else if material.ends_with("_log") {
            Self::ChopWood
        } else if matches!(material, "cobblestone" | "stone") {
            Self::DigStone
        } else if crafting::is_ore(material) {
            Self::MineOre
        } else if crafting::needs_smelting(material) {
            Self::Smelt
        } else if crafting::recipe_for(material).is_some() {
            Self::Craft
        } else {
            Self::Unsupported
        }
    }

    /// Plan ordering tier; lower runs first.
    pub const fn tier(&self) -> u8 {
        match self {
            Self::ChopWood | Self::CraftPlanks => 1,
            Self::DigStone => 2,
            Self::MineOre => 3,
            Self::Craft | Self::Smelt => 4,
            Self::Unsupported => 5,
        }
    }
}

/// One step of a gathering plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTask {
    /// Material to obtain.
    pub material: String,
    /// Units missing.
    pub amount: u32,
    /// How to obtain it.
    pub method: GatherMethod,
}

/// Compare `requirements` against `held`.
pub fn check_materials(requirements: &Inventory, held: &Inventory) -> MaterialCheck {
    let missing = inventory::shortfall(requirements, held);
    let has = requirements
        .keys()
        .map(|item| (item.clone(), inventory::count(held, item)))
        .collect();
    MaterialCheck {
        has_materials: missing.is_empty(),
        missing,
        has,
    }
}

/// Order a shortfall into plan tasks, stable within each tier.
pub fn plan(missing: &Inventory) -> Vec<PlanTask> {
    let mut tasks: Vec<PlanTask> = missing
        .iter()
        .filter(|(_, amount)| **amount > 0)
        .map(|(material, amount)| PlanTask {
            material: material.clone(),
            amount: *amount,
            method: GatherMethod::for_material(material),
        })
        .collect();
    tasks.sort_by_key(|task| task.method.tier());
    tasks
}

// ---------------------------------------------------------------------------
// Gathering
// ---------------------------------------------------------------------------

/// Why one attempt at a plan task did not finish.
#[derive(Debug)]
struct AttemptFailure {
    reason: String,
    cancelled: bool,
}

impl AttemptFailure {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            cancelled: false,
        }
    }
}

impl From<civitas_types::ActionFailure> for AttemptFailure {
    fn from(failure: civitas_types::ActionFailure) -> Self {
        Self {
            cancelled: failure.reason == FailureReason::Cancelled,
            reason: failure.to_string(),
        }
    }
}

/// Gather until `requirements` are held, the plan is exhausted, or the
/// budget runs out.
pub async fn gather_materials<G>(
    gatherer: &G,
    requirements: &Inventory,
    options: &GatherOptions,
) -> GatherReport
where
    G: Gatherer + ?Sized,
{
    let started = Instant::now();
    let agent = gatherer.agent();

    let held = match gatherer.inventory().await {
        Ok(held) => held,
        Err(err) => {
            warn!(agent, %err, "Inventory unavailable, cannot plan gathering");
            return GatherReport {
                success: false,
                gathered: Inventory::new(),
                failed: Inventory::new(),
                still_missing: requirements.clone(),
                elapsed: started.elapsed(),
                timed_out: false,
                cancelled: false,
            };
        }
    };

    let check = check_materials(requirements, &held);
    if check.has_materials {
        info!(agent, "All materials already available");
        return GatherReport {
            success: true,
            gathered: Inventory::new(),
            failed: Inventory::new(),
            still_missing: Inventory::new(),
            elapsed: started.elapsed(),
            timed_out: false,
            cancelled: false,
        };
    }

    let tasks = plan(&check.missing);
    let budget = options
        .timeout_per_material
        .saturating_mul(u32::try_from(tasks.len()).unwrap_or(u32::MAX));
    let deadline = started.checked_add(budget).unwrap_or(started);
    let max_attempts = options.max_attempts.max(1);

    info!(agent, tasks = tasks.len(), budget_ms = budget.as_millis(), "Starting material gathering");

    let mut gathered = Inventory::new();
    let mut failed = Inventory::new();
    let mut timed_out = false;
    let mut cancelled = false;

    'plan: for task in &tasks {
        if Instant::now() >= deadline {
            warn!(agent, material = %task.material, "Gathering budget exhausted");
            timed_out = true;
            break;
        }

        info!(agent, material = %task.material, amount = task.amount, method = ?task.method, "Gathering material");

        let mut attempt: u32 = 0;
        let mut done = false;
        while attempt < max_attempts {
            attempt = attempt.saturating_add(1);
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, run_task(gatherer, task)).await {
                Ok(Ok(amount)) => {
                    inventory::add(&mut gathered, &task.material, amount);
                    info!(agent, material = %task.material, amount, "Gathered material");
                    done = true;
                    break;
                }
                Ok(Err(failure)) => {
                    warn!(
                        agent,
                        material = %task.material,
                        attempt,
                        max_attempts,
                        reason = %failure.reason,
                        "Gathering attempt failed"
                    );
                    if failure.cancelled {
                        cancelled = true;
                        inventory::add(&mut failed, &task.material, task.amount);
                        break 'plan;
                    }
                }
                Err(_) => {
                    warn!(agent, material = %task.material, attempt, "Gathering budget exhausted mid-attempt");
                    timed_out = true;
                    inventory::add(&mut failed, &task.material, task.amount);
                    break 'plan;
                }
            }
            if attempt < max_attempts {
                let pause = options
                    .retry_delay
                    .min(deadline.saturating_duration_since(Instant::now()));
                tokio::time::sleep(pause).await;
            }
        }
        if !done {
            inventory::add(&mut failed, &task.material, task.amount);
        }
    }

    let still_missing = match gatherer.inventory().await {
        Ok(held) => inventory::shortfall(requirements, &held),
        Err(err) => {
            warn!(agent, %err, "Inventory unavailable after gathering");
            inventory::shortfall(&check.missing, &gathered)
        }
    };

    let report = GatherReport {
        success: still_missing.is_empty(),
        gathered,
        failed,
        still_missing,
        elapsed: started.elapsed(),
        timed_out,
        cancelled,
    };
    info!(
        agent,
        success = report.success,
        failed = report.failed.len(),
        elapsed_ms = report.elapsed.as_millis(),
        "Material gathering finished"
    );
    report
}

fn amount_of(data: &ActionData, fallback: u32) -> u32 {
    match data {
        ActionData::Gathered { amount, .. } => *amount,
        _ => fallback,
    }
}

/// One attempt at a plan task. Returns units obtained.
async fn run_task<G>(gatherer: &G, task: &PlanTask) -> Result<u32, AttemptFailure>
where
    G: Gatherer + ?Sized,
{
    match task.method {
        GatherMethod::ChopWood => {
            let data = gatherer
                .perform(ActionRequest::GatherWood {
                    amount: task.amount,
                })
                .await?;
            Ok(amount_of(&data, task.amount))
        }
        GatherMethod::DigStone => {
            let data = gatherer
                .perform(ActionRequest::GatherStone {
                    amount: task.amount,
                })
                .await?;
            Ok(amount_of(&data, task.amount))
        }
        GatherMethod::MineOre => {
            for _ in 0..task.amount {
                gatherer
                    .perform(ActionRequest::MineOre {
                        ore: task.material.clone(),
                    })
                    .await?;
            }
            Ok(task.amount)
        }
        GatherMethod::CraftPlanks => {
            let crafts = task.amount.div_ceil(PLANKS_PER_LOG);
            let log = planks_source(&task.material);
            let held = gatherer
                .inventory()
                .await
                .map_err(|e| AttemptFailure::new(e.to_string()))?;
            let logs_needed = crafts.saturating_sub(inventory::count(&held, &log));
            if logs_needed > 0 {
                gatherer
                    .perform(ActionRequest::GatherWood {
                        amount: logs_needed,
                    })
                    .await?;
            }
            craft_times(gatherer, &task.material, crafts).await?;
            Ok(crafts.saturating_mul(PLANKS_PER_LOG))
        }
        GatherMethod::Craft => {
            let per_craft = crafting::recipe_for(&task.material)
                .map_or(1, |r| r.output_quantity.max(1));
            let crafts = task.amount.div_ceil(per_craft);
            craft_times(gatherer, &task.material, crafts).await?;
            Ok(crafts.saturating_mul(per_craft))
        }
        GatherMethod::Smelt => Err(AttemptFailure::new("smelting_unsupported")),
        GatherMethod::Unsupported => Err(AttemptFailure::new("no_gather_method")),
    }
}

/// The log a planks variant is crafted from.
fn planks_source(planks: &str) -> String {
    let wood = planks.strip_suffix("_planks").unwrap_or("oak");
    format!("{wood}_log")
}

async fn craft_times<G>(gatherer: &G, item: &str, times: u32) -> Result<(), AttemptFailure>
where
    G: Gatherer + ?Sized,
{
    for _ in 0..times {
        gatherer
            .perform(ActionRequest::CraftItem {
                item: Some(item.to_owned()),
            })
            .await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
