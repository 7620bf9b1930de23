//! Single-flight action execution for one agent.
//!
//! [`ActionExecutor`] is either idle or executing exactly one action. A
//! request that arrives while an action is in flight fails with
//! [`FailureReason::Busy`] and leaves the running action untouched.
//!
//! Cancellation is cooperative. [`ActionExecutor::cancel_current_action`]
//! returns the executor to idle immediately and clears the movement goal; the
//! abandoned action notices at its next world call and finishes with
//! [`FailureReason::Cancelled`].
//!
//! Every world error is mapped onto an [`ActionFailure`] here. Nothing
//! escapes `execute` except an [`ActionResult`].

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use civitas_types::{
    ActionData, ActionFailure, ActionRequest, ActionResult, ActionType, BlockPos, BuildParams,
    FailureReason, Inventory, Position, TradeParams,
};
use rand::Rng;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::blueprint;
use crate::crafting;
use crate::error::WorldError;
use crate::inventory;
use crate::phrasebook::{DefaultPhrasebook, Phrasebook};
use crate::planner::{self, GatherOptions, Gatherer};
use crate::tools;
use crate::world::{BlockInfo, EntityInfo, WorldConnection};

/// Log block names `gather_wood` looks for.
pub const LOG_BLOCKS: &[&str] = &["oak_log", "spruce_log", "birch_log"];

/// Block names `gather_stone` looks for.
pub const STONE_BLOCKS: &[&str] = &["stone"];

/// Animals `hunt_food` will chase.
pub const HUNTABLE: &[&str] = &["pig", "cow", "chicken", "sheep"];

/// Mobs `defend` will attack.
pub const HOSTILE: &[&str] = &["zombie", "skeleton", "spider", "creeper"];

const GATHER_RADIUS: f64 = 32.0;
const ORE_RADIUS: f64 = 64.0;
const HUNT_RADIUS: f64 = 32.0;
const THREAT_RADIUS: f64 = 16.0;
const DIG_REACH: f64 = 2.0;
const ATTACK_REACH: f64 = 2.0;
const EXPLORE_ARRIVAL: f64 = 5.0;
const BUILD_OFFSET: i32 = 5;

/// Consecutive misses before a multi-block gather gives up.
const MAX_GATHER_FAILURES: u32 = 5;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ExecState {
    current: Option<ActionType>,
    /// Bumped on every start and every cancel; an action whose epoch no
    /// longer matches has been cancelled.
    epoch: u64,
}

/// Runs actions for one agent against its world connection.
pub struct ActionExecutor {
    world: Arc<dyn WorldConnection>,
    phrasebook: Arc<dyn Phrasebook>,
    gather: GatherOptions,
    state: Mutex<ExecState>,
    cancel: Notify,
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("agent", &self.world.username())
            .field("current", &self.current_action())
            .field("gather", &self.gather)
            .finish_non_exhaustive()
    }
}

impl ActionExecutor {
    /// An idle executor bound to `world`.
    pub fn new(world: Arc<dyn WorldConnection>) -> Self {
        Self {
            world,
            phrasebook: Arc::new(DefaultPhrasebook),
            gather: GatherOptions::default(),
            state: Mutex::new(ExecState::default()),
            cancel: Notify::new(),
        }
    }

    /// Use `phrasebook` for chat lines.
    #[must_use]
    pub fn with_phrasebook(mut self, phrasebook: Arc<dyn Phrasebook>) -> Self {
        self.phrasebook = phrasebook;
        self
    }

    /// Use `options` when `build_structure` gathers materials.
    #[must_use]
    pub const fn with_gather_options(mut self, options: GatherOptions) -> Self {
        self.gather = options;
        self
    }

    /// The world connection this executor drives.
    pub fn world(&self) -> &Arc<dyn WorldConnection> {
        &self.world
    }

    /// The action in flight, if any.
    pub fn current_action(&self) -> Option<ActionType> {
        self.state().current
    }

    /// Whether an action is in flight.
    pub fn is_busy(&self) -> bool {
        self.current_action().is_some()
    }

    fn state(&self) -> MutexGuard<'_, ExecState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parse `kind` and `params`, then execute.
    pub async fn execute_kind(&self, kind: &str, params: &serde_json::Value) -> ActionResult {
        let request = ActionRequest::parse(kind, params).inspect_err(|failure| {
            warn!(agent = self.world.username(), kind, %failure, "Rejected action request");
        })?;
        self.execute(request).await
    }

    /// Execute one action, or fail with `busy` if one is already running.
    pub async fn execute(&self, request: ActionRequest) -> ActionResult {
        let kind = request.action_type();
        let agent = self.world.username();

        let epoch = {
            let mut state = self.state();
            if let Some(current) = state.current {
                debug!(agent, %kind, %current, "Executor busy");
                return Err(ActionFailure::with_detail(
                    FailureReason::Busy,
                    format!("already executing {current}"),
                ));
            }
            state.epoch = state.epoch.wrapping_add(1);
            state.current = Some(kind);
            state.epoch
        };
        let _slot = Slot { exec: self, epoch };

        info!(agent, action = %kind, "Executing action");
        let result = Flight { exec: self, epoch }.run(request).await;
        match &result {
            Ok(data) => info!(agent, action = %kind, ?data, "Action succeeded"),
            Err(failure) => warn!(agent, action = %kind, %failure, "Action failed"),
        }
        result
    }

    /// Cancel the in-flight action, returning its kind.
    ///
    /// The executor is idle when this returns. Clearing the movement goal is
    /// best effort.
    pub async fn cancel_current_action(&self) -> Option<ActionType> {
        let cancelled = {
            let mut state = self.state();
            let current = state.current.take();
            if current.is_some() {
                state.epoch = state.epoch.wrapping_add(1);
            }
            current
        };
        let kind = cancelled?;

        info!(agent = self.world.username(), action = %kind, "Cancelling action");
        self.cancel.notify_waiters();
        if let Err(err) = self.world.stop_movement().await {
            warn!(agent = self.world.username(), %err, "Could not clear movement goal");
        }
        Some(kind)
    }
}

/// Returns the executor to idle when the action that claimed it finishes.
struct Slot<'a> {
    exec: &'a ActionExecutor,
    epoch: u64,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        let mut state = self.exec.state();
        if state.epoch == self.epoch {
            state.current = None;
        }
    }
}

fn world_failure(err: WorldError) -> ActionFailure {
    ActionFailure::with_detail(err.failure_reason(), err.to_string())
}

fn cancelled() -> ActionFailure {
    ActionFailure::new(FailureReason::Cancelled)
}

// ---------------------------------------------------------------------------
// Flight: one running action
// ---------------------------------------------------------------------------

/// The running action's view of the executor.
///
/// Nested actions issued by the material planner run through this scope
/// directly, so they do not trip the busy gate and share the outer
/// action's cancellation.
struct Flight<'a> {
    exec: &'a ActionExecutor,
    epoch: u64,
}

impl Flight<'_> {
    fn world(&self) -> &dyn WorldConnection {
        self.exec.world.as_ref()
    }

    fn agent(&self) -> &str {
        self.exec.world.username()
    }

    fn checkpoint(&self) -> Result<(), ActionFailure> {
        let epoch = self.exec.state().epoch;
        if epoch == self.epoch {
            Ok(())
        } else {
            Err(cancelled())
        }
    }

    /// Run one world call, giving up early if the action is cancelled.
    async fn guarded<T, F>(&self, call: F) -> Result<T, ActionFailure>
    where
        F: Future<Output = Result<T, WorldError>> + Send,
    {
        let notified = self.exec.cancel.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        self.checkpoint()?;

        tokio::select! {
            result = call => {
                let value = result.map_err(world_failure)?;
                self.checkpoint()?;
                Ok(value)
            }
            () = &mut notified => Err(cancelled()),
        }
    }

    async fn run(&self, request: ActionRequest) -> ActionResult {
        match request {
            ActionRequest::GatherWood { amount } => {
                self.gather_blocks("wood", LOG_BLOCKS, amount).await
            }
            ActionRequest::GatherStone { amount } => {
                self.gather_blocks("stone", STONE_BLOCKS, amount).await
            }
            ActionRequest::MineOre { ore } => self.mine_ore(ore).await,
            ActionRequest::HuntFood => self.hunt().await,
            ActionRequest::Explore { distance } => self.explore(distance).await,
            ActionRequest::BuildStructure(params) => self.build(params).await,
            ActionRequest::CraftItem { item } => self.craft(item).await,
            ActionRequest::Socialize { target } => self.socialize(target).await,
            ActionRequest::Trade(params) => self.trade(params).await,
            ActionRequest::Defend => self.defend().await,
            ActionRequest::Rest { duration_ms } => self.rest(duration_ms).await,
        }
    }

    // -- shared steps -------------------------------------------------------

    async fn position(&self) -> Result<Position, ActionFailure> {
        self.guarded(self.world().position())
            .await?
            .ok_or_else(|| ActionFailure::new(FailureReason::NoPosition))
    }

    async fn find_block(&self, names: &[&str], radius: f64) -> Result<BlockInfo, ActionFailure> {
        self.guarded(self.world().find_block(names, radius))
            .await?
            .ok_or_else(|| {
                ActionFailure::with_detail(
                    FailureReason::NoResourceNearby,
                    format!("no {} within {radius} blocks", names.join("/")),
                )
            })
    }

    async fn equip_tool_for(&self, block: &str) {
        let held = match self.world().inventory().await {
            Ok(held) => held,
            Err(err) => {
                warn!(agent = self.agent(), %err, "Could not read inventory for tool choice");
                return;
            }
        };
        if let Some(tool) = tools::best_tool(&held, block) {
            if let Err(err) = self.world().equip(tool).await {
                warn!(agent = self.agent(), tool, %err, "Could not equip tool");
            }
        }
    }

    async fn equip_weapon(&self) {
        let held = match self.world().inventory().await {
            Ok(held) => held,
            Err(err) => {
                warn!(agent = self.agent(), %err, "Could not read inventory for weapon choice");
                return;
            }
        };
        if let Some(weapon) = tools::best_weapon(&held) {
            if let Err(err) = self.world().equip(weapon).await {
                warn!(agent = self.agent(), weapon, %err, "Could not equip weapon");
            }
        }
    }

    async fn dig_nearest(&self, names: &[&str], radius: f64) -> Result<String, ActionFailure> {
        let block = self.find_block(names, radius).await?;
        self.equip_tool_for(&block.name).await;
        self.guarded(self.world().goto(block.position.center(), DIG_REACH))
            .await?;
        self.guarded(self.world().dig(block.position)).await?;
        Ok(block.name)
    }

    async fn approach_and_attack(&self, target: &EntityInfo) -> Result<(), ActionFailure> {
        self.equip_weapon().await;
        self.guarded(self.world().goto(target.position, ATTACK_REACH))
            .await?;
        self.guarded(self.world().attack(target.id)).await
    }

    // -- actions ------------------------------------------------------------

    async fn gather_blocks(&self, family: &str, names: &[&str], amount: u32) -> ActionResult {
        let mut gathered: u32 = 0;
        let mut failures: u32 = 0;
        let mut last_failure = None;

        while gathered < amount {
            match self.dig_nearest(names, GATHER_RADIUS).await {
                Ok(_) => {
                    gathered = gathered.saturating_add(1);
                    failures = 0;
                    debug!(agent = self.agent(), family, gathered, amount, "Dug block");
                }
                Err(failure) if failure.reason == FailureReason::Cancelled => return Err(failure),
                Err(failure) if failure.reason == FailureReason::NoResourceNearby => {
                    last_failure = Some(failure);
                    break;
                }
                Err(failure) => {
                    failures = failures.saturating_add(1);
                    warn!(agent = self.agent(), family, %failure, failures, "Gather step failed");
                    last_failure = Some(failure);
                    if failures >= MAX_GATHER_FAILURES {
                        break;
                    }
                }
            }
        }

        if gathered == 0 && amount > 0 {
            return Err(last_failure
                .unwrap_or_else(|| ActionFailure::new(FailureReason::NoResourceNearby)));
        }
        if gathered < amount {
            info!(agent = self.agent(), family, gathered, amount, "Partial gather");
        }
        Ok(ActionData::Gathered {
            item: family.to_owned(),
            amount: gathered,
        })
    }

    async fn mine_ore(&self, ore: String) -> ActionResult {
        if !crafting::is_ore(&ore) {
            return Err(ActionFailure::with_detail(
                FailureReason::InvalidOreType,
                format!("`{ore}` is not an ore"),
            ));
        }
        self.dig_nearest(&[ore.as_str()], ORE_RADIUS).await?;
        Ok(ActionData::Mined { item: ore })
    }

    async fn hunt(&self) -> ActionResult {
        self.position().await?;
        let target = self
            .guarded(self.world().find_entity(HUNTABLE, HUNT_RADIUS))
            .await?
            .ok_or_else(|| ActionFailure::new(FailureReason::NoAnimalsFound))?;
        self.approach_and_attack(&target).await?;
        Ok(ActionData::Hunted {
            target: target.name,
        })
    }

    async fn explore(&self, distance: f64) -> ActionResult {
        let here = self.position().await?;
        let angle = rand::rng().random_range(0.0..std::f64::consts::TAU);
        let target = Position::new(
            angle.cos().mul_add(distance, here.x),
            here.y,
            angle.sin().mul_add(distance, here.z),
        );
        self.guarded(self.world().goto(target, EXPLORE_ARRIVAL))
            .await?;
        Ok(ActionData::Explored {
            distance,
            destination: target.block(),
        })
    }

    async fn build(&self, params: BuildParams) -> ActionResult {
        let name = params
            .structure
            .ok_or_else(|| ActionFailure::new(FailureReason::NoStructureType))?;
        let plan = blueprint::blueprint(&name).ok_or_else(|| {
            ActionFailure::with_detail(FailureReason::UnknownStructure, name.clone())
        })?;
        let origin = match params.position {
            Some(origin) => origin,
            None => BlockPos::from_floor(&self.position().await?).offset(
                BUILD_OFFSET,
                0,
                BUILD_OFFSET,
            ),
        };
        info!(agent = self.agent(), structure = %name, x = origin.x, y = origin.y, z = origin.z, "Planning build");

        let requirements = plan.requirements();
        if !params.skip_material_check && params.auto_gather {
            let held = self.guarded(self.world().inventory()).await?;
            let check = planner::check_materials(&requirements, &held);
            if !check.has_materials {
                info!(agent = self.agent(), missing = ?check.missing, "Missing materials, gathering");
                let report = planner::gather_materials(self, &requirements, &self.exec.gather).await;
                if report.cancelled {
                    return Err(cancelled());
                }
                if !report.success {
                    warn!(
                        agent = self.agent(),
                        still_missing = ?report.still_missing,
                        "Could not gather everything, building with what is held"
                    );
                }
            }
        }

        let mut held: Inventory = self.guarded(self.world().inventory()).await?;
        let mut placed: u32 = 0;
        let mut missing = Inventory::new();
        for (item, slot) in plan.placements(origin) {
            if inventory::remove(&mut held, item, 1).is_err() {
                inventory::add(&mut missing, item, 1);
                continue;
            }
            match self.guarded(self.world().place(item, slot)).await {
                Ok(()) => placed = placed.saturating_add(1),
                Err(failure) if failure.reason == FailureReason::Cancelled => return Err(failure),
                Err(failure) => {
                    debug!(agent = self.agent(), item, %failure, "Placement failed");
                    inventory::add(&mut missing, item, 1);
                }
            }
        }

        if placed == 0 {
            return Err(ActionFailure {
                reason: FailureReason::InsufficientMaterials,
                detail: Some(format!("nothing placed for {name}")),
                missing,
            });
        }
        Ok(ActionData::Built {
            structure: name,
            location: origin,
            complete: missing.is_empty(),
            placed,
            missing,
        })
    }

    async fn craft(&self, item: Option<String>) -> ActionResult {
        let item = item
            .filter(|i| !i.is_empty())
            .ok_or_else(|| ActionFailure::with_detail(FailureReason::InvalidItem, "no item given"))?;
        self.guarded(self.world().craft(&item, 1)).await?;
        Ok(ActionData::Crafted { item })
    }

    async fn socialize(&self, target: Option<String>) -> ActionResult {
        let message = self.exec.phrasebook.greeting(target.as_deref());
        self.guarded(self.world().chat(&message)).await?;
        Ok(ActionData::Socialized { message, target })
    }

    async fn trade(&self, params: TradeParams) -> ActionResult {
        let target = params
            .target
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ActionFailure::new(FailureReason::NoTarget))?;
        let message = self
            .exec
            .phrasebook
            .trade_offer(&target, &params.offer, &params.request);
        self.guarded(self.world().chat(&message)).await?;
        Ok(ActionData::TradeProposed { target })
    }

    async fn defend(&self) -> ActionResult {
        let threat = self
            .guarded(self.world().find_entity(HOSTILE, THREAT_RADIUS))
            .await?
            .ok_or_else(|| ActionFailure::new(FailureReason::NoThreat))?;
        self.approach_and_attack(&threat).await?;
        Ok(ActionData::Defended {
            threat: threat.name,
        })
    }

    async fn rest(&self, duration_ms: u64) -> ActionResult {
        self.guarded(async {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
            Ok::<(), WorldError>(())
        })
        .await?;
        Ok(ActionData::Rested { duration_ms })
    }
}

#[async_trait]
impl Gatherer for Flight<'_> {
    fn agent(&self) -> &str {
        self.exec.world.username()
    }

    async fn inventory(&self) -> Result<Inventory, WorldError> {
        self.world().inventory().await
    }

    async fn perform(&self, request: ActionRequest) -> ActionResult {
        if matches!(request, ActionRequest::BuildStructure(_)) {
            return Err(ActionFailure::with_detail(
                FailureReason::InvalidParams,
                "builds cannot be nested",
            ));
        }
        self.run(request).await
    }
}
