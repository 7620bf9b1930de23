//! Action request and result types exchanged with the action executor.
//!
//! An [`ActionRequest`] is the typed form of `executeAction(type, params)`.
//! It can be built directly or parsed from a kind string plus a JSON
//! parameter object (the shape goals store in their metadata), in which case
//! missing parameters take the documented defaults.
//!
//! Every execution yields an [`ActionResult`]: either [`ActionData`] on
//! success or an [`ActionFailure`] carrying one of the enumerated
//! [`FailureReason`] codes. Nothing escapes the executor as a panic or an
//! untyped error.

use core::fmt;
use core::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::ParseEnumError;
use crate::structs::{BlockPos, Inventory};

/// Default number of blocks for `gather_wood` / `gather_stone`.
pub const DEFAULT_GATHER_AMOUNT: u32 = 10;

/// Default ore for `mine_ore`.
pub const DEFAULT_ORE: &str = "iron_ore";

/// Default exploration distance in blocks.
pub const DEFAULT_EXPLORE_DISTANCE: f64 = 50.0;

/// Default rest duration in milliseconds.
pub const DEFAULT_REST_MS: u64 = 10_000;

// ---------------------------------------------------------------------------
// ActionType
// ---------------------------------------------------------------------------

/// The kinds of action an agent can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Chop logs.
    GatherWood,
    /// Dig stone.
    GatherStone,
    /// Mine a specific ore.
    MineOre,
    /// Hunt a passive animal.
    HuntFood,
    /// Walk to a random point at a given distance.
    Explore,
    /// Build a structure from a blueprint.
    BuildStructure,
    /// Craft a single item.
    CraftItem,
    /// Greet someone in chat.
    Socialize,
    /// Propose a trade in chat.
    Trade,
    /// Attack a nearby hostile.
    Defend,
    /// Do nothing for a while.
    Rest,
}

impl ActionType {
    /// Every variant, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::GatherWood,
        Self::GatherStone,
        Self::MineOre,
        Self::HuntFood,
        Self::Explore,
        Self::BuildStructure,
        Self::CraftItem,
        Self::Socialize,
        Self::Trade,
        Self::Defend,
        Self::Rest,
    ];

    /// The stable wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GatherWood => "gather_wood",
            Self::GatherStone => "gather_stone",
            Self::MineOre => "mine_ore",
            Self::HuntFood => "hunt_food",
            Self::Explore => "explore",
            Self::BuildStructure => "build_structure",
            Self::CraftItem => "craft_item",
            Self::Socialize => "socialize",
            Self::Trade => "trade",
            Self::Defend => "defend",
            Self::Rest => "rest",
        }
    }

    /// The failure codes this action kind can produce on its own.
    ///
    /// The executor boundary can additionally return any of
    /// [`FailureReason::BOUNDARY`] for every kind.
    pub const fn failure_reasons(self) -> &'static [FailureReason] {
        use FailureReason as R;
        match self {
            Self::GatherWood | Self::GatherStone => &[
                R::NoResourceNearby,
                R::MovementFailed,
                R::WorldError,
                R::Cancelled,
            ],
            Self::MineOre => &[
                R::InvalidOreType,
                R::NoResourceNearby,
                R::MovementFailed,
                R::WorldError,
                R::Cancelled,
            ],
            Self::HuntFood => &[
                R::NoAnimalsFound,
                R::NoPosition,
                R::MovementFailed,
                R::WorldError,
                R::Cancelled,
            ],
            Self::Explore => &[R::NoPosition, R::MovementFailed, R::Cancelled],
            Self::BuildStructure => &[
                R::NoStructureType,
                R::UnknownStructure,
                R::NoPosition,
                R::InsufficientMaterials,
                R::Cancelled,
            ],
            Self::CraftItem => &[R::InvalidItem, R::NoRecipe, R::WorldError, R::Cancelled],
            Self::Socialize => &[R::WorldError],
            Self::Trade => &[R::NoTarget, R::WorldError],
            Self::Defend => &[R::NoThreat, R::WorldError, R::Cancelled],
            Self::Rest => &[R::Cancelled],
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "action type",
                value: s.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// ActionRequest
// ---------------------------------------------------------------------------

/// Parameters for `build_structure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildParams {
    /// Blueprint name (`house`, `shelter`, ...).
    #[serde(default, alias = "type")]
    pub structure: Option<String>,
    /// Where to build; defaults to an offset from the agent's position.
    #[serde(default)]
    pub position: Option<BlockPos>,
    /// Skip the material check and gathering step entirely.
    #[serde(default, alias = "skipMaterialCheck")]
    pub skip_material_check: bool,
    /// Gather missing materials before building.
    #[serde(default = "default_true", alias = "autoGather")]
    pub auto_gather: bool,
}

impl BuildParams {
    /// Parameters for building `structure` with gathering enabled.
    pub fn new(structure: impl Into<String>) -> Self {
        Self {
            structure: Some(structure.into()),
            position: None,
            skip_material_check: false,
            auto_gather: true,
        }
    }
}

/// Parameters for `trade`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TradeParams {
    /// Who to propose the trade to.
    #[serde(default, alias = "targetPlayer", alias = "target_player")]
    pub target: Option<String>,
    /// What is offered.
    #[serde(default)]
    pub offer: String,
    /// What is asked for in return.
    #[serde(default)]
    pub request: String,
}

/// A typed action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    /// Chop up to `amount` logs.
    GatherWood {
        /// Target number of blocks.
        #[serde(default = "default_gather_amount")]
        amount: u32,
    },
    /// Dig up to `amount` stone blocks.
    GatherStone {
        /// Target number of blocks.
        #[serde(default = "default_gather_amount")]
        amount: u32,
    },
    /// Mine one block of `ore`.
    MineOre {
        /// Ore block name.
        #[serde(default = "default_ore", alias = "oreType", alias = "ore_type")]
        ore: String,
    },
    /// Hunt the nearest passive animal.
    HuntFood,
    /// Walk `distance` blocks in a random direction.
    Explore {
        /// Distance in blocks.
        #[serde(default = "default_explore_distance")]
        distance: f64,
    },
    /// Build a structure.
    BuildStructure(BuildParams),
    /// Craft one `item`.
    CraftItem {
        /// Item name.
        #[serde(default)]
        item: Option<String>,
    },
    /// Greet `target` (or everyone).
    Socialize {
        /// Who to greet.
        #[serde(default, alias = "targetPlayer", alias = "target_player")]
        target: Option<String>,
    },
    /// Propose a trade.
    Trade(TradeParams),
    /// Attack the nearest hostile.
    Defend,
    /// Idle for `duration_ms`.
    Rest {
        /// Rest duration in milliseconds.
        #[serde(default = "default_rest_ms", alias = "duration")]
        duration_ms: u64,
    },
}

const fn default_gather_amount() -> u32 {
    DEFAULT_GATHER_AMOUNT
}

fn default_ore() -> String {
    DEFAULT_ORE.to_owned()
}

const fn default_explore_distance() -> f64 {
    DEFAULT_EXPLORE_DISTANCE
}

const fn default_rest_ms() -> u64 {
    DEFAULT_REST_MS
}

const fn default_true() -> bool {
    true
}

impl ActionRequest {
    /// The kind of this request.
    pub const fn action_type(&self) -> ActionType {
        match self {
            Self::GatherWood { .. } => ActionType::GatherWood,
            Self::GatherStone { .. } => ActionType::GatherStone,
            Self::MineOre { .. } => ActionType::MineOre,
            Self::HuntFood => ActionType::HuntFood,
            Self::Explore { .. } => ActionType::Explore,
            Self::BuildStructure(_) => ActionType::BuildStructure,
            Self::CraftItem { .. } => ActionType::CraftItem,
            Self::Socialize { .. } => ActionType::Socialize,
            Self::Trade(_) => ActionType::Trade,
            Self::Defend => ActionType::Defend,
            Self::Rest { .. } => ActionType::Rest,
        }
    }

    /// A `rest` request for the given duration.
    pub fn rest(duration: Duration) -> Self {
        Self::Rest {
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Parse `kind` plus a JSON parameter object into a typed request.
    ///
    /// `params` may be `null` or an object; absent fields take their
    /// defaults. Unknown kinds fail with [`FailureReason::UnknownAction`],
    /// malformed parameters with [`FailureReason::InvalidParams`].
    pub fn parse(kind: &str, params: &serde_json::Value) -> Result<Self, ActionFailure> {
        let action_type: ActionType = kind.parse().map_err(|e: ParseEnumError| {
            ActionFailure::with_detail(FailureReason::UnknownAction, e.to_string())
        })?;

        let mut object = match params {
            serde_json::Value::Null => serde_json::Map::new(),
            serde_json::Value::Object(map) => map.clone(),
            other => {
                return Err(ActionFailure::with_detail(
                    FailureReason::InvalidParams,
                    format!("parameters must be an object, got {other}"),
                ));
            }
        };

        if matches!(action_type, ActionType::HuntFood | ActionType::Defend) {
            object.clear();
        }
        object.insert(
            "action".to_owned(),
            serde_json::Value::String(action_type.as_str().to_owned()),
        );

        serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| {
            ActionFailure::with_detail(FailureReason::InvalidParams, e.to_string())
        })
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Enumerated failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Another action is already executing for this agent.
    Busy,
    /// The action was cancelled before it finished.
    Cancelled,
    /// The action kind string is not recognised.
    UnknownAction,
    /// The action parameters could not be parsed.
    InvalidParams,
    /// No matching block was found in range.
    NoResourceNearby,
    /// The requested ore is not an ore block.
    InvalidOreType,
    /// No huntable animal in range.
    NoAnimalsFound,
    /// The agent's position is unknown.
    NoPosition,
    /// The movement collaborator could not reach the destination.
    MovementFailed,
    /// A dig, place, craft, chat or attack command failed.
    WorldError,
    /// `build_structure` without a structure name.
    NoStructureType,
    /// `build_structure` with an unknown blueprint.
    UnknownStructure,
    /// Nothing could be placed for lack of materials.
    InsufficientMaterials,
    /// `craft_item` with an unknown or missing item.
    InvalidItem,
    /// The item has no usable recipe.
    NoRecipe,
    /// `trade` without a target.
    NoTarget,
    /// `defend` with no hostile in range.
    NoThreat,
}

impl FailureReason {
    /// Codes the executor boundary can return for any action kind.
    pub const BOUNDARY: [Self; 3] = [Self::Busy, Self::UnknownAction, Self::InvalidParams];

    /// The stable wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::Cancelled => "cancelled",
            Self::UnknownAction => "unknown_action",
            Self::InvalidParams => "invalid_params",
            Self::NoResourceNearby => "no_resource_nearby",
            Self::InvalidOreType => "invalid_ore_type",
            Self::NoAnimalsFound => "no_animals_found",
            Self::NoPosition => "no_position",
            Self::MovementFailed => "movement_failed",
            Self::WorldError => "world_error",
            Self::NoStructureType => "no_structure_type",
            Self::UnknownStructure => "unknown_structure",
            Self::InsufficientMaterials => "insufficient_materials",
            Self::InvalidItem => "invalid_item",
            Self::NoRecipe => "no_recipe",
            Self::NoTarget => "no_target",
            Self::NoThreat => "no_threat",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured action failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFailure {
    /// The failure code.
    pub reason: FailureReason,
    /// Collaborator-provided detail, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Materials that were still needed (build failures).
    #[serde(default, skip_serializing_if = "Inventory::is_empty")]
    pub missing: Inventory,
}

impl ActionFailure {
    /// A failure with just a reason code.
    pub const fn new(reason: FailureReason) -> Self {
        Self {
            reason,
            detail: None,
            missing: Inventory::new(),
        }
    }

    /// A failure with a reason code and a detail message.
    pub fn with_detail(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: Some(detail.into()),
            missing: Inventory::new(),
        }
    }

    /// Whether this failure is the single-flight rejection.
    pub const fn is_busy(&self) -> bool {
        matches!(self.reason, FailureReason::Busy)
    }
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

/// Success payloads, one per action kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionData {
    /// Blocks dug for `gather_wood` / `gather_stone`.
    Gathered {
        /// Material family (`wood`, `stone`).
        item: String,
        /// Blocks actually dug.
        amount: u32,
    },
    /// One ore block mined.
    Mined {
        /// Ore block name.
        item: String,
    },
    /// An animal was attacked.
    Hunted {
        /// Animal name.
        target: String,
    },
    /// The agent walked somewhere new.
    Explored {
        /// Requested distance.
        distance: f64,
        /// Where it went.
        destination: BlockPos,
    },
    /// A structure was (at least partially) built.
    Built {
        /// Blueprint name.
        structure: String,
        /// Where it stands.
        location: BlockPos,
        /// Whether every blueprint block was placed.
        complete: bool,
        /// Blocks placed.
        placed: u32,
        /// Materials still missing.
        missing: Inventory,
    },
    /// One item crafted.
    Crafted {
        /// Item name.
        item: String,
    },
    /// A chat greeting was sent.
    Socialized {
        /// The message.
        message: String,
        /// Who it was addressed to.
        target: Option<String>,
    },
    /// A trade was proposed.
    TradeProposed {
        /// Trade partner.
        target: String,
    },
    /// A hostile was attacked.
    Defended {
        /// Hostile name.
        threat: String,
    },
    /// The agent rested.
    Rested {
        /// Rest duration in milliseconds.
        duration_ms: u64,
    },
}

/// The outcome of one executed action.
pub type ActionResult = Result<ActionData, ActionFailure>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_applies_defaults() {
        let req = ActionRequest::parse("gather_wood", &serde_json::Value::Null).unwrap();
        assert_eq!(req, ActionRequest::GatherWood { amount: 10 });

        let req = ActionRequest::parse("mine_ore", &json!({})).unwrap();
        assert_eq!(
            req,
            ActionRequest::MineOre {
                ore: "iron_ore".to_owned()
            }
        );

        let req = ActionRequest::parse("rest", &json!({})).unwrap();
        assert_eq!(req, ActionRequest::Rest { duration_ms: 10_000 });
    }

    #[test]
    fn parse_accepts_original_parameter_names() {
        let req = ActionRequest::parse(
            "build_structure",
            &json!({"type": "house", "skipMaterialCheck": true}),
        )
        .unwrap();
        match req {
            ActionRequest::BuildStructure(params) => {
                assert_eq!(params.structure.as_deref(), Some("house"));
                assert!(params.skip_material_check);
                assert!(params.auto_gather);
            }
            other => panic!("unexpected request {other:?}"),
        }

        let req = ActionRequest::parse("socialize", &json!({"targetPlayer": "Ash"})).unwrap();
        assert_eq!(
            req,
            ActionRequest::Socialize {
                target: Some("Ash".to_owned())
            }
        );
    }

    #[test]
    fn parse_ignores_params_for_parameterless_actions() {
        let req = ActionRequest::parse("defend", &json!({"urgency": 3})).unwrap();
        assert_eq!(req, ActionRequest::Defend);
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        let err = ActionRequest::parse("teleport", &serde_json::Value::Null).unwrap_err();
        assert_eq!(err.reason, FailureReason::UnknownAction);
    }

    #[test]
    fn parse_rejects_bad_params() {
        let err = ActionRequest::parse("gather_wood", &json!({"amount": "lots"})).unwrap_err();
        assert_eq!(err.reason, FailureReason::InvalidParams);

        let err = ActionRequest::parse("gather_wood", &json!([1, 2])).unwrap_err();
        assert_eq!(err.reason, FailureReason::InvalidParams);
    }

    #[test]
    fn every_kind_round_trips_through_its_name() {
        for kind in ActionType::ALL {
            assert_eq!(kind.as_str().parse::<ActionType>(), Ok(kind));
            assert!(!kind.failure_reasons().is_empty());
        }
    }

    #[test]
    fn request_reports_its_kind() {
        let req = ActionRequest::BuildStructure(BuildParams::new("house"));
        assert_eq!(req.action_type(), ActionType::BuildStructure);
        assert_eq!(
            ActionRequest::rest(Duration::from_secs(2)),
            ActionRequest::Rest { duration_ms: 2000 }
        );
    }
}
