//! Structure blueprints for `build_structure`.
//!
//! A blueprint is a material bill in placement order. Blocks are laid out in
//! 5x5 layers starting at the build origin: unit `i` goes to
//! `origin + (i % 5, i / 25, (i / 5) % 5)`.

use civitas_types::{BlockPos, Inventory};

/// Width and depth of one blueprint layer.
const LAYER_SIDE: u32 = 5;

/// A named structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blueprint {
    /// Blueprint name as used in requests.
    pub name: &'static str,
    /// Items to place, in order.
    pub materials: &'static [(&'static str, u32)],
}

/// Every known blueprint.
pub const BLUEPRINTS: &[Blueprint] = &[
    Blueprint {
        name: "shelter",
        materials: &[("oak_planks", 16)],
    },
    Blueprint {
        name: "house",
        materials: &[("cobblestone", 12), ("oak_planks", 24), ("oak_door", 1)],
    },
    Blueprint {
        name: "storage",
        materials: &[("oak_planks", 8), ("chest", 2)],
    },
    Blueprint {
        name: "wall",
        materials: &[("cobblestone", 32)],
    },
    Blueprint {
        name: "workshop",
        materials: &[("cobblestone", 8), ("oak_planks", 12), ("crafting_table", 1)],
    },
];

/// Look up a blueprint by name.
pub fn blueprint(name: &str) -> Option<&'static Blueprint> {
    BLUEPRINTS.iter().find(|b| b.name == name)
}

impl Blueprint {
    /// The full material bill as an inventory map.
    pub fn requirements(&self) -> Inventory {
        let mut bill = Inventory::new();
        for (item, qty) in self.materials {
            crate::inventory::add(&mut bill, item, *qty);
        }
        bill
    }

    /// Total blocks this blueprint places.
    pub fn total_blocks(&self) -> u32 {
        self.materials
            .iter()
            .fold(0_u32, |acc, (_, qty)| acc.saturating_add(*qty))
    }

    /// Every `(item, position)` placement, in build order.
    pub fn placements(&self, origin: BlockPos) -> Vec<(&'static str, BlockPos)> {
        self.materials
            .iter()
            .flat_map(|(item, qty)| std::iter::repeat_n(*item, usize::try_from(*qty).unwrap_or(0)))
            .zip(0_u32..)
            .map(|(item, index)| (item, layout_slot(origin, index)))
            .collect()
    }
}

/// Where unit `index` of a blueprint goes relative to `origin`.
pub fn layout_slot(origin: BlockPos, index: u32) -> BlockPos {
    let layer = LAYER_SIDE.saturating_mul(LAYER_SIDE);
    let dx = index.checked_rem(LAYER_SIDE).unwrap_or(0);
    let dy = index.checked_div(layer).unwrap_or(0);
    let dz = index
        .checked_div(LAYER_SIDE)
        .and_then(|row| row.checked_rem(LAYER_SIDE))
        .unwrap_or(0);
    origin.offset(
        i32::try_from(dx).unwrap_or(i32::MAX),
        i32::try_from(dy).unwrap_or(i32::MAX),
        i32::try_from(dz).unwrap_or(i32::MAX),
    )
}
