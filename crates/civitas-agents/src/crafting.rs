//! Crafting recipes and the known item table.
//!
//! Defines the static recipe table mapping craftable outputs to their
//! ingredients. The sandbox world crafts from it; the material planner uses
//! [`needs_smelting`] to reject items no crafting grid can produce.

use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// CraftRecipe
// ---------------------------------------------------------------------------

/// A single crafting recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CraftRecipe {
    /// The item produced.
    pub output: &'static str,
    /// How many units one craft produces.
    pub output_quantity: u32,
    /// Ingredients consumed per craft (item -> quantity).
    pub inputs: BTreeMap<&'static str, u32>,
}

// ---------------------------------------------------------------------------
// Recipe Table
// ---------------------------------------------------------------------------

/// Raw items that exist in the world but are not crafted.
const RAW_ITEMS: &[&str] = &[
    "oak_log",
    "spruce_log",
    "birch_log",
    "stone",
    "cobblestone",
    "dirt",
    "sand",
    "gravel",
    "glass",
    "coal_ore",
    "iron_ore",
    "gold_ore",
    "diamond_ore",
    "porkchop",
    "beef",
    "chicken",
    "mutton",
];

/// Items that only a furnace can produce.
const SMELTED_ITEMS: &[&str] = &["glass", "iron_ingot", "gold_ingot", "smooth_stone"];

/// Look up the crafting recipe for `output`.
///
/// Returns `None` for raw and smelted items.
pub fn recipe_for(output: &str) -> Option<CraftRecipe> {
    let (output, output_quantity, inputs): (&'static str, u32, &[(&'static str, u32)]) =
        match output {
            "oak_planks" => ("oak_planks", 4, &[("oak_log", 1)]),
            "spruce_planks" => ("spruce_planks", 4, &[("spruce_log", 1)]),
            "birch_planks" => ("birch_planks", 4, &[("birch_log", 1)]),
            "stick" => ("stick", 4, &[("oak_planks", 2)]),
            "crafting_table" => ("crafting_table", 1, &[("oak_planks", 4)]),
            "chest" => ("chest", 1, &[("oak_planks", 8)]),
            "oak_door" => ("oak_door", 3, &[("oak_planks", 6)]),
            "furnace" => ("furnace", 1, &[("cobblestone", 8)]),
            "wooden_pickaxe" => ("wooden_pickaxe", 1, &[("oak_planks", 3), ("stick", 2)]),
            "wooden_axe" => ("wooden_axe", 1, &[("oak_planks", 3), ("stick", 2)]),
            "wooden_shovel" => ("wooden_shovel", 1, &[("oak_planks", 1), ("stick", 2)]),
            "wooden_sword" => ("wooden_sword", 1, &[("oak_planks", 2), ("stick", 1)]),
            "stone_pickaxe" => ("stone_pickaxe", 1, &[("cobblestone", 3), ("stick", 2)]),
            "stone_axe" => ("stone_axe", 1, &[("cobblestone", 3), ("stick", 2)]),
            "stone_sword" => ("stone_sword", 1, &[("cobblestone", 2), ("stick", 1)]),
            _ => return None,
        };
    Some(CraftRecipe {
        output,
        output_quantity,
        inputs: inputs.iter().copied().collect(),
    })
}

/// Whether `item` can only be made by smelting.
pub fn needs_smelting(item: &str) -> bool {
    SMELTED_ITEMS.contains(&item)
}

/// Whether the world knows `item` at all.
pub fn is_known_item(item: &str) -> bool {
    RAW_ITEMS.contains(&item) || needs_smelting(item) || recipe_for(item).is_some()
}

/// Whether `name` is an ore block.
pub fn is_ore(name: &str) -> bool {
    name.ends_with("_ore")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
