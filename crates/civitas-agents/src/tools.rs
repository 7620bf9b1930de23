//! Tool and weapon selection from the held inventory.

use civitas_types::Inventory;

/// The kind of tool a block wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Logs and wooden blocks.
    Axe,
    /// Stone and ores.
    Pickaxe,
    /// Dirt, sand and gravel.
    Shovel,
}

impl ToolKind {
    const fn suffix(self) -> &'static str {
        match self {
            Self::Axe => "_axe",
            Self::Pickaxe => "_pickaxe",
            Self::Shovel => "_shovel",
        }
    }

    /// Whether `item` is a tool of this kind.
    pub fn matches(self, item: &str) -> bool {
        // `_pickaxe` also ends with `axe` but not with `_axe`.
        item.ends_with(self.suffix())
    }
}

/// Material tiers, best first.
const TIERS: [&str; 5] = ["netherite", "diamond", "iron", "stone", "wooden"];

/// The tool kind best suited to dig `block`, if any.
pub fn tool_for_block(block: &str) -> Option<ToolKind> {
    if block.ends_with("_log") || block.ends_with("_planks") || block.ends_with("_wood") {
        Some(ToolKind::Axe)
    } else if block == "stone" || block == "cobblestone" || block.ends_with("_ore") {
        Some(ToolKind::Pickaxe)
    } else if matches!(block, "dirt" | "sand" | "gravel" | "grass_block") {
        Some(ToolKind::Shovel)
    } else {
        None
    }
}

fn tier_rank(item: &str) -> usize {
    TIERS
        .iter()
        .position(|tier| item.starts_with(tier))
        .unwrap_or(TIERS.len())
}

/// The best held tool for digging `block`.
pub fn best_tool<'a>(inventory: &'a Inventory, block: &str) -> Option<&'a str> {
    let kind = tool_for_block(block)?;
    inventory
        .iter()
        .filter(|(name, qty)| **qty > 0 && kind.matches(name))
        .min_by_key(|(name, _)| tier_rank(name))
        .map(|(name, _)| name.as_str())
}

fn is_weapon(item: &str) -> bool {
    item.ends_with("_sword") || ToolKind::Axe.matches(item) || item == "bow"
}

/// The best held weapon: highest tier first, swords before axes, then bows.
pub fn best_weapon(inventory: &Inventory) -> Option<&str> {
    inventory
        .iter()
        .filter(|(name, qty)| **qty > 0 && is_weapon(name))
        .min_by_key(|(name, _)| (tier_rank(name), !name.ends_with("_sword")))
        .map(|(name, _)| name.as_str())
}
