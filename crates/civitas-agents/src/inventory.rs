//! Inventory arithmetic over item-name maps.
//!
//! All quantities use checked or saturating arithmetic; no silent overflows,
//! no panics. Zero-count entries are never kept.

use civitas_types::Inventory;

/// How many of `item` the inventory holds.
pub fn count(inventory: &Inventory, item: &str) -> u32 {
    inventory.get(item).copied().unwrap_or(0)
}

/// Total held across every item whose name satisfies `matches`.
pub fn count_matching(inventory: &Inventory, matches: impl Fn(&str) -> bool) -> u32 {
    inventory
        .iter()
        .filter(|(name, _)| matches(name))
        .fold(0_u32, |acc, (_, qty)| acc.saturating_add(*qty))
}

/// Whether the inventory holds at least `amount` of `item`.
pub fn has(inventory: &Inventory, item: &str, amount: u32) -> bool {
    count(inventory, item) >= amount
}

/// Add `amount` of `item`, saturating at `u32::MAX`.
pub fn add(inventory: &mut Inventory, item: &str, amount: u32) {
    if amount == 0 {
        return;
    }
    let entry = inventory.entry(item.to_owned()).or_insert(0);
    *entry = entry.saturating_add(amount);
}

/// Remove `amount` of `item`. Fails without changing anything if fewer are
/// held. Removes the key when the count reaches zero.
pub fn remove(inventory: &mut Inventory, item: &str, amount: u32) -> Result<(), u32> {
    let current = count(inventory, item);
    let remaining = current.checked_sub(amount).ok_or(current)?;
    if remaining == 0 {
        inventory.remove(item);
    } else {
        inventory.insert(item.to_owned(), remaining);
    }
    Ok(())
}

/// For each requirement, how many more are needed than `inventory` holds.
/// Only positive shortfalls are listed.
pub fn shortfall(requirements: &Inventory, inventory: &Inventory) -> Inventory {
    requirements
        .iter()
        .filter_map(|(item, needed)| {
            let missing = needed.saturating_sub(count(inventory, item));
            (missing > 0).then(|| (item.clone(), missing))
        })
        .collect()
}
