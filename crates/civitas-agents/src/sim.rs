//! An in-process sandbox world.
//!
//! [`SimulatedWorld`] implements [`Connector`] and hands out
//! [`WorldConnection`]s backed by one shared, mutex-guarded world state:
//! a sparse block map, a set of entities and one record per logged-in
//! player. It has no physics. Movement teleports after an optional delay,
//! digging drops the block (stone drops cobblestone), and crafting follows
//! [`crate::crafting`].
//!
//! Test hooks let callers script failures: failing logins, blocked or slow
//! movement, damage, kicks and chat from outside.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use civitas_types::{BlockPos, Inventory, Position};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::debug;

use crate::crafting;
use crate::error::WorldError;
use crate::inventory;
use crate::world::{
    BlockInfo, ConnectProfile, Connector, EVENT_CHANNEL_CAPACITY, EntityInfo, WorldConnection,
    WorldEvent, WorldSession,
};

const MAX_HEALTH: f64 = 20.0;
const MAX_FOOD: i64 = 20;

/// Entities that drop food when killed.
fn drop_for_entity(name: &str) -> Option<&'static str> {
    match name {
        "pig" => Some("porkchop"),
        "cow" => Some("beef"),
        "chicken" => Some("chicken"),
        "sheep" => Some("mutton"),
        _ => None,
    }
}

/// What a block leaves behind when dug.
fn drop_for_block(name: &str) -> &str {
    match name {
        "stone" => "cobblestone",
        other => other,
    }
}

#[derive(Debug, Clone)]
struct SimEntity {
    name: String,
    position: Position,
}

#[derive(Debug)]
struct SimPlayer {
    position: Position,
    inventory: Inventory,
    health: f64,
    food: i64,
    online: bool,
    held_item: Option<String>,
    events: Option<mpsc::Sender<WorldEvent>>,
}

impl SimPlayer {
    fn emit(&self, event: WorldEvent) {
        if let Some(tx) = &self.events {
            if let Err(err) = tx.try_send(event) {
                debug!(%err, "Dropped sandbox event");
            }
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    blocks: BTreeMap<BlockPos, String>,
    entities: BTreeMap<u64, SimEntity>,
    next_entity: u64,
    players: BTreeMap<String, SimPlayer>,
    failing_connects: BTreeMap<String, u32>,
    movement_delay: Duration,
    movement_blocked: bool,
    chat_log: Vec<(String, String)>,
}

impl SimState {
    fn online(&mut self, username: &str) -> Result<&mut SimPlayer, WorldError> {
        self.players
            .get_mut(username)
            .filter(|p| p.online)
            .ok_or(WorldError::Disconnected)
    }

    fn broadcast(&self, from: &str, message: &str) {
        for (name, player) in &self.players {
            if player.online && name != from {
                player.emit(WorldEvent::Chat {
                    from: from.to_owned(),
                    message: message.to_owned(),
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SimulatedWorld
// ---------------------------------------------------------------------------

/// A shared sandbox world. Clones share state.
#[derive(Debug, Clone)]
pub struct SimulatedWorld {
    state: Arc<Mutex<SimState>>,
    spawn: Position,
}

impl Default for SimulatedWorld {
    fn default() -> Self {
        Self::new(Position::new(0.0, 64.0, 0.0))
    }
}

impl SimulatedWorld {
    /// An empty world where players spawn at `spawn`.
    pub fn new(spawn: Position) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
            spawn,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Where new players appear.
    pub const fn spawn_point(&self) -> Position {
        self.spawn
    }

    /// Put a block at `at`, replacing whatever was there.
    pub fn place_block(&self, at: BlockPos, name: impl Into<String>) {
        self.lock().blocks.insert(at, name.into());
    }

    /// The block at `at`, if any.
    pub fn block_at(&self, at: BlockPos) -> Option<String> {
        self.lock().blocks.get(&at).cloned()
    }

    /// How many blocks named `name` exist.
    pub fn block_count(&self, name: &str) -> usize {
        self.lock().blocks.values().filter(|b| *b == name).count()
    }

    /// Add an entity and return its id.
    pub fn spawn_entity(&self, name: impl Into<String>, position: Position) -> u64 {
        let mut state = self.lock();
        state.next_entity = state.next_entity.saturating_add(1);
        let id = state.next_entity;
        state.entities.insert(
            id,
            SimEntity {
                name: name.into(),
                position,
            },
        );
        id
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.lock().entities.len()
    }

    /// Give a player items. Unknown players are ignored.
    pub fn give(&self, username: &str, item: &str, count: u32) {
        if let Some(player) = self.lock().players.get_mut(username) {
            inventory::add(&mut player.inventory, item, count);
        }
    }

    /// Teleport a player.
    pub fn set_position(&self, username: &str, position: Position) {
        let mut state = self.lock();
        if let Some(player) = state.players.get_mut(username) {
            player.position = position;
            player.emit(WorldEvent::PositionChanged { position });
        }
    }

    /// Make the next `times` logins for `username` fail.
    pub fn fail_connects(&self, username: &str, times: u32) {
        self.lock()
            .failing_connects
            .insert(username.to_owned(), times);
    }

    /// Delay every `goto` by `delay`.
    pub fn set_movement_delay(&self, delay: Duration) {
        self.lock().movement_delay = delay;
    }

    /// Make every `goto` fail.
    pub fn block_movement(&self, blocked: bool) {
        self.lock().movement_blocked = blocked;
    }

    /// Every chat line sent so far, as `(sender, message)`.
    pub fn chat_log(&self) -> Vec<(String, String)> {
        self.lock().chat_log.clone()
    }

    /// A player's inventory.
    pub fn inventory_of(&self, username: &str) -> Option<Inventory> {
        self.lock()
            .players
            .get(username)
            .map(|p| p.inventory.clone())
    }

    /// A player's position.
    pub fn position_of(&self, username: &str) -> Option<Position> {
        self.lock().players.get(username).map(|p| p.position)
    }

    /// Whether a player is logged in.
    pub fn is_online(&self, username: &str) -> bool {
        self.lock()
            .players
            .get(username)
            .is_some_and(|p| p.online)
    }

    /// Hurt a player. Health reaching zero emits a death.
    pub fn damage(&self, username: &str, amount: f64) {
        let mut state = self.lock();
        if let Some(player) = state.players.get_mut(username) {
            player.health = (player.health - amount).clamp(0.0, MAX_HEALTH);
            player.emit(WorldEvent::HealthChanged {
                health: player.health,
                food: player.food,
            });
            if player.health <= 0.0 {
                player.emit(WorldEvent::Death);
                player.health = MAX_HEALTH;
                player.food = MAX_FOOD;
            }
        }
    }

    /// Kick a player off the server.
    pub fn kick(&self, username: &str, reason: &str) {
        let mut state = self.lock();
        if let Some(player) = state.players.get_mut(username) {
            if player.online {
                player.online = false;
                player.emit(WorldEvent::Kicked {
                    reason: reason.to_owned(),
                });
                player.emit(WorldEvent::Disconnected);
                player.events = None;
            }
        }
    }

    /// Someone outside the simulation says something in chat.
    pub fn say(&self, from: &str, message: &str) {
        let mut state = self.lock();
        state.chat_log.push((from.to_owned(), message.to_owned()));
        state.broadcast(from, message);
    }

    /// Scatter trees, stone, ore and animals around `center`.
    ///
    /// Deterministic for a given seed.
    pub fn generate_terrain(&self, seed: u64, center: BlockPos, radius: i32) {
        let mut rng = StdRng::seed_from_u64(seed);
        let radius = radius.max(1);
        let mut blocks = Vec::new();
        let mut animals = Vec::new();

        for dx in radius.saturating_neg()..=radius {
            for dz in radius.saturating_neg()..=radius {
                let base = center.offset(dx, 0, dz);
                let roll: f64 = rng.random();
                if roll < 0.03 {
                    for height in 0..3 {
                        blocks.push((base.offset(0, height, 0), "oak_log"));
                    }
                } else if roll < 0.06 {
                    blocks.push((base, "stone"));
                } else if roll < 0.065 {
                    blocks.push((base.offset(0, -1, 0), "iron_ore"));
                } else if roll < 0.07 {
                    blocks.push((base.offset(0, -1, 0), "coal_ore"));
                } else if roll < 0.072 {
                    animals.push((
                        ["pig", "cow", "chicken", "sheep"]
                            .get(rng.random_range(0..4_usize))
                            .copied()
                            .unwrap_or("pig"),
                        base.center(),
                    ));
                }
            }
        }

        {
            let mut state = self.lock();
            for (at, name) in &blocks {
                state.blocks.insert(*at, (*name).to_owned());
            }
        }
        let animal_count = animals.len();
        for (name, position) in animals {
            self.spawn_entity(name, position);
        }
        debug!(seed, blocks = blocks.len(), animals = animal_count, "Generated sandbox terrain");
    }
}

#[async_trait]
impl Connector for SimulatedWorld {
    async fn connect(&self, profile: &ConnectProfile) -> Result<WorldSession, WorldError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        {
            let mut state = self.lock();
            if let Some(remaining) = state.failing_connects.get_mut(&profile.username) {
                if *remaining > 0 {
                    *remaining = remaining.saturating_sub(1);
                    return Err(WorldError::ConnectFailed {
                        username: profile.username.clone(),
                        reason: "connection refused".to_owned(),
                    });
                }
            }

            let player = state
                .players
                .entry(profile.username.clone())
                .or_insert_with(|| SimPlayer {
                    position: self.spawn,
                    inventory: Inventory::new(),
                    health: MAX_HEALTH,
                    food: MAX_FOOD,
                    online: false,
                    held_item: None,
                    events: None,
                });
            player.online = true;
            player.events = Some(tx);
            player.emit(WorldEvent::Login);
            player.emit(WorldEvent::Spawn {
                position: player.position,
            });
        }

        debug!(username = %profile.username, host = %profile.host, port = profile.port, "Sandbox login");
        Ok(WorldSession {
            connection: Arc::new(SimConnection {
                world: self.clone(),
                username: profile.username.clone(),
            }),
            events: rx,
        })
    }
}

// ---------------------------------------------------------------------------
// SimConnection
// ---------------------------------------------------------------------------

/// One player's handle on a [`SimulatedWorld`].
#[derive(Debug)]
pub struct SimConnection {
    world: SimulatedWorld,
    username: String,
}

impl SimConnection {
    fn with_player<T>(
        &self,
        f: impl FnOnce(&mut SimPlayer) -> Result<T, WorldError>,
    ) -> Result<T, WorldError> {
        let mut state = self.world.lock();
        f(state.online(&self.username)?)
    }
}

#[async_trait]
impl WorldConnection for SimConnection {
    fn username(&self) -> &str {
        &self.username
    }

    async fn position(&self) -> Result<Option<Position>, WorldError> {
        self.with_player(|p| Ok(Some(p.position)))
    }

    async fn inventory(&self) -> Result<Inventory, WorldError> {
        self.with_player(|p| Ok(p.inventory.clone()))
    }

    async fn find_block(
        &self,
        names: &[&str],
        max_distance: f64,
    ) -> Result<Option<BlockInfo>, WorldError> {
        let mut state = self.world.lock();
        let here = state.online(&self.username)?.position;
        Ok(state
            .blocks
            .iter()
            .filter(|(_, name)| names.contains(&name.as_str()))
            .map(|(at, name)| (at.center().distance(&here), at, name))
            .filter(|(distance, _, _)| *distance <= max_distance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, at, name)| BlockInfo {
                name: name.clone(),
                position: *at,
            }))
    }

    async fn find_entity(
        &self,
        names: &[&str],
        max_distance: f64,
    ) -> Result<Option<EntityInfo>, WorldError> {
        let mut state = self.world.lock();
        let here = state.online(&self.username)?.position;
        Ok(state
            .entities
            .iter()
            .filter(|(_, e)| names.contains(&e.name.as_str()))
            .map(|(id, e)| (e.position.distance(&here), id, e))
            .filter(|(distance, _, _)| *distance <= max_distance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, id, e)| EntityInfo {
                id: *id,
                name: e.name.clone(),
                position: e.position,
            }))
    }

    async fn goto(&self, target: Position, _range: f64) -> Result<(), WorldError> {
        let (delay, blocked) = {
            let mut state = self.world.lock();
            state.online(&self.username)?;
            (state.movement_delay, state.movement_blocked)
        };
        if blocked {
            return Err(WorldError::MovementFailed("path blocked".to_owned()));
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.with_player(|p| {
            p.position = target;
            p.emit(WorldEvent::PositionChanged { position: target });
            Ok(())
        })
    }

    async fn stop_movement(&self) -> Result<(), WorldError> {
        self.with_player(|_| Ok(()))
    }

    async fn dig(&self, at: BlockPos) -> Result<(), WorldError> {
        let mut state = self.world.lock();
        state.online(&self.username)?;
        let block = state
            .blocks
            .remove(&at)
            .ok_or_else(|| WorldError::Interaction(format!("no block at {at:?}")))?;
        let player = state.online(&self.username)?;
        inventory::add(&mut player.inventory, drop_for_block(&block), 1);
        Ok(())
    }

    async fn place(&self, item: &str, at: BlockPos) -> Result<(), WorldError> {
        let mut state = self.world.lock();
        if state.blocks.contains_key(&at) {
            return Err(WorldError::Interaction(format!("{at:?} is occupied")));
        }
        let player = state.online(&self.username)?;
        inventory::remove(&mut player.inventory, item, 1)
            .map_err(|_held| WorldError::NotInInventory(item.to_owned()))?;
        state.blocks.insert(at, item.to_owned());
        Ok(())
    }

    async fn craft(&self, item: &str, times: u32) -> Result<(), WorldError> {
        if !crafting::is_known_item(item) {
            return Err(WorldError::UnknownItem(item.to_owned()));
        }
        let recipe =
            crafting::recipe_for(item).ok_or_else(|| WorldError::NoRecipe(item.to_owned()))?;
        self.with_player(|p| {
            let mut after = p.inventory.clone();
            for _ in 0..times {
                for (input, qty) in &recipe.inputs {
                    inventory::remove(&mut after, input, *qty).map_err(|_held| {
                        WorldError::NoRecipe(format!("{item}: not enough {input}"))
                    })?;
                }
                inventory::add(&mut after, recipe.output, recipe.output_quantity);
            }
            p.inventory = after;
            Ok(())
        })
    }

    async fn equip(&self, item: &str) -> Result<(), WorldError> {
        self.with_player(|p| {
            if !inventory::has(&p.inventory, item, 1) {
                return Err(WorldError::NotInInventory(item.to_owned()));
            }
            p.held_item = Some(item.to_owned());
            Ok(())
        })
    }

    async fn chat(&self, message: &str) -> Result<(), WorldError> {
        let mut state = self.world.lock();
        state.online(&self.username)?;
        state
            .chat_log
            .push((self.username.clone(), message.to_owned()));
        state.broadcast(&self.username, message);
        Ok(())
    }

    async fn attack(&self, entity_id: u64) -> Result<(), WorldError> {
        let mut state = self.world.lock();
        state.online(&self.username)?;
        let entity = state
            .entities
            .remove(&entity_id)
            .ok_or_else(|| WorldError::Interaction(format!("no entity {entity_id}")))?;
        if let Some(food) = drop_for_entity(&entity.name) {
            let player = state.online(&self.username)?;
            inventory::add(&mut player.inventory, food, 1);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), WorldError> {
        let mut state = self.world.lock();
        if let Some(player) = state.players.get_mut(&self.username) {
            if player.online {
                player.online = false;
                player.emit(WorldEvent::Disconnected);
                player.events = None;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn profile(name: &str) -> ConnectProfile {
        ConnectProfile {
            username: name.to_owned(),
            host: "localhost".to_owned(),
            port: 25565,
            version: "1.20.1".to_owned(),
        }
    }

    #[tokio::test]
    async fn login_emits_login_then_spawn() {
        let world = SimulatedWorld::default();
        let mut session = world.connect(&profile("Ash")).await.unwrap();
        assert_eq!(session.events.recv().await, Some(WorldEvent::Login));
        assert!(matches!(
            session.events.recv().await,
            Some(WorldEvent::Spawn { .. })
        ));
        assert!(world.is_online("Ash"));
    }

    #[tokio::test]
    async fn scripted_connect_failures_run_out() {
        let world = SimulatedWorld::default();
        world.fail_connects("Ash", 1);
        assert!(world.connect(&profile("Ash")).await.is_err());
        assert!(world.connect(&profile("Ash")).await.is_ok());
    }

    #[tokio::test]
    async fn digging_stone_yields_cobblestone() {
        let world = SimulatedWorld::default();
        let session = world.connect(&profile("Ash")).await.unwrap();
        let at = BlockPos::new(1, 64, 1);
        world.place_block(at, "stone");
        session.connection.dig(at).await.unwrap();
        assert_eq!(
            world.inventory_of("Ash").unwrap().get("cobblestone"),
            Some(&1)
        );
        assert!(world.block_at(at).is_none());
    }

    #[tokio::test]
    async fn crafting_is_atomic() {
        let world = SimulatedWorld::default();
        let session = world.connect(&profile("Ash")).await.unwrap();
        world.give("Ash", "oak_log", 1);
        let err = session.connection.craft("oak_planks", 2).await.unwrap_err();
        assert!(matches!(err, WorldError::NoRecipe(_)));
        assert_eq!(world.inventory_of("Ash").unwrap().get("oak_log"), Some(&1));

        session.connection.craft("oak_planks", 1).await.unwrap();
        assert_eq!(
            world.inventory_of("Ash").unwrap().get("oak_planks"),
            Some(&4)
        );
        assert!(matches!(
            session.connection.craft("glass", 1).await,
            Err(WorldError::NoRecipe(_))
        ));
        assert!(matches!(
            session.connection.craft("unobtainium", 1).await,
            Err(WorldError::UnknownItem(_))
        ));
    }

    #[tokio::test]
    async fn disconnected_players_cannot_act() {
        let world = SimulatedWorld::default();
        let session = world.connect(&profile("Ash")).await.unwrap();
        session.connection.disconnect().await.unwrap();
        session.connection.disconnect().await.unwrap();
        assert_eq!(
            session.connection.inventory().await,
            Err(WorldError::Disconnected)
        );
    }

    #[tokio::test]
    async fn terrain_is_deterministic() {
        let a = SimulatedWorld::default();
        let b = SimulatedWorld::default();
        a.generate_terrain(7, BlockPos::new(0, 64, 0), 20);
        b.generate_terrain(7, BlockPos::new(0, 64, 0), 20);
        assert_eq!(a.block_count("oak_log"), b.block_count("oak_log"));
        assert_eq!(a.entity_count(), b.entity_count());
        assert!(a.block_count("oak_log") > 0);
    }
}
