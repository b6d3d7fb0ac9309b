//! Test setup utilities.
//!
//! Provides a grid map stub and factory functions so scenario tests read as
//! a session transcript rather than setup noise.

use std::collections::{BTreeMap, HashSet};

use glam::IVec2;

use crate::config::WorldConfig;
use crate::contracts::{DoorDescriptor, MapQuery, PlayerRecord};
use crate::entity::{ClientId, InstanceId, Orientation};
use crate::world::{ClientMessage, World};

/// Map stub: a set of blocked tiles and a table of doors, everything else
/// walkable.
#[derive(Debug, Default)]
pub struct GridMap {
    blocked: HashSet<(i32, i32)>,
    doors: BTreeMap<(i32, i32), DoorDescriptor>,
}

impl GridMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&mut self, x: i32, y: i32) {
        self.blocked.insert((x, y));
    }

    pub fn door(&mut self, x: i32, y: i32, destination: IVec2) {
        self.doors.insert(
            (x, y),
            DoorDescriptor {
                position: IVec2::new(x, y),
                destination,
                orientation: Orientation::Down,
            },
        );
    }
}

impl MapQuery for GridMap {
    fn is_colliding(&self, position: IVec2) -> bool {
        self.blocked.contains(&(position.x, position.y))
    }

    fn is_door(&self, position: IVec2) -> bool {
        self.doors.contains_key(&(position.x, position.y))
    }

    fn door_at(&self, position: IVec2) -> Option<DoorDescriptor> {
        self.doors.get(&(position.x, position.y)).cloned()
    }
}

/// A world over an empty, fully walkable map.
pub fn open_world() -> World<GridMap> {
    World::new(WorldConfig::default(), GridMap::new())
}

/// A world over the given map.
pub fn world_with(map: GridMap) -> World<GridMap> {
    World::new(WorldConfig::default(), map)
}

/// Connects client `client` at `(x, y)` and acknowledges readiness.
pub fn join(world: &mut World<GridMap>, client: u64, x: i32, y: i32) -> InstanceId {
    let record = PlayerRecord::new(format!("player{client}"), IVec2::new(x, y));
    let instance = world
        .connect(ClientId::new(client), record, 0)
        .expect("connect");
    world.ready(instance).expect("ready");
    instance
}

/// Drops the packets and events accumulated during setup so assertions see
/// only what the scenario itself produced.
pub fn settle(world: &mut World<GridMap>, clients: &[u64]) {
    world.drain_events();
    for client in clients {
        world.drain_packets(ClientId::new(*client));
    }
}

/// Enqueues a movement start and ticks.
pub fn start(
    world: &mut World<GridMap>,
    instance: InstanceId,
    x: i32,
    y: i32,
    speed: u32,
    now: u64,
) {
    world
        .enqueue(
            instance,
            ClientMessage::MovementStarted { position: IVec2::new(x, y), speed, target: None },
        )
        .expect("enqueue");
    world.tick(now);
}

/// Enqueues a movement step (client clock in sync) and ticks.
pub fn step(world: &mut World<GridMap>, instance: InstanceId, x: i32, y: i32, now: u64) {
    world
        .enqueue(
            instance,
            ClientMessage::MovementStep { position: IVec2::new(x, y), timestamp: now },
        )
        .expect("enqueue");
    world.tick(now);
}

/// Enqueues a movement stop facing down and ticks.
pub fn stop(world: &mut World<GridMap>, instance: InstanceId, x: i32, y: i32, now: u64) {
    world
        .enqueue(
            instance,
            ClientMessage::MovementStop {
                position: IVec2::new(x, y),
                target: None,
                orientation: Orientation::Down,
            },
        )
        .expect("enqueue");
    world.tick(now);
}
