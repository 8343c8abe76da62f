//! Scenario loading, generation and the in-memory host shared between
//! yard_cli and yard_daemon.

mod generate;
mod host;
mod runner;
mod scenario;
mod script;

use std::collections::BTreeSet;

use glam::DQuat;
use yard_core::{ComponentCounts, ShipyardRegistry, ToolId};

pub use generate::generate_scenario;
pub use host::{HostBlock, HostInventory, HostStructure, HostTool, HostYard, MemoryWorld};
pub use runner::ScenarioRun;
pub use scenario::{
    load_scenario, validate_scenario, BlockDef, BlockPlacement, ComponentStack, InventoryDef,
    Scenario, ScriptAction, ScriptEntry, StructureDef, YardDef,
};
pub use script::apply_due;

/// Build the host world a scenario describes. Expects a validated scenario;
/// dangling references are skipped.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn build_world(scenario: &Scenario) -> MemoryWorld {
    let mut world = MemoryWorld::new(scenario.block_defs.clone());

    for def in &scenario.structures {
        world.insert_structure(HostStructure {
            id: def.id.clone(),
            center: def.center,
            half_extents: def.half_extents,
            rotation: def.rotation.unwrap_or(DQuat::IDENTITY),
            velocity: def.velocity,
            physical: def.physical,
            projector: def.projector,
            projection_of: def.projection_of.clone(),
            closed: false,
            blocks: BTreeSet::new(),
        });
        let projected = def.projection_of.is_some();
        for placement in &def.blocks {
            let Some(block_def) = scenario.block_defs.get(&placement.def) else {
                continue;
            };
            let fraction = if projected { 0.0 } else { placement.built };
            let mut remaining =
                (block_def.component_total() as f32 * fraction).round().max(0.0) as u32;
            let mounted = block_def
                .components
                .iter()
                .map(|stack| {
                    let n = stack.count.min(remaining);
                    remaining -= n;
                    n
                })
                .collect();
            world.insert_block(HostBlock {
                id: placement.id.clone(),
                structure: def.id.clone(),
                def: placement.def.clone(),
                offset: placement.offset,
                integrity: block_def.max_integrity * fraction,
                mounted,
                deformation: placement.deformation.max(0.0),
                inventory: placement.inventory.clone(),
                projected,
                blocked: placement.blocked,
            });
        }
    }

    for def in &scenario.inventories {
        world.insert_inventory(
            def.id.clone(),
            HostInventory {
                network: def.network,
                items: def.items.clone(),
            },
        );
    }

    for def in &scenario.yards {
        let host_center = scenario
            .structures
            .iter()
            .find(|s| s.id == def.host)
            .map_or(def.center, |s| s.center);
        world.insert_yard(
            HostYard {
                id: def.id.clone(),
                host: def.host.clone(),
                offset: def.center - host_center,
                half_extents: def.half_extents,
                rotation: def.rotation.unwrap_or(DQuat::IDENTITY),
                mobile: def.mobile,
                frame_broken: false,
                tools: std::array::from_fn(|i| ToolId(format!("{}_tool_{i}", def.id))),
            },
            def.network,
            def.tool_capacity,
        );
    }
    world
}

/// Registry primed with each yard's scenario settings.
pub fn build_registry(scenario: &Scenario, authoritative: bool) -> ShipyardRegistry {
    let mut registry = ShipyardRegistry::new(authoritative);
    for def in &scenario.yards {
        if let Some(settings) = &def.settings {
            registry.store_settings(def.id.clone(), settings.clone());
        }
    }
    registry
}

/// Sum of every item held in the scenario's cargo inventories.
pub fn total_cargo(world: &MemoryWorld) -> ComponentCounts {
    let mut total = ComponentCounts::new();
    for inventory in world.inventories.values() {
        for (item, count) in &inventory.items {
            *total.entry(item.clone()).or_insert(0) += count;
        }
    }
    total
}
