use super::*;
use crate::geometry::OrientedBox;
use crate::test_fixtures::{block_at, structure_at, yard_record};
use crate::world::{
    BlockInfo, BuildCheck, Connectivity, Discovery, ShipyardRecord, SplitEvent, StructureInfo,
    World,
};
use glam::DVec3;
use std::collections::BTreeMap;

mod session;

// --- Fake host ----------------------------------------------------------

/// Minimal host: grinding and welding move integrity at the block's rate,
/// nothing is ever missing and projections are never buildable.
#[derive(Default)]
struct FakeWorld {
    structures: BTreeMap<StructureId, StructureInfo>,
    blocks: BTreeMap<BlockId, BlockInfo>,
    tools: BTreeMap<ToolId, (DVec3, bool)>,
    power: BTreeMap<ToolId, (f32, f32)>,
    splits: Vec<SplitEvent>,
    records: Vec<ShipyardRecord>,
    invalid: Vec<YardId>,
}

impl FakeWorld {
    fn add_yard(&mut self, record: ShipyardRecord) {
        for (tool, corner) in record.tools.iter().zip(record.bounds.corners()) {
            self.tools.insert(tool.clone(), (corner, false));
        }
        self.records.push(record);
    }

    fn add_structure(&mut self, id: &str, center: DVec3, half: DVec3, blocks: usize) {
        self.structures
            .insert(StructureId(id.to_string()), structure_at(id, center, half));
        for n in 0..blocks {
            let offset = DVec3::new(n as f64 * 0.5 - half.x / 2.0, 0.0, 0.0);
            let block = block_at(&format!("{id}_b{n:02}"), id, center + offset);
            self.blocks.insert(block.id.clone(), block);
        }
    }

    fn close(&mut self, id: &str) {
        if let Some(structure) = self.structures.get_mut(&StructureId(id.to_string())) {
            structure.closed = true;
        }
    }

    fn move_structure(&mut self, id: &str, by: DVec3) {
        let id = StructureId(id.to_string());
        if let Some(structure) = self.structures.get_mut(&id) {
            structure.bounds.center += by;
        }
        for block in self.blocks.values_mut().filter(|b| b.structure == id) {
            block.position += by;
        }
    }
}

impl World for FakeWorld {
    fn structure(&self, id: &StructureId) -> Option<StructureInfo> {
        self.structures.get(id).cloned()
    }

    fn structures_near(&self, center: DVec3, radius_sq: f64) -> Vec<StructureInfo> {
        self.structures
            .values()
            .filter(|s| !s.closed && s.bounds.center.distance_squared(center) <= radius_sq)
            .cloned()
            .collect()
    }

    fn blocks(&self, structure: &StructureId) -> Vec<BlockInfo> {
        self.blocks
            .values()
            .filter(|b| &b.structure == structure)
            .cloned()
            .collect()
    }

    fn block(&self, id: &BlockId) -> Option<BlockInfo> {
        self.blocks.get(id).cloned()
    }

    fn tool_position(&self, tool: &ToolId) -> Option<DVec3> {
        self.tools.get(tool).map(|(p, _)| *p)
    }

    fn tool_enabled(&self, tool: &ToolId) -> bool {
        self.tools.get(tool).is_some_and(|(_, on)| *on)
    }

    fn check_build(&self, _block: &BlockId) -> BuildCheck {
        BuildCheck::Blocked
    }

    fn built_from(&self, _projected: &BlockId) -> Option<BlockId> {
        None
    }

    fn first_component(&self, _block: &BlockId) -> Option<ItemId> {
        None
    }

    fn tool_stock(&self, _tool: &ToolId, _item: &ItemId) -> u32 {
        0
    }

    fn take_splits(&mut self) -> Vec<SplitEvent> {
        std::mem::take(&mut self.splits)
    }

    fn set_tool_enabled(&mut self, tool: &ToolId, enabled: bool) {
        if let Some(entry) = self.tools.get_mut(tool) {
            entry.1 = enabled;
        }
    }

    fn set_tool_power(&mut self, tool: &ToolId, current_kw: f32, max_kw: f32) {
        self.power.insert(tool.clone(), (current_kw, max_kw));
    }

    fn pull_items(&mut self, _sources: &[InventoryId], _item: &ItemId, _amount: u32) -> u32 {
        0
    }

    fn deposit_to_tool(&mut self, _tool: &ToolId, _item: &ItemId, amount: u32) -> u32 {
        amount
    }

    fn offload(&mut self, _tool: &ToolId, _sinks: &[InventoryId], _item: &ItemId, _amount: u32) {}

    fn materialize(&mut self, _projected: &BlockId, _tool: &ToolId) -> Option<BlockId> {
        None
    }

    fn grind(&mut self, block: &BlockId, amount: f32) -> ComponentCounts {
        if let Some(block) = self.blocks.get_mut(block) {
            block.integrity = (block.integrity - amount * block.integrity_per_sec).max(0.0);
        }
        ComponentCounts::new()
    }

    fn drain_block_inventory(&mut self, _block: &BlockId) -> ComponentCounts {
        ComponentCounts::new()
    }

    fn raze(&mut self, block: &BlockId) {
        self.blocks.remove(block);
    }

    fn stock_from_tool(&mut self, _tool: &ToolId, _block: &BlockId) {}

    fn weld(&mut self, block: &BlockId, amount: f32, _repair: f32) {
        if let Some(block) = self.blocks.get_mut(block) {
            block.integrity =
                (block.integrity + amount * block.integrity_per_sec).min(block.max_integrity);
        }
    }
}

impl Discovery for FakeWorld {
    fn validated_yards(&self) -> Vec<ShipyardRecord> {
        self.records.clone()
    }

    fn yard_valid(&self, yard: &YardId) -> bool {
        self.records.iter().any(|r| &r.id == yard) && !self.invalid.contains(yard)
    }
}

impl Connectivity for FakeWorld {
    fn reachable_inventories(&self, _tool: &ToolId) -> Vec<InventoryId> {
        vec![InventoryId("cargo".to_string())]
    }
}

// --- Shared helpers -----------------------------------------------------

fn yard_id(id: &str) -> YardId {
    YardId(id.to_string())
}

/// A 60m cube yard at the origin, registered through discovery, with one
/// idle tick behind it.
fn setup(blocks: usize) -> (ShipyardRegistry, FakeWorld) {
    let mut world = FakeWorld::default();
    world.add_yard(yard_record("yard", DVec3::ZERO, DVec3::splat(30.0)));
    world.add_structure("wreck", DVec3::ZERO, DVec3::splat(10.0), blocks);
    let mut registry = ShipyardRegistry::new(true);
    refresh_discovery(&mut registry, &mut world);
    tick(&mut registry, &mut world, &[]);
    (registry, world)
}

fn command(registry: &mut ShipyardRegistry, command: Command) -> Vec<CommandEnvelope> {
    vec![registry.next_command(command)]
}

fn start(registry: &mut ShipyardRegistry, world: &mut FakeWorld, mode: ShipyardMode) -> Vec<EventEnvelope> {
    let yard = yard_id("yard");
    let cmd = match mode {
        ShipyardMode::Welding => Command::StartWeld { yard },
        _ => Command::StartGrind { yard },
    };
    let commands = command(registry, cmd);
    tick(registry, world, &commands)
}

fn yard(registry: &ShipyardRegistry) -> &Shipyard {
    registry.get(&yard_id("yard")).expect("yard registered")
}

fn bounds_of(world: &FakeWorld, id: &str) -> OrientedBox {
    world.structures[&StructureId(id.to_string())].bounds
}
