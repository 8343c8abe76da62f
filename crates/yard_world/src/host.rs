//! In-memory host: structures, blocks, tools and cargo that the engine
//! drives through the `yard_core` world traits.

use std::collections::{BTreeMap, BTreeSet};

use glam::{DQuat, DVec3};
use yard_core::geometry::OrientedBox;
use yard_core::world::{
    BlockInfo, BuildCheck, Connectivity, Discovery, ShipyardRecord, SplitEvent, StructureInfo,
    World,
};
use yard_core::{
    BlockId, ComponentCounts, InventoryId, ItemId, StructureId, ToolId, YardId, TOOL_COUNT,
};

use crate::scenario::BlockDef;

#[derive(Debug, Clone)]
pub struct HostStructure {
    pub id: StructureId,
    pub center: DVec3,
    pub half_extents: DVec3,
    pub rotation: DQuat,
    pub velocity: DVec3,
    pub physical: bool,
    pub projector: Option<DVec3>,
    pub projection_of: Option<StructureId>,
    pub closed: bool,
    pub blocks: BTreeSet<BlockId>,
}

impl HostStructure {
    fn bounds(&self) -> OrientedBox {
        OrientedBox::new(self.center, self.half_extents, self.rotation)
    }

    fn world_point(&self, offset: DVec3) -> DVec3 {
        self.center + self.rotation * offset
    }

    fn local_point(&self, point: DVec3) -> DVec3 {
        self.rotation.inverse() * (point - self.center)
    }
}

#[derive(Debug, Clone)]
pub struct HostBlock {
    pub id: BlockId,
    pub structure: StructureId,
    pub def: String,
    pub offset: DVec3,
    pub integrity: f32,
    /// Mounted count per entry of the def's component list.
    pub mounted: Vec<u32>,
    /// Seconds of welding needed to undo deformation.
    pub deformation: f32,
    pub inventory: ComponentCounts,
    pub projected: bool,
    pub blocked: bool,
}

#[derive(Debug, Clone)]
pub struct HostTool {
    pub id: ToolId,
    pub yard: YardId,
    /// Offset from the host structure center.
    pub offset: DVec3,
    pub network: u32,
    pub enabled: bool,
    pub inventory: ComponentCounts,
    pub capacity: u32,
    pub current_kw: f32,
    pub max_kw: f32,
}

impl HostTool {
    fn stored(&self) -> u32 {
        self.inventory.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct HostYard {
    pub id: YardId,
    pub host: StructureId,
    /// Yard center relative to the host structure center.
    pub offset: DVec3,
    pub half_extents: DVec3,
    pub rotation: DQuat,
    pub mobile: bool,
    pub frame_broken: bool,
    pub tools: [ToolId; TOOL_COUNT],
}

#[derive(Debug, Clone)]
pub struct HostInventory {
    pub network: u32,
    pub items: ComponentCounts,
}

/// Plain-data host world. Deterministic: every collection is ordered.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorld {
    pub block_defs: BTreeMap<String, BlockDef>,
    pub structures: BTreeMap<StructureId, HostStructure>,
    pub blocks: BTreeMap<BlockId, HostBlock>,
    pub tools: BTreeMap<ToolId, HostTool>,
    pub yards: BTreeMap<YardId, HostYard>,
    pub inventories: BTreeMap<InventoryId, HostInventory>,
    /// Items set adrift next to a tool that had no room and no cargo.
    pub floating: ComponentCounts,
    built_from: BTreeMap<BlockId, BlockId>,
    splits: Vec<SplitEvent>,
}

fn add_item(counts: &mut ComponentCounts, item: &ItemId, amount: u32) {
    if amount > 0 {
        *counts.entry(item.clone()).or_insert(0) += amount;
    }
}

/// Remove up to `amount` and drop the entry when it reaches zero.
fn take_item(counts: &mut ComponentCounts, item: &ItemId, amount: u32) -> u32 {
    let Some(held) = counts.get_mut(item) else {
        return 0;
    };
    let taken = (*held).min(amount);
    *held -= taken;
    if *held == 0 {
        counts.remove(item);
    }
    taken
}

impl MemoryWorld {
    pub fn new(block_defs: BTreeMap<String, BlockDef>) -> Self {
        Self {
            block_defs,
            ..Self::default()
        }
    }

    // --- construction --------------------------------------------------------

    pub fn insert_structure(&mut self, structure: HostStructure) {
        self.structures.insert(structure.id.clone(), structure);
    }

    /// Add a block to an existing structure. Unknown structures are ignored.
    pub fn insert_block(&mut self, block: HostBlock) {
        let Some(structure) = self.structures.get_mut(&block.structure) else {
            return;
        };
        structure.blocks.insert(block.id.clone());
        self.blocks.insert(block.id.clone(), block);
    }

    pub fn insert_inventory(&mut self, id: InventoryId, inventory: HostInventory) {
        self.inventories.insert(id, inventory);
    }

    /// Register a yard frame and its eight corner tools.
    pub fn insert_yard(&mut self, yard: HostYard, network: u32, tool_capacity: u32) {
        let local = OrientedBox::new(yard.offset, yard.half_extents, yard.rotation);
        for (index, corner) in local.corners().into_iter().enumerate() {
            let id = yard.tools[index].clone();
            self.tools.insert(
                id.clone(),
                HostTool {
                    id,
                    yard: yard.id.clone(),
                    offset: corner,
                    network,
                    enabled: false,
                    inventory: ComponentCounts::new(),
                    capacity: tool_capacity,
                    current_kw: 0.0,
                    max_kw: 0.0,
                },
            );
        }
        self.yards.insert(yard.id.clone(), yard);
    }

    // --- time ------------------------------------------------------------------

    /// Drift every open structure by its velocity.
    pub fn advance(&mut self) {
        for structure in self.structures.values_mut() {
            if !structure.closed {
                structure.center += structure.velocity;
            }
        }
    }

    // --- scripted changes ------------------------------------------------------

    pub fn set_velocity(&mut self, structure: &StructureId, velocity: DVec3) {
        if let Some(structure) = self.structures.get_mut(structure) {
            structure.velocity = velocity;
        }
    }

    /// Move `blocks` of `from` into a new structure `into` and report the split.
    pub fn split(&mut self, from: &StructureId, into: &StructureId, blocks: &[BlockId]) -> bool {
        let Some(parent) = self.structures.get_mut(from) else {
            return false;
        };
        if parent.closed {
            return false;
        }
        let mut moved = BTreeSet::new();
        for block in blocks {
            if parent.blocks.remove(block) {
                moved.insert(block.clone());
            }
        }
        if moved.is_empty() {
            return false;
        }
        let child = HostStructure {
            id: into.clone(),
            blocks: moved.clone(),
            ..parent.clone()
        };
        if parent.blocks.is_empty() && parent.physical {
            parent.closed = true;
        }
        for block in &moved {
            if let Some(block) = self.blocks.get_mut(block) {
                block.structure = into.clone();
            }
        }
        self.structures.insert(into.clone(), child);
        self.splits.push(SplitEvent {
            from: from.clone(),
            into: into.clone(),
        });
        true
    }

    /// Close a structure and remove its blocks.
    pub fn destroy(&mut self, structure: &StructureId) {
        let Some(structure) = self.structures.get_mut(structure) else {
            return;
        };
        structure.closed = true;
        for block in std::mem::take(&mut structure.blocks) {
            self.blocks.remove(&block);
        }
    }

    pub fn add_cargo(&mut self, inventory: &InventoryId, item: &ItemId, count: u32) {
        if let Some(inventory) = self.inventories.get_mut(inventory) {
            add_item(&mut inventory.items, item, count);
        }
    }

    pub fn break_frame(&mut self, yard: &YardId) {
        if let Some(yard) = self.yards.get_mut(yard) {
            yard.frame_broken = true;
        }
    }

    // --- inspection --------------------------------------------------------------

    pub fn tool_inventory(&self, tool: &ToolId) -> ComponentCounts {
        self.tools
            .get(tool)
            .map(|t| t.inventory.clone())
            .unwrap_or_default()
    }

    pub fn tool_power(&self, tool: &ToolId) -> Option<(f32, f32)> {
        self.tools.get(tool).map(|t| (t.current_kw, t.max_kw))
    }

    pub fn cargo_count(&self, inventory: &InventoryId, item: &ItemId) -> u32 {
        self.inventories
            .get(inventory)
            .and_then(|i| i.items.get(item).copied())
            .unwrap_or(0)
    }

    pub fn structure_closed(&self, structure: &StructureId) -> bool {
        self.structures.get(structure).map_or(true, |s| s.closed)
    }

    pub fn yard_record(&self, yard: &YardId) -> Option<ShipyardRecord> {
        let yard = self.yards.get(yard)?;
        let host = self.structures.get(&yard.host)?;
        Some(ShipyardRecord {
            id: yard.id.clone(),
            host: yard.host.clone(),
            bounds: OrientedBox::new(
                host.world_point(yard.offset),
                yard.half_extents,
                host.rotation * yard.rotation,
            ),
            tools: yard.tools.clone(),
            mobile: yard.mobile,
        })
    }

    // --- block model -------------------------------------------------------------

    fn def(&self, block: &HostBlock) -> Option<&BlockDef> {
        self.block_defs.get(&block.def)
    }

    /// Integrity allowed by the components currently mounted.
    #[allow(clippy::cast_precision_loss)]
    fn integrity_cap(def: &BlockDef, block: &HostBlock) -> f32 {
        let total = def.component_total();
        if total == 0 {
            return def.max_integrity;
        }
        let mounted: u32 = block.mounted.iter().sum();
        def.max_integrity * mounted as f32 / total as f32
    }

    fn missing(def: &BlockDef, block: &HostBlock) -> ComponentCounts {
        let mut missing = ComponentCounts::new();
        for (stack, mounted) in def.components.iter().zip(&block.mounted) {
            add_item(&mut missing, &stack.item, stack.count.saturating_sub(*mounted));
        }
        missing
    }

    fn block_info(&self, block: &HostBlock) -> Option<BlockInfo> {
        let def = self.def(block)?;
        let structure = self.structures.get(&block.structure)?;
        let mut stockpile = block.inventory.clone();
        for (stack, mounted) in def.components.iter().zip(&block.mounted) {
            add_item(&mut stockpile, &stack.item, *mounted);
        }
        Some(BlockInfo {
            id: block.id.clone(),
            structure: block.structure.clone(),
            position: structure.world_point(block.offset),
            integrity: block.integrity,
            max_integrity: def.max_integrity,
            integrity_per_sec: def.integrity_per_sec,
            deformed: block.deformation > 0.0,
            projected: block.projected,
            stockpile,
            missing: Self::missing(def, block),
        })
    }

    fn structure_info(structure: &HostStructure) -> StructureInfo {
        StructureInfo {
            id: structure.id.clone(),
            bounds: structure.bounds(),
            closed: structure.closed,
            physical: structure.physical,
            projector: structure.projector.map(|p| structure.world_point(p)),
        }
    }

    fn tool_host(&self, tool: &HostTool) -> Option<&HostStructure> {
        let yard = self.yards.get(&tool.yard)?;
        self.structures.get(&yard.host).filter(|s| !s.closed)
    }

    fn deposit(&mut self, tool: &ToolId, item: &ItemId, amount: u32) -> u32 {
        let Some(tool) = self.tools.get_mut(tool) else {
            return 0;
        };
        let fits = amount.min(tool.capacity.saturating_sub(tool.stored()));
        add_item(&mut tool.inventory, item, fits);
        fits
    }
}

impl World for MemoryWorld {
    fn structure(&self, id: &StructureId) -> Option<StructureInfo> {
        self.structures.get(id).map(Self::structure_info)
    }

    fn structures_near(&self, center: DVec3, radius_sq: f64) -> Vec<StructureInfo> {
        self.structures
            .values()
            .filter(|s| !s.closed && s.center.distance_squared(center) <= radius_sq)
            .map(Self::structure_info)
            .collect()
    }

    fn blocks(&self, structure: &StructureId) -> Vec<BlockInfo> {
        let Some(structure) = self.structures.get(structure) else {
            return Vec::new();
        };
        if structure.closed {
            return Vec::new();
        }
        structure
            .blocks
            .iter()
            .filter_map(|id| self.blocks.get(id))
            .filter_map(|block| self.block_info(block))
            .collect()
    }

    fn block(&self, id: &BlockId) -> Option<BlockInfo> {
        self.blocks.get(id).and_then(|block| self.block_info(block))
    }

    fn tool_position(&self, tool: &ToolId) -> Option<DVec3> {
        let tool = self.tools.get(tool)?;
        let host = self.tool_host(tool)?;
        Some(host.world_point(tool.offset))
    }

    fn tool_enabled(&self, tool: &ToolId) -> bool {
        self.tools.get(tool).is_some_and(|t| t.enabled)
    }

    fn check_build(&self, block: &BlockId) -> BuildCheck {
        if self.built_from.contains_key(block) {
            return BuildCheck::AlreadyBuilt;
        }
        match self.blocks.get(block) {
            Some(b) if b.projected && !b.blocked => BuildCheck::Buildable,
            _ => BuildCheck::Blocked,
        }
    }

    fn built_from(&self, projected: &BlockId) -> Option<BlockId> {
        self.built_from
            .get(projected)
            .filter(|built| self.blocks.contains_key(*built))
            .cloned()
    }

    fn tool_stock(&self, tool: &ToolId, item: &ItemId) -> u32 {
        self.tools
            .get(tool)
            .and_then(|t| t.inventory.get(item).copied())
            .unwrap_or(0)
    }

    fn first_component(&self, block: &BlockId) -> Option<ItemId> {
        let block = self.blocks.get(block)?;
        self.def(block)?.components.first().map(|c| c.item.clone())
    }

    fn take_splits(&mut self) -> Vec<SplitEvent> {
        std::mem::take(&mut self.splits)
    }

    fn set_tool_enabled(&mut self, tool: &ToolId, enabled: bool) {
        if let Some(tool) = self.tools.get_mut(tool) {
            tool.enabled = enabled;
        }
    }

    fn set_tool_power(&mut self, tool: &ToolId, current_kw: f32, max_kw: f32) {
        if let Some(tool) = self.tools.get_mut(tool) {
            tool.current_kw = current_kw;
            tool.max_kw = max_kw;
        }
    }

    fn pull_items(&mut self, sources: &[InventoryId], item: &ItemId, amount: u32) -> u32 {
        let mut pulled = 0;
        for source in sources {
            if pulled == amount {
                break;
            }
            if let Some(inventory) = self.inventories.get_mut(source) {
                pulled += take_item(&mut inventory.items, item, amount - pulled);
            }
        }
        pulled
    }

    fn deposit_to_tool(&mut self, tool: &ToolId, item: &ItemId, amount: u32) -> u32 {
        self.deposit(tool, item, amount)
    }

    fn offload(&mut self, _tool: &ToolId, sinks: &[InventoryId], item: &ItemId, amount: u32) {
        let sink = sinks.iter().find(|id| self.inventories.contains_key(*id));
        match sink.and_then(|id| self.inventories.get_mut(id)) {
            Some(inventory) => add_item(&mut inventory.items, item, amount),
            None => add_item(&mut self.floating, item, amount),
        }
    }

    /// Places the block with its first component mounted in the structure the
    /// projection belongs to. The second unit of the placement cost stays in
    /// the tool, or floats free when the tool is full.
    fn materialize(&mut self, projected: &BlockId, tool: &ToolId) -> Option<BlockId> {
        let placeholder = self.blocks.get(projected)?;
        if !placeholder.projected || placeholder.blocked {
            return None;
        }
        let projection = self.structures.get(&placeholder.structure)?;
        let target = self
            .structures
            .get(projection.projection_of.as_ref()?)
            .filter(|s| !s.closed)?;
        let def = self.def(placeholder)?;
        let first = def.components.first()?.item.clone();

        let mut mounted = vec![0; def.components.len()];
        mounted[0] = 1;
        let id = BlockId(format!("{projected}_built"));
        let mut block = HostBlock {
            id: id.clone(),
            structure: target.id.clone(),
            def: placeholder.def.clone(),
            offset: target.local_point(projection.world_point(placeholder.offset)),
            integrity: 0.0,
            mounted,
            deformation: 0.0,
            inventory: ComponentCounts::new(),
            projected: false,
            blocked: false,
        };
        block.integrity = Self::integrity_cap(def, &block);

        let projection_id = placeholder.structure.clone();
        if let Some(projection) = self.structures.get_mut(&projection_id) {
            projection.blocks.remove(projected);
        }
        self.blocks.remove(projected);
        self.insert_block(block);
        self.built_from.insert(projected.clone(), id.clone());
        if self.deposit(tool, &first, 1) == 0 {
            add_item(&mut self.floating, &first, 1);
        }
        Some(id)
    }

    /// Components come off in reverse mount order once integrity no longer
    /// supports them.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn grind(&mut self, block: &BlockId, amount: f32) -> ComponentCounts {
        let mut freed = ComponentCounts::new();
        let Some(host) = self.blocks.get(block) else {
            return freed;
        };
        let Some(def) = self.block_defs.get(&host.def).cloned() else {
            return freed;
        };
        let Some(host) = self.blocks.get_mut(block) else {
            return freed;
        };
        host.integrity = (host.integrity - amount * def.integrity_per_sec).max(0.0);
        let total = def.component_total();
        let supported =
            (f64::from(total) * f64::from(host.integrity) / f64::from(def.max_integrity)).ceil();
        let mut excess = host
            .mounted
            .iter()
            .sum::<u32>()
            .saturating_sub(supported.max(0.0) as u32);
        for (stack, mounted) in def.components.iter().zip(host.mounted.iter_mut()).rev() {
            if excess == 0 {
                break;
            }
            let removed = (*mounted).min(excess);
            *mounted -= removed;
            excess -= removed;
            add_item(&mut freed, &stack.item, removed);
        }
        freed
    }

    fn drain_block_inventory(&mut self, block: &BlockId) -> ComponentCounts {
        self.blocks
            .get_mut(block)
            .map(|b| std::mem::take(&mut b.inventory))
            .unwrap_or_default()
    }

    /// Remove the block. A physical structure left without blocks closes.
    fn raze(&mut self, block: &BlockId) {
        let Some(removed) = self.blocks.remove(block) else {
            return;
        };
        if let Some(structure) = self.structures.get_mut(&removed.structure) {
            structure.blocks.remove(block);
            if structure.blocks.is_empty() && structure.physical {
                structure.closed = true;
            }
        }
    }

    fn stock_from_tool(&mut self, tool: &ToolId, block: &BlockId) {
        let Some(host) = self.blocks.get(block) else {
            return;
        };
        let Some(def) = self.block_defs.get(&host.def).cloned() else {
            return;
        };
        let (Some(tool), Some(host)) = (self.tools.get_mut(tool), self.blocks.get_mut(block))
        else {
            return;
        };
        for (stack, mounted) in def.components.iter().zip(host.mounted.iter_mut()) {
            let wanted = stack.count.saturating_sub(*mounted);
            if wanted == 0 {
                continue;
            }
            let moved = take_item(&mut tool.inventory, &stack.item, wanted);
            *mounted += moved;
            if moved < wanted {
                // Components mount in order; a gap stops the rest.
                break;
            }
        }
    }

    fn weld(&mut self, block: &BlockId, amount: f32, repair: f32) {
        let Some(host) = self.blocks.get(block) else {
            return;
        };
        let Some(def) = self.block_defs.get(&host.def) else {
            return;
        };
        let cap = Self::integrity_cap(def, host);
        let per_sec = def.integrity_per_sec;
        let Some(host) = self.blocks.get_mut(block) else {
            return;
        };
        host.deformation = (host.deformation - repair).max(0.0);
        if host.integrity < cap {
            host.integrity = (host.integrity + amount * per_sec).min(cap);
        }
    }
}

impl Discovery for MemoryWorld {
    fn validated_yards(&self) -> Vec<ShipyardRecord> {
        self.yards
            .keys()
            .filter(|id| self.yard_valid(id))
            .filter_map(|id| self.yard_record(id))
            .collect()
    }

    /// A frame is valid while it is intact, its host is open and all eight
    /// tools exist on one inventory network.
    fn yard_valid(&self, yard: &YardId) -> bool {
        let Some(yard) = self.yards.get(yard) else {
            return false;
        };
        if yard.frame_broken || self.structure_closed(&yard.host) {
            return false;
        }
        let networks: BTreeSet<u32> = yard
            .tools
            .iter()
            .filter_map(|t| self.tools.get(t))
            .map(|t| t.network)
            .collect();
        networks.len() == 1
            && yard.tools.iter().all(|t| self.tools.contains_key(t))
    }
}

impl Connectivity for MemoryWorld {
    fn reachable_inventories(&self, tool: &ToolId) -> Vec<InventoryId> {
        let Some(tool) = self.tools.get(tool) else {
            return Vec::new();
        };
        self.inventories
            .iter()
            .filter(|(_, inventory)| inventory.network == tool.network)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
