//! Interfaces to the host environment.
//!
//! The engine never owns blocks, structures or inventories. It reads them
//! through [`World`] during the observation phase and mutates them through
//! the same trait during the execution phase. Discovery and the inventory
//! network are separate collaborators.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::geometry::OrientedBox;
use crate::{BlockId, ComponentCounts, InventoryId, ItemId, StructureId, ToolId, YardId, TOOL_COUNT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureInfo {
    pub id: StructureId,
    pub bounds: OrientedBox,
    pub closed: bool,
    /// False for a pure projection with no physical backing.
    pub physical: bool,
    /// Position of the projector when this structure is a projection.
    pub projector: Option<DVec3>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub id: BlockId,
    pub structure: StructureId,
    pub position: DVec3,
    pub integrity: f32,
    pub max_integrity: f32,
    pub integrity_per_sec: f32,
    pub deformed: bool,
    /// Placeholder from a projection that has not been materialized.
    pub projected: bool,
    pub stockpile: ComponentCounts,
    pub missing: ComponentCounts,
}

impl BlockInfo {
    pub fn fully_built(&self) -> bool {
        self.integrity >= self.max_integrity
    }

    pub fn dismantled(&self) -> bool {
        self.integrity <= 0.0
    }

    /// Seconds needed to build the block from nothing at base rate.
    pub fn build_time(&self) -> f32 {
        if self.integrity_per_sec > 0.0 {
            self.max_integrity / self.integrity_per_sec
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildCheck {
    Buildable,
    AlreadyBuilt,
    Blocked,
}

/// The host reports that blocks of `from` now form the new structure `into`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitEvent {
    pub from: StructureId,
    pub into: StructureId,
}

/// A shipyard frame validated by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipyardRecord {
    pub id: YardId,
    /// Structure the frame is built on. Never a work candidate.
    pub host: StructureId,
    pub bounds: OrientedBox,
    /// One per corner, in [`OrientedBox::corners`] order.
    pub tools: [ToolId; TOOL_COUNT],
    pub mobile: bool,
}

pub trait World {
    // --- reads -----------------------------------------------------------

    fn structure(&self, id: &StructureId) -> Option<StructureInfo>;
    /// Open structures whose center lies within `radius_sq` of `center`.
    fn structures_near(&self, center: DVec3, radius_sq: f64) -> Vec<StructureInfo>;
    fn blocks(&self, structure: &StructureId) -> Vec<BlockInfo>;
    fn block(&self, id: &BlockId) -> Option<BlockInfo>;
    fn tool_position(&self, tool: &ToolId) -> Option<DVec3>;
    fn tool_enabled(&self, tool: &ToolId) -> bool;
    fn check_build(&self, block: &BlockId) -> BuildCheck;
    /// Physical block that replaced a projected one.
    fn built_from(&self, projected: &BlockId) -> Option<BlockId>;
    /// First component needed to place the block, if any.
    fn first_component(&self, block: &BlockId) -> Option<ItemId>;
    /// How many of `item` the tool holds.
    fn tool_stock(&self, tool: &ToolId, item: &ItemId) -> u32;

    // --- mutations ---------------------------------------------------------

    fn take_splits(&mut self) -> Vec<SplitEvent>;
    fn set_tool_enabled(&mut self, tool: &ToolId, enabled: bool);
    fn set_tool_power(&mut self, tool: &ToolId, current_kw: f32, max_kw: f32);
    /// Remove up to `amount` of `item` from `sources`, in order. Returns the
    /// amount actually removed.
    fn pull_items(&mut self, sources: &[InventoryId], item: &ItemId, amount: u32) -> u32;
    /// Returns the amount that fit.
    fn deposit_to_tool(&mut self, tool: &ToolId, item: &ItemId, amount: u32) -> u32;
    /// Take items the tool had no room for: into the first of `sinks`, or
    /// floated next to the tool when there is none.
    fn offload(&mut self, tool: &ToolId, sinks: &[InventoryId], item: &ItemId, amount: u32);
    /// Replace a projected placeholder with a physical block; returns its id.
    fn materialize(&mut self, projected: &BlockId, tool: &ToolId) -> Option<BlockId>;
    /// Lower integrity by `amount` seconds of work; returns freed components.
    fn grind(&mut self, block: &BlockId, amount: f32) -> ComponentCounts;
    fn drain_block_inventory(&mut self, block: &BlockId) -> ComponentCounts;
    fn raze(&mut self, block: &BlockId);
    /// Move whatever the block is missing from the tool's inventory into the
    /// block's construction stockpile.
    fn stock_from_tool(&mut self, tool: &ToolId, block: &BlockId);
    /// Raise integrity by `amount` seconds of work and repair deformation by
    /// `repair` seconds.
    fn weld(&mut self, block: &BlockId, amount: f32, repair: f32);
}

/// Discovery collaborator: which yards exist and whether they are still valid.
pub trait Discovery {
    fn validated_yards(&self) -> Vec<ShipyardRecord>;
    fn yard_valid(&self, yard: &YardId) -> bool;
}

/// Inventory network collaborator.
pub trait Connectivity {
    /// Cargo inventories reachable from the tool, excluding other tools.
    fn reachable_inventories(&self, tool: &ToolId) -> Vec<InventoryId>;
}
