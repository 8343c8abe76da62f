use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use yard_core::{
    BlockId, Command, ComponentCounts, InventoryId, ItemId, StructureId, ToolId, YardId,
    YardSettings,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub block_defs: BTreeMap<String, BlockDef>,
    pub yards: Vec<YardDef>,
    #[serde(default)]
    pub structures: Vec<StructureDef>,
    #[serde(default)]
    pub inventories: Vec<InventoryDef>,
    #[serde(default)]
    pub script: Vec<ScriptEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStack {
    pub item: ItemId,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDef {
    pub max_integrity: f32,
    pub integrity_per_sec: f32,
    /// Mount order. The first entry is what a projection needs to be placed.
    pub components: Vec<ComponentStack>,
}

impl BlockDef {
    pub fn component_total(&self) -> u32 {
        self.components.iter().map(|c| c.count).sum()
    }

    pub fn recipe(&self) -> ComponentCounts {
        let mut counts = ComponentCounts::new();
        for stack in &self.components {
            *counts.entry(stack.item.clone()).or_insert(0) += stack.count;
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YardDef {
    pub id: YardId,
    pub host: StructureId,
    pub center: DVec3,
    pub half_extents: DVec3,
    #[serde(default)]
    pub rotation: Option<DQuat>,
    #[serde(default)]
    pub mobile: bool,
    /// Inventory network the tools are connected to.
    #[serde(default)]
    pub network: u32,
    #[serde(default = "default_tool_capacity")]
    pub tool_capacity: u32,
    #[serde(default)]
    pub settings: Option<YardSettings>,
}

fn default_tool_capacity() -> u32 {
    400
}

fn default_true() -> bool {
    true
}

fn default_built() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureDef {
    pub id: StructureId,
    pub center: DVec3,
    pub half_extents: DVec3,
    #[serde(default)]
    pub rotation: Option<DQuat>,
    /// Drift per tick.
    #[serde(default)]
    pub velocity: DVec3,
    #[serde(default = "default_true")]
    pub physical: bool,
    #[serde(default)]
    pub projector: Option<DVec3>,
    /// Physical structure that projected blocks are built into.
    #[serde(default)]
    pub projection_of: Option<StructureId>,
    #[serde(default)]
    pub blocks: Vec<BlockPlacement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockPlacement {
    pub id: BlockId,
    pub def: String,
    /// Position relative to the structure center, in structure space.
    pub offset: DVec3,
    /// Fraction of components mounted and of integrity, 0..=1.
    #[serde(default = "default_built")]
    pub built: f32,
    #[serde(default)]
    pub deformation: f32,
    #[serde(default)]
    pub inventory: ComponentCounts,
    #[serde(default)]
    pub blocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryDef {
    pub id: InventoryId,
    pub network: u32,
    #[serde(default)]
    pub items: ComponentCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub at_tick: u64,
    pub action: ScriptAction,
}

/// A scripted change to the host or an operator command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptAction {
    Command {
        command: Command,
    },
    Move {
        structure: StructureId,
        velocity: DVec3,
    },
    Split {
        structure: StructureId,
        into: StructureId,
        blocks: Vec<BlockId>,
    },
    Destroy {
        structure: StructureId,
    },
    AddCargo {
        inventory: InventoryId,
        item: ItemId,
        count: u32,
    },
    RemoveCargo {
        inventory: InventoryId,
        item: ItemId,
        count: u32,
    },
    DisableTool {
        tool: ToolId,
    },
    BreakFrame {
        yard: YardId,
    },
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&text)
        .with_context(|| format!("parsing scenario {}", path.display()))?;
    validate_scenario(&scenario)?;
    Ok(scenario)
}

/// Check cross-references so a bad scenario fails at load, not mid-run.
pub fn validate_scenario(scenario: &Scenario) -> Result<()> {
    let mut structure_ids: BTreeSet<&StructureId> = BTreeSet::new();
    for structure in &scenario.structures {
        if !structure_ids.insert(&structure.id) {
            bail!("duplicate structure id '{}'", structure.id);
        }
    }

    let mut block_ids = BTreeSet::new();
    for structure in &scenario.structures {
        if let Some(target) = &structure.projection_of {
            if !structure_ids.contains(target) {
                bail!("structure '{}' projects into unknown '{}'", structure.id, target);
            }
        }
        for block in &structure.blocks {
            let Some(def) = scenario.block_defs.get(&block.def) else {
                bail!("block '{}' uses unknown def '{}'", block.id, block.def);
            };
            if def.components.is_empty() || def.max_integrity <= 0.0 {
                bail!("block def '{}' has no components or integrity", block.def);
            }
            if !(0.0..=1.0).contains(&block.built) {
                bail!("block '{}' built fraction {} outside 0..=1", block.id, block.built);
            }
            if !block_ids.insert(&block.id) {
                bail!("duplicate block id '{}'", block.id);
            }
        }
    }

    let mut yard_ids = BTreeSet::new();
    for yard in &scenario.yards {
        if !yard_ids.insert(&yard.id) {
            bail!("duplicate yard id '{}'", yard.id);
        }
        if yard.half_extents.min_element() <= 0.0 {
            bail!("yard '{}' has a degenerate volume", yard.id);
        }
    }

    let inventory_ids: BTreeSet<&InventoryId> = scenario.inventories.iter().map(|i| &i.id).collect();
    for entry in &scenario.script {
        match &entry.action {
            ScriptAction::Move { structure, .. }
            | ScriptAction::Destroy { structure }
            | ScriptAction::Split { structure, .. } => {
                if !structure_ids.contains(structure) {
                    bail!("script at tick {} names unknown structure '{structure}'", entry.at_tick);
                }
            }
            ScriptAction::AddCargo { inventory, .. }
            | ScriptAction::RemoveCargo { inventory, .. } => {
                if !inventory_ids.contains(inventory) {
                    bail!("script at tick {} names unknown inventory '{inventory}'", entry.at_tick);
                }
            }
            ScriptAction::Command { command } => {
                if !yard_ids.contains(command.yard()) {
                    bail!("script at tick {} commands unknown yard '{}'", entry.at_tick, command.yard());
                }
            }
            ScriptAction::BreakFrame { yard } => {
                if !yard_ids.contains(yard) {
                    bail!("script at tick {} names unknown yard '{yard}'", entry.at_tick);
                }
            }
            ScriptAction::DisableTool { .. } => {}
        }
    }
    Ok(())
}
