//! Type definitions for `yard_core`.
//!
//! IDs, modes, settings, commands, events and the status snapshot exposed to
//! observers.

use std::collections::BTreeMap;

use glam::DVec3;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Type aliases
// ---------------------------------------------------------------------------

/// Item counts keyed by item id. Ordered so iteration is deterministic.
pub type ComponentCounts = BTreeMap<ItemId, u32>;

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(YardId);
string_id!(StructureId);
string_id!(ToolId);
string_id!(BlockId);
string_id!(InventoryId);
string_id!(ItemId);
string_id!(CommandId);
string_id!(EventId);

/// Arena index of a target inside one yard's pool. Never reused within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId(pub u64);

// ---------------------------------------------------------------------------
// Engine constants
// ---------------------------------------------------------------------------

/// Every shipyard frame has exactly one tool per corner.
pub const TOOL_COUNT: usize = 8;
pub const MAX_BEAMS_PER_TOOL: u8 = 3;
/// Squared distance at which beam efficiency would reach zero.
pub const EFFICIENCY_FALLOFF_SQ: f64 = 200_000.0;
pub const MIN_EFFICIENCY: f64 = 0.1;
/// Draw of a tool with no beams, and of tools on an invalid yard.
pub const IDLE_POWER_KW: f32 = 5.0;
pub const BEAM_BASE_POWER_KW: f32 = 30.0;
pub const BEAM_DISTANCE_POWER_KW: f32 = 300.0;
/// Work applied per step before the mode multiplier, in seconds of block build rate.
pub const GRIND_STEP: f32 = 1.0;
pub const WELD_STEP: f32 = 1.0;
/// Deformation repair per weld step as a fraction of the weld amount.
pub const REPAIR_FRACTION: f32 = 0.1;
/// Components consumed to materialize a projected block.
pub const MATERIALIZE_COST: u32 = 2;

// ---------------------------------------------------------------------------
// Core enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipyardMode {
    Idle,
    Welding,
    Grinding,
    Scanning,
    Invalid,
}

impl ShipyardMode {
    pub fn is_working(self) -> bool {
        matches!(self, ShipyardMode::Welding | ShipyardMode::Grinding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPurpose {
    Grind,
    Weld,
}

/// Weld-mode proximity ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPattern {
    #[default]
    FromCorners,
    FromCenter,
    FromProjector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeamCategory {
    Active,
    Stalled,
    /// Previously stalled target that is supplied again.
    Redraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Containment {
    Contained,
    Intersecting,
    Outside,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct YardSettings {
    pub beam_count: u8,
    pub weld_multiplier: f32,
    pub grind_multiplier: f32,
    pub guide_enabled: bool,
    pub advanced_locking: bool,
    pub fill_inventory: bool,
    pub build_pattern: BuildPattern,
}

impl Default for YardSettings {
    fn default() -> Self {
        Self {
            beam_count: MAX_BEAMS_PER_TOOL,
            weld_multiplier: 0.1,
            grind_multiplier: 0.1,
            guide_enabled: true,
            advanced_locking: false,
            fill_inventory: true,
            build_pattern: BuildPattern::default(),
        }
    }
}

impl YardSettings {
    pub const MIN_MULTIPLIER: f32 = 0.01;
    pub const MAX_MULTIPLIER: f32 = 2.0;

    /// Clamp every field into its accepted range. NaN multipliers fall back
    /// to the defaults.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.beam_count = self.beam_count.clamp(1, MAX_BEAMS_PER_TOOL);
        self.weld_multiplier = clamp_multiplier(self.weld_multiplier, defaults.weld_multiplier);
        self.grind_multiplier = clamp_multiplier(self.grind_multiplier, defaults.grind_multiplier);
        self
    }

    pub fn multiplier(&self, mode: ShipyardMode) -> f32 {
        match mode {
            ShipyardMode::Welding => self.weld_multiplier,
            ShipyardMode::Grinding => self.grind_multiplier,
            _ => self.weld_multiplier.max(self.grind_multiplier),
        }
    }
}

fn clamp_multiplier(value: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        return fallback;
    }
    value.clamp(YardSettings::MIN_MULTIPLIER, YardSettings::MAX_MULTIPLIER)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub id: CommandId,
    pub issued_tick: u64,
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    StartWeld { yard: YardId },
    StartGrind { yard: YardId },
    Scan { yard: YardId, purpose: ScanPurpose },
    Stop { yard: YardId },
    UpdateSettings { yard: YardId, settings: YardSettings },
}

impl Command {
    pub fn yard(&self) -> &YardId {
        match self {
            Command::StartWeld { yard }
            | Command::StartGrind { yard }
            | Command::Scan { yard, .. }
            | Command::Stop { yard }
            | Command::UpdateSettings { yard, .. } => yard,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub next_event_id: u64,
    pub next_command_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub tick: u64,
    pub event: Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub purpose: ScanPurpose,
    pub structures: usize,
    pub blocks: usize,
    pub estimated_secs: f32,
    /// Expected gain when grinding, required components when welding.
    pub components: ComponentCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    YardRegistered {
        yard: YardId,
    },
    YardInvalidated {
        yard: YardId,
    },
    ModeChanged {
        yard: YardId,
        from: ShipyardMode,
        to: ShipyardMode,
    },
    SettingsApplied {
        yard: YardId,
        settings: YardSettings,
    },
    CommandRejected {
        yard: YardId,
        reason: String,
    },
    ContainmentChanged {
        yard: YardId,
        structure: StructureId,
        containment: Containment,
    },
    StructureReleased {
        yard: YardId,
        structure: StructureId,
        purged_targets: usize,
    },
    StructureAdopted {
        yard: YardId,
        from: StructureId,
        structure: StructureId,
    },
    TargetsBuilt {
        yard: YardId,
        count: usize,
    },
    BeamBegin {
        yard: YardId,
        tool_index: u8,
        slot: u8,
        block: BlockId,
        position: DVec3,
        category: BeamCategory,
    },
    BeamClear {
        yard: YardId,
        tool_index: u8,
        slot: u8,
    },
    TargetCompleted {
        yard: YardId,
        block: BlockId,
        mode: ShipyardMode,
    },
    TargetLost {
        yard: YardId,
        block: BlockId,
    },
    TargetStalled {
        yard: YardId,
        block: BlockId,
    },
    TargetResumed {
        yard: YardId,
        block: BlockId,
    },
    ToolPower {
        yard: YardId,
        tool: ToolId,
        current_kw: f32,
        max_kw: f32,
    },
    /// Items a full tool could not take were handed back to the host.
    ToolOverflow {
        yard: YardId,
        tool: ToolId,
        item: ItemId,
        count: u32,
    },
    ScanCompleted {
        yard: YardId,
        report: ScanReport,
    },
}

impl Event {
    pub fn yard(&self) -> &YardId {
        match self {
            Event::YardRegistered { yard }
            | Event::YardInvalidated { yard }
            | Event::ModeChanged { yard, .. }
            | Event::SettingsApplied { yard, .. }
            | Event::CommandRejected { yard, .. }
            | Event::ContainmentChanged { yard, .. }
            | Event::StructureReleased { yard, .. }
            | Event::StructureAdopted { yard, .. }
            | Event::TargetsBuilt { yard, .. }
            | Event::BeamBegin { yard, .. }
            | Event::BeamClear { yard, .. }
            | Event::TargetCompleted { yard, .. }
            | Event::TargetLost { yard, .. }
            | Event::TargetStalled { yard, .. }
            | Event::TargetResumed { yard, .. }
            | Event::ToolPower { yard, .. }
            | Event::ToolOverflow { yard, .. }
            | Event::ScanCompleted { yard, .. } => yard,
        }
    }
}

// ---------------------------------------------------------------------------
// Status snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamStatus {
    pub tool: ToolId,
    pub tool_index: u8,
    pub slot: u8,
    pub block: BlockId,
    pub stalled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YardStatus {
    pub id: YardId,
    pub mode: ShipyardMode,
    pub mobile: bool,
    pub settings: YardSettings,
    pub tool_power_kw: Vec<f32>,
    pub max_power_kw: f32,
    pub beams: Vec<BeamStatus>,
    pub stalled: Vec<BlockId>,
    pub missing_components: ComponentCounts,
    pub contained: Vec<StructureId>,
    pub intersecting: Vec<StructureId>,
    pub work_set: Vec<StructureId>,
    pub pending_targets: usize,
    pub last_scan: Option<ScanReport>,
}
