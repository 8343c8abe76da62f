use std::collections::BTreeSet;

use glam::DVec3;

use crate::beams::BeamSlots;
use crate::geometry::OrientedBox;
use crate::power::PowerState;
use crate::staged::StagedSet;
use crate::targets::TargetPool;
use crate::world::ShipyardRecord;
use crate::{
    BeamStatus, BlockId, ComponentCounts, InventoryId, ScanPurpose, ScanReport, ShipyardMode,
    StructureId, TargetId, YardId, YardSettings, YardStatus, TOOL_COUNT,
};

/// Runtime state of one shipyard.
#[derive(Debug, Clone)]
pub struct Shipyard {
    pub record: ShipyardRecord,
    /// Current volume. Follows the tools when the frame moves.
    pub bounds: OrientedBox,
    pub tool_positions: [DVec3; TOOL_COUNT],
    pub mode: ShipyardMode,
    pub settings: YardSettings,
    pub beams: BeamSlots,
    pub pool: TargetPool,
    pub contained: StagedSet<StructureId>,
    pub intersecting: StagedSet<StructureId>,
    /// Structures of the current session. Snapshot of `contained` at start.
    pub work_set: StagedSet<StructureId>,
    pub cargo: Vec<InventoryId>,
    pub stalled: BTreeSet<TargetId>,
    pub missing: ComponentCounts,
    pub power: PowerState,
    pub last_scan: Option<ScanReport>,
    pub(crate) pending_cargo: Option<Vec<InventoryId>>,
    /// `Some(broadcast)` while a disable waits for the next apply point.
    pub(crate) pending_disable: Option<bool>,
    pub(crate) pending_tool_enable: bool,
    pub(crate) scan_purpose: Option<ScanPurpose>,
    /// Split parents whose targets must be re-parented on the next observation.
    pub(crate) split_parents: BTreeSet<StructureId>,
}

impl Shipyard {
    pub fn new(record: ShipyardRecord, settings: YardSettings) -> Self {
        let settings = settings.sanitized();
        Self {
            bounds: record.bounds,
            tool_positions: record.bounds.corners(),
            record,
            mode: ShipyardMode::Idle,
            beams: BeamSlots::new(settings.beam_count),
            settings,
            pool: TargetPool::default(),
            contained: StagedSet::default(),
            intersecting: StagedSet::default(),
            work_set: StagedSet::default(),
            cargo: Vec::new(),
            stalled: BTreeSet::new(),
            missing: ComponentCounts::new(),
            power: PowerState::default(),
            last_scan: None,
            pending_cargo: None,
            pending_disable: None,
            pending_tool_enable: false,
            scan_purpose: None,
            split_parents: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &YardId {
        &self.record.id
    }

    pub fn disable_pending(&self) -> bool {
        self.pending_disable.is_some()
    }

    /// Replace the connected cargo set at the next commit point.
    pub fn stage_cargo(&mut self, inventories: Vec<InventoryId>) {
        self.pending_cargo = Some(inventories);
    }

    pub(crate) fn commit_cargo(&mut self) {
        if let Some(cargo) = self.pending_cargo.take() {
            self.cargo = cargo;
        }
    }

    /// Point a target at the structure that now owns its block. Returns true
    /// when that structure was newly staged into the work set.
    pub(crate) fn reparent_target(&mut self, id: TargetId, owner: &StructureId) -> bool {
        let Some(target) = self.pool.get_mut(id) else {
            return false;
        };
        if &target.structure == owner {
            return false;
        }
        target.structure = owner.clone();
        if self.work_set.contains(owner) {
            return false;
        }
        self.work_set.stage_add(owner.clone());
        true
    }

    pub fn stalled_blocks(&self) -> Vec<BlockId> {
        let mut blocks: Vec<BlockId> = self
            .stalled
            .iter()
            .filter_map(|id| self.pool.get(*id))
            .map(|t| t.block.clone())
            .collect();
        blocks.sort();
        blocks
    }

    pub fn status(&self) -> YardStatus {
        let beams = self
            .beams
            .occupied()
            .filter_map(|beam| {
                let target = self.pool.get(beam.target)?;
                Some(BeamStatus {
                    tool: self.record.tools[beam.tool].clone(),
                    tool_index: u8::try_from(beam.tool).ok()?,
                    slot: u8::try_from(beam.slot).ok()?,
                    block: target.block.clone(),
                    stalled: self.stalled.contains(&beam.target),
                })
            })
            .collect();
        YardStatus {
            id: self.record.id.clone(),
            mode: self.mode,
            mobile: self.record.mobile,
            settings: self.settings.clone(),
            tool_power_kw: self.power.tools_kw.to_vec(),
            max_power_kw: self.power.max_kw,
            beams,
            stalled: self.stalled_blocks(),
            missing_components: self.missing.clone(),
            contained: self.contained.to_vec(),
            intersecting: self.intersecting.to_vec(),
            work_set: self.work_set.to_vec(),
            pending_targets: self.pool.len(),
            last_scan: self.last_scan.clone(),
        }
    }
}
