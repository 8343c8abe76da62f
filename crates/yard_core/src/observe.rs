//! Authoritative read phase.
//!
//! Everything the planning phase needs from the host is copied into an owned
//! [`Observation`], so planning can run away from the authoritative context.

use glam::DVec3;

use crate::geometry::OrientedBox;
use crate::shipyard::Shipyard;
use crate::world::{BlockInfo, StructureInfo, World};
use crate::{BlockId, ShipyardMode, StructureId, TargetId, ToolId, YardId, TOOL_COUNT};

/// What to read for one yard. Built from the yard without touching the host.
#[derive(Debug, Clone)]
pub struct ObservationRequest {
    pub yard: YardId,
    pub mode: ShipyardMode,
    pub host: StructureId,
    pub bounds: OrientedBox,
    pub tools: [ToolId; TOOL_COUNT],
    pub work_set: Vec<StructureId>,
    pub want_blocks: bool,
    /// Targets whose owning structure may have changed after a split.
    pub reparent: Vec<(TargetId, BlockId)>,
}

#[derive(Debug, Clone)]
pub struct Observation {
    pub tools_present: bool,
    pub tools_enabled: bool,
    pub tool_positions: [DVec3; TOOL_COUNT],
    pub bounds: OrientedBox,
    /// Open structures near an idle yard, host excluded.
    pub nearby: Vec<StructureInfo>,
    /// Current state of each work-set structure; `None` when gone.
    pub work: Vec<(StructureId, Option<StructureInfo>)>,
    pub blocks: Vec<(StructureInfo, Vec<BlockInfo>)>,
    pub reparented: Vec<(TargetId, Option<StructureId>)>,
}

impl Shipyard {
    pub fn observation_request(&self) -> ObservationRequest {
        let reparent = if self.split_parents.is_empty() {
            Vec::new()
        } else {
            let mut pending: Vec<(TargetId, BlockId)> = self
                .pool
                .iter()
                .filter(|t| self.split_parents.contains(&t.structure))
                .map(|t| (t.id, t.block.clone()))
                .collect();
            pending.sort_by_key(|(id, _)| *id);
            pending
        };
        ObservationRequest {
            yard: self.id().clone(),
            mode: self.mode,
            host: self.record.host.clone(),
            bounds: self.bounds,
            tools: self.record.tools.clone(),
            work_set: self.work_set.to_vec(),
            want_blocks: self.mode == ShipyardMode::Scanning
                || (self.mode.is_working() && !self.pool.is_built()),
            reparent,
        }
    }
}

/// Read everything `request` asks for.
pub fn observe<W: World>(world: &W, request: &ObservationRequest) -> Observation {
    let positions: Vec<Option<DVec3>> = request
        .tools
        .iter()
        .map(|tool| world.tool_position(tool))
        .collect();
    let tools_present = positions.iter().all(Option::is_some);
    let tools_enabled = request.tools.iter().all(|tool| world.tool_enabled(tool));
    let fallback = request.bounds.corners();
    let tool_positions: [DVec3; TOOL_COUNT] =
        std::array::from_fn(|i| positions[i].unwrap_or(fallback[i]));

    // A moving frame carries its volume along with the tools.
    let mut bounds = request.bounds;
    if tools_present {
        let centroid = tool_positions.iter().copied().sum::<DVec3>() / TOOL_COUNT as f64;
        bounds.center = centroid;
    }

    let nearby = if request.mode == ShipyardMode::Idle {
        world
            .structures_near(bounds.center, bounds.radius_sq())
            .into_iter()
            .filter(|s| s.id != request.host && !s.closed)
            .collect()
    } else {
        Vec::new()
    };

    let work: Vec<(StructureId, Option<StructureInfo>)> = request
        .work_set
        .iter()
        .map(|id| (id.clone(), world.structure(id)))
        .collect();

    let blocks = if request.want_blocks {
        work.iter()
            .filter_map(|(_, info)| info.clone())
            .filter(|info| !info.closed)
            .map(|info| {
                let blocks = world.blocks(&info.id);
                (info, blocks)
            })
            .collect()
    } else {
        Vec::new()
    };

    let reparented = request
        .reparent
        .iter()
        .map(|(target, block)| (*target, world.block(block).map(|b| b.structure)))
        .collect();

    Observation {
        tools_present,
        tools_enabled,
        tool_positions,
        bounds,
        nearby,
        work,
        blocks,
        reparented,
    }
}
