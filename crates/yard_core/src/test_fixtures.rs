//! Shared test fixtures for `yard_core` and downstream crates.
//!
//! Builders for the plain data the engine reads from a host: structures,
//! blocks and shipyard records. Defaults describe an intact, physical block
//! of 10 integrity built at 1 integrity per second.

use glam::DVec3;

use crate::geometry::OrientedBox;
use crate::world::{BlockInfo, ShipyardRecord, StructureInfo};
use crate::{BlockId, ComponentCounts, StructureId, ToolId, YardId, TOOL_COUNT};

pub fn structure_at(id: &str, center: DVec3, half_extents: DVec3) -> StructureInfo {
    StructureInfo {
        id: StructureId(id.to_string()),
        bounds: OrientedBox::axis_aligned(center, half_extents),
        closed: false,
        physical: true,
        projector: None,
    }
}

pub fn block_at(id: &str, structure: &str, position: DVec3) -> BlockInfo {
    BlockInfo {
        id: BlockId(id.to_string()),
        structure: StructureId(structure.to_string()),
        position,
        integrity: 10.0,
        max_integrity: 10.0,
        integrity_per_sec: 1.0,
        deformed: false,
        projected: false,
        stockpile: ComponentCounts::new(),
        missing: ComponentCounts::new(),
    }
}

pub fn corner_tools(bounds: &OrientedBox) -> [DVec3; TOOL_COUNT] {
    bounds.corners()
}

/// Tool ids `{yard}_tool_{n}` in corner order.
pub fn tool_ids(yard: &str) -> [ToolId; TOOL_COUNT] {
    std::array::from_fn(|i| ToolId(format!("{yard}_tool_{i}")))
}

/// Static yard centered on `center`, hosted on `{id}_frame`.
pub fn yard_record(id: &str, center: DVec3, half_extents: DVec3) -> ShipyardRecord {
    ShipyardRecord {
        id: YardId(id.to_string()),
        host: StructureId(format!("{id}_frame")),
        bounds: OrientedBox::axis_aligned(center, half_extents),
        tools: tool_ids(id),
        mobile: false,
    }
}
