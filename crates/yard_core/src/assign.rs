//! Greedy beam assignment.
//!
//! Each tool fills its empty slots from the front of its own proximity
//! queue. Tools are visited in corner order, so when two tools want the same
//! block the lower-numbered tool wins and the other finds it already beamed.

use crate::shipyard::Shipyard;
use crate::stepper::store_in_tool;
use crate::world::{BuildCheck, World};
use crate::{
    BeamCategory, BlockId, Event, ShipyardMode, TargetId, ToolId, MATERIALIZE_COST, TOOL_COUNT,
};

enum Verdict {
    Assign,
    /// Remove from the pool and every queue.
    Discard,
    /// Remove from this tool's queue only.
    DropHere,
    /// Leave in place and look further down the queue.
    Skip,
}

/// Fill every empty beam slot of a working yard.
pub(crate) fn fill_beams<W: World>(yard: &mut Shipyard, world: &mut W, events: &mut Vec<Event>) {
    if !yard.mode.is_working() {
        return;
    }
    for tool in 0..TOOL_COUNT {
        for slot in yard.beams.empty_slots(tool) {
            let Some(id) = next_candidate(yard, world, tool, events) else {
                break;
            };
            if !yard.beams.assign(tool, slot, id) {
                continue;
            }
            let Some(target) = yard.pool.get(id) else {
                continue;
            };
            let category = if yard.stalled.contains(&id) {
                BeamCategory::Stalled
            } else {
                BeamCategory::Active
            };
            events.push(Event::BeamBegin {
                yard: yard.id().clone(),
                tool_index: u8::try_from(tool).unwrap_or(u8::MAX),
                slot: u8::try_from(slot).unwrap_or(u8::MAX),
                block: target.block.clone(),
                position: target.position,
                category,
            });
        }
    }
}

/// Scan a tool's queue from the front until a target can be beamed.
fn next_candidate<W: World>(
    yard: &mut Shipyard,
    world: &mut W,
    tool: usize,
    events: &mut Vec<Event>,
) -> Option<TargetId> {
    let mut index = 0;
    loop {
        let id = *yard.pool.queue(tool).get(index)?;
        let verdict = judge(yard, world, tool, id, events);
        match verdict {
            Verdict::Assign => return Some(id),
            Verdict::Discard => {
                yard.pool.remove(id);
                yard.stalled.remove(&id);
            }
            Verdict::DropHere => yard.pool.drop_from_queue(tool, index),
            Verdict::Skip => index += 1,
        }
    }
}

fn judge<W: World>(
    yard: &mut Shipyard,
    world: &mut W,
    tool: usize,
    id: TargetId,
    events: &mut Vec<Event>,
) -> Verdict {
    let Some(target) = yard.pool.get(id) else {
        return Verdict::DropHere;
    };
    let structure_open = world
        .structure(&target.structure)
        .is_some_and(|s| !s.closed);
    if !structure_open {
        return Verdict::Discard;
    }
    if yard.beams.holds(id) {
        return Verdict::DropHere;
    }
    if yard.mode == ShipyardMode::Welding && target.projected {
        let tool_id = yard.record.tools[tool].clone();
        let projected = target.block.clone();
        match prepare_projected(world, yard, &projected, &tool_id, events) {
            Prepared::Ready(block) => {
                if let Some(target) = yard.pool.get_mut(id) {
                    target.block = block;
                    target.projected = false;
                }
            }
            Prepared::Unavailable => return Verdict::Skip,
            Prepared::Gone => return Verdict::Discard,
        }
    }

    let Some(block_id) = yard.pool.get(id).map(|t| t.block.clone()) else {
        return Verdict::DropHere;
    };
    let Some(block) = world.block(&block_id) else {
        return Verdict::Discard;
    };
    if yard.mode == ShipyardMode::Welding && block.fully_built() && !block.deformed {
        return Verdict::Discard;
    }
    // A materialized block belongs to the projector's structure.
    yard.reparent_target(id, &block.structure);
    Verdict::Assign
}

enum Prepared {
    Ready(BlockId),
    Unavailable,
    Gone,
}

/// Turn a projected placeholder into a physical block, paying the
/// materialization cost from connected cargo.
fn prepare_projected<W: World>(
    world: &mut W,
    yard: &Shipyard,
    projected: &BlockId,
    tool: &ToolId,
    events: &mut Vec<Event>,
) -> Prepared {
    match world.check_build(projected) {
        BuildCheck::AlreadyBuilt => match world.built_from(projected) {
            Some(block) => Prepared::Ready(block),
            None => Prepared::Gone,
        },
        BuildCheck::Blocked => Prepared::Unavailable,
        BuildCheck::Buildable => {
            let Some(item) = world.first_component(projected) else {
                return Prepared::Unavailable;
            };
            let pulled = world.pull_items(&yard.cargo, &item, MATERIALIZE_COST);
            if pulled < MATERIALIZE_COST {
                // Short pulls are kept by the tool, not destroyed.
                if pulled > 0 {
                    store_in_tool(world, yard, tool, &item, pulled, events);
                }
                return Prepared::Unavailable;
            }
            match world.materialize(projected, tool) {
                Some(block) => Prepared::Ready(block),
                None => {
                    store_in_tool(world, yard, tool, &item, pulled, events);
                    Prepared::Unavailable
                }
            }
        }
    }
}
