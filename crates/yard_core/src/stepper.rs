//! One tick of grinding or welding for every beamed target.

use crate::beams::Beam;
use crate::shipyard::Shipyard;
use crate::targets::Target;
use crate::world::World;
use crate::{
    BeamCategory, ComponentCounts, Event, ItemId, ShipyardMode, StructureId, ToolId,
    EFFICIENCY_FALLOFF_SQ, GRIND_STEP, MIN_EFFICIENCY, REPAIR_FRACTION, WELD_STEP,
};

/// Guards `floor` against values a hair below an integer.
const ROUNDING_SLACK: f64 = 1e-9;

/// Fraction of material preserved by a beam working at squared distance
/// `dist_sq`. Never below the floor, never above one.
pub fn efficiency(dist_sq: f64) -> f64 {
    (1.0 - dist_sq / EFFICIENCY_FALLOFF_SQ).clamp(MIN_EFFICIENCY, 1.0)
}

/// What survives of `count` items at efficiency `eff`. Rounds down so
/// inefficiency can only lose material, never create it.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn scaled(count: u32, eff: f64) -> u32 {
    let kept = (f64::from(count) * eff + ROUNDING_SLACK).floor();
    (kept.max(0.0) as u32).min(count)
}

enum Outcome {
    Working,
    Completed,
    Lost,
}

/// Advance every occupied beam of a working yard by one step.
pub(crate) fn step<W: World>(yard: &mut Shipyard, world: &mut W, events: &mut Vec<Event>) {
    if !yard.mode.is_working() {
        return;
    }
    let beams: Vec<Beam> = yard.beams.occupied().collect();
    let mut missing = ComponentCounts::new();

    for beam in beams {
        let Some(target) = yard.pool.get(beam.target).cloned() else {
            yard.beams.release(beam.tool, beam.slot);
            events.push(yard.beam_clear(beam.tool, beam.slot));
            continue;
        };
        let tool = yard.record.tools[beam.tool].clone();
        let eff = efficiency(target.tool_dist_sq[beam.tool]);

        let outcome = if yard.mode == ShipyardMode::Grinding {
            grind_target(yard, world, &target, &tool, eff, events)
        } else {
            weld_target(yard, world, beam, &target, &tool, eff, &mut missing, events)
        };

        match outcome {
            Outcome::Working => {}
            Outcome::Completed => {
                finish(yard, beam, events);
                events.push(Event::TargetCompleted {
                    yard: yard.id().clone(),
                    block: target.block,
                    mode: yard.mode,
                });
            }
            Outcome::Lost => {
                finish(yard, beam, events);
                events.push(Event::TargetLost {
                    yard: yard.id().clone(),
                    block: target.block,
                });
            }
        }
    }
    yard.missing = missing;
}

fn finish(yard: &mut Shipyard, beam: Beam, events: &mut Vec<Event>) {
    yard.pool.remove(beam.target);
    yard.stalled.remove(&beam.target);
    yard.beams.release(beam.tool, beam.slot);
    events.push(yard.beam_clear(beam.tool, beam.slot));
}

fn adopt_owner(yard: &mut Shipyard, target: &Target, owner: &StructureId, events: &mut Vec<Event>) {
    if yard.reparent_target(target.id, owner) {
        events.push(Event::StructureAdopted {
            yard: yard.id().clone(),
            from: target.structure.clone(),
            structure: owner.clone(),
        });
    }
}

/// Put `amount` of `item` into the tool. Whatever does not fit goes back
/// to the host rather than vanishing.
pub(crate) fn store_in_tool<W: World>(
    world: &mut W,
    yard: &Shipyard,
    tool: &ToolId,
    item: &ItemId,
    amount: u32,
    events: &mut Vec<Event>,
) {
    let rest = amount.saturating_sub(world.deposit_to_tool(tool, item, amount));
    if rest == 0 {
        return;
    }
    world.offload(tool, &yard.cargo, item, rest);
    events.push(Event::ToolOverflow {
        yard: yard.id().clone(),
        tool: tool.clone(),
        item: item.clone(),
        count: rest,
    });
}

fn deposit_scaled<W: World>(
    world: &mut W,
    yard: &Shipyard,
    tool: &ToolId,
    items: &ComponentCounts,
    eff: f64,
    events: &mut Vec<Event>,
) {
    for (item, count) in items {
        let kept = scaled(*count, eff);
        if kept > 0 {
            store_in_tool(world, yard, tool, item, kept, events);
        }
    }
}

fn grind_target<W: World>(
    yard: &mut Shipyard,
    world: &mut W,
    target: &Target,
    tool: &ToolId,
    eff: f64,
    events: &mut Vec<Event>,
) -> Outcome {
    let Some(block) = world.block(&target.block) else {
        return Outcome::Lost;
    };
    if !world.structure(&block.structure).is_some_and(|s| !s.closed) {
        return Outcome::Lost;
    }
    adopt_owner(yard, target, &block.structure, events);

    if !block.dismantled() {
        let salvage = world.grind(&target.block, GRIND_STEP * yard.settings.grind_multiplier);
        deposit_scaled(world, yard, tool, &salvage, eff, events);
    }

    let dismantled = world.block(&target.block).map_or(true, |b| b.dismantled());
    if !dismantled {
        return Outcome::Working;
    }
    let contents = world.drain_block_inventory(&target.block);
    deposit_scaled(world, yard, tool, &contents, eff, events);
    world.raze(&target.block);
    Outcome::Completed
}

#[allow(clippy::too_many_arguments)]
fn weld_target<W: World>(
    yard: &mut Shipyard,
    world: &mut W,
    beam: Beam,
    target: &Target,
    tool: &ToolId,
    eff: f64,
    missing_total: &mut ComponentCounts,
    events: &mut Vec<Event>,
) -> Outcome {
    let Some(block) = world.block(&target.block) else {
        return Outcome::Lost;
    };
    if !world.structure(&block.structure).is_some_and(|s| !s.closed) {
        return Outcome::Lost;
    }
    adopt_owner(yard, target, &block.structure, events);

    supply(world, yard, tool, &block.missing, eff, events);
    world.stock_from_tool(tool, &target.block);

    let Some(stocked) = world.block(&target.block) else {
        return Outcome::Lost;
    };
    let stalled = !stocked.missing.is_empty() && !stocked.deformed;
    update_stall(yard, beam, target, stalled, events);
    if stalled {
        for (item, count) in &stocked.missing {
            *missing_total.entry(item.clone()).or_insert(0) += count;
        }
    }

    let amount = WELD_STEP * yard.settings.weld_multiplier;
    world.weld(&target.block, amount, amount * REPAIR_FRACTION);

    match world.block(&target.block) {
        Some(after) if after.fully_built() && !after.deformed => Outcome::Completed,
        Some(_) => Outcome::Working,
        None => Outcome::Lost,
    }
}

/// Pull enough from cargo that what survives the beam, together with what
/// the tool already holds, covers `missing`. The share lost to inefficiency
/// is destroyed. Stock the block cannot mount yet stays in the tool, so a
/// stalled target draws nothing further.
fn supply<W: World>(
    world: &mut W,
    yard: &Shipyard,
    tool: &ToolId,
    missing: &ComponentCounts,
    eff: f64,
    events: &mut Vec<Event>,
) {
    for (item, count) in missing {
        let short = count.saturating_sub(world.tool_stock(tool, item));
        if short == 0 {
            continue;
        }
        let wanted = pull_for(short, eff);
        let pulled = world.pull_items(&yard.cargo, item, wanted);
        let kept = scaled(pulled, eff);
        if kept > 0 {
            store_in_tool(world, yard, tool, item, kept, events);
        }
    }
}

/// Items to pull so that `needed` survive at efficiency `eff`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pull_for(needed: u32, eff: f64) -> u32 {
    (f64::from(needed) / eff - ROUNDING_SLACK).ceil().max(0.0) as u32
}

fn update_stall(
    yard: &mut Shipyard,
    beam: Beam,
    target: &Target,
    stalled: bool,
    events: &mut Vec<Event>,
) {
    let was_stalled = yard.stalled.contains(&target.id);
    if stalled == was_stalled {
        return;
    }
    let yard_id = yard.id().clone();
    let (status, category) = if stalled {
        yard.stalled.insert(target.id);
        (
            Event::TargetStalled {
                yard: yard_id.clone(),
                block: target.block.clone(),
            },
            BeamCategory::Stalled,
        )
    } else {
        yard.stalled.remove(&target.id);
        (
            Event::TargetResumed {
                yard: yard_id.clone(),
                block: target.block.clone(),
            },
            BeamCategory::Redraw,
        )
    };
    events.push(status);
    events.push(Event::BeamBegin {
        yard: yard_id,
        tool_index: u8::try_from(beam.tool).unwrap_or(u8::MAX),
        slot: u8::try_from(beam.slot).unwrap_or(u8::MAX),
        block: target.block.clone(),
        position: target.position,
        category,
    });
}
