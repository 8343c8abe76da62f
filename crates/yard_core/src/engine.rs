use std::collections::BTreeSet;

use crate::assign::fill_beams;
use crate::containment::{classify_nearby, recheck_work_set};
use crate::observe::{observe, Observation};
use crate::registry::ShipyardRegistry;
use crate::shipyard::Shipyard;
use crate::world::{BlockInfo, Connectivity, Discovery, StructureInfo, World};
use crate::{power, scan, stepper};
use crate::{CommandEnvelope, Event, EventEnvelope, InventoryId, ScanPurpose, ShipyardMode, ToolId};

/// Advance every shipyard by one tick in the calling context.
///
/// Order of operations:
/// 1. Apply operator commands.
/// 2. Route structure splits reported by the host.
/// 3. Per yard, in id order: observe, plan, execute.
/// 4. Increment tick counter.
///
/// Returns all events produced this tick.
pub fn tick<W: World>(
    registry: &mut ShipyardRegistry,
    world: &mut W,
    commands: &[CommandEnvelope],
) -> Vec<EventEnvelope> {
    let mut events = registry.apply_commands(commands);
    let splits = world.take_splits();
    events.extend(registry.route_splits(&splits));

    let authoritative = registry.is_authoritative();
    for id in registry.yard_ids() {
        let Some(yard) = registry.get_mut(&id) else {
            continue;
        };
        let request = yard.observation_request();
        let observation = observe(world, &request);
        plan(yard, &observation, &mut events);
        execute(yard, world, authoritative, &mut events);
    }

    let envelopes = registry.envelope(events);
    registry.tick += 1;
    envelopes
}

/// Background phase: everything that only needs the yard and an observation.
///
/// Commits staged containment, purges released structures and builds the
/// target pool. Never touches the host.
pub fn plan(yard: &mut Shipyard, observation: &Observation, events: &mut Vec<Event>) {
    if yard.mode == ShipyardMode::Invalid {
        return;
    }
    yard.bounds = observation.bounds;
    yard.tool_positions = observation.tool_positions;
    yard.commit_cargo();
    if yard.disable_pending() {
        return;
    }

    let tools_checked = yard.mode.is_working() && !yard.pending_tool_enable;
    if tools_checked && !(observation.tools_present && observation.tools_enabled) {
        yard.request_disable(true);
        return;
    }

    match yard.mode {
        ShipyardMode::Idle => classify_nearby(yard, &observation.nearby, events),
        ShipyardMode::Welding | ShipyardMode::Grinding => {
            apply_reparenting(yard, observation, events);
            recheck_work_set(yard, &observation.work, events);
            if !yard.disable_pending() && !yard.pool.is_built() {
                build_pool(yard, observation, events);
            }
        }
        ShipyardMode::Scanning => finish_scan(yard, observation, events),
        ShipyardMode::Invalid => {}
    }
}

/// Authoritative phase: assignment, stepping, the disable apply point and
/// the power push.
pub fn execute<W: World>(
    yard: &mut Shipyard,
    world: &mut W,
    authoritative: bool,
    events: &mut Vec<Event>,
) {
    if yard.pending_tool_enable && !yard.disable_pending() {
        for tool in &yard.record.tools {
            world.set_tool_enabled(tool, true);
        }
        yard.pending_tool_enable = false;
    }

    if yard.mode.is_working() && !yard.disable_pending() && yard.pool.is_built() {
        fill_beams(yard, world, events);
        if yard.beams.occupied_count() == 0 {
            // Nothing left that can be worked on.
            yard.request_disable(true);
        } else {
            stepper::step(yard, world, events);
        }
    }

    yard.process_disable(authoritative, events);
    power::push(yard, world, events);
}

fn apply_reparenting(yard: &mut Shipyard, observation: &Observation, events: &mut Vec<Event>) {
    for (target, owner) in &observation.reparented {
        let Some(owner) = owner else {
            continue;
        };
        let from = yard.pool.get(*target).map(|t| t.structure.clone());
        if yard.reparent_target(*target, owner) {
            if let Some(from) = from {
                events.push(Event::StructureAdopted {
                    yard: yard.id().clone(),
                    from,
                    structure: owner.clone(),
                });
            }
        }
    }
    yard.split_parents.clear();
}

fn session_blocks(yard: &Shipyard, observation: &Observation) -> Vec<(StructureInfo, Vec<BlockInfo>)> {
    observation
        .blocks
        .iter()
        .filter(|(structure, _)| yard.work_set.contains(&structure.id))
        .cloned()
        .collect()
}

fn build_pool(yard: &mut Shipyard, observation: &Observation, events: &mut Vec<Event>) {
    let structures = session_blocks(yard, observation);
    let count = yard.pool.rebuild(
        yard.mode,
        yard.settings.build_pattern,
        &structures,
        &yard.tool_positions,
    );
    events.push(Event::TargetsBuilt {
        yard: yard.id().clone(),
        count,
    });
}

fn finish_scan(yard: &mut Shipyard, observation: &Observation, events: &mut Vec<Event>) {
    let purpose = yard.scan_purpose.unwrap_or(ScanPurpose::Grind);
    let structures = session_blocks(yard, observation);
    let report = scan::estimate(purpose, &yard.settings, yard.bounds.radius_sq(), &structures);
    yard.last_scan = Some(report.clone());
    events.push(Event::ScanCompleted {
        yard: yard.id().clone(),
        report,
    });
    yard.request_disable(true);
}

/// Poll discovery: register new yards, invalidate and drop the ones no
/// longer valid, resetting their tools to idle draw.
pub fn refresh_discovery<W: World + Discovery>(
    registry: &mut ShipyardRegistry,
    world: &mut W,
) -> Vec<EventEnvelope> {
    let records = world.validated_yards();
    let (mut events, invalidated) = {
        let host: &W = world;
        registry.sync_discovery(records, |id| host.yard_valid(id))
    };
    for mut yard in invalidated {
        power::push(&mut yard, world, &mut events);
    }
    registry.envelope(events)
}

/// Inventories reachable from any of the tools, deduplicated and ordered.
pub fn reachable_cargo<C: Connectivity>(network: &C, tools: &[ToolId]) -> Vec<InventoryId> {
    let reachable: BTreeSet<InventoryId> = tools
        .iter()
        .flat_map(|tool| network.reachable_inventories(tool))
        .collect();
    reachable.into_iter().collect()
}

/// Stage a fresh connected-cargo set on every yard.
pub fn refresh_cargo<C: Connectivity>(registry: &mut ShipyardRegistry, network: &C) {
    for yard in registry.yards_mut() {
        let cargo = reachable_cargo(network, &yard.record.tools);
        yard.stage_cargo(cargo);
    }
}
