use super::*;

fn damage_all(world: &mut FakeWorld, integrity: f32) {
    for block in world.blocks.values_mut() {
        block.integrity = integrity;
    }
}

#[test]
fn weld_session_ignores_structures_arriving_later() {
    let (mut registry, mut world) = setup(4);
    damage_all(&mut world, 5.0);
    start(&mut registry, &mut world, ShipyardMode::Welding);
    assert_eq!(yard(&registry).mode, ShipyardMode::Welding);

    world.add_structure("late", DVec3::new(15.0, 0.0, 0.0), DVec3::splat(2.0), 2);
    for _ in 0..3 {
        tick(&mut registry, &mut world, &[]);
    }

    let yard = yard(&registry);
    assert_eq!(yard.work_set.to_vec(), vec![StructureId("wreck".to_string())]);
    assert!(yard
        .pool
        .iter()
        .all(|t| t.structure == StructureId("wreck".to_string())));
    assert!(yard.contained.is_empty());
}

#[test]
fn weld_with_nothing_to_do_returns_to_idle() {
    let (mut registry, mut world) = setup(3);
    let events = start(&mut registry, &mut world, ShipyardMode::Welding);
    let events: Vec<EventEnvelope> = events
        .into_iter()
        .chain(tick(&mut registry, &mut world, &[]))
        .collect();

    let to_idle = events.iter().any(|e| {
        matches!(
            e.event,
            Event::ModeChanged {
                from: ShipyardMode::Welding,
                to: ShipyardMode::Idle,
                ..
            }
        )
    });
    assert!(to_idle);
    assert_eq!(yard(&registry).mode, ShipyardMode::Idle);
}

#[test]
fn switching_a_tool_off_stops_the_session() {
    let (mut registry, mut world) = setup(5);
    start(&mut registry, &mut world, ShipyardMode::Grinding);
    tick(&mut registry, &mut world, &[]);
    assert!(yard(&registry).beams.occupied_count() > 0);

    world.set_tool_enabled(&ToolId("yard_tool_3".to_string()), false);
    tick(&mut registry, &mut world, &[]);

    let yard = yard(&registry);
    assert_eq!(yard.mode, ShipyardMode::Idle);
    assert_eq!(yard.beams.occupied_count(), 0);
    assert!(yard.pool.is_empty());
}

#[test]
fn closing_a_structure_purges_every_target_once() {
    let (mut registry, mut world) = setup(5);
    start(&mut registry, &mut world, ShipyardMode::Grinding);
    tick(&mut registry, &mut world, &[]);

    world.close("wreck");
    let events = tick(&mut registry, &mut world, &[]);
    let purged: Vec<usize> = events
        .iter()
        .filter_map(|e| match e.event {
            Event::StructureReleased { purged_targets, .. } => Some(purged_targets),
            _ => None,
        })
        .collect();
    assert_eq!(purged, vec![5]);

    let yard = registry.get_mut(&yard_id("yard")).expect("yard");
    assert!(yard.pool.is_empty());
    assert!(yard.pool.queues_consistent());
    assert_eq!(yard.beams.occupied_count(), 0);
    assert_eq!(yard.mode, ShipyardMode::Idle);

    let mut again = Vec::new();
    assert_eq!(
        yard.release_structure(&StructureId("wreck".to_string()), &mut again),
        0
    );
}

#[test]
fn structure_drifting_out_is_released() {
    let (mut registry, mut world) = setup(3);
    start(&mut registry, &mut world, ShipyardMode::Grinding);
    tick(&mut registry, &mut world, &[]);

    world.move_structure("wreck", DVec3::new(0.0, 25.0, 0.0));
    assert_eq!(
        yard(&registry).bounds.classify(&bounds_of(&world, "wreck")),
        Containment::Intersecting
    );
    tick(&mut registry, &mut world, &[]);

    let yard = yard(&registry);
    assert!(yard.work_set.is_empty());
    assert_eq!(yard.mode, ShipyardMode::Idle);
}

#[test]
fn scan_reports_once_and_returns_to_idle() {
    let (mut registry, mut world) = setup(6);
    let commands = command(
        &mut registry,
        Command::Scan {
            yard: yard_id("yard"),
            purpose: ScanPurpose::Grind,
        },
    );
    let events = tick(&mut registry, &mut world, &commands);

    let report = events.iter().find_map(|e| match &e.event {
        Event::ScanCompleted { report, .. } => Some(report.clone()),
        _ => None,
    });
    let report = report.expect("scan report");
    assert_eq!(report.blocks, 6);
    assert_eq!(report.structures, 1);

    let yard = yard(&registry);
    assert_eq!(yard.mode, ShipyardMode::Idle);
    assert_eq!(yard.last_scan.as_ref().map(|r| r.blocks), Some(6));
    // Tools were never switched on for a scan.
    assert!(!world.tool_enabled(&ToolId("yard_tool_0".to_string())));
}

#[test]
fn invalidated_yard_is_dropped_and_tools_idle() {
    let (mut registry, mut world) = setup(4);
    start(&mut registry, &mut world, ShipyardMode::Grinding);
    tick(&mut registry, &mut world, &[]);

    world.invalid.push(yard_id("yard"));
    let events = refresh_discovery(&mut registry, &mut world);

    assert!(events
        .iter()
        .any(|e| matches!(e.event, Event::YardInvalidated { .. })));
    assert!(registry.is_empty());
    for power in world.power.values() {
        assert_eq!(*power, (IDLE_POWER_KW, IDLE_POWER_KW));
    }
}
