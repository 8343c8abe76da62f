//! Seeded derelict-field scenarios for runs without a hand-written file.

use std::collections::BTreeMap;

use glam::DVec3;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use yard_core::{
    BlockId, ComponentCounts, Command, InventoryId, ItemId, StructureId, YardId, YardSettings,
};

use crate::scenario::{
    BlockDef, BlockPlacement, ComponentStack, InventoryDef, Scenario, ScriptAction, ScriptEntry,
    StructureDef, YardDef,
};

const YARD_HALF_EXTENTS: DVec3 = DVec3::new(60.0, 40.0, 80.0);

fn stack(item: &str, count: u32) -> ComponentStack {
    ComponentStack {
        item: ItemId(item.to_string()),
        count,
    }
}

fn block_defs() -> BTreeMap<String, BlockDef> {
    BTreeMap::from([
        (
            "armor".to_string(),
            BlockDef {
                max_integrity: 16.0,
                integrity_per_sec: 4.0,
                components: vec![stack("steel_plate", 25)],
            },
        ),
        (
            "conveyor".to_string(),
            BlockDef {
                max_integrity: 12.0,
                integrity_per_sec: 3.0,
                components: vec![
                    stack("interior_plate", 10),
                    stack("construction", 20),
                    stack("motor", 6),
                ],
            },
        ),
        (
            "reactor".to_string(),
            BlockDef {
                max_integrity: 40.0,
                integrity_per_sec: 2.0,
                components: vec![
                    stack("steel_plate", 30),
                    stack("construction", 20),
                    stack("computer", 25),
                ],
            },
        ),
    ])
}

fn random_offset(rng: &mut ChaCha8Rng, half: DVec3) -> DVec3 {
    DVec3::new(
        rng.gen_range(-half.x..=half.x),
        rng.gen_range(-half.y..=half.y),
        rng.gen_range(-half.z..=half.z),
    )
    .round()
}

/// A single yard with `wrecks` derelicts to grind, a hull with a projected
/// section to weld and a stocked cargo container. Commands a weld at tick 0.
pub fn generate_scenario(seed: u64, wrecks: usize) -> Scenario {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let defs = block_defs();
    let kinds: Vec<String> = defs.keys().cloned().collect();
    let yard = YardId("yard_0001".to_string());

    let mut structures = vec![StructureDef {
        id: StructureId("yard_0001_frame".to_string()),
        center: DVec3::new(0.0, -YARD_HALF_EXTENTS.y - 10.0, 0.0),
        half_extents: DVec3::new(70.0, 5.0, 90.0),
        rotation: None,
        velocity: DVec3::ZERO,
        physical: true,
        projector: None,
        projection_of: None,
        blocks: Vec::new(),
    }];

    for n in 0..wrecks {
        let half = DVec3::new(
            rng.gen_range(4.0..12.0),
            rng.gen_range(3.0..8.0),
            rng.gen_range(6.0..16.0),
        )
        .round();
        let room = YARD_HALF_EXTENTS - half;
        let center = random_offset(&mut rng, room);
        let block_count = rng.gen_range(4..12);
        let blocks = (0..block_count)
            .map(|b| {
                let kind = &kinds[rng.gen_range(0..kinds.len())];
                let mut inventory = ComponentCounts::new();
                if rng.gen_bool(0.2) {
                    inventory.insert(ItemId("ice".to_string()), rng.gen_range(5..50));
                }
                BlockPlacement {
                    id: BlockId(format!("wreck_{n:03}_block_{b:03}")),
                    def: kind.clone(),
                    offset: random_offset(&mut rng, half),
                    built: if rng.gen_bool(0.3) {
                        rng.gen_range(0.2..1.0)
                    } else {
                        1.0
                    },
                    deformation: 0.0,
                    inventory,
                    blocked: false,
                }
            })
            .collect();
        structures.push(StructureDef {
            id: StructureId(format!("wreck_{n:03}")),
            center,
            half_extents: half,
            rotation: None,
            velocity: DVec3::ZERO,
            physical: true,
            projector: None,
            projection_of: None,
            blocks,
        });
    }

    let hull_center = DVec3::new(0.0, 0.0, -YARD_HALF_EXTENTS.z + 20.0);
    let hull_half = DVec3::new(10.0, 6.0, 12.0);
    let hull_blocks: Vec<BlockPlacement> = (0..4_u32)
        .map(|b| BlockPlacement {
            id: BlockId(format!("hull_block_{b:03}")),
            def: "armor".to_string(),
            offset: DVec3::new(f64::from(b) * 2.5 - 4.0, 0.0, 0.0),
            built: 1.0,
            deformation: if b == 0 { 2.0 } else { 0.0 },
            inventory: ComponentCounts::new(),
            blocked: false,
        })
        .collect();
    let planned: Vec<BlockPlacement> = kinds
        .iter()
        .cycle()
        .take(6)
        .enumerate()
        .map(|(b, kind)| BlockPlacement {
            id: BlockId(format!("hull_plan_{b:03}")),
            def: kind.clone(),
            offset: DVec3::new(b as f64 * 2.5 - 6.0, 2.5, 0.0),
            built: 0.0,
            deformation: 0.0,
            inventory: ComponentCounts::new(),
            blocked: false,
        })
        .collect();
    structures.push(StructureDef {
        id: StructureId("hull".to_string()),
        center: hull_center,
        half_extents: hull_half,
        rotation: None,
        velocity: DVec3::ZERO,
        physical: true,
        projector: None,
        projection_of: None,
        blocks: hull_blocks,
    });
    structures.push(StructureDef {
        id: StructureId("hull_projection".to_string()),
        center: hull_center,
        half_extents: hull_half,
        rotation: None,
        velocity: DVec3::ZERO,
        physical: false,
        projector: Some(DVec3::new(0.0, -hull_half.y, 0.0)),
        projection_of: Some(StructureId("hull".to_string())),
        blocks: planned,
    });

    let items = ["steel_plate", "interior_plate", "construction", "motor", "computer"]
        .into_iter()
        .map(|item| (ItemId(item.to_string()), rng.gen_range(200..600)))
        .collect();

    Scenario {
        name: format!("derelict_field_{seed}"),
        block_defs: defs,
        yards: vec![YardDef {
            id: yard.clone(),
            host: StructureId("yard_0001_frame".to_string()),
            center: DVec3::ZERO,
            half_extents: YARD_HALF_EXTENTS,
            rotation: None,
            mobile: false,
            network: 1,
            tool_capacity: 400,
            settings: Some(YardSettings {
                grind_multiplier: 1.0,
                weld_multiplier: 1.0,
                ..YardSettings::default()
            }),
        }],
        structures,
        inventories: vec![InventoryDef {
            id: InventoryId("cargo_0001".to_string()),
            network: 1,
            items,
        }],
        script: vec![ScriptEntry {
            at_tick: 0,
            action: ScriptAction::Command {
                command: Command::StartWeld { yard },
            },
        }],
    }
}
