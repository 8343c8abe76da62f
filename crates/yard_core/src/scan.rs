use crate::stepper::{efficiency, scaled};
use crate::world::{BlockInfo, StructureInfo};
use crate::{ComponentCounts, ScanPurpose, ScanReport, YardSettings, TOOL_COUNT};

/// Estimate a session over `structures` without touching anything.
///
/// Time assumes every beam of every tool stays busy for the whole session.
/// Grind gain uses the efficiency at the yard's bounding radius, a rough
/// average over the volume.
pub fn estimate(
    purpose: ScanPurpose,
    settings: &YardSettings,
    radius_sq: f64,
    structures: &[(StructureInfo, Vec<BlockInfo>)],
) -> ScanReport {
    let mut blocks = 0;
    let mut work_secs = 0.0_f32;
    let mut components = ComponentCounts::new();
    let mut counted = 0;

    for (structure, structure_blocks) in structures {
        if structure.closed || (purpose == ScanPurpose::Grind && !structure.physical) {
            continue;
        }
        counted += 1;
        for block in structure_blocks {
            let per_sec = block.integrity_per_sec.max(f32::EPSILON);
            match purpose {
                ScanPurpose::Grind => {
                    if block.projected {
                        continue;
                    }
                    blocks += 1;
                    work_secs += block.integrity / per_sec;
                    add_counts(&mut components, &block.stockpile);
                }
                ScanPurpose::Weld => {
                    if !block.projected && block.fully_built() && !block.deformed {
                        continue;
                    }
                    blocks += 1;
                    work_secs += if block.projected {
                        block.build_time()
                    } else {
                        (block.max_integrity - block.integrity).max(0.0) / per_sec
                    };
                    add_counts(&mut components, &block.missing);
                }
            }
        }
    }

    if purpose == ScanPurpose::Grind {
        let eff = efficiency(radius_sq);
        for count in components.values_mut() {
            *count = scaled(*count, eff);
        }
        components.retain(|_, count| *count > 0);
    }

    let multiplier = match purpose {
        ScanPurpose::Grind => settings.grind_multiplier,
        ScanPurpose::Weld => settings.weld_multiplier,
    };
    let beams = (TOOL_COUNT as f32) * f32::from(settings.beam_count.max(1));
    ScanReport {
        purpose,
        structures: counted,
        blocks,
        estimated_secs: work_secs / multiplier.max(f32::EPSILON) / beams,
        components,
    }
}

fn add_counts(total: &mut ComponentCounts, counts: &ComponentCounts) {
    for (item, count) in counts {
        *total.entry(item.clone()).or_insert(0) += count;
    }
}
