use std::collections::BTreeSet;

use crate::shipyard::Shipyard;
use crate::world::StructureInfo;
use crate::{Containment, Event, StructureId};

/// Idle yard: sort nearby structures into contained and intersecting.
pub(crate) fn classify_nearby(yard: &mut Shipyard, nearby: &[StructureInfo], events: &mut Vec<Event>) {
    let mut seen = BTreeSet::new();
    for structure in nearby {
        if structure.closed || structure.id == yard.record.host {
            continue;
        }
        seen.insert(structure.id.clone());
        match yard.bounds.classify(&structure.bounds) {
            Containment::Contained => {
                yard.contained.stage_add(structure.id.clone());
                yard.intersecting.stage_remove(structure.id.clone());
            }
            Containment::Intersecting => {
                yard.contained.stage_remove(structure.id.clone());
                yard.intersecting.stage_add(structure.id.clone());
            }
            Containment::Outside => {
                yard.contained.stage_remove(structure.id.clone());
                yard.intersecting.stage_remove(structure.id.clone());
            }
        }
    }
    // Structures that moved out of range or closed are no longer reported.
    for gone in yard.contained.to_vec().into_iter().filter(|s| !seen.contains(s)) {
        yard.contained.stage_remove(gone);
    }
    for gone in yard.intersecting.to_vec().into_iter().filter(|s| !seen.contains(s)) {
        yard.intersecting.stage_remove(gone);
    }

    let contained = yard.contained.commit();
    let intersecting = yard.intersecting.commit();
    let yard_id = yard.id().clone();
    let mut announce = |structure: &StructureId, containment| {
        events.push(Event::ContainmentChanged {
            yard: yard_id.clone(),
            structure: structure.clone(),
            containment,
        });
    };
    for structure in &contained.added {
        announce(structure, Containment::Contained);
    }
    for structure in &intersecting.added {
        announce(structure, Containment::Intersecting);
    }
    let left: BTreeSet<&StructureId> = contained
        .removed
        .iter()
        .chain(intersecting.removed.iter())
        .filter(|s| !yard.contained.contains(s) && !yard.intersecting.contains(s))
        .collect();
    for structure in left {
        announce(structure, Containment::Outside);
    }
}

/// Working yard: drop work-set structures that closed, vanished or left the
/// volume, purging their targets. Commits staged adoptions from splits.
/// Requests a disable once nothing physical is left to work on.
pub(crate) fn recheck_work_set(
    yard: &mut Shipyard,
    work: &[(StructureId, Option<StructureInfo>)],
    events: &mut Vec<Event>,
) {
    for (id, info) in work {
        let keep = info
            .as_ref()
            .is_some_and(|s| !s.closed && yard.bounds.classify(&s.bounds) == Containment::Contained);
        if !keep {
            yard.work_set.stage_remove(id.clone());
        }
    }

    let change = yard.work_set.commit();
    for structure in &change.removed {
        yard.release_structure(structure, events);
    }

    // Structures adopted this tick were not observed yet; count them as physical.
    let only_projections = !yard.work_set.is_empty()
        && yard.work_set.iter().all(|id| {
            work.iter()
                .find(|(w, _)| w == id)
                .and_then(|(_, info)| info.as_ref())
                .is_some_and(|info| !info.physical)
        });
    if yard.work_set.is_empty() || only_projections {
        yard.request_disable(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{structure_at, yard_record};
    use crate::{ShipyardMode, YardSettings};
    use glam::DVec3;

    fn yard() -> Shipyard {
        Shipyard::new(
            yard_record("yard_c", DVec3::ZERO, DVec3::new(30.0, 20.0, 50.0)),
            YardSettings::default(),
        )
    }

    fn sid(id: &str) -> StructureId {
        StructureId(id.to_string())
    }

    #[test]
    fn idle_classification_tracks_both_sets() {
        let mut yard = yard();
        let inside = structure_at("inside", DVec3::ZERO, DVec3::splat(5.0));
        let edge = structure_at("edge", DVec3::new(29.0, 0.0, 0.0), DVec3::splat(5.0));
        let mut events = Vec::new();
        classify_nearby(&mut yard, &[inside, edge.clone()], &mut events);

        assert_eq!(yard.contained.to_vec(), vec![sid("inside")]);
        assert_eq!(yard.intersecting.to_vec(), vec![sid("edge")]);
        assert_eq!(events.len(), 2);

        // "inside" drifts away out of range: only "edge" is still reported.
        let mut events = Vec::new();
        classify_nearby(&mut yard, &[edge], &mut events);
        assert!(yard.contained.is_empty());
        assert!(matches!(
            events.as_slice(),
            [Event::ContainmentChanged { containment: Containment::Outside, .. }]
        ));
    }

    #[test]
    fn host_structure_is_never_a_candidate() {
        let mut yard = yard();
        let host = structure_at("yard_c_frame", DVec3::ZERO, DVec3::splat(1.0));
        classify_nearby(&mut yard, &[host], &mut Vec::new());
        assert!(yard.contained.is_empty());
    }

    #[test]
    fn structure_leaving_volume_is_released() {
        let mut yard = yard();
        let hull = structure_at("hull", DVec3::ZERO, DVec3::splat(5.0));
        let other = structure_at("other", DVec3::new(0.0, 0.0, 20.0), DVec3::splat(5.0));
        classify_nearby(&mut yard, &[hull.clone(), other.clone()], &mut Vec::new());
        yard.start(ShipyardMode::Grinding, None, &mut Vec::new()).unwrap();

        let mut moved = hull;
        moved.bounds.center = DVec3::new(28.0, 0.0, 0.0);
        let mut events = Vec::new();
        recheck_work_set(
            &mut yard,
            &[(sid("hull"), Some(moved)), (sid("other"), Some(other))],
            &mut events,
        );

        assert_eq!(yard.work_set.to_vec(), vec![sid("other")]);
        assert!(!yard.disable_pending());
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::StructureReleased { structure, .. } if structure == &sid("hull"))));
    }

    #[test]
    fn emptied_work_set_requests_idle() {
        let mut yard = yard();
        let hull = structure_at("hull", DVec3::ZERO, DVec3::splat(5.0));
        classify_nearby(&mut yard, &[hull], &mut Vec::new());
        yard.start(ShipyardMode::Welding, None, &mut Vec::new()).unwrap();

        recheck_work_set(&mut yard, &[(sid("hull"), None)], &mut Vec::new());
        assert!(yard.work_set.is_empty());
        assert!(yard.disable_pending());
    }

    #[test]
    fn projection_only_work_set_requests_idle() {
        let mut yard = yard();
        let mut blueprint = structure_at("blueprint", DVec3::ZERO, DVec3::splat(5.0));
        blueprint.physical = false;
        classify_nearby(&mut yard, &[blueprint.clone()], &mut Vec::new());
        yard.start(ShipyardMode::Welding, None, &mut Vec::new()).unwrap();

        recheck_work_set(&mut yard, &[(sid("blueprint"), Some(blueprint))], &mut Vec::new());
        assert_eq!(yard.work_set.len(), 1);
        assert!(yard.disable_pending());
    }
}
