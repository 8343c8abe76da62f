use std::cmp::Ordering;
use std::collections::BTreeSet;

use ahash::AHashMap;
use glam::DVec3;

use crate::world::{BlockInfo, StructureInfo};
use crate::{BlockId, BuildPattern, ShipyardMode, StructureId, TargetId, TOOL_COUNT};

/// A block queued for work. Distances are fixed at creation.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: TargetId,
    pub block: BlockId,
    pub structure: StructureId,
    pub projected: bool,
    pub position: DVec3,
    pub tool_dist_sq: [f64; TOOL_COUNT],
    /// Squared distance from each tool to the owning structure's center.
    pub structure_dist_sq: [f64; TOOL_COUNT],
    pub center_dist_sq: f64,
    pub projector_dist_sq: Option<f64>,
    pub build_time: f32,
}

impl Target {
    fn new(
        id: TargetId,
        structure: &StructureInfo,
        block: &BlockInfo,
        tools: &[DVec3; TOOL_COUNT],
    ) -> Self {
        let center = structure.bounds.center;
        Self {
            id,
            block: block.id.clone(),
            structure: block.structure.clone(),
            projected: block.projected,
            position: block.position,
            tool_dist_sq: tools.map(|t| t.distance_squared(block.position)),
            structure_dist_sq: tools.map(|t| t.distance_squared(center)),
            center_dist_sq: center.distance_squared(block.position),
            projector_dist_sq: structure
                .projector
                .map(|p| p.distance_squared(block.position)),
            build_time: block.build_time(),
        }
    }

    fn projector_or_center_sq(&self) -> f64 {
        self.projector_dist_sq.unwrap_or(self.center_dist_sq)
    }
}

/// Which blocks of a structure become targets in a given mode.
pub fn wants_block(mode: ShipyardMode, structure: &StructureInfo, block: &BlockInfo) -> bool {
    match mode {
        ShipyardMode::Grinding => structure.physical && !block.projected,
        ShipyardMode::Welding => block.projected || !block.fully_built() || block.deformed,
        _ => false,
    }
}

/// Work items of one yard plus a per-tool proximity queue over them.
#[derive(Debug, Clone, Default)]
pub struct TargetPool {
    targets: AHashMap<TargetId, Target>,
    queues: [Vec<TargetId>; TOOL_COUNT],
    /// Ordering the queues were sorted with.
    order: Option<(ShipyardMode, BuildPattern)>,
    next_id: u64,
    built: bool,
}

impl TargetPool {
    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(&id)
    }

    pub fn get_mut(&mut self, id: TargetId) -> Option<&mut Target> {
        self.targets.get_mut(&id)
    }

    /// Targets in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn queue(&self, tool: usize) -> &[TargetId] {
        &self.queues[tool]
    }

    /// Replace the pool with targets for `structures` and sort the queues.
    /// Returns the number of targets created.
    pub fn rebuild(
        &mut self,
        mode: ShipyardMode,
        pattern: BuildPattern,
        structures: &[(StructureInfo, Vec<BlockInfo>)],
        tools: &[DVec3; TOOL_COUNT],
    ) -> usize {
        self.clear();
        for (structure, blocks) in structures {
            for block in blocks.iter().filter(|b| wants_block(mode, structure, b)) {
                let id = TargetId(self.next_id);
                self.next_id += 1;
                self.targets.insert(id, Target::new(id, structure, block, tools));
            }
        }
        self.sort_queues(mode, pattern);
        self.order = Some((mode, pattern));
        self.built = true;
        self.targets.len()
    }

    fn sort_queues(&mut self, mode: ShipyardMode, pattern: BuildPattern) {
        let mut ids: Vec<TargetId> = self.targets.keys().copied().collect();
        ids.sort_unstable();
        for tool in 0..TOOL_COUNT {
            let mut queue = ids.clone();
            queue.sort_by(|a, b| {
                queue_order(mode, pattern, tool, &self.targets[a], &self.targets[b])
            });
            self.queues[tool] = queue;
        }
    }

    /// Remove a target from the pool and every queue.
    pub fn remove(&mut self, id: TargetId) -> Option<Target> {
        let target = self.targets.remove(&id)?;
        for queue in &mut self.queues {
            queue.retain(|q| *q != id);
        }
        Some(target)
    }

    /// Remove the entry at `index` of one tool's queue only.
    pub fn drop_from_queue(&mut self, tool: usize, index: usize) {
        if index < self.queues[tool].len() {
            self.queues[tool].remove(index);
        }
    }

    /// Put a live target back into every queue it was dropped from, at its
    /// sorted position. Used when a beam lets go of a target it did not
    /// finish.
    pub fn requeue(&mut self, id: TargetId) {
        let (Some((mode, pattern)), Some(target)) = (self.order, self.targets.get(&id)) else {
            return;
        };
        for (tool, queue) in self.queues.iter_mut().enumerate() {
            if queue.contains(&id) {
                continue;
            }
            let at = queue.partition_point(|queued| {
                self.targets.get(queued).is_some_and(|other| {
                    queue_order(mode, pattern, tool, other, target) == Ordering::Less
                })
            });
            queue.insert(at, id);
        }
    }

    /// Remove every target owned by `structure`. Returns the removed ids.
    pub fn purge_structure(&mut self, structure: &StructureId) -> Vec<TargetId> {
        let mut purged: Vec<TargetId> = self
            .targets
            .values()
            .filter(|t| &t.structure == structure)
            .map(|t| t.id)
            .collect();
        purged.sort_unstable();
        if purged.is_empty() {
            return purged;
        }
        let gone: BTreeSet<TargetId> = purged.iter().copied().collect();
        self.targets.retain(|id, _| !gone.contains(id));
        for queue in &mut self.queues {
            queue.retain(|q| !gone.contains(q));
        }
        purged
    }

    pub fn clear(&mut self) {
        self.targets.clear();
        for queue in &mut self.queues {
            queue.clear();
        }
        self.order = None;
        self.built = false;
    }

    /// Every id referenced by a queue is a live target.
    #[cfg(test)]
    pub fn queues_consistent(&self) -> bool {
        self.queues
            .iter()
            .flatten()
            .all(|id| self.targets.contains_key(id))
    }
}

fn queue_order(
    mode: ShipyardMode,
    pattern: BuildPattern,
    tool: usize,
    a: &Target,
    b: &Target,
) -> Ordering {
    let nearest_structure = || {
        a.structure_dist_sq[tool]
            .total_cmp(&b.structure_dist_sq[tool])
            .then_with(|| a.structure.cmp(&b.structure))
    };
    let primary = match (mode, pattern) {
        (ShipyardMode::Welding, BuildPattern::FromCenter) => {
            nearest_structure().then_with(|| a.center_dist_sq.total_cmp(&b.center_dist_sq))
        }
        (ShipyardMode::Welding, BuildPattern::FromProjector) => nearest_structure()
            .then_with(|| a.projector_or_center_sq().total_cmp(&b.projector_or_center_sq())),
        _ => a.tool_dist_sq[tool].total_cmp(&b.tool_dist_sq[tool]),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::OrientedBox;
    use crate::test_fixtures::{block_at, corner_tools, structure_at};

    fn hull() -> (StructureInfo, Vec<BlockInfo>) {
        let structure = structure_at("hull", DVec3::ZERO, DVec3::splat(10.0));
        let blocks = vec![
            block_at("b_far", "hull", DVec3::new(8.0, 8.0, 8.0)),
            block_at("b_mid", "hull", DVec3::ZERO),
            block_at("b_near", "hull", DVec3::new(-8.0, -8.0, -8.0)),
        ];
        (structure, blocks)
    }

    fn tools() -> [DVec3; TOOL_COUNT] {
        corner_tools(&OrientedBox::axis_aligned(DVec3::ZERO, DVec3::splat(20.0)))
    }

    fn block_ids(pool: &TargetPool, tool: usize) -> Vec<String> {
        pool.queue(tool)
            .iter()
            .map(|id| pool.get(*id).unwrap().block.0.clone())
            .collect()
    }

    #[test]
    fn grind_queue_sorted_by_tool_distance() {
        let mut pool = TargetPool::default();
        let count = pool.rebuild(
            ShipyardMode::Grinding,
            BuildPattern::FromCorners,
            &[hull()],
            &tools(),
        );
        assert_eq!(count, 3);
        // Tool 0 sits at the (-,-,-) corner, tool 7 at (+,+,+).
        assert_eq!(block_ids(&pool, 0), vec!["b_near", "b_mid", "b_far"]);
        assert_eq!(block_ids(&pool, 7), vec!["b_far", "b_mid", "b_near"]);
    }

    #[test]
    fn weld_skips_intact_physical_blocks() {
        let (structure, mut blocks) = hull();
        blocks[0].integrity = 4.0;
        blocks[2].deformed = true;
        let mut pool = TargetPool::default();
        pool.rebuild(
            ShipyardMode::Welding,
            BuildPattern::FromCorners,
            &[(structure, blocks)],
            &tools(),
        );
        assert_eq!(block_ids(&pool, 0), vec!["b_near", "b_far"]);
    }

    #[test]
    fn grind_ignores_projections() {
        let (mut structure, blocks) = hull();
        structure.physical = false;
        let mut pool = TargetPool::default();
        let count = pool.rebuild(
            ShipyardMode::Grinding,
            BuildPattern::FromCorners,
            &[(structure, blocks)],
            &tools(),
        );
        assert_eq!(count, 0);
        assert!(pool.is_built());
    }

    #[test]
    fn from_center_orders_by_structure_then_center() {
        let (structure, mut blocks) = hull();
        for block in &mut blocks {
            block.integrity = 0.0;
        }
        let mut pool = TargetPool::default();
        pool.rebuild(
            ShipyardMode::Welding,
            BuildPattern::FromCenter,
            &[(structure, blocks)],
            &tools(),
        );
        assert_eq!(block_ids(&pool, 0)[0], "b_mid");
        assert_eq!(block_ids(&pool, 7)[0], "b_mid");
    }

    #[test]
    fn purge_leaves_no_dangling_queue_entries() {
        let other = structure_at("other", DVec3::new(5.0, 0.0, 0.0), DVec3::splat(2.0));
        let other_blocks = vec![block_at("o_1", "other", DVec3::new(5.0, 0.0, 0.0))];
        let mut pool = TargetPool::default();
        pool.rebuild(
            ShipyardMode::Grinding,
            BuildPattern::FromCorners,
            &[hull(), (other, other_blocks)],
            &tools(),
        );

        let purged = pool.purge_structure(&StructureId("hull".to_string()));
        assert_eq!(purged.len(), 3);
        assert_eq!(pool.len(), 1);
        assert!(pool.queues_consistent());
        for tool in 0..TOOL_COUNT {
            assert_eq!(block_ids(&pool, tool), vec!["o_1"]);
        }

        let again = pool.purge_structure(&StructureId("hull".to_string()));
        assert!(again.is_empty(), "purge is idempotent");
    }

    #[test]
    fn requeue_restores_sorted_position() {
        let mut pool = TargetPool::default();
        pool.rebuild(ShipyardMode::Grinding, BuildPattern::FromCorners, &[hull()], &tools());
        let mid = pool.queue(0)[1];
        for tool in 0..TOOL_COUNT {
            let index = pool.queue(tool).iter().position(|id| *id == mid).unwrap();
            pool.drop_from_queue(tool, index);
        }
        assert!(!pool.queue(3).contains(&mid));

        pool.requeue(mid);
        pool.requeue(mid);
        assert_eq!(block_ids(&pool, 0), vec!["b_near", "b_mid", "b_far"]);
        assert_eq!(block_ids(&pool, 7), vec!["b_far", "b_mid", "b_near"]);
    }

    #[test]
    fn target_ids_not_reused_after_clear() {
        let mut pool = TargetPool::default();
        pool.rebuild(ShipyardMode::Grinding, BuildPattern::FromCorners, &[hull()], &tools());
        let first_max = pool.queue(0).iter().max().copied().unwrap();
        pool.clear();
        assert!(!pool.is_built());
        pool.rebuild(ShipyardMode::Grinding, BuildPattern::FromCorners, &[hull()], &tools());
        assert!(pool.queue(0).iter().all(|id| *id > first_max));
    }
}
