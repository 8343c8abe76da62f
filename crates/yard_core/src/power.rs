//! Derived power draw of a yard's tools.
//!
//! Beam draw is not capped, unlike beam efficiency which has a floor, so a
//! far target costs more than it yields.

use crate::shipyard::Shipyard;
use crate::world::World;
use crate::{
    Event, ShipyardMode, BEAM_BASE_POWER_KW, BEAM_DISTANCE_POWER_KW, EFFICIENCY_FALLOFF_SQ,
    IDLE_POWER_KW, TOOL_COUNT,
};

const PUSH_EPSILON_KW: f32 = 1e-3;

/// Last computed draw per tool and the yard's theoretical maximum.
#[derive(Debug, Clone, Default)]
pub struct PowerState {
    pub tools_kw: [f32; TOOL_COUNT],
    pub max_kw: f32,
    pushed: bool,
}

/// Draw of one beam working at squared distance `dist_sq`.
#[allow(clippy::cast_possible_truncation)]
pub fn beam_power_kw(dist_sq: f64, multiplier: f32) -> f32 {
    let reach = (dist_sq / EFFICIENCY_FALLOFF_SQ) as f32;
    BEAM_BASE_POWER_KW + BEAM_DISTANCE_POWER_KW * multiplier * reach
}

fn mobility_factor(yard: &Shipyard) -> f32 {
    if yard.record.mobile {
        2.0
    } else {
        1.0
    }
}

/// Instantaneous draw of every tool.
pub fn tool_power(yard: &Shipyard) -> [f32; TOOL_COUNT] {
    if yard.mode == ShipyardMode::Invalid {
        return [IDLE_POWER_KW; TOOL_COUNT];
    }
    let multiplier = yard.settings.multiplier(yard.mode);
    let factor = mobility_factor(yard);
    std::array::from_fn(|tool| {
        let beams: f32 = yard
            .beams
            .on_tool(tool)
            .filter_map(|id| yard.pool.get(id))
            .map(|target| beam_power_kw(target.tool_dist_sq[tool], multiplier))
            .sum();
        (IDLE_POWER_KW + beams) * factor
    })
}

/// Draw of one tool with every beam working at the far corner.
pub fn max_tool_power(yard: &Shipyard) -> f32 {
    if yard.mode == ShipyardMode::Invalid {
        return IDLE_POWER_KW;
    }
    let multiplier = yard.settings.multiplier(yard.mode);
    let beam = beam_power_kw(yard.bounds.diagonal_sq(), multiplier);
    (IDLE_POWER_KW + f32::from(yard.settings.beam_count) * beam) * mobility_factor(yard)
}

/// Recompute and push to the host every tool whose draw changed.
pub fn push<W: World>(yard: &mut Shipyard, world: &mut W, events: &mut Vec<Event>) {
    let tools = tool_power(yard);
    let max_kw = max_tool_power(yard);
    let max_changed = !yard.power.pushed || (max_kw - yard.power.max_kw).abs() > PUSH_EPSILON_KW;

    for (index, current_kw) in tools.iter().copied().enumerate() {
        let changed = (current_kw - yard.power.tools_kw[index]).abs() > PUSH_EPSILON_KW;
        if !(changed || max_changed) {
            continue;
        }
        let tool = yard.record.tools[index].clone();
        world.set_tool_power(&tool, current_kw, max_kw);
        events.push(Event::ToolPower {
            yard: yard.id().clone(),
            tool,
            current_kw,
            max_kw,
        });
    }

    yard.power.tools_kw = tools;
    yard.power.max_kw = max_kw;
    yard.power.pushed = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::TargetPool;
    use crate::test_fixtures::{block_at, structure_at, yard_record};
    use crate::{BuildPattern, YardSettings};
    use glam::DVec3;

    fn yard_with_pool(mobile: bool) -> Shipyard {
        let mut record = yard_record("yard_p", DVec3::ZERO, DVec3::splat(100.0));
        record.mobile = mobile;
        let mut yard = Shipyard::new(record, YardSettings::default());
        let structure = structure_at("hull", DVec3::ZERO, DVec3::splat(50.0));
        let blocks = vec![
            block_at("near", "hull", DVec3::splat(-90.0)),
            block_at("far", "hull", DVec3::splat(90.0)),
        ];
        let mut pool = TargetPool::default();
        pool.rebuild(
            ShipyardMode::Grinding,
            BuildPattern::FromCorners,
            &[(structure, blocks)],
            &yard.tool_positions,
        );
        yard.pool = pool;
        yard.mode = ShipyardMode::Grinding;
        yard
    }

    fn target_for(yard: &Shipyard, block: &str) -> crate::TargetId {
        yard.pool
            .queue(0)
            .iter()
            .copied()
            .find(|id| yard.pool.get(*id).unwrap().block.0 == block)
            .unwrap()
    }

    #[test]
    fn idle_tools_draw_idle_power() {
        let yard = yard_with_pool(false);
        for kw in tool_power(&yard) {
            assert!((kw - IDLE_POWER_KW).abs() < 1e-6);
        }
    }

    #[test]
    fn farther_target_costs_strictly_more() {
        let mut near = yard_with_pool(false);
        let id = target_for(&near, "near");
        near.beams.assign(0, 0, id);

        let mut far = yard_with_pool(false);
        let id = target_for(&far, "far");
        far.beams.assign(0, 0, id);

        assert!(tool_power(&far)[0] > tool_power(&near)[0]);
    }

    #[test]
    fn beam_power_matches_formula() {
        // 30 + 300 * 0.1 * 50000 / 200000 = 37.5
        assert!((beam_power_kw(50_000.0, 0.1) - 37.5).abs() < 1e-4);
        // Not capped past the efficiency floor.
        assert!(beam_power_kw(400_000.0, 1.0) > beam_power_kw(200_000.0, 1.0));
    }

    #[test]
    fn mobile_yard_doubles_draw() {
        let fixed = yard_with_pool(false);
        let mobile = yard_with_pool(true);
        assert!((tool_power(&mobile)[3] - 2.0 * tool_power(&fixed)[3]).abs() < 1e-4);
        assert!((max_tool_power(&mobile) - 2.0 * max_tool_power(&fixed)).abs() < 1e-3);
    }

    #[test]
    fn max_power_uses_diagonal_and_worse_multiplier_when_idle() {
        let mut yard = yard_with_pool(false);
        yard.mode = ShipyardMode::Idle;
        yard.settings.weld_multiplier = 0.5;
        yard.settings.grind_multiplier = 0.2;
        let diagonal_sq = yard.bounds.diagonal_sq();
        let expected = IDLE_POWER_KW + 3.0 * beam_power_kw(diagonal_sq, 0.5);
        assert!((max_tool_power(&yard) - expected).abs() < 1e-3);
    }

    #[test]
    fn invalid_yard_reports_idle_draw() {
        let mut yard = yard_with_pool(true);
        yard.invalidate(&mut Vec::new());
        assert!((max_tool_power(&yard) - IDLE_POWER_KW).abs() < 1e-6);
        assert!(tool_power(&yard).iter().all(|kw| (kw - IDLE_POWER_KW).abs() < 1e-6));
    }
}
