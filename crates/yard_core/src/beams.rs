use smallvec::{smallvec, SmallVec};

use crate::{TargetId, MAX_BEAMS_PER_TOOL, TOOL_COUNT};

type ToolSlots = SmallVec<[Option<TargetId>; MAX_BEAMS_PER_TOOL as usize]>;

/// Beam slots of one yard: exactly `beam_count` per tool.
#[derive(Debug, Clone)]
pub struct BeamSlots {
    tools: [ToolSlots; TOOL_COUNT],
}

/// An occupied slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beam {
    pub tool: usize,
    pub slot: usize,
    pub target: TargetId,
}

impl BeamSlots {
    pub fn new(beam_count: u8) -> Self {
        let count = usize::from(beam_count.clamp(1, MAX_BEAMS_PER_TOOL));
        Self {
            tools: std::array::from_fn(|_| smallvec![None; count]),
        }
    }

    pub fn beam_count(&self) -> usize {
        self.tools[0].len()
    }

    /// Change the per-tool slot count. Beams in removed slots are returned
    /// so the caller can announce them.
    pub fn resize(&mut self, beam_count: u8) -> Vec<Beam> {
        let count = usize::from(beam_count.clamp(1, MAX_BEAMS_PER_TOOL));
        let mut released = Vec::new();
        for (tool, slots) in self.tools.iter_mut().enumerate() {
            for (slot, held) in slots.iter().enumerate().skip(count) {
                if let Some(target) = held {
                    released.push(Beam {
                        tool,
                        slot,
                        target: *target,
                    });
                }
            }
            slots.resize(count, None);
        }
        released
    }

    pub fn get(&self, tool: usize, slot: usize) -> Option<TargetId> {
        self.tools.get(tool)?.get(slot).copied().flatten()
    }

    /// Occupy a slot. Returns false when the slot is taken or the target is
    /// already beamed anywhere in the yard.
    pub fn assign(&mut self, tool: usize, slot: usize, target: TargetId) -> bool {
        if self.holds(target) {
            return false;
        }
        let Some(cell) = self.tools.get_mut(tool).and_then(|s| s.get_mut(slot)) else {
            return false;
        };
        if cell.is_some() {
            return false;
        }
        *cell = Some(target);
        true
    }

    pub fn release(&mut self, tool: usize, slot: usize) -> Option<TargetId> {
        self.tools.get_mut(tool)?.get_mut(slot)?.take()
    }

    /// Free whichever slot holds `target`.
    pub fn release_target(&mut self, target: TargetId) -> Option<Beam> {
        let beam = self.find(target)?;
        self.release(beam.tool, beam.slot);
        Some(beam)
    }

    pub fn holds(&self, target: TargetId) -> bool {
        self.find(target).is_some()
    }

    pub fn find(&self, target: TargetId) -> Option<Beam> {
        self.occupied().find(|b| b.target == target)
    }

    /// Occupied slots in (tool, slot) order.
    pub fn occupied(&self) -> impl Iterator<Item = Beam> + '_ {
        self.tools.iter().enumerate().flat_map(|(tool, slots)| {
            slots.iter().enumerate().filter_map(move |(slot, held)| {
                held.map(|target| Beam { tool, slot, target })
            })
        })
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied().count()
    }

    pub fn on_tool(&self, tool: usize) -> impl Iterator<Item = TargetId> + '_ {
        self.tools[tool].iter().filter_map(|held| *held)
    }

    pub fn empty_slots(&self, tool: usize) -> Vec<usize> {
        self.tools[tool]
            .iter()
            .enumerate()
            .filter(|(_, held)| held.is_none())
            .map(|(slot, _)| slot)
            .collect()
    }

    pub fn clear(&mut self) -> Vec<Beam> {
        let held: Vec<Beam> = self.occupied().collect();
        for slots in &mut self.tools {
            slots.iter_mut().for_each(|s| *s = None);
        }
        held
    }
}
