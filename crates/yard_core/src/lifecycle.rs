//! Mode transitions of a shipyard and the side effects attached to them.

use crate::shipyard::Shipyard;
use crate::{Event, ScanPurpose, ShipyardMode, StructureId, YardSettings};

impl Shipyard {
    /// Begin a session from Idle. The contained set becomes the work set;
    /// structures that arrive later are not part of this session.
    pub fn start(
        &mut self,
        mode: ShipyardMode,
        purpose: Option<ScanPurpose>,
        events: &mut Vec<Event>,
    ) -> Result<(), &'static str> {
        if self.mode != ShipyardMode::Idle {
            return Err("yard is not idle");
        }
        if self.disable_pending() {
            return Err("yard is shutting down");
        }
        if !matches!(
            mode,
            ShipyardMode::Welding | ShipyardMode::Grinding | ShipyardMode::Scanning
        ) {
            return Err("not a session mode");
        }

        self.work_set.clear();
        for structure in self.contained.to_vec() {
            self.work_set.stage_add(structure);
        }
        self.work_set.commit();
        self.contained.clear();
        self.intersecting.clear();
        self.pool.clear();
        self.stalled.clear();
        self.missing.clear();
        self.split_parents.clear();
        self.pending_tool_enable = mode.is_working();
        self.scan_purpose = if mode == ShipyardMode::Scanning {
            Some(purpose.unwrap_or(ScanPurpose::Grind))
        } else {
            None
        };

        let from = self.mode;
        self.mode = mode;
        events.push(Event::ModeChanged {
            yard: self.id().clone(),
            from,
            to: mode,
        });
        Ok(())
    }

    /// Flag the yard for shutdown at the next apply point. A broadcast
    /// request stays a broadcast even if a silent one follows.
    pub fn request_disable(&mut self, broadcast: bool) {
        let pending = self.pending_disable.unwrap_or(false);
        self.pending_disable = Some(pending || broadcast);
    }

    /// Apply a pending disable: drop every piece of session state. Returns
    /// true when a disable was applied.
    pub fn process_disable(&mut self, authoritative: bool, events: &mut Vec<Event>) -> bool {
        let Some(broadcast) = self.pending_disable.take() else {
            return false;
        };
        self.clear_session(events);
        if self.mode == ShipyardMode::Invalid {
            return true;
        }
        let from = self.mode;
        self.mode = ShipyardMode::Idle;
        if broadcast && authoritative && from != ShipyardMode::Idle {
            events.push(Event::ModeChanged {
                yard: self.id().clone(),
                from,
                to: ShipyardMode::Idle,
            });
        }
        true
    }

    /// Discovery reported the frame invalid. Terminal.
    pub fn invalidate(&mut self, events: &mut Vec<Event>) {
        if self.mode == ShipyardMode::Invalid {
            return;
        }
        self.clear_session(events);
        self.pending_disable = None;
        let from = self.mode;
        self.mode = ShipyardMode::Invalid;
        events.push(Event::ModeChanged {
            yard: self.id().clone(),
            from,
            to: ShipyardMode::Invalid,
        });
        events.push(Event::YardInvalidated {
            yard: self.id().clone(),
        });
    }

    fn clear_session(&mut self, events: &mut Vec<Event>) {
        for beam in self.beams.clear() {
            events.push(self.beam_clear(beam.tool, beam.slot));
        }
        self.pool.clear();
        self.contained.clear();
        self.intersecting.clear();
        self.work_set.clear();
        self.stalled.clear();
        self.missing.clear();
        self.split_parents.clear();
        self.pending_tool_enable = false;
        self.scan_purpose = None;
    }

    /// Apply new settings without touching in-progress work. Slots above a
    /// lowered beam count are released; their targets go back into the
    /// queues.
    pub fn apply_settings(&mut self, settings: YardSettings, events: &mut Vec<Event>) {
        let settings = settings.sanitized();
        for beam in self.beams.resize(settings.beam_count) {
            self.pool.requeue(beam.target);
            events.push(self.beam_clear(beam.tool, beam.slot));
        }
        self.settings = settings;
        events.push(Event::SettingsApplied {
            yard: self.id().clone(),
            settings: self.settings.clone(),
        });
    }

    /// Drop every target owned by `structure` from the pool, the queues and
    /// the beams. Returns how many targets were purged.
    pub fn release_structure(&mut self, structure: &StructureId, events: &mut Vec<Event>) -> usize {
        let purged = self.pool.purge_structure(structure);
        for id in &purged {
            self.stalled.remove(id);
            if let Some(beam) = self.beams.release_target(*id) {
                events.push(self.beam_clear(beam.tool, beam.slot));
            }
        }
        events.push(Event::StructureReleased {
            yard: self.id().clone(),
            structure: structure.clone(),
            purged_targets: purged.len(),
        });
        purged.len()
    }

    pub(crate) fn beam_clear(&self, tool: usize, slot: usize) -> Event {
        Event::BeamClear {
            yard: self.id().clone(),
            tool_index: u8::try_from(tool).unwrap_or(u8::MAX),
            slot: u8::try_from(slot).unwrap_or(u8::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::yard_record;
    use crate::TargetId;
    use glam::DVec3;

    fn idle_yard() -> Shipyard {
        Shipyard::new(
            yard_record("yard_a", DVec3::ZERO, DVec3::splat(20.0)),
            YardSettings::default(),
        )
    }

    fn structure(id: &str) -> StructureId {
        StructureId(id.to_string())
    }

    #[test]
    fn start_snapshots_contained_set() {
        let mut yard = idle_yard();
        yard.contained.stage_add(structure("hull_1"));
        yard.contained.commit();
        yard.intersecting.stage_add(structure("hull_2"));
        yard.intersecting.commit();

        let mut events = Vec::new();
        yard.start(ShipyardMode::Welding, None, &mut events).unwrap();

        assert_eq!(yard.mode, ShipyardMode::Welding);
        assert_eq!(yard.work_set.to_vec(), vec![structure("hull_1")]);
        assert!(yard.contained.is_empty());
        assert!(yard.intersecting.is_empty());
        assert!(yard.pending_tool_enable);
        assert!(matches!(
            events.as_slice(),
            [Event::ModeChanged {
                from: ShipyardMode::Idle,
                to: ShipyardMode::Welding,
                ..
            }]
        ));
    }

    #[test]
    fn later_arrivals_do_not_join_session() {
        let mut yard = idle_yard();
        yard.contained.stage_add(structure("hull_1"));
        yard.contained.commit();
        yard.start(ShipyardMode::Grinding, None, &mut Vec::new()).unwrap();

        yard.contained.stage_add(structure("late"));
        yard.contained.commit();
        assert!(!yard.work_set.contains(&structure("late")));
    }

    #[test]
    fn start_rejected_unless_idle() {
        let mut yard = idle_yard();
        yard.start(ShipyardMode::Grinding, None, &mut Vec::new()).unwrap();
        let err = yard.start(ShipyardMode::Welding, None, &mut Vec::new());
        assert!(err.is_err());
        assert_eq!(yard.mode, ShipyardMode::Grinding);
    }

    #[test]
    fn disable_waits_for_apply_point() {
        let mut yard = idle_yard();
        yard.start(ShipyardMode::Grinding, None, &mut Vec::new()).unwrap();
        yard.beams.assign(2, 0, TargetId(4));

        yard.request_disable(true);
        assert_eq!(yard.mode, ShipyardMode::Grinding, "flag only");

        let mut events = Vec::new();
        assert!(yard.process_disable(true, &mut events));
        assert_eq!(yard.mode, ShipyardMode::Idle);
        assert_eq!(yard.beams.occupied_count(), 0);
        assert!(yard.work_set.is_empty());
        assert!(events.iter().any(|e| matches!(e, Event::BeamClear { tool_index: 2, slot: 0, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::ModeChanged { to: ShipyardMode::Idle, .. })));
        assert!(!yard.process_disable(true, &mut Vec::new()), "applied once");
    }

    #[test]
    fn observer_side_disable_does_not_announce() {
        let mut yard = idle_yard();
        yard.start(ShipyardMode::Welding, None, &mut Vec::new()).unwrap();
        yard.request_disable(true);
        let mut events = Vec::new();
        yard.process_disable(false, &mut events);
        assert_eq!(yard.mode, ShipyardMode::Idle);
        assert!(!events.iter().any(|e| matches!(e, Event::ModeChanged { .. })));
    }

    #[test]
    fn invalid_is_terminal() {
        let mut yard = idle_yard();
        yard.start(ShipyardMode::Grinding, None, &mut Vec::new()).unwrap();
        yard.invalidate(&mut Vec::new());
        assert_eq!(yard.mode, ShipyardMode::Invalid);

        yard.request_disable(true);
        yard.process_disable(true, &mut Vec::new());
        assert_eq!(yard.mode, ShipyardMode::Invalid);
        assert!(yard.start(ShipyardMode::Welding, None, &mut Vec::new()).is_err());
    }

    #[test]
    fn lowering_beam_count_releases_upper_slots() {
        let mut yard = idle_yard();
        yard.beams.assign(0, 2, TargetId(1));
        yard.beams.assign(0, 0, TargetId(2));

        let mut events = Vec::new();
        let settings = YardSettings {
            beam_count: 1,
            ..YardSettings::default()
        };
        yard.apply_settings(settings, &mut events);

        assert_eq!(yard.beams.occupied_count(), 1);
        assert_eq!(yard.beams.get(0, 0), Some(TargetId(2)));
        assert!(events.iter().any(|e| matches!(e, Event::BeamClear { slot: 2, .. })));
    }

    #[test]
    fn settings_are_sanitized() {
        let mut yard = idle_yard();
        let settings = YardSettings {
            beam_count: 9,
            weld_multiplier: 40.0,
            grind_multiplier: f32::NAN,
            ..YardSettings::default()
        };
        yard.apply_settings(settings, &mut Vec::new());
        assert_eq!(yard.settings.beam_count, 3);
        assert!((yard.settings.weld_multiplier - YardSettings::MAX_MULTIPLIER).abs() < f32::EPSILON);
        assert!((yard.settings.grind_multiplier - 0.1).abs() < f32::EPSILON);
    }
}
