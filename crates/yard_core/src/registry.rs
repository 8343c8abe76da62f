use std::collections::BTreeMap;

use crate::shipyard::Shipyard;
use crate::world::{ShipyardRecord, SplitEvent};
use crate::{
    emit, Command, CommandEnvelope, CommandId, Counters, Event, EventEnvelope, InventoryId,
    ShipyardMode, YardId, YardSettings, YardStatus,
};

/// Every known shipyard plus the counters shared by their events.
#[derive(Debug, Clone)]
pub struct ShipyardRegistry {
    yards: BTreeMap<YardId, Shipyard>,
    /// Settings applied when a yard is (re)registered.
    stored_settings: BTreeMap<YardId, YardSettings>,
    pub counters: Counters,
    pub tick: u64,
    authoritative: bool,
}

impl ShipyardRegistry {
    pub fn new(authoritative: bool) -> Self {
        Self {
            yards: BTreeMap::new(),
            stored_settings: BTreeMap::new(),
            counters: Counters::default(),
            tick: 0,
            authoritative,
        }
    }

    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    pub fn len(&self) -> usize {
        self.yards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.yards.is_empty()
    }

    pub fn get(&self, id: &YardId) -> Option<&Shipyard> {
        self.yards.get(id)
    }

    pub fn get_mut(&mut self, id: &YardId) -> Option<&mut Shipyard> {
        self.yards.get_mut(id)
    }

    pub fn yards(&self) -> impl Iterator<Item = &Shipyard> {
        self.yards.values()
    }

    pub fn yards_mut(&mut self) -> impl Iterator<Item = &mut Shipyard> {
        self.yards.values_mut()
    }

    /// Yard ids in deterministic order.
    pub fn yard_ids(&self) -> Vec<YardId> {
        self.yards.keys().cloned().collect()
    }

    /// Move a yard out, e.g. into a closure that runs elsewhere.
    pub fn take(&mut self, id: &YardId) -> Option<Shipyard> {
        self.yards.remove(id)
    }

    pub fn restore(&mut self, yard: Shipyard) {
        self.yards.insert(yard.id().clone(), yard);
    }

    pub fn store_settings(&mut self, id: YardId, settings: YardSettings) {
        self.stored_settings.insert(id, settings.sanitized());
    }

    /// Register a validated yard. Known yards are left untouched.
    pub fn register(&mut self, record: ShipyardRecord) -> Option<Event> {
        if self.yards.contains_key(&record.id) {
            return None;
        }
        let settings = self
            .stored_settings
            .get(&record.id)
            .cloned()
            .unwrap_or_default();
        let id = record.id.clone();
        self.yards.insert(id.clone(), Shipyard::new(record, settings));
        Some(Event::YardRegistered { yard: id })
    }

    /// Register new records and invalidate yards discovery no longer
    /// vouches for. Invalidated yards are removed and handed back so the
    /// caller can reset their tools.
    pub fn sync_discovery(
        &mut self,
        records: Vec<ShipyardRecord>,
        is_valid: impl Fn(&YardId) -> bool,
    ) -> (Vec<Event>, Vec<Shipyard>) {
        let mut events = Vec::new();
        let mut invalidated = Vec::new();
        for id in self.yard_ids() {
            if is_valid(&id) {
                continue;
            }
            if let Some(mut yard) = self.yards.remove(&id) {
                yard.invalidate(&mut events);
                invalidated.push(yard);
            }
        }
        for record in records {
            if !is_valid(&record.id) {
                continue;
            }
            if let Some(event) = self.register(record) {
                events.push(event);
            }
        }
        (events, invalidated)
    }

    pub fn stage_cargo(&mut self, id: &YardId, inventories: Vec<InventoryId>) {
        if let Some(yard) = self.yards.get_mut(id) {
            yard.stage_cargo(inventories);
        }
    }

    /// Apply operator commands in order. Commands that do not fit the
    /// yard's current mode are rejected with an event.
    pub fn apply_commands(&mut self, commands: &[CommandEnvelope]) -> Vec<Event> {
        let mut events = Vec::new();
        for envelope in commands {
            let command = &envelope.command;
            let yard_id = command.yard().clone();
            if let Command::UpdateSettings { settings, .. } = command {
                self.store_settings(yard_id.clone(), settings.clone());
            }
            let Some(yard) = self.yards.get_mut(&yard_id) else {
                continue;
            };
            let result = match command {
                Command::StartWeld { .. } => yard.start(ShipyardMode::Welding, None, &mut events),
                Command::StartGrind { .. } => yard.start(ShipyardMode::Grinding, None, &mut events),
                Command::Scan { purpose, .. } => {
                    yard.start(ShipyardMode::Scanning, Some(*purpose), &mut events)
                }
                Command::Stop { .. } => {
                    if matches!(yard.mode, ShipyardMode::Idle | ShipyardMode::Invalid) {
                        Err("yard is not working")
                    } else {
                        yard.request_disable(true);
                        Ok(())
                    }
                }
                Command::UpdateSettings { settings, .. } => {
                    if yard.mode == ShipyardMode::Invalid {
                        Err("yard is invalid")
                    } else {
                        yard.apply_settings(settings.clone(), &mut events);
                        Ok(())
                    }
                }
            };
            if let Err(reason) = result {
                events.push(Event::CommandRejected {
                    yard: yard_id,
                    reason: reason.to_string(),
                });
            }
        }
        events
    }

    /// Hand each split to the working yard whose session holds the parent.
    pub fn route_splits(&mut self, splits: &[SplitEvent]) -> Vec<Event> {
        let mut events = Vec::new();
        for split in splits {
            let Some(yard) = self
                .yards
                .values_mut()
                .find(|y| y.mode.is_working() && y.work_set.contains(&split.from))
            else {
                continue;
            };
            yard.work_set.stage_add(split.into.clone());
            yard.split_parents.insert(split.from.clone());
            events.push(Event::StructureAdopted {
                yard: yard.id().clone(),
                from: split.from.clone(),
                structure: split.into.clone(),
            });
        }
        events
    }

    pub fn statuses(&self) -> Vec<YardStatus> {
        self.yards.values().map(Shipyard::status).collect()
    }

    /// Wrap events with ids and the current tick.
    pub fn envelope(&mut self, events: Vec<Event>) -> Vec<EventEnvelope> {
        let tick = self.tick;
        events
            .into_iter()
            .map(|event| emit(&mut self.counters, tick, event))
            .collect()
    }

    pub fn next_command(&mut self, command: Command) -> CommandEnvelope {
        let id = CommandId(format!("cmd_{:06}", self.counters.next_command_id));
        self.counters.next_command_id += 1;
        CommandEnvelope {
            id,
            issued_tick: self.tick,
            command,
        }
    }
}

