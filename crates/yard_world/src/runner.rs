use yard_core::{CommandEnvelope, EventEnvelope, ShipyardRegistry};

use crate::host::MemoryWorld;
use crate::scenario::{Scenario, ScriptEntry};
use crate::script::apply_due;
use crate::{build_registry, build_world};

/// Single-threaded driver: discovery, cargo refresh, script and engine tick
/// on one clock. Used by the CLI and by tests that do not need the
/// scheduler.
pub struct ScenarioRun {
    pub world: MemoryWorld,
    pub registry: ShipyardRegistry,
    pub script: Vec<ScriptEntry>,
    /// Ticks between discovery polls. Zero polls only at tick 0.
    pub discovery_every: u64,
    /// Ticks between cargo connectivity refreshes. Zero refreshes only at tick 0.
    pub cargo_every: u64,
}

fn due(tick: u64, every: u64) -> bool {
    if every == 0 {
        tick == 0
    } else {
        tick % every == 0
    }
}

impl ScenarioRun {
    pub fn new(scenario: &Scenario) -> Self {
        Self {
            world: build_world(scenario),
            registry: build_registry(scenario, true),
            script: scenario.script.clone(),
            discovery_every: 10,
            cargo_every: 10,
        }
    }

    pub fn tick(&self) -> u64 {
        self.registry.tick
    }

    /// Advance one tick, with `extra` commands applied after the scripted ones.
    pub fn step_with(&mut self, extra: Vec<CommandEnvelope>) -> Vec<EventEnvelope> {
        let tick = self.registry.tick;
        let mut events = Vec::new();
        if due(tick, self.discovery_every) {
            events.extend(yard_core::refresh_discovery(&mut self.registry, &mut self.world));
        }
        if due(tick, self.cargo_every) {
            yard_core::refresh_cargo(&mut self.registry, &self.world);
        }
        let mut commands: Vec<CommandEnvelope> = apply_due(&mut self.world, &self.script, tick)
            .into_iter()
            .map(|command| self.registry.next_command(command))
            .collect();
        commands.extend(extra);
        events.extend(yard_core::tick(&mut self.registry, &mut self.world, &commands));
        self.world.advance();
        events
    }

    pub fn step(&mut self) -> Vec<EventEnvelope> {
        self.step_with(Vec::new())
    }

    /// Run `ticks` ticks and collect every event.
    pub fn run(&mut self, ticks: u64) -> Vec<EventEnvelope> {
        let mut events = Vec::new();
        for _ in 0..ticks {
            events.extend(self.step());
        }
        events
    }
}
