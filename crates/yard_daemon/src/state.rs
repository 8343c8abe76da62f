use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use yard_core::{Command, EventEnvelope, YardStatus};
use yard_world::{apply_due, MemoryWorld, Scenario, ScriptEntry};

/// Everything owned by the authoritative context.
pub struct HostState {
    pub world: MemoryWorld,
    pub script: Vec<ScriptEntry>,
    pub tick: u64,
}

impl HostState {
    pub fn from_scenario(scenario: &Scenario) -> Self {
        Self {
            world: yard_world::build_world(scenario),
            script: scenario.script.clone(),
            tick: 0,
        }
    }

    /// One host tick: scripted changes, then motion. Scripted operator
    /// commands are queued on `inbox`.
    pub fn advance(&mut self, inbox: &CommandInbox) {
        let commands = apply_due(&mut self.world, &self.script, self.tick);
        if !commands.is_empty() {
            inbox.lock().extend(commands);
        }
        self.world.advance();
        self.tick += 1;
    }
}

/// Latest published view of the registry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusBoard {
    pub tick: u64,
    pub yards: Vec<YardStatus>,
    /// One-time warnings raised by the scheduler.
    pub warnings: Vec<String>,
}

impl StatusBoard {
    pub fn has_yard(&self, id: &str) -> bool {
        self.yards.iter().any(|y| y.id.0 == id)
    }
}

pub type SharedStatus = Arc<RwLock<StatusBoard>>;
/// Operator commands waiting for the next action handler run.
pub type CommandInbox = Arc<Mutex<Vec<Command>>>;
pub type EventTx = broadcast::Sender<Vec<EventEnvelope>>;

#[derive(Clone)]
pub struct AppState {
    pub status: SharedStatus,
    pub inbox: CommandInbox,
    pub event_tx: EventTx,
    pub host_tick: Arc<AtomicU64>,
    pub ticks_per_sec: f64,
}

impl AppState {
    pub fn new(ticks_per_sec: f64) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            status: SharedStatus::default(),
            inbox: CommandInbox::default(),
            event_tx,
            host_tick: Arc::new(AtomicU64::new(0)),
            ticks_per_sec,
        }
    }
}
