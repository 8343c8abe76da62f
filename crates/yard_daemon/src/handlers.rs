//! The daemon's scheduled handlers.
//!
//! Each handler computes in the background and reaches the host world only
//! through batched hand-offs, one closure per mutation section.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use yard_core::world::{Discovery, World};
use yard_core::{
    execute, observe, plan, power, reachable_cargo, Command, CommandEnvelope, Event,
    EventEnvelope, ObservationRequest, Shipyard, ShipyardRegistry, YardId,
};

use crate::authority::AuthorityHandle;
use crate::config::SchedulerConfig;
use crate::scheduler::{Affinity, Handler, Registrar};
use crate::state::{AppState, HostState};

/// State shared by every handler, moved with each unit of work.
pub struct HandlerContext {
    pub registry: ShipyardRegistry,
    pub authority: AuthorityHandle<HostState>,
    pub app: AppState,
}

impl HandlerContext {
    /// Stamp, log and broadcast events.
    fn publish(&mut self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let envelopes = self.registry.envelope(events);
        log_events(&envelopes);
        // No subscribers is fine.
        let _ = self.app.event_tx.send(envelopes);
    }
}

fn log_events(events: &[EventEnvelope]) {
    for envelope in events {
        let yard = &envelope.event.yard().0;
        match &envelope.event {
            Event::YardRegistered { .. } => tracing::info!(yard = %yard, "yard registered"),
            Event::YardInvalidated { .. } => tracing::warn!(yard = %yard, "yard invalidated"),
            Event::ModeChanged { from, to, .. } => {
                tracing::info!(yard = %yard, ?from, ?to, "mode changed");
            }
            Event::CommandRejected { reason, .. } => {
                tracing::warn!(yard = %yard, reason = %reason, "command rejected");
            }
            Event::ScanCompleted { report, .. } => tracing::info!(
                yard = %yard,
                blocks = report.blocks,
                estimated_secs = report.estimated_secs,
                "scan completed"
            ),
            Event::TargetStalled { block, .. } => {
                tracing::debug!(yard = %yard, block = %block.0, "target stalled");
            }
            Event::ToolOverflow {
                tool, item, count, ..
            } => tracing::warn!(
                yard = %yard,
                tool = %tool.0,
                item = %item.0,
                count,
                "tool full, items offloaded"
            ),
            other => tracing::trace!(event = ?other),
        }
    }
}

/// Register the four standard handlers.
pub fn register_defaults(registrar: &Registrar, config: &SchedulerConfig) {
    registrar.register(DiscoveryHandler {
        interval: Duration::from_millis(config.discovery_interval_ms),
    });
    registrar.register(CargoCacheHandler {
        interval: Duration::from_millis(config.cargo_interval_ms),
    });
    registrar.register(ShipyardActionHandler {
        interval: Duration::from_millis(config.action_interval_ms),
    });
    registrar.register(StatusPublishHandler {
        interval: Duration::from_millis(config.status_interval_ms),
    });
}

// ---------------------------------------------------------------------------
// Shipyard action
// ---------------------------------------------------------------------------

/// Applies queued commands, then runs observe, plan and execute for every
/// yard.
pub struct ShipyardActionHandler {
    pub interval: Duration,
}

impl Handler for ShipyardActionHandler {
    fn name(&self) -> &'static str {
        "shipyard_action"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn affinity(&self) -> Affinity {
        Affinity::Authoritative
    }

    fn priority(&self) -> i32 {
        20
    }

    fn handle(&mut self, ctx: &mut HandlerContext) -> anyhow::Result<()> {
        // Whatever was produced before a failed hand-off still goes out.
        let mut events = Vec::new();
        let result = act(ctx, &mut events);
        ctx.publish(events);
        result
    }
}

fn act(ctx: &mut HandlerContext, events: &mut Vec<Event>) -> anyhow::Result<()> {
    let queued: Vec<Command> = std::mem::take(&mut *ctx.app.inbox.lock());
    let commands: Vec<CommandEnvelope> = queued
        .into_iter()
        .map(|command| ctx.registry.next_command(command))
        .collect();
    events.extend(ctx.registry.apply_commands(&commands));

    let (splits, tick) = ctx
        .authority
        .run(|host| (host.world.take_splits(), host.tick))?;
    ctx.registry.tick = tick;
    events.extend(ctx.registry.route_splits(&splits));

    let ids = ctx.registry.yard_ids();
    let requests: Vec<ObservationRequest> = ctx
        .registry
        .yards()
        .map(Shipyard::observation_request)
        .collect();
    if requests.is_empty() {
        return Ok(());
    }
    let observations = ctx.authority.run(move |host| {
        requests
            .iter()
            .map(|request| observe(&host.world, request))
            .collect::<Vec<_>>()
    })?;

    for (id, observation) in ids.iter().zip(&observations) {
        if let Some(yard) = ctx.registry.get_mut(id) {
            plan(yard, observation, events);
        }
    }

    // Yards travel to the authority and back; they are restored even if
    // the hand-off fails.
    let batch: Arc<Mutex<Vec<Shipyard>>> = Arc::new(Mutex::new(
        ids.iter().filter_map(|id| ctx.registry.take(id)).collect(),
    ));
    let shared = Arc::clone(&batch);
    let authoritative = ctx.registry.is_authoritative();
    let executed = ctx.authority.run(move |host| {
        let mut events = Vec::new();
        for yard in shared.lock().iter_mut() {
            execute(yard, &mut host.world, authoritative, &mut events);
        }
        events
    });
    for yard in std::mem::take(&mut *batch.lock()) {
        ctx.registry.restore(yard);
    }
    events.extend(executed?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Cargo connectivity cache
// ---------------------------------------------------------------------------

/// Refreshes each yard's reachable cargo inventories.
pub struct CargoCacheHandler {
    pub interval: Duration,
}

impl Handler for CargoCacheHandler {
    fn name(&self) -> &'static str {
        "cargo_cache"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn affinity(&self) -> Affinity {
        Affinity::Authoritative
    }

    fn priority(&self) -> i32 {
        10
    }

    fn handle(&mut self, ctx: &mut HandlerContext) -> anyhow::Result<()> {
        let tools: Vec<(YardId, Vec<_>)> = ctx
            .registry
            .yards()
            .map(|yard| (yard.id().clone(), yard.record.tools.to_vec()))
            .collect();
        if tools.is_empty() {
            return Ok(());
        }
        let reachable = ctx.authority.run(move |host| {
            tools
                .into_iter()
                .map(|(id, tools)| (id, reachable_cargo(&host.world, &tools)))
                .collect::<Vec<_>>()
        })?;
        for (id, inventories) in reachable {
            ctx.registry.stage_cargo(&id, inventories);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Registers newly validated yards and retires invalid ones.
pub struct DiscoveryHandler {
    pub interval: Duration,
}

impl Handler for DiscoveryHandler {
    fn name(&self) -> &'static str {
        "discovery"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn handle(&mut self, ctx: &mut HandlerContext) -> anyhow::Result<()> {
        let (records, valid) = ctx.authority.run(|host| {
            let records = host.world.validated_yards();
            let valid: BTreeSet<YardId> = host
                .world
                .yards
                .keys()
                .filter(|id| host.world.yard_valid(id))
                .cloned()
                .collect();
            (records, valid)
        })?;

        let (mut events, invalidated) = ctx
            .registry
            .sync_discovery(records, |id| valid.contains(id));
        let pushed = if invalidated.is_empty() {
            Ok(Vec::new())
        } else {
            ctx.authority.run(move |host| {
                let mut events = Vec::new();
                for mut yard in invalidated {
                    power::push(&mut yard, &mut host.world, &mut events);
                }
                events
            })
        };
        let result = pushed.map(|idle| events.extend(idle));
        ctx.publish(events);
        result.map_err(anyhow::Error::from)
    }
}

// ---------------------------------------------------------------------------
// Status publishing
// ---------------------------------------------------------------------------

/// Copies every yard's status onto the board the HTTP surface reads.
pub struct StatusPublishHandler {
    pub interval: Duration,
}

impl Handler for StatusPublishHandler {
    fn name(&self) -> &'static str {
        "status_publish"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn affinity(&self) -> Affinity {
        Affinity::Observer
    }

    fn priority(&self) -> i32 {
        30
    }

    fn handle(&mut self, ctx: &mut HandlerContext) -> anyhow::Result<()> {
        let yards = ctx.registry.statuses();
        let mut board = ctx.app.status.write();
        board.tick = ctx.registry.tick;
        board.yards = yards;
        Ok(())
    }
}
