//! Tick budget scheduler.
//!
//! Handlers run on a background unit of work, one unit in flight at a time.
//! Each unit visits the handlers in priority order, skipping those that are
//! not due or not eligible for this process, and stops once the wall-clock
//! budget is spent. The next unit resumes where the previous one stopped.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::SchedulerConfig;
use crate::handlers::HandlerContext;

/// Which side of a split deployment a handler runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Authoritative,
    Observer,
    Both,
}

impl Affinity {
    fn eligible(self, authoritative: bool, observer: bool) -> bool {
        match self {
            Affinity::Authoritative => authoritative,
            Affinity::Observer => observer,
            Affinity::Both => authoritative || observer,
        }
    }
}

pub trait Handler: Send {
    fn name(&self) -> &'static str;

    /// Minimum time between two runs.
    fn interval(&self) -> Duration;

    fn affinity(&self) -> Affinity {
        Affinity::Both
    }

    /// Lower runs first.
    fn priority(&self) -> i32 {
        0
    }

    fn handle(&mut self, ctx: &mut HandlerContext) -> anyhow::Result<()>;
}

/// A handler that returned an error or panicked.
#[derive(Debug)]
pub struct HandlerFault {
    pub handler: &'static str,
    pub error: anyhow::Error,
}

impl fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler '{}' failed: {:#}", self.handler, self.error)
    }
}

impl std::error::Error for HandlerFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Units of work
// ---------------------------------------------------------------------------

struct Slot {
    handler: Box<dyn Handler>,
    last_run: Option<Instant>,
}

impl Slot {
    fn due(&self, now: Instant) -> bool {
        self.last_run
            .map_or(true, |last| now.duration_since(last) >= self.handler.interval())
    }
}

/// Everything a unit needs; moved onto the blocking pool and back.
struct Unit {
    slots: Vec<Slot>,
    context: HandlerContext,
    cursor: usize,
}

struct UnitOutcome {
    unit: Unit,
    fault: Option<HandlerFault>,
}

#[derive(Clone, Copy)]
struct UnitLimits {
    budget: Duration,
    authoritative: bool,
    observer: bool,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn run_unit(mut unit: Unit, limits: UnitLimits) -> UnitOutcome {
    let started = Instant::now();
    let count = unit.slots.len();
    let mut index = if unit.cursor < count { unit.cursor } else { 0 };
    let mut fault = None;

    for _ in 0..count {
        if started.elapsed() > limits.budget {
            break;
        }
        let slot = &mut unit.slots[index];
        let current = index;
        index = (index + 1) % count;

        let now = Instant::now();
        let eligible = slot
            .handler
            .affinity()
            .eligible(limits.authoritative, limits.observer);
        if !eligible || !slot.due(now) {
            continue;
        }
        slot.last_run = Some(now);
        let handler = slot.handler.name();
        let context = &mut unit.context;
        let result = catch_unwind(AssertUnwindSafe(|| slot.handler.handle(context)));
        let error = match result {
            Ok(Ok(())) => continue,
            Ok(Err(error)) => error,
            Err(payload) => anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref())),
        };
        fault = Some(HandlerFault { handler, error });
        // Remaining handlers are skipped; the next unit starts after the
        // faulted one.
        index = (current + 1) % count;
        break;
    }

    unit.cursor = index;
    UnitOutcome { unit, fault }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

type PendingHandlers = Arc<Mutex<Vec<Box<dyn Handler>>>>;

/// Cloneable registration point. Handlers registered here are merged at the
/// start of the next unit.
#[derive(Clone, Default)]
pub struct Registrar {
    pending: PendingHandlers,
}

impl Registrar {
    pub fn register(&self, handler: impl Handler + 'static) {
        self.pending.lock().push(Box::new(handler));
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    registrar: Registrar,
    /// Present while no unit is in flight.
    parked: Option<Unit>,
    in_flight: Option<JoinHandle<UnitOutcome>>,
    warned: bool,
    units_started: u64,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, context: HandlerContext) -> Self {
        Self {
            config,
            registrar: Registrar::default(),
            parked: Some(Unit {
                slots: Vec::new(),
                context,
                cursor: 0,
            }),
            in_flight: None,
            warned: false,
            units_started: 0,
        }
    }

    pub fn registrar(&self) -> Registrar {
        self.registrar.clone()
    }

    #[cfg(test)]
    pub fn register(&self, handler: impl Handler + 'static) {
        self.registrar.register(handler);
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    #[cfg(test)]
    pub fn units_started(&self) -> u64 {
        self.units_started
    }

    /// Context of the parked scheduler. `None` while a unit is in flight.
    #[cfg(test)]
    pub fn context(&self) -> Option<&HandlerContext> {
        self.parked.as_ref().map(|unit| &unit.context)
    }

    /// Collect a finished unit, if any. Fails only when a fault must be
    /// re-raised (debug mode) or the unit itself could not be joined.
    pub async fn collect(&mut self) -> anyhow::Result<()> {
        let finished = self.in_flight.as_ref().is_some_and(JoinHandle::is_finished);
        if !finished {
            return Ok(());
        }
        let Some(handle) = self.in_flight.take() else {
            return Ok(());
        };
        let outcome = handle.await.context("scheduler unit was lost")?;
        let mut unit = outcome.unit;
        let result = match outcome.fault {
            Some(fault) => self.report(fault, &mut unit),
            None => Ok(()),
        };
        self.parked = Some(unit);
        result
    }

    /// Collect the previous unit and start the next one when none is in
    /// flight and some handler is due.
    pub async fn poll(&mut self) -> anyhow::Result<()> {
        self.collect().await?;
        if self.in_flight.is_some() {
            return Ok(());
        }
        let Some(mut unit) = self.parked.take() else {
            return Ok(());
        };
        self.merge(&mut unit);

        let now = Instant::now();
        let any_due = unit.slots.iter().any(|slot| {
            slot.handler
                .affinity()
                .eligible(self.config.authoritative, self.config.observer)
                && slot.due(now)
        });
        if !any_due {
            self.parked = Some(unit);
            return Ok(());
        }

        let limits = UnitLimits {
            budget: self.config.budget(),
            authoritative: self.config.authoritative,
            observer: self.config.observer,
        };
        self.units_started += 1;
        tracing::trace!(unit = self.units_started, handlers = unit.slots.len(), "unit started");
        self.in_flight = Some(tokio::task::spawn_blocking(move || run_unit(unit, limits)));
        Ok(())
    }

    fn merge(&self, unit: &mut Unit) {
        let added: Vec<Box<dyn Handler>> = std::mem::take(&mut *self.registrar.pending.lock());
        if added.is_empty() {
            return;
        }
        for handler in added {
            tracing::debug!(handler = handler.name(), "handler registered");
            unit.slots.push(Slot {
                handler,
                last_run: None,
            });
        }
        unit.slots.sort_by_key(|slot| slot.handler.priority());
        unit.cursor = 0;
    }

    fn report(&mut self, fault: HandlerFault, unit: &mut Unit) -> anyhow::Result<()> {
        tracing::error!(
            handler = fault.handler,
            error = %format!("{:#}", fault.error),
            "handler failed, remaining handlers skipped"
        );
        if !self.warned {
            self.warned = true;
            let warning = fault.to_string();
            tracing::warn!("{warning}; further failures are only logged");
            unit.context.app.status.write().warnings.push(warning);
        }
        if self.config.debug {
            return Err(fault.into());
        }
        Ok(())
    }
}
