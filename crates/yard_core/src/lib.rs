//! `yard_core`: deterministic shipyard automation engine.
//!
//! No IO, no clocks, no threads. The host environment is reached only
//! through the traits in [`world`].

mod assign;
mod beams;
mod containment;
mod engine;
pub mod geometry;
mod lifecycle;
mod observe;
pub mod power;
mod registry;
pub mod scan;
mod shipyard;
pub mod staged;
mod stepper;
pub mod targets;
mod types;
pub mod world;

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;

#[cfg(test)]
mod tests;

pub use beams::{Beam, BeamSlots};
pub use engine::{execute, plan, reachable_cargo, refresh_cargo, refresh_discovery, tick};
pub use observe::{observe, Observation, ObservationRequest};
pub use registry::ShipyardRegistry;
pub use shipyard::Shipyard;
pub use stepper::{efficiency, scaled};
pub use types::*;

pub(crate) fn emit(counters: &mut Counters, tick: u64, event: Event) -> EventEnvelope {
    let id = EventId(format!("evt_{:06}", counters.next_event_id));
    counters.next_event_id += 1;
    EventEnvelope { id, tick, event }
}
