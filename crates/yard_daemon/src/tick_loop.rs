use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::authority::AuthorityInbox;
use crate::scheduler::Scheduler;
use crate::state::{AppState, HostState};

/// The authoritative context: advances the host, serves hand-offs between
/// ticks and drives the scheduler. Returns the host once `max_ticks` is
/// reached and the last unit of work has finished.
pub async fn run_tick_loop(
    mut host: HostState,
    mut inbox: AuthorityInbox<HostState>,
    mut scheduler: Scheduler,
    app: AppState,
    max_ticks: Option<u64>,
) -> anyhow::Result<HostState> {
    let mut interval = if app.ticks_per_sec > 0.0 {
        let mut iv = tokio::time::interval(Duration::from_secs_f64(1.0 / app.ticks_per_sec));
        iv.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
        Some(iv)
    } else {
        None
    };

    loop {
        host.advance(&app.inbox);
        app.host_tick.store(host.tick, Ordering::Relaxed);
        scheduler.poll().await?;

        if max_ticks.is_some_and(|max| host.tick >= max) {
            break;
        }

        if let Some(ref mut iv) = interval {
            loop {
                tokio::select! {
                    _ = iv.tick() => break,
                    Some(job) = inbox.recv() => AuthorityInbox::execute(job, &mut host),
                }
            }
        } else {
            inbox.pump(&mut host);
            tokio::task::yield_now().await;
        }
    }

    // Let the outstanding unit finish; it may still need the authority.
    while scheduler.is_busy() {
        inbox.pump(&mut host);
        tokio::time::sleep(Duration::from_millis(1)).await;
        scheduler.collect().await?;
    }
    Ok(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority;
    use crate::config::SchedulerConfig;
    use crate::handlers::{register_defaults, HandlerContext};
    use tokio::sync::broadcast::error::TryRecvError;
    use yard_core::{Command, Event, EventEnvelope, ShipyardMode, YardId};

    fn dock() -> yard_world::Scenario {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../content/scenario_dock.json");
        yard_world::load_scenario(&path).unwrap()
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            budget_ms: 50,
            action_interval_ms: 5,
            cargo_interval_ms: 20,
            discovery_interval_ms: 20,
            status_interval_ms: 5,
            ..SchedulerConfig::default()
        }
    }

    async fn run(
        scenario: &yard_world::Scenario,
        ticks: u64,
        queued: Vec<Command>,
    ) -> (HostState, AppState, Vec<EventEnvelope>) {
        let config = fast_config();
        let app = AppState::new(500.0);
        app.inbox.lock().extend(queued);
        let mut rx = app.event_tx.subscribe();
        let (handle, inbox) = authority::channel();
        let context = HandlerContext {
            registry: yard_world::build_registry(scenario, true),
            authority: handle,
            app: app.clone(),
        };
        let scheduler = Scheduler::new(config.clone(), context);
        register_defaults(&scheduler.registrar(), &config);

        let host = run_tick_loop(
            HostState::from_scenario(scenario),
            inbox,
            scheduler,
            app.clone(),
            Some(ticks),
        )
        .await
        .unwrap();

        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(batch) => events.extend(batch),
                Err(TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
        (host, app, events)
    }

    #[tokio::test]
    async fn scripted_weld_reaches_the_yard() {
        let (host, app, events) = run(&dock(), 300, Vec::new()).await;
        assert_eq!(host.tick, 300);

        assert!(events
            .iter()
            .any(|e| matches!(&e.event, Event::YardRegistered { yard } if yard.0 == "yard_alpha")));
        assert!(events.iter().any(|e| matches!(
            e.event,
            Event::ModeChanged {
                to: ShipyardMode::Welding,
                ..
            }
        )));
        assert!(app.status.read().has_yard("yard_alpha"));
    }

    #[tokio::test]
    async fn queued_commands_reach_the_registry() {
        let mut scenario = dock();
        scenario.script.clear();
        let stop = Command::Stop {
            yard: YardId("yard_alpha".to_string()),
        };
        let (_host, app, events) = run(&scenario, 50, vec![stop]).await;

        assert!(app.inbox.lock().is_empty());
        // Discovery runs first, so the yard exists but is idle.
        assert!(events.iter().any(|e| matches!(
            &e.event,
            Event::CommandRejected { reason, .. } if reason == "yard is not working"
        )));
    }
}
