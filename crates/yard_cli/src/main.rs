use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use yard_core::{Event, EventEnvelope};
use yard_world::{Scenario, ScenarioRun};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "yard_cli", about = "Headless shipyard automation runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario for a fixed number of ticks.
    Run {
        #[arg(long)]
        ticks: u64,
        /// Load a scenario JSON file. Mutually exclusive with --seed.
        #[arg(long, conflicts_with = "seed")]
        scenario: Option<PathBuf>,
        /// Generate a scenario with this seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Loose wrecks in a generated scenario.
        #[arg(long, default_value_t = 4)]
        wrecks: usize,
        #[arg(long, default_value_t = 50)]
        print_every: u64,
        /// Ticks between discovery polls.
        #[arg(long, default_value_t = 10)]
        discovery_every: u64,
        /// Ticks between cargo connectivity refreshes.
        #[arg(long, default_value_t = 10)]
        cargo_every: u64,
        /// Write every event envelope to this file as a JSON array.
        #[arg(long)]
        events_out: Option<PathBuf>,
    },
    /// Write a generated scenario to a JSON file.
    Generate {
        #[arg(long)]
        seed: u64,
        #[arg(long, default_value_t = 4)]
        wrecks: usize,
        #[arg(long)]
        out: PathBuf,
    },
}

struct RunOptions {
    ticks: u64,
    print_every: u64,
    discovery_every: u64,
    cargo_every: u64,
    events_out: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

fn load(scenario: Option<&Path>, seed: Option<u64>, wrecks: usize) -> Result<Scenario> {
    if let Some(path) = scenario {
        return yard_world::load_scenario(path);
    }
    let seed = seed.unwrap_or_else(rand::random);
    tracing::info!(seed, wrecks, "generating scenario");
    Ok(yard_world::generate_scenario(seed, wrecks))
}

fn run(scenario: &Scenario, options: &RunOptions) -> Result<()> {
    let mut run = ScenarioRun::new(scenario);
    run.discovery_every = options.discovery_every;
    run.cargo_every = options.cargo_every;

    println!(
        "Starting scenario '{}': ticks={} yards={} structures={}",
        scenario.name,
        options.ticks,
        scenario.yards.len(),
        scenario.structures.len(),
    );
    println!("{}", "-".repeat(80));

    let mut all_events = Vec::new();
    for _ in 0..options.ticks {
        let events = run.step();
        print_notable(&events);
        if options.print_every > 0 && run.tick() % options.print_every == 0 {
            print_status(&run);
        }
        if options.events_out.is_some() {
            all_events.extend(events);
        }
    }

    println!("{}", "-".repeat(80));
    println!("Done. Final state at tick {}:", run.tick());
    print_status(&run);

    if let Some(path) = &options.events_out {
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer(file, &all_events)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("{} events written to {}", all_events.len(), path.display());
    }
    Ok(())
}

fn print_notable(events: &[EventEnvelope]) {
    for envelope in events {
        let tick = envelope.tick;
        match &envelope.event {
            Event::ModeChanged { yard, from, to } => {
                println!("*** tick={tick:04} {yard}: {from:?} -> {to:?} ***", yard = yard.0);
            }
            Event::ScanCompleted { yard, report } => println!(
                "*** tick={tick:04} {yard}: scan found {} blocks in {} structures, ~{:.1}s ***",
                report.blocks,
                report.structures,
                report.estimated_secs,
                yard = yard.0,
            ),
            Event::YardInvalidated { yard } => {
                println!("*** tick={tick:04} {yard}: invalidated ***", yard = yard.0);
            }
            Event::CommandRejected { yard, reason } => {
                tracing::warn!(tick, yard = %yard.0, reason = %reason, "command rejected");
            }
            _ => {}
        }
    }
}

fn print_status(run: &ScenarioRun) {
    let cargo: u32 = yard_world::total_cargo(&run.world).values().sum();
    for yard in run.registry.yards() {
        let power: f32 = yard.power.tools_kw.iter().sum();
        let missing: u32 = yard.missing.values().sum();
        println!(
            "[tick={tick:04}]  {id}  mode={mode:?}  beams={beams:2}  pending={pending:3}  \
             stalled={stalled:2}  missing={missing:3}  power={power:7.1}kW  cargo={cargo}",
            tick = run.tick(),
            id = yard.id().0,
            mode = yard.mode,
            beams = yard.beams.occupied_count(),
            pending = yard.pool.len(),
            stalled = yard.stalled.len(),
        );
    }
    if run.registry.is_empty() {
        println!("[tick={:04}]  no registered yards  cargo={cargo}", run.tick());
    }
}

fn generate(seed: u64, wrecks: usize, out: &Path) -> Result<()> {
    let scenario = yard_world::generate_scenario(seed, wrecks);
    let json = serde_json::to_string_pretty(&scenario).context("serializing scenario")?;
    std::fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
    println!(
        "Wrote scenario '{}' with {} structures to {}",
        scenario.name,
        scenario.structures.len(),
        out.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            ticks,
            scenario,
            seed,
            wrecks,
            print_every,
            discovery_every,
            cargo_every,
            events_out,
        } => {
            let scenario = load(scenario.as_deref(), seed, wrecks)?;
            let options = RunOptions {
                ticks,
                print_every,
                discovery_every,
                cargo_every,
                events_out,
            };
            run(&scenario, &options)?;
        }
        Commands::Generate { seed, wrecks, out } => generate(seed, wrecks, &out)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_scenario_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generated.json");
        generate(11, 2, &path).unwrap();

        let loaded = load(Some(&path), None, 0).unwrap();
        assert_eq!(loaded.structures.len(), yard_world::generate_scenario(11, 2).structures.len());
    }

    #[test]
    fn run_writes_every_event() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("events.json");
        let scenario = yard_world::generate_scenario(3, 1);
        let options = RunOptions {
            ticks: 30,
            print_every: 0,
            discovery_every: 10,
            cargo_every: 10,
            events_out: Some(out.clone()),
        };
        run(&scenario, &options).unwrap();

        let json = std::fs::read_to_string(&out).unwrap();
        let events: Vec<EventEnvelope> = serde_json::from_str(&json).unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e.event, Event::YardRegistered { .. })));
        for pair in events.windows(2) {
            assert!(pair[0].id < pair[1].id);
        }
    }
}
