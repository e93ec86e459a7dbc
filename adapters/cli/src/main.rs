#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that drives a collapse lifecycle against an
//! in-memory world.

mod session;
mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use collapse_core::{BlockPos, CollapseConfig, Event};
use collapse_system_snapshot::{Snapshot, SnapshotStore};
use collapse_world::{World, WorldSettings};
use log::info;

use session::{Session, Summary};

#[derive(Parser)]
#[command(name = "collapse", about = "Drive a collapse lifecycle against a seeded world")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Arm a collapse and tick it until it returns to dormancy
    Run {
        /// TOML configuration file with a `[collapse]` table
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// Upper bound on the number of ticks to run
        #[arg(long, default_value_t = 20_000)]
        ticks: u32,
        /// Collapse center as x,y,z
        #[arg(long, value_parser = settings::parse_center, allow_hyphen_values = true)]
        center: Option<BlockPos>,
        /// Terrain seed of the in-memory world
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Snapshot file to resume from and to save to when the run stops
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Print every event instead of phase changes only
        #[arg(long)]
        verbose: bool,
    },
    /// Print a summary of a persisted snapshot
    Inspect {
        /// Snapshot file written by `run`
        path: PathBuf,
        /// Also print the single-line transfer encoding
        #[arg(long)]
        line: bool,
    },
}

/// Entry point for the collapse command-line interface.
fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            ticks,
            center,
            seed,
            snapshot,
            verbose,
        } => run(config, ticks, center, seed, snapshot, verbose),
        Command::Inspect { path, line } => inspect(path, line),
    }
}

fn run(
    config: Option<PathBuf>,
    ticks: u32,
    center: Option<BlockPos>,
    seed: u64,
    snapshot: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let config = match config {
        Some(path) => settings::load_config(&path)?,
        None => CollapseConfig::default().sanitized(),
    };
    let store = snapshot.map(SnapshotStore::new);
    let resume = match &store {
        Some(store) => store
            .load()
            .with_context(|| format!("failed to load snapshot {}", store.path().display()))?,
        None => None,
    };

    let world = World::new(WorldSettings::seeded(seed));
    let mut session = Session::new(&config, world, resume.as_ref());
    let mut events = Vec::new();
    if session.controller().phase().is_active() {
        info!("resuming lifecycle in phase {}", session.controller().phase());
    } else {
        session.arm(center, &mut events);
    }
    let summary = session.run(&mut events, ticks, |event| print_event(event, verbose));
    print_summary(&summary);

    if let Some(store) = store {
        if session.controller().phase().is_active() {
            store
                .save(&session.snapshot())
                .with_context(|| format!("failed to save snapshot {}", store.path().display()))?;
            println!("saved snapshot to {}", store.path().display());
        } else {
            store
                .clear()
                .with_context(|| format!("failed to clear snapshot {}", store.path().display()))?;
        }
    }
    Ok(())
}

fn inspect(path: PathBuf, line: bool) -> Result<()> {
    let store = SnapshotStore::new(path);
    let snapshot = store
        .load()
        .with_context(|| format!("failed to load snapshot {}", store.path().display()))?
        .with_context(|| format!("no snapshot at {}", store.path().display()))?;

    print_snapshot(&snapshot);
    if line {
        println!("{}", snapshot.encode_line()?);
    }
    Ok(())
}

fn print_event(event: &Event, verbose: bool) {
    match event {
        Event::PhaseChanged { from, to, reason } => println!("{from} -> {to}: {reason}"),
        Event::StallWarning { kind, ticks } => {
            println!("warning: {kind} stalled for {ticks} ticks");
        }
        Event::StallAbort {
            kind,
            ticks,
            auto_skip,
        } => println!("abort: {kind} stalled for {ticks} ticks (auto-skip {auto_skip})"),
        other if verbose => println!("{other:?}"),
        _ => {}
    }
}

fn print_summary(summary: &Summary) {
    let phases: Vec<&str> = summary.transitions.iter().map(|phase| phase.name()).collect();
    println!("phases: {}", phases.join(" -> "));
    println!(
        "{} ticks, phase {}: {} regions collapsed, {} skipped, {} reset, {} stalls, {} edits",
        summary.ticks,
        summary.phase,
        summary.collapsed,
        summary.skipped,
        summary.reset,
        summary.stalls,
        summary.edits
    );
}

fn print_snapshot(snapshot: &Snapshot) {
    println!("version: {}", snapshot.version);
    println!("phase: {}", snapshot.phase());
    println!("ticks: {}", snapshot.ticks);
    match snapshot.center {
        Some(center) => println!("center: {}, {}, {}", center.x, center.y, center.z),
        None => println!("center: none"),
    }
    println!("fuse remaining: {}", snapshot.fuse_remaining);
    println!(
        "collapse: {}/{} regions, {} queued, {} skipped",
        snapshot.collapse_completed,
        snapshot.collapse_total,
        snapshot.collapse_queue.len(),
        snapshot.skipped_missing
    );
    println!(
        "preparation: {} pre-generation pending, {} preload pending, {} pinned",
        snapshot.preparation.pre_generation.pending.len(),
        snapshot.preparation.preload.pending.len(),
        snapshot.preparation.pinned.len()
    );
    println!("reset queue: {} regions", snapshot.reset_queue.len());
    println!(
        "border: active {}, diameter {:.2}",
        snapshot.border.active, snapshot.border.last_diameter
    );
}
