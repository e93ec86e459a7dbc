#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Top-level state machine of the collapse lifecycle.
//!
//! The [`PhaseController`] owns every system for the duration of a
//! lifecycle and drives them from a single `tick` entry point. It never
//! holds on to the world: each call receives the [`RegionBackend`] it may
//! touch, and the controller reports what happened through [`Event`] values.

use collapse_core::{
    BlockPos, CollapseConfig, Command, Event, Phase, RegionBackend, StallKind,
};
use collapse_system_border::BorderController;
use collapse_system_engine::{CollapseEngine, CollapseJob, ResetScheduler};
use collapse_system_preparer::RegionPreparer;
use collapse_system_snapshot::{Snapshot, SNAPSHOT_VERSION};
use collapse_system_watchdog::WatchdogMonitor;
use log::{debug, info, warn};

/// Coordinates the preparer, engine, border, reset scheduler, and watchdog.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseController {
    config: CollapseConfig,
    phase: Phase,
    ticks: i64,
    center: Option<BlockPos>,
    fuse_remaining: u64,
    preparer: RegionPreparer,
    engine: CollapseEngine,
    resets: ResetScheduler,
    border: BorderController,
    watchdog: WatchdogMonitor,
}

impl PhaseController {
    /// Creates a dormant controller. The configuration is sanitized first.
    #[must_use]
    pub fn new(config: &CollapseConfig) -> Self {
        let config = config.sanitized();
        Self {
            preparer: RegionPreparer::new(&config),
            engine: CollapseEngine::new(&config),
            resets: ResetScheduler::new(&config.post_reset),
            border: BorderController::new(&config.border),
            watchdog: WatchdogMonitor::new(&config.watchdog),
            phase: Phase::Dormant,
            ticks: 0,
            center: None,
            fuse_remaining: 0,
            config,
        }
    }

    /// Rebuilds a controller from a snapshot.
    ///
    /// Snapshots that cannot describe an active lifecycle, such as an active
    /// phase without a center, resume dormant.
    #[must_use]
    pub fn restore(config: &CollapseConfig, snapshot: &Snapshot) -> Self {
        let mut controller = Self::new(config);
        let phase = snapshot.phase();
        if snapshot.version > SNAPSHOT_VERSION {
            warn!(
                "snapshot version {} is newer than {SNAPSHOT_VERSION}; reading known fields only",
                snapshot.version
            );
        }

        let consistent = match phase {
            Phase::Dormant => false,
            Phase::Fusing => snapshot.center.is_some(),
            Phase::Collapsing => snapshot.center.is_some() && snapshot.job.is_some(),
            Phase::Resetting | Phase::Dissipating => true,
        };
        if !consistent {
            if phase != Phase::Dormant {
                warn!("snapshot in phase {phase} is incomplete; resuming dormant");
            }
            return controller;
        }

        let config = controller.config.clone();
        controller.phase = phase;
        controller.ticks = snapshot.ticks.max(0);
        controller.center = snapshot.center;
        controller.fuse_remaining = snapshot.fuse_remaining;
        controller.preparer = RegionPreparer::from_record(&config, &snapshot.preparation);
        controller.engine = CollapseEngine::from_snapshot(&config, snapshot);
        controller.resets = ResetScheduler::from_snapshot(&config.post_reset, snapshot);
        controller.border = BorderController::from_record(
            &config.border,
            &snapshot.border,
            snapshot.last_progress.as_ref(),
        );
        controller.watchdog = WatchdogMonitor::from_record(&config.watchdog, &snapshot.watchdog);
        info!(
            "restored lifecycle in phase {phase} at tick {} with {} regions queued",
            controller.ticks,
            controller.engine.pending()
        );
        controller
    }

    /// Captures the complete lifecycle state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            phase: self.phase.name().to_owned(),
            ticks: self.ticks,
            center: self.center,
            border: self.border.record(),
            fuse_remaining: self.fuse_remaining,
            preparation: self.preparer.record(),
            watchdog: self.watchdog.record(),
            last_progress: Some(self.border.progress_record()),
            ..Snapshot::default()
        };
        self.engine.persist(&mut snapshot);
        self.resets.persist(&mut snapshot);
        snapshot
    }

    /// Re-registers preload pins with a backend that started after a restore.
    pub fn resume_pins<B: RegionBackend>(&self, backend: &mut B) {
        self.preparer.resume_pins(backend);
    }

    /// Applies an administrative command.
    pub fn apply<B: RegionBackend>(
        &mut self,
        command: Command,
        backend: &mut B,
        out: &mut Vec<Event>,
    ) {
        match command {
            Command::Arm { reason, center } => self.arm(&reason, center, backend, out),
            Command::Abort { reason } => self.abort(&reason, backend, out),
            Command::ForceSkip { reason } => self.force_skip(&reason, out),
        }
    }

    /// Arms a collapse around `center`, falling back to the configured
    /// center and then to the center of the world border.
    ///
    /// Arming an active lifecycle is a no-op.
    pub fn arm<B: RegionBackend>(
        &mut self,
        reason: &str,
        center: Option<BlockPos>,
        backend: &mut B,
        out: &mut Vec<Event>,
    ) {
        if self.phase != Phase::Dormant {
            debug!("ignoring arm request '{reason}' while {}", self.phase);
            return;
        }

        let center = center
            .or(self.config.center)
            .unwrap_or_else(|| border_center(&*backend));
        if !self.transition(Phase::Fusing, reason, out) {
            return;
        }
        self.ticks = 0;
        self.center = Some(center);
        self.fuse_remaining = self.config.fuse_ticks;

        if self.config.enabled {
            self.preparer.begin(center.region(), out);
        } else {
            info!("collapse is disabled; dissipating without side effects");
            let _ = self.transition(Phase::Dissipating, "collapse disabled", out);
        }
        self.border.report(self.phase, out);
    }

    /// Cancels the lifecycle immediately and returns to dormancy.
    ///
    /// Aborting a dormant lifecycle is a no-op.
    pub fn abort<B: RegionBackend>(&mut self, reason: &str, backend: &mut B, out: &mut Vec<Event>) {
        if self.phase == Phase::Dormant {
            debug!("ignoring abort request '{reason}' while dormant");
            return;
        }
        if self.phase != Phase::Dissipating {
            let _ = self.transition(Phase::Dissipating, reason, out);
        }
        self.return_to_dormant(reason, backend, out);
        self.border.report(self.phase, out);
    }

    /// Moves the lifecycle into dissipation; cleanup happens on the next tick.
    pub fn force_skip(&mut self, reason: &str, out: &mut Vec<Event>) {
        if !self.phase.is_active() || self.phase == Phase::Dissipating {
            debug!("ignoring skip request '{reason}' while {}", self.phase);
            return;
        }
        let _ = self.transition(Phase::Dissipating, reason, out);
        self.border.report(self.phase, out);
    }

    /// Advances the active phase by one tick.
    pub fn tick<B: RegionBackend>(&mut self, backend: &mut B, out: &mut Vec<Event>) {
        if self.phase.is_active() {
            self.ticks = self.ticks.saturating_add(1);
        }
        match self.phase {
            Phase::Dormant => {}
            Phase::Fusing => self.tick_fusing(backend, out),
            Phase::Collapsing => self.tick_collapsing(backend, out),
            Phase::Resetting => self.tick_resetting(backend, out),
            Phase::Dissipating => self.return_to_dormant("dissipated", backend, out),
        }
        self.border.report(self.phase, out);
    }

    /// Active phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Ticks processed since the lifecycle was armed.
    #[must_use]
    pub const fn ticks(&self) -> i64 {
        self.ticks
    }

    /// Center selected when the lifecycle was armed.
    #[must_use]
    pub const fn center(&self) -> Option<BlockPos> {
        self.center
    }

    /// Ticks left on the fuse.
    #[must_use]
    pub const fn fuse_remaining(&self) -> u64 {
        self.fuse_remaining
    }

    /// Sanitized configuration in use.
    #[must_use]
    pub const fn config(&self) -> &CollapseConfig {
        &self.config
    }

    /// Preparation pipeline.
    #[must_use]
    pub const fn preparer(&self) -> &RegionPreparer {
        &self.preparer
    }

    /// Collapse engine.
    #[must_use]
    pub const fn engine(&self) -> &CollapseEngine {
        &self.engine
    }

    /// Reset scheduler.
    #[must_use]
    pub const fn resets(&self) -> &ResetScheduler {
        &self.resets
    }

    /// Cosmetic border.
    #[must_use]
    pub const fn border(&self) -> &BorderController {
        &self.border
    }

    /// Stall monitor.
    #[must_use]
    pub const fn watchdog(&self) -> &WatchdogMonitor {
        &self.watchdog
    }

    fn tick_fusing<B: RegionBackend>(&mut self, backend: &mut B, out: &mut Vec<Event>) {
        let burning = self.fuse_remaining > 0;
        if burning {
            self.fuse_remaining -= 1;
        }
        let processed = self.preparer.tick(backend, out);

        if self.fuse_remaining == 0 && self.preparer.is_complete() {
            self.enter_collapsing(backend, out);
            return;
        }
        if burning {
            return;
        }

        let context = format!(
            "phase {}, pre-generation {} pending, preload {} pending, tick {}",
            self.phase,
            self.preparer.pre_generation().pending(),
            self.preparer.preload().pending(),
            self.ticks
        );
        let escalation = self
            .watchdog
            .observe(StallKind::Fuse, processed > 0, &context, out);
        if escalation.requests_skip() {
            let _ = self.transition(Phase::Dissipating, "fuse watchdog auto-skip", out);
        }
    }

    fn enter_collapsing<B: RegionBackend>(&mut self, backend: &mut B, out: &mut Vec<Event>) {
        let Some(center) = self.center else {
            warn!("cannot collapse without a center; dissipating");
            let _ = self.transition(Phase::Dissipating, "missing center", out);
            return;
        };
        if !self.transition(Phase::Collapsing, "fuse burned out", out) {
            return;
        }
        self.engine
            .start(CollapseJob::from_config(&self.config, center));

        if self.config.border.enabled {
            self.border.deploy(
                (f64::from(center.x), f64::from(center.z)),
                self.config.start_radius * 2.0,
                (self.config.end_radius * 2.0).max(1.0),
                self.config.duration_ticks,
                backend,
            );
        }
    }

    fn tick_collapsing<B: RegionBackend>(&mut self, backend: &mut B, out: &mut Vec<Event>) {
        let report = self.engine.tick(backend, out);
        if self.config.post_reset.enabled {
            for coord in &report.completed {
                let _ = self.resets.enqueue(*coord);
            }
        }

        self.border.tick(backend);
        let _ = self
            .border
            .maybe_auto_reset(self.engine.is_done(), backend, out);

        if self.engine.is_done() {
            info!(
                "collapse complete: {} regions, {} skipped",
                self.engine.completed(),
                self.engine.skipped_missing()
            );
            if self.config.post_reset.enabled {
                if self.transition(Phase::Resetting, "collapse complete", out) {
                    self.resets.begin();
                }
            } else {
                self.return_to_dormant("collapse complete", backend, out);
            }
            return;
        }

        let context = format!(
            "phase {}, {} regions pending, {}/{} done, elapsed {} of {} ticks, {} edits this tick",
            self.phase,
            self.engine.pending(),
            self.engine.completed(),
            self.engine.total(),
            self.engine.elapsed_ticks(),
            self.config.duration_ticks,
            report.operations
        );
        let escalation =
            self.watchdog
                .observe(StallKind::Collapse, report.is_productive(), &context, out);
        if escalation.requests_skip() {
            let _ = self.transition(Phase::Dissipating, "collapse watchdog auto-skip", out);
        }
    }

    fn tick_resetting<B: RegionBackend>(&mut self, backend: &mut B, out: &mut Vec<Event>) {
        self.border.tick(backend);
        let _ = self.border.maybe_auto_reset(true, backend, out);

        let _ = self.resets.tick(backend, out);
        if self.resets.is_empty() {
            self.return_to_dormant("reset complete", backend, out);
        }
    }

    /// Releases every resource the lifecycle holds and enters dormancy.
    fn return_to_dormant<B: RegionBackend>(
        &mut self,
        reason: &str,
        backend: &mut B,
        out: &mut Vec<Event>,
    ) {
        if !self.phase.can_transition_to(Phase::Dormant) {
            debug!("cannot return to dormant from {}", self.phase);
            return;
        }
        self.preparer.release(backend);
        self.preparer.reset();
        self.engine.clear();
        self.resets.clear();
        let _ = self.border.restore(backend, out);
        self.border.clear();
        self.center = None;
        self.fuse_remaining = 0;
        self.ticks = 0;
        let _ = self.transition(Phase::Dormant, reason, out);
    }

    fn transition(&mut self, next: Phase, reason: &str, out: &mut Vec<Event>) -> bool {
        let from = self.phase;
        if !from.can_transition_to(next) {
            debug!("ignoring illegal transition {from} -> {next} ({reason})");
            return false;
        }
        info!("phase {from} -> {next}: {reason}");
        self.phase = next;
        self.watchdog.reset();
        out.push(Event::PhaseChanged {
            from,
            to: next,
            reason: reason.to_owned(),
        });
        true
    }
}

fn border_center<B: RegionBackend>(backend: &B) -> BlockPos {
    let border = backend.world_border();
    let (min_y, max_y) = backend.height_range();
    BlockPos::new(
        border.center_x.floor() as i32,
        min_y + (max_y - min_y) / 2,
        border.center_z.floor() as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use collapse_core::PreparationStage;
    use collapse_world::{query, Terrain, World, WorldSettings, STONE};

    fn small_world() -> World {
        World::new(WorldSettings {
            min_y: 0,
            max_y: 4,
            terrain: Terrain::Flat {
                height: 2,
                block: STONE,
            },
            ..WorldSettings::default()
        })
    }

    fn small_config() -> CollapseConfig {
        let mut config = CollapseConfig {
            fuse_ticks: 3,
            max_radius: 10.0,
            start_radius: 10.0,
            end_radius: 0.0,
            duration_ticks: 20,
            max_operations_per_tick: 1_000,
            ..CollapseConfig::default()
        };
        config.pre_gen.radius = 1;
        config.border.reset_delay_ticks = 0;
        config
    }

    fn phases(events: &[Event]) -> Vec<Phase> {
        events
            .iter()
            .filter_map(|event| match event {
                Event::PhaseChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn arming_selects_the_border_center_by_default() {
        let mut world = small_world();
        let mut controller = PhaseController::new(&small_config());
        let mut events = Vec::new();
        controller.arm("test", None, &mut world, &mut events);
        assert_eq!(controller.phase(), Phase::Fusing);
        assert_eq!(controller.center(), Some(BlockPos::new(0, 2, 0)));
        assert_eq!(controller.fuse_remaining(), 3);
    }

    #[test]
    fn arming_twice_is_ignored() {
        let mut world = small_world();
        let mut controller = PhaseController::new(&small_config());
        let mut events = Vec::new();
        controller.arm("first", Some(BlockPos::new(8, 2, 8)), &mut world, &mut events);
        let before = controller.clone();
        controller.arm("second", Some(BlockPos::new(99, 2, 99)), &mut world, &mut events);
        assert_eq!(controller, before);
    }

    #[test]
    fn fuse_waits_for_preparation() {
        let mut world = small_world();
        let mut config = small_config();
        config.fuse_ticks = 0;
        config.pre_gen.chunks_per_tick = 1;
        config.preload.chunks_per_tick = 1;
        let mut controller = PhaseController::new(&config);
        let mut events = Vec::new();
        controller.arm("test", Some(BlockPos::new(8, 2, 8)), &mut world, &mut events);

        let mut fusing_ticks = 0;
        while controller.phase() == Phase::Fusing {
            controller.tick(&mut world, &mut events);
            fusing_ticks += 1;
            assert!(fusing_ticks <= 17);
        }
        assert_eq!(fusing_ticks, 17);
        assert_eq!(controller.phase(), Phase::Collapsing);
        assert_eq!(query::pinned_count(&world), 9);

        let completions: Vec<PreparationStage> = events
            .iter()
            .filter_map(|event| match event {
                Event::PreparationComplete { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            completions,
            vec![PreparationStage::PreGeneration, PreparationStage::Preload]
        );
    }

    #[test]
    fn disabled_collapse_dissipates_without_touching_the_world() {
        let mut world = small_world();
        let mut config = small_config();
        config.enabled = false;
        let mut controller = PhaseController::new(&config);
        let mut events = Vec::new();
        controller.arm("test", Some(BlockPos::new(8, 2, 8)), &mut world, &mut events);
        assert_eq!(controller.phase(), Phase::Dissipating);
        controller.tick(&mut world, &mut events);

        assert_eq!(controller.phase(), Phase::Dormant);
        assert_eq!(
            phases(&events),
            vec![Phase::Fusing, Phase::Dissipating, Phase::Dormant]
        );
        assert_eq!(query::generation_count(&world), 0);
        assert_eq!(query::edit_count(&world), 0);
        assert!(!events
            .iter()
            .any(|event| matches!(event, Event::BorderRestored { .. })));
    }

    #[test]
    fn force_skip_cleans_up_on_the_next_tick() {
        let mut world = small_world();
        let mut controller = PhaseController::new(&small_config());
        let mut events = Vec::new();
        controller.arm("test", Some(BlockPos::new(8, 2, 8)), &mut world, &mut events);
        for _ in 0..6 {
            controller.tick(&mut world, &mut events);
        }
        assert_eq!(controller.phase(), Phase::Collapsing);
        assert!(query::pinned_count(&world) > 0);

        controller.force_skip("operator", &mut events);
        controller.force_skip("operator again", &mut events);
        assert_eq!(controller.phase(), Phase::Dissipating);
        assert!(query::pinned_count(&world) > 0);

        controller.tick(&mut world, &mut events);
        assert_eq!(controller.phase(), Phase::Dormant);
        assert_eq!(query::pinned_count(&world), 0);
        assert_eq!(
            phases(&events),
            vec![
                Phase::Fusing,
                Phase::Collapsing,
                Phase::Dissipating,
                Phase::Dormant
            ]
        );
    }

    #[test]
    fn completed_collapse_restores_the_original_border() {
        let mut world = small_world();
        let original = world.world_border();
        let mut controller = PhaseController::new(&small_config());
        let mut events = Vec::new();
        controller.arm("test", Some(BlockPos::new(8, 2, 8)), &mut world, &mut events);
        for _ in 0..40 {
            controller.tick(&mut world, &mut events);
        }

        assert_eq!(controller.phase(), Phase::Dormant);
        assert_eq!(world.world_border(), original);
        let restored = events
            .iter()
            .filter(|event| matches!(event, Event::BorderRestored { .. }))
            .count();
        assert_eq!(restored, 1);
        assert!(events.iter().any(|event| matches!(
            event,
            Event::Progress(report) if report.active && report.phase == Phase::Collapsing
        )));
    }

    #[test]
    fn post_reset_regenerates_collapsed_regions() {
        let mut world = small_world();
        let mut config = small_config();
        config.post_reset.enabled = true;
        config.post_reset.delay_ticks = 2;
        config.post_reset.chunks_per_tick = 2;
        let mut controller = PhaseController::new(&config);
        let mut events = Vec::new();
        controller.arm("test", Some(BlockPos::new(8, 2, 8)), &mut world, &mut events);
        for _ in 0..60 {
            controller.tick(&mut world, &mut events);
        }

        assert_eq!(controller.phase(), Phase::Dormant);
        assert_eq!(
            phases(&events),
            vec![
                Phase::Fusing,
                Phase::Collapsing,
                Phase::Resetting,
                Phase::Dormant
            ]
        );
        let resets = events
            .iter()
            .filter(|event| matches!(event, Event::RegionReset { .. }))
            .count();
        assert_eq!(resets, 5);
        assert_eq!(query::solid_cells(&world, collapse_core::RegionCoord::new(0, 0)), 512);
    }

    fn tick_until<F>(controller: &mut PhaseController, world: &mut World, done: F) -> Vec<Event>
    where
        F: Fn(Phase) -> bool,
    {
        let mut events = Vec::new();
        for _ in 0..200 {
            if done(controller.phase()) {
                break;
            }
            controller.tick(world, &mut events);
        }
        assert!(done(controller.phase()), "stuck in {}", controller.phase());
        events
    }

    fn arm_command(center: BlockPos) -> Command {
        Command::Arm {
            reason: "operator".to_owned(),
            center: Some(center),
        }
    }

    #[test]
    fn commands_cancel_every_active_phase() {
        let mut config = small_config();
        config.post_reset.enabled = true;
        config.post_reset.delay_ticks = 5;
        let abort = || Command::Abort {
            reason: "operator".to_owned(),
        };
        let skip = || Command::ForceSkip {
            reason: "operator".to_owned(),
        };
        let center = BlockPos::new(8, 2, 8);

        for target in [Phase::Fusing, Phase::Collapsing, Phase::Resetting] {
            for command in [abort(), skip()] {
                let mut world = small_world();
                let mut controller = PhaseController::new(&config);
                let mut events = Vec::new();
                controller.apply(arm_command(center), &mut world, &mut events);
                assert_eq!(controller.phase(), Phase::Fusing);
                let _ = tick_until(&mut controller, &mut world, |phase| phase == target);

                let skipping = matches!(command, Command::ForceSkip { .. });
                controller.apply(command, &mut world, &mut events);
                if skipping {
                    assert_eq!(controller.phase(), Phase::Dissipating);
                    controller.tick(&mut world, &mut events);
                }
                assert_eq!(controller.phase(), Phase::Dormant, "cancelling {target}");
                assert_eq!(query::pinned_count(&world), 0);
                assert!(phases(&events).ends_with(&[Phase::Dissipating, Phase::Dormant]));
            }
        }
    }

    #[test]
    fn cancelling_a_dormant_lifecycle_is_ignored() {
        let mut world = small_world();
        let mut controller = PhaseController::new(&small_config());
        let mut events = Vec::new();
        controller.apply(
            Command::Abort {
                reason: "operator".to_owned(),
            },
            &mut world,
            &mut events,
        );
        controller.apply(
            Command::ForceSkip {
                reason: "operator".to_owned(),
            },
            &mut world,
            &mut events,
        );
        assert_eq!(controller, PhaseController::new(&small_config()));
        assert!(phases(&events).is_empty());
    }

    #[test]
    fn unaddressable_regions_in_a_snapshot_are_dropped() {
        let config = small_config();
        let mut world = small_world();
        let mut controller = PhaseController::new(&config);
        let mut events = Vec::new();
        controller.arm("test", Some(BlockPos::new(8, 2, 8)), &mut world, &mut events);
        let _ = tick_until(&mut controller, &mut world, |phase| phase == Phase::Collapsing);

        let mut snapshot = controller.snapshot();
        snapshot.collapse_queue = vec![collapse_core::RegionCoord::new(i32::MAX, 0).pack()];
        snapshot.cursor = None;
        let mut restored = PhaseController::restore(&config, &snapshot);
        assert_eq!(restored.phase(), Phase::Collapsing);
        let _ = tick_until(&mut restored, &mut world, |phase| phase == Phase::Dormant);
    }

    #[test]
    fn arming_at_the_edge_of_the_world_completes() {
        let mut world = small_world();
        let mut controller = PhaseController::new(&small_config());
        let mut events = Vec::new();
        let center = BlockPos::new(i32::MAX - 10, 2, 0);
        controller.apply(arm_command(center), &mut world, &mut events);
        assert_eq!(controller.center(), Some(center));

        let _ = tick_until(&mut controller, &mut world, |phase| phase == Phase::Dormant);
        assert!(query::edit_count(&world) > 0);
    }

    #[test]
    fn incomplete_snapshot_resumes_dormant() {
        let config = small_config();
        let snapshot = Snapshot {
            phase: Phase::Collapsing.name().to_owned(),
            ..Snapshot::default()
        };
        let restored = PhaseController::restore(&config, &snapshot);
        assert_eq!(restored, PhaseController::new(&config));
    }
}
