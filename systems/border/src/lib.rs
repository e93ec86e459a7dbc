#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Cosmetic world border that follows the collapse.
//!
//! The border interpolates its diameter on its own clock. It is configured
//! from the same radii as the collapse job but is never consulted when
//! deciding which regions to edit, so the two may drift apart.

use collapse_core::{BorderConfig, Event, Phase, ProgressReport, RegionBackend, WorldBorder};
use collapse_system_snapshot::{BorderRecord, ProgressRecord};
use log::{debug, info};

/// Interpolation parameters and progress of a deployed border.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BorderState {
    active: bool,
    center_x: f64,
    center_z: f64,
    initial_diameter: f64,
    target_diameter: f64,
    duration_ticks: i64,
    elapsed_ticks: i64,
    last_diameter: f64,
}

impl BorderState {
    /// Indicates whether the interpolation is deployed.
    #[must_use]
    pub const fn active(&self) -> bool {
        self.active
    }

    /// Border center as `(x, z)`.
    #[must_use]
    pub const fn center(&self) -> (f64, f64) {
        (self.center_x, self.center_z)
    }

    /// Diameter at deployment.
    #[must_use]
    pub const fn initial_diameter(&self) -> f64 {
        self.initial_diameter
    }

    /// Diameter at the end of the interpolation.
    #[must_use]
    pub const fn target_diameter(&self) -> f64 {
        self.target_diameter
    }

    /// Interpolation length in ticks.
    #[must_use]
    pub const fn duration_ticks(&self) -> i64 {
        self.duration_ticks
    }

    /// Ticks elapsed since deployment, never beyond the duration.
    #[must_use]
    pub const fn elapsed_ticks(&self) -> i64 {
        self.elapsed_ticks
    }

    /// Diameter after the latest tick.
    #[must_use]
    pub const fn last_diameter(&self) -> f64 {
        self.last_diameter
    }

    fn diameter_at(&self, elapsed: i64) -> f64 {
        let duration = self.duration_ticks.max(1) as f64;
        let progress = (elapsed as f64 / duration).clamp(0.0, 1.0);
        self.initial_diameter + (self.target_diameter - self.initial_diameter) * progress
    }

    fn finished(&self) -> bool {
        !self.active || self.elapsed_ticks >= self.duration_ticks
    }

    fn as_world_border(&self) -> WorldBorder {
        WorldBorder::new(self.center_x, self.center_z, self.last_diameter)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ProgressKey {
    active: bool,
    diameter_centi: i64,
    phase: Phase,
}

impl Default for ProgressKey {
    fn default() -> Self {
        Self {
            active: false,
            diameter_centi: 0,
            phase: Phase::Dormant,
        }
    }
}

/// Owner of the cosmetic border and of the border it replaced.
#[derive(Clone, Debug, PartialEq)]
pub struct BorderController {
    reset_delay_ticks: u64,
    state: BorderState,
    original: Option<WorldBorder>,
    reset_countdown: Option<u64>,
    last_report: ProgressKey,
}

impl BorderController {
    /// Creates an inactive controller.
    #[must_use]
    pub fn new(config: &BorderConfig) -> Self {
        Self {
            reset_delay_ticks: config.reset_delay_ticks,
            state: BorderState::default(),
            original: None,
            reset_countdown: None,
            last_report: ProgressKey::default(),
        }
    }

    /// Restores a controller from persisted state.
    #[must_use]
    pub fn from_record(
        config: &BorderConfig,
        record: &BorderRecord,
        last_progress: Option<&ProgressRecord>,
    ) -> Self {
        let mut controller = Self::new(config);
        controller.state = BorderState {
            active: record.active,
            center_x: record.center_x,
            center_z: record.center_z,
            initial_diameter: record.initial_diameter,
            target_diameter: record.target_diameter,
            duration_ticks: record.duration_ticks.max(0),
            elapsed_ticks: record.elapsed_ticks.clamp(0, record.duration_ticks.max(0)),
            last_diameter: record.last_diameter,
        };
        controller.original = record.original;
        controller.reset_countdown = record.reset_countdown;
        if let Some(progress) = last_progress {
            controller.last_report = ProgressKey {
                active: progress.active,
                diameter_centi: progress.diameter_centi,
                phase: Phase::from_name(&progress.phase).unwrap_or_default(),
            };
        }
        controller
    }

    /// Current interpolation state.
    #[must_use]
    pub const fn state(&self) -> &BorderState {
        &self.state
    }

    /// Border captured at deployment that has not been restored yet.
    #[must_use]
    pub const fn original(&self) -> Option<WorldBorder> {
        self.original
    }

    /// Reports whether the interpolation reached its target or was never deployed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.finished()
    }

    /// Starts interpolating from `initial_diameter` to `target_diameter`.
    ///
    /// The border governing the world is captured the first time the
    /// controller deploys after being cleared; redeploying keeps that capture.
    pub fn deploy<B: RegionBackend>(
        &mut self,
        center: (f64, f64),
        initial_diameter: f64,
        target_diameter: f64,
        duration_ticks: i64,
        backend: &mut B,
    ) {
        if self.original.is_none() {
            self.original = Some(backend.world_border());
        }
        self.state = BorderState {
            active: true,
            center_x: center.0,
            center_z: center.1,
            initial_diameter,
            target_diameter,
            duration_ticks: duration_ticks.max(1),
            elapsed_ticks: 0,
            last_diameter: initial_diameter,
        };
        self.reset_countdown = None;
        backend.apply_border(self.state.as_world_border());
        info!(
            "border deployed at ({:.1}, {:.1}): {initial_diameter:.2} -> {target_diameter:.2} over {duration_ticks} ticks",
            center.0, center.1
        );
    }

    /// Advances the interpolation by one tick.
    pub fn tick<B: RegionBackend>(&mut self, backend: &mut B) {
        if self.state.finished() {
            return;
        }
        self.state.elapsed_ticks += 1;
        let diameter = self.state.diameter_at(self.state.elapsed_ticks);
        if diameter != self.state.last_diameter {
            self.state.last_diameter = diameter;
            backend.apply_border(self.state.as_world_border());
        }
    }

    /// Restores the original border once the interpolation and the collapse
    /// job have both finished and the configured delay has passed.
    ///
    /// Returns `true` when the original border was restored on this call.
    pub fn maybe_auto_reset<B: RegionBackend>(
        &mut self,
        job_finished: bool,
        backend: &mut B,
        out: &mut Vec<Event>,
    ) -> bool {
        if self.original.is_none() || !job_finished || !self.state.finished() {
            return false;
        }
        match self.reset_countdown {
            None if self.reset_delay_ticks > 0 => {
                self.reset_countdown = Some(self.reset_delay_ticks - 1);
                debug!(
                    "border restore scheduled in {} ticks",
                    self.reset_delay_ticks
                );
                false
            }
            Some(remaining) if remaining > 0 => {
                self.reset_countdown = Some(remaining - 1);
                false
            }
            _ => self.restore(backend, out),
        }
    }

    /// Puts the original border back in place immediately.
    ///
    /// Returns `true` when an original border was pending.
    pub fn restore<B: RegionBackend>(&mut self, backend: &mut B, out: &mut Vec<Event>) -> bool {
        self.reset_countdown = None;
        self.state.active = false;
        let Some(original) = self.original.take() else {
            return false;
        };
        backend.apply_border(original);
        info!(
            "restored original border at ({:.1}, {:.1}) with diameter {:.2}",
            original.center_x, original.center_z, original.diameter
        );
        out.push(Event::BorderRestored { border: original });
        true
    }

    /// Forgets the interpolation and any captured original without touching the world.
    pub fn clear(&mut self) {
        self.state = BorderState::default();
        self.original = None;
        self.reset_countdown = None;
    }

    /// Emits a progress notification if the diameter or phase changed since
    /// the previous notification.
    pub fn report(&mut self, phase: Phase, out: &mut Vec<Event>) {
        let key = ProgressKey {
            active: self.state.active,
            diameter_centi: (self.state.last_diameter * 100.0).round() as i64,
            phase,
        };
        if key == self.last_report {
            return;
        }
        self.last_report = key;
        out.push(Event::Progress(ProgressReport {
            active: self.state.active,
            center_x: self.state.center_x,
            center_z: self.state.center_z,
            initial_diameter: self.state.initial_diameter,
            current_diameter: self.state.last_diameter,
            target_diameter: self.state.target_diameter,
            duration_ticks: self.state.duration_ticks,
            elapsed_ticks: self.state.elapsed_ticks,
            phase,
        }));
    }

    /// Captures the interpolation for persistence.
    #[must_use]
    pub fn record(&self) -> BorderRecord {
        BorderRecord {
            active: self.state.active,
            center_x: self.state.center_x,
            center_z: self.state.center_z,
            initial_diameter: self.state.initial_diameter,
            target_diameter: self.state.target_diameter,
            duration_ticks: self.state.duration_ticks,
            elapsed_ticks: self.state.elapsed_ticks,
            last_diameter: self.state.last_diameter,
            original: self.original,
            reset_countdown: self.reset_countdown,
        }
    }

    /// Captures the last progress notification for persistence.
    #[must_use]
    pub fn progress_record(&self) -> ProgressRecord {
        ProgressRecord {
            active: self.last_report.active,
            diameter_centi: self.last_report.diameter_centi,
            phase: self.last_report.phase.name().to_owned(),
        }
    }
}
