use collapse_core::{BlockPos, CollapseConfig, CollapseDirection};
use collapse_system_snapshot::JobRecord;

/// Radius-over-time schedule of a single collapse.
///
/// The radius moves linearly from its start to its end value. Inward jobs
/// never grow and outward jobs never shrink, whatever the configured order
/// of the two radii.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollapseJob {
    center: BlockPos,
    start_radius: f64,
    end_radius: f64,
    duration_ticks: i64,
    direction: CollapseDirection,
}

impl CollapseJob {
    /// Creates a job, clamping radii to non-negative values and the duration to one tick.
    #[must_use]
    pub fn new(
        center: BlockPos,
        start_radius: f64,
        end_radius: f64,
        duration_ticks: i64,
        direction: CollapseDirection,
    ) -> Self {
        let a = non_negative(start_radius);
        let b = non_negative(end_radius);
        let (start_radius, end_radius) = match direction {
            CollapseDirection::Inward => (a.max(b), a.min(b)),
            CollapseDirection::Outward => (a.min(b), a.max(b)),
        };
        Self {
            center,
            start_radius,
            end_radius,
            duration_ticks: duration_ticks.max(1),
            direction,
        }
    }

    /// Job described by the configuration around `center`.
    #[must_use]
    pub fn from_config(config: &CollapseConfig, center: BlockPos) -> Self {
        Self::new(
            center,
            config.start_radius,
            config.end_radius,
            config.duration_ticks,
            config.direction,
        )
    }

    /// Rebuilds the job from its persisted form.
    #[must_use]
    pub fn from_record(record: &JobRecord) -> Self {
        Self::new(
            record.center,
            record.start_radius,
            record.end_radius,
            record.duration_ticks,
            record.direction,
        )
    }

    /// Persisted form of the job.
    #[must_use]
    pub const fn record(&self) -> JobRecord {
        JobRecord {
            center: self.center,
            start_radius: self.start_radius,
            end_radius: self.end_radius,
            duration_ticks: self.duration_ticks,
            direction: self.direction,
        }
    }

    /// Point the radius is measured from.
    #[must_use]
    pub const fn center(&self) -> BlockPos {
        self.center
    }

    /// Radius at tick zero.
    #[must_use]
    pub const fn start_radius(&self) -> f64 {
        self.start_radius
    }

    /// Radius once the duration elapsed.
    #[must_use]
    pub const fn end_radius(&self) -> f64 {
        self.end_radius
    }

    /// Schedule length in ticks.
    #[must_use]
    pub const fn duration_ticks(&self) -> i64 {
        self.duration_ticks
    }

    /// Direction of travel.
    #[must_use]
    pub const fn direction(&self) -> CollapseDirection {
        self.direction
    }

    /// Largest radius the job ever reaches.
    #[must_use]
    pub fn outer_radius(&self) -> f64 {
        self.start_radius.max(self.end_radius)
    }

    /// Radius after `elapsed` ticks.
    #[must_use]
    pub fn radius_at(&self, elapsed: i64) -> f64 {
        let progress = (elapsed as f64 / self.duration_ticks as f64).clamp(0.0, 1.0);
        self.start_radius + (self.end_radius - self.start_radius) * progress
    }

    /// Reports whether the schedule reached its end radius.
    #[must_use]
    pub const fn is_finished(&self, elapsed: i64) -> bool {
        elapsed >= self.duration_ticks
    }

    /// Reports whether a region at `distance` from the center is swept by
    /// the radius after `elapsed` ticks.
    #[must_use]
    pub fn is_due(&self, distance: f64, elapsed: i64) -> bool {
        let radius = self.radius_at(elapsed);
        match self.direction {
            CollapseDirection::Inward => distance >= radius,
            CollapseDirection::Outward => distance <= radius,
        }
    }
}

fn non_negative(radius: f64) -> f64 {
    if radius.is_finite() {
        radius.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(start: f64, end: f64, duration: i64, direction: CollapseDirection) -> CollapseJob {
        CollapseJob::new(BlockPos::new(0, 0, 0), start, end, duration, direction)
    }

    #[test]
    fn inward_radius_is_monotonic() {
        let job = job(100.0, 0.0, 1_200, CollapseDirection::Inward);
        let radii: Vec<f64> = (0..=1_300).map(|t| job.radius_at(t)).collect();
        assert!(radii.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(radii[0], 100.0);
        assert_eq!(radii[600], 50.0);
        assert_eq!(radii[1_200], 0.0);
        assert_eq!(radii[1_300], 0.0);
    }

    #[test]
    fn outward_radius_grows_even_when_radii_are_swapped() {
        let job = job(60.0, 4.0, 10, CollapseDirection::Outward);
        assert_eq!(job.start_radius(), 4.0);
        assert_eq!(job.end_radius(), 60.0);
        assert!(job.radius_at(3) <= job.radius_at(4));
        assert!(job.is_due(4.0, 0));
        assert!(!job.is_due(59.0, 9));
        assert!(job.is_due(59.0, 10));
    }

    #[test]
    fn invalid_inputs_are_clamped() {
        let job = job(f64::NAN, -3.0, -5, CollapseDirection::Inward);
        assert_eq!(job.start_radius(), 0.0);
        assert_eq!(job.end_radius(), 0.0);
        assert_eq!(job.duration_ticks(), 1);
    }

    #[test]
    fn record_round_trip() {
        let original = job(32.0, 8.0, 400, CollapseDirection::Inward);
        assert_eq!(CollapseJob::from_record(&original.record()), original);
    }
}
