use log::warn;
use serde::{Deserialize, Serialize};

use crate::{BlockPos, CollapseDirection, FillShape};

/// Smallest radius a collapse job may start from.
const MIN_RADIUS: f64 = 1.0;

/// Read-only configuration consumed by the lifecycle.
///
/// Every field has a default so partially written configuration files load.
/// Call [`CollapseConfig::sanitized`] before use; invalid values are clamped
/// rather than rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollapseConfig {
    /// Administrative switch; a disabled collapse dissipates as soon as it is armed.
    pub enabled: bool,
    /// Ticks the fuse burns before collapsing may begin.
    pub fuse_ticks: u64,
    /// Center used when the arming trigger does not supply one.
    pub center: Option<BlockPos>,
    /// Destination point enabling directional processing.
    pub anchor: Option<BlockPos>,
    /// Upper bound for every radius, measured in cells.
    pub max_radius: f64,
    /// Radius at the first collapse tick.
    pub start_radius: f64,
    /// Radius reached once `duration_ticks` have elapsed.
    pub end_radius: f64,
    /// Length of the radius schedule in ticks.
    pub duration_ticks: i64,
    /// Direction in which the radius travels.
    pub direction: CollapseDirection,
    /// Predicate deciding which cells of a region are edited.
    pub fill_shape: FillShape,
    /// Thickness parameter of the fill shape, in cells.
    pub thickness: u32,
    /// Destructive edits permitted per tick.
    pub max_operations_per_tick: u64,
    /// Restricts edits to the region face nearest the anchor.
    pub directional: bool,
    /// Content ids that are never edited.
    pub protected_blocks: Vec<u16>,
    /// Pre-generation queue settings.
    pub pre_gen: PreGenConfig,
    /// Preload queue settings.
    pub preload: PreloadConfig,
    /// Stall detection settings.
    pub watchdog: WatchdogConfig,
    /// Post-collapse regeneration settings.
    pub post_reset: PostResetConfig,
    /// Cosmetic border interpolation settings.
    pub border: BorderConfig,
}

impl Default for CollapseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fuse_ticks: 200,
            center: None,
            anchor: None,
            max_radius: 128.0,
            start_radius: 128.0,
            end_radius: 0.0,
            duration_ticks: 1_200,
            direction: CollapseDirection::Inward,
            fill_shape: FillShape::Matrix,
            thickness: 1,
            max_operations_per_tick: 4_096,
            directional: false,
            protected_blocks: Vec::new(),
            pre_gen: PreGenConfig::default(),
            preload: PreloadConfig::default(),
            watchdog: WatchdogConfig::default(),
            post_reset: PostResetConfig::default(),
            border: BorderConfig::default(),
        }
    }
}

impl CollapseConfig {
    /// Returns a copy with every out-of-range value clamped to a safe value.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let mut config = self.clone();

        config.max_radius = clamp_radius("max_radius", config.max_radius, MIN_RADIUS, None);
        config.start_radius = clamp_radius(
            "start_radius",
            config.start_radius,
            MIN_RADIUS,
            Some(config.max_radius),
        );
        config.end_radius = clamp_radius(
            "end_radius",
            config.end_radius,
            0.0,
            Some(config.max_radius),
        );
        if config.duration_ticks < 1 {
            warn!(
                "duration_ticks {} is not positive; clamping to 1",
                config.duration_ticks
            );
            config.duration_ticks = 1;
        }
        config.thickness = at_least_one("thickness", u64::from(config.thickness)) as u32;
        config.max_operations_per_tick =
            at_least_one("max_operations_per_tick", config.max_operations_per_tick);
        config.pre_gen.chunks_per_tick =
            at_least_one("pre_gen.chunks_per_tick", u64::from(config.pre_gen.chunks_per_tick))
                as u32;
        config.preload.chunks_per_tick =
            at_least_one("preload.chunks_per_tick", u64::from(config.preload.chunks_per_tick))
                as u32;
        config.post_reset.chunks_per_tick = at_least_one(
            "post_reset.chunks_per_tick",
            u64::from(config.post_reset.chunks_per_tick),
        ) as u32;
        config.post_reset.tick_delay =
            at_least_one("post_reset.tick_delay", config.post_reset.tick_delay);
        config.watchdog.fuse.max_extra_ticks =
            at_least_one("watchdog.fuse.max_extra_ticks", config.watchdog.fuse.max_extra_ticks);

        let collapse = &mut config.watchdog.collapse;
        collapse.abort_ticks = at_least_one("watchdog.collapse.abort_ticks", collapse.abort_ticks);
        if collapse.warn_ticks == 0 || collapse.warn_ticks > collapse.abort_ticks {
            warn!(
                "watchdog.collapse.warn_ticks {} is outside 1..={}; using {}",
                collapse.warn_ticks,
                collapse.abort_ticks,
                defaults.watchdog.collapse.warn_ticks.min(collapse.abort_ticks)
            );
            collapse.warn_ticks = defaults.watchdog.collapse.warn_ticks.min(collapse.abort_ticks);
        }

        if config.pre_gen.radius == 0 {
            config.pre_gen.radius = radius_in_regions(config.max_radius);
        }

        config
    }
}

/// Pre-generation queue settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreGenConfig {
    /// Disabled queues complete immediately without work.
    pub enabled: bool,
    /// Ring radius in regions; zero derives it from `max_radius`.
    pub radius: u32,
    /// Regions attempted per tick.
    pub chunks_per_tick: u32,
}

impl Default for PreGenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 0,
            chunks_per_tick: 4,
        }
    }
}

/// Preload queue settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    /// Disabled queues complete immediately without work.
    pub enabled: bool,
    /// Regions attempted per tick.
    pub chunks_per_tick: u32,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chunks_per_tick: 4,
        }
    }
}

/// Stall detection settings for both watched phases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Fuse-phase stall counter.
    pub fuse: FuseWatchdogConfig,
    /// Collapse-phase stall counter.
    pub collapse: CollapseWatchdogConfig,
}

/// Fuse-phase stall counter settings.
///
/// The warning threshold is half of `max_extra_ticks`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuseWatchdogConfig {
    /// Disabled counters never escalate.
    pub enabled: bool,
    /// Non-productive ticks tolerated after the fuse burns out.
    pub max_extra_ticks: u64,
    /// Skip to dissipation when the abort threshold is reached.
    pub auto_skip: bool,
}

impl Default for FuseWatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_extra_ticks: 600,
            auto_skip: true,
        }
    }
}

/// Collapse-phase stall counter settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollapseWatchdogConfig {
    /// Disabled counters never escalate.
    pub enabled: bool,
    /// Non-productive ticks before a warning record.
    pub warn_ticks: u64,
    /// Non-productive ticks before an error record.
    pub abort_ticks: u64,
    /// Skip to dissipation when the abort threshold is reached.
    pub auto_skip: bool,
}

impl Default for CollapseWatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warn_ticks: 200,
            abort_ticks: 400,
            auto_skip: true,
        }
    }
}

/// Post-collapse regeneration settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostResetConfig {
    /// Enables the resetting phase after a completed collapse.
    pub enabled: bool,
    /// Ticks to wait before the first batch.
    pub delay_ticks: u64,
    /// Ticks between consecutive batches.
    pub tick_delay: u64,
    /// Regions regenerated per batch.
    pub chunks_per_tick: u32,
    /// Chebyshev radius, in regions, that bounds a batch around its head.
    pub batch_radius: u32,
}

impl Default for PostResetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_ticks: 100,
            tick_delay: 1,
            chunks_per_tick: 1,
            batch_radius: 2,
        }
    }
}

/// Cosmetic border interpolation settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderConfig {
    /// Deploys the shrinking border when collapsing begins.
    pub enabled: bool,
    /// Ticks after both border and job finish before the original border returns.
    pub reset_delay_ticks: u64,
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reset_delay_ticks: 100,
        }
    }
}

fn clamp_radius(name: &str, value: f64, minimum: f64, maximum: Option<f64>) -> f64 {
    let mut clamped = if value.is_finite() { value } else { minimum };
    if clamped < minimum {
        clamped = minimum;
    }
    if let Some(maximum) = maximum {
        clamped = clamped.min(maximum);
    }
    if clamped != value {
        warn!("{name} {value} is out of range; clamping to {clamped}");
    }
    clamped
}

fn at_least_one(name: &str, value: u64) -> u64 {
    if value == 0 {
        warn!("{name} must be positive; clamping to 1");
        return 1;
    }
    value
}

fn radius_in_regions(radius: f64) -> u32 {
    let regions = (radius / f64::from(crate::REGION_EDGE)).ceil();
    if regions.is_finite() && regions >= 1.0 {
        regions.min(f64::from(u16::MAX)) as u32
    } else {
        1
    }
}
