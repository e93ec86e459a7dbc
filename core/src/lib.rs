#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the collapse lifecycle engine.
//!
//! This crate defines the vocabulary that connects the host, the world
//! backend, and the lifecycle systems. Hosts submit [`Command`] values to arm
//! or cancel a collapse, drive the lifecycle by calling its `tick` entry point,
//! and observe the [`Event`] values it broadcasts. Every interaction with the
//! persistent world flows through the narrow [`RegionBackend`] seam so that no
//! system ever holds a reference to the world between calls.

use std::fmt;

use serde::{Deserialize, Serialize};

mod backend;
mod config;
mod queue;

pub use backend::{Materialization, RegionBackend, RegionUnavailable};
pub use config::{
    BorderConfig, CollapseConfig, CollapseWatchdogConfig, FuseWatchdogConfig, PostResetConfig,
    PreGenConfig, PreloadConfig, WatchdogConfig,
};
pub use queue::CoordQueue;

/// Number of cells along each horizontal edge of a region.
pub const REGION_EDGE: i32 = 16;

/// Smallest region index whose cells are addressable by a [`BlockPos`].
pub const MIN_REGION: i32 = i32::MIN.div_euclid(REGION_EDGE);

/// Largest region index whose cells are addressable by a [`BlockPos`].
pub const MAX_REGION: i32 = i32::MAX.div_euclid(REGION_EDGE);

/// Top-level lifecycle state of a collapse.
///
/// Exactly one phase is active at a time. Legal edges are described by
/// [`Phase::can_transition_to`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No collapse is armed; all lifecycle state is cleared.
    #[default]
    Dormant,
    /// The fuse is burning and the destination region is being prepared.
    Fusing,
    /// Destructive edits sweep across the collapse queue.
    Collapsing,
    /// Collapsed regions are regenerated in budgeted batches.
    Resetting,
    /// The lifecycle is winding down after an abort or skip.
    Dissipating,
}

impl Phase {
    /// Every phase in declaration order.
    pub const ALL: [Phase; 5] = [
        Phase::Dormant,
        Phase::Fusing,
        Phase::Collapsing,
        Phase::Resetting,
        Phase::Dissipating,
    ];

    /// Stable lowercase name used in snapshots and log records.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dormant => "dormant",
            Self::Fusing => "fusing",
            Self::Collapsing => "collapsing",
            Self::Resetting => "resetting",
            Self::Dissipating => "dissipating",
        }
    }

    /// Parses a phase from its stable name, ignoring ASCII case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Reports whether the phase belongs to an armed lifecycle.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Dormant)
    }

    /// Reports whether moving from `self` to `next` follows a legal edge.
    #[must_use]
    pub const fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Self::Dormant, Self::Fusing)
                | (Self::Fusing, Self::Collapsing)
                | (Self::Collapsing, Self::Resetting)
                | (Self::Collapsing, Self::Dormant)
                | (Self::Resetting, Self::Dormant)
                | (Self::Fusing, Self::Dissipating)
                | (Self::Collapsing, Self::Dissipating)
                | (Self::Resetting, Self::Dissipating)
                | (Self::Dissipating, Self::Dormant)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Packed two-dimensional coordinate of a single region ("chunk").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionCoord {
    x: i32,
    z: i32,
}

impl RegionCoord {
    /// Creates a region coordinate from its grid indices.
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Region containing the provided cell column.
    #[must_use]
    pub const fn containing(block_x: i32, block_z: i32) -> Self {
        Self {
            x: block_x.div_euclid(REGION_EDGE),
            z: block_z.div_euclid(REGION_EDGE),
        }
    }

    /// Grid index along the x axis.
    #[must_use]
    pub const fn x(&self) -> i32 {
        self.x
    }

    /// Grid index along the z axis.
    #[must_use]
    pub const fn z(&self) -> i32 {
        self.z
    }

    /// Packs the coordinate into a single 64-bit value.
    ///
    /// The low 32 bits carry `x`, the high 32 bits carry `z`.
    #[must_use]
    pub const fn pack(self) -> i64 {
        (self.x as u32 as i64) | ((self.z as i64) << 32)
    }

    /// Reverses [`RegionCoord::pack`].
    #[must_use]
    pub const fn unpack(packed: i64) -> Self {
        Self {
            x: packed as i32,
            z: (packed >> 32) as i32,
        }
    }

    /// The neighbour `dx` and `dz` regions away, if it is addressable.
    #[must_use]
    pub fn offset(self, dx: i32, dz: i32) -> Option<Self> {
        let coord = Self::new(self.x.checked_add(dx)?, self.z.checked_add(dz)?);
        coord.is_addressable().then_some(coord)
    }

    /// Reports whether every cell of the region fits in a [`BlockPos`].
    #[must_use]
    pub const fn is_addressable(&self) -> bool {
        self.x >= MIN_REGION
            && self.x <= MAX_REGION
            && self.z >= MIN_REGION
            && self.z <= MAX_REGION
    }

    /// Smallest cell x coordinate covered by the region.
    ///
    /// Saturates for regions that are not addressable.
    #[must_use]
    pub const fn min_block_x(&self) -> i32 {
        self.x.saturating_mul(REGION_EDGE)
    }

    /// Smallest cell z coordinate covered by the region.
    ///
    /// Saturates for regions that are not addressable.
    #[must_use]
    pub const fn min_block_z(&self) -> i32 {
        self.z.saturating_mul(REGION_EDGE)
    }

    /// Chebyshev distance between two regions measured in regions.
    #[must_use]
    pub fn chebyshev_distance(self, other: RegionCoord) -> u32 {
        self.x.abs_diff(other.x).max(self.z.abs_diff(other.z))
    }

    /// Euclidean distance in cells from the point to the nearest point of
    /// the region's column footprint. Zero when the region contains it.
    #[must_use]
    pub fn distance_to(&self, x: f64, z: f64) -> f64 {
        let edge = f64::from(REGION_EDGE);
        let min_x = f64::from(self.x) * edge;
        let min_z = f64::from(self.z) * edge;
        let dx = (min_x - x).max(0.0).max(x - (min_x + edge));
        let dz = (min_z - z).max(0.0).max(z - (min_z + edge));
        dx.hypot(dz)
    }

    /// Reports whether the region's footprint contains the cell column.
    #[must_use]
    pub const fn contains_column(&self, block_x: i32, block_z: i32) -> bool {
        block_x.div_euclid(REGION_EDGE) == self.x && block_z.div_euclid(REGION_EDGE) == self.z
    }
}

impl fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// Location of a single cell in the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    /// East-west coordinate.
    pub x: i32,
    /// Vertical coordinate.
    pub y: i32,
    /// North-south coordinate.
    pub z: i32,
}

impl BlockPos {
    /// Creates a new cell position.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Region whose footprint contains this position.
    #[must_use]
    pub const fn region(&self) -> RegionCoord {
        RegionCoord::containing(self.x, self.z)
    }
}

/// Content stored in a single cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    /// Nothing occupies the cell.
    #[default]
    Empty,
    /// A solid block identified by its content id.
    Solid(u16),
    /// A fluid identified by its content id.
    Fluid(u16),
}

impl Cell {
    /// Content id of the occupant, if any.
    #[must_use]
    pub const fn content_id(&self) -> Option<u16> {
        match self {
            Self::Empty => None,
            Self::Solid(id) | Self::Fluid(id) => Some(*id),
        }
    }
}

/// Predicate family deciding which cells of a bounding volume are edited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillShape {
    /// Shell of the configured thickness around the volume's faces.
    Outline,
    /// Horizontal band of the configured thickness.
    Row,
    /// Every cell of the volume.
    #[default]
    Matrix,
}

/// Direction in which the collapse radius travels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollapseDirection {
    /// Radius shrinks toward the center; outermost regions go first.
    #[default]
    Inward,
    /// Radius grows away from the center; innermost regions go first.
    Outward,
}

/// Circular world boundary as exposed by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldBorder {
    /// Center of the boundary along the x axis.
    pub center_x: f64,
    /// Center of the boundary along the z axis.
    pub center_z: f64,
    /// Diameter of the boundary measured in cells.
    pub diameter: f64,
}

impl WorldBorder {
    /// Creates a boundary description.
    #[must_use]
    pub const fn new(center_x: f64, center_z: f64, diameter: f64) -> Self {
        Self {
            center_x,
            center_z,
            diameter,
        }
    }

    /// Reports whether any part of the region lies inside the boundary.
    #[must_use]
    pub fn admits(&self, coord: RegionCoord) -> bool {
        coord.distance_to(self.center_x, self.center_z) <= self.diameter / 2.0
    }
}

/// Preparation pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PreparationStage {
    /// Forces regions to exist on disk.
    PreGeneration,
    /// Loads and pins regions so they stay resident.
    Preload,
}

impl fmt::Display for PreparationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreGeneration => f.write_str("pre-generation"),
            Self::Preload => f.write_str("preload"),
        }
    }
}

/// Phase-specific stall counter observed by the watchdog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StallKind {
    /// Fuse burned out but preparation is not advancing.
    Fuse,
    /// Collapse queue is not advancing.
    Collapse,
}

impl fmt::Display for StallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fuse => f.write_str("fuse"),
            Self::Collapse => f.write_str("collapse"),
        }
    }
}

/// Administrative triggers submitted by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Arms a collapse, moving the lifecycle out of dormancy.
    Arm {
        /// Human-readable trigger description recorded in logs.
        reason: String,
        /// Center to collapse around; the configured center is used when absent.
        center: Option<BlockPos>,
    },
    /// Cancels the active lifecycle immediately.
    Abort {
        /// Human-readable cancellation description recorded in logs.
        reason: String,
    },
    /// Moves the active lifecycle into dissipation on the next tick.
    ForceSkip {
        /// Human-readable skip description recorded in logs.
        reason: String,
    },
}

/// Outbound boundary progress notification.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressReport {
    /// Indicates whether the border interpolation is deployed.
    pub active: bool,
    /// Border center along the x axis.
    pub center_x: f64,
    /// Border center along the z axis.
    pub center_z: f64,
    /// Diameter at deployment.
    pub initial_diameter: f64,
    /// Interpolated diameter after the latest tick.
    pub current_diameter: f64,
    /// Diameter reached at the end of the interpolation.
    pub target_diameter: f64,
    /// Interpolation length in ticks.
    pub duration_ticks: i64,
    /// Ticks elapsed since deployment.
    pub elapsed_ticks: i64,
    /// Lifecycle phase when the report was produced.
    pub phase: Phase,
}

/// Events broadcast by the lifecycle while processing ticks and commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The lifecycle moved along a legal edge.
    PhaseChanged {
        /// Phase that was left.
        from: Phase,
        /// Phase that became active.
        to: Phase,
        /// Trigger that caused the transition.
        reason: String,
    },
    /// A preparation queue drained for the first time.
    PreparationComplete {
        /// Stage whose queue completed.
        stage: PreparationStage,
        /// Regions attempted by the stage.
        processed: u64,
        /// Regions that could not be materialized.
        missing: u64,
    },
    /// Every cell of a region passed the fill and drain passes.
    RegionCollapsed {
        /// Region that completed.
        coord: RegionCoord,
        /// Destructive edits spent on the region.
        operations: u64,
    },
    /// A region could not be read or written and was dropped from the queue.
    RegionSkipped {
        /// Region that was skipped.
        coord: RegionCoord,
    },
    /// All regions of a distance ring completed.
    RingCompleted {
        /// Ring index measured in region edges from the center.
        ring: u32,
        /// Regions completed or skipped so far.
        completed: u64,
        /// Regions queued when the job started.
        total: u64,
    },
    /// A collapsed region was regenerated.
    RegionReset {
        /// Region that was regenerated.
        coord: RegionCoord,
    },
    /// Boundary diameter or phase changed since the previous report.
    Progress(ProgressReport),
    /// The original world border was put back in place.
    BorderRestored {
        /// Border values that were restored.
        border: WorldBorder,
    },
    /// A stall counter crossed its warning threshold.
    StallWarning {
        /// Counter that crossed the threshold.
        kind: StallKind,
        /// Consecutive non-productive ticks observed.
        ticks: u64,
    },
    /// A stall counter crossed its abort threshold.
    StallAbort {
        /// Counter that crossed the threshold.
        kind: StallKind,
        /// Consecutive non-productive ticks observed.
        ticks: u64,
        /// Indicates whether the lifecycle skipped to dissipation.
        auto_skip: bool,
    },
}
