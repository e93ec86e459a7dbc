#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Budgeted destructive edits across the collapse queue.
//!
//! The engine owns the radius-ordered queue of regions for one job. Each
//! tick it advances the schedule, then edits the regions the radius has
//! swept, front to back, until the operations budget runs out. Work inside a
//! region is tracked by a cursor so a pass interrupted by the budget resumes
//! at the exact cell where it stopped.

use std::collections::BTreeSet;

use collapse_core::{
    BlockPos, Cell, CollapseConfig, CollapseDirection, CoordQueue, Event, FillShape,
    RegionBackend, RegionCoord, RegionUnavailable, REGION_EDGE,
};
use collapse_system_snapshot::{CursorRecord, PassStage, Snapshot};
use log::{debug, info};

mod job;
mod reset;
mod shape;

pub use job::CollapseJob;
pub use reset::ResetScheduler;

use shape::{ShapeFilter, Volume};

/// Fill and budget parameters shared by every job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    fill_shape: FillShape,
    thickness: u32,
    max_operations_per_tick: u64,
    directional: bool,
    anchor: Option<BlockPos>,
    protected: BTreeSet<u16>,
}

impl EngineSettings {
    /// Extracts the engine parameters from the configuration.
    #[must_use]
    pub fn from_config(config: &CollapseConfig) -> Self {
        Self {
            fill_shape: config.fill_shape,
            thickness: config.thickness.max(1),
            max_operations_per_tick: config.max_operations_per_tick.max(1),
            directional: config.directional,
            anchor: config.anchor,
            protected: config.protected_blocks.iter().copied().collect(),
        }
    }

    /// Destructive edits permitted per tick.
    #[must_use]
    pub const fn max_operations_per_tick(&self) -> u64 {
        self.max_operations_per_tick
    }

    fn is_protected(&self, cell: Cell) -> bool {
        cell.content_id()
            .is_some_and(|id| self.protected.contains(&id))
    }

    fn volume(&self, coord: RegionCoord, height: (i32, i32)) -> Volume {
        match self.anchor {
            Some(anchor) if self.directional => {
                Volume::facing(coord, height, anchor, self.thickness)
            }
            _ => Volume::region(coord, height),
        }
    }
}

/// Resumption point inside the region at the front of the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    coord: RegionCoord,
    stage: PassStage,
    index: u64,
    operations: u64,
}

impl Cursor {
    const fn start(coord: RegionCoord) -> Self {
        Self {
            coord,
            stage: PassStage::Fill,
            index: 0,
            operations: 0,
        }
    }

    /// Region being edited.
    #[must_use]
    pub const fn coord(&self) -> RegionCoord {
        self.coord
    }

    /// Pass being executed.
    #[must_use]
    pub const fn stage(&self) -> PassStage {
        self.stage
    }

    /// Linear index of the next cell to visit.
    #[must_use]
    pub const fn index(&self) -> u64 {
        self.index
    }

    const fn record(&self) -> CursorRecord {
        CursorRecord {
            coord: self.coord.pack(),
            stage: self.stage,
            index: self.index,
            operations: self.operations,
        }
    }

    const fn from_record(record: &CursorRecord) -> Self {
        Self {
            coord: RegionCoord::unpack(record.coord),
            stage: record.stage,
            index: record.index,
            operations: record.operations,
        }
    }
}

/// Evidence gathered during one engine tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollapseTick {
    /// Destructive edits performed.
    pub operations: u64,
    /// Regions whose fill and drain passes finished.
    pub completed: Vec<RegionCoord>,
    /// Regions dropped because they could not be accessed.
    pub skipped: Vec<RegionCoord>,
    /// The front region is not swept by the radius yet.
    pub waiting_for_radius: bool,
    /// The front region was requested but is not resident yet.
    pub waiting_for_residency: bool,
    /// The radius reached its end value.
    pub schedule_finished: bool,
}

impl CollapseTick {
    /// Reports whether the tick counts as forward progress.
    ///
    /// Waiting for the radius is progress while the schedule is still
    /// running; waiting for residency never is.
    #[must_use]
    pub fn is_productive(&self) -> bool {
        self.operations > 0
            || !self.completed.is_empty()
            || !self.skipped.is_empty()
            || (self.waiting_for_radius && !self.schedule_finished)
    }
}

enum PassOutcome {
    Finished,
    Paused,
}

/// Destructive edit executor for one collapse job at a time.
#[derive(Clone, Debug, PartialEq)]
pub struct CollapseEngine {
    settings: EngineSettings,
    job: Option<CollapseJob>,
    queue: CoordQueue,
    elapsed: i64,
    cursor: Option<Cursor>,
    total: u64,
    completed: u64,
    skipped_missing: u64,
    last_ring: Option<u32>,
}

impl CollapseEngine {
    /// Creates an idle engine.
    #[must_use]
    pub fn new(config: &CollapseConfig) -> Self {
        Self {
            settings: EngineSettings::from_config(config),
            job: None,
            queue: CoordQueue::new(),
            elapsed: 0,
            cursor: None,
            total: 0,
            completed: 0,
            skipped_missing: 0,
            last_ring: None,
        }
    }

    /// Restores the engine from the snapshot's collapse fields.
    #[must_use]
    pub fn from_snapshot(config: &CollapseConfig, snapshot: &Snapshot) -> Self {
        let queue = CoordQueue::from_packed(&snapshot.collapse_queue);
        let cursor = snapshot
            .cursor
            .as_ref()
            .map(Cursor::from_record)
            .filter(|cursor| queue.front() == Some(cursor.coord));
        Self {
            settings: EngineSettings::from_config(config),
            job: snapshot.job.as_ref().map(CollapseJob::from_record),
            queue,
            elapsed: snapshot.elapsed_ticks.max(0),
            cursor,
            total: snapshot.collapse_total,
            completed: snapshot.collapse_completed,
            skipped_missing: snapshot.skipped_missing,
            last_ring: snapshot.last_ring,
        }
    }

    /// Writes the collapse fields of the snapshot.
    pub fn persist(&self, snapshot: &mut Snapshot) {
        snapshot.collapse_queue = self.queue.to_packed();
        snapshot.collapse_total = self.total;
        snapshot.collapse_completed = self.completed;
        snapshot.elapsed_ticks = self.elapsed;
        snapshot.job = self.job.as_ref().map(CollapseJob::record);
        snapshot.cursor = self.cursor.as_ref().map(Cursor::record);
        snapshot.skipped_missing = self.skipped_missing;
        snapshot.last_ring = self.last_ring;
    }

    /// Starts a job, queueing every region the radius will sweep.
    ///
    /// Inward jobs queue the farthest regions first and outward jobs the
    /// nearest. Equal distances are ordered by packed coordinate.
    pub fn start(&mut self, job: CollapseJob) {
        self.clear();
        for coord in sweep_order(&job) {
            let _ = self.queue.push(coord);
        }
        self.total = self.queue.len() as u64;
        info!(
            "collapse job around ({}, {}, {}) queued {} regions: radius {:.1} -> {:.1} over {} ticks",
            job.center().x,
            job.center().y,
            job.center().z,
            self.total,
            job.start_radius(),
            job.end_radius(),
            job.duration_ticks()
        );
        self.job = Some(job);
    }

    /// Advances the schedule by one tick and edits every swept region the
    /// budget allows.
    pub fn tick<B: RegionBackend>(
        &mut self,
        backend: &mut B,
        out: &mut Vec<Event>,
    ) -> CollapseTick {
        let mut report = CollapseTick::default();
        let Some(job) = self.job else {
            return report;
        };

        self.elapsed = self.elapsed.saturating_add(1).min(job.duration_ticks());
        report.schedule_finished = job.is_finished(self.elapsed);
        let center = job.center();
        let mut budget = self.settings.max_operations_per_tick;

        while let Some(coord) = self.queue.front() {
            let distance = region_distance(coord, center);
            if !job.is_due(distance, self.elapsed) {
                report.waiting_for_radius = true;
                break;
            }

            if !backend.is_resident(coord) {
                if let Err(error) = backend.request_residency(coord) {
                    self.skip(coord, &error, &mut report, out);
                    continue;
                }
                if !backend.is_resident(coord) {
                    report.waiting_for_residency = true;
                    break;
                }
            }

            match self.process(coord, center.y, backend, &mut budget, &mut report) {
                Ok(PassOutcome::Finished) => self.finish(coord, &mut report, out),
                Ok(PassOutcome::Paused) => break,
                Err(error) => self.skip(coord, &error, &mut report, out),
            }
        }

        report
    }

    /// Reports whether a job ran and its queue drained.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.job.is_some() && self.queue.is_empty()
    }

    /// Active job, if any.
    #[must_use]
    pub const fn job(&self) -> Option<&CollapseJob> {
        self.job.as_ref()
    }

    /// Ticks elapsed in the active job.
    #[must_use]
    pub const fn elapsed_ticks(&self) -> i64 {
        self.elapsed
    }

    /// Radius of the active job after the elapsed ticks.
    #[must_use]
    pub fn radius(&self) -> Option<f64> {
        self.job.map(|job| job.radius_at(self.elapsed))
    }

    /// Regions still queued.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Regions queued when the job started.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Regions completed or skipped so far.
    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.completed
    }

    /// Regions skipped because they could not be accessed.
    #[must_use]
    pub const fn skipped_missing(&self) -> u64 {
        self.skipped_missing
    }

    /// Distance ring of the most recently finished region.
    #[must_use]
    pub const fn last_ring(&self) -> Option<u32> {
        self.last_ring
    }

    /// Resumption point inside the front region.
    #[must_use]
    pub const fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Drops the job and every queued region.
    pub fn clear(&mut self) {
        self.job = None;
        self.queue.clear();
        self.elapsed = 0;
        self.cursor = None;
        self.total = 0;
        self.completed = 0;
        self.skipped_missing = 0;
        self.last_ring = None;
    }

    fn process<B: RegionBackend>(
        &mut self,
        coord: RegionCoord,
        center_y: i32,
        backend: &mut B,
        budget: &mut u64,
        report: &mut CollapseTick,
    ) -> Result<PassOutcome, RegionUnavailable> {
        let mut cursor = match self.cursor {
            Some(cursor) if cursor.coord == coord => cursor,
            _ => Cursor::start(coord),
        };
        let volume = self.settings.volume(coord, backend.height_range());
        let filter = ShapeFilter::new(
            self.settings.fill_shape,
            self.settings.thickness,
            center_y,
            &volume,
        );

        if cursor.stage == PassStage::Fill {
            let outcome = self.pass(&mut cursor, &volume, &filter, backend, budget, report);
            match outcome {
                Ok(PassOutcome::Finished) => {
                    cursor.stage = PassStage::Drain;
                    cursor.index = 0;
                }
                Ok(PassOutcome::Paused) => {
                    self.cursor = Some(cursor);
                    return Ok(PassOutcome::Paused);
                }
                Err(error) => {
                    self.cursor = None;
                    return Err(error);
                }
            }
        }

        if cursor.index == 0 && self.bulk_drain_allowed(&volume, &filter, backend, *budget) {
            let (min_y, max_y) = volume.height_range();
            let drained = match backend.clear_fluids(coord, min_y, max_y) {
                Ok(drained) => drained.min(*budget),
                Err(error) => {
                    self.cursor = None;
                    return Err(error);
                }
            };
            *budget -= drained;
            report.operations += drained;
            cursor.operations += drained;
            cursor.index = volume.len();
        }

        let outcome = self.pass(&mut cursor, &volume, &filter, backend, budget, report);
        self.cursor = outcome.is_ok().then_some(cursor);
        outcome
    }

    fn bulk_drain_allowed<B: RegionBackend>(
        &self,
        volume: &Volume,
        filter: &ShapeFilter,
        backend: &B,
        budget: u64,
    ) -> bool {
        filter.selects_every_cell()
            && volume.is_full()
            && self.settings.protected.is_empty()
            && budget >= volume.len()
            && backend.supports_bulk_fluid_clear()
    }

    /// Walks the volume from the cursor, editing members of the current pass.
    ///
    /// Cells that need no edit are visited for free; the pass pauses on the
    /// first cell that needs an edit once the budget is spent.
    fn pass<B: RegionBackend>(
        &self,
        cursor: &mut Cursor,
        volume: &Volume,
        filter: &ShapeFilter,
        backend: &mut B,
        budget: &mut u64,
        report: &mut CollapseTick,
    ) -> Result<PassOutcome, RegionUnavailable> {
        while let Some(pos) = volume.position(cursor.index) {
            if filter.contains(volume, pos) {
                let cell = backend.cell(pos)?;
                let targeted = match (cursor.stage, cell) {
                    (PassStage::Fill, Cell::Solid(_)) => !self.settings.is_protected(cell),
                    (PassStage::Drain, Cell::Fluid(_)) => !self.settings.is_protected(cell),
                    _ => false,
                };
                if targeted {
                    if *budget == 0 {
                        return Ok(PassOutcome::Paused);
                    }
                    backend.set_cell(pos, Cell::Empty)?;
                    *budget -= 1;
                    report.operations += 1;
                    cursor.operations += 1;
                }
            }
            cursor.index += 1;
        }
        Ok(PassOutcome::Finished)
    }

    fn finish(&mut self, coord: RegionCoord, report: &mut CollapseTick, out: &mut Vec<Event>) {
        let operations = self
            .cursor
            .take()
            .filter(|cursor| cursor.coord == coord)
            .map_or(0, |cursor| cursor.operations);
        let _ = self.queue.pop();
        self.completed += 1;
        report.completed.push(coord);
        debug!("collapsed region {coord} with {operations} edits");
        out.push(Event::RegionCollapsed { coord, operations });
        self.close_ring(coord, out);
    }

    fn skip(
        &mut self,
        coord: RegionCoord,
        error: &RegionUnavailable,
        report: &mut CollapseTick,
        out: &mut Vec<Event>,
    ) {
        let _ = self.queue.pop();
        self.cursor = None;
        self.completed += 1;
        self.skipped_missing += 1;
        report.skipped.push(coord);
        debug!("skipping collapse of region: {error}");
        out.push(Event::RegionSkipped { coord });
        self.close_ring(coord, out);
    }

    fn close_ring(&mut self, coord: RegionCoord, out: &mut Vec<Event>) {
        let Some(job) = self.job else {
            return;
        };
        let ring = ring_of(coord, job.center());
        self.last_ring = Some(ring);
        let next = self.queue.front().map(|next| ring_of(next, job.center()));
        if next == Some(ring) {
            return;
        }
        info!(
            "ring {ring} complete: {}/{} regions ({} skipped)",
            self.completed, self.total, self.skipped_missing
        );
        out.push(Event::RingCompleted {
            ring,
            completed: self.completed,
            total: self.total,
        });
    }
}

/// Distance in cells from the center column to the region's footprint.
#[must_use]
pub fn region_distance(coord: RegionCoord, center: BlockPos) -> f64 {
    coord.distance_to(f64::from(center.x), f64::from(center.z))
}

/// Ring index of the region, measured in region edges from the center.
#[must_use]
pub fn ring_of(coord: RegionCoord, center: BlockPos) -> u32 {
    let ring = (region_distance(coord, center) / f64::from(REGION_EDGE)).floor();
    if ring.is_finite() && ring >= 0.0 {
        ring.min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

/// Every region the job sweeps, in processing order.
///
/// Inward jobs leave regions lying entirely inside the end radius alone.
#[must_use]
pub fn sweep_order(job: &CollapseJob) -> Vec<RegionCoord> {
    let center = job.center();
    let outer = job.outer_radius();
    let inner = match job.direction() {
        CollapseDirection::Inward => job.end_radius(),
        CollapseDirection::Outward => 0.0,
    };
    let center_region = center.region();
    let reach = (outer / f64::from(REGION_EDGE)).ceil().min(f64::from(u16::MAX)) as i32 + 1;

    let mut candidates: Vec<(f64, RegionCoord)> = Vec::new();
    for dz in -reach..=reach {
        for dx in -reach..=reach {
            let Some(coord) = center_region.offset(dx, dz) else {
                continue;
            };
            let distance = region_distance(coord, center);
            if distance <= outer && distance >= inner {
                candidates.push((distance, coord));
            }
        }
    }

    candidates.sort_by(|(a_distance, a), (b_distance, b)| {
        let by_distance = match job.direction() {
            CollapseDirection::Inward => b_distance.total_cmp(a_distance),
            CollapseDirection::Outward => a_distance.total_cmp(b_distance),
        };
        by_distance.then_with(|| a.pack().cmp(&b.pack()))
    });
    candidates.into_iter().map(|(_, coord)| coord).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use collapse_world::{query, Terrain, World, WorldSettings, STONE, WATER};

    fn flat_world(height: i32) -> World {
        World::new(WorldSettings {
            min_y: 0,
            max_y: 4,
            terrain: Terrain::Flat {
                height,
                block: STONE,
            },
            ..WorldSettings::default()
        })
    }

    fn config(max_ops: u64) -> CollapseConfig {
        CollapseConfig {
            start_radius: 10.0,
            end_radius: 0.0,
            duration_ticks: 20,
            max_operations_per_tick: max_ops,
            fill_shape: FillShape::Matrix,
            thickness: 1,
            ..CollapseConfig::default()
        }
    }

    fn job(config: &CollapseConfig) -> CollapseJob {
        CollapseJob::from_config(config, BlockPos::new(8, 2, 8))
    }

    #[test]
    fn inward_sweep_orders_farthest_first() {
        let order = sweep_order(&job(&config(1)));
        assert_eq!(order.len(), 5);
        assert_eq!(order.last(), Some(&RegionCoord::new(0, 0)));
        let packed: Vec<i64> = order[..4].iter().map(|coord| coord.pack()).collect();
        let mut sorted = packed.clone();
        sorted.sort_unstable();
        assert_eq!(packed, sorted);
    }

    #[test]
    fn inward_sweep_spares_the_end_radius() {
        let mut config = config(1);
        config.end_radius = 4.0;
        let order = sweep_order(&job(&config));
        assert_eq!(order.len(), 4);
        assert!(!order.contains(&RegionCoord::new(0, 0)));
    }

    #[test]
    fn outward_sweep_orders_nearest_first() {
        let mut config = config(1);
        config.direction = CollapseDirection::Outward;
        let order = sweep_order(&job(&config));
        assert_eq!(order.first(), Some(&RegionCoord::new(0, 0)));
    }

    #[test]
    fn operations_never_exceed_budget_and_resume_exactly() {
        let mut world = flat_world(2);
        let config = config(100);
        let mut engine = CollapseEngine::new(&config);
        engine.start(job(&config));

        let mut events = Vec::new();
        let mut total_operations = 0;
        for _ in 0..200 {
            let tick = engine.tick(&mut world, &mut events);
            assert!(tick.operations <= 100);
            total_operations += tick.operations;
            if engine.is_done() {
                break;
            }
        }

        assert!(engine.is_done());
        assert_eq!(total_operations, 5 * 512);
        assert_eq!(query::edit_count(&world), 5 * 512);
        for coord in [RegionCoord::new(0, 0), RegionCoord::new(1, 0)] {
            assert_eq!(query::solid_cells(&world, coord), 0);
        }
        let collapsed: Vec<u64> = events
            .iter()
            .filter_map(|event| match event {
                Event::RegionCollapsed { operations, .. } => Some(*operations),
                _ => None,
            })
            .collect();
        assert_eq!(collapsed, vec![512; 5]);
    }

    #[test]
    fn protected_cells_are_left_in_place() {
        let mut world = flat_world(2);
        let mut config = config(10_000);
        config.protected_blocks = vec![STONE];
        let mut engine = CollapseEngine::new(&config);
        engine.start(job(&config));
        let mut events = Vec::new();
        for _ in 0..20 {
            let _ = engine.tick(&mut world, &mut events);
        }
        assert!(engine.is_done());
        assert_eq!(query::edit_count(&world), 0);
        assert_eq!(query::solid_cells(&world, RegionCoord::new(0, 0)), 512);
    }

    #[test]
    fn fluids_drain_after_the_fill_pass() {
        let mut world = flat_world(1);
        let mut config = config(10_000);
        config.start_radius = 0.0;
        for x in 0..4 {
            world.place(BlockPos::new(x, 2, 0), Cell::Fluid(WATER));
        }
        let mut engine = CollapseEngine::new(&config);
        engine.start(job(&config));
        assert_eq!(engine.pending(), 1);

        let mut events = Vec::new();
        let tick = engine.tick(&mut world, &mut events);
        assert_eq!(tick.completed, vec![RegionCoord::new(0, 0)]);
        assert_eq!(tick.operations, 256 + 4);
        assert_eq!(query::fluid_cells(&world, RegionCoord::new(0, 0)), 0);
    }

    #[test]
    fn drain_pass_is_budgeted_without_bulk_clear() {
        let mut world = World::new(WorldSettings {
            min_y: 0,
            max_y: 4,
            terrain: Terrain::Empty,
            bulk_fluid_clear: false,
            ..WorldSettings::default()
        });
        for x in 0..10 {
            world.place(BlockPos::new(x, 0, 5), Cell::Fluid(WATER));
        }
        let mut config = config(3);
        config.start_radius = 0.0;
        let mut engine = CollapseEngine::new(&config);
        engine.start(job(&config));

        let mut events = Vec::new();
        let operations: Vec<u64> = (0..4)
            .map(|_| engine.tick(&mut world, &mut events).operations)
            .collect();
        assert_eq!(operations, vec![3, 3, 3, 1]);
        assert!(engine.is_done());
    }

    #[test]
    fn unavailable_regions_are_skipped_and_counted() {
        let mut world = flat_world(2);
        world.mark_unavailable(RegionCoord::new(1, 0));
        let config = config(10_000);
        let mut engine = CollapseEngine::new(&config);
        engine.start(job(&config));

        let mut events = Vec::new();
        for _ in 0..20 {
            let _ = engine.tick(&mut world, &mut events);
        }
        assert!(engine.is_done());
        assert_eq!(engine.skipped_missing(), 1);
        assert_eq!(engine.completed(), 5);
        assert!(events.contains(&Event::RegionSkipped {
            coord: RegionCoord::new(1, 0)
        }));
    }

    #[test]
    fn stuck_regions_wait_without_progress() {
        let mut world = flat_world(2);
        let config = config(10_000);
        let mut engine = CollapseEngine::new(&config);
        let job = job(&config);
        engine.start(job);
        let front = engine.queue.front().expect("queued region");
        world.mark_stuck(front);

        let mut events = Vec::new();
        let mut last = CollapseTick::default();
        for _ in 0..30 {
            last = engine.tick(&mut world, &mut events);
        }
        assert!(last.waiting_for_residency);
        assert!(!last.is_productive());
        assert_eq!(engine.pending(), 5);
    }

    #[test]
    fn rings_complete_once_per_distance_band() {
        let mut world = flat_world(1);
        let mut config = config(100_000);
        config.start_radius = 40.0;
        config.max_radius = 40.0;
        config.duration_ticks = 1;
        let mut engine = CollapseEngine::new(&config);
        engine.start(job(&config));
        let mut events = Vec::new();
        let _ = engine.tick(&mut world, &mut events);
        assert!(engine.is_done());

        let rings: Vec<u32> = events
            .iter()
            .filter_map(|event| match event {
                Event::RingCompleted { ring, .. } => Some(*ring),
                _ => None,
            })
            .collect();
        assert_eq!(rings, vec![2, 1, 0]);
        assert_eq!(
            events.last(),
            Some(&Event::RingCompleted {
                ring: 0,
                completed: engine.total(),
                total: engine.total(),
            })
        );
    }

    #[test]
    fn directional_mode_edits_only_the_facing_slab() {
        let mut world = flat_world(2);
        let mut config = config(10_000);
        config.start_radius = 8.0;
        config.directional = true;
        config.anchor = Some(BlockPos::new(200, 0, 8));
        let mut engine = CollapseEngine::new(&config);
        engine.start(job(&config));
        let mut events = Vec::new();
        for _ in 0..20 {
            let _ = engine.tick(&mut world, &mut events);
        }
        assert!(engine.is_done());
        assert_eq!(query::solid_cells(&world, RegionCoord::new(1, 0)), 512 - 2 * 16);
        assert_eq!(query::solid_cells(&world, RegionCoord::new(0, 0)), 512 - 2 * 16);
    }

    #[test]
    fn snapshot_resumes_mid_region() {
        let mut world = flat_world(2);
        let config = config(300);
        let mut engine = CollapseEngine::new(&config);
        engine.start(job(&config));
        let mut events = Vec::new();
        for _ in 0..5 {
            let _ = engine.tick(&mut world, &mut events);
        }
        assert!(engine.cursor().is_some());

        let mut snapshot = Snapshot::default();
        engine.persist(&mut snapshot);
        let mut restored = CollapseEngine::from_snapshot(&config, &snapshot);
        assert_eq!(restored, engine);

        let mut replica = world.clone();
        let mut original_events = Vec::new();
        let mut restored_events = Vec::new();
        for _ in 0..30 {
            let a = engine.tick(&mut world, &mut original_events);
            let b = restored.tick(&mut replica, &mut restored_events);
            assert_eq!(a, b);
        }
        assert_eq!(original_events, restored_events);
    }
}
