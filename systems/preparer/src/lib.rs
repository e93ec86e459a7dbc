#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Budgeted pre-generation and preload of the regions a collapse will touch.
//!
//! Both queues are built from the same set of concentric square rings around
//! the center region, outermost ring first. Pre-generation only forces the
//! regions to exist. Preload is populated once pre-generation completes and
//! pins every region it loads until the lifecycle releases them.

use std::collections::BTreeMap;

use collapse_core::{
    CollapseConfig, CoordQueue, Event, Materialization, PreGenConfig, PreloadConfig,
    PreparationStage, RegionBackend, RegionCoord,
};
use collapse_system_snapshot::{PinRecord, PreparationRecord, QueueRecord};
use log::{debug, info};

/// One budgeted preparation queue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreparationQueue {
    queue: CoordQueue,
    processed: u64,
    missing: u64,
    populated: bool,
    complete: bool,
    announced: bool,
}

impl PreparationQueue {
    /// Regions still waiting for an attempt.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Regions attempted so far.
    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.processed
    }

    /// Regions that could not be materialized.
    #[must_use]
    pub const fn missing(&self) -> u64 {
        self.missing
    }

    /// Reports whether the queue has been filled.
    #[must_use]
    pub const fn is_populated(&self) -> bool {
        self.populated
    }

    /// Reports whether the queue drained.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    fn populate<I: IntoIterator<Item = RegionCoord>>(&mut self, coords: I) {
        for coord in coords {
            let _ = self.queue.push(coord);
        }
        self.populated = true;
        self.complete = self.queue.is_empty();
    }

    fn complete_without_work(&mut self) {
        self.queue.clear();
        self.populated = true;
        self.complete = true;
    }

    /// Marks the queue announced, returning `true` the first time a
    /// completed queue is observed.
    fn take_announcement(&mut self) -> bool {
        if !self.complete || self.announced {
            return false;
        }
        self.announced = true;
        true
    }

    fn record(&self) -> QueueRecord {
        QueueRecord {
            pending: self.queue.to_packed(),
            processed: self.processed,
            missing: self.missing,
            populated: self.populated,
            complete: self.complete,
            announced: self.announced,
        }
    }

    fn from_record(record: &QueueRecord) -> Self {
        let queue = CoordQueue::from_packed(&record.pending);
        Self {
            complete: record.complete || (record.populated && queue.is_empty()),
            queue,
            processed: record.processed,
            missing: record.missing,
            populated: record.populated,
            announced: record.announced,
        }
    }
}

/// Materializes the destination area ahead of destructive edits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionPreparer {
    pre_gen: PreGenConfig,
    preload_config: PreloadConfig,
    center: Option<RegionCoord>,
    pre_generation: PreparationQueue,
    preload: PreparationQueue,
    pins: BTreeMap<RegionCoord, u32>,
}

impl RegionPreparer {
    /// Creates an idle preparer.
    #[must_use]
    pub fn new(config: &CollapseConfig) -> Self {
        Self {
            pre_gen: config.pre_gen,
            preload_config: config.preload,
            center: None,
            pre_generation: PreparationQueue::default(),
            preload: PreparationQueue::default(),
            pins: BTreeMap::new(),
        }
    }

    /// Restores a preparer from persisted queues and pins.
    ///
    /// Pins are only tracked; call [`RegionPreparer::resume_pins`] to
    /// re-register them with a freshly started backend.
    #[must_use]
    pub fn from_record(config: &CollapseConfig, record: &PreparationRecord) -> Self {
        let mut preparer = Self::new(config);
        preparer.center = record
            .center
            .map(RegionCoord::unpack)
            .filter(RegionCoord::is_addressable);
        preparer.pre_generation = PreparationQueue::from_record(&record.pre_generation);
        preparer.preload = PreparationQueue::from_record(&record.preload);
        if !preparer.pre_generation.is_complete() {
            preparer.preload = PreparationQueue::default();
        }
        for pin in &record.pinned {
            let coord = RegionCoord::unpack(pin.coord);
            if pin.count > 0 && coord.is_addressable() {
                let _ = preparer.pins.insert(coord, pin.count);
            }
        }
        preparer
    }

    /// Builds the pre-generation queue around the center region.
    ///
    /// Any previous preparation is discarded. Pins are left untouched.
    pub fn begin(&mut self, center: RegionCoord, out: &mut Vec<Event>) {
        self.center = Some(center);
        self.pre_generation = PreparationQueue::default();
        self.preload = PreparationQueue::default();

        if self.pre_gen.enabled {
            self.pre_generation.populate(rings(center, self.pre_gen.radius));
            info!(
                "pre-generation queued {} regions around {center}",
                self.pre_generation.pending()
            );
        } else {
            self.pre_generation.complete_without_work();
        }
        self.advance_pipeline(out);
    }

    /// Runs one budgeted step of the pipeline.
    ///
    /// Pre-generation is drained up to its budget before preload is
    /// considered. Returns the number of regions attempted on this tick.
    pub fn tick<B: RegionBackend>(&mut self, backend: &mut B, out: &mut Vec<Event>) -> u64 {
        let mut attempted = 0;

        if !self.pre_generation.is_complete() {
            let budget = self.pre_gen.chunks_per_tick as usize;
            let (processed, _) = self.prepare(PreparationStage::PreGeneration, backend, budget);
            attempted += processed;
        }
        self.advance_pipeline(out);

        if self.preload.is_populated() && !self.preload.is_complete() {
            let budget = self.preload_config.chunks_per_tick as usize;
            let (processed, _) = self.prepare(PreparationStage::Preload, backend, budget);
            attempted += processed;
        }
        self.advance_pipeline(out);

        attempted
    }

    /// Attempts up to `budget` regions of the stage's queue.
    ///
    /// Returns the number of regions attempted and the number still pending.
    /// Every region is attempted once; failures are counted as missing and
    /// never re-queued. Regions outside the governing border are missing
    /// without an attempt.
    pub fn prepare<B: RegionBackend>(
        &mut self,
        stage: PreparationStage,
        backend: &mut B,
        budget: usize,
    ) -> (u64, usize) {
        let border = backend.world_border();
        let mut processed = 0;
        let mut pinned = Vec::new();

        let queue = match stage {
            PreparationStage::PreGeneration => &mut self.pre_generation,
            PreparationStage::Preload => &mut self.preload,
        };
        if !queue.populated || queue.complete {
            return (0, queue.pending());
        }

        for _ in 0..budget {
            let Some(coord) = queue.queue.pop() else {
                break;
            };
            processed += 1;
            queue.processed += 1;

            if !border.admits(coord) {
                queue.missing += 1;
                debug!("{stage} skipped {coord}: outside the world border");
                continue;
            }

            let outcome = match stage {
                PreparationStage::PreGeneration => backend.generate(coord),
                PreparationStage::Preload => backend.load(coord),
            };
            match outcome {
                Ok(Materialization::AlreadyReady) | Ok(Materialization::Materialized) => {
                    if stage == PreparationStage::Preload {
                        pinned.push(coord);
                    }
                }
                Err(error) => {
                    queue.missing += 1;
                    debug!("{stage} could not materialize: {error}");
                }
            }
        }

        if queue.queue.is_empty() {
            queue.complete = true;
        }
        let pending = queue.pending();

        for coord in pinned {
            self.pin(coord, backend);
        }
        (processed, pending)
    }

    /// Reports whether both queues drained.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.pre_generation.is_complete() && self.preload.is_complete()
    }

    /// Pre-generation queue.
    #[must_use]
    pub const fn pre_generation(&self) -> &PreparationQueue {
        &self.pre_generation
    }

    /// Preload queue.
    #[must_use]
    pub const fn preload(&self) -> &PreparationQueue {
        &self.preload
    }

    /// Outstanding pins on the region.
    #[must_use]
    pub fn pin_count(&self, coord: RegionCoord) -> u32 {
        self.pins.get(&coord).copied().unwrap_or(0)
    }

    /// Number of regions currently pinned.
    #[must_use]
    pub fn pinned_regions(&self) -> usize {
        self.pins.len()
    }

    /// Adds a keep-resident reference to the region.
    pub fn pin<B: RegionBackend>(&mut self, coord: RegionCoord, backend: &mut B) {
        let count = self.pins.entry(coord).or_insert(0);
        *count += 1;
        if *count == 1 {
            backend.pin(coord);
        }
    }

    /// Drops a keep-resident reference from the region.
    pub fn unpin<B: RegionBackend>(&mut self, coord: RegionCoord, backend: &mut B) {
        let Some(count) = self.pins.get_mut(&coord) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            let _ = self.pins.remove(&coord);
            backend.unpin(coord);
        }
    }

    /// Re-registers every tracked pin with the backend.
    pub fn resume_pins<B: RegionBackend>(&self, backend: &mut B) {
        for coord in self.pins.keys() {
            backend.pin(*coord);
        }
    }

    /// Releases every pin at once.
    pub fn release<B: RegionBackend>(&mut self, backend: &mut B) {
        if !self.pins.is_empty() {
            debug!("releasing {} pinned regions", self.pins.len());
        }
        for coord in std::mem::take(&mut self.pins).into_keys() {
            backend.unpin(coord);
        }
    }

    /// Discards both queues. Pins must be released separately.
    pub fn reset(&mut self) {
        self.center = None;
        self.pre_generation = PreparationQueue::default();
        self.preload = PreparationQueue::default();
    }

    /// Captures queues and pins for persistence.
    #[must_use]
    pub fn record(&self) -> PreparationRecord {
        PreparationRecord {
            center: self.center.map(RegionCoord::pack),
            pre_generation: self.pre_generation.record(),
            preload: self.preload.record(),
            pinned: self
                .pins
                .iter()
                .map(|(coord, count)| PinRecord {
                    coord: coord.pack(),
                    count: *count,
                })
                .collect(),
        }
    }

    fn advance_pipeline(&mut self, out: &mut Vec<Event>) {
        if self.pre_generation.take_announcement() {
            announce(PreparationStage::PreGeneration, &self.pre_generation, out);
            match self.center {
                Some(center) if self.preload_config.enabled => {
                    self.preload.populate(rings(center, self.pre_gen.radius));
                    info!(
                        "preload queued {} regions around {center}",
                        self.preload.pending()
                    );
                }
                _ => self.preload.complete_without_work(),
            }
        }
        if self.preload.take_announcement() {
            announce(PreparationStage::Preload, &self.preload, out);
        }
    }
}

fn announce(stage: PreparationStage, queue: &PreparationQueue, out: &mut Vec<Event>) {
    info!(
        "{stage} complete: {} processed, {} missing",
        queue.processed, queue.missing
    );
    out.push(Event::PreparationComplete {
        stage,
        processed: queue.processed,
        missing: queue.missing,
    });
}

/// Concentric square rings around `center`, outermost ring first.
///
/// Each ring is walked row by row so the order is deterministic.
#[must_use]
pub fn rings(center: RegionCoord, radius: u32) -> Vec<RegionCoord> {
    let radius = i32::try_from(radius).unwrap_or(i32::MAX / 2);
    let mut coords = Vec::new();
    for ring in (0..=radius).rev() {
        for dz in -ring..=ring {
            for dx in -ring..=ring {
                if dx.abs() != ring && dz.abs() != ring {
                    continue;
                }
                if let Some(coord) = center.offset(dx, dz) {
                    coords.push(coord);
                }
            }
        }
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;
    use collapse_world::{query, World};

    fn config(radius: u32, per_tick: u32) -> CollapseConfig {
        let mut config = CollapseConfig::default();
        config.pre_gen.radius = radius;
        config.pre_gen.chunks_per_tick = per_tick;
        config.preload.chunks_per_tick = per_tick;
        config
    }

    #[test]
    fn rings_stop_at_the_edge_of_the_addressable_grid() {
        let corner = RegionCoord::new(collapse_core::MAX_REGION, collapse_core::MIN_REGION);
        let coords = rings(corner, 1);
        assert_eq!(coords.len(), 4);
        assert!(coords.iter().all(RegionCoord::is_addressable));
        assert_eq!(coords.last(), Some(&corner));
    }

    #[test]
    fn rings_run_outermost_first_without_duplicates() {
        let coords = rings(RegionCoord::new(0, 0), 2);
        assert_eq!(coords.len(), 25);
        let center = RegionCoord::new(0, 0);
        let distances: Vec<u32> = coords
            .iter()
            .map(|coord| coord.chebyshev_distance(center))
            .collect();
        assert!(distances.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(coords.last(), Some(&center));
        let queue: CoordQueue = coords.iter().copied().collect();
        assert_eq!(queue.len(), coords.len());
    }

    #[test]
    fn unavailable_regions_are_counted_once() {
        let mut world = World::default();
        world.mark_unavailable(RegionCoord::new(1, 1));
        let mut preparer = RegionPreparer::new(&config(1, 100));
        let mut events = Vec::new();
        preparer.begin(RegionCoord::new(0, 0), &mut events);

        let attempted = preparer.tick(&mut world, &mut events);
        assert_eq!(attempted, 18);
        assert_eq!(preparer.pre_generation().missing(), 1);
        assert_eq!(preparer.preload().missing(), 1);
        assert!(preparer.is_complete());
        assert_eq!(preparer.pinned_regions(), 8);
        assert!(query::is_pinned(&world, RegionCoord::new(0, 0)));
        assert!(!query::is_pinned(&world, RegionCoord::new(1, 1)));
    }

    #[test]
    fn regions_outside_the_border_are_missing_without_an_attempt() {
        let mut world = World::default();
        world.apply_border(collapse_core::WorldBorder::new(8.0, 8.0, 16.0));
        let mut preparer = RegionPreparer::new(&config(1, 100));
        let mut events = Vec::new();
        preparer.begin(RegionCoord::new(0, 0), &mut events);
        let _ = preparer.tick(&mut world, &mut events);

        assert_eq!(preparer.pre_generation().missing(), 4);
        assert!(!query::is_generated(&world, RegionCoord::new(1, 1)));
        assert!(query::is_generated(&world, RegionCoord::new(1, 0)));
    }

    #[test]
    fn preload_waits_for_pre_generation() {
        let mut world = World::default();
        let mut preparer = RegionPreparer::new(&config(2, 3));
        let mut events = Vec::new();
        preparer.begin(RegionCoord::new(5, -5), &mut events);

        while !preparer.pre_generation().is_complete() {
            assert_eq!(preparer.preload().pending(), 0);
            assert!(!preparer.preload().is_populated());
            let _ = preparer.tick(&mut world, &mut events);
        }
        while !preparer.is_complete() {
            let _ = preparer.tick(&mut world, &mut events);
        }

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

        let before = events.len();
        assert_eq!(preparer.tick(&mut world, &mut events), 0);
        assert_eq!(events.len(), before, "completion fires once");
    }

    #[test]
    fn disabled_stages_complete_without_work() {
        let mut world = World::default();
        let mut config = config(3, 1);
        config.pre_gen.enabled = false;
        config.preload.enabled = false;
        let mut preparer = RegionPreparer::new(&config);
        let mut events = Vec::new();
        preparer.begin(RegionCoord::new(0, 0), &mut events);

        assert!(preparer.is_complete());
        assert_eq!(preparer.tick(&mut world, &mut events), 0);
        assert_eq!(query::generation_count(&world), 0);
        assert_eq!(
            events,
            vec![
                Event::PreparationComplete {
                    stage: PreparationStage::PreGeneration,
                    processed: 0,
                    missing: 0,
                },
                Event::PreparationComplete {
                    stage: PreparationStage::Preload,
                    processed: 0,
                    missing: 0,
                },
            ]
        );
    }

    #[test]
    fn pins_are_reference_counted_and_released_together() {
        let mut world = World::default();
        let mut preparer = RegionPreparer::new(&config(0, 1));
        let coord = RegionCoord::new(2, 2);

        preparer.pin(coord, &mut world);
        preparer.pin(coord, &mut world);
        preparer.unpin(coord, &mut world);
        assert_eq!(preparer.pin_count(coord), 1);
        assert!(query::is_pinned(&world, coord));

        preparer.release(&mut world);
        assert_eq!(preparer.pinned_regions(), 0);
        assert_eq!(query::pinned_count(&world), 0);
    }

    #[test]
    fn record_round_trip_resumes_mid_queue() {
        let mut world = World::default();
        let config = config(2, 4);
        let mut preparer = RegionPreparer::new(&config);
        let mut events = Vec::new();
        preparer.begin(RegionCoord::new(0, 0), &mut events);
        for _ in 0..8 {
            let _ = preparer.tick(&mut world, &mut events);
        }

        let mut restored = RegionPreparer::from_record(&config, &preparer.record());
        assert_eq!(restored, preparer);

        let mut replica = world.clone();
        let mut original_events = Vec::new();
        let mut restored_events = Vec::new();
        for _ in 0..4 {
            let _ = preparer.tick(&mut world, &mut original_events);
            let _ = restored.tick(&mut replica, &mut restored_events);
        }
        assert_eq!(original_events, restored_events);
        assert_eq!(restored, preparer);
    }
}
