use collapse_core::{CoordQueue, Event, PostResetConfig, RegionBackend, RegionCoord};
use collapse_system_snapshot::Snapshot;
use log::{debug, info};

/// Budgeted regeneration of collapsed regions.
///
/// Regions are queued in completion order. After an initial delay a batch
/// runs every `tick_delay` ticks; each batch takes up to `chunks_per_tick`
/// regions lying within `batch_radius` of the region at the queue head.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResetScheduler {
    config: PostResetConfig,
    queue: CoordQueue,
    delay_remaining: u64,
    countdown: u64,
}

impl ResetScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new(config: &PostResetConfig) -> Self {
        Self {
            config: *config,
            queue: CoordQueue::new(),
            delay_remaining: 0,
            countdown: 0,
        }
    }

    /// Restores the scheduler from the snapshot's reset fields.
    #[must_use]
    pub fn from_snapshot(config: &PostResetConfig, snapshot: &Snapshot) -> Self {
        Self {
            config: *config,
            queue: CoordQueue::from_packed(&snapshot.reset_queue),
            delay_remaining: snapshot.reset_delay,
            countdown: snapshot.reset_countdown,
        }
    }

    /// Writes the reset fields of the snapshot.
    pub fn persist(&self, snapshot: &mut Snapshot) {
        snapshot.reset_queue = self.queue.to_packed();
        snapshot.reset_delay = self.delay_remaining;
        snapshot.reset_countdown = self.countdown;
    }

    /// Queues a collapsed region for regeneration.
    ///
    /// Returns `false` when the region was already queued.
    pub fn enqueue(&mut self, coord: RegionCoord) -> bool {
        self.queue.push(coord)
    }

    /// Starts the initial delay. Called when resetting begins.
    pub fn begin(&mut self) {
        self.delay_remaining = self.config.delay_ticks;
        self.countdown = 0;
        info!(
            "resetting {} regions after {} ticks",
            self.queue.len(),
            self.delay_remaining
        );
    }

    /// Runs one tick of the schedule, returning the regions regenerated.
    pub fn tick<B: RegionBackend>(&mut self, backend: &mut B, out: &mut Vec<Event>) -> usize {
        if self.delay_remaining > 0 {
            self.delay_remaining -= 1;
            return 0;
        }
        if self.countdown > 0 {
            self.countdown -= 1;
            return 0;
        }
        let Some(head) = self.queue.front() else {
            return 0;
        };

        let radius = self.config.batch_radius;
        let batch = self
            .queue
            .take_matching(self.config.chunks_per_tick.max(1) as usize, |coord| {
                coord.chebyshev_distance(head) <= radius
            });

        let mut regenerated = 0;
        for coord in batch {
            match backend.regenerate(coord) {
                Ok(()) => {
                    regenerated += 1;
                    out.push(Event::RegionReset { coord });
                }
                Err(error) => debug!("reset skipped: {error}"),
            }
        }
        self.countdown = self.config.tick_delay.max(1) - 1;
        regenerated
    }

    /// Regions still waiting for regeneration.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Reports whether no region is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drops every queued region and timer.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.delay_remaining = 0;
        self.countdown = 0;
    }
}
