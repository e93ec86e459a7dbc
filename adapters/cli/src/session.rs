use collapse_core::{BlockPos, CollapseConfig, Command, Event, Phase};
use collapse_system_lifecycle::PhaseController;
use collapse_system_snapshot::Snapshot;
use collapse_world::{query, World};
use log::info;

/// Totals gathered while driving a lifecycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    /// Ticks executed.
    pub(crate) ticks: u32,
    /// Phase after the final tick.
    pub(crate) phase: Phase,
    /// Phases entered, in order.
    pub(crate) transitions: Vec<Phase>,
    /// Regions whose collapse finished.
    pub(crate) collapsed: u64,
    /// Regions dropped because they were unavailable.
    pub(crate) skipped: u64,
    /// Regions regenerated after the collapse.
    pub(crate) reset: u64,
    /// Stall warnings and aborts raised by the watchdog.
    pub(crate) stalls: u64,
    /// Single-cell edits applied to the world.
    pub(crate) edits: u64,
}

/// Lifecycle bound to an in-memory world.
pub(crate) struct Session {
    controller: PhaseController,
    world: World,
}

impl Session {
    /// Starts a dormant lifecycle, or resumes the provided snapshot.
    pub(crate) fn new(
        config: &CollapseConfig,
        mut world: World,
        resume: Option<&Snapshot>,
    ) -> Self {
        let controller = match resume {
            Some(snapshot) => {
                let controller = PhaseController::restore(config, snapshot);
                controller.resume_pins(&mut world);
                controller
            }
            None => PhaseController::new(config),
        };
        Self { controller, world }
    }

    /// Lifecycle driven by the session.
    pub(crate) const fn controller(&self) -> &PhaseController {
        &self.controller
    }

    /// Arms the lifecycle unless it is already active.
    pub(crate) fn arm(&mut self, center: Option<BlockPos>, events: &mut Vec<Event>) {
        let command = Command::Arm {
            reason: "command line".to_owned(),
            center,
        };
        self.controller.apply(command, &mut self.world, events);
    }

    /// Ticks until the lifecycle returns to dormancy or `max_ticks` elapse.
    ///
    /// Events already in `events` are reported first. Every later event is
    /// handed to `observer` as soon as its tick completes.
    pub(crate) fn run<F>(
        &mut self,
        events: &mut Vec<Event>,
        max_ticks: u32,
        mut observer: F,
    ) -> Summary
    where
        F: FnMut(&Event),
    {
        let mut summary = Summary::default();
        summary.drain(events, &mut observer);
        while summary.ticks < max_ticks && self.controller.phase().is_active() {
            self.controller.tick(&mut self.world, events);
            summary.ticks += 1;
            summary.drain(events, &mut observer);
        }
        summary.phase = self.controller.phase();
        summary.edits = query::edit_count(&self.world);
        info!(
            "stopped after {} ticks in phase {}",
            summary.ticks, summary.phase
        );
        summary
    }

    /// Snapshot of the current lifecycle.
    pub(crate) fn snapshot(&self) -> Snapshot {
        self.controller.snapshot()
    }
}

impl Summary {
    fn drain<F: FnMut(&Event)>(&mut self, events: &mut Vec<Event>, observer: &mut F) {
        for event in events.drain(..) {
            self.record(&event);
            observer(&event);
        }
    }

    fn record(&mut self, event: &Event) {
        match event {
            Event::PhaseChanged { to, .. } => self.transitions.push(*to),
            Event::RegionCollapsed { .. } => self.collapsed += 1,
            Event::RegionSkipped { .. } => self.skipped += 1,
            Event::RegionReset { .. } => self.reset += 1,
            Event::StallWarning { .. } | Event::StallAbort { .. } => self.stalls += 1,
            _ => {}
        }
    }
}
