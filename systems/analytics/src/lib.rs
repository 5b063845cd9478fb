#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure analytics system aggregating fleet telemetry into counters.
//!
//! The system consumes the event buffer the fleet fills during each tick and
//! folds it into a running [`StatsReport`]. It never touches the fleet or
//! the grid; feeding it the same event stream always yields the same report.

use gridway_core::{Event, StatsReport};

/// Accumulates fleet events into a running report.
#[derive(Clone, Debug, Default)]
pub struct Analytics {
    report: StatsReport,
}

impl Analytics {
    /// Creates an analytics system with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The report accumulated so far.
    #[must_use]
    pub const fn report(&self) -> &StatsReport {
        &self.report
    }

    /// Resets every counter and returns the report that was accumulated.
    pub fn take_report(&mut self) -> StatsReport {
        std::mem::take(&mut self.report)
    }

    /// Folds one tick's events into the report.
    pub fn handle(&mut self, events: &[Event]) {
        for event in events {
            match event {
                Event::MissionRequested { .. } => self.report.missions_requested += 1,
                Event::TaskAssigned { .. } => self.report.tasks_assigned += 1,
                Event::TaskCompleted { stats, .. } => {
                    self.report.tasks_completed += 1;
                    // Per-task wait accounting is only final at completion.
                    self.report.jam_time += stats.waiting_for_goal + stats.jammed;
                }
                Event::PathPlanned { .. } => self.report.paths_planned += 1,
                Event::ReplanFailed { .. } => self.report.replans_failed += 1,
                Event::AgentJammed { .. } => self.report.jams += 1,
                Event::AgentRedirected { .. } => self.report.redirects += 1,
                Event::RedirectExhausted { .. } => self.report.redirects_exhausted += 1,
                Event::AnchorFault { .. } => self.report.anchor_faults += 1,
                Event::PayloadPicked { .. } | Event::PayloadDropped { .. } => {
                    self.report.payload_transfers += 1;
                }
                Event::AgentResumed { .. } | Event::TransitionRejected { .. } => {}
            }
        }
    }
}
