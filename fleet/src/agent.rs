//! Per-agent state, the transition table, and the bounded history ring.

use std::collections::VecDeque;
use std::time::Duration;

use glam::Vec2;
use gridway_core::{
    AgentId, AgentState, CellCoord, FleetError, JamCause, Path, PayloadId, PlannerConfig, Task,
};
use gridway_planner::DstarLite;

/// One saved state entry: the state that was entered and the task that was
/// active at entry time.
#[derive(Clone, Debug)]
pub(crate) struct HistoryFrame {
    pub(crate) state: AgentState,
    pub(crate) task: Option<Task>,
}

/// Bounded ring of history frames; the oldest frame is evicted when a push
/// exceeds the configured depth.
#[derive(Clone, Debug)]
pub(crate) struct HistoryRing {
    frames: VecDeque<HistoryFrame>,
    depth: usize,
}

impl HistoryRing {
    pub(crate) fn new(depth: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(depth),
            depth,
        }
    }

    pub(crate) fn push(&mut self, frame: HistoryFrame) {
        if self.depth == 0 {
            return;
        }
        if self.frames.len() == self.depth {
            let _ = self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    pub(crate) fn pop(&mut self) -> Option<HistoryFrame> {
        self.frames.pop_back()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }
}

/// Jam excursion bookkeeping: why the agent halted and how long it has been
/// waiting.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Jam {
    pub(crate) cause: JamCause,
    pub(crate) elapsed: Duration,
}

/// One coordinated agent.
///
/// The fleet owns every agent and drives it through `tick`; nothing here is
/// visible outside the crate. Occupancy is always the last-committed cell
/// plus the next-target cell while one is claimed, so an agent mid-transit
/// blocks both endpoints of the edge it is crossing.
#[derive(Clone, Debug)]
pub(crate) struct Agent {
    pub(crate) id: AgentId,
    pub(crate) state: AgentState,
    pub(crate) position: Vec2,
    pub(crate) last_cell: CellCoord,
    pub(crate) next_cell: Option<CellCoord>,
    pub(crate) path: Path,
    pub(crate) task: Option<Task>,
    pub(crate) task_started: bool,
    pub(crate) redirect_goal: Option<CellCoord>,
    pub(crate) carrying: Option<PayloadId>,
    pub(crate) jam: Option<Jam>,
    pub(crate) handling_elapsed: Duration,
    pub(crate) history: HistoryRing,
    pub(crate) replanner: DstarLite,
    pub(crate) mission_pending: bool,
}

impl Agent {
    pub(crate) fn new(
        id: AgentId,
        cell: CellCoord,
        position: Vec2,
        history_depth: usize,
        planner_config: PlannerConfig,
    ) -> Self {
        Self {
            id,
            state: AgentState::Idle,
            position,
            last_cell: cell,
            next_cell: None,
            path: Path::default(),
            task: None,
            task_started: false,
            redirect_goal: None,
            carrying: None,
            jam: None,
            handling_elapsed: Duration::ZERO,
            history: HistoryRing::new(history_depth),
            replanner: DstarLite::new(planner_config),
            mission_pending: false,
        }
    }

    /// Cell the agent is currently steering toward: the redirect displacement
    /// while redirecting, otherwise the active task's goal.
    pub(crate) fn current_goal(&self) -> Option<CellCoord> {
        if self.state == AgentState::Redirecting {
            self.redirect_goal
        } else {
            self.task.as_ref().map(|task| task.goal)
        }
    }

    /// Reports whether the agent's occupancy claim covers the cell.
    pub(crate) fn occupies(&self, cell: CellCoord) -> bool {
        self.last_cell == cell || self.next_cell == Some(cell)
    }

    /// Transitions to `to`, recording a history frame unless the target is
    /// one of the excursion states (jamming, redirecting). Excursions keep
    /// the pre-interrupt frame on top of the ring so `restore` can return to
    /// it.
    pub(crate) fn set_to_state(&mut self, to: AgentState) -> Result<(), FleetError> {
        if !transition_allowed(self.state, to) {
            return Err(FleetError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        if !matches!(to, AgentState::Jamming | AgentState::Redirecting) {
            self.history.push(HistoryFrame {
                state: to,
                task: self.task.clone(),
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Registered transition table. Handling is terminal except for returning to
/// idle; every other state may be interrupted by an excursion.
fn transition_allowed(from: AgentState, to: AgentState) -> bool {
    if from == to {
        return true;
    }
    match (from, to) {
        (AgentState::Idle, AgentState::Handling) => false,
        (AgentState::Idle, _) => true,
        (AgentState::Handling, AgentState::Idle) => true,
        (AgentState::Handling, _) => false,
        (AgentState::Jamming | AgentState::Redirecting, _) => true,
        // Moving states may complete, interrupt, hand over to handling, or
        // re-anchor into another moving state.
        (moving, _) if moving.is_moving() => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridway_core::TaskKind;

    fn test_agent() -> Agent {
        Agent::new(
            AgentId::new(0),
            CellCoord::new(0, 0),
            Vec2::new(0.5, 0.5),
            4,
            PlannerConfig::default(),
        )
    }

    #[test]
    fn excursion_states_are_not_recorded() {
        let mut agent = test_agent();
        agent.task = Some(Task::new(TaskKind::Approach, CellCoord::new(3, 0)));
        agent.set_to_state(AgentState::Approaching).expect("start");
        assert_eq!(agent.history.len(), 1);

        agent.set_to_state(AgentState::Jamming).expect("jam");
        assert_eq!(agent.history.len(), 1);

        agent.set_to_state(AgentState::Redirecting).expect("redirect");
        assert_eq!(agent.history.len(), 1);

        let frame = agent.history.pop().expect("frame");
        assert_eq!(frame.state, AgentState::Approaching);
        assert_eq!(
            frame.task.map(|task| task.goal),
            Some(CellCoord::new(3, 0))
        );
    }

    #[test]
    fn handling_only_returns_to_idle() {
        let mut agent = test_agent();
        agent.set_to_state(AgentState::Retrieving).expect("move");
        agent.set_to_state(AgentState::Handling).expect("handle");

        let error = agent
            .set_to_state(AgentState::Approaching)
            .expect_err("handling must not resume movement directly");
        assert_eq!(
            error,
            FleetError::InvalidTransition {
                from: AgentState::Handling,
                to: AgentState::Approaching,
            }
        );

        agent.set_to_state(AgentState::Idle).expect("finish");
    }

    #[test]
    fn idle_cannot_enter_handling() {
        let mut agent = test_agent();
        assert!(agent.set_to_state(AgentState::Handling).is_err());
    }

    #[test]
    fn history_ring_evicts_the_oldest_frame() {
        let mut ring = HistoryRing::new(2);
        for column in 0..3 {
            ring.push(HistoryFrame {
                state: AgentState::Approaching,
                task: Some(Task::new(TaskKind::Approach, CellCoord::new(column, 0))),
            });
        }
        assert_eq!(ring.len(), 2);
        let newest = ring.pop().expect("newest");
        assert_eq!(
            newest.task.map(|task| task.goal),
            Some(CellCoord::new(2, 0))
        );
        let older = ring.pop().expect("older");
        assert_eq!(
            older.task.map(|task| task.goal),
            Some(CellCoord::new(1, 0))
        );
        assert!(ring.pop().is_none());
    }

    #[test]
    fn zero_depth_ring_records_nothing() {
        let mut ring = HistoryRing::new(0);
        ring.push(HistoryFrame {
            state: AgentState::Idle,
            task: None,
        });
        assert!(ring.pop().is_none());
    }
}
