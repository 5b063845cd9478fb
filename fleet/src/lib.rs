#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Multi-agent coordination over a grid graph.
//!
//! The [`Fleet`] owns every agent and advances them sequentially each tick
//! in registration order. A moving agent commits one cell at a time: its
//! occupancy claim is always the last-committed cell plus the next-target
//! cell, so crossing an edge blocks both endpoints. Conflicts with nearby
//! agents are classified per neighbor and the worst decision in the
//! neighborhood is applied. Everything the fleet does is reported through
//! [`Event`] values pushed to the caller's buffer; the fleet never calls
//! back into its collaborators.

use std::time::Duration;

use glam::Vec2;
use gridway_core::{
    AgentId, AgentState, CellCoord, Decision, Event, FleetConfig, FleetError, JamCause,
    PlannerConfig, StartAnchor, Task, TaskKind,
};
use gridway_graph::GridGraph;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

mod agent;
mod conflict;

use agent::{Agent, HistoryFrame, Jam};

/// Squared world-distance under which a position counts as on a cell center.
const POSITION_EPSILON: f32 = f32::EPSILON;

/// Container and sequential scheduler for a set of coordinated agents.
#[derive(Clone, Debug)]
pub struct Fleet {
    config: FleetConfig,
    planner_config: PlannerConfig,
    agents: Vec<Agent>,
    rng: ChaCha8Rng,
    next_id: u32,
}

impl Fleet {
    /// Creates an empty fleet. The planner configuration seeds each agent's
    /// incremental replanner; the RNG seed makes redirect tie-breaking
    /// reproducible.
    #[must_use]
    pub fn new(config: FleetConfig, planner_config: PlannerConfig) -> Self {
        Self {
            config,
            planner_config,
            agents: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            next_id: 0,
        }
    }

    /// Configuration the fleet was constructed with.
    #[must_use]
    pub const fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Adds an idle agent parked on the given cell and returns its id.
    pub fn register_agent(&mut self, grid: &GridGraph, cell: CellCoord) -> AgentId {
        let id = AgentId::new(self.next_id);
        self.next_id += 1;
        self.agents.push(Agent::new(
            id,
            cell,
            grid.cell_center(cell),
            self.config.history_depth,
            self.planner_config,
        ));
        id
    }

    /// Queues a task for the agent, superseding any active one. The current
    /// path is discarded and a handling phase in progress is cancelled; the
    /// committed next-target claim survives so the new plan can anchor on
    /// it. Returns `false` for an unknown agent id.
    #[must_use]
    pub fn assign_task(&mut self, agent: AgentId, task: Task, out_events: &mut Vec<Event>) -> bool {
        let Some(index) = self.index_of(agent) else {
            return false;
        };
        let goal = task.goal;
        let entry = &mut self.agents[index];
        if entry.state == AgentState::Handling {
            // The transfer in progress is abandoned; its payload action only
            // runs when the phase times out, so nothing needs undoing.
            entry.handling_elapsed = Duration::ZERO;
            if let Err(error) = entry.set_to_state(AgentState::Idle) {
                out_events.push(Event::TransitionRejected {
                    agent: entry.id,
                    error,
                });
            }
        }
        entry.path.clear();
        entry.task = Some(task);
        entry.task_started = false;
        entry.mission_pending = false;
        out_events.push(Event::TaskAssigned { agent, goal });
        true
    }

    /// Advances every agent by `dt`, in registration order.
    ///
    /// `nearby` is the external proximity query: given an agent id and its
    /// position it returns the ids of agents close enough to matter for
    /// conflict resolution (the fleet filters out the agent itself). All
    /// telemetry is appended to `out_events`.
    pub fn tick<P>(
        &mut self,
        grid: &mut GridGraph,
        dt: Duration,
        nearby: P,
        out_events: &mut Vec<Event>,
    ) where
        P: Fn(AgentId, Vec2) -> Vec<AgentId>,
    {
        for index in 0..self.agents.len() {
            match self.agents[index].state {
                AgentState::Idle => self.tick_idle(index, grid, out_events),
                AgentState::Jamming => self.tick_jamming(index, grid, dt, out_events),
                AgentState::Handling => self.tick_handling(index, grid, dt, out_events),
                _ => self.tick_moving(index, grid, dt, &nearby, out_events),
            }
        }
    }

    pub(crate) fn index_of(&self, id: AgentId) -> Option<usize> {
        self.agents.iter().position(|agent| agent.id == id)
    }

    fn tick_idle(&mut self, index: usize, grid: &GridGraph, out_events: &mut Vec<Event>) {
        if self.agents[index].task.is_some() {
            self.start_task(index, grid, out_events);
            return;
        }
        let agent = &mut self.agents[index];
        if !agent.mission_pending {
            agent.mission_pending = true;
            out_events.push(Event::MissionRequested { agent: agent.id });
        }
    }

    fn tick_jamming(
        &mut self,
        index: usize,
        grid: &GridGraph,
        dt: Duration,
        out_events: &mut Vec<Event>,
    ) {
        let Some(mut jam) = self.agents[index].jam else {
            // No timer was recorded; recover immediately.
            self.restore(index, grid, out_events);
            return;
        };
        jam.elapsed += dt;
        if jam.elapsed < self.config.jam_wait {
            self.agents[index].jam = Some(jam);
            return;
        }

        let agent = &mut self.agents[index];
        if agent.task_started {
            if let Some(task) = agent.task.as_mut() {
                match jam.cause {
                    JamCause::GoalBusy => task.stats.waiting_for_goal += jam.elapsed,
                    JamCause::TransitBlocked => task.stats.jammed += jam.elapsed,
                }
            }
        }
        agent.jam = None;
        let id = agent.id;
        self.restore(index, grid, out_events);
        out_events.push(Event::AgentResumed { agent: id });
    }

    fn tick_handling(
        &mut self,
        index: usize,
        grid: &mut GridGraph,
        dt: Duration,
        out_events: &mut Vec<Event>,
    ) {
        let agent = &mut self.agents[index];
        agent.handling_elapsed += dt;
        if agent.handling_elapsed < self.config.handling_duration {
            return;
        }
        agent.handling_elapsed = Duration::ZERO;

        match agent.task.as_ref().map(|task| task.kind) {
            Some(TaskKind::Retrieve) => {
                if agent.carrying.is_none() {
                    if let Some(payload) = grid.take_payload(agent.last_cell) {
                        agent.carrying = Some(payload);
                        out_events.push(Event::PayloadPicked {
                            agent: agent.id,
                            payload,
                        });
                    }
                }
            }
            Some(TaskKind::Deliver) => {
                if let Some(payload) = agent.carrying.take() {
                    grid.set_payload(agent.last_cell, Some(payload));
                    out_events.push(Event::PayloadDropped {
                        agent: agent.id,
                        payload,
                    });
                }
            }
            _ => {}
        }
        self.complete_task(index, out_events);
    }

    fn tick_moving<P>(
        &mut self,
        index: usize,
        grid: &GridGraph,
        dt: Duration,
        nearby: &P,
        out_events: &mut Vec<Event>,
    ) where
        P: Fn(AgentId, Vec2) -> Vec<AgentId>,
    {
        if !self.agents[index].task_started
            && self.agents[index].state != AgentState::Redirecting
            && self.agents[index].task.is_some()
        {
            // A superseding task arrived mid-route.
            self.start_task(index, grid, out_events);
            return;
        }

        let Some(goal) = self.agents[index].current_goal() else {
            self.complete_task(index, out_events);
            return;
        };

        // Acquire a next-target claim when none is held.
        if self.agents[index].next_cell.is_none() {
            let popped = self.agents[index].path.advance();
            match popped {
                Some(cell) => self.agents[index].next_cell = Some(cell),
                None => {
                    if self.agents[index].last_cell == goal {
                        self.arrive(index, grid, out_events);
                    } else if self.agents[index].state == AgentState::Redirecting {
                        let id = self.agents[index].id;
                        self.agents[index].redirect_goal = None;
                        self.restore(index, grid, out_events);
                        out_events.push(Event::AgentResumed { agent: id });
                    } else {
                        // Path exhausted short of the goal; re-anchor.
                        if let Some(task) = self.agents[index].task.as_mut() {
                            task.anchor = StartAnchor::NearestCell;
                        }
                        self.start_task(index, grid, out_events);
                    }
                    return;
                }
            }
        }
        let Some(next) = self.agents[index].next_cell else {
            return;
        };
        let next_center = grid.cell_center(next);

        // Commit the claim once its center is reached; movement resumes next
        // tick against the following claim.
        if self.agents[index].position.distance_squared(next_center) <= POSITION_EPSILON {
            let agent = &mut self.agents[index];
            agent.position = next_center;
            agent.last_cell = next;
            agent.next_cell = None;
            if agent.path.is_empty() && next == goal {
                self.arrive(index, grid, out_events);
            } else {
                self.agents[index].next_cell = self.agents[index].path.advance();
            }
            return;
        }

        let neighbor_ids = nearby(self.agents[index].id, self.agents[index].position);
        let resolution = conflict::resolve(self, grid, index, &neighbor_ids, out_events);
        match resolution.decision {
            Decision::Ignore => {
                advance_position(&mut self.agents[index], next_center, self.config.speed, dt);
            }
            Decision::Wait => {
                let cause = if resolution.goal_blocked {
                    JamCause::GoalBusy
                } else {
                    JamCause::TransitBlocked
                };
                jam_agent(&mut self.agents[index], cause, out_events);
            }
            Decision::Dodge => self.dodge(index, grid, &resolution.obstacles, out_events),
            Decision::Deflected => {}
        }
    }

    /// Starts (or restarts) the agent's queued task: resolves the start
    /// anchor, enters the task's moving state, and runs a full incremental
    /// plan toward the goal.
    fn start_task(&mut self, index: usize, grid: &GridGraph, out_events: &mut Vec<Event>) {
        enum PlanFrom {
            Last,
            Next(CellCoord),
        }

        let agent = &mut self.agents[index];
        let Some(task) = agent.task.clone() else {
            return;
        };

        let plan_from = match task.anchor {
            StartAnchor::LastCell => PlanFrom::Last,
            StartAnchor::NextCell => match agent.next_cell {
                Some(next) => PlanFrom::Next(next),
                None => PlanFrom::Last,
            },
            StartAnchor::NearestCell => {
                let nearest = grid.nearest_cell(agent.position);
                if nearest == agent.last_cell {
                    PlanFrom::Last
                } else if agent.next_cell == Some(nearest) {
                    PlanFrom::Next(nearest)
                } else {
                    let error = FleetError::InconsistentAnchor {
                        nearest,
                        last: agent.last_cell,
                        next: agent.next_cell,
                    };
                    out_events.push(Event::AnchorFault {
                        agent: agent.id,
                        error,
                    });
                    return;
                }
            }
        };

        if let Err(error) = agent.set_to_state(AgentState::for_task(task.kind)) {
            out_events.push(Event::TransitionRejected {
                agent: agent.id,
                error,
            });
            return;
        }
        agent.task_started = true;
        agent.redirect_goal = None;
        agent.jam = None;

        let start = match plan_from {
            PlanFrom::Last => agent.last_cell,
            PlanFrom::Next(next) => next,
        };
        match agent.replanner.initialize(grid, start, task.goal) {
            Some(mut path) => {
                out_events.push(Event::PathPlanned {
                    agent: agent.id,
                    length: path.len(),
                });
                // The leading cell is the plan start itself.
                let _ = path.advance();
                agent.path = path;
                if matches!(plan_from, PlanFrom::Last) {
                    agent.next_cell = agent.path.advance();
                }
            }
            None => {
                out_events.push(Event::ReplanFailed { agent: agent.id });
                jam_agent(agent, JamCause::TransitBlocked, out_events);
            }
        }
    }

    /// Replans around the conflicting neighborhood using the agent's
    /// incremental replanner with the neighbors' occupancy as dynamic
    /// obstacles. Falls back to a nearest-cell re-anchor when no route
    /// survives.
    fn dodge(
        &mut self,
        index: usize,
        grid: &GridGraph,
        obstacles: &[CellCoord],
        out_events: &mut Vec<Event>,
    ) {
        if self.agents[index].state == AgentState::Redirecting {
            // A single-hop displacement has no alternate route; sit it out.
            jam_agent(
                &mut self.agents[index],
                JamCause::TransitBlocked,
                out_events,
            );
            return;
        }

        let replanned = {
            let agent = &mut self.agents[index];
            agent
                .replanner
                .update_with_dynamic_obstacles(grid, agent.last_cell, obstacles)
        };
        match replanned {
            Some(mut path) => {
                out_events.push(Event::PathPlanned {
                    agent: self.agents[index].id,
                    length: path.len(),
                });
                let _ = path.advance();
                let agent = &mut self.agents[index];
                agent.path = path;
                agent.next_cell = agent.path.advance();
            }
            None => {
                out_events.push(Event::ReplanFailed {
                    agent: self.agents[index].id,
                });
                if let Some(task) = self.agents[index].task.as_mut() {
                    task.anchor = StartAnchor::NearestCell;
                }
                self.start_task(index, grid, out_events);
            }
        }
    }

    /// Handles the arrival condition for the agent's current state.
    fn arrive(&mut self, index: usize, grid: &GridGraph, out_events: &mut Vec<Event>) {
        match self.agents[index].state {
            AgentState::Redirecting => {
                let id = self.agents[index].id;
                self.agents[index].redirect_goal = None;
                self.restore(index, grid, out_events);
                out_events.push(Event::AgentResumed { agent: id });
            }
            AgentState::Approaching => self.complete_task(index, out_events),
            AgentState::Retrieving | AgentState::Delivering => {
                let agent = &mut self.agents[index];
                match agent.set_to_state(AgentState::Handling) {
                    Ok(()) => agent.handling_elapsed = Duration::ZERO,
                    Err(error) => out_events.push(Event::TransitionRejected {
                        agent: agent.id,
                        error,
                    }),
                }
            }
            _ => {}
        }
    }

    /// Pops the most recent history frame and re-enters that state. A moving
    /// frame with a live task restarts the task, forcing the nearest-cell
    /// anchor when it was already underway. The frame's recorded task fills
    /// an empty task slot; a task queued during the excursion supersedes it.
    fn restore(&mut self, index: usize, grid: &GridGraph, out_events: &mut Vec<Event>) {
        let frame = self.agents[index].history.pop().unwrap_or(HistoryFrame {
            state: AgentState::Idle,
            task: None,
        });

        if self.agents[index].task.is_none() {
            if let Some(mut task) = frame.task {
                // The agent may have been displaced since the frame was
                // recorded, so the start cell is re-resolved.
                task.anchor = StartAnchor::NearestCell;
                self.agents[index].task = Some(task);
                self.agents[index].task_started = false;
            }
        }

        if frame.state.is_moving() && self.agents[index].task.is_some() {
            if self.agents[index].task_started {
                if let Some(task) = self.agents[index].task.as_mut() {
                    task.anchor = StartAnchor::NearestCell;
                }
            }
            self.start_task(index, grid, out_events);
            return;
        }

        let agent = &mut self.agents[index];
        if frame.state == AgentState::Handling && agent.task.is_some() {
            match agent.set_to_state(AgentState::Handling) {
                Ok(()) => agent.handling_elapsed = Duration::ZERO,
                Err(error) => out_events.push(Event::TransitionRejected {
                    agent: agent.id,
                    error,
                }),
            }
            return;
        }
        if let Err(error) = agent.set_to_state(AgentState::Idle) {
            out_events.push(Event::TransitionRejected {
                agent: agent.id,
                error,
            });
        }
    }

    /// Emits completion for the active task (if any) and parks the agent.
    fn complete_task(&mut self, index: usize, out_events: &mut Vec<Event>) {
        let agent = &mut self.agents[index];
        if let Some(task) = agent.task.take() {
            out_events.push(Event::TaskCompleted {
                agent: agent.id,
                goal: task.goal,
                stats: task.stats,
            });
        }
        agent.task_started = false;
        agent.mission_pending = false;
        if let Err(error) = agent.set_to_state(AgentState::Idle) {
            out_events.push(Event::TransitionRejected {
                agent: agent.id,
                error,
            });
        }
    }
}

/// Puts the agent into the jamming state: the path is discarded, the cause
/// and a zeroed wait timer are recorded, and the entry is reported.
pub(crate) fn jam_agent(agent: &mut Agent, cause: JamCause, out_events: &mut Vec<Event>) {
    match agent.set_to_state(AgentState::Jamming) {
        Ok(()) => {
            agent.path.clear();
            agent.redirect_goal = None;
            agent.jam = Some(Jam {
                cause,
                elapsed: Duration::ZERO,
            });
            out_events.push(Event::AgentJammed {
                agent: agent.id,
                cause,
            });
        }
        Err(error) => out_events.push(Event::TransitionRejected {
            agent: agent.id,
            error,
        }),
    }
}

/// Moves the position toward the target center, clamping at the center so a
/// commit is detected on the following tick.
fn advance_position(agent: &mut Agent, target: Vec2, speed: f32, dt: Duration) {
    let step = speed * dt.as_secs_f32();
    let delta = target - agent.position;
    let distance = delta.length();
    if distance <= step {
        agent.position = target;
    } else if distance > 0.0 {
        agent.position += delta * (step / distance);
    }
}

/// Read-only snapshot views over the fleet.
pub mod query {
    use std::collections::HashSet;

    use glam::Vec2;
    use gridway_core::{AgentId, AgentState, CellCoord, PayloadId};

    use crate::Fleet;

    /// Immutable view of one agent.
    #[derive(Clone, Copy, Debug)]
    pub struct AgentSnapshot {
        /// Agent identifier.
        pub id: AgentId,
        /// Current state.
        pub state: AgentState,
        /// Last-committed cell.
        pub cell: CellCoord,
        /// Next-target cell while one is claimed.
        pub next_cell: Option<CellCoord>,
        /// Continuous world position.
        pub position: Vec2,
        /// Cell the agent is steering toward, if any.
        pub goal: Option<CellCoord>,
        /// Payload currently carried.
        pub carrying: Option<PayloadId>,
        /// Cells remaining on the active path.
        pub path_remaining: usize,
    }

    /// Snapshots of every agent in registration order.
    #[must_use]
    pub fn agents(fleet: &Fleet) -> Vec<AgentSnapshot> {
        fleet
            .agents
            .iter()
            .map(|agent| AgentSnapshot {
                id: agent.id,
                state: agent.state,
                cell: agent.last_cell,
                next_cell: agent.next_cell,
                position: agent.position,
                goal: agent.current_goal(),
                carrying: agent.carrying,
                path_remaining: agent.path.len(),
            })
            .collect()
    }

    /// Snapshot of a single agent, if registered.
    #[must_use]
    pub fn agent(fleet: &Fleet, id: AgentId) -> Option<AgentSnapshot> {
        agents(fleet).into_iter().find(|snapshot| snapshot.id == id)
    }

    /// Ids of agents within the configured detection radius of `origin`.
    /// This is the default provider for the tick's proximity query.
    #[must_use]
    pub fn nearby(fleet: &Fleet, origin: Vec2) -> Vec<AgentId> {
        let radius = fleet.config.detection_radius;
        fleet
            .agents
            .iter()
            .filter(|agent| agent.position.distance_squared(origin) <= radius * radius)
            .map(|agent| agent.id)
            .collect()
    }

    /// Every cell currently claimed by an agent (last-committed plus
    /// next-target cells).
    #[must_use]
    pub fn occupied_cells(fleet: &Fleet) -> HashSet<CellCoord> {
        let mut cells = HashSet::new();
        for agent in &fleet.agents {
            let _ = cells.insert(agent.last_cell);
            if let Some(next) = agent.next_cell {
                let _ = cells.insert(next);
            }
        }
        cells
    }
}
