#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Gridway coordination engine.
//!
//! This crate defines the vocabulary that connects the grid graph, the
//! planners, the fleet state machine, and the adapters: cell coordinates,
//! identifiers, tasks, the distance-cost policy, the conflict decision
//! lattice, configuration, the error taxonomy, and the telemetry events the
//! fleet emits each tick for systems and sinks to consume.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier assigned to an agent by the fleet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(u32);

impl AgentId {
    /// Creates a new agent identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Opaque handle to a payload object stored on a cell or carried by an agent.
///
/// The engine never inspects the payload itself; collaborators map the handle
/// back to whatever they stocked the grid with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PayloadId(u32);

impl PayloadId {
    /// Creates a new payload handle with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the handle.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Computes the Manhattan distance between two cell coordinates.
    #[must_use]
    pub fn manhattan_distance(self, other: CellCoord) -> u32 {
        self.column.abs_diff(other.column) + self.row.abs_diff(other.row)
    }

    /// Signed (column, row) index difference from `self` toward `other`.
    #[must_use]
    pub fn index_delta(self, other: CellCoord) -> (i64, i64) {
        (
            i64::from(other.column) - i64::from(self.column),
            i64::from(other.row) - i64::from(self.row),
        )
    }

    /// Absolute (column, row) index difference between two cells.
    #[must_use]
    pub const fn abs_index_delta(self, other: CellCoord) -> (u32, u32) {
        (
            self.column.abs_diff(other.column),
            self.row.abs_diff(other.row),
        )
    }
}

/// Cardinal movement directions between adjacent cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Movement toward decreasing row indices.
    North,
    /// Movement toward increasing column indices.
    East,
    /// Movement toward increasing row indices.
    South,
    /// Movement toward decreasing column indices.
    West,
}

impl Direction {
    /// All four cardinal directions in a fixed iteration order.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Applies the direction to a cell, returning `None` on index underflow.
    ///
    /// Upper bounds are not checked here; the grid's bounds-checked lookup is
    /// the authority on whether the resulting coordinate exists.
    #[must_use]
    pub fn step_from(self, cell: CellCoord) -> Option<CellCoord> {
        match self {
            Direction::North => cell
                .row()
                .checked_sub(1)
                .map(|row| CellCoord::new(cell.column(), row)),
            Direction::East => Some(CellCoord::new(cell.column() + 1, cell.row())),
            Direction::South => Some(CellCoord::new(cell.column(), cell.row() + 1)),
            Direction::West => cell
                .column()
                .checked_sub(1)
                .map(|column| CellCoord::new(column, cell.row())),
        }
    }

    /// Derives the direction between two orthogonally adjacent cells.
    #[must_use]
    pub fn between(from: CellCoord, to: CellCoord) -> Option<Direction> {
        let (column_diff, row_diff) = from.abs_index_delta(to);
        if column_diff + row_diff != 1 {
            return None;
        }

        if column_diff == 1 {
            if to.column() > from.column() {
                Some(Direction::East)
            } else {
                Some(Direction::West)
            }
        } else if to.row() > from.row() {
            Some(Direction::South)
        } else {
            Some(Direction::North)
        }
    }
}

/// Cost of a single orthogonal step under every distance-cost policy.
pub const ORTHOGONAL_STEP_COST: f64 = 10.0;

/// Distance-cost policy shared by the heuristic and edge-weight functions.
///
/// All planners receive the policy at construction so swapping cost models
/// never touches search logic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceCost {
    /// Sum of axis deltas scaled by the orthogonal step cost.
    #[default]
    Manhattan,
    /// Straight-line distance scaled by the orthogonal step cost.
    Euclidean,
    /// Diagonal-aware variant where a diagonal step costs 14.
    Octile,
    /// Maximum axis delta scaled by the orthogonal step cost.
    Chebyshev,
}

impl DistanceCost {
    /// Evaluates the policy between two cells.
    #[must_use]
    pub fn cost(self, from: CellCoord, to: CellCoord) -> f64 {
        let (dx, dy) = from.abs_index_delta(to);
        let dx = f64::from(dx);
        let dy = f64::from(dy);
        match self {
            DistanceCost::Manhattan => ORTHOGONAL_STEP_COST * (dx + dy),
            DistanceCost::Euclidean => ORTHOGONAL_STEP_COST * (dx * dx + dy * dy).sqrt(),
            DistanceCost::Octile => ORTHOGONAL_STEP_COST * (dx + dy) - 6.0 * dx.min(dy),
            DistanceCost::Chebyshev => ORTHOGONAL_STEP_COST * dx.max(dy),
        }
    }
}

/// Ordered sequence of adjacent cells from start to goal, both inclusive.
///
/// Paths are produced by planners and consumed destructively front-first by
/// the owning agent. Planners guarantee that consecutive cells are adjacent
/// in the grid that produced the path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Path {
    cells: VecDeque<CellCoord>,
}

impl Path {
    /// Builds a path from cells ordered start to goal.
    #[must_use]
    pub fn from_cells(cells: Vec<CellCoord>) -> Self {
        Self {
            cells: cells.into(),
        }
    }

    /// Next cell the consumer should commit to, if any remain.
    #[must_use]
    pub fn peek(&self) -> Option<CellCoord> {
        self.cells.front().copied()
    }

    /// Removes and returns the front cell.
    pub fn advance(&mut self) -> Option<CellCoord> {
        self.cells.pop_front()
    }

    /// Final cell of the path, if any remain.
    #[must_use]
    pub fn goal(&self) -> Option<CellCoord> {
        self.cells.back().copied()
    }

    /// Number of cells remaining.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Reports whether the path has been fully consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterator over the remaining cells in consumption order.
    pub fn iter(&self) -> impl Iterator<Item = CellCoord> + '_ {
        self.cells.iter().copied()
    }

    /// Discards all remaining cells.
    pub fn clear(&mut self) {
        self.cells.clear();
    }
}

/// Policy resolving which cell a freshly assigned task plans from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StartAnchor {
    /// Plan from the last-committed cell, then step to the first path cell.
    LastCell,
    /// Plan from the next-target cell; the first path element is dropped
    /// because the agent is already en route there.
    NextCell,
    /// Plan from the grid cell nearest the continuous position, which must
    /// resolve to either the last-committed or next-target cell.
    #[default]
    NearestCell,
}

/// Kind of work a task asks an agent to perform at its goal cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Travel to the goal cell and stop.
    Approach,
    /// Travel to the goal cell and pick up the payload stored there.
    Retrieve,
    /// Travel to the goal cell and drop the carried payload onto it.
    Deliver,
}

/// Wait-time accounting accumulated while a task is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Total time spent jammed while another agent occupied the goal.
    pub waiting_for_goal: Duration,
    /// Total time spent jammed on transit blocks.
    pub jammed: Duration,
}

/// Unit of work assigned to an agent.
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    /// Kind of work performed at the goal.
    pub kind: TaskKind,
    /// Start-anchor policy resolved when the task begins.
    pub anchor: StartAnchor,
    /// Cell the agent must reach.
    pub goal: CellCoord,
    /// Relative priority; larger values outrank smaller ones.
    pub priority: i32,
    /// Wait-time accounting for the task's lifetime.
    pub stats: TaskStats,
}

impl Task {
    /// Creates a task with default priority and the nearest-cell anchor.
    #[must_use]
    pub fn new(kind: TaskKind, goal: CellCoord) -> Self {
        Self {
            kind,
            anchor: StartAnchor::NearestCell,
            goal,
            priority: 0,
            stats: TaskStats::default(),
        }
    }

    /// Overrides the start-anchor policy.
    #[must_use]
    pub fn with_anchor(mut self, anchor: StartAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    /// Overrides the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Discrete state an agent occupies; exactly one is current per agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    /// Stationary with no active task.
    #[default]
    Idle,
    /// Moving toward an approach-task goal.
    Approaching,
    /// Moving toward a retrieve-task goal.
    Retrieving,
    /// Moving toward a deliver-task goal.
    Delivering,
    /// Moving toward a laterally displaced cell to clear another agent.
    Redirecting,
    /// Halted on a block, waiting out the jam timer.
    Jamming,
    /// Transferring a payload at the goal cell.
    Handling,
}

impl AgentState {
    /// Reports whether the state consumes a path via the shared moving loop.
    #[must_use]
    pub const fn is_moving(self) -> bool {
        matches!(
            self,
            AgentState::Approaching
                | AgentState::Retrieving
                | AgentState::Delivering
                | AgentState::Redirecting
        )
    }

    /// Moving state that executes the provided task kind.
    #[must_use]
    pub const fn for_task(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Approach => AgentState::Approaching,
            TaskKind::Retrieve => AgentState::Retrieving,
            TaskKind::Deliver => AgentState::Delivering,
        }
    }
}

/// Reason an agent entered the jamming state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JamCause {
    /// Another agent occupies the task goal.
    GoalBusy,
    /// Another agent blocks the cell ahead mid-route.
    TransitBlocked,
}

/// Outcome of classifying one neighbor during conflict resolution.
///
/// Variants are ordered by severity; aggregating a neighborhood takes the
/// maximum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Decision {
    /// The neighbor does not interfere; keep advancing.
    #[default]
    Ignore,
    /// Hold position by entering the jamming state.
    Wait,
    /// Replan around the neighbor with dynamic obstacles.
    Dodge,
    /// The conflict was resolved by redirecting the other agent; take no
    /// action this tick.
    Deflected,
}

/// Errors surfaced by the fleet state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum FleetError {
    /// A state transition outside the registered table was requested.
    #[error("transition from {from:?} to {to:?} is not registered")]
    InvalidTransition {
        /// State the agent currently occupies.
        from: AgentState,
        /// State that was requested.
        to: AgentState,
    },
    /// The nearest-cell anchor resolved to neither the last-committed nor
    /// the next-target cell, indicating a logic or timing bug upstream.
    #[error("nearest cell {nearest:?} matches neither last {last:?} nor next {next:?}")]
    InconsistentAnchor {
        /// Cell nearest the agent's continuous position.
        nearest: CellCoord,
        /// Last-committed cell.
        last: CellCoord,
        /// Next-target cell, if the agent was mid-route.
        next: Option<CellCoord>,
    },
}

/// Telemetry events emitted by the fleet while processing a tick.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// An idle agent has no queued work; the mission source should respond
    /// with `assign_task`. Emitted once per agent until served.
    MissionRequested {
        /// Agent awaiting work.
        agent: AgentId,
    },
    /// A task was accepted and queued for the agent.
    TaskAssigned {
        /// Agent the task was assigned to.
        agent: AgentId,
        /// Goal cell of the task.
        goal: CellCoord,
    },
    /// The agent satisfied its task's arrival condition.
    TaskCompleted {
        /// Agent that finished the task.
        agent: AgentId,
        /// Goal cell that was reached.
        goal: CellCoord,
        /// Wait-time accounting accumulated over the task's lifetime.
        stats: TaskStats,
    },
    /// A planner produced a fresh path for the agent.
    PathPlanned {
        /// Agent the path belongs to.
        agent: AgentId,
        /// Number of cells in the path.
        length: usize,
    },
    /// The incremental replanner found no path; the agent re-anchors.
    ReplanFailed {
        /// Agent whose replan failed.
        agent: AgentId,
    },
    /// The agent entered the jamming state.
    AgentJammed {
        /// Agent that jammed.
        agent: AgentId,
        /// Why progress was blocked.
        cause: JamCause,
    },
    /// The agent restored its pre-interrupt state after a jam.
    AgentResumed {
        /// Agent that resumed.
        agent: AgentId,
    },
    /// Another agent pushed this one to a lateral displacement cell.
    AgentRedirected {
        /// Agent being displaced.
        agent: AgentId,
        /// Cell it was displaced toward.
        to: CellCoord,
    },
    /// No valid displacement cell existed; the agent jams instead.
    RedirectExhausted {
        /// Agent that could not be displaced.
        agent: AgentId,
    },
    /// Nearest-cell anchoring failed consistency checks; the agent's tick
    /// was aborted for diagnostic capture.
    AnchorFault {
        /// Agent whose anchor was inconsistent.
        agent: AgentId,
        /// The offending resolution.
        error: FleetError,
    },
    /// A state transition outside the registered table was rejected.
    TransitionRejected {
        /// Agent whose transition was rejected.
        agent: AgentId,
        /// The rejected transition.
        error: FleetError,
    },
    /// A retrieve task transferred a payload from the grid to the agent.
    PayloadPicked {
        /// Agent now carrying the payload.
        agent: AgentId,
        /// Payload handle that was picked up.
        payload: PayloadId,
    },
    /// A deliver task transferred a payload from the agent to the grid.
    PayloadDropped {
        /// Agent that dropped the payload.
        agent: AgentId,
        /// Payload handle that was dropped.
        payload: PayloadId,
    },
}

/// Construction parameters for the planners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlannerConfig {
    /// Distance-cost policy shared by heuristic and edge weights.
    pub heuristic: DistanceCost,
    /// Upper bound on accumulated search cost; nodes beyond it are pruned.
    pub max_cost: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            heuristic: DistanceCost::Manhattan,
            max_cost: f64::INFINITY,
        }
    }
}

/// Construction parameters for the fleet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FleetConfig {
    /// Travel speed in world units per second.
    pub speed: f32,
    /// Wait interval an agent sits out before restoring from a jam.
    pub jam_wait: Duration,
    /// Duration of the payload-handling phase at a goal cell.
    pub handling_duration: Duration,
    /// Radius of the external proximity query, in world units.
    pub detection_radius: f32,
    /// Distance under which a same-heading follower must hold back, in
    /// world units.
    pub safety_distance: f32,
    /// Maximum depth of the per-agent state history ring.
    pub history_depth: usize,
    /// Seed for the deterministic RNG used by redirect tie-breaking.
    pub rng_seed: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            jam_wait: Duration::from_secs(1),
            handling_duration: Duration::from_millis(500),
            detection_radius: 2.5,
            safety_distance: 1.25,
            history_depth: 8,
            rng_seed: 0x5eed_ce11,
        }
    }
}

/// Aggregated counters published by the analytics system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    /// Missions requested by idle agents.
    pub missions_requested: u64,
    /// Tasks accepted by agents.
    pub tasks_assigned: u64,
    /// Tasks whose arrival condition was met.
    pub tasks_completed: u64,
    /// Paths produced by the planners.
    pub paths_planned: u64,
    /// Incremental replans that found no path.
    pub replans_failed: u64,
    /// Jam-state entries.
    pub jams: u64,
    /// Total time agents spent jammed.
    pub jam_time: Duration,
    /// Agents displaced by redirect negotiations.
    pub redirects: u64,
    /// Redirect attempts that found no valid displacement cell.
    pub redirects_exhausted: u64,
    /// Anchor-consistency faults flagged for diagnostics.
    pub anchor_faults: u64,
    /// Payloads picked up and dropped off.
    pub payload_transfers: u64,
}
