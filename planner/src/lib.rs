#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Search algorithms operating over the grid graph.
//!
//! Three modes share one distance-cost policy injected at construction:
//! stateless A* point-to-point search, a Dijkstra-style lowest-cost-region
//! search, and the stateful [`DstarLite`] incremental replanner. The policy
//! also feeds edge weights, so swapping cost models never touches search
//! logic. All scratch state (g/rhs maps, open sets, predecessors) is owned
//! by the planner for the duration of a planning cycle and never shared
//! between agents.

use std::collections::HashSet;

use gridway_core::{CellCoord, DistanceCost, Path, PlannerConfig};
use gridway_graph::GridGraph;

mod astar;
mod dstar;
mod region;

pub use dstar::DstarLite;

/// Stateless-per-call planner for point-to-point and region queries.
#[derive(Clone, Copy, Debug, Default)]
pub struct PathPlanner {
    config: PlannerConfig,
}

impl PathPlanner {
    /// Creates a planner with the provided configuration.
    #[must_use]
    pub const fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Configuration the planner was constructed with.
    #[must_use]
    pub const fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// A* search from `start` to `goal`, or `None` when the goal is
    /// unreachable (open set exhausted or every route exceeds the max-cost
    /// bound).
    ///
    /// Obstacle cells are never expanded, with the fixed start cell exempt.
    /// Ties on equal f-cost break in open-set insertion order, which is
    /// implementation-defined; tests must not rely on the exact choice.
    #[must_use]
    pub fn find_path(&self, grid: &GridGraph, start: CellCoord, goal: CellCoord) -> Option<Path> {
        astar::find_path(grid, start, goal, self.config.heuristic, self.config.max_cost)
    }

    /// Explores outward from `start` and returns every reachable cell (ties
    /// included) minimizing accumulated path cost plus the caller-supplied
    /// per-cell weight, subject to the obstacle set and the max-cost bound.
    ///
    /// Useful for "which reachable cell is cheapest to use" queries rather
    /// than point-to-point routing. The result is sorted by coordinate for
    /// determinism.
    #[must_use]
    pub fn lowest_cost_cells<W>(
        &self,
        grid: &GridGraph,
        start: CellCoord,
        weight: W,
        obstacles: &HashSet<CellCoord>,
    ) -> Vec<CellCoord>
    where
        W: Fn(CellCoord) -> f64,
    {
        region::lowest_cost_cells(
            grid,
            start,
            &weight,
            obstacles,
            self.config.heuristic,
            self.config.max_cost,
        )
    }
}

/// Weight of the directed edge between two adjacent cells: the distance-cost
/// policy evaluated over the step plus any registered additional cost.
pub(crate) fn edge_weight(
    grid: &GridGraph,
    heuristic: DistanceCost,
    from: CellCoord,
    to: CellCoord,
) -> f64 {
    heuristic.cost(from, to) + grid.additional_cost(from, to)
}
