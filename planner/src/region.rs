//! Dijkstra-style search for the cheapest reachable cells.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use gridway_core::{CellCoord, DistanceCost};
use gridway_graph::GridGraph;

use crate::edge_weight;

#[derive(Clone, Copy, Debug)]
struct FrontierEntry {
    g_cost: f64,
    cell: CellCoord,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap acts as a min-heap.
        other.g_cost.total_cmp(&self.g_cost)
    }
}

pub(crate) fn lowest_cost_cells(
    grid: &GridGraph,
    start: CellCoord,
    weight: &dyn Fn(CellCoord) -> f64,
    obstacles: &HashSet<CellCoord>,
    heuristic: DistanceCost,
    max_cost: f64,
) -> Vec<CellCoord> {
    if !grid.contains(start) {
        return Vec::new();
    }

    let mut g_costs: HashMap<CellCoord, f64> = HashMap::new();
    let mut frontier = BinaryHeap::new();
    let _ = g_costs.insert(start, 0.0);
    frontier.push(FrontierEntry {
        g_cost: 0.0,
        cell: start,
    });

    let mut best_score = f64::INFINITY;
    let mut best_cells: Vec<CellCoord> = Vec::new();

    while let Some(entry) = frontier.pop() {
        let known = g_costs.get(&entry.cell).copied().unwrap_or(f64::INFINITY);
        if entry.g_cost > known {
            // Stale entry; a shorter route was already recorded.
            continue;
        }

        if entry.g_cost > max_cost {
            continue;
        }

        if !obstacles.contains(&entry.cell) {
            let score = entry.g_cost + weight(entry.cell);
            if score < best_score - f64::EPSILON {
                best_score = score;
                best_cells.clear();
                best_cells.push(entry.cell);
            } else if (score - best_score).abs() <= f64::EPSILON {
                best_cells.push(entry.cell);
            }
        }

        for neighbor in grid.neighbors(entry.cell).iter().copied() {
            if grid.is_obstacle(neighbor) || obstacles.contains(&neighbor) {
                continue;
            }

            let tentative = entry.g_cost + edge_weight(grid, heuristic, entry.cell, neighbor);
            let known = g_costs.get(&neighbor).copied().unwrap_or(f64::INFINITY);
            if tentative >= known || tentative > max_cost {
                continue;
            }

            let _ = g_costs.insert(neighbor, tentative);
            frontier.push(FrontierEntry {
                g_cost: tentative,
                cell: neighbor,
            });
        }
    }

    best_cells.sort_by_key(|cell| (cell.column(), cell.row()));
    best_cells.dedup();
    best_cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridway_core::Direction;

    fn four_directional_grid(columns: u32, rows: u32) -> GridGraph {
        let mut grid = GridGraph::new(columns, rows, 1.0);
        for row in 0..rows {
            for column in 0..columns {
                let cell = CellCoord::new(column, row);
                let neighbors: Vec<CellCoord> = Direction::ALL
                    .iter()
                    .filter_map(|direction| direction.step_from(cell))
                    .collect();
                grid.set_adjacency(cell, &neighbors, &[]);
            }
        }
        grid
    }

    #[test]
    fn zero_weight_selects_the_start() {
        let grid = four_directional_grid(3, 3);
        let start = CellCoord::new(1, 1);
        let cells = lowest_cost_cells(
            &grid,
            start,
            &|_| 0.0,
            &HashSet::new(),
            DistanceCost::Manhattan,
            f64::INFINITY,
        );
        assert_eq!(cells, vec![start]);
    }

    #[test]
    fn weight_map_pulls_the_minimum_away_from_start() {
        let grid = four_directional_grid(3, 1);
        // Start carries a heavy weight; (2,0) is two steps away but weighs
        // nothing, beating both closer cells.
        let weight = |cell: CellCoord| match cell.column() {
            0 => 100.0,
            1 => 50.0,
            _ => 0.0,
        };
        let cells = lowest_cost_cells(
            &grid,
            CellCoord::new(0, 0),
            &weight,
            &HashSet::new(),
            DistanceCost::Manhattan,
            f64::INFINITY,
        );
        assert_eq!(cells, vec![CellCoord::new(2, 0)]);
    }

    #[test]
    fn ties_are_all_reported() {
        let grid = four_directional_grid(3, 1);
        // Both neighbors of the center cost one step with zero weight while
        // the start weighs more than a step.
        let weight = |cell: CellCoord| if cell.column() == 1 { 25.0 } else { 0.0 };
        let cells = lowest_cost_cells(
            &grid,
            CellCoord::new(1, 0),
            &weight,
            &HashSet::new(),
            DistanceCost::Manhattan,
            f64::INFINITY,
        );
        assert_eq!(cells, vec![CellCoord::new(0, 0), CellCoord::new(2, 0)]);
    }

    #[test]
    fn caller_obstacles_exclude_cells_and_routes() {
        let grid = four_directional_grid(3, 1);
        let mut obstacles = HashSet::new();
        let _ = obstacles.insert(CellCoord::new(1, 0));

        let cells = lowest_cost_cells(
            &grid,
            CellCoord::new(0, 0),
            &|_| 10.0,
            &obstacles,
            DistanceCost::Manhattan,
            f64::INFINITY,
        );
        // The wall at (1,0) cuts off (2,0) entirely.
        assert_eq!(cells, vec![CellCoord::new(0, 0)]);
    }

    #[test]
    fn max_cost_bound_limits_exploration() {
        let grid = four_directional_grid(5, 1);
        let weight = |cell: CellCoord| match cell.column() {
            0 => 20.0,
            1 => 3.0,
            _ => 0.0,
        };
        let cells = lowest_cost_cells(
            &grid,
            CellCoord::new(0, 0),
            &weight,
            &HashSet::new(),
            DistanceCost::Manhattan,
            15.0,
        );
        // (4,0) would win with weight 0 but lies beyond the cost bound.
        assert_eq!(cells, vec![CellCoord::new(1, 0)]);
    }
}
