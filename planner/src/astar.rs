//! Stateless A* search over the grid graph's explicit adjacency.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use gridway_core::{CellCoord, DistanceCost, Path};
use gridway_graph::GridGraph;

use crate::edge_weight;

/// Open-set entry ordered so the binary heap pops the lowest f-cost first,
/// breaking ties by insertion sequence.
#[derive(Clone, Copy, Debug)]
struct OpenEntry {
    f_cost: f64,
    sequence: u64,
    cell: CellCoord,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap acts as a min-heap.
        other
            .f_cost
            .total_cmp(&self.f_cost)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

pub(crate) fn find_path(
    grid: &GridGraph,
    start: CellCoord,
    goal: CellCoord,
    heuristic: DistanceCost,
    max_cost: f64,
) -> Option<Path> {
    if !grid.contains(start) || !grid.contains(goal) {
        return None;
    }

    if start == goal {
        return Some(Path::from_cells(vec![start]));
    }

    let mut open = BinaryHeap::new();
    let mut g_costs: HashMap<CellCoord, f64> = HashMap::new();
    let mut predecessors: HashMap<CellCoord, CellCoord> = HashMap::new();
    let mut closed: HashSet<CellCoord> = HashSet::new();
    let mut sequence = 0_u64;

    let _ = g_costs.insert(start, 0.0);
    open.push(OpenEntry {
        f_cost: heuristic.cost(start, goal),
        sequence,
        cell: start,
    });

    while let Some(entry) = open.pop() {
        let cell = entry.cell;
        if cell == goal {
            return Some(retrace(&predecessors, start, goal));
        }

        if !closed.insert(cell) {
            continue;
        }

        let current_g = g_costs.get(&cell).copied().unwrap_or(f64::INFINITY);

        for neighbor in grid.neighbors(cell).iter().copied() {
            // The fixed start is exempt from the obstacle check; every
            // other cell must be clear to be expanded.
            if grid.is_obstacle(neighbor) || closed.contains(&neighbor) {
                continue;
            }

            let tentative = current_g + edge_weight(grid, heuristic, cell, neighbor);
            let known = g_costs.get(&neighbor).copied().unwrap_or(f64::INFINITY);
            if tentative >= known {
                continue;
            }

            let f_cost = tentative + heuristic.cost(neighbor, goal);
            if f_cost > max_cost {
                continue;
            }

            let _ = g_costs.insert(neighbor, tentative);
            let _ = predecessors.insert(neighbor, cell);
            sequence += 1;
            open.push(OpenEntry {
                f_cost,
                sequence,
                cell: neighbor,
            });
        }
    }

    None
}

/// Follows predecessor links from goal to start, building the path in
/// start-to-goal order.
fn retrace(predecessors: &HashMap<CellCoord, CellCoord>, start: CellCoord, goal: CellCoord) -> Path {
    let mut cells = vec![goal];
    let mut current = goal;
    while current != start {
        match predecessors.get(&current) {
            Some(previous) => {
                cells.push(*previous);
                current = *previous;
            }
            None => break,
        }
    }
    cells.reverse();
    Path::from_cells(cells)
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
    fn trivial_path_is_the_start_cell() {
        let grid = four_directional_grid(3, 3);
        let cell = CellCoord::new(1, 1);
        let path = find_path(&grid, cell, cell, DistanceCost::Manhattan, f64::INFINITY)
            .expect("path to self");
        assert_eq!(path.len(), 1);
        assert_eq!(path.peek(), Some(cell));
    }

    #[test]
    fn out_of_range_endpoints_yield_none() {
        let grid = four_directional_grid(3, 3);
        assert!(find_path(
            &grid,
            CellCoord::new(0, 0),
            CellCoord::new(9, 9),
            DistanceCost::Manhattan,
            f64::INFINITY,
        )
        .is_none());
    }

    #[test]
    fn blocked_start_neighborhood_yields_none() {
        let mut grid = four_directional_grid(3, 3);
        grid.set_obstacle(CellCoord::new(1, 0), true);
        grid.set_obstacle(CellCoord::new(0, 1), true);

        assert!(find_path(
            &grid,
            CellCoord::new(0, 0),
            CellCoord::new(2, 2),
            DistanceCost::Manhattan,
            f64::INFINITY,
        )
        .is_none());
    }

    #[test]
    fn removed_adjacency_breaks_reachability() {
        let mut grid = four_directional_grid(3, 1);
        grid.remove_adjacency(CellCoord::new(0, 0), CellCoord::new(1, 0));

        let path = find_path(
            &grid,
            CellCoord::new(0, 0),
            CellCoord::new(2, 0),
            DistanceCost::Manhattan,
            f64::INFINITY,
        );
        assert!(path.is_none());
    }

    #[test]
    fn additional_cost_steers_around_expensive_edges() {
        let mut grid = GridGraph::new(2, 2, 1.0);
        let nw = CellCoord::new(0, 0);
        let ne = CellCoord::new(1, 0);
        let sw = CellCoord::new(0, 1);
        let se = CellCoord::new(1, 1);
        grid.set_adjacency(nw, &[ne, sw], &[100.0, 0.0]);
        grid.set_adjacency(sw, &[nw, se], &[]);
        grid.set_adjacency(se, &[sw, ne], &[]);
        grid.set_adjacency(ne, &[se, nw], &[]);

        let path =
            find_path(&grid, nw, ne, DistanceCost::Manhattan, f64::INFINITY).expect("detour path");
        let cells: Vec<CellCoord> = path.iter().collect();
        assert_eq!(cells, vec![nw, sw, se, ne]);
    }

    #[test]
    fn max_cost_bound_prunes_distant_goals() {
        let grid = four_directional_grid(5, 5);
        assert!(find_path(
            &grid,
            CellCoord::new(0, 0),
            CellCoord::new(4, 4),
            DistanceCost::Manhattan,
            30.0,
        )
        .is_none());
    }
}
