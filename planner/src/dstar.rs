//! Incremental D*-Lite replanner with persistent search state.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use gridway_core::{CellCoord, Path, PlannerConfig};
use gridway_graph::GridGraph;

use crate::edge_weight;

/// Priority key: `(min(g, rhs) + h(node, start) + km, min(g, rhs))`,
/// compared lexicographically.
#[derive(Clone, Copy, Debug)]
struct Key {
    primary: f64,
    secondary: f64,
}

impl Key {
    const INFINITE: Key = Key {
        primary: f64::INFINITY,
        secondary: f64::INFINITY,
    };
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.primary
            .total_cmp(&other.primary)
            .then_with(|| self.secondary.total_cmp(&other.secondary))
    }
}

#[derive(Clone, Copy, Debug)]
struct OpenEntry {
    key: Key,
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
            .key
            .cmp(&self.key)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Stateful incremental replanner.
///
/// Maintains `g`/`rhs` maps and an open set across calls so marking a
/// handful of cells as dynamic obstacles only re-propagates consistency
/// through the affected region instead of re-running a full search. One
/// instance belongs to exactly one agent; the scratch state is never shared.
///
/// Propagation treats each cell's adjacency list as bidirectional, so the
/// incremental mode expects symmetrically wired grids (the bootstrap
/// collaborator wires both directions). A* has no such expectation.
#[derive(Clone, Debug)]
pub struct DstarLite {
    config: PlannerConfig,
    start: CellCoord,
    goal: CellCoord,
    km: f64,
    g_values: HashMap<CellCoord, f64>,
    rhs_values: HashMap<CellCoord, f64>,
    open: BinaryHeap<OpenEntry>,
    queued_keys: HashMap<CellCoord, Key>,
    dynamic_obstacles: HashSet<CellCoord>,
    sequence: u64,
}

impl DstarLite {
    /// Creates an uninitialized replanner; call [`DstarLite::initialize`]
    /// before requesting updates.
    #[must_use]
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            start: CellCoord::new(0, 0),
            goal: CellCoord::new(0, 0),
            km: 0.0,
            g_values: HashMap::new(),
            rhs_values: HashMap::new(),
            open: BinaryHeap::new(),
            queued_keys: HashMap::new(),
            dynamic_obstacles: HashSet::new(),
            sequence: 0,
        }
    }

    /// Establishes `rhs(goal) = 0` with everything else infinite and computes
    /// the initial consistent path from `start`, or `None` when the goal is
    /// unreachable.
    pub fn initialize(
        &mut self,
        grid: &GridGraph,
        start: CellCoord,
        goal: CellCoord,
    ) -> Option<Path> {
        if !grid.contains(start) || !grid.contains(goal) {
            return None;
        }

        self.start = start;
        self.goal = goal;
        self.km = 0.0;
        self.g_values.clear();
        self.rhs_values.clear();
        self.open.clear();
        self.queued_keys.clear();
        self.dynamic_obstacles.clear();

        let _ = self.rhs_values.insert(goal, 0.0);
        self.queue(goal);
        self.compute_shortest_path(grid);
        self.extract_path(grid)
    }

    /// Replaces the dynamic obstacle set, re-propagates consistency through
    /// every affected cell, and returns the refreshed path from `new_start`.
    ///
    /// Cells present in the previous set but absent from `obstacle_cells`
    /// are cleared. `None` means the start became unreachable from the goal;
    /// the caller must fall back to a redirect or re-anchor action.
    pub fn update_with_dynamic_obstacles(
        &mut self,
        grid: &GridGraph,
        new_start: CellCoord,
        obstacle_cells: &[CellCoord],
    ) -> Option<Path> {
        if !grid.contains(new_start) {
            return None;
        }

        // TODO: canonical D*-Lite advances km by h(previous_start, new_start)
        // here; the offset is currently left fixed across replans. Verify
        // whether that degrades replan quality on long missions before
        // changing it, since path consumers depend on today's behavior.
        self.start = new_start;

        let incoming: HashSet<CellCoord> = obstacle_cells
            .iter()
            .copied()
            .filter(|cell| grid.contains(*cell))
            .collect();
        let changed: Vec<CellCoord> = self
            .dynamic_obstacles
            .symmetric_difference(&incoming)
            .copied()
            .collect();
        self.dynamic_obstacles = incoming;

        for cell in changed {
            self.update_node(grid, cell);
            for neighbor in grid.neighbors(cell).iter().copied() {
                self.update_node(grid, neighbor);
            }
        }

        self.compute_shortest_path(grid);
        self.extract_path(grid)
    }

    /// Current-best cost estimate for the cell.
    #[must_use]
    pub fn g_value(&self, cell: CellCoord) -> f64 {
        self.g_values.get(&cell).copied().unwrap_or(f64::INFINITY)
    }

    /// One-step-lookahead cost estimate for the cell.
    #[must_use]
    pub fn rhs_value(&self, cell: CellCoord) -> f64 {
        self.rhs_values.get(&cell).copied().unwrap_or(f64::INFINITY)
    }

    /// Cells currently marked as dynamic obstacles.
    #[must_use]
    pub fn dynamic_obstacles(&self) -> &HashSet<CellCoord> {
        &self.dynamic_obstacles
    }

    fn key(&self, cell: CellCoord) -> Key {
        let baseline = self.g_value(cell).min(self.rhs_value(cell));
        if baseline.is_infinite() {
            return Key::INFINITE;
        }
        Key {
            primary: baseline + self.config.heuristic.cost(cell, self.start) + self.km,
            secondary: baseline,
        }
    }

    fn blocked(&self, grid: &GridGraph, cell: CellCoord) -> bool {
        grid.is_obstacle(cell) || self.dynamic_obstacles.contains(&cell)
    }

    fn transition_cost(&self, grid: &GridGraph, from: CellCoord, to: CellCoord) -> f64 {
        if self.blocked(grid, from) || self.blocked(grid, to) {
            return f64::INFINITY;
        }
        edge_weight(grid, self.config.heuristic, from, to)
    }

    fn queue(&mut self, cell: CellCoord) {
        let key = self.key(cell);
        let _ = self.queued_keys.insert(cell, key);
        self.sequence += 1;
        self.open.push(OpenEntry {
            key,
            sequence: self.sequence,
            cell,
        });
    }

    /// Recomputes `rhs` for the cell from its neighbors and requeues it when
    /// locally inconsistent.
    fn update_node(&mut self, grid: &GridGraph, cell: CellCoord) {
        if cell != self.goal {
            let mut best = f64::INFINITY;
            for neighbor in grid.neighbors(cell).iter().copied() {
                let candidate = self.transition_cost(grid, cell, neighbor) + self.g_value(neighbor);
                if candidate < best {
                    best = candidate;
                }
            }
            if best.is_infinite() {
                let _ = self.rhs_values.remove(&cell);
            } else {
                let _ = self.rhs_values.insert(cell, best);
            }
        }

        let _ = self.queued_keys.remove(&cell);
        let consistent = {
            let g = self.g_value(cell);
            let rhs = self.rhs_value(cell);
            g == rhs || (g.is_infinite() && rhs.is_infinite())
        };
        if !consistent {
            self.queue(cell);
        }
    }

    /// Pops the open set, propagating consistency outward, until the start
    /// is locally consistent and nothing cheaper remains queued.
    fn compute_shortest_path(&mut self, grid: &GridGraph) {
        while let Some(entry) = self.open.pop() {
            // Lazily discard entries whose key was superseded or cancelled.
            match self.queued_keys.get(&entry.cell) {
                Some(current) if *current == entry.key => {}
                _ => continue,
            }

            let start_key = self.key(self.start);
            let start_consistent = {
                let g = self.g_value(self.start);
                let rhs = self.rhs_value(self.start);
                g == rhs || (g.is_infinite() && rhs.is_infinite())
            };
            if entry.key >= start_key && start_consistent {
                // Re-queue so a later update resumes from this node.
                self.open.push(entry);
                break;
            }

            let cell = entry.cell;
            let fresh_key = self.key(cell);
            if entry.key < fresh_key {
                let _ = self.queued_keys.remove(&cell);
                self.queue(cell);
                continue;
            }

            let _ = self.queued_keys.remove(&cell);
            let g = self.g_value(cell);
            let rhs = self.rhs_value(cell);

            if g > rhs {
                // Over-consistent: lock in the improvement and relax
                // everything that routes through this cell.
                let _ = self.g_values.insert(cell, rhs);
                for neighbor in grid.neighbors(cell).iter().copied() {
                    self.update_node(grid, neighbor);
                }
            } else {
                // Under-consistent: invalidate and re-evaluate the cell
                // along with everything that routed through it.
                let _ = self.g_values.remove(&cell);
                for neighbor in grid.neighbors(cell).iter().copied() {
                    self.update_node(grid, neighbor);
                }
                self.update_node(grid, cell);
            }
        }
    }

    /// Greedily follows descending `g` values from start to goal.
    fn extract_path(&self, grid: &GridGraph) -> Option<Path> {
        if self.g_value(self.start).is_infinite() {
            return None;
        }

        let mut cells = vec![self.start];
        let mut current = self.start;
        let mut remaining = grid.cell_count();

        while current != self.goal {
            if remaining == 0 {
                // A cycle here would mean the g surface is inconsistent.
                return None;
            }
            remaining -= 1;

            let mut best: Option<(f64, CellCoord)> = None;
            for neighbor in grid.neighbors(current).iter().copied() {
                let cost = self.transition_cost(grid, current, neighbor) + self.g_value(neighbor);
                if cost.is_infinite() {
                    continue;
                }
                best = match best {
                    Some((existing, _)) if existing <= cost => best,
                    _ => Some((cost, neighbor)),
                };
            }

            let (_, next) = best?;
            cells.push(next);
            current = next;
        }

        Some(Path::from_cells(cells))
    }
}
