#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Arena-backed grid graph owning cells, adjacency, and obstacle flags.
//!
//! The graph is created once at world-build time and never resized; obstacle
//! flags, payloads, and adjacency mutate over the simulation's life.
//! Adjacency is explicitly managed: two cells adjacent in space but never
//! linked via [`GridGraph::set_adjacency`] are not traversable between, and
//! nothing is inferred from geometry after construction. Bounds-checked
//! lookups return `None` for out-of-range coordinates rather than panicking.

use glam::Vec2;
use gridway_core::{CellCoord, PayloadId};

/// Atomic addressable grid location with adjacency and obstacle state.
///
/// Search scratch values (g/rhs/predecessors) deliberately do not live here;
/// each planner owns its own scratch so concurrent plans never alias.
#[derive(Clone, Debug, Default)]
pub struct Cell {
    payload: Option<PayloadId>,
    obstacle: bool,
    neighbors: Vec<CellCoord>,
    extra_costs: Vec<f64>,
}

impl Cell {
    /// Payload handle stored on the cell, if any.
    #[must_use]
    pub const fn payload(&self) -> Option<PayloadId> {
        self.payload
    }

    /// Reports whether the cell is flagged as an obstacle.
    #[must_use]
    pub const fn is_obstacle(&self) -> bool {
        self.obstacle
    }

    /// Cells reachable from this one in a single hop, in insertion order.
    #[must_use]
    pub fn neighbors(&self) -> &[CellCoord] {
        &self.neighbors
    }

    fn neighbor_index(&self, neighbor: CellCoord) -> Option<usize> {
        self.neighbors.iter().position(|cell| *cell == neighbor)
    }
}

/// Owns the flat cell arena and converts between world and cell space.
#[derive(Clone, Debug)]
pub struct GridGraph {
    columns: u32,
    rows: u32,
    cell_length: f32,
    cells: Vec<Cell>,
}

impl GridGraph {
    /// Creates a grid with the provided dimensions and square cell length.
    #[must_use]
    pub fn new(columns: u32, rows: u32, cell_length: f32) -> Self {
        let capacity_u64 = u64::from(columns) * u64::from(rows);
        let capacity = usize::try_from(capacity_u64).unwrap_or(0);
        Self {
            columns,
            rows,
            cell_length,
            cells: vec![Cell::default(); capacity],
        }
    }

    /// Number of columns contained in the grid.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of rows contained in the grid.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Side length of a single square cell expressed in world units.
    #[must_use]
    pub const fn cell_length(&self) -> f32 {
        self.cell_length
    }

    /// Total number of cells in the arena.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Reports whether the coordinate lies within the grid bounds.
    #[must_use]
    pub const fn contains(&self, cell: CellCoord) -> bool {
        cell.column() < self.columns && cell.row() < self.rows
    }

    /// Bounds-checked cell lookup; out-of-range coordinates yield `None`.
    #[must_use]
    pub fn cell(&self, coord: CellCoord) -> Option<&Cell> {
        self.index(coord).and_then(|index| self.cells.get(index))
    }

    /// Links `cell` to each in-range, not-yet-linked neighbor.
    ///
    /// Idempotent: duplicate and out-of-range neighbors are ignored, as is a
    /// neighbor equal to the cell itself. `costs` supplies the per-neighbor
    /// additional traversal cost positionally; missing entries default to
    /// zero. Adjacency is directional; callers wanting symmetric links call
    /// this once per endpoint.
    pub fn set_adjacency(&mut self, cell: CellCoord, neighbors: &[CellCoord], costs: &[f64]) {
        if !self.contains(cell) {
            return;
        }

        for (position, neighbor) in neighbors.iter().copied().enumerate() {
            if neighbor == cell || !self.contains(neighbor) {
                continue;
            }

            let Some(index) = self.index(cell) else {
                continue;
            };
            let slot = &mut self.cells[index];
            if slot.neighbor_index(neighbor).is_some() {
                continue;
            }

            slot.neighbors.push(neighbor);
            slot.extra_costs
                .push(costs.get(position).copied().unwrap_or(0.0));
        }
    }

    /// Unlinks `neighbor` from `cell`'s adjacency list, if present.
    pub fn remove_adjacency(&mut self, cell: CellCoord, neighbor: CellCoord) {
        let Some(index) = self.index(cell) else {
            return;
        };
        let slot = &mut self.cells[index];
        if let Some(position) = slot.neighbor_index(neighbor) {
            let _ = slot.neighbors.remove(position);
            let _ = slot.extra_costs.remove(position);
        }
    }

    /// Cells reachable from `cell` in one hop; empty when out of range.
    #[must_use]
    pub fn neighbors(&self, cell: CellCoord) -> &[CellCoord] {
        self.cell(cell).map_or(&[], Cell::neighbors)
    }

    /// Additional traversal cost layered on the edge from `a` to `b`.
    ///
    /// Zero when no override was registered or the edge does not exist.
    #[must_use]
    pub fn additional_cost(&self, a: CellCoord, b: CellCoord) -> f64 {
        self.cell(a)
            .and_then(|slot| {
                slot.neighbor_index(b)
                    .and_then(|position| slot.extra_costs.get(position).copied())
            })
            .unwrap_or(0.0)
    }

    /// Flags or clears the obstacle marker; out-of-range coordinates are
    /// ignored.
    pub fn set_obstacle(&mut self, cell: CellCoord, obstacle: bool) {
        if let Some(index) = self.index(cell) {
            self.cells[index].obstacle = obstacle;
        }
    }

    /// Reports whether the cell is blocked. Out-of-range coordinates report
    /// blocked so planners never traverse through the void.
    #[must_use]
    pub fn is_obstacle(&self, cell: CellCoord) -> bool {
        self.cell(cell).map_or(true, Cell::is_obstacle)
    }

    /// Stores a payload handle on the cell, replacing any previous one.
    pub fn set_payload(&mut self, cell: CellCoord, payload: Option<PayloadId>) {
        if let Some(index) = self.index(cell) {
            self.cells[index].payload = payload;
        }
    }

    /// Removes and returns the payload stored on the cell, if any.
    pub fn take_payload(&mut self, cell: CellCoord) -> Option<PayloadId> {
        self.index(cell)
            .and_then(|index| self.cells[index].payload.take())
    }

    /// World position of the cell's center.
    #[must_use]
    pub fn cell_center(&self, cell: CellCoord) -> Vec2 {
        Vec2::new(
            (cell.column() as f32 + 0.5) * self.cell_length,
            (cell.row() as f32 + 0.5) * self.cell_length,
        )
    }

    /// Cell containing the world position, or `None` outside the grid.
    #[must_use]
    pub fn world_to_cell(&self, position: Vec2) -> Option<CellCoord> {
        if self.cell_length <= 0.0 || position.x < 0.0 || position.y < 0.0 {
            return None;
        }

        let column = (position.x / self.cell_length).floor();
        let row = (position.y / self.cell_length).floor();
        if column >= self.columns as f32 || row >= self.rows as f32 {
            return None;
        }

        Some(CellCoord::new(column as u32, row as u32))
    }

    /// Nearest in-grid cell to the world position, clamping outside points
    /// to the boundary.
    #[must_use]
    pub fn nearest_cell(&self, position: Vec2) -> CellCoord {
        if let Some(cell) = self.world_to_cell(position) {
            return cell;
        }

        let max_column = self.columns.saturating_sub(1);
        let max_row = self.rows.saturating_sub(1);
        let column = if self.cell_length <= 0.0 || position.x <= 0.0 {
            0
        } else {
            ((position.x / self.cell_length).floor() as u32).min(max_column)
        };
        let row = if self.cell_length <= 0.0 || position.y <= 0.0 {
            0
        } else {
            ((position.y / self.cell_length).floor() as u32).min(max_row)
        };
        CellCoord::new(column, row)
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        if self.contains(cell) {
            let row = usize::try_from(cell.row()).ok()?;
            let column = usize::try_from(cell.column()).ok()?;
            let width = usize::try_from(self.columns).ok()?;
            Some(row * width + column)
        } else {
            None
        }
    }
}
