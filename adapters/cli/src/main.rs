#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a headless Gridway scenario.
//!
//! Bootstraps a symmetrically wired grid with scattered obstacles and
//! payloads, registers a fleet of agents, and drives the tick loop while a
//! simple mission source answers every mission request: carriers deliver to
//! the cheapest free cell, empty-handed agents fetch the nearest payload or
//! wander to a random free cell. The accumulated analytics report is
//! printed when the run ends.

use std::time::Duration;

use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use glam::Vec2;
use gridway_core::{
    AgentId, CellCoord, Direction, DistanceCost, Event, FleetConfig, PayloadId, PlannerConfig,
    Task, TaskKind,
};
use gridway_fleet::{query, Fleet};
use gridway_graph::GridGraph;
use gridway_planner::PathPlanner;
use gridway_system_analytics::Analytics;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Distance-cost policy selectable from the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum HeuristicArg {
    Manhattan,
    Euclidean,
    Octile,
    Chebyshev,
}

impl From<HeuristicArg> for DistanceCost {
    fn from(value: HeuristicArg) -> Self {
        match value {
            HeuristicArg::Manhattan => DistanceCost::Manhattan,
            HeuristicArg::Euclidean => DistanceCost::Euclidean,
            HeuristicArg::Octile => DistanceCost::Octile,
            HeuristicArg::Chebyshev => DistanceCost::Chebyshev,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "gridway")]
#[command(about = "Headless multi-agent grid coordination scenario", long_about = None)]
struct Args {
    /// Grid width in cells.
    #[arg(long, default_value_t = 16)]
    columns: u32,

    /// Grid height in cells.
    #[arg(long, default_value_t = 16)]
    rows: u32,

    /// Edge length of one cell in world units.
    #[arg(long, default_value_t = 1.0)]
    cell_length: f32,

    /// Number of agents to register.
    #[arg(short, long, default_value_t = 4)]
    agents: usize,

    /// Number of payloads scattered over the grid.
    #[arg(short, long, default_value_t = 8)]
    payloads: u32,

    /// Fraction of cells marked as obstacles.
    #[arg(long, default_value_t = 0.1)]
    obstacle_density: f64,

    /// Number of ticks to simulate.
    #[arg(short, long, default_value_t = 2000)]
    ticks: u64,

    /// Simulated duration of one tick in milliseconds.
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,

    /// Distance-cost policy for the planners.
    #[arg(long, value_enum, default_value_t = HeuristicArg::Manhattan)]
    heuristic: HeuristicArg,

    /// Master seed for grid layout and redirect tie-breaking.
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    ensure!(
        args.columns > 0 && args.rows > 0,
        "grid needs at least one cell"
    );
    ensure!(
        (0.0..1.0).contains(&args.obstacle_density),
        "obstacle density must be in [0, 1)"
    );
    ensure!(args.cell_length > 0.0, "cell length must be positive");

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut grid = bootstrap_grid(&args, &mut rng);

    let planner_config = PlannerConfig {
        heuristic: args.heuristic.into(),
        max_cost: f64::INFINITY,
    };
    let fleet_config = FleetConfig {
        rng_seed: args.seed,
        ..FleetConfig::default()
    };
    let mut fleet = Fleet::new(fleet_config, planner_config);
    for _ in 0..args.agents {
        let cell = pick_free_cell(&grid, &fleet, &mut rng)
            .context("not enough free cells to place every agent")?;
        let _ = fleet.register_agent(&grid, cell);
    }

    let planner = PathPlanner::new(planner_config);
    let mut analytics = Analytics::new();
    let dt = Duration::from_millis(args.tick_ms);
    let radius = fleet.config().detection_radius;
    let radius_squared = radius * radius;
    let mut events: Vec<Event> = Vec::new();

    for _ in 0..args.ticks {
        let roster: Vec<(AgentId, Vec2)> = query::agents(&fleet)
            .into_iter()
            .map(|snapshot| (snapshot.id, snapshot.position))
            .collect();
        fleet.tick(
            &mut grid,
            dt,
            |_, origin| {
                roster
                    .iter()
                    .filter(|(_, position)| position.distance_squared(origin) <= radius_squared)
                    .map(|(id, _)| *id)
                    .collect()
            },
            &mut events,
        );
        serve_missions(&mut fleet, &grid, &planner, &mut rng, &mut events);
        analytics.handle(&events);
        events.clear();
    }

    print_summary(&fleet, &analytics, args.ticks);
    Ok(())
}

/// Builds the grid: every cell is wired to its in-range cardinal neighbors
/// in both directions, then obstacles and payloads are scattered from the
/// seeded RNG.
fn bootstrap_grid(args: &Args, rng: &mut ChaCha8Rng) -> GridGraph {
    let mut grid = GridGraph::new(args.columns, args.rows, args.cell_length);
    for row in 0..args.rows {
        for column in 0..args.columns {
            let cell = CellCoord::new(column, row);
            let neighbors: Vec<CellCoord> = Direction::ALL
                .iter()
                .filter_map(|direction| direction.step_from(cell))
                .filter(|neighbor| grid.contains(*neighbor))
                .collect();
            grid.set_adjacency(cell, &neighbors, &[]);
        }
    }

    for row in 0..args.rows {
        for column in 0..args.columns {
            if rng.gen_bool(args.obstacle_density) {
                grid.set_obstacle(CellCoord::new(column, row), true);
            }
        }
    }

    let mut placed = 0;
    let mut attempts = 0;
    while placed < args.payloads && attempts < args.payloads * 32 {
        attempts += 1;
        let cell = CellCoord::new(
            rng.gen_range(0..args.columns),
            rng.gen_range(0..args.rows),
        );
        if grid.is_obstacle(cell) || grid.cell(cell).and_then(|c| c.payload()).is_some() {
            continue;
        }
        grid.set_payload(cell, Some(PayloadId::new(placed)));
        placed += 1;
    }
    grid
}

/// Picks a random cell that is clear of obstacles, payloads, and agents.
fn pick_free_cell(grid: &GridGraph, fleet: &Fleet, rng: &mut ChaCha8Rng) -> Option<CellCoord> {
    let occupied = query::occupied_cells(fleet);
    let free: Vec<CellCoord> = all_cells(grid)
        .filter(|cell| {
            !grid.is_obstacle(*cell)
                && grid.cell(*cell).and_then(|c| c.payload()).is_none()
                && !occupied.contains(cell)
        })
        .collect();
    if free.is_empty() {
        return None;
    }
    Some(free[rng.gen_range(0..free.len())])
}

/// Answers every mission request raised during the tick.
fn serve_missions(
    fleet: &mut Fleet,
    grid: &GridGraph,
    planner: &PathPlanner,
    rng: &mut ChaCha8Rng,
    events: &mut Vec<Event>,
) {
    let requested: Vec<AgentId> = events
        .iter()
        .filter_map(|event| match event {
            Event::MissionRequested { agent } => Some(*agent),
            _ => None,
        })
        .collect();

    for id in requested {
        let Some(snapshot) = query::agent(fleet, id) else {
            continue;
        };
        let task = if snapshot.carrying.is_some() {
            delivery_task(fleet, grid, planner, snapshot.cell)
        } else if let Some(goal) = nearest_payload(grid, snapshot.cell) {
            Some(Task::new(TaskKind::Retrieve, goal))
        } else {
            pick_free_cell(grid, fleet, rng).map(|goal| Task::new(TaskKind::Approach, goal))
        };
        if let Some(task) = task {
            let _ = fleet.assign_task(id, task, events);
        }
    }
}

/// Deliver to the cheapest reachable free cell: no weight surface, so the
/// region search degenerates to the nearest cell that is neither occupied
/// nor already holding a payload.
fn delivery_task(
    fleet: &Fleet,
    grid: &GridGraph,
    planner: &PathPlanner,
    start: CellCoord,
) -> Option<Task> {
    let mut blocked = query::occupied_cells(fleet);
    for cell in all_cells(grid) {
        if grid.cell(cell).and_then(|c| c.payload()).is_some() {
            let _ = blocked.insert(cell);
        }
    }
    let candidates = planner.lowest_cost_cells(grid, start, |_| 0.0, &blocked);
    candidates
        .first()
        .map(|goal| Task::new(TaskKind::Deliver, *goal))
}

fn nearest_payload(grid: &GridGraph, from: CellCoord) -> Option<CellCoord> {
    all_cells(grid)
        .filter(|cell| grid.cell(*cell).and_then(|c| c.payload()).is_some())
        .min_by_key(|cell| (from.manhattan_distance(*cell), cell.column(), cell.row()))
}

fn all_cells(grid: &GridGraph) -> impl Iterator<Item = CellCoord> + '_ {
    (0..grid.rows())
        .flat_map(move |row| (0..grid.columns()).map(move |column| CellCoord::new(column, row)))
}

fn print_summary(fleet: &Fleet, analytics: &Analytics, ticks: u64) {
    let report = analytics.report();
    println!("gridway run: {ticks} ticks");
    println!("  missions requested:  {}", report.missions_requested);
    println!("  tasks assigned:      {}", report.tasks_assigned);
    println!("  tasks completed:     {}", report.tasks_completed);
    println!("  paths planned:       {}", report.paths_planned);
    println!("  replans failed:      {}", report.replans_failed);
    println!("  jams:                {}", report.jams);
    println!("  jam time:            {:?}", report.jam_time);
    println!("  redirects:           {}", report.redirects);
    println!("  redirects exhausted: {}", report.redirects_exhausted);
    println!("  anchor faults:       {}", report.anchor_faults);
    println!("  payload transfers:   {}", report.payload_transfers);
    for snapshot in query::agents(fleet) {
        println!(
            "  agent {:>3} at ({}, {}) {:?} carrying {:?}",
            snapshot.id.get(),
            snapshot.cell.column(),
            snapshot.cell.row(),
            snapshot.state,
            snapshot.carrying.map(|payload| payload.get()),
        );
    }
}
