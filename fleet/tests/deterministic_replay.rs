use std::time::Duration;

use gridway_core::{
    AgentId, AgentState, CellCoord, Direction, Event, FleetConfig, PayloadId, PlannerConfig, Task,
    TaskKind,
};
use gridway_fleet::{query, Fleet};
use gridway_graph::GridGraph;

const DT: Duration = Duration::from_millis(100);

/// Two runs of the same scenario under the same seed must produce identical
/// event streams and identical final agent states. The scenario forces a
/// redirect with more than one valid displacement cell so the seeded
/// tie-break is exercised, not just deterministic arithmetic.
#[test]
fn identically_seeded_runs_replay_exactly() {
    let first = replay();
    let second = replay();

    assert_eq!(first, second, "replay diverged between runs");
    assert!(
        first
            .events
            .iter()
            .any(|event| matches!(event, Event::AgentRedirected { .. })),
        "scenario must reach the seeded redirect pick"
    );
}

fn replay() -> ReplayOutcome {
    let mut grid = four_directional_grid(4, 2);
    let mut fleet = Fleet::new(FleetConfig::default(), PlannerConfig::default());
    let mover = fleet.register_agent(&grid, CellCoord::new(0, 0));
    let _parked = fleet.register_agent(&grid, CellCoord::new(2, 0));

    let mut events = Vec::new();
    assert!(fleet.assign_task(
        mover,
        Task::new(TaskKind::Approach, CellCoord::new(2, 0)),
        &mut events
    ));

    let ids: Vec<AgentId> = query::agents(&fleet)
        .into_iter()
        .map(|snapshot| snapshot.id)
        .collect();
    for _ in 0..120 {
        fleet.tick(&mut grid, DT, |_, _| ids.clone(), &mut events);
    }

    let agents = query::agents(&fleet)
        .into_iter()
        .map(AgentRecord::from)
        .collect();
    ReplayOutcome { events, agents }
}

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

#[derive(Clone, Debug, PartialEq)]
struct ReplayOutcome {
    events: Vec<Event>,
    agents: Vec<AgentRecord>,
}

#[derive(Clone, Debug, PartialEq)]
struct AgentRecord {
    id: AgentId,
    state: AgentState,
    cell: CellCoord,
    position_bits: (u32, u32),
    carrying: Option<PayloadId>,
}

impl From<query::AgentSnapshot> for AgentRecord {
    fn from(snapshot: query::AgentSnapshot) -> Self {
        Self {
            id: snapshot.id,
            state: snapshot.state,
            cell: snapshot.cell,
            position_bits: (snapshot.position.x.to_bits(), snapshot.position.y.to_bits()),
            carrying: snapshot.carrying,
        }
    }
}
