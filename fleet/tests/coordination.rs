use std::time::Duration;

use gridway_core::{
    AgentId, AgentState, CellCoord, Direction, Event, FleetConfig, PayloadId, PlannerConfig, Task,
    TaskKind,
};
use gridway_fleet::{query, Fleet};
use gridway_graph::GridGraph;

const DT: Duration = Duration::from_millis(100);

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

/// Runs the fleet with an all-pairs proximity query, collecting every event.
fn run(fleet: &mut Fleet, grid: &mut GridGraph, ticks: usize, events: &mut Vec<Event>) {
    let ids: Vec<AgentId> = query::agents(fleet)
        .into_iter()
        .map(|snapshot| snapshot.id)
        .collect();
    for _ in 0..ticks {
        fleet.tick(grid, DT, |_, _| ids.clone(), events);
    }
}

fn completions(events: &[Event]) -> Vec<AgentId> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::TaskCompleted { agent, .. } => Some(*agent),
            _ => None,
        })
        .collect()
}

#[test]
fn approach_task_runs_to_completion() {
    let mut grid = four_directional_grid(5, 5);
    let mut fleet = Fleet::new(FleetConfig::default(), PlannerConfig::default());
    let id = fleet.register_agent(&grid, CellCoord::new(0, 0));

    let mut events = Vec::new();
    assert!(fleet.assign_task(
        id,
        Task::new(TaskKind::Approach, CellCoord::new(3, 0)),
        &mut events
    ));
    run(&mut fleet, &mut grid, 100, &mut events);

    assert_eq!(completions(&events), vec![id]);
    let snapshot = query::agent(&fleet, id).expect("registered agent");
    assert_eq!(snapshot.state, AgentState::Idle);
    assert_eq!(snapshot.cell, CellCoord::new(3, 0));
}

#[test]
fn mission_requests_are_deduplicated_until_served() {
    let mut grid = four_directional_grid(3, 3);
    let mut fleet = Fleet::new(FleetConfig::default(), PlannerConfig::default());
    let id = fleet.register_agent(&grid, CellCoord::new(1, 1));

    let mut events = Vec::new();
    run(&mut fleet, &mut grid, 5, &mut events);
    let requests = events
        .iter()
        .filter(|event| matches!(event, Event::MissionRequested { .. }))
        .count();
    assert_eq!(requests, 1);

    // Serving the request and completing the task re-arms it.
    assert!(fleet.assign_task(
        id,
        Task::new(TaskKind::Approach, CellCoord::new(1, 0)),
        &mut events
    ));
    events.clear();
    run(&mut fleet, &mut grid, 50, &mut events);
    assert_eq!(completions(&events), vec![id]);
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::MissionRequested { .. })));
}

#[test]
fn retrieve_then_deliver_moves_the_payload() {
    let mut grid = four_directional_grid(3, 2);
    let payload = PayloadId::new(7);
    grid.set_payload(CellCoord::new(2, 0), Some(payload));

    let mut fleet = Fleet::new(FleetConfig::default(), PlannerConfig::default());
    let id = fleet.register_agent(&grid, CellCoord::new(0, 0));

    let mut events = Vec::new();
    assert!(fleet.assign_task(
        id,
        Task::new(TaskKind::Retrieve, CellCoord::new(2, 0)),
        &mut events
    ));
    run(&mut fleet, &mut grid, 100, &mut events);

    assert!(events
        .iter()
        .any(|event| matches!(event, Event::PayloadPicked { payload: p, .. } if *p == payload)));
    let snapshot = query::agent(&fleet, id).expect("agent");
    assert_eq!(snapshot.carrying, Some(payload));
    assert_eq!(
        grid.cell(CellCoord::new(2, 0)).and_then(|cell| cell.payload()),
        None
    );

    assert!(fleet.assign_task(
        id,
        Task::new(TaskKind::Deliver, CellCoord::new(0, 1)),
        &mut events
    ));
    events.clear();
    run(&mut fleet, &mut grid, 100, &mut events);

    assert!(events
        .iter()
        .any(|event| matches!(event, Event::PayloadDropped { payload: p, .. } if *p == payload)));
    let snapshot = query::agent(&fleet, id).expect("agent");
    assert_eq!(snapshot.carrying, None);
    assert_eq!(
        grid.cell(CellCoord::new(0, 1)).and_then(|cell| cell.payload()),
        Some(payload)
    );
}

#[test]
fn superseding_task_mid_transfer_cancels_the_handling_phase() {
    let mut grid = four_directional_grid(3, 2);
    let payload = PayloadId::new(3);
    grid.set_payload(CellCoord::new(2, 0), Some(payload));

    let mut fleet = Fleet::new(FleetConfig::default(), PlannerConfig::default());
    let id = fleet.register_agent(&grid, CellCoord::new(2, 0));

    let mut events = Vec::new();
    assert!(fleet.assign_task(
        id,
        Task::new(TaskKind::Retrieve, CellCoord::new(2, 0)),
        &mut events
    ));
    run(&mut fleet, &mut grid, 4, &mut events);
    let snapshot = query::agent(&fleet, id).expect("agent");
    assert_eq!(snapshot.state, AgentState::Handling);

    // The replacement arrives before the pickup finishes.
    assert!(fleet.assign_task(
        id,
        Task::new(TaskKind::Deliver, CellCoord::new(0, 1)),
        &mut events
    ));
    run(&mut fleet, &mut grid, 60, &mut events);

    // The abandoned pickup never ran, so the payload stays on the grid and
    // the delivery completes empty-handed at its own goal.
    assert!(!events
        .iter()
        .any(|event| matches!(event, Event::PayloadPicked { .. })));
    assert!(!events
        .iter()
        .any(|event| matches!(event, Event::PayloadDropped { .. })));
    assert_eq!(
        grid.cell(CellCoord::new(2, 0)).and_then(|cell| cell.payload()),
        Some(payload)
    );
    assert_eq!(completions(&events), vec![id]);
    assert!(events.iter().any(|event| matches!(
        event,
        Event::TaskCompleted { goal, .. } if *goal == CellCoord::new(0, 1)
    )));
    let snapshot = query::agent(&fleet, id).expect("agent");
    assert_eq!(snapshot.cell, CellCoord::new(0, 1));
    assert_eq!(snapshot.carrying, None);
}

#[test]
fn goal_occupant_is_redirected_and_the_wait_bills_the_goal_bucket() {
    let mut grid = four_directional_grid(3, 2);
    let mut fleet = Fleet::new(FleetConfig::default(), PlannerConfig::default());
    let mover = fleet.register_agent(&grid, CellCoord::new(0, 0));
    let parked = fleet.register_agent(&grid, CellCoord::new(2, 0));

    let mut events = Vec::new();
    assert!(fleet.assign_task(
        mover,
        Task::new(TaskKind::Approach, CellCoord::new(2, 0)),
        &mut events
    ));
    run(&mut fleet, &mut grid, 200, &mut events);

    // The parked agent had exactly one clear side cell to be pushed to.
    assert!(events.iter().any(|event| matches!(
        event,
        Event::AgentRedirected { agent, to }
            if *agent == parked && *to == CellCoord::new(2, 1)
    )));

    let stats = events
        .iter()
        .find_map(|event| match event {
            Event::TaskCompleted { agent, stats, .. } if *agent == mover => Some(*stats),
            _ => None,
        })
        .expect("mover completes");
    assert_eq!(stats.waiting_for_goal, Duration::from_secs(1));
    assert_eq!(stats.jammed, Duration::ZERO);

    let snapshot = query::agent(&fleet, parked).expect("parked agent");
    assert_eq!(snapshot.cell, CellCoord::new(2, 1));
    assert_eq!(snapshot.state, AgentState::Idle);
}

#[test]
fn transit_blocker_redirect_bills_the_transit_bucket() {
    let mut grid = four_directional_grid(3, 2);
    let mut fleet = Fleet::new(FleetConfig::default(), PlannerConfig::default());
    let mover = fleet.register_agent(&grid, CellCoord::new(0, 0));
    let blocker = fleet.register_agent(&grid, CellCoord::new(1, 0));

    let mut events = Vec::new();
    assert!(fleet.assign_task(
        mover,
        Task::new(TaskKind::Approach, CellCoord::new(2, 0)),
        &mut events
    ));
    run(&mut fleet, &mut grid, 200, &mut events);

    assert!(events.iter().any(|event| matches!(
        event,
        Event::AgentRedirected { agent, to }
            if *agent == blocker && *to == CellCoord::new(1, 1)
    )));

    let stats = events
        .iter()
        .find_map(|event| match event {
            Event::TaskCompleted { agent, stats, .. } if *agent == mover => Some(*stats),
            _ => None,
        })
        .expect("mover completes");
    assert_eq!(stats.jammed, Duration::from_secs(1));
    assert_eq!(stats.waiting_for_goal, Duration::ZERO);
}

#[test]
fn head_on_meeting_resolves_by_asymmetric_dodge() {
    let mut grid = four_directional_grid(5, 5);
    let mut fleet = Fleet::new(FleetConfig::default(), PlannerConfig::default());
    let first = fleet.register_agent(&grid, CellCoord::new(0, 0));
    let second = fleet.register_agent(&grid, CellCoord::new(4, 0));

    let mut events = Vec::new();
    assert!(fleet.assign_task(
        first,
        Task::new(TaskKind::Approach, CellCoord::new(4, 0)),
        &mut events
    ));
    assert!(fleet.assign_task(
        second,
        Task::new(TaskKind::Approach, CellCoord::new(0, 0)),
        &mut events
    ));
    run(&mut fleet, &mut grid, 400, &mut events);

    let mut completed = completions(&events);
    completed.sort();
    assert_eq!(completed, vec![first, second]);

    // Processing order breaks the symmetry: the first agent replans around
    // the oncoming one, the second keeps its original straight route.
    let plans = |id: AgentId| {
        events
            .iter()
            .filter(|event| matches!(event, Event::PathPlanned { agent, .. } if *agent == id))
            .count()
    };
    assert_eq!(plans(first), 2);
    assert_eq!(plans(second), 1);
    assert!(!events
        .iter()
        .any(|event| matches!(event, Event::AgentJammed { .. })));
}

#[test]
fn boxed_in_goal_cycles_without_progress() {
    let mut grid = four_directional_grid(2, 1);
    let mut fleet = Fleet::new(FleetConfig::default(), PlannerConfig::default());
    let mover = fleet.register_agent(&grid, CellCoord::new(0, 0));
    let occupant = fleet.register_agent(&grid, CellCoord::new(1, 0));

    let mut events = Vec::new();
    assert!(fleet.assign_task(
        mover,
        Task::new(TaskKind::Approach, CellCoord::new(1, 0)),
        &mut events
    ));
    run(&mut fleet, &mut grid, 100, &mut events);

    // The occupant has nowhere to be displaced to and every replan dead-ends
    // on the occupied goal, so the mover never completes but keeps retrying.
    assert!(completions(&events).is_empty());
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::RedirectExhausted { agent } if *agent == occupant)));
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::ReplanFailed { agent } if *agent == mover)));

    let snapshots = query::agents(&fleet);
    assert_eq!(snapshots[0].cell, CellCoord::new(0, 0));
    assert_eq!(snapshots[1].cell, CellCoord::new(1, 0));
}
