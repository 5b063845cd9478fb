//! Neighborhood conflict resolution.
//!
//! Each moving agent classifies every nearby agent against its next-target
//! cell and goal, producing a per-neighbor decision. The neighborhood
//! aggregate is the worst (highest-severity) decision, applied once per
//! tick. Redirect negotiation is the only part that mutates the other
//! agent, so classification runs read-only first and redirects are applied
//! in a second pass.

use glam::Vec2;
use gridway_core::{AgentId, AgentState, CellCoord, Decision, Direction, Event, JamCause, Path};
use gridway_graph::GridGraph;
use rand::Rng;

use crate::{jam_agent, Fleet};

/// Neighborhood aggregate handed back to the movement loop.
#[derive(Clone, Debug)]
pub(crate) struct Resolution {
    pub(crate) decision: Decision,
    /// Whether any conflicting neighbor sits on the acting agent's goal.
    pub(crate) goal_blocked: bool,
    /// Occupancy cells of every conflicting neighbor, for dodge replanning.
    pub(crate) obstacles: Vec<CellCoord>,
}

impl Resolution {
    fn ignore() -> Self {
        Self {
            decision: Decision::Ignore,
            goal_blocked: false,
            obstacles: Vec::new(),
        }
    }
}

/// Per-neighbor verdict before redirects are attempted.
#[derive(Clone, Copy, Debug)]
enum Verdict {
    Fixed(Decision),
    /// Attempt to push the neighbor aside; the decision depends on whether a
    /// displacement cell exists.
    TryRedirect {
        success: Decision,
        failure: Decision,
    },
}

pub(crate) fn resolve(
    fleet: &mut Fleet,
    grid: &GridGraph,
    index: usize,
    neighbor_ids: &[AgentId],
    out_events: &mut Vec<Event>,
) -> Resolution {
    let acting = &fleet.agents[index];
    let (Some(target), Some(goal)) = (acting.next_cell, acting.current_goal()) else {
        return Resolution::ignore();
    };
    let acting_id = acting.id;
    let acting_position = acting.position;
    let acting_heading = heading(grid, acting.last_cell, target);

    let mut pending: Vec<(usize, Verdict, bool)> = Vec::new();
    for id in neighbor_ids.iter().copied() {
        if id == acting_id {
            continue;
        }
        let Some(other_index) = fleet.index_of(id) else {
            continue;
        };
        let other = &fleet.agents[other_index];
        let blocks_target = other.occupies(target);
        let blocks_goal = other.occupies(goal);

        let verdict = match other.state {
            AgentState::Idle => {
                if blocks_goal || blocks_target {
                    Verdict::TryRedirect {
                        success: Decision::Wait,
                        failure: Decision::Dodge,
                    }
                } else {
                    Verdict::Fixed(Decision::Ignore)
                }
            }
            AgentState::Jamming => {
                if blocks_target {
                    Verdict::TryRedirect {
                        success: Decision::Wait,
                        failure: Decision::Dodge,
                    }
                } else {
                    Verdict::Fixed(Decision::Ignore)
                }
            }
            AgentState::Handling => {
                if blocks_target && blocks_goal {
                    Verdict::Fixed(Decision::Wait)
                } else if blocks_target {
                    Verdict::Fixed(Decision::Dodge)
                } else {
                    Verdict::Fixed(Decision::Ignore)
                }
            }
            _ => classify_moving(
                fleet,
                grid,
                other_index,
                acting_position,
                acting_heading,
                blocks_target,
                blocks_goal,
            ),
        };
        pending.push((other_index, verdict, blocks_goal));
    }

    let mut resolution = Resolution::ignore();
    for (other_index, verdict, blocks_goal) in pending {
        let decision = match verdict {
            Verdict::Fixed(decision) => decision,
            Verdict::TryRedirect { success, failure } => {
                if try_redirect(fleet, grid, other_index, goal, target, out_events) {
                    success
                } else {
                    failure
                }
            }
        };
        if decision != Decision::Ignore {
            resolution.goal_blocked |= blocks_goal;
            let other = &fleet.agents[other_index];
            resolution.obstacles.push(other.last_cell);
            if let Some(next) = other.next_cell {
                resolution.obstacles.push(next);
            }
        }
        resolution.decision = resolution.decision.max(decision);
    }

    resolution.obstacles.sort_unstable();
    resolution.obstacles.dedup();
    resolution
}

/// Heading-based classification against another moving agent.
fn classify_moving(
    fleet: &Fleet,
    grid: &GridGraph,
    other_index: usize,
    acting_position: Vec2,
    acting_heading: Vec2,
    blocks_target: bool,
    blocks_goal: bool,
) -> Verdict {
    if !blocks_target {
        return Verdict::Fixed(Decision::Ignore);
    }
    let other = &fleet.agents[other_index];
    let Some(other_next) = other.next_cell else {
        // Between path segments this tick; it will have moved on by the
        // next evaluation.
        return Verdict::Fixed(Decision::Ignore);
    };
    let other_heading = heading(grid, other.last_cell, other_next);
    let alignment = acting_heading.dot(other_heading);

    if alignment < -0.5 {
        // Head-on. If the opposing agent also sits on the goal there is
        // nowhere to dodge to, so try pushing it aside instead.
        if blocks_goal {
            Verdict::TryRedirect {
                success: Decision::Deflected,
                failure: Decision::Dodge,
            }
        } else {
            Verdict::Fixed(Decision::Dodge)
        }
    } else if alignment > 0.5 {
        // Following. Hold back only when tailgating.
        if acting_position.distance(other.position) <= fleet.config.safety_distance {
            Verdict::Fixed(Decision::Wait)
        } else {
            Verdict::Fixed(Decision::Ignore)
        }
    } else {
        // Crossing traffic claims the shared cell first; yield.
        Verdict::Fixed(Decision::Wait)
    }
}

/// Attempts to displace the agent at `other_index` one cell sideways.
///
/// Candidate cells are the adjacency-linked cardinal neighbors of the
/// agent's last-committed cell that are in range, clear of obstacles,
/// unoccupied by every agent, and not the acting agent's goal or
/// next-target. The pick among candidates is uniform from the fleet's
/// seeded RNG. With no candidate the agent jams in place and the
/// negotiation reports failure.
fn try_redirect(
    fleet: &mut Fleet,
    grid: &GridGraph,
    other_index: usize,
    protected_goal: CellCoord,
    protected_target: CellCoord,
    out_events: &mut Vec<Event>,
) -> bool {
    let base = fleet.agents[other_index].last_cell;
    let mut candidates: Vec<CellCoord> = Vec::new();
    for direction in Direction::ALL {
        let Some(cell) = direction.step_from(base) else {
            continue;
        };
        if !grid.contains(cell) || grid.is_obstacle(cell) {
            continue;
        }
        if !grid.neighbors(base).contains(&cell) {
            continue;
        }
        if cell == protected_goal || cell == protected_target {
            continue;
        }
        if fleet.agents.iter().any(|agent| agent.occupies(cell)) {
            continue;
        }
        candidates.push(cell);
    }

    if candidates.is_empty() {
        out_events.push(Event::RedirectExhausted {
            agent: fleet.agents[other_index].id,
        });
        jam_agent(
            &mut fleet.agents[other_index],
            JamCause::TransitBlocked,
            out_events,
        );
        return false;
    }

    let pick = candidates[fleet.rng.gen_range(0..candidates.len())];
    let other = &mut fleet.agents[other_index];
    if let Err(error) = other.set_to_state(AgentState::Redirecting) {
        out_events.push(Event::TransitionRejected {
            agent: other.id,
            error,
        });
        return false;
    }
    other.redirect_goal = Some(pick);
    other.jam = None;
    // The displacement is a single hop along a verified adjacency link, so
    // the next-target claim is the whole route.
    other.path = Path::default();
    other.next_cell = Some(pick);
    out_events.push(Event::AgentRedirected {
        agent: other.id,
        to: pick,
    });
    true
}

fn heading(grid: &GridGraph, from: CellCoord, to: CellCoord) -> Vec2 {
    (grid.cell_center(to) - grid.cell_center(from)).normalize_or_zero()
}
