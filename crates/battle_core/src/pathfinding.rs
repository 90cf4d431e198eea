//! Hex pathfinding using the A* algorithm.
//!
//! Step costs are integer MP: terrain cost of the entered hex, +1 for
//! entering a zone of control, +1 for leaving one, and +1 per step while out
//! of supply. Enemy-occupied hexes may end a path but never be passed
//! through.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::error::{GameError, Result};
use crate::grid::HexGrid;
use crate::hex::Hex;

/// Cost model for one mover.
#[derive(Debug, Clone, Copy)]
pub struct StepCosts<'a> {
    /// Map.
    pub grid: &'a HexGrid,
    /// Hexes holding units hostile to the mover.
    pub enemy_occupied: &'a BTreeSet<Hex>,
    /// Hexes adjacent to a living unit hostile to the mover.
    pub zone_of_control: &'a BTreeSet<Hex>,
    /// Whether the mover is out of supply.
    pub out_of_supply: bool,
}

impl StepCosts<'_> {
    /// MP needed to step from `from` to the adjacent `to`.
    ///
    /// Returns `None` if `to` is off the map or impassable.
    #[must_use]
    pub fn step_cost(&self, from: Hex, to: Hex) -> Option<u32> {
        let mut cost = self.grid.terrain(to)?.move_cost()?;
        if self.zone_of_control.contains(&from) {
            cost += 1;
        }
        if self.zone_of_control.contains(&to) {
            cost += 1;
        }
        if self.out_of_supply {
            cost += 1;
        }
        Some(cost)
    }
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    hex: Hex,
    /// f_score = g_score + heuristic
    f_score: u32,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for lowest f first, then lowest hex.
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.hex.cmp(&self.hex))
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find the cheapest path from `start` to `goal`, both included.
///
/// Hex distance is an admissible heuristic because every step costs at
/// least 1.
///
/// # Errors
///
/// Returns `GameError::InvalidState` if the goal is off the map, impassable,
/// or unreachable.
pub fn find_path(costs: &StepCosts<'_>, start: Hex, goal: Hex) -> Result<Vec<Hex>> {
    if !costs.grid.is_passable(goal) {
        return Err(GameError::InvalidState(format!(
            "Goal {goal} is not passable"
        )));
    }
    if start == goal {
        return Ok(vec![start]);
    }

    let mut open_set = BinaryHeap::new();
    let mut came_from: BTreeMap<Hex, Hex> = BTreeMap::new();
    let mut g_score: BTreeMap<Hex, u32> = BTreeMap::new();

    g_score.insert(start, 0);
    open_set.push(AStarNode {
        hex: start,
        f_score: start.distance(goal),
    });

    while let Some(current) = open_set.pop() {
        if current.hex == goal {
            return Ok(reconstruct_path(&came_from, goal));
        }

        let current_g = g_score.get(&current.hex).copied().unwrap_or(u32::MAX);

        for next in current.hex.neighbors() {
            if next != goal && costs.enemy_occupied.contains(&next) {
                continue;
            }
            let Some(step) = costs.step_cost(current.hex, next) else {
                continue;
            };

            let tentative_g = current_g.saturating_add(step);
            if tentative_g < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                came_from.insert(next, current.hex);
                g_score.insert(next, tentative_g);
                open_set.push(AStarNode {
                    hex: next,
                    f_score: tentative_g + next.distance(goal),
                });
            }
        }
    }

    Err(GameError::InvalidState(format!(
        "No path from {start} to {goal}"
    )))
}

fn reconstruct_path(came_from: &BTreeMap<Hex, Hex>, goal: Hex) -> Vec<Hex> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

/// How far along `path` a mover with `mp` points gets this tick.
///
/// Returns the hex reached and the MP spent. The first step is always
/// taken when `mp >= 1`, even if it costs more; it then spends all
/// remaining MP. A path ends early at the first enemy-occupied hex.
#[must_use]
pub fn advance_along(costs: &StepCosts<'_>, path: &[Hex], mp: u32) -> (Hex, u32) {
    let Some(&start) = path.first() else {
        return (Hex::ORIGIN, 0);
    };
    let mut reached = start;
    let mut spent = 0u32;

    for (i, &next) in path.iter().enumerate().skip(1) {
        let Some(step) = costs.step_cost(reached, next) else {
            break;
        };
        if spent + step > mp {
            if i == 1 && mp >= 1 {
                reached = next;
                spent = mp;
            }
            break;
        }
        spent += step;
        reached = next;
        if costs.enemy_occupied.contains(&next) {
            break;
        }
    }

    (reached, spent)
}
