//! Turns independently planned routes into a time-indexed schedule without vertex collisions
//! by inserting wait steps.
use core::fmt::Debug;
use std::hash::Hash;

use fxhash::FxHashMap;
use grid_util::Point;
use log::{debug, info, warn};

use crate::{FxIndexMap, MAX_SCHEDULE_PASSES};

/// Bounded fixed-point repair of vertex conflicts.
///
/// Each pass scans time steps from 0, reserving cells for agents in their input order. An agent
/// past the end of its route stays parked on its final cell. The first conflict a single wait
/// can repair gets one, then the scan restarts. Conflicts no wait can repair, such as two agents
/// starting on the same cell or an agent whose route crosses a cell another agent has parked
/// on, are counted and skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollisionScheduler {
    pub max_passes: usize,
}

impl Default for CollisionScheduler {
    fn default() -> Self {
        CollisionScheduler {
            max_passes: MAX_SCHEDULE_PASSES,
        }
    }
}

/// Output of [CollisionScheduler::schedule].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule<K: Hash + Eq> {
    /// Position per time step for every agent, in input order.
    pub routes: FxIndexMap<K, Vec<Point>>,
    pub passes: usize,
    pub waits_inserted: usize,
    /// Conflicts left in the final schedule because no single wait could repair them.
    pub unresolved: usize,
    /// False if the pass cap was reached while repairs were still being made.
    pub converged: bool,
}

impl<K: Hash + Eq> Schedule<K> {
    pub fn route(&self, key: &K) -> Option<&[Point]> {
        self.routes.get(key).map(Vec::as_slice)
    }

    pub fn makespan(&self) -> usize {
        self.routes.values().map(Vec::len).max().unwrap_or(0)
    }
}

fn position_at(route: &[Point], t: usize) -> Option<Point> {
    route.get(t.min(route.len().checked_sub(1)?)).copied()
}

/// Whether a wait inserted at `t` moves the agent off the cell it occupies at `t`.
fn wait_helps(route: &[Point], t: usize) -> bool {
    t >= 1 && t < route.len() && route[t - 1] != route[t]
}

/// Whether the agent sits on its final cell from `t` onwards.
fn parked(route: &[Point], t: usize) -> bool {
    t + 1 >= route.len()
}

enum Pass {
    Clean { unresolved: usize },
    Repaired,
}

impl CollisionScheduler {
    pub fn new(max_passes: usize) -> CollisionScheduler {
        CollisionScheduler { max_passes }
    }

    /// Schedules `routes`, keyed by agent. Later entries with a duplicate key replace earlier
    /// ones. Empty routes take no part in conflicts.
    pub fn schedule<K, I>(&self, routes: I) -> Schedule<K>
    where
        K: Hash + Eq + Clone + Debug,
        I: IntoIterator<Item = (K, Vec<Point>)>,
    {
        let (keys, mut paths): (Vec<K>, Vec<Vec<Point>>) = routes
            .into_iter()
            .collect::<FxIndexMap<K, Vec<Point>>>()
            .into_iter()
            .unzip();
        let mut passes = 0;
        let mut waits_inserted = 0;
        let mut unresolved = 0;
        let mut converged = false;

        while passes < self.max_passes {
            passes += 1;
            match self.repair_pass(&keys, &mut paths) {
                Pass::Clean { unresolved: u } => {
                    unresolved = u;
                    converged = true;
                    break;
                }
                Pass::Repaired => waits_inserted += 1,
            }
        }

        if converged {
            info!(
                "Schedule converged after {passes} passes with {waits_inserted} waits, {unresolved} unresolved conflicts"
            );
        } else {
            warn!(
                "Schedule did not converge within {} passes, returning best effort",
                self.max_passes
            );
        }
        Schedule {
            routes: keys.into_iter().zip(paths).collect(),
            passes,
            waits_inserted,
            unresolved,
            converged,
        }
    }

    /// Scans the schedule once, inserting at most one wait.
    fn repair_pass<K: Debug>(&self, keys: &[K], paths: &mut [Vec<Point>]) -> Pass {
        let horizon = paths.iter().map(Vec::len).max().unwrap_or(0);
        let mut unresolved = 0;
        let mut reserved: FxHashMap<Point, usize> = FxHashMap::default();
        for t in 0..horizon {
            reserved.clear();
            for agent in 0..paths.len() {
                let Some(p) = position_at(&paths[agent], t) else {
                    continue;
                };
                let Some(&owner) = reserved.get(&p) else {
                    reserved.insert(p, agent);
                    continue;
                };
                let loser = if wait_helps(&paths[agent], t) && !parked(&paths[owner], t) {
                    agent
                } else if wait_helps(&paths[owner], t) && !parked(&paths[agent], t) {
                    owner
                } else {
                    unresolved += 1;
                    continue;
                };
                debug!(
                    "Agents {:?} and {:?} meet at {} at t={t}, {:?} waits",
                    keys[owner], keys[agent], p, keys[loser]
                );
                let route = &mut paths[loser];
                let previous = route[t - 1];
                route.insert(t, previous);
                return Pass::Repaired;
            }
        }
        Pass::Clean { unresolved }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(points: &[(i32, i32)]) -> Vec<Point> {
        points.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    fn collisions(schedule: &Schedule<&str>) -> usize {
        let routes = schedule.routes.values().collect::<Vec<_>>();
        (0..schedule.makespan())
            .map(|t| {
                let cells = routes
                    .iter()
                    .filter_map(|r| position_at(r, t))
                    .collect::<Vec<_>>();
                cells.len() - cells.iter().collect::<std::collections::HashSet<_>>().len()
            })
            .sum()
    }

    #[test]
    fn crossing_agents_are_separated_by_one_wait() {
        let a = line(&[(2, 5), (2, 4), (2, 3), (2, 2), (2, 1)]);
        let b = line(&[(5, 2), (4, 2), (3, 2), (2, 2), (1, 2)]);
        let schedule = CollisionScheduler::default().schedule([("a", a.clone()), ("b", b)]);
        assert!(schedule.converged);
        assert_eq!(schedule.passes, 2);
        assert_eq!(schedule.waits_inserted, 1);
        assert_eq!(schedule.unresolved, 0);
        assert_eq!(schedule.route(&"a"), Some(a.as_slice()));
        assert_eq!(
            schedule.route(&"b"),
            Some(line(&[(5, 2), (4, 2), (3, 2), (3, 2), (2, 2), (1, 2)]).as_slice())
        );
        assert_eq!(collisions(&schedule), 0);
    }

    #[test]
    fn owner_yields_when_waiting_cannot_help_the_loser() {
        // b is already waiting on (1, 0) at t=2, so delaying b keeps it there
        let a = line(&[(3, 0), (2, 0), (1, 0), (0, 0)]);
        let b = line(&[(1, 1), (1, 0), (1, 0), (1, 1)]);
        let schedule = CollisionScheduler::default().schedule([("a", a), ("b", b.clone())]);
        assert!(schedule.converged);
        assert_eq!(schedule.waits_inserted, 1);
        assert_eq!(schedule.unresolved, 0);
        assert_eq!(schedule.route(&"b"), Some(b.as_slice()));
        assert_eq!(
            schedule.route(&"a"),
            Some(line(&[(3, 0), (2, 0), (2, 0), (1, 0), (0, 0)]).as_slice())
        );
        assert_eq!(collisions(&schedule), 0);
    }

    #[test]
    fn crossing_a_parked_agent_is_unresolved() {
        let a = line(&[(0, 0), (1, 0), (2, 0)]);
        let b = line(&[(1, 0)]);
        let schedule = CollisionScheduler::default().schedule([("a", a), ("b", b)]);
        assert!(schedule.converged);
        assert_eq!(schedule.waits_inserted, 0);
        assert_eq!(schedule.unresolved, 1);
    }

    #[test]
    fn shared_start_is_unresolved() {
        let a = line(&[(0, 0), (1, 0)]);
        let b = line(&[(0, 0), (0, 1)]);
        let schedule = CollisionScheduler::default().schedule([("a", a.clone()), ("b", b.clone())]);
        assert!(schedule.converged);
        assert_eq!(schedule.unresolved, 1);
        assert_eq!(schedule.waits_inserted, 0);
        assert_eq!(schedule.route(&"a"), Some(a.as_slice()));
        assert_eq!(schedule.route(&"b"), Some(b.as_slice()));
    }

    #[test]
    fn conflict_free_input_is_unchanged() {
        let a = line(&[(0, 0), (1, 0), (2, 0)]);
        let b = line(&[(0, 2), (1, 2), (2, 2)]);
        let schedule = CollisionScheduler::default().schedule([("a", a.clone()), ("b", b.clone())]);
        assert_eq!(schedule.passes, 1);
        assert_eq!(schedule.waits_inserted, 0);
        assert_eq!(schedule.route(&"a"), Some(a.as_slice()));
        assert_eq!(schedule.route(&"b"), Some(b.as_slice()));
    }

    #[test]
    fn pass_cap_returns_best_effort() {
        let a = line(&[(2, 5), (2, 4), (2, 3), (2, 2), (2, 1)]);
        let b = line(&[(5, 2), (4, 2), (3, 2), (2, 2), (1, 2)]);
        let schedule = CollisionScheduler::new(1).schedule([("a", a), ("b", b)]);
        assert!(!schedule.converged);
        assert_eq!(schedule.passes, 1);
        assert_eq!(schedule.waits_inserted, 1);
    }

    #[test]
    fn empty_routes_are_ignored() {
        let schedule =
            CollisionScheduler::default().schedule([("a", Vec::new()), ("b", line(&[(0, 0)]))]);
        assert!(schedule.converged);
        assert_eq!(schedule.makespan(), 1);
    }
}
