//! Admissible estimates of the remaining cost on a [Grid].
//!
//! Both estimators are consistent: a single move never lowers the estimate by more than the
//! move costs, so A* never has to reopen a state when using them.
use grid_util::Point;
use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::grid::{tunnel_cost, Grid};
use crate::FxIndexMap;

/// [Manhattan distance](https://en.wikipedia.org/wiki/Taxicab_geometry) between two cells.
pub fn manhattan(a: &Point, b: &Point) -> u64 {
    u64::from(a.x.abs_diff(b.x)) + u64::from(a.y.abs_diff(b.y))
}

/// Lowest cost any move can have per unit of Manhattan distance covered. An edge covers one
/// unit for at least the minimum edge cost, a tunnel covers `d` units for `max(1, d)`.
pub fn unit_step_cost(grid: &Grid) -> u64 {
    let min_edge = u64::from(grid.min_edge_cost());
    if grid.tunnels().is_empty() {
        min_edge
    } else {
        min_edge.min(1)
    }
}

/// Manhattan distance scaled by [unit_step_cost].
pub fn delivery_admissible(state: &Point, goal: &Point, grid: &Grid) -> u64 {
    manhattan(state, goal).saturating_mul(unit_step_cost(grid))
}

/// Tunnel-aware estimate for a single query. Prefer building a [TunnelEstimate] once per goal
/// when evaluating many states.
pub fn tunnel_aware(state: &Point, goal: &Point, grid: &Grid) -> u64 {
    TunnelEstimate::new(grid, *goal).estimate(state)
}

/// Relaxed distances to a fixed goal through tunnels.
///
/// The relaxation keeps only the goal and the tunnel entrances: walking between any two of
/// them costs their Manhattan distance times the minimum edge cost, a tunnel costs exactly what
/// the search charges for it. The shortest relaxed distance from every entrance to the goal is
/// computed once; an estimate is then the cheaper of walking straight to the goal or walking to
/// an entrance and continuing from there.
#[derive(Clone, Debug)]
pub struct TunnelEstimate {
    goal: Point,
    walk_cost: u64,
    portals: Vec<(Point, u64)>,
}

impl TunnelEstimate {
    pub fn new(grid: &Grid, goal: Point) -> TunnelEstimate {
        let walk_cost = u64::from(grid.min_edge_cost());
        if grid.tunnels().is_empty() {
            return TunnelEstimate {
                goal,
                walk_cost,
                portals: Vec::new(),
            };
        }
        let mut graph: UnGraph<Point, u64> = UnGraph::default();
        let mut index: FxIndexMap<Point, NodeIndex> = FxIndexMap::default();
        index.insert(goal, graph.add_node(goal));
        for (a, b) in grid.tunnels() {
            for p in [a, b] {
                if !index.contains_key(p) {
                    index.insert(*p, graph.add_node(*p));
                }
            }
        }
        let nodes = index.iter().map(|(p, ix)| (*p, *ix)).collect::<Vec<_>>();
        for (i, (p, pi)) in nodes.iter().enumerate() {
            for (q, qi) in &nodes[i + 1..] {
                graph.add_edge(*pi, *qi, manhattan(p, q).saturating_mul(walk_cost));
            }
        }
        for (a, b) in grid.tunnels() {
            graph.add_edge(index[a], index[b], u64::from(tunnel_cost(a, b)));
        }
        let distances = dijkstra(&graph, index[&goal], None, |e| *e.weight());
        let portals = nodes
            .iter()
            .filter(|(p, _)| *p != goal)
            .filter_map(|(p, ix)| distances.get(ix).map(|d| (*p, *d)))
            .collect();
        TunnelEstimate {
            goal,
            walk_cost,
            portals,
        }
    }

    pub fn goal(&self) -> Point {
        self.goal
    }

    pub fn estimate(&self, state: &Point) -> u64 {
        let direct = manhattan(state, &self.goal).saturating_mul(self.walk_cost);
        self.portals
            .iter()
            .map(|(p, d)| {
                manhattan(state, p)
                    .saturating_mul(self.walk_cost)
                    .saturating_add(*d)
            })
            .fold(direct, u64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manhattan_is_symmetric() {
        let a = Point::new(1, 5);
        let b = Point::new(4, 1);
        assert_eq!(manhattan(&a, &b), 7);
        assert_eq!(manhattan(&b, &a), 7);
        assert_eq!(manhattan(&a, &a), 0);
    }

    #[test]
    fn uniform_grid_estimates_are_tight() {
        let grid = Grid::uniform(3, 3, 1);
        let start = Point::new(0, 0);
        let goal = Point::new(2, 2);
        assert_eq!(delivery_admissible(&start, &goal, &grid), 4);
        assert_eq!(tunnel_aware(&start, &goal, &grid), 4);
    }

    #[test]
    fn walking_is_scaled_by_cheapest_edge() {
        let grid = Grid::uniform(4, 4, 3);
        let goal = Point::new(3, 3);
        assert_eq!(delivery_admissible(&Point::new(0, 0), &goal, &grid), 18);
        assert_eq!(tunnel_aware(&Point::new(0, 0), &goal, &grid), 18);
    }

    #[test]
    fn tunnels_lower_the_unit_step() {
        let mut grid = Grid::uniform(5, 5, 2);
        grid.add_tunnel(Point::new(0, 0), Point::new(4, 4));
        let start = Point::new(0, 0);
        let goal = Point::new(4, 4);
        assert_eq!(unit_step_cost(&grid), 1);
        assert_eq!(delivery_admissible(&start, &goal, &grid), 8);
        // Through the tunnel for 8 instead of walking for 16
        assert_eq!(tunnel_aware(&start, &goal, &grid), 8);
        // One step off the entrance: walk back for 2, then tunnel for 8
        assert_eq!(tunnel_aware(&Point::new(1, 0), &goal, &grid), 10);
        assert!(delivery_admissible(&Point::new(1, 0), &goal, &grid) <= 10);
    }

    #[test]
    fn chained_tunnels_are_combined() {
        let mut grid = Grid::uniform(10, 1, 3);
        grid.add_tunnel(Point::new(1, 0), Point::new(4, 0));
        grid.add_tunnel(Point::new(5, 0), Point::new(9, 0));
        let start = Point::new(0, 0);
        let goal = Point::new(9, 0);
        // walk 3 + tunnel 3 + walk 3 + tunnel 4
        assert_eq!(tunnel_aware(&start, &goal, &grid), 13);
        assert_eq!(delivery_admissible(&start, &goal, &grid), 9);
    }

    #[test]
    fn estimate_is_zero_only_on_goal() {
        let mut grid = Grid::uniform(6, 6, 1);
        grid.add_tunnel(Point::new(0, 5), Point::new(5, 0));
        let goal = Point::new(5, 0);
        let estimate = TunnelEstimate::new(&grid, goal);
        assert_eq!(estimate.goal(), goal);
        assert_eq!(estimate.estimate(&goal), 0);
        assert_eq!(estimate.estimate(&Point::new(0, 5)), 10);
        for x in 0..6 {
            for y in 0..6 {
                let p = Point::new(x, y);
                if p != goal {
                    assert!(estimate.estimate(&p) > 0);
                }
            }
        }
    }
}
