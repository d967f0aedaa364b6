use core::fmt;
use grid_util::Point;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use smallvec::SmallVec;

use crate::heuristics::manhattan;
use crate::FxIndexMap;

/// Neighbour offsets in operator order: up, down, left, right.
pub(crate) const NEUMANN_OFFSETS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// A delivery agent. The id is unique within a [Grid].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Agent {
    pub id: String,
    pub position: Point,
}

impl Agent {
    pub fn new(id: impl Into<String>, position: Point) -> Agent {
        Agent {
            id: id.into(),
            position,
        }
    }
}

/// Cost of travelling through a tunnel between two entrances. Never zero, even for
/// adjacent or coinciding entrances.
pub fn tunnel_cost(a: &Point, b: &Point) -> u32 {
    u32::try_from(manhattan(a, b)).unwrap_or(u32::MAX).max(1)
}

/// [Grid] stores directed edge costs keyed by ordered position pairs. A missing edge cannot be
/// traversed, an edge of cost 0 is explicitly blocked and any positive cost is traversable.
/// Tunnels connect two cells in both directions. Stores, destinations and agents are kept in
/// the order they were added, which is the order the planner considers them in.
#[derive(Clone, Debug, Default)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    edges: FxIndexMap<(Point, Point), u32>,
    tunnels: Vec<(Point, Point)>,
    pub stores: Vec<Point>,
    pub destinations: Vec<Point>,
    pub agents: Vec<Agent>,
}

/// Directed [petgraph] view of a [Grid], one node per cell.
#[derive(Clone, Debug)]
pub struct GridGraph {
    pub graph: DiGraph<Point, u32>,
    pub index: FxIndexMap<Point, NodeIndex>,
}

impl GridGraph {
    pub fn node(&self, point: &Point) -> Option<NodeIndex> {
        self.index.get(point).copied()
    }
}

impl Grid {
    /// An empty grid: no edges, so nothing can move until edges are added.
    pub fn new(width: usize, height: usize) -> Grid {
        Grid {
            width,
            height,
            ..Default::default()
        }
    }

    /// A grid where every cell is connected to its 4-neighbours in both directions with the
    /// same cost.
    pub fn uniform(width: usize, height: usize, cost: u32) -> Grid {
        let mut grid = Grid::new(width, height);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                let p = Point::new(x, y);
                if x + 1 < width as i32 {
                    grid.set_edge_bidirectional(p, Point::new(x + 1, y), cost);
                }
                if y + 1 < height as i32 {
                    grid.set_edge_bidirectional(p, Point::new(x, y + 1), cost);
                }
            }
        }
        grid
    }

    pub fn set_edge(&mut self, from: Point, to: Point, cost: u32) {
        self.edges.insert((from, to), cost);
    }

    pub fn set_edge_bidirectional(&mut self, a: Point, b: Point, cost: u32) {
        self.set_edge(a, b, cost);
        self.set_edge(b, a, cost);
    }

    /// Blocks travel from `from` to `to` only; the reverse direction is left untouched.
    pub fn block_edge(&mut self, from: Point, to: Point) {
        self.set_edge(from, to, 0);
    }

    pub fn edge_cost(&self, from: &Point, to: &Point) -> Option<u32> {
        self.edges.get(&(*from, *to)).copied()
    }

    pub fn edges(&self) -> impl Iterator<Item = (Point, Point, u32)> + '_ {
        self.edges.iter().map(|(&(a, b), &c)| (a, b, c))
    }

    pub fn add_tunnel(&mut self, a: Point, b: Point) {
        self.tunnels.push((a, b));
    }

    pub fn tunnels(&self) -> &[(Point, Point)] {
        &self.tunnels
    }

    pub fn add_store(&mut self, store: Point) {
        self.stores.push(store);
    }

    pub fn add_destination(&mut self, destination: Point) {
        self.destinations.push(destination);
    }

    pub fn add_agent(&mut self, id: impl Into<String>, position: Point) {
        self.agents.push(Agent::new(id, position));
    }

    /// The other end of the first tunnel listing `point` as an entrance. A tunnel leading off
    /// the grid cannot be used.
    pub fn tunnel_partner(&self, point: &Point) -> Option<Point> {
        self.tunnels
            .iter()
            .find_map(|(a, b)| {
                if a == point {
                    Some(*b)
                } else if b == point {
                    Some(*a)
                } else {
                    None
                }
            })
            .filter(|partner| self.in_bounds(partner))
    }

    pub fn in_bounds(&self, point: &Point) -> bool {
        point.x >= 0
            && point.y >= 0
            && (point.x as usize) < self.width
            && (point.y as usize) < self.height
    }

    /// Cost of a single move from `from` to `to`, either along a traversable edge or through a
    /// tunnel. Returns [None] if the move is not possible.
    pub fn move_cost(&self, from: &Point, to: &Point) -> Option<u32> {
        if self.tunnel_partner(from).as_ref() == Some(to) {
            return Some(tunnel_cost(from, to));
        }
        self.edge_cost(from, to).filter(|&c| c > 0)
    }

    /// Cells reachable in one move together with the cost of that move, in operator order.
    pub fn neighbours(&self, point: &Point) -> SmallVec<[(Point, u32); 5]> {
        let mut succ: SmallVec<[(Point, u32); 5]> = NEUMANN_OFFSETS
            .iter()
            .map(|(dx, dy)| Point::new(point.x + dx, point.y + dy))
            .filter(|p| self.in_bounds(p))
            .filter_map(|p| match self.edge_cost(point, &p) {
                Some(c) if c > 0 => Some((p, c)),
                _ => None,
            })
            .collect();
        if let Some(partner) = self.tunnel_partner(point) {
            succ.push((partner, tunnel_cost(point, &partner)));
        }
        succ
    }

    /// Smallest positive edge cost, or 1 if the grid has no traversable edge.
    pub fn min_edge_cost(&self) -> u32 {
        self.edges
            .values()
            .copied()
            .filter(|&c| c > 0)
            .min()
            .unwrap_or(1)
    }

    /// Builds the directed move graph, including tunnels, as a [petgraph] graph.
    pub fn to_graph(&self) -> GridGraph {
        let mut graph = DiGraph::with_capacity(self.width * self.height, self.edges.len());
        let mut index = FxIndexMap::default();
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let p = Point::new(x, y);
                index.insert(p, graph.add_node(p));
            }
        }
        for (p, &from) in &index {
            for (q, cost) in self.neighbours(p) {
                if let Some(&to) = index.get(&q) {
                    graph.add_edge(from, to, cost);
                }
            }
        }
        GridGraph { graph, index }
    }

    /// Checks whether `goal` can be reached from `start` by any sequence of moves.
    pub fn reachable(&self, start: &Point, goal: &Point) -> bool {
        let graph = self.to_graph();
        match (graph.node(start), graph.node(goal)) {
            (Some(s), Some(g)) => has_path_connecting(&graph.graph, s, g, None),
            _ => false,
        }
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Grid {}x{}:", self.width, self.height)?;
        for y in 0..self.height as i32 {
            let row = (0..self.width as i32)
                .map(|x| {
                    let p = Point::new(x, y);
                    if self.agents.iter().any(|a| a.position == p) {
                        'A'
                    } else if self.stores.contains(&p) {
                        'S'
                    } else if self.destinations.contains(&p) {
                        'D'
                    } else if self.tunnel_partner(&p).is_some() {
                        'T'
                    } else {
                        '.'
                    }
                })
                .collect::<String>();
            writeln!(f, "{}", row)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_grid_connects_both_directions() {
        let grid = Grid::uniform(3, 2, 1);
        // 2 horizontal pairs per row * 2 rows + 3 vertical pairs, both directions
        assert_eq!(grid.edges().count(), 2 * (2 * 2 + 3));
        assert_eq!(grid.edge_cost(&Point::new(0, 0), &Point::new(1, 0)), Some(1));
        assert_eq!(grid.edge_cost(&Point::new(1, 0), &Point::new(0, 0)), Some(1));
        assert_eq!(grid.edge_cost(&Point::new(0, 0), &Point::new(1, 1)), None);
    }

    #[test]
    fn blocked_edge_is_one_way() {
        let mut grid = Grid::uniform(2, 1, 3);
        let a = Point::new(0, 0);
        let b = Point::new(1, 0);
        grid.block_edge(a, b);
        assert_eq!(grid.move_cost(&a, &b), None);
        assert_eq!(grid.move_cost(&b, &a), Some(3));
        assert!(!grid.reachable(&a, &b));
        assert!(grid.reachable(&b, &a));
    }

    #[test]
    fn neighbours_follow_operator_order_and_include_tunnels() {
        let mut grid = Grid::uniform(3, 3, 1);
        let centre = Point::new(1, 1);
        grid.add_tunnel(Point::new(2, 2), centre);
        let n = grid.neighbours(&centre);
        let points = n.iter().map(|(p, _)| *p).collect::<Vec<_>>();
        assert_eq!(
            points,
            vec![
                Point::new(1, 0),
                Point::new(1, 2),
                Point::new(0, 1),
                Point::new(2, 1),
                Point::new(2, 2),
            ]
        );
        // Tunnel between diagonal cells has Manhattan length 2
        assert_eq!(n[4].1, 2);
    }

    #[test]
    fn first_tunnel_wins_for_shared_entrance() {
        let mut grid = Grid::new(4, 1);
        grid.add_tunnel(Point::new(0, 0), Point::new(3, 0));
        grid.add_tunnel(Point::new(2, 0), Point::new(0, 0));
        assert_eq!(grid.tunnel_partner(&Point::new(0, 0)), Some(Point::new(3, 0)));
        assert_eq!(grid.tunnel_partner(&Point::new(2, 0)), Some(Point::new(0, 0)));
        assert_eq!(grid.tunnel_partner(&Point::new(1, 0)), None);
    }

    #[test]
    fn tunnel_leading_off_grid_is_unusable() {
        let mut grid = Grid::uniform(3, 3, 1);
        let entrance = Point::new(2, 2);
        grid.add_tunnel(entrance, Point::new(7, 2));
        assert_eq!(grid.tunnel_partner(&entrance), None);
        assert_eq!(grid.move_cost(&entrance, &Point::new(7, 2)), None);
        assert!(grid.neighbours(&entrance).iter().all(|(p, _)| grid.in_bounds(p)));
        assert_eq!(grid.neighbours(&entrance).len(), 2);
    }

    #[test]
    fn tunnel_cost_is_never_zero() {
        let p = Point::new(2, 2);
        assert_eq!(tunnel_cost(&p, &p), 1);
        assert_eq!(tunnel_cost(&p, &Point::new(2, 3)), 1);
        assert_eq!(tunnel_cost(&Point::new(0, 0), &Point::new(4, 4)), 8);
    }

    #[test]
    fn min_edge_cost_ignores_blocked_edges() {
        let mut grid = Grid::uniform(2, 2, 4);
        grid.block_edge(Point::new(0, 0), Point::new(1, 0));
        grid.set_edge(Point::new(1, 1), Point::new(0, 1), 2);
        assert_eq!(grid.min_edge_cost(), 2);
        assert_eq!(Grid::new(2, 2).min_edge_cost(), 1);
    }

    #[test]
    fn out_of_bounds_is_unreachable() {
        let grid = Grid::uniform(2, 2, 1);
        assert!(!grid.in_bounds(&Point::new(-1, 0)));
        assert!(!grid.in_bounds(&Point::new(0, 2)));
        assert!(!grid.reachable(&Point::new(0, 0), &Point::new(5, 5)));
    }
}
