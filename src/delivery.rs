//! Binds a [Grid] and an origin/goal pair to the [Problem] contract and exposes the
//! single-path query.
use core::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use grid_util::Point;
use itertools::Itertools;
use log::warn;

use crate::grid::{tunnel_cost, Grid};
use crate::heuristics::{manhattan, unit_step_cost, TunnelEstimate};
use crate::search::{
    general_search, HeuristicKind, Informed, Problem, SearchError, SearchMetrics, Strategy,
};

/// Moves available to an agent, in the order successors are generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
    Tunnel,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Up,
        Action::Down,
        Action::Left,
        Action::Right,
        Action::Tunnel,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Action::Up => "up",
            Action::Down => "down",
            Action::Left => "left",
            Action::Right => "right",
            Action::Tunnel => "tunnel",
        }
    }

    /// Offset of a directional move; [None] for [Action::Tunnel].
    pub fn offset(&self) -> Option<(i32, i32)> {
        match self {
            Action::Up => Some((0, -1)),
            Action::Down => Some((0, 1)),
            Action::Left => Some((-1, 0)),
            Action::Right => Some((1, 0)),
            Action::Tunnel => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown action `{s}`"))
    }
}

/// Travel from `start` to `goal` on `grid`. The tunnel-aware estimate is precomputed for the
/// goal when the problem is built.
#[derive(Clone, Debug)]
pub struct DeliveryProblem<'a> {
    grid: &'a Grid,
    start: Point,
    goal: Point,
    unit_step: u64,
    tunnel_estimate: TunnelEstimate,
}

impl<'a> DeliveryProblem<'a> {
    pub fn new(grid: &'a Grid, start: Point, goal: Point) -> DeliveryProblem<'a> {
        DeliveryProblem {
            grid,
            start,
            goal,
            unit_step: unit_step_cost(grid),
            tunnel_estimate: TunnelEstimate::new(grid, goal),
        }
    }

    pub fn grid(&self) -> &Grid {
        self.grid
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn goal(&self) -> Point {
        self.goal
    }
}

impl Problem for DeliveryProblem<'_> {
    type State = Point;
    type Action = Action;
    type Cost = u64;

    fn initial_state(&self) -> Point {
        self.start
    }

    fn goal_test(&self, state: &Point) -> bool {
        *state == self.goal
    }

    fn operators(&self) -> &[Action] {
        &Action::ALL
    }

    fn apply(&self, state: &Point, action: Action) -> Option<Point> {
        match action.offset() {
            Some((dx, dy)) => {
                let next = Point::new(state.x + dx, state.y + dy);
                if !self.grid.in_bounds(&next) {
                    return None;
                }
                match self.grid.edge_cost(state, &next) {
                    Some(c) if c > 0 => Some(next),
                    _ => None,
                }
            }
            None => self.grid.tunnel_partner(state),
        }
    }

    fn step_cost(&self, state: &Point, action: Action) -> u64 {
        let cost = match action.offset() {
            Some((dx, dy)) => {
                let next = Point::new(state.x + dx, state.y + dy);
                self.grid.edge_cost(state, &next).unwrap_or(0)
            }
            None => self
                .grid
                .tunnel_partner(state)
                .map_or(0, |partner| tunnel_cost(state, &partner)),
        };
        u64::from(cost)
    }

    fn informed(&self) -> Option<&dyn Informed<Point, u64>> {
        Some(self)
    }
}

impl Informed<Point, u64> for DeliveryProblem<'_> {
    fn estimate(&self, state: &Point, kind: HeuristicKind) -> u64 {
        match kind {
            HeuristicKind::TunnelAware => self.tunnel_estimate.estimate(state),
            HeuristicKind::DeliveryAdmissible => {
                manhattan(state, &self.goal).saturating_mul(self.unit_step)
            }
        }
    }
}

/// Result of the single-path query. `cost` is [None] when no path was found, in which case
/// `actions` is empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathSummary {
    pub actions: Vec<Action>,
    pub cost: Option<u64>,
    pub nodes_expanded: usize,
}

impl PathSummary {
    pub fn no_solution(nodes_expanded: usize) -> PathSummary {
        PathSummary {
            actions: Vec::new(),
            cost: None,
            nodes_expanded,
        }
    }

    pub fn is_solved(&self) -> bool {
        self.cost.is_some()
    }
}

/// Renders as `plan;cost;nodesExpanded`, e.g. `up,right;2;3` or `NoSolution;-1;12`.
impl fmt::Display for PathSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.cost {
            Some(cost) => write!(
                f,
                "{};{};{}",
                self.actions.iter().join(","),
                cost,
                self.nodes_expanded
            ),
            None => write!(f, "NoSolution;-1;{}", self.nodes_expanded),
        }
    }
}

/// Finds a path from `start` to `goal` with `strategy`.
pub fn solve(grid: &Grid, start: Point, goal: Point, strategy: Strategy) -> PathSummary {
    let problem = DeliveryProblem::new(grid, start, goal);
    match general_search(&problem, strategy) {
        Ok(result) => match result.cost() {
            Some(cost) => PathSummary {
                cost: Some(cost),
                nodes_expanded: result.nodes_expanded(),
                actions: result.actions,
            },
            None => PathSummary::no_solution(result.nodes_expanded()),
        },
        Err(err) => {
            warn!("{err}");
            PathSummary::no_solution(0)
        }
    }
}

/// [solve] with the strategy given by name; an unknown name yields no solution.
pub fn solve_named(grid: &Grid, start: Point, goal: Point, strategy: &str) -> PathSummary {
    match strategy.parse::<Strategy>() {
        Ok(strategy) => solve(grid, start, goal, strategy),
        Err(err) => {
            warn!("{err}");
            PathSummary::no_solution(0)
        }
    }
}

/// Replays `actions` from `start`, returning every visited position including `start`.
/// Stops at the first action that cannot be applied.
pub fn route_from_actions(grid: &Grid, start: Point, actions: &[Action]) -> Vec<Point> {
    let problem = DeliveryProblem::new(grid, start, start);
    let mut route = vec![start];
    let mut current = start;
    for &action in actions {
        match problem.apply(&current, action) {
            Some(next) => {
                current = next;
                route.push(next);
            }
            None => break,
        }
    }
    route
}

/// One strategy's measured run on a single leg.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegTrial {
    pub strategy: Strategy,
    /// Positions from origin to goal, empty without a solution.
    pub route: Vec<Point>,
    pub actions: Vec<Action>,
    pub cost: Option<u64>,
    pub metrics: SearchMetrics,
    pub elapsed: Duration,
}

impl LegTrial {
    pub fn is_solved(&self) -> bool {
        self.cost.is_some()
    }

    /// Ranking key: expansions, generated nodes as the deterministic time measure, then memory.
    pub fn rank_key(&self) -> (usize, usize, usize) {
        (
            self.metrics.nodes_expanded,
            self.metrics.nodes_generated,
            self.metrics.peak_memory_bytes,
        )
    }
}

/// Runs `strategy` from `start` to `goal` and records its work and wall-clock time.
pub fn measure_leg(
    grid: &Grid,
    start: Point,
    goal: Point,
    strategy: Strategy,
) -> Result<LegTrial, SearchError> {
    let problem = DeliveryProblem::new(grid, start, goal);
    let timer = Instant::now();
    let result = general_search(&problem, strategy)?;
    let elapsed = timer.elapsed();
    Ok(LegTrial {
        strategy,
        cost: result.cost(),
        route: result.path,
        actions: result.actions,
        metrics: result.metrics,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_respect_blocked_edges_and_bounds() {
        let mut grid = Grid::uniform(2, 2, 1);
        grid.block_edge(Point::new(0, 0), Point::new(1, 0));
        let problem = DeliveryProblem::new(&grid, Point::new(0, 0), Point::new(1, 1));
        let origin = Point::new(0, 0);
        assert_eq!(problem.apply(&origin, Action::Up), None);
        assert_eq!(problem.apply(&origin, Action::Left), None);
        assert_eq!(problem.apply(&origin, Action::Right), None);
        assert_eq!(problem.apply(&origin, Action::Down), Some(Point::new(0, 1)));
        assert_eq!(problem.apply(&origin, Action::Tunnel), None);
    }

    #[test]
    fn tunnel_step_costs_manhattan_length() {
        let mut grid = Grid::uniform(5, 5, 2);
        grid.add_tunnel(Point::new(0, 0), Point::new(4, 4));
        let problem = DeliveryProblem::new(&grid, Point::new(0, 0), Point::new(4, 4));
        assert_eq!(
            problem.apply(&Point::new(4, 4), Action::Tunnel),
            Some(Point::new(0, 0))
        );
        assert_eq!(problem.step_cost(&Point::new(0, 0), Action::Tunnel), 8);
        assert_eq!(problem.step_cost(&Point::new(0, 0), Action::Right), 2);
    }

    #[test]
    fn tunnel_to_off_grid_cell_is_inapplicable() {
        let mut grid = Grid::uniform(3, 3, 1);
        grid.add_tunnel(Point::new(0, 0), Point::new(-4, 0));
        let problem = DeliveryProblem::new(&grid, Point::new(0, 0), Point::new(2, 2));
        assert_eq!(problem.apply(&Point::new(0, 0), Action::Tunnel), None);
        for strategy in Strategy::ALL {
            let summary = solve(&grid, Point::new(0, 0), Point::new(2, 2), strategy);
            assert!(!summary.actions.contains(&Action::Tunnel), "{strategy}");
        }
    }

    #[test]
    fn large_edge_costs_do_not_overflow() {
        let grid = Grid::uniform(5, 5, 1_000_000_000);
        let (start, goal) = (Point::new(0, 0), Point::new(4, 4));
        for strategy in [
            Strategy::Ucs,
            Strategy::AStar(HeuristicKind::TunnelAware),
            Strategy::AStar(HeuristicKind::DeliveryAdmissible),
        ] {
            let summary = solve(&grid, start, goal, strategy);
            assert_eq!(summary.cost, Some(8_000_000_000), "{strategy}");
            assert_eq!(summary.actions.len(), 8, "{strategy}");
        }
        let problem = DeliveryProblem::new(&grid, start, goal);
        assert_eq!(
            problem.estimate(&start, HeuristicKind::DeliveryAdmissible),
            8_000_000_000
        );
        assert_eq!(problem.estimate(&start, HeuristicKind::TunnelAware), 8_000_000_000);
    }

    #[test]
    fn summary_renders_plan_cost_and_expansions() {
        let summary = PathSummary {
            actions: vec![Action::Up, Action::Right],
            cost: Some(2),
            nodes_expanded: 3,
        };
        assert_eq!(summary.to_string(), "up,right;2;3");
        assert_eq!(PathSummary::no_solution(7).to_string(), "NoSolution;-1;7");
    }

    #[test]
    fn unknown_strategy_name_is_no_solution() {
        let grid = Grid::uniform(2, 2, 1);
        let summary = solve_named(&grid, Point::new(0, 0), Point::new(1, 1), "teleport");
        assert!(!summary.is_solved());
        assert!(summary.actions.is_empty());
        let summary = solve_named(&grid, Point::new(0, 0), Point::new(1, 1), "ucs");
        assert_eq!(summary.cost, Some(2));
    }

    #[test]
    fn route_replays_actions() {
        let mut grid = Grid::uniform(3, 3, 1);
        grid.add_tunnel(Point::new(1, 0), Point::new(2, 2));
        let route = route_from_actions(
            &grid,
            Point::new(0, 0),
            &[Action::Right, Action::Tunnel, Action::Left],
        );
        assert_eq!(
            route,
            vec![
                Point::new(0, 0),
                Point::new(1, 0),
                Point::new(2, 2),
                Point::new(1, 2)
            ]
        );
    }

    #[test]
    fn measured_leg_matches_search_path() {
        let grid = Grid::uniform(3, 3, 1);
        let trial = measure_leg(&grid, Point::new(0, 0), Point::new(2, 2), Strategy::Ucs).unwrap();
        assert_eq!(trial.cost, Some(4));
        assert_eq!(trial.route.len(), 5);
        assert_eq!(
            route_from_actions(&grid, Point::new(0, 0), &trial.actions),
            trial.route
        );
    }

    #[test]
    fn action_names_parse() {
        for action in Action::ALL {
            assert_eq!(action.name().parse::<Action>(), Ok(action));
        }
        assert!("wait".parse::<Action>().is_err());
    }
}
