//! # grid_delivery
//!
//! Search and fleet planning on a weighted 4-connected grid with one-way blocked edges and
//! bidirectional tunnels. A single origin/goal query runs one of six
//! [strategies](search::Strategy) (BFS, DFS, UCS, IDS, greedy best-first and A*) through a
//! generic [state-space search engine](search::general_search). Fleet planning
//! ([plan_fleet]) greedily pairs stores with their nearest free destination, compares every
//! strategy per leg, balances work across agents and finally makes the routes
//! collision-free by inserting waits ([schedule::CollisionScheduler]).
//!
//! Heuristics are admissible and consistent: [heuristics::delivery_admissible] scales the
//! [Manhattan distance](https://en.wikipedia.org/wiki/Taxicab_geometry) by the cheapest move,
//! [heuristics::tunnel_aware] additionally accounts for tunnel shortcuts.
pub mod delivery;
pub mod grid;
pub mod heuristics;
pub mod planner;
pub mod schedule;
pub mod search;

use fxhash::FxBuildHasher;
use indexmap::{IndexMap, IndexSet};

pub use delivery::{solve, solve_named, Action, DeliveryProblem, PathSummary};
pub use grid::{Agent, Grid};
pub use grid_util::Point;
pub use planner::{plan_fleet, plan_named, plan_with_strategy, Assignment, FleetPlan, PlannerConfig};
pub use schedule::{CollisionScheduler, Schedule};
pub use search::{general_search, HeuristicKind, SearchError, SearchResult, Strategy};

/// Deepest bound tried by iterative deepening before reporting no solution.
pub const IDS_DEPTH_LIMIT: usize = 60;
/// Passes the collision scheduler may spend before returning a best-effort schedule.
pub const MAX_SCHEDULE_PASSES: usize = 2000;
/// Two candidates whose combined expansions differ by at most this percentage are
/// considered equal for workload balancing.
pub const BALANCE_TOLERANCE_PERCENT: u32 = 20;

pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;
pub type FxIndexSet<K> = IndexSet<K, FxBuildHasher>;
