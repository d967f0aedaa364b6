//! Strategy-parameterised graph search over an abstract [Problem].
//!
//! Nodes live in a per-search [NodeArena] and refer to their parent by index, so a search
//! never holds references into its own node graph and the arena is dropped as a whole once
//! the path has been reconstructed.
use core::fmt;
use std::hash::Hash;
use std::mem::size_of;
use std::str::FromStr;

use num_traits::Zero;
use thiserror::Error;

pub mod best_first;
pub mod uninformed;

/// Inline capacity for successor lists; grid problems have at most five operators.
pub(crate) const N_SMALLVEC_SIZE: usize = 8;

/// Selects which estimator an informed strategy asks the problem for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeuristicKind {
    /// Manhattan distance with tunnel shortcuts taken into account.
    TunnelAware,
    /// Manhattan distance scaled by the cheapest possible unit step.
    DeliveryAdmissible,
}

/// Frontier ordering policy. Greedy and A* carry the heuristic they order by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strategy {
    Bfs,
    Dfs,
    Ucs,
    Ids,
    Greedy(HeuristicKind),
    AStar(HeuristicKind),
}

impl Strategy {
    /// The six base strategies, informed ones using the tunnel-aware heuristic.
    pub const ALL: [Strategy; 6] = [
        Strategy::Bfs,
        Strategy::Dfs,
        Strategy::Ucs,
        Strategy::Ids,
        Strategy::Greedy(HeuristicKind::TunnelAware),
        Strategy::AStar(HeuristicKind::TunnelAware),
    ];

    /// The base strategies plus the second heuristic variant of greedy and A*.
    pub const WITH_VARIANTS: [Strategy; 8] = [
        Strategy::Bfs,
        Strategy::Dfs,
        Strategy::Ucs,
        Strategy::Ids,
        Strategy::Greedy(HeuristicKind::TunnelAware),
        Strategy::Greedy(HeuristicKind::DeliveryAdmissible),
        Strategy::AStar(HeuristicKind::TunnelAware),
        Strategy::AStar(HeuristicKind::DeliveryAdmissible),
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Bfs => "BFS",
            Strategy::Dfs => "DFS",
            Strategy::Ucs => "UCS",
            Strategy::Ids => "IDS",
            Strategy::Greedy(HeuristicKind::TunnelAware) => "GREEDY",
            Strategy::Greedy(HeuristicKind::DeliveryAdmissible) => "GREEDY2",
            Strategy::AStar(HeuristicKind::TunnelAware) => "ASTAR",
            Strategy::AStar(HeuristicKind::DeliveryAdmissible) => "ASTAR2",
        }
    }

    pub fn heuristic(&self) -> Option<HeuristicKind> {
        match self {
            Strategy::Greedy(kind) | Strategy::AStar(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let strategy = match s.trim().to_ascii_uppercase().as_str() {
            "BFS" | "BF" => Strategy::Bfs,
            "DFS" | "DF" => Strategy::Dfs,
            "UCS" | "UC" => Strategy::Ucs,
            "IDS" | "ID" => Strategy::Ids,
            "GREEDY" | "GREEDY1" | "GR1" => Strategy::Greedy(HeuristicKind::TunnelAware),
            "GREEDY2" | "GR2" => Strategy::Greedy(HeuristicKind::DeliveryAdmissible),
            "ASTAR" | "ASTAR1" | "AS1" | "A*" => Strategy::AStar(HeuristicKind::TunnelAware),
            "ASTAR2" | "AS2" => Strategy::AStar(HeuristicKind::DeliveryAdmissible),
            _ => return Err(SearchError::UnknownStrategy(s.to_owned())),
        };
        Ok(strategy)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("strategy {strategy} needs a heuristic but the problem does not provide one")]
    MissingHeuristic { strategy: Strategy },
    #[error("unknown search strategy `{0}`")]
    UnknownStrategy(String),
}

/// Optional capability of a [Problem]: admissible estimates of the remaining cost.
pub trait Informed<S, C> {
    fn estimate(&self, state: &S, kind: HeuristicKind) -> C;
}

/// A search problem: an initial state, a goal test and an ordered set of operators whose
/// application may fail.
pub trait Problem {
    type State: Clone + Eq + Hash;
    type Action: Copy;
    type Cost: Zero + Ord + Copy;

    fn initial_state(&self) -> Self::State;
    fn goal_test(&self, state: &Self::State) -> bool;
    /// Operators in the order successors are generated.
    fn operators(&self) -> &[Self::Action];
    /// The successor state, or [None] if the operator is inapplicable in `state`.
    fn apply(&self, state: &Self::State, action: Self::Action) -> Option<Self::State>;
    fn step_cost(&self, state: &Self::State, action: Self::Action) -> Self::Cost;

    /// Heuristic support. Greedy and A* refuse to run without it.
    fn informed(&self) -> Option<&dyn Informed<Self::State, Self::Cost>> {
        None
    }
}

pub type NodeId = usize;

/// A search node. The parent is an index into the [NodeArena] that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node<S, A, C> {
    pub state: S,
    pub parent: Option<NodeId>,
    pub action: Option<A>,
    pub path_cost: C,
    pub depth: usize,
}

/// Append-only node storage for one search call.
#[derive(Clone, Debug)]
pub struct NodeArena<S, A, C> {
    nodes: Vec<Node<S, A, C>>,
}

impl<S: Clone, A: Copy, C: Zero + Copy> NodeArena<S, A, C> {
    pub fn new() -> Self {
        NodeArena { nodes: Vec::new() }
    }

    pub fn push_root(&mut self, state: S) -> NodeId {
        self.nodes.push(Node {
            state,
            parent: None,
            action: None,
            path_cost: C::zero(),
            depth: 0,
        });
        self.nodes.len() - 1
    }

    pub fn push_child(&mut self, parent: NodeId, state: S, action: A, step_cost: C) -> NodeId {
        let (path_cost, depth) = {
            let p = &self.nodes[parent];
            (p.path_cost + step_cost, p.depth + 1)
        };
        self.nodes.push(Node {
            state,
            parent: Some(parent),
            action: Some(action),
            path_cost,
            depth,
        });
        self.nodes.len() - 1
    }

    pub fn get(&self, id: NodeId) -> &Node<S, A, C> {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Walks parent indices from `goal` back to the root and returns the visited states and
    /// the actions between them, both in start-to-goal order.
    pub fn reconstruct(&self, goal: NodeId) -> (Vec<S>, Vec<A>) {
        let nodes = &self.nodes;
        let chain = std::iter::successors(Some(&nodes[goal]), |n| n.parent.map(|p| &nodes[p]))
            .collect::<Vec<&Node<S, A, C>>>();
        let path = chain.iter().rev().map(|n| n.state.clone()).collect();
        let actions = chain.iter().rev().filter_map(|n| n.action).collect();
        (path, actions)
    }
}

impl<S: Clone, A: Copy, C: Zero + Copy> Default for NodeArena<S, A, C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Work and memory counters of a search. All values are deterministic for a given input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SearchMetrics {
    pub nodes_expanded: usize,
    pub nodes_generated: usize,
    pub peak_frontier: usize,
    /// Peak bytes held by the node arena, the frontier and the duplicate-detection tables.
    pub peak_memory_bytes: usize,
}

impl SearchMetrics {
    /// Records the current container sizes of a running search.
    pub(crate) fn observe<S, A, C>(
        &mut self,
        arena: &NodeArena<S, A, C>,
        frontier_len: usize,
        frontier_entry_bytes: usize,
        table_len: usize,
        table_entry_bytes: usize,
    ) {
        self.peak_frontier = self.peak_frontier.max(frontier_len);
        let bytes = arena.nodes.len() * size_of::<Node<S, A, C>>()
            + frontier_len * frontier_entry_bytes
            + table_len * table_entry_bytes;
        self.peak_memory_bytes = self.peak_memory_bytes.max(bytes);
    }

    /// Sums work across iterations and keeps the largest peaks.
    pub(crate) fn accumulate(&mut self, other: &SearchMetrics) {
        self.nodes_expanded += other.nodes_expanded;
        self.nodes_generated += other.nodes_generated;
        self.peak_frontier = self.peak_frontier.max(other.peak_frontier);
        self.peak_memory_bytes = self.peak_memory_bytes.max(other.peak_memory_bytes);
    }
}

/// Outcome of [general_search]. A missing goal means no solution was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchResult<S, A, C> {
    pub goal: Option<Node<S, A, C>>,
    /// States from the initial state to the goal, empty without a solution.
    pub path: Vec<S>,
    pub actions: Vec<A>,
    pub metrics: SearchMetrics,
}

impl<S: Clone, A: Copy, C: Zero + Copy> SearchResult<S, A, C> {
    pub(crate) fn solved(arena: &NodeArena<S, A, C>, goal: NodeId, metrics: SearchMetrics) -> Self {
        let (path, actions) = arena.reconstruct(goal);
        SearchResult {
            goal: Some(arena.get(goal).clone()),
            path,
            actions,
            metrics,
        }
    }

    pub(crate) fn failed(metrics: SearchMetrics) -> Self {
        SearchResult {
            goal: None,
            path: Vec::new(),
            actions: Vec::new(),
            metrics,
        }
    }

    pub fn is_solved(&self) -> bool {
        self.goal.is_some()
    }

    pub fn cost(&self) -> Option<C> {
        self.goal.as_ref().map(|n| n.path_cost)
    }

    pub fn nodes_expanded(&self) -> usize {
        self.metrics.nodes_expanded
    }
}

/// Runs `strategy` on `problem`.
///
/// Failing to find a goal is not an error; it yields a [SearchResult] without a goal that
/// still reports the work done. The only error is asking for greedy or A* search on a
/// problem that offers no [Informed] capability.
pub fn general_search<P: Problem>(
    problem: &P,
    strategy: Strategy,
) -> Result<SearchResult<P::State, P::Action, P::Cost>, SearchError> {
    let result = match strategy {
        Strategy::Bfs => uninformed::breadth_first(problem),
        Strategy::Dfs => uninformed::depth_first(problem),
        Strategy::Ucs => best_first::uniform_cost(problem),
        Strategy::Ids => uninformed::iterative_deepening(problem, crate::IDS_DEPTH_LIMIT),
        Strategy::Greedy(kind) => {
            let informed = problem
                .informed()
                .ok_or(SearchError::MissingHeuristic { strategy })?;
            best_first::greedy(problem, |s: &P::State| informed.estimate(s, kind))
        }
        Strategy::AStar(kind) => {
            let informed = problem
                .informed()
                .ok_or(SearchError::MissingHeuristic { strategy })?;
            best_first::astar(problem, |s: &P::State| informed.estimate(s, kind))
        }
    };
    Ok(result)
}
