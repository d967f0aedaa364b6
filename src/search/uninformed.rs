use std::collections::VecDeque;
use std::mem::size_of;

use fxhash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::{NodeArena, NodeId, Problem, SearchMetrics, SearchResult, N_SMALLVEC_SIZE};

type Outcome<P> =
    SearchResult<<P as Problem>::State, <P as Problem>::Action, <P as Problem>::Cost>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Discipline {
    Fifo,
    Lifo,
}

/// Applicable operators of `state` with their successors. For a LIFO frontier the operators are
/// visited in reverse so that the first declared operator ends up on top of the stack.
pub(crate) fn successors<P: Problem>(
    problem: &P,
    state: &P::State,
    reversed: bool,
) -> SmallVec<[(P::Action, P::State); N_SMALLVEC_SIZE]> {
    let mut succ: SmallVec<[(P::Action, P::State); N_SMALLVEC_SIZE]> = problem
        .operators()
        .iter()
        .filter_map(|&op| problem.apply(state, op).map(|s| (op, s)))
        .collect();
    if reversed {
        succ.reverse();
    }
    succ
}

/// Breadth-first graph search. Every state enters the frontier at most once.
pub fn breadth_first<P: Problem>(problem: &P) -> Outcome<P> {
    graph_search(problem, Discipline::Fifo)
}

/// Depth-first graph search with the same duplicate elimination as [breadth_first].
pub fn depth_first<P: Problem>(problem: &P) -> Outcome<P> {
    graph_search(problem, Discipline::Lifo)
}

fn graph_search<P: Problem>(problem: &P, discipline: Discipline) -> Outcome<P> {
    let mut arena = NodeArena::new();
    let mut metrics = SearchMetrics::default();
    let mut frontier: VecDeque<NodeId> = VecDeque::new();
    let mut explored: FxHashSet<P::State> = FxHashSet::default();
    let mut in_frontier: FxHashSet<P::State> = FxHashSet::default();

    let initial = problem.initial_state();
    in_frontier.insert(initial.clone());
    frontier.push_back(arena.push_root(initial));
    metrics.nodes_generated += 1;

    loop {
        let next = match discipline {
            Discipline::Fifo => frontier.pop_front(),
            Discipline::Lifo => frontier.pop_back(),
        };
        let Some(id) = next else {
            break;
        };
        let state = arena.get(id).state.clone();
        in_frontier.remove(&state);
        if problem.goal_test(&state) {
            return SearchResult::solved(&arena, id, metrics);
        }
        if !explored.insert(state.clone()) {
            continue;
        }
        metrics.nodes_expanded += 1;

        for (action, child) in successors(problem, &state, discipline == Discipline::Lifo) {
            if explored.contains(&child) || in_frontier.contains(&child) {
                continue;
            }
            let step = problem.step_cost(&state, action);
            in_frontier.insert(child.clone());
            frontier.push_back(arena.push_child(id, child, action, step));
            metrics.nodes_generated += 1;
        }
        metrics.observe(
            &arena,
            frontier.len(),
            size_of::<NodeId>(),
            explored.len() + in_frontier.len(),
            size_of::<P::State>(),
        );
    }
    SearchResult::failed(metrics)
}

enum Limited<S, A, C> {
    Found(NodeArena<S, A, C>, NodeId),
    /// Some node was left unexpanded because of the depth bound.
    Cutoff,
    /// The whole reachable space was searched within the bound.
    Exhausted,
}

/// Repeats [depth-limited search](depth_limited) with bounds `0..=max_depth`, summing the work
/// of all iterations. Stops early once an iteration exhausts the reachable space without
/// hitting its bound, since deeper bounds cannot find anything new.
pub fn iterative_deepening<P: Problem>(problem: &P, max_depth: usize) -> Outcome<P> {
    let mut total = SearchMetrics::default();
    for limit in 0..=max_depth {
        let mut metrics = SearchMetrics::default();
        let outcome = depth_limited(problem, limit, &mut metrics);
        total.accumulate(&metrics);
        match outcome {
            Limited::Found(arena, goal) => return SearchResult::solved(&arena, goal, total),
            Limited::Cutoff => {}
            Limited::Exhausted => break,
        }
    }
    SearchResult::failed(total)
}

/// Depth-first search that does not expand nodes at depth `limit`. A state is re-opened only
/// when reached at a strictly smaller depth than before, so a goal at depth `d <= limit` is
/// always found.
fn depth_limited<P: Problem>(
    problem: &P,
    limit: usize,
    metrics: &mut SearchMetrics,
) -> Limited<P::State, P::Action, P::Cost> {
    let mut arena = NodeArena::new();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut shallowest: FxHashMap<P::State, usize> = FxHashMap::default();
    let mut cutoff = false;

    let initial = problem.initial_state();
    shallowest.insert(initial.clone(), 0);
    stack.push(arena.push_root(initial));
    metrics.nodes_generated += 1;

    while let Some(id) = stack.pop() {
        let (state, depth) = {
            let node = arena.get(id);
            (node.state.clone(), node.depth)
        };
        // A shallower path to this state was found after this node was pushed
        if shallowest.get(&state).is_some_and(|&d| d < depth) {
            continue;
        }
        if problem.goal_test(&state) {
            return Limited::Found(arena, id);
        }
        if depth >= limit {
            cutoff = true;
            continue;
        }
        metrics.nodes_expanded += 1;

        for (action, child) in successors(problem, &state, true) {
            if shallowest.get(&child).is_some_and(|&d| d <= depth + 1) {
                continue;
            }
            let step = problem.step_cost(&state, action);
            shallowest.insert(child.clone(), depth + 1);
            stack.push(arena.push_child(id, child, action, step));
            metrics.nodes_generated += 1;
        }
        metrics.observe(
            &arena,
            stack.len(),
            size_of::<NodeId>(),
            shallowest.len(),
            size_of::<(P::State, usize)>(),
        );
    }
    if cutoff {
        Limited::Cutoff
    } else {
        Limited::Exhausted
    }
}
