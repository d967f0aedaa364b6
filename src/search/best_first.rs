//! Priority-queue strategies: uniform-cost, greedy best-first and A*.
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::mem::size_of;

use fxhash::{FxHashMap, FxHashSet};
use num_traits::Zero;

use super::uninformed::successors;
use super::{NodeArena, NodeId, Problem, SearchMetrics, SearchResult};

type Outcome<P> =
    SearchResult<<P as Problem>::State, <P as Problem>::Action, <P as Problem>::Cost>;

struct SmallestCostHolder<K> {
    estimated_cost: K,
    cost: K,
    seq: usize,
    index: NodeId,
}

impl<K: Ord> Eq for SmallestCostHolder<K> {}

impl<K: Ord> PartialEq for SmallestCostHolder<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> PartialOrd for SmallestCostHolder<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> Ord for SmallestCostHolder<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // First orders per estimated cost, then favours the node with the largest cost so far,
        // then the node that entered the queue first
        match other.estimated_cost.cmp(&self.estimated_cost) {
            Ordering::Equal => match self.cost.cmp(&other.cost) {
                Ordering::Equal => other.seq.cmp(&self.seq),
                s => s,
            },
            s => s,
        }
    }
}

/// Uniform-cost search: A* with a zero heuristic.
pub fn uniform_cost<P: Problem>(problem: &P) -> Outcome<P> {
    astar(problem, |_| P::Cost::zero())
}

/// A* search ordered by `g + h`. Keeps the best known cost per expanded state; a state is
/// expanded again only if it is reached through a strictly cheaper path, and children that are
/// not cheaper than the best known cost are never queued.
pub fn astar<P, FH>(problem: &P, mut heuristic: FH) -> Outcome<P>
where
    P: Problem,
    FH: FnMut(&P::State) -> P::Cost,
{
    let mut arena = NodeArena::new();
    let mut metrics = SearchMetrics::default();
    let mut to_see = BinaryHeap::new();
    let mut best: FxHashMap<P::State, P::Cost> = FxHashMap::default();
    let mut seq = 0;

    let initial = problem.initial_state();
    let h = heuristic(&initial);
    to_see.push(SmallestCostHolder {
        estimated_cost: h,
        cost: Zero::zero(),
        seq,
        index: arena.push_root(initial),
    });
    metrics.nodes_generated += 1;

    while let Some(SmallestCostHolder { cost, index, .. }) = to_see.pop() {
        let state = arena.get(index).state.clone();
        if problem.goal_test(&state) {
            return SearchResult::solved(&arena, index, metrics);
        }
        // We may have queued a state several times if we found a better way to reach it.
        // Only expand it when this entry improves on the best expansion so far.
        if best.get(&state).is_some_and(|&b| b <= cost) {
            continue;
        }
        best.insert(state.clone(), cost);
        metrics.nodes_expanded += 1;

        for (action, child) in successors(problem, &state, false) {
            let step = problem.step_cost(&state, action);
            let new_cost = cost + step;
            if best.get(&child).is_some_and(|&b| b <= new_cost) {
                continue;
            }
            let h = heuristic(&child);
            seq += 1;
            to_see.push(SmallestCostHolder {
                estimated_cost: new_cost + h,
                cost: new_cost,
                seq,
                index: arena.push_child(index, child, action, step),
            });
            metrics.nodes_generated += 1;
        }
        metrics.observe(
            &arena,
            to_see.len(),
            size_of::<SmallestCostHolder<P::Cost>>(),
            best.len(),
            size_of::<(P::State, P::Cost)>(),
        );
    }
    SearchResult::failed(metrics)
}

/// Greedy best-first search ordered purely by the heuristic, with the duplicate elimination of
/// breadth-first search.
pub fn greedy<P, FH>(problem: &P, mut heuristic: FH) -> Outcome<P>
where
    P: Problem,
    FH: FnMut(&P::State) -> P::Cost,
{
    let mut arena = NodeArena::new();
    let mut metrics = SearchMetrics::default();
    let mut to_see = BinaryHeap::new();
    let mut explored: FxHashSet<P::State> = FxHashSet::default();
    let mut in_frontier: FxHashSet<P::State> = FxHashSet::default();
    let mut seq = 0;

    let initial = problem.initial_state();
    let h = heuristic(&initial);
    in_frontier.insert(initial.clone());
    to_see.push(SmallestCostHolder {
        estimated_cost: h,
        cost: Zero::zero(),
        seq,
        index: arena.push_root(initial),
    });
    metrics.nodes_generated += 1;

    while let Some(SmallestCostHolder { index, .. }) = to_see.pop() {
        let state = arena.get(index).state.clone();
        in_frontier.remove(&state);
        if problem.goal_test(&state) {
            return SearchResult::solved(&arena, index, metrics);
        }
        if !explored.insert(state.clone()) {
            continue;
        }
        metrics.nodes_expanded += 1;

        for (action, child) in successors(problem, &state, false) {
            if explored.contains(&child) || in_frontier.contains(&child) {
                continue;
            }
            let h = heuristic(&child);
            let step = problem.step_cost(&state, action);
            seq += 1;
            in_frontier.insert(child.clone());
            to_see.push(SmallestCostHolder {
                estimated_cost: h,
                // Equal estimates are served in insertion order
                cost: Zero::zero(),
                seq,
                index: arena.push_child(index, child, action, step),
            });
            metrics.nodes_generated += 1;
        }
        metrics.observe(
            &arena,
            to_see.len(),
            size_of::<SmallestCostHolder<P::Cost>>(),
            explored.len() + in_frontier.len(),
            size_of::<P::State>(),
        );
    }
    SearchResult::failed(metrics)
}
