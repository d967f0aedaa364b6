//! Greedy multi-round assignment of deliveries to agents.
//!
//! Every round pairs each store with its nearest unreserved destination, measures every
//! configured strategy on the pickup leg (agent to store) and the delivery leg (store to
//! destination), and commits the single best (store, agent) candidate. The committed round is
//! recorded as a [RoundDelta] and folded into the chosen agent's ledger; nothing else changes
//! between rounds, so candidate evaluation can run on a thread pool.
use std::time::Duration;

use grid_util::Point;
use itertools::Itertools;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::delivery::{measure_leg, LegTrial};
use crate::grid::{Agent, Grid};
use crate::heuristics::manhattan;
use crate::schedule::CollisionScheduler;
use crate::search::{SearchError, SearchMetrics, Strategy};
use crate::{FxIndexSet, BALANCE_TOLERANCE_PERCENT, MAX_SCHEDULE_PASSES};

/// Run-time knobs of [plan_fleet].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Strategies compared on every leg, in tie-breaking order.
    pub strategies: Vec<Strategy>,
    pub balance_tolerance_percent: u32,
    /// Evaluate the candidates of a round on the rayon thread pool.
    pub parallel: bool,
    pub max_schedule_passes: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            strategies: Strategy::WITH_VARIANTS.to_vec(),
            balance_tolerance_percent: BALANCE_TOLERANCE_PERCENT,
            parallel: true,
            max_schedule_passes: MAX_SCHEDULE_PASSES,
        }
    }
}

impl PlannerConfig {
    pub fn with_strategies(mut self, strategies: impl IntoIterator<Item = Strategy>) -> Self {
        self.strategies = strategies.into_iter().collect();
        self
    }

    pub fn with_balance_tolerance(mut self, percent: u32) -> Self {
        self.balance_tolerance_percent = percent;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_schedule_passes(mut self, passes: usize) -> Self {
        self.max_schedule_passes = passes;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LegKind {
    /// From the agent's logical position to a store.
    Pickup,
    /// From a store to a destination.
    Delivery,
    /// From a destination back to the store it was served from.
    Return,
}

/// Measured performance of one strategy on one leg.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyTrial {
    pub strategy: Strategy,
    pub cost: Option<u64>,
    pub metrics: SearchMetrics,
    pub elapsed: Duration,
}

impl From<&LegTrial> for StrategyTrial {
    fn from(trial: &LegTrial) -> Self {
        StrategyTrial {
            strategy: trial.strategy,
            cost: trial.cost,
            metrics: trial.metrics,
            elapsed: trial.elapsed,
        }
    }
}

/// Every strategy's trial on a committed leg and the one that was used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegReport {
    pub kind: LegKind,
    pub from: Point,
    pub to: Point,
    pub trials: Vec<StrategyTrial>,
    pub chosen: Option<Strategy>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Delivery {
    pub store: Point,
    pub destination: Point,
}

/// Everything planned for one agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub agent_id: String,
    /// Position per time step, including waits inserted by the scheduler.
    pub route: Vec<Point>,
    pub cost: u64,
    pub nodes_expanded: usize,
    pub elapsed: Duration,
    /// Sum of the peak bookkeeping memory of every committed leg.
    pub memory_bytes: usize,
    pub deliveries: Vec<Delivery>,
    /// (pickup, delivery) strategy per completed delivery.
    pub strategies: Vec<(Strategy, Strategy)>,
    pub legs: Vec<LegReport>,
}

impl Assignment {
    pub fn delivery_count(&self) -> usize {
        self.deliveries.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FleetPlan {
    /// One entry per agent, in input order.
    pub assignments: Vec<Assignment>,
    /// Destinations no agent could be assigned to.
    pub unassigned: Vec<Point>,
    pub rounds: usize,
    pub schedule_passes: usize,
    pub waits_inserted: usize,
    pub unresolved_conflicts: usize,
    pub schedule_converged: bool,
}

impl FleetPlan {
    pub fn deliveries(&self) -> impl Iterator<Item = &Delivery> + '_ {
        self.assignments.iter().flat_map(|a| a.deliveries.iter())
    }

    pub fn assignment(&self, agent_id: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.agent_id == agent_id)
    }
}

/// The best strategy's trial on a leg together with the report of all trials.
#[derive(Clone, Debug)]
struct Leg {
    trial: LegTrial,
    report: LegReport,
}

impl Leg {
    fn strategy(&self) -> Strategy {
        self.trial.strategy
    }
}

/// Measures every strategy from `from` to `to` and keeps the best solved one. Ranking is by
/// [LegTrial::rank_key], ties going to the strategy listed first.
fn evaluate_leg(
    grid: &Grid,
    from: Point,
    to: Point,
    kind: LegKind,
    strategies: &[Strategy],
) -> Option<Leg> {
    let mut trials = Vec::with_capacity(strategies.len());
    for &strategy in strategies {
        match measure_leg(grid, from, to, strategy) {
            Ok(trial) => {
                debug!(
                    "{kind:?} leg {from} -> {to} with {strategy}: cost {:?}, {} expanded, {} generated",
                    trial.cost, trial.metrics.nodes_expanded, trial.metrics.nodes_generated
                );
                trials.push(trial);
            }
            Err(err) => warn!("Skipping {strategy} on {kind:?} leg {from} -> {to}: {err}"),
        }
    }
    let best = trials
        .iter()
        .filter(|t| t.is_solved())
        .min_by_key(|t| t.rank_key())
        .cloned()?;
    let report = LegReport {
        kind,
        from,
        to,
        trials: trials.iter().map(StrategyTrial::from).collect(),
        chosen: Some(best.strategy),
    };
    Some(Leg {
        trial: best,
        report,
    })
}

#[derive(Clone, Debug)]
struct Candidate {
    agent: usize,
    delivery: Delivery,
    pickup: Leg,
    drop_off: Leg,
}

impl Candidate {
    /// Combined (expansions, generated, memory) of both legs.
    fn score(&self) -> (usize, usize, usize) {
        let (e1, g1, m1) = self.pickup.trial.rank_key();
        let (e2, g2, m2) = self.drop_off.trial.rank_key();
        (e1 + e2, g1 + g2, m1 + m2)
    }
}

/// State change of a committed round.
#[derive(Clone, Debug)]
struct RoundDelta {
    agent: usize,
    delivery: Delivery,
    pickup: Leg,
    drop_off: Leg,
    /// [None] if the store cannot be reached again from the destination.
    return_leg: Option<Leg>,
}

#[derive(Clone, Debug)]
struct Ledger {
    agent_id: String,
    /// Where the next pickup leg starts: the last store visited, or the start position.
    position: Point,
    route: Vec<Point>,
    cost: u64,
    nodes_expanded: usize,
    elapsed: Duration,
    memory_bytes: usize,
    deliveries: Vec<Delivery>,
    strategies: Vec<(Strategy, Strategy)>,
    legs: Vec<LegReport>,
    /// Brings the agent back to its logical position before its next pickup.
    pending_return: Option<Leg>,
    /// Set once the agent cannot get back to the store it last served.
    stranded: bool,
}

impl Ledger {
    fn new(agent: &Agent) -> Ledger {
        Ledger {
            agent_id: agent.id.clone(),
            position: agent.position,
            route: vec![agent.position],
            cost: 0,
            nodes_expanded: 0,
            elapsed: Duration::ZERO,
            memory_bytes: 0,
            deliveries: Vec::new(),
            strategies: Vec::new(),
            legs: Vec::new(),
            pending_return: None,
            stranded: false,
        }
    }

    /// Appends the leg's positions without repeating the junction cell.
    fn append(&mut self, leg: Leg) {
        self.route.extend(leg.trial.route.iter().skip(1).copied());
        self.cost = self.cost.saturating_add(leg.trial.cost.unwrap_or(0));
        self.nodes_expanded += leg.trial.metrics.nodes_expanded;
        self.elapsed += leg.trial.elapsed;
        self.memory_bytes += leg.trial.metrics.peak_memory_bytes;
        self.legs.push(leg.report);
    }

    fn apply(&mut self, delta: RoundDelta) {
        if let Some(back) = self.pending_return.take() {
            self.append(back);
        }
        self.strategies
            .push((delta.pickup.strategy(), delta.drop_off.strategy()));
        self.append(delta.pickup);
        self.append(delta.drop_off);
        self.deliveries.push(delta.delivery);
        self.position = delta.delivery.store;
        match delta.return_leg {
            Some(back) => self.pending_return = Some(back),
            None => self.stranded = true,
        }
    }

    fn into_assignment(self, route: Vec<Point>) -> Assignment {
        Assignment {
            agent_id: self.agent_id,
            route,
            cost: self.cost,
            nodes_expanded: self.nodes_expanded,
            elapsed: self.elapsed,
            memory_bytes: self.memory_bytes,
            deliveries: self.deliveries,
            strategies: self.strategies,
            legs: self.legs,
        }
    }
}

fn map_jobs<J, T, F>(parallel: bool, jobs: &[J], f: F) -> Vec<T>
where
    J: Sync,
    T: Send,
    F: Fn(&J) -> T + Sync + Send,
{
    if parallel {
        jobs.par_iter().map(f).collect()
    } else {
        jobs.iter().map(f).collect()
    }
}

/// Closest unreserved destination by Manhattan distance, ties going to the one listed first.
fn nearest_destination(grid: &Grid, store: Point, reserved: &FxIndexSet<Point>) -> Option<Point> {
    grid.destinations
        .iter()
        .filter(|d| !reserved.contains(*d))
        .min_by_key(|d| manhattan(&store, d))
        .copied()
}

/// Picks the best-scoring candidate unless the runner-up is within the balance tolerance and
/// belongs to an agent with fewer deliveries.
fn select(mut candidates: Vec<Candidate>, ledgers: &[Ledger], tolerance: u32) -> Option<Candidate> {
    candidates.sort_by_key(Candidate::score);
    let mut ranked = candidates.into_iter();
    let leader = ranked.next()?;
    let Some(runner_up) = ranked.next() else {
        return Some(leader);
    };
    let (lead, runner) = (leader.score().0 as u64, runner_up.score().0 as u64);
    let within = runner * 100 <= lead * (100 + tolerance as u64);
    let fewer = ledgers[runner_up.agent].deliveries.len() < ledgers[leader.agent].deliveries.len();
    if within && fewer {
        debug!(
            "Balancing workload: {} ({runner} expanded) instead of {} ({lead} expanded)",
            ledgers[runner_up.agent].agent_id, ledgers[leader.agent].agent_id
        );
        Some(runner_up)
    } else {
        Some(leader)
    }
}

fn plan_round(
    grid: &Grid,
    config: &PlannerConfig,
    ledgers: &[Ledger],
    reserved: &FxIndexSet<Point>,
) -> Option<RoundDelta> {
    let targets = grid
        .stores
        .iter()
        .filter_map(|&store| {
            nearest_destination(grid, store, reserved).map(|destination| Delivery {
                store,
                destination,
            })
        })
        .collect::<Vec<_>>();
    let drop_offs = map_jobs(config.parallel, &targets, |d| {
        evaluate_leg(
            grid,
            d.store,
            d.destination,
            LegKind::Delivery,
            &config.strategies,
        )
    });
    let pairs = targets
        .iter()
        .enumerate()
        .filter(|(t, _)| drop_offs[*t].is_some())
        .cartesian_product(ledgers.iter().enumerate().filter(|(_, l)| !l.stranded))
        .map(|((t, _), (a, _))| (t, a))
        .collect::<Vec<_>>();
    let pickups = map_jobs(config.parallel, &pairs, |&(t, a)| {
        evaluate_leg(
            grid,
            ledgers[a].position,
            targets[t].store,
            LegKind::Pickup,
            &config.strategies,
        )
    });
    let candidates = pairs
        .iter()
        .zip(pickups)
        .filter_map(|(&(t, agent), pickup)| {
            Some(Candidate {
                agent,
                delivery: targets[t],
                pickup: pickup?,
                drop_off: drop_offs[t].clone()?,
            })
        })
        .collect::<Vec<_>>();

    let chosen = select(candidates, ledgers, config.balance_tolerance_percent)?;
    let Delivery { store, destination } = chosen.delivery;
    let return_leg = evaluate_leg(
        grid,
        destination,
        store,
        LegKind::Return,
        &config.strategies,
    );
    if return_leg.is_none() {
        info!(
            "Agent {} cannot return from {destination} to {store} and takes no further deliveries",
            ledgers[chosen.agent].agent_id
        );
    }
    Some(RoundDelta {
        agent: chosen.agent,
        delivery: chosen.delivery,
        pickup: chosen.pickup,
        drop_off: chosen.drop_off,
        return_leg,
    })
}

/// Assigns every (store, nearest free destination) pair to an agent and schedules the
/// resulting routes. The grid is not modified.
pub fn plan_fleet(grid: &Grid, config: &PlannerConfig) -> FleetPlan {
    let mut ledgers = grid.agents.iter().map(Ledger::new).collect::<Vec<_>>();
    let mut reserved: FxIndexSet<Point> = FxIndexSet::default();
    let mut rounds = 0;

    while grid.destinations.iter().any(|d| !reserved.contains(d)) {
        let Some(delta) = plan_round(grid, config, &ledgers, &reserved) else {
            break;
        };
        rounds += 1;
        info!(
            "Round {rounds}: agent {} delivers {} -> {} using {} + {}",
            ledgers[delta.agent].agent_id,
            delta.delivery.store,
            delta.delivery.destination,
            delta.pickup.strategy(),
            delta.drop_off.strategy()
        );
        reserved.insert(delta.delivery.destination);
        ledgers[delta.agent].apply(delta);
    }

    let unassigned = grid
        .destinations
        .iter()
        .filter(|d| !reserved.contains(*d))
        .copied()
        .collect::<Vec<_>>();
    if !unassigned.is_empty() {
        info!(
            "Destinations {} could not be assigned",
            unassigned.iter().join(", ")
        );
    }

    let schedule = CollisionScheduler::new(config.max_schedule_passes)
        .schedule(ledgers.iter().map(|l| l.route.clone()).enumerate());
    let assignments = ledgers
        .into_iter()
        .zip(schedule.routes.into_values())
        .map(|(ledger, route)| ledger.into_assignment(route))
        .collect();
    FleetPlan {
        assignments,
        unassigned,
        rounds,
        schedule_passes: schedule.passes,
        waits_inserted: schedule.waits_inserted,
        unresolved_conflicts: schedule.unresolved,
        schedule_converged: schedule.converged,
    }
}

/// [plan_fleet] with every leg searched by `strategy` alone.
pub fn plan_with_strategy(grid: &Grid, strategy: Strategy) -> FleetPlan {
    plan_fleet(grid, &PlannerConfig::default().with_strategies([strategy]))
}

/// [plan_fleet] with a strategy token, or `AUTO` to compare all strategies per leg.
pub fn plan_named(grid: &Grid, strategy: &str) -> Result<FleetPlan, SearchError> {
    if strategy.trim().eq_ignore_ascii_case("auto") {
        return Ok(plan_fleet(grid, &PlannerConfig::default()));
    }
    Ok(plan_with_strategy(grid, strategy.parse()?))
}
