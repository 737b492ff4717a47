use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::SolveConfig;
use crate::data::{SchedulingInput, SchedulingOutput, SolveStats, SolveStatus};
use crate::error::{InvalidInputError, ModelError, SchedulerError};
use crate::model::{self, Placement, TimetableModel};
use crate::report;
use crate::search::{Worker, WorkerReport};

const WORKER_STACK_BYTES: usize = 64 * 1024 * 1024;

/// A complete assignment, indexed by session.
#[derive(Debug, Clone)]
pub(crate) struct Found {
    pub worker: usize,
    pub placements: Vec<Placement>,
    pub cost: u64,
}

/// The deepest consistent partial assignment seen by any worker.
#[derive(Debug, Clone)]
pub(crate) struct PartialFound {
    pub placements: Vec<Option<Placement>>,
    pub depth: usize,
}

#[derive(Debug, Default)]
struct ResultSlot {
    /// Once set, no further solution is accepted.
    sealed: bool,
    best: Option<Found>,
    /// Worker whose search completed, proving optimality or infeasibility.
    proven_by: Option<usize>,
    partial: Option<PartialFound>,
}

/// State shared by the workers of one solve: a stop flag, the incumbent cost
/// and a single-writer result slot. Everything else is per worker.
pub(crate) struct Shared {
    stop: AtomicBool,
    timed_out: AtomicBool,
    deadline: Instant,
    incumbent: AtomicU64,
    optimizing: bool,
    allow_partial: bool,
    /// No assignment can cost less than this.
    cost_floor: u64,
    slot: Mutex<ResultSlot>,
}

impl Shared {
    fn new(model: &TimetableModel, config: &SolveConfig, deadline: Instant) -> Self {
        let cost_floor = model
            .sessions
            .iter()
            .map(|s| {
                model.courses[s.course]
                    .domain
                    .iter()
                    .map(|p| u64::from(p.penalty))
                    .min()
                    .unwrap_or(0)
            })
            .sum();
        Self {
            stop: AtomicBool::new(false),
            timed_out: AtomicBool::new(false),
            deadline,
            incumbent: AtomicU64::new(u64::MAX),
            optimizing: model.objective.is_some(),
            allow_partial: config.allow_partial,
            cost_floor,
            slot: Mutex::new(ResultSlot::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResultSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Raises the stop flag once the deadline has passed. Returns `true`
    /// when the caller should stop.
    pub fn poll_deadline(&self) -> bool {
        if self.is_stopped() {
            return true;
        }
        if Instant::now() >= self.deadline {
            self.timed_out.store(true, Ordering::Relaxed);
            self.stop.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }

    pub fn incumbent(&self) -> u64 {
        self.incumbent.load(Ordering::Acquire)
    }

    pub fn allow_partial(&self) -> bool {
        self.allow_partial
    }

    /// Offers a complete assignment. Returns `true` when the offering worker
    /// should stop searching.
    pub fn offer_solution(&self, worker: usize, placements: Vec<Placement>, cost: u64) -> bool {
        let mut slot = self.lock();
        if slot.sealed {
            return true;
        }
        if slot.best.as_ref().is_none_or(|best| cost < best.cost) {
            debug!("Worker {worker} found a solution with cost {cost}.");
            slot.best = Some(Found {
                worker,
                placements,
                cost,
            });
            self.incumbent.store(cost, Ordering::Release);
        }
        if !self.optimizing || cost <= self.cost_floor {
            slot.sealed = true;
            if self.optimizing {
                slot.proven_by = Some(worker);
            }
            self.stop.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// A worker explored its whole tree: the current best is optimal, or
    /// there is no solution at all.
    pub fn report_exhausted(&self, worker: usize) {
        let mut slot = self.lock();
        if !slot.sealed {
            slot.sealed = true;
            slot.proven_by = Some(worker);
        }
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn offer_partial(&self, worker: usize, placements: Vec<Option<Placement>>, depth: usize) {
        let mut slot = self.lock();
        if slot.partial.as_ref().is_none_or(|p| depth > p.depth) {
            debug!("Worker {worker} offers a partial assignment of {depth} sessions.");
            slot.partial = Some(PartialFound { placements, depth });
        }
    }
}

/// How one search run ended.
#[derive(Debug)]
pub(crate) enum Verdict {
    Solved { found: Found, proven_optimal: bool },
    Infeasible,
    TimedOut { partial: Option<PartialFound> },
}

#[derive(Debug)]
pub(crate) struct Outcome {
    pub verdict: Verdict,
    pub reports: Vec<WorkerReport>,
}

/// Races `config.worker_count` workers on the model until one commits a
/// solution, one exhausts its tree, or the deadline passes.
fn run_workers(
    model: &TimetableModel,
    config: &SolveConfig,
    deadline: Instant,
) -> Result<Outcome, ModelError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count)
        .stack_size(WORKER_STACK_BYTES)
        .thread_name(|i| format!("timetable-worker-{i}"))
        .build()
        .map_err(|e| ModelError::WorkerPool(e.to_string()))?;

    let shared = Shared::new(model, config, deadline);
    let reports = pool.broadcast(|ctx| Worker::new(ctx.index(), config.seed, model, &shared).run());

    let timed_out = shared.timed_out.load(Ordering::Relaxed);
    let slot = shared
        .slot
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let verdict = match (slot.best, slot.proven_by) {
        (Some(found), proven_by) => Verdict::Solved {
            found,
            proven_optimal: model.objective.is_some() && proven_by.is_some(),
        },
        (None, Some(_)) => Verdict::Infeasible,
        (None, None) => {
            if !timed_out {
                warn!("Workers stopped without a verdict before the deadline.");
            }
            Verdict::TimedOut {
                partial: slot.partial.filter(|_| config.allow_partial),
            }
        }
    };
    Ok(Outcome { verdict, reports })
}

/// Solves the timetabling problem with a pool of racing backtracking workers.
///
/// Invalid input is returned as an error. Every other outcome, including
/// infeasibility and timeouts, is a [`SchedulingOutput`] with a status.
pub fn solve(
    input: &SchedulingInput,
    config: &SolveConfig,
) -> Result<SchedulingOutput, SchedulerError> {
    let start_time = Instant::now();
    config.validate()?;

    let students: u64 = input.student_groups.iter().map(|g| u64::from(g.size)).sum();
    let timeslots = input.resolved_timeslots().len();
    let budget = config.time_budget(input.courses.len(), timeslots, students);
    let deadline = start_time.checked_add(budget).ok_or_else(|| {
        InvalidInputError::Config(format!("a time budget of {budget:?} is out of range"))
    })?;
    let mut stats = SolveStats {
        time_budget_ms: millis(budget),
        worker_count: config.worker_count,
        ..Default::default()
    };

    let Some(model) = model::build_until(input, config.optimization_objective, deadline)? else {
        warn!("Time budget of {budget:.2?} ran out while building the model.");
        stats.solve_time_ms = millis(start_time.elapsed());
        return Ok(report::out_of_time(stats));
    };
    info!(
        "Solving {} sessions of {} courses over {} timeslots \
         with {} workers and a {:.2?} budget...",
        model.sessions.len(),
        model.courses.len(),
        model.slots.len(),
        config.worker_count,
        budget
    );
    stats.session_count = model.sessions.len();
    stats.variable_domain_size = model.domain_size();
    stats.constraint_count = model.constraints.len();

    if model.sessions.is_empty() {
        info!("Nothing to schedule.");
        stats.solve_time_ms = millis(start_time.elapsed());
        stats.proven_optimal = model.objective.is_some();
        stats.objective_value = model.objective.map(|_| 0);
        return Ok(report::empty_timetable(stats));
    }

    if Instant::now() >= deadline {
        warn!("Time budget of {budget:.2?} ran out before the search started.");
        stats.solve_time_ms = millis(start_time.elapsed());
        return Ok(report::out_of_time(stats));
    }
    let proofs = report::static_conflicts(&model);
    if !proofs.is_empty() {
        warn!("Infeasible before search: {}", proofs[0]);
        stats.solve_time_ms = millis(start_time.elapsed());
        return Ok(report::failure(SolveStatus::Infeasible, proofs, stats));
    }

    let outcome = run_workers(&model, config, deadline)?;
    stats.solve_time_ms = millis(start_time.elapsed());
    stats.nodes_explored = outcome.reports.iter().map(|r| r.nodes).sum();
    for r in &outcome.reports {
        debug!(
            "Worker {} explored {} nodes{}.",
            r.worker,
            r.nodes,
            if r.exhausted { " and exhausted its tree" } else { "" }
        );
    }

    if let Verdict::Solved { found, .. } = &outcome.verdict {
        if let Err(violated) = model.verify(&found.placements) {
            return Err(ModelError::InvalidSolution(format!(
                "worker {} produced an assignment violating {:?}",
                found.worker, violated
            ))
            .into());
        }
    }

    let output = report::extract(&model, outcome, stats);
    match output.status {
        SolveStatus::Feasible => info!("Solution found in {} ms", output.stats.solve_time_ms),
        status => warn!("Solve ended with {} after {} ms", status, output.stats.solve_time_ms),
    }
    Ok(output)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
