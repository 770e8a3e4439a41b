//! C5: Scenario Search Engine. Enumerates feasible failure plans seeded
//! from observed mode transitions, dedupes by structural hash, drives the
//! orchestrator repeatedly, and records statistics.

use crate::entities::{
    FailurePlan, ObservedModes, ScheduledFailure, SensorFailure, SensorType, Statistics,
    INSTANCES_PER_SENSOR,
};
use std::collections::{HashSet, VecDeque};
use tracing::info;

#[cfg(test)]
use proptest::prelude::*;

/// Explicit context threaded through the search rather than package-level
/// globals: statistics, a signal-driven stop flag, configuration.
pub struct SearchContext {
    pub statistics: Statistics,
    pub stop_requested: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl SearchContext {
    pub fn new() -> Self {
        Self {
            statistics: Statistics::default(),
            stop_requested: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }
}

impl Default for SearchContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Cartesian product of `{GPS, Accel, Compass, Gyro, Baro} x {0,1,2}`,
/// each lifted to a plan element at `failure_time = t`. Exactly 15
/// elements.
pub fn all_failures(t: u64) -> Vec<ScheduledFailure> {
    let mut out = Vec::with_capacity(SensorType::FAILABLE.len() * INSTANCES_PER_SENSOR as usize);
    for sensor_type in SensorType::FAILABLE {
        for instance in 0..INSTANCES_PER_SENSOR {
            out.push(ScheduledFailure {
                failure: SensorFailure { sensor_type, instance },
                failure_time: t,
            });
        }
    }
    out
}

/// All 2^n subsets of `failures`, built iteratively via bitmask
/// enumeration (simpler, faster, and allocates once compared to a
/// recursive construction) — including the empty subset, which callers
/// discard. `failures.len()` must be small enough that `1 << len` fits a
/// `usize` (15 gives 32,768, the only size this is ever called with).
pub fn powerset(failures: &[ScheduledFailure]) -> Vec<Vec<ScheduledFailure>> {
    let n = failures.len();
    assert!(n < usize::BITS as usize, "powerset input too large for bitmask enumeration");
    let mut subsets = Vec::with_capacity(1 << n);
    for mask in 0..(1usize << n) {
        let mut subset = Vec::new();
        for (i, failure) in failures.iter().enumerate() {
            if mask & (1 << i) != 0 {
                subset.push(*failure);
            }
        }
        subsets.push(subset);
    }
    subsets
}

/// For every element `e`, all other elements with `e`'s `(type, instance)`
/// must not exist (no duplicates), and exactly three elements must share
/// `e.type` — a sensor class is either wholly spared or all three
/// instances fail together.
pub fn feasible(plan: &FailurePlan) -> bool {
    for (i, e) in plan.entries.iter().enumerate() {
        let mut count = 0usize;
        for (j, other) in plan.entries.iter().enumerate() {
            if other.failure.sensor_type == e.failure.sensor_type {
                count += 1;
            }
            if i != j && other.failure.sensor_type == e.failure.sensor_type && other.failure.instance == e.failure.instance {
                return false;
            }
        }
        if count != INSTANCES_PER_SENSOR as usize {
            return false;
        }
    }
    true
}

/// For each `t` in `modes`, for each non-empty feasible subset of
/// `all_failures(t)` not already in `considered`, mark it considered and
/// push it onto the worklist.
pub fn enqueue_scenarios(modes: &ObservedModes, worklist: &mut VecDeque<FailurePlan>, considered: &mut HashSet<u64>) {
    for &t in modes {
        for subset in powerset(&all_failures(t)) {
            if subset.is_empty() {
                continue;
            }
            let candidate = FailurePlan::new(subset);
            let hash = candidate.structural_hash();
            if considered.contains(&hash) {
                continue;
            }
            if !feasible(&candidate) {
                continue;
            }
            considered.insert(hash);
            worklist.push_back(candidate);
        }
    }
}

/// The result of driving one plan through the orchestrator, abstracted so
/// `run_search` can be exercised against a stub in tests.
pub struct RunOutcome {
    pub success: bool,
    pub observed_modes: ObservedModes,
}

/// Drives the worklist to exhaustion (or until `ctx.stop_requested` is
/// set), calling `run` once per dequeued plan. `run` is the orchestrator's
/// `execute`, abstracted behind a closure so this loop can be tested
/// without a real simulator/autopilot pair.
pub async fn run_search<F, Fut>(
    ctx: &mut SearchContext,
    modes0: &ObservedModes,
    mut run: F,
) -> Vec<FailurePlan>
where
    F: FnMut(FailurePlan) -> Fut,
    Fut: std::future::Future<Output = RunOutcome>,
{
    let mut worklist: VecDeque<FailurePlan> = VecDeque::new();
    let mut considered: HashSet<u64> = HashSet::new();
    let mut counterexamples = Vec::new();

    enqueue_scenarios(modes0, &mut worklist, &mut considered);

    while let Some(plan) = worklist.pop_front() {
        if ctx.stop_requested.load(std::sync::atomic::Ordering::SeqCst) {
            info!("search stopping on signal with {} plans still queued", worklist.len() + 1);
            break;
        }

        let outcome = run(plan.clone()).await;
        if !outcome.success {
            ctx.statistics.record_unsafe(&plan);
            counterexamples.push(plan.clone());
        }

        let shifted = plan.time_shifted();
        let hash = shifted.structural_hash();
        if !considered.contains(&hash) {
            considered.insert(hash);
            worklist.push_back(shifted);
        }

        enqueue_scenarios(&outcome.observed_modes, &mut worklist, &mut considered);
    }

    counterexamples
}
