//! Black-box exercise of the scenario search engine — feasibility, powerset
//! enumeration, and dedup — through the crate's public API only.

use hilcheck::entities::{FailurePlan, ScheduledFailure, SensorFailure, SensorType};
use hilcheck::search::{all_failures, enqueue_scenarios, feasible, run_search, RunOutcome, SearchContext};
use std::collections::{HashSet, VecDeque};

#[test]
fn only_whole_sensor_classes_are_feasible() {
    let gps_pair_only = FailurePlan::new(vec![
        ScheduledFailure { failure: SensorFailure { sensor_type: SensorType::Gps, instance: 0 }, failure_time: 0 },
        ScheduledFailure { failure: SensorFailure { sensor_type: SensorType::Gps, instance: 1 }, failure_time: 0 },
    ]);
    assert!(!feasible(&gps_pair_only), "two of three GPS instances is not a legal scenario");

    let gps_and_gyro_whole = FailurePlan::new(vec![
        ScheduledFailure { failure: SensorFailure { sensor_type: SensorType::Gps, instance: 0 }, failure_time: 5 },
        ScheduledFailure { failure: SensorFailure { sensor_type: SensorType::Gps, instance: 1 }, failure_time: 5 },
        ScheduledFailure { failure: SensorFailure { sensor_type: SensorType::Gps, instance: 2 }, failure_time: 5 },
        ScheduledFailure { failure: SensorFailure { sensor_type: SensorType::Gyroscope, instance: 0 }, failure_time: 5 },
        ScheduledFailure { failure: SensorFailure { sensor_type: SensorType::Gyroscope, instance: 1 }, failure_time: 5 },
        ScheduledFailure { failure: SensorFailure { sensor_type: SensorType::Gyroscope, instance: 2 }, failure_time: 5 },
    ]);
    assert!(feasible(&gps_and_gyro_whole));
}

#[test]
fn enqueue_scenarios_skips_plans_already_considered() {
    let modes = vec![0u64];
    let mut worklist: VecDeque<FailurePlan> = VecDeque::new();
    let mut considered: HashSet<u64> = HashSet::new();

    enqueue_scenarios(&modes, &mut worklist, &mut considered);
    let first_pass_len = worklist.len();
    assert!(first_pass_len > 0);

    enqueue_scenarios(&modes, &mut worklist, &mut considered);
    assert_eq!(worklist.len(), first_pass_len, "second call must add nothing new");
}

#[tokio::test]
async fn run_search_drains_the_worklist_and_reports_every_unsafe_plan() {
    let mut ctx = SearchContext::new();
    let modes0 = vec![0u64];

    // Every plan that fails all three Accelerometer instances is "unsafe"
    // for this test; everything else is safe.
    let counterexamples = run_search(&mut ctx, &modes0, |plan| async move {
        let unsafe_run = plan
            .entries
            .iter()
            .any(|e| e.failure.sensor_type == SensorType::Accelerometer);
        RunOutcome { success: !unsafe_run, observed_modes: Vec::new() }
    })
    .await;

    assert!(!counterexamples.is_empty());
    for plan in &counterexamples {
        assert!(plan.entries.iter().any(|e| e.failure.sensor_type == SensorType::Accelerometer));
    }
    assert_eq!(ctx.statistics.total_unsafe as usize, counterexamples.len());
    assert_eq!(all_failures(0).len(), 15);
}
