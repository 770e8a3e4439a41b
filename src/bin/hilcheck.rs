use clap::Parser;
use colored::*;
use hilcheck::config::Config;
use hilcheck::detector::{
    DeviantDetector, Detector, FreeFallDetector, PositionRecorder, PositionRecorderHandle, TimeoutDetector,
};
use hilcheck::entities::{FailurePlan, ObservedModes, Position};
use hilcheck::executor::{Executor, TraceParams};
use hilcheck::search::{run_search, RunOutcome, SearchContext};
use hilcheck::sim::{Autopilot, Simulator, StubAutopilot, StubSimulator};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

const PROXY_ADDR: &str = "127.0.0.1:9002";
const RPC_SOCKET: &str = "/tmp/hilcheck-rpc.sock";
const TIMEOUT_DEADLINE: Duration = Duration::from_secs(120);

fn banner() {
    println!("{}", "HIL Fault-Injection Model Checker".bright_blue().bold());
    println!("{}", "==================================".bright_blue());
}

/// Used for the profiling run: no golden trajectory exists yet, so there is
/// nothing for `DeviantDetector` to compare against; `PositionRecorder`
/// stands in to build that trajectory instead.
fn profiling_detectors() -> (Vec<Box<dyn Detector>>, PositionRecorderHandle) {
    let recorder = PositionRecorder::new();
    let handle = recorder.handle();
    let detectors: Vec<Box<dyn Detector>> = vec![
        Box::new(TimeoutDetector::new(TIMEOUT_DEADLINE)),
        Box::new(FreeFallDetector::new()),
        Box::new(recorder),
    ];
    (detectors, handle)
}

/// Used for every search-loop run once a golden trajectory is known.
fn fresh_detectors(golden: Vec<Position>) -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(TimeoutDetector::new(TIMEOUT_DEADLINE)),
        Box::new(FreeFallDetector::new()),
        Box::new(DeviantDetector::new(golden)),
    ]
}

/// Used for `--replay`: reproducing one saved plan needs no golden
/// trajectory to compare against, only the hard-failure detectors.
fn replay_detectors() -> Vec<Box<dyn Detector>> {
    vec![Box::new(TimeoutDetector::new(TIMEOUT_DEADLINE)), Box::new(FreeFallDetector::new())]
}

/// A fresh pair of collaborators per run. Neither talks to a real
/// ArduPilot/PX4 process or a Gazebo instance; wiring up that integration is
/// out of scope here, so every run drives the deterministic stand-ins
/// instead. `config.autopilot` still selects which named autopilot the run
/// is nominally targeting (reported in the banner and spliced into
/// `--workload.cmd`), even though both stand-ins behave identically
/// regardless of which name was requested.
fn fresh_collaborators() -> (Arc<dyn Simulator>, Arc<dyn Autopilot>) {
    (Arc::new(StubSimulator::new(Vec::new(), 0.1)), Arc::new(StubAutopilot::new()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let config = Config::parse();
    banner();
    println!("{} {}", "target autopilot:".dimmed(), config.autopilot_name());

    tokio::fs::create_dir_all(&config.output).await?;

    let executor = Executor {
        proxy_addr: PROXY_ADDR.to_string(),
        rpc_socket: RPC_SOCKET.into(),
        output_dir: config.output.clone(),
        workload_cmd: config.expanded_workload_cmd(),
        repl: config.repl,
    };
    let trace_params =
        TraceParams { enabled: config.sensor_trace, output_dir: config.output.join("traces") };

    let stop_requested = Arc::new(std::sync::atomic::AtomicBool::new(false));
    {
        let stop_requested = stop_requested.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("{}", "received interrupt, finishing the in-flight run before stopping".yellow());
            stop_requested.store(true, Ordering::SeqCst);
        });
    }

    if config.replay {
        let path = config
            .replay_path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("--replay requires --replay.path"))?;
        let plan = hilcheck::replay::load_plan(path).await?;
        println!("{} {:?}", "replaying plan:".dimmed(), plan);

        let (simulator, autopilot) = fresh_collaborators();
        let outcome = executor
            .execute(&plan, simulator, autopilot, replay_detectors(), &trace_params, |_, _| {})
            .await?;

        if outcome.success {
            println!("{}", "replay completed without anomaly".bright_green());
        } else {
            println!("{}", "replay reproduced the anomaly".bright_red());
        }
        return Ok(());
    }

    // Profiling run: drive the empty plan once to learn mode0 (the mode
    // transitions a clean run goes through) and G (the golden trajectory
    // DeviantDetector will later compare against). Mirrors the upstream
    // dry-run-then-search structure.
    println!("{}", "performing a dry run...".dimmed());
    let (dry_run_detectors, golden_handle) = profiling_detectors();
    let profiling_modes: Arc<Mutex<ObservedModes>> = Arc::new(Mutex::new(Vec::new()));
    let profiling_modes_for_handler = profiling_modes.clone();
    let (simulator, autopilot) = fresh_collaborators();
    let profiling_outcome = executor
        .execute(
            &FailurePlan::new(Vec::new()),
            simulator,
            autopilot,
            dry_run_detectors,
            &trace_params,
            move |iteration, _mode| {
                profiling_modes_for_handler.lock().unwrap().push(iteration);
            },
        )
        .await?;
    if !profiling_outcome.success {
        return Err(anyhow::anyhow!("profiling run itself raised an anomaly; cannot establish a golden trajectory"));
    }
    let golden: Vec<Position> = golden_handle.recorded().await.into_iter().map(|tp| tp.position).collect();
    let initial_modes = profiling_modes.lock().unwrap().clone();
    println!("{} {} mode transitions, {} golden positions", "dry run complete:".dimmed(), initial_modes.len(), golden.len());

    let mut ctx = SearchContext::new();
    ctx.stop_requested = stop_requested;

    let counterexamples = run_search(&mut ctx, &initial_modes, |plan| {
        let executor = &executor;
        let trace_params = &trace_params;
        let golden = golden.clone();
        async move {
            let (simulator, autopilot) = fresh_collaborators();
            match executor
                .execute(&plan, simulator, autopilot, fresh_detectors(golden), trace_params, |_, _| {})
                .await
            {
                Ok(outcome) => RunOutcome { success: outcome.success, observed_modes: outcome.observed_modes },
                Err(e) => {
                    // A startup/RPC failure is an infrastructure problem,
                    // not evidence the scenario itself is unsafe; log it
                    // and move on rather than recording a false counterexample.
                    error!("run failed: {e}");
                    RunOutcome { success: true, observed_modes: Vec::new() }
                }
            }
        }
    })
    .await;

    println!("{}", "search complete".bright_green().bold());
    println!("  total unsafe runs: {}", ctx.statistics.total_unsafe);
    println!("  unsafe with GPS failure: {}", ctx.statistics.unsafe_with_gps);
    println!("  unsafe with barometer failure: {}", ctx.statistics.unsafe_with_baro);
    println!("  unsafe with accelerometer failure: {}", ctx.statistics.unsafe_with_accel);
    println!("  unsafe with compass failure: {}", ctx.statistics.unsafe_with_compass);
    println!("  unsafe with gyroscope failure: {}", ctx.statistics.unsafe_with_gyro);
    println!("  counterexamples recorded: {}", counterexamples.len());

    if counterexamples.is_empty() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
