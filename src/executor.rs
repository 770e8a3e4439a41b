//! C4: Execution Orchestrator. Brings up the simulator, autopilot and
//! injection proxy, drives a deterministic stepping loop via the
//! simulator's own post-step hooks, multiplexes detector anomalies and
//! control-plane RPCs, and shuts everything down in LIFO order.

use crate::detector::{Detector, DetectorProxy};
use crate::entities::{Anomaly, FailurePlan, ObservedModes};
use crate::error::ExecutorError;
use crate::hinj::InjectionProxy;
use crate::proc::ManagedProcess;
use crate::rpc::{ControlEvent, RpcServer};
use crate::sim::{Autopilot, Simulator};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

const STABILIZATION_SLEEP: Duration = Duration::from_secs(5);
const STEADY_FLIGHT_SLEEP: Duration = Duration::from_secs(10);
const SIM_RPC_DEADLINE: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);
const AUTOPILOT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// Sample rate for opportunistic sensor-trace capture in hook A.
const TRACE_SAMPLE_PROBABILITY: f64 = 0.01;

pub struct TraceParams {
    pub enabled: bool,
    pub output_dir: PathBuf,
}

pub struct ExecutionOutcome {
    pub success: bool,
    pub observed_modes: ObservedModes,
}

pub struct Executor {
    pub proxy_addr: String,
    pub rpc_socket: PathBuf,
    pub output_dir: PathBuf,
    pub workload_cmd: Option<String>,
    pub repl: bool,
}

impl Executor {
    /// Runs exactly one model-check, as a pure function `(plan) ->
    /// (outcome, observed_modes)` from the search engine's point of view.
    pub async fn execute(
        &self,
        plan: &FailurePlan,
        simulator: Arc<dyn Simulator>,
        autopilot: Arc<dyn Autopilot>,
        detectors: Vec<Box<dyn Detector>>,
        trace: &TraceParams,
        mut mode_handler: impl FnMut(u64, i32) + Send + 'static,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        // 1. Reset per-run state: a fresh PRNG for trace sampling, a fresh
        // proxy instance, fresh observed-modes accumulator.
        let trace_rng = StdRng::seed_from_u64(42);

        // 2. Start injection proxy.
        let mut proxy = InjectionProxy::new();
        proxy.start(&self.proxy_addr).await.map_err(|e| ExecutorError::Startup {
            component: "injection_proxy",
            source: anyhow::Error::new(e),
        })?;

        // 3. Start simulator; stabilize.
        simulator.start().await.map_err(|e| ExecutorError::Startup { component: "simulator", source: e })?;
        tokio::time::sleep(STABILIZATION_SLEEP).await;

        // 4. Start autopilot.
        autopilot.start().await.map_err(|e| ExecutorError::Startup { component: "autopilot", source: e })?;

        // 5. Start control-plane RPC server; Step/Position/Time are
        // forwarded straight to the simulator collaborator.
        let (events_tx, events_rx) = mpsc::channel::<ControlEvent>(16);
        let mut rpc = RpcServer::start(&self.rpc_socket, events_tx, simulator.clone()).await?;

        // 6. Anomaly channel sized to the detector count; wrap in fan-out.
        let detector_count = detectors.len().max(1);
        let (anomaly_tx, mut anomaly_rx) = mpsc::channel::<Anomaly>(detector_count);
        let mut detector_proxy = DetectorProxy::new(detectors);
        detector_proxy.start(anomaly_tx).await;

        // 7. Register post-step hooks A (observation) and B (failure
        // scheduling), in that order.
        let position_sender = detector_proxy.position_sender();
        let hook_simulator = simulator.clone();
        let fault_sender = proxy.fault_sender();
        let plan_entries = plan.entries.clone();

        let snapshot_reader = proxy.snapshot_reader();
        let trace_enabled = trace.enabled;
        let trace_output_dir = trace.output_dir.clone();
        let trace_rng = Arc::new(Mutex::new(trace_rng));

        simulator
            .add_post_step_action(Arc::new(move || {
                let position_sender = position_sender.clone();
                let hook_simulator = hook_simulator.clone();
                let snapshot_reader = snapshot_reader.clone();
                let trace_output_dir = trace_output_dir.clone();
                let trace_rng = trace_rng.clone();
                Box::pin(async move {
                    // Hook A: observation.
                    let Ok(position) = hook_simulator.position(SIM_RPC_DEADLINE).await else {
                        return;
                    };
                    let Ok(time) = hook_simulator.sim_time(SIM_RPC_DEADLINE).await else {
                        return;
                    };

                    if trace_enabled {
                        let sampled = { trace_rng.lock().await.gen::<f64>() <= TRACE_SAMPLE_PROBABILITY };
                        if sampled {
                            let iteration = hook_simulator.iterations();
                            let readings = snapshot_reader.all().await;
                            if let Err(e) =
                                crate::trace::write_sensor_sample(&trace_output_dir, iteration, &readings).await
                            {
                                warn!("failed to write sensor trace sample: {e}");
                            }
                        }
                    }

                    let _ = position_sender
                        .send(crate::entities::TimestampedPosition { position, time })
                        .await;
                })
            }))
            .await;

        simulator
            .add_post_step_action({
                let hook_simulator = simulator.clone();
                let fault_sender = fault_sender.clone();
                let plan_entries = plan_entries.clone();
                Arc::new(move || {
                    let hook_simulator = hook_simulator.clone();
                    let fault_sender = fault_sender.clone();
                    let plan_entries = plan_entries.clone();
                    Box::pin(async move {
                        // Hook B: failure scheduling, exact-match on
                        // iteration count.
                        let now = hook_simulator.iterations();
                        for entry in &plan_entries {
                            if entry.failure_time == now {
                                fault_sender.fail_sensor(entry.failure.sensor_type, entry.failure.instance);
                            }
                        }
                    })
                })
            })
            .await;

        // 8. Let the autopilot reach steady flight.
        tokio::time::sleep(STEADY_FLIGHT_SLEEP).await;

        // 9. Spawn the workload unless in REPL mode.
        let workload = if !self.repl {
            match &self.workload_cmd {
                Some(cmd) => Some(ManagedProcess::spawn("workload", cmd).map_err(|e| ExecutorError::Startup {
                    component: "workload",
                    source: e,
                })?),
                None => None,
            }
        } else {
            None
        };

        // Mode-reporting task: consumes ModeChange events and invokes the
        // caller's handler; forwards Terminate onto a dedicated channel so
        // the main wait loop doesn't have to parse event variants itself.
        let observed_modes = Arc::new(Mutex::new(ObservedModes::new()));
        let (terminate_tx, mut terminate_rx) = mpsc::channel::<()>(1);
        let exit_flag = Arc::new(AtomicBool::new(false));
        let mode_task_exit = exit_flag.clone();
        let observed_modes_for_task = observed_modes.clone();
        let mut events_rx = events_rx;
        let mode_task = tokio::spawn(async move {
            while !mode_task_exit.load(Ordering::SeqCst) {
                match events_rx.recv().await {
                    Some(ControlEvent::ModeChange { iteration, mode }) => {
                        observed_modes_for_task.lock().await.push(iteration);
                        mode_handler(iteration, mode);
                    }
                    Some(ControlEvent::Terminate) => {
                        let _ = terminate_tx.send(()).await;
                    }
                    None => break,
                }
            }
        });

        // Main wait loop.
        let success = tokio::select! {
            _ = terminate_rx.recv() => {
                true
            }
            anomaly = anomaly_rx.recv() => {
                if let Some(anomaly) = anomaly {
                    info!("run ended by anomaly: {anomaly:?}");
                    self.persist_counterexample(plan).await;
                }
                false
            }
        };

        // Shutdown, LIFO: workload -> detector-proxy -> mode-reporter ->
        // rpc -> autopilot -> simulator -> proxy.
        if let Some(mut workload) = workload {
            if let Err(e) = workload.stop(SHUTDOWN_GRACE).await {
                warn!("workload shutdown error: {e}");
            }
        }
        detector_proxy.shutdown().await;

        exit_flag.store(true, Ordering::SeqCst);
        mode_task.abort();
        let final_modes = observed_modes.lock().await.clone();

        rpc.stop(SHUTDOWN_GRACE).await;
        if let Err(e) = autopilot.stop(AUTOPILOT_SHUTDOWN_GRACE).await {
            warn!("autopilot shutdown error: {e}");
        }
        if let Err(e) = simulator.stop(SHUTDOWN_GRACE).await {
            warn!("simulator shutdown error: {e}");
        }
        if let Err(e) = proxy.shutdown().await {
            warn!("injection proxy shutdown error: {e}");
        }

        Ok(ExecutionOutcome { success, observed_modes: final_modes })
    }

    async fn persist_counterexample(&self, plan: &FailurePlan) {
        if let Err(e) = crate::trace::write_counterexample(&self.output_dir, plan).await {
            warn!("failed to persist counterexample: {e}");
        }
    }
}
