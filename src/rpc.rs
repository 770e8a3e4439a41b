//! Control-plane RPC (§6): a single unary service exposed by the
//! orchestrator on a process-local endpoint. `Step`/`Position`/`Time` are
//! forwarded to the simulator collaborator; `Terminate` signals the
//! orchestrator to end the current run with success; `ModeChange` delivers
//! a mode transition tagged with the iteration count at receipt.
//!
//! The original exposed this over gRPC. This repo uses the teacher's own
//! newline-delimited JSON-over-socket idiom (see `bin/simulator.rs` in the
//! teacher) instead of adding a `tonic`/`prost` dependency for one unary
//! service — see DESIGN.md.

use crate::error::RpcError;
use crate::sim::Simulator;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Deadline this server applies to every `Step`/`Position`/`Time` call it
/// forwards to the simulator collaborator.
const FORWARD_DEADLINE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum RpcRequest {
    Step,
    Position,
    Time,
    Terminate,
    ModeChange { mode: i32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result")]
pub enum RpcResponse {
    Ack,
    Position { x: f64, y: f64, z: f64 },
    Time { value: f64 },
}

/// Events the orchestrator's main wait loop selects over.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    Terminate,
    ModeChange { iteration: u64, mode: i32 },
}

pub struct RpcServer {
    socket_path: PathBuf,
    shutdown_tx: Option<mpsc::Sender<oneshot::Sender<()>>>,
    task: Option<JoinHandle<()>>,
}

impl RpcServer {
    /// Binds a Unix-domain listener at `socket_path`, removing a stale
    /// socket file left by a previous crashed run first. `Step`/`Position`/
    /// `Time` requests are forwarded to `simulator`; `Terminate`/
    /// `ModeChange` are translated into `ControlEvent`s sent on `events`.
    pub async fn start(
        socket_path: impl AsRef<Path>,
        events: mpsc::Sender<ControlEvent>,
        simulator: Arc<dyn Simulator>,
    ) -> Result<Self, RpcError> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let _ = std::fs::remove_file(&socket_path);
        let listener = UnixListener::bind(&socket_path).map_err(RpcError::Bind)?;

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<oneshot::Sender<()>>(1);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    ack = shutdown_rx.recv() => {
                        if let Some(ack_tx) = ack {
                            let _ = ack_tx.send(());
                        }
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _)) => {
                                let events = events.clone();
                                let simulator = simulator.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, events, simulator).await {
                                        warn!("control-plane rpc connection error: {e}");
                                    }
                                });
                            }
                            Err(e) => warn!("control-plane rpc accept failed: {e}"),
                        }
                    }
                }
            }
        });

        Ok(Self { socket_path, shutdown_tx: Some(shutdown_tx), task: Some(task) })
    }

    pub async fn stop(&mut self, _deadline: Duration) {
        if let Some(tx) = self.shutdown_tx.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            let _ = tx.send(ack_tx).await;
            let _ = ack_rx.await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn handle_connection(
    stream: UnixStream,
    events: mpsc::Sender<ControlEvent>,
    simulator: Arc<dyn Simulator>,
) -> Result<(), RpcError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: RpcRequest = serde_json::from_str(&line)?;
        debug!("control-plane rpc request: {request:?}");
        let response = match request {
            RpcRequest::Step => {
                let _ = simulator.step(FORWARD_DEADLINE).await;
                RpcResponse::Ack
            }
            RpcRequest::Position => match simulator.position(FORWARD_DEADLINE).await {
                Ok(p) => RpcResponse::Position { x: p.x, y: p.y, z: p.z },
                Err(_) => RpcResponse::Ack,
            },
            RpcRequest::Time => match simulator.sim_time(FORWARD_DEADLINE).await {
                Ok(value) => RpcResponse::Time { value },
                Err(_) => RpcResponse::Ack,
            },
            RpcRequest::Terminate => {
                let _ = events.send(ControlEvent::Terminate).await;
                RpcResponse::Ack
            }
            RpcRequest::ModeChange { mode } => {
                let _ = events
                    .send(ControlEvent::ModeChange { iteration: simulator.iterations(), mode })
                    .await;
                RpcResponse::Ack
            }
        };
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        write_half.write_all(&out).await?;
    }
    Ok(())
}

/// Also usable for a test client talking to an `RpcServer`.
pub async fn send_mode_change(socket_path: impl AsRef<Path>, mode: i32) -> Result<(), RpcError> {
    let mut stream = UnixStream::connect(socket_path).await?;
    let mut line = serde_json::to_vec(&RpcRequest::ModeChange { mode })?;
    line.push(b'\n');
    stream.write_all(&line).await?;
    Ok(())
}

pub async fn send_terminate(socket_path: impl AsRef<Path>) -> Result<(), RpcError> {
    let mut stream = UnixStream::connect(socket_path).await?;
    let mut line = serde_json::to_vec(&RpcRequest::Terminate)?;
    line.push(b'\n');
    stream.write_all(&line).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::StubSimulator;

    #[tokio::test]
    async fn terminate_request_is_delivered_as_control_event() {
        let path = std::env::temp_dir().join(format!("hilcheck-rpc-test-{}.sock", std::process::id()));
        let (tx, mut rx) = mpsc::channel(4);
        let simulator: Arc<dyn Simulator> = Arc::new(StubSimulator::new(Vec::new(), 0.1));
        let mut server = RpcServer::start(&path, tx, simulator).await.unwrap();

        send_terminate(&path).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ControlEvent::Terminate));

        server.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn mode_change_carries_iteration_count_at_receipt() {
        let path = std::env::temp_dir().join(format!("hilcheck-rpc-test-{}.sock", std::process::id() + 1));
        let (tx, mut rx) = mpsc::channel(4);
        let simulator: Arc<dyn Simulator> = Arc::new(StubSimulator::new(Vec::new(), 0.1));
        simulator.step(Duration::from_millis(10)).await.unwrap();
        let mut server = RpcServer::start(&path, tx, simulator).await.unwrap();

        send_mode_change(&path, 7).await.unwrap();
        let event = rx.recv().await.unwrap();
        match event {
            ControlEvent::ModeChange { iteration, mode } => {
                assert_eq!(iteration, 1);
                assert_eq!(mode, 7);
            }
            _ => panic!("expected ModeChange"),
        }

        server.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn step_request_is_forwarded_and_advances_iterations() {
        let path = std::env::temp_dir().join(format!("hilcheck-rpc-test-{}.sock", std::process::id() + 2));
        let (tx, _rx) = mpsc::channel(4);
        let simulator: Arc<dyn Simulator> = Arc::new(StubSimulator::new(Vec::new(), 0.1));
        let mut server = RpcServer::start(&path, tx, simulator.clone()).await.unwrap();

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let mut line = serde_json::to_vec(&RpcRequest::Step).unwrap();
        line.push(b'\n');
        stream.write_all(&line).await.unwrap();

        let (read_half, _write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let response_line = lines.next_line().await.unwrap().unwrap();
        let response: RpcResponse = serde_json::from_str(&response_line).unwrap();
        assert!(matches!(response, RpcResponse::Ack));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(simulator.iterations(), 1);

        server.stop(Duration::from_secs(1)).await;
    }
}
