//! # HIL Fault-Injection Model Checker
//!
//! Exhaustively drives an autopilot/simulator pair through sensor-failure
//! scenarios over a hardware-in-the-loop link, watching a bank of anomaly
//! detectors to decide whether each scenario is safe.
//!
//! ## Architecture
//!
//! - [`hinj`] - wire codec ([`hinj::packet`]) and injection proxy ([`hinj::proxy`])
//! - [`detector`] - anomaly detectors and their fan-out
//! - [`sim`] - `Simulator`/`Autopilot` collaborator traits
//! - [`rpc`] - control-plane RPC between the autopilot and the orchestrator
//! - [`proc`] - subprocess spawn/shutdown for the workload process
//! - [`executor`] - brings one scenario run up and down end to end
//! - [`search`] - enumerates and dedupes scenarios, drives the executor
//! - [`config`] - CLI surface
//! - [`trace`] / [`replay`] - persisted counterexamples, mode logs, sensor traces

pub mod config;
pub mod detector;
pub mod entities;
pub mod error;
pub mod executor;
pub mod hinj;
pub mod proc;
pub mod replay;
pub mod rpc;
pub mod search;
pub mod sim;
pub mod trace;

pub use entities::{Anomaly, AnomalyKind, FailurePlan, Position, SensorType, Statistics};
pub use error::{CodecError, ExecutorError, ProxyError, RpcError, SearchError};
pub use executor::{Executor, TraceParams};
