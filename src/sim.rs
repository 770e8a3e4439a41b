//! §6 external collaborator contracts. The search engine and orchestrator
//! work against any type satisfying these — narrow trait-like
//! abstractions, no shared implementation between concrete collaborators.

use crate::entities::Position;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A per-run hook fired after each `step`, boxed so `Simulator` stays
/// object-safe without pulling in a futures-combinator crate.
pub type PostStepHook = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Required of any simulator collaborator.
#[async_trait]
pub trait Simulator: Send + Sync {
    /// Idempotent launch; returns when ready to accept step RPCs.
    async fn start(&self) -> anyhow::Result<()>;

    /// Graceful shutdown with deadline.
    async fn stop(&self, deadline: Duration) -> anyhow::Result<()>;

    /// Advance exactly one tick; increments `iterations()`.
    async fn step(&self, deadline: Duration) -> anyhow::Result<()>;

    /// Current vehicle `(x, y, z)`.
    async fn position(&self, deadline: Duration) -> anyhow::Result<Position>;

    /// Virtual clock as an absolute time.
    async fn sim_time(&self, deadline: Duration) -> anyhow::Result<f64>;

    /// Monotonic u64 step count.
    fn iterations(&self) -> u64;

    /// Registers a per-run hook fired after each `step`, in registration
    /// order.
    async fn add_post_step_action(&self, hook: PostStepHook);
}

/// Required of any autopilot collaborator.
#[async_trait]
pub trait Autopilot: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;
    async fn stop(&self, deadline: Duration) -> anyhow::Result<()>;
    async fn get_sim_config(&self) -> anyhow::Result<String>;
}

/// A deterministic stub used to exercise the orchestrator in tests: it
/// replays a fixed, pre-recorded sequence of positions, exposes a
/// monotonic step counter and never reports an anomaly on its own.
pub struct StubSimulator {
    positions: Vec<Position>,
    iteration: std::sync::atomic::AtomicU64,
    time_per_step: f64,
    post_step_hooks: Mutex<Vec<PostStepHook>>,
}

impl StubSimulator {
    pub fn new(positions: Vec<Position>, time_per_step: f64) -> Self {
        Self {
            positions,
            iteration: std::sync::atomic::AtomicU64::new(0),
            time_per_step,
            post_step_hooks: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Simulator for StubSimulator {
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self, _deadline: Duration) -> anyhow::Result<()> {
        Ok(())
    }

    async fn step(&self, _deadline: Duration) -> anyhow::Result<()> {
        self.iteration.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let hooks = self.post_step_hooks.lock().await;
        for hook in hooks.iter() {
            (hook)().await;
        }
        Ok(())
    }

    async fn position(&self, _deadline: Duration) -> anyhow::Result<Position> {
        let i = self.iteration.load(std::sync::atomic::Ordering::SeqCst) as usize;
        Ok(self
            .positions
            .get(i.min(self.positions.len().saturating_sub(1)))
            .copied()
            .unwrap_or(Position { x: 0.0, y: 0.0, z: 0.0 }))
    }

    async fn sim_time(&self, _deadline: Duration) -> anyhow::Result<f64> {
        let i = self.iteration.load(std::sync::atomic::Ordering::SeqCst);
        Ok(i as f64 * self.time_per_step)
    }

    fn iterations(&self) -> u64 {
        self.iteration.load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn add_post_step_action(&self, hook: PostStepHook) {
        self.post_step_hooks.lock().await.push(hook);
    }
}

pub struct StubAutopilot;

impl StubAutopilot {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubAutopilot {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Autopilot for StubAutopilot {
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn stop(&self, _deadline: Duration) -> anyhow::Result<()> {
        Ok(())
    }
    async fn get_sim_config(&self) -> anyhow::Result<String> {
        Ok(String::new())
    }
}
