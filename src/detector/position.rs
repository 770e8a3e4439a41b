use super::{Detector, POSITION_CHANNEL_CAPACITY};
use crate::entities::{Anomaly, TimestampedPosition};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

const SAMPLE_PROBABILITY: f64 = 0.01;
/// Distinct from `DeviantDetector`'s seed; the source uses a different
/// seed for its position-recording sampler.
const SEED: u64 = 0;

/// Not a true detector — shares the same contract but never emits
/// anomalies. Bernoulli(0.01)-samples positions into a growable ordered
/// sequence for later trace output.
pub struct PositionRecorder {
    position_tx: mpsc::Sender<TimestampedPosition>,
    position_rx: Option<mpsc::Receiver<TimestampedPosition>>,
    recorded: Arc<Mutex<Vec<TimestampedPosition>>>,
    task: Option<JoinHandle<()>>,
}

impl PositionRecorder {
    pub fn new() -> Self {
        let (position_tx, position_rx) = mpsc::channel(POSITION_CHANNEL_CAPACITY);
        Self {
            position_tx,
            position_rx: Some(position_rx),
            recorded: Arc::new(Mutex::new(Vec::new())),
            task: None,
        }
    }

    pub async fn recorded(&self) -> Vec<TimestampedPosition> {
        self.recorded.lock().await.clone()
    }

    /// A cheap, cloneable read handle that outlives the `Box<dyn Detector>`
    /// this recorder is erased into, so a profiling run can retrieve the
    /// recorded golden trajectory after the detector bank is torn down.
    pub fn handle(&self) -> PositionRecorderHandle {
        PositionRecorderHandle { recorded: self.recorded.clone() }
    }
}

#[derive(Clone)]
pub struct PositionRecorderHandle {
    recorded: Arc<Mutex<Vec<TimestampedPosition>>>,
}

impl PositionRecorderHandle {
    pub async fn recorded(&self) -> Vec<TimestampedPosition> {
        self.recorded.lock().await.clone()
    }
}

impl Default for PositionRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Detector for PositionRecorder {
    fn position_sender(&self) -> mpsc::Sender<TimestampedPosition> {
        self.position_tx.clone()
    }

    fn set_anomaly_sender(&mut self, _tx: mpsc::Sender<Anomaly>) {
        // PositionRecorder never emits anomalies; nothing to wire.
    }

    async fn start(&mut self) {
        let mut position_rx = self.position_rx.take().expect("start called once");
        let recorded = self.recorded.clone();

        self.task = Some(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(SEED);
            while let Some(sample) = position_rx.recv().await {
                if rng.gen::<f64>() <= 1.0 - SAMPLE_PROBABILITY {
                    continue;
                }
                recorded.lock().await.push(sample);
            }
        }));
    }

    async fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
