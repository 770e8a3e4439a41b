use super::{Detector, POSITION_CHANNEL_CAPACITY};
use crate::entities::{Anomaly, AnomalyKind, Position, TimestampedPosition};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DEVIATION_DISTANCE_THRESHOLD: f64 = 10.0;
const STREAK_TRIGGER: u32 = 51;
/// Only ~1% of positions are compared against the golden trajectory. This
/// is a deliberate sampling rate, not an oversight.
const SAMPLE_PROBABILITY: f64 = 0.01;
const SEED: u64 = 42;

/// Compares incoming positions against a golden trajectory `G`. Advances an
/// index on every *sampled* position (Bernoulli(0.01), seeded
/// deterministically) and raises `Deviation` once the distance-from-golden
/// streak exceeds 50, then latches — no further anomalies after the first.
pub struct DeviantDetector {
    golden: Vec<Position>,
    position_tx: mpsc::Sender<TimestampedPosition>,
    position_rx: Option<mpsc::Receiver<TimestampedPosition>>,
    anomaly_tx: Option<mpsc::Sender<Anomaly>>,
    task: Option<JoinHandle<()>>,
}

impl DeviantDetector {
    pub fn new(golden: Vec<Position>) -> Self {
        let (position_tx, position_rx) = mpsc::channel(POSITION_CHANNEL_CAPACITY);
        Self {
            golden,
            position_tx,
            position_rx: Some(position_rx),
            anomaly_tx: None,
            task: None,
        }
    }
}

#[async_trait]
impl Detector for DeviantDetector {
    fn position_sender(&self) -> mpsc::Sender<TimestampedPosition> {
        self.position_tx.clone()
    }

    fn set_anomaly_sender(&mut self, tx: mpsc::Sender<Anomaly>) {
        self.anomaly_tx = Some(tx);
    }

    async fn start(&mut self) {
        let anomaly_tx = self.anomaly_tx.clone().expect("anomaly sender set before start");
        let mut position_rx = self.position_rx.take().expect("start called once");
        let golden = std::mem::take(&mut self.golden);

        self.task = Some(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(SEED);
            let mut index: usize = 0;
            let mut streak: u32 = 0;
            let mut reported = false;

            while let Some(sample) = position_rx.recv().await {
                if rng.gen::<f64>() <= 1.0 - SAMPLE_PROBABILITY {
                    continue;
                }
                if index >= golden.len() {
                    continue;
                }
                let distance = golden[index].distance(&sample.position);
                index += 1;

                if distance > DEVIATION_DISTANCE_THRESHOLD {
                    streak += 1;
                } else {
                    streak = 0;
                }

                if streak >= STREAK_TRIGGER && !reported {
                    let _ = anomaly_tx
                        .send(Anomaly { kind: AnomalyKind::Deviation, time: sample.time })
                        .await;
                    reported = true;
                }
            }
        }));
    }

    async fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_golden(n: usize) -> Vec<Position> {
        (0..n).map(|_| Position { x: 0.0, y: 0.0, z: 0.0 }).collect()
    }

    #[tokio::test]
    async fn emits_exactly_one_deviation_after_streak_then_latches() {
        let (anomaly_tx, mut anomaly_rx) = mpsc::channel(4);
        let mut detector = DeviantDetector::new(flat_golden(10_000));
        detector.set_anomaly_sender(anomaly_tx);
        detector.start().await;

        let sender = detector.position_sender();
        let far = Position { x: 1000.0, y: 1000.0, z: 1000.0 };
        // Far more than 51 samples sent so that, despite the ~1% sampling
        // rate, enough land to build a streak comfortably past the trigger.
        for i in 0..20_000 {
            sender
                .send(TimestampedPosition { position: far, time: i as f64 })
                .await
                .unwrap();
        }

        let anomaly = tokio::time::timeout(std::time::Duration::from_secs(2), anomaly_rx.recv())
            .await
            .expect("expected a deviation anomaly")
            .unwrap();
        assert_eq!(anomaly.kind, AnomalyKind::Deviation);

        // Latched: no further anomalies even with many more far samples.
        for i in 20_000..25_000 {
            sender
                .send(TimestampedPosition { position: far, time: i as f64 })
                .await
                .unwrap();
        }
        let second = tokio::time::timeout(std::time::Duration::from_millis(200), anomaly_rx.recv()).await;
        assert!(second.is_err(), "detector must latch after the first Deviation");

        detector.shutdown().await;
    }
}
