use super::{Detector, POSITION_CHANNEL_CAPACITY};
use crate::entities::{Anomaly, AnomalyKind, TimestampedPosition};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const ACCEL_THRESHOLD: f64 = 9.8;
const CONSECUTIVE_TRIGGER: u32 = 11;

/// Maintains last `(time, position)`; computes `Δvy = (y - y_prev)/Δt` and
/// `|a_y| = |Δvy|/Δt`. Counts consecutive samples with `|a_y| > 9.8`; on
/// the 11th consecutive, emits `FreeFall`. The counter resets on any
/// sub-threshold sample (corrected behavior; the source this was modeled
/// on never resets it).
pub struct FreeFallDetector {
    position_tx: mpsc::Sender<TimestampedPosition>,
    position_rx: Option<mpsc::Receiver<TimestampedPosition>>,
    anomaly_tx: Option<mpsc::Sender<Anomaly>>,
    task: Option<JoinHandle<()>>,
}

impl FreeFallDetector {
    pub fn new() -> Self {
        let (position_tx, position_rx) = mpsc::channel(POSITION_CHANNEL_CAPACITY);
        Self {
            position_tx,
            position_rx: Some(position_rx),
            anomaly_tx: None,
            task: None,
        }
    }
}

impl Default for FreeFallDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Detector for FreeFallDetector {
    fn position_sender(&self) -> mpsc::Sender<TimestampedPosition> {
        self.position_tx.clone()
    }

    fn set_anomaly_sender(&mut self, tx: mpsc::Sender<Anomaly>) {
        self.anomaly_tx = Some(tx);
    }

    async fn start(&mut self) {
        let anomaly_tx = self.anomaly_tx.clone().expect("anomaly sender set before start");
        let mut position_rx = self.position_rx.take().expect("start called once");

        self.task = Some(tokio::spawn(async move {
            let mut last: Option<TimestampedPosition> = None;
            let mut consecutive: u32 = 0;

            while let Some(sample) = position_rx.recv().await {
                if let Some(prev) = last {
                    let dt = sample.time - prev.time;
                    if dt > 0.0 {
                        let dvy = (sample.position.y - prev.position.y) / dt;
                        let accel = (dvy / dt).abs();
                        if accel > ACCEL_THRESHOLD {
                            consecutive += 1;
                            if consecutive >= CONSECUTIVE_TRIGGER {
                                let _ = anomaly_tx
                                    .send(Anomaly { kind: AnomalyKind::FreeFall, time: sample.time })
                                    .await;
                                consecutive = 0;
                            }
                        } else {
                            consecutive = 0;
                        }
                    }
                }
                last = Some(sample);
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
    use crate::entities::Position;

    fn sample(t: f64, y: f64) -> TimestampedPosition {
        TimestampedPosition { position: Position { x: 0.0, y, z: 0.0 }, time: t }
    }

    // With Δt = 1s, a_y = (y - y_prev) / Δt^2 = y - y_prev, so a 10-unit
    // jump per step clears the 9.8 threshold and a 1-unit jump does not.

    #[tokio::test]
    async fn triggers_after_eleven_consecutive_high_accel_samples() {
        let (anomaly_tx, mut anomaly_rx) = mpsc::channel(1);
        let mut detector = FreeFallDetector::new();
        detector.set_anomaly_sender(anomaly_tx);
        detector.start().await;

        let sender = detector.position_sender();
        let mut y = 0.0;
        for t in 0..13 {
            y += 10.0;
            sender.send(sample(t as f64, y)).await.unwrap();
        }

        let anomaly = tokio::time::timeout(std::time::Duration::from_millis(200), anomaly_rx.recv())
            .await
            .expect("anomaly expected")
            .unwrap();
        assert_eq!(anomaly.kind, AnomalyKind::FreeFall);
        detector.shutdown().await;
    }

    #[tokio::test]
    async fn sub_threshold_sample_resets_the_streak() {
        let (anomaly_tx, mut anomaly_rx) = mpsc::channel(1);
        let mut detector = FreeFallDetector::new();
        detector.set_anomaly_sender(anomaly_tx);
        detector.start().await;

        let sender = detector.position_sender();
        let mut y = 0.0;
        let mut t = 0.0f64;
        // Ten high-accel samples, then one gentle sample, then ten more:
        // the gentle sample must clear the streak so the eleventh
        // consecutive high sample is never reached.
        for _ in 0..10 {
            t += 1.0;
            y += 10.0;
            sender.send(sample(t, y)).await.unwrap();
        }
        t += 1.0;
        y += 1.0;
        sender.send(sample(t, y)).await.unwrap();
        for _ in 0..10 {
            t += 1.0;
            y += 10.0;
            sender.send(sample(t, y)).await.unwrap();
        }

        let result = tokio::time::timeout(std::time::Duration::from_millis(100), anomaly_rx.recv()).await;
        assert!(result.is_err(), "streak must have reset, so no 11th-consecutive trigger fires");
        detector.shutdown().await;
    }
}
