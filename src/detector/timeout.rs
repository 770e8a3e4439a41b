use super::{Detector, POSITION_CHANNEL_CAPACITY};
use crate::entities::{Anomaly, AnomalyKind, TimestampedPosition};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Arms a single timer on start; on expiry emits `Timeout`. Ignores
/// position input entirely.
pub struct TimeoutDetector {
    duration: Duration,
    position_tx: mpsc::Sender<TimestampedPosition>,
    position_rx: Option<mpsc::Receiver<TimestampedPosition>>,
    anomaly_tx: Option<mpsc::Sender<Anomaly>>,
    task: Option<JoinHandle<()>>,
}

impl TimeoutDetector {
    pub fn new(duration: Duration) -> Self {
        let (position_tx, position_rx) = mpsc::channel(POSITION_CHANNEL_CAPACITY);
        Self {
            duration,
            position_tx,
            position_rx: Some(position_rx),
            anomaly_tx: None,
            task: None,
        }
    }
}

#[async_trait]
impl Detector for TimeoutDetector {
    fn position_sender(&self) -> mpsc::Sender<TimestampedPosition> {
        self.position_tx.clone()
    }

    fn set_anomaly_sender(&mut self, tx: mpsc::Sender<Anomaly>) {
        self.anomaly_tx = Some(tx);
    }

    async fn start(&mut self) {
        let duration = self.duration;
        let anomaly_tx = self.anomaly_tx.clone().expect("anomaly sender set before start");
        // Drop the receiver end so position sends do not pile up against a
        // detector that never reads them.
        let mut position_rx = self.position_rx.take().expect("start called once");

        self.task = Some(tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    let _ = anomaly_tx.send(Anomaly { kind: AnomalyKind::Timeout, time: duration.as_secs_f64() }).await;
                }
                _ = drain_forever(&mut position_rx) => {}
            }
        }));
    }

    async fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn drain_forever(rx: &mut mpsc::Receiver<TimestampedPosition>) {
    while rx.recv().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_timeout_after_duration() {
        let (anomaly_tx, mut anomaly_rx) = mpsc::channel(1);
        let mut detector = TimeoutDetector::new(Duration::from_millis(10));
        detector.set_anomaly_sender(anomaly_tx);
        detector.start().await;

        let anomaly = anomaly_rx.recv().await.unwrap();
        assert_eq!(anomaly.kind, AnomalyKind::Timeout);
        detector.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_timer() {
        let (anomaly_tx, mut anomaly_rx) = mpsc::channel(1);
        let mut detector = TimeoutDetector::new(Duration::from_secs(5));
        detector.set_anomaly_sender(anomaly_tx);
        detector.start().await;
        detector.shutdown().await;

        let result = tokio::time::timeout(Duration::from_millis(50), anomaly_rx.recv()).await;
        assert!(result.is_err(), "no anomaly should arrive after shutdown cancels the timer");
    }
}
