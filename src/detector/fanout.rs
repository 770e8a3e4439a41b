use super::{Detector, POSITION_CHANNEL_CAPACITY};
use crate::entities::{Anomaly, TimestampedPosition};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Owns a set of detectors and the single `anomaly_out` channel they all
/// share. On `start`, assigns the shared anomaly sender to each child and
/// starts each child, then runs a task that serially forwards every
/// incoming position to every child's position channel in order —
/// deliberately serial and deliberately rendezvous, so a slow detector
/// throttles the whole fan-out rather than being silently skipped.
pub struct DetectorProxy {
    detectors: Vec<Box<dyn Detector>>,
    position_tx: mpsc::Sender<TimestampedPosition>,
    position_rx: Option<mpsc::Receiver<TimestampedPosition>>,
    shutdown_tx: Option<mpsc::Sender<oneshot::Sender<()>>>,
    task: Option<JoinHandle<()>>,
}

impl DetectorProxy {
    /// `anomaly_out` capacity must be >= `detectors.len()` so children
    /// never block when multiple fire concurrently.
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        let (position_tx, position_rx) = mpsc::channel(POSITION_CHANNEL_CAPACITY);
        Self {
            detectors,
            position_tx,
            position_rx: Some(position_rx),
            shutdown_tx: None,
            task: None,
        }
    }

    pub fn position_sender(&self) -> mpsc::Sender<TimestampedPosition> {
        self.position_tx.clone()
    }

    pub async fn start(&mut self, anomaly_out: mpsc::Sender<Anomaly>) {
        assert!(
            anomaly_out.capacity() >= self.detectors.len() || self.detectors.is_empty(),
            "anomaly_out capacity must be >= number of detectors"
        );

        for detector in &mut self.detectors {
            detector.set_anomaly_sender(anomaly_out.clone());
            detector.start().await;
        }

        let senders: Vec<_> = self.detectors.iter().map(|d| d.position_sender()).collect();
        let mut position_rx = self.position_rx.take().expect("start called once");
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<oneshot::Sender<()>>(1);
        self.shutdown_tx = Some(shutdown_tx);

        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    ack = shutdown_rx.recv() => {
                        if let Some(ack_tx) = ack {
                            let _ = ack_tx.send(());
                        }
                        break;
                    }
                    sample = position_rx.recv() => {
                        match sample {
                            Some(position) => {
                                for sender in &senders {
                                    // Serial, rendezvous forward: backpressure
                                    // from any one child propagates here.
                                    let _ = sender.send(position).await;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        }));
    }

    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            let _ = tx.send(ack_tx).await;
            let _ = ack_rx.await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        for detector in &mut self.detectors {
            detector.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::TimeoutDetector;
    use crate::entities::Position;
    use std::time::Duration;

    #[tokio::test]
    async fn forwards_positions_to_every_child_in_registration_order() {
        let (anomaly_tx, _anomaly_rx) = mpsc::channel(4);
        let detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(TimeoutDetector::new(Duration::from_secs(5))),
            Box::new(TimeoutDetector::new(Duration::from_secs(5))),
        ];
        let mut proxy = DetectorProxy::new(detectors);
        proxy.start(anomaly_tx).await;

        let sender = proxy.position_sender();
        sender
            .send(TimestampedPosition { position: Position { x: 1.0, y: 2.0, z: 3.0 }, time: 0.0 })
            .await
            .unwrap();

        proxy.shutdown().await;
    }
}
