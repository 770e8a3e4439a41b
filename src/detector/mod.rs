//! C3: Detectors. Concurrent consumers of timestamped positions that raise
//! typed anomalies. Concrete detectors share only this contract, never
//! implementation — no common base, no inheritance chain.

pub mod deviant;
pub mod fanout;
pub mod freefall;
pub mod position;
pub mod timeout;

pub use deviant::DeviantDetector;
pub use fanout::DetectorProxy;
pub use freefall::FreeFallDetector;
pub use position::{PositionRecorder, PositionRecorderHandle};
pub use timeout::TimeoutDetector;

use crate::entities::{Anomaly, TimestampedPosition};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Rendezvous-ish position channel capacity. Tokio has no true zero-capacity
/// channel; capacity 1 means a sender completes once the single slot is
/// free, which is the closest available approximation to the spec's
/// synchronous hand-off — a slow detector still throttles the fan-out one
/// position behind rather than letting an unbounded queue build up.
pub const POSITION_CHANNEL_CAPACITY: usize = 1;

#[async_trait]
pub trait Detector: Send {
    /// Handle the fan-out writes timestamped positions into. Detectors
    /// that ignore position input (TimeoutDetector) still return a live
    /// sender; nothing reads from the other end.
    fn position_sender(&self) -> mpsc::Sender<TimestampedPosition>;

    /// Wired by the fan-out before `start()`.
    fn set_anomaly_sender(&mut self, tx: mpsc::Sender<Anomaly>);

    async fn start(&mut self);

    async fn shutdown(&mut self);
}
