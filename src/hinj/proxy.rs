//! C2: Injection Proxy. Accepts one connection per sensor read, decodes a
//! packet, rewrites it per the fault table, forwards it back, and closes.

use crate::entities::{FaultTable, Instance, SensorFailure, SensorType};
use crate::error::ProxyError;
use crate::hinj::packet::{read_message, write_message, Packet};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyState {
    Fresh,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Default)]
struct ProxyStats {
    readings_per_kind: HashMap<SensorType, u64>,
}

struct LastReadings {
    by_kind: HashMap<SensorType, Packet>,
}

/// `Fresh -> Running <-> Accepting/Handling -> Stopping -> Stopped -> Fresh`.
/// Only `Fresh -> Running` and `Stopped -> Fresh` are legal re-entries.
pub struct InjectionProxy {
    state: ProxyState,
    fail_tx: Option<mpsc::UnboundedSender<SensorFailure>>,
    shutdown_tx: Option<mpsc::Sender<oneshot::Sender<()>>>,
    fault_table: Arc<Mutex<FaultTable>>,
    last_readings: Arc<Mutex<LastReadings>>,
    stats: Arc<Mutex<ProxyStats>>,
}

impl InjectionProxy {
    pub fn new() -> Self {
        Self {
            state: ProxyState::Fresh,
            fail_tx: None,
            shutdown_tx: None,
            fault_table: Arc::new(Mutex::new(FaultTable::new())),
            last_readings: Arc::new(Mutex::new(LastReadings { by_kind: HashMap::new() })),
            stats: Arc::new(Mutex::new(ProxyStats::default())),
        }
    }

    /// Idempotent mutator; lazily enqueues onto the single-writer channel
    /// that the work loop drains at the head of each iteration. Routing
    /// every fault update through this channel (rather than locking the
    /// table directly from callers) removes the race between hook B and
    /// concurrent `fail_sensor` calls.
    pub fn fail_sensor(&self, sensor_type: SensorType, instance: Instance) {
        if let Some(tx) = &self.fail_tx {
            let _ = tx.send(SensorFailure { sensor_type, instance });
        }
    }

    /// A cheap, cloneable handle onto the same single-writer channel, for
    /// callers (e.g. the orchestrator's failure-scheduling hook) that need
    /// to outlive a borrow of the proxy itself.
    pub fn fault_sender(&self) -> FaultSender {
        FaultSender { tx: self.fail_tx.clone() }
    }

    /// A cloneable read handle onto the most-recent reading per sensor
    /// kind, for the orchestrator's opportunistic trace-sampling hook.
    pub fn snapshot_reader(&self) -> SnapshotReader {
        SnapshotReader { last_readings: self.last_readings.clone() }
    }

    pub async fn start(&mut self, addr: &str) -> Result<(), ProxyError> {
        if self.state != ProxyState::Fresh {
            return Err(ProxyError::IllegalStateTransition);
        }
        let listener = TcpListener::bind(addr).await.map_err(ProxyError::Bind)?;

        let (fail_tx, mut fail_rx) = mpsc::unbounded_channel::<SensorFailure>();
        // Buffered shutdown channel: depth >= 1 so the sender never blocks
        // on a listener that is already gone.
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<oneshot::Sender<()>>(1);

        self.fail_tx = Some(fail_tx);
        self.shutdown_tx = Some(shutdown_tx);

        let fault_table = self.fault_table.clone();
        let last_readings = self.last_readings.clone();
        let stats = self.stats.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    ack = shutdown_rx.recv() => {
                        if let Some(ack_tx) = ack {
                            fault_table.lock().await.clear();
                            let _ = ack_tx.send(());
                        }
                        break;
                    }
                    accepted = listener.accept() => {
                        // Drain pending fault updates before servicing this
                        // connection — the sole writer to the table.
                        while let Ok(failure) = fail_rx.try_recv() {
                            fault_table.lock().await.fail_sensor(failure.sensor_type, failure.instance);
                        }
                        match accepted {
                            Ok((stream, _addr)) => {
                                if let Err(e) = handle_connection(stream, &fault_table, &last_readings, &stats).await {
                                    warn!("injection proxy connection error: {e}");
                                }
                            }
                            Err(e) => {
                                error!("injection proxy accept failed: {e}");
                            }
                        }
                    }
                }
            }
        });

        self.state = ProxyState::Running;
        Ok(())
    }

    /// Sets a buffered shutdown signal, waits for the work loop's ack
    /// (which clears the fault table), and settles in `Stopped`. Call
    /// `reset()` to make the proxy startable again.
    pub async fn shutdown(&mut self) -> Result<(), ProxyError> {
        if self.state != ProxyState::Running {
            return Err(ProxyError::IllegalStateTransition);
        }
        self.state = ProxyState::Stopping;
        if let Some(tx) = self.shutdown_tx.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            let _ = tx.send(ack_tx).await;
            let _ = ack_rx.await;
        }
        self.fail_tx = None;
        self.state = ProxyState::Stopped;
        Ok(())
    }

    /// `Stopped -> Fresh`, the only legal re-entry back to an unstarted
    /// proxy.
    pub fn reset(&mut self) -> Result<(), ProxyError> {
        if self.state != ProxyState::Stopped {
            return Err(ProxyError::IllegalStateTransition);
        }
        self.state = ProxyState::Fresh;
        Ok(())
    }
}

impl Default for InjectionProxy {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct FaultSender {
    tx: Option<mpsc::UnboundedSender<SensorFailure>>,
}

impl FaultSender {
    pub fn fail_sensor(&self, sensor_type: SensorType, instance: Instance) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(SensorFailure { sensor_type, instance });
        }
    }
}

#[derive(Clone)]
pub struct SnapshotReader {
    last_readings: Arc<Mutex<LastReadings>>,
}

impl SnapshotReader {
    pub async fn latest(&self, sensor_type: SensorType) -> Option<Packet> {
        self.last_readings.lock().await.by_kind.get(&sensor_type).copied()
    }

    pub async fn all(&self) -> HashMap<SensorType, Packet> {
        self.last_readings.lock().await.by_kind.clone()
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    fault_table: &Arc<Mutex<FaultTable>>,
    last_readings: &Arc<Mutex<LastReadings>>,
    stats: &Arc<Mutex<ProxyStats>>,
) -> Result<(), ProxyError> {
    // read_message/write_message operate on std::io::{Read, Write}; the
    // proxy only ever sees one packet per connection so a small buffered
    // adapter over the socket is enough.
    use std::io::Cursor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut header = [0u8; 5];
    stream.read_exact(&mut header).await?;
    let declared_len = u32::from_ne_bytes(header[1..5].try_into().unwrap()) as usize;
    let payload_len = declared_len.saturating_sub(5);
    let mut payload = vec![0u8; payload_len];
    stream.read_exact(&mut payload).await?;

    let mut full = Vec::with_capacity(5 + payload_len);
    full.extend_from_slice(&header);
    full.extend_from_slice(&payload);
    let mut cursor = Cursor::new(full);

    let decoded = read_message(&mut cursor);
    let mut packet = match decoded {
        Ok(p) => p,
        Err(e) => {
            debug!("proxy: failed to decode packet: {e}");
            return Ok(());
        }
    };

    let sensor_type = packet.sensor_type();
    {
        let mut s = stats.lock().await;
        *s.readings_per_kind.entry(sensor_type).or_insert(0) += 1;
    }
    {
        let mut snapshots = last_readings.lock().await;
        snapshots.by_kind.insert(sensor_type, packet);
    }

    if let Some(instance) = packet.instance() {
        let failed = fault_table.lock().await.is_failed(sensor_type, instance);
        if failed {
            packet.set_ignore();
        }
    }

    let mut out = Vec::new();
    write_message(&mut out, &packet).map_err(|e| ProxyError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    stream.write_all(&out).await?;
    Ok(())
}
