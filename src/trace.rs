//! Persisted state (§6): counterexample plans, mode logs, and opportunistic
//! sensor traces, all written as JSON under an `--output` directory.

use crate::entities::{FailurePlan, SensorType};
use crate::hinj::Packet;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

/// One file per unsafe run, named by the wall-clock second it was written,
/// containing the plan that triggered the anomaly.
pub async fn write_counterexample(output_dir: &Path, plan: &FailurePlan) -> io::Result<()> {
    tokio::fs::create_dir_all(output_dir).await?;
    let unix_seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let path = output_dir.join(unix_seconds.to_string());
    let body = serde_json::to_vec_pretty(&plan.entries)?;
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(&body).await?;
    Ok(())
}

/// Sensor traces are JSON dictionaries keyed by iteration count, one
/// object per sample, appended across a run into a single file per sensor
/// kind present in `readings`.
pub async fn write_sensor_sample(
    output_dir: &Path,
    iteration: u64,
    readings: &HashMap<SensorType, Packet>,
) -> io::Result<()> {
    tokio::fs::create_dir_all(output_dir).await?;
    for (sensor_type, packet) in readings {
        let path = output_dir.join(format!("{}.jsonl", sensor_type_filename(*sensor_type)));
        let mut line = serde_json::to_vec(&SensorSample { iteration, packet })?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(&line).await?;
    }
    Ok(())
}

/// Overwritten per run: the full sequence of iteration counts at which a
/// mode-change control event was received.
pub async fn write_mode_log(output_dir: &Path, modes: &[u64]) -> io::Result<()> {
    tokio::fs::create_dir_all(output_dir).await?;
    let path = output_dir.join("modes.json");
    let body = serde_json::to_vec_pretty(modes)?;
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(&body).await?;
    Ok(())
}

fn sensor_type_filename(sensor_type: SensorType) -> &'static str {
    match sensor_type {
        SensorType::Gps => "gps",
        SensorType::SensorReading => "sensor_reading",
        SensorType::RcInputs => "rc_inputs",
        SensorType::Quaternion => "quaternion",
        SensorType::Accelerometer => "accel",
        SensorType::Gyroscope => "gyro",
        SensorType::Battery => "battery",
        SensorType::Compass => "compass",
        SensorType::Barometer => "barometer",
        SensorType::Mode => "mode",
        SensorType::BadType => "bad_type",
    }
}

#[derive(serde::Serialize)]
struct SensorSample<'a> {
    iteration: u64,
    packet: &'a Packet,
}
