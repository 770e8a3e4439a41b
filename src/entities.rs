//! Core data model: sensor types, positions, anomalies, failure plans.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Closed enum of sensor packet kinds. Wire encoding is the ordinal as a
/// single byte; `BadType` is never written, only produced by a failed decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorType {
    Gps,
    SensorReading,
    RcInputs,
    Quaternion,
    Accelerometer,
    Gyroscope,
    Battery,
    Compass,
    Barometer,
    Mode,
    BadType,
}

impl SensorType {
    pub const MAX_ORDINAL: u8 = 9;

    pub fn from_ordinal(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Gps),
            1 => Some(Self::SensorReading),
            2 => Some(Self::RcInputs),
            3 => Some(Self::Quaternion),
            4 => Some(Self::Accelerometer),
            5 => Some(Self::Gyroscope),
            6 => Some(Self::Battery),
            7 => Some(Self::Compass),
            8 => Some(Self::Barometer),
            9 => Some(Self::Mode),
            _ => None,
        }
    }

    pub fn ordinal(self) -> u8 {
        match self {
            Self::Gps => 0,
            Self::SensorReading => 1,
            Self::RcInputs => 2,
            Self::Quaternion => 3,
            Self::Accelerometer => 4,
            Self::Gyroscope => 5,
            Self::Battery => 6,
            Self::Compass => 7,
            Self::Barometer => 8,
            Self::Mode => 9,
            Self::BadType => 0xFF,
        }
    }

    /// The five physical sensor classes that participate in failure plans.
    pub const FAILABLE: [SensorType; 5] = [
        SensorType::Gps,
        SensorType::Accelerometer,
        SensorType::Compass,
        SensorType::Gyroscope,
        SensorType::Barometer,
    ];
}

pub type Instance = u8;

/// Every physical sensor class has exactly three instances.
pub const INSTANCES_PER_SENSOR: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimestampedPosition {
    pub position: Position,
    /// The simulator's virtual clock, not wall-clock system time.
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyKind {
    Unknown,
    FreeFall,
    ProgramFault,
    Timeout,
    Deviation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub time: f64,
}

/// `(sensor_type, instance)`. Within one plan no two failures may share
/// both fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorFailure {
    pub sensor_type: SensorType,
    pub instance: Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduledFailure {
    pub failure: SensorFailure,
    pub failure_time: u64,
}

/// Ordered multiset of `(SensorFailure, failure_time)`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailurePlan {
    pub entries: Vec<ScheduledFailure>,
}

impl FailurePlan {
    pub fn new(entries: Vec<ScheduledFailure>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry's `failure_time` advanced by one simulator iteration.
    pub fn time_shifted(&self) -> FailurePlan {
        FailurePlan::new(
            self.entries
                .iter()
                .map(|e| ScheduledFailure {
                    failure: e.failure,
                    failure_time: e.failure_time + 1,
                })
                .collect(),
        )
    }

    /// Stable, order-sensitive 64-bit digest over the ordered
    /// `(type, instance, failure_time)` sequence. Deterministic within a
    /// process and across runs of the same binary.
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for entry in &self.entries {
            entry.failure.sensor_type.hash(&mut hasher);
            entry.failure.instance.hash(&mut hasher);
            entry.failure_time.hash(&mut hasher);
        }
        hasher.finish()
    }

    pub fn distinct_sensor_kinds(&self) -> Vec<SensorType> {
        let mut kinds = Vec::new();
        for entry in &self.entries {
            if !kinds.contains(&entry.failure.sensor_type) {
                kinds.push(entry.failure.sensor_type);
            }
        }
        kinds
    }
}

/// `SensorType -> (Instance -> bool)`. Starts empty; entries are only ever
/// set to true, never cleared mid-run.
#[derive(Debug, Clone, Default)]
pub struct FaultTable {
    inner: std::collections::HashMap<SensorType, std::collections::HashMap<Instance, bool>>,
}

impl FaultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; lazily creates the inner map for `sensor_type`.
    pub fn fail_sensor(&mut self, sensor_type: SensorType, instance: Instance) {
        self.inner
            .entry(sensor_type)
            .or_default()
            .insert(instance, true);
    }

    pub fn is_failed(&self, sensor_type: SensorType, instance: Instance) -> bool {
        self.inner
            .get(&sensor_type)
            .and_then(|m| m.get(&instance))
            .copied()
            .unwrap_or(false)
    }

    /// Reset between runs; the proxy itself is reused.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

/// Counters keyed by the sensor kinds a plan touched. Monotonic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_unsafe: u64,
    pub unsafe_with_gps: u64,
    pub unsafe_with_baro: u64,
    pub unsafe_with_accel: u64,
    pub unsafe_with_compass: u64,
    pub unsafe_with_gyro: u64,
}

impl Statistics {
    /// For each unsafe plan, bump `total_unsafe` and one counter per
    /// distinct sensor kind actually present in the plan.
    pub fn record_unsafe(&mut self, plan: &FailurePlan) {
        self.total_unsafe += 1;
        for kind in plan.distinct_sensor_kinds() {
            match kind {
                SensorType::Gps => self.unsafe_with_gps += 1,
                SensorType::Barometer => self.unsafe_with_baro += 1,
                SensorType::Accelerometer => self.unsafe_with_accel += 1,
                SensorType::Compass => self.unsafe_with_compass += 1,
                SensorType::Gyroscope => self.unsafe_with_gyro += 1,
                _ => {}
            }
        }
    }
}

/// Ordered sequence of iteration counts at which a mode-change RPC arrived.
pub type ObservedModes = Vec<u64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_hash_is_order_sensitive_and_deterministic() {
        let a = FailurePlan::new(vec![
            ScheduledFailure {
                failure: SensorFailure { sensor_type: SensorType::Gps, instance: 0 },
                failure_time: 100,
            },
            ScheduledFailure {
                failure: SensorFailure { sensor_type: SensorType::Gps, instance: 1 },
                failure_time: 100,
            },
        ]);
        let b = a.clone();
        assert_eq!(a.structural_hash(), b.structural_hash());
    }

    #[test]
    fn time_shift_advances_every_entry() {
        let plan = FailurePlan::new(vec![ScheduledFailure {
            failure: SensorFailure { sensor_type: SensorType::Gyroscope, instance: 2 },
            failure_time: 5,
        }]);
        let shifted = plan.time_shifted();
        assert_eq!(shifted.entries[0].failure_time, 6);
    }

    #[test]
    fn fault_table_set_is_idempotent_and_never_clears_mid_run() {
        let mut table = FaultTable::new();
        assert!(!table.is_failed(SensorType::Gps, 1));
        table.fail_sensor(SensorType::Gps, 1);
        table.fail_sensor(SensorType::Gps, 1);
        assert!(table.is_failed(SensorType::Gps, 1));
        assert!(!table.is_failed(SensorType::Gps, 0));
    }

    #[test]
    fn statistics_counts_one_per_distinct_kind_present() {
        let mut stats = Statistics::default();
        let plan = FailurePlan::new(vec![
            ScheduledFailure {
                failure: SensorFailure { sensor_type: SensorType::Barometer, instance: 0 },
                failure_time: 10,
            },
            ScheduledFailure {
                failure: SensorFailure { sensor_type: SensorType::Barometer, instance: 1 },
                failure_time: 10,
            },
        ]);
        stats.record_unsafe(&plan);
        assert_eq!(stats.total_unsafe, 1);
        assert_eq!(stats.unsafe_with_baro, 1);
        assert_eq!(stats.unsafe_with_accel, 0);
    }
}
