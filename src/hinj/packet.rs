//! C1: Packet Codec. Encode/decode the HIL wire framing:
//! `[type:1][total_length:4][payload:total_length-5]`, host byte order,
//! no padding.

use crate::entities::SensorType;
use crate::error::CodecError;
use serde::Serialize;
use std::io::{Read, Write};

const PREAMBLE_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsPacket {
    pub instance: u8,
    pub ignore: u8,
    pub time_micro_second: u64,
    pub fix_type: u8,
    pub latitude: i32,
    pub longitude: i32,
    pub altitude: i32,
    pub eph: u16,
    pub epv: u16,
    pub velocity: u16,
    pub velocity_north: i16,
    pub velocity_east: i16,
    pub velocity_down: i16,
    pub course_over_ground: u16,
    pub satellites_visible: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccelerometerPacket {
    pub instance: u8,
    pub ignore: u8,
    pub acceleration_x: f32,
    pub acceleration_y: f32,
    pub acceleration_z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GyroscopePacket {
    pub instance: u8,
    pub ignore: u8,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatteryPacket {
    pub voltage: f32,
    pub current: f32,
    pub throttle: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BarometerPacket {
    pub instance: u8,
    pub ignore: u8,
    pub pressure: f32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompassPacket {
    pub instance: u8,
    pub ignore: u8,
    pub mag0: f32,
    pub mag1: f32,
    pub mag2: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModePacket {
    pub mode: u32,
}

/// A decoded sensor packet. Dispatch on variant at both decode (sizing)
/// and mutation (ignore-field location) sites — this is a sum type, not
/// a pointer to a common base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Packet {
    Gps(GpsPacket),
    Accelerometer(AccelerometerPacket),
    Gyroscope(GyroscopePacket),
    Battery(BatteryPacket),
    Compass(CompassPacket),
    Barometer(BarometerPacket),
    Mode(ModePacket),
}

impl Packet {
    pub fn sensor_type(&self) -> SensorType {
        match self {
            Packet::Gps(_) => SensorType::Gps,
            Packet::Accelerometer(_) => SensorType::Accelerometer,
            Packet::Gyroscope(_) => SensorType::Gyroscope,
            Packet::Battery(_) => SensorType::Battery,
            Packet::Compass(_) => SensorType::Compass,
            Packet::Barometer(_) => SensorType::Barometer,
            Packet::Mode(_) => SensorType::Mode,
        }
    }

    /// `instance` field, if this variant carries one. `Battery` and
    /// `Mode` do not.
    pub fn instance(&self) -> Option<u8> {
        match self {
            Packet::Gps(p) => Some(p.instance),
            Packet::Accelerometer(p) => Some(p.instance),
            Packet::Gyroscope(p) => Some(p.instance),
            Packet::Compass(p) => Some(p.instance),
            Packet::Barometer(p) => Some(p.instance),
            Packet::Battery(_) | Packet::Mode(_) => None,
        }
    }

    /// Setting `ignore = 1` is the sole mutation the proxy performs.
    pub fn set_ignore(&mut self) {
        match self {
            Packet::Gps(p) => p.ignore = 1,
            Packet::Accelerometer(p) => p.ignore = 1,
            Packet::Gyroscope(p) => p.ignore = 1,
            Packet::Compass(p) => p.ignore = 1,
            Packet::Barometer(p) => p.ignore = 1,
            Packet::Battery(_) | Packet::Mode(_) => {}
        }
    }

    fn payload_size(&self) -> usize {
        match self {
            Packet::Gps(_) => 1 + 1 + 8 + 1 + 4 + 4 + 4 + 2 + 2 + 2 + 2 + 2 + 2 + 2 + 1,
            Packet::Accelerometer(_) => 1 + 1 + 4 + 4 + 4,
            Packet::Gyroscope(_) => 1 + 1 + 4 + 4 + 4,
            Packet::Battery(_) => 4 + 4 + 4,
            Packet::Compass(_) => 1 + 1 + 4 + 4 + 4,
            Packet::Barometer(_) => 1 + 1 + 4 + 4,
            Packet::Mode(_) => 4,
        }
    }

    pub fn encoded_length(&self) -> usize {
        self.payload_size() + PREAMBLE_SIZE
    }
}

struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    fn new(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }
    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }
    fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }
    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }
    fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_bits().to_ne_bytes());
    }
}

struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
    fn take(&mut self, n: usize) -> &'a [u8] {
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        slice
    }
    fn u8(&mut self) -> u8 {
        self.take(1)[0]
    }
    fn u16(&mut self) -> u16 {
        u16::from_ne_bytes(self.take(2).try_into().unwrap())
    }
    fn i16(&mut self) -> i16 {
        i16::from_ne_bytes(self.take(2).try_into().unwrap())
    }
    fn u32(&mut self) -> u32 {
        u32::from_ne_bytes(self.take(4).try_into().unwrap())
    }
    fn i32(&mut self) -> i32 {
        i32::from_ne_bytes(self.take(4).try_into().unwrap())
    }
    fn u64(&mut self) -> u64 {
        u64::from_ne_bytes(self.take(8).try_into().unwrap())
    }
    fn f32(&mut self) -> f32 {
        f32::from_bits(u32::from_ne_bytes(self.take(4).try_into().unwrap()))
    }
}

/// Read exactly one byte, then the 4-byte length, then exactly the
/// declared payload in one read call. Short reads are fatal for this
/// packet — the source must deliver the full payload in one read.
pub fn read_message<R: Read>(source: &mut R) -> Result<Packet, CodecError> {
    let mut type_byte = [0u8; 1];
    source.read_exact(&mut type_byte)?;
    let raw_type = type_byte[0];
    if raw_type > SensorType::MAX_ORDINAL {
        return Err(CodecError::UnknownType(raw_type));
    }
    let sensor_type = SensorType::from_ordinal(raw_type).expect("validated above");

    let mut len_bytes = [0u8; 4];
    source.read_exact(&mut len_bytes)?;
    let total_length = u32::from_ne_bytes(len_bytes) as usize;
    let expected = total_length.saturating_sub(PREAMBLE_SIZE);

    let mut payload = vec![0u8; expected];
    let got = source.read(&mut payload)?;
    if got != expected {
        return Err(CodecError::ShortRead { expected, got });
    }

    let mut r = FieldReader::new(&payload);
    Ok(match sensor_type {
        SensorType::Gps => Packet::Gps(GpsPacket {
            instance: r.u8(),
            ignore: r.u8(),
            time_micro_second: r.u64(),
            fix_type: r.u8(),
            latitude: r.i32(),
            longitude: r.i32(),
            altitude: r.i32(),
            eph: r.u16(),
            epv: r.u16(),
            velocity: r.u16(),
            velocity_north: r.i16(),
            velocity_east: r.i16(),
            velocity_down: r.i16(),
            course_over_ground: r.u16(),
            satellites_visible: r.u8(),
        }),
        SensorType::Accelerometer => Packet::Accelerometer(AccelerometerPacket {
            instance: r.u8(),
            ignore: r.u8(),
            acceleration_x: r.f32(),
            acceleration_y: r.f32(),
            acceleration_z: r.f32(),
        }),
        SensorType::Gyroscope => Packet::Gyroscope(GyroscopePacket {
            instance: r.u8(),
            ignore: r.u8(),
            x: r.f32(),
            y: r.f32(),
            z: r.f32(),
        }),
        SensorType::Battery => Packet::Battery(BatteryPacket {
            voltage: r.f32(),
            current: r.f32(),
            throttle: r.f32(),
        }),
        SensorType::Compass => Packet::Compass(CompassPacket {
            instance: r.u8(),
            ignore: r.u8(),
            mag0: r.f32(),
            mag1: r.f32(),
            mag2: r.f32(),
        }),
        SensorType::Barometer => Packet::Barometer(BarometerPacket {
            instance: r.u8(),
            ignore: r.u8(),
            pressure: r.f32(),
            temperature: r.f32(),
        }),
        SensorType::Mode => Packet::Mode(ModePacket { mode: r.u32() }),
        SensorType::SensorReading | SensorType::RcInputs | SensorType::Quaternion => {
            return Err(CodecError::UnsupportedForDecode(sensor_type))
        }
        SensorType::BadType => unreachable!("BadType is never a valid ordinal"),
    })
}

/// Write `[type:1][total_length=size+5:4][fields...]`.
pub fn write_message<W: Write>(sink: &mut W, packet: &Packet) -> Result<(), CodecError> {
    let mut w = FieldWriter::new(packet.payload_size());
    match packet {
        Packet::Gps(p) => {
            w.u8(p.instance);
            w.u8(p.ignore);
            w.u64(p.time_micro_second);
            w.u8(p.fix_type);
            w.i32(p.latitude);
            w.i32(p.longitude);
            w.i32(p.altitude);
            w.u16(p.eph);
            w.u16(p.epv);
            w.u16(p.velocity);
            w.i16(p.velocity_north);
            w.i16(p.velocity_east);
            w.i16(p.velocity_down);
            w.u16(p.course_over_ground);
            w.u8(p.satellites_visible);
        }
        Packet::Accelerometer(p) => {
            w.u8(p.instance);
            w.u8(p.ignore);
            w.f32(p.acceleration_x);
            w.f32(p.acceleration_y);
            w.f32(p.acceleration_z);
        }
        Packet::Gyroscope(p) => {
            w.u8(p.instance);
            w.u8(p.ignore);
            w.f32(p.x);
            w.f32(p.y);
            w.f32(p.z);
        }
        Packet::Battery(p) => {
            w.f32(p.voltage);
            w.f32(p.current);
            w.f32(p.throttle);
        }
        Packet::Compass(p) => {
            w.u8(p.instance);
            w.u8(p.ignore);
            w.f32(p.mag0);
            w.f32(p.mag1);
            w.f32(p.mag2);
        }
        Packet::Barometer(p) => {
            w.u8(p.instance);
            w.u8(p.ignore);
            w.f32(p.pressure);
            w.f32(p.temperature);
        }
        Packet::Mode(p) => {
            w.u32(p.mode);
        }
    }

    let total_length = (w.buf.len() + PREAMBLE_SIZE) as u32;
    sink.write_all(&[packet.sensor_type().ordinal()])?;
    sink.write_all(&total_length.to_ne_bytes())?;
    sink.write_all(&w.buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn gps_sample() -> Packet {
        Packet::Gps(GpsPacket {
            instance: 1,
            ignore: 0,
            time_micro_second: 123456,
            fix_type: 3,
            latitude: 400_000_000,
            longitude: -750_000_000,
            altitude: 1000,
            eph: 10,
            epv: 20,
            velocity: 5,
            velocity_north: -1,
            velocity_east: 2,
            velocity_down: 0,
            course_over_ground: 90,
            satellites_visible: 10,
        })
    }

    #[test]
    fn gps_round_trip() {
        let packet = gps_sample();
        let mut buf = Vec::new();
        write_message(&mut buf, &packet).unwrap();
        assert_eq!(buf.len(), packet.encoded_length());

        let mut cursor = Cursor::new(buf);
        let decoded = read_message(&mut cursor).unwrap();
        assert_eq!(decoded, packet);
        if let Packet::Gps(p) = decoded {
            assert_eq!(p.instance, 1);
            assert_eq!(p.satellites_visible, 10);
        } else {
            panic!("expected Gps variant");
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut cursor = Cursor::new(vec![0xFFu8]);
        let err = read_message(&mut cursor).unwrap_err();
        assert!(matches!(err, CodecError::UnknownType(0xFF)));
    }

    #[test]
    fn short_read_is_rejected() {
        // Declares a payload larger than what follows.
        let mut bytes = vec![SensorType::Mode.ordinal()];
        bytes.extend_from_slice(&20u32.to_ne_bytes());
        bytes.extend_from_slice(&[0u8; 2]); // way short of the declared 15 payload bytes
        let mut cursor = Cursor::new(bytes);
        let err = read_message(&mut cursor).unwrap_err();
        assert!(matches!(err, CodecError::ShortRead { .. }));
    }

    #[test]
    fn unsupported_types_fail_decode() {
        let mut bytes = vec![SensorType::SensorReading.ordinal()];
        bytes.extend_from_slice(&5u32.to_ne_bytes());
        let mut cursor = Cursor::new(bytes);
        let err = read_message(&mut cursor).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedForDecode(_)));
    }

    #[test]
    fn battery_and_mode_have_no_instance() {
        let battery = Packet::Battery(BatteryPacket { voltage: 1.0, current: 2.0, throttle: 0.5 });
        assert_eq!(battery.instance(), None);
        let mode = Packet::Mode(ModePacket { mode: 4 });
        assert_eq!(mode.instance(), None);
    }
}
