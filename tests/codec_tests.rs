//! Black-box exercise of the wire codec through the crate's public API
//! only — no access to codec internals.

use hilcheck::hinj::packet::{read_message, write_message, BarometerPacket, GpsPacket, ModePacket, Packet};
use proptest::prelude::*;
use std::io::Cursor;

#[test]
fn mode_packet_decodes_the_exact_bytes_a_real_sender_would_put_on_the_wire() {
    // type=Mode, total_length=9 (5 preamble + 4 payload), mode=7, host-endian.
    let mut bytes = vec![Packet::Mode(ModePacket { mode: 0 }).sensor_type().ordinal()];
    bytes.extend_from_slice(&9u32.to_ne_bytes());
    bytes.extend_from_slice(&7u32.to_ne_bytes());

    let mut cursor = Cursor::new(bytes);
    let decoded = read_message(&mut cursor).unwrap();
    match decoded {
        Packet::Mode(p) => assert_eq!(p.mode, 7),
        _ => panic!("expected a Mode packet"),
    }
}

#[test]
fn barometer_packet_round_trips_and_ignore_mutation_only_touches_that_field() {
    let mut packet = Packet::Barometer(BarometerPacket { instance: 2, ignore: 0, pressure: 1013.25, temperature: 21.5 });

    let mut buf = Vec::new();
    write_message(&mut buf, &packet).unwrap();
    assert_eq!(buf.len(), packet.encoded_length());

    packet.set_ignore();
    let mut ignored_buf = Vec::new();
    write_message(&mut ignored_buf, &packet).unwrap();

    let mut cursor = Cursor::new(ignored_buf);
    let decoded = read_message(&mut cursor).unwrap();
    match decoded {
        Packet::Barometer(p) => {
            assert_eq!(p.ignore, 1);
            assert_eq!(p.instance, 2);
            assert_eq!(p.pressure, 1013.25);
            assert_eq!(p.temperature, 21.5);
        }
        _ => panic!("expected a Barometer packet"),
    }
}

#[test]
fn truncated_preamble_is_an_io_error_not_a_panic() {
    let mut cursor = Cursor::new(vec![0u8; 2]);
    assert!(read_message(&mut cursor).is_err());
}

proptest! {
    // decode(encode(v)) == v for arbitrary GPS field assignments, and the
    // wire length always matches payload_size + preamble.
    #[test]
    fn gps_packet_round_trips_for_arbitrary_field_values(
        instance in any::<u8>(),
        fix_type in any::<u8>(),
        latitude in any::<i32>(),
        longitude in any::<i32>(),
        altitude in any::<i32>(),
        satellites_visible in any::<u8>(),
    ) {
        let packet = Packet::Gps(GpsPacket {
            instance,
            ignore: 0,
            time_micro_second: 0,
            fix_type,
            latitude,
            longitude,
            altitude,
            eph: 0,
            epv: 0,
            velocity: 0,
            velocity_north: 0,
            velocity_east: 0,
            velocity_down: 0,
            course_over_ground: 0,
            satellites_visible,
        });

        let mut buf = Vec::new();
        write_message(&mut buf, &packet).unwrap();
        prop_assert_eq!(buf.len(), packet.encoded_length());

        let decoded = read_message(&mut Cursor::new(buf)).unwrap();
        prop_assert_eq!(decoded, packet);
    }
}
