//! Black-box exercise of the injection proxy over a real TCP connection,
//! through the crate's public API only.

use hilcheck::entities::SensorType;
use hilcheck::hinj::proxy::InjectionProxy;
use hilcheck::hinj::{read_message, write_message, Packet};
use hilcheck::hinj::packet::GyroscopePacket;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn gyro(instance: u8) -> Packet {
    Packet::Gyroscope(GyroscopePacket { instance, ignore: 0, x: 1.0, y: 2.0, z: 3.0 })
}

async fn round_trip(addr: &str, packet: &Packet) -> Packet {
    let mut buf = Vec::new();
    write_message(&mut buf, packet).unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&buf).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    read_message(&mut std::io::Cursor::new(response)).unwrap()
}

#[tokio::test]
async fn only_the_failed_instance_is_ignored_others_pass_through() {
    let mut proxy = InjectionProxy::new();
    let addr = "127.0.0.1:18281";
    proxy.start(addr).await.unwrap();
    proxy.fail_sensor(SensorType::Gyroscope, 1);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let untouched = round_trip(addr, &gyro(0)).await;
    match untouched {
        Packet::Gyroscope(p) => assert_eq!(p.ignore, 0),
        _ => panic!("expected Gyroscope"),
    }

    let failed = round_trip(addr, &gyro(1)).await;
    match failed {
        Packet::Gyroscope(p) => assert_eq!(p.ignore, 1),
        _ => panic!("expected Gyroscope"),
    }

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn restarting_without_reset_after_shutdown_is_rejected() {
    let mut proxy = InjectionProxy::new();
    proxy.start("127.0.0.1:18282").await.unwrap();
    proxy.shutdown().await.unwrap();

    assert!(proxy.start("127.0.0.1:18283").await.is_err());

    proxy.reset().unwrap();
    proxy.start("127.0.0.1:18284").await.unwrap();
    proxy.shutdown().await.unwrap();
}
