//! End-to-end over loopback UDP: bridge socket in, collector socket out.

mod common;

use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::Duration;

use common::*;
use hivegate_packet::encode_datagram;
use hivegate_runner::{CancelToken, Gateway, GatewayConfig, RouteConfig, SinkConfig, UdpSource};
use hivegate_sink::Schema;

fn collector() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind collector");
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("set timeout");
    socket
}

fn recv(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = [0u8; 1024];
    let n = socket.recv(&mut buf).expect("collector should receive");
    buf[..n].to_vec()
}

fn config_for(collector0: SocketAddr, collector1: SocketAddr) -> GatewayConfig {
    let udp = |destination| SinkConfig::Udp {
        destination,
        schema: Schema::Routed,
        send_close_on_shutdown: true,
        name: None,
    };
    GatewayConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        poll_timeout_ms: 50,
        routes: vec![
            RouteConfig {
                channel: 0,
                sink: udp(collector0),
            },
            RouteConfig {
                channel: 1,
                sink: udp(collector1),
            },
        ],
        ..GatewayConfig::default()
    }
}

#[test]
fn test_end_to_end_forwarding_and_shutdown() {
    let collector0 = collector();
    let collector1 = collector();
    let config = config_for(collector0.local_addr().unwrap(), collector1.local_addr().unwrap());

    let source = UdpSource::bind(config.listen, config.poll_timeout()).expect("bind source");
    let gateway_addr = source.local_addr().unwrap();
    let cancel = CancelToken::new();

    let token = cancel.clone();
    let handle = thread::spawn(move || {
        let mut gateway = Gateway::from_config(source, &config)
            .expect("gateway")
            .with_cancel_token(token);
        gateway.run().expect("run")
    });

    let bridge = UdpSocket::bind("127.0.0.1:0").unwrap();
    let datagram = encode_datagram(1, &bench_record());
    bridge.send_to(&datagram, gateway_addr).unwrap();

    let mut expected = BENCH_ROUTED_LINE.as_bytes().to_vec();
    expected.push(0);
    assert_eq!(recv(&collector1), expected);

    // Retransmission, garbage and a second device.
    bridge.send_to(&datagram, gateway_addr).unwrap();
    bridge.send_to(b"not a sensor datagram", gateway_addr).unwrap();
    bridge
        .send_to(&encode_datagram(0, &record_for(3, 1)), gateway_addr)
        .unwrap();

    let line = recv(&collector0);
    assert!(line.starts_with(b"write,00-03,"));
    assert_eq!(line.last(), Some(&0));

    cancel.cancel();
    let stats = handle.join().expect("gateway thread");
    assert_eq!(stats.received, 4);
    assert_eq!(stats.forwarded, 2);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.rejected, 1);

    // Nothing else was forwarded before the close command.
    assert_eq!(recv(&collector1), b"close");
    assert_eq!(recv(&collector0), b"close");
}

#[test]
fn test_idle_gateway_stops_within_poll_timeout() {
    let collector0 = collector();
    let collector1 = collector();
    let config = config_for(collector0.local_addr().unwrap(), collector1.local_addr().unwrap());
    let source = UdpSource::bind(config.listen, config.poll_timeout()).unwrap();

    let cancel = CancelToken::new();
    let token = cancel.clone();
    let handle = thread::spawn(move || {
        let mut gateway = Gateway::from_config(source, &config)
            .expect("gateway")
            .with_cancel_token(token);
        gateway.run().expect("run")
    });

    thread::sleep(Duration::from_millis(100));
    cancel.cancel();
    let stats = handle.join().expect("gateway thread");
    assert_eq!(stats.received, 0);
}
