//! Integration tests for the send pipeline.
//!
//! Exercises the complete flow: script text → line framing → packet
//! synthesis → paced UDP transmission on the data/control port pair.

use std::time::Duration;

use rtp_script_common::rtcp::Wallclock;
use rtp_script_common::Metrics;
use sender::{parse_line, Channel, Pacer, ScriptReader, Target, UdpPair};

fn test_clock() -> Wallclock {
    // ---
    Wallclock {
        secs: 1_700_000_000,
        micros: 0,
    }
}

/// Binds two receivers on adjacent ports so a `UdpPair` aimed at the
/// lower port lands data and control on separate sockets.
async fn bind_adjacent_pair() -> (tokio::net::UdpSocket, tokio::net::UdpSocket, u16) {
    // ---
    for port in (20000u16..21000).step_by(2) {
        let data = tokio::net::UdpSocket::bind(("127.0.0.1", port)).await;
        let control = tokio::net::UdpSocket::bind(("127.0.0.1", port + 1)).await;
        if let (Ok(data), Ok(control)) = (data, control) {
            return (data, control, port);
        }
    }
    panic!("no adjacent UDP port pair available");
}

#[test]
fn rtp_line_produces_reference_bytes() {
    // ---
    let pkt = parse_line(
        "0.0 RTP v=2 p=0 x=0 cc=0 m=0 pt=96 seq=1 ts=0 ssrc=0x11223344 data=AA",
        test_clock(),
    )
    .expect("parse failed");

    assert_eq!(pkt.channel, Channel::Data);
    assert_eq!(pkt.time, Duration::ZERO);
    assert_eq!(
        pkt.payload,
        vec![0x80, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x11, 0x22, 0x33, 0x44, 0xaa]
    );
}

#[test]
fn rtcp_line_produces_reference_bytes() {
    // ---
    let pkt = parse_line("0.0 RTCP (BYE (ssrc=0x1))", test_clock()).expect("parse failed");
    assert_eq!(pkt.channel, Channel::Control);
    assert_eq!(
        pkt.payload,
        vec![0x81, 0xcb, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01]
    );
}

#[test]
fn sdes_scenario_bytes() {
    // ---
    let pkt = parse_line(r#"0.0 RTCP (SDES (src=0xA cname="x"))"#, test_clock())
        .expect("parse failed");
    assert_eq!(pkt.payload.len(), 16);
    assert_eq!(pkt.payload[3], 3); // length field in words - 1
    assert_eq!(pkt.payload.len() % 4, 0);
}

#[test]
fn spec_example_script_parses_completely() {
    // ---
    let script = "\
0.000000 RTP v=2 p=0 x=0 cc=0 m=0 pt=0 seq=1 ts=0 ssrc=0xdeadbeef
0.020000 RTP pt=0 seq=2 ts=160 ssrc=0xdeadbeef
0.100000 RTCP (SDES (src=0xdeadbeef cname=\"alice@host\"))
5.000000 RTCP (BYE (ssrc=0xdeadbeef))
";
    let mut reader = ScriptReader::from_text(script);
    let mut times = Vec::new();
    while let Some(line) = reader.next_logical().expect("framing failed") {
        let pkt = parse_line(&line, test_clock()).expect("parse failed");
        if pkt.channel == Channel::Control {
            assert_eq!(pkt.payload.len() % 4, 0);
        }
        times.push(pkt.time);
    }
    assert_eq!(
        times,
        vec![
            Duration::ZERO,
            Duration::from_millis(20),
            Duration::from_millis(100),
            Duration::from_secs(5),
        ]
    );
}

#[tokio::test]
async fn pacer_delivers_in_script_order_on_both_ports() {
    // ---
    let (rx_data, rx_control, port) = bind_adjacent_pair().await;

    // The third line moves backwards in time: it must still be sent, in
    // file order, immediately after the second.
    let script = "\
# pacing test
0.000000 RTP pt=8 seq=1
0.010000 RTP pt=8 seq=2
0.005000 RTP pt=8 seq=3
0.020000 RTCP (BYE (ssrc=0x1))
";
    let reader = ScriptReader::from_text(script);
    let target = Target::parse(&format!("127.0.0.1/{port}")).expect("target parse failed");
    let net = UdpPair::connect(&target, None, false)
        .await
        .expect("connect failed");
    let metrics = Metrics::new().expect("metrics failed");

    let stats = Pacer::new(reader, net, metrics, false, false)
        .run()
        .await
        .expect("pacer failed");
    assert_eq!(stats.rtp_packets, 3);
    assert_eq!(stats.rtcp_packets, 1);

    let mut buf = [0u8; 1500];
    for expected_seq in [1u16, 2, 3] {
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), rx_data.recv_from(&mut buf))
            .await
            .expect("timed out waiting for RTP packet")
            .expect("recv failed");
        assert_eq!(n, 12);
        assert_eq!(buf[1], 8); // payload type carried through
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), expected_seq);
    }

    let (n, _) = tokio::time::timeout(Duration::from_secs(2), rx_control.recv_from(&mut buf))
        .await
        .expect("timed out waiting for RTCP packet")
        .expect("recv failed");
    assert_eq!(&buf[..n], &[0x81, 0xcb, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01]);
}

#[tokio::test]
async fn pacing_respects_script_gaps() {
    // ---
    let (rx_data, _rx_control, port) = bind_adjacent_pair().await;

    let script = "\
0.000000 RTP seq=1
0.080000 RTP seq=2
";
    let reader = ScriptReader::from_text(script);
    let target = Target::parse(&format!("127.0.0.1/{port}")).expect("target parse failed");
    let net = UdpPair::connect(&target, None, false)
        .await
        .expect("connect failed");
    let metrics = Metrics::new().expect("metrics failed");

    let started = std::time::Instant::now();
    Pacer::new(reader, net, metrics, false, false)
        .run()
        .await
        .expect("pacer failed");
    let elapsed = started.elapsed();

    // The second packet is held for the scripted 80ms gap. Allow slack
    // for timer granularity but reject immediate emission.
    assert!(elapsed >= Duration::from_millis(70), "finished in {elapsed:?}");

    let mut buf = [0u8; 64];
    let (_, _) = rx_data.recv_from(&mut buf).await.expect("first packet");
    let (_, _) = rx_data.recv_from(&mut buf).await.expect("second packet");
}

#[test]
fn protocol_errors_surface_from_full_lines() {
    // ---
    use rtp_script_common::ProtocolError;

    let err = parse_line("0.0 RTCP (SR ssrc=1 nonsense=2)", test_clock()).unwrap_err();
    match err.downcast_ref::<ProtocolError>() {
        Some(ProtocolError::UnknownField { record, field }) => {
            assert_eq!(*record, "SR");
            assert_eq!(field, "nonsense");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
