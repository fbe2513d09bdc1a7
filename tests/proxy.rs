//! End-to-end proxy scenarios
//!
//! Each test starts a full proxy on ephemeral localhost ports and drives
//! it with the crate's own publisher and subscriber clients.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::timeout;

use packet_proxy::client::{Publisher, Subscriber};
use packet_proxy::config::{Config, DuplicateDetectorConfig};
use packet_proxy::wire::StatusCode;
use packet_proxy::{DataType, Error, Packet, Proxy, ProxyMetrics, StreamIdentifier};

/// Wait this long for a packet that should arrive
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait this long for a packet that should NOT arrive
const SILENCE_TIMEOUT: Duration = Duration::from_millis(300);

fn test_config() -> Config {
    let mut config = Config::default();
    // Ephemeral ports so tests can run in parallel
    config.frontend.host = "127.0.0.1".to_string();
    config.frontend.port = 0;
    config.backend.host = "127.0.0.1".to_string();
    config.backend.port = 0;
    config
}

async fn start_proxy(config: Config) -> (Proxy, String, String) {
    let metrics = Arc::new(ProxyMetrics::new());
    let mut proxy = Proxy::new(config, metrics).expect("proxy construction");
    proxy.start().await.expect("proxy start");

    let frontend = proxy.frontend_addr().unwrap().to_string();
    let backend = proxy.backend_addr().unwrap().to_string();
    (proxy, frontend, backend)
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros() as i64
}

/// Generate a burst of sequential packets the way field publishers do:
/// 100 Hz, 200-300 samples each, contiguous start times.
fn generate_packets(count: usize) -> Vec<Packet> {
    let mut rng = StdRng::seed_from_u64(23_883_823);
    let sampling_rate = 100.0;
    let mut start = now_micros() - 10_000_000;
    let mut sample = 0i32;

    (0..count)
        .map(|_| {
            let number_of_samples = rng.gen_range(200..=300);
            let mut data = Vec::with_capacity(number_of_samples * 4);
            for _ in 0..number_of_samples {
                data.extend_from_slice(&sample.to_le_bytes());
                sample += 1;
            }

            let packet = Packet {
                identifier: StreamIdentifier::new("UU", "CWU", "HHZ", "01"),
                start_time_micros: start,
                sampling_rate,
                number_of_samples: number_of_samples as u32,
                data_type: DataType::Integer32,
                data: Bytes::from(data),
            };
            start += (number_of_samples as f64 / sampling_rate * 1e6).round() as i64;
            packet
        })
        .collect()
}

async fn expect_packet(subscriber: &mut Subscriber) -> Packet {
    timeout(RECEIVE_TIMEOUT, subscriber.next())
        .await
        .expect("timed out waiting for packet")
        .expect("subscribe stream failed")
        .expect("stream ended early")
}

async fn expect_silence(subscriber: &mut Subscriber) {
    let result = timeout(SILENCE_TIMEOUT, subscriber.next()).await;
    assert!(result.is_err(), "expected no packet, got {result:?}");
}

#[tokio::test]
async fn test_happy_path_delivers_all_packets_in_order() {
    let (mut proxy, frontend, backend) = start_proxy(test_config()).await;

    let mut subscriber = Subscriber::connect(&backend, None).await.unwrap();
    // Let the reactor register before packets start flowing
    tokio::time::sleep(Duration::from_millis(100)).await;

    let packets = generate_packets(5);
    let mut publisher = Publisher::connect(&frontend, None).await.unwrap();
    for packet in &packets {
        publisher.send(packet).await.unwrap();
    }
    let summary = publisher.finish().await.unwrap();
    assert_eq!(summary.total_packets, 5);
    assert_eq!(summary.packets_rejected, 0);

    for expected in &packets {
        let received = expect_packet(&mut subscriber).await;
        assert_eq!(received.start_time_micros, expected.start_time_micros);
        assert_eq!(received.number_of_samples, expected.number_of_samples);
        assert_eq!(received.data, expected.data);
        assert_eq!(received.identifier.to_string(), "UU.CWU.HHZ.01");
    }

    proxy.stop().await;
}

#[tokio::test]
async fn test_invalid_packets_kick_publisher() {
    let mut config = test_config();
    config.frontend.maximum_number_of_consecutive_invalid_messages = 3;
    let (mut proxy, frontend, backend) = start_proxy(config).await;

    let mut subscriber = Subscriber::connect(&backend, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut bad = generate_packets(1).remove(0);
    bad.number_of_samples = 0;

    let mut publisher = Publisher::connect(&frontend, None).await.unwrap();
    let mut rpc_error = None;
    for _ in 0..4 {
        if let Err(e) = publisher.send(&bad).await {
            rpc_error = Some(e);
            break;
        }
        // Pace the sends so the kick lands between them
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let error = match rpc_error {
        Some(error) => error,
        None => {
            // Give the terminal status time to land in the receive buffer
            tokio::time::sleep(Duration::from_millis(50)).await;
            publisher.finish().await.unwrap_err()
        }
    };
    match error {
        Error::Rpc { status, .. } => assert_eq!(status, StatusCode::InvalidArgument),
        other => panic!("expected rpc error, got {other}"),
    }

    // Nothing invalid reaches a subscriber
    expect_silence(&mut subscriber).await;

    proxy.stop().await;
}

#[tokio::test]
async fn test_identifiers_are_normalized() {
    let (mut proxy, frontend, backend) = start_proxy(test_config()).await;

    let mut subscriber = Subscriber::connect(&backend, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut packet = generate_packets(1).remove(0);
    packet.identifier = StreamIdentifier::new("  uu ", "cwu", "hhz", "");

    let mut publisher = Publisher::connect(&frontend, None).await.unwrap();
    publisher.send(&packet).await.unwrap();
    let summary = publisher.finish().await.unwrap();
    assert_eq!(summary.total_packets, 1);
    assert_eq!(summary.packets_rejected, 0);

    let received = expect_packet(&mut subscriber).await;
    assert_eq!(received.identifier.network, "UU");
    assert_eq!(received.identifier.station, "CWU");
    assert_eq!(received.identifier.channel, "HHZ");
    assert_eq!(received.identifier.location_code, "--");

    proxy.stop().await;
}

#[tokio::test]
async fn test_slow_subscriber_keeps_most_recent_packets() {
    let mut config = test_config();
    config.backend.queue_capacity = 4;
    // A long poll interval stands in for a subscriber that sleeps before
    // reading: the packets pile up in its registry queue meanwhile.
    config.backend.poll_interval_milliseconds = 1000;
    let (mut proxy, frontend, backend) = start_proxy(config).await;

    let mut subscriber = Subscriber::connect(&backend, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let packets = generate_packets(10);
    let mut publisher = Publisher::connect(&frontend, None).await.unwrap();
    for packet in &packets {
        publisher.send(packet).await.unwrap();
    }
    publisher.finish().await.unwrap();

    // Only the four most recent packets survive the overflow
    for expected in &packets[6..] {
        let received = expect_packet(&mut subscriber).await;
        assert_eq!(received.start_time_micros, expected.start_time_micros);
    }
    expect_silence(&mut subscriber).await;

    proxy.stop().await;
}

#[tokio::test]
async fn test_subscriber_cap_rejects_excess_subscribers() {
    let mut config = test_config();
    config.backend.maximum_number_of_subscribers = 2;
    let (mut proxy, frontend, backend) = start_proxy(config).await;

    let mut subscribers = Vec::new();
    for _ in 0..3 {
        subscribers.push(Subscriber::connect(&backend, None).await.unwrap());
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let packet = generate_packets(1).remove(0);
    let mut publisher = Publisher::connect(&frontend, None).await.unwrap();
    publisher.send(&packet).await.unwrap();
    publisher.finish().await.unwrap();

    // Exactly one of the three is turned away; the others stream normally
    let mut rejected = 0;
    let mut served = 0;
    for mut subscriber in subscribers {
        match timeout(RECEIVE_TIMEOUT, subscriber.next()).await {
            Ok(Err(Error::Rpc { status, .. })) => {
                assert_eq!(status, StatusCode::ResourceExhausted);
                rejected += 1;
            }
            Ok(Ok(Some(received))) => {
                assert_eq!(received.start_time_micros, packet.start_time_micros);
                served += 1;
            }
            other => panic!("unexpected subscriber outcome: {other:?}"),
        }
    }
    assert_eq!(rejected, 1);
    assert_eq!(served, 2);

    proxy.stop().await;
}

#[tokio::test]
async fn test_publisher_cap_rejects_excess_publishers() {
    let mut config = test_config();
    config.frontend.maximum_number_of_publishers = 1;
    let (mut proxy, frontend, _backend) = start_proxy(config).await;

    let packets = generate_packets(2);

    // First publisher holds the only slot
    let mut first = Publisher::connect(&frontend, None).await.unwrap();
    first.send(&packets[0]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = Publisher::connect(&frontend, None).await.unwrap();
    match second.finish().await {
        Err(Error::Rpc { status, .. }) => assert_eq!(status, StatusCode::ResourceExhausted),
        other => panic!("expected resource exhausted, got {other:?}"),
    }

    // Once the slot frees up, a new publisher is admitted
    first.finish().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut third = Publisher::connect(&frontend, None).await.unwrap();
    third.send(&packets[1]).await.unwrap();
    let summary = third.finish().await.unwrap();
    assert_eq!(summary.total_packets, 1);

    proxy.stop().await;
}

#[tokio::test]
async fn test_duplicate_packets_are_dropped() {
    let mut config = test_config();
    config.duplicate_detector = Some(DuplicateDetectorConfig {
        circular_buffer_size: Some(8),
        circular_buffer_duration: None,
    });
    let (mut proxy, frontend, backend) = start_proxy(config).await;

    let mut subscriber = Subscriber::connect(&backend, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let packet = generate_packets(1).remove(0);
    let mut publisher = Publisher::connect(&frontend, None).await.unwrap();
    publisher.send(&packet).await.unwrap();
    publisher.send(&packet).await.unwrap();
    let summary = publisher.finish().await.unwrap();

    // The retransmit counts as received but not as rejected
    assert_eq!(summary.total_packets, 2);
    assert_eq!(summary.packets_rejected, 0);

    let received = expect_packet(&mut subscriber).await;
    assert_eq!(received.start_time_micros, packet.start_time_micros);
    expect_silence(&mut subscriber).await;

    proxy.stop().await;
}

#[tokio::test]
async fn test_shutdown_finishes_subscribers_cleanly() {
    let (mut proxy, _frontend, backend) = start_proxy(test_config()).await;

    let mut subscriber = Subscriber::connect(&backend, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    proxy.stop().await;

    // The subscriber sees a clean end of stream, and the registry is empty
    let finished = timeout(RECEIVE_TIMEOUT, subscriber.next())
        .await
        .expect("timed out waiting for shutdown status")
        .expect("subscribe stream failed");
    assert!(finished.is_none());
    assert_eq!(proxy.registry().count(), 0);
}

#[tokio::test]
async fn test_cancelled_subscriber_releases_its_slot() {
    let mut config = test_config();
    config.backend.maximum_number_of_subscribers = 1;
    let (mut proxy, frontend, backend) = start_proxy(config).await;

    let subscriber = Subscriber::connect(&backend, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    subscriber.cancel().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The slot is free again for a new subscriber
    let mut replacement = Subscriber::connect(&backend, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let packet = generate_packets(1).remove(0);
    let mut publisher = Publisher::connect(&frontend, None).await.unwrap();
    publisher.send(&packet).await.unwrap();
    publisher.finish().await.unwrap();

    let received = expect_packet(&mut replacement).await;
    assert_eq!(received.start_time_micros, packet.start_time_micros);

    proxy.stop().await;
}
