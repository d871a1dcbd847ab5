//! Integration tests for dockwatch-core
//!
//! The feed tests run [`GbfsClient`] against a minimal HTTP server on a
//! loopback port, so no external network access is needed:
//! `cargo test --package dockwatch-core --test integration`

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use dockwatch_core::{
    AggregatorOptions, DailyAggregator, Error, FeedOptions, FetchError, GbfsClient, MemoryStore,
    MockFeed, RetryConfig, SnapshotLog, StationFeed, ZeroBikeTracker, build_report, with_retry,
};
use time::macros::{date, datetime};

const STATUS_V2: &str = r#"{
  "last_updated": 1714557600,
  "ttl": 60,
  "data": {
    "stations": [
      {"station_id": "1", "num_bikes_available": 4, "num_docks_available": 6,
       "is_renting": 1, "is_returning": 1, "last_reported": 1714557590},
      {"station_id": "2", "num_bikes_available": 0, "num_docks_available": 10,
       "is_renting": true, "is_returning": true, "last_reported": 1714557500},
      {"station_id": "3", "num_bikes_available": 2, "num_docks_available": 0,
       "is_renting": 0, "is_returning": 0, "last_reported": 1714500000}
    ]
  }
}"#;

const INFORMATION_V2: &str = r#"{
  "data": {
    "stations": [
      {"station_id": "1", "name": "Harbour", "capacity": 10},
      {"station_id": "2", "name": "Station Road", "capacity": 10}
    ]
  }
}"#;

/// Serve `respond(path, request_number)` over HTTP/1.1 on a loopback port.
async fn serve<F>(respond: F) -> String
where
    F: Fn(&str, u32) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        for n in 0u32.. {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let respond = Arc::clone(&respond);

            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let mut read = 0;
                while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => return,
                        Ok(len) => read += len,
                    }
                }
                let request = String::from_utf8_lossy(&buf[..read]);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                let (status, body) = (*respond)(&path, n);
                let response = format!(
                    "HTTP/1.1 {status} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

fn options(base: &str) -> FeedOptions {
    FeedOptions {
        station_status_url: format!("{base}/station_status.json"),
        station_information_url: None,
        timeout: Duration::from_secs(5),
        min_fetch_interval: Duration::ZERO,
        include_inactive: false,
    }
}

#[tokio::test]
async fn test_fetch_station_status_over_http() {
    let base = serve(|path, _| match path {
        "/station_status.json" => (200, STATUS_V2.to_string()),
        "/station_information.json" => (200, INFORMATION_V2.to_string()),
        _ => (404, String::new()),
    })
    .await;

    let mut opts = options(&base);
    opts.station_information_url = Some(format!("{base}/station_information.json"));
    let client = GbfsClient::new(opts).unwrap();

    let stations = client.fetch_station_status().await.unwrap();
    // Station 3 is not renting
    assert_eq!(stations.len(), 2);
    assert!(stations.iter().all(|s| s.timestamp == stations[0].timestamp));
    assert_eq!(stations[0].timestamp.nanosecond(), 0);

    let harbour = stations.iter().find(|s| s.station_id == "1").unwrap();
    assert_eq!(harbour.name.as_deref(), Some("Harbour"));
    assert_eq!(harbour.capacity, Some(10));
    assert_eq!(harbour.bikes_available, 4);
    assert_eq!(
        harbour.last_reported,
        Some(datetime!(2024-05-01 09:59:50 UTC))
    );
}

#[tokio::test]
async fn test_include_inactive_keeps_all_stations() {
    let base = serve(|_, _| (200, STATUS_V2.to_string())).await;
    let mut opts = options(&base);
    opts.include_inactive = true;

    let client = GbfsClient::new(opts).unwrap();
    let stations = client.fetch_station_status().await.unwrap();
    assert_eq!(stations.len(), 3);
    assert!(stations.iter().any(|s| !s.is_renting));
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let base = serve(|_, _| (503, "unavailable".to_string())).await;
    let client = GbfsClient::new(options(&base)).unwrap();

    match client.fetch_station_status().await {
        Err(Error::Fetch(err @ FetchError::Status { status: 503, .. })) => {
            assert!(err.is_retryable());
        }
        other => panic!("expected HTTP 503, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retry_recovers_from_transient_error() {
    let base = serve(|_, n| {
        if n == 0 {
            (502, String::new())
        } else {
            (200, STATUS_V2.to_string())
        }
    })
    .await;
    let client = GbfsClient::new(options(&base)).unwrap();
    let retry = RetryConfig::new(2)
        .initial_delay(Duration::from_millis(10))
        .jitter(false);

    let stations = with_retry(&retry, "fetch_station_status", || {
        client.fetch_station_status()
    })
    .await
    .unwrap();
    assert_eq!(stations.len(), 2);
}

#[tokio::test]
async fn test_malformed_body_is_not_retryable() {
    let base = serve(|_, _| (200, "<html>maintenance</html>".to_string())).await;
    let client = GbfsClient::new(options(&base)).unwrap();

    match client.fetch_station_status().await {
        Err(Error::Fetch(err @ FetchError::Decode { .. })) => assert!(!err.is_retryable()),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_station_list_is_rejected() {
    let base = serve(|_, _| (200, r#"{"data": {"stations": []}}"#.to_string())).await;
    let client = GbfsClient::new(options(&base)).unwrap();

    let err = client.fetch_station_status().await.unwrap_err();
    assert!(matches!(err, Error::Fetch(FetchError::EmptyFeed)));
}

/// Feed -> snapshot log -> tracker -> aggregator -> report, all in memory.
#[tokio::test]
async fn test_pipeline_from_feed_to_report() {
    let feed = MockFeed::new();
    for (ts, a, b) in [
        (datetime!(2024-05-01 10:00 UTC), 5, 0),
        (datetime!(2024-05-01 10:05 UTC), 0, 0),
        (datetime!(2024-05-01 10:15 UTC), 0, 1),
        (datetime!(2024-05-01 10:20 UTC), 3, 1),
    ] {
        feed.push_response(vec![MockFeed::station("A", a, ts), MockFeed::station("B", b, ts)]);
    }

    let store = MemoryStore::new();
    let mut tracker = ZeroBikeTracker::new(0);
    for _ in 0..4 {
        for record in feed.fetch_station_status().await.unwrap() {
            let snapshot = record.to_snapshot();
            assert!(store.append_snapshot(&snapshot).unwrap());
            tracker.process(&store, &snapshot).unwrap();
        }
    }
    assert_eq!(tracker.open_count(), 0);

    let aggregator = DailyAggregator::new(&store, AggregatorOptions::default());
    let summary = aggregator
        .aggregate_all_at(date!(2024-05-01), datetime!(2024-05-02 00:00 UTC))
        .unwrap();
    assert_eq!(summary.stations_processed, 2);

    let report = build_report(&store, date!(2024-05-01), 5).unwrap();
    let summary = report.summary.unwrap();
    assert_eq!(summary.total_stations, 2);
    assert_eq!(summary.stations_with_zero_periods, 2);
    // A: 10:05-10:20, B: 10:00-10:15
    assert!((summary.total_zero_bike_hours - 0.5).abs() < 1e-9);
}
