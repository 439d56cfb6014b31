//! Sink tests against a mock time-series endpoint

mod common;

use chrono::NaiveDate;
use common::RecordingWriter;
use statpipe_ingest::error::SinkError;
use statpipe_ingest::sink::influx::SinkCredentials;
use statpipe_ingest::sink::InfluxWriter;
use statpipe_ingest::{NormalizedRecord, Sink, SinkOptions, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{body_string, body_string_contains, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn credentials() -> SinkCredentials {
    SinkCredentials {
        token: "secret".to_string(),
        org: "ops".to_string(),
        bucket: "metrics".to_string(),
    }
}

fn record(minute: u32, reads: f64) -> NormalizedRecord {
    NormalizedRecord {
        datetime: NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, minute, 0)
            .unwrap(),
        values: vec![("reads".to_string(), Value::Float(reads))],
        customer: "host1".to_string(),
        server: "srv1".to_string(),
        measurement: "buffer_k".to_string(),
        digits: 16,
    }
}

fn writer_for(server: &MockServer) -> InfluxWriter {
    InfluxWriter::new(&server.uri(), credentials(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_influx_writer_posts_line_protocol() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .and(query_param("org", "ops"))
        .and(query_param("bucket", "metrics"))
        .and(query_param("precision", "s"))
        .and(header("authorization", "Token secret"))
        .and(body_string_contains(
            "buffer_k,customer=host1,pagesize=16,server=srv1 reads=1.5 1704067200",
        ))
        .and(body_string_contains("customer_server "))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Sink::new(Arc::new(writer_for(&server)), SinkOptions::default());
    let written = sink
        .write(&[record(0, 1.5)], "to_ingest/a.csv", "host1", "srv1")
        .await
        .unwrap();

    assert_eq!(written, 2);
}

#[tokio::test]
async fn test_influx_writer_surfaces_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized access"))
        .mount(&server)
        .await;

    let sink = Sink::new(Arc::new(writer_for(&server)), SinkOptions::default());
    let result = sink
        .write(&[record(0, 1.5)], "to_ingest/a.csv", "host1", "srv1")
        .await;

    match result {
        Err(SinkError::Rejected { status, body }) => {
            assert_eq!(status, 401);
            assert_eq!(body, "unauthorized access");
        },
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_batch_is_not_sent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string(""))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    // A record whose only value is null produces no point at all
    let mut empty = record(0, 0.0);
    empty.values = vec![("reads".to_string(), Value::Null)];

    let sink = Sink::new(Arc::new(writer_for(&server)), SinkOptions::default());
    let written = sink
        .write(&[empty], "", "host1", "srv1")
        .await
        .unwrap();
    assert_eq!(written, 0);
}

#[tokio::test]
async fn test_sink_splits_batches() {
    let writer = RecordingWriter::new();
    let sink = Sink::new(
        writer.clone(),
        SinkOptions {
            batch_size: 2,
            flush_interval: Duration::from_secs(3600),
        },
    );

    let records: Vec<NormalizedRecord> = (0..4).map(|m| record(m, m as f64)).collect();
    let written = sink
        .write(&records, "to_ingest/a.csv", "host1", "srv1")
        .await
        .unwrap();

    // summary + 4 records, released as 2 + 2 + 1
    assert_eq!(written, 5);
    let sizes: Vec<usize> = writer.batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(writer.points()[0].measurement, "customer_server");
}
