/// Subset of the Prometheus remote-write protobuf messages (`prometheus.WriteRequest`).
pub mod prompb {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct WriteRequest {
        #[prost(message, repeated, tag = "1")]
        pub timeseries: Vec<TimeSeries>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct TimeSeries {
        #[prost(message, repeated, tag = "1")]
        pub labels: Vec<Label>,
        #[prost(message, repeated, tag = "2")]
        pub samples: Vec<Sample>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Label {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub value: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Sample {
        #[prost(double, tag = "1")]
        pub value: f64,
        #[prost(int64, tag = "2")]
        pub timestamp: i64,
    }
}

use chrono::Utc;
use prompb::{Label, Sample, TimeSeries, WriteRequest};
use reqwest::{
    Client, StatusCode,
    header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderValue, InvalidHeaderValue},
};
use snap::raw::Encoder;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("failed to compress write request")]
    Compress(#[from] snap::Error),

    #[error("invalid tenant id")]
    TenantId(#[from] InvalidHeaderValue),

    #[error("failed to reach Mimir")]
    Http(#[from] reqwest::Error),

    #[error("Mimir rejected the push: {status} - {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Sends Prometheus metrics to a Mimir remote write endpoint.
///
/// # Arguments
///
/// * `mimir_endpoint` - The base URL of the Mimir instance (e.g., "http://localhost:9009").
/// * `tenant_id` - An optional tenant ID, sent as `X-Scope-OrgID`.
/// * `metrics` - The `TimeSeries` to send.
pub async fn send_to_mimir(
    mimir_endpoint: &str,
    tenant_id: Option<&str>,
    metrics: Vec<TimeSeries>,
) -> Result<(), PushError> {
    if metrics.is_empty() {
        log::warn!("No metrics to send.");
        return Ok(());
    }

    let write_request = WriteRequest { timeseries: metrics };
    let buf = prost::Message::encode_to_vec(&write_request);

    let mut encoder = Encoder::new();
    let compressed_data = encoder.compress_vec(&buf)?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_ENCODING, HeaderValue::from_static("snappy"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/x-protobuf"));
    headers.insert(
        "X-Prometheus-Remote-Write-Version",
        HeaderValue::from_static("0.1.0"),
    );
    if let Some(id) = tenant_id {
        headers.insert("X-Scope-OrgID", HeaderValue::from_str(id)?);
    }

    let response = Client::new()
        .post(format!("{}/api/v1/push", mimir_endpoint.trim_end_matches('/')))
        .headers(headers)
        .body(compressed_data)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(PushError::Rejected { status, body });
    }
    Ok(())
}

/// Creates a `TimeSeries` with one sample.
///
/// `labels` are added after the `__name__` label; `timestamp_ms` defaults to now.
pub fn create_time_series(
    metric_name: &str,
    labels: &[(&str, &str)],
    value: f64,
    timestamp_ms: Option<i64>,
) -> TimeSeries {
    let mut all_labels = Vec::with_capacity(labels.len() + 1);
    all_labels.push(Label {
        name: "__name__".to_string(),
        value: metric_name.to_string(),
    });

    for (name, val) in labels {
        all_labels.push(Label {
            name: name.to_string(),
            value: val.to_string(),
        });
    }

    let sample = Sample {
        value,
        timestamp: timestamp_ms.unwrap_or_else(|| Utc::now().timestamp_millis()),
    };

    TimeSeries {
        labels: all_labels,
        samples: vec![sample],
    }
}
