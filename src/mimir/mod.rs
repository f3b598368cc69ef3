use chrono::Utc;
use client::prompb;
use log::debug;
use prometheus::proto::{Histogram, MetricType};

use crate::metrics::MetricsRegistry;

pub mod client;

const JOB_LABEL: &str = "job";
const NETSONDE_JOB: &str = "netsonde";

/// Converts every gathered metric into remote-write `TimeSeries`.
///
/// Histograms are expanded into cumulative `_bucket`, `_sum` and `_count`
/// series. All series share one timestamp and carry a `job="netsonde"` label
/// in addition to their own labels.
pub fn create_registry_metrics(registry: &MetricsRegistry) -> Vec<prompb::TimeSeries> {
    let timestamp = Utc::now().timestamp_millis();
    let mut series = Vec::new();

    for family in registry.gather() {
        let name = family.get_name();
        for metric in family.get_metric() {
            let mut labels: Vec<(&str, &str)> = vec![(JOB_LABEL, NETSONDE_JOB)];
            labels.extend(metric.get_label().iter().map(|l| (l.get_name(), l.get_value())));

            match family.get_field_type() {
                MetricType::COUNTER => series.push(client::create_time_series(
                    name,
                    &labels,
                    metric.get_counter().get_value(),
                    Some(timestamp),
                )),
                MetricType::HISTOGRAM => {
                    push_histogram(&mut series, name, &labels, metric.get_histogram(), timestamp)
                }
                other => debug!("Skipping {} of type {:?}", name, other),
            }
        }
    }

    series
}

fn push_histogram(
    series: &mut Vec<prompb::TimeSeries>,
    name: &str,
    labels: &[(&str, &str)],
    histogram: &Histogram,
    timestamp: i64,
) {
    let bucket_name = format!("{name}_bucket");
    let bucket = |le: &str, count: u64| {
        let mut with_le = labels.to_vec();
        with_le.push(("le", le));
        client::create_time_series(&bucket_name, &with_le, count as f64, Some(timestamp))
    };

    for b in histogram.get_bucket() {
        series.push(bucket(&b.get_upper_bound().to_string(), b.get_cumulative_count()));
    }
    series.push(bucket("+Inf", histogram.get_sample_count()));
    series.push(client::create_time_series(
        &format!("{name}_sum"),
        labels,
        histogram.get_sample_sum(),
        Some(timestamp),
    ));
    series.push(client::create_time_series(
        &format!("{name}_count"),
        labels,
        histogram.get_sample_count() as f64,
        Some(timestamp),
    ));
}
