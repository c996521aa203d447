use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    capture_counter: Counter<u64>,
    prediction_duration: Histogram<u64>,
    feed_size: Gauge<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        // TODO: deprecated crate to be replaced with an OLTP exporter
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .unwrap();

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("rosto_capture");
        global::set_meter_provider(provider);

        let capture_counter = meter
            .u64_counter("captures_total")
            .with_description("Total number of capture attempts by outcome")
            .build();

        let boundaries = generate_boundaries((100, 500, 1000, 2000, 5000));

        let prediction_duration = meter
            .u64_histogram("prediction_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of prediction operations in milliseconds")
            .build();

        let feed_size = meter
            .u64_gauge("feed_size")
            .with_description("Number of entries in the prediction feed")
            .build();

        Metrics {
            capture_counter,
            prediction_duration,
            feed_size,
            registry,
        }
    }

    pub fn record_capture(&self, outcome: &str) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.capture_counter.add(1, &attributes);
    }

    pub fn record_prediction_duration(&self, duration_ms: u64) {
        self.prediction_duration.record(duration_ms, &[]);
    }

    pub fn record_feed_size(&self, size: u64) {
        self.feed_size.record(size, &[]);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 100;
    let middle_step: usize = 250;
    let end_step: usize = 500;
    let tail_step: usize = 1000;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_boundaries() {
        let parts = (0, 200, 500, 1500, 3500);
        let get = generate_boundaries(parts);
        let expected = vec![0.0, 100.0, 200.0, 450.0, 500.0, 1000.0, 1500.0, 2500.0, 3500.0];

        assert_eq!(get, expected);
    }
}
