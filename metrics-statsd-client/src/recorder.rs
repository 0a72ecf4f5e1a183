use std::sync::Arc;

use metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};

use crate::{
    client::StatsdClient,
    metric::{MetricType, MetricValue},
};

/// A recorder that sends [`metrics`] macro calls through a StatsD client.
///
/// Nothing is aggregated: every counter increment, gauge update, and histogram sample becomes a line of its own, sent
/// through the client. Labels are converted to tags, as `key:value`, or as the bare key when the value is empty.
pub struct StatsdRecorder {
    client: StatsdClient,
}

impl StatsdRecorder {
    pub(crate) fn new(client: StatsdClient) -> Self {
        StatsdRecorder { client }
    }

    /// Returns the client backing this recorder.
    pub fn client(&self) -> &StatsdClient {
        &self.client
    }

    fn handle(&self, key: &Key) -> Arc<Handle> {
        let tags = key
            .labels()
            .map(|label| {
                if label.value().is_empty() {
                    label.key().to_string()
                } else {
                    format!("{}:{}", label.key(), label.value())
                }
            })
            .collect();

        Arc::new(Handle { client: self.client.clone(), name: key.name().to_string(), tags })
    }
}

impl Recorder for StatsdRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        Counter::from_arc(self.handle(key))
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(self.handle(key))
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(self.handle(key))
    }
}

struct Handle {
    client: StatsdClient,
    name: String,
    tags: Vec<String>,
}

impl Handle {
    fn send(&self, value: MetricValue, metric_type: MetricType) {
        self.client
            .metric(self.name.as_str(), value, metric_type)
            .with_tags(self.tags.iter().cloned())
            .send_with(|_| {});
    }
}

/// Renders a relative gauge update, which StatsD expects as an explicitly signed value.
fn gauge_delta(delta: f64) -> MetricValue {
    let sign = if delta.is_sign_negative() { '-' } else { '+' };
    let mut value = String::with_capacity(24);
    value.push(sign);
    value.push_str(ryu::Buffer::new().format(delta.abs()));
    MetricValue::Text(value)
}

impl CounterFn for Handle {
    fn increment(&self, value: u64) {
        self.send(value.into(), MetricType::Counter);
    }

    fn absolute(&self, value: u64) {
        self.send(value.into(), MetricType::Gauge);
    }
}

impl GaugeFn for Handle {
    fn increment(&self, value: f64) {
        self.send(gauge_delta(value), MetricType::Gauge);
    }

    fn decrement(&self, value: f64) {
        self.send(gauge_delta(-value), MetricType::Gauge);
    }

    fn set(&self, value: f64) {
        self.send(value.into(), MetricType::Gauge);
    }
}

impl HistogramFn for Handle {
    fn record(&self, value: f64) {
        self.send(value.into(), MetricType::Histogram);
    }
}
