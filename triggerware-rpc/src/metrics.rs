//! Transport metrics
//!
//! Instruments are created on the global meter, so they export wherever
//! `init_observability` pointed the meter provider (and are no-ops when it
//! was never called).
//!
//! - `triggerware.client.connection.state` (gauge, see `ConnectionState::as_metric`)
//! - `triggerware.client.calls.total` (counter by method and status)
//! - `triggerware.client.call.duration` (histogram, seconds)
//! - `triggerware.client.notifications.sent` (counter by method)
//! - `triggerware.client.inbound.total` (counter by method and kind)
//! - `triggerware.client.errors.total` (counter by error type)

use crate::ConnectionState;
use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

pub struct ClientMetrics {
    pub connection_state: Gauge<i64>,
    pub calls_total: Counter<u64>,
    pub call_duration: Histogram<f64>,
    pub notifications_sent: Counter<u64>,
    pub inbound_total: Counter<u64>,
    pub errors_total: Counter<u64>,
}

impl ClientMetrics {
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("triggerware.client.connection.state")
                .with_description("Connection state (0=disconnected, 1=connected, 2=closed)")
                .build(),
            calls_total: meter
                .u64_counter("triggerware.client.calls.total")
                .with_description("Outbound calls settled, by method and status")
                .build(),
            call_duration: meter
                .f64_histogram("triggerware.client.call.duration")
                .with_description("Time from sending a call to settling it, in seconds")
                .build(),
            notifications_sent: meter
                .u64_counter("triggerware.client.notifications.sent")
                .with_description("Outbound notifications written")
                .build(),
            inbound_total: meter
                .u64_counter("triggerware.client.inbound.total")
                .with_description("Inbound method invocations, by method and kind")
                .build(),
            errors_total: meter
                .u64_counter("triggerware.client.errors.total")
                .with_description("Transport and decode errors")
                .build(),
        }
    }

    pub fn update_connection_state(&self, state: ConnectionState) {
        self.connection_state.record(state.as_metric(), &[]);
    }

    pub fn record_call(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.calls_total.add(1, attributes);
        self.call_duration.record(duration_secs, attributes);
    }

    pub fn record_notification(&self, method: &str) {
        self.notifications_sent
            .add(1, &[KeyValue::new("method", method.to_string())]);
    }

    /// `kind` is "request" or "notification"
    pub fn record_inbound(&self, method: &str, kind: &'static str) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("kind", kind),
        ];
        self.inbound_total.add(1, attributes);
    }

    pub fn record_error(&self, error_type: &'static str) {
        self.errors_total
            .add(1, &[KeyValue::new("error_type", error_type)]);
    }
}
