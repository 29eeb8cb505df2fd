//! Prometheus metrics: HTTP request counters plus domain counters for
//! logins, denials, evictions and revocations.

use prometheus::{CounterVec, Encoder, IntCounter, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub struct Metrics {
    pub registry: Registry,
    pub http_requests_total: CounterVec,
    pub logins_total: CounterVec,
    pub authz_denials_total: IntCounter,
    pub session_evictions_total: CounterVec,
    pub revocations_total: IntCounter,
}

impl Metrics {
    fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let logins_total = CounterVec::new(
            Opts::new("logins_total", "Login attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(logins_total.clone()))?;

        let authz_denials_total = IntCounter::new(
            "authz_denials_total",
            "Requests denied by the authorization gate",
        )?;
        registry.register(Box::new(authz_denials_total.clone()))?;

        let session_evictions_total = CounterVec::new(
            Opts::new("session_evictions_total", "Sessions evicted by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(session_evictions_total.clone()))?;

        let revocations_total = IntCounter::new(
            "revocations_total",
            "Entries written to the revocation index",
        )?;
        registry.register(Box::new(revocations_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            logins_total,
            authz_denials_total,
            session_evictions_total,
            revocations_total,
        })
    }
}

pub fn init_metrics() {
    if METRICS.get().is_none() {
        match Metrics::new() {
            Ok(metrics) => {
                let _ = METRICS.set(metrics);
            }
            Err(e) => tracing::error!(error = %e, "failed to initialize metrics"),
        }
    }
}

fn get() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Text-format exposition of every registered metric.
pub fn render() -> String {
    let Some(metrics) = get() else {
        return String::new();
    };
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&metrics.registry.gather(), &mut buf) {
        tracing::error!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

pub fn observe_http(method: &str, path: &str, status: u16) {
    if let Some(m) = get() {
        m.http_requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
    }
}

pub fn record_login(outcome: &str) {
    if let Some(m) = get() {
        m.logins_total.with_label_values(&[outcome]).inc();
    }
}

pub fn record_denial() {
    if let Some(m) = get() {
        m.authz_denials_total.inc();
    }
}

pub fn record_eviction(reason: &str) {
    if let Some(m) = get() {
        m.session_evictions_total.with_label_values(&[reason]).inc();
    }
}

pub fn record_revocation() {
    if let Some(m) = get() {
        m.revocations_total.inc();
    }
}
