use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub match_latency_seconds: HistogramVec,
    pub active_deliveries: IntGauge,
    pub rider_load_on_assign: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "transitions_total",
                "Delivery lifecycle operations by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid transitions_total metric");

        let match_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "match_latency_seconds",
                "Latency of nearest-rider matching in seconds",
            ),
            &["outcome"],
        )
        .expect("valid match_latency_seconds metric");

        let active_deliveries = IntGauge::new(
            "active_deliveries",
            "Deliveries currently assigned, picked up or in transit",
        )
        .expect("valid active_deliveries metric");

        let rider_load_on_assign = Histogram::with_opts(
            HistogramOpts::new(
                "rider_load_on_assign",
                "Rider active load right after taking an assignment",
            )
            .buckets(vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0]),
        )
        .expect("valid rider_load_on_assign metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("register match_latency_seconds");
        registry
            .register(Box::new(active_deliveries.clone()))
            .expect("register active_deliveries");
        registry
            .register(Box::new(rider_load_on_assign.clone()))
            .expect("register rider_load_on_assign");

        Self {
            registry,
            transitions_total,
            match_latency_seconds,
            active_deliveries,
            rider_load_on_assign,
        }
    }

    pub fn record_transition(&self, operation: &str, ok: bool) {
        let outcome = if ok { "success" } else { "error" };
        self.transitions_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
