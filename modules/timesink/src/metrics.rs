use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    pub events_ingested_total: IntCounterVec,
    pub owner_holes_total: IntCounterVec,
    pub query_duration_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_ingested_total = IntCounterVec::new(
            Opts::new("timesink_events_ingested_total", "Events received for recording"),
            &["result"], // stored|invalid|storage_error
        )?;

        let owner_holes_total = IntCounterVec::new(
            Opts::new(
                "timesink_owner_holes_total",
                "Owner references that could not be resolved",
            ),
            &["reason"], // not_found|error|depth
        )?;

        let query_duration_seconds = HistogramVec::new(
            HistogramOpts::new("timesink_query_duration_seconds", "Query duration seconds"),
            &["operation"],
        )?;

        registry.register(Box::new(events_ingested_total.clone()))?;
        registry.register(Box::new(owner_holes_total.clone()))?;
        registry.register(Box::new(query_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            events_ingested_total,
            owner_holes_total,
            query_duration_seconds,
        })
    }

    pub fn record_ingest(&self, result: &str) {
        self.events_ingested_total.with_label_values(&[result]).inc();
    }

    pub fn record_owner_hole(&self, reason: &str) {
        self.owner_holes_total.with_label_values(&[reason]).inc();
    }

    pub fn observe_query(&self, operation: &str, started: Instant) {
        self.query_duration_seconds
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());
    }

    pub fn render(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|e| e.to_string())?;
        String::from_utf8(buf).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_ingest("stored");
        metrics.record_owner_hole("not_found");

        let body = metrics.render().unwrap();
        assert!(body.contains("timesink_events_ingested_total{result=\"stored\"} 1"));
        assert!(body.contains("timesink_owner_holes_total{reason=\"not_found\"} 1"));
    }
}
