//! Prometheus-style metrics for loader monitoring
//!
//! Provides counters, gauges, and histograms, bundled per loader in
//! [`LoaderMetrics`] rather than as process globals.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

/// Counter metric (monotonically increasing)
pub struct Counter {
    value: AtomicU64,
    name: String,
    help: String,
}

impl Counter {
    /// Create a new counter
    pub fn new(name: &str, help: &str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Increment by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by delta
    pub fn inc_by(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Get current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Gauge metric (can go up or down)
pub struct Gauge {
    value: AtomicI64,
    name: String,
    help: String,
}

impl Gauge {
    /// Create a new gauge
    pub fn new(name: &str, help: &str) -> Self {
        Self {
            value: AtomicI64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Set value
    pub fn set(&self, val: i64) {
        self.value.store(val, Ordering::Relaxed);
    }

    /// Get current value
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} gauge\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Histogram with cumulative buckets
pub struct Histogram {
    buckets: Vec<(f64, AtomicU64)>,
    sum: AtomicU64,
    count: AtomicU64,
    name: String,
    help: String,
}

impl Histogram {
    /// Create with default latency buckets (seconds)
    pub fn new(name: &str, help: &str) -> Self {
        Self::with_buckets(
            name,
            help,
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
    }

    /// Create with custom buckets
    pub fn with_buckets(name: &str, help: &str, bounds: Vec<f64>) -> Self {
        let buckets = bounds
            .into_iter()
            .map(|b| (b, AtomicU64::new(0)))
            .collect();

        Self {
            buckets,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Observe a value
    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);

        // Sum kept as integer micros
        let micros = (value * 1_000_000.0) as u64;
        self.sum.fetch_add(micros, Ordering::Relaxed);

        for (bound, count) in &self.buckets {
            if value <= *bound {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Time a closure and record the duration
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.observe(start.elapsed().as_secs_f64());
        result
    }

    /// Number of observations
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        let mut output = format!(
            "# HELP {} {}\n# TYPE {} histogram\n",
            self.name, self.help, self.name
        );

        for (bound, count) in &self.buckets {
            output.push_str(&format!(
                "{}_bucket{{le=\"{}\"}} {}\n",
                self.name,
                bound,
                count.load(Ordering::Relaxed)
            ));
        }

        let sum = self.sum.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        output.push_str(&format!("{}_sum {}\n", self.name, sum));
        output.push_str(&format!("{}_count {}\n", self.name, self.count()));

        output
    }
}

/// Metrics recorded by one loader
pub struct LoaderMetrics {
    pub batches_emitted: Counter,
    pub utterances_emitted: Counter,
    pub utterances_dropped: Counter,
    pub epochs_completed: Counter,
    pub current_epoch: Gauge,
    pub batch_size: Histogram,
    pub assembly_duration: Histogram,
}

impl LoaderMetrics {
    pub fn new() -> Self {
        Self {
            batches_emitted: Counter::new("seqfeed_batches_total", "Batches emitted"),
            utterances_emitted: Counter::new("seqfeed_utterances_total", "Utterances emitted"),
            utterances_dropped: Counter::new(
                "seqfeed_utterances_dropped_total",
                "Utterances dropped by device splitting",
            ),
            epochs_completed: Counter::new("seqfeed_epochs_total", "Epochs fully emitted"),
            current_epoch: Gauge::new("seqfeed_current_epoch", "Current epoch index"),
            batch_size: Histogram::with_buckets(
                "seqfeed_batch_size",
                "Utterances per emitted batch",
                vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0],
            ),
            assembly_duration: Histogram::new(
                "seqfeed_batch_assembly_seconds",
                "Time spent loading and padding one batch",
            ),
        }
    }

    /// Export everything in Prometheus text format
    pub fn export(&self) -> String {
        let mut output = String::new();
        output.push_str(&self.batches_emitted.to_prometheus());
        output.push_str(&self.utterances_emitted.to_prometheus());
        output.push_str(&self.utterances_dropped.to_prometheus());
        output.push_str(&self.epochs_completed.to_prometheus());
        output.push_str(&self.current_epoch.to_prometheus());
        output.push_str(&self.batch_size.to_prometheus());
        output.push_str(&self.assembly_duration.to_prometheus());
        output
    }
}

impl Default for LoaderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_counter", "Test counter");
        assert_eq!(counter.get(), 0);

        counter.inc();
        assert_eq!(counter.get(), 1);

        counter.inc_by(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new("test_gauge", "Test gauge");
        gauge.set(10);
        assert_eq!(gauge.get(), 10);
    }

    #[test]
    fn test_histogram() {
        let histogram = Histogram::new("test_histogram", "Test histogram");
        histogram.observe(0.001);
        histogram.observe(0.01);
        let value = histogram.time(|| 7);
        assert_eq!(value, 7);

        let prometheus = histogram.to_prometheus();
        assert!(prometheus.contains("test_histogram_count 3"));
    }

    #[test]
    fn test_loader_metrics_export() {
        let metrics = LoaderMetrics::new();
        metrics.batches_emitted.inc();
        metrics.batch_size.observe(4.0);
        let text = metrics.export();
        assert!(text.contains("seqfeed_batches_total 1"));
        assert!(text.contains("seqfeed_batch_size_bucket{le=\"4\"} 1"));
    }
}
