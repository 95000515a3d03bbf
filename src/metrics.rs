//! Scoring metrics and periodic summaries.

use crate::error::ErrorKind;
use crate::types::decision::{Decision, PredictionResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const MAX_SAMPLES: usize = 10_000;

/// Metrics collector for the scoring service
pub struct PipelineMetrics {
    /// Applications that received a decision
    pub applications_scored: AtomicU64,
    pub approved: AtomicU64,
    pub denied: AtomicU64,
    /// Applications rejected before a decision was made
    pub rejected: AtomicU64,
    /// Rejections by error kind
    rejections_by_kind: RwLock<HashMap<&'static str, u64>>,
    /// Scoring times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Approval probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            applications_scored: AtomicU64::new(0),
            approved: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            rejections_by_kind: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a scored application
    pub fn record_decision(&self, processing_time: Duration, result: &PredictionResult) {
        self.applications_scored.fetch_add(1, Ordering::Relaxed);
        match result.decision {
            Decision::Approved => self.approved.fetch_add(1, Ordering::Relaxed),
            Decision::Denied => self.denied.fetch_add(1, Ordering::Relaxed),
        };

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > MAX_SAMPLES {
                times.drain(0..MAX_SAMPLES / 2);
            }
        }

        let bucket = ((result.probability * 10.0) as usize).min(9);
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record an application that could not be scored
    pub fn record_rejection(&self, kind: ErrorKind) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_kind) = self.rejections_by_kind.write() {
            *by_kind.entry(kind.as_str()).or_insert(0) += 1;
        }
    }

    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Applications scored per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.applications_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or_default()
    }

    pub fn get_rejections_by_kind(&self) -> HashMap<&'static str, u64> {
        self.rejections_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Approved share of scored applications, in percent
    pub fn approval_rate(&self) -> f64 {
        let scored = self.applications_scored.load(Ordering::Relaxed);
        if scored == 0 {
            return 0.0;
        }
        self.approved.load(Ordering::Relaxed) as f64 / scored as f64 * 100.0
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let scored = self.applications_scored.load(Ordering::Relaxed);
        let rejected = self.rejected.load(Ordering::Relaxed);
        let processing = self.get_processing_stats();

        info!(
            scored = scored,
            approved = self.approved.load(Ordering::Relaxed),
            denied = self.denied.load(Ordering::Relaxed),
            rejected = rejected,
            approval_rate = format!("{:.1}%", self.approval_rate()),
            throughput = format!("{:.1} app/s", self.get_throughput()),
            "Scoring summary"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Scoring latency"
        );

        for (kind, count) in self.get_rejections_by_kind() {
            info!(kind = kind, count = count, "Rejections");
        }

        let distribution = self.get_probability_distribution();
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 {
                count as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            info!(
                "  p(approve) {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                "█".repeat(((pct / 5.0) as usize).min(20))
            );
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoring time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Logs a metrics summary at a fixed interval
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
