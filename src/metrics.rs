//! Prometheus metrics for refreshes and mint attempts

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Metrics registered on a private registry, one instance per session
pub struct MintMetrics {
    registry: Registry,

    // Counters
    pub refresh_total: IntCounter,
    pub refresh_errors: IntCounter,
    pub mint_attempts: IntCounter,
    pub mint_success: IntCounter,
    pub mint_likely_failed: IntCounter,
    pub mint_failed: IntCounter,
    pub setup_transactions: IntCounter,

    // Histograms
    pub confirmation_latency: Histogram,
}

impl MintMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let refresh_total = IntCounter::with_opts(Opts::new(
            "refresh_total",
            "Number of sale state refreshes",
        ))?;

        let refresh_errors = IntCounter::with_opts(Opts::new(
            "refresh_errors",
            "Number of refreshes that failed",
        ))?;

        let mint_attempts =
            IntCounter::with_opts(Opts::new("mint_attempts", "Number of mint attempts started"))?;

        let mint_success =
            IntCounter::with_opts(Opts::new("mint_success", "Number of confirmed mints"))?;

        let mint_likely_failed = IntCounter::with_opts(Opts::new(
            "mint_likely_failed",
            "Mints confirmed without metadata",
        ))?;

        let mint_failed =
            IntCounter::with_opts(Opts::new("mint_failed", "Number of failed mint attempts"))?;

        let setup_transactions = IntCounter::with_opts(Opts::new(
            "setup_transactions",
            "Number of account setup transactions submitted",
        ))?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "confirmation_latency_seconds",
                "Time from submission to a terminal confirmation result",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0]),
        )?;

        registry.register(Box::new(refresh_total.clone()))?;
        registry.register(Box::new(refresh_errors.clone()))?;
        registry.register(Box::new(mint_attempts.clone()))?;
        registry.register(Box::new(mint_success.clone()))?;
        registry.register(Box::new(mint_likely_failed.clone()))?;
        registry.register(Box::new(mint_failed.clone()))?;
        registry.register(Box::new(setup_transactions.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        Ok(Self {
            registry,
            refresh_total,
            refresh_errors,
            mint_attempts,
            mint_success,
            mint_likely_failed,
            mint_failed,
            setup_transactions,
            confirmation_latency,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format of every registered metric
    pub fn gather_text(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Measures one confirmation wait
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
