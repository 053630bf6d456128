//! Prometheus metrics definitions for the decision loop
//!
//! All metrics use the `volume_sniper_` prefix and live in a private registry.

use prometheus::{
    Counter, CounterVec, GaugeVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGaugeVec},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Completed scheduler ticks
    pub scan_cycles_total: Counter,
    /// Symbols skipped, by reason
    pub symbol_skips_total: CounterVec,
    /// Validated signals, by setup tag
    pub signals_total: CounterVec,
    /// Order submissions, by status
    pub orders_total: CounterVec,
    /// Labelled samples appended to the corpus
    pub experiences_total: Counter,
    /// Generation of the model currently serving each symbol
    pub model_generation: GenericGaugeVec<AtomicF64>,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let scan_cycles_total = Counter::with_opts(Opts::new(
            "volume_sniper_scan_cycles_total",
            "Completed scan cycles",
        ))?;
        registry.register(Box::new(scan_cycles_total.clone()))?;

        let symbol_skips_total = CounterVec::new(
            Opts::new(
                "volume_sniper_symbol_skips_total",
                "Symbols skipped during a scan, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(symbol_skips_total.clone()))?;

        let signals_total = CounterVec::new(
            Opts::new("volume_sniper_signals_total", "Validated signals by setup"),
            &["setup"],
        )?;
        registry.register(Box::new(signals_total.clone()))?;

        let orders_total = CounterVec::new(
            Opts::new("volume_sniper_orders_total", "Order submissions by status"),
            &["status"],
        )?;
        registry.register(Box::new(orders_total.clone()))?;

        let experiences_total = Counter::with_opts(Opts::new(
            "volume_sniper_experiences_total",
            "Experience samples recorded",
        ))?;
        registry.register(Box::new(experiences_total.clone()))?;

        let model_generation = GaugeVec::new(
            Opts::new(
                "volume_sniper_model_generation",
                "Generation of the serving model per symbol",
            ),
            &["symbol"],
        )?;
        registry.register(Box::new(model_generation.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            scan_cycles_total,
            symbol_skips_total,
            signals_total,
            orders_total,
            experiences_total,
            model_generation,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_skip(&self, reason: &str) {
        self.symbol_skips_total.with_label_values(&[reason]).inc();
    }

    pub fn inc_signal(&self, setup: &str) {
        self.signals_total.with_label_values(&[setup]).inc();
    }

    pub fn inc_orders(&self, status: &str) {
        self.orders_total.with_label_values(&[status]).inc();
    }

    pub fn set_model_generation(&self, symbol: &str, generation: u64) {
        self.model_generation
            .with_label_values(&[symbol])
            .set(generation as f64);
    }
}
