//! Cycle orchestration: wires the classifier, strategies, sizer, risk
//! gate and reconciler behind the exchange and repository traits.

pub mod config;
pub mod engine;

pub use config::AgentConfig;
pub use engine::{CycleReport, TradingEngine};

/// Install the global tracing subscriber, honoring `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
