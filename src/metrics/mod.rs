use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref TICKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("registrywatcher_ticks_total", "Total reconciliation ticks run, by repository"),
        &["repository"],
    ).unwrap();

    pub static ref TICKS_ABORTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("registrywatcher_ticks_aborted_total", "Ticks aborted due to a fetch error, by repository"),
        &["repository"],
    ).unwrap();

    pub static ref DEPLOYS_ISSUED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("registrywatcher_deploys_issued_total", "Orchestrator updates issued, by repository"),
        &["repository"],
    ).unwrap();

    pub static ref MONITOR_OUTCOMES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("registrywatcher_monitor_outcomes_total", "Deployment monitor terminal outcomes"),
        &["outcome"],
    ).unwrap();

    pub static ref NOTIFICATIONS_SENT_TOTAL: IntCounter = IntCounter::new(
        "registrywatcher_notifications_sent_total",
        "Total notifications sent across all channels",
    ).unwrap();
}

/// Registers every metric with the process-wide registry. Called once at
/// startup before the admin server starts serving `/metrics`.
pub fn init() {
    REGISTRY.register(Box::new(TICKS_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(TICKS_ABORTED_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(DEPLOYS_ISSUED_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(MONITOR_OUTCOMES_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(NOTIFICATIONS_SENT_TOTAL.clone())).ok();
}

pub fn encode() -> anyhow::Result<Vec<u8>> {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}
