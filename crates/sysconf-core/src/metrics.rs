//! Prometheus metrics for the configuration engine
//!
//! - `sysconf_validations_total` (counter) - validations by outcome
//! - `sysconf_validation_duration_seconds` (histogram) - validation latency
//! - `sysconf_backups_total` (counter) - backups created by type
//! - `sysconf_restores_total` (counter) - restores by outcome
//! - `sysconf_auth_failures_total` (counter) - failed authentications by reason
//! - `sysconf_encryption_operations_total` (counter) - encrypt/decrypt by outcome
//! - `sysconf_versions_total` (counter) - versions created by compatibility

use std::sync::Arc;

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};

use crate::error::{ConfigError, Result};

const NAMESPACE: &str = "sysconf";

pub struct EngineMetrics {
    registry: Arc<Registry>,
    validations_total: CounterVec,
    validation_duration_seconds: HistogramVec,
    backups_total: CounterVec,
    restores_total: CounterVec,
    auth_failures_total: CounterVec,
    encryption_operations_total: CounterVec,
    versions_total: CounterVec,
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics").finish_non_exhaustive()
    }
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

impl EngineMetrics {
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Register the engine's metrics with an existing registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let validations_total = CounterVec::new(
            Opts::new("validations_total", "Configuration validations by outcome").namespace(NAMESPACE),
            &["outcome"],
        )?;
        let validation_duration_seconds = HistogramVec::new(
            HistogramOpts::new("validation_duration_seconds", "Configuration validation duration in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
            &["outcome"],
        )?;
        let backups_total = CounterVec::new(
            Opts::new("backups_total", "Backups created by type").namespace(NAMESPACE),
            &["type"],
        )?;
        let restores_total = CounterVec::new(
            Opts::new("restores_total", "Backup restores by outcome").namespace(NAMESPACE),
            &["outcome"],
        )?;
        let auth_failures_total = CounterVec::new(
            Opts::new("auth_failures_total", "Failed authentications by reason").namespace(NAMESPACE),
            &["reason"],
        )?;
        let encryption_operations_total = CounterVec::new(
            Opts::new("encryption_operations_total", "Field encryption operations").namespace(NAMESPACE),
            &["operation", "outcome"],
        )?;
        let versions_total = CounterVec::new(
            Opts::new("versions_total", "Configuration versions created by compatibility").namespace(NAMESPACE),
            &["compatibility"],
        )?;

        registry.register(Box::new(validations_total.clone()))?;
        registry.register(Box::new(validation_duration_seconds.clone()))?;
        registry.register(Box::new(backups_total.clone()))?;
        registry.register(Box::new(restores_total.clone()))?;
        registry.register(Box::new(auth_failures_total.clone()))?;
        registry.register(Box::new(encryption_operations_total.clone()))?;
        registry.register(Box::new(versions_total.clone()))?;

        Ok(Self {
            registry,
            validations_total,
            validation_duration_seconds,
            backups_total,
            restores_total,
            auth_failures_total,
            encryption_operations_total,
            versions_total,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn record_validation(&self, valid: bool, duration_secs: f64) {
        let label = if valid { "valid" } else { "invalid" };
        self.validations_total.with_label_values(&[label]).inc();
        self.validation_duration_seconds
            .with_label_values(&[label])
            .observe(duration_secs);
    }

    pub fn record_backup(&self, backup_type: &str) {
        self.backups_total.with_label_values(&[backup_type]).inc();
    }

    pub fn record_restore(&self, ok: bool) {
        self.restores_total.with_label_values(&[outcome(ok)]).inc();
    }

    pub fn record_auth_failure(&self, reason: &str) {
        self.auth_failures_total.with_label_values(&[reason]).inc();
    }

    pub fn record_encryption(&self, operation: &str, ok: bool) {
        self.encryption_operations_total
            .with_label_values(&[operation, outcome(ok)])
            .inc();
    }

    pub fn record_version(&self, compatibility: &str) {
        self.versions_total.with_label_values(&[compatibility]).inc();
    }

    /// Text exposition format for scraping
    pub fn gather_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ConfigError::Metrics(e.to_string()))
    }

    pub fn validations(&self, valid: bool) -> u64 {
        let label = if valid { "valid" } else { "invalid" };
        self.validations_total.with_label_values(&[label]).get() as u64
    }

    pub fn backups(&self, backup_type: &str) -> u64 {
        self.backups_total.with_label_values(&[backup_type]).get() as u64
    }

    pub fn restores(&self, ok: bool) -> u64 {
        self.restores_total.with_label_values(&[outcome(ok)]).get() as u64
    }

    pub fn auth_failures(&self, reason: &str) -> u64 {
        self.auth_failures_total.with_label_values(&[reason]).get() as u64
    }
}
