//! Operator configuration from environment variables

use std::collections::BTreeMap;
use std::time::Duration;

use kube::ResourceExt;

use crate::controller::lock::LOCK_TIMEOUT_MS;
use crate::controller::poller::REBALANCE_POLLING_TIMER_MS;
use crate::crd::Kafka;
use crate::cruise_control::DEFAULT_API_PORT;

/// Default interval between full listing sweeps
const DEFAULT_RESYNC_INTERVAL_MS: u64 = 300_000;

/// Default per-request timeout against Cruise Control
const DEFAULT_API_TIMEOUT_MS: u64 = 30_000;

/// Configuration of the rebalance controller
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Equality label selector ("k=v,k2=v2") scoping both the watched
    /// rebalance resources and the Kafka clusters they may bind to
    pub cluster_selector: BTreeMap<String, String>,
    /// Tick period of the proposal/task polls
    pub polling_interval: Duration,
    /// Bound on per-resource lock acquisition
    pub lock_timeout: Duration,
    /// Interval between periodic listing sweeps
    pub resync_interval: Duration,
    /// Port of the Cruise Control REST API
    pub cruise_control_port: u16,
    /// Per-request timeout against the Cruise Control REST API
    pub api_timeout: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            cluster_selector: BTreeMap::new(),
            polling_interval: Duration::from_millis(REBALANCE_POLLING_TIMER_MS),
            lock_timeout: Duration::from_millis(LOCK_TIMEOUT_MS),
            resync_interval: Duration::from_millis(DEFAULT_RESYNC_INTERVAL_MS),
            cruise_control_port: DEFAULT_API_PORT,
            api_timeout: Duration::from_millis(DEFAULT_API_TIMEOUT_MS),
        }
    }
}

impl OperatorConfig {
    /// Build the configuration from the process environment.
    ///
    /// Unset variables keep their defaults; values that do not parse are an
    /// error so a typo cannot silently change timing behavior.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();

        if let Ok(ns) = std::env::var("WATCH_NAMESPACE") {
            if !ns.is_empty() && ns != "*" {
                config.watch_namespace = Some(ns);
            }
        }
        if let Ok(selector) = std::env::var("CUSTOM_RESOURCE_SELECTOR") {
            config.cluster_selector = parse_selector(&selector)?;
        }
        if let Some(ms) = parse_ms_var("LOCK_TIMEOUT_MS")? {
            config.lock_timeout = ms;
        }
        if let Some(ms) = parse_ms_var("RESYNC_INTERVAL_MS")? {
            config.resync_interval = ms;
        }
        if let Some(ms) = parse_ms_var("CRUISE_CONTROL_API_TIMEOUT_MS")? {
            config.api_timeout = ms;
        }
        if let Ok(port) = std::env::var("CRUISE_CONTROL_API_PORT") {
            config.cruise_control_port = port
                .parse()
                .map_err(|_| format!("CRUISE_CONTROL_API_PORT is not a port number: {}", port))?;
        }

        Ok(config)
    }

    /// Selector string for watch and list calls, if any selector is set
    pub fn label_selector(&self) -> Option<String> {
        if self.cluster_selector.is_empty() {
            None
        } else {
            Some(
                self.cluster_selector
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(","),
            )
        }
    }

    /// Whether a Kafka cluster carries every label of the configured selector
    pub fn matches_cluster_selector(&self, kafka: &Kafka) -> bool {
        let labels = kafka.labels();
        self.cluster_selector
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

fn parse_selector(raw: &str) -> Result<BTreeMap<String, String>, String> {
    let mut selector = BTreeMap::new();
    for pair in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("selector term '{}' is not key=value", pair))?;
        selector.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(selector)
}

fn parse_ms_var(name: &str) -> Result<Option<Duration>, String> {
    match std::env::var(name) {
        Ok(raw) => {
            let ms: u64 = raw
                .parse()
                .map_err(|_| format!("{} is not a millisecond count: {}", name, raw))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        Err(_) => Ok(None),
    }
}
