use crate::models::{ProcessorId, ServiceHealth};
use crate::processor::{ProcessorClient, ProcessorError};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Latest health report per processor. Written by the [`HealthMonitor`], read by the router.
///
/// Each update replaces the whole entry, so readers see either the previous or the new report.
#[derive(Clone, Default)]
pub struct HealthState {
    entries: Arc<DashMap<ProcessorId, ServiceHealth>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, processor: ProcessorId) -> Option<ServiceHealth> {
        self.entries.get(&processor).map(|entry| *entry.value())
    }

    pub fn set(&self, processor: ProcessorId, health: ServiceHealth) {
        self.entries.insert(processor, health);
    }

    /// Minimum response time last reported by `processor`, zero when unknown.
    pub fn min_response_time(&self, processor: ProcessorId) -> Duration {
        self.get(processor)
            .map(|health| Duration::from_millis(health.min_response_time))
            .unwrap_or_default()
    }

    /// Fallback only when the default reports failing and the fallback reports healthy.
    pub fn best_processor(&self) -> ProcessorId {
        match (self.get(ProcessorId::Default), self.get(ProcessorId::Fallback)) {
            (Some(default), Some(fallback)) if default.failing && !fallback.failing => {
                ProcessorId::Fallback
            }
            _ => ProcessorId::Default,
        }
    }
}

pub struct HealthMonitor {
    default: ProcessorClient,
    fallback: ProcessorClient,
    state: HealthState,
    cycle_interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        default: ProcessorClient,
        fallback: ProcessorClient,
        state: HealthState,
        cycle_interval: Duration,
    ) -> Self {
        Self {
            default,
            fallback,
            state,
            cycle_interval,
        }
    }

    pub fn cycle_interval(&self) -> Duration {
        self.cycle_interval
    }

    pub fn state(&self) -> &HealthState {
        &self.state
    }

    /// Polls one processor. A failed poll keeps the previous report.
    pub async fn check_processor_health(
        &self,
        processor: &ProcessorClient,
    ) -> Result<ServiceHealth, ProcessorError> {
        let health = processor.get_health().await?;
        self.state.set(processor.id(), health);

        debug!(
            processor = %processor.id(),
            failing = health.failing,
            min_response_time_ms = health.min_response_time,
            "Health check completed"
        );

        Ok(health)
    }

    pub async fn monitor_all_processors(&self) {
        let (default, fallback) = tokio::join!(
            self.check_processor_health(&self.default),
            self.check_processor_health(&self.fallback)
        );

        for result in [default, fallback] {
            if let Err(e) = result {
                warn!(error = %e, "Health check failed, keeping last known status");
            }
        }
    }

    pub async fn run(self) {
        info!(interval = ?self.cycle_interval(), "Health monitor started");

        let mut interval = time::interval(self.cycle_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.monitor_all_processors().await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::MockHttpClient;

    const DEFAULT_HEALTH_URL: &str = "http://default.example.com/payments/service-health";
    const FALLBACK_HEALTH_URL: &str = "http://fallback.example.com/payments/service-health";

    fn create_test_monitor(http_client: MockHttpClient) -> (HealthMonitor, Arc<MockHttpClient>) {
        let http_client = Arc::new(http_client);
        let monitor = HealthMonitor::new(
            ProcessorClient::new(ProcessorId::Default, "http://default.example.com", http_client.clone()),
            ProcessorClient::new(ProcessorId::Fallback, "http://fallback.example.com", http_client.clone()),
            HealthState::new(),
            Duration::from_secs(5),
        );
        (monitor, http_client)
    }

    #[tokio::test]
    async fn test_monitor_all_processors_updates_state() {
        let (monitor, http_client) = create_test_monitor(
            MockHttpClient::new()
                .with_response(DEFAULT_HEALTH_URL, 200, r#"{"failing": false, "minResponseTime": 150}"#)
                .with_response(FALLBACK_HEALTH_URL, 200, r#"{"failing": true, "minResponseTime": 200}"#),
        );

        monitor.monitor_all_processors().await;

        let state = monitor.state();
        assert_eq!(state.get(ProcessorId::Default), Some(ServiceHealth::new(false, 150)));
        assert_eq!(state.get(ProcessorId::Fallback), Some(ServiceHealth::new(true, 200)));
        assert_eq!(http_client.call_count(DEFAULT_HEALTH_URL), 1);
        assert_eq!(http_client.call_count(FALLBACK_HEALTH_URL), 1);
    }

    #[tokio::test]
    async fn test_failed_check_keeps_previous_status() {
        let (monitor, http_client) = create_test_monitor(MockHttpClient::new().with_response(
            DEFAULT_HEALTH_URL,
            200,
            r#"{"failing": false, "minResponseTime": 80}"#,
        ));
        monitor.monitor_all_processors().await;

        http_client.set_response(DEFAULT_HEALTH_URL, 429, "Too Many Requests");
        monitor.monitor_all_processors().await;

        assert_eq!(
            monitor.state().get(ProcessorId::Default),
            Some(ServiceHealth::new(false, 80))
        );
        assert_eq!(monitor.state().get(ProcessorId::Fallback), None);
    }

    #[tokio::test]
    async fn test_check_processor_health_invalid_json() {
        let (monitor, _) = create_test_monitor(MockHttpClient::new().with_response(
            DEFAULT_HEALTH_URL,
            200,
            "invalid json",
        ));

        let result = monitor.check_processor_health(&monitor.default).await;

        assert!(matches!(result, Err(ProcessorError::Decode { .. })));
        assert_eq!(monitor.state().get(ProcessorId::Default), None);
    }

    #[tokio::test]
    async fn test_run_polls_on_interval() {
        let http_client = Arc::new(
            MockHttpClient::new()
                .with_response(DEFAULT_HEALTH_URL, 200, r#"{"failing": false, "minResponseTime": 1}"#)
                .with_response(FALLBACK_HEALTH_URL, 200, r#"{"failing": false, "minResponseTime": 1}"#),
        );
        let state = HealthState::new();
        let monitor = HealthMonitor::new(
            ProcessorClient::new(ProcessorId::Default, "http://default.example.com", http_client.clone()),
            ProcessorClient::new(ProcessorId::Fallback, "http://fallback.example.com", http_client.clone()),
            state.clone(),
            Duration::from_millis(20),
        );
        assert_eq!(monitor.cycle_interval(), Duration::from_millis(20));

        let handle = monitor.spawn();
        tokio::time::sleep(Duration::from_millis(110)).await;
        handle.abort();

        assert!(http_client.call_count(DEFAULT_HEALTH_URL) >= 2);
        assert_eq!(state.get(ProcessorId::Fallback), Some(ServiceHealth::new(false, 1)));
    }

    #[test]
    fn test_best_processor_no_health_data() {
        assert_eq!(HealthState::new().best_processor(), ProcessorId::Default);
    }

    #[test]
    fn test_best_processor_both_healthy_prefers_default() {
        let state = HealthState::new();
        state.set(ProcessorId::Default, ServiceHealth::new(false, 1000));
        state.set(ProcessorId::Fallback, ServiceHealth::new(false, 10));

        assert_eq!(state.best_processor(), ProcessorId::Default);
    }

    #[test]
    fn test_best_processor_only_fallback_healthy() {
        let state = HealthState::new();
        state.set(ProcessorId::Default, ServiceHealth::new(true, 5000));
        state.set(ProcessorId::Fallback, ServiceHealth::new(false, 200));

        assert_eq!(state.best_processor(), ProcessorId::Fallback);
    }

    #[test]
    fn test_best_processor_both_failing_stays_on_default() {
        let state = HealthState::new();
        state.set(ProcessorId::Default, ServiceHealth::new(true, 3000));
        state.set(ProcessorId::Fallback, ServiceHealth::new(true, 2000));

        assert_eq!(state.best_processor(), ProcessorId::Default);
    }

    #[test]
    fn test_best_processor_default_failing_fallback_unknown() {
        let state = HealthState::new();
        state.set(ProcessorId::Default, ServiceHealth::new(true, 3000));

        assert_eq!(state.best_processor(), ProcessorId::Default);
    }

    #[test]
    fn test_min_response_time_defaults_to_zero() {
        let state = HealthState::new();
        assert_eq!(state.min_response_time(ProcessorId::Default), Duration::ZERO);

        state.set(ProcessorId::Default, ServiceHealth::new(false, 250));
        assert_eq!(
            state.min_response_time(ProcessorId::Default),
            Duration::from_millis(250)
        );
    }
}
