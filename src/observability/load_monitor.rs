//! Per-service request-rate sampling.
//!
//! # Responsibilities
//! - Count routed requests per service in the registry
//! - Every interval, alert on services at or above the critical load
//! - Reset every counter at each sample, alert or not
//!
//! # Design Decisions
//! - Never blocks or rejects traffic; registry errors are logged and dropped
//! - Sampled services are the configured ones plus whatever the registry
//!   knows about, so self-registered services are covered too

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::LoadMonitorConfig;
use crate::observability::metrics;
use crate::registry::ServiceRegistry;

/// A service whose sample reached the critical load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadAlert {
    pub service: String,
    pub requests: u64,
}

#[derive(Debug, Clone)]
pub struct LoadMonitor {
    registry: ServiceRegistry,
    services: Vec<String>,
    interval: Duration,
    critical_load: u64,
}

impl LoadMonitor {
    pub fn new(
        registry: ServiceRegistry,
        services: Vec<String>,
        interval: Duration,
        critical_load: u64,
    ) -> Self {
        Self {
            registry,
            services,
            interval,
            critical_load,
        }
    }

    pub fn from_config(
        registry: ServiceRegistry,
        services: Vec<String>,
        config: &LoadMonitorConfig,
    ) -> Self {
        Self::new(
            registry,
            services,
            Duration::from_secs(config.interval_secs),
            config.critical_load,
        )
    }

    /// Count one routed request.
    pub async fn record(&self, service: &str) {
        if let Err(e) = self.registry.incr_load(service).await {
            tracing::warn!(service = %service, error = %e, "Failed to record load");
        }
    }

    /// Take one sample: read and reset every counter, returning alerts.
    pub async fn sample(&self) -> Vec<LoadAlert> {
        let mut services = self.services.clone();
        match self.registry.services().await {
            Ok(known) => services.extend(known),
            Err(e) => tracing::warn!(error = %e, "Failed to list registered services"),
        }
        services.sort();
        services.dedup();

        let mut alerts = Vec::new();
        for service in services {
            let requests = match self.registry.take_load(&service).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(service = %service, error = %e, "Failed to sample load");
                    continue;
                }
            };
            if requests >= self.critical_load {
                tracing::warn!(
                    service = %service,
                    requests,
                    critical_load = self.critical_load,
                    interval_secs = self.interval.as_secs(),
                    "Critical load"
                );
                metrics::record_load_alert(&service);
                alerts.push(LoadAlert { service, requests });
            }
        }
        alerts
    }

    /// Sample every interval until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            critical_load = self.critical_load,
            "Load monitor starting"
        );

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sample().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Load monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use std::sync::Arc;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new(Arc::new(MemoryRegistry::new()), "test:")
    }

    #[tokio::test]
    async fn test_alert_at_threshold_and_reset() {
        let registry = registry();
        let monitor = LoadMonitor::new(
            registry.clone(),
            vec!["lobby_service".into(), "train_booking_service".into()],
            Duration::from_secs(10),
            3,
        );

        for _ in 0..3 {
            monitor.record("lobby_service").await;
        }
        monitor.record("train_booking_service").await;

        let alerts = monitor.sample().await;
        assert_eq!(
            alerts,
            vec![LoadAlert {
                service: "lobby_service".into(),
                requests: 3
            }]
        );

        // Counters were reset, including the one below threshold.
        assert!(monitor.sample().await.is_empty());
        assert_eq!(registry.take_load("train_booking_service").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_samples_registered_services() {
        let registry = registry();
        registry
            .register("search_service", &"10.0.0.1:8000".parse().unwrap())
            .await
            .unwrap();
        let monitor = LoadMonitor::new(registry, vec![], Duration::from_secs(10), 1);

        monitor.record("search_service").await;
        let alerts = monitor.sample().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].service, "search_service");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_resets_each_interval_and_stops() {
        let registry = registry();
        let monitor = LoadMonitor::new(
            registry.clone(),
            vec!["lobby_service".into()],
            Duration::from_secs(10),
            100,
        );
        let (tx, rx) = broadcast::channel(1);

        monitor.record("lobby_service").await;
        let handle = tokio::spawn(monitor.clone().run(rx));

        time::sleep(Duration::from_secs(11)).await;
        assert_eq!(registry.take_load("lobby_service").await.unwrap(), 0);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
