use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use dockhand_core::config::MetricsConfig;
use dockhand_core::metrics::{HostMetrics, HostSampler};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Host metrics sampler plus the last sample it produced.
pub struct HostMetricsState {
    sampler: Mutex<HostSampler>,
    latest: RwLock<Option<HostMetrics>>,
}

impl HostMetricsState {
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            sampler: Mutex::new(HostSampler::new(&config.proc_dir)),
            latest: RwLock::new(None),
        }
    }

    pub fn latest(&self) -> Option<HostMetrics> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take a sample and publish it. On error the previous sample stays.
    pub async fn refresh(&self) -> dockhand_core::Result<HostMetrics> {
        let metrics = self.sampler.lock().await.sample().await?;
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(metrics.clone());
        Ok(metrics)
    }

    /// Sample every `interval` until `cancel` fires, starting immediately.
    pub fn spawn_sampler(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match state.refresh().await {
                    Ok(m) => info!("host metrics: {}", m.summary()),
                    Err(e) => warn!(error = %e, "host metrics sample failed"),
                }
            }
        })
    }
}
