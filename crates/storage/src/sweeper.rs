//! Periodic expiry sweep background task.
//!
//! Lazy expiry only removes entries that are read again; the sweeper deletes
//! the rest on a fixed interval so dead entries do not hold budget forever.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use weather_common::WeatherResult;

use crate::domain::SweepStats;
use crate::mesh_cache::{MeshCache, MESH_DOMAIN};
use crate::weather_cache::{WeatherCache, WEATHER_DOMAIN};

/// A cache that can purge its own expired entries.
#[async_trait]
pub trait ExpirySweep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn sweep_expired(&self) -> WeatherResult<SweepStats>;
}

#[async_trait]
impl ExpirySweep for WeatherCache {
    fn name(&self) -> &'static str {
        WEATHER_DOMAIN
    }

    async fn sweep_expired(&self) -> WeatherResult<SweepStats> {
        WeatherCache::sweep_expired(self).await
    }
}

#[async_trait]
impl ExpirySweep for MeshCache {
    fn name(&self) -> &'static str {
        MESH_DOMAIN
    }

    async fn sweep_expired(&self) -> WeatherResult<SweepStats> {
        MeshCache::sweep_expired(self).await
    }
}

/// Totals across all targets for one cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub targets: Vec<(&'static str, SweepStats)>,
    /// Targets whose sweep returned an error
    pub failed: usize,
}

impl SweepReport {
    pub fn expired(&self) -> usize {
        self.targets.iter().map(|(_, s)| s.expired).sum()
    }
}

/// Floor for the sweep period; a zero period cannot drive a ticker.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct ExpirySweeper {
    targets: Vec<Arc<dyn ExpirySweep>>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(interval: Duration) -> Self {
        if interval < MIN_SWEEP_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                "Sweep interval too short, using the minimum"
            );
        }
        Self {
            targets: Vec::new(),
            interval: interval.max(MIN_SWEEP_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn with_target(mut self, target: Arc<dyn ExpirySweep>) -> Self {
        self.targets.push(target);
        self
    }

    /// Sweep every target once. One target failing does not stop the others.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for target in &self.targets {
            match target.sweep_expired().await {
                Ok(stats) => report.targets.push((target.name(), stats)),
                Err(e) => {
                    error!(cache = target.name(), error = %e, "Expiry sweep failed");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Sweep on a fixed interval until the task is aborted.
    pub async fn run_forever(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            targets = self.targets.len(),
            "Starting expiry sweep background task"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = self.run_once().await;
            info!(
                expired = report.expired(),
                failed = report.failed,
                "Expiry sweep cycle complete"
            );
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run_forever())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use weather_common::WeatherError;

    struct CountingTarget {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ExpirySweep for CountingTarget {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn sweep_expired(&self) -> WeatherResult<SweepStats> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(WeatherError::NotInitialized("counting"));
            }
            Ok(SweepStats {
                scanned: 3,
                expired: 2,
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_run_once_continues_after_failure() {
        let failing = Arc::new(CountingTarget {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let healthy = Arc::new(CountingTarget {
            calls: AtomicUsize::new(0),
            fail: false,
        });

        let sweeper = ExpirySweeper::new(Duration::from_secs(60))
            .with_target(failing.clone())
            .with_target(healthy.clone());

        let report = sweeper.run_once().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.expired(), 2);
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_task_sweeps_each_interval() {
        let target = Arc::new(CountingTarget {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let handle = ExpirySweeper::new(Duration::from_secs(60))
            .with_target(target.clone())
            .spawn();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 2);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_still_sweeps() {
        let target = Arc::new(CountingTarget {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let sweeper = ExpirySweeper::new(Duration::ZERO).with_target(target.clone());
        assert_eq!(sweeper.interval(), MIN_SWEEP_INTERVAL);

        let handle = sweeper.spawn();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(!handle.is_finished());
        assert_eq!(target.calls.load(Ordering::SeqCst), 2);
        handle.abort();
    }
}
