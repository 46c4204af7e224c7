use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::schedule::ScheduleSpec;
use crate::pipeline::wait_for_shutdown;
use crate::Result;

/// Longest single sleep before the wall clock is consulted again
const MAX_SLEEP: Duration = Duration::from_secs(3600);

/// Work triggered by a [`Scheduler`]
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

/// Fires a job at each trigger instant of a [`ScheduleSpec`].
///
/// At most one run of the job is in flight; a trigger that arrives while
/// the previous run is still going is skipped.
#[derive(Clone)]
pub struct Scheduler {
    spec: ScheduleSpec,
    job: Arc<dyn ScheduledJob>,
    running: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(spec: ScheduleSpec, job: Arc<dyn ScheduledJob>) -> Self {
        Self {
            spec,
            job,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Start one run of the job in the background. Returns `None` when the
    /// previous run has not finished yet.
    pub fn fire(&self) -> Option<JoinHandle<()>> {
        let Ok(guard) = self.running.clone().try_lock_owned() else {
            warn!(job = self.job.name(), "Previous run still in progress, skipping trigger");
            return None;
        };

        let job = self.job.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            info!(job = job.name(), "Running scheduled job");
            match job.run().await {
                Ok(()) => info!(job = job.name(), "Scheduled job finished"),
                Err(e) => error!(job = job.name(), error = %e, "Scheduled job failed"),
            }
        }))
    }

    /// Wait for each trigger instant and fire the job, until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut next = self.spec.next_fire_after(Utc::now());
        info!(job = self.job.name(), schedule = %self.spec, next = %next, "Scheduler started");

        loop {
            let now = Utc::now();
            if now >= next {
                self.fire();
                next = self.spec.next_fire_after(now);
                info!(job = self.job.name(), next = %next, "Next scheduled run");
                continue;
            }

            let wait = (next - now).to_std().unwrap_or(Duration::ZERO).min(MAX_SLEEP);
            debug!(wait_secs = wait.as_secs(), "Scheduler sleeping");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!(job = self.job.name(), "Scheduler stopped");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    struct GatedJob {
        runs: AtomicU32,
        gate: Notify,
    }

    #[async_trait]
    impl ScheduledJob for GatedJob {
        fn name(&self) -> &str {
            "gated"
        }

        async fn run(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(())
        }
    }

    fn daily_spec() -> ScheduleSpec {
        ScheduleSpec::from_config(&ScheduleConfig {
            every: "day".to_string(),
            day: None,
            time: "09:00".to_string(),
            timezone: "UTC".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_overlapping_trigger_skipped() {
        let job = Arc::new(GatedJob {
            runs: AtomicU32::new(0),
            gate: Notify::new(),
        });
        let scheduler = Scheduler::new(daily_spec(), job.clone());

        let first = scheduler.fire().expect("first trigger runs");
        assert!(scheduler.fire().is_none());

        // notify_one stores a permit if the job has not reached the gate yet
        job.gate.notify_one();
        first.await.unwrap();

        let third = scheduler.fire().expect("runs again once idle");
        job.gate.notify_one();
        third.await.unwrap();

        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }

    struct CountingJob {
        runs: AtomicU32,
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_fires_once_per_trigger() {
        // Daily trigger about two seconds from now, on whole seconds
        let at = (Utc::now() + chrono::Duration::seconds(2)).format("%H:%M:%S").to_string();
        let spec = ScheduleSpec::from_config(&ScheduleConfig {
            every: "day".to_string(),
            day: None,
            time: at,
            timezone: "UTC".to_string(),
        })
        .unwrap();

        let job = Arc::new(CountingJob {
            runs: AtomicU32::new(0),
        });
        let scheduler = Scheduler::new(spec, job.clone());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(rx).await });

        tokio::time::sleep(Duration::from_secs(4)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        // The next trigger is a day away
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let job = Arc::new(GatedJob {
            runs: AtomicU32::new(0),
            gate: Notify::new(),
        });
        let scheduler = Scheduler::new(daily_spec(), job.clone());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { scheduler.run(rx).await });
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }
}
