//! Background refresh of the external signals, one task per key.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

use mystyle_core::config::SignalsConfig;
use mystyle_core::{Engine, SignalFetcher, SignalKey};

use crate::fetchers::FetcherRegistry;

struct RefreshJob {
    key: SignalKey,
    fetcher: Arc<dyn SignalFetcher>,
    period: Duration,
}

pub struct RefreshScheduler {
    engine: Arc<Engine>,
    jobs: Vec<RefreshJob>,
}

impl RefreshScheduler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine, jobs: Vec::new() }
    }

    /// Schedules every key that has a fetcher, at its configured refresh interval.
    pub fn from_config(
        engine: Arc<Engine>,
        fetchers: &FetcherRegistry,
        config: &SignalsConfig,
    ) -> Self {
        let mut scheduler = Self::new(engine);
        for key in config.keys() {
            let (Some(source), Some(fetcher)) = (config.source(&key), fetchers.get(&key)) else {
                continue;
            };
            if source.enabled {
                let period = source.refresh_interval();
                scheduler = scheduler.schedule(key, fetcher, period);
            }
        }
        scheduler
    }

    pub fn schedule(
        mut self,
        key: SignalKey,
        fetcher: Arc<dyn SignalFetcher>,
        period: Duration,
    ) -> Self {
        self.jobs.push(RefreshJob { key, fetcher, period: period.max(Duration::from_millis(1)) });
        self
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = self
            .jobs
            .into_iter()
            .map(|job| {
                let engine = self.engine.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(run_job(engine, job, shutdown))
            })
            .collect::<Vec<_>>();

        info!(
            event_name = "signal.scheduler.started",
            tasks = tasks.len(),
            "signal refresh scheduler started"
        );
        SchedulerHandle { shutdown_tx, tasks }
    }
}

async fn run_job(engine: Arc<Engine>, job: RefreshJob, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(job.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let correlation_id = Uuid::new_v4().to_string();
        match engine.refresh_signal(&job.key, job.fetcher.as_ref(), false).await {
            Ok(report) => debug!(
                event_name = "signal.scheduler.cycle",
                correlation_id = %correlation_id,
                signal_key = %job.key,
                status = report.entry.status().as_str(),
                fetched = report.source.is_some(),
                "scheduled refresh cycle finished"
            ),
            Err(err) => error!(
                event_name = "signal.scheduler.cycle_failed",
                correlation_id = %correlation_id,
                signal_key = %job.key,
                error = %err,
                "scheduled refresh cycle failed"
            ),
        }
    }

    debug!(event_name = "signal.scheduler.task_stopped", signal_key = %job.key, "refresh task stopped");
}

pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signals every task to stop and waits for in-flight cycles to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                error!(
                    event_name = "signal.scheduler.join_failed",
                    error = %err,
                    "refresh task ended abnormally"
                );
            }
        }
        info!(event_name = "signal.scheduler.stopped", "signal refresh scheduler stopped");
    }
}
