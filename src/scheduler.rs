use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::SchedulerConfig;
use crate::engine::RenderingEngine;
use crate::job::JobRunner;
use crate::models::RunReport;
use crate::{AppError, Result};

#[derive(Debug)]
pub enum TriggerOutcome {
    Completed(RunReport),
    Aborted(AppError),
    /// Another run held the lock, or the scheduler is shutting down.
    Skipped,
}

/// Shared by every trigger source so that at most one run is in flight.
#[derive(Clone)]
struct RunGuard {
    lock: Arc<Mutex<()>>,
    closed: Arc<AtomicBool>,
}

impl RunGuard {
    fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn run<E: RenderingEngine>(&self, runner: &JobRunner<E>, source: &'static str) -> TriggerOutcome {
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!(source, "Scheduler is shutting down, ignoring trigger");
            return TriggerOutcome::Skipped;
        }

        let _guard = match self.lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!(source, "A price check run is still in progress, dropping trigger");
                return TriggerOutcome::Skipped;
            }
        };

        tracing::info!(source, "Price check triggered");
        match runner.run_once().await {
            Ok(report) => TriggerOutcome::Completed(report),
            Err(e) => TriggerOutcome::Aborted(e),
        }
    }
}

pub struct PriceCheckScheduler<E: RenderingEngine> {
    scheduler: JobScheduler,
    runner: Arc<JobRunner<E>>,
    guard: RunGuard,
    config: SchedulerConfig,
    warmup: Option<JoinHandle<()>>,
}

impl<E: RenderingEngine> PriceCheckScheduler<E> {
    pub async fn new(runner: Arc<JobRunner<E>>, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            runner,
            guard: RunGuard::new(),
            config,
            warmup: None,
        })
    }

    pub fn runner(&self) -> &Arc<JobRunner<E>> {
        &self.runner
    }

    /// Registers the recurring job, starts the cron loop and queues the
    /// start-up run behind the warm-up delay.
    pub async fn start(&mut self) -> Result<()> {
        let runner = Arc::clone(&self.runner);
        let guard = self.guard.clone();

        let job = Job::new_async(self.config.cron.as_str(), move |_uuid, _l| {
            let runner = Arc::clone(&runner);
            let guard = guard.clone();

            Box::pin(async move {
                guard.run(&runner, "cron").await;
            })
        })?;

        self.scheduler.add(job).await?;
        self.scheduler.start().await?;
        tracing::info!(cron = %self.config.cron, "Price check scheduler started");

        let runner = Arc::clone(&self.runner);
        let guard = self.guard.clone();
        let warmup = Duration::from_secs(self.config.warmup_secs);
        self.warmup = Some(tokio::spawn(async move {
            tokio::time::sleep(warmup).await;
            guard.run(&runner, "startup").await;
        }));

        Ok(())
    }

    /// Manual trigger. Dropped like any other trigger when a run is active.
    pub async fn run_now(&self) -> TriggerOutcome {
        self.guard.run(&self.runner, "manual").await
    }

    /// Stops new triggers, then gives the in-flight run the grace period to finish.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.guard.closed.store(true, Ordering::SeqCst);
        self.scheduler.shutdown().await?;

        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        match tokio::time::timeout(grace, self.guard.lock.lock()).await {
            Ok(_idle) => tracing::info!("Price check scheduler shutdown"),
            Err(_) => tracing::warn!(
                grace_secs = grace.as_secs(),
                "Run still in progress after grace period, abandoning it"
            ),
        }

        if let Some(warmup) = self.warmup.take() {
            warmup.abort();
        }
        Ok(())
    }
}
