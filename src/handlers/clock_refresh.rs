use anyhow::Result;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

use super::session::Session;
use super::workflow::AnalysisWorkflow;
use crate::services::Clock;

/// Keeps the session's `currentTime` fresh while the session is alive.
///
/// The job only holds a weak reference to the session. `stop` shuts the
/// scheduler down and waits for it; dropping the refresher without `stop`
/// schedules the same shutdown on the current runtime.
pub struct ClockRefresher {
    scheduler: Option<JobScheduler>,
}

impl ClockRefresher {
    pub async fn start(workflow: &AnalysisWorkflow, every: Duration) -> Result<Self> {
        if every.is_zero() {
            anyhow::bail!("clock refresh interval must be greater than zero");
        }

        let mut scheduler = JobScheduler::new().await?;

        let session = Arc::downgrade(workflow.session());
        let clock = workflow.clock();

        let job = Job::new_repeated_async(every, move |_uuid, _l| {
            let session = session.clone();

            Box::pin(async move {
                refresh_tick(&session, &clock).await;
            })
        })?;

        scheduler.add(job).await?;
        if let Err(e) = scheduler.start().await {
            let _ = scheduler.shutdown().await;
            return Err(e.into());
        }

        log::info!("✅ Clock refresher started (every {}s)", every.as_secs());
        Ok(Self {
            scheduler: Some(scheduler),
        })
    }

    pub async fn stop(mut self) -> Result<()> {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.shutdown().await?;
        }
        log::info!("🛑 Clock refresher stopped");
        Ok(())
    }
}

impl Drop for ClockRefresher {
    fn drop(&mut self) {
        let Some(mut scheduler) = self.scheduler.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = scheduler.shutdown().await {
                        log::error!("❌ Clock refresher shutdown failed: {}", e);
                    }
                });
                log::debug!("🛑 Clock refresher dropped, shutdown scheduled");
            }
            Err(_) => log::warn!("⚠️ Clock refresher dropped outside a runtime"),
        }
    }
}

/// Refresh once. Returns false when the session is already gone.
async fn refresh_tick(session: &Weak<Mutex<Session>>, clock: &Clock) -> bool {
    match session.upgrade() {
        Some(session) => {
            session.lock().await.refresh_current_time(clock);
            log::debug!("🕐 Current time refreshed");
            true
        }
        None => {
            log::debug!("🕐 Session gone, skipping clock refresh");
            false
        }
    }
}
