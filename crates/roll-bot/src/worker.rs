//! Cancellable periodic background tasks.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Handle to a running periodic task.
pub struct WorkerHandle {
    name: &'static str,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Ask the task to exit. Does not wait for an in-flight tick.
    pub fn stop(&self) {
        debug!(worker = self.name, "Stopping worker");
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task to exit.
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Run `tick` every `period`, first after one full period, until `token` is
/// cancelled. Ticks never overlap; a slow tick delays the next one.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    token: CancellationToken,
    mut tick: F,
) -> WorkerHandle
where
    F: FnMut(DateTime<Utc>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let worker_token = token.clone();
    let join = tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(worker = name, ?period, "Worker started");

        loop {
            tokio::select! {
                biased;

                _ = worker_token.cancelled() => {
                    info!(worker = name, "Worker shutting down");
                    break;
                }

                _ = interval.tick() => {
                    tick(Utc::now()).await;
                }
            }
        }
    });

    WorkerHandle { name, token, join }
}
