//! Periodic chat alerts.
//!
//! A background worker wakes every [`TICK_INTERVAL`], says every alert whose
//! `next_alert` has passed and pushes it one period past the tick time.
//! Delivery is at-least-once: an alert is only rescheduled after it was said.

use super::{Module, ModuleFactory};
use crate::bot::BotHandle;
use crate::error::{ModuleError, RpcError};
use crate::rpc::{parse_params, require_admin, to_result, RequestOrigin, RpcService};
use crate::worker::{spawn_periodic, WorkerHandle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use module_store::{Bucket, Record};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const MODULE_TYPE: &str = "alert";

pub const TICK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub id: u64,
    /// Time between repeats, e.g. `"15m"`.
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    pub next_alert: DateTime<Utc>,
    pub message: String,
}

impl Alert {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_alert <= now
    }

    /// Schedule the next firing one period after `fired_at`.
    fn reschedule(&mut self, fired_at: DateTime<Utc>) {
        self.next_alert = chrono::Duration::from_std(self.period)
            .ok()
            .and_then(|period| fired_at.checked_add_signed(period))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}

impl Record for Alert {
    const KIND: &'static str = "alert";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

pub struct AlertFactory;

#[async_trait]
impl ModuleFactory for AlertFactory {
    async fn create(&self, bot: BotHandle, bucket: Bucket) -> anyhow::Result<Box<dyn Module>> {
        Ok(Box::new(AlertModule::new(bot, bucket)))
    }
}

/// Fires due alerts. Shared by the worker and the RPC service.
pub struct AlertRunner {
    bot: BotHandle,
    bucket: Bucket,
}

impl AlertRunner {
    /// Say every alert due at `now` and reschedule it. Returns how many fired.
    ///
    /// A storage failure skips the whole tick; a failed say leaves that
    /// alert due so the next tick retries it.
    pub async fn tick(&self, now: DateTime<Utc>) -> usize {
        let alerts: Vec<Alert> = match self.bucket.all().await {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!("Can't get alerts: {}", e);
                return 0;
            }
        };

        let mut fired = 0;
        for mut alert in alerts.into_iter().filter(|a| a.is_due(now)) {
            info!(id = alert.id, "Saying {:?}", alert.message);
            if let Err(e) = self.bot.say(&alert.message).await {
                warn!(id = alert.id, "Failed to say alert: {}", e);
                continue;
            }
            fired += 1;

            alert.reschedule(now);
            if let Err(e) = self.bucket.save(&mut alert).await {
                warn!(id = alert.id, "Failed to reschedule alert: {}", e);
            }
        }

        debug!(fired, "Alert tick done");
        fired
    }
}

pub struct AlertModule {
    runner: Arc<AlertRunner>,
    service: Arc<AlertService>,
    worker: Mutex<Option<WorkerHandle>>,
    tick_interval: Duration,
}

impl AlertModule {
    pub fn new(bot: BotHandle, bucket: Bucket) -> Self {
        let runner = Arc::new(AlertRunner {
            bot: bot.clone(),
            bucket: bucket.clone(),
        });
        Self {
            runner,
            service: Arc::new(AlertService { bot, bucket }),
            worker: Mutex::new(None),
            tick_interval: TICK_INTERVAL,
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn runner(&self) -> &AlertRunner {
        &self.runner
    }
}

#[async_trait]
impl Module for AlertModule {
    async fn start(&self) -> Result<(), ModuleError> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.is_finished()) {
            return Err(ModuleError::AlreadyStarted);
        }

        let runner = self.runner.clone();
        *worker = Some(spawn_periodic(
            "alert",
            self.tick_interval,
            CancellationToken::new(),
            move |now| {
                let runner = runner.clone();
                async move {
                    runner.tick(now).await;
                }
            },
        ));
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        if let Some(worker) = self.worker.lock().take() {
            worker.stop();
        }
        Ok(())
    }

    fn rpc_service(&self) -> Option<Arc<dyn RpcService>> {
        Some(self.service.clone())
    }
}

/// RPC methods: `New`, `Update`, `Del` and `Trigger` (admin), `Get`, `All`.
pub struct AlertService {
    bot: BotHandle,
    bucket: Bucket,
}

impl AlertService {
    async fn save(&self, mut alert: Alert) -> Result<Value, RpcError> {
        self.bucket.save(&mut alert).await?;
        to_result(&alert.id)
    }
}

#[async_trait]
impl RpcService for AlertService {
    async fn call(
        &self,
        origin: &RequestOrigin,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        match method {
            "New" => {
                require_admin(&self.bot, origin)?;
                let mut alert: Alert = parse_params(params)?;
                alert.id = 0;
                self.save(alert).await
            }
            "Update" => {
                require_admin(&self.bot, origin)?;
                let alert: Alert = parse_params(params)?;
                self.save(alert).await
            }
            "Get" => {
                let id: u64 = parse_params(params)?;
                to_result(&self.bucket.one::<Alert>(id).await?)
            }
            "All" => to_result(&self.bucket.all::<Alert>().await?),
            "Del" => {
                require_admin(&self.bot, origin)?;
                let id: u64 = parse_params(params)?;
                self.bucket.delete::<Alert>(id).await?;
                to_result(&id)
            }
            "Trigger" => {
                require_admin(&self.bot, origin)?;
                let id: u64 = parse_params(params)?;
                let mut alert: Alert = self.bucket.one(id).await?;
                alert.next_alert = Utc::now();
                self.save(alert).await
            }
            other => Err(RpcError::UnknownMethod(other.to_string())),
        }
    }
}
