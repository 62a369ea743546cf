//! Follower-only giveaways entered with `!giveaway <tag>`.

use super::{Module, ModuleFactory};
use crate::bot::BotHandle;
use crate::commands::{FnHandler, DEFAULT_LEVEL};
use crate::context::CommandContext;
use crate::error::{CommandError, ModuleError, RpcError};
use crate::rpc::{parse_params, require_admin, to_result, RequestOrigin, RpcService};
use async_trait::async_trait;
use module_store::{Bucket, Record, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub const MODULE_TYPE: &str = "giveaway";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Giveaway {
    #[serde(default)]
    pub id: u64,
    pub tag: String,
    #[serde(default)]
    pub desc: String,
    /// Login names, in entry order.
    #[serde(default)]
    pub participants: Vec<String>,
}

impl Record for Giveaway {
    const KIND: &'static str = "giveaway";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

/// Giveaway records. Writes go through `write_lock` so an entry is never
/// lost to a concurrent update of the same record.
struct Giveaways {
    bucket: Bucket,
    write_lock: Mutex<()>,
}

pub struct GiveawayFactory;

#[async_trait]
impl ModuleFactory for GiveawayFactory {
    async fn create(&self, bot: BotHandle, bucket: Bucket) -> anyhow::Result<Box<dyn Module>> {
        let giveaways = Arc::new(Giveaways {
            bucket,
            write_lock: Mutex::new(()),
        });

        let command_state = giveaways.clone();
        bot.add_command(
            "giveaway",
            "Giveaway command",
            FnHandler::new(move |ctx: CommandContext, args: Vec<String>| {
                let giveaways = command_state.clone();
                async move {
                    match args.first() {
                        None => list_giveaways(&giveaways, &ctx).await,
                        Some(tag) => enter_giveaway(&giveaways, &ctx, tag).await,
                    }
                }
            }),
            DEFAULT_LEVEL,
        )?;

        Ok(Box::new(GiveawayModule {
            service: Arc::new(GiveawayService { bot, giveaways }),
        }))
    }
}

async fn list_giveaways(giveaways: &Giveaways, ctx: &CommandContext) -> Result<(), CommandError> {
    let all: Vec<Giveaway> = giveaways.bucket.all().await?;

    ctx.say("To register for one of the giveaways type !giveaway <tag>.  The list of tags are:")
        .await?;
    for giveaway in &all {
        ctx.say(format!("  {} - {}", giveaway.tag, giveaway.desc))
            .await?;
    }
    Ok(())
}

async fn enter_giveaway(
    giveaways: &Giveaways,
    ctx: &CommandContext,
    tag: &str,
) -> Result<(), CommandError> {
    let follows = ctx.api.get_channel_follows(&ctx.channel).await?;
    if !follows.contains(ctx.user.user_id) {
        return ctx
            .say("Giveaway only open to followers.  Please follow and try again :)")
            .await;
    }

    let _guard = giveaways.write_lock.lock().await;

    let mut giveaway: Giveaway = match giveaways.bucket.find_one("tag", &json!(tag)).await {
        Ok(giveaway) => giveaway,
        Err(StoreError::NotFound { .. }) => {
            return ctx
                .say(format!(
                    "There's no {} giveaway.  Type !giveaway for a list",
                    tag
                ))
                .await;
        }
        Err(e) => return Err(e.into()),
    };

    let username = &ctx.user.username;
    if giveaway.participants.contains(username) {
        return ctx
            .say(format!("{}, you're already registered.", ctx.user.display_name))
            .await;
    }

    giveaway.participants.push(username.clone());
    giveaways.bucket.save(&mut giveaway).await?;
    info!(%tag, user = %username, entries = giveaway.participants.len(), "Giveaway entry");

    ctx.say(format!(
        "{}, you're now registered for the {} giveaway.",
        username, giveaway.desc
    ))
    .await
}

pub struct GiveawayModule {
    service: Arc<GiveawayService>,
}

#[async_trait]
impl Module for GiveawayModule {
    async fn start(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn rpc_service(&self) -> Option<Arc<dyn RpcService>> {
        Some(self.service.clone())
    }
}

/// RPC methods: `New` and `Update` (admin), `Get`, `All`.
pub struct GiveawayService {
    bot: BotHandle,
    giveaways: Arc<Giveaways>,
}

impl GiveawayService {
    async fn save(&self, mut giveaway: Giveaway) -> Result<Value, RpcError> {
        let _guard = self.giveaways.write_lock.lock().await;
        self.giveaways.bucket.save(&mut giveaway).await?;
        to_result(&giveaway.id)
    }
}

#[async_trait]
impl RpcService for GiveawayService {
    async fn call(
        &self,
        origin: &RequestOrigin,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        match method {
            "New" => {
                require_admin(&self.bot, origin)?;
                let mut giveaway: Giveaway = parse_params(params)?;
                giveaway.id = 0;
                self.save(giveaway).await
            }
            "Update" => {
                require_admin(&self.bot, origin)?;
                let giveaway: Giveaway = parse_params(params)?;
                self.save(giveaway).await
            }
            "Get" => {
                let id: u64 = parse_params(params)?;
                to_result(&self.giveaways.bucket.one::<Giveaway>(id).await?)
            }
            "All" => to_result(&self.giveaways.bucket.all::<Giveaway>().await?),
            other => Err(RpcError::UnknownMethod(other.to_string())),
        }
    }
}
