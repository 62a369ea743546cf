//! Marathon tracker: `!marathon` chat commands, RPC, a public status page
//! and an admin listing.

mod state;

pub use state::{Advance, GameStatus, Marathon, MarathonError, MarathonGame};

use super::{Module, ModuleFactory};
use crate::bot::BotHandle;
use crate::commands::{CommandEngine, FnHandler, DEFAULT_LEVEL, MODERATOR_LEVEL};
use crate::context::CommandContext;
use crate::error::{CommandError, ModuleError, RpcError};
use crate::rpc::{parse_params, require_admin, to_result, RequestOrigin, RpcService};
use async_trait::async_trait;
use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use module_store::{Bucket, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

pub const MODULE_TYPE: &str = "marathon";

/// Marathon the chat commands and status page operate on.
pub const CURRENT_MARATHON: u64 = 1;

/// Marathon records plus one lock per marathon id.
///
/// Every read-modify-write of a marathon runs under its id's lock, so chat
/// commands and RPC updates on the same marathon never interleave.
pub struct MarathonStore {
    bucket: Bucket,
    locks: parking_lot::Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>,
}

impl MarathonStore {
    pub fn new(bucket: Bucket) -> Self {
        Self {
            bucket,
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, id: u64) -> Arc<AsyncMutex<()>> {
        self.locks.lock().entry(id).or_default().clone()
    }

    pub async fn get(&self, id: u64) -> Result<Marathon, StoreError> {
        self.bucket.one(id).await
    }

    pub async fn all(&self) -> Result<Vec<Marathon>, StoreError> {
        self.bucket.all().await
    }

    /// Store a new marathon and return its id.
    pub async fn create(&self, mut marathon: Marathon) -> Result<u64, StoreError> {
        marathon.id = 0;
        self.bucket.save(&mut marathon).await?;
        info!(id = marathon.id, name = %marathon.name, "Created marathon");
        Ok(marathon.id)
    }

    /// Overwrite a stored marathon.
    pub async fn replace(&self, mut marathon: Marathon) -> Result<u64, StoreError> {
        let lock = self.lock_for(marathon.id);
        let _guard = lock.lock().await;
        self.bucket.save(&mut marathon).await?;
        Ok(marathon.id)
    }

    /// Apply `f` to marathon `id` and save it. Nothing is saved if `f` fails.
    pub async fn update<T, E, F>(&self, id: u64, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Marathon) -> Result<T, E> + Send,
        T: Send,
        E: From<StoreError>,
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut marathon: Marathon = self.bucket.one(id).await?;
        let out = f(&mut marathon)?;
        self.bucket.save(&mut marathon).await?;
        Ok(out)
    }
}

pub struct MarathonFactory;

#[async_trait]
impl ModuleFactory for MarathonFactory {
    async fn create(&self, bot: BotHandle, bucket: Bucket) -> anyhow::Result<Box<dyn Module>> {
        let store = Arc::new(MarathonStore::new(bucket));
        let subcommands = Arc::new(subcommand_engine(&store)?);

        let marathon_store = store.clone();
        bot.add_command(
            "marathon",
            "Marathon status and control.",
            FnHandler::new(move |ctx: CommandContext, args: Vec<String>| {
                let store = marathon_store.clone();
                let subcommands = subcommands.clone();
                async move {
                    let Some((name, rest)) = args.split_first() else {
                        return show_marathon(&store, &ctx).await;
                    };
                    let level = ctx.level;
                    subcommands.exec(ctx, level, name, rest.to_vec()).await
                }
            }),
            DEFAULT_LEVEL,
        )?;

        let service = Arc::new(MarathonService {
            bot,
            store: store.clone(),
        });
        Ok(Box::new(MarathonModule { store, service }))
    }
}

fn subcommand_engine(
    store: &Arc<MarathonStore>,
) -> Result<CommandEngine<CommandContext>, CommandError> {
    let engine = CommandEngine::new();

    let next_store = store.clone();
    engine.add(
        "next",
        "go to next game",
        FnHandler::new(move |ctx: CommandContext, _args| next_command(next_store.clone(), ctx)),
        MODERATOR_LEVEL,
    )?;

    let reset_store = store.clone();
    engine.add(
        "resetgame",
        "reset the game",
        FnHandler::new(move |ctx: CommandContext, _args| {
            reset_command(reset_store.clone(), ctx, Marathon::reset_game)
        }),
        MODERATOR_LEVEL,
    )?;

    let reset_all_store = store.clone();
    engine.add(
        "resetmarathon",
        "reset the marathon",
        FnHandler::new(move |ctx: CommandContext, _args| {
            reset_command(reset_all_store.clone(), ctx, Marathon::reset_marathon)
        }),
        MODERATOR_LEVEL,
    )?;

    Ok(engine)
}

async fn show_marathon(store: &MarathonStore, ctx: &CommandContext) -> Result<(), CommandError> {
    let marathon = match store.get(CURRENT_MARATHON).await {
        Ok(marathon) => Some(marathon),
        Err(StoreError::NotFound { .. }) => None,
        Err(e) => return Err(e.into()),
    };

    match marathon.as_ref().and_then(Marathon::current_game) {
        Some(game) => ctx.say(format!("Current game is: {}", game.name)).await,
        None => ctx.say("Marathon is not running").await,
    }
}

async fn next_command(store: Arc<MarathonStore>, ctx: CommandContext) -> Result<(), CommandError> {
    let advance = store
        .update(CURRENT_MARATHON, |marathon| {
            marathon
                .advance(Utc::now())
                .map_err(|e| CommandError::Failed(e.to_string()))
        })
        .await?;

    if let Some(game) = &advance.finished {
        ctx.say(format!("{} complete!", game.name)).await?;
    }

    if let Some(game) = &advance.started {
        ctx.say(format!("{} started!", game.name)).await?;

        // Logged only; the transition above is already saved.
        let stream_game = game.stream_game();
        if let Err(e) = ctx.api.set_channel_game(&ctx.channel, stream_game).await {
            warn!(game = %stream_game, "Failed to set stream game: {}", e);
        }
    }
    Ok(())
}

async fn reset_command(
    store: Arc<MarathonStore>,
    ctx: CommandContext,
    reset: fn(&mut Marathon),
) -> Result<(), CommandError> {
    store
        .update(CURRENT_MARATHON, |marathon| {
            reset(marathon);
            Ok::<_, CommandError>(())
        })
        .await?;
    info!(user = %ctx.user.username, "Marathon reset");
    ctx.say("RESET!").await
}

pub struct MarathonModule {
    store: Arc<MarathonStore>,
    service: Arc<MarathonService>,
}

#[async_trait]
impl Module for MarathonModule {
    async fn start(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn rpc_service(&self) -> Option<Arc<dyn RpcService>> {
        Some(self.service.clone())
    }

    fn public_routes(&self) -> Option<Router> {
        Some(
            Router::new()
                .route("/status", get(status_page))
                .with_state(self.store.clone()),
        )
    }

    fn admin_routes(&self) -> Option<Router> {
        Some(
            Router::new()
                .route("/marathons", get(list_marathons))
                .with_state(self.store.clone()),
        )
    }
}

/// RPC methods: `New` and `Update` (admin), `Get`.
pub struct MarathonService {
    bot: BotHandle,
    store: Arc<MarathonStore>,
}

#[async_trait]
impl RpcService for MarathonService {
    async fn call(
        &self,
        origin: &RequestOrigin,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        match method {
            "New" => {
                require_admin(&self.bot, origin)?;
                let marathon: Marathon = parse_params(params)?;
                validate(&marathon)?;
                to_result(&self.store.create(marathon).await?)
            }
            "Update" => {
                require_admin(&self.bot, origin)?;
                let marathon: Marathon = parse_params(params)?;
                if marathon.id == 0 {
                    return Err(RpcError::InvalidParams("marathon id required".into()));
                }
                validate(&marathon)?;
                to_result(&self.store.replace(marathon).await?)
            }
            "Get" => {
                let id: u64 = parse_params(params)?;
                to_result(&self.store.get(id).await?)
            }
            other => Err(RpcError::UnknownMethod(other.to_string())),
        }
    }
}

fn validate(marathon: &Marathon) -> Result<(), RpcError> {
    marathon
        .validate()
        .map_err(|e| RpcError::InvalidParams(e.to_string()))
}

/// Public JSON view of a marathon.
#[derive(Debug, Serialize)]
pub struct MarathonStatus {
    pub id: u64,
    pub name: String,
    pub current: Option<String>,
    pub games: Vec<GameView>,
}

#[derive(Debug, Serialize)]
pub struct GameView {
    pub name: String,
    pub system: Option<String>,
    pub link: Option<String>,
    pub status: &'static str,
    pub time: String,
}

impl MarathonStatus {
    pub fn render(marathon: &Marathon, now: DateTime<Utc>) -> Self {
        Self {
            id: marathon.id,
            name: marathon.name.clone(),
            current: marathon.current_game().map(|g| g.name.clone()),
            games: marathon
                .games
                .iter()
                .map(|game| GameView {
                    name: game.name.clone(),
                    system: game.system.clone(),
                    link: game.link.clone(),
                    status: game.status.label(),
                    time: game.render_time(now),
                })
                .collect(),
        }
    }
}

async fn status_page(
    State(store): State<Arc<MarathonStore>>,
) -> Result<Json<MarathonStatus>, RpcError> {
    let marathon = store.get(CURRENT_MARATHON).await?;
    Ok(Json(MarathonStatus::render(&marathon, Utc::now())))
}

/// Every stored marathon, games and timestamps included.
async fn list_marathons(
    State(store): State<Arc<MarathonStore>>,
) -> Result<Json<Vec<Marathon>>, RpcError> {
    Ok(Json(store.all().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemoryTransport;
    use crate::testing::{chat_message, test_bot, MockApi};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use module_store::Store;
    use serde_json::json;
    use tower::ServiceExt;
    use twitch_api_client::ApiError;

    struct Fixture {
        bot: BotHandle,
        chat: Arc<MemoryTransport>,
        module: Box<dyn Module>,
    }

    async fn fixture(api: MockApi) -> Fixture {
        let (bot, chat) = test_bot(api);
        let module = MarathonFactory
            .create(bot.clone(), Store::memory().bucket("marathon"))
            .await
            .unwrap();
        Fixture { bot, chat, module }
    }

    fn mega_man() -> Value {
        json!([{
            "name": "Mega Man",
            "games": [
                {"name": "Mega Man 1", "twitch_game": "Mega Man", "system": "NES"},
                {"name": "Mega Man 2", "system": "NES"},
            ]
        }])
    }

    async fn rpc(f: &Fixture, method: &str, params: Value) -> Result<Value, RpcError> {
        let service = f.module.rpc_service().unwrap();
        service.call(&RequestOrigin::Internal, method, params).await
    }

    #[tokio::test]
    async fn test_marathon_not_running() {
        let f = fixture(MockApi::new()).await;

        f.bot.handle_message(chat_message("rush", "!marathon")).await.unwrap();
        rpc(&f, "New", mega_man()).await.unwrap();
        f.bot.handle_message(chat_message("rush", "!marathon")).await.unwrap();

        assert_eq!(
            f.chat.said(),
            vec!["Marathon is not running", "Marathon is not running"]
        );
    }

    #[tokio::test]
    async fn test_next_and_reset_from_chat() {
        let mut api = MockApi::new();
        api.expect_set_channel_game()
            .withf(|channel: &str, game: &str| channel == "testchan" && game == "Mega Man")
            .times(1)
            .returning(|_, _| Ok(()));
        api.expect_set_channel_game()
            .withf(|_: &str, game: &str| game == "Mega Man 2")
            .times(1)
            .returning(|_, _| Ok(()));

        let f = fixture(api).await;
        assert_eq!(rpc(&f, "New", mega_man()).await.unwrap(), json!(1));

        f.bot.handle_message(chat_message("konkers", "!marathon next")).await.unwrap();
        f.bot.handle_message(chat_message("rush", "!marathon")).await.unwrap();
        f.bot.handle_message(chat_message("konkers", "!marathon next")).await.unwrap();
        f.bot.handle_message(chat_message("konkers", "!marathon resetgame")).await.unwrap();
        f.bot.handle_message(chat_message("rush", "!marathon")).await.unwrap();

        assert_eq!(
            f.chat.said(),
            vec![
                "Mega Man 1 started!",
                "Current game is: Mega Man 1",
                "Mega Man 1 complete!",
                "Mega Man 2 started!",
                "RESET!",
                "Marathon is not running",
            ]
        );

        let marathon: Marathon =
            serde_json::from_value(rpc(&f, "Get", json!([1])).await.unwrap()).unwrap();
        assert_eq!(marathon.games[0].status, GameStatus::Finished);
        assert_eq!(marathon.games[1].status, GameStatus::NotStarted);
        assert!(marathon.games[1].started_time.is_none());

        f.bot
            .handle_message(chat_message("konkers", "!marathon resetmarathon"))
            .await
            .unwrap();
        let marathon: Marathon =
            serde_json::from_value(rpc(&f, "Get", json!(1)).await.unwrap()).unwrap();
        assert!(marathon
            .games
            .iter()
            .all(|g| g.status == GameStatus::NotStarted && g.ended_time.is_none()));
    }

    #[tokio::test]
    async fn test_subcommands_require_moderator() {
        let f = fixture(MockApi::new()).await;
        rpc(&f, "New", mega_man()).await.unwrap();

        let result = f
            .bot
            .handle_message(chat_message("rush", "!marathon next"))
            .await;

        assert!(matches!(
            result,
            Err(CommandError::InsufficientPrivilege { level: 0, required: 10 })
        ));
        assert_eq!(f.chat.said(), vec!["user level 0 not >= 10"]);
    }

    #[tokio::test]
    async fn test_stream_game_failure_keeps_transition() {
        let mut api = MockApi::new();
        api.expect_set_channel_game()
            .returning(|_, _| Err(ApiError::Unauthorized));

        let f = fixture(api).await;
        rpc(&f, "New", mega_man()).await.unwrap();

        f.bot.handle_message(chat_message("konkers", "!marathon next")).await.unwrap();

        let marathon: Marathon =
            serde_json::from_value(rpc(&f, "Get", json!(1)).await.unwrap()).unwrap();
        assert_eq!(marathon.games[0].status, GameStatus::Running);
        assert_eq!(f.chat.said(), vec!["Mega Man 1 started!"]);
    }

    #[tokio::test]
    async fn test_next_without_games_saves_nothing() {
        let f = fixture(MockApi::new()).await;
        rpc(&f, "New", json!({"name": "empty"})).await.unwrap();

        let result = f
            .bot
            .handle_message(chat_message("konkers", "!marathon next"))
            .await;
        assert!(matches!(result, Err(CommandError::Failed(_))));
        assert!(f.chat.said().is_empty());
    }

    #[tokio::test]
    async fn test_rpc_access_control() {
        let f = fixture(MockApi::new()).await;
        let service = f.module.rpc_service().unwrap();
        let outsider = RequestOrigin::remote(Some("test-client-id"), None);

        let result = service.call(&outsider, "New", mega_man()).await;
        assert!(matches!(result, Err(RpcError::AccessDenied)));

        rpc(&f, "New", mega_man()).await.unwrap();
        let result = service
            .call(&outsider, "Update", json!({"id": 1, "name": "x"}))
            .await;
        assert!(matches!(result, Err(RpcError::AccessDenied)));

        // Reads are open.
        assert!(service.call(&outsider, "Get", json!(1)).await.is_ok());
        assert!(matches!(
            service.call(&outsider, "Get", json!(9)).await,
            Err(RpcError::NotFound(_))
        ));
        assert!(matches!(
            service.call(&outsider, "Nope", json!(null)).await,
            Err(RpcError::UnknownMethod(_))
        ));
    }

    #[tokio::test]
    async fn test_update_replaces_record() {
        let f = fixture(MockApi::new()).await;
        rpc(&f, "New", mega_man()).await.unwrap();

        let id = rpc(&f, "Update", json!({"id": 1, "name": "Renamed", "games": []}))
            .await
            .unwrap();
        assert_eq!(id, json!(1));

        let marathon: Marathon =
            serde_json::from_value(rpc(&f, "Get", json!(1)).await.unwrap()).unwrap();
        assert_eq!(marathon.name, "Renamed");
        assert!(marathon.games.is_empty());

        assert!(matches!(
            rpc(&f, "Update", json!({"name": "no id"})).await,
            Err(RpcError::InvalidParams(_))
        ));
    }

    #[tokio::test]
    async fn test_update_rejects_inconsistent_games() {
        let f = fixture(MockApi::new()).await;
        rpc(&f, "New", mega_man()).await.unwrap();

        let two_running = json!({"id": 1, "name": "Mega Man", "games": [
            {"name": "Mega Man 1", "status": "running"},
            {"name": "Mega Man 2", "status": "running"},
        ]});
        assert!(matches!(
            rpc(&f, "Update", two_running).await,
            Err(RpcError::InvalidParams(_))
        ));

        let out_of_order = json!({"id": 1, "name": "Mega Man", "games": [
            {"name": "Mega Man 1"},
            {"name": "Mega Man 2", "status": "running"},
        ]});
        assert!(matches!(
            rpc(&f, "Update", out_of_order).await,
            Err(RpcError::InvalidParams(_))
        ));

        let stored: Marathon =
            serde_json::from_value(rpc(&f, "Get", json!(1)).await.unwrap()).unwrap();
        assert!(stored
            .games
            .iter()
            .all(|g| g.status == GameStatus::NotStarted));

        let resumed = json!({"id": 1, "name": "Mega Man", "games": [
            {"name": "Mega Man 1", "status": "finished"},
            {"name": "Mega Man 2", "status": "running"},
        ]});
        rpc(&f, "Update", resumed).await.unwrap();
        assert!(matches!(
            rpc(&f, "New", json!({"name": "x", "games": [
                {"name": "a", "status": "running"},
                {"name": "b", "status": "running"},
            ]}))
            .await,
            Err(RpcError::InvalidParams(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let store = Arc::new(MarathonStore::new(Store::memory().bucket("marathon")));
        store
            .create(Marathon {
                name: "counter".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update(CURRENT_MARATHON, |m| {
                        m.games.push(MarathonGame::new(format!("game {}", i)));
                        Ok::<_, StoreError>(())
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.get(CURRENT_MARATHON).await.unwrap().games.len(), 20);
    }

    #[tokio::test]
    async fn test_status_route() {
        let f = fixture(MockApi::new()).await;
        let router = f.module.public_routes().unwrap();

        let response = router
            .clone()
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        rpc(&f, "New", mega_man()).await.unwrap();
        let response = router
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let status: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status["name"], "Mega Man");
        assert_eq!(status["current"], Value::Null);
        assert_eq!(status["games"][0]["status"], "not started");
        assert_eq!(status["games"][0]["time"], "?:??:??");
        assert_eq!(status["games"][1]["system"], "NES");
    }
}
