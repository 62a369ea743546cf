//! Marathon records and their game-by-game state machine.

use chrono::{DateTime, Utc};
use module_store::Record;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MarathonError {
    #[error("marathon has no games")]
    NoGames,

    #[error("more than one game is running")]
    MultipleRunning,

    #[error("game {0} is running behind a game that has not started")]
    RunningOutOfOrder(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    NotStarted,
    Running,
    Finished,
}

impl GameStatus {
    /// Human-readable status.
    pub fn label(self) -> &'static str {
        match self {
            GameStatus::NotStarted => "not started",
            GameStatus::Running => "running",
            GameStatus::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarathonGame {
    pub name: String,
    /// Platform game name to set on the stream, if different from `name`.
    #[serde(default)]
    pub twitch_game: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub status: GameStatus,
    #[serde(default)]
    pub started_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_time: Option<DateTime<Utc>>,
}

impl MarathonGame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Game to show on the stream while this one runs.
    pub fn stream_game(&self) -> &str {
        self.twitch_game.as_deref().unwrap_or(&self.name)
    }

    fn reset(&mut self) {
        self.status = GameStatus::NotStarted;
        self.started_time = None;
        self.ended_time = None;
    }

    /// Play time as `H:MM:SS`, `?:??:??` if not started. Running games are
    /// measured up to `now`.
    pub fn render_time(&self, now: DateTime<Utc>) -> String {
        let Some(started) = self.started_time else {
            return "?:??:??".to_string();
        };
        let end = self.ended_time.unwrap_or(now);
        let seconds = (end - started).num_seconds().max(0);

        format!(
            "{}:{:02}:{:02}",
            seconds / 3600,
            (seconds % 3600) / 60,
            seconds % 60
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marathon {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub games: Vec<MarathonGame>,
}

impl Record for Marathon {
    const KIND: &'static str = "marathon";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

/// Games touched by one [`Marathon::advance`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advance {
    pub finished: Option<MarathonGame>,
    pub started: Option<MarathonGame>,
}

impl Marathon {
    /// The running game, if any.
    pub fn current_game(&self) -> Option<&MarathonGame> {
        self.games
            .iter()
            .find(|g| g.status == GameStatus::Running)
    }

    /// Check that at most one game is running and that no not-started game
    /// comes before it.
    pub fn validate(&self) -> Result<(), MarathonError> {
        let mut running = false;
        let mut pending = false;
        for game in &self.games {
            match game.status {
                GameStatus::NotStarted => pending = true,
                GameStatus::Running if running => return Err(MarathonError::MultipleRunning),
                GameStatus::Running if pending => {
                    return Err(MarathonError::RunningOutOfOrder(game.name.clone()))
                }
                GameStatus::Running => running = true,
                GameStatus::Finished => {}
            }
        }
        Ok(())
    }

    /// Finish the running game and start the next one.
    ///
    /// Scans in order: a running game is finished and the scan goes on; the
    /// first not-started game is started and the scan stops there.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<Advance, MarathonError> {
        if self.games.is_empty() {
            return Err(MarathonError::NoGames);
        }

        let mut advance = Advance::default();
        for game in &mut self.games {
            match game.status {
                GameStatus::NotStarted => {
                    game.status = GameStatus::Running;
                    game.started_time = Some(now);
                    advance.started = Some(game.clone());
                    break;
                }
                GameStatus::Running => {
                    game.status = GameStatus::Finished;
                    game.ended_time = Some(now);
                    if advance.finished.is_none() {
                        advance.finished = Some(game.clone());
                    }
                }
                GameStatus::Finished => {}
            }
        }
        Ok(advance)
    }

    /// Put the running game back to not started.
    pub fn reset_game(&mut self) {
        self.games
            .iter_mut()
            .filter(|g| g.status == GameStatus::Running)
            .for_each(MarathonGame::reset);
    }

    /// Put every game back to not started.
    pub fn reset_marathon(&mut self) {
        self.games.iter_mut().for_each(MarathonGame::reset);
    }
}
