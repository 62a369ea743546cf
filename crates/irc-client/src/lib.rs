//! Twitch chat (IRC) client.

mod client;
mod error;
mod types;

pub use client::{ChatStream, ChatTransport, IrcClient};
pub use error::IrcError;
pub use types::*;
