//! Twitch channel API client.

mod client;
mod error;
mod types;

pub use client::{ChannelApi, TwitchApiClient};
pub use error::ApiError;
pub use types::*;
