//! Channel API types.

use serde::{Deserialize, Serialize};

/// Channel record as returned by `GET /channel`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(rename = "_id", default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    /// Current game. The API reports `null` when none is set.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub game: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub status: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// User half of a follow relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUser {
    #[serde(rename = "_id")]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub user: FollowUser,
}

/// Page of followers for a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follows {
    #[serde(rename = "_total", default)]
    pub total: u64,
    #[serde(default)]
    pub follows: Vec<Follow>,
}

impl Follows {
    /// Whether `user_id` appears in this page of followers.
    pub fn contains(&self, user_id: i64) -> bool {
        self.follows.iter().any(|f| f.user.id == user_id)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChannelUpdate<'a> {
    pub channel: ChannelUpdateFields<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChannelUpdateFields<'a> {
    pub game: &'a str,
}
