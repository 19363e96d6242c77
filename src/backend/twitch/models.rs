use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ApiFailure;
use super::transport::{empty_record, ApiResponse};

/// Outcome of a remote call: the raw answer plus either the decoded value
/// or the reason there is none.
///
/// [`ApiResult::into_data`] turns a failure into the type's sentinel
/// (e.g. a [`UserInfo`] with `id == -1`).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResult<T> {
    /// HTTP status, 0 when no request was made or no response arrived
    pub status: u16,
    pub json: Value,
    pub outcome: Result<T, ApiFailure>,
}

impl<T> ApiResult<T> {
    pub fn failed(failure: ApiFailure) -> Self {
        Self {
            status: 0,
            json: empty_record(),
            outcome: Err(failure),
        }
    }

    pub fn from_response<F>(response: ApiResponse, decode: F) -> Self
    where
        F: FnOnce(&ApiResponse) -> Result<T, ApiFailure>,
    {
        let outcome = if response.is_transport_failure() {
            Err(ApiFailure::Transport)
        } else {
            decode(&response)
        };

        Self {
            status: response.status,
            json: response.json,
            outcome,
        }
    }

    /// Decode the first entry of the `data` array
    pub fn from_first_data<F>(response: ApiResponse, decode: F) -> Self
    where
        F: FnOnce(&Value) -> Option<T>,
    {
        Self::from_response(response, |response| match response.first_data() {
            Some(data) => decode(data).ok_or(ApiFailure::Malformed),
            None if !response.is_success() => Err(ApiFailure::Rejected {
                status: response.status,
            }),
            None => Err(ApiFailure::NotFound),
        })
    }

    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn data(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn failure(&self) -> Option<ApiFailure> {
        self.outcome.as_ref().err().copied()
    }
}

impl<T: Default> ApiResult<T> {
    /// The decoded value, or the type's sentinel on failure
    pub fn into_data(self) -> T {
        self.outcome.unwrap_or_default()
    }
}

/// User record from `helix/users`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub login: String,
    pub display_name: String,
    pub user_type: String,
    pub broadcaster_type: String,
    pub description: String,
    pub profile_image_url: String,
    pub offline_image_url: String,
    pub view_count: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl Default for UserInfo {
    fn default() -> Self {
        Self {
            id: -1,
            login: String::new(),
            display_name: String::new(),
            user_type: String::new(),
            broadcaster_type: String::new(),
            description: String::new(),
            profile_image_url: String::new(),
            offline_image_url: String::new(),
            view_count: -1,
            created_at: None,
        }
    }
}

#[derive(Deserialize)]
struct HelixUser {
    id: String,
    login: String,
    #[serde(default)]
    display_name: String,
    #[serde(default, rename = "type")]
    user_type: String,
    #[serde(default)]
    broadcaster_type: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    profile_image_url: String,
    #[serde(default)]
    offline_image_url: String,
    #[serde(default)]
    view_count: i64,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl UserInfo {
    pub fn from_helix(data: &Value) -> Option<Self> {
        let raw: HelixUser = serde_json::from_value(data.clone()).ok()?;

        Some(Self {
            id: raw.id.trim().parse().ok()?,
            login: raw.login,
            display_name: raw.display_name,
            user_type: raw.user_type,
            broadcaster_type: raw.broadcaster_type,
            description: raw.description,
            profile_image_url: raw.profile_image_url,
            offline_image_url: raw.offline_image_url,
            view_count: raw.view_count,
            created_at: raw.created_at,
        })
    }
}

/// Live stream record from `helix/streams`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamInfo {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    pub game_id: String,
    pub game_name: String,
    #[serde(rename = "type")]
    pub stream_type: String,
    pub title: String,
    pub viewer_count: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub language: String,
    pub thumbnail_url: String,
    pub tags: Vec<String>,
    pub is_mature: bool,
}

impl Default for StreamInfo {
    fn default() -> Self {
        Self {
            id: String::new(),
            user_id: String::new(),
            user_login: String::new(),
            user_name: String::new(),
            game_id: String::new(),
            game_name: String::new(),
            stream_type: String::new(),
            title: String::new(),
            viewer_count: -1,
            started_at: None,
            language: String::new(),
            thumbnail_url: String::new(),
            tags: Vec::new(),
            is_mature: false,
        }
    }
}

impl StreamInfo {
    pub fn from_helix(data: &Value) -> Option<Self> {
        serde_json::from_value::<Self>(data.clone())
            .ok()
            .filter(|stream| !stream.id.is_empty())
    }
}

/// Channel record from `helix/channels`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelInfo {
    pub broadcaster_id: String,
    pub broadcaster_login: String,
    pub broadcaster_name: String,
    pub broadcaster_language: String,
    pub game_id: String,
    pub game_name: String,
    pub title: String,
}

impl ChannelInfo {
    pub fn from_helix(data: &Value) -> Option<Self> {
        serde_json::from_value::<Self>(data.clone())
            .ok()
            .filter(|channel| !channel.broadcaster_id.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Chatter {
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
}

/// Users connected to a channel's chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chatters {
    pub chatters: Vec<Chatter>,
    pub total: i64,
}

impl Default for Chatters {
    fn default() -> Self {
        Self {
            chatters: Vec::new(),
            total: -1,
        }
    }
}

#[derive(Deserialize)]
struct HelixChatters {
    data: Vec<Chatter>,
    #[serde(default)]
    total: Option<i64>,
}

impl Chatters {
    pub fn from_helix(json: &Value) -> Option<Self> {
        let raw: HelixChatters = serde_json::from_value(json.clone()).ok()?;
        let total = raw.total.unwrap_or(raw.data.len() as i64);

        Some(Self {
            chatters: raw.data,
            total,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowRecord {
    pub from_id: String,
    pub from_login: String,
    pub from_name: String,
    pub to_id: String,
    pub to_name: String,
    pub followed_at: Option<DateTime<Utc>>,
}

/// Followers of a user from `helix/users/follows`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFollowers {
    pub follower_count: i64,
    pub following: String,
    pub following_id: i64,
    pub followers: Vec<FollowRecord>,
}

impl Default for UserFollowers {
    fn default() -> Self {
        Self {
            follower_count: -1,
            following: String::new(),
            following_id: -1,
            followers: Vec::new(),
        }
    }
}

/// A single follow relationship from `helix/channels/followers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Follower {
    pub following: String,
    pub following_id: i64,
    pub id: i64,
    pub name: String,
    pub followed_at: DateTime<Utc>,
}

impl Default for Follower {
    fn default() -> Self {
        Self {
            following: String::new(),
            following_id: -1,
            id: -1,
            name: String::new(),
            followed_at: DateTime::<Utc>::MIN_UTC,
        }
    }
}
