use futures_util::join;
use serde_json::{json, Value};
use std::fmt;

use super::api::TwitchApi;
use super::auth::RequestHeaders;
use super::transport::ApiRequest;

/// Twitch truncates ban reasons and announcements past this many characters
pub const MAX_TEXT_LENGTH: usize = 500;
pub const MIN_BAN_DURATION: i64 = 1;
/// Two weeks
pub const MAX_BAN_DURATION: i64 = 1_209_600;
pub const FALLBACK_BAN_DURATION: i64 = 600;

const SHOUTOUT_API_URL: &str = "https://api.twitch.tv/helix/chat/shoutouts";
const ANNOUNCEMENTS_API_URL: &str = "https://api.twitch.tv/helix/chat/announcements";
const BAN_API_URL: &str = "https://api.twitch.tv/helix/moderation/bans";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnnouncementColor {
    Blue,
    Green,
    Orange,
    Purple,
    #[default]
    Primary,
}

impl AnnouncementColor {
    pub fn parse(color: &str) -> Option<Self> {
        match color.trim().to_lowercase().as_str() {
            "blue" => Some(Self::Blue),
            "green" => Some(Self::Green),
            "orange" => Some(Self::Orange),
            "purple" => Some(Self::Purple),
            "primary" => Some(Self::Primary),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Orange => "orange",
            Self::Purple => "purple",
            Self::Primary => "primary",
        }
    }
}

/// A moderation action, built per call and consumed by [`TwitchApi::moderate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationRequest {
    /// `duration` in seconds; `None` bans permanently
    Ban {
        channel: String,
        target: String,
        reason: String,
        duration: Option<i64>,
    },
    Unban {
        channel: String,
        target: String,
    },
    Shoutout {
        channel: String,
        target: String,
    },
    /// `color` of `None` uses the channel's primary color
    Announcement {
        channel: String,
        message: String,
        color: Option<String>,
    },
}

/// Input that was corrected before submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationWarning {
    ReasonTruncated { length: usize },
    MessageTruncated { length: usize },
    DurationOutOfRange { duration: i64 },
    UnknownColor { color: String },
}

impl fmt::Display for ModerationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModerationWarning::ReasonTruncated { length } => write!(
                f,
                "reasons above {} characters are limited by Twitch and will be truncated. Given length is {}",
                MAX_TEXT_LENGTH, length
            ),
            ModerationWarning::MessageTruncated { length } => write!(
                f,
                "announcement messages above {} characters are truncated by Twitch. Given length is {}",
                MAX_TEXT_LENGTH, length
            ),
            ModerationWarning::DurationOutOfRange { duration } => write!(
                f,
                "timeout needs to be between {} and {} seconds (2 weeks). Given timeout is {}, setting to {} seconds",
                MIN_BAN_DURATION, MAX_BAN_DURATION, duration, FALLBACK_BAN_DURATION
            ),
            ModerationWarning::UnknownColor { color } => write!(
                f,
                "announcement color can only be blue, green, orange, purple or primary. Given color is {:?}, defaulting to primary",
                color
            ),
        }
    }
}

impl ModerationRequest {
    pub fn tag(&self) -> &'static str {
        match self {
            ModerationRequest::Ban { .. } => "BAN",
            ModerationRequest::Unban { .. } => "UNBAN",
            ModerationRequest::Shoutout { .. } => "SHOUTOUT",
            ModerationRequest::Announcement { .. } => "ANNOUNCEMENT",
        }
    }

    /// Status Twitch answers with when the action went through
    pub fn success_status(&self) -> u16 {
        match self {
            ModerationRequest::Ban { .. } => 200,
            _ => 204,
        }
    }

    fn reference_url(&self) -> &'static str {
        match self {
            ModerationRequest::Ban { .. } => "https://dev.twitch.tv/docs/api/reference/#ban-user",
            ModerationRequest::Unban { .. } => "https://dev.twitch.tv/docs/api/reference/#unban-user",
            ModerationRequest::Shoutout { .. } => "https://dev.twitch.tv/docs/api/reference/#send-a-shoutout",
            ModerationRequest::Announcement { .. } => {
                "https://dev.twitch.tv/docs/api/reference/#send-chat-announcement"
            }
        }
    }

    /// Bring the request within Twitch's limits, reporting every correction
    pub fn normalize(&mut self) -> Vec<ModerationWarning> {
        let mut warnings = Vec::new();

        match self {
            ModerationRequest::Ban {
                reason, duration, ..
            } => {
                if let Some(length) = truncate_chars(reason, MAX_TEXT_LENGTH) {
                    warnings.push(ModerationWarning::ReasonTruncated { length });
                }
                if let Some(seconds) = duration {
                    if !(MIN_BAN_DURATION..=MAX_BAN_DURATION).contains(&*seconds) {
                        warnings.push(ModerationWarning::DurationOutOfRange { duration: *seconds });
                        *seconds = FALLBACK_BAN_DURATION;
                    }
                }
            }
            ModerationRequest::Announcement { message, color, .. } => {
                if let Some(length) = truncate_chars(message, MAX_TEXT_LENGTH) {
                    warnings.push(ModerationWarning::MessageTruncated { length });
                }
                let parsed = match color.as_deref() {
                    None => AnnouncementColor::Primary,
                    Some(given) => AnnouncementColor::parse(given).unwrap_or_else(|| {
                        warnings.push(ModerationWarning::UnknownColor {
                            color: given.to_string(),
                        });
                        AnnouncementColor::Primary
                    }),
                };
                *color = Some(parsed.as_str().to_string());
            }
            ModerationRequest::Unban { .. } | ModerationRequest::Shoutout { .. } => {}
        }

        warnings
    }
}

/// Cut `text` down to `max` characters, returning the original length if it was cut
fn truncate_chars(text: &mut String, max: usize) -> Option<usize> {
    let (cut, _) = text.char_indices().nth(max)?;
    let length = text.chars().count();
    text.truncate(cut);
    Some(length)
}

/// What Twitch answered to a moderation action
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationResult {
    pub success: bool,
    /// 0 when no response arrived
    pub status_code: u16,
    pub text: String,
    pub json: Value,
    pub warnings: Vec<ModerationWarning>,
}

impl TwitchApi {
    /// Validate, resolve and submit a moderation action through the rate
    /// limited queue. Never fails; inspect the returned result instead.
    pub async fn moderate(&self, mut request: ModerationRequest) -> ModerationResult {
        let tag = request.tag();

        let warnings = request.normalize();
        for warning in &warnings {
            log::warn!("[{}] {}", tag, warning);
        }

        let headers = self.headers().await;
        if !headers.has_auth() {
            log::warn!("[{}] headers for the twitch api request are missing authorization", tag);
        }

        let api_request = self.build_moderation_request(&request, headers).await;
        let response = self.queue().submit(api_request).await;

        let success = response.status == request.success_status();
        if !success {
            let message = response
                .json
                .get("message")
                .and_then(|message| message.as_str())
                .unwrap_or(response.text.as_str());
            log::warn!(
                "[{}] failed with error code: {}, with message {:?}. See {:?}",
                tag,
                response.status,
                message,
                request.reference_url()
            );
        }

        ModerationResult {
            success,
            status_code: response.status,
            text: response.text,
            json: response.json,
            warnings,
        }
    }

    /// Ban `target` from `channel`, for `duration` seconds or permanently
    pub async fn send_ban(
        &self,
        channel: &str,
        target: &str,
        reason: Option<&str>,
        duration: Option<i64>,
    ) -> ModerationResult {
        self.moderate(ModerationRequest::Ban {
            channel: channel.to_string(),
            target: target.to_string(),
            reason: reason.unwrap_or_default().to_string(),
            duration,
        })
        .await
    }

    pub async fn send_unban(&self, channel: &str, target: &str) -> ModerationResult {
        self.moderate(ModerationRequest::Unban {
            channel: channel.to_string(),
            target: target.to_string(),
        })
        .await
    }

    pub async fn send_shoutout(&self, channel: &str, target: &str) -> ModerationResult {
        self.moderate(ModerationRequest::Shoutout {
            channel: channel.to_string(),
            target: target.to_string(),
        })
        .await
    }

    pub async fn send_announcement(
        &self,
        channel: &str,
        message: &str,
        color: Option<&str>,
    ) -> ModerationResult {
        self.moderate(ModerationRequest::Announcement {
            channel: channel.to_string(),
            message: message.to_string(),
            color: color.map(str::to_string),
        })
        .await
    }

    // Unresolved logins are sent as -1 and left for Twitch to reject.
    async fn build_moderation_request(
        &self,
        request: &ModerationRequest,
        headers: RequestHeaders,
    ) -> ApiRequest {
        let nick = self.nick().await;
        let resolver = self.resolver();

        match request {
            ModerationRequest::Ban {
                channel,
                target,
                reason,
                duration,
            } => {
                let (broadcaster_id, user_id, moderator_id) = join!(
                    resolver.resolve_user_id(channel, &headers),
                    resolver.resolve_user_id(target, &headers),
                    resolver.resolve_user_id(&nick, &headers),
                );

                let mut data = json!({
                    "user_id": user_id.to_string(),
                    "reason": reason,
                });
                if let Some(duration) = duration {
                    data["duration"] = json!(duration);
                }

                let url = format!(
                    "{}?broadcaster_id={}&moderator_id={}",
                    BAN_API_URL, broadcaster_id, moderator_id
                );
                ApiRequest::post(url, headers, Some(json!({ "data": data })))
            }
            ModerationRequest::Unban { channel, target } => {
                let (broadcaster_id, user_id, moderator_id) = join!(
                    resolver.resolve_user_id(channel, &headers),
                    resolver.resolve_user_id(target, &headers),
                    resolver.resolve_user_id(&nick, &headers),
                );

                let url = format!(
                    "{}?broadcaster_id={}&moderator_id={}&user_id={}",
                    BAN_API_URL, broadcaster_id, moderator_id, user_id
                );
                ApiRequest::delete(url, headers)
            }
            ModerationRequest::Shoutout { channel, target } => {
                let (from_id, to_id, moderator_id) = join!(
                    resolver.resolve_user_id(channel, &headers),
                    resolver.resolve_user_id(target, &headers),
                    resolver.resolve_user_id(&nick, &headers),
                );

                let url = format!(
                    "{}?from_broadcaster_id={}&to_broadcaster_id={}&moderator_id={}",
                    SHOUTOUT_API_URL, from_id, to_id, moderator_id
                );
                ApiRequest::post(url, headers, None)
            }
            ModerationRequest::Announcement {
                channel,
                message,
                color,
            } => {
                let (broadcaster_id, moderator_id) = join!(
                    resolver.resolve_user_id(channel, &headers),
                    resolver.resolve_user_id(&nick, &headers),
                );

                let color = color.as_deref().unwrap_or(AnnouncementColor::Primary.as_str());
                let url = format!(
                    "{}?broadcaster_id={}&moderator_id={}",
                    ANNOUNCEMENTS_API_URL, broadcaster_id, moderator_id
                );
                ApiRequest::post(
                    url,
                    headers,
                    Some(json!({ "message": message, "color": color })),
                )
            }
        }
    }
}
