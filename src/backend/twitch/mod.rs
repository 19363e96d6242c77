//! Twitch chat and Helix API integration module
//!
//! This module turns raw chat transport lines into typed events and talks to
//! the Helix API on behalf of the bot. It supports:
//! - Classifying IRC lines (messages, whispers, joins, notices, state updates)
//! - Resolving logins to user ids with an injectable cache
//! - Authenticated lookups of users, streams, channels, chatters and followers
//! - Moderation actions (ban, unban, shoutout, announcement) through a rate limited queue
//! - OAuth token validation
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use twitchbot_core::backend::config::load_config;
//! use twitchbot_core::backend::twitch::{classify, TwitchApi};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = load_config().unwrap();
//!     let api = TwitchApi::from_config(&config).unwrap();
//!
//!     let line = ":bob!bob@bob.tmi.twitch.tv PRIVMSG #ann :hi @ann";
//!     if let Some(event) = classify(line) {
//!         println!("{} from {:?}", event.kind(), event.sender());
//!     }
//!
//!     // Ban for ten minutes
//!     let result = api.send_ban("ann", "bob", Some("spam"), Some(600)).await;
//!     println!("ban succeeded: {}", result.success);
//! }
//! ```

mod api;
mod auth;
mod cache;
mod error;
mod irc;
mod models;
mod moderation;
mod queue;
mod resolver;
mod transport;

// Re-export public types
pub use api::TwitchApi;
pub use auth::{
    assess_token, check_token, validate_token, AuthScheme, OauthTokenInfo, RequestHeaders,
    TokenCheck,
};
pub use cache::{IdentityCache, MemoryCache};
pub use error::{ApiFailure, Result, TwitchError};
pub use irc::{classify, extract_mentions, timeout_duration, ProtocolEvent, RawTags};
pub use models::{
    ApiResult, ChannelInfo, Chatter, Chatters, FollowRecord, Follower, StreamInfo, UserFollowers,
    UserInfo,
};
pub use moderation::{
    AnnouncementColor, ModerationRequest, ModerationResult, ModerationWarning,
};
pub use queue::{RateLimitedQueue, RateLimiter};
pub use resolver::{IdentityResolver, UNRESOLVED_ID};
pub use transport::{ApiRequest, ApiResponse, ApiSubmitter, HttpTransport};
