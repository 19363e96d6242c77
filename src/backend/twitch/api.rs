use chrono::{DateTime, Utc};
use std::sync::Arc;
use urlencoding::encode;

use super::auth::{self, AuthScheme, OauthTokenInfo, RequestHeaders};
use super::error::{ApiFailure, Result};
use super::models::{ApiResult, ChannelInfo, Chatters, FollowRecord, Follower, StreamInfo, UserFollowers, UserInfo};
use super::queue::RateLimitedQueue;
use super::resolver::{IdentityResolver, UNRESOLVED_ID, CHANNEL_INFO_API, USER_API_URL};
use super::transport::{ApiRequest, ApiSubmitter, HttpTransport};
use crate::backend::config::{shared_credentials, AppConfig, Credentials};

const STREAM_API_URL: &str = "https://api.twitch.tv/helix/streams";
const CHANNEL_CHATTERS_API_URL: &str = "https://api.twitch.tv/helix/chat/chatters";
const USER_FOLLOWERS_API_URL: &str = "https://api.twitch.tv/helix/users/follows";
const USER_FOLLOWAGE_API_URL: &str = "https://api.twitch.tv/helix/channels/followers";
const USER_ACCOUNT_AGE_API: &str = "https://api.twitch.tv/kraken/users";

/// Twitch API client.
///
/// Read-only lookups that the rate budget cares about and every mutating
/// call go through `queue`; the rest go straight through `direct`.
pub struct TwitchApi {
    credentials: Credentials,
    direct: Arc<dyn ApiSubmitter>,
    queue: Arc<dyn ApiSubmitter>,
    resolver: IdentityResolver,
}

impl TwitchApi {
    pub fn new(
        credentials: Credentials,
        direct: Arc<dyn ApiSubmitter>,
        queue: Arc<dyn ApiSubmitter>,
    ) -> Self {
        let resolver = IdentityResolver::new(queue.clone());
        Self::with_resolver(credentials, direct, queue, resolver)
    }

    pub fn with_resolver(
        credentials: Credentials,
        direct: Arc<dyn ApiSubmitter>,
        queue: Arc<dyn ApiSubmitter>,
        resolver: IdentityResolver,
    ) -> Self {
        Self {
            credentials,
            direct,
            queue,
            resolver,
        }
    }

    /// Build the HTTP transport and start the rate limited queue.
    /// Must be called from within a tokio runtime.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let transport: Arc<dyn ApiSubmitter> =
            Arc::new(HttpTransport::new(config.api.request_timeout())?);
        let queue = RateLimitedQueue::spawn(transport.clone(), config.api.requests_per_minute);

        Ok(Self::new(
            shared_credentials(config.twitch.clone()),
            transport,
            Arc::new(queue),
        ))
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub(crate) fn queue(&self) -> &dyn ApiSubmitter {
        self.queue.as_ref()
    }

    /// Helix headers from the current credentials
    pub async fn headers(&self) -> RequestHeaders {
        RequestHeaders::build(&*self.credentials.read().await, AuthScheme::Bearer)
    }

    /// Kraken headers from the current credentials
    pub async fn kraken_headers(&self) -> RequestHeaders {
        RequestHeaders::build(&*self.credentials.read().await, AuthScheme::OAuth)
    }

    /// Login of the bot account, used as the acting moderator
    pub async fn nick(&self) -> String {
        self.credentials.read().await.nick.clone()
    }

    /// Get user information by login name
    pub async fn get_user_info(&self, login: &str) -> ApiResult<UserInfo> {
        let headers = self.headers().await;
        if !headers.has_auth() {
            return missing_authorization("GET_USER_INFO");
        }

        let url = format!("{}?login={}", USER_API_URL, encode(login));
        let response = self.direct.submit(ApiRequest::get(url, headers)).await;

        ApiResult::from_first_data(response, UserInfo::from_helix)
    }

    pub async fn get_user_id(&self, login: &str) -> i64 {
        let headers = self.headers().await;
        self.resolver.resolve_user_id(login, &headers).await
    }

    /// Get the live stream of a channel; `NotFound` while offline
    pub async fn get_stream_data(&self, login: &str) -> ApiResult<StreamInfo> {
        let headers = self.headers().await;
        if !headers.has_auth() {
            return missing_authorization("GET_STREAM_DATA");
        }

        let url = format!("{}?user_login={}", STREAM_API_URL, encode(login));
        let response = self.queue.submit(ApiRequest::get(url, headers)).await;

        ApiResult::from_first_data(response, StreamInfo::from_helix)
    }

    /// Get channel information from a login or a numeric user id
    pub async fn get_channel_info(&self, broadcaster_name_or_id: &str) -> ApiResult<ChannelInfo> {
        let headers = self.headers().await;
        if !headers.has_auth() {
            return missing_authorization("GET_CHANNEL_INFO");
        }

        let broadcaster = broadcaster_name_or_id.trim();
        let broadcaster_id = if is_numeric(broadcaster) {
            broadcaster.to_string()
        } else {
            let user_id = self.resolver.resolve_user_id(broadcaster, &headers).await;
            if user_id == UNRESOLVED_ID {
                return ApiResult::failed(ApiFailure::NotFound);
            }
            user_id.to_string()
        };

        let url = format!("{}?broadcaster_id={}", CHANNEL_INFO_API, broadcaster_id);
        let response = self.queue.submit(ApiRequest::get(url, headers)).await;

        ApiResult::from_first_data(response, ChannelInfo::from_helix)
    }

    pub async fn get_channel_name_from_user_id(&self, user_id: &str) -> String {
        let headers = self.headers().await;
        self.resolver.resolve_channel_name(user_id, &headers).await
    }

    /// Get the chatters of a channel (requires moderator:read:chatters scope)
    pub async fn get_channel_chatters(&self, channel: &str) -> ApiResult<Chatters> {
        let headers = self.headers().await;
        if !headers.has_auth() {
            return missing_authorization("GET_CHANNEL_CHATTERS");
        }

        let nick = self.nick().await;
        let moderator_id = self.resolver.resolve_user_id(&nick, &headers).await;
        let broadcaster_id = self.resolver.resolve_user_id(channel, &headers).await;

        let url = format!(
            "{}?moderator_id={}&broadcaster_id={}",
            CHANNEL_CHATTERS_API_URL, moderator_id, broadcaster_id
        );
        let response = self.queue.submit(ApiRequest::get(url, headers)).await;

        if response.status == 403 {
            log::warn!(
                "[GET_CHANNEL_CHATTERS] Failed to get channel chatters for channel {:?}; Twitch responded with 403 (Forbidden). \
                 Make sure that provided token has the scope access `moderator:read:chatters` for channel {:?}",
                channel,
                channel
            );
        }

        ApiResult::from_response(response, |response| {
            if response.status != 200 || response.has_error() {
                return Err(ApiFailure::Rejected {
                    status: response.status,
                });
            }
            Chatters::from_helix(&response.json).ok_or(ApiFailure::Malformed)
        })
    }

    /// Get the followers of a user
    pub async fn get_user_followers(&self, login: &str) -> ApiResult<UserFollowers> {
        let headers = self.headers().await;
        if !headers.has_auth() {
            return missing_authorization("GET_USER_FOLLOWERS");
        }

        let user_id = self.resolver.resolve_user_id(login, &headers).await;
        let url = format!("{}?to_id={}", USER_FOLLOWERS_API_URL, user_id);
        let response = self.direct.submit(ApiRequest::get(url, headers)).await;

        ApiResult::from_response(response, |response| {
            if !response.is_success() || response.has_error() {
                return Err(ApiFailure::Rejected {
                    status: response.status,
                });
            }

            let follower_count = response
                .json
                .get("total")
                .and_then(|total| total.as_i64())
                .ok_or(ApiFailure::Malformed)?;
            let followers = response
                .json
                .get("data")
                .cloned()
                .map(serde_json::from_value::<Vec<FollowRecord>>)
                .transpose()
                .map_err(|_| ApiFailure::Malformed)?
                .unwrap_or_default();

            Ok(UserFollowers {
                follower_count,
                following: login.to_string(),
                following_id: user_id,
                followers,
            })
        })
    }

    /// Get when `follower` followed `channel_name`; `NotFound` if they don't
    pub async fn get_user_followage(&self, channel_name: &str, follower: &str) -> ApiResult<Follower> {
        let headers = self.headers().await;
        if !headers.has_auth() {
            return missing_authorization("GET_USER_FOLLOWAGE");
        }

        let channel_id = self.resolver.resolve_user_id(channel_name, &headers).await;
        let follower_id = self.resolver.resolve_user_id(follower, &headers).await;
        let url = format!(
            "{}?broadcaster_id={}&user_id={}",
            USER_FOLLOWAGE_API_URL, channel_id, follower_id
        );
        let response = self.direct.submit(ApiRequest::get(url, headers)).await;

        ApiResult::from_response(response, |response| {
            let total = response
                .json
                .get("total")
                .and_then(|total| total.as_i64())
                .unwrap_or(0);
            let Some(data) = response.first_data().filter(|_| total > 0) else {
                return if response.is_success() {
                    Err(ApiFailure::NotFound)
                } else {
                    Err(ApiFailure::Rejected {
                        status: response.status,
                    })
                };
            };

            // datetime format: 2019-10-23T23:12:06Z
            let followed_at = data
                .get("followed_at")
                .and_then(|value| value.as_str())
                .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
                .map(|value| value.with_timezone(&Utc))
                .ok_or(ApiFailure::Malformed)?;
            let name = data
                .get("user_name")
                .and_then(|value| value.as_str())
                .unwrap_or_default()
                .to_string();

            Ok(Follower {
                following: channel_name.to_string(),
                following_id: channel_id,
                id: follower_id,
                name,
                followed_at,
            })
        })
    }

    /// Get the account creation date of a user (legacy Kraken endpoint)
    pub async fn get_account_created_at(&self, login: &str) -> ApiResult<DateTime<Utc>> {
        let helix_headers = self.headers().await;
        let headers = self.kraken_headers().await;
        if !headers.has_auth() {
            return missing_authorization("GET_ACCOUNT_AGE");
        }

        let user_id = self.resolver.resolve_user_id(login, &helix_headers).await;
        let url = format!("{}/{}", USER_ACCOUNT_AGE_API, user_id);
        let response = self.direct.submit(ApiRequest::get(url, headers)).await;

        ApiResult::from_response(response, |response| {
            if !response.is_success() {
                return Err(ApiFailure::Rejected {
                    status: response.status,
                });
            }

            response
                .json
                .get("created_at")
                .and_then(|value| value.as_str())
                .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
                .map(|value| value.with_timezone(&Utc))
                .ok_or(ApiFailure::Malformed)
        })
    }

    /// Validate the configured chat token
    pub async fn validate_token(&self) -> OauthTokenInfo {
        let token = self.credentials.read().await.oauth.clone();
        auth::validate_token(self.direct.as_ref(), &token).await
    }
}

fn missing_authorization<T>(operation: &str) -> ApiResult<T> {
    log::warn!(
        "[{}] headers for the twitch api request are missing authorization",
        operation
    );
    ApiResult::failed(ApiFailure::MissingAuthorization)
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::config::TwitchCredentials;
    use crate::backend::twitch::transport::testing::FakeSubmitter;
    use reqwest::Method;

    pub(crate) const BOB: &str = r#"{"data":[{"id":"1001","login":"bob","display_name":"Bob"}]}"#;
    pub(crate) const BOT: &str = r#"{"data":[{"id":"2002","login":"bot","display_name":"Bot"}]}"#;
    pub(crate) const ANN: &str = r#"{"data":[{"id":"3003","login":"ann","display_name":"Ann"}]}"#;

    pub(crate) fn credentials(client_id: &str, oauth: &str) -> Credentials {
        shared_credentials(TwitchCredentials {
            client_id: client_id.to_string(),
            oauth: oauth.to_string(),
            nick: "bot".to_string(),
        })
    }

    /// Client whose direct and queued calls both land on `fake`
    pub(crate) fn api_with(fake: &Arc<FakeSubmitter>) -> TwitchApi {
        TwitchApi::new(credentials("cid", "oauth:tok"), fake.clone(), fake.clone())
    }

    fn users() -> FakeSubmitter {
        FakeSubmitter::new()
            .route("users?login=bob", 200, BOB)
            .route("users?login=bot", 200, BOT)
            .route("users?login=ann", 200, ANN)
    }

    #[tokio::test]
    async fn test_headers_follow_credential_rotation() {
        let fake = Arc::new(FakeSubmitter::new());
        let api = api_with(&fake);
        assert_eq!(api.headers().await.authorization.as_deref(), Some("Bearer tok"));
        assert_eq!(api.kraken_headers().await.authorization.as_deref(), Some("OAuth tok"));

        api.credentials().write().await.oauth = "oauth:rotated".to_string();
        assert_eq!(api.headers().await.authorization.as_deref(), Some("Bearer rotated"));
    }

    #[tokio::test]
    async fn test_get_user_info() {
        let fake = Arc::new(users());
        let api = api_with(&fake);

        let result = api.get_user_info("bob").await;
        assert!(result.success());
        assert_eq!(result.status, 200);
        assert_eq!(result.into_data().id, 1001);

        let missing = api.get_user_info("nobody").await;
        assert_eq!(missing.failure(), Some(ApiFailure::Rejected { status: 404 }));
        assert_eq!(missing.into_data().id, -1);
    }

    #[tokio::test]
    async fn test_missing_authorization_makes_no_calls() {
        let fake = Arc::new(users());
        let api = TwitchApi::new(credentials("cid", ""), fake.clone(), fake.clone());

        assert_eq!(api.get_user_id("bob").await, UNRESOLVED_ID);
        assert_eq!(
            api.get_user_info("bob").await.failure(),
            Some(ApiFailure::MissingAuthorization)
        );
        assert_eq!(
            api.get_stream_data("bob").await.failure(),
            Some(ApiFailure::MissingAuthorization)
        );
        assert_eq!(
            api.get_channel_info("bob").await.failure(),
            Some(ApiFailure::MissingAuthorization)
        );
        assert_eq!(
            api.get_channel_chatters("bob").await.failure(),
            Some(ApiFailure::MissingAuthorization)
        );
        assert_eq!(
            api.get_user_followers("bob").await.failure(),
            Some(ApiFailure::MissingAuthorization)
        );
        assert_eq!(
            api.get_user_followage("bob", "ann").await.failure(),
            Some(ApiFailure::MissingAuthorization)
        );
        assert_eq!(api.get_channel_name_from_user_id("1001").await, "");
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_get_user_id_uses_cache() {
        let fake = Arc::new(users());
        let api = api_with(&fake);

        assert_eq!(api.get_user_id("bob").await, 1001);
        assert_eq!(api.get_user_id("bob").await, 1001);
        assert_eq!(fake.count("users?login=bob"), 1);
    }

    #[tokio::test]
    async fn test_get_stream_data() {
        let fake = Arc::new(
            FakeSubmitter::new()
                .route(
                    "streams?user_login=bob",
                    200,
                    r#"{"data":[{"id":"40952121085","user_id":"1001","user_login":"bob","user_name":"Bob","game_name":"Chess","type":"live","title":"hello","viewer_count":78,"started_at":"2021-03-31T20:57:26Z","tags":["English"]}]}"#,
                )
                .route("streams?user_login=ann", 200, r#"{"data":[],"pagination":{}}"#),
        );
        let api = api_with(&fake);

        let live = api.get_stream_data("bob").await.into_data();
        assert_eq!(live.stream_type, "live");
        assert_eq!(live.viewer_count, 78);
        assert!(live.started_at.is_some());

        let offline = api.get_stream_data("ann").await;
        assert_eq!(offline.failure(), Some(ApiFailure::NotFound));
        assert_eq!(offline.into_data().viewer_count, -1);
    }

    #[tokio::test]
    async fn test_get_channel_info_by_login_and_id() {
        let fake = Arc::new(users().route(
            "channels?broadcaster_id=1001",
            200,
            r#"{"data":[{"broadcaster_id":"1001","broadcaster_login":"bob","broadcaster_name":"Bob","broadcaster_language":"en","game_id":"1","game_name":"Chess","title":"hello"}]}"#,
        ));
        let api = api_with(&fake);

        let by_login = api.get_channel_info("bob").await;
        assert_eq!(by_login.data().unwrap().game_name, "Chess");

        let by_id = api.get_channel_info(" 1001 ").await;
        assert_eq!(by_id.data().unwrap().broadcaster_name, "Bob");
        assert_eq!(fake.count("users?login="), 1);

        let unknown = api.get_channel_info("nobody").await;
        assert_eq!(unknown.failure(), Some(ApiFailure::NotFound));
        assert_eq!(fake.count("channels?"), 2);
    }

    #[tokio::test]
    async fn test_get_channel_chatters() {
        let fake = Arc::new(
            users()
                .route(
                    "chatters?moderator_id=2002&broadcaster_id=1001",
                    200,
                    r#"{"data":[{"user_id":"3003","user_login":"ann","user_name":"Ann"}],"total":1}"#,
                )
                .route(
                    "chatters?moderator_id=2002&broadcaster_id=3003",
                    403,
                    r#"{"error":"Forbidden","status":403,"message":"missing scope"}"#,
                ),
        );
        let api = api_with(&fake);

        let chatters = api.get_channel_chatters("bob").await;
        assert_eq!(chatters.data().unwrap().total, 1);
        assert_eq!(chatters.data().unwrap().chatters[0].user_login, "ann");

        let forbidden = api.get_channel_chatters("ann").await;
        assert_eq!(forbidden.status, 403);
        assert_eq!(forbidden.failure(), Some(ApiFailure::Rejected { status: 403 }));
    }

    #[tokio::test]
    async fn test_get_user_followers() {
        let fake = Arc::new(users().route(
            "follows?to_id=1001",
            200,
            r#"{"total":2,"data":[{"from_id":"3003","from_login":"ann","from_name":"Ann","to_id":"1001","to_name":"Bob","followed_at":"2019-10-23T23:12:06Z"}]}"#,
        ));
        let api = api_with(&fake);

        let followers = api.get_user_followers("bob").await.into_data();
        assert_eq!(followers.follower_count, 2);
        assert_eq!(followers.following_id, 1001);
        assert_eq!(followers.followers[0].from_login, "ann");

        let rejected = api.get_user_followers("ann").await;
        assert!(!rejected.success());
        assert_eq!(rejected.into_data().follower_count, -1);
    }

    #[tokio::test]
    async fn test_get_user_followage() {
        let fake = Arc::new(
            users()
                .route(
                    "followers?broadcaster_id=1001&user_id=3003",
                    200,
                    r#"{"total":1,"data":[{"user_id":"3003","user_login":"ann","user_name":"Ann","followed_at":"2019-10-23T23:12:06Z"}]}"#,
                )
                .route(
                    "followers?broadcaster_id=1001&user_id=2002",
                    200,
                    r#"{"total":0,"data":[]}"#,
                ),
        );
        let api = api_with(&fake);

        let follower = api.get_user_followage("bob", "ann").await.into_data();
        assert_eq!(follower.name, "Ann");
        assert_eq!(follower.id, 3003);
        assert_eq!(follower.following_id, 1001);
        assert_eq!(follower.followed_at.to_rfc3339(), "2019-10-23T23:12:06+00:00");

        let not_following = api.get_user_followage("bob", "bot").await;
        assert_eq!(not_following.failure(), Some(ApiFailure::NotFound));
        assert_eq!(not_following.into_data(), Follower::default());
    }

    #[tokio::test]
    async fn test_get_account_created_at_uses_oauth_scheme() {
        let fake = Arc::new(users().route(
            "kraken/users/1001",
            200,
            r#"{"_id":"1001","name":"bob","created_at":"2013-06-03T19:12:02Z"}"#,
        ));
        let api = api_with(&fake);

        let created = api.get_account_created_at("bob").await;
        assert_eq!(created.into_data().to_rfc3339(), "2013-06-03T19:12:02+00:00");

        let kraken = fake
            .requests()
            .into_iter()
            .find(|r| r.url.contains("kraken"))
            .unwrap();
        assert_eq!(kraken.headers.authorization.as_deref(), Some("OAuth tok"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_empty_record() {
        let fake = Arc::new(FakeSubmitter::new().route("streams?user_login=bob", 200, "<html>gateway</html>"));
        let api = api_with(&fake);

        let result = api.get_stream_data("bob").await;
        assert_eq!(result.json, serde_json::json!({}));
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_reads_are_routed_per_endpoint() {
        let direct = Arc::new(users());
        let queue = Arc::new(
            users().route("streams?user_login=bob", 200, r#"{"data":[]}"#),
        );
        let api = TwitchApi::new(credentials("cid", "tok"), direct.clone(), queue.clone());

        api.get_user_info("bob").await;
        api.get_stream_data("bob").await;
        api.get_user_id("ann").await;

        assert_eq!(direct.count("users?login=bob"), 1);
        assert_eq!(queue.count("streams?"), 1);
        assert_eq!(queue.count("users?login=ann"), 1);
        assert!(direct
            .requests()
            .iter()
            .all(|r| r.method == Method::GET));
    }

    #[tokio::test]
    async fn test_validate_token_uses_configured_token() {
        let fake = Arc::new(FakeSubmitter::new().route(
            "oauth2/validate",
            401,
            r#"{"status":401,"message":"invalid access token"}"#,
        ));
        let api = api_with(&fake);

        let info = api.validate_token().await;
        assert_eq!(info.status, 401);
        assert_eq!(
            fake.requests()[0].headers.authorization.as_deref(),
            Some("OAuth tok")
        );
    }
}
