use std::sync::Arc;
use urlencoding::encode;

use super::auth::RequestHeaders;
use super::cache::{IdentityCache, MemoryCache};
use super::error::ApiFailure;
use super::models::{ApiResult, ChannelInfo, UserInfo};
use super::transport::{ApiRequest, ApiSubmitter};

/// Id returned when a login could not be resolved
pub const UNRESOLVED_ID: i64 = -1;

pub(crate) const USER_API_URL: &str = "https://api.twitch.tv/helix/users";
pub(crate) const CHANNEL_INFO_API: &str = "https://api.twitch.tv/helix/channels";

/// Maps logins to user ids and user ids to channel names.
///
/// Only successful lookups are cached; failures are retried on the next call.
pub struct IdentityResolver {
    submitter: Arc<dyn ApiSubmitter>,
    user_ids: Box<dyn IdentityCache<i64>>,
    channel_names: Box<dyn IdentityCache<String>>,
}

impl IdentityResolver {
    pub fn new(submitter: Arc<dyn ApiSubmitter>) -> Self {
        Self::with_caches(
            submitter,
            Box::new(MemoryCache::new()),
            Box::new(MemoryCache::new()),
        )
    }

    pub fn with_caches(
        submitter: Arc<dyn ApiSubmitter>,
        user_ids: Box<dyn IdentityCache<i64>>,
        channel_names: Box<dyn IdentityCache<String>>,
    ) -> Self {
        Self {
            submitter,
            user_ids,
            channel_names,
        }
    }

    pub fn cached_user_id(&self, login: &str) -> Option<i64> {
        self.user_ids.get(&normalize_login(login))
    }

    /// Resolve a login to its numeric id, [`UNRESOLVED_ID`] on failure
    pub async fn resolve_user_id(&self, login: &str, headers: &RequestHeaders) -> i64 {
        let login = normalize_login(login);

        if let Some(id) = self.user_ids.get(&login) {
            return id;
        }

        if !headers.has_auth() {
            log::warn!("[GET_USER_ID] headers for the twitch api request are missing authorization");
            return UNRESOLVED_ID;
        }

        match self.fetch_user(&login, headers).await.outcome {
            Ok(user) => {
                self.user_ids.put(login, user.id);
                user.id
            }
            Err(failure) => {
                log::warn!("[GET_USER_ID] unable to get user_id for username {:?}: {}", login, failure);
                UNRESOLVED_ID
            }
        }
    }

    /// Fetch the user record for a login, bypassing the cache
    pub async fn fetch_user(&self, login: &str, headers: &RequestHeaders) -> ApiResult<UserInfo> {
        if !headers.has_auth() {
            log::warn!("[GET_USER_DATA] headers for the twitch api request are missing authorization");
            return ApiResult::failed(ApiFailure::MissingAuthorization);
        }

        let url = format!("{}?login={}", USER_API_URL, encode(login));
        let response = self
            .submitter
            .submit(ApiRequest::get(url, headers.clone()))
            .await;

        ApiResult::from_first_data(response, UserInfo::from_helix)
    }

    /// Resolve a user id to the broadcaster's display name, empty on failure
    pub async fn resolve_channel_name(&self, user_id: &str, headers: &RequestHeaders) -> String {
        let user_id = user_id.trim();

        if let Some(name) = self.channel_names.get(user_id) {
            return name;
        }

        if !headers.has_auth() {
            log::warn!(
                "[GET_CHANNEL_NAME_FROM_USER_ID] headers for the twitch api request are missing authorization"
            );
            return String::new();
        }

        let url = format!("{}?broadcaster_id={}", CHANNEL_INFO_API, encode(user_id));
        let response = self
            .submitter
            .submit(ApiRequest::get(url, headers.clone()))
            .await;

        match ApiResult::from_first_data(response, ChannelInfo::from_helix).outcome {
            Ok(channel) => {
                self.channel_names
                    .put(user_id.to_string(), channel.broadcaster_name.clone());
                channel.broadcaster_name
            }
            Err(failure) => {
                log::warn!(
                    "[GET_CHANNEL_NAME_FROM_USER_ID] unable to get channel name for user id {:?}: {}",
                    user_id,
                    failure
                );
                String::new()
            }
        }
    }
}

fn normalize_login(login: &str) -> String {
    login.trim().trim_start_matches(['@', '#']).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::twitch::transport::testing::FakeSubmitter;

    fn authorized() -> RequestHeaders {
        RequestHeaders {
            client_id: Some("cid".to_string()),
            authorization: Some("Bearer tok".to_string()),
        }
    }

    fn resolver_with(fake: &Arc<FakeSubmitter>) -> IdentityResolver {
        IdentityResolver::new(fake.clone())
    }

    #[tokio::test]
    async fn test_resolve_user_id_is_cached() {
        let fake = Arc::new(FakeSubmitter::new().route(
            "users?login=bob",
            200,
            r#"{"data":[{"id":"1234","login":"bob","display_name":"Bob"}]}"#,
        ));
        let resolver = resolver_with(&fake);

        assert_eq!(resolver.resolve_user_id("bob", &authorized()).await, 1234);
        assert_eq!(resolver.resolve_user_id("bob", &authorized()).await, 1234);
        assert_eq!(resolver.resolve_user_id("@Bob", &authorized()).await, 1234);

        assert_eq!(fake.count("users?login=bob"), 1);
        assert_eq!(resolver.cached_user_id("bob"), Some(1234));
    }

    #[tokio::test]
    async fn test_failed_resolution_is_not_cached() {
        let fake = Arc::new(FakeSubmitter::new().route("users?login=ghost", 200, r#"{"data":[]}"#));
        let resolver = resolver_with(&fake);

        assert_eq!(resolver.resolve_user_id("ghost", &authorized()).await, UNRESOLVED_ID);
        assert_eq!(resolver.resolve_user_id("ghost", &authorized()).await, UNRESOLVED_ID);

        assert_eq!(fake.count("users?login=ghost"), 2);
        assert_eq!(resolver.cached_user_id("ghost"), None);
    }

    #[tokio::test]
    async fn test_malformed_body_resolves_to_sentinel() {
        let fake = Arc::new(FakeSubmitter::new().route("users?login=bob", 200, "<html>oops</html>"));
        let resolver = resolver_with(&fake);

        assert_eq!(resolver.resolve_user_id("bob", &authorized()).await, UNRESOLVED_ID);
    }

    #[tokio::test]
    async fn test_missing_authorization_short_circuits() {
        let fake = Arc::new(FakeSubmitter::new());
        let resolver = resolver_with(&fake);
        let headers = RequestHeaders {
            client_id: Some("cid".to_string()),
            authorization: None,
        };

        assert_eq!(resolver.resolve_user_id("bob", &headers).await, UNRESOLVED_ID);
        assert_eq!(resolver.resolve_channel_name("1234", &headers).await, "");
        assert_eq!(
            resolver.fetch_user("bob", &headers).await.failure(),
            Some(ApiFailure::MissingAuthorization)
        );
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_channel_name() {
        let fake = Arc::new(
            FakeSubmitter::new()
                .route(
                    "channels?broadcaster_id=1234",
                    200,
                    r#"{"data":[{"broadcaster_id":"1234","broadcaster_login":"bob","broadcaster_name":"Bob","title":"hi"}]}"#,
                )
                .route("channels?broadcaster_id=999", 400, r#"{"error":"Bad Request","status":400}"#),
        );
        let resolver = resolver_with(&fake);

        assert_eq!(resolver.resolve_channel_name(" 1234 ", &authorized()).await, "Bob");
        assert_eq!(resolver.resolve_channel_name("1234", &authorized()).await, "Bob");
        assert_eq!(fake.count("broadcaster_id=1234"), 1);

        assert_eq!(resolver.resolve_channel_name("999", &authorized()).await, "");
        assert_eq!(resolver.resolve_channel_name("999", &authorized()).await, "");
        assert_eq!(fake.count("broadcaster_id=999"), 2);
    }

    #[tokio::test]
    async fn test_injected_cache_is_used() {
        let fake = Arc::new(FakeSubmitter::new());
        let user_ids = MemoryCache::new();
        user_ids.put("bob".to_string(), 77);
        let resolver = IdentityResolver::with_caches(
            fake.clone(),
            Box::new(user_ids),
            Box::new(MemoryCache::new()),
        );

        assert_eq!(resolver.resolve_user_id("bob", &authorized()).await, 77);
        assert!(fake.requests().is_empty());
    }
}
