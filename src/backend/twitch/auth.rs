use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Write};

use super::transport::{ApiRequest, ApiSubmitter};
use crate::backend::config::TwitchCredentials;

/// Client ID the bot ships with; tokens are only cross-checked against
/// a client ID the user configured themselves
pub const DEFAULT_CLIENT_ID: &str = "";
pub const CLIENT_ID_KEY: &str = "Client-ID";
pub const AUTHORIZATION_KEY: &str = "Authorization";
const VALIDATE_URL: &str = "https://id.twitch.tv/oauth2/validate";

/// Authorization scheme, chosen per endpoint family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Helix endpoints
    Bearer,
    /// Kraken endpoints and token validation
    OAuth,
}

impl AuthScheme {
    fn prefix(self) -> &'static str {
        match self {
            AuthScheme::Bearer => "Bearer",
            AuthScheme::OAuth => "OAuth",
        }
    }
}

/// Headers for a single API call. Built fresh from the credentials each time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    pub client_id: Option<String>,
    pub authorization: Option<String>,
}

impl RequestHeaders {
    pub fn build(credentials: &TwitchCredentials, scheme: AuthScheme) -> Self {
        let client_id = Some(credentials.client_id.trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let authorization = Some(credentials.oauth_token())
            .filter(|token| !token.is_empty())
            .map(|token| format!("{} {}", scheme.prefix(), token));

        Self {
            client_id,
            authorization,
        }
    }

    /// Both the client identifier and the authorization are present
    pub fn has_auth(&self) -> bool {
        self.client_id.is_some() && self.authorization.is_some()
    }

    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();

        if let Some(client_id) = &self.client_id {
            insert_header(&mut map, HeaderName::from_static("client-id"), client_id);
        }
        if let Some(authorization) = &self.authorization {
            insert_header(&mut map, AUTHORIZATION, authorization);
        }

        map
    }
}

fn insert_header(map: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            map.insert(name, value);
        }
        Err(e) => log::warn!("Dropping invalid value for header {}: {}", name, e),
    }
}

/// Decoded answer of the token validation endpoint.
///
/// Twitch omits fields on error, so every field has a default. `status`
/// stays `-1` for a valid token; otherwise it carries the status Twitch
/// reported in the body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OauthTokenInfo {
    pub client_id: String,
    pub login: String,
    pub scopes: Vec<String>,
    pub user_id: String,
    pub expires_in: i64,
    #[serde(rename = "message")]
    pub error_message: String,
    pub status: i64,
}

impl Default for OauthTokenInfo {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            login: String::new(),
            scopes: Vec::new(),
            user_id: String::new(),
            expires_in: 0,
            error_message: String::new(),
            status: -1,
        }
    }
}

impl OauthTokenInfo {
    pub fn from_json(json: &Value) -> Self {
        serde_json::from_value(json.clone()).unwrap_or_default()
    }
}

/// Validate an OAuth token
///
/// # Arguments
/// * `token` - The token, with or without its `oauth:` prefix
pub async fn validate_token(submitter: &dyn ApiSubmitter, token: &str) -> OauthTokenInfo {
    let token = token.trim();
    let token = token.strip_prefix("oauth:").unwrap_or(token);
    let headers = RequestHeaders {
        client_id: None,
        authorization: Some(format!("{} {}", AuthScheme::OAuth.prefix(), token)),
    };

    let response = submitter
        .submit(ApiRequest::get(VALIDATE_URL, headers))
        .await;

    OauthTokenInfo::from_json(&response.json)
}

/// Verdict on the chat token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCheck {
    Valid { login: String },
    /// Token works for chat, but API calls will fail until it is regenerated
    ClientIdMismatch { login: String },
    Invalid { status: i64, message: String },
}

pub fn assess_token(info: &OauthTokenInfo, configured_client_id: &str) -> TokenCheck {
    if info.login.is_empty() || info.status != -1 {
        return TokenCheck::Invalid {
            status: info.status,
            message: info.error_message.clone(),
        };
    }

    if configured_client_id != DEFAULT_CLIENT_ID && info.client_id != configured_client_id {
        return TokenCheck::ClientIdMismatch {
            login: info.login.clone(),
        };
    }

    TokenCheck::Valid {
        login: info.login.clone(),
    }
}

/// Act on the chat token verdict.
///
/// An invalid token stops the process after the operator acknowledges the
/// prompt. Returns the login the token belongs to.
pub fn check_token(info: &OauthTokenInfo, configured_client_id: &str) -> String {
    match assess_token(info, configured_client_id) {
        TokenCheck::Invalid { status, message } => print_quit(&format!(
            "\nfailed to login to chat, irc oauth token is INVALID/EXPIRED (\"oauth\" in the config)\n\
             twitch returned status code ({}) and error message ({})",
            status, message
        )),
        TokenCheck::ClientIdMismatch { login } => {
            log::warn!("{}", client_id_mismatch_instructions());
            log::info!("logged into chat as {:?}", login);
            login
        }
        TokenCheck::Valid { login } => {
            log::info!("logged into chat as {:?}", login);
            login
        }
    }
}

fn client_id_mismatch_instructions() -> String {
    let rule = "=".repeat(50);
    format!(
        "\n{rule}\nthe client id for the irc oauth token (\"oauth\" in the config) DOES NOT match the client id in the config\n\
         TWITCH API CALLS WILL NOT WORK until the irc token is regenerated using the client id in the config\n\n\
         replace the <CLIENT_ID_HERE> and <REDIRECT_HERE> in the following auth URL to match your twitch dev app info\n\
         then visit the URL with a browser signed into the bots account to correct this problem\n\
         make sure to replace the current irc oauth token with the new one (\"oauth\" in config)\n\n\
         https://id.twitch.tv/oauth2/authorize?response_type=token&client_id=<CLIENT_ID_HERE>&redirect_uri=<REDIRECT_HERE>\
         &scope=chat:read+chat:edit+channel:moderate+whispers:read+whispers:edit+channel_editor\n{rule}\n"
    )
}

fn print_quit(message: &str) -> ! {
    eprintln!("{}", message);
    print!("\npress ENTER to exit...");
    let _ = io::stdout().flush();

    let mut line = String::new();
    let _ = io::stdin().read_line(&mut line);

    std::process::exit(1)
}
