use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::backend::twitch::Result;

/// Credentials the bot authenticates with
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TwitchCredentials {
    /// Client ID of the twitch dev app the token was issued for
    pub client_id: String,
    /// Chat OAuth token, optionally prefixed with `oauth:`
    pub oauth: String,
    /// Login of the bot account
    pub nick: String,
}

impl TwitchCredentials {
    /// The OAuth token without its `oauth:` prefix
    pub fn oauth_token(&self) -> &str {
        let token = self.oauth.trim();
        token.strip_prefix("oauth:").unwrap_or(token)
    }
}

/// Tuning for outbound API calls
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub request_timeout_secs: u64,
    pub requests_per_minute: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            requests_per_minute: 800,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AppConfig {
    pub twitch: TwitchCredentials,
    #[serde(default)]
    pub api: ApiConfig,
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        Ok(config)
    }
}

/// Load `config.toml` from the project root
pub fn load_config() -> Result<AppConfig> {
    let project_root = project_root::get_project_root()?;
    let config_path = project_root.join("config.toml");

    AppConfig::from_file(config_path)
}

/// Credentials shared by every API call; they may be replaced at runtime
pub type Credentials = Arc<RwLock<TwitchCredentials>>;

pub fn shared_credentials(credentials: TwitchCredentials) -> Credentials {
    Arc::new(RwLock::new(credentials))
}
