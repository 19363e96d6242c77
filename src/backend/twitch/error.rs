/// Errors that can occur while setting up the Twitch integration
///
/// API calls themselves never surface these; they report failures as data
/// through [`ApiFailure`] instead.
#[derive(Debug, thiserror::Error)]
pub enum TwitchError {
    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Configuration file could not be decoded
    #[error("Configuration error: {0}")]
    ConfigError(#[from] toml::de::Error),

    /// Filesystem or stdin error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TwitchError>;

/// Why an API call produced no usable data
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ApiFailure {
    /// Client-ID or Authorization header missing, no request was sent
    #[error("request headers are missing authorization")]
    MissingAuthorization,

    /// Twitch answered but the `data` array was empty or absent
    #[error("no matching record")]
    NotFound,

    /// Twitch answered with a body that did not have the expected shape
    #[error("malformed response body")]
    Malformed,

    /// Twitch rejected the request
    #[error("request rejected with status {status}")]
    Rejected { status: u16 },

    /// No response arrived (connection error or timeout)
    #[error("no response from twitch")]
    Transport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_messages() {
        assert_eq!(
            ApiFailure::Rejected { status: 403 }.to_string(),
            "request rejected with status 403"
        );
        assert_eq!(
            ApiFailure::MissingAuthorization.to_string(),
            "request headers are missing authorization"
        );
    }

    #[test]
    fn test_config_error_from_toml() {
        let err = toml::from_str::<toml::Table>("not = [valid").unwrap_err();
        let err = TwitchError::from(err);
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn test_io_error_from_missing_config() {
        let err = std::fs::read_to_string("/nonexistent/config.toml").unwrap_err();
        let err = TwitchError::from(err);
        assert!(matches!(err, TwitchError::IoError(_)));
        assert!(err.to_string().starts_with("IO error"));
    }
}
