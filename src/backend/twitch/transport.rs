use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Map, Value};
use std::time::Duration;

use super::auth::RequestHeaders;
use super::error::Result;

/// One outbound API call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: RequestHeaders,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>, headers: RequestHeaders) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers,
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, headers: RequestHeaders, body: Option<Value>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers,
            body,
        }
    }

    pub fn delete(url: impl Into<String>, headers: RequestHeaders) -> Self {
        Self {
            method: Method::DELETE,
            url: url.into(),
            headers,
            body: None,
        }
    }
}

/// What came back for an [`ApiRequest`].
///
/// `json` is always an object; bodies that are not a JSON object decode to
/// an empty one. A `status` of 0 means no response arrived at all.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub text: String,
    pub json: Value,
}

impl ApiResponse {
    pub fn new(status: u16, text: impl Into<String>) -> Self {
        let text = text.into();
        let json = decode_body(&text);

        Self { status, text, json }
    }

    /// Connection error or timeout
    pub fn transport_failure() -> Self {
        Self {
            status: 0,
            text: String::new(),
            json: empty_record(),
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status == 0
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First entry of the `data` array, if there is one
    pub fn first_data(&self) -> Option<&Value> {
        self.json.get("data")?.as_array()?.first()
    }

    pub fn has_error(&self) -> bool {
        self.json.get("error").is_some()
    }
}

pub fn empty_record() -> Value {
    Value::Object(Map::new())
}

/// Decode a response body, falling back to an empty record
pub fn decode_body(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(json @ Value::Object(_)) => json,
        _ => empty_record(),
    }
}

/// Anything that can carry an [`ApiRequest`] to Twitch.
///
/// Implementations must answer every submission exactly once.
#[async_trait]
pub trait ApiSubmitter: Send + Sync {
    async fn submit(&self, request: ApiRequest) -> ApiResponse;
}

/// Sends requests straight to Twitch over HTTPS
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ApiSubmitter for HttpTransport {
    async fn submit(&self, request: ApiRequest) -> ApiResponse {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.to_header_map());

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("{} {} failed: {}", request.method, request.url, e);
                return ApiResponse::transport_failure();
            }
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                log::warn!(
                    "Failed to read the body of {} {}: {}",
                    request.method,
                    request.url,
                    e
                );
                String::new()
            }
        };

        log::debug!("{} {} -> {}", request.method, request.url, status);
        ApiResponse::new(status, text)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Replays canned responses, matched by URL fragment, and records
    /// every request it sees
    #[derive(Default)]
    pub(crate) struct FakeSubmitter {
        routes: Vec<(String, ApiResponse)>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl FakeSubmitter {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn route(mut self, url_fragment: &str, status: u16, body: &str) -> Self {
            self.routes
                .push((url_fragment.to_string(), ApiResponse::new(status, body)));
            self
        }

        pub(crate) fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn count(&self, url_fragment: &str) -> usize {
            self.requests()
                .iter()
                .filter(|r| r.url.contains(url_fragment))
                .count()
        }
    }

    #[async_trait]
    impl ApiSubmitter for FakeSubmitter {
        async fn submit(&self, request: ApiRequest) -> ApiResponse {
            let response = self
                .routes
                .iter()
                .find(|(fragment, _)| request.url.contains(fragment.as_str()))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| {
                    ApiResponse::new(404, r#"{"error":"Not Found","status":404,"message":""}"#)
                });

            self.requests.lock().unwrap().push(request);
            response
        }
    }
}
