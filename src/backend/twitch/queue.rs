use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::transport::{ApiRequest, ApiResponse, ApiSubmitter};

const RATELIMIT_DURATION: Duration = Duration::new(60, 0);

/// Per-minute request budget
#[derive(Debug)]
pub struct RateLimiter {
    rate_per_minute: usize,
    used_since_last_refresh: usize,
    last_refresh: Instant,
}

impl RateLimiter {
    pub fn new(rate_per_minute: usize) -> Self {
        Self {
            rate_per_minute: rate_per_minute.max(1),
            used_since_last_refresh: 0,
            last_refresh: Instant::now(),
        }
    }

    /// Requests the given amount of tokens. If the budget since the last refresh would be exceeded, nothing is taken and the duration until the next refresh is returned.
    pub fn request_tokens(&mut self, tokens: usize) -> Option<Duration> {
        let since_refresh = self.last_refresh.elapsed();

        if since_refresh >= RATELIMIT_DURATION {
            self.refresh();
        } else if self.used_since_last_refresh + tokens > self.rate_per_minute {
            return Some(RATELIMIT_DURATION - since_refresh);
        }

        self.used_since_last_refresh += tokens;

        None
    }

    pub fn refresh(&mut self) {
        self.last_refresh = Instant::now();
        self.used_since_last_refresh = 0;
    }

    pub fn tokens(&self) -> usize {
        self.rate_per_minute
            .saturating_sub(self.used_since_last_refresh)
    }
}

struct PendingRequest {
    request: ApiRequest,
    responder: oneshot::Sender<ApiResponse>,
}

/// The single submission point for rate-limited API calls.
///
/// Submissions are dispatched in arrival order as budget allows; responses
/// may complete out of order.
#[derive(Clone)]
pub struct RateLimitedQueue {
    sender: mpsc::UnboundedSender<PendingRequest>,
}

impl RateLimitedQueue {
    /// Start the queue worker on the current tokio runtime
    pub fn spawn(transport: Arc<dyn ApiSubmitter>, requests_per_minute: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(run_queue(
            receiver,
            transport,
            RateLimiter::new(requests_per_minute),
        ));

        Self { sender }
    }
}

async fn run_queue(
    mut receiver: mpsc::UnboundedReceiver<PendingRequest>,
    transport: Arc<dyn ApiSubmitter>,
    mut rate_limiter: RateLimiter,
) {
    while let Some(pending) = receiver.recv().await {
        if let Some(refresh_wait_time) = rate_limiter.request_tokens(1) {
            log::debug!(
                "Twitch API budget exhausted, waiting {:?} before the next request",
                refresh_wait_time
            );
            tokio::time::sleep(refresh_wait_time).await;

            rate_limiter.refresh();
            rate_limiter.request_tokens(1);
        }

        let transport = transport.clone();
        tokio::spawn(async move {
            let response = transport.submit(pending.request).await;
            let _ = pending.responder.send(response);
        });
    }

    log::debug!("Rate limited request queue closed");
}

#[async_trait]
impl ApiSubmitter for RateLimitedQueue {
    async fn submit(&self, request: ApiRequest) -> ApiResponse {
        let (responder, response) = oneshot::channel();

        if self.sender.send(PendingRequest { request, responder }).is_err() {
            log::warn!("Rate limited request queue is closed, request was not sent");
            return ApiResponse::transport_failure();
        }

        match response.await {
            Ok(response) => response,
            Err(_) => {
                log::warn!("Rate limited request queue dropped a request before it completed");
                ApiResponse::transport_failure()
            }
        }
    }
}
