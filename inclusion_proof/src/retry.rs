//! Replays JSON-RPC requests that the node turned away for rate limiting.
//!
//! Public endpoints answer bursts with HTTP 429 or with a JSON-RPC error
//! instead of queueing them. Only those answers are retried, with a doubling
//! backoff. Any other failure reaches the caller on the first attempt, and
//! with the default of zero retries nothing is replayed at all.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use alloy::{
    providers::{ProviderBuilder, RootProvider},
    rpc::{
        client::ClientBuilder,
        json_rpc::{ErrorPayload, RequestPacket, ResponsePacket},
    },
    transports::{
        http::ReqwestTransport, RpcError, TransportError, TransportErrorKind, TransportFut,
    },
};
use tower::{
    retry::{Policy, Retry},
    Layer, Service,
};
use tracing::warn;

/// The transport of [`build_http_retry_provider`].
pub type RateLimitedHttp = RateLimitService<ReqwestTransport>;

/// JSON-RPC code for "limit exceeded" (EIP-1474).
const LIMIT_EXCEEDED: i64 = -32005;
/// Some providers reuse the HTTP status as the JSON-RPC code.
const TOO_MANY_REQUESTS: i64 = 429;
/// Backoff stops doubling after this many retries.
const MAX_DOUBLINGS: u32 = 10;

/// Whether the node refused the request because of its rate limit.
pub fn is_rate_limited(result: Result<&ResponsePacket, &TransportError>) -> bool {
    match result {
        Ok(packet) => packet.iter_errors().any(is_rate_limit_error),
        Err(RpcError::Transport(TransportErrorKind::HttpError(e))) => e.is_rate_limit_err(),
        Err(RpcError::ErrorResp(payload)) => is_rate_limit_error(payload),
        Err(_) => false,
    }
}

fn is_rate_limit_error<E>(err: &ErrorPayload<E>) -> bool {
    let message = err.message.to_lowercase();

    err.code == LIMIT_EXCEEDED
        || err.code == TOO_MANY_REQUESTS
        || message.contains("rate limit")
        || message.contains("too many requests")
}

/// Retries rate limited requests up to `max_retries` times. The first retry
/// waits `backoff` and every further one waits twice as long as the last.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitRetry {
    backoff: Duration,
    attempt: u32,
    max_retries: u32,
}

impl RateLimitRetry {
    pub const fn new(backoff: Duration, max_retries: u32) -> Self {
        Self {
            backoff,
            attempt: 0,
            max_retries,
        }
    }

    /// How long to wait before the next attempt.
    pub fn next_backoff(&self) -> Duration {
        self.backoff
            .saturating_mul(1 << self.attempt.min(MAX_DOUBLINGS))
    }

    fn should_retry(&self, result: Result<&ResponsePacket, &TransportError>) -> bool {
        self.attempt < self.max_retries && is_rate_limited(result)
    }
}

impl Policy<RequestPacket, ResponsePacket, TransportError> for RateLimitRetry {
    type Future = Pin<Box<dyn Future<Output = Self> + Send + 'static>>;

    fn retry(
        &self,
        _req: &RequestPacket,
        result: Result<&ResponsePacket, &TransportError>,
    ) -> Option<Self::Future> {
        if !self.should_retry(result) {
            return None;
        }

        let backoff = self.next_backoff();
        warn!(
            attempt = self.attempt + 1,
            max_retries = self.max_retries,
            ?backoff,
            "rate limited by the node, retrying"
        );

        let next = Self {
            attempt: self.attempt + 1,
            ..*self
        };
        Some(Box::pin(async move {
            tokio::time::sleep(backoff).await;
            next
        }))
    }

    fn clone_request(&self, req: &RequestPacket) -> Option<RequestPacket> {
        Some(req.clone())
    }
}

impl<S> Layer<S> for RateLimitRetry {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner: Retry::new(*self, inner),
        }
    }
}

/// A transport whose rate limited requests are replayed by
/// [`RateLimitRetry`].
#[derive(Clone, Debug)]
pub struct RateLimitService<S> {
    inner: Retry<RateLimitRetry, S>,
}

impl<S> Service<RequestPacket> for RateLimitService<S>
where
    S: Service<RequestPacket, Response = ResponsePacket, Error = TransportError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = ResponsePacket;
    type Error = TransportError;
    type Future = TransportFut<'static>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: RequestPacket) -> Self::Future {
        Box::pin(self.inner.call(req))
    }
}

/// An HTTP provider for `rpc_url` that retries rate limited requests.
/// `backoff` is in milliseconds.
pub fn build_http_retry_provider(
    rpc_url: url::Url,
    backoff: u64,
    max_retries: u32,
) -> RootProvider<RateLimitedHttp> {
    let policy = RateLimitRetry::new(Duration::from_millis(backoff), max_retries);
    let client = ClientBuilder::default().layer(policy).http(rpc_url);

    ProviderBuilder::new().on_client(client)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy::{rpc::json_rpc::ResponsePacket, transports::TransportErrorKind};

    use super::{is_rate_limited, RateLimitRetry};

    fn error_response(code: i64, message: &str) -> ResponsePacket {
        serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": code, "message": message },
        }))
        .unwrap()
    }

    #[test]
    fn rate_limit_answers_are_recognised() {
        assert!(is_rate_limited(Ok(&error_response(-32005, "limit exceeded"))));
        assert!(is_rate_limited(Ok(&error_response(429, "slow down"))));
        assert!(is_rate_limited(Ok(&error_response(
            -32000,
            "Rate limit reached for this key"
        ))));
        assert!(is_rate_limited(Err(&TransportErrorKind::http_error(
            429,
            String::new()
        ))));
    }

    #[test]
    fn other_failures_are_not_retried() {
        let ok: ResponsePacket = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": "0x1",
        }))
        .unwrap();

        assert!(!is_rate_limited(Ok(&ok)));
        assert!(!is_rate_limited(Ok(&error_response(-32000, "header not found"))));
        assert!(!is_rate_limited(Err(&TransportErrorKind::http_error(
            502,
            String::new()
        ))));
        assert!(!is_rate_limited(Err(&TransportErrorKind::custom_str(
            "connection reset"
        ))));
    }

    #[test]
    fn stops_after_max_retries() {
        let limited = error_response(-32005, "limit exceeded");
        let mut policy = RateLimitRetry::new(Duration::ZERO, 2);
        assert!(policy.should_retry(Ok(&limited)));

        policy.attempt = 2;
        assert!(!policy.should_retry(Ok(&limited)));
        assert!(!RateLimitRetry::new(Duration::from_millis(100), 0).should_retry(Ok(&limited)));
    }

    #[test]
    fn backoff_doubles() {
        let mut policy = RateLimitRetry::new(Duration::from_millis(100), 20);
        let mut waits = Vec::new();
        for attempt in 0..4 {
            policy.attempt = attempt;
            waits.push(policy.next_backoff().as_millis());
        }
        assert_eq!(waits, [100, 200, 400, 800]);

        policy.attempt = 20;
        assert_eq!(policy.next_backoff(), Duration::from_millis(100 << 10));
    }
}
