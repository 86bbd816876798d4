//! # Rate Limiting
//!
//! Per-client quota enforced in front of every route.
//!
//! ## Flow
//! - Middleware derives the client identifier (IP) from the request
//! - Asks the injected [`RateLimit`] service for a verdict
//! - Always sets `X-RateLimit-Limit`, `X-RateLimit-Remaining`, `X-RateLimit-Reset`
//! - Over quota: 429, handler never runs
//! - Service error: 500, handler never runs
//! - No service configured: warn and let the request through (fail-open)
//!
//! ## Redis Window
//! - One key per client: `<prefix>:<ip>`
//! - `INCR`, and on the first hit `PEXPIRE` to the window length, in one script
//! - Script returns the count and the remaining TTL in milliseconds
//! - `reset` is reported as Unix epoch milliseconds, same as hosted limiters
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    extract::{Request, State as AxumState},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use redis::{
    Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{config::RateLimitConfig, error::AppError, state::State, utils::client_ip};

pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

const FIXED_WINDOW_SCRIPT: &str = r"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {current, ttl}
";

#[derive(Error, Debug)]
pub enum LimiterError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Malformed limiter reply: {0}")]
    MalformedReply(String),
}

/// Verdict for a single request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix epoch milliseconds at which the window resets.
    pub reset: i64,
}

impl RateLimitOutcome {
    fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(LIMIT_HEADER, HeaderValue::from(self.limit));
        headers.insert(REMAINING_HEADER, HeaderValue::from(self.remaining));
        headers.insert(RESET_HEADER, HeaderValue::from(self.reset));
    }
}

#[async_trait]
pub trait RateLimit: Send + Sync {
    /// Records one hit for `identifier` and reports whether it is within quota.
    async fn limit(&self, identifier: &str) -> Result<RateLimitOutcome, LimiterError>;
}

pub struct RedisRateLimiter {
    connection: ConnectionManager,
    script: Script,
    max_requests: u32,
    window_ms: u64,
    prefix: String,
}

impl RedisRateLimiter {
    pub fn new(connection: ConnectionManager, config: &RateLimitConfig) -> Self {
        Self {
            connection,
            script: Script::new(FIXED_WINDOW_SCRIPT),
            max_requests: config.max_requests,
            window_ms: window_millis(config.window),
            prefix: config.prefix.clone(),
        }
    }
}

#[async_trait]
impl RateLimit for RedisRateLimiter {
    async fn limit(&self, identifier: &str) -> Result<RateLimitOutcome, LimiterError> {
        let key = format!("{}:{identifier}", self.prefix);
        let mut connection = self.connection.clone();

        let (count, ttl_ms): (i64, i64) = self
            .script
            .key(&key)
            .arg(self.window_ms)
            .invoke_async(&mut connection)
            .await?;

        outcome_from_reply(count, ttl_ms, self.max_requests, Utc::now().timestamp_millis())
    }
}

fn window_millis(window: Duration) -> u64 {
    u64::try_from(window.as_millis()).unwrap_or(u64::MAX)
}

fn outcome_from_reply(
    count: i64,
    ttl_ms: i64,
    limit: u32,
    now_ms: i64,
) -> Result<RateLimitOutcome, LimiterError> {
    if count < 1 {
        return Err(LimiterError::MalformedReply(format!("count {count}")));
    }

    let used = u32::try_from(count).unwrap_or(u32::MAX);

    Ok(RateLimitOutcome {
        success: used <= limit,
        limit,
        remaining: limit.saturating_sub(used),
        reset: now_ms + ttl_ms.max(0),
    })
}

/// Connects the Redis-backed limiter. Any failure leaves the service
/// unthrottled rather than refusing to start.
pub async fn init_rate_limiter(config: &RateLimitConfig) -> Option<Arc<dyn RateLimit>> {
    let Some(redis_url) = config.redis_url.as_deref() else {
        warn!("Ratelimiter not configured, requests will not be throttled");
        return None;
    };

    let connection_config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(500));

    let connection = match Client::open(redis_url) {
        Ok(client) => client.get_connection_manager_with_config(connection_config).await,
        Err(e) => Err(e),
    };

    match connection {
        Ok(connection) => {
            info!(
                "Ratelimiter ready: {} requests per {}s",
                config.max_requests,
                config.window.as_secs()
            );
            Some(Arc::new(RedisRateLimiter::new(connection, config)))
        }
        Err(e) => {
            warn!("Ratelimiter unavailable, requests will not be throttled: {e}");
            None
        }
    }
}

pub async fn rate_limiter(
    AxumState(state): AxumState<Arc<State>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.limiter.as_ref() else {
        warn!("Ratelimiter not configured");
        return next.run(request).await;
    };

    let identifier = client_ip(&request, state.config.trust_proxy);

    let outcome = match limiter.limit(&identifier).await {
        Ok(outcome) => outcome,
        Err(e) => return AppError::from(e).into_response(),
    };

    if !outcome.success {
        debug!("Rate limit exceeded for {identifier}");
        let mut response = AppError::RateLimited.into_response();
        outcome.apply_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    outcome.apply_headers(response.headers_mut());
    response
}
