//! Per-client token bucket for the analyze endpoint

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use tokio::sync::RwLock;

/// Token bucket rate limiter keyed by client
pub struct RateLimiter {
    /// Tokens per client: key -> (tokens, last_refill)
    buckets: RwLock<HashMap<String, (f32, Instant)>>,
    /// Max tokens per bucket; 0 disables limiting
    max_tokens: u32,
    /// Refill rate (tokens per second)
    refill_rate: f32,
}

impl RateLimiter {
    /// Allow `per_minute` requests per client, refilled continuously
    pub fn per_minute(per_minute: u32) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            max_tokens: per_minute,
            refill_rate: per_minute as f32 / 60.0,
        }
    }

    /// Consume a token (returns false if rate limited)
    pub async fn consume(&self, key: &str) -> bool {
        if self.max_tokens == 0 {
            return true;
        }

        let mut buckets = self.buckets.write().await;
        let now = Instant::now();

        let (tokens, last_refill) = buckets
            .entry(key.to_string())
            .or_insert((self.max_tokens as f32, now));

        let elapsed = now.duration_since(*last_refill).as_secs_f32();
        let refilled = (*tokens + elapsed * self.refill_rate).min(self.max_tokens as f32);
        *last_refill = now;

        let allowed = if refilled >= 1.0 {
            *tokens = refilled - 1.0;
            true
        } else {
            *tokens = refilled;
            false
        };

        // A full bucket is the same as no bucket
        let max = self.max_tokens as f32;
        let rate = self.refill_rate;
        buckets.retain(|_, (tokens, last_refill)| {
            *tokens + now.duration_since(*last_refill).as_secs_f32() * rate < max
        });

        allowed
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.buckets.read().await.len()
    }
}

/// Rate limit key of the caller: its IP when known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientKey {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientKey(key))
    }
}
