//! Bandwidth throttling for download streams.
//!
//! A [`RateLimiter`] is a token bucket holding at most one second worth of
//! bytes. Callers report every chunk they are about to write through
//! [`RateLimiter::consume`], which sleeps whenever the bucket runs dry.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::RateLimitError;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Parses `400k`, `2M` or `512` into bytes per second.
///
/// An empty string means no limit.
pub fn parse_rate_limit(input: &str) -> Result<Option<u64>, RateLimitError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let lower = trimmed.to_ascii_lowercase();
    let (digits, multiplier) = match lower.strip_suffix('k') {
        Some(rest) => (rest, KIB),
        None => match lower.strip_suffix('m') {
            Some(rest) => (rest, MIB),
            None => (lower.as_str(), 1),
        },
    };

    digits
        .parse::<u64>()
        .ok()
        .and_then(|value| value.checked_mul(multiplier))
        .map(Some)
        .ok_or_else(|| RateLimitError {
            input: input.to_string(),
        })
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    bytes_per_sec: u64,
    allowance: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// A limiter starting with a full bucket. A rate of zero disables throttling.
    pub fn new(bytes_per_sec: u64) -> Self {
        Self {
            bytes_per_sec,
            allowance: bytes_per_sec as f64,
            last_refill: Instant::now(),
        }
    }

    pub fn bytes_per_sec(&self) -> u64 {
        self.bytes_per_sec
    }

    /// Waits until `bytes` may pass.
    pub async fn consume(&mut self, bytes: usize) {
        if self.bytes_per_sec == 0 || bytes == 0 {
            return;
        }
        let rate = self.bytes_per_sec as f64;

        self.refill(rate);
        self.allowance -= bytes as f64;
        if self.allowance < 0.0 {
            let wait = Duration::from_secs_f64(-self.allowance / rate);
            tokio::time::sleep(wait).await;
            self.refill(rate);
        }
    }

    fn refill(&mut self, rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.allowance = (self.allowance + elapsed * rate).min(rate);
    }
}
