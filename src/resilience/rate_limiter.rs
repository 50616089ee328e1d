use crate::{Error, ErrorContext, Result};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RateLimiterSnapshot {
    pub rps: f64,
    pub burst: f64,
    pub tokens: f64,
    /// Estimated wait time until a token is available (ms), if currently empty.
    pub estimated_wait_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Tokens per second.
    pub rps: f64,
    /// Maximum burst size (tokens).
    pub burst: f64,
}

impl RateLimiterConfig {
    pub fn new() -> Self {
        Self {
            rps: 10.0,
            burst: 10.0,
        }
    }

    /// `max_requests` per `window`: bursts of `max_requests`, refilled evenly
    /// across the window.
    pub fn per_window(max_requests: u32, window: Duration) -> Option<Self> {
        let secs = window.as_secs_f64();
        if max_requests == 0 || secs <= 0.0 {
            return None;
        }
        Some(Self {
            rps: max_requests as f64 / secs,
            burst: max_requests as f64,
        })
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.burst = tokens as f64;
        self
    }

    pub fn with_refill_rate(mut self, rate: f64) -> Self {
        self.rps = rate;
        self
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses `N/SECS`, e.g. `15/300` for 15 requests per five minutes.
impl FromStr for RateLimiterConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::configuration_with_context(
                format!("invalid rate limit '{}'", s),
                ErrorContext::new()
                    .with_field_path("GATEWAY_RATE_LIMIT")
                    .with_details("expected '<requests>/<seconds>' with both positive"),
            )
        };
        let (n, secs) = s.trim().split_once('/').ok_or_else(invalid)?;
        let n = n.trim().parse::<u32>().map_err(|_| invalid())?;
        let secs = secs.trim().parse::<u64>().map_err(|_| invalid())?;
        Self::per_window(n, Duration::from_secs(secs)).ok_or_else(invalid)
    }
}

#[derive(Debug)]
struct State {
    tokens: f64,
    last: Instant,
}

/// Minimal token-bucket rate limiter (opt-in).
///
/// - One bucket per gateway process, shared by every inbound request
/// - Best-effort fairness for async tasks
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        let burst = cfg.burst;
        let state = Mutex::new(State {
            tokens: burst,
            last: Instant::now(),
        });
        Self { cfg, state }
    }

    fn refill_locked(cfg: &RateLimiterConfig, st: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(st.last).as_secs_f64();
        if elapsed > 0.0 {
            st.tokens = (st.tokens + elapsed * cfg.rps).min(cfg.burst);
            st.last = now;
        }
    }

    /// Try to acquire a token without waiting, returns true if successful
    pub async fn try_acquire(&self) -> bool {
        let cfg = &self.cfg;
        if cfg.rps <= 0.0 {
            return true;
        }

        let mut st = self.state.lock().await;
        Self::refill_locked(cfg, &mut st);

        if st.tokens >= 1.0 {
            st.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub async fn snapshot(&self) -> RateLimiterSnapshot {
        let cfg = &self.cfg;
        let mut st = self.state.lock().await;

        let mut wait_ms = None;
        if cfg.rps > 0.0 {
            Self::refill_locked(cfg, &mut st);
            if st.tokens < 1.0 {
                let missing = 1.0 - st.tokens;
                wait_ms = Some((missing / cfg.rps * 1000.0) as u64);
            }
        }

        RateLimiterSnapshot {
            rps: cfg.rps,
            burst: cfg.burst,
            tokens: st.tokens,
            estimated_wait_ms: wait_ms,
        }
    }
}
