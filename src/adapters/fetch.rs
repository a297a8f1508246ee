//! Rate-limited HTTP fetch client.
//!
//! Every upstream GET goes through `FetchClient::get_json`: bounded retries
//! with exponential backoff and full jitter for transient failures, and a
//! shared `CooldownGate` that every fetcher holding the same `Arc` waits out
//! after a 429.

use rand::Rng;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::error::{FetchError, RinkError, Result};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including initial try)
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff)
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 250,
            max_delay_ms: 4000,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &UpstreamConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay_ms: cfg.base_delay_ms,
            max_delay_ms: cfg.max_delay_ms,
        }
    }

    /// min(max_delay, base_delay * 2^(attempt-1))
    pub fn capped_backoff_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1);
        let multiplier = if exponent >= 32 {
            // Avoid overflow
            u64::MAX
        } else {
            1u64 << exponent
        };
        self.base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms)
    }

    /// Full jitter: random value in [0, capped)
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let capped = self.capped_backoff_ms(attempt);
        if capped == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..capped)
        }
    }
}

#[derive(Debug, Default)]
struct CooldownState {
    until: Option<Instant>,
    level: u32,
}

/// Cooldown shared by all concurrent fetchers after a rate-limit response.
#[derive(Debug)]
pub struct CooldownGate {
    base: Duration,
    max: Duration,
    state: Mutex<CooldownState>,
    rate_limit_hits: AtomicU64,
}

impl CooldownGate {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            state: Mutex::new(CooldownState::default()),
            rate_limit_hits: AtomicU64::new(0),
        }
    }

    pub fn from_config(cfg: &UpstreamConfig) -> Self {
        Self::new(
            Duration::from_secs(cfg.cooldown_base_secs),
            Duration::from_secs(cfg.cooldown_max_secs),
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CooldownState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Time left before the next request may go out
    pub fn remaining(&self) -> Option<Duration> {
        let state = self.lock();
        let until = state.until?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    pub async fn wait_ready(&self) {
        while let Some(wait) = self.remaining() {
            debug!("Cooldown active, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Record a 429 and push the shared cooldown out.
    ///
    /// Each consecutive 429 doubles the cooldown, up to `max`. A larger
    /// `Retry-After` wins, still bounded by `max`.
    pub fn escalate(&self, retry_after: Option<Duration>) -> Duration {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        let factor = 1u32.checked_shl(state.level.min(16)).unwrap_or(u32::MAX);
        let backoff = self.base.saturating_mul(factor).min(self.max);
        let wait = retry_after
            .map(|r| r.max(backoff))
            .unwrap_or(backoff)
            .min(self.max);

        let until = Instant::now() + wait;
        state.until = Some(match state.until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
        state.level = state.level.saturating_add(1);
        wait
    }

    /// A successful response resets the escalation level.
    pub fn relax(&self) {
        let mut state = self.lock();
        state.level = 0;
    }

    pub fn level(&self) -> u32 {
        self.lock().level
    }

    pub fn rate_limit_hits(&self) -> u64 {
        self.rate_limit_hits.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    RateLimited,
    Retryable,
    Permanent,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        429 => StatusClass::RateLimited,
        408 | 500..=599 => StatusClass::Retryable,
        _ => StatusClass::Permanent,
    }
}

/// HTTP client with per-call timeout, retries and the shared cooldown
#[derive(Clone)]
pub struct FetchClient {
    http: reqwest::Client,
    policy: RetryPolicy,
    gate: Arc<CooldownGate>,
}

impl FetchClient {
    pub fn new(timeout: Duration, policy: RetryPolicy, gate: Arc<CooldownGate>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rinkflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RinkError::Http)?;
        Ok(Self { http, policy, gate })
    }

    pub fn from_config(cfg: &UpstreamConfig) -> Result<Self> {
        Self::new(
            cfg.timeout(),
            RetryPolicy::from_config(cfg),
            Arc::new(CooldownGate::from_config(cfg)),
        )
    }

    pub fn gate(&self) -> &Arc<CooldownGate> {
        &self.gate
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> std::result::Result<T, FetchError> {
        let value = self.get_json(url).await?;
        serde_json::from_value(value).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    pub async fn get_json(&self, url: &str) -> std::result::Result<Value, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_status: Option<u16> = None;
        let mut last_message = String::new();

        for attempt in 1..=max_attempts {
            self.gate.wait_ready().await;

            match self.http.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    match classify_status(status) {
                        StatusClass::Success => match resp.bytes().await {
                            Ok(body) => {
                                self.gate.relax();
                                return serde_json::from_slice(&body).map_err(|e| {
                                    FetchError::Decode {
                                        url: url.to_string(),
                                        message: e.to_string(),
                                    }
                                });
                            }
                            Err(e) => {
                                last_status = Some(status);
                                last_message = format!("body read failed: {e}");
                            }
                        },
                        StatusClass::RateLimited => {
                            let retry_after = resp
                                .headers()
                                .get(RETRY_AFTER)
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| v.trim().parse::<u64>().ok())
                                .map(Duration::from_secs);
                            let wait = self.gate.escalate(retry_after);
                            warn!(
                                url,
                                attempt,
                                cooldown_ms = wait.as_millis() as u64,
                                "Rate limited, shared cooldown escalated"
                            );
                            last_status = Some(status);
                            last_message = "rate limited".to_string();
                            // the gate delays the next attempt
                            continue;
                        }
                        StatusClass::Retryable => {
                            last_status = Some(status);
                            last_message = format!("server status {status}");
                        }
                        StatusClass::Permanent => {
                            return Err(FetchError::Permanent {
                                url: url.to_string(),
                                status,
                            });
                        }
                    }
                }
                Err(e) => {
                    last_status = e.status().map(|s| s.as_u16());
                    last_message = if e.is_timeout() {
                        format!("timeout: {e}")
                    } else {
                        e.to_string()
                    };
                }
            }

            if attempt < max_attempts {
                let delay = self.policy.backoff_ms(attempt);
                debug!(url, attempt, delay_ms = delay, "Retrying after transient failure: {}", last_message);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(FetchError::Transient {
            url: url.to_string(),
            status: last_status,
            attempts: max_attempts,
            message: last_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 1000,
        };
        assert_eq!(policy.capped_backoff_ms(1), 100);
        assert_eq!(policy.capped_backoff_ms(2), 200);
        assert_eq!(policy.capped_backoff_ms(4), 800);
        assert_eq!(policy.capped_backoff_ms(5), 1000);
        assert_eq!(policy.capped_backoff_ms(60), 1000);
        for attempt in 1..6 {
            assert!(policy.backoff_ms(attempt) < policy.capped_backoff_ms(attempt));
        }
    }

    #[test]
    fn status_classes() {
        assert_eq!(classify_status(200), StatusClass::Success);
        assert_eq!(classify_status(429), StatusClass::RateLimited);
        assert_eq!(classify_status(503), StatusClass::Retryable);
        assert_eq!(classify_status(404), StatusClass::Permanent);
        assert_eq!(classify_status(400), StatusClass::Permanent);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_escalates_and_is_shared() {
        let gate = Arc::new(CooldownGate::new(
            Duration::from_secs(2),
            Duration::from_secs(10),
        ));
        assert!(gate.remaining().is_none());

        assert_eq!(gate.escalate(None), Duration::from_secs(2));
        assert_eq!(gate.escalate(None), Duration::from_secs(4));
        assert_eq!(gate.escalate(None), Duration::from_secs(8));
        assert_eq!(gate.escalate(None), Duration::from_secs(10));
        assert_eq!(gate.rate_limit_hits(), 4);

        // a second holder of the same gate sees the cooldown
        let other = gate.clone();
        assert!(other.remaining().is_some());

        let started = Instant::now();
        other.wait_ready().await;
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(gate.remaining().is_none());

        gate.relax();
        assert_eq!(gate.level(), 0);
        assert_eq!(gate.escalate(Some(Duration::from_secs(7))), Duration::from_secs(7));
    }
}
