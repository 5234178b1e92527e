//! HTTP fetch with per-request timeout, bounded retries and a global deadline.
//!
//! Attempt N gets `base_timeout + N * timeout_step`, no backoff sleep.
//! Client errors (4xx other than 408/429) and unparseable bodies fail fast.

use anyhow::{anyhow, Context, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::ScrapeSettings;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts:     u32,
    pub base_timeout: Duration,
    pub timeout_step: Duration,
}

impl RetryPolicy {
    /// Timeout for a zero-based attempt.
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        self.base_timeout + self.timeout_step * attempt
    }
}

/// Wall-clock budget for a whole scrape run.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget:  Duration,
}

impl Deadline {
    pub fn new(budget: Duration) -> Self {
        Self { started: Instant::now(), budget }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

pub struct HttpFetcher {
    client:   reqwest::Client,
    policy:   RetryPolicy,
    limiter:  Option<DefaultDirectRateLimiter>,
    deadline: Deadline,
}

/// Shared gzip-capable client; scrapers keep one and reuse it across runs.
pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .gzip(true)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

impl HttpFetcher {
    pub fn with_client(client: reqwest::Client, settings: &ScrapeSettings) -> Self {
        let limiter = Quota::with_period(settings.page_delay).map(|q| RateLimiter::direct(q));
        Self {
            client,
            policy: settings.retry_policy(),
            limiter,
            deadline: Deadline::new(settings.max_runtime),
        }
    }

    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }

    /// GET `url` and parse the body as JSON, retrying per policy.
    pub async fn get_json(&self, url: &Url, headers: &HeaderMap) -> Result<Value> {
        let mut last_err = anyhow!("no attempt made for {url}");

        for attempt in 0..self.policy.attempts {
            if self.deadline.expired() {
                return Err(last_err.context(format!("deadline exceeded before attempt {}", attempt + 1)));
            }

            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            let timeout = self.policy.timeout_for(attempt).min(self.deadline.remaining());
            debug!("GET {} (attempt {}/{}, timeout {:?})", url, attempt + 1, self.policy.attempts, timeout);

            match self.try_once(url, headers, timeout).await {
                Ok(body) => return Ok(body),
                Err(FetchFailure::Fatal(e)) => return Err(e),
                Err(FetchFailure::Retryable(e)) => {
                    warn!("attempt {}/{} for {} failed: {:#}", attempt + 1, self.policy.attempts, url.path(), e);
                    last_err = e;
                }
            }
        }

        Err(last_err.context(format!("giving up on {} after {} attempts", url.path(), self.policy.attempts)))
    }

    async fn try_once(&self, url: &Url, headers: &HeaderMap, timeout: Duration) -> Result<Value, FetchFailure> {
        let resp = self
            .client
            .get(url.clone())
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await
            .context("request failed")
            .map_err(FetchFailure::Retryable)?;

        let status = resp.status();
        let raw = resp
            .text()
            .await
            .context("body read failed")
            .map_err(FetchFailure::Retryable)?;

        if !status.is_success() {
            let err = anyhow!("HTTP {}: {}", status, &raw[..floor_char_boundary(&raw, 200)]);
            return Err(if is_retryable_status(status) {
                FetchFailure::Retryable(err)
            } else {
                FetchFailure::Fatal(err)
            });
        }

        if raw.trim().is_empty() {
            return Err(FetchFailure::Retryable(anyhow!("empty response body")));
        }

        serde_json::from_str(&raw).map_err(|e| {
            FetchFailure::Fatal(anyhow!(
                "JSON parse failed ({e}), body starts with: {}",
                &raw[..floor_char_boundary(&raw, 100)]
            ))
        })
    }
}

enum FetchFailure {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
