use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::fetch::RetryPolicy;

/// Knobs shared by every scraper. Read once from the environment
/// (after `dotenv().ok()` in the binaries).
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub request_timeout: Duration,
    pub retries:         u32,
    pub timeout_step:    Duration,
    pub max_pages:       u32,
    pub max_runtime:     Duration,
    pub page_delay:      Duration,
    /// Raw `Cookie` header captured from a browser session, BetPawa only.
    pub betpawa_cookie:  Option<String>,
    pub sportybet_country: String,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            request_timeout:   Duration::from_secs(15),
            retries:           3,
            timeout_step:      Duration::from_secs(5),
            max_pages:         20,
            max_runtime:       Duration::from_secs(120),
            page_delay:        Duration::from_millis(300),
            betpawa_cookie:    None,
            sportybet_country: "gh".to_string(),
        }
    }
}

impl ScrapeSettings {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            request_timeout:   Duration::from_secs(env_or("SCRAPE_TIMEOUT_SECS", d.request_timeout.as_secs())),
            retries:           env_or("SCRAPE_RETRIES", d.retries),
            timeout_step:      Duration::from_secs(env_or("SCRAPE_TIMEOUT_STEP_SECS", d.timeout_step.as_secs())),
            max_pages:         env_or("SCRAPE_MAX_PAGES", d.max_pages),
            max_runtime:       Duration::from_secs(env_or("SCRAPE_MAX_RUNTIME_SECS", d.max_runtime.as_secs())),
            page_delay:        Duration::from_millis(env_or("SCRAPE_PAGE_DELAY_MS", d.page_delay.as_millis() as u64)),
            betpawa_cookie:    env::var("BETPAWA_COOKIE").ok().filter(|c| !c.trim().is_empty()),
            sportybet_country: env::var("SPORTYBET_COUNTRY")
                .ok()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .unwrap_or(d.sportybet_country),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts:     self.retries.max(1),
            base_timeout: self.request_timeout,
            timeout_step: self.timeout_step,
        }
    }
}

/// Parse an env var, falling back to `default` when unset or malformed.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
