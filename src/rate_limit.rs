use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding window in-memory rate limiter (pod local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Per-action limits derived from env. Scans are the expensive action (they
/// fan out to the scorer), so they get the tightest default.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub scan_limit: usize,
    pub scan_window: Duration,
    pub flag_limit: usize,
    pub flag_window: Duration,
    pub investigate_limit: usize,
    pub investigate_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn dur_env(name: &str, default: u64) -> Duration {
            Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default))
        }
        Self {
            scan_limit: usize_env("RL_SCAN_LIMIT", 10),
            scan_window: dur_env("RL_SCAN_WINDOW", 60),
            flag_limit: usize_env("RL_FLAG_LIMIT", 20),
            flag_window: dur_env("RL_FLAG_WINDOW", 60),
            investigate_limit: usize_env("RL_INVESTIGATE_LIMIT", 5),
            investigate_window: dur_env("RL_INVESTIGATE_WINDOW", 300),
        }
    }
}

/// High level guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self {
        Self { limiter, cfg }
    }
    pub fn allow_scan(&self, ip: &str) -> bool {
        self.limiter.check(&format!("scan:{ip}"), self.cfg.scan_limit, self.cfg.scan_window)
    }
    pub fn allow_flag(&self, ip: &str) -> bool {
        self.limiter.check(&format!("flag:{ip}"), self.cfg.flag_limit, self.cfg.flag_window)
    }
    pub fn allow_investigate(&self, ip: &str) -> bool {
        self.limiter.check(
            &format!("investigate:{ip}"),
            self.cfg.investigate_limit,
            self.cfg.investigate_window,
        )
    }
}
