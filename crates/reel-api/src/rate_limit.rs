use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reel_core::util::subject_fingerprint;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::AppError;

/// Fixed-window request limiter keyed by endpoint and subject.
#[derive(Clone)]
pub struct EndpointRateLimiter {
    state: Arc<Mutex<HashMap<String, RateWindow>>>,
    window: Duration,
    read_limit: u32,
    write_limit: u32,
    metrics: Arc<RateLimitMetrics>,
}

#[derive(Clone, Copy)]
pub enum ProtectedEndpoint {
    FavoritesRead,
    FavoritesWrite,
}

#[derive(Default)]
struct RateLimitMetrics {
    read_allowed: AtomicU64,
    read_limited: AtomicU64,
    write_allowed: AtomicU64,
    write_limited: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub read_allowed: u64,
    pub read_limited: u64,
    pub write_allowed: u64,
    pub write_limited: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl EndpointRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_window,
            config.favorites_read_rate_limit_per_window,
            config.favorites_write_rate_limit_per_window,
        )
    }

    fn new(window: Duration, read_limit: u32, write_limit: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            window,
            read_limit,
            write_limit,
            metrics: Arc::new(RateLimitMetrics::default()),
        }
    }

    pub async fn check(&self, endpoint: ProtectedEndpoint, subject_id: &str) -> Result<(), AppError> {
        let limit = match endpoint {
            ProtectedEndpoint::FavoritesRead => self.read_limit,
            ProtectedEndpoint::FavoritesWrite => self.write_limit,
        };

        let key = format!("{}:{subject_id}", endpoint.label());
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        // Drop windows that ended so idle subjects do not accumulate.
        guard.retain(|_, window| now.duration_since(window.started_at) < self.window);
        let entry = guard.entry(key).or_insert(RateWindow {
            started_at: now,
            count: 0,
        });

        if entry.count >= limit {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs()
                .max(1);
            self.mark_limited(endpoint);
            tracing::warn!(
                endpoint = endpoint.label(),
                user = subject_fingerprint(subject_id),
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                "Rate limit exceeded for favorites endpoint",
                retry_after_secs,
            ));
        }

        entry.count += 1;
        self.mark_allowed(endpoint);
        Ok(())
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            read_allowed: self.metrics.read_allowed.load(Ordering::Relaxed),
            read_limited: self.metrics.read_limited.load(Ordering::Relaxed),
            write_allowed: self.metrics.write_allowed.load(Ordering::Relaxed),
            write_limited: self.metrics.write_limited.load(Ordering::Relaxed),
        }
    }

    fn mark_allowed(&self, endpoint: ProtectedEndpoint) {
        let counter = match endpoint {
            ProtectedEndpoint::FavoritesRead => &self.metrics.read_allowed,
            ProtectedEndpoint::FavoritesWrite => &self.metrics.write_allowed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn mark_limited(&self, endpoint: ProtectedEndpoint) {
        let counter = match endpoint {
            ProtectedEndpoint::FavoritesRead => &self.metrics.read_limited,
            ProtectedEndpoint::FavoritesWrite => &self.metrics.write_limited,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl ProtectedEndpoint {
    pub const fn label(self) -> &'static str {
        match self {
            Self::FavoritesRead => "favorites_read",
            Self::FavoritesWrite => "favorites_write",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_blocks_after_limit() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 5, 2);

        limiter
            .check(ProtectedEndpoint::FavoritesWrite, "user-a")
            .await
            .unwrap();
        limiter
            .check(ProtectedEndpoint::FavoritesWrite, "user-a")
            .await
            .unwrap();

        let err = limiter
            .check(ProtectedEndpoint::FavoritesWrite, "user-a")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_, secs) if secs >= 1));

        let metrics = limiter.metrics_snapshot();
        assert_eq!(metrics.write_allowed, 2);
        assert_eq!(metrics.write_limited, 1);
    }

    #[tokio::test]
    async fn rate_limiter_keys_by_endpoint_and_subject() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 1, 1);

        limiter
            .check(ProtectedEndpoint::FavoritesWrite, "user-a")
            .await
            .unwrap();
        limiter
            .check(ProtectedEndpoint::FavoritesRead, "user-a")
            .await
            .unwrap();
        limiter
            .check(ProtectedEndpoint::FavoritesWrite, "user-b")
            .await
            .unwrap();

        let metrics = limiter.metrics_snapshot();
        assert_eq!(metrics.read_allowed, 1);
        assert_eq!(metrics.write_allowed, 2);
        assert_eq!(metrics.write_limited, 0);
    }

    #[tokio::test]
    async fn rate_limiter_resets_after_window() {
        let limiter = EndpointRateLimiter::new(Duration::from_millis(20), 1, 1);

        limiter
            .check(ProtectedEndpoint::FavoritesRead, "user-a")
            .await
            .unwrap();
        assert!(limiter
            .check(ProtectedEndpoint::FavoritesRead, "user-a")
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter
            .check(ProtectedEndpoint::FavoritesRead, "user-a")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rate_limiter_prunes_ended_windows() {
        let limiter = EndpointRateLimiter::new(Duration::from_millis(20), 5, 5);

        for subject in ["user-a", "user-b", "user-c"] {
            limiter
                .check(ProtectedEndpoint::FavoritesRead, subject)
                .await
                .unwrap();
        }
        assert_eq!(limiter.state.lock().await.len(), 3);

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter
            .check(ProtectedEndpoint::FavoritesWrite, "user-d")
            .await
            .unwrap();

        let keys: Vec<String> = limiter.state.lock().await.keys().cloned().collect();
        assert_eq!(keys, vec!["favorites_write:user-d".to_string()]);
    }
}
