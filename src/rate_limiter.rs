//! Token bucket admission control for upstream market-data requests.
//!
//! The bucket refills continuously from elapsed time. Callers that find it
//! empty are queued by priority (then arrival) and suspended until a token
//! accrues for them; nobody is rejected, callers bound their own wait with
//! [`RateLimiter::acquire_timeout`] or by dropping the future.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};
use tracing::debug;
use utoipa::ToSchema;

/// Floor on re-check sleeps when a token is available but reserved for a
/// higher-priority waiter.
const MIN_RECHECK: Duration = Duration::from_millis(1);

/// Request priority. Higher priorities are granted tokens first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work such as streaming rescans.
    Low,
    /// Batch scans.
    #[default]
    Normal,
    /// Interactive single-symbol scans.
    High,
}

/// Rate limiter errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// No token became available within the caller's deadline.
    #[error("timed out after {0:?} waiting for a rate limit token")]
    Timeout(Duration),
}

/// Bucket dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterConfig {
    /// Maximum number of stored tokens (burst size).
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_per_second: f64,
}

impl RateLimiterConfig {
    /// Sizes the bucket at a fraction of the provider's documented maximum.
    ///
    /// # Arguments
    /// * `max_per_second` - Provider's hard sustained limit.
    /// * `safety_factor` - Fraction of that limit to use (e.g. 0.9).
    #[must_use]
    pub fn with_safety_margin(max_per_second: f64, safety_factor: f64) -> Self {
        let rate = max_per_second * safety_factor;
        Self {
            capacity: rate.max(1.0),
            refill_per_second: rate,
        }
    }
}

impl Default for RateLimiterConfig {
    /// 90% of a 50 requests/second upstream limit.
    fn default() -> Self {
        Self::with_safety_margin(50.0, 0.9)
    }
}

type Ticket = (Reverse<Priority>, u64);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    waiters: BTreeSet<Ticket>,
    next_ticket: u64,
}

impl Bucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            waiters: BTreeSet::new(),
            next_ticket: 0,
        }
    }

    fn refill(&mut self, now: Instant, config: &RateLimiterConfig) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.refill_per_second).min(config.capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_to_next_token(&self, config: &RateLimiterConfig) -> Duration {
        let deficit = (1.0 - self.tokens).max(0.0);
        Duration::from_secs_f64(deficit / config.refill_per_second)
    }
}

/// Counters exposed for statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterStats {
    /// Tokens granted since start.
    pub granted: u64,
    /// Grants that had to queue.
    pub queued: u64,
    /// Callers currently waiting.
    pub waiting: usize,
    /// Tokens currently available.
    pub available: f64,
}

/// Priority-aware token bucket.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
    notify: Notify,
    granted: AtomicU64,
    queued: AtomicU64,
}

impl RateLimiter {
    /// Creates a full bucket.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        debug!(
            "Rate limiter: capacity {:.1}, refill {:.1}/s",
            config.capacity, config.refill_per_second
        );
        Self {
            config,
            bucket: Mutex::new(Bucket::new(config.capacity, Instant::now())),
            notify: Notify::new(),
            granted: AtomicU64::new(0),
            queued: AtomicU64::new(0),
        }
    }

    /// Returns the bucket configuration.
    #[must_use]
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Waits until a token is granted to this caller.
    ///
    /// Cancellation-safe: dropping the future removes the caller from the
    /// wait queue.
    pub async fn acquire(&self, priority: Priority) {
        let ticket = {
            let mut bucket = self.bucket.lock();
            bucket.refill(Instant::now(), &self.config);
            if bucket.waiters.is_empty() && bucket.try_take() {
                self.granted.fetch_add(1, Ordering::Relaxed);
                return;
            }
            let ticket = (Reverse(priority), bucket.next_ticket);
            bucket.next_ticket += 1;
            bucket.waiters.insert(ticket);
            ticket
        };

        self.queued.fetch_add(1, Ordering::Relaxed);
        let mut waiter = QueuedWaiter {
            limiter: self,
            ticket,
            granted: false,
        };

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wait = {
                let mut bucket = self.bucket.lock();
                bucket.refill(Instant::now(), &self.config);
                let at_head = bucket.waiters.first() == Some(&ticket);
                if at_head && bucket.try_take() {
                    bucket.waiters.remove(&ticket);
                    waiter.granted = true;
                    None
                } else {
                    Some(bucket.time_to_next_token(&self.config))
                }
            };

            let Some(wait) = wait else {
                self.granted.fetch_add(1, Ordering::Relaxed);
                self.notify.notify_waiters();
                return;
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(wait.max(MIN_RECHECK)) => {}
            }
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    ///
    /// # Errors
    /// Returns [`RateLimitError::Timeout`] when no token was granted in time.
    pub async fn acquire_timeout(
        &self,
        priority: Priority,
        timeout: Duration,
    ) -> Result<(), RateLimitError> {
        tokio::time::timeout(timeout, self.acquire(priority))
            .await
            .map_err(|_| RateLimitError::Timeout(timeout))
    }

    /// Takes a token only if one is available right now and nobody is queued.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock();
        bucket.refill(Instant::now(), &self.config);
        let taken = bucket.waiters.is_empty() && bucket.try_take();
        if taken {
            self.granted.fetch_add(1, Ordering::Relaxed);
        }
        taken
    }

    /// Tokens available after refilling to the current instant.
    #[must_use]
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        bucket.refill(Instant::now(), &self.config);
        bucket.tokens
    }

    /// Snapshot of counters.
    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        let mut bucket = self.bucket.lock();
        bucket.refill(Instant::now(), &self.config);
        RateLimiterStats {
            granted: self.granted.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            waiting: bucket.waiters.len(),
            available: bucket.tokens,
        }
    }
}

/// Removes an abandoned ticket from the queue.
struct QueuedWaiter<'a> {
    limiter: &'a RateLimiter,
    ticket: Ticket,
    granted: bool,
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        if !self.granted {
            self.limiter.bucket.lock().waiters.remove(&self.ticket);
            self.limiter.notify.notify_waiters();
        }
    }
}
