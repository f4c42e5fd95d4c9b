//! Connect retry policy
//!
//! Fixed-interval scheduling with an attempt budget. Each attempt is
//! independent; there is no backoff growth.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

/// How many connect attempts a target gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryLimit {
    /// Keep trying until superseded or stopped
    #[default]
    Unlimited,
    /// Give up after this many failed attempts
    Attempts(NonZeroU32),
}

impl RetryLimit {
    /// Map the raw count used by configuration and the console
    ///
    /// `0` and `u32::MAX` both mean unlimited.
    pub fn from_raw(raw: u32) -> Self {
        match NonZeroU32::new(raw) {
            Some(n) if n.get() != u32::MAX => Self::Attempts(n),
            _ => Self::Unlimited,
        }
    }

    /// Limited budget; a budget of zero still allows one attempt
    pub fn attempts(n: u32) -> Self {
        Self::Attempts(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN))
    }

    /// Whether another attempt may follow `attempts_made` failures
    pub fn allows(&self, attempts_made: u32) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Attempts(max) => attempts_made < max.get(),
        }
    }
}

/// What the worker should do next for the current target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Make attempt number `n` (1-based) now
    Attempt(u32),
    /// Nothing to do until this much time has passed
    Wait(Duration),
    /// The budget is spent after this many attempts
    Exhausted(u32),
    /// No attempt is scheduled
    Idle,
}

/// Attempt bookkeeping for one connect target
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    interval: Duration,
    limit: RetryLimit,
    attempts: u32,
    next_attempt: Option<Instant>,
}

impl RetrySchedule {
    /// New schedule whose first attempt is due immediately
    pub fn new(interval: Duration, limit: RetryLimit) -> Self {
        Self {
            interval,
            limit,
            attempts: 0,
            next_attempt: Some(Instant::now()),
        }
    }

    /// New schedule whose first attempt waits one interval
    ///
    /// Used after a live connection drops so a peer that closes every
    /// connection immediately is not hammered.
    pub fn delayed(interval: Duration, limit: RetryLimit) -> Self {
        Self {
            next_attempt: Some(Instant::now() + interval),
            ..Self::new(interval, limit)
        }
    }

    /// Decide the next step at `now`
    ///
    /// The budget is checked when a slot comes due, so exhaustion is declared
    /// one interval after the last failed attempt.
    pub fn poll(&mut self, now: Instant) -> RetryStep {
        match self.next_attempt {
            None => RetryStep::Idle,
            Some(due) if now < due => RetryStep::Wait(due - now),
            Some(_) => {
                self.next_attempt = None;
                if self.limit.allows(self.attempts) {
                    self.attempts = self.attempts.saturating_add(1);
                    RetryStep::Attempt(self.attempts)
                } else {
                    RetryStep::Exhausted(self.attempts)
                }
            }
        }
    }

    /// Schedule the next slot after a failed attempt
    pub fn record_failure(&mut self, now: Instant) {
        self.next_attempt = Some(now + self.interval);
    }

    /// Time left before the next slot, if one is scheduled
    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.next_attempt
            .map(|due| due.saturating_duration_since(now))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn limit(&self) -> RetryLimit {
        self.limit
    }
}
