//! Time source for the engine.
//!
//! Reservation expiry is decided against this clock at the moment of each
//! write, never against a client-supplied clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SubsecRound, TimeZone, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock, truncated to whole seconds.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }
}

/// Manually driven clock for tests; clones share the same instant.
#[derive(Clone)]
pub struct ManualClock {
    epoch_secs: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            epoch_secs: Arc::new(AtomicI64::new(now.timestamp())),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.epoch_secs.store(now.timestamp(), Ordering::SeqCst);
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.epoch_secs.fetch_add(minutes * 60, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match Utc.timestamp_opt(self.epoch_secs.load(Ordering::SeqCst), 0) {
            chrono::LocalResult::Single(t) => t,
            _ => Utc::now().trunc_subsecs(0),
        }
    }
}
