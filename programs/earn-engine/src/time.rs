use std::sync::atomic::{AtomicI64, Ordering};

/// Source of unix timestamps for every ledger mutation.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Time that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualTime(AtomicI64);

impl ManualTime {
    pub fn new(start: i64) -> Self {
        Self(AtomicI64::new(start))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
