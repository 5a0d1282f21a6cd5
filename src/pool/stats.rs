//! Pool accounting: gauges plus the readiness indicator.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use parking_lot::Mutex;

pub(crate) const DEFAULT_READY_HIGH_PCT: u8 = 50;
pub(crate) const DEFAULT_READY_LOW_PCT: u8 = 0;

#[derive(Debug, Default)]
pub(crate) struct Gauge(AtomicI64);

impl Gauge {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Two-threshold hysteresis indicator.
///
/// Turns true when the observed value reaches `high`, back to false when it
/// drops to `low`. Observation is a read-modify-write, so it runs under a
/// mutex; reads stay lock-free.
#[derive(Debug)]
pub(crate) struct ReadyIndicator {
    flag: AtomicBool,
    observe_lock: Mutex<()>,
    high: i64,
    low: i64,
}

impl ReadyIndicator {
    pub fn new(high: i64, low: i64) -> Self {
        Self {
            flag: AtomicBool::new(false),
            observe_lock: Mutex::new(()),
            high,
            low,
        }
    }

    pub fn observe(&self, value: i64) {
        let _guard = self.observe_lock.lock();
        if self.flag.load(Ordering::SeqCst) {
            if value <= self.low {
                self.flag.store(false, Ordering::SeqCst);
            }
        } else if value >= self.high {
            self.flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn get(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Converts percent thresholds into absolute item counts, falling back to
/// the defaults when the configuration is out of range or inverted.
pub(crate) fn thresholds(size: usize, mut high_pct: u8, mut low_pct: u8) -> (i64, i64) {
    if high_pct > 100 || low_pct > 100 || low_pct >= high_pct {
        high_pct = DEFAULT_READY_HIGH_PCT;
        low_pct = DEFAULT_READY_LOW_PCT;
    }
    let high = (f64::from(high_pct) * size as f64 / 100.0).ceil() as i64;
    let low = (f64::from(low_pct) * size as f64 / 100.0).floor() as i64;
    (high, low)
}

#[derive(Debug)]
pub(crate) struct PoolStats {
    pub idle: Gauge,
    pub in_use: Gauge,
    pub waiting: Gauge,
    ready: ReadyIndicator,
}

impl PoolStats {
    pub fn new(high: i64, low: i64) -> Self {
        Self {
            idle: Gauge::default(),
            in_use: Gauge::default(),
            waiting: Gauge::default(),
            ready: ReadyIndicator::new(high, low),
        }
    }

    pub fn update_ready(&self) {
        self.ready.observe(self.idle.get() + self.in_use.get());
    }

    pub fn ready(&self) -> bool {
        self.ready.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_counts() {
        let g = Gauge::default();
        g.inc();
        g.inc();
        g.dec();
        assert_eq!(g.get(), 1);
    }

    /// Once true the indicator stays true until the value drops to the low
    /// threshold; once false it stays false until the value reaches the
    /// high threshold again.
    #[test]
    fn test_indicator_hysteresis() {
        let ind = ReadyIndicator::new(5, 2);
        assert!(!ind.get());

        ind.observe(4);
        assert!(!ind.get());
        ind.observe(5);
        assert!(ind.get());

        // Stays true in between thresholds.
        ind.observe(3);
        assert!(ind.get());
        ind.observe(2);
        assert!(!ind.get());

        // Stays false until high is reached again.
        ind.observe(4);
        assert!(!ind.get());
        ind.observe(6);
        assert!(ind.get());
    }

    #[test]
    fn test_thresholds_from_percents() {
        assert_eq!(thresholds(10, 50, 0), (5, 0));
        assert_eq!(thresholds(10, 75, 25), (8, 2));
        assert_eq!(thresholds(1, 50, 0), (1, 0));
    }

    #[test]
    fn test_invalid_thresholds_fall_back() {
        // low >= high
        assert_eq!(thresholds(10, 20, 20), (5, 0));
        assert_eq!(thresholds(10, 20, 30), (5, 0));
        // out of range
        assert_eq!(thresholds(10, 120, 0), (5, 0));
        assert_eq!(thresholds(10, 80, 110), (5, 0));
    }
}
