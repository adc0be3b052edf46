//! Two-level token bucket rate limiting for the connector's outbound REST
//! calls (spec.md §4.B): one bucket per endpoint family, global and
//! per-symbol, with a cool-down multiplier applied after a 429.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct BucketConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
    cooldown_until: Option<Instant>,
    cooldown_multiplier: f64,
}

impl Bucket {
    fn new(config: &BucketConfig) -> Self {
        Self {
            tokens: config.capacity,
            capacity: config.capacity,
            refill_per_sec: config.refill_per_sec,
            last_refill: Instant::now(),
            cooldown_until: None,
            cooldown_multiplier: 1.0,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        let rate = self.refill_per_sec / self.cooldown_multiplier;
        self.tokens = (self.tokens + elapsed * rate).min(self.capacity);
        self.last_refill = now;

        if let Some(until) = self.cooldown_until {
            if now >= until {
                self.cooldown_until = None;
                self.cooldown_multiplier = 1.0;
            }
        }
    }

    fn try_take(&mut self, weight: f64) -> bool {
        let now = Instant::now();
        self.refill(now);
        if self.tokens >= weight {
            self.tokens -= weight;
            true
        } else {
            false
        }
    }

    /// Drains tokens and applies a cool-down multiplier after a 429 /
    /// back-pressure signal (spec.md §4.B).
    fn trip_cooldown(&mut self, duration: Duration, multiplier: f64) {
        self.tokens = 0.0;
        self.cooldown_until = Some(Instant::now() + duration);
        self.cooldown_multiplier = multiplier.max(1.0);
    }
}

/// A family of endpoints (e.g. "place_order") sharing one global budget and
/// one budget per symbol.
pub struct EndpointRateLimiter {
    global: Mutex<Bucket>,
    per_symbol: Mutex<HashMap<String, Bucket>>,
    per_symbol_config: BucketConfig,
}

impl EndpointRateLimiter {
    pub fn new(global: BucketConfig, per_symbol: BucketConfig) -> Self {
        Self {
            global: Mutex::new(Bucket::new(&global)),
            per_symbol: Mutex::new(HashMap::new()),
            per_symbol_config: per_symbol,
        }
    }

    /// Attempts to take `weight` tokens from both the global and the
    /// symbol-level bucket. Both must have capacity.
    pub fn try_acquire(&self, symbol: &str, weight: f64) -> bool {
        let mut global = self.global.lock();
        let mut per_symbol = self.per_symbol.lock();
        let bucket = per_symbol
            .entry(symbol.to_string())
            .or_insert_with(|| Bucket::new(&self.per_symbol_config));

        // Peek global capacity without spending if the symbol bucket can't cover it.
        let now = Instant::now();
        bucket.refill(now);
        if bucket.tokens < weight {
            return false;
        }
        if !global.try_take(weight) {
            return false;
        }
        bucket.tokens -= weight;
        true
    }

    pub fn on_backpressure(&self, symbol: &str, cooldown: Duration, multiplier: f64) {
        self.global.lock().trip_cooldown(cooldown, multiplier);
        if let Some(bucket) = self.per_symbol.lock().get_mut(symbol) {
            bucket.trip_cooldown(cooldown, multiplier);
        }
    }
}
