//! Performance Monitor (spec.md §4.M): named timers and counters behind a
//! single mutex, with a snapshot that includes a derived cache hit rate.
//!
//! Grounded on `examples/original_source/gpt/performance_monitor.py`'s
//! `PerformanceMonitor` (`start_timer`/`stop_timer`/`increment_counter`/
//! `get_performance_stats`), translated from a mutable dict-of-lists under
//! the GIL to a `std::sync::Mutex`-guarded struct.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

#[derive(Debug, Clone, Copy, Default)]
pub struct TimerStats {
    pub count: usize,
    pub total: Duration,
    pub average: Duration,
    pub max: Duration,
    pub min: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceStats {
    pub session_duration: Duration,
    pub timers: HashMap<String, TimerStats>,
    pub counters: HashMap<String, u64>,
    /// `cache_hits / (cache_hits + cache_misses)`, `0.0` when neither counter
    /// has been incremented yet.
    pub cache_hit_rate: f64,
}

#[derive(Default)]
struct Inner {
    timers: HashMap<String, Vec<Duration>>,
    timer_starts: HashMap<String, Instant>,
    counters: HashMap<String, u64>,
}

pub struct PerformanceMonitor {
    inner: Mutex<Inner>,
    session_start: Instant,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            session_start: Instant::now(),
        }
    }

    pub fn start_timer(&self, name: &str) {
        let mut inner = self.inner.lock().expect("performance monitor mutex poisoned");
        inner.timer_starts.insert(name.to_string(), Instant::now());
    }

    /// Stop a timer started with `start_timer`. Stopping a timer that was
    /// never started is a caller bug, not a reportable error: it is logged
    /// and otherwise ignored.
    pub fn stop_timer(&self, name: &str) {
        let mut inner = self.inner.lock().expect("performance monitor mutex poisoned");
        match inner.timer_starts.remove(name) {
            Some(started) => {
                let elapsed = started.elapsed();
                inner.timers.entry(name.to_string()).or_default().push(elapsed);
            }
            None => warn!(timer = name, "performance monitor: stop_timer on a timer that was never started"),
        }
    }

    pub fn increment_counter(&self, name: &str, value: u64) {
        let mut inner = self.inner.lock().expect("performance monitor mutex poisoned");
        *inner.counters.entry(name.to_string()).or_insert(0) += value;
    }

    pub fn stats(&self) -> PerformanceStats {
        let inner = self.inner.lock().expect("performance monitor mutex poisoned");

        let timers = inner
            .timers
            .iter()
            .map(|(name, samples)| {
                let stats = if samples.is_empty() {
                    TimerStats::default()
                } else {
                    let total: Duration = samples.iter().sum();
                    TimerStats {
                        count: samples.len(),
                        total,
                        average: total / samples.len() as u32,
                        max: *samples.iter().max().unwrap(),
                        min: *samples.iter().min().unwrap(),
                    }
                };
                (name.clone(), stats)
            })
            .collect();

        let hits = inner.counters.get("cache_hits").copied().unwrap_or(0);
        let misses = inner.counters.get("cache_misses").copied().unwrap_or(0);
        let cache_hit_rate = if hits + misses > 0 {
            hits as f64 / (hits + misses) as f64
        } else {
            0.0
        };

        PerformanceStats {
            session_duration: self.session_start.elapsed(),
            timers,
            counters: inner.counters.clone(),
            cache_hit_rate,
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("performance monitor mutex poisoned");
        inner.timers.clear();
        inner.timer_starts.clear();
        inner.counters.clear();
    }
}

#[cfg(test)]
mod tests;
