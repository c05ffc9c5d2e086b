use super::*;
use std::thread::sleep;

#[test]
fn timer_records_count_total_min_max_average() {
    let monitor = PerformanceMonitor::new();
    for _ in 0..3 {
        monitor.start_timer("fetch");
        sleep(Duration::from_millis(5));
        monitor.stop_timer("fetch");
    }

    let stats = monitor.stats();
    let fetch = stats.timers.get("fetch").expect("timer recorded");
    assert_eq!(fetch.count, 3);
    assert!(fetch.total >= Duration::from_millis(15));
    assert!(fetch.average > Duration::ZERO);
    assert!(fetch.max >= fetch.min);
}

#[test]
fn stopping_an_unstarted_timer_is_a_no_op() {
    let monitor = PerformanceMonitor::new();
    monitor.stop_timer("never_started");
    assert!(monitor.stats().timers.is_empty());
}

#[test]
fn counters_accumulate_across_calls() {
    let monitor = PerformanceMonitor::new();
    monitor.increment_counter("messages_processed", 1);
    monitor.increment_counter("messages_processed", 4);
    assert_eq!(monitor.stats().counters.get("messages_processed"), Some(&5));
}

#[test]
fn cache_hit_rate_is_derived_from_hit_and_miss_counters() {
    let monitor = PerformanceMonitor::new();
    monitor.increment_counter("cache_hits", 3);
    monitor.increment_counter("cache_misses", 1);
    assert_eq!(monitor.stats().cache_hit_rate, 0.75);
}

#[test]
fn cache_hit_rate_is_zero_when_no_lookups_recorded() {
    let monitor = PerformanceMonitor::new();
    assert_eq!(monitor.stats().cache_hit_rate, 0.0);
}

#[test]
fn reset_clears_timers_and_counters() {
    let monitor = PerformanceMonitor::new();
    monitor.start_timer("t");
    monitor.stop_timer("t");
    monitor.increment_counter("c", 1);
    monitor.reset();

    let stats = monitor.stats();
    assert!(stats.timers.is_empty());
    assert!(stats.counters.is_empty());
}
