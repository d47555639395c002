//! Load helpers for sessions.
//!
//! These drive a [`Session`] from one or many threads and count outcomes.

use crate::fixtures::User;
use omnidm_core::query::{eq, Query};
use omnidm_core::Session;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of distinct primary keys.
    pub entity_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 2_000,
            threads: 4,
            entity_count: 200,
        }
    }
}

fn user(i: usize) -> User {
    User::new(i as i64, format!("user{i}"), (i % 90) as i64, i % 2 == 0)
}

#[derive(Default)]
struct Tally {
    successful: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn record<T, E>(&self, result: Result<T, E>) {
        match result {
            Ok(_) => self.successful.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn finish(self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.into_inner(),
            self.failed.into_inner(),
            start.elapsed(),
        )
    }
}

fn run_threads(config: &StressConfig, op: impl Fn(usize) -> bool + Sync) -> StressTestResult {
    let tally = Tally::default();
    let ops_per_thread = config.operations / config.threads.max(1);
    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..config.threads {
            let tally = &tally;
            let op = &op;
            scope.spawn(move || {
                for i in 0..ops_per_thread {
                    let ok = op(t * ops_per_thread + i);
                    tally.record(if ok { Ok(()) } else { Err(()) });
                }
            });
        }
    });

    tally.finish(start)
}

/// Saves `config.operations` users one after another, cycling through
/// `config.entity_count` keys.
pub fn stress_sequential_saves(session: &Session<User>, config: &StressConfig) -> StressTestResult {
    let tally = Tally::default();
    let start = Instant::now();
    for i in 0..config.operations {
        tally.record(session.save(user(i % config.entity_count)));
    }
    tally.finish(start)
}

/// Saves from several threads at once. Threads overlap on keys, so
/// concurrent saves of the same key race.
pub fn stress_concurrent_saves(session: &Session<User>, config: &StressConfig) -> StressTestResult {
    run_threads(config, |i| session.save(user(i % config.entity_count)).is_ok())
}

/// Reads by key from several threads at once after seeding every key.
pub fn stress_concurrent_reads(session: &Session<User>, config: &StressConfig) -> StressTestResult {
    let seed: Vec<User> = (0..config.entity_count).map(user).collect();
    let _ = session.delete(Query::all());
    let _ = session.insert_many(&seed);
    run_threads(config, |i| {
        matches!(session.find_by_id((i % config.entity_count) as i64), Ok(Some(_)))
    })
}

/// Interleaves saves, queries and deletes from several threads.
pub fn stress_mixed_operations(session: &Session<User>, config: &StressConfig) -> StressTestResult {
    run_threads(config, |i| {
        let key = i % config.entity_count;
        match i % 3 {
            0 => session.save(user(key)).is_ok(),
            1 => session
                .find(eq("active", key % 2 == 0))
                .map(|cursor| cursor.take(10).all(|r| r.is_ok()))
                .unwrap_or(false),
            _ => session.delete_by_id(key as i64).is_ok(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{TestRegistry, BACKENDS, DOCUMENT};

    fn small() -> StressConfig {
        StressConfig {
            operations: 400,
            threads: 4,
            entity_count: 50,
        }
    }

    #[test]
    fn test_sequential_saves() {
        for backend in BACKENDS {
            let registry = TestRegistry::memory();
            let users = registry.session::<User>(backend);
            let result = stress_sequential_saves(&users, &small());
            assert_eq!(result.failed_ops, 0);
            assert_eq!(result.successful_ops, 400);
            assert_eq!(users.count(Query::all()).unwrap(), 50);
        }
    }

    #[test]
    fn test_concurrent_saves_never_duplicate() {
        let registry = TestRegistry::file(4);
        for backend in BACKENDS {
            let users = registry.session::<User>(backend);
            let result = stress_concurrent_saves(&users, &small());
            assert_eq!(result.failed_ops, 0, "{backend}");
            assert_eq!(users.count(Query::all()).unwrap(), 50, "{backend}");
        }
    }

    #[test]
    fn test_concurrent_reads() {
        let registry = TestRegistry::file(4);
        for backend in BACKENDS {
            let users = registry.session::<User>(backend);
            let result = stress_concurrent_reads(&users, &small());
            assert_eq!(result.failed_ops, 0, "{backend}");
        }
    }

    #[test]
    fn test_mixed_operations() {
        let registry = TestRegistry::memory();
        let users = registry.session::<User>(DOCUMENT);
        let result = stress_mixed_operations(&users, &small());
        assert_eq!(result.failed_ops, 0);
    }
}
