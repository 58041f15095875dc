//! End-to-end tests that exercise `Container` the way a real caller would:
//! across real threads, with real sleeps, at read/write volumes too large to
//! be useful as unit tests.

use dbd::Container;
use more_asserts::assert_ge;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Row {
    index: i32,
    body: String,
}

impl Default for Row {
    fn default() -> Row {
        Row {
            index: 0,
            body: String::new(),
        }
    }
}

// Scenario B: a reader holding a guard across a concurrent write must keep
// seeing the value it started with, never a mix of old and new fields.
#[test]
fn read_guard_is_stable_across_a_concurrent_write() {
    let container = Arc::new(Container::<Row>::new());
    container.modify(|row| {
        row.index = 1;
        row.body = "a".to_string();
        1
    });

    let g = container.read().unwrap();

    let writer_container = Arc::clone(&container);
    let writer = std::thread::spawn(move || {
        writer_container.modify(|row| {
            row.index = 2;
            row.body = "b".to_string();
            1
        });
    });

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(g.index, 1);
    assert_eq!(g.body, "a");

    drop(g);
    writer.join().unwrap();

    let g = container.read().unwrap();
    assert_eq!(g.index, 2);
    assert_eq!(g.body, "b");
}

// Scenario C: many reader threads hammering `read` while a single writer
// alternates between two distinct values must never observe a torn value,
// and each reader's own stream of observations must never go backwards.
#[test]
fn high_read_contention_never_observes_a_torn_or_regressed_value() {
    const READERS: usize = 64;
    const READS_PER_READER: usize = 10_000;
    const MODIFIES: usize = 100;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Versioned {
        version: u64,
        body: &'static str,
    }
    impl Default for Versioned {
        fn default() -> Versioned {
            Versioned {
                version: 0,
                body: "even",
            }
        }
    }

    let container = Arc::new(Container::<Versioned>::new());
    let next_version = Arc::new(AtomicU64::new(1));

    let reader_handles: Vec<_> = (0..READERS)
        .map(|_| {
            let container = Arc::clone(&container);
            std::thread::spawn(move || {
                let mut last_version = 0;
                for _ in 0..READS_PER_READER {
                    let g = container.read().unwrap();
                    assert!(g.body == "even" || g.body == "odd");
                    assert_ge!(g.version, last_version);
                    last_version = g.version;
                }
            })
        })
        .collect();

    for k in 0..MODIFIES {
        let body = if k % 2 == 0 { "even" } else { "odd" };
        container.modify(|v| {
            v.version = next_version.fetch_add(1, Ordering::Relaxed);
            v.body = body;
            1
        });
    }

    for h in reader_handles {
        h.join().unwrap();
    }
}

// Scenario F: reader threads that only ever do one read and exit must not
// leak their registration, and the container must be safe to tear down with
// no readers outstanding.
#[test]
fn short_lived_reader_threads_leave_no_trace() {
    const THREADS: usize = 1000;

    let container = Arc::new(Container::<i32>::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let container = Arc::clone(&container);
            std::thread::spawn(move || {
                let _ = *container.read().unwrap();
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(container.reader_count(), 0);
    drop(container);
}
