#![feature(test)]

// 'test' is a special crate that requires introduction this way even though we
// are using rust 2018.
// https://doc.rust-lang.org/nightly/edition-guide/rust-2018/module-system/path-clarity.html
extern crate test;
use dbd::Container;
use more_asserts::*;
use std::sync::Arc;

// Test the speed of a modify call when it never has to wait on readers to
// release the foreground slot.
#[bench]
fn modify_without_contention(b: &mut test::bench::Bencher) {
    let container = Container::<i32>::from_value(1);
    b.iter(|| {
        container.modify(|v| {
            *v += 1;
            1
        });
    });
}

// Test the speed of a modify call when there are many readers taking brief
// read guards.
#[bench]
fn modify_with_contention(b: &mut test::bench::Bencher) {
    let container = Arc::new(Container::<i32>::from_value(1));
    let _reader_handles: Vec<_> = (0..4)
        .map(|_| {
            let container = Arc::clone(&container);
            std::thread::spawn(move || {
                // Continually grab read guards. We expect that readers can
                // block the writer, so no point holding the guard for a long
                // time since that would just slow down the benchmark.
                while *container.read().unwrap() != 0 {}
            })
        })
        .collect();

    b.iter(|| {
        container.modify(|v| {
            *v += 1;
            1
        });
    });
}

// Test the speed of acquiring a read guard when there is no writer activity
// and no other readers.
#[bench]
fn read_guard_no_contention(b: &mut test::bench::Bencher) {
    let container = Container::<i32>::from_value(1);

    b.iter(|| {
        let g = container.read().unwrap();
        assert_eq!(*g, 1);
    });
}

// Test the speed of acquiring a read guard when there is no writer activity,
// but many other reader threads.
#[bench]
fn read_guard_read_contention(b: &mut test::bench::Bencher) {
    let container = Arc::new(Container::<i32>::from_value(1));
    let _reader_handles: Vec<_> = (0..20)
        .map(|_| {
            let container = Arc::clone(&container);
            std::thread::spawn(move || {
                while *container.read().unwrap() != 0 {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
            })
        })
        .collect();

    b.iter(|| {
        let g = container.read().unwrap();
        assert_eq!(*g, 1);
    });
}

// Test the speed of acquiring a read guard while a writer thread is
// continually publishing new values.
#[bench]
fn read_guard_write_contention(b: &mut test::bench::Bencher) {
    let container = Arc::new(Container::<i32>::from_value(1));
    let writer_container = Arc::clone(&container);
    let _writer_handle = std::thread::spawn(move || loop {
        writer_container.modify(|v| {
            *v += 1;
            1
        });
    });

    b.iter(|| {
        let g = container.read().unwrap();
        assert_gt!(*g, 0);
    });
}

// Test the speed of acquiring a read guard with both a writer thread and many
// other reader threads active at once.
#[bench]
fn read_guard_readwrite_contention(b: &mut test::bench::Bencher) {
    let container = Arc::new(Container::<i32>::from_value(1));
    let _reader_handles: Vec<_> = (0..20)
        .map(|_| {
            let container = Arc::clone(&container);
            std::thread::spawn(move || {
                while *container.read().unwrap() != 0 {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
            })
        })
        .collect();
    let writer_container = Arc::clone(&container);
    let _writer_handle = std::thread::spawn(move || loop {
        writer_container.modify(|v| {
            *v += 1;
            1
        });
    });

    b.iter(|| {
        let g = container.read().unwrap();
        assert_gt!(*g, 0);
    });
}
