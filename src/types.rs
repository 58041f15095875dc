// Conditional compilation for using loom.
#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
#[cfg(loom)]
pub(crate) use loom::sync::{Arc, Weak};

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
#[cfg(not(loom))]
pub(crate) use std::sync::{Arc, Weak};

/// Wraps the two slot/per-reader storage cells so loom can track accesses to
/// them the same way it tracks the atomics and locks around them. Plain
/// `std::cell::UnsafeCell` would be invisible to loom's causality checker,
/// so a model could pass even with a real unsynchronized-aliasing bug in how
/// `Slots`/`ReaderHandle` use these cells.
#[cfg(not(loom))]
pub(crate) struct UnsafeCell<T>(std::cell::UnsafeCell<T>);
#[cfg(loom)]
pub(crate) struct UnsafeCell<T>(loom::cell::UnsafeCell<T>);

impl<T> UnsafeCell<T> {
    pub fn new(data: T) -> UnsafeCell<T> {
        #[cfg(not(loom))]
        return UnsafeCell(std::cell::UnsafeCell::new(data));
        #[cfg(loom)]
        return UnsafeCell(loom::cell::UnsafeCell::new(data));
    }

    /// SAFETY: caller must guarantee no `&mut` borrow of this cell is
    /// concurrently live for the lifetime of the returned reference.
    pub unsafe fn get(&self) -> &T {
        #[cfg(not(loom))]
        let ptr = self.0.get();
        #[cfg(loom)]
        let ptr = self.0.with(|p| p);
        &*ptr
    }

    /// SAFETY: caller must guarantee exclusive access to this cell for the
    /// lifetime of the returned reference.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &mut T {
        #[cfg(not(loom))]
        let ptr = self.0.get();
        #[cfg(loom)]
        let ptr = self.0.with_mut(|p| p);
        &mut *ptr
    }
}

// Wrap Mutex since loom and parking_lot have different APIs (loom poisons on error).
#[cfg(loom)]
pub(crate) type InnerMutex<T> = loom::sync::Mutex<T>;
#[cfg(loom)]
pub(crate) type MutexGuard<'a, T> = loom::sync::MutexGuard<'a, T>;
#[cfg(not(loom))]
pub(crate) type InnerMutex<T> = parking_lot::Mutex<T>;
#[cfg(not(loom))]
pub(crate) type MutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;

#[derive(Default)]
pub(crate) struct Mutex<T> {
    inner: InnerMutex<T>,
}

impl<T> Mutex<T> {
    pub fn new(t: T) -> Mutex<T> {
        Mutex {
            inner: InnerMutex::new(t),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        #[cfg(loom)]
        return self.inner.lock().unwrap();
        #[cfg(not(loom))]
        return self.inner.lock();
    }
}

/// A reader's private critical-section lock.
///
/// `begin`/`end` bracket a read guard's lifetime; `wait_done` is used by the
/// writer drain to block until whichever reader currently holds the lock
/// releases it, without otherwise disturbing reader state.
#[cfg(not(loom))]
pub(crate) struct ReaderLock {
    raw: parking_lot::RawMutex,
}

#[cfg(not(loom))]
impl ReaderLock {
    pub fn new() -> Self {
        use lock_api::RawMutex as _;
        ReaderLock {
            raw: parking_lot::RawMutex::INIT,
        }
    }

    pub fn begin(&self) {
        use lock_api::RawMutex as _;
        self.raw.lock();
    }

    pub fn end(&self) {
        use lock_api::RawMutex as _;
        // SAFETY: `end` is only ever called by the thread that previously
        // called `begin` on this same handle, which holds the lock.
        unsafe { self.raw.unlock() };
    }

    pub fn wait_done(&self) {
        use lock_api::RawMutex as _;
        self.raw.lock();
        // SAFETY: we just acquired the lock on this line.
        unsafe { self.raw.unlock() };
    }
}

// Loom doesn't model a raw lock/unlock API, so the lock state is held behind
// an `Option<MutexGuard>` that `begin`/`end` install and clear.
#[cfg(loom)]
pub(crate) struct ReaderLock {
    mutex: loom::sync::Mutex<()>,
    guard: std::cell::UnsafeCell<Option<loom::sync::MutexGuard<'static, ()>>>,
}

#[cfg(loom)]
unsafe impl Sync for ReaderLock {}

#[cfg(loom)]
impl ReaderLock {
    pub fn new() -> Self {
        ReaderLock {
            mutex: loom::sync::Mutex::new(()),
            guard: std::cell::UnsafeCell::new(None),
        }
    }

    pub fn begin(&self) {
        let guard = self.mutex.lock().unwrap();
        // SAFETY: `self` is heap-allocated behind an `Arc` and never moves
        // for as long as any guard referencing it is outstanding; the
        // transmuted lifetime never actually outlives `self.mutex`.
        let guard: loom::sync::MutexGuard<'static, ()> = unsafe { std::mem::transmute(guard) };
        unsafe {
            *self.guard.get() = Some(guard);
        }
    }

    pub fn end(&self) {
        unsafe {
            *self.guard.get() = None;
        }
    }

    pub fn wait_done(&self) {
        drop(self.mutex.lock().unwrap());
    }
}
