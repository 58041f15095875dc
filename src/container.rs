use crate::error::ReadError;
use crate::reader::{self, ReadGuard, Registry};
use crate::slots::Slots;
use crate::types::*;
use slab::Slab;
use std::fmt;

/// Assigns every `Container` a process-wide unique id, used to key each
/// thread's lazily-created reader registration (see `reader::get_or_register`).
/// Not a security boundary — just enough to avoid a stale cache entry from
/// one `Container` being mistaken for another.
///
/// This is plumbing, not part of the modeled protocol, so it deliberately
/// uses `std`'s atomic rather than `crate::types`'s loom-aliased one:
/// `loom::sync::atomic::AtomicU64::new` is not a `const fn`, so a `static`
/// initializer built from the aliased type fails to compile under
/// `--cfg loom`.
static NEXT_CONTAINER_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

fn next_container_id() -> u64 {
    NEXT_CONTAINER_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
}

/// A container holding one logical value of type `T`, readable by any
/// number of threads without contention and mutable by one writer at a time.
///
/// Readers and the writer never block each other for longer than the instant
/// it takes the writer's drain to lock and unlock a single reader's private
/// lock (see [`Container::modify`]). This makes `Container` well suited to
/// configuration-like state — routing tables, backend lists, feature flags —
/// that is read far more often than it is written.
///
/// `U` is an optional, independent per-reader scratch value (default `()`)
/// that lives alongside each thread's reader registration; it is not part of
/// the publication protocol and its semantics are entirely up to the
/// application (see [`ReadGuard::tls`]).
///
/// A `Container` is not `Clone`; share it the way you'd share a
/// `std::sync::RwLock`, typically behind an `Arc`.
pub struct Container<T, U = ()> {
    id: u64,
    slots: Slots<T>,
    readers: Registry<U>,
    writer_lock: Mutex<()>,
}

// SAFETY: `Slots<T>` is `Sync` for `T: Send` (see slots.rs); the registry and
// writer lock are already `Sync` given `ReaderHandle<U>: Send + Sync`, which
// holds for `U: Send` (see reader.rs).
unsafe impl<T: Send, U: Send> Sync for Container<T, U> {}

impl<T, U> Container<T, U> {
    /// Builds a container from two values that must already be equal. Use
    /// this when `T`'s default isn't a meaningful starting state but
    /// constructing two equivalent values is cheap (e.g. `T: Clone`, see
    /// [`Container::from_value`]).
    pub fn from_identical(foreground: T, background: T) -> Container<T, U> {
        Container {
            id: next_container_id(),
            slots: Slots::new(foreground, background),
            readers: Arc::new(Mutex::new(Slab::with_capacity(64))),
            writer_lock: Mutex::new(()),
        }
    }

    /// Number of currently registered reader threads. Exposed for tests and
    /// diagnostics; not part of the publication protocol.
    pub fn reader_count(&self) -> usize {
        self.readers.lock().len()
    }

    /// Obtains a read guard over the foreground slot.
    ///
    /// Wait-free with respect to other readers: this only ever contends with
    /// the writer, and only for the instant the writer's drain holds this
    /// thread's reader lock (see [`Container::modify`]). Registration is
    /// lazy: the first call from a given thread creates and registers that
    /// thread's reader record; later calls from the same thread reuse it.
    ///
    /// Calling `read` again from a thread that already holds a `ReadGuard`
    /// from this container is not reentrant and its behavior is unspecified.
    pub fn read(&self) -> Result<ReadGuard<'_, T, U>, ReadError>
    where
        U: Default + 'static,
    {
        let handle = reader::get_or_register(self.id, &self.readers)?;
        // Lock before loading `fg_index`: a drain only waits out readers it
        // can see holding their lock. Loading the index first would leave a
        // window, between the load and the lock, where this reader is
        // invisible to a concurrent drain yet has already committed to the
        // slot it's about to dereference.
        handle.begin_read();
        let fg = self.slots.foreground_index(Ordering::Acquire);
        // SAFETY: a reader never observes the background slot: `fg` was just
        // loaded with `Acquire`, which pairs with the writer's `Release`
        // publish, so any mutation the writer made before publishing `fg` is
        // visible here, and the writer won't mutate slot `fg` again until
        // this guard's lock has been observed free during a drain.
        let slot = unsafe { self.slots.slot(fg) };
        Ok(ReadGuard::new_locked(slot, handle))
    }

    /// Applies `f` to the container's value, returning `f`'s result.
    ///
    /// `f` is invoked up to twice: once on the background slot (whose result
    /// is published immediately), and again on the former foreground slot
    /// once every reader that might have been mid-read at publish time has
    /// finished, so both slots converge. If the first application returns
    /// `0`, `f` is not invoked again and no publication happens — `0` means
    /// "no effective change".
    ///
    /// `f` must be deterministic on equivalent inputs: a writer-thread-local
    /// counter, RNG, clock, or I/O call used inside `f` will silently
    /// diverge the two slots. If the two applications disagree, a
    /// diagnostic is logged (see the crate's error-handling notes) but the
    /// second result is still returned and still published.
    ///
    /// At most one writer is ever inside `modify` (or
    /// [`Container::modify_with_foreground`]) at a time; concurrent callers
    /// serialize on an internal lock. `f` must not call `read` or `modify`
    /// on this same container — doing so from the writer thread will
    /// deadlock.
    pub fn modify(&self, f: impl Fn(&mut T) -> usize) -> usize {
        let _writer_guard = self.writer_lock.lock();

        let fg = self.slots.foreground_index(Ordering::Relaxed);
        let bg = 1 - fg;

        // SAFETY: the background slot is exclusively ours: we hold
        // `writer_lock`, so no other writer can be mutating it, and readers
        // only ever touch the slot named by `fg_index`, which is still `fg`.
        let r1 = f(unsafe { self.slots.slot_mut(bg) });
        if r1 == 0 {
            return 0;
        }

        self.slots.publish(bg, Ordering::Release);
        self.drain_readers();

        // The slot that was foreground before the flip is now unreachable by
        // readers and safe to mutate again so it converges with `bg`.
        // SAFETY: same reasoning as above, now for slot `fg`.
        let r2 = f(unsafe { self.slots.slot_mut(fg) });
        warn_on_divergence(r1, r2);
        r2
    }

    /// Like [`Container::modify`], but `f` also receives a read-only
    /// reference to the slot it is not writing, so a writer can derive the
    /// new value from the old one without snapshotting it separately.
    ///
    /// In the first application, the "other" reference is the current
    /// foreground (about to be superseded). In the second, it's the value
    /// `f` itself just published, since the slot being rewritten is now the
    /// old foreground. Note this does not by itself guarantee the two slots
    /// converge — that still requires `f` to be stable under repeated
    /// application to equivalent inputs.
    pub fn modify_with_foreground(&self, f: impl Fn(&mut T, &T) -> usize) -> usize {
        let _writer_guard = self.writer_lock.lock();

        let fg = self.slots.foreground_index(Ordering::Relaxed);
        let bg = 1 - fg;

        // SAFETY: see `modify`; `bg != fg` so the mutable and shared
        // references never alias.
        let r1 = {
            let (being_written, other) = unsafe { self.slots.slot_mut_and_other(bg) };
            f(being_written, other)
        };
        if r1 == 0 {
            return 0;
        }

        self.slots.publish(bg, Ordering::Release);
        self.drain_readers();

        // SAFETY: see `modify`.
        let r2 = {
            let (being_written, other) = unsafe { self.slots.slot_mut_and_other(fg) };
            f(being_written, other)
        };
        warn_on_divergence(r1, r2);
        r2
    }

    /// Takes `registry_lock` and, for each registered reader, acquires and
    /// immediately releases its private lock. A reader that was mid-read at
    /// publish time is still holding its lock with the (now stale) old
    /// index, so this blocks until it finishes; a reader that starts after
    /// publish already observes the new index and isn't in the registry's
    /// way here at all.
    fn drain_readers(&self) {
        let readers = self.readers.lock();
        for (_, weak) in readers.iter() {
            if let Some(handle) = weak.upgrade() {
                handle.wait_read_done();
            }
        }
    }
}

impl<T: Clone, U> Container<T, U> {
    /// Builds a container by cloning `t` into both slots.
    pub fn from_value(t: T) -> Container<T, U> {
        Container::from_identical(t.clone(), t)
    }
}

impl<T: Default, U> Container<T, U> {
    /// Builds a container whose slots are independently default-constructed.
    /// For scalar-like `T` this means a reader calling `read` before any
    /// `modify` observes a defined, zero-like value.
    pub fn new() -> Container<T, U> {
        Container::from_identical(T::default(), T::default())
    }
}

impl<T: Default, U> Default for Container<T, U> {
    fn default() -> Container<T, U> {
        Container::new()
    }
}

fn warn_on_divergence(r1: usize, r2: usize) {
    if r1 != r2 {
        log::warn!(
            "dbd: writer fn returned different results across the two slot applications \
             (first={r1}, second={r2}); fn passed to modify/modify_with_foreground must be \
             deterministic on equivalent inputs"
        );
    }
}

impl<T: fmt::Debug, U> fmt::Debug for Container<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("num_readers", &self.reader_count())
            .field("slots", &self.slots)
            .finish()
    }
}
