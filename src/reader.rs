use crate::error::ReadError;
use crate::types::*;
use slab::Slab;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// The registry of a container's reader records, keyed by `slab` index.
///
/// Entries are `Weak` — the registry never keeps a reader's record alive on
/// its own, it only needs to be able to find and lock it during a writer
/// drain. The sole strong owner of a `ReaderHandle` is the thread-local
/// cache of the thread that created it (see [`cache`]).
pub(crate) type Registry<U> = Arc<Mutex<Slab<Weak<ReaderHandle<U>>>>>;

/// One reader's registration record: a private critical-section lock plus
/// the reader's own scratch value `U`.
///
/// Created lazily the first time a thread calls [`crate::Container::read`],
/// and kept alive by that thread's thread-local cache until the thread
/// exits (or the container is dropped, whichever comes first).
pub(crate) struct ReaderHandle<U> {
    lock: ReaderLock,
    user: UnsafeCell<U>,
    registry: Weak<Mutex<Slab<Weak<ReaderHandle<U>>>>>,
    key: usize,
}

// SAFETY: `user` is only ever accessed through a `ReadGuard` held by the
// thread that owns this handle; a writer's drain only touches `lock`, never
// `user`. `Sync` needs an explicit impl because of the `UnsafeCell`.
unsafe impl<U: Send> Sync for ReaderHandle<U> {}

impl<U> ReaderHandle<U> {
    fn new(registry: &Registry<U>, key: usize, user: U) -> ReaderHandle<U> {
        ReaderHandle {
            lock: ReaderLock::new(),
            user: UnsafeCell::new(user),
            registry: Arc::downgrade(registry),
            key,
        }
    }

    pub fn begin_read(&self) {
        self.lock.begin();
    }

    pub fn end_read(&self) {
        self.lock.end();
    }

    /// Used by the writer drain: blocks until whichever reader currently
    /// holds this handle's lock releases it, then immediately lets go.
    pub fn wait_read_done(&self) {
        self.lock.wait_done();
    }

    /// SAFETY: the caller must be the single thread that owns this handle
    /// (i.e. reached it through its own thread-local cache entry), and must
    /// not alias this with a concurrent `&mut` borrow from the same thread.
    pub unsafe fn user(&self) -> &U {
        self.user.get()
    }

    /// SAFETY: see [`ReaderHandle::user`].
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn user_mut(&self) -> &mut U {
        self.user.get_mut()
    }
}

impl<U> Drop for ReaderHandle<U> {
    /// Removes this handle's registration from the owning container's
    /// registry, unless the container has already been torn down (in which
    /// case `registry` fails to upgrade and there's nothing to remove).
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(self.key);
        }
    }
}

impl<U: fmt::Debug> fmt::Debug for ReaderHandle<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderHandle").field("key", &self.key).finish()
    }
}

/// Per-(thread, container) cache of reader registrations, so a thread only
/// registers once with a given container no matter how many times it calls
/// `read`. `T` never needs to appear here since only the per-reader scratch
/// type varies what's stored.
thread_local! {
    // Keyed by container id rather than typed per-container, since a
    // thread-local can't be generic over the `U` of whichever containers a
    // given thread happens to read from. Each entry's `Box<dyn Any>` is
    // always a `Arc<ReaderHandle<U>>` for the `U` of the container that
    // owns that id, so the `downcast_ref` below never misses.
    static CACHE: RefCell<HashMap<u64, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Resolves the calling thread's reader handle for the container identified
/// by `container_id`, creating and registering one if this is the thread's
/// first `read` on that container.
pub(crate) fn get_or_register<U>(
    container_id: u64,
    registry: &Registry<U>,
) -> Result<Arc<ReaderHandle<U>>, ReadError>
where
    U: Default + 'static,
{
    CACHE
        .try_with(|cache| {
            let mut cache = cache.borrow_mut();
            if let Some(existing) = cache.get(&container_id) {
                let handle = existing
                    .downcast_ref::<Arc<ReaderHandle<U>>>()
                    .expect("container id reused with a different per-reader type");
                return Arc::clone(handle);
            }

            let mut slab = registry.lock();
            let entry = slab.vacant_entry();
            let key = entry.key();
            let handle = Arc::new(ReaderHandle::new(registry, key, U::default()));
            entry.insert(Arc::downgrade(&handle));
            drop(slab);

            cache.insert(container_id, Box::new(Arc::clone(&handle)));
            handle
        })
        .map_err(|_| ReadError::ThreadLocalUnavailable)
}

/// Scoped handle through which a reader observes the foreground slot.
///
/// Obtaining one never blocks on other readers: each reader has its own
/// private lock, only ever contended by the writer for the instant it takes
/// to drain that one reader during a publish.
pub struct ReadGuard<'r, T, U = ()> {
    slot: &'r T,
    handle: Arc<ReaderHandle<U>>,
}

impl<'r, T, U> ReadGuard<'r, T, U> {
    /// Builds a guard over `slot` for a reader that has *already* called
    /// `handle.begin_read()`. The lock must be taken before `slot` is chosen
    /// (see `Container::read`), not here, so that a concurrent drain can
    /// never miss this reader between its index load and its lock.
    pub(crate) fn new_locked(slot: &'r T, handle: Arc<ReaderHandle<U>>) -> ReadGuard<'r, T, U> {
        ReadGuard { slot, handle }
    }

    /// Read-only access to this thread's per-reader scratch value.
    pub fn tls(&self) -> &U {
        // SAFETY: this guard, and therefore its thread, exclusively owns
        // `handle` for the guard's lifetime (reads are not reentrant, see
        // crate docs).
        unsafe { self.handle.user() }
    }

    /// Mutable access to this thread's per-reader scratch value. Not part of
    /// the DBD publication protocol: the application owns its semantics.
    pub fn tls_mut(&mut self) -> &mut U {
        // SAFETY: see `tls`.
        unsafe { self.handle.user_mut() }
    }
}

impl<'r, T, U> Drop for ReadGuard<'r, T, U> {
    fn drop(&mut self) {
        self.handle.end_read();
    }
}

impl<'r, T, U> std::ops::Deref for ReadGuard<'r, T, U> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        self.slot
    }
}

impl<'r, T: fmt::Debug, U> fmt::Debug for ReadGuard<'r, T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadGuard").field("slot", &self.slot).finish()
    }
}
