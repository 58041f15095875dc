//! Doubly buffered data: a concurrency primitive for high-rate concurrent
//! reads against rare writes.
//!
//! A [`Container`] holds one logical value of a user-supplied type `T` in
//! two slots, one *foreground* (what readers see) and one *background*
//! (what the writer is currently mutating). Reading never contends with
//! other readers: each reader thread gets its own private lock, taken only
//! for the duration of a [`ReadGuard`]. Writing pays the cost of mutating
//! the value twice and waiting out any reader that might have started
//! before the new value was published, so that both slots stay converged.
//!
//! This is named and modeled after the active/standby pattern: the
//! *active* (foreground) slot is never write-locked, so readers never face
//! contention; the *standby* (background) slot is what a writer mutates,
//! and readers move onto it only once the writer has finished and
//! published.
//!
//! Costs relative to a plain `RwLock<T>`:
//! 1. Memory — two copies of `T` are held at all times.
//! 2. Writer CPU — a `modify` call applies its function to `T` twice.
//!
//! Good fits: routing tables, backend lists, load-balancer state, feature
//! flags — anything read far more often than it's written, where readers
//! must never observe a partially mutated value.
//!
//! Not provided: transactions across multiple containers, bounded writer
//! latency (a writer waits for every registered reader's current critical
//! section), fairness between concurrent writers, or history beyond the
//! current and immediately preceding value.
//!
//! # Example
//!
//! ```
//! use dbd::Container;
//!
//! let container = Container::<i32>::new();
//! container.modify(|v| {
//!     *v += 1;
//!     1 // non-zero: a change was made
//! });
//! assert_eq!(*container.read().unwrap(), 1);
//! ```
//!
//! # Per-reader scratch data
//!
//! The optional second type parameter `U` (default `()`) is an independent
//! value that lives alongside each reader thread's registration, exposed
//! through [`ReadGuard::tls`]/[`ReadGuard::tls_mut`]. It isn't part of the
//! publication protocol; the application owns its semantics.
//!
//! ```
//! use dbd::Container;
//!
//! let container = Container::<i32, u32>::new();
//! {
//!     let mut g = container.read().unwrap();
//!     *g.tls_mut() += 1;
//! }
//! ```

mod container;
mod error;
mod reader;
mod slots;
mod types;

pub use container::Container;
pub use error::ReadError;
pub use reader::ReadGuard;
