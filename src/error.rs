use std::fmt;

/// Failure modes for [`Container::read`](crate::Container::read).
///
/// `Modify`/`ModifyWithForeground` have no error type: once a writer holds
/// `writer_lock` the rest of the protocol cannot fail short of the global
/// allocator aborting the process, which Rust does not surface as a
/// recoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReadError {
    /// The calling thread's reader registration lives in thread-local
    /// storage that is no longer accessible: either it has already been torn
    /// down (this thread is exiting and another destructor called `read`
    /// after ours ran) or it is being recursively initialized.
    ThreadLocalUnavailable,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::ThreadLocalUnavailable => {
                write!(f, "thread-local reader registration is unavailable")
            }
        }
    }
}

impl std::error::Error for ReadError {}
