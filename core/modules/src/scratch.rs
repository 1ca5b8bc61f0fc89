//! Scratch + ArrayBuffer allocators (C2).
//!
//! The C core borrows a scratch arena around path conversions and file
//! reads so that short-lived buffers don't churn the heap allocator; in
//! Rust, owned `String`/`Vec<u8>` buffers already do that job without a
//! bespoke arena, so this module keeps only the part of the original
//! design that still pays for itself: a small pool of reusable `Vec<u8>`
//! buffers for [`crate::platform::PlatformFacade::read_file`], handed out
//! through a guard whose `Drop` impl returns the buffer — the same
//! bracketed acquire/release shape as the original, implemented with RAII
//! instead of a manual counter.

use std::cell::RefCell;

/// A small pool of recycled read buffers, one per [`crate::platform::StdPlatform`].
#[derive(Debug, Default)]
pub struct ReadBufferPool {
    free: RefCell<Vec<Vec<u8>>>,
}

impl ReadBufferPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrows a buffer from the pool, allocating a new one if the pool is
    /// empty. Nested acquisition by the same task is safe: each call gets
    /// its own buffer and the pool itself never hands out the same buffer
    /// twice before it's returned.
    #[must_use]
    pub fn acquire(&self) -> ScratchGuard<'_> {
        let buf = self.free.borrow_mut().pop().unwrap_or_default();
        ScratchGuard {
            pool: self,
            buf: Some(buf),
        }
    }

    /// How many recycled buffers are currently sitting idle in the pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.free.borrow().len()
    }
}

/// A borrowed scratch buffer. Returned to the pool on drop.
#[derive(Debug)]
pub struct ScratchGuard<'a> {
    pool: &'a ReadBufferPool,
    buf: Option<Vec<u8>>,
}

impl ScratchGuard<'_> {
    /// Mutable access to the underlying buffer.
    pub fn as_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("buffer taken before drop")
    }

    /// Hands the backing memory to the caller without returning it to the
    /// pool: the buffer is the caller's to keep, move, or drop. This crate's
    /// own callers (`StdPlatform::read_file`) use it to produce the plain
    /// `Vec<u8>`/`String` a resolved `"snapshot"`/text format is read into;
    /// snapshot *execution* is out of scope for this subsystem (spec §1), so
    /// no call site here wraps the result in a `boa_engine` `ArrayBuffer` —
    /// an embedder building that path on top of this crate would do so from
    /// the `Vec<u8>` this returns.
    #[must_use]
    pub fn into_owned(mut self) -> Vec<u8> {
        self.buf.take().expect("buffer taken before drop")
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut buf) = self.buf.take() {
            buf.clear();
            self.pool.free.borrow_mut().push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_acquire_returns_distinct_buffers() {
        let pool = ReadBufferPool::new();
        let mut outer = pool.acquire();
        let mut inner = pool.acquire();
        outer.as_mut().extend_from_slice(b"outer");
        inner.as_mut().extend_from_slice(b"inner");
        assert_eq!(outer.as_mut().as_slice(), b"outer");
        assert_eq!(inner.as_mut().as_slice(), b"inner");
    }

    #[test]
    fn buffer_is_recycled_after_drop() {
        let pool = ReadBufferPool::new();
        {
            let mut guard = pool.acquire();
            guard.as_mut().extend_from_slice(b"hello");
        }
        let guard = pool.acquire();
        assert_eq!(pool.free.borrow().len(), 0);
        drop(guard);
        assert_eq!(pool.free.borrow().len(), 1);
    }

    #[test]
    fn into_owned_does_not_return_to_pool() {
        let pool = ReadBufferPool::new();
        let mut guard = pool.acquire();
        guard.as_mut().extend_from_slice(b"snapshot bytes");
        let bytes = guard.into_owned();
        assert_eq!(bytes, b"snapshot bytes");
        assert_eq!(pool.free.borrow().len(), 0);
    }
}
