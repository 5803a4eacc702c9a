//! Per-thread remote-memory pools.
//!
//! A `Pool` is the handle a single thread uses to talk to the fabric: it owns nothing the fabric
//! doesn't already own, but it is the place that decides, once per access, whether a `RemotePtr`
//! names memory this thread can touch directly or memory that has to go through a one-sided
//! operation — the `read_or_borrow` / `write_back` pair the crate's design notes call for, so the
//! branch lives in one place instead of being repeated at every call site in `iht`.
//!
//! The source this is modeled on spreads a handful of queue-pair pools across however many worker
//! threads a node runs (`min(thread_count, MAX_QP / node_count)`), sharing pools when there are
//! more threads than queue pairs. That distribution is a resource-budget detail of whatever fabric
//! backs `F`, not something the hash table needs to know about — `register_thread` is the hook a
//! fabric with that kind of pooling would use; a single-pool fabric like
//! [`crate::rma::local::LocalFabric`] leaves it a no-op.

use slog::Logger;

use crate::rma::{NodeId, RemoteMemory, RemotePtr};

/// A thread's handle onto the fabric.
pub struct Pool<F> {
    fabric: F,
    log: Logger,
}

impl<F: RemoteMemory> Pool<F> {
    /// Wrap a fabric handle for use by the calling thread, logging nowhere.
    ///
    /// Fine for tests and single-process use; a deployment that wants the table's lifecycle
    /// events (rehashes, bootstrap) should use [`Pool::with_logger`] instead.
    pub fn new(fabric: F) -> Pool<F> {
        Pool { fabric, log: Logger::root(slog::Discard, slog::o!()) }
    }

    /// Wrap a fabric handle, logging through `log`.
    pub fn with_logger(fabric: F, log: Logger) -> Pool<F> {
        Pool { fabric, log }
    }

    /// This pool's owning node.
    pub fn node_id(&self) -> NodeId {
        self.fabric.node_id()
    }

    /// This pool's logger.
    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// Bind this pool to the calling thread.
    ///
    /// A no-op for a fabric with one pool per node; required by fabrics that hand out a limited
    /// number of queue pairs and need to know which thread is using which.
    pub fn register_thread(&self) {}

    /// Read the value at `ptr`, as a shadow copy if `ptr` is not local.
    ///
    /// Whether this dispatches to a network round trip or a plain load is entirely up to `F`; the
    /// point of routing every access through here is that `iht` never needs to ask.
    pub fn read_or_borrow<T: Copy>(&self, ptr: RemotePtr<T>) -> T {
        self.fabric.read(ptr)
    }

    /// Publish a local shadow copy back to `ptr`.
    pub fn write_back<T: Copy>(&self, ptr: RemotePtr<T>, value: T) {
        self.fabric.write(ptr, value);
    }

    /// Compare-and-swap the lock word at `ptr`.
    pub fn compare_and_swap(&self, ptr: RemotePtr<u64>, current: u64, new: u64) -> u64 {
        self.fabric.compare_and_swap(ptr, current, new)
    }

    /// Unconditionally swap the lock word at `ptr`.
    pub fn atomic_swap(&self, ptr: RemotePtr<u64>, new: u64) -> u64 {
        self.fabric.atomic_swap(ptr, new)
    }

    /// Allocate a `T` from this thread's pool, owned by this pool's node.
    pub fn allocate<T: Send + 'static>(&self, init: T) -> RemotePtr<T> {
        self.fabric.allocate(init)
    }

    /// Allocate a contiguous array of `T`s from this thread's pool.
    pub fn allocate_array<T: Send + 'static>(
        &self,
        count: usize,
        init: impl FnMut(usize) -> T,
    ) -> RemotePtr<T> {
        self.fabric.allocate_array(count, init)
    }

    /// Release the memory at `ptr`.
    pub fn deallocate<T>(&self, ptr: RemotePtr<T>) {
        self.fabric.deallocate(ptr);
    }
}
