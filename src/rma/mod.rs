//! The remote memory abstraction (RMA).
//!
//! This is the capability the rest of the crate is built against: typed pointers into memory that
//! may be owned by another node, and a small set of one-sided verbs (`read`, `write`,
//! `compare_and_swap`, `atomic_swap`, `allocate`, `deallocate`) for touching it. The fabric that
//! actually moves bytes between nodes — RDMA hardware, a software emulation of it, whatever — is
//! deliberately not this crate's concern; `RemoteMemory` is the seam, and [`local`] is a reference
//! implementation of it used by the tests and by single-process deployments.
//!
//! A `RemotePtr<T>` does not dereference implicitly. Every access goes through the fabric, which
//! decides for itself whether that means a network round trip or a plain local read.

pub mod local;

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// The identity of a node in the cluster.
pub type NodeId = u16;

/// A typed pointer into memory owned by some node in the cluster.
///
/// This is a plain `(owner, address)` pair; it carries no capability to dereference on its own.
/// `address` is opaque to everyone except the `RemoteMemory` implementation that produced it — for
/// [`local::LocalFabric`] it happens to be a real pointer value, but callers must not rely on that.
pub struct RemotePtr<T> {
    owner: NodeId,
    address: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RemotePtr<T> {
    /// The sentinel pointer representing "no object".
    ///
    /// `address == 0` is never produced by a real allocation (see [`local::LocalFabric`]), so it
    /// is safe to reserve as the null value.
    pub const fn null(owner: NodeId) -> Self {
        RemotePtr { owner, address: 0, _marker: PhantomData }
    }

    /// Construct a pointer from its raw parts.
    ///
    /// Only `RemoteMemory` implementations should need this; it exists so that `local` can build
    /// pointers and so that a pointer can be reinterpreted at a different type (see
    /// `plist::ChildPtr`, where the discriminant between `EList` and `PList` is carried by the
    /// bucket's lock word rather than by a tag on the pointer itself).
    pub const fn from_raw_parts(owner: NodeId, address: u64) -> Self {
        RemotePtr { owner, address, _marker: PhantomData }
    }

    /// The id of the node this pointer's memory lives on.
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// The opaque address component.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Is this the null pointer?
    pub fn is_null(&self) -> bool {
        self.address == 0
    }

    /// Does this pointer name memory directly addressable on `self_id` without going through the
    /// fabric?
    pub fn is_local(&self, self_id: NodeId) -> bool {
        self.owner == self_id
    }

    /// Reinterpret this pointer as addressing a `U` at the same location.
    ///
    /// # Safety
    ///
    /// The caller must know, by some out-of-band means, that the memory at this address is
    /// actually a live `U`. In this crate, that means: the bucket lock protecting this address is
    /// held (or observed `P_UNLOCKED`), which is exactly what tells a descent whether a bucket's
    /// child is an `EList` or a `PList`.
    pub unsafe fn cast<U>(self) -> RemotePtr<U> {
        RemotePtr { owner: self.owner, address: self.address, _marker: PhantomData }
    }

    /// Address of the `i`'th element of the contiguous array this pointer is the head of.
    ///
    /// Computing an address is always safe; only dereferencing it (via the fabric) is not.
    pub fn index(self, i: usize) -> Self {
        RemotePtr {
            owner: self.owner,
            address: self.address + (i * std::mem::size_of::<T>()) as u64,
            _marker: PhantomData,
        }
    }

    /// Address of a field `byte_offset` bytes into the pointee, reinterpreted as a `U`.
    ///
    /// This is how a bucket's lock word and child pointer — both plain fields of `plist::Bucket`
    /// — get their own remotely-addressable identity without a separate allocation per field, per
    /// the layout described in the crate's design notes.
    pub fn field<U>(self, byte_offset: usize) -> RemotePtr<U> {
        RemotePtr {
            owner: self.owner,
            address: self.address + byte_offset as u64,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for RemotePtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RemotePtr<T> {}

impl<T> PartialEq for RemotePtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.address == other.address
    }
}

impl<T> Eq for RemotePtr<T> {}

impl<T> Hash for RemotePtr<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.address.hash(state);
    }
}

impl<T> fmt::Debug for RemotePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RemotePtr({}, {:#x})", self.owner, self.address)
    }
}

/// A capability to perform one-sided operations against memory scattered across a cluster.
///
/// Every method takes `&self`: the fabric is shared by every thread using a given pool, and
/// internally serializes (or doesn't need to — a real RDMA NIC doesn't) concurrent verbs.
///
/// Implementors: `T` is always `Copy`, reflecting that the wire-level operations move fixed-size,
/// self-contained values — there is no RMA verb for "patch this one field of a remote struct".
pub trait RemoteMemory {
    /// This fabric handle's own node id.
    fn node_id(&self) -> NodeId;

    /// One-sided read: copy the value at `ptr` into a local, owned value.
    fn read<T: Copy>(&self, ptr: RemotePtr<T>) -> T;

    /// One-sided write: overwrite the value at `ptr` with `value`.
    fn write<T: Copy>(&self, ptr: RemotePtr<T>, value: T);

    /// Compare-and-swap the 64-bit word at `ptr`. Returns the value observed before the attempt;
    /// the swap took effect iff the returned value equals `current`.
    fn compare_and_swap(&self, ptr: RemotePtr<u64>, current: u64, new: u64) -> u64;

    /// Unconditionally swap the 64-bit word at `ptr`, returning the previous value.
    fn atomic_swap(&self, ptr: RemotePtr<u64>, new: u64) -> u64;

    /// Allocate space for a `T`, move `init` into it, and return a pointer to it owned by this
    /// fabric's node.
    fn allocate<T: Send + 'static>(&self, init: T) -> RemotePtr<T>;

    /// Allocate space for `count` contiguous `T`s, element `i` initialized by `init(i)`, returning
    /// a pointer to the first element.
    ///
    /// Used for the root and interior `PList`s: a `PList` is represented as a `RemotePtr<Bucket>`
    /// to the first of its buckets plus a bucket count carried alongside by the caller, mirroring
    /// a flexible array member — there is no separate `PList` header to address.
    fn allocate_array<T: Send + 'static>(&self, count: usize, init: impl FnMut(usize) -> T) -> RemotePtr<T>;

    /// Release the memory at `ptr`.
    ///
    /// The table never calls this during normal operation — interior `PList`s and `EList`s live
    /// for the run's duration — but rehash uses it to release the `EList` it just replaced, and it
    /// is available to callers tearing down a fabric at shutdown.
    fn deallocate<T>(&self, ptr: RemotePtr<T>);
}
