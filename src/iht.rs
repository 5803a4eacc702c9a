//! The interlocked hash table core: the descent loop, the three operation bodies, and rehash.
//!
//! Everything here is written against `pool::Pool`, never directly against a fabric, and treats
//! every `RemotePtr` the same way regardless of whether it happens to be local — the fabric is
//! what decides that, not this module (see the crate's design notes on remote vs local
//! addressing).

use std::hash::Hash;
use std::iter;

use crate::elist::{self, EList, ELIST_CAPACITY};
use crate::hash::level_hash;
use crate::plist::{self, size_at_depth, Bucket, E_LOCKED, E_UNLOCKED, P_UNLOCKED};
use crate::pool::Pool;
use crate::rma::{RemoteMemory, RemotePtr};

/// The outcome of `Iht::contains`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainsOutcome<V> {
    Found(V),
    NotFound,
}

/// The outcome of `Iht::insert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome<V> {
    Inserted,
    AlreadyPresent(V),
}

/// The outcome of `Iht::remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome<V> {
    Removed(V),
    NotFound,
}

/// A bucket whose lock this thread holds in `E_LOCKED`.
///
/// Only ever exists between a successful acquisition and the matching release or demotion; the
/// descent loop hands one to exactly one of the three operation bodies per call.
struct Acquired<K, V> {
    lock_ptr: RemotePtr<u64>,
    child_ptr: RemotePtr<RemotePtr<()>>,
    depth: u64,
    size: usize,
    _marker: std::marker::PhantomData<fn() -> (K, V)>,
}

/// A handle onto one logical table, rooted at `root`.
///
/// Cheap to construct per-thread: it's a `Pool` (itself a thin fabric wrapper) plus the root
/// pointer every thread in the cluster agreed on during bootstrap.
pub struct Iht<K, V, F> {
    pool: Pool<F>,
    root: RemotePtr<Bucket<K, V>>,
}

impl<K, V, F> Iht<K, V, F>
where
    K: Copy + Eq + Hash + Default + Send + 'static,
    V: Copy + Default + Send + 'static,
    F: RemoteMemory,
{
    /// Allocate and initialize a fresh root `PList`. Called once, by the bootstrap host.
    pub fn allocate_root(pool: &Pool<F>) -> RemotePtr<Bucket<K, V>> {
        pool.allocate_array(size_at_depth(1), |_| Bucket::empty())
    }

    /// Build a handle rooted at a pointer obtained locally (`allocate_root`) or from the
    /// bootstrap control channel (`crate::bootstrap`).
    pub fn new(pool: Pool<F>, root: RemotePtr<Bucket<K, V>>) -> Iht<K, V, F> {
        Iht { pool, root }
    }

    /// The root pointer this handle was built from.
    pub fn root(&self) -> RemotePtr<Bucket<K, V>> {
        self.root
    }

    pub fn contains(&self, key: &K) -> ContainsOutcome<V> {
        let acquired = self.acquire(key);
        let child = self.pool.read_or_borrow(acquired.child_ptr);
        let result = if child.is_null() {
            ContainsOutcome::NotFound
        } else {
            // SAFETY: `acquired` holds the bucket's lock in `E_LOCKED`, so a non-null child is an
            // `EList` (invariant 3).
            let elist_ptr: RemotePtr<EList<K, V>> = unsafe { child.cast() };
            let shadow: EList<K, V> = self.pool.read_or_borrow(elist_ptr);
            match shadow.find(key) {
                Some(v) => ContainsOutcome::Found(v),
                None => ContainsOutcome::NotFound,
            }
        };
        self.release(&acquired);
        result
    }

    pub fn insert(&self, key: K, val: V) -> InsertOutcome<V> {
        let acquired = self.acquire(&key);
        let child = self.pool.read_or_borrow(acquired.child_ptr);

        if child.is_null() {
            let mut shadow = EList::<K, V>::empty();
            shadow.insert_new_unchecked(key, val);
            let elist_ptr = self.pool.allocate(shadow);
            self.pool
                .write_back(acquired.child_ptr, unsafe { elist_ptr.cast() });
            self.release(&acquired);
            return InsertOutcome::Inserted;
        }

        // SAFETY: see `contains`.
        let elist_ptr: RemotePtr<EList<K, V>> = unsafe { child.cast() };
        let mut shadow: EList<K, V> = self.pool.read_or_borrow(elist_ptr);
        match shadow.insert(key, val) {
            elist::Insert::AlreadyPresent(old) => {
                self.release(&acquired);
                InsertOutcome::AlreadyPresent(old)
            }
            elist::Insert::Inserted => {
                self.pool.write_back(elist_ptr, shadow);
                self.release(&acquired);
                InsertOutcome::Inserted
            }
            elist::Insert::Full => {
                self.rehash(&acquired, elist_ptr, shadow, key, val);
                InsertOutcome::Inserted
            }
        }
    }

    pub fn remove(&self, key: &K) -> RemoveOutcome<V> {
        let acquired = self.acquire(key);
        let child = self.pool.read_or_borrow(acquired.child_ptr);
        let result = if child.is_null() {
            RemoveOutcome::NotFound
        } else {
            // SAFETY: see `contains`.
            let elist_ptr: RemotePtr<EList<K, V>> = unsafe { child.cast() };
            let mut shadow: EList<K, V> = self.pool.read_or_borrow(elist_ptr);
            match shadow.remove(key) {
                Some(v) => {
                    self.pool.write_back(elist_ptr, shadow);
                    RemoveOutcome::Removed(v)
                }
                None => RemoveOutcome::NotFound,
            }
        };
        self.release(&acquired);
        result
    }

    /// Pre-insert `n` keys drawn from `[key_lb, key_ub)` via `entry_fn(i) -> (key, value)`, to
    /// seed the table before a timed measurement window.
    pub fn populate(&self, n: u64, key_lb: u64, key_ub: u64, entry_fn: impl Fn(u64) -> (K, V)) {
        let span = (key_ub - key_lb).max(1);
        for i in 0..n {
            let (k, v) = entry_fn(key_lb + i % span);
            self.insert(k, v);
        }
    }

    /// Descend from the root, locking and retrying or descending, until a bucket lock is
    /// acquired in `E_LOCKED`.
    fn acquire(&self, key: &K) -> Acquired<K, V> {
        let mut base = self.root;
        let mut depth: u64 = 1;
        let mut size = size_at_depth(1);

        loop {
            let index = (level_hash(key, depth) as usize) % size;
            let lock_ptr = plist::lock_ptr(base, index);

            loop {
                let observed = self.pool.read_or_borrow(lock_ptr);
                if observed == P_UNLOCKED {
                    let child_ptr = plist::child_ptr(base, index);
                    let child = self.pool.read_or_borrow(child_ptr);
                    // SAFETY: `observed == P_UNLOCKED` is the invariant-3 witness that `child`
                    // addresses the first bucket of a deeper `PList`, and that state never
                    // reverts (invariant 1), so this cast is sound for as long as the pointer is
                    // used.
                    base = unsafe { child.cast::<Bucket<K, V>>() };
                    depth += 1;
                    size *= 2;
                    break;
                }

                let prev = self.pool.compare_and_swap(lock_ptr, E_UNLOCKED, E_LOCKED);
                if prev == E_UNLOCKED {
                    return Acquired {
                        lock_ptr,
                        child_ptr: plist::child_ptr(base, index),
                        depth,
                        size,
                        _marker: std::marker::PhantomData,
                    };
                }
                // `prev == E_LOCKED`: another thread holds it, retry. `prev == P_UNLOCKED`: a
                // racing demotion landed between our read and this CAS; the next iteration of
                // the inner loop observes it and descends. Either way, retry the same bucket.
            }
        }
    }

    /// Ordinary release: free the bucket, publishing whatever was (or wasn't) written.
    fn release(&self, acquired: &Acquired<K, V>) {
        self.pool.atomic_swap(acquired.lock_ptr, E_UNLOCKED);
    }

    /// Replace a full `EList` with a `PList` of double the bucket count.
    ///
    /// `old_shadow` plus `(new_key, new_val)` is the full set of live pairs under this bucket;
    /// `2 * size ≥ 2 * ELIST_CAPACITY` guarantees every destination bucket has room (open
    /// question 1: the multiplier is 2, matching the PList-size doubling, not 1).
    fn rehash(
        &self,
        acquired: &Acquired<K, V>,
        old_elist_ptr: RemotePtr<EList<K, V>>,
        old_shadow: EList<K, V>,
        new_key: K,
        new_val: V,
    ) {
        let new_size = acquired.size * 2;
        let new_depth = acquired.depth + 1;
        debug_assert!(new_size >= 2 * ELIST_CAPACITY);
        slog::debug!(self.pool.log(), "rehashing full bucket"; "old_depth" => acquired.depth, "new_size" => new_size);

        let new_base: RemotePtr<Bucket<K, V>> = self.pool.allocate_array(new_size, |_| Bucket::empty());

        let mut staged: Vec<Option<EList<K, V>>> = vec![None; new_size];
        let all_pairs = old_shadow
            .live()
            .copied()
            .chain(iter::once(elist::Pair { key: new_key, val: new_val }));
        for pair in all_pairs {
            let b = (level_hash(&pair.key, new_depth) as usize) % new_size;
            let slot = staged[b].get_or_insert_with(EList::empty);
            slot.insert_new_unchecked(pair.key, pair.val);
        }

        for (idx, maybe_elist) in staged.into_iter().enumerate() {
            if let Some(elist) = maybe_elist {
                let elist_ptr = self.pool.allocate(elist);
                self.pool
                    .write_back(plist::child_ptr(new_base, idx), unsafe { elist_ptr.cast() });
            }
        }

        self.pool.deallocate(old_elist_ptr);
        // Publish the new PList before demoting: the write must be visible to every future reader
        // that observes `P_UNLOCKED` before the lock transitions. This is the release fence that
        // makes the demotion safe to observe without re-validating the child pointer.
        self.pool
            .write_back(acquired.child_ptr, unsafe { new_base.cast() });
        self.pool.atomic_swap(acquired.lock_ptr, P_UNLOCKED);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rma::local::LocalFabric;

    fn new_table() -> Iht<u64, u64, LocalFabric> {
        let fabric = LocalFabric::new(0);
        let pool = Pool::new(fabric);
        let root = Iht::<u64, u64, LocalFabric>::allocate_root(&pool);
        Iht::new(pool, root)
    }

    #[test]
    fn empty_table_contains_nothing() {
        let t = new_table();
        assert_eq!(t.contains(&5), ContainsOutcome::NotFound);
        assert_eq!(t.contains(&4), ContainsOutcome::NotFound);
    }

    #[test]
    fn basic_insert_remove_cycle() {
        let t = new_table();
        assert_eq!(t.insert(5, 10), InsertOutcome::Inserted);
        assert_eq!(t.insert(5, 11), InsertOutcome::AlreadyPresent(10));
        assert_eq!(t.contains(&5), ContainsOutcome::Found(10));
        assert_eq!(t.remove(&5), RemoveOutcome::Removed(10));
        assert_eq!(t.contains(&5), ContainsOutcome::NotFound);
        assert_eq!(t.remove(&5), RemoveOutcome::NotFound);
    }

    #[test]
    fn rehash_preserves_every_key_in_the_overflowing_bucket() {
        let t = new_table();
        // Keys that collide at depth 1, bucket 0: since level_hash(k, 1) must map to bucket 0
        // for every one of them, the simplest way to force that deterministically in a test is to
        // drive enough distinct keys into the table that at least one bucket overflows, then
        // check every inserted key is still found afterward - which is exactly the property
        // rehash exists to preserve, regardless of which bucket actually filled first.
        for k in 0u64..(plist::PLIST_SIZE_BASE as u64 * 8) {
            assert_eq!(t.insert(k, k * 10), InsertOutcome::Inserted);
        }
        for k in 0u64..(plist::PLIST_SIZE_BASE as u64 * 8) {
            assert_eq!(t.contains(&k), ContainsOutcome::Found(k * 10));
        }
    }

    #[test]
    fn scale_round_trip() {
        let t = new_table();
        let n = 8 * plist::PLIST_SIZE_BASE as u64 * ELIST_CAPACITY as u64;
        for i in 0..n {
            assert_eq!(t.contains(&i), ContainsOutcome::NotFound);
            assert_eq!(t.insert(i, i), InsertOutcome::Inserted);
            assert_eq!(t.contains(&i), ContainsOutcome::Found(i));
        }
        for i in 0..n {
            assert_eq!(t.contains(&i), ContainsOutcome::Found(i));
        }
        for i in 0..n {
            assert_eq!(t.remove(&i), RemoveOutcome::Removed(i));
            assert_eq!(t.contains(&i), ContainsOutcome::NotFound);
        }
        for i in 0..n {
            assert_eq!(t.contains(&i), ContainsOutcome::NotFound);
        }
    }

    #[test]
    fn populate_seeds_the_requested_range() {
        let t = new_table();
        t.populate(200, 1000, 1200, |k| (k, k));
        for k in 1000..1200 {
            assert_eq!(t.contains(&k), ContainsOutcome::Found(k));
        }
    }

    /// Several threads racing to insert keys that all land in the same depth-1 bucket, so they
    /// genuinely contend for the same bucket lock (and, once one of them fills the `EList`, for
    /// the same rehash) rather than spreading out across independent buckets. Mirrors the
    /// spawn-many-threads-then-join-and-audit shape `chashmap`'s own concurrency tests use.
    #[test]
    fn concurrent_threads_contend_for_the_same_bucket_lock() {
        use std::sync::Arc;
        use std::thread;

        let t = Arc::new(new_table());
        let target_bucket = level_hash(&0u64, 1) as usize % plist::PLIST_SIZE_BASE;
        let colliding: Vec<u64> = (0u64..200_000)
            .filter(|k| level_hash(k, 1) as usize % plist::PLIST_SIZE_BASE == target_bucket)
            .take(64)
            .collect();
        assert_eq!(colliding.len(), 64, "didn't find enough colliding keys to test with");

        let mut joins = Vec::new();
        for chunk in colliding.chunks(8) {
            let t = Arc::clone(&t);
            let chunk = chunk.to_vec();
            joins.push(thread::spawn(move || {
                for k in chunk {
                    assert_eq!(t.insert(k, k * 2), InsertOutcome::Inserted);
                }
            }));
        }
        for j in joins {
            j.join().unwrap();
        }
        for &k in &colliding {
            assert_eq!(t.contains(&k), ContainsOutcome::Found(k * 2));
        }

        // Now race removers against readers over disjoint halves of the same colliding set, so
        // the two groups' bucket-lock acquisitions overlap in wall time instead of running one
        // after the other.
        let (to_remove, to_keep) = colliding.split_at(colliding.len() / 2);
        let to_remove = to_remove.to_vec();
        let to_keep = to_keep.to_vec();

        let remover = {
            let t = Arc::clone(&t);
            thread::spawn(move || {
                for k in to_remove {
                    assert_eq!(t.remove(&k), RemoveOutcome::Removed(k * 2));
                }
            })
        };
        let reader = {
            let t = Arc::clone(&t);
            thread::spawn(move || {
                for _ in 0..50 {
                    for &k in &to_keep {
                        assert_eq!(t.contains(&k), ContainsOutcome::Found(k * 2));
                    }
                }
            })
        };
        remover.join().unwrap();
        reader.join().unwrap();

        for &k in &colliding[colliding.len() / 2..] {
            assert_eq!(t.contains(&k), ContainsOutcome::Found(k * 2));
        }
        for &k in &colliding[..colliding.len() / 2] {
            assert_eq!(t.contains(&k), ContainsOutcome::NotFound);
        }
    }

    /// Wires a real `slog_term` drain through `Pool::with_logger` instead of the silent default,
    /// so the `rehash` debug log point actually gets formatted by a real drain rather than only
    /// ever being exercised against `slog::Discard`.
    #[test]
    fn rehash_logs_through_a_real_drain() {
        use slog::Drain;

        let decorator = slog_term::PlainSyncDecorator::new(std::io::sink());
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let log = slog::Logger::root(drain, slog::o!("component" => "iht"));

        let pool = Pool::with_logger(LocalFabric::new(0), log);
        let root = Iht::<u64, u64, LocalFabric>::allocate_root(&pool);
        let t = Iht::new(pool, root);

        for k in 0u64..(plist::PLIST_SIZE_BASE as u64 * ELIST_CAPACITY as u64) {
            assert_eq!(t.insert(k, k), InsertOutcome::Inserted);
        }
        for k in 0u64..(plist::PLIST_SIZE_BASE as u64 * ELIST_CAPACITY as u64) {
            assert_eq!(t.contains(&k), ContainsOutcome::Found(k));
        }
    }
}
