//! The driver-facing surface: a single `apply` entry point over tagged operations.
//!
//! Workload generation, QPS pacing, and result aggregation are the workload driver's job, not
//! this crate's; what lives here is just enough structure for a driver to describe an operation
//! and get a typed outcome back, without reaching into `iht` directly.

use crate::iht::{ContainsOutcome, InsertOutcome, Iht, RemoveOutcome};
use crate::rma::RemoteMemory;

/// A single tagged operation against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op<K, V> {
    Contains(K),
    Insert(K, V),
    Remove(K),
}

/// The result of applying one `Op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<V> {
    Contains(ContainsOutcome<V>),
    Insert(InsertOutcome<V>),
    Remove(RemoveOutcome<V>),
}

/// Apply a single operation to `table`.
pub fn apply<K, V, F>(table: &Iht<K, V, F>, op: Op<K, V>) -> Outcome<V>
where
    K: Copy + Eq + std::hash::Hash + Default + Send + 'static,
    V: Copy + Default + Send + 'static,
    F: RemoteMemory,
{
    match op {
        Op::Contains(k) => Outcome::Contains(table.contains(&k)),
        Op::Insert(k, v) => Outcome::Insert(table.insert(k, v)),
        Op::Remove(k) => Outcome::Remove(table.remove(&k)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use crate::rma::local::LocalFabric;

    #[test]
    fn apply_dispatches_to_the_matching_operation() {
        let pool = Pool::new(LocalFabric::new(0));
        let root = Iht::<u64, u64, LocalFabric>::allocate_root(&pool);
        let table = Iht::new(pool, root);

        assert_eq!(apply(&table, Op::Contains(1)), Outcome::Contains(ContainsOutcome::NotFound));
        assert_eq!(apply(&table, Op::Insert(1, 42)), Outcome::Insert(InsertOutcome::Inserted));
        assert_eq!(apply(&table, Op::Contains(1)), Outcome::Contains(ContainsOutcome::Found(42)));
        assert_eq!(apply(&table, Op::Remove(1)), Outcome::Remove(RemoveOutcome::Removed(42)));
        assert_eq!(apply(&table, Op::Remove(1)), Outcome::Remove(RemoveOutcome::NotFound));
    }
}
