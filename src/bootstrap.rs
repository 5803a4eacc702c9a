//! Node bootstrap: turning a fabric handle and a peer address into a runnable `Iht` handle.
//!
//! Exactly one node in a cluster (`node_id == 0`, by convention: the "host") allocates the root
//! `PList` and publishes its address; every other node receives it over the control channel. Both
//! paths converge on the same `Iht::new`, so from the second line on, a host and a non-host are
//! indistinguishable to the rest of the crate.

use std::net::ToSocketAddrs;
use std::time::Duration;

use crate::control::{Client, Host};
use crate::error::{Error, Result};
use crate::iht::Iht;
use crate::pool::Pool;
use crate::rma::{NodeId, RemoteMemory};

/// Runtime configuration supplied by the workload driver.
///
/// The two static compile-time constants the source also names, `ELIST_CAPACITY` and
/// `PLIST_SIZE_BASE`, aren't here: they're fixed at build time (`elist::ELIST_CAPACITY`,
/// `plist::PLIST_SIZE_BASE`), not something a run can vary.
#[derive(Debug, Clone)]
pub struct Config {
    pub node_count: u16,
    pub node_id: NodeId,
    pub thread_count: u32,
    pub key_lb: u64,
    pub key_ub: u64,
    /// `contains`, `insert`, `remove` percentages; must sum to 100.
    pub op_mix: (u8, u8, u8),
    pub runtime: Duration,
    pub qps_cap: Option<u32>,
    /// `Some(n)` runs exactly `n` operations per thread; `None` runs until `runtime` elapses.
    pub op_count: Option<u64>,
}

impl Config {
    /// Reject configurations that don't describe a runnable cluster.
    pub fn validate(&self) -> Result<()> {
        if self.node_count == 0 {
            return Err(Error::Config("node_count must be at least 1".into()));
        }
        if self.node_id >= self.node_count {
            return Err(Error::Config(format!(
                "node_id {} is out of range for node_count {}",
                self.node_id, self.node_count
            )));
        }
        if self.key_lb >= self.key_ub {
            return Err(Error::Config("key range is empty".into()));
        }
        let (c, i, r) = self.op_mix;
        if c as u16 + i as u16 + r as u16 != 100 {
            return Err(Error::Config(format!(
                "operation mix must sum to 100, got {}",
                c as u16 + i as u16 + r as u16
            )));
        }
        Ok(())
    }

    /// Is this node the bootstrap host?
    pub fn is_host(&self) -> bool {
        self.node_id == 0
    }
}

/// Allocate the root `PList` locally and publish it to every peer.
///
/// `control_addr` is the address this host listens on for peer connections.
pub fn init_as_first<K, V, F>(
    config: &Config,
    pool: Pool<F>,
    control_addr: impl ToSocketAddrs,
) -> Result<Iht<K, V, F>>
where
    K: Copy + Eq + std::hash::Hash + Default + Send + 'static,
    V: Copy + Default + Send + 'static,
    F: RemoteMemory,
{
    config.validate()?;
    let root = Iht::<K, V, F>::allocate_root(&pool);
    slog::info!(pool.log(), "allocated root plist"; "address" => root.address());

    let peer_count = config.node_count as usize - 1;
    if peer_count > 0 {
        let mut host = Host::bind(control_addr)?;
        host.accept_peers(peer_count)?;
        host.publish_root(pool.node_id(), root.address())?;
        slog::info!(pool.log(), "published root to peers"; "peer_count" => peer_count);
    }

    pool.register_thread();
    Ok(Iht::new(pool, root))
}

/// Connect to the host and receive the root pointer it published.
pub fn init_from_pointer<K, V, F>(
    config: &Config,
    pool: Pool<F>,
    host_addr: impl ToSocketAddrs,
) -> Result<Iht<K, V, F>>
where
    K: Copy + Eq + std::hash::Hash + Default + Send + 'static,
    V: Copy + Default + Send + 'static,
    F: RemoteMemory,
{
    config.validate()?;
    let mut client = Client::connect(host_addr)?;
    let (host_id, root_address) = client.receive_root()?;
    // SAFETY: the host only ever publishes the address of a root it allocated via
    // `Iht::allocate_root`, i.e. a `RemotePtr<Bucket<K, V>>`.
    let root = unsafe { crate::rma::RemotePtr::from_raw_parts(host_id, root_address).cast() };
    slog::info!(pool.log(), "received root from host"; "host_id" => host_id, "address" => root_address);

    pool.register_thread();
    Ok(Iht::new(pool, root))
}
