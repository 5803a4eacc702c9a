//! Error taxonomy.
//!
//! Per-operation outcomes (`AlreadyPresent`, `NotFound`, ...) are not errors — they are ordinary
//! return values, modeled in `driver`. The errors here cover the things that can actually go wrong
//! around an operation: bootstrapping a node, losing the remote-memory fabric mid-flight, or being
//! handed a nonsensical configuration.

use quick_error::quick_error;

quick_error! {
    /// A fatal error.
    ///
    /// Every variant here is fatal to the node that observes it: there is no partial-failure
    /// recovery inside the table, since remote memory is treated as though it were local memory,
    /// and local memory does not fail. The only safe recovery from any of these is a full restart.
    #[derive(Debug)]
    pub enum Error {
        /// The fabric reported a transport failure servicing a one-sided operation.
        ///
        /// This is assumed not to happen during the steady state of a run; when it does, the
        /// operation that triggered it cannot be completed and the process should exit.
        Rma(reason: String) {
            display("remote memory access failed: {}", reason)
        }
        /// Establishing the control channel, or exchanging the root pointer over it, failed.
        Bootstrap(reason: String) {
            display("bootstrap failed: {}", reason)
        }
        /// The configuration handed to a node does not describe a runnable cluster.
        Config(reason: String) {
            display("invalid configuration: {}", reason)
        }
    }
}

/// The result of a fallible setup or transport operation.
pub type Result<T> = ::std::result::Result<T, Error>;
