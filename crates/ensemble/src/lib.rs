pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod handler;
pub mod notifier;
pub mod pipeline;
pub mod server;
pub mod store;

#[cfg(test)]
mod tests;

// For public use
pub use async_trait::async_trait;
pub use cluster::Ensemble;
pub use consensus::prelude::{ElectionOutcome, PeerRole};

// For internal use
use common::errors::{Error as ConsensusError, Result as ReconfigResult};
use common::protocol;
use common::vendor;
use consensus::{HashMap, HashSet};

#[allow(unused)]
use vendor::prelude::{debug, error, info, trace, warn};
