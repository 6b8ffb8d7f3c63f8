pub mod confchange;
pub mod election;
pub mod quorum;
pub mod role;

#[allow(unused)] use common::vendor::prelude::{error, warn, info, debug, trace, crit};
use common::errors;
use common::protocol;

/// In this situaion, we using fxhash for u64 type server's id
pub type DefaultHashBuilder = std::hash::BuildHasherDefault<fxhash::FxHasher>;
pub type HashMap<K, V> = std::collections::HashMap<K, V, DefaultHashBuilder>;
pub type HashSet<K> = std::collections::HashSet<K, DefaultHashBuilder>;

pub mod prelude {
    pub use crate::{DefaultHashBuilder, HashMap, HashSet};
    pub use crate::{
        confchange::membership_changer::*,
        election::*,
        quorum::{joint::Joint, majority::Majority, Quorum, QuorumSystem, VoteResult},
        role::*,
    };
}
