pub mod membership;
pub mod proposal;
pub mod reconfig;
pub mod response;
pub mod server;
pub mod stamp;

pub type NodeID = u64;
pub type SessionID = u64;

pub use stamp::{Stamp, Version};
