pub use common;
pub use consensus;
#[cfg(feature = "ensemble")]
pub use ensemble;
