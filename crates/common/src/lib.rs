pub mod errors;
pub mod protocol;
pub mod vendor;
