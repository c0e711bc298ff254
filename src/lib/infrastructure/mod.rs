pub mod native;
pub mod rpc;
pub mod subprocess;
