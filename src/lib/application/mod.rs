//! # Application Module
//!
//! Transport-independent core of the server.
//!
//! ## Submodules
//!
//! - [`backend`] - The operation set every joblet adapter implements
//! - [`dispatch`] - Tool registry, argument validation and job identifier resolution

pub mod backend;
pub mod dispatch;
