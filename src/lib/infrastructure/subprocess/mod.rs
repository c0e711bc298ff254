//! Adapter that drives joblet through the `rnx` command line client.

pub mod backend;
pub mod command;
pub mod parse;
pub mod runner;

pub use backend::CliBackend;
pub use command::{CommandBuilder, Invocation, OutputFormat};
pub use runner::{ProcessOutput, ProcessRunner};
