//! MCP server surface: newline-delimited JSON-RPC 2.0 over stdio.

pub mod server;
pub mod types;

pub use server::{ServeError, serve, serve_stdio, tool_result};
