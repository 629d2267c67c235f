//! MCP (Model Context Protocol) server exposing an SSH session as tools.
//!
//! `ssh_connect`, `ssh_exec` and `ssh_disconnect` are served through rmcp
//! over newline-delimited JSON-RPC on stdio.

mod progress;
mod server;
pub mod stdio;
mod tools;

pub use server::McpSshService;
