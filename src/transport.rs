//! Seams between the session layer and the SSH client.
//!
//! The session manager and executor only talk to these traits, so the russh
//! implementation in [`crate::ssh`] can be swapped for a scripted one in tests.

use async_trait::async_trait;

use crate::ssh::{SshConfig, SshError};

/// Opens authenticated connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &SshConfig) -> Result<Box<dyn Connection>, SshError>;
}

/// One live, authenticated SSH connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Start `command` on the remote side. An error here means the command
    /// never started and no output exists.
    async fn exec(&self, command: &str) -> Result<Box<dyn OutputStream>, SshError>;

    async fn close(&self) -> Result<(), SshError>;
}

/// Output of a running remote command.
#[async_trait]
pub trait OutputStream: Send {
    /// Next decoded chunk from stdout or stderr, in arrival order, or `None`
    /// once the remote side closed the channel.
    async fn next_chunk(&mut self) -> Option<String>;
}
