//! MCP tool parameter schemas for SSH operations.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ssh::SshConfig;

pub const SSH_CONNECT: &str = "ssh_connect";
pub const SSH_EXEC: &str = "ssh_exec";
pub const SSH_DISCONNECT: &str = "ssh_disconnect";

/// Parameters for the ssh_connect tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SshConnectParams {
    /// SSH server address.
    pub host: String,

    /// SSH port (default: 22).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username.
    pub username: String,

    /// Password.
    pub password: String,
}

fn default_port() -> u16 {
    22
}

impl From<SshConnectParams> for SshConfig {
    fn from(params: SshConnectParams) -> Self {
        Self {
            host: params.host,
            port: params.port,
            username: params.username,
            password: params.password,
        }
    }
}

/// Parameters for the ssh_exec tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SshExecParams {
    /// Command to execute.
    pub command: String,
}

/// The ssh_disconnect tool takes no parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SshDisconnectParams {}
