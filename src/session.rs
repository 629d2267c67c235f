use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::executor::{run_command, ProgressSink};
use crate::ssh::{SshConfig, SshError};
use crate::transport::{Connection, Connector};

/// Failures surfaced to the caller. The `Display` text is what the caller reads.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Connection error: {0}")]
    Connect(#[source] SshError),

    #[error("Please connect first using ssh_connect")]
    NotConnected,

    #[error("Command error: {0}")]
    Command(#[source] SshError),
}

struct ActiveSession {
    // Kept for a later reconnect; not read while the connection is up.
    config: SshConfig,
    connection: Box<dyn Connection>,
}

/// Owns the single SSH connection the server works against.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    active: Option<ActiveSession>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            active: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// Parameters of the live connection, if any.
    pub fn connection_params(&self) -> Option<&SshConfig> {
        self.active.as_ref().map(|active| &active.config)
    }

    /// Open a new connection, closing any previous one first.
    ///
    /// On failure the manager is left disconnected.
    pub async fn connect(&mut self, config: SshConfig) -> Result<String, SessionError> {
        if config.host.trim().is_empty() {
            return Err(SessionError::InvalidParams("host must not be empty".into()));
        }
        if config.username.trim().is_empty() {
            return Err(SessionError::InvalidParams("username must not be empty".into()));
        }

        if let Some(previous) = self.active.take() {
            tracing::info!(
                "Closing superseded connection to {}",
                previous.config.target()
            );
            if let Err(e) = previous.connection.close().await {
                tracing::warn!("Failed to close superseded connection: {}", e);
            }
        }

        tracing::info!(host = %config.host, port = config.port, username = %config.username, "Connecting");
        match self.connector.connect(&config).await {
            Ok(connection) => {
                let message = format!("Connection successful: {}", config.target());
                tracing::info!("Connected to {}:{}", config.target(), config.port);
                self.active = Some(ActiveSession { config, connection });
                Ok(message)
            }
            Err(e) => {
                tracing::warn!("Connection to {} failed: {}", config.target(), e);
                Err(SessionError::Connect(e))
            }
        }
    }

    /// Run `command` on the live connection, streaming coalesced output to `progress`.
    pub async fn execute(
        &self,
        command: &str,
        progress: &dyn ProgressSink,
    ) -> Result<String, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NotConnected)?;

        let span = tracing::info_span!("exec", invocation = %Uuid::new_v4());
        async move {
            tracing::info!(command, "Starting command");
            let mut stream = active.connection.exec(command).await.map_err(|e| {
                tracing::warn!("Command failed to start: {}", e);
                SessionError::Command(e)
            })?;

            let output = run_command(&mut *stream, progress).await;
            tracing::info!(bytes = output.len(), "Command finished");
            Ok::<_, SessionError>(output)
        }
        .instrument(span)
        .await
    }

    /// Close the live connection if there is one. Always succeeds.
    pub async fn disconnect(&mut self) -> String {
        if let Some(active) = self.active.take() {
            if let Err(e) = active.connection.close().await {
                tracing::warn!("Error while closing connection: {}", e);
            }
            tracing::info!("Disconnected from {}", active.config.target());
        }
        "Connection closed".to_string()
    }
}
