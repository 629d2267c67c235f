//! Scripted transport for exercising the session and protocol layers
//! without a network.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::executor::ProgressSink;
use crate::ssh::{SshConfig, SshError};
use crate::transport::{Connection, Connector, OutputStream};

/// What the mock saw, in order.
#[derive(Debug, Default)]
pub struct MockLog {
    pub connects: Vec<SshConfig>,
    pub execs: Vec<String>,
    pub closes: usize,
}

#[derive(Clone, Default)]
pub struct MockConnector {
    connect_error: Option<String>,
    exec_error: Option<String>,
    output: Vec<String>,
    log: Arc<Mutex<MockLog>>,
}

impl MockConnector {
    pub fn ready() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            connect_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, chunks: &[&str]) -> Self {
        self.output = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_exec_error(mut self, message: &str) -> Self {
        self.exec_error = Some(message.to_string());
        self
    }

    pub fn log(&self) -> Arc<Mutex<MockLog>> {
        self.log.clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &SshConfig) -> Result<Box<dyn Connection>, SshError> {
        self.log.lock().unwrap().connects.push(config.clone());
        match &self.connect_error {
            Some(message) => Err(SshError::Transport(message.clone())),
            None => Ok(Box::new(MockConnection {
                exec_error: self.exec_error.clone(),
                output: self.output.clone(),
                log: self.log.clone(),
            })),
        }
    }
}

struct MockConnection {
    exec_error: Option<String>,
    output: Vec<String>,
    log: Arc<Mutex<MockLog>>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn exec(&self, command: &str) -> Result<Box<dyn OutputStream>, SshError> {
        self.log.lock().unwrap().execs.push(command.to_string());
        match &self.exec_error {
            Some(message) => Err(SshError::Transport(message.clone())),
            None => {
                let chunks: Vec<&str> = self.output.iter().map(String::as_str).collect();
                Ok(Box::new(ScriptedStream::new(&chunks)))
            }
        }
    }

    async fn close(&self) -> Result<(), SshError> {
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Yields the given chunks, then reports the stream closed.
pub struct ScriptedStream {
    chunks: VecDeque<String>,
}

impl ScriptedStream {
    pub fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[async_trait]
impl OutputStream for ScriptedStream {
    async fn next_chunk(&mut self) -> Option<String> {
        self.chunks.pop_front()
    }
}

/// Records every progress message in emission order.
#[derive(Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for CollectingSink {
    async fn notify(&self, message: String) {
        self.messages.lock().unwrap().push(message);
    }
}
