use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{Channel, ChannelMsg, Disconnect};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::ServerConfig;
use crate::transport::{Connection, Connector, OutputStream};

/// Parameters captured by `ssh_connect`.
#[derive(Clone, PartialEq, Eq)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl SshConfig {
    /// `username@host`, as shown to callers.
    pub fn target(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum SshError {
    #[error(transparent)]
    Protocol(#[from] russh::Error),

    #[error("authentication rejected for {0}")]
    AuthenticationRejected(String),

    #[error("connection to {host}:{port} timed out after {secs}s")]
    Timeout { host: String, port: u16, secs: u64 },

    #[error("server refused to execute the command")]
    ExecRejected,

    #[error("{0}")]
    Transport(String),
}

struct Client;

impl client::Handler for Client {
    type Error = russh::Error;

    fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> impl std::future::Future<Output = Result<bool, Self::Error>> + Send {
        // Host keys are not pinned; credentials are the only auth material.
        async { Ok(true) }
    }
}

/// [`Connector`] backed by russh with password authentication.
pub struct RusshConnector {
    settings: ServerConfig,
}

impl RusshConnector {
    pub fn new(settings: ServerConfig) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for RusshConnector {
    async fn connect(&self, config: &SshConfig) -> Result<Box<dyn Connection>, SshError> {
        let timeout = self.settings.connect_timeout;
        let session = tokio::time::timeout(timeout, SshSession::connect(config, &self.settings))
            .await
            .map_err(|_| SshError::Timeout {
                host: config.host.clone(),
                port: config.port,
                secs: timeout.as_secs(),
            })??;
        Ok(Box::new(session))
    }
}

pub struct SshSession {
    // `Connection` must be `Sync`; the mutex provides that for the russh
    // handle rather than serialising anything.
    handle: Mutex<Handle<Client>>,
}

impl SshSession {
    pub async fn connect(config: &SshConfig, settings: &ServerConfig) -> Result<Self, SshError> {
        let client_config = client::Config {
            inactivity_timeout: settings.inactivity_timeout,
            keepalive_interval: settings.keepalive_interval,
            ..<_>::default()
        };

        let client_config = Arc::new(client_config);
        let mut handle =
            client::connect(client_config, (config.host.as_str(), config.port), Client).await?;
        tracing::debug!(host = %config.host, port = config.port, "SSH handshake complete");

        let auth_result = handle
            .authenticate_password(config.username.clone(), config.password.clone())
            .await?;

        if !auth_result.success() {
            return Err(SshError::AuthenticationRejected(config.username.clone()));
        }

        Ok(Self {
            handle: Mutex::new(handle),
        })
    }
}

#[async_trait]
impl Connection for SshSession {
    async fn exec(&self, command: &str) -> Result<Box<dyn OutputStream>, SshError> {
        let channel = self.handle.lock().await.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut output = ChannelOutput {
            channel,
            merger: OutputMerger::default(),
        };
        output.await_exec_reply().await?;
        Ok(Box::new(output))
    }

    async fn close(&self) -> Result<(), SshError> {
        self.handle
            .lock()
            .await
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }
}

/// Output of one exec channel.
struct ChannelOutput {
    channel: Channel<client::Msg>,
    merger: OutputMerger,
}

impl ChannelOutput {
    async fn await_exec_reply(&mut self) -> Result<(), SshError> {
        loop {
            let Some(msg) = self.channel.wait().await else {
                return Err(SshError::Transport(
                    "channel closed before the command started".to_string(),
                ));
            };
            if let Some(outcome) = self.merger.exec_reply(msg) {
                return outcome;
            }
        }
    }
}

#[async_trait]
impl OutputStream for ChannelOutput {
    async fn next_chunk(&mut self) -> Option<String> {
        loop {
            if let Some(chunk) = self.merger.pop() {
                return Some(chunk);
            }
            if self.merger.is_closed() {
                return None;
            }
            match self.channel.wait().await {
                Some(msg) => self.merger.absorb(msg),
                None => self.merger.finish(),
            }
        }
    }
}

/// Turns channel messages into text chunks, stdout and stderr interleaved in
/// arrival order.
#[derive(Debug, Default)]
struct OutputMerger {
    stdout: Utf8Decoder,
    stderr: Utf8Decoder,
    ready: VecDeque<String>,
    closed: bool,
}

impl OutputMerger {
    /// Feed a message received while waiting for the exec reply. Returns the
    /// outcome once the request is settled. Output that races ahead of the
    /// reply is kept.
    fn exec_reply(&mut self, msg: ChannelMsg) -> Option<Result<(), SshError>> {
        match msg {
            ChannelMsg::Success => Some(Ok(())),
            ChannelMsg::Failure => Some(Err(SshError::ExecRejected)),
            other => {
                self.absorb(other);
                self.closed.then_some(Ok(()))
            }
        }
    }

    fn absorb(&mut self, msg: ChannelMsg) {
        match msg {
            ChannelMsg::Data { data } => {
                if let Some(text) = self.stdout.decode(&data) {
                    self.ready.push_back(text);
                }
            }
            ChannelMsg::ExtendedData { data, ext: _ } => {
                if let Some(text) = self.stderr.decode(&data) {
                    self.ready.push_back(text);
                }
            }
            ChannelMsg::ExitStatus { exit_status } => {
                tracing::debug!("Command exited with status: {}", exit_status);
            }
            ChannelMsg::ExitSignal { signal_name, .. } => {
                tracing::debug!("Command killed by signal: {:?}", signal_name);
            }
            ChannelMsg::Eof => tracing::trace!("remote sent EOF"),
            ChannelMsg::Close => self.finish(),
            _ => {}
        }
    }

    fn finish(&mut self) {
        self.closed = true;
        for decoder in [&mut self.stdout, &mut self.stderr] {
            if let Some(rest) = decoder.finish() {
                self.ready.push_back(rest);
            }
        }
    }

    fn pop(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Incremental UTF-8 decoding that holds back a multi-byte sequence split
/// across packets until the rest of it arrives.
#[derive(Debug, Default)]
struct Utf8Decoder {
    partial: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> Option<String> {
        self.partial.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.partial) {
                Ok(text) => {
                    out.push_str(text);
                    self.partial.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.partial[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.partial.drain(..valid + len);
                        }
                        None => {
                            self.partial.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        (!out.is_empty()).then_some(out)
    }

    fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        Some(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_passes_ascii_through() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"hi\n"), Some("hi\n".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_joins_split_character() {
        let bytes = "añb".as_bytes();
        let mut decoder = Utf8Decoder::default();

        assert_eq!(decoder.decode(&bytes[..2]), Some("a".to_string()));
        assert_eq!(decoder.decode(&bytes[2..]), Some("ñb".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_holds_back_until_complete() {
        let bytes = "€".as_bytes();
        let mut decoder = Utf8Decoder::default();

        assert_eq!(decoder.decode(&bytes[..1]), None);
        assert_eq!(decoder.decode(&bytes[1..2]), None);
        assert_eq!(decoder.decode(&bytes[2..]), Some("€".to_string()));
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(
            decoder.decode(&[b'o', 0xff, b'k']),
            Some("o\u{FFFD}k".to_string())
        );
    }

    #[test]
    fn test_decoder_flushes_truncated_tail_lossily() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&[b'x', 0xe2, 0x82]), Some("x".to_string()));
        assert_eq!(decoder.finish(), Some("\u{FFFD}".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    fn stdout(bytes: &[u8]) -> ChannelMsg {
        ChannelMsg::Data {
            data: bytes.to_vec().into(),
        }
    }

    fn stderr(bytes: &[u8]) -> ChannelMsg {
        ChannelMsg::ExtendedData {
            data: bytes.to_vec().into(),
            ext: 1,
        }
    }

    fn drain(merger: &mut OutputMerger) -> Vec<String> {
        std::iter::from_fn(|| merger.pop()).collect()
    }

    #[test]
    fn test_merger_interleaves_stdout_and_stderr() {
        let mut merger = OutputMerger::default();

        merger.absorb(stdout(b"out 1\n"));
        merger.absorb(stderr(b"err 1\n"));
        merger.absorb(stdout(b"out 2\n"));
        merger.absorb(ChannelMsg::ExitStatus { exit_status: 3 });
        merger.absorb(ChannelMsg::Eof);

        assert_eq!(drain(&mut merger), vec!["out 1\n", "err 1\n", "out 2\n"]);
        assert!(!merger.is_closed());

        merger.absorb(ChannelMsg::Close);
        assert!(merger.is_closed());
        assert!(drain(&mut merger).is_empty());
    }

    #[test]
    fn test_merger_failure_reply_rejects_exec() {
        let mut merger = OutputMerger::default();
        let outcome = merger.exec_reply(ChannelMsg::Failure);
        assert!(matches!(outcome, Some(Err(SshError::ExecRejected))));
    }

    #[test]
    fn test_merger_keeps_output_ahead_of_success() {
        let mut merger = OutputMerger::default();

        assert!(merger.exec_reply(stdout(b"early\n")).is_none());
        assert!(matches!(merger.exec_reply(ChannelMsg::Success), Some(Ok(()))));

        assert_eq!(drain(&mut merger), vec!["early\n"]);
    }

    #[test]
    fn test_merger_close_before_reply_settles() {
        let mut merger = OutputMerger::default();

        assert!(merger.exec_reply(stdout(b"done")).is_none());
        assert!(matches!(merger.exec_reply(ChannelMsg::Close), Some(Ok(()))));
        assert_eq!(drain(&mut merger), vec!["done"]);
    }

    #[test]
    fn test_merger_close_flushes_held_back_bytes() {
        let euro = "€".as_bytes();
        let mut merger = OutputMerger::default();

        merger.absorb(stdout(&[b'a', euro[0]]));
        merger.absorb(stderr(&[b'b', euro[0], euro[1]]));
        assert_eq!(drain(&mut merger), vec!["a", "b"]);

        merger.absorb(ChannelMsg::Close);
        assert_eq!(drain(&mut merger), vec!["\u{FFFD}", "\u{FFFD}"]);
    }

    #[test]
    fn test_merger_split_character_across_packets() {
        let bytes = "naïve\n".as_bytes();
        let mut merger = OutputMerger::default();

        merger.absorb(stdout(&bytes[..3]));
        merger.absorb(stdout(&bytes[3..]));

        assert_eq!(drain(&mut merger).concat(), "naïve\n");
    }

    #[test]
    fn test_config_debug_redacts_password() {
        let config = SshConfig {
            host: "h".to_string(),
            port: 22,
            username: "u".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert_eq!(config.target(), "u@h");
    }

    #[test]
    fn test_timeout_message() {
        let err = SshError::Timeout {
            host: "example.org".to_string(),
            port: 2222,
            secs: 10,
        };
        assert_eq!(
            err.to_string(),
            "connection to example.org:2222 timed out after 10s"
        );
    }
}
