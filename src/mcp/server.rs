//! MCP server implementation for SSH tools.
//!
//! Tool calls are decoded here and handed to the [`SessionManager`]; every
//! outcome, failures included, comes back as a [`CallToolResult`].

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::executor::ProgressSink;
use crate::mcp::progress::ProgressReporter;
use crate::mcp::tools::{
    SshConnectParams, SshDisconnectParams, SshExecParams, SSH_CONNECT, SSH_DISCONNECT, SSH_EXEC,
};
use crate::session::{SessionError, SessionManager};

/// Convert a schemars schema to the Arc<Map<String, Value>> format expected by rmcp.
fn schema_to_arc_map<T: JsonSchema>() -> Arc<Map<String, Value>> {
    let schema = schemars::schema_for!(T);
    let value = serde_json::to_value(schema).unwrap_or_default();
    if let Value::Object(map) = value {
        Arc::new(map)
    } else {
        Arc::new(Map::new())
    }
}

fn tool<T: JsonSchema>(name: &'static str, description: &'static str) -> Tool {
    Tool {
        name: name.into(),
        description: Some(description.into()),
        input_schema: schema_to_arc_map::<T>(),
        annotations: None,
        output_schema: None,
        meta: None,
        icons: None,
        title: None,
    }
}

fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T, SessionError> {
    serde_json::from_value(arguments).map_err(|e| SessionError::InvalidParams(e.to_string()))
}

fn into_result(outcome: Result<String, SessionError>) -> CallToolResult {
    match outcome {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(e) => CallToolResult::error(vec![Content::text(e.to_string())]),
    }
}

/// MCP service exposing one SSH session as tools.
pub struct McpSshService {
    sessions: Mutex<SessionManager>,
}

impl McpSshService {
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            sessions: Mutex::new(sessions),
        }
    }

    /// Available tools with their schemas.
    pub fn tools(&self) -> Vec<Tool> {
        vec![
            tool::<SshConnectParams>(SSH_CONNECT, "Connect to SSH server"),
            tool::<SshExecParams>(SSH_EXEC, "Execute command over SSH"),
            tool::<SshDisconnectParams>(SSH_DISCONNECT, "Close SSH connection"),
        ]
    }

    /// Call a tool by name. Output of `ssh_exec` is streamed to `progress`
    /// while the command runs.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Value,
        progress: &dyn ProgressSink,
    ) -> CallToolResult {
        match name {
            SSH_CONNECT => into_result(self.tool_ssh_connect(arguments).await),
            SSH_EXEC => into_result(self.tool_ssh_exec(arguments, progress).await),
            SSH_DISCONNECT => CallToolResult::success(vec![Content::text(
                self.sessions.lock().await.disconnect().await,
            )]),
            _ => {
                tracing::warn!("Call to unknown tool {:?}", name);
                CallToolResult::error(vec![Content::text("Unknown tool")])
            }
        }
    }

    async fn tool_ssh_connect(&self, arguments: Value) -> Result<String, SessionError> {
        let params: SshConnectParams = parse(arguments)?;
        self.sessions.lock().await.connect(params.into()).await
    }

    async fn tool_ssh_exec(
        &self,
        arguments: Value,
        progress: &dyn ProgressSink,
    ) -> Result<String, SessionError> {
        let sessions = self.sessions.lock().await;
        // Connection state is checked before the arguments.
        if !sessions.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let params: SshExecParams = parse(arguments)?;
        sessions.execute(&params.command, progress).await
    }
}

impl ServerHandler for McpSshService {
    fn get_info(&self) -> ServerInfo {
        // 2025-03-26 is the first revision with a `message` on progress notifications.
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mcp-ssh-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: None,
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        async { Ok(ListToolsResult::with_all_items(self.tools())) }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let reporter =
                ProgressReporter::new(context.meta.get_progress_token(), context.peer.clone());
            let arguments = request.arguments.map(Value::Object).unwrap_or_else(|| json!({}));
            Ok(self.dispatch(&request.name, arguments, &reporter).await)
        }
    }
}
