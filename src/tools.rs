//! Per-request tool registry.
//!
//! A registry is acquired for one chat turn, handed to the agent, and
//! released when the turn ends. Nothing here is shared between requests.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::stateless_llm::LlmToolSpec;
use crate::conversations::types::TenantContext;
use crate::error::ToolRegistryError;

/// Name, description and input schema of a remote operation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn to_spec(&self) -> LlmToolSpec {
        LlmToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }
}

/// Executes one named tool
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run the tool and return its textual result.
    async fn call(&self, arguments: Value) -> Result<String>;
}

/// An open session backing some of the registry's tools
#[async_trait]
pub trait ToolSession: Send + Sync {
    fn name(&self) -> &str;

    async fn close(&self) -> Result<()>;
}

struct RegisteredTool {
    definition: ToolDefinition,
    executor: Arc<dyn ToolExecutor>,
}

/// Tools available to the agent for a single turn
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
    sessions: Vec<Arc<dyn ToolSession>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Returns false if a tool with the same name already exists.
    pub fn register(&mut self, definition: ToolDefinition, executor: Arc<dyn ToolExecutor>) -> bool {
        if self.index.contains_key(&definition.name) {
            warn!(tool = %definition.name, "Duplicate tool name, keeping the first registration");
            return false;
        }
        self.index.insert(definition.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool { definition, executor });
        true
    }

    /// Keep a session alive for as long as the registry and close it on release
    pub fn attach_session(&mut self, session: Arc<dyn ToolSession>) {
        self.sessions.push(session);
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().map(|t| &t.definition)
    }

    pub fn specs(&self) -> Vec<LlmToolSpec> {
        self.definitions().map(ToolDefinition::to_spec).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Invoke a tool by name
    pub async fn call(&self, name: &str, arguments: Value) -> Result<String> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("{} is not a valid tool", name))?;
        debug!(tool = name, "Calling tool");
        self.tools[idx].executor.call(arguments).await
    }

    /// Close every session opened for this registry
    pub async fn release(self) {
        for session in self.sessions {
            if let Err(e) = session.close().await {
                warn!(session = session.name(), "Failed to close tool session: {:#}", e);
            }
        }
    }
}

/// Builds a fresh tool registry for each request
#[async_trait]
pub trait ToolRegistryProvider: Send + Sync {
    async fn acquire(&self, tenant: &TenantContext) -> Result<ToolRegistry, ToolRegistryError>;
}
