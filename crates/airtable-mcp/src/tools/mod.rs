//! MCP tool implementations.
//!
//! Tools are grouped by the Airtable surface they touch:
//! - **Schema**: `list_bases`, `list_tables`, `describe_table`, `create_table`,
//!   `update_table`, `create_field`, `update_field`
//! - **Records**: `list_records`, `search_records`, `get_record`,
//!   `create_record`, `update_records`, `delete_records`
//!
//! The set is closed: [`ToolRegistry`] is built once at startup and an
//! unknown name is a lookup miss, never a fault.

mod records;
mod schema;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use crate::client::TableApi;
use crate::error::{ToolError, ToolResult};

pub use records::{
    CreateRecordTool, DeleteRecordsTool, GetRecordTool, ListRecordsTool, SearchRecordsTool,
    UpdateRecordsTool,
};
pub use schema::{
    CreateFieldTool, CreateTableTool, DescribeTableTool, ListBasesTool, ListTablesTool,
    UpdateFieldTool, UpdateTableTool,
};

/// Scope class a caller needs to invoke a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Read,
    Write,
}

/// Tool execution context.
#[derive(Clone, Debug)]
pub struct ToolContext {
    /// Tabular-data API client.
    pub client: Arc<dyn TableApi>,
}

impl ToolContext {
    /// Create a new tool context.
    #[must_use]
    pub fn new(client: Arc<dyn TableApi>) -> Self {
        Self { client }
    }
}

/// MCP tool trait.
#[async_trait::async_trait]
pub trait McpTool: Send + Sync {
    /// Tool name (used in MCP protocol).
    fn name(&self) -> &'static str;

    /// Tool description for LLM.
    fn description(&self) -> &'static str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> Value;

    /// Scope class required to run the tool.
    fn access(&self) -> Access {
        Access::Read
    }

    /// Execute the tool, returning the Airtable payload.
    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<Value>;
}

/// Closed name-to-tool mapping, in registration order.
pub struct ToolRegistry {
    tools: Vec<Box<dyn McpTool>>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    /// Build a registry, rejecting duplicate names.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Internal`] when two tools share a name.
    pub fn new(tools: Vec<Box<dyn McpTool>>) -> ToolResult<Self> {
        let mut index = HashMap::with_capacity(tools.len());
        for (position, tool) in tools.iter().enumerate() {
            if index.insert(tool.name(), position).is_some() {
                return Err(ToolError::internal(format!("duplicate tool name: {}", tool.name())));
            }
        }
        Ok(Self { tools, index })
    }

    /// Registry with every Airtable tool.
    ///
    /// # Errors
    ///
    /// Returns error if the built-in set contains a duplicate name.
    pub fn standard() -> ToolResult<Self> {
        Self::new(register_all_tools())
    }

    /// Look a tool up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn McpTool> {
        self.index.get(name).map(|&i| self.tools[i].as_ref())
    }

    /// Tool definitions for `tools/list`.
    #[must_use]
    pub fn definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.input_schema(),
                })
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.iter().map(|t| t.name())).finish()
    }
}

/// Register all available tools.
#[must_use]
pub fn register_all_tools() -> Vec<Box<dyn McpTool>> {
    vec![
        Box::new(ListBasesTool),
        Box::new(ListTablesTool),
        Box::new(DescribeTableTool),
        Box::new(ListRecordsTool),
        Box::new(SearchRecordsTool),
        Box::new(GetRecordTool),
        Box::new(CreateRecordTool),
        Box::new(UpdateRecordsTool),
        Box::new(DeleteRecordsTool),
        Box::new(CreateTableTool),
        Box::new(UpdateTableTool),
        Box::new(CreateFieldTool),
        Box::new(UpdateFieldTool),
    ]
}

/// Deserialize tool arguments; missing arguments count as `{}`.
pub(crate) fn parse_input<T: serde::de::DeserializeOwned>(input: Value) -> ToolResult<T> {
    let input = if input.is_null() { json!({}) } else { input };
    Ok(serde_json::from_value(input)?)
}

/// Reject identifiers that cannot stand as one URL path segment.
///
/// Table names may contain spaces; the client percent-encodes them.
pub(crate) fn require_id(field: &str, value: &str) -> ToolResult<()> {
    if value.trim().is_empty() {
        return Err(ToolError::validation(field, "must not be empty"));
    }
    if matches!(value, "." | "..") {
        return Err(ToolError::validation(field, "must not be a relative path segment"));
    }
    if let Some(c) = value.chars().find(|c| matches!(c, '/' | '\\' | '?' | '#') || c.is_control()) {
        return Err(ToolError::validation(field, format!("must not contain {c:?}")));
    }
    Ok(())
}
