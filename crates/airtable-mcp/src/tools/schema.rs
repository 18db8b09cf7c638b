//! Schema tools: bases, tables and fields.

use serde_json::{Value, json};

use super::{Access, McpTool, ToolContext, parse_input, require_id};
use crate::error::{ToolError, ToolResult};
use crate::models::{
    CreateFieldInput, CreateTableInput, DescribeTableInput, FIELD_TYPES, FieldDefinition,
    ListTablesInput, MetadataUpdate, UpdateFieldInput, UpdateTableInput, is_valid_field_type,
};

fn detail_level_schema() -> Value {
    json!({
        "type": "string",
        "enum": ["tableIdentifiersOnly", "identifiersOnly", "full"],
        "default": "full",
        "description": "Level of detail to return"
    })
}

fn field_definition_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "type": {"type": "string", "enum": FIELD_TYPES},
            "description": {"type": "string"},
            "options": {"type": "object"}
        },
        "required": ["name", "type"]
    })
}

fn validate_field(index: Option<usize>, field: &FieldDefinition) -> ToolResult<()> {
    let label = index.map_or_else(|| "field".to_string(), |i| format!("fields[{i}]"));
    if field.name.trim().is_empty() {
        return Err(ToolError::validation(label, "field name must not be empty"));
    }
    if !is_valid_field_type(&field.field_type) {
        return Err(ToolError::validation(
            label,
            format!("unsupported field type '{}'", field.field_type),
        ));
    }
    Ok(())
}

fn metadata_update(
    name: Option<String>,
    description: Option<String>,
) -> ToolResult<MetadataUpdate> {
    MetadataUpdate::new(name, description)
        .ok_or_else(|| ToolError::validation("name", "provide a name or a description"))
}

/// List all accessible bases.
pub struct ListBasesTool;

#[async_trait::async_trait]
impl McpTool for ListBasesTool {
    fn name(&self) -> &'static str {
        "list_bases"
    }

    fn description(&self) -> &'static str {
        "List all accessible Airtable bases"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _input: Value) -> ToolResult<Value> {
        Ok(ctx.client.list_bases().await?)
    }
}

/// List the tables of one base.
pub struct ListTablesTool;

#[async_trait::async_trait]
impl McpTool for ListTablesTool {
    fn name(&self) -> &'static str {
        "list_tables"
    }

    fn description(&self) -> &'static str {
        "List all tables in a specific base"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "detailLevel": detail_level_schema()
            },
            "required": ["baseId"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<Value> {
        let params: ListTablesInput = parse_input(input)?;
        require_id("baseId", &params.base_id)?;
        Ok(ctx.client.list_tables(&params.base_id, params.detail_level).await?)
    }
}

/// Describe one table.
pub struct DescribeTableTool;

#[async_trait::async_trait]
impl McpTool for DescribeTableTool {
    fn name(&self) -> &'static str {
        "describe_table"
    }

    fn description(&self) -> &'static str {
        "Get detailed information about a specific table"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "detailLevel": detail_level_schema()
            },
            "required": ["baseId", "tableId"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<Value> {
        let params: DescribeTableInput = parse_input(input)?;
        require_id("baseId", &params.base_id)?;
        require_id("tableId", &params.table_id)?;
        Ok(ctx
            .client
            .describe_table(&params.base_id, &params.table_id, params.detail_level)
            .await?)
    }
}

/// Create a table with an initial set of fields.
pub struct CreateTableTool;

#[async_trait::async_trait]
impl McpTool for CreateTableTool {
    fn name(&self) -> &'static str {
        "create_table"
    }

    fn description(&self) -> &'static str {
        "Create a new table in a base"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "name": {"type": "string", "description": "Table name"},
                "description": {"type": "string", "description": "Table description"},
                "fields": {
                    "type": "array",
                    "items": field_definition_schema(),
                    "description": "Table fields definition"
                }
            },
            "required": ["baseId", "name", "fields"]
        })
    }

    fn access(&self) -> Access {
        Access::Write
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<Value> {
        let params: CreateTableInput = parse_input(input)?;
        require_id("baseId", &params.base_id)?;
        if params.name.trim().is_empty() {
            return Err(ToolError::validation("name", "table name must not be empty"));
        }
        if params.fields.is_empty() {
            return Err(ToolError::validation("fields", "a table needs at least one field"));
        }
        for (i, field) in params.fields.iter().enumerate() {
            validate_field(Some(i), field)?;
        }

        tracing::info!(base_id = %params.base_id, name = %params.name, "Creating table");
        Ok(ctx
            .client
            .create_table(
                &params.base_id,
                &params.name,
                params.description.as_deref(),
                &params.fields,
            )
            .await?)
    }
}

/// Rename or re-describe a table.
pub struct UpdateTableTool;

#[async_trait::async_trait]
impl McpTool for UpdateTableTool {
    fn name(&self) -> &'static str {
        "update_table"
    }

    fn description(&self) -> &'static str {
        "Update table name or description"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "name": {"type": "string", "description": "New table name"},
                "description": {"type": "string", "description": "New table description"}
            },
            "required": ["baseId", "tableId"]
        })
    }

    fn access(&self) -> Access {
        Access::Write
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<Value> {
        let params: UpdateTableInput = parse_input(input)?;
        require_id("baseId", &params.base_id)?;
        require_id("tableId", &params.table_id)?;
        let update = metadata_update(params.name, params.description)?;
        Ok(ctx.client.update_table(&params.base_id, &params.table_id, &update).await?)
    }
}

/// Add a field to a table.
pub struct CreateFieldTool;

#[async_trait::async_trait]
impl McpTool for CreateFieldTool {
    fn name(&self) -> &'static str {
        "create_field"
    }

    fn description(&self) -> &'static str {
        "Add a new field to a table"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "field": field_definition_schema()
            },
            "required": ["baseId", "tableId", "field"]
        })
    }

    fn access(&self) -> Access {
        Access::Write
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<Value> {
        let params: CreateFieldInput = parse_input(input)?;
        require_id("baseId", &params.base_id)?;
        require_id("tableId", &params.table_id)?;
        validate_field(None, &params.field)?;
        Ok(ctx.client.create_field(&params.base_id, &params.table_id, &params.field).await?)
    }
}

/// Rename or re-describe a field.
pub struct UpdateFieldTool;

#[async_trait::async_trait]
impl McpTool for UpdateFieldTool {
    fn name(&self) -> &'static str {
        "update_field"
    }

    fn description(&self) -> &'static str {
        "Update field name or description"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "baseId": {"type": "string", "description": "The Airtable base ID"},
                "tableId": {"type": "string", "description": "The table ID"},
                "fieldId": {"type": "string", "description": "The field ID"},
                "name": {"type": "string", "description": "New field name"},
                "description": {"type": "string", "description": "New field description"}
            },
            "required": ["baseId", "tableId", "fieldId"]
        })
    }

    fn access(&self) -> Access {
        Access::Write
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<Value> {
        let params: UpdateFieldInput = parse_input(input)?;
        require_id("baseId", &params.base_id)?;
        require_id("tableId", &params.table_id)?;
        require_id("fieldId", &params.field_id)?;
        let update = metadata_update(params.name, params.description)?;
        Ok(ctx
            .client
            .update_field(&params.base_id, &params.table_id, &params.field_id, &update)
            .await?)
    }
}
