//! Record tools: list, search, get, create, update, delete.

use serde_json::{Value, json};

use super::{Access, McpTool, ToolContext, parse_input, require_id};
use crate::config::api;
use crate::error::{ToolError, ToolResult};
use crate::models::{
    CreateRecordInput, DeleteRecordsInput, GetRecordInput, ListRecordsInput, ListRecordsOptions,
    SearchRecordsInput, UpdateRecordsInput,
};

fn table_properties() -> serde_json::Map<String, Value> {
    let mut properties = serde_json::Map::new();
    properties.insert(
        "baseId".into(),
        json!({"type": "string", "description": "The Airtable base ID"}),
    );
    properties.insert(
        "tableId".into(),
        json!({"type": "string", "description": "The table ID"}),
    );
    properties
}

fn object_schema(extra: Value, required: &[&str]) -> Value {
    let mut properties = table_properties();
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }
    let mut required_fields = vec!["baseId", "tableId"];
    required_fields.extend_from_slice(required);
    json!({"type": "object", "properties": properties, "required": required_fields})
}

fn check_batch_size(field: &str, len: usize) -> ToolResult<()> {
    if len == 0 {
        return Err(ToolError::validation(field, "at least one entry is required"));
    }
    if len > api::MAX_RECORDS_PER_REQUEST {
        return Err(ToolError::validation(
            field,
            format!("at most {} entries per call, got {len}", api::MAX_RECORDS_PER_REQUEST),
        ));
    }
    Ok(())
}

/// List records with optional filtering and sorting.
pub struct ListRecordsTool;

#[async_trait::async_trait]
impl McpTool for ListRecordsTool {
    fn name(&self) -> &'static str {
        "list_records"
    }

    fn description(&self) -> &'static str {
        "List records from a table with optional filtering and sorting"
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "filterByFormula": {
                    "type": "string",
                    "description": "Airtable formula to filter records"
                },
                "maxRecords": {
                    "type": "number",
                    "description": "Maximum number of records to return"
                },
                "sort": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "field": {"type": "string"},
                            "direction": {"type": "string", "enum": ["asc", "desc"]}
                        },
                        "required": ["field"]
                    }
                },
                "view": {"type": "string", "description": "View name or ID to use"}
            }),
            &[],
        )
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<Value> {
        let params: ListRecordsInput = parse_input(input)?;
        require_id("baseId", &params.base_id)?;
        require_id("tableId", &params.table_id)?;

        let options = ListRecordsOptions {
            filter_by_formula: params.filter_by_formula,
            max_records: params.max_records,
            sort: params.sort,
            view: params.view,
        };
        Ok(ctx.client.list_records(&params.base_id, &params.table_id, &options).await?)
    }
}

/// Full-text search over selected fields.
pub struct SearchRecordsTool;

#[async_trait::async_trait]
impl McpTool for SearchRecordsTool {
    fn name(&self) -> &'static str {
        "search_records"
    }

    fn description(&self) -> &'static str {
        "Search for records containing specific text"
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "searchTerm": {"type": "string", "description": "Text to search for"},
                "fieldIds": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Specific field IDs to search in"
                },
                "maxRecords": {
                    "type": "number",
                    "description": "Maximum number of records to return"
                },
                "view": {"type": "string", "description": "View name or ID to use"}
            }),
            &["searchTerm"],
        )
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<Value> {
        let params: SearchRecordsInput = parse_input(input)?;
        require_id("baseId", &params.base_id)?;
        require_id("tableId", &params.table_id)?;
        if params.search_term.is_empty() {
            return Err(ToolError::validation("searchTerm", "search term must not be empty"));
        }

        Ok(ctx
            .client
            .search_records(
                &params.base_id,
                &params.table_id,
                &params.search_term,
                &params.field_ids,
                params.max_records,
                params.view,
            )
            .await?)
    }
}

/// Fetch one record.
pub struct GetRecordTool;

#[async_trait::async_trait]
impl McpTool for GetRecordTool {
    fn name(&self) -> &'static str {
        "get_record"
    }

    fn description(&self) -> &'static str {
        "Get a specific record by ID"
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({"recordId": {"type": "string", "description": "The record ID"}}),
            &["recordId"],
        )
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<Value> {
        let params: GetRecordInput = parse_input(input)?;
        require_id("baseId", &params.base_id)?;
        require_id("tableId", &params.table_id)?;
        require_id("recordId", &params.record_id)?;
        let record = ctx
            .client
            .get_record(&params.base_id, &params.table_id, &params.record_id)
            .await?;
        Ok(record)
    }
}

/// Create one record.
pub struct CreateRecordTool;

#[async_trait::async_trait]
impl McpTool for CreateRecordTool {
    fn name(&self) -> &'static str {
        "create_record"
    }

    fn description(&self) -> &'static str {
        "Create a new record in a table"
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "fields": {"type": "object", "description": "Record fields as key-value pairs"}
            }),
            &["fields"],
        )
    }

    fn access(&self) -> Access {
        Access::Write
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<Value> {
        let params: CreateRecordInput = parse_input(input)?;
        require_id("baseId", &params.base_id)?;
        require_id("tableId", &params.table_id)?;
        let record = ctx
            .client
            .create_record(&params.base_id, &params.table_id, params.fields)
            .await?;
        Ok(record)
    }
}

/// Patch up to 10 records.
pub struct UpdateRecordsTool;

#[async_trait::async_trait]
impl McpTool for UpdateRecordsTool {
    fn name(&self) -> &'static str {
        "update_records"
    }

    fn description(&self) -> &'static str {
        "Update existing records (up to 10 at once)"
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "records": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string", "description": "Record ID"},
                            "fields": {"type": "object", "description": "Fields to update"}
                        },
                        "required": ["id", "fields"]
                    },
                    "maxItems": api::MAX_RECORDS_PER_REQUEST
                }
            }),
            &["records"],
        )
    }

    fn access(&self) -> Access {
        Access::Write
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<Value> {
        let params: UpdateRecordsInput = parse_input(input)?;
        require_id("baseId", &params.base_id)?;
        require_id("tableId", &params.table_id)?;
        check_batch_size("records", params.records.len())?;
        for record in &params.records {
            require_id("records[].id", &record.id)?;
        }
        let records = ctx
            .client
            .update_records_batch(&params.base_id, &params.table_id, &params.records)
            .await?;
        Ok(json!({"records": records}))
    }
}

/// Delete up to 10 records.
pub struct DeleteRecordsTool;

#[async_trait::async_trait]
impl McpTool for DeleteRecordsTool {
    fn name(&self) -> &'static str {
        "delete_records"
    }

    fn description(&self) -> &'static str {
        "Delete records from a table"
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "recordIds": {
                    "type": "array",
                    "items": {"type": "string"},
                    "maxItems": api::MAX_RECORDS_PER_REQUEST,
                    "description": "Array of record IDs to delete"
                }
            }),
            &["recordIds"],
        )
    }

    fn access(&self) -> Access {
        Access::Write
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<Value> {
        let params: DeleteRecordsInput = parse_input(input)?;
        require_id("baseId", &params.base_id)?;
        require_id("tableId", &params.table_id)?;
        check_batch_size("recordIds", params.record_ids.len())?;
        for id in &params.record_ids {
            require_id("recordIds[]", id)?;
        }

        tracing::info!(
            base_id = %params.base_id,
            table_id = %params.table_id,
            count = params.record_ids.len(),
            "Deleting records"
        );
        let records = ctx
            .client
            .delete_records_batch(&params.base_id, &params.table_id, &params.record_ids)
            .await?;
        Ok(json!({"records": records}))
    }
}
