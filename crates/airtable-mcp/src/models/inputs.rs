//! Input models for MCP tool parameters.
//!
//! Field names follow the camelCase argument names advertised in each
//! tool's input schema.

use serde::{Deserialize, Serialize};

use super::{DetailLevel, FieldDefinition, RecordUpdate, SortSpec};

/// Input for `list_tables`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTablesInput {
    /// Base ID (e.g., "appXXXXXXXXXXXXXX").
    pub base_id: String,

    /// Level of detail to return.
    #[serde(default)]
    pub detail_level: DetailLevel,
}

/// Input for `describe_table`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeTableInput {
    pub base_id: String,
    pub table_id: String,
    #[serde(default)]
    pub detail_level: DetailLevel,
}

/// Input for `list_records`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecordsInput {
    pub base_id: String,
    pub table_id: String,

    /// Airtable formula to filter records.
    #[serde(default)]
    pub filter_by_formula: Option<String>,

    /// Maximum number of records to return.
    #[serde(default)]
    pub max_records: Option<u32>,

    #[serde(default)]
    pub sort: Vec<SortSpec>,

    /// View name or ID.
    #[serde(default)]
    pub view: Option<String>,
}

/// Input for `search_records`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRecordsInput {
    pub base_id: String,
    pub table_id: String,

    /// Text to search for.
    pub search_term: String,

    /// Fields to search in; the record ID when empty.
    #[serde(default)]
    pub field_ids: Vec<String>,

    #[serde(default)]
    pub max_records: Option<u32>,

    #[serde(default)]
    pub view: Option<String>,
}

/// Input for `get_record`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRecordInput {
    pub base_id: String,
    pub table_id: String,
    pub record_id: String,
}

/// Input for `create_record`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordInput {
    pub base_id: String,
    pub table_id: String,

    /// Record fields as key-value pairs.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Input for `update_records`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordsInput {
    pub base_id: String,
    pub table_id: String,

    /// Up to 10 record patches.
    pub records: Vec<RecordUpdate>,
}

/// Input for `delete_records`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRecordsInput {
    pub base_id: String,
    pub table_id: String,

    /// Up to 10 record IDs.
    pub record_ids: Vec<String>,
}

/// Input for `create_table`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTableInput {
    pub base_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub fields: Vec<FieldDefinition>,
}

/// Input for `update_table`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTableInput {
    pub base_id: String,
    pub table_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Input for `create_field`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFieldInput {
    pub base_id: String,
    pub table_id: String,
    pub field: FieldDefinition,
}

/// Input for `update_field`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFieldInput {
    pub base_id: String,
    pub table_id: String,
    pub field_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
