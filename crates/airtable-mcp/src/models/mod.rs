//! Data models for Airtable entities and tool inputs.
//!
//! Inputs use `#[serde(rename_all = "camelCase")]` to match the argument
//! names in the tool schemas; Airtable payloads pass through as JSON.

mod airtable;
mod inputs;

pub use airtable::{
    DetailLevel, FIELD_TYPES, FieldDefinition, ListRecordsOptions, MetadataUpdate, RecordUpdate,
    SortDirection, SortSpec, is_valid_field_type, search_formula,
};
pub use inputs::*;
