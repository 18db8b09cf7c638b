//! Airtable value types shared by the client and the tools.

use serde::{Deserialize, Serialize};

/// Field types Airtable accepts when creating a field.
pub const FIELD_TYPES: &[&str] = &[
    "singleLineText",
    "multilineText",
    "email",
    "url",
    "phoneNumber",
    "number",
    "currency",
    "percent",
    "duration",
    "rating",
    "singleSelect",
    "multipleSelects",
    "checkbox",
    "date",
    "dateTime",
    "multipleAttachments",
    "autoNumber",
    "barcode",
    "formula",
    "lookup",
    "count",
    "rollup",
    "multipleRecordLinks",
    "singleCollaborator",
    "multipleCollaborators",
    "lastModifiedTime",
    "lastModifiedBy",
    "createdTime",
    "createdBy",
    "richText",
    "aiText",
];

/// Check a field type against [`FIELD_TYPES`].
#[must_use]
pub fn is_valid_field_type(field_type: &str) -> bool {
    FIELD_TYPES.contains(&field_type)
}

/// How much table metadata the schema endpoints return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DetailLevel {
    TableIdentifiersOnly,
    IdentifiersOnly,
    #[default]
    Full,
}

impl DetailLevel {
    /// Query value for `detailLevel`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TableIdentifiersOnly => "tableIdentifiersOnly",
            Self::IdentifiersOnly => "identifiersOnly",
            Self::Full => "full",
        }
    }
}

/// Sort direction for record listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<SortDirection>,
}

/// A record patch: id plus the fields to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdate {
    pub id: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// A field definition used by `create_table` and `create_field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// Name/description patch for tables and fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MetadataUpdate {
    /// Build a patch, dropping empty strings. `None` when nothing is left.
    #[must_use]
    pub fn new(name: Option<String>, description: Option<String>) -> Option<Self> {
        let name = name.filter(|n| !n.is_empty());
        let description = description.filter(|d| !d.is_empty());
        if name.is_none() && description.is_none() {
            return None;
        }
        Some(Self { name, description })
    }
}

/// Options for a record listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRecordsOptions {
    pub filter_by_formula: Option<String>,
    pub max_records: Option<u32>,
    pub sort: Vec<SortSpec>,
    pub view: Option<String>,
}

impl ListRecordsOptions {
    /// Query pairs in Airtable's bracketed form (`sort[0][field]=...`).
    #[must_use]
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(formula) = self.filter_by_formula.as_deref().filter(|f| !f.is_empty()) {
            params.push(("filterByFormula".to_string(), formula.to_string()));
        }
        if let Some(max) = self.max_records {
            params.push(("maxRecords".to_string(), max.to_string()));
        }
        if let Some(view) = self.view.as_deref().filter(|v| !v.is_empty()) {
            params.push(("view".to_string(), view.to_string()));
        }
        for (i, sort) in self.sort.iter().enumerate() {
            params.push((format!("sort[{i}][field]"), sort.field.clone()));
            if let Some(direction) = sort.direction {
                params.push((format!("sort[{i}][direction]"), direction.as_str().to_string()));
            }
        }
        params
    }
}

/// Formula matching records whose fields contain `term`.
///
/// With no fields the search runs over `RECORD_ID()`. Quotes and
/// backslashes in the term are escaped.
#[must_use]
pub fn search_formula(term: &str, field_ids: &[String]) -> String {
    let escaped = term.replace('\\', "\\\\").replace('"', "\\\"");
    let haystack = if field_ids.is_empty() {
        "RECORD_ID()".to_string()
    } else {
        field_ids.iter().map(|f| format!("{{{f}}}")).collect::<Vec<_>>().join(", ")
    };
    format!("SEARCH(\"{escaped}\", CONCATENATE({haystack})) != \"\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_types() {
        assert!(is_valid_field_type("singleLineText"));
        assert!(is_valid_field_type("aiText"));
        assert!(!is_valid_field_type("text"));
    }

    #[test]
    fn test_detail_level_serde() {
        let level: DetailLevel = serde_json::from_str("\"tableIdentifiersOnly\"").unwrap();
        assert_eq!(level, DetailLevel::TableIdentifiersOnly);
        assert_eq!(DetailLevel::default().as_str(), "full");
    }

    #[test]
    fn test_list_options_query() {
        let options = ListRecordsOptions {
            filter_by_formula: Some("{Status} = 'Done'".into()),
            max_records: Some(5),
            sort: vec![
                SortSpec { field: "Name".into(), direction: None },
                SortSpec { field: "Due".into(), direction: Some(SortDirection::Desc) },
            ],
            view: None,
        };
        let query = options.to_query();
        assert!(query.contains(&("maxRecords".into(), "5".into())));
        assert!(query.contains(&("sort[0][field]".into(), "Name".into())));
        assert!(query.contains(&("sort[1][direction]".into(), "desc".into())));
        assert!(!query.iter().any(|(k, _)| k == "sort[0][direction]"));
    }

    #[test]
    fn test_search_formula_escapes_quotes() {
        let formula = search_formula(r#"say "hi""#, &[]);
        assert_eq!(formula, r#"SEARCH("say \"hi\"", CONCATENATE(RECORD_ID())) != """#);

        let formula = search_formula("acme", &["Name".into(), "Notes".into()]);
        assert_eq!(formula, r#"SEARCH("acme", CONCATENATE({Name}, {Notes})) != """#);
    }

    #[test]
    fn test_metadata_update_requires_something() {
        assert!(MetadataUpdate::new(None, Some(String::new())).is_none());
        let update = MetadataUpdate::new(Some("Tasks".into()), None).unwrap();
        assert_eq!(serde_json::to_value(update).unwrap(), serde_json::json!({"name": "Tasks"}));
    }
}
