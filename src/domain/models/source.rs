//! Source Domain Model
//!
//! Where the rows of an export come from.

/// Source configuration after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub table_name: Option<String>,
    pub feature_dataset: Option<String>,
    pub schema: String,
    pub is_simple: bool,
    /// Custom query, already checked to be a single SELECT
    pub sql_query: Option<String>,
    pub fields_to_exclude: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            table_name: None,
            feature_dataset: None,
            schema: "dbo".to_string(),
            is_simple: false,
            sql_query: None,
            fields_to_exclude: Vec::new(),
        }
    }
}

impl SourceConfig {
    /// Qualified `schema.table` name for simple sources
    #[must_use]
    pub fn qualified_table(&self) -> Option<String> {
        self.table_name
            .as_ref()
            .map(|table| format!("{}.{}", self.schema, table))
    }
}
