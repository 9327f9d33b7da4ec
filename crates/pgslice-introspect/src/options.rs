use std::collections::BTreeMap;

use pgslice_core::SchemaConfig;

/// Options that control how introspection behaves.
#[derive(Debug, Clone)]
pub struct IntrospectOptions {
    pub schema: String,
    /// Tables left out of the graph. Foreign keys pointing at them are dropped.
    pub skip_tables: Vec<String>,
    /// Identifying column for tables without a usable catalog primary key.
    pub default_primary_key: Option<String>,
    /// Per-table identifying columns; these win over the catalog.
    pub primary_keys: BTreeMap<String, String>,
}

impl Default for IntrospectOptions {
    fn default() -> Self {
        Self::for_schema("public")
    }
}

impl IntrospectOptions {
    pub fn for_schema(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            skip_tables: Vec::new(),
            default_primary_key: None,
            primary_keys: BTreeMap::new(),
        }
    }

    /// Options for `schema` taken from its generator configuration.
    pub fn from_schema_config(schema: impl Into<String>, config: &SchemaConfig) -> Self {
        Self {
            schema: schema.into(),
            skip_tables: config.skip_tables.clone(),
            default_primary_key: config.default_primary_key_name.clone(),
            primary_keys: config.primary_keys(),
        }
    }

    pub fn is_skipped(&self, table: &str) -> bool {
        self.skip_tables.iter().any(|skipped| skipped == table)
    }
}

#[cfg(test)]
mod tests {
    use pgslice_core::GeneratorConfig;

    use super::*;

    #[test]
    fn options_follow_schema_config() {
        let config = GeneratorConfig::from_toml_str(
            r#"
[schema_config.fleet]
default_primary_key_name = "id"
skip_tables = ["migrations"]

[schema_config.fleet.table_config.model]
primary_key = "model_id"
"#,
        )
        .unwrap();

        let opts = IntrospectOptions::from_schema_config("fleet", config.schema("fleet").unwrap());
        assert_eq!(opts.schema, "fleet");
        assert!(opts.is_skipped("migrations"));
        assert_eq!(opts.default_primary_key.as_deref(), Some("id"));
        assert_eq!(opts.primary_keys.get("model").map(String::as_str), Some("model_id"));
    }
}
