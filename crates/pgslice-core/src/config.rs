//! Generator configuration (`pgslice.toml`).
//!
//! The format is TOML. Older `pginspector.yaml` files are not read and
//! must be converted by hand; the keys keep their names.
//!
//! ```toml
//! [schema_config.public]
//! default_primary_key_name = "id"
//! skip_tables = ["migrations"]
//!
//! [schema_config.public.table_config.person]
//! proto_name = "v1.Person"
//! generate_field_mask_update = true
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration, keyed by schema name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub schema_config: BTreeMap<String, SchemaConfig>,
}

/// Settings for one Postgres schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub table_config: BTreeMap<String, TableConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_primary_key_name: Option<String>,
    pub skip_tables: Vec<String>,
}

/// Settings for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proto_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    pub generate_field_mask_update: bool,
}

impl GeneratorConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|err| Error::Config(err.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&input)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| Error::Config(err.to_string()))
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaConfig> {
        self.schema_config.get(name)
    }
}

impl SchemaConfig {
    pub fn should_skip_table(&self, table: &str) -> bool {
        self.skip_tables.iter().any(|skipped| skipped == table)
    }

    /// Settings for `table`, or defaults carrying the schema's default key.
    pub fn table_config(&self, table: &str) -> TableConfig {
        self.table_config
            .get(table)
            .cloned()
            .unwrap_or_else(|| TableConfig {
                primary_key: self.default_primary_key_name.clone(),
                ..TableConfig::default()
            })
    }

    /// Identifying column of `table`: its own setting, else the schema default.
    pub fn primary_key_for(&self, table: &str) -> Option<String> {
        self.table_config(table)
            .primary_key
            .filter(|pk| !pk.is_empty())
            .or_else(|| {
                self.default_primary_key_name
                    .clone()
                    .filter(|pk| !pk.is_empty())
            })
    }

    /// Primary keys set explicitly on individual tables.
    pub fn primary_keys(&self) -> BTreeMap<String, String> {
        self.table_config
            .iter()
            .filter_map(|(table, config)| {
                config
                    .primary_key
                    .clone()
                    .filter(|pk| !pk.is_empty())
                    .map(|pk| (table.clone(), pk))
            })
            .collect()
    }
}
