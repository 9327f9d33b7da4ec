//! pggen query file generation.
//!
//! For every table of a configured schema this renders a get-by-id, a list
//! and an update query, plus a field-mask update when the table asks for one.

use std::collections::BTreeMap;
use std::fmt::Write;

use convert_case::{Case, Casing};

use crate::config::{GeneratorConfig, SchemaConfig, TableConfig};
use crate::error::{Error, Result};
use crate::graph::SchemaGraph;
use crate::schema::TableDescriptor;

pub const GENERATED_HEADER: &str = "-- File generated by pgslice. DO NOT EDIT.\n\n";

const INDENT: &str = "\n        ";

/// `vehicle_model` -> `VehicleModel`.
pub fn to_camel(name: &str) -> String {
    name.to_case(Case::Pascal)
}

/// Render the query file for every configured schema.
///
/// `graphs` maps schema names to their introspected graphs; schemas are
/// rendered in name order.
pub fn render_queries(
    config: &GeneratorConfig,
    graphs: &BTreeMap<String, SchemaGraph>,
) -> Result<String> {
    let mut out = String::from(GENERATED_HEADER);
    for (schema_name, schema_config) in &config.schema_config {
        let graph = graphs
            .get(schema_name)
            .ok_or_else(|| Error::Config(format!("schema not inspected: {schema_name}")))?;
        out.push_str(&render_schema_queries(graph, schema_config)?);
    }
    Ok(out)
}

/// Render the queries of one schema, tables in name order.
pub fn render_schema_queries(graph: &SchemaGraph, config: &SchemaConfig) -> Result<String> {
    let mut tables = Vec::new();
    for table in graph.tables() {
        if config.should_skip_table(&table.name) {
            continue;
        }
        let mut table_config = config.table_config(&table.name);
        table_config.primary_key = config.primary_key_for(&table.name);
        if table_config.primary_key.is_none() {
            return Err(Error::Config(format!(
                "no primary key specified for table {} and no default primary key set",
                table.qualified_name()
            )));
        }
        tables.push((table, table_config));
    }

    let mut out = String::new();
    for (table, table_config) in &tables {
        render_select(&mut out, table, table_config);
    }
    for (table, table_config) in &tables {
        render_update(&mut out, table, table_config);
    }
    Ok(out)
}

/// Starter configuration for a schema, as printed by `inspect`.
pub fn starter_config(schema: &str, graph: &SchemaGraph) -> GeneratorConfig {
    let table_config = graph
        .tables()
        .map(|table| {
            (
                table.name.clone(),
                TableConfig {
                    proto_name: Some(format!("foo.v1.{}", to_camel(&table.name))),
                    primary_key: Some("id".to_string()),
                    generate_field_mask_update: true,
                },
            )
        })
        .collect();

    let mut schema_config = BTreeMap::new();
    schema_config.insert(
        schema.to_string(),
        SchemaConfig {
            table_config,
            default_primary_key_name: Some("id".to_string()),
            skip_tables: Vec::new(),
        },
    );
    GeneratorConfig { schema_config }
}

fn query_name(out: &mut String, name: &str, kind: &str, config: &TableConfig) {
    let _ = write!(out, "-- name: {name} {kind}");
    if let Some(proto) = config.proto_name.as_deref().filter(|p| !p.is_empty()) {
        let _ = write!(out, " proto-type={proto}");
    }
    out.push('\n');
}

fn column_list(table: &TableDescriptor, render: impl Fn(&str) -> String) -> String {
    table
        .columns
        .iter()
        .map(|col| format!("{INDENT}{}", render(&col.name)))
        .collect::<Vec<_>>()
        .join(",")
}

fn render_select(out: &mut String, table: &TableDescriptor, config: &TableConfig) {
    let camel = to_camel(&table.name);
    let pk = config.primary_key.as_deref().unwrap_or_default();
    let columns = column_list(table, str::to_string);

    out.push_str("\n\n");
    query_name(out, &format!("Select{camel}ByID"), ":one", config);
    let _ = write!(
        out,
        "SELECT{columns}\nFROM {}.{}\nWHERE {pk} = pggen.arg('{pk}');\n\n",
        table.schema, table.name
    );
    query_name(out, &format!("Select{camel}List"), ":many", config);
    let _ = write!(out, "SELECT{columns}\nFROM {}.{};", table.schema, table.name);
}

fn render_update(out: &mut String, table: &TableDescriptor, config: &TableConfig) {
    let camel = to_camel(&table.name);
    let pk = config.primary_key.as_deref().unwrap_or_default();
    let columns = column_list(table, str::to_string);

    out.push_str("\n\n");
    query_name(out, &format!("Update{camel}"), ":one", config);
    let args = column_list(table, |col| format!("pggen.arg('{col}')"));
    let _ = write!(
        out,
        "UPDATE {}.{}\nSET ({columns}\n) = ({args}\n) WHERE {pk} = pggen.arg('{pk}') RETURNING *;",
        table.schema, table.name
    );

    if config.generate_field_mask_update {
        out.push('\n');
        query_name(out, &format!("Update{camel}FieldMask"), ":one", config);
        let masked = column_list(table, |col| {
            format!(
                "CASE{INDENT}\tWHEN '{col}' = ANY(pggen.arg('_field_mask')::text[]) THEN pggen.arg('{col}'){INDENT}\tELSE {col}{INDENT}END"
            )
        });
        let _ = write!(
            out,
            "UPDATE {}.{}\nSET ({columns}\n) = ({masked}\n) WHERE {pk} = pggen.arg('{pk}') RETURNING *;",
            table.schema, table.name
        );
    }
}
