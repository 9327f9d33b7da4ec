use std::collections::{BTreeMap, BTreeSet};

use pgslice_core::{ColumnDescriptor, ForeignKeyRef, Result, SchemaGraph, TableDescriptor};

use crate::options::IntrospectOptions;

use super::queries::{RawColumn, RawForeignKey, RawPrimaryKey, RawTable};

/// Catalog rows for one schema, as returned by the queries module.
#[derive(Debug, Default)]
pub struct RawSchema {
    pub tables: Vec<RawTable>,
    pub columns: Vec<RawColumn>,
    pub primary_keys: Vec<RawPrimaryKey>,
    pub foreign_keys: Vec<RawForeignKey>,
}

/// Turn raw catalog rows into a validated graph.
///
/// Composite foreign keys become one edge per column pair, flagged as
/// composite so traversal can report them. A column taking
/// part in several foreign keys keeps the first by constraint name. Keys
/// into other schemas or skipped tables are dropped.
pub fn build_graph(raw: RawSchema, opts: &IntrospectOptions) -> Result<SchemaGraph> {
    let kept: BTreeSet<String> = raw
        .tables
        .into_iter()
        .map(|table| table.name)
        .filter(|name| !opts.is_skipped(name))
        .collect();

    let mut columns: BTreeMap<String, Vec<ColumnDescriptor>> =
        kept.iter().map(|name| (name.clone(), Vec::new())).collect();
    for col in raw.columns {
        let Some(table_columns) = columns.get_mut(&col.table_name) else {
            continue;
        };
        let mut descriptor = ColumnDescriptor::new(col.ordinal_position, col.name, col.data_type);
        descriptor.is_nullable = col.is_nullable;
        descriptor.default = col.default;
        table_columns.push(descriptor);
    }

    let mut foreign_keys = raw.foreign_keys;
    foreign_keys.sort_by(|left, right| {
        left.table_name
            .cmp(&right.table_name)
            .then_with(|| left.name.cmp(&right.name))
    });
    for fk in foreign_keys {
        if fk.referenced_schema != opts.schema || !kept.contains(&fk.referenced_table) {
            continue;
        }
        let Some(table_columns) = columns.get_mut(&fk.table_name) else {
            continue;
        };
        for (from, to) in fk.columns.iter().zip(fk.referenced_columns.iter()) {
            if let Some(column) = table_columns
                .iter_mut()
                .find(|col| &col.name == from && col.references.is_none())
            {
                column.references = Some(ForeignKeyRef {
                    table: fk.referenced_table.clone(),
                    column: to.clone(),
                    composite: fk.columns.len() > 1,
                });
            }
        }
    }

    let catalog_keys: BTreeMap<String, Vec<String>> = raw
        .primary_keys
        .into_iter()
        .map(|pk| (pk.table_name, pk.columns))
        .collect();

    let mut graph = SchemaGraph::new();
    for (name, table_columns) in columns {
        let primary_key = identifying_column(&name, &table_columns, &catalog_keys, opts);
        let mut table = TableDescriptor::new(opts.schema.clone(), name, table_columns);
        if let Some(pk) = primary_key {
            table = table.with_primary_key(pk);
        }
        graph.add_table(table)?;
    }

    graph.validate()?;
    Ok(graph)
}

/// Configured key, then a single-column catalog key, then the default name
/// when the table has such a column.
fn identifying_column(
    table: &str,
    columns: &[ColumnDescriptor],
    catalog_keys: &BTreeMap<String, Vec<String>>,
    opts: &IntrospectOptions,
) -> Option<String> {
    if let Some(pk) = opts.primary_keys.get(table) {
        return Some(pk.clone());
    }
    if let Some([single]) = catalog_keys.get(table).map(Vec::as_slice) {
        return Some(single.clone());
    }
    opts.default_primary_key
        .as_ref()
        .filter(|pk| columns.iter().any(|col| &col.name == *pk))
        .cloned()
}

#[cfg(test)]
mod tests {
    use pgslice_core::Error;

    use super::*;

    fn column(table: &str, ordinal: i16, name: &str, data_type: &str) -> RawColumn {
        RawColumn {
            table_name: table.to_string(),
            ordinal_position: ordinal,
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            default: None,
        }
    }

    fn fk(name: &str, table: &str, columns: &[&str], target: &str, targets: &[&str]) -> RawForeignKey {
        RawForeignKey {
            name: name.to_string(),
            table_name: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced_schema: "public".to_string(),
            referenced_table: target.to_string(),
            referenced_columns: targets.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn table(name: &str) -> RawTable {
        RawTable {
            name: name.to_string(),
        }
    }

    fn vehicle_schema() -> RawSchema {
        RawSchema {
            tables: vec![table("manufacturer"), table("migrations"), table("vehicle")],
            columns: vec![
                column("manufacturer", 1, "id", "uuid"),
                column("migrations", 1, "version", "integer"),
                column("vehicle", 3, "registered_at", "timestamp with time zone"),
                column("vehicle", 1, "id", "uuid"),
                column("vehicle", 2, "make", "uuid"),
            ],
            primary_keys: vec![RawPrimaryKey {
                table_name: "vehicle".to_string(),
                columns: vec!["id".to_string()],
            }],
            foreign_keys: vec![fk("vehicle_make_fkey", "vehicle", &["make"], "manufacturer", &["id"])],
        }
    }

    #[test]
    fn maps_tables_columns_and_foreign_keys() {
        let graph = build_graph(vehicle_schema(), &IntrospectOptions::default()).unwrap();
        assert_eq!(graph.len(), 3);

        let vehicle = graph.table("vehicle").unwrap();
        let names: Vec<&str> = vehicle.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "make", "registered_at"]);
        assert_eq!(vehicle.primary_key.as_deref(), Some("id"));

        let edges = graph.incoming("manufacturer").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from_column, "make");
    }

    #[test]
    fn skipped_tables_are_left_out() {
        let mut opts = IntrospectOptions::default();
        opts.skip_tables = vec!["migrations".to_string(), "manufacturer".to_string()];
        let graph = build_graph(vehicle_schema(), &opts).unwrap();

        assert!(!graph.contains("migrations"));
        assert!(!graph.contains("manufacturer"));
        let vehicle = graph.table("vehicle").unwrap();
        assert!(vehicle.foreign_keys().next().is_none());
    }

    #[test]
    fn primary_key_resolution_order() {
        let mut opts = IntrospectOptions::default();
        opts.default_primary_key = Some("id".to_string());
        opts.primary_keys.insert("migrations".to_string(), "version".to_string());
        let graph = build_graph(vehicle_schema(), &opts).unwrap();

        assert_eq!(graph.table("manufacturer").unwrap().primary_key.as_deref(), Some("id"));
        assert_eq!(graph.table("migrations").unwrap().primary_key.as_deref(), Some("version"));
    }

    #[test]
    fn composite_foreign_keys_map_pairwise() {
        let raw = RawSchema {
            tables: vec![table("shipment"), table("warehouse_bin")],
            columns: vec![
                column("warehouse_bin", 1, "warehouse", "integer"),
                column("warehouse_bin", 2, "bin", "integer"),
                column("shipment", 1, "id", "integer"),
                column("shipment", 2, "bin_no", "integer"),
                column("shipment", 3, "warehouse_no", "integer"),
            ],
            primary_keys: vec![RawPrimaryKey {
                table_name: "warehouse_bin".to_string(),
                columns: vec!["warehouse".to_string(), "bin".to_string()],
            }],
            foreign_keys: vec![fk(
                "shipment_bin_fkey",
                "shipment",
                &["warehouse_no", "bin_no"],
                "warehouse_bin",
                &["warehouse", "bin"],
            )],
        };

        let graph = build_graph(raw, &IntrospectOptions::default()).unwrap();
        let edges = graph.outgoing("shipment").unwrap();
        let pairs: Vec<(&str, &str)> = edges
            .iter()
            .map(|e| (e.from_column.as_str(), e.to_column.as_str()))
            .collect();
        assert_eq!(pairs, vec![("bin_no", "bin"), ("warehouse_no", "warehouse")]);
        assert!(edges.iter().all(|edge| edge.composite));
        assert_eq!(graph.table("warehouse_bin").unwrap().primary_key, None);
    }

    #[test]
    fn unknown_configured_key_fails_validation() {
        let mut opts = IntrospectOptions::default();
        opts.primary_keys.insert("vehicle".to_string(), "vin".to_string());
        let err = build_graph(vehicle_schema(), &opts).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }
}
