use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::TableDescriptor;

/// A single foreign key edge: `from_table.from_column -> to_table.to_column`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FkEdge {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    /// One column pair of a multi-column foreign key.
    #[serde(default)]
    pub composite: bool,
}

impl FkEdge {
    pub fn is_self_reference(&self) -> bool {
        self.from_table == self.to_table
    }
}

impl std::fmt::Display for FkEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.from_table, self.from_column, self.to_table, self.to_column
        )
    }
}

/// Tables, columns and foreign keys of one Postgres schema.
///
/// Built once per extraction and read-only afterwards. Tables are kept in a
/// `BTreeMap` so every derived view iterates in table-name order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaGraph {
    tables: BTreeMap<String, TableDescriptor>,
}

impl SchemaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. Fails without touching the graph if the name is taken.
    pub fn add_table(&mut self, table: TableDescriptor) -> Result<()> {
        if self.tables.contains_key(&table.name) {
            return Err(Error::DuplicateTable(table.name));
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<&TableDescriptor> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Edges leaving `table`, one per foreign key column, in ordinal order.
    pub fn outgoing(&self, table: &str) -> Result<Vec<FkEdge>> {
        let descriptor = self.table(table)?;
        Ok(descriptor
            .foreign_keys()
            .filter_map(|col| {
                col.references.as_ref().map(|target| FkEdge {
                    from_table: descriptor.name.clone(),
                    from_column: col.name.clone(),
                    to_table: target.table.clone(),
                    to_column: target.column.clone(),
                    composite: target.composite,
                })
            })
            .collect())
    }

    /// Edges pointing at `table` from any table, including itself.
    ///
    /// No table records who references it, so this scans every column.
    pub fn incoming(&self, table: &str) -> Result<Vec<FkEdge>> {
        self.table(table)?;
        let mut edges = Vec::new();
        for source in self.tables.values() {
            for col in source.columns_referencing(table) {
                if let Some(target) = &col.references {
                    edges.push(FkEdge {
                        from_table: source.name.clone(),
                        from_column: col.name.clone(),
                        to_table: target.table.clone(),
                        to_column: target.column.clone(),
                        composite: target.composite,
                    });
                }
            }
        }
        Ok(edges)
    }

    /// Check internal consistency of the graph.
    ///
    /// This checks:
    /// - duplicate column names within a table
    /// - identifying columns exist
    /// - foreign key targets (table and column) exist
    pub fn validate(&self) -> Result<()> {
        for table in self.tables.values() {
            let mut seen = std::collections::BTreeSet::new();
            for column in &table.columns {
                if !seen.insert(column.name.as_str()) {
                    return Err(Error::InvalidSchema(format!(
                        "duplicate column name: {}.{}",
                        table.name, column.name
                    )));
                }
            }

            if let Some(pk) = &table.primary_key {
                if !table.has_column(pk) {
                    return Err(Error::InvalidSchema(format!(
                        "primary key column not found: {}.{}",
                        table.name, pk
                    )));
                }
            }

            for column in table.foreign_keys() {
                let Some(target) = &column.references else {
                    continue;
                };
                let referenced = self.tables.get(&target.table).ok_or_else(|| {
                    Error::InvalidSchema(format!(
                        "referenced table not found: {} (from {}.{})",
                        target.table, table.name, column.name
                    ))
                })?;
                if !referenced.has_column(&target.column) {
                    return Err(Error::InvalidSchema(format!(
                        "referenced column not found: {}.{} (from {}.{})",
                        target.table, target.column, table.name, column.name
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDescriptor;

    fn person() -> TableDescriptor {
        TableDescriptor::new(
            "public",
            "person",
            vec![
                ColumnDescriptor::new(1, "id", "uuid"),
                ColumnDescriptor::new(2, "name", "text"),
            ],
        )
        .with_primary_key("id")
    }

    fn vehicle_graph() -> SchemaGraph {
        let mut graph = SchemaGraph::new();
        graph
            .add_table(TableDescriptor::new(
                "public",
                "manufacturer",
                vec![ColumnDescriptor::new(1, "id", "uuid")],
            ))
            .unwrap();
        graph
            .add_table(TableDescriptor::new(
                "public",
                "model",
                vec![ColumnDescriptor::new(1, "id", "uuid")],
            ))
            .unwrap();
        graph
            .add_table(TableDescriptor::new(
                "public",
                "vehicle",
                vec![
                    ColumnDescriptor::new(1, "id", "uuid"),
                    ColumnDescriptor::new(2, "make", "uuid").references("manufacturer", "id"),
                    ColumnDescriptor::new(3, "model", "uuid").references("model", "id"),
                ],
            ))
            .unwrap();
        graph
    }

    #[test]
    fn duplicate_table_is_rejected_without_mutation() {
        let mut graph = SchemaGraph::new();
        graph.add_table(person()).unwrap();

        let replacement = TableDescriptor::new(
            "public",
            "person",
            vec![ColumnDescriptor::new(1, "other", "text")],
        );
        let err = graph.add_table(replacement).unwrap_err();
        assert!(matches!(err, Error::DuplicateTable(ref name) if name == "person"));

        let stored = graph.table("person").unwrap();
        assert_eq!(stored.columns.len(), 2);
        assert_eq!(stored.columns[0].name, "id");
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn unknown_table_is_an_error() {
        let graph = SchemaGraph::new();
        assert!(matches!(graph.table("nope"), Err(Error::UnknownTable(_))));
        assert!(graph.incoming("nope").is_err());
    }

    #[test]
    fn outgoing_and_incoming_edges() {
        let graph = vehicle_graph();

        let outgoing = graph.outgoing("vehicle").unwrap();
        let targets: Vec<&str> = outgoing.iter().map(|edge| edge.to_table.as_str()).collect();
        assert_eq!(targets, vec!["manufacturer", "model"]);

        let incoming = graph.incoming("manufacturer").unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].from_table, "vehicle");
        assert_eq!(incoming[0].from_column, "make");
        assert!(graph.outgoing("manufacturer").unwrap().is_empty());
    }

    #[test]
    fn validate_reports_dangling_reference() {
        let mut graph = SchemaGraph::new();
        graph
            .add_table(TableDescriptor::new(
                "public",
                "rental",
                vec![
                    ColumnDescriptor::new(1, "id", "uuid"),
                    ColumnDescriptor::new(2, "vehicle_id", "uuid").references("vehicle", "id"),
                ],
            ))
            .unwrap();

        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("referenced table not found: vehicle"));
        assert!(vehicle_graph().validate().is_ok());
    }
}
