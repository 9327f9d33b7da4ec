use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{FkEdge, SchemaGraph};

/// Options for computing an insertion order.
#[derive(Debug, Clone, Default)]
pub struct OrderOptions {
    deferred: BTreeSet<(String, String)>,
}

impl OrderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave the foreign key `table.column` out of ordering.
    ///
    /// Used to break cycles when the target database checks that constraint
    /// at commit time.
    pub fn defer(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.deferred.insert((table.into(), column.into()));
        self
    }

    pub fn is_deferred(&self, edge: &FkEdge) -> bool {
        self.deferred
            .contains(&(edge.from_table.clone(), edge.from_column.clone()))
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }
}

/// Emission order over the populated tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertionOrder {
    /// Table names, every table after the tables it depends on.
    pub tables: Vec<String>,
    /// Edges whose target table holds no extracted rows.
    pub external: Vec<FkEdge>,
    /// Edges excluded from ordering by [`OrderOptions::defer`].
    pub deferred: Vec<FkEdge>,
}

/// Compute a dependency-respecting order for the populated tables.
///
/// Runs Kahn's algorithm over the foreign keys between populated tables.
/// Ready tables are taken by ascending name so the order is deterministic.
/// Self-references do not constrain table order.
pub fn insertion_order(
    graph: &SchemaGraph,
    populated: &BTreeSet<String>,
    options: &OrderOptions,
) -> Result<InsertionOrder> {
    let mut dependencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut external = Vec::new();
    let mut deferred = Vec::new();

    for table in populated {
        let deps = dependencies.entry(table.clone()).or_default();
        for edge in graph.outgoing(table)? {
            if edge.is_self_reference() {
                continue;
            }
            if options.is_deferred(&edge) {
                deferred.push(edge);
            } else if !populated.contains(&edge.to_table) {
                external.push(edge);
            } else {
                deps.insert(edge.to_table.clone());
            }
        }
    }

    let tables = toposort(&dependencies).map_err(Error::CycleDetected)?;

    Ok(InsertionOrder {
        tables,
        external,
        deferred,
    })
}

/// Kahn's algorithm. `dependencies[a]` holds the nodes `a` must follow.
///
/// On failure returns the nodes that could not be placed.
fn toposort(
    dependencies: &BTreeMap<String, BTreeSet<String>>,
) -> std::result::Result<Vec<String>, Vec<String>> {
    let mut dependents: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();

    for (node, deps) in dependencies {
        indegree.insert(node.as_str(), deps.len());
        for dep in deps {
            dependents.entry(dep.as_str()).or_default().insert(node.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(node, _)| *node)
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());

    while let Some(node) = ready.pop_first() {
        order.push(node.to_string());

        if let Some(targets) = dependents.get(node) {
            for target in targets {
                if let Some(count) = indegree.get_mut(target) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(target);
                    }
                }
            }
        }
    }

    if order.len() == dependencies.len() {
        Ok(order)
    } else {
        Err(indegree
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(node, _)| node.to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDescriptor, TableDescriptor};

    fn table(name: &str, fks: &[(&str, &str)]) -> TableDescriptor {
        let mut columns = vec![ColumnDescriptor::new(1, "id", "uuid")];
        for (idx, (column, target)) in fks.iter().enumerate() {
            columns.push(ColumnDescriptor::new(idx as i16 + 2, *column, "uuid").references(*target, "id"));
        }
        TableDescriptor::new("public", name, columns).with_primary_key("id")
    }

    fn graph(tables: Vec<TableDescriptor>) -> SchemaGraph {
        let mut graph = SchemaGraph::new();
        for table in tables {
            graph.add_table(table).unwrap();
        }
        graph
    }

    fn populated(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn dependencies_precede_dependents() {
        let graph = graph(vec![
            table("vehicle", &[("make", "manufacturer"), ("model", "model")]),
            table("manufacturer", &[]),
            table("model", &[]),
        ]);

        let order = insertion_order(
            &graph,
            &populated(&["vehicle", "manufacturer", "model"]),
            &OrderOptions::new(),
        )
        .unwrap();
        assert_eq!(order.tables, vec!["manufacturer", "model", "vehicle"]);
        assert!(order.external.is_empty());
    }

    #[test]
    fn chains_are_resolved_past_a_single_pass() {
        // Name order is the reverse of dependency order.
        let graph = graph(vec![
            table("a", &[("b_id", "b")]),
            table("b", &[("c_id", "c")]),
            table("c", &[("d_id", "d")]),
            table("d", &[]),
        ]);

        let order =
            insertion_order(&graph, &populated(&["a", "b", "c", "d"]), &OrderOptions::new()).unwrap();
        assert_eq!(order.tables, vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn unpopulated_targets_are_reported_as_external() {
        let graph = graph(vec![
            table("rental", &[("vehicle_id", "vehicle"), ("person_id", "person")]),
            table("vehicle", &[]),
            table("person", &[]),
        ]);

        let order =
            insertion_order(&graph, &populated(&["rental", "vehicle"]), &OrderOptions::new()).unwrap();
        assert_eq!(order.tables, vec!["vehicle", "rental"]);
        assert_eq!(order.external.len(), 1);
        assert_eq!(order.external[0].to_table, "person");
    }

    #[test]
    fn self_reference_does_not_block_ordering() {
        let graph = graph(vec![table("employee", &[("manager_id", "employee")])]);
        let order =
            insertion_order(&graph, &populated(&["employee"]), &OrderOptions::new()).unwrap();
        assert_eq!(order.tables, vec!["employee"]);
    }

    #[test]
    fn mutual_references_are_a_cycle() {
        let graph = graph(vec![
            table("person", &[("favourite_vehicle", "vehicle")]),
            table("vehicle", &[("owner", "person")]),
        ]);

        let err = insertion_order(&graph, &populated(&["person", "vehicle"]), &OrderOptions::new())
            .unwrap_err();
        match err {
            Error::CycleDetected(tables) => assert_eq!(tables, vec!["person", "vehicle"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn deferred_edge_breaks_a_cycle() {
        let graph = graph(vec![
            table("person", &[("favourite_vehicle", "vehicle")]),
            table("vehicle", &[("owner", "person")]),
        ]);

        let options = OrderOptions::new().defer("person", "favourite_vehicle");
        let order = insertion_order(&graph, &populated(&["person", "vehicle"]), &options).unwrap();
        assert_eq!(order.tables, vec!["person", "vehicle"]);
        assert_eq!(order.deferred.len(), 1);
        assert_eq!(order.deferred[0].from_column, "favourite_vehicle");
    }

    #[test]
    fn unknown_populated_table_is_an_error() {
        let graph = graph(vec![table("person", &[])]);
        let err =
            insertion_order(&graph, &populated(&["ghost"]), &OrderOptions::new()).unwrap_err();
        assert!(matches!(err, Error::UnknownTable(_)));
    }
}
