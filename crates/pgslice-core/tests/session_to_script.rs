use std::collections::BTreeMap;

use pgslice_core::{
    ColumnDescriptor, ExtractionSession, GeneratorConfig, OrderOptions, RawRow, RawValue,
    SchemaGraph, ScriptOptions, TableDescriptor, build_statements, decode_row, insertion_order,
    render_queries, render_script,
};

fn rental_graph() -> SchemaGraph {
    let mut graph = SchemaGraph::new();
    graph
        .add_table(
            TableDescriptor::new(
                "fleet",
                "person",
                vec![
                    ColumnDescriptor::new(1, "id", "integer").not_null(),
                    ColumnDescriptor::new(2, "name", "text"),
                ],
            )
            .with_primary_key("id"),
        )
        .unwrap();
    graph
        .add_table(
            TableDescriptor::new(
                "fleet",
                "rental",
                vec![
                    ColumnDescriptor::new(1, "id", "bigint").not_null(),
                    ColumnDescriptor::new(2, "person_id", "integer").references("person", "id"),
                    ColumnDescriptor::new(3, "price", "numeric(10,2)"),
                ],
            )
            .with_primary_key("id"),
        )
        .unwrap();
    graph.validate().unwrap();
    graph
}

#[test]
fn decoded_rows_render_in_dependency_order() {
    let graph = rental_graph();
    let mut session = ExtractionSession::new();

    let rental = RawRow::new()
        .with("id", RawValue::Int(100))
        .with("person_id", RawValue::Int(1))
        .with("price", RawValue::Text("19.90".to_string()));
    let person = RawRow::new()
        .with("id", RawValue::Int(1))
        .with("name", RawValue::Text("Ada O'Hara".to_string()));

    let (row, fallbacks) = decode_row(graph.table("rental").unwrap(), &rental).unwrap();
    assert_eq!(fallbacks, vec!["price".to_string()]);
    assert!(session.record_row(row.clone()));
    assert!(!session.record_row(row));

    let (row, fallbacks) = decode_row(graph.table("person").unwrap(), &person).unwrap();
    assert!(fallbacks.is_empty());
    assert!(session.record_row(row));

    let order = insertion_order(&graph, &session.populated_tables(), &OrderOptions::new()).unwrap();
    assert_eq!(order.tables, vec!["person", "rental"]);

    let statements = build_statements(&graph, &order, &session).unwrap();
    let script = render_script(
        &statements,
        ScriptOptions {
            transaction: true,
            defer_constraints: false,
        },
    );

    assert_eq!(
        script,
        "BEGIN;\n\
INSERT\nINTO \"fleet\".\"person\"(\"id\",\"name\")\nVALUES\n(1, 'Ada O''Hara')\n;\n\
INSERT\nINTO \"fleet\".\"rental\"(\"id\",\"person_id\",\"price\")\nVALUES\n(100, 1, '19.90')\n;\n\
COMMIT;\n"
    );
}

#[test]
fn queries_cover_every_configured_schema() {
    let config = GeneratorConfig::from_toml_str(
        r#"
[schema_config.fleet]
default_primary_key_name = "id"
skip_tables = ["rental"]

[schema_config.fleet.table_config.person]
proto_name = "fleet.v1.Person"
"#,
    )
    .unwrap();

    let mut graphs = BTreeMap::new();
    graphs.insert("fleet".to_string(), rental_graph());

    let queries = render_queries(&config, &graphs).unwrap();
    assert!(queries.starts_with("-- File generated by pgslice. DO NOT EDIT."));
    assert!(queries.contains("SelectPersonByID"));
    assert!(!queries.contains("Rental"));

    graphs.clear();
    assert!(render_queries(&config, &graphs).is_err());
}
