//! Seeds in, script out.
//!
//! Shared by the command line and the WASM entry point: traverse every seed,
//! drop constant tables, settle which key columns are sequence-fed, then
//! assemble the script.

use crate::allocate::{GeneratorMap, generator_candidates};
use crate::assemble::{ScriptRequest, assemble_script};
use crate::error::Result;
use crate::merge::without_tables;
use crate::model::TraversalResult;
use crate::overlay::RelationOverlay;
use crate::provider::MetadataProvider;
use crate::traversal::Traverser;
use crate::tree::render_tree;

#[derive(Debug, Clone, Default)]
pub struct MergeRequest<'a> {
    pub root_table: &'a str,
    /// Column the seeds are matched against; the primary key when `None`.
    pub lookup_column: Option<&'a str>,
    pub seeds: &'a [String],
    pub name_column: Option<&'a str>,
    pub test_suffix: Option<&'a str>,
    pub include_update: bool,
    /// Explicit `(table, column) -> sequence` mappings.
    pub generators: GeneratorMap,
    /// Mappings found in the source (e.g. insert triggers). Only applied to
    /// generator candidates without an explicit mapping.
    pub detected: GeneratorMap,
    /// Tables whose rows already exist in the target.
    pub constant_tables: &'a [String],
    pub generated_at: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub script: String,
    pub tree: String,
    pub result: TraversalResult,
    /// Mappings the script was generated with.
    pub generators: GeneratorMap,
}

pub fn run<P: MetadataProvider + ?Sized>(
    provider: &P,
    overlay: Option<&mut dyn RelationOverlay>,
    request: &MergeRequest<'_>,
) -> Result<MergeOutput> {
    let mut traverser = Traverser::new(provider);
    if let Some(overlay) = overlay {
        traverser = traverser.with_overlay(overlay);
    }
    let result = traverser.traverse_all(request.root_table, request.lookup_column, request.seeds)?;
    let tree = render_tree(&result.root);
    let result = without_tables(result, request.constant_tables);

    let generators = resolve_generators(&result, &request.generators, &request.detected);
    let root_table = request.root_table.trim().to_uppercase();

    let script = assemble_script(&ScriptRequest {
        rows: &result.rows,
        table_counts: &result.table_counts,
        root_table: &root_table,
        seeds: request.seeds,
        name_column: request.name_column,
        test_suffix: request.test_suffix,
        fk_relations: &result.fk_relations,
        generators: &generators,
        include_update: request.include_update,
        generated_at: request.generated_at,
    });

    Ok(MergeOutput {
        script,
        tree,
        result,
        generators,
    })
}

fn resolve_generators(
    result: &TraversalResult,
    explicit: &GeneratorMap,
    detected: &GeneratorMap,
) -> GeneratorMap {
    let mut generators = explicit.clone();
    if detected.is_empty() {
        return generators;
    }
    for candidate in generator_candidates(result) {
        if generators.contains(&candidate) {
            continue;
        }
        if let Some(sequence) = detected.get(&candidate.table, &candidate.column) {
            tracing::info!(column = %candidate, sequence, "using sequence from insert trigger");
            generators.insert(&candidate.table, &candidate.column, sequence);
        }
    }
    generators
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::error::Error;
    use crate::overlay::MemoryOverlay;

    const DUMP: &str = r#"
        CREATE TABLE country (code VARCHAR2(2) PRIMARY KEY, name VARCHAR2(40));
        CREATE TABLE orders (
            order_id NUMBER PRIMARY KEY,
            order_no VARCHAR2(20)
        );
        CREATE TABLE order_line (
            line_id NUMBER PRIMARY KEY,
            order_id NUMBER REFERENCES orders(order_id),
            country VARCHAR2(2)
        );
        INSERT INTO country VALUES ('DE', 'Germany');
        INSERT INTO orders VALUES (42, 'ORD-42');
        INSERT INTO order_line VALUES (100, 42, 'DE');

        CREATE OR REPLACE TRIGGER orders_bi BEFORE INSERT ON orders FOR EACH ROW
        BEGIN
          :new.order_id := orders_seq.nextval;
        END;
        /
    "#;

    fn seeds(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_run_flat_script() {
        let catalog = Catalog::from_sql(DUMP).unwrap();
        let seeds = seeds(&["42"]);
        let output = run(
            &catalog,
            None,
            &MergeRequest {
                root_table: "orders",
                seeds: &seeds,
                include_update: true,
                ..MergeRequest::default()
            },
        )
        .unwrap();

        assert!(output.script.starts_with("-- ===="));
        assert!(output.script.contains("-- Root table: ORDERS"));
        assert!(output.script.contains("MERGE INTO ORDER_LINE tgt"));
        assert!(!output.script.contains("DECLARE"));
        assert!(output.tree.starts_with("ORDERS"));
        assert!(output.generators.is_empty());
    }

    #[test]
    fn test_detected_sequence_feeds_scoped_script() {
        let catalog = Catalog::from_sql(DUMP).unwrap();
        let seeds = seeds(&["42"]);
        let output = run(
            &catalog,
            None,
            &MergeRequest {
                root_table: "ORDERS",
                seeds: &seeds,
                detected: catalog.detected_generators(),
                ..MergeRequest::default()
            },
        )
        .unwrap();

        assert_eq!(output.generators.get("ORDERS", "ORDER_ID"), Some("ORDERS_SEQ"));
        assert!(output.script.contains("  v_ORDER_ID_1 NUMBER;"));
        assert!(output.script.contains("SELECT ORDERS_SEQ.NEXTVAL INTO v_ORDER_ID_1 FROM DUAL;"));
        assert!(output.script.contains("v_ORDER_ID_1 AS ORDER_ID"));
    }

    #[test]
    fn test_explicit_mapping_wins_over_detected() {
        let catalog = Catalog::from_sql(DUMP).unwrap();
        let seeds = seeds(&["42"]);
        let mut explicit = GeneratorMap::new();
        explicit.insert("ORDERS", "ORDER_ID", "MY_SEQ");
        let output = run(
            &catalog,
            None,
            &MergeRequest {
                root_table: "ORDERS",
                seeds: &seeds,
                generators: explicit,
                detected: catalog.detected_generators(),
                ..MergeRequest::default()
            },
        )
        .unwrap();
        assert_eq!(output.generators.get("ORDERS", "ORDER_ID"), Some("MY_SEQ"));
    }

    #[test]
    fn test_constant_tables_left_out() {
        let catalog = Catalog::from_sql(DUMP).unwrap();
        let seeds = seeds(&["DE"]);
        let constant = vec!["ORDER_LINE".to_string()];
        let mut overlay = MemoryOverlay::new(vec![crate::model::ForeignKeyRelation::new(
            "ORDER_LINE",
            "COUNTRY",
            "COUNTRY",
            "CODE",
        )]);
        let output = run(
            &catalog,
            Some(&mut overlay),
            &MergeRequest {
                root_table: "COUNTRY",
                seeds: &seeds,
                include_update: true,
                constant_tables: &constant,
                ..MergeRequest::default()
            },
        )
        .unwrap();

        assert!(output.tree.contains("ORDER_LINE"));
        assert!(!output.script.contains("MERGE INTO ORDER_LINE"));
        assert!(output.script.contains("-- Statements: 1"));
    }

    #[test]
    fn test_errors_propagate() {
        let catalog = Catalog::from_sql(DUMP).unwrap();
        let err = run(
            &catalog,
            None,
            &MergeRequest {
                root_table: "ORDERS",
                ..MergeRequest::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }
}
