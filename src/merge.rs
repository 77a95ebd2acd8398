//! Combining and filtering traversal results.

use crate::model::{DependencyNode, RowIdentity, TableRow, TraversalResult};
use indexmap::IndexMap;
use std::collections::HashSet;

pub const BATCH_ROOT: &str = "BATCH";

/// Merges independent traversals into one result under a synthetic root.
///
/// Rows are deduplicated on their full identity (schema, table and every
/// value), keeping the first occurrence. Table counts describe the kept rows;
/// each relation is listed once per child table.
pub fn merge(results: Vec<TraversalResult>) -> TraversalResult {
    let mut root = DependencyNode::new(BATCH_ROOT, "", "", results.len());
    let mut rows: Vec<TableRow> = Vec::new();
    let mut seen: HashSet<RowIdentity> = HashSet::new();
    let mut fk_relations = IndexMap::new();

    for result in results {
        root.row_labels.push(result.root.value.clone());
        root.children.push(result.root);

        for row in result.rows {
            if seen.insert(row.identity()) {
                rows.push(row);
            } else {
                tracing::debug!(table = row.table(), "dropping duplicate row from merged batch");
            }
        }

        for (table, relations) in result.fk_relations {
            let list: &mut Vec<_> = fk_relations.entry(table).or_default();
            for rel in relations {
                if !list.contains(&rel) {
                    list.push(rel);
                }
            }
        }
    }

    TraversalResult {
        root,
        table_counts: count_tables(&rows),
        rows,
        fk_relations,
    }
}

/// Drops rows of tables that already exist in the target (lookup or
/// constant tables). Counts are recomputed; the tree and relations stay.
pub fn without_tables(result: TraversalResult, tables: &[String]) -> TraversalResult {
    if tables.is_empty() {
        return result;
    }
    let TraversalResult {
        root,
        rows,
        fk_relations,
        ..
    } = result;

    let rows: Vec<TableRow> = rows
        .into_iter()
        .filter(|row| !tables.iter().any(|t| row.is_table(t)))
        .collect();

    TraversalResult {
        root,
        table_counts: count_tables(&rows),
        rows,
        fk_relations,
    }
}

fn count_tables(rows: &[TableRow]) -> IndexMap<String, usize> {
    let mut counts = IndexMap::new();
    for row in rows {
        *counts.entry(row.table().to_string()).or_insert(0) += 1;
    }
    counts
}
