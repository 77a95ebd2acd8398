//! Breadth-first walk over foreign-key relations.
//!
//! Starting from one root row, every row that transitively references it is
//! fetched once. Rows come out parent before child, which is the order the
//! generated script must insert them in.

use crate::error::{Error, Result};
use crate::literal::{literals_equal, to_sql_literal};
use crate::merge::merge;
use crate::model::{DependencyNode, FkRelationMap, ForeignKeyRelation, TableRow, TraversalResult};
use crate::overlay::RelationOverlay;
use crate::provider::MetadataProvider;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};

pub struct Traverser<'a, P: MetadataProvider + ?Sized> {
    provider: &'a P,
    overlay: Option<&'a mut dyn RelationOverlay>,
    pk_cache: HashMap<String, Vec<String>>,
}

struct QueueEntry {
    table: String,
    /// Literal the children's foreign keys are matched against.
    key_literal: String,
    row: TableRow,
    node: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VisitedKey {
    table: String,
    parts: Vec<String>,
}

impl VisitedKey {
    fn new(table: &str, row: &TableRow, pk_columns: &[String], key_literal: &str) -> Self {
        let parts = match pk_columns.len() {
            // No declared key: the whole row is the only reliable identity.
            0 => row
                .values()
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect(),
            1 => vec![key_literal.to_string()],
            _ => pk_columns
                .iter()
                .map(|c| row.value(c).unwrap_or("NULL").to_string())
                .collect(),
        };
        Self {
            table: table.to_uppercase(),
            parts,
        }
    }
}

struct NodeArena {
    nodes: Vec<DependencyNode>,
    children: Vec<Vec<usize>>,
}

impl NodeArena {
    const ROOT: usize = 0;

    fn new(root: DependencyNode) -> Self {
        Self {
            nodes: vec![root],
            children: vec![Vec::new()],
        }
    }

    fn add_child(&mut self, parent: usize, node: DependencyNode) -> usize {
        let id = self.nodes.len();
        self.nodes.push(node);
        self.children.push(Vec::new());
        self.children[parent].push(id);
        id
    }

    fn label(&mut self, id: usize, label: String) {
        self.nodes[id].row_labels.push(label);
    }

    fn build(&self, id: usize) -> DependencyNode {
        let mut node = self.nodes[id].clone();
        node.children = self.children[id].iter().map(|&c| self.build(c)).collect();
        node
    }
}

impl<'a, P: MetadataProvider + ?Sized> Traverser<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self {
            provider,
            overlay: None,
            pk_cache: HashMap::new(),
        }
    }

    pub fn with_overlay(mut self, overlay: &'a mut dyn RelationOverlay) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Traverses from the row of `root_table` whose `lookup_column` (default:
    /// first primary-key column) equals `seed`.
    pub fn traverse(
        &mut self,
        root_table: &str,
        lookup_column: Option<&str>,
        seed: &str,
    ) -> Result<TraversalResult> {
        let seed_literal = to_sql_literal(seed)?;
        let root_table = root_table.trim().to_uppercase();
        if root_table.is_empty() {
            return Err(Error::Input("root table must not be empty".to_string()));
        }

        let pk_columns = self.primary_key_columns(&root_table)?;
        let root_pk = pk_columns
            .first()
            .cloned()
            .ok_or_else(|| Error::schema(&root_table, "no primary key found"))?;

        let lookup = lookup_column
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_uppercase)
            .unwrap_or_else(|| root_pk.clone());

        let root_row = self
            .provider
            .fetch_row_by_lookup_column(&root_table, &lookup, &seed_literal)?
            .ok_or_else(|| Error::NotFound {
                table: root_table.clone(),
                column: lookup.clone(),
                literal: seed_literal.clone(),
            })?;

        // Foreign keys reference the primary key, never the lookup column.
        let root_key = root_row
            .value(&root_pk)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::schema(
                    &root_table,
                    format!("primary key column {} missing from fetched row", root_pk),
                )
            })?;

        let mut root_node = DependencyNode::new(&root_table, &lookup, &seed_literal, 1);
        root_node.row_labels.push(row_label(&root_row, &pk_columns, &root_key));
        let mut tree = NodeArena::new(root_node);

        let mut rows: Vec<TableRow> = Vec::new();
        let mut table_counts: IndexMap<String, usize> = IndexMap::new();
        let mut visited: HashSet<VisitedKey> = HashSet::new();
        let mut fk_relations = FkRelationMap::new();

        let mut queue = VecDeque::new();
        queue.push_back(QueueEntry {
            table: root_table.clone(),
            key_literal: root_key,
            row: root_row,
            node: NodeArena::ROOT,
        });

        while let Some(entry) = queue.pop_front() {
            let pk_columns = self.primary_key_columns(&entry.table)?;
            let key = VisitedKey::new(&entry.table, &entry.row, &pk_columns, &entry.key_literal);
            if !visited.insert(key) {
                continue;
            }
            tracing::debug!(table = %entry.table, key = %entry.key_literal, "visiting row");
            *table_counts.entry(entry.row.table().to_string()).or_insert(0) += 1;

            let relations = self.relations_for(&entry.table)?;
            for rel in &relations {
                let list = fk_relations
                    .entry(rel.child_table.to_uppercase())
                    .or_default();
                if !list.contains(rel) {
                    list.push(rel.clone());
                }
            }

            let mut grouped: Vec<&ForeignKeyRelation> = Vec::new();
            for rel in &relations {
                if grouped.contains(&rel) {
                    continue;
                }
                let partners = composite_partners(&relations, rel, &pk_columns);
                grouped.extend(partners.iter().copied());

                let parent_key = parent_value(&entry, rel);
                let mut child_rows = self.provider.fetch_rows_by_foreign_key(
                    &rel.child_table,
                    &rel.fk_column,
                    parent_key,
                )?;
                child_rows.retain(|row| {
                    partners.iter().all(|p| {
                        row.value(&p.fk_column.to_uppercase())
                            .is_some_and(|v| literals_equal(v, parent_value(&entry, p)))
                    })
                });
                if child_rows.is_empty() {
                    continue;
                }
                tracing::debug!(
                    relation = %rel,
                    parent_key = %parent_key,
                    count = child_rows.len(),
                    "matched child rows"
                );

                let child_pk = self.primary_key_columns(&rel.child_table)?;
                let key_column = child_pk.first().unwrap_or(&rel.fk_column).clone();
                let node = tree.add_child(
                    entry.node,
                    DependencyNode::new(
                        &rel.child_table,
                        &rel.fk_column,
                        parent_key,
                        child_rows.len(),
                    ),
                );

                for child_row in child_rows {
                    let key_literal = child_row.value(&key_column).unwrap_or("NULL").to_string();
                    tree.label(node, row_label(&child_row, &child_pk, &key_literal));

                    let child_key =
                        VisitedKey::new(&rel.child_table, &child_row, &child_pk, &key_literal);
                    if !visited.contains(&child_key) {
                        queue.push_back(QueueEntry {
                            table: rel.child_table.to_uppercase(),
                            key_literal,
                            row: child_row,
                            node,
                        });
                    }
                }
            }

            rows.push(entry.row);
        }

        Ok(TraversalResult {
            root: tree.build(NodeArena::ROOT),
            rows,
            table_counts,
            fk_relations,
        })
    }

    /// Traverses once per seed and merges the results. A single seed is
    /// returned as is.
    pub fn traverse_all(
        &mut self,
        root_table: &str,
        lookup_column: Option<&str>,
        seeds: &[String],
    ) -> Result<TraversalResult> {
        match seeds {
            [] => Err(Error::Input("at least one seed value is required".to_string())),
            [seed] => self.traverse(root_table, lookup_column, seed),
            _ => {
                let mut results = Vec::with_capacity(seeds.len());
                for seed in seeds {
                    results.push(self.traverse(root_table, lookup_column, seed)?);
                }
                Ok(merge(results))
            }
        }
    }

    fn primary_key_columns(&mut self, table: &str) -> Result<Vec<String>> {
        let table = table.to_uppercase();
        if let Some(cols) = self.pk_cache.get(&table) {
            return Ok(cols.clone());
        }
        let cols = self.provider.primary_key_columns(&table)?;
        self.pk_cache.insert(table, cols.clone());
        Ok(cols)
    }

    /// Real relations of `table` plus the overlay entries still not backed
    /// by a constraint.
    fn relations_for(&mut self, table: &str) -> Result<Vec<ForeignKeyRelation>> {
        let real = self.provider.child_relations(table)?;
        let mut relations = real.clone();
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.reconcile(&real);
            for virtual_rel in overlay.relations_for_parent(table) {
                if !relations.iter().any(|r| r.eq_ignore_case(&virtual_rel)) {
                    relations.push(virtual_rel);
                }
            }
        }
        Ok(relations)
    }
}

/// The parent's value for the column `rel` references.
fn parent_value<'e>(entry: &'e QueueEntry, rel: &ForeignKeyRelation) -> &'e str {
    entry
        .row
        .value(&rel.parent_pk_column.to_uppercase())
        .unwrap_or(&entry.key_literal)
}

/// The other columns of the composite foreign key `rel` is part of: one
/// relation from the same child table per remaining parent key column.
/// Empty when the key is simple or the pairing is ambiguous.
fn composite_partners<'r>(
    relations: &'r [ForeignKeyRelation],
    rel: &ForeignKeyRelation,
    parent_pk: &[String],
) -> Vec<&'r ForeignKeyRelation> {
    let covers = |r: &ForeignKeyRelation, column: &str| {
        r.child_table.eq_ignore_ascii_case(&rel.child_table)
            && r.parent_pk_column.eq_ignore_ascii_case(column)
    };
    if parent_pk.len() < 2 || !parent_pk.iter().any(|c| covers(rel, c)) {
        return Vec::new();
    }

    let mut partners = Vec::new();
    for column in parent_pk.iter().filter(|c| !covers(rel, c)) {
        let mut candidates = relations.iter().filter(|r| covers(r, column));
        match (candidates.next(), candidates.next()) {
            (Some(partner), None) => partners.push(partner),
            _ => return Vec::new(),
        }
    }
    partners
}

fn row_label(row: &TableRow, pk_columns: &[String], fallback: &str) -> String {
    if pk_columns.len() > 1 {
        pk_columns
            .iter()
            .map(|c| row.value(c).unwrap_or("NULL"))
            .collect::<Vec<_>>()
            .join("/")
    } else {
        fallback.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::overlay::MemoryOverlay;
    use crate::provider::ProviderError;

    const SHOP: &str = r#"
        CREATE TABLE customer (
            customer_id INT PRIMARY KEY,
            name VARCHAR(50)
        );
        CREATE TABLE orders (
            order_id INT PRIMARY KEY,
            order_no VARCHAR(20),
            customer_id INT REFERENCES customer(customer_id)
        );
        CREATE TABLE order_line (
            line_id INT PRIMARY KEY,
            order_id INT REFERENCES orders(order_id),
            qty INT
        );
        CREATE TABLE line_note (
            line_id INT REFERENCES order_line(line_id),
            note VARCHAR(100)
        );
        INSERT INTO customer VALUES (1, 'Ann');
        INSERT INTO orders VALUES (42, 'ORD-42', 1), (43, 'ORD-43', 1);
        INSERT INTO order_line VALUES (100, 42, 2), (101, 42, 5), (102, 43, 1);
        INSERT INTO line_note VALUES (100, 'fragile'), (100, 'gift');
    "#;

    fn shop() -> Catalog {
        Catalog::from_sql(SHOP).unwrap()
    }

    fn tables(result: &TraversalResult) -> Vec<&str> {
        result.rows.iter().map(|r| r.table()).collect()
    }

    #[test]
    fn test_traverse_parent_before_children() {
        let catalog = shop();
        let result = Traverser::new(&catalog)
            .traverse("orders", None, "42")
            .unwrap();

        assert_eq!(tables(&result), vec!["ORDERS", "ORDER_LINE", "ORDER_LINE", "LINE_NOTE", "LINE_NOTE"]);
        assert_eq!(result.table_counts["ORDERS"], 1);
        assert_eq!(result.table_counts["ORDER_LINE"], 2);
        assert_eq!(result.table_counts["LINE_NOTE"], 2);
    }

    #[test]
    fn test_rows_without_primary_key_sharing_fk_are_kept() {
        let catalog = shop();
        let result = Traverser::new(&catalog)
            .traverse("ORDER_LINE", None, "100")
            .unwrap();
        let notes: Vec<_> = result.rows.iter().filter(|r| r.is_table("LINE_NOTE")).collect();
        assert_eq!(notes.len(), 2);
    }

    #[test]
    fn test_lookup_by_non_key_column_uses_primary_key() {
        let catalog = shop();
        let result = Traverser::new(&catalog)
            .traverse("ORDERS", Some("order_no"), "ORD-43")
            .unwrap();

        assert_eq!(result.rows[0].value("ORDER_ID"), Some("43"));
        assert_eq!(result.table_counts["ORDER_LINE"], 1);
        assert_eq!(result.root.column, "ORDER_NO");
        assert_eq!(result.root.value, "'ORD-43'");
    }

    #[test]
    fn test_cycle_through_shared_parent_visits_once() {
        let catalog = shop();
        let result = Traverser::new(&catalog)
            .traverse("CUSTOMER", None, "1")
            .unwrap();

        assert_eq!(result.table_counts["CUSTOMER"], 1);
        assert_eq!(result.table_counts["ORDERS"], 2);
        assert_eq!(result.table_counts["ORDER_LINE"], 3);
        assert_eq!(result.root.children.len(), 1);
        assert_eq!(result.root.children[0].row_labels, vec!["42", "43"]);
    }

    #[test]
    fn test_fk_relations_recorded_without_matches() {
        let catalog = shop();
        let result = Traverser::new(&catalog)
            .traverse("ORDERS", None, "43")
            .unwrap();
        // line 102 has no notes, the relation is still known
        assert!(result.fk_relations.contains_key("LINE_NOTE"));
    }

    #[test]
    fn test_missing_primary_key_is_schema_error() {
        let catalog = shop();
        let err = Traverser::new(&catalog)
            .traverse("LINE_NOTE", None, "100")
            .unwrap_err();
        assert!(matches!(err, Error::Schema { ref table, .. } if table == "LINE_NOTE"));
    }

    #[test]
    fn test_no_match_is_not_found() {
        let catalog = shop();
        let err = Traverser::new(&catalog)
            .traverse("ORDERS", None, "999")
            .unwrap_err();
        assert_eq!(
            err,
            Error::NotFound {
                table: "ORDERS".to_string(),
                column: "ORDER_ID".to_string(),
                literal: "999".to_string(),
            }
        );
    }

    #[test]
    fn test_blank_seed_fails_before_provider_call() {
        struct Exploding;
        impl MetadataProvider for Exploding {
            fn primary_key_columns(&self, _: &str) -> std::result::Result<Vec<String>, ProviderError> {
                panic!("provider must not be called")
            }
            fn columns(
                &self,
                _: &str,
                _: &[String],
            ) -> std::result::Result<Vec<crate::model::ColumnDefinition>, ProviderError> {
                panic!("provider must not be called")
            }
            fn child_relations(
                &self,
                _: &str,
            ) -> std::result::Result<Vec<ForeignKeyRelation>, ProviderError> {
                panic!("provider must not be called")
            }
            fn fetch_rows_by_foreign_key(
                &self,
                _: &str,
                _: &str,
                _: &str,
            ) -> std::result::Result<Vec<TableRow>, ProviderError> {
                panic!("provider must not be called")
            }
            fn fetch_row_by_lookup_column(
                &self,
                _: &str,
                _: &str,
                _: &str,
            ) -> std::result::Result<Option<TableRow>, ProviderError> {
                panic!("provider must not be called")
            }
        }

        let err = Traverser::new(&Exploding).traverse("ORDERS", None, "  ").unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }

    #[test]
    fn test_overlay_relation_is_followed() {
        let catalog = Catalog::from_sql(
            r#"
            CREATE TABLE orders (order_id INT PRIMARY KEY);
            CREATE TABLE order_audit (audit_id INT PRIMARY KEY, ref_id INT);
            INSERT INTO orders VALUES (42);
            INSERT INTO order_audit VALUES (7, 42), (8, 41);
            "#,
        )
        .unwrap();
        let mut overlay = MemoryOverlay::new(vec![ForeignKeyRelation::new(
            "ORDER_AUDIT",
            "REF_ID",
            "ORDERS",
            "ORDER_ID",
        )]);

        let result = Traverser::new(&catalog)
            .with_overlay(&mut overlay)
            .traverse("ORDERS", None, "42")
            .unwrap();

        assert_eq!(tables(&result), vec!["ORDERS", "ORDER_AUDIT"]);
        assert_eq!(result.rows[1].value("AUDIT_ID"), Some("7"));
        assert_eq!(overlay.entries().len(), 1);
    }

    #[test]
    fn test_overlay_relation_to_missing_table_is_schema_error() {
        let catalog = Catalog::from_sql(
            "CREATE TABLE orders (order_id INT PRIMARY KEY); INSERT INTO orders VALUES (1);",
        )
        .unwrap();
        let mut overlay = MemoryOverlay::new(vec![ForeignKeyRelation::new(
            "GHOST", "ORDER_ID", "ORDERS", "ORDER_ID",
        )]);
        let err = Traverser::new(&catalog)
            .with_overlay(&mut overlay)
            .traverse("ORDERS", None, "1")
            .unwrap_err();
        assert!(matches!(err, Error::Schema { ref table, .. } if table == "GHOST"));
    }

    #[test]
    fn test_composite_foreign_key_matches_every_column() {
        let catalog = Catalog::from_sql(
            r#"
            CREATE TABLE order_line (
                order_id INT,
                line_no INT,
                PRIMARY KEY (order_id, line_no)
            );
            CREATE TABLE shipment (
                shipment_id INT PRIMARY KEY,
                order_id INT,
                line_no INT,
                FOREIGN KEY (order_id, line_no) REFERENCES order_line (order_id, line_no)
            );
            INSERT INTO order_line VALUES (7, 1), (5, 7);
            INSERT INTO shipment VALUES (900, 5, 7), (901, 9, 1), (902, 7, 1);
            "#,
        )
        .unwrap();

        let result = Traverser::new(&catalog)
            .traverse("ORDER_LINE", None, "7")
            .unwrap();
        assert_eq!(tables(&result), vec!["ORDER_LINE", "SHIPMENT"]);
        assert_eq!(result.rows[1].value("SHIPMENT_ID"), Some("902"));
        assert_eq!(result.root.children.len(), 1);
        assert_eq!(result.root.children[0].row_labels, vec!["902"]);
    }

    #[test]
    fn test_two_foreign_keys_to_same_column_stay_separate() {
        let catalog = Catalog::from_sql(
            r#"
            CREATE TABLE orders (order_id INT PRIMARY KEY);
            CREATE TABLE order_link (
                link_id INT PRIMARY KEY,
                from_order INT REFERENCES orders(order_id),
                to_order INT REFERENCES orders(order_id)
            );
            INSERT INTO orders VALUES (42), (43);
            INSERT INTO order_link VALUES (1, 42, 43), (2, 43, 42);
            "#,
        )
        .unwrap();

        let result = Traverser::new(&catalog)
            .traverse("ORDERS", None, "42")
            .unwrap();
        assert_eq!(result.table_counts["ORDER_LINK"], 2);
        assert_eq!(result.root.children.len(), 2);
    }

    #[test]
    fn test_traverse_all_requires_seed() {
        let catalog = shop();
        let err = Traverser::new(&catalog)
            .traverse_all("ORDERS", None, &[])
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }

    #[test]
    fn test_traverse_all_merges_shared_rows() {
        let catalog = shop();
        let result = Traverser::new(&catalog)
            .traverse_all("ORDERS", None, &["42".to_string(), "43".to_string()])
            .unwrap();
        assert_eq!(result.table_counts["ORDERS"], 2);
        assert_eq!(result.table_counts["ORDER_LINE"], 3);
        assert_eq!(result.root.table, "BATCH");
        assert_eq!(result.root.children.len(), 2);
    }
}
