//! Whole-script assembly.
//!
//! Rows are emitted in the order given (parents first), grouped under a
//! comment header per table. Depending on [`script_shape`] the upserts are
//! either plain consecutive statements or wrapped in one PL/SQL block that
//! declares the key variables, fills them from their sequences and stops
//! early when the root row was not inserted.

use crate::allocate::{Bindings, GeneratorMap, allocate_variables, substitutions_for};
use crate::generate::{UpsertOptions, generate_upsert};
use crate::model::{FkRelationMap, TableRow};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt::Write;

const RULE: &str = "-- =================================================================";
const TABLE_RULE: &str = "-- ============================================================";
pub const FOOTER: &str = "-- End of generated script";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptShape {
    /// Independent statements.
    Flat,
    /// One `DECLARE ... BEGIN ... END;` block. With `root_guard`, dependent
    /// rows are skipped when no root row was inserted.
    Scoped { root_guard: bool },
}

/// Insert-only scripts spanning several tables need the root guard, and the
/// guard needs a block. Generated keys need a block for their variables.
pub fn script_shape(
    rows: &[TableRow],
    root_table: &str,
    uses_generators: bool,
    include_update: bool,
) -> ScriptShape {
    let has_dependents = rows.iter().any(|r| !r.is_table(root_table));
    let root_guard = !include_update && has_dependents;
    if uses_generators || root_guard {
        ScriptShape::Scoped { root_guard }
    } else {
        ScriptShape::Flat
    }
}

#[derive(Debug, Clone)]
pub struct ScriptRequest<'a> {
    pub rows: &'a [TableRow],
    pub table_counts: &'a IndexMap<String, usize>,
    pub root_table: &'a str,
    /// Seed values, shown in the header.
    pub seeds: &'a [String],
    pub name_column: Option<&'a str>,
    pub test_suffix: Option<&'a str>,
    pub fk_relations: &'a FkRelationMap,
    pub generators: &'a GeneratorMap,
    pub include_update: bool,
    /// Shown as `-- Generated:` when present.
    pub generated_at: Option<&'a str>,
}

impl ScriptRequest<'_> {
    fn upsert_options(&self) -> UpsertOptions<'_> {
        UpsertOptions {
            root_table: self.root_table,
            name_column: self.name_column,
            test_suffix: self.test_suffix,
            include_update: self.include_update,
        }
    }

    fn count(&self, table: &str) -> usize {
        self.table_counts
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(table))
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

pub fn assemble_script(request: &ScriptRequest<'_>) -> String {
    let uses_generators = request.rows.iter().any(|row| {
        row.columns()
            .keys()
            .any(|c| request.generators.get(row.table(), c).is_some())
    });
    let shape = script_shape(
        request.rows,
        request.root_table,
        uses_generators,
        request.include_update,
    );

    let mut out = String::new();
    write_header(&mut out, request);
    match shape {
        ScriptShape::Flat => write_flat(&mut out, request),
        ScriptShape::Scoped { root_guard } => write_scoped(&mut out, request, root_guard),
    }
    out.push('\n');
    out.push_str(FOOTER);
    out.push('\n');

    tracing::info!(
        root = request.root_table,
        statements = request.rows.len(),
        tables = request.table_counts.len(),
        ?shape,
        "assembled script"
    );
    out
}

fn rows_noun(count: usize) -> &'static str {
    if count == 1 { "row" } else { "rows" }
}

fn write_header(out: &mut String, request: &ScriptRequest<'_>) {
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "-- Oracle MERGE Script");
    if let Some(ts) = request.generated_at {
        let _ = writeln!(out, "-- Generated: {}", ts);
    }
    let _ = writeln!(out, "-- Root table: {}", request.root_table.to_uppercase());
    match request.seeds {
        [] => {}
        [seed] => {
            let _ = writeln!(out, "-- ID: {}", seed);
        }
        seeds => {
            let _ = writeln!(out, "-- IDs: {}", seeds.join(", "));
        }
    }
    let _ = writeln!(out, "-- Statements: {}", request.rows.len());
    let _ = writeln!(out, "-- Traversed tables:");
    for (table, count) in request.table_counts {
        let _ = writeln!(out, "--   {}: {} {}", table, count, rows_noun(*count));
    }
    let _ = writeln!(out, "{}", RULE);
    out.push('\n');
}

fn write_flat(out: &mut String, request: &ScriptRequest<'_>) {
    let options = request.upsert_options();
    let no_subs = IndexMap::new();
    let mut current: Option<String> = None;

    for row in request.rows {
        let table = row.table().to_uppercase();
        if current.as_deref() != Some(table.as_str()) {
            let count = request.count(&table);
            let _ = writeln!(out, "\n{}", TABLE_RULE);
            let _ = writeln!(out, "-- Table: {}  ({} {})", table, count, rows_noun(count));
            let _ = writeln!(out, "{}\n", TABLE_RULE);
            current = Some(table);
        }
        out.push_str(&generate_upsert(row, request.generators, &no_subs, &options));
        out.push('\n');
    }
}

fn write_scoped(out: &mut String, request: &ScriptRequest<'_>, root_guard: bool) {
    let bindings: Bindings = allocate_variables(request.rows, request.generators);
    let options = request.upsert_options();

    out.push_str("DECLARE\n");
    if root_guard {
        out.push_str("  v_root_count NUMBER := 0;\n");
    }
    for (identifier, ty) in bindings.declarations() {
        let _ = writeln!(out, "  {} {};", identifier, ty);
    }
    out.push_str("BEGIN\n");

    let mut current: Option<String> = None;
    let mut guard_written = false;
    let mut filled: HashSet<String> = HashSet::new();

    for row in request.rows {
        let table = row.table().to_uppercase();
        if current.as_deref() != Some(table.as_str()) {
            let leaving_root = current
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case(request.root_table));
            if root_guard && !guard_written && leaving_root && !row.is_table(request.root_table) {
                out.push_str("\n  IF v_root_count = 0 THEN\n");
                out.push_str("    RETURN;\n");
                out.push_str("  END IF;\n");
                guard_written = true;
            }
            let count = request.count(&table);
            let _ = writeln!(out, "\n  {}", TABLE_RULE);
            let _ = writeln!(out, "  -- Table: {}  ({} {})", table, count, rows_noun(count));
            let _ = writeln!(out, "  {}", TABLE_RULE);
            current = Some(table);
        }

        let subs = substitutions_for(row, request.generators, &bindings, request.fk_relations);

        for column in row.primary_key_columns() {
            let literal = row.value(&column.name).unwrap_or("NULL");
            let Some(identifier) = bindings.identifier(row.table(), &column.name, literal) else {
                continue;
            };
            let Some(generator) = bindings.generator(identifier) else {
                continue;
            };
            if filled.insert(identifier.to_string()) {
                let _ = writeln!(
                    out,
                    "\n  SELECT {}.NEXTVAL INTO {} FROM DUAL;",
                    generator, identifier
                );
            }
        }

        out.push('\n');
        let upsert = generate_upsert(row, request.generators, &subs, &options);
        for line in upsert.lines() {
            let _ = writeln!(out, "  {}", line);
        }
        if root_guard && row.is_table(request.root_table) {
            out.push_str("  v_root_count := v_root_count + SQL%ROWCOUNT;\n");
        }
    }

    out.push_str("\nEND;\n/\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnDefinition, ForeignKeyRelation};
    use pretty_assertions::assert_eq;

    fn pk(name: &str) -> ColumnDefinition {
        ColumnDefinition::new(name, "NUMBER", false, true)
    }

    fn col(name: &str) -> ColumnDefinition {
        ColumnDefinition::new(name, "VARCHAR2", true, false)
    }

    fn counts(rows: &[TableRow]) -> IndexMap<String, usize> {
        let mut counts = IndexMap::new();
        for row in rows {
            *counts.entry(row.table().to_string()).or_insert(0) += 1;
        }
        counts
    }

    fn relations(list: &[(&str, &str, &str, &str)]) -> FkRelationMap {
        let mut map = FkRelationMap::new();
        for (child, fk, parent, key) in list {
            map.entry(child.to_string())
                .or_insert_with(Vec::new)
                .push(ForeignKeyRelation::new(*child, *fk, *parent, *key));
        }
        map
    }

    fn render(
        rows: &[TableRow],
        root: &str,
        generators: &GeneratorMap,
        fk_relations: &FkRelationMap,
        include_update: bool,
    ) -> String {
        let table_counts = counts(rows);
        let seeds = vec!["42".to_string()];
        assemble_script(&ScriptRequest {
            rows,
            table_counts: &table_counts,
            root_table: root,
            seeds: &seeds,
            name_column: None,
            test_suffix: None,
            fk_relations,
            generators,
            include_update,
            generated_at: None,
        })
    }

    fn order_and_line() -> Vec<TableRow> {
        vec![
            TableRow::new("APP", "ORDERS")
                .with(pk("ORDER_ID"), "42")
                .with(col("NAME"), "'A'"),
            TableRow::new("APP", "ORDER_LINE")
                .with(pk("LINE_ID"), "100")
                .with(col("ORDER_ID"), "42"),
        ]
    }

    #[test]
    fn test_shape_policy() {
        let single = vec![TableRow::new("APP", "ORDERS").with(pk("ID"), "1")];
        let multi = order_and_line();

        assert_eq!(script_shape(&single, "ORDERS", false, false), ScriptShape::Flat);
        assert_eq!(
            script_shape(&single, "ORDERS", true, false),
            ScriptShape::Scoped { root_guard: false }
        );
        assert_eq!(
            script_shape(&multi, "orders", false, false),
            ScriptShape::Scoped { root_guard: true }
        );
        assert_eq!(script_shape(&multi, "ORDERS", false, true), ScriptShape::Flat);
        assert_eq!(
            script_shape(&multi, "ORDERS", true, true),
            ScriptShape::Scoped { root_guard: false }
        );
    }

    #[test]
    fn test_flat_script() {
        let rows = vec![TableRow::new("APP", "ORDERS")
            .with(pk("ID"), "42")
            .with(col("NAME"), "'Test'")];
        let script = render(&rows, "ORDERS", &GeneratorMap::new(), &FkRelationMap::new(), false);

        let expected = "\
-- =================================================================
-- Oracle MERGE Script
-- Root table: ORDERS
-- ID: 42
-- Statements: 1
-- Traversed tables:
--   ORDERS: 1 row
-- =================================================================


-- ============================================================
-- Table: ORDERS  (1 row)
-- ============================================================

MERGE INTO ORDERS tgt
USING (
    SELECT
        42 AS ID,
        'Test' AS NAME
    FROM DUAL
) src
ON (tgt.ID = src.ID)
WHEN NOT MATCHED THEN
    INSERT (ID, NAME)
    VALUES (src.ID, src.NAME);


-- End of generated script
";
        assert_eq!(script, expected);
    }

    #[test]
    fn test_scoped_script_with_generator_and_guard() {
        let mut generators = GeneratorMap::new();
        generators.insert("ORDERS", "ORDER_ID", "SEQ_ORDERS");
        let rels = relations(&[("ORDER_LINE", "ORDER_ID", "ORDERS", "ORDER_ID")]);
        let script = render(&order_and_line(), "ORDERS", &generators, &rels, false);

        let expected = "\
-- =================================================================
-- Oracle MERGE Script
-- Root table: ORDERS
-- ID: 42
-- Statements: 2
-- Traversed tables:
--   ORDERS: 1 row
--   ORDER_LINE: 1 row
-- =================================================================

DECLARE
  v_root_count NUMBER := 0;
  v_ORDER_ID_1 NUMBER;
BEGIN

  -- ============================================================
  -- Table: ORDERS  (1 row)
  -- ============================================================

  SELECT SEQ_ORDERS.NEXTVAL INTO v_ORDER_ID_1 FROM DUAL;

  MERGE INTO ORDERS tgt
  USING (
      SELECT
          v_ORDER_ID_1 AS ORDER_ID,
          'A' AS NAME
      FROM DUAL
  ) src
  ON (tgt.ORDER_ID = src.ORDER_ID)
  WHEN NOT MATCHED THEN
      INSERT (ORDER_ID, NAME)
      VALUES (src.ORDER_ID, src.NAME);
  v_root_count := v_root_count + SQL%ROWCOUNT;

  IF v_root_count = 0 THEN
    RETURN;
  END IF;

  -- ============================================================
  -- Table: ORDER_LINE  (1 row)
  -- ============================================================

  MERGE INTO ORDER_LINE tgt
  USING (
      SELECT
          100 AS LINE_ID,
          v_ORDER_ID_1 AS ORDER_ID
      FROM DUAL
  ) src
  ON (tgt.LINE_ID = src.LINE_ID)
  WHEN NOT MATCHED THEN
      INSERT (LINE_ID, ORDER_ID)
      VALUES (src.LINE_ID, src.ORDER_ID);

END;
/

-- End of generated script
";
        assert_eq!(script, expected);
    }

    #[test]
    fn test_insert_only_with_dependents_is_guarded() {
        let script = render(
            &order_and_line(),
            "ORDERS",
            &GeneratorMap::new(),
            &FkRelationMap::new(),
            false,
        );
        assert!(script.contains("v_root_count NUMBER := 0;"));
        assert!(script.contains("v_root_count := v_root_count + SQL%ROWCOUNT;"));
        assert!(script.contains("IF v_root_count = 0 THEN"));
        assert!(!script.contains("NEXTVAL"));
    }

    #[test]
    fn test_update_mode_with_dependents_stays_flat() {
        let script = render(
            &order_and_line(),
            "ORDERS",
            &GeneratorMap::new(),
            &FkRelationMap::new(),
            true,
        );
        assert!(!script.contains("v_root_count"));
        assert!(!script.contains("DECLARE"));
        assert!(script.contains("-- Table: ORDER_LINE  (1 row)"));
    }

    #[test]
    fn test_four_level_chain_threads_variables() {
        let rows = vec![
            TableRow::new("APP", "PROJECT")
                .with(pk("PROJECT_ID"), "100")
                .with(col("NAME"), "'P'"),
            TableRow::new("APP", "ORDERS")
                .with(pk("ORDER_ID"), "200")
                .with(col("PROJECT_ID"), "100"),
            TableRow::new("APP", "POSITION")
                .with(pk("POSITION_ID"), "300")
                .with(col("ORDER_ID"), "200"),
            TableRow::new("APP", "DETAIL")
                .with(pk("DETAIL_ID"), "400")
                .with(col("POSITION_ID"), "300"),
        ];
        let mut generators = GeneratorMap::new();
        generators.insert("PROJECT", "PROJECT_ID", "PROJECT_SEQ");
        generators.insert("ORDERS", "ORDER_ID", "ORDER_SEQ");
        generators.insert("POSITION", "POSITION_ID", "POSITION_SEQ");
        generators.insert("DETAIL", "DETAIL_ID", "DETAIL_SEQ");
        let rels = relations(&[
            ("ORDERS", "PROJECT_ID", "PROJECT", "PROJECT_ID"),
            ("POSITION", "ORDER_ID", "ORDERS", "ORDER_ID"),
            ("DETAIL", "POSITION_ID", "POSITION", "POSITION_ID"),
        ]);

        let script = render(&rows, "PROJECT", &generators, &rels, false);
        for var in ["v_PROJECT_ID_1", "v_ORDER_ID_1", "v_POSITION_ID_1", "v_DETAIL_ID_1"] {
            assert!(script.contains(&format!("  {} NUMBER;", var)), "{}", var);
        }
        assert!(script.contains("PROJECT_SEQ.NEXTVAL INTO v_PROJECT_ID_1"));
        assert!(script.contains("ORDER_SEQ.NEXTVAL INTO v_ORDER_ID_1"));
        assert!(script.contains("v_PROJECT_ID_1 AS PROJECT_ID"));
        assert!(script.contains("v_POSITION_ID_1 AS POSITION_ID"));
        assert!(!script.contains("100 AS PROJECT_ID"));
        assert!(!script.contains("200 AS ORDER_ID"));
    }

    #[test]
    fn test_two_root_rows_keep_their_own_variables() {
        let rows = vec![
            TableRow::new("APP", "PROJECT").with(pk("PROJECT_ID"), "100"),
            TableRow::new("APP", "PROJECT").with(pk("PROJECT_ID"), "101"),
            TableRow::new("APP", "ORDERS")
                .with(pk("ORDER_ID"), "200")
                .with(col("PROJECT_ID"), "100"),
            TableRow::new("APP", "ORDERS")
                .with(pk("ORDER_ID"), "201")
                .with(col("PROJECT_ID"), "101"),
        ];
        let mut generators = GeneratorMap::new();
        generators.insert("PROJECT", "PROJECT_ID", "PROJECT_SEQ");
        let rels = relations(&[("ORDERS", "PROJECT_ID", "PROJECT", "PROJECT_ID")]);

        let script = render(&rows, "PROJECT", &generators, &rels, false);
        assert!(script.contains("v_PROJECT_ID_1 NUMBER;"));
        assert!(script.contains("v_PROJECT_ID_2 NUMBER;"));
        assert_eq!(script.matches("v_PROJECT_ID_1 AS PROJECT_ID").count(), 2);
        assert_eq!(script.matches("v_PROJECT_ID_2 AS PROJECT_ID").count(), 2);
        assert_eq!(script.matches("IF v_root_count = 0 THEN").count(), 1);
    }

    #[test]
    fn test_variable_filled_once_for_repeated_row() {
        let row = TableRow::new("APP", "ORDERS").with(pk("ORDER_ID"), "42");
        let rows = vec![row.clone(), row];
        let mut generators = GeneratorMap::new();
        generators.insert("ORDERS", "ORDER_ID", "SEQ_ORDERS");

        let script = render(&rows, "ORDERS", &generators, &FkRelationMap::new(), true);
        assert_eq!(script.matches("SEQ_ORDERS.NEXTVAL INTO").count(), 1);
        assert_eq!(script.matches("MERGE INTO ORDERS").count(), 2);
    }

    #[test]
    fn test_header_lists_batch_seeds() {
        let rows = vec![TableRow::new("APP", "ORDERS").with(pk("ID"), "42")];
        let table_counts = counts(&rows);
        let seeds = vec!["42".to_string(), "43".to_string()];
        let script = assemble_script(&ScriptRequest {
            rows: &rows,
            table_counts: &table_counts,
            root_table: "orders",
            seeds: &seeds,
            name_column: None,
            test_suffix: None,
            fk_relations: &FkRelationMap::new(),
            generators: &GeneratorMap::new(),
            include_update: false,
            generated_at: Some("2026-10-18 09:30:00"),
        });
        assert!(script.contains("-- Generated: 2026-10-18 09:30:00\n"));
        assert!(script.contains("-- Root table: ORDERS\n"));
        assert!(script.contains("-- IDs: 42, 43\n"));
    }
}
