//! One MERGE upsert unit per row.

use crate::allocate::GeneratorMap;
use crate::model::TableRow;
use indexmap::IndexMap;

const INDENT: &str = "    ";

#[derive(Debug, Clone, Default)]
pub struct UpsertOptions<'a> {
    pub root_table: &'a str,
    /// Business-key column of the root table, matched instead of the key.
    pub name_column: Option<&'a str>,
    /// Appended to the root row's name-column text so every run inserts anew.
    pub test_suffix: Option<&'a str>,
    pub include_update: bool,
}

impl UpsertOptions<'_> {
    fn name_column_for(&self, row: &TableRow) -> Option<String> {
        self.name_column
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .filter(|_| row.is_table(self.root_table))
            .map(str::to_uppercase)
    }
}

/// Renders the upsert unit for `row`.
///
/// Each column's staged value is, in order of precedence: its entry in
/// `substitutions` (a PL/SQL variable), `<generator>.NEXTVAL` when the column
/// is generator-backed, or the row's literal.
pub fn generate_upsert(
    row: &TableRow,
    generators: &GeneratorMap,
    substitutions: &IndexMap<String, String>,
    options: &UpsertOptions<'_>,
) -> String {
    let table = row.table();
    let name_column = options.name_column_for(row);
    let suffix = options.test_suffix.filter(|s| !s.is_empty());

    let mut out = String::new();
    out.push_str(&format!("MERGE INTO {} tgt\n", table));
    out.push_str("USING (\n");
    out.push_str(&format!("{}SELECT\n", INDENT));

    let items: Vec<String> = row
        .columns()
        .keys()
        .map(|name| {
            let mut value = if let Some(var) = substitutions.get(name) {
                var.clone()
            } else if let Some(generator) = generators.get(table, name) {
                format!("{}.NEXTVAL", generator)
            } else {
                row.value(name).unwrap_or("NULL").to_string()
            };
            if let (Some(suffix), Some(nc)) = (suffix, name_column.as_deref()) {
                if name.eq_ignore_ascii_case(nc) {
                    value = with_test_suffix(&value, suffix);
                }
            }
            format!("{INDENT}{INDENT}{} AS {}", value, name)
        })
        .collect();
    out.push_str(&items.join(",\n"));
    out.push_str(&format!("\n{}FROM DUAL\n", INDENT));
    out.push_str(") src\n");

    let pk_names: Vec<&str> = row
        .primary_key_columns()
        .map(|c| c.name.as_str())
        .collect();

    if let Some(nc) = &name_column {
        out.push_str(&format!("ON (tgt.{nc} = src.{nc})\n"));
    } else if pk_names.is_empty() {
        out.push_str(&format!(
            "-- WARNING: no primary key found for {} - rows are always inserted\n",
            table
        ));
        out.push_str("ON (1=0)\n");
    } else {
        let cond: Vec<String> = pk_names
            .iter()
            .map(|pk| format!("tgt.{pk} = src.{pk}"))
            .collect();
        out.push_str(&format!("ON ({})\n", cond.join(" AND ")));
    }

    if options.include_update {
        let updates: Vec<String> = row
            .columns()
            .keys()
            .filter(|name| !pk_names.contains(&name.as_str()))
            .filter(|name| generators.get(table, name).is_none() && !substitutions.contains_key(*name))
            .map(|name| format!("{INDENT}{INDENT}tgt.{name} = src.{name}"))
            .collect();
        if !updates.is_empty() {
            out.push_str("WHEN MATCHED THEN\n");
            out.push_str(&format!("{}UPDATE SET\n", INDENT));
            out.push_str(&updates.join(",\n"));
            out.push('\n');
        }
    }

    let columns: Vec<&str> = row.columns().keys().map(String::as_str).collect();
    let sources: Vec<String> = columns.iter().map(|c| format!("src.{}", c)).collect();
    out.push_str("WHEN NOT MATCHED THEN\n");
    out.push_str(&format!("{}INSERT ({})\n", INDENT, columns.join(", ")));
    out.push_str(&format!("{}VALUES ({});\n", INDENT, sources.join(", ")));
    out
}

/// Only quoted text takes the suffix, and only once.
fn with_test_suffix(value: &str, suffix: &str) -> String {
    let is_quoted = value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'');
    if !is_quoted {
        return value.to_string();
    }
    let inner = &value[..value.len() - 1];
    if inner.ends_with(suffix) {
        return value.to_string();
    }
    format!("{}{}'", inner, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnDefinition;
    use pretty_assertions::assert_eq;

    fn pk(name: &str) -> ColumnDefinition {
        ColumnDefinition::new(name, "NUMBER", false, true)
    }

    fn col(name: &str) -> ColumnDefinition {
        ColumnDefinition::new(name, "VARCHAR2", true, false)
    }

    fn order() -> TableRow {
        TableRow::new("APP", "ORDERS")
            .with(pk("ID"), "42")
            .with(col("NAME"), "'Test'")
    }

    fn options(root: &str) -> UpsertOptions<'_> {
        UpsertOptions {
            root_table: root,
            ..UpsertOptions::default()
        }
    }

    fn no_subs() -> IndexMap<String, String> {
        IndexMap::new()
    }

    #[test]
    fn test_plain_merge_layout() {
        let sql = generate_upsert(&order(), &GeneratorMap::new(), &no_subs(), &options("ORDERS"));
        let expected = "\
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
";
        assert_eq!(sql, expected);
    }

    #[test]
    fn test_generator_replaces_value() {
        let mut gens = GeneratorMap::new();
        gens.insert("ORDERS", "ID", "SEQ_ORDERS");
        let sql = generate_upsert(&order(), &gens, &no_subs(), &options("ORDERS"));
        assert!(sql.contains("SEQ_ORDERS.NEXTVAL AS ID"));
        assert!(!sql.contains("42 AS ID"));
    }

    #[test]
    fn test_substitution_overrides_generator() {
        let mut gens = GeneratorMap::new();
        gens.insert("ORDERS", "ID", "SEQ_A");
        let mut subs = IndexMap::new();
        subs.insert("ID".to_string(), "v_ID_1".to_string());

        let sql = generate_upsert(&order(), &gens, &subs, &options("ORDERS"));
        assert!(sql.contains("v_ID_1 AS ID"));
        assert!(!sql.contains("SEQ_A.NEXTVAL"));
        assert!(!sql.contains("42 AS ID"));
    }

    #[test]
    fn test_name_column_match_and_test_suffix() {
        let opts = UpsertOptions {
            root_table: "ORDERS",
            name_column: Some("name"),
            test_suffix: Some("_20260224"),
            include_update: false,
        };
        let sql = generate_upsert(&order(), &GeneratorMap::new(), &no_subs(), &opts);
        assert!(sql.contains("'Test_20260224' AS NAME"));
        assert!(sql.contains("ON (tgt.NAME = src.NAME)"));
        assert!(!sql.contains("ON (tgt.ID = src.ID)"));
    }

    #[test]
    fn test_suffix_not_applied_to_child_table() {
        let row = TableRow::new("APP", "ORDER_LINE")
            .with(pk("ID"), "1")
            .with(col("NAME"), "'Line'");
        let opts = UpsertOptions {
            root_table: "ORDERS",
            name_column: Some("NAME"),
            test_suffix: Some("_20260224"),
            include_update: false,
        };
        let sql = generate_upsert(&row, &GeneratorMap::new(), &no_subs(), &opts);
        assert!(sql.contains("'Line' AS NAME"));
        assert!(sql.contains("ON (tgt.ID = src.ID)"));
    }

    #[test]
    fn test_suffix_ignored_on_numeric_and_applied_once() {
        assert_eq!(with_test_suffix("99", "_X"), "99");
        assert_eq!(with_test_suffix("'abc'", "_X"), "'abc_X'");
        assert_eq!(with_test_suffix("'abc_X'", "_X"), "'abc_X'");
        assert_eq!(with_test_suffix("'", "_X"), "'");
    }

    #[test]
    fn test_no_primary_key_never_matches() {
        let row = TableRow::new("APP", "AUDIT_LOG")
            .with(col("ORDER_ID"), "42")
            .with(col("MSG"), "'x'");
        let sql = generate_upsert(&row, &GeneratorMap::new(), &no_subs(), &options("ORDERS"));
        assert!(sql.contains("-- WARNING: no primary key found for AUDIT_LOG"));
        assert!(sql.contains("ON (1=0)"));
    }

    #[test]
    fn test_composite_key_conjunction() {
        let row = TableRow::new("APP", "DOC")
            .with(pk("ID"), "1")
            .with(pk("VERSION"), "3")
            .with(col("BODY"), "'b'");
        let sql = generate_upsert(&row, &GeneratorMap::new(), &no_subs(), &options("DOC"));
        assert!(sql.contains("ON (tgt.ID = src.ID AND tgt.VERSION = src.VERSION)"));
    }

    #[test]
    fn test_update_clause_skips_keys_and_substituted_columns() {
        let row = TableRow::new("APP", "ORDER_LINE")
            .with(pk("ID"), "1")
            .with(col("ORDER_ID"), "42")
            .with(col("NAME"), "'n'")
            .with(col("STATUS"), "'OPEN'");
        let mut subs = IndexMap::new();
        subs.insert("ORDER_ID".to_string(), "v_ORDER_ID_1".to_string());
        let opts = UpsertOptions {
            root_table: "ORDERS",
            include_update: true,
            ..UpsertOptions::default()
        };

        let sql = generate_upsert(&row, &GeneratorMap::new(), &subs, &opts);
        let expected_update = "\
WHEN MATCHED THEN
    UPDATE SET
        tgt.NAME = src.NAME,
        tgt.STATUS = src.STATUS
WHEN NOT MATCHED THEN";
        assert!(sql.contains(expected_update), "{}", sql);
        assert!(!sql.contains("tgt.ORDER_ID = src.ORDER_ID"));
    }

    #[test]
    fn test_update_clause_omitted_when_nothing_to_update() {
        let row = TableRow::new("APP", "TAG").with(pk("ID"), "1");
        let opts = UpsertOptions {
            root_table: "TAG",
            include_update: true,
            ..UpsertOptions::default()
        };
        let sql = generate_upsert(&row, &GeneratorMap::new(), &no_subs(), &opts);
        assert!(!sql.contains("WHEN MATCHED THEN"));
    }
}
