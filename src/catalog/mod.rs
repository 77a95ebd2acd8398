//! In-memory metadata provider loaded from a SQL dump.
//!
//! Tables, keys and foreign keys come from the dump's DDL; rows come from its
//! `INSERT` statements and are rendered to literals once, at load time.
//! Identifiers are folded to upper case.

pub mod dialect;
pub mod lexer;
pub mod parser;
pub mod types;

pub use dialect::Dialect;
pub use parser::{ParsedDump, SqlParseError, parse_sql};

use crate::allocate::GeneratorMap;
use crate::literal::{SqlValue, ValueKind, coerce_literal, literals_equal, render_value};
use crate::model::{ColumnDefinition, ForeignKeyRelation, TableRow};
use crate::provider::{MetadataProvider, ProviderError};
use indexmap::IndexMap;

/// Schema assigned to tables declared without one.
pub const DEFAULT_SCHEMA: &str = "PUBLIC";

#[derive(Debug, Clone)]
struct TableData {
    schema: String,
    columns: Vec<ColumnDefinition>,
    primary_key: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableData {
    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
    }
}

#[derive(Debug, Clone)]
struct Trigger {
    column: Option<String>,
    sequence: String,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: IndexMap<String, TableData>,
    relations: Vec<ForeignKeyRelation>,
    triggers: IndexMap<String, Trigger>,
}

impl Catalog {
    /// Loads a dump, detecting its dialect.
    pub fn from_sql(input: &str) -> Result<Self, SqlParseError> {
        Self::from_sql_with(input, Dialect::Auto)
    }

    pub fn from_sql_with(input: &str, dialect: Dialect) -> Result<Self, SqlParseError> {
        let dump = parse_sql(input, dialect)?;
        Self::from_dump(dump)
    }

    pub fn from_dump(dump: ParsedDump) -> Result<Self, SqlParseError> {
        let mut catalog = Catalog::default();

        for table in dump.tables {
            let name = table.name.to_uppercase();
            let primary_key: Vec<String> =
                table.primary_key.iter().map(|c| c.to_uppercase()).collect();
            let columns = table
                .columns
                .into_iter()
                .map(|c| {
                    let column = c.name.to_uppercase();
                    let is_pk = primary_key.contains(&column);
                    ColumnDefinition::new(column, c.data_type, c.nullable && !is_pk, is_pk)
                })
                .collect();
            let data = TableData {
                schema: table
                    .schema
                    .map(|s| s.to_uppercase())
                    .unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
                columns,
                primary_key,
                rows: Vec::new(),
            };
            if catalog.tables.insert(name.clone(), data).is_some() {
                tracing::warn!(table = %name, "table declared twice, keeping the last definition");
            }
        }

        for fk in dump.foreign_keys {
            catalog.add_foreign_key(fk);
        }

        for insert in dump.inserts {
            catalog.add_rows(insert)?;
        }

        for trigger in dump.triggers {
            let table = trigger.table.to_uppercase();
            if !catalog.tables.contains_key(&table) {
                tracing::warn!(table = %table, "trigger on unknown table ignored");
                continue;
            }
            catalog.triggers.insert(
                table,
                Trigger {
                    column: trigger.column.map(|c| c.to_uppercase()),
                    sequence: trigger.sequence.to_uppercase(),
                },
            );
        }

        tracing::debug!(
            tables = catalog.tables.len(),
            relations = catalog.relations.len(),
            triggers = catalog.triggers.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// One relation per column pair. Composite keys are split positionally.
    fn add_foreign_key(&mut self, fk: parser::FkDef) {
        let child = fk.table.to_uppercase();
        let parent = fk.target.to_uppercase();

        let Some(parent_data) = self.tables.get(&parent) else {
            tracing::warn!(child = %child, parent = %parent, "foreign key to unknown table skipped");
            return;
        };
        if !self.tables.contains_key(&child) {
            tracing::warn!(child = %child, parent = %parent, "foreign key from unknown table skipped");
            return;
        }

        let parent_columns: Vec<String> = if fk.target_columns.is_empty() {
            parent_data.primary_key.clone()
        } else {
            fk.target_columns.iter().map(|c| c.to_uppercase()).collect()
        };
        if parent_columns.len() != fk.columns.len() {
            tracing::warn!(
                child = %child,
                parent = %parent,
                "foreign key column count does not match the referenced key, skipped"
            );
            return;
        }

        for (column, parent_column) in fk.columns.iter().zip(parent_columns) {
            let relation =
                ForeignKeyRelation::new(&child, column.to_uppercase(), &parent, parent_column);
            if !self.relations.iter().any(|r| r.eq_ignore_case(&relation)) {
                self.relations.push(relation);
            }
        }
    }

    fn add_rows(&mut self, insert: parser::InsertDef) -> Result<(), SqlParseError> {
        let name = insert.table.to_uppercase();
        let table = self
            .tables
            .get_mut(&name)
            .ok_or_else(|| SqlParseError::UnknownTable(name.clone()))?;

        // Position of each listed value in the table's column order.
        let positions: Vec<usize> = if insert.columns.is_empty() {
            (0..table.columns.len()).collect()
        } else {
            insert
                .columns
                .iter()
                .map(|c| {
                    table
                        .column_index(c)
                        .ok_or_else(|| SqlParseError::UnknownColumn {
                            table: name.clone(),
                            column: c.to_uppercase(),
                        })
                })
                .collect::<Result<_, _>>()?
        };

        for values in insert.rows {
            if values.len() != positions.len() {
                return Err(SqlParseError::ValueCount {
                    table: name.clone(),
                    expected: positions.len(),
                    found: values.len(),
                });
            }
            let mut cells = vec![SqlValue::Null; table.columns.len()];
            for (value, &pos) in values.into_iter().zip(&positions) {
                cells[pos] = value;
            }
            let rendered = cells
                .iter()
                .zip(&table.columns)
                .map(|(value, column)| render_value(value, column))
                .collect();
            table.rows.push(rendered);
        }
        Ok(())
    }

    fn table(&self, table: &str) -> Result<&TableData, ProviderError> {
        self.tables
            .get(&table.to_uppercase())
            .ok_or_else(|| ProviderError::UnknownTable(table.to_uppercase()))
    }

    fn make_row(name: &str, table: &TableData, values: &[String]) -> TableRow {
        let mut row = TableRow::new(&table.schema, name);
        for (column, value) in table.columns.iter().zip(values) {
            row.push(column.clone(), value.as_str());
        }
        row
    }

    fn matching_rows<'t>(
        table: &'t TableData,
        column: &str,
        literal: &'t str,
    ) -> Result<impl Iterator<Item = &'t Vec<String>> + 't, ProviderError> {
        let index = table.column_index(column).ok_or_else(|| ProviderError::UnknownColumn {
            table: String::new(),
            column: column.to_uppercase(),
        })?;
        let literal = coerce_literal(literal, ValueKind::of(&table.columns[index].data_type));
        Ok(table
            .rows
            .iter()
            .filter(move |values| literals_equal(&values[index], &literal)))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.tables.get(&table.to_uppercase()).map(|t| t.rows.len())
    }

    /// Sequence named by a `BEFORE INSERT` trigger on `table`.
    pub fn trigger_sequence(&self, table: &str) -> Option<&str> {
        self.triggers
            .get(&table.to_uppercase())
            .map(|t| t.sequence.as_str())
    }

    /// Every trigger-fed key column: the assigned column, or the table's
    /// first primary-key column when the trigger body does not name one.
    pub fn detected_generators(&self) -> GeneratorMap {
        let mut generators = GeneratorMap::new();
        for (table, trigger) in &self.triggers {
            let column = trigger.column.clone().or_else(|| {
                self.tables
                    .get(table)
                    .and_then(|t| t.primary_key.first().cloned())
            });
            match column {
                Some(column) => generators.insert(table, &column, &trigger.sequence),
                None => tracing::warn!(table = %table, "sequence trigger on table without key ignored"),
            }
        }
        generators
    }
}

impl MetadataProvider for Catalog {
    fn primary_key_columns(&self, table: &str) -> Result<Vec<String>, ProviderError> {
        Ok(self.table(table)?.primary_key.clone())
    }

    fn columns(
        &self,
        table: &str,
        pk_columns: &[String],
    ) -> Result<Vec<ColumnDefinition>, ProviderError> {
        Ok(self
            .table(table)?
            .columns
            .iter()
            .map(|c| {
                let mut column = c.clone();
                column.primary_key = pk_columns.iter().any(|pk| pk.eq_ignore_ascii_case(&c.name));
                column
            })
            .collect())
    }

    fn child_relations(&self, table: &str) -> Result<Vec<ForeignKeyRelation>, ProviderError> {
        self.table(table)?;
        let mut relations: Vec<ForeignKeyRelation> = self
            .relations
            .iter()
            .filter(|r| r.parent_table.eq_ignore_ascii_case(table))
            .cloned()
            .collect();
        relations.sort_by(|a, b| a.child_table.cmp(&b.child_table));
        Ok(relations)
    }

    fn fetch_rows_by_foreign_key(
        &self,
        child_table: &str,
        fk_column: &str,
        parent_key_literal: &str,
    ) -> Result<Vec<TableRow>, ProviderError> {
        let name = child_table.to_uppercase();
        let table = self.table(&name)?;
        let rows = Self::matching_rows(table, fk_column, parent_key_literal)
            .map_err(|e| with_table(e, &name))?
            .map(|values| Self::make_row(&name, table, values))
            .collect();
        Ok(rows)
    }

    fn fetch_row_by_lookup_column(
        &self,
        table: &str,
        column: &str,
        literal: &str,
    ) -> Result<Option<TableRow>, ProviderError> {
        let name = table.to_uppercase();
        let data = self.table(&name)?;
        let row = Self::matching_rows(data, column, literal)
            .map_err(|e| with_table(e, &name))?
            .next()
            .map(|values| Self::make_row(&name, data, values));
        Ok(row)
    }
}

fn with_table(err: ProviderError, table: &str) -> ProviderError {
    match err {
        ProviderError::UnknownColumn { column, .. } => ProviderError::UnknownColumn {
            table: table.to_string(),
            column,
        },
        other => other,
    }
}
