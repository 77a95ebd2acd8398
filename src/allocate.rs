//! Substitute-value identifiers for generated primary keys.
//!
//! When the target assigns its own surrogate keys, every flagged primary-key
//! value gets a PL/SQL variable. Child rows pointing at such a parent reuse the
//! parent's variable in their foreign-key column, so the new key is threaded
//! through every level of the script.

use crate::error::{Error, Result};
use crate::literal::{ValueKind, is_text_literal};
use crate::model::{FkRelationMap, TableColumn, TableRow, TraversalResult};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

/// Maximum identifier length accepted by the target.
pub const MAX_IDENTIFIER_LEN: usize = 30;

/// (table, primary-key column) -> name of the value generator (a sequence).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratorMap {
    entries: IndexMap<TableColumn, String>,
}

impl GeneratorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: &str, column: &str, generator: &str) {
        self.entries.insert(
            TableColumn::new(table, column),
            generator.trim().to_uppercase(),
        );
    }

    /// Parses `TABLE.COLUMN=SEQUENCE` and adds it.
    pub fn insert_mapping(&mut self, mapping: &str) -> Result<()> {
        let (key, generator) = parse_mapping(mapping)?;
        self.entries.insert(key, generator);
        Ok(())
    }

    pub fn get(&self, table: &str, column: &str) -> Option<&str> {
        self.entries
            .get(&TableColumn::new(table, column))
            .map(String::as_str)
    }

    pub fn contains(&self, key: &TableColumn) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TableColumn, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }
}

impl FromIterator<(TableColumn, String)> for GeneratorMap {
    fn from_iter<I: IntoIterator<Item = (TableColumn, String)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k, v.trim().to_uppercase()))
                .collect(),
        }
    }
}

fn parse_mapping(mapping: &str) -> Result<(TableColumn, String)> {
    let malformed = || Error::Input(format!("expected TABLE.COLUMN=SEQUENCE, got '{}'", mapping));
    let (target, generator) = mapping.split_once('=').ok_or_else(malformed)?;
    let (table, column) = target.split_once('.').ok_or_else(malformed)?;
    if table.trim().is_empty() || column.trim().is_empty() || generator.trim().is_empty() {
        return Err(malformed());
    }
    Ok((
        TableColumn::new(table, column),
        generator.trim().to_uppercase(),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Number,
    Text,
}

impl ScalarType {
    /// Unquoted literals are numeric, quoted ones text.
    pub fn of_literal(literal: &str) -> Self {
        if is_text_literal(literal) {
            Self::Text
        } else {
            Self::Number
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number => write!(f, "NUMBER"),
            Self::Text => write!(f, "VARCHAR2(200)"),
        }
    }
}

/// (table, column, original literal) of one generated key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingKey {
    pub column: TableColumn,
    pub literal: String,
}

impl BindingKey {
    pub fn new(table: &str, column: &str, literal: &str) -> Self {
        Self {
            column: TableColumn::new(table, column),
            literal: literal.to_string(),
        }
    }
}

/// Identifiers allocated for one script-assembly run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    identifiers: IndexMap<BindingKey, String>,
    generators: IndexMap<String, String>,
    types: IndexMap<String, ScalarType>,
}

impl Bindings {
    pub fn identifier(&self, table: &str, column: &str, literal: &str) -> Option<&str> {
        self.identifiers
            .get(&BindingKey::new(table, column, literal))
            .map(String::as_str)
    }

    /// Generator producing the runtime value of `identifier`.
    pub fn generator(&self, identifier: &str) -> Option<&str> {
        self.generators.get(identifier).map(String::as_str)
    }

    pub fn scalar_type(&self, identifier: &str) -> Option<ScalarType> {
        self.types.get(identifier).copied()
    }

    /// Identifiers with their types, in allocation order.
    pub fn declarations(&self) -> impl Iterator<Item = (&str, ScalarType)> {
        self.types.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }
}

/// `v_<COLUMN>_<n>`, never longer than [`MAX_IDENTIFIER_LEN`]. The base is
/// shortened so the suffix always fits.
pub fn variable_name(column: &str, n: usize) -> String {
    let suffix = format!("_{}", n);
    let mut base = format!("v_{}", column.trim().to_uppercase());
    let max_base = MAX_IDENTIFIER_LEN.saturating_sub(suffix.len());
    while base.len() > max_base {
        base.pop();
    }
    base + &suffix
}

/// Allocates one identifier per distinct generated key value in `rows`.
///
/// Numbering is per column name, in row order, so the first `ORDER_ID` seen
/// becomes `v_ORDER_ID_1` regardless of table.
pub fn allocate_variables(rows: &[TableRow], generators: &GeneratorMap) -> Bindings {
    let mut bindings = Bindings::default();
    if generators.is_empty() {
        return bindings;
    }
    let mut counters: HashMap<String, usize> = HashMap::new();

    for row in rows {
        for column in row.primary_key_columns() {
            let Some(generator) = generators.get(row.table(), &column.name) else {
                continue;
            };
            let literal = row.value(&column.name).unwrap_or("NULL");
            let key = BindingKey::new(row.table(), &column.name, literal);
            if bindings.identifiers.contains_key(&key) {
                continue;
            }

            let n = counters
                .entry(column.name.to_uppercase())
                .and_modify(|n| *n += 1)
                .or_insert(1);
            let identifier = variable_name(&column.name, *n);
            tracing::debug!(key = %key.column, literal, identifier = %identifier, "allocated variable");

            bindings
                .generators
                .insert(identifier.clone(), generator.to_string());
            bindings
                .types
                .insert(identifier.clone(), ScalarType::of_literal(literal));
            bindings.identifiers.insert(key, identifier);
        }
    }
    bindings
}

/// Column -> identifier replacing its value in this row.
///
/// A primary-key column uses its own identifier. Otherwise a foreign-key
/// column whose parent key is generated takes the parent's identifier for
/// this row's value; the first relation of that column with a generated
/// parent decides.
pub fn substitutions_for(
    row: &TableRow,
    generators: &GeneratorMap,
    bindings: &Bindings,
    fk_relations: &FkRelationMap,
) -> IndexMap<String, String> {
    let mut subs = IndexMap::new();
    if bindings.is_empty() {
        return subs;
    }
    let relations = fk_relations
        .get(&row.table().to_uppercase())
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for (name, column) in row.columns() {
        let literal = row.value(name).unwrap_or("NULL");

        if column.primary_key {
            if let Some(identifier) = bindings.identifier(row.table(), name, literal) {
                subs.insert(name.clone(), identifier.to_string());
                continue;
            }
        }

        let generated_parent = relations
            .iter()
            .filter(|rel| rel.fk_column.eq_ignore_ascii_case(name))
            .find(|rel| generators.contains(&rel.parent_key()));
        if let Some(rel) = generated_parent {
            if let Some(identifier) =
                bindings.identifier(&rel.parent_table, &rel.parent_pk_column, literal)
            {
                subs.insert(name.clone(), identifier.to_string());
            }
        }
    }
    subs
}

/// Primary-key columns of traversed tables that could be fed by a
/// generator: not a foreign-key column themselves and not date-typed.
pub fn generator_candidates(result: &TraversalResult) -> Vec<TableColumn> {
    let mut candidates = Vec::new();
    for table in result.table_counts.keys() {
        let Some(row) = result.rows.iter().find(|r| r.is_table(table)) else {
            continue;
        };
        let relations = result
            .fk_relations
            .get(&table.to_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for column in row.primary_key_columns() {
            let is_fk = relations
                .iter()
                .any(|rel| rel.fk_column.eq_ignore_ascii_case(&column.name));
            if is_fk || ValueKind::of(&column.data_type).is_temporal() {
                continue;
            }
            candidates.push(TableColumn::new(table, &column.name));
        }
    }
    candidates
}
