//! Row graph value objects.

use indexmap::IndexMap;
use std::fmt;

/// Child table name (upper case) -> every relation pointing out of that table.
pub type FkRelationMap = IndexMap<String, Vec<ForeignKeyRelation>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnDefinition {
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        nullable: bool,
        primary_key: bool,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            primary_key,
        }
    }
}

impl fmt::Display for ColumnDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.primary_key {
            write!(f, "{} ({}, PK)", self.name, self.data_type)
        } else {
            write!(f, "{} ({})", self.name, self.data_type)
        }
    }
}

/// One fetched row. Values are SQL literals (`42`, `'Text'`, `NULL`,
/// `TO_DATE(...)`) in physical column order, each paired with its
/// column definition under the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    schema: String,
    table: String,
    values: IndexMap<String, String>,
    columns: IndexMap<String, ColumnDefinition>,
}

impl TableRow {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            values: IndexMap::new(),
            columns: IndexMap::new(),
        }
    }

    /// Adds a column; the value and definition maps are always filled together.
    pub fn push(&mut self, column: ColumnDefinition, literal: impl Into<String>) {
        self.values.insert(column.name.clone(), literal.into());
        self.columns.insert(column.name.clone(), column);
    }

    pub fn with(mut self, column: ColumnDefinition, literal: impl Into<String>) -> Self {
        self.push(column, literal);
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_table(&self, name: &str) -> bool {
        self.table.eq_ignore_ascii_case(name)
    }

    pub fn value(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    pub fn values(&self) -> &IndexMap<String, String> {
        &self.values
    }

    pub fn columns(&self) -> &IndexMap<String, ColumnDefinition> {
        &self.columns
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.values().filter(|c| c.primary_key)
    }

    /// Identity used when deduplicating rows across traversals.
    pub fn identity(&self) -> RowIdentity {
        RowIdentity {
            schema: self.schema.clone(),
            table: self.table.clone(),
            values: self
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// (schema, table, full ordered value mapping).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowIdentity {
    pub schema: String,
    pub table: String,
    pub values: Vec<(String, String)>,
}

/// Upper-cased (table, column) pair used as a composite map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableColumn {
    pub table: String,
    pub column: String,
}

impl TableColumn {
    pub fn new(table: &str, column: &str) -> Self {
        Self {
            table: table.trim().to_uppercase(),
            column: column.trim().to_uppercase(),
        }
    }
}

impl fmt::Display for TableColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// `child_table.fk_column -> parent_table.parent_pk_column`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKeyRelation {
    pub child_table: String,
    pub fk_column: String,
    pub parent_table: String,
    pub parent_pk_column: String,
}

impl ForeignKeyRelation {
    pub fn new(
        child_table: impl Into<String>,
        fk_column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_pk_column: impl Into<String>,
    ) -> Self {
        Self {
            child_table: child_table.into(),
            fk_column: fk_column.into(),
            parent_table: parent_table.into(),
            parent_pk_column: parent_pk_column.into(),
        }
    }

    /// Same child table and foreign-key column, ignoring case.
    pub fn same_child_column(&self, other: &ForeignKeyRelation) -> bool {
        self.child_table.eq_ignore_ascii_case(&other.child_table)
            && self.fk_column.eq_ignore_ascii_case(&other.fk_column)
    }

    pub fn eq_ignore_case(&self, other: &ForeignKeyRelation) -> bool {
        self.same_child_column(other)
            && self.parent_table.eq_ignore_ascii_case(&other.parent_table)
            && self
                .parent_pk_column
                .eq_ignore_ascii_case(&other.parent_pk_column)
    }

    pub fn parent_key(&self) -> TableColumn {
        TableColumn::new(&self.parent_table, &self.parent_pk_column)
    }
}

impl fmt::Display for ForeignKeyRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.child_table, self.fk_column, self.parent_table, self.parent_pk_column
        )
    }
}

/// Node of the dependency tree shown as a traversal preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub table: String,
    pub column: String,
    pub value: String,
    pub row_count: usize,
    pub children: Vec<DependencyNode>,
    pub row_labels: Vec<String>,
}

impl DependencyNode {
    const MAX_LABELS: usize = 3;

    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
        row_count: usize,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            value: value.into(),
            row_count,
            children: Vec::new(),
            row_labels: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including itself.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(DependencyNode::len).sum::<usize>()
    }

    pub fn summary(&self) -> String {
        let noun = if self.row_count == 1 { "row" } else { "rows" };
        format!("({} {})", self.row_count, noun)
    }

    pub fn label_text(&self) -> Option<String> {
        if self.row_labels.is_empty() {
            return None;
        }
        let shown: Vec<&str> = self
            .row_labels
            .iter()
            .take(Self::MAX_LABELS)
            .map(String::as_str)
            .collect();
        let mut text = shown.join(", ");
        if self.row_labels.len() > Self::MAX_LABELS {
            text.push_str(", …");
        }
        Some(text)
    }
}

impl fmt::Display for DependencyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {}", self.table, self.summary())?;
        if let Some(labels) = self.label_text() {
            write!(f, "  -  {}", labels)?;
        }
        Ok(())
    }
}

/// Output of one traversal, or of several merged ones.
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalResult {
    pub root: DependencyNode,
    /// Parent before child, breadth-first.
    pub rows: Vec<TableRow>,
    /// Rows per table in first-encountered order.
    pub table_counts: IndexMap<String, usize>,
    pub fk_relations: FkRelationMap,
}

impl TraversalResult {
    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }
}
