//! Metadata provider contract.
//!
//! The traversal engine never talks to a database directly. Everything it
//! knows about tables, keys and rows comes through this trait, with row
//! values already rendered as SQL literals.

use crate::model::{ColumnDefinition, ForeignKeyRelation, TableRow};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),
    #[error("Unknown column: {table}.{column}")]
    UnknownColumn { table: String, column: String },
    #[error("Metadata provider failure: {0}")]
    Backend(String),
}

pub trait MetadataProvider {
    /// Primary-key column names in key order. Empty if the table has none.
    fn primary_key_columns(&self, table: &str) -> Result<Vec<String>, ProviderError>;

    /// Column definitions in physical order, flagged against `pk_columns`.
    fn columns(
        &self,
        table: &str,
        pk_columns: &[String],
    ) -> Result<Vec<ColumnDefinition>, ProviderError>;

    /// Every relation whose parent side is `table`.
    fn child_relations(&self, table: &str) -> Result<Vec<ForeignKeyRelation>, ProviderError>;

    /// All rows of `child_table` whose `fk_column` equals `parent_key_literal`.
    fn fetch_rows_by_foreign_key(
        &self,
        child_table: &str,
        fk_column: &str,
        parent_key_literal: &str,
    ) -> Result<Vec<TableRow>, ProviderError>;

    /// First row of `table` whose `column` equals `literal`, `None` when nothing matches.
    fn fetch_row_by_lookup_column(
        &self,
        table: &str,
        column: &str,
        literal: &str,
    ) -> Result<Option<TableRow>, ProviderError>;
}

impl<P: MetadataProvider + ?Sized> MetadataProvider for &P {
    fn primary_key_columns(&self, table: &str) -> Result<Vec<String>, ProviderError> {
        (**self).primary_key_columns(table)
    }

    fn columns(
        &self,
        table: &str,
        pk_columns: &[String],
    ) -> Result<Vec<ColumnDefinition>, ProviderError> {
        (**self).columns(table, pk_columns)
    }

    fn child_relations(&self, table: &str) -> Result<Vec<ForeignKeyRelation>, ProviderError> {
        (**self).child_relations(table)
    }

    fn fetch_rows_by_foreign_key(
        &self,
        child_table: &str,
        fk_column: &str,
        parent_key_literal: &str,
    ) -> Result<Vec<TableRow>, ProviderError> {
        (**self).fetch_rows_by_foreign_key(child_table, fk_column, parent_key_literal)
    }

    fn fetch_row_by_lookup_column(
        &self,
        table: &str,
        column: &str,
        literal: &str,
    ) -> Result<Option<TableRow>, ProviderError> {
        (**self).fetch_row_by_lookup_column(table, column, literal)
    }
}
