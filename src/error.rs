use crate::provider::ProviderError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Schema error on {table}: {message}")]
    Schema { table: String, message: String },
    #[error("No row found: {table}.{column} = {literal}")]
    NotFound {
        table: String,
        column: String,
        literal: String,
    },
    #[error("Invalid input: {0}")]
    Input(String),
    #[error(transparent)]
    Provider(ProviderError),
}

impl Error {
    pub fn schema(table: &str, message: impl Into<String>) -> Self {
        Self::Schema {
            table: table.to_string(),
            message: message.into(),
        }
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UnknownTable(table) => Self::Schema {
                message: "table does not exist".to_string(),
                table,
            },
            ProviderError::UnknownColumn { table, column } => Self::Schema {
                message: format!("column {} does not exist", column),
                table,
            },
            other => Self::Provider(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
