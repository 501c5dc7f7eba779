use std::io;

use thiserror::Error;

use crate::dump::SectionKind;

/// Fatal problems found while walking the dump.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("line {line}: `{section}` header with no open employee")]
    Structural { line: usize, section: SectionKind },
}

/// A stored field that could not be converted to its typed form.
/// Never fatal; callers decide whether to skip the record or store NULL.
#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    #[error("field `{key}` is not a decimal: `{value}`")]
    InvalidDecimal { key: String, value: String },

    #[error("field `{0}` is missing")]
    Missing(String),

    #[error("field `{key}` is not an integer: `{value}`")]
    InvalidInteger { key: String, value: String },

    #[error("donation amount `{0}` has no currency code")]
    MissingCurrency(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("table {0} does not exist, create the schema first")]
    MissingSchema(&'static str),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error on {path}: {source}")]
    Io { path: String, source: io::Error },

    #[error("failed to parse config {path}: {source}")]
    Config { path: String, source: toml::de::Error },

    #[error("failed to walk {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{path}: {source}")]
    Parse { path: String, source: ParseError },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
