use std::fmt;
use std::fmt::{Display, Formatter};

pub mod memory;
pub mod postgresql;
pub mod rows;

use crate::dump::{Employee, Rate};
use crate::error::StorageError;

/// Outcome of one `insert_all` call.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct InsertReport {
    pub inserted: usize,
    /// Rows whose key was already stored.
    pub ignored: usize,
    /// Records that never became rows.
    pub skipped: usize,
}

impl Display for InsertReport {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} inserted, {} already present, {} skipped", self.inserted, self.ignored, self.skipped)
    }
}

/// Destination of parsed dumps.
///
/// Inserts have insert-or-ignore semantics: a row whose key is already
/// stored is left untouched and counted as ignored.
pub trait StorageSink {
    /// Safe to call on a store that already has the schema.
    fn create_schema(&mut self) -> Result<(), StorageError>;

    fn insert_all(&mut self, employees: &[Employee], rates: &[Rate]) -> Result<InsertReport, StorageError>;
}
