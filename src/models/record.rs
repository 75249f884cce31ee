use crate::core::error::Result;
use crate::query::selector::Selector;

/// A row type stored one-per-line in a colon-delimited store
pub trait Record: Sized {
    type Selector: Selector;

    /// Number of `:`-separated fields in every row
    const FIELD_COUNT: usize;

    /// Parse one row. A trailing newline is accepted.
    ///
    /// Errors carry an empty file path; the file controller fills it in.
    fn parse(row: &str) -> Result<Self>;

    /// Serialize to a newline-terminated row
    fn to_row(&self) -> String;

    /// Key shared by the account and credential stores
    fn name(&self) -> &str;

    fn matches(&self, selector: &Self::Selector) -> bool;

    /// Field values as they will be written, for delimiter checks
    fn fields(&self) -> Vec<&str>;
}

/// Splits a row into exactly `count` fields, or `None` on a count mismatch
pub(crate) fn split_row(row: &str, count: usize) -> Option<Vec<&str>> {
    let row = row.strip_suffix('\n').unwrap_or(row);
    let fields: Vec<&str> = row.split(':').collect();
    if fields.len() != count {
        return None;
    }
    Some(fields)
}

/// True if no field would break the row format when written
pub(crate) fn fields_are_clean<R: Record>(record: &R) -> bool {
    record
        .fields()
        .iter()
        .all(|f| !f.contains(':') && !f.contains('\n'))
}
