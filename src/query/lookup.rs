use crate::core::error::{DbError, Result};
use crate::models::record::Record;
use crate::query::selector::Query;
use std::io;

/// Scans rows top to bottom and collects the records matching `query`.
///
/// The limit decides how much of the store is read:
///   n > 0: at most n records, stopping once reached
///   n == 0: no scan, empty result
///   n < 0: every match
///
/// Every row is parsed in full before it is compared, so a row with a
/// corrupt numeric field fails the scan even for a name-only query.
/// Returns `NotFound` when a scan finds nothing.
pub fn scan<R, I>(rows: I, query: &Query<R::Selector>, limit: isize) -> Result<Vec<R>>
where
    R: Record,
    I: IntoIterator<Item = io::Result<String>>,
{
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();

    for row in rows {
        let row = row?;

        // Skip blank lines
        if row.is_empty() {
            continue;
        }

        let record = R::parse(&row)?;
        if query.first_match(|s| record.matches(s)).is_some() {
            found.push(record);
            if limit > 0 && found.len() >= limit as usize {
                break;
            }
        }
    }

    if found.is_empty() {
        return Err(DbError::NotFound);
    }

    Ok(found)
}
