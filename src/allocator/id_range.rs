use crate::core::config::IdRange;
use crate::core::error::{DbError, Result};
use crate::db::file::DbFile;
use crate::models::user::User;
use crate::query::selector::Query;
use std::collections::BTreeSet;

/// Lowest identifier in `range` that is absent from `used`
pub fn lowest_free<I>(used: I, range: IdRange) -> Result<i64>
where
    I: IntoIterator<Item = i64>,
{
    let taken: BTreeSet<i64> = used.into_iter().filter(|id| range.contains(*id)).collect();

    let exhausted = || DbError::RangeExhausted {
        low: range.low,
        high: range.high,
    };

    let mut candidate = range.low;
    for id in taken {
        if id != candidate {
            break;
        }
        candidate = candidate.checked_add(1).ok_or_else(exhausted)?;
    }

    if candidate > range.high {
        return Err(exhausted());
    }
    Ok(candidate)
}

/// Picks the next free UserID from the rows of an open account store.
///
/// The answer only stays valid while `db` keeps its lock, so a caller that
/// writes the chosen ID must do so through the same `DbFile`.
pub fn next_id(db: &DbFile, range: IdRange) -> Result<i64> {
    let users: Vec<User> = match db.lookup(&Query::all(), -1) {
        Ok(users) => users,
        Err(DbError::NotFound) => Vec::new(),
        Err(e) => return Err(e),
    };

    lowest_free(users.iter().map(|u| u.uid), range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::file::AccessMode;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_store_gets_low_bound() {
        assert_eq!(lowest_free(Vec::new(), IdRange::new(1000, 1999)).unwrap(), 1000);
    }

    #[test]
    fn test_fills_first_gap() {
        let used = vec![1000, 1001, 1003, 5, 70000];
        assert_eq!(lowest_free(used, IdRange::new(1000, 1999)).unwrap(), 1002);
    }

    #[test]
    fn test_unsorted_input() {
        let used = vec![1002, 1000, 1001];
        assert_eq!(lowest_free(used, IdRange::new(1000, 1999)).unwrap(), 1003);
    }

    #[test]
    fn test_range_exhausted() {
        let used = vec![10, 11, 12];
        match lowest_free(used, IdRange::new(10, 12)) {
            Err(DbError::RangeExhausted { low, high }) => {
                assert_eq!(low, 10);
                assert_eq!(high, 12);
            }
            other => panic!("Expected RangeExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_single_slot_range() {
        assert_eq!(lowest_free(vec![99], IdRange::new(100, 100)).unwrap(), 100);
        assert!(lowest_free(vec![100], IdRange::new(100, 100)).is_err());
    }

    #[test]
    fn test_next_id_from_store() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("passwd");
        fs::write(
            &path,
            "root:x:0:0:root:/root:/bin/bash\n\
             daemon:x:100:100::/:/bin/false\n\
             alice:x:1000:1000:Alice:/home/alice:/bin/bash\n",
        )
        .unwrap();

        let db = DbFile::open(&path, AccessMode::Read).unwrap();
        assert_eq!(next_id(&db, IdRange::new(1000, 1999)).unwrap(), 1001);
        assert_eq!(next_id(&db, IdRange::new(100, 999)).unwrap(), 101);
        db.close().unwrap();
    }

    #[test]
    fn test_next_id_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("passwd");
        fs::write(&path, "").unwrap();

        let db = DbFile::open(&path, AccessMode::Read).unwrap();
        assert_eq!(next_id(&db, IdRange::new(1000, 1999)).unwrap(), 1000);
    }
}
