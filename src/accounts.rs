// Account store operations: the read surface plus add and remove

use crate::allocator::id_range::next_id;
use crate::core::config::{AccountsConfig, Config};
use crate::core::error::{DbError, Result};
use crate::db::file::{AccessMode, DbFile};
use crate::models::credential::Credential;
use crate::models::record::Record;
use crate::models::user::{User, DISABLED_PASSWORD};
use crate::query::selector::{CredentialSelector, FieldSelector, Query};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// The account store and its credential store, as named by the
/// configuration. Holds no open files; every call locks what it touches
/// for its own duration.
///
/// Cheap to share across threads behind an `Arc`.
#[derive(Debug, Clone)]
pub struct UserDb {
    config: Arc<Config>,
}

impl UserDb {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn accounts(&self) -> &AccountsConfig {
        &self.config.accounts
    }

    fn user_file(&self) -> &Path {
        &self.config.files.user_file
    }

    fn credential_file(&self) -> &Path {
        &self.config.files.credential_file
    }

    // == Lookup

    /// Account rows matching `query`, in file order.
    ///
    /// `limit` > 0 returns at most that many, 0 returns nothing without
    /// touching the store, < 0 returns every match.
    pub fn lookup_many(&self, query: &Query<FieldSelector>, limit: isize) -> Result<Vec<User>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut users =
            DbFile::scoped(self.user_file(), AccessMode::Read, |db| db.lookup::<User>(query, limit))?;

        for user in &mut users {
            user.is_system = self.accounts().is_system_id(user.uid);
        }
        Ok(users)
    }

    pub fn lookup_by_id(&self, uid: i64) -> Result<User> {
        self.lookup_first(FieldSelector::Uid(uid))
    }

    pub fn lookup_by_name(&self, name: &str) -> Result<User> {
        self.lookup_first(FieldSelector::Name(name.to_string()))
    }

    fn lookup_first(&self, selector: FieldSelector) -> Result<User> {
        self.lookup_many(&Query::single(selector), 1)?
            .into_iter()
            .next()
            .ok_or(DbError::NotFound)
    }

    /// The UserID the next allocating `add` would get right now.
    /// Another writer may take it first.
    pub fn next_uid(&self, is_system: bool) -> Result<i64> {
        let range = self.accounts().range_for(is_system);
        DbFile::scoped(self.user_file(), AccessMode::Read, |db| next_id(db, range))
    }

    /// Login name of the account the running process executes as.
    ///
    /// # Panics
    ///
    /// Panics if the process's user ID has no account row, since nothing
    /// sensible can continue without it.
    pub fn current_username(&self) -> String {
        let uid = current_uid();
        match self.lookup_by_id(uid) {
            Ok(user) => user.name,
            Err(e) => panic!("cannot resolve account for uid {}: {}", uid, e),
        }
    }

    pub fn lookup_credential(&self, name: &str) -> Result<Credential> {
        let query = Query::single(CredentialSelector::Name(name.to_string()));
        DbFile::scoped(self.credential_file(), AccessMode::Read, |db| db.lookup::<Credential>(&query, 1))?
            .into_iter()
            .next()
            .ok_or(DbError::NotFound)
    }

    // == Add

    /// Adds an account row and returns its UserID.
    ///
    /// A negative `uid` allocates the lowest free ID from the system or
    /// normal range, according to `is_system`. The uniqueness checks, the
    /// allocation and the append all happen under one exclusive lock.
    /// The password is always written as the disabled sentinel.
    pub fn add(&self, user: &User) -> Result<i64> {
        if user.name.is_empty() {
            return Err(DbError::RequiredField("name"));
        }
        if user.home.is_empty() {
            return Err(DbError::RequiredField("home"));
        }
        if user.shell.is_empty() {
            return Err(DbError::RequiredField("shell"));
        }

        let home_root = &self.accounts().home_root;
        if user.home == *home_root {
            return Err(DbError::HomeConflict(home_root.clone()));
        }

        let range = self.accounts().range_for(user.is_system);

        let uid = DbFile::scoped(self.user_file(), AccessMode::Append, |db| {
            let by_name = Query::single(FieldSelector::Name(user.name.clone()));
            match db.lookup::<User>(&by_name, 1) {
                Ok(_) => return Err(DbError::Exists),
                Err(DbError::NotFound) => {}
                Err(e) => return Err(e),
            }

            let uid = if user.uid < 0 {
                next_id(db, range)?
            } else {
                let by_id = Query::single(FieldSelector::Uid(user.uid));
                match db.lookup::<User>(&by_id, 1) {
                    Ok(_) => return Err(DbError::IdInUse(user.uid)),
                    Err(DbError::NotFound) => {}
                    Err(e) => return Err(e),
                }
                user.uid
            };

            let mut row = user.clone().with_password(DISABLED_PASSWORD);
            row.uid = uid;
            db.append(&row)?;
            Ok(uid)
        })?;

        info!(
            name = %user.name,
            uid,
            system = user.is_system,
            "Account added"
        );
        Ok(uid)
    }

    /// Adds a credential row. The hash is stored as given.
    pub fn add_credential(&self, credential: &Credential) -> Result<()> {
        if credential.name.is_empty() {
            return Err(DbError::RequiredField("name"));
        }

        DbFile::scoped(self.credential_file(), AccessMode::Append, |db| {
            let by_name = Query::single(CredentialSelector::Name(credential.name.clone()));
            match db.lookup::<Credential>(&by_name, 1) {
                Ok(_) => return Err(DbError::Exists),
                Err(DbError::NotFound) => {}
                Err(e) => return Err(e),
            }
            db.append(credential)
        })?;

        info!(name = %credential.name, "Credential added");
        Ok(())
    }

    // == Remove

    /// Removes the account row, then its credential row.
    ///
    /// The two stores are locked one after the other, not together. If the
    /// second step fails the account is already gone and the credential
    /// is left behind; nothing is rolled back.
    pub fn remove(&self, name: &str) -> Result<()> {
        remove_named::<User>(self.user_file(), name)?;

        if let Err(e) = remove_named::<Credential>(self.credential_file(), name) {
            warn!(
                name = %name,
                error = %e,
                "Account removed but its credential was not"
            );
            return Err(e);
        }

        info!(name = %name, "Account removed");
        Ok(())
    }
}

fn remove_named<R: Record>(path: &Path, name: &str) -> Result<()> {
    let removed = DbFile::scoped(path, AccessMode::Rewrite, |db| {
        db.retain(|record: &R| record.name() != name)
    })?;

    if removed == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

#[cfg(unix)]
fn current_uid() -> i64 {
    // SAFETY: getuid has no preconditions and cannot fail
    i64::from(unsafe { libc::getuid() })
}

#[cfg(not(unix))]
fn current_uid() -> i64 {
    -1
}
