use crate::core::config::AccountsConfig;
use crate::core::error::{DbError, Result};
use crate::models::record::{split_row, Record};
use crate::query::selector::FieldSelector;
use std::path::PathBuf;

/// UserID value asking `UserDb::add` to allocate an identifier
pub const AUTO_UID: i64 = -1;

/// Password written for every new account. The real hash lives in the
/// credential store.
pub const DISABLED_PASSWORD: &str = "x";

const SYSTEM_SHELL: &str = "/bin/false";

/// One account row: `name:password:uid:gid:comment:home:shell`
///
/// Equality compares the stored fields only. `is_system` is not written to
/// the row, so it takes no part.
#[derive(Clone, Debug, Eq)]
pub struct User {
    /// Login name, unique across the store
    pub name: String,
    /// Hashed password or a sentinel. Never cleartext.
    password: String,
    /// Numeric user ID, or `AUTO_UID` before allocation
    pub uid: i64,
    pub gid: i64,
    /// Comment (GECOS) field
    pub comment: String,
    pub home: String,
    pub shell: String,
    /// Not persisted
    pub is_system: bool,
}

impl User {
    /// A normal account with home and shell taken from the configuration
    pub fn new(name: impl Into<String>, accounts: &AccountsConfig) -> Self {
        let name = name.into();
        let home = format!("{}/{}", accounts.home_root.trim_end_matches('/'), name);
        Self {
            name,
            password: String::new(),
            uid: AUTO_UID,
            gid: 0,
            comment: String::new(),
            home,
            shell: accounts.default_shell.clone(),
            is_system: false,
        }
    }

    /// A system account with a non-login shell
    pub fn new_system(name: impl Into<String>, home: impl Into<String>, gid: i64) -> Self {
        Self {
            name: name.into(),
            password: String::new(),
            uid: AUTO_UID,
            gid,
            comment: String::new(),
            home: home.into(),
            shell: SYSTEM_SHELL.to_string(),
            is_system: true,
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub(crate) fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.password == other.password
            && self.uid == other.uid
            && self.gid == other.gid
            && self.comment == other.comment
            && self.home == other.home
            && self.shell == other.shell
    }
}

fn parse_id(value: &str, row: &str, field: &'static str) -> Result<i64> {
    value.parse::<i64>().map_err(|_| DbError::FieldType {
        file: PathBuf::new(),
        row: row.to_string(),
        field,
    })
}

impl Record for User {
    type Selector = FieldSelector;

    const FIELD_COUNT: usize = 7;

    fn parse(row: &str) -> Result<Self> {
        let fields = split_row(row, Self::FIELD_COUNT).ok_or_else(|| DbError::MalformedRow {
            file: PathBuf::new(),
            row: row.to_string(),
        })?;

        // Both numeric fields are checked before anything else looks at the row
        let uid = parse_id(fields[2], row, "uid")?;
        let gid = parse_id(fields[3], row, "gid")?;

        Ok(User {
            name: fields[0].to_string(),
            password: fields[1].to_string(),
            uid,
            gid,
            comment: fields[4].to_string(),
            home: fields[5].to_string(),
            shell: fields[6].to_string(),
            is_system: false,
        })
    }

    fn to_row(&self) -> String {
        let mut uid = itoa::Buffer::new();
        let mut gid = itoa::Buffer::new();

        let mut row = String::with_capacity(
            self.name.len()
                + self.password.len()
                + self.comment.len()
                + self.home.len()
                + self.shell.len()
                + 32,
        );
        for (i, field) in [
            self.name.as_str(),
            self.password.as_str(),
            uid.format(self.uid),
            gid.format(self.gid),
            self.comment.as_str(),
            self.home.as_str(),
            self.shell.as_str(),
        ]
        .iter()
        .enumerate()
        {
            if i > 0 {
                row.push(':');
            }
            row.push_str(field);
        }
        row.push('\n');
        row
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, selector: &FieldSelector) -> bool {
        match selector {
            FieldSelector::Name(name) => self.name == *name,
            FieldSelector::Password(password) => self.password == *password,
            FieldSelector::Uid(uid) => self.uid == *uid,
            FieldSelector::Gid(gid) => self.gid == *gid,
            FieldSelector::Comment(comment) => self.comment == *comment,
            FieldSelector::Home(home) => self.home == *home,
            FieldSelector::Shell(shell) => self.shell == *shell,
            FieldSelector::All => true,
        }
    }

    fn fields(&self) -> Vec<&str> {
        vec![
            self.name.as_str(),
            self.password.as_str(),
            self.comment.as_str(),
            self.home.as_str(),
            self.shell.as_str(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALICE: &str = "alice:x:1000:1000:Alice:/home/alice:/bin/bash";

    #[test]
    fn test_parse_user_row() {
        let user = User::parse(ALICE).unwrap();

        assert_eq!(user.name, "alice");
        assert_eq!(user.password(), "x");
        assert_eq!(user.uid, 1000);
        assert_eq!(user.gid, 1000);
        assert_eq!(user.comment, "Alice");
        assert_eq!(user.home, "/home/alice");
        assert_eq!(user.shell, "/bin/bash");
        assert!(!user.is_system);
    }

    #[test]
    fn test_serialize_is_exact() {
        let user = User::parse(ALICE).unwrap();
        assert_eq!(user.to_row(), format!("{}\n", ALICE));
    }

    #[test]
    fn test_parse_wrong_field_count() {
        match User::parse("a:b:c") {
            Err(DbError::MalformedRow { row, .. }) => assert_eq!(row, "a:b:c"),
            other => panic!("Expected MalformedRow, got {:?}", other),
        }

        assert!(matches!(
            User::parse("a:x:1:1:c:/h:/bin/sh:extra"),
            Err(DbError::MalformedRow { .. })
        ));
    }

    #[test]
    fn test_parse_bad_uid() {
        match User::parse("bob:x:abc:100::/home/bob:/bin/sh") {
            Err(DbError::FieldType { field, row, .. }) => {
                assert_eq!(field, "uid");
                assert_eq!(row, "bob:x:abc:100::/home/bob:/bin/sh");
            }
            other => panic!("Expected FieldType, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bad_gid() {
        match User::parse("bob:x:100:::/home/bob:/bin/sh") {
            Err(DbError::FieldType { field, .. }) => assert_eq!(field, "gid"),
            other => panic!("Expected FieldType, got {:?}", other),
        }
    }

    #[test]
    fn test_new_user_defaults() {
        let accounts = AccountsConfig::default();
        let user = User::new("carol", &accounts);

        assert_eq!(user.home, "/home/carol");
        assert_eq!(user.shell, "/bin/sh");
        assert_eq!(user.uid, AUTO_UID);
        assert!(!user.is_system);
    }

    #[test]
    fn test_new_system_user() {
        let user = User::new_system("daemon", "/var/lib/daemon", 2);

        assert_eq!(user.shell, "/bin/false");
        assert_eq!(user.gid, 2);
        assert_eq!(user.uid, AUTO_UID);
        assert!(user.is_system);
    }

    #[test]
    fn test_matches_each_field() {
        let user = User::parse(ALICE).unwrap();

        assert!(user.matches(&FieldSelector::Name("alice".into())));
        assert!(user.matches(&FieldSelector::Uid(1000)));
        assert!(user.matches(&FieldSelector::Shell("/bin/bash".into())));
        assert!(user.matches(&FieldSelector::All));
        assert!(!user.matches(&FieldSelector::Gid(0)));
        assert!(!user.matches(&FieldSelector::Comment("Bob".into())));
    }

    #[test]
    fn test_system_user_roundtrip() {
        let mut daemon = User::new_system("daemon", "/var/lib/daemon", 2);
        daemon.uid = 150;

        let parsed = User::parse(&daemon.to_row()).unwrap();
        assert!(!parsed.is_system);
        assert_eq!(parsed, daemon);
    }

    fn field() -> impl Strategy<Value = String> {
        "[^:\n]{0,24}"
    }

    proptest! {
        #[test]
        fn test_row_roundtrip(
            name in field(),
            password in field(),
            uid in any::<i64>(),
            gid in any::<i64>(),
            comment in field(),
            home in field(),
            shell in field(),
            is_system in any::<bool>(),
        ) {
            let user = User {
                name,
                password,
                uid,
                gid,
                comment,
                home,
                shell,
                is_system,
            };
            let parsed = User::parse(&user.to_row()).unwrap();
            prop_assert_eq!(parsed, user);
        }
    }
}
