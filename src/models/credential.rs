use crate::core::error::{DbError, Result};
use crate::models::record::{split_row, Record};
use crate::query::selector::CredentialSelector;
use std::path::PathBuf;

/// Password written for a credential that has no hash yet
pub const LOCKED_PASSWORD: &str = "!";

/// One credential row, keyed by the same name as the account row:
/// `name:password:last_change:min_age:max_age:warn_period:inactive:expire:reserved`
///
/// Empty numeric fields mean the policy is not set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub name: String,
    /// Opaque hash from the host's hashing facility
    pub password: String,
    /// Days since the epoch of the last password change
    pub last_change: Option<i64>,
    pub min_age: Option<i64>,
    pub max_age: Option<i64>,
    pub warn_period: Option<i64>,
    pub inactive: Option<i64>,
    /// Days since the epoch when the account expires
    pub expire: Option<i64>,
    pub reserved: String,
}

impl Credential {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: LOCKED_PASSWORD.to_string(),
            last_change: None,
            min_age: None,
            max_age: None,
            warn_period: None,
            inactive: None,
            expire: None,
            reserved: String::new(),
        }
    }

    /// Attach a hash computed elsewhere. The store never inspects it.
    pub fn with_password(mut self, hash: impl Into<String>) -> Self {
        self.password = hash.into();
        self
    }
}

fn parse_policy(value: &str, row: &str, field: &'static str) -> Result<Option<i64>> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<i64>()
        .map(Some)
        .map_err(|_| DbError::FieldType {
            file: PathBuf::new(),
            row: row.to_string(),
            field,
        })
}

fn push_policy(row: &mut String, value: Option<i64>) {
    row.push(':');
    if let Some(v) = value {
        row.push_str(itoa::Buffer::new().format(v));
    }
}

impl Record for Credential {
    type Selector = CredentialSelector;

    const FIELD_COUNT: usize = 9;

    fn parse(row: &str) -> Result<Self> {
        let fields = split_row(row, Self::FIELD_COUNT).ok_or_else(|| DbError::MalformedRow {
            file: PathBuf::new(),
            row: row.to_string(),
        })?;

        Ok(Credential {
            name: fields[0].to_string(),
            password: fields[1].to_string(),
            last_change: parse_policy(fields[2], row, "last_change")?,
            min_age: parse_policy(fields[3], row, "min_age")?,
            max_age: parse_policy(fields[4], row, "max_age")?,
            warn_period: parse_policy(fields[5], row, "warn_period")?,
            inactive: parse_policy(fields[6], row, "inactive")?,
            expire: parse_policy(fields[7], row, "expire")?,
            reserved: fields[8].to_string(),
        })
    }

    fn to_row(&self) -> String {
        let mut row = String::with_capacity(self.name.len() + self.password.len() + 48);
        row.push_str(&self.name);
        row.push(':');
        row.push_str(&self.password);
        for value in [
            self.last_change,
            self.min_age,
            self.max_age,
            self.warn_period,
            self.inactive,
            self.expire,
        ] {
            push_policy(&mut row, value);
        }
        row.push(':');
        row.push_str(&self.reserved);
        row.push('\n');
        row
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, selector: &CredentialSelector) -> bool {
        match selector {
            CredentialSelector::Name(name) => self.name == *name,
            CredentialSelector::Password(password) => self.password == *password,
            CredentialSelector::All => true,
        }
    }

    fn fields(&self) -> Vec<&str> {
        vec![
            self.name.as_str(),
            self.password.as_str(),
            self.reserved.as_str(),
        ]
    }
}
