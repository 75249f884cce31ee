//! Flat-file account store: a colon-delimited account file plus its
//! parallel credential file, with locked lookups, ID allocation and
//! crash-safe removal.

pub mod core {
    pub mod config;
    pub mod error;
    pub mod tracing_init;
}

pub mod models {
    pub mod credential;
    pub mod record;
    pub mod user;
}

pub mod query {
    pub mod lookup;
    pub mod selector;
}

pub mod db {
    pub mod file;
    pub mod lock;
}

pub mod allocator {
    pub mod id_range;
}

pub mod accounts;

pub use accounts::UserDb;
pub use crate::core::config::{AccountsConfig, Config, IdRange};
pub use crate::core::error::{DbError, Result};
pub use models::credential::Credential;
pub use models::record::Record;
pub use models::user::{User, AUTO_UID};
pub use query::selector::{CredentialSelector, FieldSelector, Query};
