//! Account records for the demo booking endpoints.
//!
//! Accounts are keyed by lowercased email. Only the bcrypt hash of a password is stored.

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use shelfgate_core::auth::{Role, UserRef};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    #[must_use]
    pub fn user_ref(&self) -> UserRef {
        UserRef { id: self.id.clone(), email: Some(self.email.clone()), role: self.role }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("An account with this email already exists")]
    DuplicateEmail,

    #[error("No account with this email")]
    NotFound,
}

#[derive(Debug, Default)]
pub struct UserDirectory {
    users: DashMap<String, UserRecord>,
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

impl UserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// [`DirectoryError::DuplicateEmail`] if the email is taken.
    pub fn register(
        &self,
        name: &str,
        email: &str,
        password_hash: String,
        role: Role,
    ) -> Result<UserRecord, DirectoryError> {
        match self.users.entry(normalize(email)) {
            Entry::Occupied(_) => Err(DirectoryError::DuplicateEmail),
            Entry::Vacant(slot) => {
                let record = UserRecord {
                    id: Uuid::new_v4().to_string(),
                    name: name.trim().to_string(),
                    email: slot.key().clone(),
                    password_hash,
                    role,
                    created_at: Utc::now(),
                };
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    #[must_use]
    pub fn find(&self, email: &str) -> Option<UserRecord> {
        self.users.get(&normalize(email)).map(|r| r.clone())
    }

    /// Replaces a stored hash, e.g. after a rehash on login.
    ///
    /// # Errors
    ///
    /// [`DirectoryError::NotFound`] if no such account exists.
    pub fn update_hash(&self, email: &str, password_hash: String) -> Result<(), DirectoryError> {
        let mut record = self.users.get_mut(&normalize(email)).ok_or(DirectoryError::NotFound)?;
        record.password_hash = password_hash;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
