/// Credential Store
///
/// Durable username -> password hash + role mapping, persisted as
/// `{"users": [...]}`. The store itself is not synchronized; callers
/// reach it through `AuthStore`, which serializes every access.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::AppError;
use crate::storage::json_file::JsonFile;
use crate::validators::is_valid_username;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(alias = "password")]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    /// SHA-256 digest of the invite token consumed by this registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite: Option<String>,
}

/// Fields supplied by registration
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

pub struct CredentialStore {
    file: JsonFile,
    users: Vec<User>,
}

impl CredentialStore {
    /// Loads the store from `path`, dropping records that break the
    /// id / username / hash invariants
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let file = JsonFile::new(path, "users");
        let (users, rejected) = sanitize_records(file.load::<User>());
        file.quarantine(&rejected);

        tracing::info!(
            path = %file.path().display(),
            users = users.len(),
            "Credential store loaded"
        );

        Self { file, users }
    }

    pub fn find_by_username(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.find_by_username(username).is_some()
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Adds a user and durably writes the store.
    ///
    /// Fails with `AppError::Duplicate` when the username exists
    /// (case-sensitive). On a write failure the in-memory store is left
    /// unchanged.
    pub fn create(
        &mut self,
        new_user: NewUser,
        invite: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        if self.contains(&new_user.username) {
            return Err(AppError::Duplicate(new_user.username));
        }

        let id = self.users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let user = User {
            id,
            username: new_user.username,
            password_hash: new_user.password_hash,
            role: new_user.role,
            created_at: now,
            invite,
        };

        self.users.push(user.clone());
        if let Err(e) = self.file.persist(&self.users) {
            self.users.pop();
            return Err(e);
        }

        Ok(user)
    }

    /// Removes a user and rewrites the store. Only used to undo a
    /// registration whose invite could not be consumed.
    pub(crate) fn remove(&mut self, id: u64) -> Result<(), AppError> {
        self.users.retain(|u| u.id != id);
        self.file.persist(&self.users)
    }
}

/// Splits loaded records into those that hold the id / username / hash
/// invariants and those that do not
fn sanitize_records(records: Vec<User>) -> (Vec<User>, Vec<User>) {
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();

    records.into_iter().partition(|user| {
        let problem = if user.id == 0 {
            Some("id must be positive")
        } else if !is_valid_username(&user.username) {
            Some("username violates policy")
        } else if !user.password_hash.starts_with("$2") {
            Some("password hash is not bcrypt")
        } else if !seen_ids.insert(user.id) {
            Some("duplicate id")
        } else if !seen_names.insert(user.username.clone()) {
            Some("duplicate username")
        } else {
            None
        };

        if let Some(problem) = problem {
            tracing::warn!(
                user_id = user.id,
                username = %user.username,
                problem = problem,
                "Quarantining invalid user record"
            );
            return false;
        }
        true
    })
}
