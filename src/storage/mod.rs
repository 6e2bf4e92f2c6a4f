/// Durable auth state
///
/// `AuthStore` owns the Credential Store and the Invite-Token Ledger
/// behind a single mutex, so every read-modify-write on either file
/// happens one at a time.

mod json_file;
mod invites;
mod users;

pub use invites::{InviteLedger, InviteToken};
pub use users::{CredentialStore, NewUser, Role, User};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;

use crate::configuration::StorageSettings;
use crate::error::{AppError, StorageError, TokenError};

struct StoreInner {
    users: CredentialStore,
    invites: InviteLedger,
}

pub struct AuthStore {
    inner: Mutex<StoreInner>,
}

impl AuthStore {
    /// Opens both files under the configured data directory and repairs
    /// invites left unconsumed by an interrupted registration
    pub fn open(settings: &StorageSettings) -> Result<Self, AppError> {
        std::fs::create_dir_all(&settings.data_dir).map_err(|e| {
            StorageError::Write(format!(
                "cannot create data directory {}: {}",
                settings.data_dir.display(),
                e
            ))
        })?;

        Self::from_parts(
            CredentialStore::open(settings.users_path()),
            InviteLedger::open(settings.tokens_path()),
        )
    }

    pub fn from_parts(users: CredentialStore, mut invites: InviteLedger) -> Result<Self, AppError> {
        let consumed: HashSet<String> = users
            .users()
            .iter()
            .filter_map(|u| u.invite.clone())
            .collect();

        let repaired = invites.reconcile(&consumed)?;
        if repaired > 0 {
            tracing::warn!(
                repaired = repaired,
                "Marked invites consumed by an interrupted registration as used"
            );
        }

        Ok(Self {
            inner: Mutex::new(StoreInner { users, invites }),
        })
    }

    pub fn find_user(&self, username: &str) -> Option<User> {
        self.inner.lock().users.find_by_username(username).cloned()
    }

    pub fn username_taken(&self, username: &str) -> bool {
        self.inner.lock().users.contains(username)
    }

    pub fn user_count(&self) -> usize {
        self.inner.lock().users.len()
    }

    pub fn validate_invite(&self, token: &str, now: DateTime<Utc>) -> Result<(), TokenError> {
        self.inner.lock().invites.validate(token, now)
    }

    pub fn issue_invite(&self, now: DateTime<Utc>) -> Result<InviteToken, AppError> {
        self.inner.lock().invites.issue(now)
    }

    /// Creates the user and consumes the invite as one step.
    ///
    /// The invite and the username are re-checked under the lock. The user
    /// is written first; if consuming the invite then fails, the user is
    /// removed again so the invite stays usable and no account exists.
    pub fn register_user(
        &self,
        new_user: NewUser,
        invite_token: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let mut inner = self.inner.lock();

        inner.invites.validate(invite_token, now)?;
        if inner.users.contains(&new_user.username) {
            return Err(AppError::Duplicate(new_user.username));
        }

        let user = inner
            .users
            .create(new_user, Some(invites::digest(invite_token)), now)?;

        if let Err(e) = inner.invites.mark_used(invite_token) {
            tracing::error!(
                user_id = user.id,
                error = %e,
                "Failed to consume invite, rolling back registration"
            );
            if let Err(rollback) = inner.users.remove(user.id) {
                // The user record stays on disk; its invite digest makes the
                // next startup mark the invite used.
                tracing::error!(
                    user_id = user.id,
                    error = %rollback,
                    "Rollback failed"
                );
            }
            return Err(e);
        }

        Ok(user)
    }
}
