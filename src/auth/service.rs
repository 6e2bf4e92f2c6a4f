/// Auth Service
///
/// The single entry point the rest of the application uses: registration
/// with an invite token, password login guarded against brute force, and
/// session token verification for protected routes.

use std::sync::Arc;

use crate::auth::claims::Claims;
use crate::auth::jwt::SessionTokens;
use crate::auth::password::{hash_password, hash_password_blocking, verify_password_blocking};
use crate::clock::{Clock, SystemClock};
use crate::configuration::Settings;
use crate::error::{AppError, AuthError, TokenError};
use crate::security::{BruteForceGuard, GuardDecision};
use crate::storage::{AuthStore, InviteToken, NewUser, Role};
use crate::validators::{sanitize, validate_password, validate_username};

/// Hashed once at startup; verified against when the username is unknown
/// so both login failure paths cost one bcrypt verification
const DUMMY_PASSWORD: &str = "Dummy-password-1";

/// Successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub username: String,
    pub user_id: u64,
}

pub struct AuthService {
    store: AuthStore,
    tokens: SessionTokens,
    /// Keyed by client address
    login_guard: BruteForceGuard,
    /// Keyed by sanitized username
    invite_guard: BruteForceGuard,
    clock: Arc<dyn Clock>,
    hash_cost: u32,
    dummy_hash: String,
}

impl AuthService {
    pub fn new(
        store: AuthStore,
        tokens: SessionTokens,
        clock: Arc<dyn Clock>,
        hash_cost: u32,
    ) -> Result<Self, AppError> {
        let dummy_hash = hash_password(DUMMY_PASSWORD, hash_cost)?;

        Ok(Self {
            store,
            tokens,
            login_guard: BruteForceGuard::new("login", Arc::clone(&clock)),
            invite_guard: BruteForceGuard::new("invite", Arc::clone(&clock)),
            clock,
            hash_cost,
            dummy_hash,
        })
    }

    /// Opens storage and resolves the signing secret from `settings`
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = AuthStore::open(&settings.storage)?;
        let tokens = SessionTokens::from_settings(
            &settings.jwt,
            settings.application.environment,
            Arc::clone(&clock),
        )?;

        Self::new(store, tokens, clock, settings.password.hash_cost)
    }

    /// Registers a new account and consumes `invite_token`.
    ///
    /// Checks, in order: invite-abuse lockout for the username, the invite
    /// itself, username format, password strength, username uniqueness.
    /// Returns the new user id.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        invite_token: &str,
    ) -> Result<u64, AppError> {
        let guard_key = sanitize(username);

        let attempt = self
            .invite_guard
            .begin(&guard_key)
            .map_err(|retry_after_secs| TokenError::TooManyAttempts { retry_after_secs })?;

        if let Err(e) = self.store.validate_invite(invite_token, self.clock.now()) {
            if let GuardDecision::Blocked { retry_after_secs } = attempt.fail() {
                return Err(TokenError::TooManyAttempts { retry_after_secs }.into());
            }
            return Err(e.into());
        }

        let username = validate_username(username)?;
        validate_password(password)?;

        if self.store.username_taken(&username) {
            return Err(AppError::Duplicate(username));
        }

        let password_hash = hash_password_blocking(password.to_string(), self.hash_cost).await?;

        if let GuardDecision::Blocked { retry_after_secs } = attempt.recheck() {
            return Err(TokenError::TooManyAttempts { retry_after_secs }.into());
        }

        let user = self.store.register_user(
            NewUser {
                username,
                password_hash,
                role: Role::User,
            },
            invite_token,
            self.clock.now(),
        )?;

        // The account exists at this point; only the history reset matters
        let _ = attempt.succeed();

        tracing::info!(
            user_id = user.id,
            username = %user.username,
            "User registered successfully"
        );

        Ok(user.id)
    }

    /// Authenticates `username`/`password` for a client at `source_key`.
    ///
    /// A locked-out source is rejected before the credential store is
    /// touched, and a lockout that lands while the password is verifying
    /// still refuses the login. Unknown usernames and wrong passwords
    /// produce the same error.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        source_key: &str,
    ) -> Result<LoginOutcome, AppError> {
        let attempt = match self.login_guard.begin(source_key) {
            Ok(attempt) => attempt,
            Err(retry_after_secs) => {
                tracing::warn!(source = %source_key, "Login rejected, source is locked out");
                return Err(AuthError::TooManyAttempts { retry_after_secs }.into());
            }
        };

        let username = sanitize(username);
        let user = self.store.find_user(&username);

        let hash = user
            .as_ref()
            .map(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());

        let matches = match verify_password_blocking(password.to_string(), hash).await {
            Ok(matches) => matches,
            Err(AppError::Internal(msg)) => {
                tracing::error!(username = %username, error = %msg, "Stored password hash unusable");
                false
            }
            Err(e) => return Err(e),
        };

        let user = match user {
            Some(user) if matches => user,
            _ => {
                attempt.fail();
                tracing::warn!(source = %source_key, "Invalid login attempt");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        // The source may have been locked out while the hash was verifying
        if let GuardDecision::Blocked { retry_after_secs } = attempt.succeed() {
            return Err(AuthError::TooManyAttempts { retry_after_secs }.into());
        }

        let token = self.tokens.issue(&user)?;

        tracing::info!(user_id = user.id, source = %source_key, "User logged in successfully");

        Ok(LoginOutcome {
            token,
            username: user.username,
            user_id: user.id,
        })
    }

    /// Verifies a bearer token; the entry point for every protected operation
    pub fn verify_request(&self, token: &str) -> Result<Claims, AuthError> {
        self.tokens.verify(token)
    }

    /// Issues a fresh invite token
    pub fn issue_invite(&self) -> Result<InviteToken, AppError> {
        self.store.issue_invite(self.clock.now())
    }
}
