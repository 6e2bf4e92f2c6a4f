/// Password Hashing and Verification
///
/// bcrypt hashing and verification. Both are CPU-bound, so the async
/// variants move the work onto tokio's blocking pool and keep the
/// request workers free.

use bcrypt::{hash, verify};

use crate::error::AppError;

/// Lowest work factor bcrypt accepts. Only for tests and tooling.
pub const MIN_HASH_COST: u32 = 4;

/// Hash a password using bcrypt at `cost`
///
/// # Errors
/// Returns error if bcrypt hashing fails (e.g. cost out of range)
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// # Errors
/// Returns error if the stored hash cannot be parsed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// `hash_password` on the blocking pool
pub async fn hash_password_blocking(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost)).await?
}

/// `verify_password` on the blocking pool
pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?
}
