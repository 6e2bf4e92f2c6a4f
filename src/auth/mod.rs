/// Authentication module
///
/// Session token issuing/verification, password hashing, and the
/// `AuthService` that ties them to storage and brute-force protection.

mod claims;
mod jwt;
mod password;
mod service;

pub use claims::Claims;
pub use jwt::SessionTokens;
pub use password::{hash_password, verify_password, MIN_HASH_COST};
pub use service::{AuthService, LoginOutcome};
