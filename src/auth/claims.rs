/// JWT Claims structure
///
/// Identity carried by a session token: who the user is and what role
/// they hold, plus the standard time and issuer claims (RFC 7519).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Role, User};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: u64,
    pub username: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
}

impl Claims {
    /// Builds claims for `user`, valid for `expiry_seconds` from `issued_at`
    pub fn new(user: &User, issued_at: DateTime<Utc>, expiry_seconds: i64, issuer: String) -> Self {
        let iat = issued_at.timestamp();
        Self {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            iat,
            exp: iat + expiry_seconds,
            iss: issuer,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(role: Role) -> User {
        User {
            id: 7,
            username: "alice".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            role,
            created_at: Utc::now(),
            invite: None,
        }
    }

    #[test]
    fn test_claims_creation() {
        let now = Utc::now();
        let claims = Claims::new(&user(Role::User), now, 3600, "test".to_string());

        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert!(!claims.is_admin());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let claims = Claims::new(&user(Role::Admin), now, 60, "test".to_string());

        assert!(!claims.is_expired_at(now + Duration::seconds(59)));
        assert!(claims.is_expired_at(now + Duration::seconds(60)));
        assert!(claims.is_admin());
    }

    #[test]
    fn test_wire_field_names() {
        let claims = Claims::new(&user(Role::User), Utc::now(), 60, "test".to_string());
        let json = serde_json::to_value(&claims).unwrap();

        assert_eq!(json["userId"], 7);
        assert_eq!(json["username"], "alice");
        assert_eq!(json["role"], "user");
    }
}
