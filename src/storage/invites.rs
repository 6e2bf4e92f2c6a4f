/// Invite-Token Ledger
///
/// One-time registration tokens, persisted as `{"tokens": [...]}`.
/// Tokens are never deleted; used and expired entries stay as an audit
/// trail. Timestamps are stored as Unix milliseconds.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::{AppError, TokenError};
use crate::storage::json_file::JsonFile;

/// Invite lifetime in hours
pub const INVITE_TTL_HOURS: i64 = 24;
/// Random bytes per token (256 bits)
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InviteToken {
    pub token: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl InviteToken {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            token: generate_token(),
            created_at: now,
            expires_at: now + Duration::hours(INVITE_TTL_HOURS),
            used: false,
        }
    }

    pub fn digest(&self) -> String {
        digest(&self.token)
    }

    fn check(&self, now: DateTime<Utc>) -> Result<(), TokenError> {
        if self.used {
            return Err(TokenError::AlreadyUsed);
        }
        if now > self.expires_at {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}

/// 32 bytes from the OS RNG, hex encoded
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 of a token, used to link users to the invite they consumed
/// without storing the token twice
pub fn digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct InviteLedger {
    file: JsonFile,
    tokens: Vec<InviteToken>,
}

impl InviteLedger {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let file = JsonFile::new(path, "tokens");
        let mut seen = HashSet::new();
        let (tokens, rejected): (Vec<InviteToken>, Vec<InviteToken>) = file
            .load::<InviteToken>()
            .into_iter()
            .partition(|t| {
                let keep = !t.token.is_empty() && seen.insert(t.token.clone());
                if !keep {
                    tracing::warn!("Quarantining empty or duplicate invite record");
                }
                keep
            });
        file.quarantine(&rejected);

        tracing::info!(
            path = %file.path().display(),
            tokens = tokens.len(),
            "Invite ledger loaded"
        );

        Self { file, tokens }
    }

    pub fn tokens(&self) -> &[InviteToken] {
        &self.tokens
    }

    /// Creates, persists and returns a fresh invite
    pub fn issue(&mut self, now: DateTime<Utc>) -> Result<InviteToken, AppError> {
        let invite = InviteToken::new(now);
        self.tokens.push(invite.clone());

        if let Err(e) = self.file.persist(&self.tokens) {
            self.tokens.pop();
            return Err(e);
        }

        tracing::info!(expires_at = %invite.expires_at, "Invite token issued");
        Ok(invite)
    }

    /// Checks that `token` exists, is unused and unexpired. Never mutates.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<(), TokenError> {
        self.find(token).ok_or(TokenError::NotFound)?.check(now)
    }

    /// Flags `token` as used and persists. Absent tokens are ignored.
    pub fn mark_used(&mut self, token: &str) -> Result<(), AppError> {
        self.set_used(|t| t.token == token)
    }

    /// Marks every unused token whose digest appears in `digests`.
    /// Returns how many entries changed.
    pub fn reconcile(&mut self, digests: &HashSet<String>) -> Result<usize, AppError> {
        let stale = self
            .tokens
            .iter()
            .filter(|t| !t.used && digests.contains(&t.digest()))
            .count();
        if stale > 0 {
            self.set_used(|t| digests.contains(&t.digest()))?;
        }
        Ok(stale)
    }

    fn find(&self, token: &str) -> Option<&InviteToken> {
        self.tokens.iter().find(|t| t.token == token)
    }

    fn set_used(&mut self, selector: impl Fn(&InviteToken) -> bool) -> Result<(), AppError> {
        let changed: Vec<usize> = self
            .tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.used && selector(t))
            .map(|(index, _)| index)
            .collect();

        if changed.is_empty() {
            return Ok(());
        }

        for &index in &changed {
            self.tokens[index].used = true;
        }

        if let Err(e) = self.file.persist(&self.tokens) {
            for &index in &changed {
                self.tokens[index].used = false;
            }
            return Err(e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> (InviteLedger, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (InviteLedger::open(dir.path().join("tokens.json")), dir)
    }

    #[test]
    fn test_generated_tokens_are_256_bit_hex() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_issue_sets_expiry_and_persists() {
        let (mut ledger, dir) = ledger();
        let now = Utc::now();
        let invite = ledger.issue(now).unwrap();

        assert_eq!(invite.expires_at - invite.created_at, Duration::hours(24));
        assert!(!invite.used);

        let reopened = InviteLedger::open(dir.path().join("tokens.json"));
        assert_eq!(reopened.tokens().len(), 1);
        assert!(reopened.validate(&invite.token, now).is_ok());
    }

    #[test]
    fn test_validate_unknown_token() {
        let (ledger, _dir) = ledger();
        assert_eq!(
            ledger.validate("nope", Utc::now()),
            Err(TokenError::NotFound)
        );
    }

    #[test]
    fn test_validate_is_idempotent_until_marked() {
        let (mut ledger, _dir) = ledger();
        let now = Utc::now();
        let invite = ledger.issue(now).unwrap();

        assert_eq!(ledger.validate(&invite.token, now), Ok(()));
        assert_eq!(ledger.validate(&invite.token, now), Ok(()));

        ledger.mark_used(&invite.token).unwrap();
        assert_eq!(
            ledger.validate(&invite.token, now),
            Err(TokenError::AlreadyUsed)
        );
        assert_eq!(
            ledger.validate(&invite.token, now + Duration::days(30)),
            Err(TokenError::AlreadyUsed)
        );
    }

    #[test]
    fn test_expired_token() {
        let (mut ledger, _dir) = ledger();
        let now = Utc::now();
        let invite = ledger.issue(now).unwrap();

        assert_eq!(ledger.validate(&invite.token, now + Duration::hours(24)), Ok(()));
        assert_eq!(
            ledger.validate(&invite.token, now + Duration::hours(24) + Duration::milliseconds(1)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_mark_used_unknown_token_is_noop() {
        let (mut ledger, _dir) = ledger();
        assert!(ledger.mark_used("missing").is_ok());
    }

    #[test]
    fn test_reads_millisecond_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(
            &path,
            r#"{"tokens": [{"token": "abc", "createdAt": 1700000000000, "expiresAt": 1700086400000, "used": true}]}"#,
        )
        .unwrap();

        let ledger = InviteLedger::open(&path);
        assert_eq!(
            ledger.validate("abc", Utc::now()),
            Err(TokenError::AlreadyUsed)
        );
    }

    #[test]
    fn test_reconcile_marks_consumed_tokens() {
        let (mut ledger, _dir) = ledger();
        let now = Utc::now();
        let consumed = ledger.issue(now).unwrap();
        let fresh = ledger.issue(now).unwrap();

        let digests: HashSet<String> = [consumed.digest()].into_iter().collect();
        assert_eq!(ledger.reconcile(&digests).unwrap(), 1);
        assert_eq!(ledger.reconcile(&digests).unwrap(), 0);

        assert_eq!(
            ledger.validate(&consumed.token, now),
            Err(TokenError::AlreadyUsed)
        );
        assert_eq!(ledger.validate(&fresh.token, now), Ok(()));
    }

    #[test]
    fn test_duplicate_invites_are_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(
            &path,
            r#"{"tokens": [
                {"token": "abc", "createdAt": 1700000000000, "expiresAt": 1700086400000, "used": false},
                {"token": "abc", "createdAt": 1700000000000, "expiresAt": 1700086400000, "used": true},
                {"token": "", "createdAt": 1700000000000, "expiresAt": 1700086400000, "used": false}
            ]}"#,
        )
        .unwrap();

        let ledger = InviteLedger::open(&path);
        assert_eq!(ledger.tokens().len(), 1);
        assert!(!ledger.tokens()[0].used);

        let raw = std::fs::read_to_string(dir.path().join("tokens.json.quarantine")).unwrap();
        let quarantined: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(quarantined["tokens"].as_array().unwrap().len(), 2);
    }
}
