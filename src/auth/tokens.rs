//! Account tokens for invitations and password resets.
//!
//! Each flow hands out two halves: a random opaque token whose SHA-256 is
//! stored in `account_tokens`, and a signed URL token carrying the user id,
//! email, and kind. The URL token's signature is valid for a generous outer
//! window; the kind-dependent expiry (hours) is enforced on the issue
//! timestamp at verification time, so the windows can be tuned in config
//! without invalidating the signing key.

use chrono::{Duration as ChronoDuration, Utc};
use diesel::prelude::*;
use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::jwt::JwtConfig;
use crate::models::NewAccountToken;
use crate::schema::account_tokens;

/// Outer signature validity; the per-kind window is always shorter.
const URL_TOKEN_MAX_VALIDITY_DAYS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Invitation,
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Invitation => "invitation",
            TokenKind::PasswordReset => "password_reset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invitation" => Some(TokenKind::Invitation),
            "password_reset" => Some(TokenKind::PasswordReset),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    Invalid,
    Expired,
    WrongKind,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Invalid => write!(f, "Token is invalid"),
            TokenError::Expired => write!(f, "Token has expired"),
            TokenError::WrongKind => write!(f, "Token was issued for a different flow"),
        }
    }
}

impl std::error::Error for TokenError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlTokenClaims {
    pub email: String,
    pub kind: String,
}

#[derive(Debug, Clone)]
pub struct VerifiedUrlToken {
    pub user_id: Uuid,
    pub email: String,
    pub kind: TokenKind,
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn generate_opaque_token() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

pub fn generate_url_token(
    jwt: &JwtConfig,
    user_id: Uuid,
    email: &str,
    kind: TokenKind,
) -> Result<String, jwt_simple::Error> {
    let custom = UrlTokenClaims {
        email: email.to_string(),
        kind: kind.as_str().to_string(),
    };

    let claims = jwt_simple::claims::Claims::with_custom_claims(
        custom,
        Duration::from_days(URL_TOKEN_MAX_VALIDITY_DAYS),
    )
    .with_subject(user_id.to_string());

    jwt.key_pair().sign(claims)
}

/// Verifies signature, kind, and the kind-dependent window against the
/// token's issue timestamp. A token that verifies but is older than
/// `window_hours` is rejected as expired.
pub fn verify_url_token(
    jwt: &JwtConfig,
    token: &str,
    expected_kind: TokenKind,
    window_hours: i64,
) -> Result<VerifiedUrlToken, TokenError> {
    let data = jwt
        .verifying_key()
        .verify_token::<UrlTokenClaims>(token, Some(VerificationOptions::default()))
        .map_err(|_| TokenError::Invalid)?;

    let kind = TokenKind::parse(&data.custom.kind).ok_or(TokenError::Invalid)?;
    if kind != expected_kind {
        return Err(TokenError::WrongKind);
    }

    let issued_at = data.issued_at.ok_or(TokenError::Invalid)?;
    let age_secs = Clock::now_since_epoch()
        .as_secs()
        .saturating_sub(issued_at.as_secs()) as i64;
    if age_secs > window_hours.saturating_mul(3600) {
        return Err(TokenError::Expired);
    }

    let user_id = data
        .subject
        .as_deref()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or(TokenError::Invalid)?;

    Ok(VerifiedUrlToken {
        user_id,
        email: data.custom.email,
        kind,
    })
}

/// Replaces any outstanding token of the same kind for the user and returns
/// the new opaque token.
pub fn issue_account_token(
    conn: &mut PgConnection,
    user_id: Uuid,
    kind: TokenKind,
    window_hours: i64,
) -> QueryResult<String> {
    diesel::delete(
        account_tokens::table
            .filter(account_tokens::user_id.eq(user_id))
            .filter(account_tokens::kind.eq(kind.as_str())),
    )
    .execute(conn)?;

    let opaque = generate_opaque_token();
    let expires_at = (Utc::now() + ChronoDuration::hours(window_hours)).naive_utc();

    diesel::insert_into(account_tokens::table)
        .values(&NewAccountToken {
            user_id,
            token_hash: hash_token(&opaque),
            kind: kind.as_str().to_string(),
            expires_at,
        })
        .execute(conn)?;

    Ok(opaque)
}

/// Looks up an unused, unexpired stored token; returns its id.
pub fn find_active_token(
    conn: &mut PgConnection,
    user_id: Uuid,
    kind: TokenKind,
    opaque: &str,
) -> QueryResult<Option<Uuid>> {
    let now = Utc::now().naive_utc();

    account_tokens::table
        .filter(account_tokens::user_id.eq(user_id))
        .filter(account_tokens::kind.eq(kind.as_str()))
        .filter(account_tokens::token_hash.eq(hash_token(opaque)))
        .filter(account_tokens::expires_at.gt(now))
        .filter(account_tokens::used_at.is_null())
        .select(account_tokens::id)
        .first(conn)
        .optional()
}

pub fn mark_token_used(conn: &mut PgConnection, token_id: Uuid) -> QueryResult<()> {
    diesel::update(account_tokens::table.filter(account_tokens::id.eq(token_id)))
        .set(account_tokens::used_at.eq(Some(Utc::now().naive_utc())))
        .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_jwt() -> JwtConfig {
        JwtConfig::from_key_pair(Ed25519KeyPair::generate())
    }

    #[test]
    fn test_kind_roundtrip() {
        assert_eq!(TokenKind::parse("invitation"), Some(TokenKind::Invitation));
        assert_eq!(
            TokenKind::parse("password_reset"),
            Some(TokenKind::PasswordReset)
        );
        assert_eq!(TokenKind::parse("magic_link"), None);
    }

    #[test]
    fn test_url_token_roundtrip() {
        let jwt = test_jwt();
        let user_id = Uuid::new_v4();

        let token =
            generate_url_token(&jwt, user_id, "dana@example.com", TokenKind::Invitation).unwrap();

        let verified = verify_url_token(&jwt, &token, TokenKind::Invitation, 72).unwrap();
        assert_eq!(verified.user_id, user_id);
        assert_eq!(verified.email, "dana@example.com");
        assert_eq!(verified.kind, TokenKind::Invitation);
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let jwt = test_jwt();
        let token = generate_url_token(
            &jwt,
            Uuid::new_v4(),
            "dana@example.com",
            TokenKind::PasswordReset,
        )
        .unwrap();

        let err = verify_url_token(&jwt, &token, TokenKind::Invitation, 72).unwrap_err();
        assert_eq!(err, TokenError::WrongKind);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let jwt = test_jwt();
        let other = test_jwt();
        let token = generate_url_token(
            &other,
            Uuid::new_v4(),
            "dana@example.com",
            TokenKind::Invitation,
        )
        .unwrap();

        let err = verify_url_token(&jwt, &token, TokenKind::Invitation, 72).unwrap_err();
        assert_eq!(err, TokenError::Invalid);
    }

    #[test]
    fn test_verifiable_but_past_window_is_expired() {
        let jwt = test_jwt();
        let user_id = Uuid::new_v4();

        // Sign a token whose issue timestamp is 100 hours in the past. The
        // outer signature is still valid; the 72-hour window is not.
        let custom = UrlTokenClaims {
            email: "dana@example.com".to_string(),
            kind: TokenKind::Invitation.as_str().to_string(),
        };
        let mut claims = jwt_simple::claims::Claims::with_custom_claims(
            custom,
            Duration::from_days(URL_TOKEN_MAX_VALIDITY_DAYS),
        )
        .with_subject(user_id.to_string());
        claims.issued_at = Some(Clock::now_since_epoch() - Duration::from_hours(100));

        let token = jwt.key_pair().sign(claims).unwrap();

        let err = verify_url_token(&jwt, &token, TokenKind::Invitation, 72).unwrap_err();
        assert_eq!(err, TokenError::Expired);
    }

    #[test]
    fn test_opaque_token_hashing() {
        let token = generate_opaque_token();
        assert_eq!(token.len(), 64);
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
        assert_ne!(generate_opaque_token(), generate_opaque_token());
    }
}
