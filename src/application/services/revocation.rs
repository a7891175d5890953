//! Token revocation guard
//!
//! Every protected inbound call runs the same two-step check: cheap local
//! signature/structure validation first (fails closed on malformed
//! tokens), then a remote revocation lookup against the authority
//! service. Behavior when the authority is unreachable is a configured
//! policy, not an accident of code path.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{DomainError, DomainResult};

/// What to do when the revocation authority cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationPolicy {
    /// Reject the request
    FailClosed,
    /// Accept the request and log the degraded check
    FailOpen,
}

/// Risk class of the guarded operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    ReadOnly,
    Mutating,
}

/// Guard configuration
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Secret for local token signature validation
    pub jwt_secret: String,
    /// Expected issuer claim; unchecked when absent
    pub issuer: Option<String>,
    /// Policy for mutating (ledger-adjacent) operations
    pub policy: RevocationPolicy,
    /// Policy for operations declared read-only by the caller
    pub read_only_policy: RevocationPolicy,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            issuer: None,
            policy: RevocationPolicy::FailClosed,
            read_only_policy: RevocationPolicy::FailOpen,
        }
    }
}

/// Claims carried by inbound credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Owner id
    pub sub: String,
    /// Token id used for revocation lookup
    pub jti: String,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    #[serde(default)]
    pub iss: Option<String>,
}

/// Remote revocation lookup. `Ok(true)` means revoked.
#[async_trait]
pub trait RevocationAuthority: Send + Sync {
    async fn check(&self, token_id: &str, owner_id: &str) -> DomainResult<bool>;
}

pub struct RevocationGuard {
    authority: Arc<dyn RevocationAuthority>,
    config: GuardConfig,
}

impl RevocationGuard {
    pub fn new(authority: Arc<dyn RevocationAuthority>, config: GuardConfig) -> Self {
        Self { authority, config }
    }

    /// Local structural + signature + expiry validation. No I/O.
    pub fn verify_local(&self, token: &str) -> DomainResult<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
        }

        decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| DomainError::Unauthorized(format!("invalid token: {}", e)))
    }

    /// Full check: local validation, then remote revocation lookup.
    /// Returns the validated claims on success.
    pub async fn check_access(&self, token: &str, access: AccessKind) -> DomainResult<TokenClaims> {
        let claims = self.verify_local(token)?;

        match self.authority.check(&claims.jti, &claims.sub).await {
            Ok(true) => {
                info!(owner_id = %claims.sub, token_id = %claims.jti, "Token revoked by authority");
                counter!("revocation_rejections_total").increment(1);
                Err(DomainError::Unauthorized("token revoked".to_string()))
            }
            Ok(false) => Ok(claims),
            Err(err) => {
                counter!("revocation_check_failures_total").increment(1);
                match self.policy_for(access) {
                    RevocationPolicy::FailClosed => {
                        warn!(error = %err, "Revocation authority unavailable, failing closed");
                        Err(DomainError::RevocationCheckFailed(err.to_string()))
                    }
                    RevocationPolicy::FailOpen => {
                        warn!(error = %err, "Revocation authority unavailable, failing open");
                        Ok(claims)
                    }
                }
            }
        }
    }

    fn policy_for(&self, access: AccessKind) -> RevocationPolicy {
        match access {
            AccessKind::ReadOnly => self.config.read_only_policy,
            AccessKind::Mutating => self.config.policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    struct StubAuthority {
        revoked: bool,
        unreachable: bool,
    }

    #[async_trait]
    impl RevocationAuthority for StubAuthority {
        async fn check(&self, _token_id: &str, _owner_id: &str) -> DomainResult<bool> {
            if self.unreachable {
                return Err(DomainError::RevocationCheckFailed(
                    "connection refused".to_string(),
                ));
            }
            Ok(self.revoked)
        }
    }

    fn token(secret: &str) -> String {
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: "U1".to_string(),
            jti: "token-1".to_string(),
            exp: now + 3600,
            iat: now,
            iss: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn guard(revoked: bool, unreachable: bool, policy: RevocationPolicy) -> RevocationGuard {
        RevocationGuard::new(
            Arc::new(StubAuthority {
                revoked,
                unreachable,
            }),
            GuardConfig {
                jwt_secret: SECRET.to_string(),
                policy,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn valid_unrevoked_token_passes() {
        let guard = guard(false, false, RevocationPolicy::FailClosed);
        let claims = guard
            .check_access(&token(SECRET), AccessKind::Mutating)
            .await
            .unwrap();
        assert_eq!(claims.sub, "U1");
    }

    #[tokio::test]
    async fn revoked_token_rejected() {
        let guard = guard(true, false, RevocationPolicy::FailClosed);
        let err = guard
            .check_access(&token(SECRET), AccessKind::Mutating)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn malformed_token_fails_closed_before_remote_check() {
        // Authority would fail open, but local validation rejects first
        let guard = guard(false, true, RevocationPolicy::FailOpen);
        let err = guard
            .check_access("not-a-jwt", AccessKind::Mutating)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn wrong_signature_rejected() {
        let guard = guard(false, false, RevocationPolicy::FailClosed);
        let err = guard
            .check_access(&token("other-secret"), AccessKind::Mutating)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unreachable_authority_honors_policy() {
        let closed = guard(false, true, RevocationPolicy::FailClosed);
        let err = closed
            .check_access(&token(SECRET), AccessKind::Mutating)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::RevocationCheckFailed(_)));

        let open = guard(false, true, RevocationPolicy::FailOpen);
        assert!(open
            .check_access(&token(SECRET), AccessKind::Mutating)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn read_only_access_uses_its_own_policy() {
        // Mutating fails closed, read-only defaults to fail-open
        let guard = guard(false, true, RevocationPolicy::FailClosed);
        assert!(guard
            .check_access(&token(SECRET), AccessKind::Mutating)
            .await
            .is_err());
        assert!(guard
            .check_access(&token(SECRET), AccessKind::ReadOnly)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn expired_token_rejected_locally() {
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: "U1".to_string(),
            jti: "token-1".to_string(),
            exp: now - 3600,
            iat: now - 7200,
            iss: None,
        };
        let expired = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let guard = guard(false, false, RevocationPolicy::FailClosed);
        assert!(guard.verify_local(&expired).is_err());
    }
}
