//! HTTP client for the remote revocation authority

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::services::revocation::RevocationAuthority;
use crate::domain::{DomainError, DomainResult};
use crate::shared::retry::{retry_with_backoff, RetryConfig};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckRequest<'a> {
    token_id: &'a str,
    owner_id: &'a str,
}

#[derive(Deserialize)]
struct CheckResponse {
    revoked: bool,
}

/// `RevocationAuthority` over `POST <base_url>/revocation/check`.
///
/// Transient transport failures are retried once before the error is
/// surfaced to the guard, which then applies the configured
/// fail-open/fail-closed policy.
pub struct HttpRevocationAuthority {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl HttpRevocationAuthority {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DomainError::RevocationCheckFailed(format!("failed to build http client: {}", e))
            })?;
        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig {
                max_attempts: 2,
                ..Default::default()
            },
        })
    }

    async fn post_check(&self, token_id: &str, owner_id: &str) -> DomainResult<bool> {
        let url = format!("{}/revocation/check", self.base_url);
        debug!(url, owner_id, "Checking token revocation");

        let response = self
            .client
            .post(&url)
            .json(&CheckRequest { token_id, owner_id })
            .send()
            .await
            .map_err(|e| DomainError::RevocationCheckFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| DomainError::RevocationCheckFailed(e.to_string()))?;

        let body: CheckResponse = response
            .json()
            .await
            .map_err(|e| DomainError::RevocationCheckFailed(e.to_string()))?;

        Ok(body.revoked)
    }
}

#[async_trait]
impl RevocationAuthority for HttpRevocationAuthority {
    async fn check(&self, token_id: &str, owner_id: &str) -> DomainResult<bool> {
        retry_with_backoff(
            self.retry.clone(),
            || self.post_check(token_id, owner_id),
            |e| matches!(e, DomainError::RevocationCheckFailed(_)),
            "revocation_check",
        )
        .await
    }
}
