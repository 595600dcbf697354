//! Identity Resolution
//!
//! Turns the opaque credential a browser presents into a stable [`Identity`]
//! used as the quota key. Two verifiers are provided: a static token table
//! and Google Sign-In ID tokens checked against Google's token-info endpoint.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Cookie carrying the credential for plain browser navigation (download links)
pub const CREDENTIAL_COOKIE: &str = "pdfbirch_credential";

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credential in the request
    #[error("Missing credential")]
    MissingCredential,

    /// Credential rejected by the verifier
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Identity provider could not be reached
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl AuthError {
    /// Metric label
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing",
            AuthError::InvalidCredential(_) => "invalid",
            AuthError::ProviderUnavailable(_) => "provider_unavailable",
        }
    }
}

/// Resolved user identity (typically an email address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// Trim and validate; blank values are rejected
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AuthError::InvalidCredential(
                "credential resolved to an empty identity".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps a credential to an identity
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// Fixed credential table
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenVerifier {
    /// Build from `token -> identity` pairs; pairs with blank identities are skipped
    pub fn new(tokens: HashMap<String, String>) -> Self {
        let tokens = tokens
            .into_iter()
            .filter_map(|(token, identity)| match Identity::parse(&identity) {
                Ok(identity) => Some((token, identity)),
                Err(_) => {
                    warn!("Skipping static token with empty identity");
                    None
                }
            })
            .collect();
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn resolve(&self, credential: &str) -> Result<Identity, AuthError> {
        self.tokens
            .get(credential)
            .cloned()
            .ok_or_else(|| AuthError::InvalidCredential("unknown token".to_string()))
    }
}

/// Subset of the token-info response we rely on
#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: Option<String>,
    email: Option<String>,
    email_verified: Option<String>,
}

/// Google Sign-In ID token verifier
///
/// Signature and expiry checks are done by the token-info endpoint; this
/// verifier checks the audience and that the email is verified.
#[derive(Debug, Clone)]
pub struct GoogleTokenVerifier {
    client: reqwest::Client,
    client_id: String,
    endpoint: String,
}

impl GoogleTokenVerifier {
    pub fn new(client_id: impl Into<String>) -> Result<Self, AuthError> {
        Self::with_endpoint(client_id, GOOGLE_TOKENINFO_URL)
    }

    /// Use a different token-info endpoint
    pub fn with_endpoint(
        client_id: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            client_id: client_id.into(),
            endpoint: endpoint.into(),
        })
    }

    fn identity_from(&self, info: TokenInfo) -> Result<Identity, AuthError> {
        if info.aud.as_deref() != Some(self.client_id.as_str()) {
            return Err(AuthError::InvalidCredential(
                "token audience does not match client id".to_string(),
            ));
        }
        if info.email_verified.as_deref() != Some("true") {
            return Err(AuthError::InvalidCredential("email not verified".to_string()));
        }
        let email = info
            .email
            .ok_or_else(|| AuthError::InvalidCredential("token has no email".to_string()))?;
        Identity::parse(&email)
    }
}

#[async_trait]
impl IdentityVerifier for GoogleTokenVerifier {
    async fn resolve(&self, credential: &str) -> Result<Identity, AuthError> {
        // ID tokens are base64url segments joined by dots
        if !credential
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(AuthError::InvalidCredential("malformed token".to_string()));
        }

        let url = format!("{}?id_token={}", self.endpoint, credential);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            debug!(%status, "Token rejected by provider");
            return Err(AuthError::InvalidCredential("token rejected by provider".to_string()));
        }
        if !status.is_success() {
            return Err(AuthError::ProviderUnavailable(format!(
                "token-info returned {}",
                status
            )));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;

        self.identity_from(info)
    }
}

/// Extract the credential from `Authorization: Bearer` or the credential cookie
pub fn credential_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == CREDENTIAL_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
