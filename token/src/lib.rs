//! OAuth2 client-credentials token acquisition for verification flows.
//!
//! Not part of the reconciliation path: tests and smoke checks use it to get
//! a bearer token for calling services exposed through an APIRule.

use log::debug;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const BEARER: &str = "Bearer";
const DEFAULT_CLIENT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCredentialsConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default = "default_client_timeout_seconds")]
    pub client_timeout_seconds: u64,
    /// Skip certificate verification. Only meant for test clusters with
    /// self-signed certificates.
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

fn default_client_timeout_seconds() -> u64 {
    DEFAULT_CLIENT_TIMEOUT_SECONDS
}

impl ClientCredentialsConfig {
    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_seconds)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("token invalid: {0}")]
    InvalidToken(String),

    #[error("token type = {0:?}; want \"Bearer\"")]
    UnexpectedTokenType(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_bearer(self) -> Result<String, TokenError> {
        if self.access_token.is_empty() {
            return Err(TokenError::InvalidToken("empty access token".to_string()));
        }
        if matches!(self.expires_in, Some(secs) if secs <= 0) {
            return Err(TokenError::InvalidToken(format!(
                "token already expired (expires_in = {})",
                self.expires_in.unwrap_or_default()
            )));
        }
        if !self.token_type.eq_ignore_ascii_case(BEARER) {
            return Err(TokenError::UnexpectedTokenType(self.token_type));
        }
        Ok(self.access_token)
    }
}

fn http_client(config: &ClientCredentialsConfig) -> Result<reqwest::Client, TokenError> {
    let client = reqwest::Client::builder()
        .cookie_store(true)
        .timeout(config.client_timeout())
        .danger_accept_invalid_certs(config.insecure_skip_verify)
        .build()?;
    Ok(client)
}

/// Runs a client-credentials grant and returns the bearer access token.
///
/// `token_format` is passed to the token endpoint as the `token_format`
/// parameter, e.g. `jwt` to ask for a JWT instead of an opaque token.
pub async fn access_token(
    config: &ClientCredentialsConfig,
    token_format: Option<&str>,
) -> Result<String, TokenError> {
    let client = http_client(config)?;

    let mut form = vec![("grant_type", "client_credentials".to_string())];
    if !config.scopes.is_empty() {
        form.push(("scope", config.scopes.join(" ")));
    }
    if let Some(format) = token_format {
        form.push(("token_format", format.to_string()));
    }

    debug!("Requesting client credentials token from {}", config.token_url);
    let response = client
        .post(&config.token_url)
        .basic_auth(&config.client_id, Some(&config.client_secret))
        .form(&form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TokenError::Rejected { status, body });
    }

    response.json::<TokenResponse>().await?.into_bearer()
}
