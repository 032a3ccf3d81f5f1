//! HTTP client for the banking backend.
//!
//! The backend wraps the aggregators (Salt Edge, Tink, ...) behind a small
//! REST surface. Provider error messages are passed through unchanged.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::banking::{
    AccountSyncResponse, BankingApiClient, InitiateConnectionRequest, InitiateConnectionResponse,
};
use crate::config::ConnectConfig;
use banklink_core::errors::{Error, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Error codes the backend uses when the provider no longer honours a grant.
const EXPIRED_GRANT_CODES: [&str; 5] = [
    "connection_expired",
    "token_expired",
    "consent_expired",
    "consent_revoked",
    "invalid_grant",
];

#[derive(Debug, serde::Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the banking backend.
///
/// ```ignore
/// let client = BankingHttpClient::from_config(&ConnectConfig::from_env())?;
/// let initiated = client.initiate_connection(&request).await?;
/// ```
#[derive(Debug, Clone)]
pub struct BankingHttpClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: Option<HeaderValue>,
}

impl BankingHttpClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the HTTP
    /// client cannot be initialized.
    pub fn new(base_url: &str, access_token: Option<&str>) -> Result<Self> {
        let auth_header = access_token
            .map(|token| {
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| Error::Unexpected(format!("Invalid access token format: {}", e)))
            })
            .transpose()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Unexpected(format!("Failed to initialize HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    pub fn from_config(config: &ConnectConfig) -> Result<Self> {
        Self::new(&config.api_base_url, config.api_token.as_deref())
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(auth) = &self.auth_header {
            headers.insert(AUTHORIZATION, auth.clone());
        }
        headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Reads the body, mapping non-success statuses to errors.
    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Unexpected(format!("Failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(map_error_response(status.as_u16(), &body));
        }
        Ok(body)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = Self::read_body(response).await?;
        serde_json::from_str(&body)
            .map_err(|e| Error::Unexpected(format!("Failed to parse response: {} - {}", e, body)))
    }
}

/// Maps a non-success response to an error, keeping the provider's message.
fn map_error_response(status: u16, body: &str) -> Error {
    let parsed = serde_json::from_str::<ApiErrorResponse>(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|err| err.code.as_deref().or(err.error.as_deref()))
        .map(str::to_ascii_lowercase);
    let message = parsed
        .and_then(|err| err.message.or(err.error))
        .unwrap_or_else(|| {
            let snippet: String = body.chars().take(200).collect();
            if snippet.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                snippet
            }
        });

    let expired = status == 401
        || code
            .as_deref()
            .map(|code| EXPIRED_GRANT_CODES.contains(&code))
            .unwrap_or(false);
    if expired {
        Error::AuthorizationExpired(message)
    } else {
        Error::api(status, message)
    }
}

#[async_trait]
impl BankingApiClient for BankingHttpClient {
    async fn initiate_connection(
        &self,
        request: &InitiateConnectionRequest,
    ) -> Result<InitiateConnectionResponse> {
        let url = self.url("/api/v1/banking/connections");
        debug!("[BankingApi] POST {} ({})", url, request.provider);

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Unexpected(format!("Failed to initiate connection: {}", e)))?;

        Self::parse_response(response).await
    }

    async fn sync_account(&self, account_id: &str) -> Result<AccountSyncResponse> {
        let url = self.url(&format!(
            "/api/v1/banking/accounts/{}/sync",
            urlencoding::encode(account_id)
        ));
        debug!("[BankingApi] POST {}", url);

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .send()
            .await
            .map_err(|e| Error::Unexpected(format!("Failed to sync account: {}", e)))?;

        Self::parse_response(response).await
    }

    async fn revoke_connection(&self, connection_id: &str) -> Result<()> {
        let url = self.url(&format!(
            "/api/v1/banking/connections/{}",
            urlencoding::encode(connection_id)
        ));
        debug!("[BankingApi] DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .headers(self.headers())
            .send()
            .await
            .map_err(|e| Error::Unexpected(format!("Failed to revoke connection: {}", e)))?;

        Self::read_body(response).await?;
        Ok(())
    }
}
