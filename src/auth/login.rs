// Portal login
// Exchanges the configured credential for a fresh access token

use anyhow::{Context, Result};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;

use super::types::{Credential, LoginRequest, LoginResponse};

/// Default Bayes portal login endpoint
pub const DEFAULT_LOGIN_URL: &str = "https://lolesports-api.bayesesports.com/auth/login";

/// Maximum length of an error body quoted in a login failure
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Network login collaborator
pub trait Authenticator: Send + Sync {
    /// Log in with the credential and return the raw token payload
    fn login(&self, credential: &Credential) -> impl Future<Output = Result<LoginResponse>> + Send;
}

/// Authenticator that posts the credential to the portal's login endpoint
pub struct HttpAuthenticator {
    client: Client,
    login_url: String,
}

impl HttpAuthenticator {
    pub fn new(login_url: impl Into<String>, connect_timeout: u64, request_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            login_url: login_url.into(),
        })
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }
}

impl Authenticator for HttpAuthenticator {
    async fn login(&self, credential: &Credential) -> Result<LoginResponse> {
        tracing::info!("Logging in to Bayes portal as {}...", credential.identity);

        let request = LoginRequest {
            username: &credential.identity,
            password: credential.secret(),
        };

        let response = self
            .client
            .post(&self.login_url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send login request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                url = %self.login_url,
                "Login rejected"
            );
            anyhow::bail!("Login rejected: {} - {}", status, truncate_body(&error_text));
        }

        let data: LoginResponse = response
            .json()
            .await
            .context("Failed to parse login response")?;

        validate_response(&data)?;
        Ok(data)
    }
}

/// Reject payloads that would produce an unusable token
pub fn validate_response(data: &LoginResponse) -> Result<()> {
    if data.access_token.is_empty() {
        anyhow::bail!("Login response does not contain accessToken");
    }
    if data.expires_in < 0 {
        anyhow::bail!("Login response has negative expiresIn: {}", data.expires_in);
    }
    Ok(())
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}
