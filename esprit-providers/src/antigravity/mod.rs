pub mod constants;
pub mod discover;
pub mod format;
pub mod oauth;

use esprit_core::{Credential, EspritError};
use serde_json::json;
use std::collections::HashMap;

pub use constants::{endpoints, fallback_chain, get_fallback_models, ANTIGRAVITY_MODELS, DEFAULT_HOST};
pub use format::{build_cloudcode_request, build_request_headers, CloudCodeRequestArgs};

/// Drives the PKCE-loopback login flow and the Cloud-Code discovery/refresh
/// calls that follow it. One instance is shared across accounts for this
/// provider; it holds no per-account state itself.
pub struct AntigravityProvider {
    client: reqwest::Client,
}

pub struct AuthorizationStart {
    pub url: String,
    pub port: u16,
    pub state: String,
    pub verifier: String,
}

impl AntigravityProvider {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    /// Prepares a login: a free loopback port, a PKCE pair, a random state,
    /// and the authorization URL to hand to the user. The caller is
    /// responsible for opening a listener on `port` and calling
    /// [`oauth::await_callback`] before the user's browser redirects back.
    pub fn authorize(&self) -> std::io::Result<AuthorizationStart> {
        let port = oauth::find_free_port()?;
        let state = oauth::generate_state();
        let pkce = oauth::generate_pkce();
        let url = oauth::build_authorize_url(port, &state, &pkce.challenge);
        Ok(AuthorizationStart { url, port, state, verifier: pkce.verifier })
    }

    /// Exchanges an authorization code for tokens, then runs Cloud-Code
    /// project discovery and folds the discovered `project_id` into the
    /// credential's `extra` map.
    pub async fn callback(&self, code: &str, verifier: &str, port: u16) -> Result<Credential, EspritError> {
        let redirect_uri = format!("http://127.0.0.1:{port}/callback");
        let form = [
            ("client_id", oauth::client_id()),
            ("client_secret", oauth::client_secret()),
            ("code", code.to_string()),
            ("code_verifier", verifier.to_string()),
            ("grant_type", "authorization_code".to_string()),
            ("redirect_uri", redirect_uri),
        ];

        let resp = self
            .client
            .post(oauth::TOKEN_URL)
            .form(&form)
            .send()
            .await
            .map_err(|e| EspritError::provider_unreachable("token exchange failed").with_details(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EspritError::auth_expired(format!("token exchange returned {status}")).with_details(body));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EspritError::protocol("token exchange response was not valid JSON").with_details(e.to_string()))?;

        let access_token = body.get("access_token").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let refresh_token = body.get("refresh_token").and_then(|v| v.as_str()).map(|s| s.to_string());
        let expires_in_s = body.get("expires_in").and_then(|v| v.as_i64()).unwrap_or(3600);
        let expires_at_ms = now_ms() + expires_in_s * 1_000;

        let project_id = self.discover_project(&access_token).await.unwrap_or_default();
        let mut extra = HashMap::new();
        if !project_id.is_empty() {
            extra.insert("project_id".to_string(), json!(project_id));
        }

        Ok(Credential::Oauth { access_token, refresh_token, expires_at_ms, account_id: None, extra })
    }

    pub async fn refresh_token(&self, credential: &Credential) -> Result<Credential, EspritError> {
        let Credential::Oauth { refresh_token: Some(refresh), extra, account_id, .. } = credential else {
            return Err(EspritError::auth_expired("no refresh token stored for this account"));
        };

        let form = [
            ("client_id", oauth::client_id()),
            ("client_secret", oauth::client_secret()),
            ("refresh_token", refresh.clone()),
            ("grant_type", "refresh_token".to_string()),
        ];
        let resp = self
            .client
            .post(oauth::TOKEN_URL)
            .form(&form)
            .send()
            .await
            .map_err(|e| EspritError::provider_unreachable("token refresh failed").with_details(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EspritError::auth_expired("refresh token was rejected"));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EspritError::protocol("refresh response was not valid JSON").with_details(e.to_string()))?;
        let access_token = body.get("access_token").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let expires_in_s = body.get("expires_in").and_then(|v| v.as_i64()).unwrap_or(3600);

        Ok(Credential::Oauth {
            access_token,
            refresh_token: Some(refresh.clone()),
            expires_at_ms: now_ms() + expires_in_s * 1_000,
            account_id: account_id.clone(),
            extra: extra.clone(),
        })
    }

    async fn discover_project(&self, access_token: &str) -> Option<String> {
        let host = std::env::var("ESPRIT_CLOUDCODE_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let url = format!("https://cloudcode-pa.{host}{}", constants::DISCOVERY_PATH);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&json!({}))
            .send()
            .await
            .ok()?;
        let body: serde_json::Value = resp.json().await.ok()?;
        discover::parse_discovery_response(&body).map(|d| d.project_id)
    }
}

impl Default for AntigravityProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
