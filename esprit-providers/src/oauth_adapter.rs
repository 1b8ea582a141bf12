//! The registry side of §4.3: a `{provider → adapter}` lookup instead of the
//! substring-matching scattered through the original source. Every provider
//! that authenticates via a standard OAuth2 refresh-token grant shares one
//! generic implementation; Antigravity's Cloud-Code envelope gets its own.

use async_trait::async_trait;
use esprit_core::{Credential, EspritError};
use std::collections::HashMap;
use std::sync::Arc;

use crate::antigravity::AntigravityProvider;

/// The capability set every provider adapter exposes, per spec §4.3.
/// `modify_request` is synchronous (it only rewrites headers/URL);
/// `refresh_token` talks to the network so it's async.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Injects the provider's auth header(s) into `headers`, and returns a
    /// replacement URL when the provider needs a non-default endpoint.
    fn modify_request(&self, url: &str, headers: &mut Vec<(String, String)>, token: &str) -> String {
        headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        url.to_string()
    }

    async fn refresh_token(&self, credential: &Credential) -> Result<Credential, EspritError>;
}

/// A provider that refreshes via the plain OAuth2 `refresh_token` grant
/// against a fixed token endpoint. Covers Anthropic, GitHub Copilot, and
/// OpenAI/Codex's consumer OAuth flows, which all speak this dialect even
/// though their authorize-step UX differs (out of scope here per spec §1).
pub struct GenericOAuthAdapter {
    pub token_url: &'static str,
    pub client_id: &'static str,
    pub extra_headers: Vec<(&'static str, &'static str)>,
}

#[async_trait]
impl ProviderAdapter for GenericOAuthAdapter {
    fn modify_request(&self, url: &str, headers: &mut Vec<(String, String)>, token: &str) -> String {
        headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        for (k, v) in &self.extra_headers {
            headers.push((k.to_string(), v.to_string()));
        }
        url.to_string()
    }

    async fn refresh_token(&self, credential: &Credential) -> Result<Credential, EspritError> {
        let Credential::Oauth { refresh_token: Some(refresh), extra, account_id, .. } = credential else {
            return Err(EspritError::auth_expired("no refresh token stored for this credential"));
        };

        let client = reqwest::Client::new();
        let form = [
            ("client_id", self.client_id.to_string()),
            ("refresh_token", refresh.clone()),
            ("grant_type", "refresh_token".to_string()),
        ];
        let resp = client
            .post(self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| EspritError::provider_unreachable("token refresh failed").with_details(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(EspritError::auth_expired(format!("refresh token rejected ({status})")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EspritError::protocol("refresh response was not valid JSON").with_details(e.to_string()))?;
        let access_token = body.get("access_token").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let new_refresh = body.get("refresh_token").and_then(|v| v.as_str()).map(|s| s.to_string());
        let expires_in_s = body.get("expires_in").and_then(|v| v.as_i64()).unwrap_or(3600);

        Ok(Credential::Oauth {
            access_token,
            refresh_token: new_refresh.or_else(|| Some(refresh.clone())),
            expires_at_ms: chrono::Utc::now().timestamp_millis() + expires_in_s * 1_000,
            account_id: account_id.clone(),
            extra: extra.clone(),
        })
    }
}

/// Wraps the existing [`AntigravityProvider`] behind the shared trait so the
/// dispatch core can refresh credentials through one polymorphic interface
/// regardless of which provider family it's talking to.
pub struct AntigravityAdapter {
    inner: AntigravityProvider,
}

impl Default for AntigravityAdapter {
    fn default() -> Self {
        Self { inner: AntigravityProvider::new() }
    }
}

#[async_trait]
impl ProviderAdapter for AntigravityAdapter {
    async fn refresh_token(&self, credential: &Credential) -> Result<Credential, EspritError> {
        self.inner.refresh_token(credential).await
    }
}

/// Builds the `{provider → adapter}` registry. A small, fixed catalog per
/// spec §1 ("a small, fixed catalog of providers") — not meant to be
/// extended by plugins.
pub fn adapter_registry() -> HashMap<&'static str, Arc<dyn ProviderAdapter>> {
    let mut registry: HashMap<&'static str, Arc<dyn ProviderAdapter>> = HashMap::new();
    registry.insert(
        "anthropic",
        Arc::new(GenericOAuthAdapter {
            token_url: "https://console.anthropic.com/v1/oauth/token",
            client_id: "9d1c250a-e61b-44d9-88ed-5944d1962f5e",
            extra_headers: vec![("anthropic-version", "2023-06-01")],
        }),
    );
    registry.insert(
        "github-copilot",
        Arc::new(GenericOAuthAdapter {
            token_url: "https://api.github.com/copilot_internal/v2/token",
            client_id: "Iv1.b507a08c87ecfe98",
            extra_headers: vec![("Copilot-Integration-Id", "vscode-chat")],
        }),
    );
    registry.insert(
        "openai",
        Arc::new(GenericOAuthAdapter {
            token_url: "https://auth.openai.com/oauth/token",
            client_id: "app_EMoamEEZ73f0CkXaXp7hrann",
            extra_headers: vec![],
        }),
    );
    registry.insert("antigravity", Arc::new(AntigravityAdapter::default()));
    registry
}
