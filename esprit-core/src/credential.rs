use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A stored provider credential. OAuth credentials may expire and be
/// refreshed; API-key credentials never expire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credential {
    Oauth {
        access_token: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        refresh_token: Option<String>,
        expires_at_ms: i64,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        account_id: Option<String>,
        #[serde(default)]
        extra: HashMap<String, serde_json::Value>,
    },
    Api { access_token: String },
}

impl Credential {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        match self {
            Credential::Oauth { expires_at_ms, .. } => *expires_at_ms <= now_ms,
            Credential::Api { .. } => false,
        }
    }

    pub fn access_token(&self) -> &str {
        match self {
            Credential::Oauth { access_token, .. } => access_token,
            Credential::Api { access_token } => access_token,
        }
    }

    pub fn extra_str(&self, key: &str) -> Option<String> {
        match self {
            Credential::Oauth { extra, .. } => {
                extra.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
            }
            Credential::Api { .. } => None,
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if let Credential::Oauth { extra, .. } = &mut self {
            extra.insert(key.into(), value);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_expiry_flips_at_exact_boundary() {
        let cred = Credential::Oauth {
            access_token: "tok".into(),
            refresh_token: None,
            expires_at_ms: 1_000,
            account_id: None,
            extra: HashMap::new(),
        };
        assert!(!cred.is_expired(999));
        assert!(cred.is_expired(1_000));
        assert!(cred.is_expired(1_001));
    }

    #[test]
    fn api_credentials_never_expire() {
        let cred = Credential::Api { access_token: "key".into() };
        assert!(!cred.is_expired(i64::MAX));
    }

    #[test]
    fn serde_roundtrip_oauth() {
        let mut extra = HashMap::new();
        extra.insert("email".to_string(), serde_json::json!("a@b.com"));
        let cred = Credential::Oauth {
            access_token: "tok".into(),
            refresh_token: Some("refresh".into()),
            expires_at_ms: 42,
            account_id: Some("acct".into()),
            extra,
        };
        let json = serde_json::to_string(&cred).unwrap();
        let back: Credential = serde_json::from_str(&json).unwrap();
        assert_eq!(cred, back);
    }
}
