use esprit_core::Credential;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Escalating cool-down tiers (seconds) applied on successive 429s from the
/// same account, worst case capped at two hours.
pub const BACKOFF_TIERS_S: [u64; 4] = [60, 300, 1800, 7200];

/// If an account hasn't been rate-limited in this long, the next 429 it
/// hits starts back at the first backoff tier instead of continuing to
/// escalate from wherever it left off.
pub const BACKOFF_RESET_S: i64 = 120;

/// One stored account in a multi-account pool: its credential plus the
/// rotation bookkeeping needed to avoid hammering an account that's
/// currently rate-limited.
///
/// `email` is the account's identity (spec §3: "at most one `AccountEntry`
/// per `(provider, email)`; adding a duplicate replaces") — there is no
/// separate id field, so two logins with the same email are the same
/// account.
///
/// `rate_limits` is per-model (spec §3): a 429 on `gpt-5` doesn't block the
/// same account from being picked for `gpt-5-mini`. `cooling_until_ms` is
/// separate and provider-wide — it's the escalating backoff that widens with
/// consecutive 429s regardless of which model triggered them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountEntry {
    pub email: String,
    pub credential: Credential,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub added_at_ms: i64,
    #[serde(default)]
    pub consecutive_429s: u32,
    #[serde(default)]
    pub rate_limits: HashMap<String, i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cooling_until_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_429_at_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_used_ms: Option<i64>,
}

fn default_true() -> bool {
    true
}

impl AccountEntry {
    pub fn new(email: impl Into<String>, credential: Credential) -> Self {
        Self {
            email: email.into(),
            credential,
            enabled: true,
            added_at_ms: 0,
            consecutive_429s: 0,
            rate_limits: HashMap::new(),
            cooling_until_ms: None,
            last_429_at_ms: None,
            last_used_ms: None,
        }
    }

    pub fn is_cooling(&self, now_ms: i64) -> bool {
        self.cooling_until_ms.map(|until| until > now_ms).unwrap_or(false)
    }

    pub fn is_rate_limited_for(&self, model: &str, now_ms: i64) -> bool {
        self.rate_limits.get(model).map(|reset| *reset > now_ms).unwrap_or(false)
    }

    /// Whether this account is viable for `model` right now, ignoring any
    /// "keep the rate-limited ones rather than return nothing" relaxation —
    /// that's the pool's job, not the entry's.
    pub fn is_viable_for(&self, model: Option<&str>, now_ms: i64) -> bool {
        if !self.enabled || self.is_cooling(now_ms) {
            return false;
        }
        match model {
            Some(model) => !self.is_rate_limited_for(model, now_ms),
            None => true,
        }
    }

    /// Records a 429 against this account for `model`, escalating the
    /// provider-wide cooldown tier unless enough time has passed since the
    /// last 429 that we should start over at the first tier.
    /// `retry_after_s`, when the provider sent one, sets the per-model
    /// rate-limit reset outright; the escalating `cooling_until` always
    /// follows the backoff tier ladder regardless of `retry_after_s`.
    pub fn mark_rate_limited(&mut self, model: &str, now_ms: i64, retry_after_s: Option<u64>) {
        let reset_window_ms = BACKOFF_RESET_S * 1_000;
        let stale = self.last_429_at_ms.map(|last| now_ms - last > reset_window_ms).unwrap_or(true);
        if stale {
            self.consecutive_429s = 0;
        }
        self.consecutive_429s += 1;
        let tier_index = (self.consecutive_429s as usize - 1).min(BACKOFF_TIERS_S.len() - 1);
        let cooling_wait_s = BACKOFF_TIERS_S[tier_index];
        self.cooling_until_ms = Some(now_ms + cooling_wait_s as i64 * 1_000);
        self.last_429_at_ms = Some(now_ms);

        let model_wait_s = retry_after_s.unwrap_or(60);
        self.rate_limits.insert(model.to_string(), now_ms + model_wait_s as i64 * 1_000);
    }

    /// Clears transient state whose deadline has passed: expired per-model
    /// rate limits, an expired cooldown, and resets `consecutive_429s` once
    /// the reset window has elapsed with no new 429. Called on every read
    /// per spec §4.2 ("every read first expires transient state").
    pub fn expire_transient(&mut self, now_ms: i64) {
        self.rate_limits.retain(|_, reset| *reset > now_ms);
        if self.cooling_until_ms.map(|until| until <= now_ms).unwrap_or(false) {
            self.cooling_until_ms = None;
        }
        let reset_window_ms = BACKOFF_RESET_S * 1_000;
        if self.last_429_at_ms.map(|last| now_ms - last > reset_window_ms).unwrap_or(false) {
            self.consecutive_429s = 0;
        }
    }
}

/// Masks all but the first character of the local part of an email, for
/// safe-to-log account identifiers: `alice@example.com` -> `a***@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            format!("{}***@{domain}", &local[..1])
        }
        _ => "***".to_string(),
    }
}
