use crate::account::AccountEntry;
use crate::atomic_file;
use esprit_core::Credential;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Providers that support holding more than one account and rotating
/// between them on rate limits.
pub const MULTI_ACCOUNT_PROVIDERS: &[&str] = &["openai", "antigravity"];

/// Selection strategy for picking among viable accounts (spec §3).
/// `Sticky` keeps using `active_index` as long as it's still viable;
/// `RoundRobin` advances past it every time a fresh pick is made.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RotationStrategy {
    #[default]
    Sticky,
    RoundRobin,
}

/// One provider's account pool, as persisted under `pools.<provider>` in
/// the single `accounts.json` file (spec §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderPool {
    pub accounts: Vec<AccountEntry>,
    #[serde(default)]
    pub active_index: usize,
    #[serde(default)]
    pub strategy: RotationStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountsFile {
    version: u32,
    pools: std::collections::HashMap<String, ProviderPool>,
}

impl Default for AccountsFile {
    fn default() -> Self {
        Self { version: 1, pools: std::collections::HashMap::new() }
    }
}

/// A file-backed pool of accounts for one provider, supporting sticky
/// selection (keep using the same account across a conversation) and
/// round-robin rotation when an account needs to be swapped out.
///
/// All providers share one `accounts.json` (spec §6); each `AccountPool`
/// instance is scoped to a single provider's slice of it, read/written
/// back through the whole-file atomic rename so concurrent pools never
/// tear each other's writes.
pub struct AccountPool {
    path: PathBuf,
    provider: String,
    inner: Mutex<ProviderPool>,
}

impl AccountPool {
    pub fn load(path: impl Into<PathBuf>, provider: impl Into<String>) -> Self {
        let path = path.into();
        let provider = provider.into();
        let file: AccountsFile = atomic_file::read_json(&path);
        let pool = file.pools.get(&provider).cloned().unwrap_or_default();
        Self { path, provider, inner: Mutex::new(pool) }
    }

    pub fn load_default(provider: &str) -> Self {
        Self::load(accounts_path(), provider)
    }

    /// Read-modify-write the whole file, merging this provider's slice back
    /// in so sibling providers' pools (loaded by other `AccountPool`
    /// instances) aren't clobbered.
    fn persist(&self, pool: &ProviderPool) -> std::io::Result<()> {
        let mut file: AccountsFile = atomic_file::read_json(&self.path);
        file.pools.insert(self.provider.clone(), pool.clone());
        let json = serde_json::to_string_pretty(&file)?;
        atomic_file::write(&self.path, &json)
    }

    fn now_expire(pool: &mut ProviderPool, now_ms: i64) {
        for account in &mut pool.accounts {
            account.expire_transient(now_ms);
        }
    }

    /// Adds `entry`, replacing any existing account with the same email
    /// (spec §3: "at most one `AccountEntry` per `(provider, email)`;
    /// adding a duplicate replaces").
    pub fn add_account(&self, entry: AccountEntry) -> std::io::Result<()> {
        let mut pool = self.inner.lock();
        pool.accounts.retain(|a| a.email != entry.email);
        pool.accounts.push(entry);
        self.persist(&pool)
    }

    pub fn remove_account(&self, email: &str) -> std::io::Result<bool> {
        let mut pool = self.inner.lock();
        let before = pool.accounts.len();
        pool.accounts.retain(|a| a.email != email);
        let removed = pool.accounts.len() != before;
        if pool.active_index >= pool.accounts.len() {
            pool.active_index = 0;
        }
        if removed {
            self.persist(&pool)?;
        }
        Ok(removed)
    }

    pub fn list_accounts(&self) -> Vec<AccountEntry> {
        self.inner.lock().accounts.clone()
    }

    pub fn account_count(&self) -> usize {
        self.inner.lock().accounts.len()
    }

    pub fn update_credentials(&self, email: &str, credential: Credential) -> std::io::Result<bool> {
        let mut pool = self.inner.lock();
        let Some(entry) = pool.accounts.iter_mut().find(|a| a.email == email) else {
            return Ok(false);
        };
        entry.credential = credential;
        self.persist(&pool)?;
        Ok(true)
    }

    /// Records a 429 against `email` for `model`, escalating its backoff tier.
    pub fn mark_rate_limited(&self, email: &str, model: &str, now_ms: i64, retry_after_s: Option<u64>) -> std::io::Result<()> {
        let mut pool = self.inner.lock();
        Self::now_expire(&mut pool, now_ms);
        if let Some(entry) = pool.accounts.iter_mut().find(|a| a.email == email) {
            entry.mark_rate_limited(model, now_ms, retry_after_s);
        }
        self.persist(&pool)
    }

    /// Picks the account that would be used next for `model`, without
    /// mutating state. Filters to enabled, non-cooling accounts; further
    /// filters to those not individually rate-limited for `model` unless
    /// that would leave nothing, in which case the rate-limited ones are
    /// kept rather than returning nothing (spec §4.2).
    pub fn peek_best_account(&self, model: Option<&str>, now_ms: i64) -> Option<AccountEntry> {
        let mut pool = self.inner.lock();
        Self::now_expire(&mut pool, now_ms);
        Self::select(&pool, model, now_ms)
    }

    fn select(pool: &ProviderPool, model: Option<&str>, now_ms: i64) -> Option<AccountEntry> {
        if pool.accounts.is_empty() {
            return None;
        }
        let enabled_non_cooling: Vec<usize> =
            (0..pool.accounts.len()).filter(|&i| pool.accounts[i].enabled && !pool.accounts[i].is_cooling(now_ms)).collect();
        if enabled_non_cooling.is_empty() {
            return None;
        }
        let not_rate_limited: Vec<usize> = enabled_non_cooling
            .iter()
            .copied()
            .filter(|&i| model.map(|m| !pool.accounts[i].is_rate_limited_for(m, now_ms)).unwrap_or(true))
            .collect();
        let candidates = if not_rate_limited.is_empty() { enabled_non_cooling } else { not_rate_limited };

        let chosen_idx = match pool.strategy {
            RotationStrategy::Sticky => {
                if candidates.contains(&pool.active_index) {
                    pool.active_index
                } else {
                    candidates[0]
                }
            }
            RotationStrategy::RoundRobin => {
                candidates.iter().copied().find(|&i| i > pool.active_index).unwrap_or(candidates[0])
            }
        };
        Some(pool.accounts[chosen_idx].clone())
    }

    /// Like [`Self::peek_best_account`] but marks the chosen account as
    /// just used, persists `active_index`, and writes.
    pub fn get_best_account(&self, model: Option<&str>, now_ms: i64) -> std::io::Result<Option<AccountEntry>> {
        let mut pool = self.inner.lock();
        Self::now_expire(&mut pool, now_ms);
        let Some(chosen) = Self::select(&pool, model, now_ms) else {
            return Ok(None);
        };
        if let Some(idx) = pool.accounts.iter().position(|a| a.email == chosen.email) {
            pool.accounts[idx].last_used_ms = Some(now_ms);
            pool.active_index = idx;
        }
        self.persist(&pool)?;
        Ok(Some(chosen))
    }

    /// Rotates away from `current_email` to a different account for `model`,
    /// advancing `active_index` to the next enabled, non-cooling,
    /// non-rate-limited account. Walks by offset from the current
    /// position so repeated rotations cycle through every account rather
    /// than bouncing between the same two; never returns the account it
    /// started from.
    pub fn rotate(&self, current_email: &str, model: Option<&str>, now_ms: i64) -> std::io::Result<Option<AccountEntry>> {
        let mut pool = self.inner.lock();
        Self::now_expire(&mut pool, now_ms);
        if pool.accounts.len() < 2 {
            return Ok(None);
        }
        let start = pool.accounts.iter().position(|a| a.email == current_email).unwrap_or(0);
        let len = pool.accounts.len();

        let mut fallback: Option<usize> = None;
        for offset in 1..len {
            let idx = (start + offset) % len;
            let account = &pool.accounts[idx];
            if account.email == current_email || !account.enabled || account.is_cooling(now_ms) {
                continue;
            }
            let rate_limited = model.map(|m| account.is_rate_limited_for(m, now_ms)).unwrap_or(false);
            if !rate_limited {
                pool.accounts[idx].last_used_ms = Some(now_ms);
                pool.active_index = idx;
                let chosen = pool.accounts[idx].clone();
                self.persist(&pool)?;
                return Ok(Some(chosen));
            }
            if fallback.is_none() {
                fallback = Some(idx);
            }
        }

        if let Some(idx) = fallback {
            pool.accounts[idx].last_used_ms = Some(now_ms);
            pool.active_index = idx;
            let chosen = pool.accounts[idx].clone();
            self.persist(&pool)?;
            return Ok(Some(chosen));
        }
        Ok(None)
    }
}

pub fn accounts_path() -> PathBuf {
    esprit_home().join("accounts.json")
}

pub fn esprit_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".esprit")
}

pub fn credentials_path() -> PathBuf {
    esprit_home().join("credentials.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_at(dir: &tempfile::TempDir) -> AccountPool {
        AccountPool::load(dir.path().join("accounts.json"), "openai")
    }

    fn account(email: &str) -> AccountEntry {
        AccountEntry::new(email, Credential::Api { access_token: format!("key-{email}") })
    }

    #[test]
    fn peek_sticky_prefers_active_index_when_usable() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool_at(&dir);
        pool.add_account(account("a@x.com")).unwrap();
        pool.add_account(account("b@x.com")).unwrap();
        pool.get_best_account(None, 0).unwrap(); // active_index -> 0 (a)
        let chosen = pool.peek_best_account(None, 0).unwrap();
        assert_eq!(chosen.email, "a@x.com");
    }

    #[test]
    fn rate_limited_accounts_are_scoped_per_model() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool_at(&dir);
        pool.add_account(account("a@x.com")).unwrap();
        pool.add_account(account("b@x.com")).unwrap();
        pool.mark_rate_limited("a@x.com", "gpt-5", 0, Some(3600)).unwrap();

        // gpt-5 avoids the limited account...
        let chosen = pool.peek_best_account(Some("gpt-5"), 1_000).unwrap();
        assert_eq!(chosen.email, "b@x.com");
        // ...but gpt-5-mini on the same account is untouched.
        let pool2 = pool_at(&dir);
        let chosen2 = pool2.peek_best_account(Some("gpt-5-mini"), 1_000);
        assert!(chosen2.is_some());
    }

    #[test]
    fn all_rate_limited_falls_back_to_keeping_them() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool_at(&dir);
        pool.add_account(account("a@x.com")).unwrap();
        pool.add_account(account("b@x.com")).unwrap();
        pool.mark_rate_limited("a@x.com", "gpt-5", 0, Some(3600)).unwrap();
        pool.mark_rate_limited("b@x.com", "gpt-5", 0, Some(3600)).unwrap();
        assert!(pool.peek_best_account(Some("gpt-5"), 1_000).is_some());
    }

    #[test]
    fn rotate_never_returns_the_same_account() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool_at(&dir);
        pool.add_account(account("a@x.com")).unwrap();
        pool.add_account(account("b@x.com")).unwrap();
        pool.add_account(account("c@x.com")).unwrap();
        for _ in 0..10 {
            let next = pool.rotate("a@x.com", Some("gpt-5"), 0).unwrap().unwrap();
            assert_ne!(next.email, "a@x.com");
        }
    }

    #[test]
    fn rotate_with_single_account_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool_at(&dir);
        pool.add_account(account("a@x.com")).unwrap();
        assert!(pool.rotate("a@x.com", None, 0).unwrap().is_none());
    }

    #[test]
    fn two_provider_pools_share_the_file_without_clobbering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let openai = AccountPool::load(&path, "openai");
        openai.add_account(account("a@x.com")).unwrap();
        let antigravity = AccountPool::load(&path, "antigravity");
        antigravity.add_account(account("z@x.com")).unwrap();

        let reopened_openai = AccountPool::load(&path, "openai");
        assert_eq!(reopened_openai.account_count(), 1);
        let reopened_gravity = AccountPool::load(&path, "antigravity");
        assert_eq!(reopened_gravity.account_count(), 1);
    }

    #[test]
    fn adding_the_same_email_twice_replaces_rather_than_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool_at(&dir);
        pool.add_account(account("a@x.com")).unwrap();
        let mut replacement = account("a@x.com");
        replacement.credential = Credential::Api { access_token: "new-key".into() };
        pool.add_account(replacement).unwrap();

        assert_eq!(pool.account_count(), 1);
        let accounts = pool.list_accounts();
        assert_eq!(accounts[0].credential.access_token(), "new-key");
    }

    proptest::proptest! {
        /// For any pool of 2-8 accounts and any starting position, rotating
        /// away from the current account never lands back on it.
        #[test]
        fn rotate_never_returns_the_starting_account(count in 2usize..8, start in 0usize..8) {
            let dir = tempfile::tempdir().unwrap();
            let pool = pool_at(&dir);
            let start = start % count;
            for i in 0..count {
                pool.add_account(account(&format!("acct-{i}@x.com"))).unwrap();
            }
            let current_email = format!("acct-{start}@x.com");
            if let Some(next) = pool.rotate(&current_email, None, 0).unwrap() {
                proptest::prop_assert_ne!(next.email, current_email);
            }
        }
    }
}
