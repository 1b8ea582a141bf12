use crate::config::DispatchConfig;
use crate::memory::{MemoryCompressor, NoopMemoryCompressor};
use crate::message_prep::{prepare_messages, AgentIdentity};
use crate::mode_a;
use crate::mode_b;
use crate::outcome::StreamOutcome;
use crate::retry::backoff_seconds;

use esprit_accounts::{mask_email, AccountPool, CredentialStore, MULTI_ACCOUNT_PROVIDERS};
use esprit_core::{Credential, EspritError, LlmResponse, Message, Result};
use esprit_fanout::TracerState;
use esprit_pricing::PricingDb;
use esprit_providers::antigravity::constants::STREAM_PATH;
use esprit_providers::antigravity::format::CloudCodeRequestArgs;
use esprit_providers::antigravity::{build_cloudcode_request, build_request_headers, endpoints as cloudcode_endpoints, get_fallback_models, DEFAULT_HOST};
use esprit_providers::{adapter_registry, chat_format, detect_provider_with_fallback, is_anthropic, is_antigravity, ProviderAdapter};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;

/// Wires C1-C3 together and drives C4's outer retry/rotate/fallback loop.
/// One instance is typically shared across every agent in a run; per-agent
/// state (sticky account, fallback model) lives in the caller's
/// [`DispatchConfig`], not here.
pub struct Dispatcher {
    pricing: Arc<PricingDb>,
    credential_store: Arc<CredentialStore>,
    account_pools: SyncMutex<HashMap<String, Arc<AccountPool>>>,
    adapters: HashMap<&'static str, Arc<dyn ProviderAdapter>>,
    memory_compressor: Arc<dyn MemoryCompressor>,
    tracer: Option<Arc<SyncMutex<TracerState>>>,
    http_client: reqwest::Client,
}

impl Dispatcher {
    pub fn new(pricing: Arc<PricingDb>, credential_store: Arc<CredentialStore>) -> Self {
        Self {
            pricing,
            credential_store,
            account_pools: SyncMutex::new(HashMap::new()),
            adapters: adapter_registry(),
            memory_compressor: Arc::new(NoopMemoryCompressor),
            tracer: None,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_memory_compressor(mut self, compressor: Arc<dyn MemoryCompressor>) -> Self {
        self.memory_compressor = compressor;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<SyncMutex<TracerState>>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    fn pool_for(&self, provider: &str) -> Arc<AccountPool> {
        let mut pools = self.account_pools.lock();
        pools.entry(provider.to_string()).or_insert_with(|| Arc::new(AccountPool::load_default(provider))).clone()
    }

    /// Resolves a usable, non-expired credential for `provider`, refreshing
    /// it through the provider's adapter when expired. Returns the
    /// credential plus, for multi-account providers, the account id the
    /// caller should report rate-limits/rotation against. `model` scopes
    /// the account-pool selection to per-model rate limits (spec §4.2);
    /// stickiness is tracked by the pool itself via its `active_index`.
    async fn resolve_credential(&self, provider: &str, model: Option<&str>) -> Result<(Credential, Option<String>)> {
        let now_ms = chrono::Utc::now().timestamp_millis();

        let (mut credential, account_id) = if MULTI_ACCOUNT_PROVIDERS.contains(&provider) {
            let pool = self.pool_for(provider);
            let entry = pool
                .get_best_account(model, now_ms)
                .map_err(|e| EspritError::request_failed("account pool I/O error").with_details(e.to_string()))?
                .ok_or_else(|| EspritError::auth_missing(format!("no {provider} account configured")))?;
            (entry.credential, Some(entry.id))
        } else {
            let credential = self
                .credential_store
                .get(provider)
                .ok_or_else(|| EspritError::auth_missing(format!("no credentials stored for {provider}")))?;
            (credential, None)
        };

        if credential.is_expired(now_ms) {
            let adapter = self
                .adapters
                .get(provider)
                .ok_or_else(|| EspritError::auth_expired(format!("no refresh adapter registered for {provider}")))?;
            credential = adapter.refresh_token(&credential).await?;
            if let Some(id) = &account_id {
                let pool = self.pool_for(provider);
                let _ = pool.update_credentials(id, credential.clone());
            } else {
                let _ = self.credential_store.set(provider, credential.clone());
            }
        }

        Ok((credential, account_id))
    }

    /// Runs one full dispatch: prepares messages, then drives the outer
    /// retry/rotate/fallback loop (spec §4.4) until it produces a terminal
    /// [`LlmResponse`] or exhausts every recovery option. Cumulative partial
    /// snapshots are pushed to `partial_tx` as they arrive; dropping the
    /// receiver is the caller's cancellation mechanism (spec §5): the next
    /// send simply becomes a no-op and the in-flight HTTP body is dropped
    /// once this future is itself dropped.
    pub async fn dispatch(
        &self,
        agent_id: &str,
        history: &mut Vec<Message>,
        system_prompt: &str,
        identity: Option<AgentIdentity>,
        config: &mut DispatchConfig,
        tools: &[serde_json::Value],
        partial_tx: Sender<LlmResponse>,
    ) -> Result<LlmResponse> {
        if let Some(tracer) = &self.tracer {
            tracer.lock().compacting_agents.insert(agent_id.to_string());
        }
        let prepared =
            prepare_messages(history, system_prompt, identity.as_ref(), &self.memory_compressor, config.supports_vision).await;
        if let Some(tracer) = &self.tracer {
            tracer.lock().compacting_agents.remove(agent_id);
        }

        let mut attempts: u32 = 0;
        let mut fallback_tried: Vec<String> = Vec::new();

        loop {
            let nominal_provider = detect_provider_with_fallback(&config.model_name, |provider| {
                self.credential_store.has_credentials(provider)
                    || MULTI_ACCOUNT_PROVIDERS.contains(&provider) && self.pool_for(provider).account_count() > 0
            });
            let has_antigravity_account = self.pool_for("antigravity").account_count() > 0;
            let use_cloudcode = is_antigravity(&nominal_provider, has_antigravity_account);
            let credential_provider = if use_cloudcode { "antigravity" } else { nominal_provider.as_str() };

            let (credential, account_id) = self.resolve_credential(credential_provider, Some(&config.model_name)).await?;

            let outcome = if use_cloudcode {
                self.dispatch_mode_b(&credential, config, &prepared, tools, &partial_tx).await
            } else {
                self.dispatch_mode_a(&nominal_provider, &credential, config, &prepared, tools, &partial_tx).await
            };

            match outcome {
                StreamOutcome::Ok((response, usage)) => {
                    let cost = self
                        .pricing
                        .get_cost(&config.model_name, usage.input_tokens, usage.output_tokens, usage.cached_tokens)
                        .unwrap_or(0.0);
                    if let Some(tracer) = &self.tracer {
                        tracer.lock().record_stats(agent_id, usage.input_tokens, usage.output_tokens, usage.cached_tokens, cost);
                    }
                    if let Err(e) = esprit_pricing::add_session_cost(cost) {
                        tracing::debug!(error = %e, "failed to persist lifetime cost");
                    }
                    return Ok(response);
                }
                StreamOutcome::RateLimited { retry_after_s } => {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    let Some(id) = &account_id else {
                        return Err(EspritError::rate_limited(format!(
                            "{credential_provider} is rate-limited and has no alternate account"
                        )));
                    };
                    let pool = self.pool_for(credential_provider);
                    let _ = pool.mark_rate_limited(id, &config.model_name, now_ms, Some(retry_after_s));
                    match pool.rotate(id, Some(&config.model_name), now_ms) {
                        Ok(Some(next)) => {
                            tracing::debug!(
                                provider = %credential_provider,
                                account = %next.email.as_deref().map(mask_email).unwrap_or_default(),
                                "rotated account after 429"
                            );
                        }
                        _ => {
                            return Err(EspritError::rate_limited(format!(
                                "every {credential_provider} account is cooling down"
                            )))
                        }
                    }
                }
                StreamOutcome::Retryable => {
                    attempts += 1;
                    if attempts > config.max_retries {
                        return Err(EspritError::request_failed(format!(
                            "{credential_provider} request failed after {attempts} attempts"
                        )));
                    }
                    tokio::time::sleep(Duration::from_secs_f64(backoff_seconds(attempts))).await;
                }
                StreamOutcome::Fallback => {
                    fallback_tried.push(config.model_name.clone());
                    let candidates = get_fallback_models(&config.model_name, &fallback_tried);
                    match candidates.into_iter().next() {
                        Some(next_model) => {
                            tracing::debug!(from = %config.model_name, to = %next_model, "falling back to next model in chain");
                            config.model_name = next_model;
                            attempts = 0;
                        }
                        None => {
                            return Err(EspritError::request_failed(format!(
                                "{} and its fallback chain are exhausted",
                                config.model_name
                            )))
                        }
                    }
                }
                StreamOutcome::Fatal(err) => return Err(err),
            }
        }
    }

    async fn dispatch_mode_a(
        &self,
        provider: &str,
        credential: &Credential,
        config: &DispatchConfig,
        messages: &[Message],
        tools: &[serde_json::Value],
        partial_tx: &Sender<LlmResponse>,
    ) -> StreamOutcome<(LlmResponse, esprit_providers::antigravity::format::ParsedUsage)> {
        let url = config.api_base.clone().unwrap_or_else(|| chat_format::default_api_base(provider).to_string());
        let headers = chat_format::build_headers(provider, credential.access_token());

        let mut chat_messages = chat_format::to_chat_messages(messages);
        if is_anthropic(provider, &config.model_name) {
            chat_messages = chat_format::apply_cache_control(chat_messages);
        }

        let mut body = serde_json::json!({
            "model": config.model_name,
            "messages": chat_messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(v) = config.max_output_tokens {
                obj.insert("max_tokens".to_string(), serde_json::json!(v));
            }
            if let Some(v) = config.temperature {
                obj.insert("temperature".to_string(), serde_json::json!(v));
            }
            if let Some(v) = config.top_p {
                obj.insert("top_p".to_string(), serde_json::json!(v));
            }
            if !tools.is_empty() {
                obj.insert("tools".to_string(), serde_json::json!(tools));
            }
        }

        mode_a::run(&self.http_client, &url, &headers, body, partial_tx).await
    }

    async fn dispatch_mode_b(
        &self,
        credential: &Credential,
        config: &DispatchConfig,
        messages: &[Message],
        tools: &[serde_json::Value],
        partial_tx: &Sender<LlmResponse>,
    ) -> StreamOutcome<(LlmResponse, esprit_providers::antigravity::format::ParsedUsage)> {
        let project = credential.extra_str("project_id").unwrap_or_default();
        let host = std::env::var("ESPRIT_CLOUDCODE_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let anthropic_inner = mode_b::is_anthropic_inner(&config.model_name);

        let mut all_endpoints = cloudcode_endpoints(&host);
        if anthropic_inner {
            all_endpoints.pop();
        }

        let args = CloudCodeRequestArgs {
            project: &project,
            model: &config.model_name,
            messages,
            tools,
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            is_anthropic_inner: anthropic_inner,
            thinking_budget: config.thinking_budget,
        };
        let body = build_cloudcode_request(&args);

        let mut headers = build_request_headers(credential.access_token());
        if !(anthropic_inner && config.thinking_budget.is_some()) {
            headers.retain(|(k, _)| k != "anthropic-beta");
        }

        mode_b::run(&self.http_client, &all_endpoints, STREAM_PATH, &headers, &body, partial_tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_dispatcher(dir: &tempfile::TempDir) -> Dispatcher {
        let pricing = Arc::new(PricingDb::new());
        let store = Arc::new(CredentialStore::load(dir.path().join("credentials.json")));
        Dispatcher::new(pricing, store)
    }

    #[tokio::test]
    async fn resolve_credential_fails_fast_with_no_stored_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = fresh_dispatcher(&dir);
        let result = dispatcher.resolve_credential("anthropic", None).await;
        assert!(matches!(result, Err(EspritError::AuthenticationMissing { .. })));
    }

    #[tokio::test]
    async fn resolve_credential_returns_unexpired_api_key_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = fresh_dispatcher(&dir);
        dispatcher.credential_store.set("anthropic", Credential::Api { access_token: "key".into() }).unwrap();
        let (credential, account_id) = dispatcher.resolve_credential("anthropic", None).await.unwrap();
        assert_eq!(credential.access_token(), "key");
        assert!(account_id.is_none());
    }
}
