mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{AccountsAction, Cli, Command, CredentialsAction};
use esprit_accounts::{mask_email, AccountEntry, AccountPool, CredentialStore};
use esprit_core::Credential;
use esprit_fanout::{global_tracer, TracerBridge};
use esprit_pricing::PricingDb;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { bind, model } => serve(&bind, &model).await,
        Command::Accounts(args) => accounts(args.action),
        Command::Credentials(args) => credentials(args.action),
    }
}

/// Boots the telemetry fan-out's HTTP/WebSocket server (spec §4.5, §6).
/// The dispatch layer itself is a library consumed by the out-of-scope
/// agent runtime; this binary only stands up the side the dashboard talks
/// to, against the process-wide tracer singleton.
async fn serve(bind: &str, model: &str) -> Result<()> {
    let tracer = global_tracer();
    let pricing = Arc::new(PricingDb::new());
    pricing.spawn_remote_refresh();
    let bridge = TracerBridge::new(tracer, pricing, model);
    bridge.spawn_poll_loop();

    let router = esprit_server::router(bridge);
    let listener = tokio::net::TcpListener::bind(bind).await.with_context(|| format!("binding {bind}"))?;
    tracing::info!(%bind, "esprit telemetry server listening");
    axum::serve(listener, router).await.context("server loop exited")?;
    Ok(())
}

fn accounts(action: AccountsAction) -> Result<()> {
    match action {
        AccountsAction::Add { provider, email, api_key, access_token, refresh_token, expires_at_ms, project_id } => {
            let credential = if let Some(key) = api_key {
                Credential::Api { access_token: key }
            } else {
                let access_token = access_token.context("--access-token or --api-key is required")?;
                let mut credential = Credential::Oauth {
                    access_token,
                    refresh_token,
                    expires_at_ms: expires_at_ms.unwrap_or(0),
                    account_id: None,
                    extra: Default::default(),
                };
                if let Some(project_id) = project_id {
                    credential = credential.with_extra("project_id", serde_json::json!(project_id));
                }
                credential
            };

            let pool = AccountPool::load_default(&provider);
            let mut entry = AccountEntry::new(&email, credential);
            entry.added_at_ms = chrono::Utc::now().timestamp_millis();
            pool.add_account(entry).context("writing accounts.json")?;
            println!("added {email} to {provider}");
            Ok(())
        }
        AccountsAction::List { provider } => {
            let pool = AccountPool::load_default(&provider);
            let accounts = pool.list_accounts();
            if accounts.is_empty() {
                println!("no accounts stored for {provider}");
                return Ok(());
            }
            for account in accounts {
                let email = mask_email(&account.email);
                let state = if !account.enabled {
                    "disabled"
                } else if account.cooling_until_ms.is_some() {
                    "cooling"
                } else {
                    "ready"
                };
                println!("{email}\t{state}");
            }
            Ok(())
        }
        AccountsAction::Remove { provider, email } => {
            let pool = AccountPool::load_default(&provider);
            if pool.remove_account(&email).context("writing accounts.json")? {
                println!("removed {email} from {provider}");
            } else {
                println!("no such account: {email}");
            }
            Ok(())
        }
    }
}

fn credentials(action: CredentialsAction) -> Result<()> {
    match action {
        CredentialsAction::Set { provider, api_key, access_token, refresh_token, expires_at_ms } => {
            let credential = if let Some(key) = api_key {
                Credential::Api { access_token: key }
            } else {
                let access_token = access_token.context("--access-token or --api-key is required")?;
                Credential::Oauth {
                    access_token,
                    refresh_token,
                    expires_at_ms: expires_at_ms.unwrap_or(0),
                    account_id: None,
                    extra: Default::default(),
                }
            };
            let store = CredentialStore::load_default();
            store.set(&provider, credential).context("writing credentials.json")?;
            println!("stored credentials for {provider}");
            Ok(())
        }
        CredentialsAction::Get { provider } => {
            let store = CredentialStore::load_default();
            match store.get(&provider) {
                Some(_) => println!("{provider}: credential present"),
                None => println!("{provider}: no credential stored"),
            }
            Ok(())
        }
        CredentialsAction::Remove { provider } => {
            let store = CredentialStore::load_default();
            if store.remove(&provider).context("writing credentials.json")? {
                println!("removed credentials for {provider}");
            } else {
                println!("no credentials stored for {provider}");
            }
            Ok(())
        }
    }
}
