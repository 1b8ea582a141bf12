use clap::{Args, Parser, Subcommand};

/// Launches the dispatch layer's telemetry server and manages stored
/// provider credentials.
#[derive(Parser)]
#[command(name = "esprit", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the telemetry fan-out's HTTP/WebSocket server.
    Serve {
        /// Address to bind, e.g. 127.0.0.1:8787
        #[arg(long, default_value = "127.0.0.1:8787")]
        bind: String,
        /// Model name reported in stats snapshots until the first dispatch sets one.
        #[arg(long, default_value = "anthropic/claude-sonnet-4-5")]
        model: String,
    },
    /// Manage accounts for multi-account providers (openai, antigravity).
    Accounts(AccountsArgs),
    /// Manage single credentials for non-multi-account providers.
    Credentials(CredentialsArgs),
}

#[derive(Args)]
pub struct AccountsArgs {
    #[command(subcommand)]
    pub action: AccountsAction,
}

#[derive(Subcommand)]
pub enum AccountsAction {
    /// Add or replace an account. Adding the same email again replaces it.
    Add {
        provider: String,
        /// The account's email; identifies it within the provider's pool.
        email: String,
        #[arg(long, conflicts_with_all = ["access_token", "refresh_token", "expires_at_ms"])]
        api_key: Option<String>,
        #[arg(long)]
        access_token: Option<String>,
        #[arg(long)]
        refresh_token: Option<String>,
        #[arg(long, requires = "access_token")]
        expires_at_ms: Option<i64>,
        #[arg(long)]
        project_id: Option<String>,
    },
    /// List all accounts for a provider, masking stored emails.
    List { provider: String },
    /// Remove an account by email.
    Remove { provider: String, email: String },
}

#[derive(Args)]
pub struct CredentialsArgs {
    #[command(subcommand)]
    pub action: CredentialsAction,
}

#[derive(Subcommand)]
pub enum CredentialsAction {
    /// Store (or replace) the credential for a provider.
    Set {
        provider: String,
        #[arg(long, conflicts_with_all = ["access_token", "refresh_token", "expires_at_ms"])]
        api_key: Option<String>,
        #[arg(long)]
        access_token: Option<String>,
        #[arg(long)]
        refresh_token: Option<String>,
        #[arg(long, requires = "access_token")]
        expires_at_ms: Option<i64>,
    },
    /// Show whether a provider has a stored credential (never prints the token).
    Get { provider: String },
    /// Delete the stored credential for a provider.
    Remove { provider: String },
}
