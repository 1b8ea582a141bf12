pub mod account;
pub mod atomic_file;
pub mod pool;
pub mod store;

pub use account::{mask_email, AccountEntry, BACKOFF_RESET_S, BACKOFF_TIERS_S};
pub use pool::{AccountPool, ProviderPool, RotationStrategy, MULTI_ACCOUNT_PROVIDERS};
pub use store::CredentialStore;
