pub mod db;
pub mod entry;
pub mod usage;

pub use db::PricingDb;
pub use entry::{ModelPricing, TIERED_THRESHOLD};
pub use usage::{add_session_cost, read_ledger, UsageLedger};
