use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

use parking_lot::Mutex;

/// Lifetime spend, persisted across processes at `~/.esprit/usage.json`.
/// Kept separate from per-session `RequestStats` — this file answers "how
/// much has this install spent, ever," not "how much did this run cost."
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UsageLedger {
    pub lifetime_cost: f64,
    pub lifetime_requests: u64,
}

fn usage_path() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".esprit").join("usage.json")
}

fn usage_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn load(path: &std::path::Path) -> UsageLedger {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

/// Writes `contents` to `path` atomically: write to a sibling temp file in
/// the same directory, restrict it to owner-only, then rename over the
/// target. Rename is atomic on the same filesystem, which a direct write to
/// the target file is not.
pub fn atomic_write(path: &std::path::Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Adds `cost` for one completed session to the lifetime ledger, rounding
/// to 4 decimal places to avoid accumulating floating-point noise across
/// thousands of tiny updates.
pub fn add_session_cost(cost: f64) -> io::Result<UsageLedger> {
    let _guard = usage_lock().lock();
    let path = usage_path();
    let mut ledger = load(&path);
    ledger.lifetime_cost = ((ledger.lifetime_cost + cost) * 10_000.0).round() / 10_000.0;
    ledger.lifetime_requests += 1;
    let json = serde_json::to_string_pretty(&ledger)?;
    atomic_write(&path, &json)?;
    Ok(ledger)
}

pub fn read_ledger() -> UsageLedger {
    let _guard = usage_lock().lock();
    load(&usage_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_keeps_four_decimals() {
        let mut ledger = UsageLedger::default();
        ledger.lifetime_cost = ((ledger.lifetime_cost + 0.0000_12345) * 10_000.0).round() / 10_000.0;
        assert_eq!(ledger.lifetime_cost, 0.0);
        ledger.lifetime_cost = ((ledger.lifetime_cost + 1.00006) * 10_000.0).round() / 10_000.0;
        assert_eq!(ledger.lifetime_cost, 1.0001);
    }
}
