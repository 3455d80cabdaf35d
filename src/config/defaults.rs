//! Built-in configuration defaults

use std::path::PathBuf;

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/coldstore/coldstore.toml";

/// Default encryption delay for session recordings (days)
pub const DEFAULT_TTYREC_DELAY_DAYS: i64 = 14;

/// Floor for log and database encryption delays (days)
///
/// Activity logs and state databases must stay in plaintext long enough for
/// operational lookups; configuration below this floor is rejected outright.
pub const LOG_DELAY_FLOOR_DAYS: i64 = 31;

/// Default removal delay after a confirmed sync (days); 0 = immediate
pub const DEFAULT_REMOVAL_DELAY_DAYS: i64 = 0;

/// Default run lock location
pub fn default_lock_path() -> PathBuf {
    PathBuf::from("/var/lib/coldstore/run.lock")
}

/// Default ledger location
pub fn default_ledger_path() -> PathBuf {
    PathBuf::from("/var/lib/coldstore/ledger.json")
}

/// Default transport command template
pub fn default_transport_command() -> Vec<String> {
    ["rsync", "-a", "--", "{artifact}", "{destination}/"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Default gpg binary name (resolved via PATH)
pub fn default_gpg_binary() -> PathBuf {
    PathBuf::from("gpg")
}
