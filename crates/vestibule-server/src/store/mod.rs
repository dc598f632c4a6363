pub mod db;

use anyhow::Result;

pub use db::Store;

/// Schema version this build expects the settings store to carry.
pub const SCHEMA_VERSION: &str = "2.1.4";

/// Setting key holding the schema version the store was last migrated to.
pub const DB_VERSION_KEY: &str = "db-version";

/// Key-value access to persisted application settings.
///
/// Implementations must be cheap to call once per request; the gate caches
/// what it reads into the session so most requests never reach the store.
pub trait SettingsRepository: Send + Sync {
    /// Returns `None` when the key has never been written.
    fn get_setting(&self, key: &str) -> Result<Option<String>>;

    fn save_setting(&self, key: &str, value: &str) -> Result<()>;

    /// True once the installer has run against this store.
    fn check_if_installed(&self) -> Result<bool>;
}
