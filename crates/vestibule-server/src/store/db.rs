use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info};

use super::{SettingsRepository, DB_VERSION_KEY};

const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");
const META: TableDefinition<&str, i64> = TableDefinition::new("meta");
const INSTALLED_AT_KEY: &str = "installed_at";

/// Thread-safe handle to the redb settings store.
#[derive(Clone)]
pub struct Store {
    pub(crate) db: Arc<Database>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        // Ensure all tables exist so read transactions never miss them.
        let write_txn = db.begin_write()?;
        write_txn.open_table(SETTINGS)?;
        write_txn.open_table(META)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    /// Mark the store as installed and stamp it with `schema_version`.
    /// Running it again refreshes the schema version but keeps the original
    /// install timestamp.
    pub fn install(&self, schema_version: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut meta = write_txn.open_table(META)?;
            let already = meta.get(INSTALLED_AT_KEY)?.is_some();
            if !already {
                meta.insert(INSTALLED_AT_KEY, Self::now())?;
            }
            let mut settings = write_txn.open_table(SETTINGS)?;
            settings.insert(DB_VERSION_KEY, schema_version)?;
        }
        write_txn.commit()?;

        info!(schema_version, "store installed");
        Ok(())
    }

    /// Unix timestamp of the first install, if any.
    pub fn installed_at(&self) -> Result<Option<i64>> {
        let read_txn = self.db.begin_read()?;
        let meta = read_txn.open_table(META)?;
        let value = meta.get(INSTALLED_AT_KEY)?.map(|guard| guard.value());
        Ok(value)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SETTINGS)?;
        let value = table.get(key)?.map(|guard| guard.value().to_owned());
        Ok(value)
    }

    /// Insert or overwrite a setting.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;

        debug!(key, "stored setting");
        Ok(())
    }

    /// Delete a setting. Returns true if it existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(SETTINGS)?;
            let removed = table.remove(key)?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// All settings, ordered by key.
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SETTINGS)?;

        let mut settings = Vec::new();
        for item in table.iter()? {
            let (k, v) = item?;
            settings.push((k.value().to_owned(), v.value().to_owned()));
        }
        Ok(settings)
    }
}

impl SettingsRepository for Store {
    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.get(key)
    }

    fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        self.put(key, value)
    }

    fn check_if_installed(&self) -> Result<bool> {
        Ok(self.installed_at()?.is_some())
    }
}
