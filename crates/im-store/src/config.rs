//! Local Store configuration (§4.7).

/// Recognized `database_config` keys and their effects.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Switches journaling mode and synchronous level. Off by default: the
    /// extra WAL/SHM sidecar files cost disk, so conservative journaling
    /// with `synchronous=FULL` is the default.
    pub enable_wal: bool,
    /// Enables full-page encryption when the underlying SQLite build
    /// supports it. A no-op (and logged) when it does not.
    pub encryption_key: Option<Vec<u8>>,
    /// Overrides the database file path.
    pub file_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            enable_wal: false,
            encryption_key: None,
            file_name: "im-sdk.sqlite3".to_owned(),
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> StoreConfig {
        StoreConfig {
            file_name: ":memory:".to_owned(),
            ..Default::default()
        }
    }
}
