use std::path::PathBuf;

/// Common engine configuration shared by the daemon and tests.
///
/// The daemon parses these from its TOML config file, then passes them to
/// storage initialization and the rack supervisor.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding the embedded ledger database.
    pub data_dir: Option<PathBuf>,

    /// Path to the redb ledger file.
    /// Defaults to `{data_dir}/ledger.redb` if not specified.
    pub db_path: Option<PathBuf>,

    /// Number of physical rack slots (fixed, slots are numbered 1..=N).
    pub slot_count: u32,

    /// Operational time zone as a fixed UTC offset in hours.
    /// Batch date keys are computed in this zone.
    pub utc_offset_hours: i32,

    /// Batches with `0 < remaining < threshold` count as low stock.
    pub low_stock_threshold: i64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            db_path: None,
            slot_count: 10,
            utc_offset_hours: 8,
            low_stock_threshold: 10,
        }
    }
}

impl ServiceConfig {
    /// Resolve the redb ledger path, falling back to `{data_dir}/ledger.redb`.
    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("ledger.redb"))
    }

    fn resolve_data_subpath(&self, name: &str) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(|d| d.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.slot_count, 10);
        assert_eq!(config.utc_offset_hours, 8);
        assert_eq!(config.low_stock_threshold, 10);
    }

    #[test]
    fn test_resolve_db_path() {
        let config = ServiceConfig {
            data_dir: Some(PathBuf::from("/data")),
            ..Default::default()
        };
        assert_eq!(config.resolve_db_path(), PathBuf::from("/data/ledger.redb"));

        let explicit = ServiceConfig {
            db_path: Some(PathBuf::from("/elsewhere/l.redb")),
            ..Default::default()
        };
        assert_eq!(explicit.resolve_db_path(), PathBuf::from("/elsewhere/l.redb"));
    }
}
