//! Server-side configuration.
//!
//! Reads a TOML file of the shape:
//!
//! ```toml
//! [storage]
//! data_dir = "/var/lib/drysync"
//!
//! [rack]
//! slot_count = 10
//! utc_offset_hours = 8
//! low_stock_threshold = 10
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the embedded ledger database.
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RackConfig {
    /// Number of physical rack slots, numbered 1..=N.
    #[serde(default = "default_slot_count")]
    pub slot_count: u32,

    /// Operational time zone as a fixed UTC offset in hours.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// Batches with `0 < remaining < threshold` count as low stock.
    #[serde(default = "default_low_stock")]
    pub low_stock_threshold: i64,
}

fn default_slot_count() -> u32 {
    10
}

fn default_utc_offset() -> i32 {
    8
}

fn default_low_stock() -> i64 {
    10
}

impl Default for RackConfig {
    fn default() -> Self {
        Self {
            slot_count: default_slot_count(),
            utc_offset_hours: default_utc_offset(),
            low_stock_threshold: default_low_stock(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub storage: StorageConfig,

    #[serde(default)]
    pub rack: RackConfig,
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Verify the configuration is usable before touching storage.
    pub fn verify(&self) -> anyhow::Result<()> {
        if self.storage.data_dir.is_empty() {
            anyhow::bail!("storage.data_dir is empty in configuration");
        }
        if self.rack.slot_count == 0 {
            anyhow::bail!("rack.slot_count must be at least 1");
        }
        if self.rack.utc_offset_hours.abs() > 14 {
            anyhow::bail!("rack.utc_offset_hours must be a valid UTC offset");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_rack_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [storage]
            data_dir = "/tmp/drysync"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.data_dir, "/tmp/drysync");
        assert_eq!(config.rack.slot_count, 10);
        assert_eq!(config.rack.utc_offset_hours, 8);
        assert!(config.verify().is_ok());
    }

    #[test]
    fn verify_rejects_bad_values() {
        let mut config: ServerConfig = toml::from_str(
            r#"
            [storage]
            data_dir = ""
            "#,
        )
        .unwrap();
        assert!(config.verify().is_err());

        config.storage.data_dir = "/tmp".into();
        config.rack.slot_count = 0;
        assert!(config.verify().is_err());

        config.rack.slot_count = 10;
        config.rack.utc_offset_hours = 99;
        assert!(config.verify().is_err());
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drysync.toml");
        std::fs::write(
            &path,
            "[storage]\ndata_dir = \"/tmp/d\"\n\n[rack]\nslot_count = 6\n",
        )
        .unwrap();
        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.rack.slot_count, 6);
    }
}
