use crate::order::OrderSnapshot;
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub game_root: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub confirm_conflict_save: bool,
}

impl AppConfig {
    pub fn load_or_create() -> Result<Self> {
        let base_dir = base_data_dir()?;
        fs::create_dir_all(&base_dir).context("create app data dir")?;
        let path = base_dir.join("config.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            let config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            return Ok(config);
        }

        let config = AppConfig {
            game_root: None,
            confirm_conflict_save: true,
        };
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let base_dir = base_data_dir()?;
        fs::create_dir_all(&base_dir).context("create app data dir")?;
        let path = base_dir.join("config.json");
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(path, raw).context("write app config")?;
        Ok(())
    }
}

pub fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("bannersmith"))
}

pub fn load_saved_order(data_dir: &Path) -> Result<Option<OrderSnapshot>> {
    let path = data_dir.join("order.json");
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path).context("read order.json")?;
    let snapshot: OrderSnapshot = serde_json::from_str(&raw).context("parse order.json")?;
    Ok(Some(snapshot))
}

pub fn save_order(data_dir: &Path, snapshot: &OrderSnapshot) -> Result<()> {
    fs::create_dir_all(data_dir).context("create app data dir")?;
    let path = data_dir.join("order.json");
    let raw = serde_json::to_string_pretty(snapshot).context("serialize order.json")?;
    fs::write(path, raw).context("write order.json")?;
    Ok(())
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::SnapshotEntry;

    #[test]
    fn saved_order_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let snapshot = OrderSnapshot {
            entries: vec![
                SnapshotEntry {
                    id: "Native".to_string(),
                    enabled: true,
                },
                SnapshotEntry {
                    id: "ExampleArmoury".to_string(),
                    enabled: false,
                },
            ],
        };
        save_order(tmp.path(), &snapshot).unwrap();
        let loaded = load_saved_order(tmp.path()).unwrap().unwrap();
        assert_eq!(loaded.entries, snapshot.entries);
    }

    #[test]
    fn missing_order_file_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_saved_order(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn config_defaults_apply_to_old_files() {
        let raw = r#"{ "game_root": "/opt/bannerlord" }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        assert!(config.confirm_conflict_save);
        assert_eq!(config.game_root, Some(PathBuf::from("/opt/bannerlord")));
    }
}
