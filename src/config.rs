//! 設定ファイル管理モジュール
//!
//! マシン構成とタイミング設定をJSON形式で永続化

use crate::apple2::Model;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 設定ファイルのデフォルトファイル名
const CONFIG_FILENAME: &str = "a2core_config.json";

/// 実行ファイルのディレクトリを取得
pub fn get_exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// 相対パスを指定されたベースディレクトリからの絶対パスに解決
pub fn resolve_path_with_base(base: &Path, relative: &str) -> PathBuf {
    let path = Path::new(relative);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(relative)
    }
}

/// 設定ファイルのパスを取得
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join(CONFIG_FILENAME)
}

/// エミュレータ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 機種
    pub model: Model,
    /// システムROM（II+は12KB、IIeは16KB）
    pub rom: Option<String>,
    /// Disk II P5 ブートROM（256バイト）
    pub disk_rom: Option<String>,
    /// ドライブ1のイメージ
    pub disk1: Option<String>,
    /// ドライブ2のイメージ
    pub disk2: Option<String>,
    /// CPUクロック (kHz)
    pub clock_khz: u64,
    /// 1回の `run` で実行する最大サイクル数
    pub max_cycles_per_tick: u64,
    /// モーター停止までの遅延 (ms)
    pub motor_off_ms: u64,
    /// 乱数ビット用のシード
    pub rng_seed: u64,
    /// セーブデータディレクトリ
    pub save_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model: Model::AppleIIPlus,
            rom: None,
            disk_rom: None,
            disk1: None,
            disk2: None,
            clock_khz: 1023,
            max_cycles_per_tick: 102_300,
            motor_off_ms: 1000,
            rng_seed: 0,
            save_dir: "saves".to_string(),
        }
    }
}

impl Config {
    /// 設定ファイルを読み込む（実行ファイルと同じディレクトリから）
    pub fn load() -> Self {
        Self::load_from(get_config_path())
    }

    /// 指定パスから読み込む。存在しない・壊れている場合はデフォルト
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    log::info!("config: loaded {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("config: {} is invalid ({}), using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                log::debug!("config: {} not found, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(get_config_path())
    }

    /// 整形済みJSONで保存
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        log::info!("config: saved {}", path.as_ref().display());
        Ok(())
    }

    /// 経過時間に対応するサイクル数（上限付き）
    pub fn cycles_for(&self, elapsed: Duration) -> u64 {
        let cycles = elapsed.as_micros() as u64 * self.clock_khz / 1000;
        cycles.min(self.max_cycles_per_tick)
    }

    pub fn motor_off_delay(&self) -> Duration {
        Duration::from_millis(self.motor_off_ms)
    }

    /// セーブファイルのパスを取得
    pub fn get_save_path(&self, slot: u8) -> PathBuf {
        let filename = if slot == 0 {
            "quicksave.json".to_string()
        } else {
            format!("save_slot_{}.json", slot)
        };
        resolve_path_with_base(&get_exe_dir(), &self.save_dir).join(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("a2core_{}_{}.json", name, std::process::id()))
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from(temp_path("missing"));
        assert_eq!(config, Config::default());
        assert_eq!(config.clock_khz, 1023);
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("roundtrip");
        let config = Config {
            model: Model::AppleIIeEnhanced,
            disk1: Some("dos33.dsk".into()),
            rng_seed: 42,
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path);
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_and_invalid_files() {
        let path = temp_path("partial");
        fs::write(&path, r#"{ "model": "iie", "clock_khz": 2046 }"#).unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.model, Model::AppleIIe);
        assert_eq!(config.clock_khz, 2046);
        assert_eq!(config.motor_off_ms, 1000);

        fs::write(&path, "not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_cycle_budget_is_clamped() {
        let config = Config::default();
        assert_eq!(config.cycles_for(Duration::from_millis(10)), 10_230);
        assert_eq!(config.cycles_for(Duration::from_secs(5)), config.max_cycles_per_tick);
    }

    #[test]
    fn test_save_path() {
        let config = Config::default();
        assert!(config.get_save_path(0).ends_with("saves/quicksave.json"));
        assert!(config.get_save_path(3).ends_with("saves/save_slot_3.json"));
    }
}
