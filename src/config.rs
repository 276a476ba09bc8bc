//! 設定ファイル管理モジュール
//!
//! エミュレータの設定をJSON形式で永続化

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::regions::RamFill;

/// 設定ファイルのデフォルトファイル名
const CONFIG_FILENAME: &str = "arcrs_config.json";

/// 実行ファイルのディレクトリを取得
pub fn get_exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// 相対パスを指定されたベースディレクトリからの絶対パスに解決
pub fn resolve_path_with_base(base: &str, relative: &str) -> PathBuf {
    let path = Path::new(relative);
    if path.is_absolute() {
        path.to_path_buf()
    } else if base.is_empty() {
        get_exe_dir().join(relative)
    } else {
        let base_path = Path::new(base);
        if base_path.is_absolute() {
            base_path.join(relative)
        } else {
            get_exe_dir().join(base).join(relative)
        }
    }
}

/// 設定ファイルのパスを取得
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join(CONFIG_FILENAME)
}

/// エミュレータ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// ホームディレクトリ（相対パスの基準）
    /// 空または未設定の場合は実行ファイルのディレクトリを使用
    #[serde(default = "default_home_dir")]
    pub arcrs_home: String,
    /// 最後に起動したドライバ
    #[serde(default)]
    pub last_driver: Option<String>,
    /// ウィンドウ倍率（1-4）
    #[serde(default = "default_scale")]
    pub scale: u32,
    /// 電源投入時のRAM内容
    #[serde(default)]
    pub ram_fill: RamFill,
    /// ROMの欠落・CRC不一致をエラーにする
    #[serde(default)]
    pub strict_crc: bool,
    /// ウォッチドッグ有効
    #[serde(default = "default_true")]
    pub watchdog: bool,
    /// 現在のセーブスロット
    #[serde(default)]
    pub current_slot: u8,
    /// ドライバごとのDIPスイッチ上書き（ドライバ名 → スイッチ名 → 値）
    #[serde(default)]
    pub dips: BTreeMap<String, BTreeMap<String, u8>>,
    /// ROMディレクトリ（<rom_dir>/<driver>/）
    #[serde(default = "default_rom_dir")]
    pub rom_dir: String,
    /// スクリーンショットディレクトリ
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: String,
    /// セーブデータディレクトリ
    #[serde(default = "default_save_dir")]
    pub save_dir: String,
}

fn default_home_dir() -> String { String::new() }
fn default_rom_dir() -> String { "roms".to_string() }
fn default_screenshot_dir() -> String { "screenshots".to_string() }
fn default_save_dir() -> String { "saves".to_string() }
fn default_scale() -> u32 { 2 }
fn default_true() -> bool { true }

impl Default for Config {
    fn default() -> Self {
        Config {
            arcrs_home: default_home_dir(),
            last_driver: None,
            scale: default_scale(),
            ram_fill: RamFill::default(),
            strict_crc: false,
            watchdog: true,
            current_slot: 0,
            dips: BTreeMap::new(),
            rom_dir: default_rom_dir(),
            screenshot_dir: default_screenshot_dir(),
            save_dir: default_save_dir(),
        }
    }
}

impl Config {
    /// オプション指定で設定ファイルを読み込む
    /// 優先順位:
    /// 1. config_path が指定されている場合はそれを使用
    /// 2. home_path が指定されている場合は home_path/arcrs_config.json を探す
    /// 3. 実行ファイルディレクトリの arcrs_config.json
    ///
    /// home_path が指定されている場合、読み込んだ設定の arcrs_home を上書き
    pub fn load_with_options(config_path: Option<&str>, home_path: Option<&str>) -> (Self, PathBuf) {
        let config_file_path = if let Some(path) = config_path {
            PathBuf::from(path)
        } else if let Some(home) = home_path {
            let home_config = Path::new(home).join(CONFIG_FILENAME);
            if home_config.exists() {
                home_config
            } else {
                get_config_path()
            }
        } else {
            get_config_path()
        };

        let mut config = Self::load_from(&config_file_path);

        // コマンドラインのhome指定を優先
        if let Some(home) = home_path {
            config.arcrs_home = home.to_string();
        }

        (config, config_file_path)
    }

    /// 指定したパスから設定を読み込む
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Failed to parse config {:?}: {}, using defaults", path.as_ref(), e);
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    /// 指定したパスに設定を保存する
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        fs::write(path, json)
            .map_err(|e| format!("Failed to write config: {}", e))?;
        Ok(())
    }

    /// 相対パスをarcrs_homeからの絶対パスに解決
    pub fn resolve_path(&self, relative: &str) -> PathBuf {
        resolve_path_with_base(&self.arcrs_home, relative)
    }

    pub fn rom_dir_path(&self) -> PathBuf {
        self.resolve_path(&self.rom_dir)
    }

    pub fn screenshot_dir_path(&self) -> PathBuf {
        self.resolve_path(&self.screenshot_dir)
    }

    pub fn save_dir_path(&self) -> PathBuf {
        self.resolve_path(&self.save_dir)
    }

    /// ドライバのDIP上書き（なければ空）
    pub fn dips_for(&self, driver: &str) -> BTreeMap<String, u8> {
        self.dips.get(driver).cloned().unwrap_or_default()
    }

    /// ディレクトリが存在しなければ作成
    pub fn ensure_directories(&self) {
        let dirs = [self.screenshot_dir_path(), self.save_dir_path(), self.rom_dir_path()];
        for dir in dirs {
            if !dir.exists() {
                if let Err(e) = fs::create_dir_all(&dir) {
                    log::warn!("Failed to create {:?}: {}", dir, e);
                }
            }
        }
    }
}

/// セーブスロット管理
pub struct SaveSlots;

impl SaveSlots {
    /// セーブスロットのファイル名を取得（ドライバごと）
    pub fn get_filename(driver: &str, slot: u8) -> String {
        if slot == 0 {
            format!("{}_quicksave.json", driver)
        } else {
            format!("{}_slot_{}.json", driver, slot)
        }
    }

    /// セーブディレクトリ内のスロットパス
    pub fn get_path(config: &Config, driver: &str, slot: u8) -> PathBuf {
        config.save_dir_path().join(Self::get_filename(driver, slot))
    }

    /// スロットにセーブデータが存在するか確認
    pub fn exists_in(config: &Config, driver: &str, slot: u8) -> bool {
        Self::get_path(config, driver, slot).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{ "rom_dir": "/arcade/roms" }"#).unwrap();
        assert_eq!(config.rom_dir, "/arcade/roms");
        assert_eq!(config.scale, 2);
        assert!(config.watchdog);
        assert_eq!(config.ram_fill, RamFill::Zero);
        assert_eq!(config.rom_dir_path(), PathBuf::from("/arcade/roms"));
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        let mut config = Config::default();
        config.last_driver = Some("espial".to_string());
        config.ram_fill = RamFill::Random;
        config.dips.entry("espial".to_string()).or_default().insert("Lives".to_string(), 2);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded.last_driver.as_deref(), Some("espial"));
        assert_eq!(loaded.ram_fill, RamFill::Random);
        assert_eq!(loaded.dips_for("espial").get("Lives"), Some(&2));
        assert!(loaded.dips_for("nova2001").is_empty());
    }

    #[test]
    fn test_broken_file_falls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Config::load_from(&path).scale, 2);
    }

    #[test]
    fn test_home_option_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().to_str().unwrap();
        let mut config = Config::default();
        config.scale = 3;
        config.save_to(tmp.path().join(CONFIG_FILENAME)).unwrap();

        let (loaded, path) = Config::load_with_options(None, Some(home));
        assert_eq!(loaded.scale, 3);
        assert_eq!(loaded.arcrs_home, home);
        assert_eq!(path, tmp.path().join(CONFIG_FILENAME));
        assert_eq!(loaded.save_dir_path(), tmp.path().join("saves"));
    }

    #[test]
    fn test_slot_filenames() {
        assert_eq!(SaveSlots::get_filename("espial", 0), "espial_quicksave.json");
        assert_eq!(SaveSlots::get_filename("espial", 3), "espial_slot_3.json");
    }
}
