//! メモリリージョンとROMロード
//!
//! ROM・RAM・グラフィックROM・カラーPROMを名前付きのバイト配列として保持し、
//! アドレスディスパッチテーブルからは `RegionId` で参照する

use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// リージョン番号（`Regions` 内のインデックス）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RegionId(pub usize);

/// リージョンの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    /// CPUプログラムROM
    Rom,
    /// CPUから読み書きできるRAM
    Ram,
    /// グラフィックROM（デコード前）
    Gfx,
    /// カラーPROM等
    Prom,
}

/// 電源投入時のRAM内容
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RamFill {
    #[default]
    Zero,
    Ones,
    Random,
}

#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub kind: RegionKind,
    pub data: Vec<u8>,
}

/// リージョンのアリーナ
#[derive(Debug, Clone, Default)]
pub struct Regions {
    regions: Vec<Region>,
}

impl Regions {
    pub fn new() -> Self {
        Self::default()
    }

    /// リージョンを追加（同名があれば既存のものを返す）
    pub fn add(&mut self, name: &str, kind: RegionKind, size: usize) -> RegionId {
        if let Some(id) = self.find(name) {
            return id;
        }
        self.regions.push(Region {
            name: name.to_string(),
            kind,
            data: vec![0; size],
        });
        RegionId(self.regions.len() - 1)
    }

    pub fn find(&self, name: &str) -> Option<RegionId> {
        self.regions.iter().position(|r| r.name == name).map(RegionId)
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0)
    }

    /// リージョンのデータ（存在しなければ空スライス）
    pub fn get(&self, id: RegionId) -> &[u8] {
        self.regions.get(id.0).map(|r| r.data.as_slice()).unwrap_or(&[])
    }

    pub fn get_mut(&mut self, id: RegionId) -> &mut [u8] {
        match self.regions.get_mut(id.0) {
            Some(r) => r.data.as_mut_slice(),
            None => &mut [],
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &Region)> {
        self.regions.iter().enumerate().map(|(i, r)| (RegionId(i), r))
    }

    /// RAMリージョンを初期化
    pub fn fill_ram(&mut self, fill: RamFill) {
        let mut rng = rand::thread_rng();
        for region in self.regions.iter_mut().filter(|r| r.kind == RegionKind::Ram) {
            match fill {
                RamFill::Zero => region.data.fill(0x00),
                RamFill::Ones => region.data.fill(0xFF),
                RamFill::Random => rng.fill(region.data.as_mut_slice()),
            }
        }
    }
}

/// ROMロードテーブルの1エントリ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomEntry {
    /// ファイル名
    pub name: &'static str,
    /// リージョン内の配置オフセット
    pub offset: usize,
    /// 期待するファイル長
    pub length: usize,
    /// 期待するCRC32（未確認のダンプは None）
    pub crc: Option<u32>,
}

impl RomEntry {
    pub const fn new(name: &'static str, offset: usize, length: usize) -> Self {
        RomEntry { name, offset, length, crc: None }
    }

    pub const fn with_crc(name: &'static str, offset: usize, length: usize, crc: u32) -> Self {
        RomEntry { name, offset, length, crc: Some(crc) }
    }
}

/// リージョン単位のROMロードテーブル
#[derive(Debug, Clone, Copy)]
pub struct RomRegionSpec {
    pub region: &'static str,
    pub kind: RegionKind,
    pub size: usize,
    pub roms: &'static [RomEntry],
}

#[derive(Debug, Error)]
pub enum RomError {
    #[error("missing ROM file {path}")]
    Missing { path: PathBuf },

    #[error("{name}: wrong length {actual} (expected {expected})")]
    WrongLength { name: String, actual: usize, expected: usize },

    #[error("{name}: CRC {actual:08x} does not match {expected:08x}")]
    BadCrc { name: String, actual: u32, expected: u32 },

    #[error("{name}: does not fit region {region} at offset {offset:#x}")]
    OutOfRegion { name: String, region: String, offset: usize },

    #[error("unknown region {0}")]
    UnknownRegion(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// ロード結果（1ファイルごと）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomStatus {
    pub name: &'static str,
    /// ファイルが見つかって配置された
    pub present: bool,
    pub crc: u32,
    pub crc_ok: Option<bool>,
}

impl RomStatus {
    fn missing(name: &'static str) -> Self {
        RomStatus { name, present: false, crc: 0, crc_ok: None }
    }
}

/// ROMローダー
///
/// `<rom_dir>/<driver>/<file>` からROMを読み込む
pub struct RomLoader {
    dir: PathBuf,
    /// ファイル欠落とCRC不一致をエラーにする
    pub strict: bool,
}

impl RomLoader {
    pub fn new<P: AsRef<Path>>(rom_dir: P, driver: &str) -> Self {
        RomLoader {
            dir: rom_dir.as_ref().join(driver),
            strict: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// ROMセット全体をリージョンに読み込む
    ///
    /// 非strictモードでは欠けているファイルを報告に残して読み込みを続ける
    pub fn load_set(&self, specs: &[RomRegionSpec], regions: &mut Regions) -> Result<Vec<RomStatus>, RomError> {
        let mut report = Vec::new();
        for spec in specs {
            let id = regions
                .find(spec.region)
                .ok_or_else(|| RomError::UnknownRegion(spec.region.to_string()))?;
            for rom in spec.roms {
                let path = self.dir.join(rom.name);
                if !path.exists() {
                    if self.strict {
                        return Err(RomError::Missing { path });
                    }
                    log::warn!("{}: not found in {:?}", rom.name, self.dir);
                    report.push(RomStatus::missing(rom.name));
                    continue;
                }
                let data = fs::read(&path).map_err(|source| RomError::Io { path: path.clone(), source })?;
                report.push(self.place(rom, &data, spec.region, regions.get_mut(id))?);
            }
        }
        let loaded = report.iter().filter(|s| s.present).count();
        log::info!("Loaded {}/{} ROM files from {:?}", loaded, report.len(), self.dir);
        Ok(report)
    }

    /// 1ファイル分のデータを検証してリージョンに配置
    fn place(&self, rom: &RomEntry, data: &[u8], region_name: &str, region: &mut [u8]) -> Result<RomStatus, RomError> {
        if data.len() != rom.length {
            return Err(RomError::WrongLength {
                name: rom.name.to_string(),
                actual: data.len(),
                expected: rom.length,
            });
        }
        let end = rom.offset + rom.length;
        if end > region.len() {
            return Err(RomError::OutOfRegion {
                name: rom.name.to_string(),
                region: region_name.to_string(),
                offset: rom.offset,
            });
        }

        let crc = crc32fast::hash(data);
        let crc_ok = rom.crc.map(|expected| expected == crc);
        if let (Some(false), Some(expected)) = (crc_ok, rom.crc) {
            if self.strict {
                return Err(RomError::BadCrc { name: rom.name.to_string(), actual: crc, expected });
            }
            log::warn!("{}: wrong CRC {:08x} (expected {:08x})", rom.name, crc, expected);
        }

        region[rom.offset..end].copy_from_slice(data);
        Ok(RomStatus { name: rom.name, present: true, crc, crc_ok })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static PROGRAM: [RomEntry; 2] = [
        RomEntry::new("prog.1", 0x0000, 4),
        RomEntry::with_crc("prog.2", 0x0004, 4, 0xDEADBEEF),
    ];

    fn specs() -> [RomRegionSpec; 1] {
        [RomRegionSpec { region: "maincpu", kind: RegionKind::Rom, size: 8, roms: &PROGRAM }]
    }

    fn write_set(dir: &Path) {
        let sub = dir.join("test");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("prog.1"), [1u8, 2, 3, 4]).unwrap();
        fs::write(sub.join("prog.2"), [5u8, 6, 7, 8]).unwrap();
    }

    #[test]
    fn test_load_set_places_files() {
        let tmp = tempfile::tempdir().unwrap();
        write_set(tmp.path());
        let mut regions = Regions::new();
        let id = regions.add("maincpu", RegionKind::Rom, 8);

        let report = RomLoader::new(tmp.path(), "test").load_set(&specs(), &mut regions).unwrap();
        assert_eq!(regions.get(id), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(report[0].crc_ok, None);
        assert_eq!(report[1].crc_ok, Some(false));
        assert_eq!(report[1].crc, crc32fast::hash(&[5, 6, 7, 8]));
    }

    #[test]
    fn test_strict_crc_rejects() {
        let tmp = tempfile::tempdir().unwrap();
        write_set(tmp.path());
        let mut regions = Regions::new();
        regions.add("maincpu", RegionKind::Rom, 8);

        let mut loader = RomLoader::new(tmp.path(), "test");
        loader.strict = true;
        let err = loader.load_set(&specs(), &mut regions).unwrap_err();
        assert!(matches!(err, RomError::BadCrc { .. }));
    }

    #[test]
    fn test_partial_set_loads_what_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("test");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("prog.2"), [5u8, 6, 7, 8]).unwrap();
        let mut regions = Regions::new();
        let id = regions.add("maincpu", RegionKind::Rom, 8);

        let report = RomLoader::new(tmp.path(), "test").load_set(&specs(), &mut regions).unwrap();
        assert!(!report[0].present);
        assert!(report[1].present);
        assert_eq!(regions.get(id), &[0, 0, 0, 0, 5, 6, 7, 8]);
    }

    #[test]
    fn test_missing_and_wrong_length() {
        let tmp = tempfile::tempdir().unwrap();
        let mut regions = Regions::new();
        regions.add("maincpu", RegionKind::Rom, 8);
        let mut strict = RomLoader::new(tmp.path(), "test");
        strict.strict = true;
        let err = strict.load_set(&specs(), &mut regions).unwrap_err();
        assert!(matches!(err, RomError::Missing { .. }));

        let sub = tmp.path().join("test");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("prog.1"), [1u8, 2]).unwrap();
        let err = RomLoader::new(tmp.path(), "test").load_set(&specs(), &mut regions).unwrap_err();
        assert!(matches!(err, RomError::WrongLength { actual: 2, expected: 4, .. }));
    }

    #[test]
    fn test_fill_ram_only_touches_ram() {
        let mut regions = Regions::new();
        let rom = regions.add("rom", RegionKind::Rom, 4);
        let ram = regions.add("ram", RegionKind::Ram, 4);
        regions.fill_ram(RamFill::Ones);
        assert_eq!(regions.get(rom), &[0, 0, 0, 0]);
        assert_eq!(regions.get(ram), &[0xFF; 4]);
    }

    #[test]
    fn test_add_is_idempotent_by_name() {
        let mut regions = Regions::new();
        let a = regions.add("videoram", RegionKind::Ram, 0x400);
        let b = regions.add("videoram", RegionKind::Ram, 0x400);
        assert_eq!(a, b);
        assert_eq!(regions.len(), 1);
    }
}
