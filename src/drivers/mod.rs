//! ゲームドライバ
//!
//! 各ドライバはROMセット・アドレス空間・入力ポート・ビデオ構成を宣言し、
//! ドライバ固有のハンドラと画面合成を実装する

pub mod espial;
pub mod nova2001;
pub mod ttmahjng;

use crate::input::{ButtonBinding, InputPortDef};
use crate::machine::{CpuSpaces, MachineConfig, MachineState};
use crate::memory_map::MapError;
use crate::regions::{RegionKind, Regions, RomRegionSpec};
use crate::video::{Bitmap, Compositor};

/// ドライバの表示情報
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub manufacturer: &'static str,
    pub year: u16,
}

pub trait Driver {
    fn info(&self) -> &'static DriverInfo;

    fn config(&self) -> MachineConfig;

    fn rom_set(&self) -> &'static [RomRegionSpec];

    fn input_ports(&self) -> &'static [InputPortDef];

    fn buttons(&self) -> &'static [ButtonBinding];

    /// RAMリージョンを確保し、CPUごとのアドレス空間を構築する
    fn memory_maps(&mut self, regions: &mut Regions) -> Result<Vec<CpuSpaces>, MapError>;

    /// gfxデコード・パレット・タイルレイヤーを作る（ROMロード後にも呼ばれる）
    fn video_start(&mut self, regions: &Regions) -> Compositor;

    /// `Handler::Driver(id)` の読み取り
    fn read(&mut self, _id: u8, _offset: u32, _state: &mut MachineState) -> u8 {
        0xFF
    }

    /// `Handler::Driver(id)` の書き込み
    fn write(&mut self, _id: u8, _offset: u32, _value: u8, _state: &mut MachineState) {}

    /// 1フレーム分の画面を合成する
    fn screen_refresh(&mut self, state: &mut MachineState, frame: &mut Bitmap);

    fn reset(&mut self) {}

    /// ドライバ固有レジスタの保存
    fn save(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn load(&mut self, _value: &serde_json::Value, _state: &mut MachineState) {}
}

/// RAMリージョンを確保するヘルパー
pub(crate) fn ram(regions: &mut Regions, name: &str, size: usize) -> crate::regions::RegionId {
    regions.add(name, RegionKind::Ram, size)
}

/// 登録済みドライバの一覧
pub fn drivers() -> Vec<Box<dyn Driver>> {
    vec![
        Box::new(espial::Espial::new()),
        Box::new(nova2001::Nova2001::new()),
        Box::new(ttmahjng::Ttmahjng::new()),
    ]
}

pub fn find_driver(name: &str) -> Option<Box<dyn Driver>> {
    drivers().into_iter().find(|d| d.info().name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Machine;

    #[test]
    fn test_find_driver() {
        assert_eq!(find_driver("ESPIAL").map(|d| d.info().name), Some("espial"));
        assert!(find_driver("pacman").is_none());
    }

    #[test]
    fn test_every_driver_builds() {
        for driver in drivers() {
            let name = driver.info().name;
            let machine = Machine::new(driver).unwrap_or_else(|e| panic!("{}: {}", name, e));
            assert_eq!(machine.state.cpus.len(), machine.config().cpus.len());
        }
    }
}
