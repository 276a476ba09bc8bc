//! サウンドチップへの出力
//!
//! AY-3-8910 等の音源本体は外部コンポーネント。マシンはレジスタ書き込みを
//! `SoundChip` に渡すだけで、波形生成は行わない

use std::collections::VecDeque;

/// 書き込み履歴の保持数
const LOG_CAPACITY: usize = 4096;

/// 音源チップの受け口
pub trait SoundChip {
    /// `port` 0 = アドレス（レジスタ選択）、1 = データ
    fn write(&mut self, chip: u8, port: u8, value: u8);

    fn read(&mut self, _chip: u8, _port: u8) -> u8 {
        0xFF
    }

    fn reset(&mut self) {}
}

/// 何もしない音源
#[derive(Debug, Default)]
pub struct NullSound;

impl SoundChip for NullSound {
    fn write(&mut self, chip: u8, port: u8, value: u8) {
        log::trace!("sound chip {} port {} <- {:02X}", chip, port, value);
    }
}

/// レジスタ書き込み1回分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundWrite {
    pub chip: u8,
    pub register: u8,
    pub value: u8,
}

/// 書き込みを記録する音源（デバッグ・テスト用）
///
/// アドレスポートで選んだレジスタを覚えておき、データ書き込みを
/// (chip, register, value) として残す
#[derive(Debug, Default)]
pub struct SoundLog {
    selected: [u8; 4],
    writes: VecDeque<SoundWrite>,
    /// レジスタの現在値（チップごと16本）
    registers: [[u8; 16]; 4],
}

impl SoundLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> impl Iterator<Item = &SoundWrite> {
        self.writes.iter()
    }

    pub fn register(&self, chip: u8, register: u8) -> u8 {
        self.registers
            .get(chip as usize)
            .and_then(|r| r.get(register as usize))
            .copied()
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.writes.clear();
    }
}

impl SoundChip for SoundLog {
    fn write(&mut self, chip: u8, port: u8, value: u8) {
        let Some(selected) = self.selected.get_mut(chip as usize) else {
            log::debug!("write to missing sound chip {}", chip);
            return;
        };
        if port == 0 {
            *selected = value & 0x0F;
            return;
        }
        let register = *selected;
        self.registers[chip as usize][register as usize] = value;
        if self.writes.len() == LOG_CAPACITY {
            self.writes.pop_front();
        }
        self.writes.push_back(SoundWrite { chip, register, value });
    }

    fn read(&mut self, chip: u8, _port: u8) -> u8 {
        let register = self.selected.get(chip as usize).copied().unwrap_or(0);
        self.register(chip, register)
    }

    fn reset(&mut self) {
        self.selected = [0; 4];
        self.registers = [[0; 16]; 4];
        self.writes.clear();
    }
}
