//! セーブステート機能
//!
//! マシンの状態（RAMリージョン・割り込みライン・ラッチ・保留イベント・
//! ドライバ固有レジスタ）をJSONで保存・復元する

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cpu::CpuContext;
use crate::latch::{EventQueue, SoundLatch};

/// RAMリージョン1つ分（名前で照合する）
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegionState {
    pub name: String,
    pub data: Vec<u8>,
}

/// 完全なマシン状態
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SaveState {
    pub version: u32,           // セーブフォーマットのバージョン
    pub driver: String,
    pub frame: u64,
    pub regions: Vec<RegionState>,
    pub cpus: Vec<CpuContext>,
    pub latch: SoundLatch,
    pub events: EventQueue,
    pub flip_screen: bool,
    pub dip_values: Vec<u8>,
    /// スクロールレジスタ等
    #[serde(default)]
    pub driver_state: serde_json::Value,
}

impl SaveState {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string(self)
            .map_err(|e| format!("Failed to serialize state: {}", e))?;
        std::fs::write(path, json)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        serde_json::from_str(&json)
            .map_err(|e| format!("Failed to parse state: {}", e))
    }

    pub fn region(&self, name: &str) -> Option<&[u8]> {
        self.regions.iter().find(|r| r.name == name).map(|r| r.data.as_slice())
    }
}
