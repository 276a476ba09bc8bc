//! ARCRS - Arcade board emulation core in Rust
//!
//! Espial / Nova 2001 / Taito Mahjong 系ボードのための:
//! - アドレスデコード（範囲ごとのディスパッチテーブル）
//! - サウンドラッチとCPU間イベント
//! - タイル・スプライト合成（ダーティタイル、スクロール、フリップ）
//! - ROMセット読み込み、入力ポート、セーブステート

pub mod config;
pub mod cpu;
pub mod drivers;
pub mod input;
pub mod latch;
pub mod machine;
pub mod memory_map;
pub mod regions;
pub mod savestate;
pub mod sound;
pub mod video;
