//! CPUインターフェース
//!
//! CPUコア本体は外部コンポーネント。ここではコアがメモリにアクセスするための
//! バスと、割り込みラインの状態（コンテキスト）を定義する

use serde::{Deserialize, Serialize};

/// メモリバスインターフェース
/// CPUがメモリにアクセスするために必要なトレイト
pub trait MemoryBus {
    /// メモリから1バイト読み取り
    fn read(&mut self, address: u16) -> u8;
    /// メモリに1バイト書き込み
    fn write(&mut self, address: u16, value: u8);
    /// I/Oポートから読み取り（Z80 IN命令）
    fn read_port(&mut self, _port: u16) -> u8 {
        0xFF
    }
    /// I/Oポートに書き込み（Z80 OUT命令）
    fn write_port(&mut self, _port: u16, _value: u8) {}
}

/// CPU番号（ドライバのCPU宣言順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CpuId(pub usize);

impl CpuId {
    pub const MAIN: CpuId = CpuId(0);
    pub const SOUND: CpuId = CpuId(1);
}

/// 割り込みの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptKind {
    /// マスカブル割り込み（ベクタ付き）
    Irq(u8),
    /// ノンマスカブル割り込み
    Nmi,
}

/// CPUごとの実行コンテキスト
///
/// 割り込みラインの状態はコア本体ではなくここに置く。
/// 他のCPUから届いたイベントはスケジューラがこのコンテキストに反映する
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuContext {
    /// IRQ（割り込み要求）ライン
    pub irq_pending: bool,
    /// IRQベクタ（Z80 モード0/2用）
    pub irq_vector: u8,
    /// NMI（ノンマスカブル割り込み）ライン
    pub nmi_pending: bool,
    /// interrupt_enable_w で制御される割り込み許可ゲート
    pub irq_enabled: bool,
    /// 累積サイクル数（前のターンまで）
    pub total_cycles: u64,
    /// 実行中のターンで消費したサイクル数（コアが報告する）
    #[serde(default)]
    pub turn_cycles: u64,
}

impl CpuContext {
    pub fn new() -> Self {
        CpuContext {
            irq_enabled: true,
            ..Default::default()
        }
    }

    /// 実行中のコアが消費サイクルを報告する
    pub fn add_cycles(&mut self, cycles: u32) {
        self.turn_cycles += cycles as u64;
    }

    /// 現在時刻（ターン途中の消費分を含む）
    pub fn cycles_now(&self) -> u64 {
        self.total_cycles + self.turn_cycles
    }

    /// 割り込みを保留状態にする
    pub fn raise(&mut self, kind: InterruptKind) {
        match kind {
            InterruptKind::Irq(vector) => {
                self.irq_pending = true;
                self.irq_vector = vector;
            }
            InterruptKind::Nmi => self.nmi_pending = true,
        }
    }

    /// 保留中の割り込みを受け付ける（NMI優先）
    pub fn acknowledge(&mut self) -> Option<InterruptKind> {
        if self.nmi_pending {
            self.nmi_pending = false;
            Some(InterruptKind::Nmi)
        } else if self.irq_pending {
            self.irq_pending = false;
            Some(InterruptKind::Irq(self.irq_vector))
        } else {
            None
        }
    }

    /// リセット時の状態に戻す
    pub fn reset(&mut self) {
        self.irq_pending = false;
        self.nmi_pending = false;
        self.irq_vector = 0;
        self.irq_enabled = true;
    }
}

/// 実行中のCPUから見えるバス
///
/// メモリアクセスに加えて、自分自身の割り込みラインを参照できる
pub trait CpuBus: MemoryBus {
    fn context(&mut self) -> &mut CpuContext;
}

/// CPUコア（外部コンポーネント）
///
/// 指定サイクル数だけ命令を実行し、実際に消費したサイクル数を返す。
/// ターン途中の時刻を参照するハードウェアのために、命令ごとに
/// `bus.context().add_cycles()` で消費分を報告する
pub trait CpuCore {
    fn execute(&mut self, bus: &mut dyn CpuBus, cycles: u32) -> u32;

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nmi_has_priority() {
        let mut ctx = CpuContext::new();
        ctx.raise(InterruptKind::Irq(0xFF));
        ctx.raise(InterruptKind::Nmi);
        assert_eq!(ctx.acknowledge(), Some(InterruptKind::Nmi));
        assert_eq!(ctx.acknowledge(), Some(InterruptKind::Irq(0xFF)));
        assert_eq!(ctx.acknowledge(), None);
    }

    #[test]
    fn test_cycles_now_includes_turn() {
        let mut ctx = CpuContext::new();
        ctx.total_cycles = 1000;
        ctx.add_cycles(30);
        ctx.add_cycles(12);
        assert_eq!(ctx.cycles_now(), 1042);
    }

    #[test]
    fn test_reset_clears_lines() {
        let mut ctx = CpuContext::new();
        ctx.irq_enabled = false;
        ctx.raise(InterruptKind::Irq(0x38));
        ctx.reset();
        assert!(!ctx.irq_pending);
        assert!(ctx.irq_enabled);
    }
}
