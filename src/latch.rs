//! サウンドラッチとCPU間イベント
//!
//! メインCPUが書いた1バイトをサウンドCPUが読む。書き込み側の割り込み発生は
//! ハンドラ内で直接行わず、対象CPU宛てのイベントとしてキューに積む。
//! スケジューラは対象CPUの次のターン開始時にキューを処理する

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cpu::{CpuContext, CpuId, InterruptKind};

/// CPU間で受け渡すイベント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// サウンドラッチが書き込まれた（受信側で割り込みを発生させる）
    SoundLatchWritten { value: u8, interrupt: InterruptKind },
    /// 割り込みのみ
    Interrupt(InterruptKind),
}

/// 1バイトのサウンドラッチ
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoundLatch {
    value: u8,
    /// 書き込み回数（デバッグ表示用）
    pub writes: u64,
}

impl SoundLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> u8 {
        self.value
    }

    pub fn write(&mut self, value: u8) {
        self.value = value;
        self.writes += 1;
    }

    /// soundlatch_clear_w
    pub fn clear(&mut self) {
        self.value = 0;
    }
}

/// CPUごとのイベントキュー
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQueue {
    queues: Vec<VecDeque<Event>>,
}

impl EventQueue {
    pub fn new(cpus: usize) -> Self {
        EventQueue {
            queues: vec![VecDeque::new(); cpus],
        }
    }

    /// `target` 宛てにイベントを積む（存在しないCPU宛ては破棄）
    pub fn post(&mut self, target: CpuId, event: Event) {
        match self.queues.get_mut(target.0) {
            Some(queue) => queue.push_back(event),
            None => log::debug!("event {:?} for missing cpu #{} dropped", event, target.0),
        }
    }

    pub fn pending(&self, target: CpuId) -> usize {
        self.queues.get(target.0).map_or(0, |q| q.len())
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|q| q.is_empty())
    }

    /// 対象CPUのイベントをすべて取り出してコンテキストに反映する
    pub fn deliver(&mut self, target: CpuId, ctx: &mut CpuContext) -> usize {
        let Some(queue) = self.queues.get_mut(target.0) else {
            return 0;
        };
        let count = queue.len();
        while let Some(event) = queue.pop_front() {
            match event {
                Event::SoundLatchWritten { value, interrupt } => {
                    log::trace!("cpu #{}: sound latch {:02X}", target.0, value);
                    ctx.raise(interrupt);
                }
                Event::Interrupt(kind) => ctx.raise(kind),
            }
        }
        count
    }

    pub fn clear(&mut self) {
        for queue in &mut self.queues {
            queue.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deliver_raises_on_target_only() {
        let mut events = EventQueue::new(2);
        let mut main = CpuContext::new();
        let mut sound = CpuContext::new();
        events.post(CpuId::SOUND, Event::SoundLatchWritten { value: 7, interrupt: InterruptKind::Irq(0xFF) });

        assert_eq!(events.deliver(CpuId::MAIN, &mut main), 0);
        assert!(!main.irq_pending);
        assert_eq!(events.deliver(CpuId::SOUND, &mut sound), 1);
        assert!(sound.irq_pending);
        assert_eq!(sound.irq_vector, 0xFF);
        assert!(events.is_empty());
    }

    #[test]
    fn test_events_kept_in_order() {
        let mut events = EventQueue::new(2);
        events.post(CpuId::SOUND, Event::Interrupt(InterruptKind::Irq(1)));
        events.post(CpuId::SOUND, Event::Interrupt(InterruptKind::Irq(2)));
        assert_eq!(events.pending(CpuId::SOUND), 2);

        let mut sound = CpuContext::new();
        events.deliver(CpuId::SOUND, &mut sound);
        // 後から届いたベクタが残る
        assert_eq!(sound.irq_vector, 2);
    }

    #[test]
    fn test_missing_target_dropped() {
        let mut events = EventQueue::new(1);
        events.post(CpuId(3), Event::Interrupt(InterruptKind::Nmi));
        assert!(events.is_empty());
    }

    #[test]
    fn test_latch_holds_last_write() {
        let mut latch = SoundLatch::new();
        latch.write(0x10);
        latch.write(0x07);
        assert_eq!(latch.read(), 0x07);
        assert_eq!(latch.writes, 2);
        latch.clear();
        assert_eq!(latch.read(), 0);
    }
}
