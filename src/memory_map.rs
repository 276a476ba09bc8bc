//! アドレスディスパッチテーブル
//!
//! CPUのメモリアクセスを `(start, end, 種類, 対象)` の範囲リストで振り分ける。
//! 範囲は宣言順に検査し、最初に一致したものを採用する（重なりは順序で解決し、
//! 範囲の狭さでは解決しない）。
//!
//! 16ビット以下のアドレス空間では、構築時に各アドレスの最初に一致する範囲を
//! 前計算しておく。結果は線形走査と同じになる

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::regions::{RegionId, Regions};

/// 前計算テーブルで「一致なし」を表す値
const NO_MATCH: u16 = u16::MAX;

/// 前計算テーブルを作る最大アドレス幅
const DENSE_LOOKUP_BITS: u32 = 16;

/// 範囲の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    Rom,
    Ram,
    ReadHandler,
    WriteHandler,
    /// 読み取りは0、書き込みは無視
    Nop,
}

impl fmt::Display for RangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeKind::Rom => write!(f, "ROM"),
            RangeKind::Ram => write!(f, "RAM"),
            RangeKind::ReadHandler => write!(f, "READ"),
            RangeKind::WriteHandler => write!(f, "WRITE"),
            RangeKind::Nop => write!(f, "NOP"),
        }
    }
}

/// 範囲の対象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<H> {
    /// リージョンの `base` 以降に直接マップ
    Region { id: RegionId, base: u32 },
    Handler(H),
    None,
}

/// ディスパッチテーブルの1エントリ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange<H> {
    pub start: u32,
    pub end: u32,
    pub kind: RangeKind,
    pub target: Target<H>,
}

impl<H> MemoryRange<H> {
    pub fn rom(start: u32, end: u32, region: RegionId) -> Self {
        Self::rom_at(start, end, region, 0)
    }

    /// リージョン内オフセット `base` から始まるROM
    pub fn rom_at(start: u32, end: u32, region: RegionId, base: u32) -> Self {
        MemoryRange { start, end, kind: RangeKind::Rom, target: Target::Region { id: region, base } }
    }

    pub fn ram(start: u32, end: u32, region: RegionId) -> Self {
        Self::ram_at(start, end, region, 0)
    }

    pub fn ram_at(start: u32, end: u32, region: RegionId, base: u32) -> Self {
        MemoryRange { start, end, kind: RangeKind::Ram, target: Target::Region { id: region, base } }
    }

    pub fn read(start: u32, end: u32, handler: H) -> Self {
        MemoryRange { start, end, kind: RangeKind::ReadHandler, target: Target::Handler(handler) }
    }

    pub fn write(start: u32, end: u32, handler: H) -> Self {
        MemoryRange { start, end, kind: RangeKind::WriteHandler, target: Target::Handler(handler) }
    }

    pub fn nop(start: u32, end: u32) -> Self {
        MemoryRange { start, end, kind: RangeKind::Nop, target: Target::None }
    }

    #[inline]
    pub fn contains(&self, address: u32) -> bool {
        address >= self.start && address <= self.end
    }

    /// 範囲のバイト数（start <= end なので常に1以上）
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }
}

impl<H: fmt::Debug> MemoryRange<H> {
    /// `map` コマンド用の1行表示
    pub fn describe(&self, regions: &Regions) -> String {
        let target = match &self.target {
            Target::Region { id, base } => {
                let name = regions.region(*id).map(|r| r.name.as_str()).unwrap_or("?");
                if *base == 0 {
                    name.to_string()
                } else {
                    format!("{}+{:04X}", name, base)
                }
            }
            Target::Handler(h) => format!("{:?}", h),
            Target::None => "-".to_string(),
        };
        format!("{:04X}-{:04X}  {:<5} {}", self.start, self.end, self.kind, target)
    }
}

/// テーブルの向き
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    fn accepts(self, kind: RangeKind) -> bool {
        match self {
            Direction::Read => !matches!(kind, RangeKind::WriteHandler),
            Direction::Write => !matches!(kind, RangeKind::ReadHandler),
        }
    }
}

/// 未マップアドレスを読んだときの値（ドライバごとの設定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenBus {
    Constant(u8),
    /// このアドレス空間で最後に読んだ値
    LastRead,
}

impl Default for OpenBus {
    fn default() -> Self {
        OpenBus::Constant(0xFF)
    }
}

/// テーブル構築時のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("range #{index} {start:#06x}-{end:#06x} is inverted")]
    Inverted { index: usize, start: u32, end: u32 },

    #[error("range #{index} {start:#06x}-{end:#06x} exceeds the {bits}-bit address space")]
    OutOfSpace { index: usize, start: u32, end: u32, bits: u32 },

    #[error("range #{index} ({kind}) does not belong in a {direction:?} table")]
    WrongDirection { index: usize, kind: RangeKind, direction: Direction },

    #[error("range #{index} ({kind}) has a mismatched target")]
    TargetMismatch { index: usize, kind: RangeKind },

    #[error("range #{index} needs {needed:#x} bytes of region #{region} but it has {len:#x}")]
    RegionTooSmall { index: usize, region: usize, needed: usize, len: usize },

    #[error("range #{index} {start:#06x}-{end:#06x} is completely shadowed by earlier ranges")]
    Shadowed { index: usize, start: u32, end: u32 },

    #[error("too many ranges ({0})")]
    TooManyRanges(usize),
}

/// アドレス解決結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved<H> {
    /// テーブル内の位置
    pub index: usize,
    pub kind: RangeKind,
    pub target: Target<H>,
    /// 範囲先頭からのオフセット（address - start）
    pub offset: u32,
}

/// 一方向（読み取りまたは書き込み）のディスパッチテーブル
#[derive(Debug, Clone)]
pub struct MemoryMap<H> {
    direction: Direction,
    bits: u32,
    ranges: Vec<MemoryRange<H>>,
    lookup: Option<Vec<u16>>,
}

impl<H: Copy + fmt::Debug> MemoryMap<H> {
    /// テーブルを検証して構築する
    pub fn build(
        direction: Direction,
        bits: u32,
        ranges: Vec<MemoryRange<H>>,
        regions: &Regions,
    ) -> Result<Self, MapError> {
        if ranges.len() >= NO_MATCH as usize {
            return Err(MapError::TooManyRanges(ranges.len()));
        }
        let limit = address_mask(bits);

        for (index, range) in ranges.iter().enumerate() {
            if range.start > range.end {
                return Err(MapError::Inverted { index, start: range.start, end: range.end });
            }
            if range.end > limit {
                return Err(MapError::OutOfSpace { index, start: range.start, end: range.end, bits });
            }
            if !direction.accepts(range.kind) {
                return Err(MapError::WrongDirection { index, kind: range.kind, direction });
            }
            let target_ok = match (range.kind, &range.target) {
                (RangeKind::Rom | RangeKind::Ram, Target::Region { .. }) => true,
                (RangeKind::ReadHandler | RangeKind::WriteHandler, Target::Handler(_)) => true,
                (RangeKind::Nop, Target::None) => true,
                _ => false,
            };
            if !target_ok {
                return Err(MapError::TargetMismatch { index, kind: range.kind });
            }
            if let Target::Region { id, base } = range.target {
                let needed = base as usize + range.len() as usize;
                let len = regions.get(id).len();
                if needed > len {
                    return Err(MapError::RegionTooSmall { index, region: id.0, needed, len });
                }
            }
        }

        let lookup = if bits <= DENSE_LOOKUP_BITS {
            Some(Self::dense_lookup(&ranges, bits)?)
        } else {
            Self::check_shadowing(&ranges)?;
            None
        };

        for (i, later) in ranges.iter().enumerate() {
            for (j, earlier) in ranges[..i].iter().enumerate() {
                if earlier.start <= later.end && later.start <= earlier.end {
                    log::debug!(
                        "{:?} range #{} {:04X}-{:04X} partially overlaps #{} {:04X}-{:04X}; #{} wins",
                        direction, i, later.start, later.end, j, earlier.start, earlier.end, j
                    );
                }
            }
        }

        Ok(MemoryMap { direction, bits, ranges, lookup })
    }

    /// 各アドレスについて最初に一致する範囲を記録する
    fn dense_lookup(ranges: &[MemoryRange<H>], bits: u32) -> Result<Vec<u16>, MapError> {
        let mut lookup = vec![NO_MATCH; 1usize << bits];
        let mut hits = vec![0usize; ranges.len()];
        for (index, range) in ranges.iter().enumerate() {
            for address in range.start..=range.end {
                let slot = &mut lookup[address as usize];
                if *slot == NO_MATCH {
                    *slot = index as u16;
                    hits[index] += 1;
                }
            }
        }
        if let Some(index) = hits.iter().position(|&h| h == 0) {
            let range = &ranges[index];
            return Err(MapError::Shadowed { index, start: range.start, end: range.end });
        }
        Ok(lookup)
    }

    /// 広いアドレス空間では単一の先行範囲に完全に覆われた範囲のみ検出する
    fn check_shadowing(ranges: &[MemoryRange<H>]) -> Result<(), MapError> {
        for (index, range) in ranges.iter().enumerate() {
            if ranges[..index].iter().any(|e| e.start <= range.start && e.end >= range.end) {
                return Err(MapError::Shadowed { index, start: range.start, end: range.end });
            }
        }
        Ok(())
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn ranges(&self) -> &[MemoryRange<H>] {
        &self.ranges
    }

    /// アドレスを解決する（最初に一致した範囲）
    pub fn resolve(&self, address: u32) -> Option<Resolved<H>> {
        let address = address & address_mask(self.bits);
        let index = match &self.lookup {
            Some(lookup) => match lookup[address as usize] {
                NO_MATCH => return None,
                i => i as usize,
            },
            None => self.ranges.iter().position(|r| r.contains(address))?,
        };
        let range = &self.ranges[index];
        Some(Resolved {
            index,
            kind: range.kind,
            target: range.target,
            offset: address - range.start,
        })
    }
}

#[inline]
fn address_mask(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

/// ハンドラの実行側（マシン）
///
/// ディスパッチテーブルはハンドラの識別子を持つだけで、実際の処理は
/// この実装側が行う
pub trait HandlerHost<H> {
    fn regions(&self) -> &Regions;
    fn regions_mut(&mut self) -> &mut Regions;
    fn handle_read(&mut self, handler: H, offset: u32) -> u8;
    fn handle_write(&mut self, handler: H, offset: u32, value: u8);
}

/// 1つのアドレス空間（読み取りテーブル + 書き込みテーブル）
#[derive(Debug, Clone)]
pub struct AddressSpace<H> {
    pub name: &'static str,
    read: MemoryMap<H>,
    write: MemoryMap<H>,
    pub open_bus: OpenBus,
    last_read: u8,
}

impl<H: Copy + fmt::Debug> AddressSpace<H> {
    pub fn new(
        name: &'static str,
        bits: u32,
        read: Vec<MemoryRange<H>>,
        write: Vec<MemoryRange<H>>,
        open_bus: OpenBus,
        regions: &Regions,
    ) -> Result<Self, MapError> {
        Ok(AddressSpace {
            name,
            read: MemoryMap::build(Direction::Read, bits, read, regions)?,
            write: MemoryMap::build(Direction::Write, bits, write, regions)?,
            open_bus,
            last_read: 0xFF,
        })
    }

    pub fn read_map(&self) -> &MemoryMap<H> {
        &self.read
    }

    pub fn write_map(&self) -> &MemoryMap<H> {
        &self.write
    }

    fn open_bus_value(&self) -> u8 {
        match self.open_bus {
            OpenBus::Constant(value) => value,
            OpenBus::LastRead => self.last_read,
        }
    }

    pub fn read<X: HandlerHost<H> + ?Sized>(&mut self, address: u32, host: &mut X) -> u8 {
        let value = match self.read.resolve(address) {
            Some(hit) => match hit.target {
                Target::Region { id, base } => {
                    let index = (base + hit.offset) as usize;
                    host.regions().get(id).get(index).copied().unwrap_or_else(|| self.open_bus_value())
                }
                Target::Handler(h) => host.handle_read(h, hit.offset),
                Target::None => 0,
            },
            None => {
                log::trace!("{}: unmapped read {:04X}", self.name, address);
                self.open_bus_value()
            }
        };
        self.last_read = value;
        value
    }

    pub fn write<X: HandlerHost<H> + ?Sized>(&mut self, address: u32, value: u8, host: &mut X) {
        match self.write.resolve(address) {
            Some(hit) => match (hit.kind, hit.target) {
                (RangeKind::Ram, Target::Region { id, base }) => {
                    let index = (base + hit.offset) as usize;
                    if let Some(cell) = host.regions_mut().get_mut(id).get_mut(index) {
                        *cell = value;
                    }
                }
                (_, Target::Handler(h)) => host.handle_write(h, hit.offset, value),
                // ROMへの書き込みとNOPは無視
                _ => {}
            },
            None => log::trace!("{}: unmapped write {:04X} = {:02X}", self.name, address, value),
        }
    }

    /// 副作用なしの読み取り（リージョンに直結した範囲のみ）
    pub fn peek(&self, address: u32, regions: &Regions) -> Option<u8> {
        let hit = self.read.resolve(address)?;
        match hit.target {
            Target::Region { id, base } => regions.get(id).get((base + hit.offset) as usize).copied(),
            _ => None,
        }
    }
}
