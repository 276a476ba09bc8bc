//! Mahjong (Taito, 1981)
//!
//! Z80 x1。タイルではなく2枚のビットマップRAMで、書き込みのたびに
//! ドライバ側のビットマップへ4ピクセルずつ描く。
//! 麻雀パネルはキーマトリクスで、選択レジスタで読む行を切り替える

use serde::{Deserialize, Serialize};

use super::{ram, Driver, DriverInfo};
use crate::cpu::InterruptKind;
use crate::input::{Button, ButtonBinding, DipChoice, DipSwitch, InputPortDef, PortBits};
use crate::machine::{CpuConfig, CpuSpaces, Handler, MachineConfig, MachineState, ScreenConfig};
use crate::memory_map::{AddressSpace, MapError, MemoryRange as R, OpenBus};
use crate::regions::{RegionId, RegionKind, Regions, RomEntry, RomRegionSpec};
use crate::video::palette::weigh3;
use crate::video::{rgb, Bitmap, Compositor, Palette, Rect};

static INFO: DriverInfo = DriverInfo {
    name: "ttmahjng",
    description: "Mahjong [BET?] (Japan)",
    manufacturer: "Taito",
    year: 1981,
};

static MAINCPU_ROMS: [RomEntry; 4] = [
    RomEntry::new("ju04", 0x0000, 0x1000),
    RomEntry::new("ju05", 0x1000, 0x1000),
    RomEntry::new("ju06", 0x2000, 0x1000),
    RomEntry::new("ju07", 0x3000, 0x1000),
];
static COLOR_PROMS: [RomEntry; 1] = [RomEntry::new("ju03", 0x0000, 0x0040)];

static ROM_SET: [RomRegionSpec; 2] = [
    RomRegionSpec { region: "maincpu", kind: RegionKind::Rom, size: 0x10000, roms: &MAINCPU_ROMS },
    RomRegionSpec { region: "proms", kind: RegionKind::Prom, size: 0x0040, roms: &COLOR_PROMS },
];

static COIN_CHOICES: [DipChoice; 2] = [
    DipChoice { label: "1C 1C", value: 0x00 },
    DipChoice { label: "1C 2C", value: 0x01 },
];
static CREDITS_CHOICES: [DipChoice; 2] = [
    DipChoice { label: "Normal", value: 0x00 },
    DipChoice { label: "Max 99", value: 0x02 },
];
static DSW_DIPS: [DipSwitch; 2] = [
    DipSwitch { name: "Coinage", mask: 0x01, default: 0x00, choices: &COIN_CHOICES },
    DipSwitch { name: "Credits", mask: 0x02, default: 0x00, choices: &CREDITS_CHOICES },
];

/// ポート0-1は通常の入力、2-9はキーマトリクス（プレイヤーごと4行）
static INPUT_PORTS: [InputPortDef; 10] = [
    InputPortDef { name: "IN0", default: 0xFF, active_low: true, dips: &[] },
    InputPortDef { name: "DSW", default: 0x00, active_low: false, dips: &DSW_DIPS },
    InputPortDef { name: "KEY1_A-D", default: 0xFF, active_low: true, dips: &[] },
    InputPortDef { name: "KEY1_E-H", default: 0xFF, active_low: true, dips: &[] },
    InputPortDef { name: "KEY1_I-L", default: 0xFF, active_low: true, dips: &[] },
    InputPortDef { name: "KEY1_M-N", default: 0xFF, active_low: true, dips: &[] },
    InputPortDef { name: "KEY2_A-D", default: 0xFF, active_low: true, dips: &[] },
    InputPortDef { name: "KEY2_E-H", default: 0xFF, active_low: true, dips: &[] },
    InputPortDef { name: "KEY2_I-L", default: 0xFF, active_low: true, dips: &[] },
    InputPortDef { name: "KEY2_M-N", default: 0xFF, active_low: true, dips: &[] },
];

static BUTTONS: [ButtonBinding; 5] = [
    ButtonBinding { button: Button::Coin1, port: 0, bits: PortBits::BIT0 },
    ButtonBinding { button: Button::Coin2, port: 0, bits: PortBits::BIT1 },
    ButtonBinding { button: Button::Service, port: 0, bits: PortBits::BIT2 },
    ButtonBinding { button: Button::Start1, port: 2, bits: PortBits::BIT0 },
    ButtonBinding { button: Button::Start2, port: 6, bits: PortBits::BIT0 },
];

const WIDTH: usize = 256;
const HEIGHT: usize = 256;
/// 1行64バイト（1バイト4ピクセル）
const BYTES_PER_ROW: usize = WIDTH / 4;
const VIDEORAM_SIZE: usize = BYTES_PER_ROW * HEIGHT;

/// `Handler::Driver` の番号
const VIDEORAM1: u8 = 0;
const VIDEORAM2: u8 = 1;
const INPUT_SELECT: u8 = 2;
const KEYS_P1: u8 = 3;
const KEYS_P2: u8 = 4;
const OUT0: u8 = 5;

/// 1バイトの中のピクセルiはビットiとビットi+4で2ビット
fn pixel_bits(byte: u8, i: usize) -> u8 {
    ((byte >> i) & 1) | (((byte >> (i + 4)) & 1) << 1)
}

/// 64色PROM（BBGGGRRR）
fn palette(prom: &[u8]) -> Palette {
    if prom.len() < 0x40 || prom.iter().all(|&b| b == 0) {
        log::debug!("ttmahjng: color PROM not loaded, using grayscale");
        return Palette::grayscale(64);
    }
    let bit = |v: u8, n: u32| (v >> n) & 1 != 0;
    Palette::new(
        prom[..0x40]
            .iter()
            .map(|&v| {
                let r = weigh3(bit(v, 0), bit(v, 1), bit(v, 2));
                let g = weigh3(bit(v, 3), bit(v, 4), bit(v, 5));
                let b = weigh3(false, bit(v, 6), bit(v, 7));
                rgb(r, g, b)
            })
            .collect(),
    )
}

/// ドライバ固有レジスタ（セーブ対象）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Registers {
    /// キーマトリクスの行選択
    psel: u8,
    /// OUT0 のカラーバンク（0-3）
    color_bank: u8,
}

#[derive(Debug, Clone, Copy, Default)]
struct Ram {
    work: RegionId,
    videoram1: RegionId,
    videoram2: RegionId,
}

pub struct Ttmahjng {
    ram: Ram,
    regs: Registers,
    /// 4ビットペン（videoram1 が下位2ビット、videoram2 が上位2ビット）
    bitmap: Bitmap,
}

impl Default for Ttmahjng {
    fn default() -> Self {
        Ttmahjng {
            ram: Ram::default(),
            regs: Registers::default(),
            bitmap: Bitmap::new(WIDTH, HEIGHT),
        }
    }
}

impl Ttmahjng {
    pub fn new() -> Self {
        Self::default()
    }

    /// ビットマップRAMの1バイト分（4ピクセル）を描き直す
    fn plot(&mut self, regions: &Regions, offset: usize) {
        let v1 = regions.get(self.ram.videoram1).get(offset).copied().unwrap_or(0);
        let v2 = regions.get(self.ram.videoram2).get(offset).copied().unwrap_or(0);
        let x = (offset % BYTES_PER_ROW * 4) as i32;
        let y = (offset / BYTES_PER_ROW) as i32;
        for i in 0..4 {
            let pen = pixel_bits(v1, i) | (pixel_bits(v2, i) << 2);
            self.bitmap.set(x + i as i32, y, pen as u16);
        }
    }

    fn replot_all(&mut self, regions: &Regions) {
        for offset in 0..VIDEORAM_SIZE {
            self.plot(regions, offset);
        }
    }

    /// 選択中の行のキー入力（複数行選択時はAND）
    fn read_keys(&self, state: &MachineState, first_port: usize) -> u8 {
        (0..4)
            .filter(|&row| self.regs.psel & (1 << row) != 0)
            .fold(0xFF, |acc, row| acc & state.inputs.read_port(first_port + row))
    }
}

impl Driver for Ttmahjng {
    fn info(&self) -> &'static DriverInfo {
        &INFO
    }

    fn config(&self) -> MachineConfig {
        MachineConfig {
            cpus: vec![CpuConfig { name: "maincpu", clock_hz: 2_500_000, vblank: Some(InterruptKind::Irq(0xFF)) }],
            screen: ScreenConfig {
                width: WIDTH,
                height: HEIGHT,
                visible: Rect::new(0, 255, 0, 255),
                refresh_hz: 60,
            },
            slices_per_frame: 1,
            watchdog_frames: None,
        }
    }

    fn rom_set(&self) -> &'static [RomRegionSpec] {
        &ROM_SET
    }

    fn input_ports(&self) -> &'static [InputPortDef] {
        &INPUT_PORTS
    }

    fn buttons(&self) -> &'static [ButtonBinding] {
        &BUTTONS
    }

    fn memory_maps(&mut self, regions: &mut Regions) -> Result<Vec<CpuSpaces>, MapError> {
        let maincpu = regions.add("maincpu", RegionKind::Rom, 0x10000);
        let r = Ram {
            work: ram(regions, "workram", 0x0400),
            videoram1: ram(regions, "videoram1", VIDEORAM_SIZE),
            videoram2: ram(regions, "videoram2", VIDEORAM_SIZE),
        };
        self.ram = r;

        let read = vec![
            R::rom(0x0000, 0x3fff, maincpu),
            R::ram(0x4000, 0x43ff, r.work),
            R::read(0x4800, 0x4800, Handler::Driver(KEYS_P1)),
            R::read(0x5000, 0x5000, Handler::Driver(KEYS_P2)),
            R::read(0x5800, 0x5800, Handler::InputPort(0)),
            R::read(0x7838, 0x7838, Handler::WatchdogReset),
            R::read(0x7859, 0x7859, Handler::InputPort(1)),
            R::ram(0x8000, 0xbfff, r.videoram1),
            R::ram(0xc000, 0xffff, r.videoram2),
        ];
        let write = vec![
            R::rom(0x0000, 0x3fff, maincpu),
            R::ram(0x4000, 0x43ff, r.work),
            R::write(0x4800, 0x4800, Handler::SoundChip { chip: 0, port: 0 }),
            R::write(0x4801, 0x4801, Handler::SoundChip { chip: 0, port: 1 }),
            R::write(0x5000, 0x5000, Handler::Driver(INPUT_SELECT)),
            R::write(0x5800, 0x5800, Handler::Driver(OUT0)),
            R::nop(0x7800, 0x7fff),
            R::write(0x8000, 0xbfff, Handler::Driver(VIDEORAM1)),
            R::write(0xc000, 0xffff, Handler::Driver(VIDEORAM2)),
        ];
        Ok(vec![CpuSpaces {
            program: AddressSpace::new("ttmahjng main", 16, read, write, OpenBus::Constant(0xFF), regions)?,
            io: None,
        }])
    }

    fn video_start(&mut self, regions: &Regions) -> Compositor {
        let prom = regions.find("proms").map(|id| regions.get(id)).unwrap_or(&[]);
        self.replot_all(regions);
        Compositor::new(Vec::new(), palette(prom), Rect::new(0, 255, 0, 255))
    }

    fn read(&mut self, id: u8, _offset: u32, state: &mut MachineState) -> u8 {
        match id {
            KEYS_P1 => self.read_keys(state, 2),
            KEYS_P2 => self.read_keys(state, 6),
            _ => 0xFF,
        }
    }

    fn write(&mut self, id: u8, offset: u32, value: u8, state: &mut MachineState) {
        match id {
            VIDEORAM1 | VIDEORAM2 => {
                let region = if id == VIDEORAM1 { self.ram.videoram1 } else { self.ram.videoram2 };
                let offset = offset as usize;
                if let Some(cell) = state.regions.get_mut(region).get_mut(offset) {
                    *cell = value;
                }
                self.plot(&state.regions, offset);
            }
            INPUT_SELECT => self.regs.psel = value,
            OUT0 => {
                self.regs.color_bank = value & 0x03;
                state.set_flip_screen(value & 0x04 != 0);
            }
            _ => log::debug!("ttmahjng: unknown driver write {} = {:02X}", id, value),
        }
    }

    fn screen_refresh(&mut self, state: &mut MachineState, frame: &mut Bitmap) {
        let bank = self.regs.color_bank as u16 * 16;
        let flip = state.flip_screen;
        for y in 0..HEIGHT as i32 {
            for x in 0..WIDTH as i32 {
                let (dx, dy) = if flip { (WIDTH as i32 - 1 - x, HEIGHT as i32 - 1 - y) } else { (x, y) };
                frame.set(dx, dy, bank + self.bitmap.pixel(x, y));
            }
        }
    }

    fn reset(&mut self) {
        self.regs = Registers::default();
    }

    fn save(&self) -> serde_json::Value {
        serde_json::to_value(self.regs).unwrap_or(serde_json::Value::Null)
    }

    fn load(&mut self, value: &serde_json::Value, state: &mut MachineState) {
        match serde_json::from_value::<Registers>(value.clone()) {
            Ok(regs) => self.regs = regs,
            Err(e) => log::warn!("ttmahjng: ignoring driver state: {}", e),
        }
        self.replot_all(&state.regions);
    }
}
