//! Nova 2001 (UPL, 1983)
//!
//! Z80 x1。背景・前景の2面と64枚のスプライト。
//! 背景スクロールはAY-3-8910 #0 の出力ポート（レジスタ14/15）から取る

use serde::{Deserialize, Serialize};

use super::{ram, Driver, DriverInfo};
use crate::cpu::InterruptKind;
use crate::input::{Button, ButtonBinding, DipChoice, DipSwitch, InputPortDef, PortBits};
use crate::machine::{CpuConfig, CpuSpaces, Handler, MachineConfig, MachineState, ScreenConfig};
use crate::memory_map::{AddressSpace, MapError, MemoryRange as R, OpenBus};
use crate::regions::{RegionId, RegionKind, Regions, RomEntry, RomRegionSpec};
use crate::video::{
    rgb, Bitmap, Compositor, GfxLayout, GfxSet, Palette, Rect, Scroll, SpriteGeometry, SpriteSlot, TileBytes,
    TileCell, TileLayer, TileSources,
};

static INFO: DriverInfo = DriverInfo {
    name: "nova2001",
    description: "Nova 2001 (Japan)",
    manufacturer: "UPL",
    year: 1983,
};

static MAINCPU_ROMS: [RomEntry; 4] = [
    RomEntry::new("1.6c", 0x0000, 0x2000),
    RomEntry::new("2.6d", 0x2000, 0x2000),
    RomEntry::new("3.6f", 0x4000, 0x2000),
    RomEntry::new("4.6g", 0x6000, 0x2000),
];
static GFX_ROMS: [RomEntry; 2] = [
    RomEntry::new("5.12s", 0x0000, 0x4000),
    RomEntry::new("6.12p", 0x4000, 0x4000),
];
static COLOR_PROMS: [RomEntry; 1] = [RomEntry::new("nova2001.clr", 0x0000, 0x0020)];

static ROM_SET: [RomRegionSpec; 3] = [
    RomRegionSpec { region: "maincpu", kind: RegionKind::Rom, size: 0x10000, roms: &MAINCPU_ROMS },
    RomRegionSpec { region: "gfx1", kind: RegionKind::Gfx, size: 0x8000, roms: &GFX_ROMS },
    RomRegionSpec { region: "proms", kind: RegionKind::Prom, size: 0x0020, roms: &COLOR_PROMS },
];

static LIVES_CHOICES: [DipChoice; 2] = [
    DipChoice { label: "3", value: 0x00 },
    DipChoice { label: "4", value: 0x01 },
];
static BONUS_CHOICES: [DipChoice; 4] = [
    DipChoice { label: "20k 60k 60k+", value: 0x00 },
    DipChoice { label: "30k 80k 80k+", value: 0x04 },
    DipChoice { label: "20k 50k 50k+", value: 0x02 },
    DipChoice { label: "None", value: 0x06 },
];
static COIN_CHOICES: [DipChoice; 4] = [
    DipChoice { label: "1C 1C", value: 0x00 },
    DipChoice { label: "1C 2C", value: 0x08 },
    DipChoice { label: "2C 1C", value: 0x10 },
    DipChoice { label: "Free Play", value: 0x18 },
];
static DSW1_DIPS: [DipSwitch; 3] = [
    DipSwitch { name: "Lives", mask: 0x01, default: 0x00, choices: &LIVES_CHOICES },
    DipSwitch { name: "Bonus Life", mask: 0x06, default: 0x00, choices: &BONUS_CHOICES },
    DipSwitch { name: "Coinage", mask: 0x18, default: 0x00, choices: &COIN_CHOICES },
];

static CABINET_CHOICES: [DipChoice; 2] = [
    DipChoice { label: "Upright", value: 0x00 },
    DipChoice { label: "Cocktail", value: 0x01 },
];
static DIFFICULTY_CHOICES: [DipChoice; 2] = [
    DipChoice { label: "Normal", value: 0x00 },
    DipChoice { label: "Hard", value: 0x02 },
];
static DSW2_DIPS: [DipSwitch; 2] = [
    DipSwitch { name: "Cabinet", mask: 0x01, default: 0x00, choices: &CABINET_CHOICES },
    DipSwitch { name: "Difficulty", mask: 0x02, default: 0x00, choices: &DIFFICULTY_CHOICES },
];

/// IN2 のビット7はVBLANK
const VBLANK_BIT: u8 = 0x80;
const CYCLES_PER_FRAME: u64 = 3_000_000 / 60;
const VBLANK_CYCLES: u64 = CYCLES_PER_FRAME / 20;

static INPUT_PORTS: [InputPortDef; 5] = [
    InputPortDef { name: "IN0", default: 0xFF, active_low: true, dips: &[] },
    InputPortDef { name: "IN1", default: 0xFF, active_low: true, dips: &[] },
    InputPortDef { name: "IN2", default: 0x7F, active_low: true, dips: &[] },
    InputPortDef { name: "DSW1", default: 0x00, active_low: false, dips: &DSW1_DIPS },
    InputPortDef { name: "DSW2", default: 0x00, active_low: false, dips: &DSW2_DIPS },
];

static BUTTONS: [ButtonBinding; 11] = [
    ButtonBinding { button: Button::Up, port: 0, bits: PortBits::BIT0 },
    ButtonBinding { button: Button::Down, port: 0, bits: PortBits::BIT1 },
    ButtonBinding { button: Button::Right, port: 0, bits: PortBits::BIT2 },
    ButtonBinding { button: Button::Left, port: 0, bits: PortBits::BIT3 },
    ButtonBinding { button: Button::Button1, port: 0, bits: PortBits::BIT6 },
    ButtonBinding { button: Button::Button2, port: 0, bits: PortBits::BIT7 },
    ButtonBinding { button: Button::Coin1, port: 2, bits: PortBits::BIT0 },
    ButtonBinding { button: Button::Coin2, port: 2, bits: PortBits::BIT1 },
    ButtonBinding { button: Button::Start1, port: 2, bits: PortBits::BIT2 },
    ButtonBinding { button: Button::Start2, port: 2, bits: PortBits::BIT3 },
    ButtonBinding { button: Button::Service, port: 2, bits: PortBits::BIT4 },
];

const PLANES_4: [u32; 4] = [0, 1, 2, 3];
const CHAR_X: [u32; 8] = [0, 4, 8, 12, 16, 20, 24, 28];
const CHAR_Y: [u32; 8] = [0, 32, 64, 96, 128, 160, 192, 224];

const CHAR_LAYOUT: GfxLayout = GfxLayout {
    width: 8,
    height: 8,
    total: 1024,
    plane_offsets: &PLANES_4,
    x_offsets: &CHAR_X,
    y_offsets: &CHAR_Y,
    char_increment: 32 * 8,
};

const SPRITE_X: [u32; 16] = [0, 4, 8, 12, 16, 20, 24, 28, 256, 260, 264, 268, 272, 276, 280, 284];
const SPRITE_Y: [u32; 16] = [0, 32, 64, 96, 128, 160, 192, 224, 512, 544, 576, 608, 640, 672, 704, 736];

const SPRITE_LAYOUT: GfxLayout = GfxLayout {
    width: 16,
    height: 16,
    total: 256,
    plane_offsets: &PLANES_4,
    x_offsets: &SPRITE_X,
    y_offsets: &SPRITE_Y,
    char_increment: 128 * 8,
};

/// スプライトの属性ビット6で上位128コードを選ぶ
const SPRITE_GEOMETRY: SpriteGeometry = SpriteGeometry {
    gfx: 1,
    size: 16,
    y_from_bottom: None,
    flipped_x: Some(240),
    flipped_y: Some(240),
    bank_stride: 128,
};

const BG_LAYER: u8 = 0;
const FG_LAYER: u8 = 1;

/// `Handler::Driver` の番号
const AY0_DATA: u8 = 0;
const AY1_DATA: u8 = 1;
const AY0_ADDRESS: u8 = 2;
const AY1_ADDRESS: u8 = 3;
const VBLANK_PORT: u8 = 4;

/// AYの出力ポートレジスタ
const AY_PORT_A: u8 = 14;
const AY_PORT_B: u8 = 15;

fn decode_bg(bytes: TileBytes) -> TileCell {
    TileCell {
        code: bytes.code as u16 | ((bytes.color as u16 & 0x10) << 4),
        color: bytes.color & 0x0F,
        ..Default::default()
    }
}

/// 前景はキャラクタROMの後半を使う
fn decode_fg(bytes: TileBytes) -> TileCell {
    TileCell {
        code: 0x200 | bytes.code as u16 | ((bytes.color as u16 & 0x10) << 4),
        color: bytes.color & 0x0F,
        ..Default::default()
    }
}

/// 32色PROM + カラーテーブル（16色 x 16ペン）
fn palette(prom: &[u8]) -> Palette {
    if prom.len() < 0x20 || prom.iter().all(|&b| b == 0) {
        log::debug!("nova2001: color PROM not loaded, using grayscale");
        return Palette::grayscale(256);
    }
    let colors = prom[..0x20]
        .iter()
        .map(|&v| {
            let intensity = v & 0x03;
            let r = ((v & 0x0C) | intensity) * 0x11;
            let g = (((v >> 2) & 0x0C) | intensity) * 0x11;
            let b = (((v >> 4) & 0x0C) | intensity) * 0x11;
            rgb(r, g, b)
        })
        .collect();
    let colortable = (0..256u16).map(|i| (((i >> 4) & 1) << 4) | (i & 0x0F)).collect();
    Palette::with_colortable(colors, colortable)
}

/// ドライバ固有レジスタ（セーブ対象）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Registers {
    ay_register: [u8; 2],
    scroll_x: u8,
    scroll_y: u8,
}

#[derive(Debug, Clone, Copy, Default)]
struct Ram {
    fg_videoram: RegionId,
    fg_colorram: RegionId,
    bg_videoram: RegionId,
    bg_colorram: RegionId,
    spriteram: RegionId,
    work: RegionId,
}

#[derive(Debug, Default)]
pub struct Nova2001 {
    ram: Ram,
    regs: Registers,
}

impl Nova2001 {
    pub fn new() -> Self {
        Self::default()
    }

    /// 背景の全体スクロール（画面反転で向きが変わる）
    fn bg_scroll(&self, flip: bool) -> Scroll {
        let (x, y) = (self.regs.scroll_x as i32, self.regs.scroll_y as i32);
        if flip {
            Scroll::Global { x, y }
        } else {
            Scroll::Global { x: -x, y: -y }
        }
    }

    /// 32バイトごとに1スロット
    fn sprite_slots(&self, regions: &Regions) -> Vec<SpriteSlot> {
        regions
            .get(self.ram.spriteram)
            .chunks_exact(32)
            .map(|entry| {
                let attr = entry[3];
                SpriteSlot {
                    code: (entry[2] & 0x7F) as u16,
                    x: entry[1],
                    y: entry[0],
                    color: attr & 0x0F,
                    flip_x: attr & 0x10 != 0,
                    flip_y: attr & 0x20 != 0,
                    enabled: attr & 0x80 == 0,
                    bank: attr & 0x40 != 0,
                    tall: false,
                }
            })
            .collect()
    }
}

impl Driver for Nova2001 {
    fn info(&self) -> &'static DriverInfo {
        &INFO
    }

    fn config(&self) -> MachineConfig {
        MachineConfig {
            cpus: vec![CpuConfig { name: "maincpu", clock_hz: 3_000_000, vblank: Some(InterruptKind::Irq(0xFF)) }],
            screen: ScreenConfig {
                width: 256,
                height: 256,
                visible: Rect::new(0, 255, 32, 223),
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
            fg_videoram: ram(regions, "fg_videoram", 0x0400),
            fg_colorram: ram(regions, "fg_colorram", 0x0400),
            bg_videoram: ram(regions, "bg_videoram", 0x0400),
            bg_colorram: ram(regions, "bg_colorram", 0x0400),
            spriteram: ram(regions, "spriteram", 0x0800),
            work: ram(regions, "workram", 0x0800),
        };
        self.ram = r;

        let read = vec![
            R::rom(0x0000, 0x7fff, maincpu),
            R::ram(0xa000, 0xa3ff, r.fg_videoram),
            R::ram(0xa400, 0xa7ff, r.fg_colorram),
            R::ram(0xa800, 0xabff, r.bg_videoram),
            R::ram(0xac00, 0xafff, r.bg_colorram),
            R::ram(0xb000, 0xb7ff, r.spriteram),
            R::read(0xc002, 0xc002, Handler::InputPort(3)),
            R::read(0xc003, 0xc003, Handler::InputPort(4)),
            R::read(0xc004, 0xc004, Handler::WatchdogReset),
            R::read(0xc006, 0xc006, Handler::InputPort(0)),
            R::read(0xc007, 0xc007, Handler::InputPort(1)),
            R::read(0xc00e, 0xc00e, Handler::Driver(VBLANK_PORT)),
            R::ram(0xe000, 0xe7ff, r.work),
        ];
        let write = vec![
            R::rom(0x0000, 0x7fff, maincpu),
            R::write(0xa000, 0xa3ff, Handler::TileRam { layer: FG_LAYER, region: r.fg_videoram }),
            R::write(0xa400, 0xa7ff, Handler::TileRam { layer: FG_LAYER, region: r.fg_colorram }),
            R::write(0xa800, 0xabff, Handler::TileRam { layer: BG_LAYER, region: r.bg_videoram }),
            R::write(0xac00, 0xafff, Handler::TileRam { layer: BG_LAYER, region: r.bg_colorram }),
            R::ram(0xb000, 0xb7ff, r.spriteram),
            R::write(0xbfff, 0xbfff, Handler::FlipScreen),
            R::write(0xc000, 0xc000, Handler::Driver(AY0_DATA)),
            R::write(0xc001, 0xc001, Handler::Driver(AY1_DATA)),
            R::write(0xc002, 0xc002, Handler::Driver(AY0_ADDRESS)),
            R::write(0xc003, 0xc003, Handler::Driver(AY1_ADDRESS)),
            R::ram(0xe000, 0xe7ff, r.work),
        ];
        Ok(vec![CpuSpaces {
            program: AddressSpace::new("nova2001 main", 16, read, write, OpenBus::LastRead, regions)?,
            io: None,
        }])
    }

    fn video_start(&mut self, regions: &Regions) -> Compositor {
        let rom = |name: &str| regions.find(name).map(|id| regions.get(id)).unwrap_or(&[]);
        let gfx = vec![GfxSet::decode(&CHAR_LAYOUT, rom("gfx1")), GfxSet::decode(&SPRITE_LAYOUT, rom("gfx1"))];
        let mut video = Compositor::new(gfx, palette(rom("proms")), Rect::new(0, 255, 32, 223));
        let bg = TileSources { code: self.ram.bg_videoram, color: Some(self.ram.bg_colorram), attr: None };
        let fg = TileSources { code: self.ram.fg_videoram, color: Some(self.ram.fg_colorram), attr: None };
        video.add_layer(TileLayer::new("bg", 32, 32, 8, 8, 0, bg, decode_bg, true));
        video.add_layer(TileLayer::new("fg", 32, 32, 8, 8, 0, fg, decode_fg, false));
        video
    }

    fn read(&mut self, id: u8, _offset: u32, state: &mut MachineState) -> u8 {
        match id {
            // フレーム先頭の一定サイクルだけVBLANKビットを立てる
            VBLANK_PORT => {
                let value = state.inputs.read_port(2);
                if state.cpus[0].cycles_now() % CYCLES_PER_FRAME < VBLANK_CYCLES {
                    value | VBLANK_BIT
                } else {
                    value & !VBLANK_BIT
                }
            }
            _ => 0xFF,
        }
    }

    fn write(&mut self, id: u8, _offset: u32, value: u8, state: &mut MachineState) {
        match id {
            AY0_ADDRESS | AY1_ADDRESS => {
                let chip = id - AY0_ADDRESS;
                self.regs.ay_register[chip as usize] = value & 0x0F;
                state.sound.write(chip, 0, value);
            }
            AY0_DATA | AY1_DATA => {
                let chip = id - AY0_DATA;
                if chip == 0 {
                    match self.regs.ay_register[0] {
                        AY_PORT_A => self.regs.scroll_x = value,
                        AY_PORT_B => self.regs.scroll_y = value,
                        _ => {}
                    }
                }
                state.sound.write(chip, 1, value);
            }
            _ => log::debug!("nova2001: unknown driver write {} = {:02X}", id, value),
        }
    }

    fn screen_refresh(&mut self, state: &mut MachineState, frame: &mut Bitmap) {
        let scrolls = [self.bg_scroll(state.flip_screen), Scroll::None];
        let sprites = self.sprite_slots(&state.regions);
        state.video.render(&scrolls, &sprites, &SPRITE_GEOMETRY, frame);
    }

    fn reset(&mut self) {
        self.regs = Registers::default();
    }

    fn save(&self) -> serde_json::Value {
        serde_json::to_value(self.regs).unwrap_or(serde_json::Value::Null)
    }

    fn load(&mut self, value: &serde_json::Value, _state: &mut MachineState) {
        match serde_json::from_value::<Registers>(value.clone()) {
            Ok(regs) => self.regs = regs,
            Err(e) => log::warn!("nova2001: ignoring driver state: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuId;
    use crate::machine::tests::ScriptCore;
    use crate::machine::Machine;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn machine() -> Machine {
        Machine::new(Box::new(Nova2001::new())).unwrap()
    }

    #[test]
    fn test_ay_port_writes_set_scroll() {
        let mut m = machine();
        m.write(CpuId::MAIN, 0xc002, AY_PORT_A);
        m.write(CpuId::MAIN, 0xc000, 0x10);
        m.write(CpuId::MAIN, 0xc002, AY_PORT_B);
        m.write(CpuId::MAIN, 0xc000, 0x20);
        // チップ1のポートはスクロールに関係しない
        m.write(CpuId::MAIN, 0xc003, AY_PORT_A);
        m.write(CpuId::MAIN, 0xc001, 0x55);

        let state = m.save_state();
        assert_eq!(state.driver_state["scroll_x"], 0x10);
        assert_eq!(state.driver_state["scroll_y"], 0x20);
    }

    #[test]
    fn test_bg_scroll_sign_follows_flip() {
        let mut n = Nova2001::new();
        n.regs.scroll_x = 8;
        n.regs.scroll_y = 3;
        assert_eq!(n.bg_scroll(false), Scroll::Global { x: -8, y: -3 });
        assert_eq!(n.bg_scroll(true), Scroll::Global { x: 8, y: 3 });
    }

    #[test]
    fn test_fg_and_bg_are_separate_layers() {
        let mut m = machine();
        let mut frame = m.new_frame();
        m.render(&mut frame);

        m.write(CpuId::MAIN, 0xa805, 0x12);
        assert_eq!(m.state.video.layers[BG_LAYER as usize].dirty_indices(), vec![5]);
        assert!(m.state.video.layers[FG_LAYER as usize].dirty_indices().is_empty());

        m.write(CpuId::MAIN, 0xa400, 0x13);
        let cell = *m.state.video.layers[FG_LAYER as usize].cell(0).unwrap();
        assert!(cell.dirty);
        assert_eq!((cell.code, cell.color), (0x300, 0x03));
    }

    #[test]
    fn test_sprite_attr_bits() {
        let mut m = machine();
        m.write(CpuId::MAIN, 0xb020, 40);
        m.write(CpuId::MAIN, 0xb021, 24);
        m.write(CpuId::MAIN, 0xb022, 0x85);
        m.write(CpuId::MAIN, 0xb023, 0x40 | 0x10 | 0x07);
        m.write(CpuId::MAIN, 0xb043, 0x80);

        let mut n = Nova2001::new();
        let mut regions = m.state.regions.clone();
        n.memory_maps(&mut regions).unwrap();
        let slots = n.sprite_slots(&regions);
        assert_eq!(slots.len(), 64);
        let slot = slots[1];
        assert_eq!((slot.code, slot.x, slot.y, slot.color), (0x05, 24, 40, 7));
        assert!(slot.bank && slot.flip_x && !slot.flip_y && slot.enabled);
        assert!(!slots[2].enabled);
    }

    #[test]
    fn test_open_bus_returns_last_read() {
        let mut m = machine();
        m.write(CpuId::MAIN, 0xe000, 0x42);
        assert_eq!(m.read(CpuId::MAIN, 0xe000), 0x42);
        assert_eq!(m.read(CpuId::MAIN, 0x9000), 0x42);
    }

    #[test]
    fn test_driver_state_round_trip_through_machine() {
        let mut m = machine();
        m.write(CpuId::MAIN, 0xc002, AY_PORT_A);
        m.write(CpuId::MAIN, 0xc000, 0x33);
        m.write(CpuId::MAIN, 0xa000, 0x01);
        let saved = m.save_state();

        let mut other = machine();
        other.load_state(&saved).unwrap();
        assert_eq!(other.save_state().driver_state["scroll_x"], 0x33);
        assert!(other.state.video.layers[FG_LAYER as usize].cell(0).unwrap().dirty);
        assert_eq!(other.read(CpuId::MAIN, 0xa000), 0x01);
    }

    #[test]
    fn test_vblank_bit_follows_frame_position() {
        let mut m = machine();
        let samples = Rc::new(RefCell::new(Vec::new()));
        let log = samples.clone();
        m.attach_core(
            CpuId::MAIN,
            ScriptCore::boxed(move |bus| {
                // フレーム先頭とVBLANK期間を過ぎた後で読む
                let early = bus.read(0xc00e) & VBLANK_BIT;
                bus.context().add_cycles(VBLANK_CYCLES as u32 + 100);
                let late = bus.read(0xc00e) & VBLANK_BIT;
                log.borrow_mut().push((early, late));
            }),
        );
        let mut frame = m.new_frame();
        for _ in 0..4 {
            m.run_frame(&mut frame);
        }
        let samples = samples.borrow();
        assert_eq!(samples.len(), 4);
        assert!(samples.iter().all(|&s| s == (VBLANK_BIT, 0)));
        assert_eq!(m.state.cpus[0].total_cycles, 4 * CYCLES_PER_FRAME);
        assert_eq!(m.state.cpus[0].turn_cycles, 0);
    }
}
