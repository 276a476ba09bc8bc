//! Espial (Orca / Thunderbolt, 1983)
//!
//! Z80 x2。メインCPUはタイル1面（列スクロール付き）と16枚のスプライト、
//! サウンドCPUはラッチ経由でコマンドを受け取りAY-3-8910を鳴らす

use super::{ram, Driver, DriverInfo};
use crate::cpu::{CpuId, InterruptKind};
use crate::input::{Button, ButtonBinding, DipChoice, DipSwitch, InputPortDef, PortBits};
use crate::machine::{CpuConfig, CpuSpaces, Handler, MachineConfig, MachineState, ScreenConfig};
use crate::memory_map::{AddressSpace, MapError, MemoryRange as R, OpenBus};
use crate::regions::{RegionId, RegionKind, Regions, RomEntry, RomRegionSpec};
use crate::video::palette::weigh3;
use crate::video::{
    rgb, Bitmap, Compositor, GfxLayout, GfxSet, Palette, Rect, Scroll, SpriteGeometry, SpriteSlot, TileBytes,
    TileCell, TileLayer, TileSources,
};

static INFO: DriverInfo = DriverInfo {
    name: "espial",
    description: "Espial (Europe)",
    manufacturer: "[Orca] Thunderbolt",
    year: 1983,
};

static MAINCPU_ROMS: [RomEntry; 4] = [
    RomEntry::new("esp3.4f", 0x0000, 0x2000),
    RomEntry::new("esp4.4h", 0x2000, 0x2000),
    RomEntry::new("esp6.bin", 0x4000, 0x1000),
    RomEntry::new("esp5.bin", 0xc000, 0x1000),
];
static AUDIOCPU_ROMS: [RomEntry; 2] = [
    RomEntry::new("esp1.4n", 0x0000, 0x1000),
    RomEntry::new("esp2.4r", 0x1000, 0x1000),
];
static CHAR_ROMS: [RomEntry; 2] = [
    RomEntry::new("espial.8", 0x0000, 0x2000),
    RomEntry::new("espial.7", 0x2000, 0x1000),
];
static SPRITE_ROMS: [RomEntry; 2] = [
    RomEntry::new("espial.10", 0x0000, 0x2000),
    RomEntry::new("espial.9", 0x2000, 0x2000),
];
static COLOR_PROMS: [RomEntry; 2] = [
    RomEntry::new("mmi6301.1f", 0x0000, 0x0100),
    RomEntry::new("mmi6301.1h", 0x0100, 0x0100),
];

static ROM_SET: [RomRegionSpec; 5] = [
    RomRegionSpec { region: "maincpu", kind: RegionKind::Rom, size: 0x10000, roms: &MAINCPU_ROMS },
    RomRegionSpec { region: "audiocpu", kind: RegionKind::Rom, size: 0x10000, roms: &AUDIOCPU_ROMS },
    RomRegionSpec { region: "gfx1", kind: RegionKind::Gfx, size: 0x3000, roms: &CHAR_ROMS },
    RomRegionSpec { region: "gfx2", kind: RegionKind::Gfx, size: 0x4000, roms: &SPRITE_ROMS },
    RomRegionSpec { region: "proms", kind: RegionKind::Prom, size: 0x0200, roms: &COLOR_PROMS },
];

static BUTTONS_CHOICES: [DipChoice; 2] = [
    DipChoice { label: "1", value: 0x00 },
    DipChoice { label: "2", value: 0x01 },
];
static IN0_DIPS: [DipSwitch; 1] = [DipSwitch { name: "Number of Buttons", mask: 0x01, default: 0x00, choices: &BUTTONS_CHOICES }];

static LIVES_CHOICES: [DipChoice; 4] = [
    DipChoice { label: "3", value: 0x00 },
    DipChoice { label: "4", value: 0x01 },
    DipChoice { label: "5", value: 0x02 },
    DipChoice { label: "6", value: 0x03 },
];
static BONUS_CHOICES: [DipChoice; 2] = [
    DipChoice { label: "20k 70k 70k+", value: 0x00 },
    DipChoice { label: "50k 100k 100k+", value: 0x04 },
];
static COIN_CHOICES: [DipChoice; 4] = [
    DipChoice { label: "1C 1C", value: 0x00 },
    DipChoice { label: "1C 2C", value: 0x08 },
    DipChoice { label: "2C 1C", value: 0x10 },
    DipChoice { label: "2C 3C", value: 0x18 },
];
static DSW1_DIPS: [DipSwitch; 3] = [
    DipSwitch { name: "Lives", mask: 0x03, default: 0x00, choices: &LIVES_CHOICES },
    DipSwitch { name: "Bonus Life", mask: 0x04, default: 0x00, choices: &BONUS_CHOICES },
    DipSwitch { name: "Coinage", mask: 0x18, default: 0x00, choices: &COIN_CHOICES },
];

static CABINET_CHOICES: [DipChoice; 2] = [
    DipChoice { label: "Upright", value: 0x00 },
    DipChoice { label: "Cocktail", value: 0x20 },
];
static DEMO_SOUNDS_CHOICES: [DipChoice; 2] = [
    DipChoice { label: "Off", value: 0x40 },
    DipChoice { label: "On", value: 0x00 },
];
static DSW2_DIPS: [DipSwitch; 2] = [
    DipSwitch { name: "Cabinet", mask: 0x20, default: 0x00, choices: &CABINET_CHOICES },
    DipSwitch { name: "Demo Sounds", mask: 0x40, default: 0x00, choices: &DEMO_SOUNDS_CHOICES },
];

static INPUT_PORTS: [InputPortDef; 4] = [
    InputPortDef { name: "IN0", default: 0x00, active_low: false, dips: &IN0_DIPS },
    InputPortDef { name: "IN1", default: 0x00, active_low: false, dips: &[] },
    InputPortDef { name: "DSW1", default: 0x00, active_low: false, dips: &DSW1_DIPS },
    InputPortDef { name: "DSW2", default: 0x00, active_low: false, dips: &DSW2_DIPS },
];

static BUTTONS: [ButtonBinding; 11] = [
    ButtonBinding { button: Button::Coin1, port: 0, bits: PortBits::BIT1 },
    ButtonBinding { button: Button::Coin2, port: 0, bits: PortBits::BIT2 },
    ButtonBinding { button: Button::Service, port: 0, bits: PortBits::BIT3 },
    ButtonBinding { button: Button::Start1, port: 0, bits: PortBits::BIT5 },
    ButtonBinding { button: Button::Start2, port: 0, bits: PortBits::BIT6 },
    ButtonBinding { button: Button::Button1, port: 1, bits: PortBits::BIT0 },
    ButtonBinding { button: Button::Button2, port: 1, bits: PortBits::BIT1 },
    ButtonBinding { button: Button::Up, port: 1, bits: PortBits::BIT2 },
    ButtonBinding { button: Button::Down, port: 1, bits: PortBits::BIT3 },
    ButtonBinding { button: Button::Left, port: 1, bits: PortBits::BIT4 },
    ButtonBinding { button: Button::Right, port: 1, bits: PortBits::BIT5 },
];

const CHAR_PLANES: [u32; 2] = [0, 4];
const CHAR_X: [u32; 8] = [0, 1, 2, 3, 64, 65, 66, 67];
const CHAR_Y: [u32; 8] = [0, 8, 16, 24, 32, 40, 48, 56];

const CHAR_LAYOUT: GfxLayout = GfxLayout {
    width: 8,
    height: 8,
    total: 768,
    plane_offsets: &CHAR_PLANES,
    x_offsets: &CHAR_X,
    y_offsets: &CHAR_Y,
    char_increment: 16 * 8,
};

const SPRITE_X: [u32; 16] = [0, 1, 2, 3, 64, 65, 66, 67, 128, 129, 130, 131, 192, 193, 194, 195];
const SPRITE_Y: [u32; 16] = [0, 8, 16, 24, 32, 40, 48, 56, 256, 264, 272, 280, 288, 296, 304, 312];

const SPRITE_LAYOUT: GfxLayout = GfxLayout {
    width: 16,
    height: 16,
    total: 256,
    plane_offsets: &CHAR_PLANES,
    x_offsets: &SPRITE_X,
    y_offsets: &SPRITE_Y,
    char_increment: 64 * 8,
};

const SPRITE_GEOMETRY: SpriteGeometry = SpriteGeometry {
    gfx: 1,
    size: 16,
    y_from_bottom: Some(240),
    flipped_x: None,
    flipped_y: None,
    bank_stride: 0,
};

const SPRITES: usize = 16;
const COLUMNS: usize = 32;

/// タイルのデコード（属性の下位2ビットがコードの上位）
fn decode_tile(bytes: TileBytes) -> TileCell {
    TileCell {
        code: bytes.code as u16 | ((bytes.attr as u16 & 0x03) << 8),
        color: bytes.color & 0x3F,
        flip_x: bytes.attr & 0x04 != 0,
        flip_y: bytes.attr & 0x08 != 0,
        dirty: false,
    }
}

/// 2枚のカラーPROMから256色を作る
fn palette(prom: &[u8]) -> Palette {
    if prom.len() < 0x200 || prom.iter().all(|&b| b == 0) {
        log::debug!("espial: color PROMs not loaded, using grayscale");
        return Palette::grayscale(256);
    }
    let bit = |v: u8, n: u32| (v >> n) & 1 != 0;
    let colors = (0..0x100)
        .map(|i| {
            let (lo, hi) = (prom[i], prom[i + 0x100]);
            let r = weigh3(bit(lo, 0), bit(lo, 1), bit(lo, 2));
            let g = weigh3(bit(lo, 3), bit(hi, 0), bit(hi, 1));
            let b = weigh3(false, bit(hi, 2), bit(hi, 3));
            rgb(r, g, b)
        })
        .collect();
    Palette::new(colors)
}

/// RAMリージョン
#[derive(Debug, Clone, Copy, Default)]
struct Ram {
    main: RegionId,
    spriteram1: RegionId,
    videoram: RegionId,
    spriteram3: RegionId,
    attributeram: RegionId,
    spriteram2: RegionId,
    scrollram: RegionId,
    colorram: RegionId,
    sound: RegionId,
}

#[derive(Debug, Default)]
pub struct Espial {
    ram: Ram,
}

impl Espial {
    pub fn new() -> Self {
        Self::default()
    }

    /// 列スクロール値（32列）
    fn column_scroll(&self, regions: &Regions, flip: bool) -> Scroll {
        let scrollram = regions.get(self.ram.scrollram);
        let mut scroll = vec![0i32; COLUMNS];
        for (offs, &value) in scrollram.iter().enumerate().take(COLUMNS) {
            if flip {
                scroll[COLUMNS - 1 - offs] = value as i32;
            } else {
                scroll[offs] = -(value as i32);
            }
        }
        Scroll::Columns(scroll)
    }

    /// スプライトRAM 3面を16スロットに読み替える
    fn sprite_slots(&self, regions: &Regions) -> Vec<SpriteSlot> {
        let sp1 = regions.get(self.ram.spriteram1);
        let sp2 = regions.get(self.ram.spriteram2);
        let sp3 = regions.get(self.ram.spriteram3);
        if sp1.len() < 2 * SPRITES || sp2.len() < 2 * SPRITES || sp3.len() < SPRITES {
            return Vec::new();
        }
        (0..SPRITES)
            .map(|offs| SpriteSlot {
                code: (sp1[offs] >> 1) as u16,
                x: sp1[offs + 16],
                y: sp2[offs],
                color: sp2[offs + 16] & 0x3F,
                flip_x: sp3[offs] & 0x04 != 0,
                flip_y: sp3[offs] & 0x08 != 0,
                enabled: true,
                bank: false,
                tall: sp1[offs] & 0x01 != 0,
            })
            .collect()
    }
}

impl Driver for Espial {
    fn info(&self) -> &'static DriverInfo {
        &INFO
    }

    fn config(&self) -> MachineConfig {
        MachineConfig {
            cpus: vec![
                CpuConfig { name: "maincpu", clock_hz: 3_072_000, vblank: Some(InterruptKind::Nmi) },
                CpuConfig { name: "audiocpu", clock_hz: 3_072_000, vblank: Some(InterruptKind::Nmi) },
            ],
            screen: ScreenConfig {
                width: 256,
                height: 256,
                visible: Rect::new(0, 255, 16, 239),
                refresh_hz: 60,
            },
            slices_per_frame: 4,
            watchdog_frames: Some(256),
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
        let audiocpu = regions.add("audiocpu", RegionKind::Rom, 0x10000);
        let r = Ram {
            main: ram(regions, "mainram", 0x0800),
            spriteram1: ram(regions, "spriteram1", 0x0040),
            videoram: ram(regions, "videoram", 0x0400),
            spriteram3: ram(regions, "spriteram3", 0x0010),
            attributeram: ram(regions, "attributeram", 0x0400),
            spriteram2: ram(regions, "spriteram2", 0x0020),
            scrollram: ram(regions, "scrollram", 0x0020),
            colorram: ram(regions, "colorram", 0x0400),
            sound: ram(regions, "soundram", 0x0400),
        };
        self.ram = r;

        let main_read = vec![
            R::rom(0x0000, 0x4fff, maincpu),
            R::ram(0x5800, 0x5fff, r.main),
            R::read(0x6081, 0x6081, Handler::InputPort(0)),
            R::read(0x6082, 0x6082, Handler::InputPort(1)),
            R::read(0x6083, 0x6083, Handler::InputPort(2)),
            R::read(0x6084, 0x6084, Handler::InputPort(3)),
            R::read(0x6090, 0x6090, Handler::SoundLatchRead),
            R::nop(0x7000, 0x7000),
            R::ram(0x8000, 0x803f, r.spriteram1),
            R::ram(0x8400, 0x87ff, r.videoram),
            R::ram(0x8800, 0x880f, r.spriteram3),
            R::ram(0x8c00, 0x8fff, r.attributeram),
            R::ram(0x9000, 0x901f, r.spriteram2),
            R::ram(0x9020, 0x903f, r.scrollram),
            R::ram(0x9400, 0x97ff, r.colorram),
            R::rom_at(0xc000, 0xcfff, maincpu, 0xc000),
        ];
        let main_write = vec![
            R::rom(0x0000, 0x4fff, maincpu),
            R::ram(0x5800, 0x5fff, r.main),
            R::write(0x6090, 0x6090, Handler::SoundLatchWrite { notify: Some((CpuId::SOUND, InterruptKind::Irq(0xFF))) }),
            R::write(0x7000, 0x7000, Handler::WatchdogReset),
            R::write(0x7100, 0x7100, Handler::InterruptEnable),
            R::write(0x7200, 0x7200, Handler::FlipScreen),
            R::ram(0x8000, 0x803f, r.spriteram1),
            R::write(0x8400, 0x87ff, Handler::TileRam { layer: 0, region: r.videoram }),
            R::ram(0x8800, 0x880f, r.spriteram3),
            R::write(0x8c00, 0x8fff, Handler::TileRam { layer: 0, region: r.attributeram }),
            R::ram(0x9000, 0x901f, r.spriteram2),
            R::ram(0x9020, 0x903f, r.scrollram),
            R::write(0x9400, 0x97ff, Handler::TileRam { layer: 0, region: r.colorram }),
            R::rom_at(0xc000, 0xcfff, maincpu, 0xc000),
        ];
        let main = CpuSpaces {
            program: AddressSpace::new("espial main", 16, main_read, main_write, OpenBus::Constant(0xFF), regions)?,
            io: None,
        };

        let sound_read = vec![
            R::rom(0x0000, 0x1fff, audiocpu),
            R::ram(0x2000, 0x23ff, r.sound),
            R::read(0x6000, 0x6000, Handler::SoundLatchRead),
        ];
        let sound_write = vec![
            R::rom(0x0000, 0x1fff, audiocpu),
            R::ram(0x2000, 0x23ff, r.sound),
            R::write(0x4000, 0x4000, Handler::InterruptEnable),
            R::write(0x6000, 0x6000, Handler::SoundLatchWrite { notify: None }),
        ];
        let sound_io_write = vec![
            R::write(0x00, 0x00, Handler::SoundChip { chip: 0, port: 0 }),
            R::write(0x01, 0x01, Handler::SoundChip { chip: 0, port: 1 }),
        ];
        let sound = CpuSpaces {
            program: AddressSpace::new("espial sound", 16, sound_read, sound_write, OpenBus::Constant(0xFF), regions)?,
            io: Some(AddressSpace::new("espial sound io", 8, Vec::new(), sound_io_write, OpenBus::Constant(0xFF), regions)?),
        };
        Ok(vec![main, sound])
    }

    fn video_start(&mut self, regions: &Regions) -> Compositor {
        let rom = |name: &str| regions.find(name).map(|id| regions.get(id)).unwrap_or(&[]);
        let gfx = vec![GfxSet::decode(&CHAR_LAYOUT, rom("gfx1")), GfxSet::decode(&SPRITE_LAYOUT, rom("gfx2"))];
        let mut video = Compositor::new(gfx, palette(rom("proms")), Rect::new(0, 255, 16, 239));
        let sources = TileSources {
            code: self.ram.videoram,
            color: Some(self.ram.colorram),
            attr: Some(self.ram.attributeram),
        };
        video.add_layer(TileLayer::new("bg", 32, 32, 8, 8, 0, sources, decode_tile, true));
        video
    }

    fn screen_refresh(&mut self, state: &mut MachineState, frame: &mut Bitmap) {
        let scroll = self.column_scroll(&state.regions, state.flip_screen);
        let sprites = self.sprite_slots(&state.regions);
        state.video.render(&[scroll], &sprites, &SPRITE_GEOMETRY, frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::tests::ScriptCore;
    use crate::machine::Machine;
    use crate::regions::RomLoader;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn machine() -> Machine {
        Machine::new(Box::new(Espial::new())).unwrap()
    }

    fn region(machine: &Machine, name: &str) -> RegionId {
        machine.state.regions.find(name).unwrap()
    }

    /// マシンと同じRAM配置を持つドライバ（内部関数の確認用）
    fn driver_for(machine: &Machine) -> (Espial, Regions) {
        let mut regions = machine.state.regions.clone();
        let mut driver = Espial::new();
        driver.memory_maps(&mut regions).unwrap();
        (driver, regions)
    }

    #[test]
    fn test_videoram_write_marks_and_redraws_cell() {
        let mut m = machine();
        // コード5の左上4ピクセルをペン2にする
        let gfx1 = region(&m, "gfx1");
        m.state.regions.get_mut(gfx1)[5 * 16] = 0xF0;
        m.start_video();
        let mut frame = m.new_frame();
        m.render(&mut frame);
        assert!(m.state.video.layers[0].dirty_indices().is_empty());

        m.write(CpuId::MAIN, 0x8400, 0x05);
        let videoram = region(&m, "videoram");
        assert_eq!(m.state.regions.get(videoram)[0], 0x05);
        let cell = *m.state.video.layers[0].cell(0).unwrap();
        assert!(cell.dirty);
        assert_eq!(cell.code, 5);

        m.render(&mut frame);
        let layer = &m.state.video.layers[0];
        assert!(!layer.cell(0).unwrap().dirty);
        assert_eq!(layer.bitmap().pixel(0, 0), 2);
        assert_eq!(layer.bitmap().pixel(4, 0), 0);
        assert_eq!(m.state.video.stats().tiles_redrawn, 1);
    }

    #[test]
    fn test_attribute_write_dirties_cell() {
        let mut m = machine();
        let mut frame = m.new_frame();
        m.render(&mut frame);

        m.write(CpuId::MAIN, 0x8c00 + 33, 0x0D);
        let cell = *m.state.video.layers[0].cell(33).unwrap();
        assert!(cell.dirty);
        assert_eq!(cell.code, 0x100);
        assert!(cell.flip_x && cell.flip_y);
        assert_eq!(m.state.video.layers[0].dirty_indices(), vec![33]);

        // 同じ値の再書き込みでは描き直さない
        m.render(&mut frame);
        m.write(CpuId::MAIN, 0x8c00 + 33, 0x0D);
        assert!(m.state.video.layers[0].dirty_indices().is_empty());
    }

    #[test]
    fn test_sound_latch_interrupts_sound_cpu() {
        let mut m = machine();
        let wrote = Rc::new(RefCell::new(false));
        let flag = wrote.clone();
        m.attach_core(
            CpuId::MAIN,
            ScriptCore::boxed(move |bus| {
                if !*flag.borrow() {
                    bus.write(0x6090, 0x07);
                    *flag.borrow_mut() = true;
                }
            }),
        );
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        m.attach_core(
            CpuId::SOUND,
            ScriptCore::boxed(move |bus| {
                let pending = bus.context().irq_pending;
                let value = bus.read(0x6000);
                log.borrow_mut().push((value, pending));
                bus.context().acknowledge();
            }),
        );

        let mut frame = m.new_frame();
        m.run_frame(&mut frame);
        assert_eq!(seen.borrow()[0], (0x07, true));
        assert_eq!(seen.borrow()[1], (0x07, false));
        assert!(!m.state.cpus[0].irq_pending);
        assert_eq!(m.read(CpuId::MAIN, 0x6090), 0x07);
    }

    #[test]
    fn test_flip_screen_invalidates_tiles() {
        let mut m = machine();
        let mut frame = m.new_frame();
        m.render(&mut frame);
        m.write(CpuId::MAIN, 0x7200, 0x01);
        assert!(m.state.flip_screen);
        assert_eq!(m.state.video.layers[0].dirty_indices().len(), 32 * 32);
    }

    #[test]
    fn test_column_scroll_direction() {
        let mut m = machine();
        m.write(CpuId::MAIN, 0x9020, 8);
        let (e, regions) = driver_for(&m);
        match e.column_scroll(&regions, false) {
            Scroll::Columns(cols) => assert_eq!((cols[0], cols[1]), (-8, 0)),
            other => panic!("unexpected scroll {:?}", other),
        }
        match e.column_scroll(&regions, true) {
            Scroll::Columns(cols) => assert_eq!((cols[31], cols[0]), (8, 0)),
            other => panic!("unexpected scroll {:?}", other),
        }
    }

    #[test]
    fn test_sprite_slots_from_three_banks() {
        let mut m = machine();
        m.write(CpuId::MAIN, 0x8000, (3 << 1) | 1);
        m.write(CpuId::MAIN, 0x8010, 100);
        m.write(CpuId::MAIN, 0x9000, 50);
        m.write(CpuId::MAIN, 0x9010, 2);
        m.write(CpuId::MAIN, 0x8800, 0x04);

        let (e, regions) = driver_for(&m);
        let slot = e.sprite_slots(&regions)[0];
        assert_eq!((slot.code, slot.x, slot.y, slot.color), (3, 100, 50, 2));
        assert!(slot.tall && slot.flip_x && !slot.flip_y);
    }

    #[test]
    fn test_ram_and_open_bus() {
        let mut m = machine();
        m.write(CpuId::MAIN, 0x5800, 0x5A);
        assert_eq!(m.read(CpuId::MAIN, 0x5800), 0x5A);
        assert_eq!(m.read(CpuId::MAIN, 0x6000), 0xFF);
        // ROMへの書き込みは無視
        m.write(CpuId::MAIN, 0x0000, 0x12);
        assert_eq!(m.read(CpuId::MAIN, 0x0000), 0x00);
    }

    #[test]
    fn test_interrupt_enable_gates_vblank() {
        let mut m = machine();
        m.write(CpuId::MAIN, 0x7100, 0x00);
        let mut frame = m.new_frame();
        m.run_frame(&mut frame);
        assert!(!m.state.cpus[0].nmi_pending);
        assert!(m.state.cpus[1].nmi_pending);
        m.write(CpuId::MAIN, 0x7100, 0x01);
        m.run_frame(&mut frame);
        assert!(m.state.cpus[0].nmi_pending);
    }

    #[test]
    fn test_partial_rom_set_still_decodes_gfx() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("espial");
        std::fs::create_dir_all(&dir).unwrap();
        let mut chars = vec![0u8; 0x2000];
        // コード5の左上ピクセル、プレーン0
        chars[5 * 16] = 0x80;
        std::fs::write(dir.join("espial.8"), &chars).unwrap();
        std::fs::write(dir.join("espial.7"), vec![0u8; 0x1000]).unwrap();

        let mut m = machine();
        let report = m.load_roms(&RomLoader::new(tmp.path(), "espial")).unwrap();
        let present: Vec<_> = report.iter().filter(|s| s.present).map(|s| s.name).collect();
        assert_eq!(present, vec!["espial.8", "espial.7"]);
        assert_eq!(report.len(), 12);

        let gfx1 = m.state.regions.find("gfx1").unwrap();
        assert_eq!(m.state.regions.get(gfx1)[5 * 16], 0x80);
        assert_eq!(m.state.video.gfx[0].pixel(5, 0, 0), 2);
    }

    #[test]
    fn test_any_nonzero_value_enables_interrupts() {
        let mut m = machine();
        m.write(CpuId::MAIN, 0x7100, 0x00);
        m.write(CpuId::MAIN, 0x7100, 0x02);
        assert!(m.state.cpus[0].irq_enabled);
        m.write(CpuId::MAIN, 0x7100, 0x00);
        assert!(!m.state.cpus[0].irq_enabled);
    }

    #[test]
    fn test_sound_io_reaches_chip() {
        let mut m = machine();
        m.set_sound(Box::new(crate::sound::SoundLog::new()));
        m.write_port(CpuId::SOUND, 0x00, 0x07);
        m.write_port(CpuId::SOUND, 0x01, 0x38);
        assert_eq!(m.read_port(CpuId::SOUND, 0x01), 0xFF);
        assert_eq!(m.state.sound.read(0, 1), 0x38);
    }
}
