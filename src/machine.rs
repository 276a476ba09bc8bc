//! マシン本体
//!
//! ドライバが宣言したアドレス空間・リージョン・ビデオを束ね、
//! CPUをタイムスライス単位で順番に実行する。
//! CPU間の割り込みはイベントキュー経由で、対象CPUのターン開始時に届く

use thiserror::Error;

use crate::cpu::{CpuBus, CpuContext, CpuCore, CpuId, InterruptKind, MemoryBus};
use crate::drivers::{find_driver, Driver};
use crate::input::InputPorts;
use crate::latch::{Event, EventQueue, SoundLatch};
use crate::memory_map::{AddressSpace, HandlerHost, MapError};
use crate::regions::{RamFill, RegionId, RegionKind, Regions, RomError, RomLoader, RomStatus};
use crate::savestate::{RegionState, SaveState};
use crate::sound::{NullSound, SoundChip};
use crate::video::{Bitmap, Compositor, Rect};

/// ディスパッチテーブルのハンドラ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// 入力ポートn
    InputPort(u8),
    SoundLatchRead,
    /// ラッチに書いて、指定があれば相手CPUに割り込みを送る
    SoundLatchWrite { notify: Option<(CpuId, InterruptKind)> },
    SoundLatchClear,
    WatchdogReset,
    /// 実行中CPUの割り込み許可
    InterruptEnable,
    FlipScreen,
    /// タイル元データへの書き込み（変化したらセルをダーティに）
    TileRam { layer: u8, region: RegionId },
    /// 音源チップ（port 0 = アドレス、1 = データ）
    SoundChip { chip: u8, port: u8 },
    /// ドライバ固有
    Driver(u8),
}

#[derive(Debug, Clone, Copy)]
pub struct CpuConfig {
    pub name: &'static str,
    pub clock_hz: u32,
    /// フレーム毎の割り込み（割り込み許可でゲート）
    pub vblank: Option<InterruptKind>,
}

#[derive(Debug, Clone, Copy)]
pub struct ScreenConfig {
    pub width: usize,
    pub height: usize,
    pub visible: Rect,
    pub refresh_hz: u32,
}

#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub cpus: Vec<CpuConfig>,
    pub screen: ScreenConfig,
    /// 1フレームあたりのタイムスライス数
    pub slices_per_frame: u32,
    /// ウォッチドッグのフレーム数（None で無効）
    pub watchdog_frames: Option<u32>,
}

/// CPU1つ分のアドレス空間
pub struct CpuSpaces {
    pub program: AddressSpace<Handler>,
    pub io: Option<AddressSpace<Handler>>,
}

/// ウォッチドッグタイマー
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    limit: Option<u32>,
    counter: u32,
    pub enabled: bool,
}

impl Watchdog {
    pub fn new(limit: Option<u32>) -> Self {
        Watchdog { limit, counter: 0, enabled: true }
    }

    pub fn kick(&mut self) {
        self.counter = 0;
    }

    /// 1フレーム進める。期限切れなら true
    pub fn tick(&mut self) -> bool {
        let Some(limit) = self.limit.filter(|_| self.enabled) else {
            return false;
        };
        self.counter += 1;
        if self.counter >= limit {
            self.counter = 0;
            return true;
        }
        false
    }
}

#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    Map(#[from] MapError),

    #[error(transparent)]
    Rom(#[from] RomError),

    #[error("unknown driver {0}")]
    UnknownDriver(String),

    #[error("driver declares {declared} cpus but built {built} address spaces")]
    CpuCount { declared: usize, built: usize },

    #[error("save state is for {found}, not {expected}")]
    WrongDriver { expected: String, found: String },

    #[error("incompatible save state version {0}")]
    Version(u32),

    #[error("save state region {name} has {actual} bytes (expected {expected})")]
    RegionSize { name: String, actual: usize, expected: usize },
}

/// ハンドラから触れるマシン状態
pub struct MachineState {
    pub regions: Regions,
    pub cpus: Vec<CpuContext>,
    pub latch: SoundLatch,
    pub events: EventQueue,
    pub inputs: InputPorts,
    pub video: Compositor,
    pub flip_screen: bool,
    pub watchdog: Watchdog,
    pub sound: Box<dyn SoundChip>,
    pub frame: u64,
}

impl MachineState {
    pub fn set_flip_screen(&mut self, flip: bool) {
        if self.flip_screen != flip {
            log::debug!("flip screen {}", if flip { "on" } else { "off" });
        }
        self.flip_screen = flip;
        self.video.set_flip_screen(flip);
    }

    /// タイルRAMに書く（値が変わったときだけセルを更新）
    pub fn write_tile_ram(&mut self, layer: u8, region: RegionId, offset: u32, value: u8) {
        let index = offset as usize;
        let Some(cell) = self.regions.get_mut(region).get_mut(index) else {
            return;
        };
        if *cell == value {
            return;
        }
        *cell = value;
        self.video.tile_written(layer as usize, &self.regions, region, index);
    }

    /// interrupt_enable_w（禁止時は保留中の割り込みも消す）
    pub fn set_interrupt_enable(&mut self, cpu: CpuId, enabled: bool) {
        if let Some(ctx) = self.cpus.get_mut(cpu.0) {
            ctx.irq_enabled = enabled;
            if !enabled {
                ctx.irq_pending = false;
                ctx.nmi_pending = false;
            }
        }
    }
}

/// ハンドラの実行側
struct Host<'a> {
    state: &'a mut MachineState,
    driver: &'a mut dyn Driver,
    cpu: CpuId,
}

impl HandlerHost<Handler> for Host<'_> {
    fn regions(&self) -> &Regions {
        &self.state.regions
    }

    fn regions_mut(&mut self) -> &mut Regions {
        &mut self.state.regions
    }

    fn handle_read(&mut self, handler: Handler, offset: u32) -> u8 {
        match handler {
            Handler::InputPort(n) => self.state.inputs.read_port(n as usize),
            Handler::SoundLatchRead => self.state.latch.read(),
            Handler::WatchdogReset => {
                self.state.watchdog.kick();
                0
            }
            Handler::SoundChip { chip, port } => self.state.sound.read(chip, port),
            Handler::Driver(id) => self.driver.read(id, offset, self.state),
            other => {
                log::debug!("cpu #{}: read through write-only handler {:?}", self.cpu.0, other);
                0xFF
            }
        }
    }

    fn handle_write(&mut self, handler: Handler, offset: u32, value: u8) {
        match handler {
            Handler::SoundLatchWrite { notify } => {
                self.state.latch.write(value);
                if let Some((target, interrupt)) = notify {
                    self.state.events.post(target, Event::SoundLatchWritten { value, interrupt });
                }
            }
            Handler::SoundLatchClear => self.state.latch.clear(),
            Handler::WatchdogReset => self.state.watchdog.kick(),
            Handler::InterruptEnable => self.state.set_interrupt_enable(self.cpu, value != 0),
            Handler::FlipScreen => self.state.set_flip_screen(value & 1 != 0),
            Handler::TileRam { layer, region } => self.state.write_tile_ram(layer, region, offset, value),
            Handler::SoundChip { chip, port } => self.state.sound.write(chip, port, value),
            Handler::Driver(id) => self.driver.write(id, offset, value, self.state),
            other => log::debug!("cpu #{}: write through read-only handler {:?}", self.cpu.0, other),
        }
    }
}

/// 1つのCPUから見たバス
pub struct MachineBus<'a> {
    spaces: &'a mut CpuSpaces,
    state: &'a mut MachineState,
    driver: &'a mut dyn Driver,
    cpu: CpuId,
}

impl MachineBus<'_> {
    fn host(&mut self) -> (&mut CpuSpaces, Host<'_>) {
        (
            &mut *self.spaces,
            Host {
                state: &mut *self.state,
                driver: &mut *self.driver,
                cpu: self.cpu,
            },
        )
    }
}

impl MemoryBus for MachineBus<'_> {
    fn read(&mut self, address: u16) -> u8 {
        let (spaces, mut host) = self.host();
        spaces.program.read(address as u32, &mut host)
    }

    fn write(&mut self, address: u16, value: u8) {
        let (spaces, mut host) = self.host();
        spaces.program.write(address as u32, value, &mut host);
    }

    fn read_port(&mut self, port: u16) -> u8 {
        let (spaces, mut host) = self.host();
        match spaces.io.as_mut() {
            Some(io) => io.read(port as u32, &mut host),
            None => 0xFF,
        }
    }

    fn write_port(&mut self, port: u16, value: u8) {
        let (spaces, mut host) = self.host();
        if let Some(io) = spaces.io.as_mut() {
            io.write(port as u32, value, &mut host);
        }
    }
}

impl CpuBus for MachineBus<'_> {
    fn context(&mut self) -> &mut CpuContext {
        &mut self.state.cpus[self.cpu.0]
    }
}

pub struct Machine {
    pub state: MachineState,
    spaces: Vec<CpuSpaces>,
    driver: Box<dyn Driver>,
    cores: Vec<Option<Box<dyn CpuCore>>>,
    config: MachineConfig,
}

impl Machine {
    pub fn new(mut driver: Box<dyn Driver>) -> Result<Self, MachineError> {
        let config = driver.config();
        let mut regions = Regions::new();
        for spec in driver.rom_set() {
            regions.add(spec.region, spec.kind, spec.size);
        }
        let spaces = driver.memory_maps(&mut regions)?;
        if spaces.len() != config.cpus.len() {
            return Err(MachineError::CpuCount {
                declared: config.cpus.len(),
                built: spaces.len(),
            });
        }
        let mut video = driver.video_start(&regions);
        video.sync_layers(&regions);
        let inputs = InputPorts::new(driver.input_ports(), driver.buttons());
        let cpus = config.cpus.len();
        log::info!(
            "Machine {} created: {} cpus, {} regions, {} tile layers",
            driver.info().name,
            cpus,
            regions.len(),
            video.layers.len()
        );

        Ok(Machine {
            state: MachineState {
                regions,
                cpus: (0..cpus).map(|_| CpuContext::new()).collect(),
                latch: SoundLatch::new(),
                events: EventQueue::new(cpus),
                inputs,
                video,
                flip_screen: false,
                watchdog: Watchdog::new(config.watchdog_frames),
                sound: Box::new(NullSound),
                frame: 0,
            },
            spaces,
            driver,
            cores: (0..cpus).map(|_| None).collect(),
            config,
        })
    }

    /// ドライバ名からマシンを作る
    pub fn from_name(name: &str) -> Result<Self, MachineError> {
        let driver = find_driver(name).ok_or_else(|| MachineError::UnknownDriver(name.to_string()))?;
        Self::new(driver)
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn spaces(&self, cpu: CpuId) -> Option<&CpuSpaces> {
        self.spaces.get(cpu.0)
    }

    /// CPUコアを接続する
    pub fn attach_core(&mut self, cpu: CpuId, core: Box<dyn CpuCore>) -> bool {
        match self.cores.get_mut(cpu.0) {
            Some(slot) => {
                *slot = Some(core);
                true
            }
            None => false,
        }
    }

    pub fn set_sound(&mut self, sound: Box<dyn SoundChip>) {
        self.state.sound = sound;
    }

    /// 電源投入時のRAM内容を設定
    pub fn fill_ram(&mut self, fill: RamFill) {
        self.state.regions.fill_ram(fill);
        self.state.video.sync_layers(&self.state.regions);
    }

    /// ROMセットを読み込み、gfx・パレットを作り直す
    ///
    /// 読み込みが途中で失敗しても、それまでに配置した内容でビデオを作り直す
    pub fn load_roms(&mut self, loader: &RomLoader) -> Result<Vec<RomStatus>, MachineError> {
        let result = loader.load_set(self.driver.rom_set(), &mut self.state.regions);
        self.start_video();
        Ok(result?)
    }

    /// ビデオを作り直す（gfxデコード・パレット・レイヤー）
    pub fn start_video(&mut self) {
        let mut video = self.driver.video_start(&self.state.regions);
        video.set_flip_screen(self.state.flip_screen);
        video.sync_layers(&self.state.regions);
        self.state.video = video;
    }

    pub fn bus(&mut self, cpu: CpuId) -> Option<MachineBus<'_>> {
        let spaces = self.spaces.get_mut(cpu.0)?;
        Some(MachineBus {
            spaces,
            state: &mut self.state,
            driver: self.driver.as_mut(),
            cpu,
        })
    }

    pub fn read(&mut self, cpu: CpuId, address: u16) -> u8 {
        self.bus(cpu).map_or(0xFF, |mut bus| bus.read(address))
    }

    pub fn write(&mut self, cpu: CpuId, address: u16, value: u8) {
        if let Some(mut bus) = self.bus(cpu) {
            bus.write(address, value);
        }
    }

    pub fn read_port(&mut self, cpu: CpuId, port: u16) -> u8 {
        self.bus(cpu).map_or(0xFF, |mut bus| bus.read_port(port))
    }

    pub fn write_port(&mut self, cpu: CpuId, port: u16, value: u8) {
        if let Some(mut bus) = self.bus(cpu) {
            bus.write_port(port, value);
        }
    }

    /// 対象CPU宛ての保留イベントを反映
    pub fn deliver_events(&mut self, cpu: CpuId) -> usize {
        match self.state.cpus.get_mut(cpu.0) {
            Some(ctx) => self.state.events.deliver(cpu, ctx),
            None => 0,
        }
    }

    /// 1スライスで実行するサイクル数
    fn slice_cycles(&self, cpu: usize) -> u32 {
        let refresh = self.config.screen.refresh_hz.max(1);
        let slices = self.config.slices_per_frame.max(1);
        self.config.cpus[cpu].clock_hz / refresh / slices
    }

    /// 1フレーム分実行して画面を合成する
    pub fn run_frame(&mut self, frame: &mut Bitmap) {
        let slices = self.config.slices_per_frame.max(1);
        for _ in 0..slices {
            for n in 0..self.spaces.len() {
                let cpu = CpuId(n);
                self.deliver_events(cpu);
                let Some(mut core) = self.cores[n].take() else {
                    continue;
                };
                let budget = self.slice_cycles(n);
                self.state.cpus[n].turn_cycles = 0;
                let used = match self.bus(cpu) {
                    Some(mut bus) => core.execute(&mut bus, budget),
                    None => 0,
                };
                self.cores[n] = Some(core);
                let ctx = &mut self.state.cpus[n];
                ctx.total_cycles += used as u64;
                ctx.turn_cycles = 0;
            }
        }
        self.end_of_frame();
        self.render(frame);
        self.state.frame += 1;
    }

    /// フレーム末尾の割り込みとウォッチドッグ
    fn end_of_frame(&mut self) {
        for (ctx, cpu) in self.state.cpus.iter_mut().zip(&self.config.cpus) {
            if let Some(kind) = cpu.vblank {
                if ctx.irq_enabled {
                    ctx.raise(kind);
                }
            }
        }
        if self.cores.iter().any(Option::is_some) && self.state.watchdog.tick() {
            log::warn!("Watchdog timeout on {}, resetting", self.driver.info().name);
            self.reset();
        }
    }

    /// 現在の状態で画面を合成する
    pub fn render(&mut self, frame: &mut Bitmap) {
        self.driver.screen_refresh(&mut self.state, frame);
    }

    /// 画面サイズのビットマップ
    pub fn new_frame(&self) -> Bitmap {
        Bitmap::new(self.config.screen.width, self.config.screen.height)
    }

    /// ペンビットマップの可視領域をARGBに変換
    pub fn resolve_frame(&self, frame: &Bitmap, out: &mut Vec<u32>) {
        self.state.video.palette.resolve(frame, &self.config.screen.visible, out);
    }

    pub fn reset(&mut self) {
        for ctx in &mut self.state.cpus {
            ctx.reset();
        }
        self.state.events.clear();
        self.state.latch.clear();
        self.state.watchdog.kick();
        self.state.sound.reset();
        self.driver.reset();
        for core in self.cores.iter_mut().flatten() {
            core.reset();
        }
        log::info!("Machine {} reset", self.driver.info().name);
    }

    pub fn save_state(&self) -> SaveState {
        SaveState {
            version: SaveState::CURRENT_VERSION,
            driver: self.driver.info().name.to_string(),
            frame: self.state.frame,
            regions: self
                .state
                .regions
                .iter()
                .filter(|(_, r)| r.kind == RegionKind::Ram)
                .map(|(_, r)| RegionState { name: r.name.clone(), data: r.data.clone() })
                .collect(),
            cpus: self.state.cpus.clone(),
            latch: self.state.latch.clone(),
            events: self.state.events.clone(),
            flip_screen: self.state.flip_screen,
            dip_values: self.state.inputs.dip_values().to_vec(),
            driver_state: self.driver.save(),
        }
    }

    pub fn load_state(&mut self, state: &SaveState) -> Result<(), MachineError> {
        if state.version != SaveState::CURRENT_VERSION {
            return Err(MachineError::Version(state.version));
        }
        let name = self.driver.info().name;
        if state.driver != name {
            return Err(MachineError::WrongDriver {
                expected: name.to_string(),
                found: state.driver.clone(),
            });
        }
        // 先に全リージョンのサイズを確認する
        for saved in &state.regions {
            let expected = self.state.regions.find(&saved.name).map_or(0, |id| self.state.regions.get(id).len());
            if expected != saved.data.len() {
                return Err(MachineError::RegionSize {
                    name: saved.name.clone(),
                    actual: saved.data.len(),
                    expected,
                });
            }
        }
        for saved in &state.regions {
            if let Some(id) = self.state.regions.find(&saved.name) {
                self.state.regions.get_mut(id).copy_from_slice(&saved.data);
            }
        }

        if state.cpus.len() == self.state.cpus.len() {
            self.state.cpus = state.cpus.clone();
        }
        self.state.latch = state.latch.clone();
        self.state.events = state.events.clone();
        self.state.frame = state.frame;
        self.state.inputs.restore_dip_values(&state.dip_values);
        self.driver.load(&state.driver_state, &mut self.state);
        self.state.set_flip_screen(state.flip_screen);
        self.state.video.sync_layers(&self.state.regions);
        log::info!("State restored at frame {}", state.frame);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Script = Box<dyn FnMut(&mut dyn CpuBus)>;

    /// 1スライスごとにクロージャを実行するだけのコア
    pub(crate) struct ScriptCore {
        script: Script,
    }

    impl ScriptCore {
        pub(crate) fn boxed(script: impl FnMut(&mut dyn CpuBus) + 'static) -> Box<dyn CpuCore> {
            Box::new(ScriptCore { script: Box::new(script) })
        }
    }

    impl CpuCore for ScriptCore {
        fn execute(&mut self, bus: &mut dyn CpuBus, cycles: u32) -> u32 {
            (self.script)(bus);
            cycles
        }
    }

    #[test]
    fn test_watchdog_expires() {
        let mut dog = Watchdog::new(Some(3));
        assert!(!dog.tick());
        assert!(!dog.tick());
        assert!(dog.tick());
        dog.kick();
        assert!(!dog.tick());
        dog.enabled = false;
        assert!(!dog.tick());
        assert!(!Watchdog::new(None).tick());
    }

    #[test]
    fn test_unknown_driver() {
        assert!(matches!(Machine::from_name("galaxian"), Err(MachineError::UnknownDriver(_))));
        assert_eq!(Machine::from_name("Nova2001").map(|m| m.driver().info().name).ok(), Some("nova2001"));
    }

    #[test]
    fn test_script_core_sees_context() {
        let mut machine = Machine::new(Box::new(crate::drivers::espial::Espial::new())).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        machine.attach_core(
            CpuId::MAIN,
            ScriptCore::boxed(move |bus| {
                let ctx = bus.context();
                log.borrow_mut().push(ctx.nmi_pending);
                ctx.acknowledge();
            }),
        );
        let mut frame = machine.new_frame();
        machine.run_frame(&mut frame);
        machine.run_frame(&mut frame);
        let seen = seen.borrow();
        // 2フレーム目の先頭で前フレームのvblank NMIが見える
        assert!(!seen[0]);
        assert!(seen.iter().any(|&nmi| nmi));
    }
}
