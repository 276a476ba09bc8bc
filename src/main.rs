//! ARCRS - Arcade board emulation core in Rust
//!
//! # 使用方法
//! ```text
//! arcrs list
//! arcrs map espial
//! arcrs roms nova2001
//! arcrs render espial --frames 120 --out espial.png
//! arcrs view ttmahjng
//! ```

use arcrs::config::{Config, SaveSlots};
use arcrs::cpu::CpuId;
use arcrs::drivers;
use arcrs::input::Button;
use arcrs::machine::Machine;
use arcrs::regions::RomLoader;
use arcrs::savestate::SaveState;
use clap::{Parser, Subcommand};
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// ARCRS - Arcade board emulation core in Rust
#[derive(Parser, Debug)]
#[command(name = "arcrs")]
#[command(author = "ARCRS Project")]
#[command(version = "0.1.0")]
#[command(about = "ARCRS - Arcade board emulation core in Rust", long_about = None)]
struct Args {
    /// 設定ファイルのパス（省略時は実行ファイルと同じディレクトリ）
    #[arg(long)]
    config: Option<String>,

    /// ホームディレクトリ（相対パスの基準）
    #[arg(long)]
    home: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 対応ドライバ一覧
    List,

    /// アドレス空間のテーブルを表示
    Map {
        driver: String,
    },

    /// ROMセットを読み込みCRC32を表示
    Roms {
        driver: String,
    },

    /// 指定フレーム数を実行してPNGに保存
    Render {
        driver: String,

        /// 開始時に読み込むセーブステート
        #[arg(long)]
        state: Option<PathBuf>,

        /// 実行するフレーム数
        #[arg(long, default_value = "1")]
        frames: u32,

        /// 出力PNGファイル
        #[arg(long, default_value = "frame.png")]
        out: PathBuf,
    },

    /// ウィンドウで表示
    View {
        driver: String,

        /// 開始時に読み込むセーブステート
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

/// スクリーンショットを保存
fn save_screenshot(filename: &Path, fb: &[u32], width: usize, height: usize) -> Result<(), Box<dyn std::error::Error>> {
    let file = std::fs::File::create(filename)?;
    let w = std::io::BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, width as u32, height as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);

    let mut writer = encoder.write_header()?;

    let mut rgb_data = Vec::with_capacity(width * height * 3);
    for pixel in fb.iter() {
        rgb_data.push(((pixel >> 16) & 0xFF) as u8);
        rgb_data.push(((pixel >> 8) & 0xFF) as u8);
        rgb_data.push((pixel & 0xFF) as u8);
    }

    writer.write_image_data(&rgb_data)?;
    Ok(())
}

/// 設定を反映したマシンを作る（ROMが欠けていても起動する）
fn build_machine(config: &Config, name: &str) -> Result<Machine, String> {
    let mut machine = Machine::from_name(name).map_err(|e| e.to_string())?;
    let name = machine.driver().info().name;

    machine.fill_ram(config.ram_fill);
    machine.state.watchdog.enabled = config.watchdog;
    machine.state.inputs.apply_overrides(&config.dips_for(name));

    let mut loader = RomLoader::new(config.rom_dir_path(), name);
    loader.strict = config.strict_crc;
    match machine.load_roms(&loader) {
        Ok(report) => {
            let missing: Vec<_> = report.iter().filter(|s| !s.present).map(|s| s.name).collect();
            if !missing.is_empty() {
                eprintln!("Warning: missing ROM files {} (running without complete ROM set)", missing.join(", "));
            }
        }
        Err(e) => eprintln!("Warning: {} (running without complete ROM set)", e),
    }
    Ok(machine)
}

fn load_state_file(machine: &mut Machine, path: &Path) -> Result<(), String> {
    let state = SaveState::load_from(path)?;
    machine.load_state(&state).map_err(|e| e.to_string())
}

fn cmd_list() {
    for driver in drivers::drivers() {
        let info = driver.info();
        println!("{:<10} {} ({} {})", info.name, info.description, info.manufacturer, info.year);
    }
}

fn cmd_map(name: &str) -> Result<(), String> {
    let machine = Machine::from_name(name).map_err(|e| e.to_string())?;
    let regions = &machine.state.regions;

    for (n, cpu) in machine.config().cpus.iter().enumerate() {
        let Some(spaces) = machine.spaces(CpuId(n)) else {
            continue;
        };
        println!("== {} ({} Hz)", cpu.name, cpu.clock_hz);
        let mut tables = vec![&spaces.program];
        tables.extend(spaces.io.as_ref());
        for space in tables {
            println!("-- {} read (open bus {:?})", space.name, space.open_bus);
            for range in space.read_map().ranges() {
                println!("   {}", range.describe(regions));
            }
            println!("-- {} write", space.name);
            for range in space.write_map().ranges() {
                println!("   {}", range.describe(regions));
            }
        }
    }
    Ok(())
}

fn cmd_roms(config: &Config, name: &str) -> Result<(), String> {
    let mut machine = Machine::from_name(name).map_err(|e| e.to_string())?;
    let mut loader = RomLoader::new(config.rom_dir_path(), machine.driver().info().name);
    loader.strict = config.strict_crc;
    println!("ROM directory: {}", loader.dir().display());

    let report = machine.load_roms(&loader).map_err(|e| e.to_string())?;
    for status in &report {
        let verdict = match (status.present, status.crc_ok) {
            (false, _) => "MISSING",
            (true, Some(true)) => "ok",
            (true, Some(false)) => "BAD CRC",
            (true, None) => "no dump CRC",
        };
        println!("{:<16} {:08x}  {}", status.name, status.crc, verdict);
    }
    Ok(())
}

fn cmd_render(config: &Config, name: &str, state: Option<&Path>, frames: u32, out: &Path) -> Result<(), String> {
    let mut machine = build_machine(config, name)?;
    if let Some(path) = state {
        load_state_file(&mut machine, path)?;
    }

    let mut frame = machine.new_frame();
    for _ in 0..frames.max(1) {
        machine.run_frame(&mut frame);
    }
    let stats = machine.state.video.stats();
    log::info!("last frame: {} tiles redrawn, {} sprites", stats.tiles_redrawn, stats.sprites_drawn);

    let visible = machine.config().screen.visible;
    let mut fb = Vec::new();
    machine.resolve_frame(&frame, &mut fb);
    save_screenshot(out, &fb, visible.width() as usize, visible.height() as usize)
        .map_err(|e| format!("Failed to write {:?}: {}", out, e))?;
    println!("Wrote {} frame(s) to {}", frames.max(1), out.display());
    Ok(())
}

/// キーボードとボタンの対応
const KEY_BINDINGS: &[(Key, Button)] = &[
    (Key::Key5, Button::Coin1),
    (Key::Key6, Button::Coin2),
    (Key::Key1, Button::Start1),
    (Key::Key2, Button::Start2),
    (Key::Up, Button::Up),
    (Key::Down, Button::Down),
    (Key::Left, Button::Left),
    (Key::Right, Button::Right),
    (Key::LeftCtrl, Button::Button1),
    (Key::LeftAlt, Button::Button2),
    (Key::Key9, Button::Service),
];

fn cmd_view(config: &mut Config, config_path: &Path, name: &str, state: Option<&Path>) -> Result<(), String> {
    let mut machine = build_machine(config, name)?;
    let driver_name = machine.driver().info().name;
    if let Some(path) = state {
        load_state_file(&mut machine, path)?;
    }
    config.ensure_directories();
    config.last_driver = Some(driver_name.to_string());

    let visible = machine.config().screen.visible;
    let (width, height) = (visible.width() as usize, visible.height() as usize);
    let scale = match config.scale {
        0 | 1 => minifb::Scale::X1,
        2 | 3 => minifb::Scale::X2,
        _ => minifb::Scale::X4,
    };
    let title = format!("ARCRS - {}", machine.driver().info().description);
    let mut window = Window::new(&title, width, height, WindowOptions { scale, ..WindowOptions::default() })
        .map_err(|e| format!("Failed to create window: {}", e))?;
    window.set_target_fps(machine.config().screen.refresh_hz as usize);

    let mut frame = machine.new_frame();
    let mut fb = Vec::with_capacity(width * height);
    let mut gfx_viewer = false;
    let mut gfx_set = 0usize;
    let mut gfx_color = 0u32;

    while window.is_open() && !window.is_key_down(Key::Escape) {
        if window.is_key_pressed(Key::F2, KeyRepeat::No) {
            gfx_viewer = !gfx_viewer;
            println!("GFX viewer: {}", if gfx_viewer { "ON" } else { "OFF" });
        }

        if gfx_viewer {
            let sets = machine.state.video.gfx.len().max(1);
            if window.is_key_pressed(Key::PageDown, KeyRepeat::No) {
                gfx_set = (gfx_set + 1) % sets;
            }
            if window.is_key_pressed(Key::PageUp, KeyRepeat::No) {
                gfx_color = gfx_color.wrapping_add(1) % 64;
            }
            frame.fill(0);
            let shown = machine.state.video.draw_gfx_sheet(gfx_set, gfx_color, 0, &mut frame);
            log::trace!("gfx set {}: {} elements shown", gfx_set, shown);
        } else {
            for &(key, button) in KEY_BINDINGS {
                machine.state.inputs.set_button(button, window.is_key_down(key));
            }
            machine.run_frame(&mut frame);
        }

        if window.is_key_pressed(Key::F3, KeyRepeat::No) {
            machine.reset();
            println!("Reset!");
        }

        if window.is_key_pressed(Key::F5, KeyRepeat::No) {
            let path = SaveSlots::get_path(config, driver_name, config.current_slot);
            match machine.save_state().save_to(&path) {
                Ok(()) => println!("Saved to slot {}", config.current_slot),
                Err(e) => eprintln!("Save failed: {}", e),
            }
        }

        if window.is_key_pressed(Key::F9, KeyRepeat::No) {
            if SaveSlots::exists_in(config, driver_name, config.current_slot) {
                let path = SaveSlots::get_path(config, driver_name, config.current_slot);
                match load_state_file(&mut machine, &path) {
                    Ok(()) => println!("Loaded from slot {}", config.current_slot),
                    Err(e) => eprintln!("Load failed: {}", e),
                }
            } else {
                println!("Slot {} is empty", config.current_slot);
            }
        }

        if window.is_key_pressed(Key::F6, KeyRepeat::No) {
            config.current_slot = (config.current_slot + 1) % 10;
            println!("Save slot: {}", config.current_slot);
        }

        machine.resolve_frame(&frame, &mut fb);

        if window.is_key_pressed(Key::F12, KeyRepeat::No) {
            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            let path = config.screenshot_dir_path().join(format!("{}_{}.png", driver_name, stamp));
            match save_screenshot(&path, &fb, width, height) {
                Ok(()) => println!("Screenshot saved: {}", path.display()),
                Err(e) => eprintln!("Screenshot failed: {}", e),
            }
        }

        window
            .update_with_buffer(&fb, width, height)
            .map_err(|e| format!("Failed to update window: {}", e))?;
    }

    config.save_to(config_path)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let (mut config, config_path) = Config::load_with_options(args.config.as_deref(), args.home.as_deref());

    let result = match &args.command {
        Command::List => {
            cmd_list();
            Ok(())
        }
        Command::Map { driver } => cmd_map(driver),
        Command::Roms { driver } => cmd_roms(&config, driver),
        Command::Render { driver, state, frames, out } => {
            cmd_render(&config, driver, state.as_deref(), *frames, out)
        }
        Command::View { driver, state } => cmd_view(&mut config, &config_path, driver, state.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
