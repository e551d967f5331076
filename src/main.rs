//! A2Core - Apple II emulation core
//!
//! ヘッドレスランナー。ROMとディスクを読み込んで指定時間実行し、
//! テキスト画面やセーブステートを出力する。
//!
//! # 使用方法
//! ```text
//! a2core -r apple2plus.rom --disk-rom disk2.rom -1 dos33.dsk --millis 8000 --screen
//! ```

use a2core::apple2::{Apple2, Model};
use a2core::config::Config;
use clap::Parser;
use std::collections::VecDeque;
use std::error::Error;
use std::fs;
use std::process::ExitCode;
use std::time::Duration;

/// A2Core - Apple II emulation core (headless)
#[derive(Parser, Debug)]
#[command(name = "a2core")]
#[command(version = "0.1.0")]
#[command(about = "A2Core - headless Apple II emulation core", long_about = None)]
struct Args {
    /// 設定ファイル（省略時は実行ファイルと同じディレクトリ）
    #[arg(short, long)]
    config: Option<String>,

    /// ディスクイメージファイル（ドライブ1）
    #[arg(short = '1', long)]
    disk1: Option<String>,

    /// ディスクイメージファイル（ドライブ2）
    #[arg(short = '2', long)]
    disk2: Option<String>,

    /// Apple IIモデル (auto, ii, ii+, iie, iie-enhanced)
    /// autoの場合はROMから自動検出
    #[arg(short, long)]
    model: Option<String>,

    /// ROMファイル
    #[arg(short, long)]
    rom: Option<String>,

    /// Disk II Boot ROM (256 bytes)
    #[arg(long)]
    disk_rom: Option<String>,

    /// 実行時間（エミュレーション上のミリ秒）
    #[arg(long, default_value = "5000")]
    millis: u64,

    /// 1フレームの長さ (ms)
    #[arg(long, default_value = "16")]
    frame_ms: u64,

    /// 起動後に入力するキー（`\n` は RETURN）
    #[arg(long)]
    keys: Option<String>,

    /// 終了時にテキスト画面を表示
    #[arg(long)]
    screen: bool,

    /// 開始前に読み込むセーブステート
    #[arg(long)]
    load_state: Option<String>,

    /// 終了時に書き出すセーブステート
    #[arg(long)]
    save_state: Option<String>,

    /// 変更されたディスクを元のファイルに書き戻す
    #[arg(long)]
    write_back: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("a2core: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    if let Some(rom) = &args.rom {
        config.rom = Some(rom.clone());
    }
    if let Some(disk_rom) = &args.disk_rom {
        config.disk_rom = Some(disk_rom.clone());
    }
    if args.disk1.is_some() {
        config.disk1 = args.disk1.clone();
    }
    if args.disk2.is_some() {
        config.disk2 = args.disk2.clone();
    }

    let rom_path = config.rom.clone().ok_or("no ROM given (use --rom)")?;
    let rom = fs::read(&rom_path).map_err(|e| format!("failed to read ROM {}: {}", rom_path, e))?;

    // "auto" はROMの識別バイトから
    config.model = match args.model.as_deref() {
        None => config.model,
        Some("auto") => Model::detect(&rom),
        Some(name) => name.parse()?,
    };
    println!("A2Core v0.1 ({})", config.model);

    let mut emu = Apple2::new(&config, &rom);

    if let Some(path) = &config.disk_rom {
        let data = fs::read(path).map_err(|e| format!("failed to read {}: {}", path, e))?;
        emu.load_disk_rom(&data)?;
    } else {
        log::warn!("no Disk II boot ROM; slot 6 will not boot");
    }

    let disks = [config.disk1.clone(), config.disk2.clone()];
    for (drive, path) in disks.iter().enumerate() {
        if let Some(path) = path {
            let data = fs::read(path).map_err(|e| format!("failed to read {}: {}", path, e))?;
            emu.load_disk(drive, path, &data)?;
        }
    }

    if let Some(path) = &args.load_state {
        emu.restore_state_json(&fs::read_to_string(path)?)?;
    }

    let mut keys: VecDeque<u8> = args
        .keys
        .as_deref()
        .unwrap_or_default()
        .replace("\\n", "\r")
        .bytes()
        .map(|b| if b == b'\n' { b'\r' } else { b.to_ascii_uppercase() })
        .collect();

    let frame = Duration::from_millis(args.frame_ms.max(1));
    let frames = args.millis / args.frame_ms.max(1);
    let mut cycles = 0;
    for _ in 0..frames {
        if !emu.io().borrow().has_key_strobe() {
            if let Some(key) = keys.pop_front() {
                emu.key_down(key);
            }
        }
        cycles += emu.run(frame);
    }
    log::info!(
        "ran {} frames, {} cycles, PC=${:04X}",
        frames,
        cycles,
        emu.cpu.regs.pc
    );

    if args.screen {
        for line in emu.text_screen() {
            println!("{}", line.trim_end());
        }
    }

    if let Some(path) = &args.save_state {
        fs::write(path, emu.save_state_json()?)?;
        log::info!("state saved to {}", path);
    }

    if args.write_back {
        let disk = emu.disk();
        let disk = disk.borrow();
        for (drive, path) in disks.iter().enumerate() {
            let dirty = disk.drive(drive).is_some_and(|d| d.is_dirty());
            if let (true, Some(path)) = (dirty, path) {
                fs::write(path, disk.get_binary(drive)?)?;
                log::info!("drive {} written back to {}", drive + 1, path);
            }
        }
    }

    Ok(())
}
