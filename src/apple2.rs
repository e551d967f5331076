//! Apple II エミュレータ
//!
//! CPU、メモリ、I/O、ディスクを機種毎のメモリマップで統合する。
//! ホストは経過時間を `run` に渡して進める。

use crate::config::Config;
use crate::cpu::{Cpu, CpuType};
use crate::disk::{DiskController, DiskError};
use crate::formats::{DiskFormat, DiskImage};
use crate::io::Io;
use crate::langcard::LanguageCard;
use crate::memory::{Ram, StateError};
use crate::mmu::Mmu;
use crate::savestate::{MemoryState, SaveState};
use crate::scheduler::ManualScheduler;
use crate::video::{SharedVideo, VideoModes};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

/// Disk II を挿すスロット
pub const DISK_SLOT: usize = 6;

/// Apple IIのモデル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    #[serde(rename = "ii")]
    AppleII,
    #[serde(rename = "iiplus")]
    AppleIIPlus,
    #[serde(rename = "iie")]
    AppleIIe,
    #[serde(rename = "iie_enhanced")]
    AppleIIeEnhanced,
}

impl Model {
    pub fn cpu_type(self) -> CpuType {
        match self {
            Model::AppleIIeEnhanced => CpuType::Cpu65C02,
            _ => CpuType::Cpu6502,
        }
    }

    pub fn is_iie(self) -> bool {
        matches!(self, Model::AppleIIe | Model::AppleIIeEnhanced)
    }

    /// ROMの識別バイト ($FBB3/$FBC0) からモデルを推定
    pub fn detect(rom: &[u8]) -> Model {
        let at = |addr: usize| {
            rom.len()
                .checked_sub(0x10000 - addr)
                .and_then(|i| rom.get(i))
                .copied()
        };
        if rom.len() >= 0x4000 {
            match (at(0xFBB3), at(0xFBC0)) {
                (Some(0x06), Some(0xE0)) => Model::AppleIIeEnhanced,
                (Some(0x06), _) => Model::AppleIIe,
                _ => Model::AppleIIPlus,
            }
        } else if at(0xFBB3) == Some(0x38) {
            Model::AppleII
        } else {
            Model::AppleIIPlus
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Model::AppleII => "Apple ][",
            Model::AppleIIPlus => "Apple ][+",
            Model::AppleIIe => "Apple //e",
            Model::AppleIIeEnhanced => "Apple //e (enhanced)",
        };
        f.write_str(name)
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ii" | "apple2" => Ok(Model::AppleII),
            "ii+" | "iiplus" | "apple2plus" => Ok(Model::AppleIIPlus),
            "iie" | "apple2e" => Ok(Model::AppleIIe),
            "iie-enhanced" | "iie_enhanced" | "apple2ee" => Ok(Model::AppleIIeEnhanced),
            other => Err(format!("unknown model '{}'", other)),
        }
    }
}

/// 機種毎のメモリ構成
enum MachineMemory {
    Plus {
        ram: Rc<RefCell<Ram>>,
        language_card: Rc<RefCell<LanguageCard>>,
    },
    Iie {
        mmu: Rc<RefCell<Mmu>>,
    },
}

/// Apple IIエミュレータのメイン構造体
pub struct Apple2 {
    /// 6502/65C02 CPU
    pub cpu: Cpu,
    model: Model,
    config: Config,
    memory: MachineMemory,
    io: Rc<RefCell<Io>>,
    video: SharedVideo,
    /// Disk IIインターフェースカード
    disk: Rc<RefCell<DiskController>>,
    scheduler: Rc<RefCell<ManualScheduler>>,
    /// フレームカウンター
    pub frame_count: u64,
}

impl Apple2 {
    /// `config.model` の構成で組み立ててリセットする
    pub fn new(config: &Config, rom: &[u8]) -> Self {
        let model = config.model;
        let mut cpu = Cpu::new(model.cpu_type());
        let clock = cpu.clock();
        let video: SharedVideo = Rc::new(RefCell::new(VideoModes::default()));
        let io = Rc::new(RefCell::new(Io::new(video.clone(), clock.clone(), model.is_iie())));
        let scheduler = Rc::new(RefCell::new(ManualScheduler::new()));

        let mut disk = DiskController::new(
            DISK_SLOT as u8,
            clock.clone(),
            scheduler.clone(),
            config.rng_seed,
        );
        disk.set_motor_off_delay(config.motor_off_delay());
        let disk = Rc::new(RefCell::new(disk));
        io.borrow_mut().set_slot(DISK_SLOT, disk.clone());

        let memory = if model.is_iie() {
            let mmu = Rc::new(RefCell::new(Mmu::new(io.clone(), clock, rom)));
            cpu.add_page_handler(mmu.clone());
            MachineMemory::Iie { mmu }
        } else {
            let ram = Rc::new(RefCell::new(Ram::new(0x00, 0xBF)));
            let language_card = Rc::new(RefCell::new(LanguageCard::new(rom)));
            cpu.add_page_handler(ram.clone());
            cpu.add_page_handler(io.clone());
            cpu.add_page_handler(language_card.clone());
            io.borrow_mut().set_slot(0, language_card.clone());
            MachineMemory::Plus { ram, language_card }
        };

        log::info!("machine: {} ({:?})", model, model.cpu_type());
        let mut machine = Apple2 {
            cpu,
            model,
            config: config.clone(),
            memory,
            io,
            video,
            disk,
            scheduler,
            frame_count: 0,
        };
        machine.reset();
        machine
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn io(&self) -> Rc<RefCell<Io>> {
        self.io.clone()
    }

    pub fn video(&self) -> VideoModes {
        *self.video.borrow()
    }

    pub fn disk(&self) -> Rc<RefCell<DiskController>> {
        self.disk.clone()
    }

    /// リセット（全デバイスへ通知してからベクタを読む）
    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    /// ROMを差し替えてリセット
    pub fn load_rom(&mut self, rom: &[u8]) {
        match &self.memory {
            MachineMemory::Plus { language_card, .. } => language_card.borrow_mut().load_rom(rom),
            MachineMemory::Iie { mmu } => mmu.borrow_mut().load_rom(rom),
        }
        log::info!("machine: ROM loaded ({} bytes)", rom.len());
        self.reset();
    }

    pub fn load_disk_rom(&mut self, data: &[u8]) -> Result<(), DiskError> {
        self.disk.borrow_mut().load_boot_rom(data)
    }

    /// ファイル名の拡張子で形式を判定して挿入
    pub fn load_disk(&mut self, drive: usize, name: &str, data: &[u8]) -> Result<(), DiskError> {
        let format = DiskFormat::from_path(name)?;
        self.disk
            .borrow_mut()
            .set_binary(drive, name, format.as_str(), data)
    }

    pub fn load_disk_json(&mut self, drive: usize, json: &str) -> Result<(), DiskError> {
        let disk: DiskImage =
            serde_json::from_str(json).map_err(|e| DiskError::Encoding(e.to_string()))?;
        self.disk.borrow_mut().set_disk(drive, &disk)
    }

    pub fn key_down(&mut self, ascii: u8) {
        self.io.borrow_mut().set_key(ascii);
    }

    /// `elapsed` 分だけ進める。実行したサイクル数を返す
    pub fn run(&mut self, elapsed: Duration) -> u64 {
        let budget = self.config.cycles_for(elapsed);
        let cycles = self.cpu.step_cycles(budget);
        ManualScheduler::advance(&self.scheduler, elapsed);
        self.cpu.bus().tick();
        if let MachineMemory::Iie { mmu } = &self.memory {
            mmu.borrow_mut().reset_vb();
        }
        self.frame_count += 1;
        cycles
    }

    /// バス経由の読み取り（ソフトスイッチの副作用あり）
    pub fn peek(&self, addr: u16) -> u8 {
        self.cpu.read((addr >> 8) as u8, addr as u8)
    }

    pub fn poke(&self, addr: u16, val: u8) {
        self.cpu.write((addr >> 8) as u8, addr as u8, val);
    }

    /// 40桁テキスト画面（表示中のページ）
    pub fn text_screen(&self) -> Vec<String> {
        let base = if self.video.borrow().page2 { 0x0800 } else { 0x0400 };
        (0..24u16)
            .map(|row| {
                let addr = base + (row % 8) * 0x80 + (row / 8) * 0x28;
                (0..40u16)
                    .map(|col| {
                        let c = self.peek(addr + col) & 0x7F;
                        let c = if c < 0x20 { c + 0x40 } else { c };
                        c as char
                    })
                    .collect()
            })
            .collect()
    }

    pub fn save_state(&self) -> SaveState {
        let memory = match &self.memory {
            MachineMemory::Plus { ram, language_card } => MemoryState::Plus {
                ram: ram.borrow().get_state(),
                language_card: language_card.borrow().get_state(),
            },
            MachineMemory::Iie { mmu } => MemoryState::Iie(mmu.borrow().get_state()),
        };
        SaveState {
            version: SaveState::CURRENT_VERSION,
            model: self.model,
            cpu: self.cpu.get_state(),
            memory,
            io: self.io.borrow().get_state(),
            disk: self.disk.borrow().get_state(),
            frame_count: self.frame_count,
        }
    }

    /// 同じ機種で作ったマシンにのみ復元できる
    pub fn restore_state(&mut self, state: &SaveState) -> Result<(), StateError> {
        if state.model != self.model {
            return Err(StateError::Mismatch("model"));
        }
        match (&self.memory, &state.memory) {
            (
                MachineMemory::Plus { ram, language_card },
                MemoryState::Plus {
                    ram: ram_state,
                    language_card: lc_state,
                },
            ) => {
                ram.borrow_mut().set_state(ram_state)?;
                language_card.borrow_mut().set_state(lc_state)?;
            }
            (MachineMemory::Iie { mmu }, MemoryState::Iie(mmu_state)) => {
                mmu.borrow_mut().set_state(mmu_state)?;
            }
            _ => return Err(StateError::Mismatch("memory layout")),
        }
        self.io.borrow_mut().set_state(&state.io);
        self.disk
            .borrow_mut()
            .set_state(&state.disk)
            .map_err(|e| StateError::Encoding(e.to_string()))?;
        self.cpu.set_state(&state.cpu);
        self.frame_count = state.frame_count;
        log::info!("machine: state restored (cycle {})", state.cpu.cycles);
        Ok(())
    }

    pub fn save_state_json(&self) -> Result<String, StateError> {
        self.save_state().to_json()
    }

    pub fn restore_state_json(&mut self, json: &str) -> Result<(), StateError> {
        let state = SaveState::from_json(json)?;
        self.restore_state(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// $D000: LDA #$C1 / STA $0400 / INC $0401 / JMP $D005
    const PROGRAM: [u8; 11] = [0xA9, 0xC1, 0x8D, 0x00, 0x04, 0xEE, 0x01, 0x04, 0x4C, 0x05, 0xD0];

    fn rom(size: usize) -> Vec<u8> {
        rom_with(size, &PROGRAM)
    }

    fn rom_with(size: usize, program: &[u8]) -> Vec<u8> {
        let mut rom = vec![0xEA; size];
        let d000 = size - 0x3000;
        rom[d000..d000 + program.len()].copy_from_slice(program);
        rom[size - 4] = 0x00;
        rom[size - 3] = 0xD0;
        rom
    }

    fn machine(model: Model) -> Apple2 {
        let config = Config {
            model,
            ..Default::default()
        };
        let size = if model.is_iie() { 0x4000 } else { 0x3000 };
        Apple2::new(&config, &rom(size))
    }

    #[test]
    fn test_model_tags() {
        assert_eq!("ii+".parse::<Model>().unwrap(), Model::AppleIIPlus);
        assert_eq!("IIE".parse::<Model>().unwrap(), Model::AppleIIe);
        assert!("iic".parse::<Model>().is_err());
        assert_eq!(Model::AppleIIeEnhanced.cpu_type(), CpuType::Cpu65C02);
        assert_eq!(Model::AppleIIe.cpu_type(), CpuType::Cpu6502);
    }

    #[test]
    fn test_detect_model() {
        let mut rom = vec![0u8; 0x3000];
        rom[0x2BB3] = 0x38;
        assert_eq!(Model::detect(&rom), Model::AppleII);
        rom[0x2BB3] = 0xEA;
        assert_eq!(Model::detect(&rom), Model::AppleIIPlus);

        let mut rom = vec![0u8; 0x4000];
        rom[0x3BB3] = 0x06;
        rom[0x3BC0] = 0xEA;
        assert_eq!(Model::detect(&rom), Model::AppleIIe);
        rom[0x3BC0] = 0xE0;
        assert_eq!(Model::detect(&rom), Model::AppleIIeEnhanced);
    }

    #[test]
    fn test_runs_from_reset_vector() {
        for model in [Model::AppleIIPlus, Model::AppleIIe, Model::AppleIIeEnhanced] {
            let mut m = machine(model);
            assert_eq!(m.cpu.regs.pc, 0xD000);
            let cycles = m.run(Duration::from_millis(1));
            assert!(cycles >= 1023);
            assert_eq!(m.peek(0x0400), 0xC1);
            assert_ne!(m.peek(0x0401), 0);
            assert!(m.text_screen()[0].starts_with('A'));
        }
    }

    #[test]
    fn test_disk_motor_spins_down() {
        let mut m = machine(Model::AppleIIPlus);
        m.peek(0xC0E9);
        assert!(m.disk().borrow().is_motor_on());
        m.peek(0xC0E8);
        m.run(Duration::from_millis(500));
        assert!(m.disk().borrow().is_motor_on());
        m.run(Duration::from_millis(600));
        assert!(!m.disk().borrow().is_motor_on());
    }

    #[test]
    fn test_state_roundtrip_resumes_identically() {
        let mut a = machine(Model::AppleIIPlus);
        a.run(Duration::from_millis(2));
        let json = a.save_state_json().unwrap();

        let mut b = machine(Model::AppleIIPlus);
        b.restore_state_json(&json).unwrap();
        assert_eq!(b.cpu.get_state(), a.cpu.get_state());

        a.run(Duration::from_millis(3));
        b.run(Duration::from_millis(3));
        assert_eq!(b.cpu.get_state(), a.cpu.get_state());
        assert_eq!(b.peek(0x0401), a.peek(0x0401));
    }

    #[test]
    fn test_speaker_clicks_stay_bounded() {
        // $D000: LDA $C030 / JMP $D000
        let program = [0xAD, 0x30, 0xC0, 0x4C, 0x00, 0xD0];
        let mut m = Apple2::new(&Config::default(), &rom_with(0x3000, &program));
        for _ in 0..600 {
            m.run(Duration::from_millis(16));
        }
        let clicks = m.io().borrow_mut().take_speaker_clicks();
        assert_eq!(clicks.len(), crate::io::MAX_SPEAKER_CLICKS);
        assert!(clicks.windows(2).all(|w| w[0] < w[1]));
        assert!(m.io().borrow_mut().take_speaker_clicks().is_empty());
    }

    #[test]
    fn test_restore_rejects_other_model() {
        let a = machine(Model::AppleIIPlus);
        let mut b = machine(Model::AppleIIe);
        assert_eq!(
            b.restore_state(&a.save_state()).unwrap_err(),
            StateError::Mismatch("model")
        );
    }

    #[test]
    fn test_load_disk_by_extension() {
        let mut m = machine(Model::AppleIIe);
        assert!(m.load_disk(0, "blank.dsk", &vec![0; crate::formats::DSK_SIZE]).is_ok());
        assert!(m.load_disk(0, "blank.img", &[0; 16]).is_err());
        assert_eq!(m.disk().borrow().drive(0).unwrap().name(), "blank.dsk");
    }
}
