//! Disk II interface card
//!
//! ステッパーモーター、モーター停止タイマー、データラッチとシーケンサ。
//! WOZのビット列トラックはP6 ROMのステートマシンで1ビットずつ処理し、
//! ニブル列トラック（dsk/nib等）は1アクセス毎に1バイト進める簡易モデルで読む。

use crate::formats::{self, DiskFormat, DiskImage, TrackImage, TwoImgWrapper, TRACKS};
use crate::memory::{Capabilities, Clock, Memory};
use crate::nibble::{self, BYTES_PER_SECTOR};
use crate::scheduler::{SharedScheduler, TimerHandle};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

pub use crate::formats::DiskError;

/// [現在のフェーズ][オンにしたフェーズ] のヘッド移動量（ハーフトラック）
pub const PHASE_DELTA: [[i32; 4]; 4] = [
    [0, 1, 2, -1],
    [-1, 0, 1, 2],
    [-2, -1, 0, 1],
    [1, -2, -1, 0],
];

/// DOS 3.3 P6 ロジックステートシーケンサ
///
/// 行は状態、列は Q7<<3 | Q6<<2 | QA<<1 | !パルス。
/// 下位4ビットが動作、上位4ビットが次の状態。
const SEQUENCER_ROM: [[u8; 16]; 16] = [
    [0x18, 0x18, 0x18, 0x18, 0x0A, 0x0A, 0x0A, 0x0A, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18],
    [0x2D, 0x2D, 0x38, 0x38, 0x0A, 0x0A, 0x0A, 0x0A, 0x28, 0x28, 0x28, 0x28, 0x28, 0x28, 0x28, 0x28],
    [0xD8, 0x38, 0x08, 0x28, 0x0A, 0x0A, 0x0A, 0x0A, 0x39, 0x39, 0x39, 0x39, 0x3B, 0x3B, 0x3B, 0x3B],
    [0xD8, 0x48, 0x48, 0x48, 0x0A, 0x0A, 0x0A, 0x0A, 0x48, 0x48, 0x48, 0x48, 0x48, 0x48, 0x48, 0x48],
    [0xD8, 0x58, 0xD8, 0x58, 0x0A, 0x0A, 0x0A, 0x0A, 0x58, 0x58, 0x58, 0x58, 0x58, 0x58, 0x58, 0x58],
    [0xD8, 0x68, 0xD8, 0x68, 0x0A, 0x0A, 0x0A, 0x0A, 0x68, 0x68, 0x68, 0x68, 0x68, 0x68, 0x68, 0x68],
    [0xD8, 0x78, 0xD8, 0x78, 0x0A, 0x0A, 0x0A, 0x0A, 0x78, 0x78, 0x78, 0x78, 0x78, 0x78, 0x78, 0x78],
    [0xD8, 0x88, 0xD8, 0x88, 0x0A, 0x0A, 0x0A, 0x0A, 0x08, 0x08, 0x88, 0x88, 0x08, 0x08, 0x88, 0x88],
    [0xD8, 0x98, 0xD8, 0x98, 0x0A, 0x0A, 0x0A, 0x0A, 0x98, 0x98, 0x98, 0x98, 0x98, 0x98, 0x98, 0x98],
    [0xD8, 0x29, 0xD8, 0xA8, 0x0A, 0x0A, 0x0A, 0x0A, 0xA8, 0xA8, 0xA8, 0xA8, 0xA8, 0xA8, 0xA8, 0xA8],
    [0xCD, 0xBD, 0xD8, 0xB8, 0x0A, 0x0A, 0x0A, 0x0A, 0xB9, 0xB9, 0xB9, 0xB9, 0xBB, 0xBB, 0xBB, 0xBB],
    [0xD9, 0x59, 0xD8, 0xC8, 0x0A, 0x0A, 0x0A, 0x0A, 0xC8, 0xC8, 0xC8, 0xC8, 0xC8, 0xC8, 0xC8, 0xC8],
    [0xD9, 0xD9, 0xD8, 0xA0, 0x0A, 0x0A, 0x0A, 0x0A, 0xD8, 0xD8, 0xD8, 0xD8, 0xD8, 0xD8, 0xD8, 0xD8],
    [0xD8, 0x08, 0xE8, 0xE8, 0x0A, 0x0A, 0x0A, 0x0A, 0xE8, 0xE8, 0xE8, 0xE8, 0xE8, 0xE8, 0xE8, 0xE8],
    [0xFD, 0xFD, 0xF8, 0xF8, 0x0A, 0x0A, 0x0A, 0x0A, 0xF8, 0xF8, 0xF8, 0xF8, 0xF8, 0xF8, 0xF8, 0xF8],
    [0xDD, 0x4D, 0xE0, 0xE0, 0x0A, 0x0A, 0x0A, 0x0A, 0x88, 0x88, 0x08, 0x08, 0x88, 0x88, 0x08, 0x08],
];

/// モーター停止までの遅延
pub const MOTOR_OFF_DELAY: Duration = Duration::from_secs(1);

/// 連続0ビットがこの数を超えたら乱数ビット
const MAX_ZEROS: u32 = 2;

/// ブートROMのサイズ
pub const BOOT_ROM_SIZE: usize = 256;

/// 1台のドライブ
#[derive(Debug, Clone, Default)]
pub struct Drive {
    image: Option<TrackImage>,
    name: String,
    /// クォータートラック位置
    track: usize,
    /// トラック内のバイト/ビット位置
    head: usize,
    /// 最後に動いたフェーズ
    phase: usize,
    phases: [bool; 4],
    dirty: bool,
}

impl Drive {
    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> Option<DiskFormat> {
        self.image.as_ref().map(|i| i.format)
    }

    pub fn quarter_track(&self) -> usize {
        self.track
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_read_only(&self) -> bool {
        self.image.as_ref().is_some_and(|i| i.read_only)
    }

    /// クォータートラックの上限
    fn max_track(&self) -> usize {
        match &self.image {
            Some(image) if image.raw => image.track_map.len().saturating_sub(1),
            Some(image) => (image.tracks.len() * 4).saturating_sub(1),
            None => TRACKS * 4 - 1,
        }
    }

    /// フェーズのオン/オフ。オフだったフェーズをオンにした時だけヘッドが動く
    fn set_phase(&mut self, phase: usize, on: bool) {
        if on && !self.phases[phase] {
            let delta = PHASE_DELTA[self.phase][phase] * 2;
            let track = (self.track as i32 + delta).clamp(0, self.max_track() as i32) as usize;
            if track != self.track {
                log::trace!("disk: phase {} quarter track {} -> {}", phase, self.track, track);
            }
            self.track = track;
            self.phase = phase;
        }
        self.phases[phase] = on;
    }
}

/// モーターの状態（停止タイマーのコールバックと共有）
#[derive(Debug, Default)]
struct MotorState {
    on: Cell<bool>,
    off_pending: Cell<Option<TimerHandle>>,
}

/// ドライブのスナップショット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveState {
    pub format: Option<DiskFormat>,
    pub name: String,
    pub volume: u8,
    /// base64
    pub tracks: Vec<String>,
    pub raw: bool,
    pub track_map: Vec<u8>,
    pub track: usize,
    pub head: usize,
    pub phase: usize,
    pub phases: [bool; 4],
    pub read_only: bool,
    pub dirty: bool,
    pub wrapper: Option<TwoImgWrapper>,
}

/// コントローラのスナップショット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskControllerState {
    pub drives: Vec<DriveState>,
    pub cur: usize,
    pub on: bool,
    pub motor_off_pending: bool,
    pub q6: bool,
    pub q7: bool,
    pub latch: u8,
    pub bus: u8,
    pub state: u8,
    pub clock_phase: u8,
    pub zeros: u32,
    pub skip: u8,
    pub last_cycles: u64,
}

/// Disk II インターフェースカード
pub struct DiskController {
    slot: u8,
    drives: [Drive; 2],
    cur: usize,
    motor: Rc<MotorState>,
    motor_off_delay: Duration,
    q6: bool,
    q7: bool,
    latch: u8,
    /// 最後にCPUが書いた値
    bus: u8,
    /// シーケンサの状態 (0-15)
    state: u8,
    /// 内部クロック (0-7)
    clock_phase: u8,
    zeros: u32,
    last_cycles: u64,
    /// ニブルモデルの読み飛ばしトグル
    skip: u8,
    clock: Clock,
    scheduler: SharedScheduler,
    rng: SmallRng,
    boot_rom: [u8; BOOT_ROM_SIZE],
}

impl DiskController {
    pub fn new(slot: u8, clock: Clock, scheduler: SharedScheduler, seed: u64) -> Self {
        DiskController {
            slot: slot & 0x07,
            drives: Default::default(),
            cur: 0,
            motor: Rc::new(MotorState::default()),
            motor_off_delay: MOTOR_OFF_DELAY,
            q6: false,
            q7: false,
            latch: 0,
            bus: 0,
            state: 0,
            clock_phase: 0,
            zeros: 0,
            last_cycles: 0,
            skip: 0,
            clock,
            scheduler,
            rng: SmallRng::seed_from_u64(seed),
            boot_rom: [0; BOOT_ROM_SIZE],
        }
    }

    pub fn set_motor_off_delay(&mut self, delay: Duration) {
        self.motor_off_delay = delay;
    }

    /// P5ブートROM（256バイト、先頭が LDX #$20）
    pub fn load_boot_rom(&mut self, data: &[u8]) -> Result<(), DiskError> {
        if data.len() != BOOT_ROM_SIZE {
            return Err(DiskError::BadBootRom("must be exactly 256 bytes"));
        }
        if data[0] != 0xA2 || data[1] != 0x20 {
            return Err(DiskError::BadBootRom("missing LDX #$20 signature"));
        }
        self.boot_rom.copy_from_slice(data);
        log::info!("disk: boot ROM loaded in slot {}", self.slot);
        Ok(())
    }

    pub fn is_boot_rom_loaded(&self) -> bool {
        self.boot_rom[0] == 0xA2 && self.boot_rom[1] == 0x20
    }

    pub fn drive(&self, drive: usize) -> Option<&Drive> {
        self.drives.get(drive)
    }

    pub fn current_drive(&self) -> usize {
        self.cur
    }

    pub fn is_motor_on(&self) -> bool {
        self.motor.on.get()
    }

    pub fn latch(&self) -> u8 {
        self.latch
    }

    fn drive_mut(&mut self, drive: usize) -> Result<&mut Drive, DiskError> {
        self.drives.get_mut(drive).ok_or(DiskError::NoDrive(drive))
    }

    /// 展開済みディスクを挿入
    pub fn insert(&mut self, drive: usize, name: &str, image: TrackImage) -> Result<(), DiskError> {
        let d = self.drive_mut(drive)?;
        log::info!(
            "disk: drive {} <- '{}' ({}, {} tracks{})",
            drive + 1,
            name,
            image.format,
            image.tracks.len(),
            if image.read_only { ", read-only" } else { "" }
        );
        d.image = Some(image);
        d.name = name.to_string();
        d.head = 0;
        d.dirty = false;
        d.track = d.track.min(d.max_track());
        Ok(())
    }

    /// イメージファイルを読み込む。形式が不正ならドライブは変更しない
    pub fn set_binary(
        &mut self,
        drive: usize,
        name: &str,
        format: &str,
        data: &[u8],
    ) -> Result<(), DiskError> {
        self.drive_mut(drive)?;
        let format: DiskFormat = format.parse().inspect_err(|e| log::warn!("disk: {}", e))?;
        let image = formats::decode_image(format, data)?;
        self.insert(drive, name, image)
    }

    /// JSON形式のイメージを読み込む
    pub fn set_disk(&mut self, drive: usize, disk: &DiskImage) -> Result<(), DiskError> {
        self.drive_mut(drive)?;
        let image = disk.decode()?;
        self.insert(drive, &disk.name, image)
    }

    pub fn eject(&mut self, drive: usize) -> Result<(), DiskError> {
        let d = self.drive_mut(drive)?;
        d.image = None;
        d.name.clear();
        d.dirty = false;
        Ok(())
    }

    /// 現在の内容を元の形式のバイト列に戻す
    pub fn get_binary(&self, drive: usize) -> Result<Vec<u8>, DiskError> {
        let d = self.drives.get(drive).ok_or(DiskError::NoDrive(drive))?;
        let image = d.image.as_ref().ok_or(DiskError::NoDisk)?;
        formats::encode_image(image)
    }

    pub fn get_base64(&self, drive: usize) -> Result<String, DiskError> {
        Ok(BASE64.encode(self.get_binary(drive)?))
    }

    /// セクタ単位の読み書き
    ///
    /// `sector` はイメージ内（論理）のセクタ番号。`data` を渡すと書き込む。
    /// セクタが読めなければ `Ok(None)`。
    pub fn rwts(
        &mut self,
        drive: usize,
        track: u8,
        sector: u8,
        data: Option<&[u8; BYTES_PER_SECTOR]>,
    ) -> Result<Option<[u8; BYTES_PER_SECTOR]>, DiskError> {
        let d = self.drive_mut(drive)?;
        let image = d.image.as_mut().ok_or(DiskError::NoDisk)?;
        let order_format = match &image.wrapper {
            Some(wrapper) => wrapper.inner,
            None => image.format,
        };
        let physical = formats::physical_sector(order_format, sector as usize)
            .or_else(|| formats::physical_sector(DiskFormat::Dsk, sector as usize))
            .unwrap_or(sector as usize) as u8;

        match data {
            Some(data) => {
                if image.raw || image.read_only {
                    return Err(DiskError::ReadOnly);
                }
                let Some(bytes) = image.tracks.get_mut(track as usize) else {
                    return Ok(None);
                };
                if !nibble::write_sector(bytes, track, physical, data) {
                    log::warn!("rwts: write failed t={} s={}", track, sector);
                    return Ok(None);
                }
                d.dirty = true;
                Ok(Some(*data))
            }
            None => {
                let Some(bytes) = image.nibble_track(track as usize) else {
                    return Ok(None);
                };
                Ok(nibble::read_sector(&bytes, track, physical).map(|s| s.data))
            }
        }
    }

    fn motor_on(&mut self) {
        if let Some(handle) = self.motor.off_pending.take() {
            self.scheduler.borrow_mut().cancel(handle);
        }
        if !self.motor.on.get() {
            self.motor.on.set(true);
            self.last_cycles = self.clock.get();
            log::debug!("disk: motor on (drive {})", self.cur + 1);
        }
    }

    fn motor_off(&mut self) {
        if !self.motor.on.get() || self.motor.off_pending.get().is_some() {
            return;
        }
        let motor = self.motor.clone();
        let handle = self.scheduler.borrow_mut().schedule(
            self.motor_off_delay,
            Box::new(move || {
                motor.on.set(false);
                motor.off_pending.set(None);
                log::debug!("disk: motor off");
            }),
        );
        self.motor.off_pending.set(Some(handle));
    }

    fn is_raw(&self) -> bool {
        self.drives[self.cur].image.as_ref().is_some_and(|i| i.raw)
    }

    /// 現在のサイクルまでシーケンサを進める（ビット列トラックのみ）
    fn move_head(&mut self) {
        let now = self.clock.get();
        let ticks = now.saturating_sub(self.last_cycles) * 2;
        self.last_cycles = now;
        if !self.motor.on.get() || !self.is_raw() {
            return;
        }

        let drive = &mut self.drives[self.cur];
        let Some(image) = drive.image.as_mut() else {
            return;
        };
        let read_only = image.read_only;
        let mut no_track = Vec::new();
        let bits = match image.track_map.get(drive.track) {
            Some(&idx) if (idx as usize) < image.tracks.len() => &mut image.tracks[idx as usize],
            _ => &mut no_track,
        };
        if drive.head >= bits.len() {
            drive.head = 0;
        }

        for _ in 0..ticks {
            let mut pulse = 0u8;
            if self.clock_phase == 4 {
                pulse = bits.get(drive.head).copied().unwrap_or(0);
                if pulse == 0 {
                    self.zeros += 1;
                    if self.zeros > MAX_ZEROS {
                        pulse = self.rng.gen::<bool>() as u8;
                    }
                } else {
                    self.zeros = 0;
                }
            }

            let column = (self.q7 as usize) << 3
                | (self.q6 as usize) << 2
                | ((self.latch >> 7) as usize) << 1
                | (pulse == 0) as usize;
            let command = SEQUENCER_ROM[self.state as usize][column];
            match command & 0x0F {
                0x0 => self.latch = 0,                         // CLR
                0x9 => self.latch <<= 1,                       // SL0
                0xA => {
                    // SR
                    self.latch >>= 1;
                    if read_only {
                        self.latch |= 0x80;
                    }
                }
                0xB => self.latch = self.bus,                  // LD
                0xD => self.latch = (self.latch << 1) | 0x01,  // SL1
                _ => {}                                        // NOP
            }
            self.state = command >> 4;

            if self.clock_phase == 4 && !bits.is_empty() {
                if self.q7 && !read_only {
                    bits[drive.head] = (self.state >> 3) & 0x01;
                    drive.dirty = true;
                }
                drive.head = (drive.head + 1) % bits.len();
            }
            self.clock_phase = (self.clock_phase + 1) & 0x07;
        }
    }

    /// ニブル列トラックの1バイト読み書き
    ///
    /// 読み取りは1回おきに進み、間のアクセスはデータ未到着 (bit7=0) を返す。
    fn read_write_next(&mut self) {
        let write = self.q7;
        if self.skip != 0 || write {
            let drive = &mut self.drives[self.cur];
            if let Some(image) = drive.image.as_mut() {
                let read_only = image.read_only;
                if let Some(bytes) = image.tracks.get_mut(drive.track >> 2) {
                    if !bytes.is_empty() {
                        if drive.head >= bytes.len() {
                            drive.head = 0;
                        }
                        if write {
                            if !read_only {
                                bytes[drive.head] = self.bus;
                                drive.dirty = true;
                            }
                        } else {
                            self.latch = bytes[drive.head];
                        }
                        drive.head = (drive.head + 1) % bytes.len();
                    }
                }
            }
        } else {
            self.latch &= 0x7F;
        }
        self.skip ^= 1;
    }

    /// $C0n0-$C0nF
    fn switch(&mut self, off: u8, val: Option<u8>) -> Option<u8> {
        let off = off & 0x0F;
        self.move_head();
        if let Some(v) = val {
            self.bus = v;
        }
        let raw = self.is_raw();

        match off {
            0x00..=0x07 => {
                let phase = (off >> 1) as usize;
                let on = off & 0x01 != 0;
                self.drives[self.cur].set_phase(phase, on);
            }
            0x08 => self.motor_off(),
            0x09 => self.motor_on(),
            0x0A | 0x0B => {
                let drive = (off & 0x01) as usize;
                if drive != self.cur {
                    log::debug!("disk: select drive {}", drive + 1);
                }
                self.cur = drive;
            }
            0x0C => {
                self.q6 = false;
                if !raw {
                    self.read_write_next();
                }
            }
            0x0D => {
                self.q6 = true;
                if !raw && !self.q7 {
                    // 書き込み保護のセンス
                    self.latch = if self.drives[self.cur].is_read_only() {
                        0xFF
                    } else {
                        self.latch >> 1
                    };
                }
            }
            0x0E => self.q7 = false,
            _ => self.q7 = true,
        }

        if off & 0x01 == 0 {
            Some(self.latch)
        } else {
            None
        }
    }

    pub fn get_state(&self) -> DiskControllerState {
        let drives = self
            .drives
            .iter()
            .map(|d| {
                let image = d.image.as_ref();
                DriveState {
                    format: image.map(|i| i.format),
                    name: d.name.clone(),
                    volume: image.map_or(formats::DEFAULT_VOLUME, |i| i.volume),
                    tracks: image
                        .map(|i| i.tracks.iter().map(|t| BASE64.encode(t)).collect())
                        .unwrap_or_default(),
                    raw: image.is_some_and(|i| i.raw),
                    track_map: image.map(|i| i.track_map.clone()).unwrap_or_default(),
                    track: d.track,
                    head: d.head,
                    phase: d.phase,
                    phases: d.phases,
                    read_only: image.is_some_and(|i| i.read_only),
                    dirty: d.dirty,
                    wrapper: image.and_then(|i| i.wrapper.clone()),
                }
            })
            .collect();
        DiskControllerState {
            drives,
            cur: self.cur,
            on: self.motor.on.get(),
            motor_off_pending: self.motor.off_pending.get().is_some(),
            q6: self.q6,
            q7: self.q7,
            latch: self.latch,
            bus: self.bus,
            state: self.state,
            clock_phase: self.clock_phase,
            zeros: self.zeros,
            skip: self.skip,
            last_cycles: self.last_cycles,
        }
    }

    /// スナップショットから復元。停止待ちのタイマーは改めて登録する
    pub fn set_state(&mut self, state: &DiskControllerState) -> Result<(), DiskError> {
        let mut drives: [Drive; 2] = Default::default();
        for (drive, s) in drives.iter_mut().zip(&state.drives) {
            if let Some(format) = s.format {
                let tracks = s
                    .tracks
                    .iter()
                    .map(|t| BASE64.decode(t))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| DiskError::Encoding(e.to_string()))?;
                drive.image = Some(TrackImage {
                    format,
                    volume: s.volume,
                    tracks,
                    raw: s.raw,
                    track_map: s.track_map.clone(),
                    read_only: s.read_only,
                    wrapper: s.wrapper.clone(),
                });
            }
            drive.name = s.name.clone();
            drive.track = s.track.min(drive.max_track());
            drive.head = s.head;
            drive.phase = s.phase & 0x03;
            drive.phases = s.phases;
            drive.dirty = s.dirty;
        }

        if let Some(handle) = self.motor.off_pending.take() {
            self.scheduler.borrow_mut().cancel(handle);
        }
        self.drives = drives;
        self.cur = state.cur & 0x01;
        self.motor.on.set(state.on);
        if state.on && state.motor_off_pending {
            self.motor_off();
        }
        self.q6 = state.q6;
        self.q7 = state.q7;
        self.latch = state.latch;
        self.bus = state.bus;
        self.state = state.state & 0x0F;
        self.clock_phase = state.clock_phase & 0x07;
        self.zeros = state.zeros;
        self.skip = state.skip & 0x01;
        self.last_cycles = state.last_cycles;
        Ok(())
    }
}

impl Memory for DiskController {
    fn start(&self) -> u8 {
        0xC0 | self.slot
    }

    fn end(&self) -> u8 {
        0xC0 | self.slot
    }

    fn read(&mut self, page: u8, off: u8) -> u8 {
        if page == self.start() {
            self.boot_rom[off as usize]
        } else {
            0
        }
    }

    fn write(&mut self, _page: u8, _off: u8, _val: u8) {}

    /// フェーズとモーターを止め、ラッチを初期化
    fn reset(&mut self) {
        for drive in &mut self.drives {
            drive.phases = [false; 4];
        }
        if let Some(handle) = self.motor.off_pending.take() {
            self.scheduler.borrow_mut().cancel(handle);
        }
        self.motor.on.set(false);
        self.q6 = false;
        self.q7 = false;
        self.latch = 0;
        self.state = 0;
        self.skip = 0;
    }

    /// ホストのフレーム毎にシーケンサを現在まで進める
    fn tick(&mut self) {
        self.move_head();
    }

    fn io_switch(&mut self, off: u8, val: Option<u8>) -> Option<u8> {
        self.switch(off, val)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use std::cell::RefCell;

    struct Rig {
        disk: DiskController,
        clock: Clock,
        sched: Rc<RefCell<ManualScheduler>>,
    }

    fn rig() -> Rig {
        let clock: Clock = Rc::new(Cell::new(0));
        let sched = Rc::new(RefCell::new(ManualScheduler::new()));
        let disk = DiskController::new(6, clock.clone(), sched.clone(), 1);
        Rig { disk, clock, sched }
    }

    fn dsk() -> Vec<u8> {
        (0..formats::DSK_SIZE).map(|i| (i * 13 / 7) as u8).collect()
    }

    fn raw_image(bits: Vec<u8>, read_only: bool) -> TrackImage {
        TrackImage {
            format: DiskFormat::Woz,
            volume: 254,
            tracks: vec![bits],
            raw: true,
            track_map: vec![0; 160],
            read_only,
            wrapper: None,
        }
    }

    #[test]
    fn test_stepper_moves_by_phase_delta() {
        let mut r = rig();
        r.disk.set_binary(0, "t", "dsk", &dsk()).unwrap();
        r.disk.io_switch(0x01, None); // phase 0 on
        assert_eq!(r.disk.drive(0).unwrap().quarter_track(), 0);
        r.disk.io_switch(0x03, None); // phase 1 on
        assert_eq!(r.disk.drive(0).unwrap().quarter_track(), (PHASE_DELTA[0][1] * 2) as usize);
        r.disk.io_switch(0x00, None); // phase 0 off
        assert_eq!(r.disk.drive(0).unwrap().quarter_track(), 2);
        r.disk.io_switch(0x02, None);
        r.disk.io_switch(0x05, None); // phase 2 on
        assert_eq!(r.disk.drive(0).unwrap().quarter_track(), 4);
        // 既にオンのフェーズは動かない
        r.disk.io_switch(0x05, None);
        assert_eq!(r.disk.drive(0).unwrap().quarter_track(), 4);
    }

    #[test]
    fn test_stepper_clamps() {
        let mut r = rig();
        r.disk.set_binary(0, "t", "dsk", &dsk()).unwrap();
        // phase 0 から phase 3 は後退
        r.disk.io_switch(0x07, None);
        assert_eq!(r.disk.drive(0).unwrap().quarter_track(), 0);
        r.disk.io_switch(0x06, None);
        for i in 0..200 {
            let phase = (i % 4) as u8;
            r.disk.io_switch(phase * 2 + 1, None);
            r.disk.io_switch(phase * 2, None);
        }
        assert_eq!(r.disk.drive(0).unwrap().quarter_track(), TRACKS * 4 - 1);
    }

    #[test]
    fn test_motor_off_is_delayed_and_cancellable() {
        let mut r = rig();
        r.disk.io_switch(0x09, None);
        assert!(r.disk.is_motor_on());
        r.disk.io_switch(0x08, None);
        assert!(r.disk.is_motor_on());
        r.disk.io_switch(0x09, None);
        ManualScheduler::advance(&r.sched, Duration::from_secs(2));
        assert!(r.disk.is_motor_on());

        r.disk.io_switch(0x08, None);
        ManualScheduler::advance(&r.sched, Duration::from_millis(999));
        assert!(r.disk.is_motor_on());
        ManualScheduler::advance(&r.sched, Duration::from_millis(1));
        assert!(!r.disk.is_motor_on());
    }

    #[test]
    fn test_nibble_reads_follow_track() {
        let mut r = rig();
        r.disk.set_binary(0, "t", "dsk", &dsk()).unwrap();
        r.disk.io_switch(0x09, None);
        r.disk.io_switch(0x0E, None);
        let mut seen = Vec::new();
        while seen.len() < 0x83 {
            let value = r.disk.io_switch(0x0C, None).unwrap();
            if value & 0x80 != 0 {
                seen.push(value);
            }
        }
        assert!(seen[..0x80].iter().all(|&b| b == 0xFF));
        assert_eq!(&seen[0x80..], &[0xD5, 0xAA, 0x96]);
    }

    #[test]
    fn test_write_protect_sense() {
        let mut r = rig();
        let disk = DiskImage {
            format: DiskFormat::Dsk,
            name: "ro".into(),
            volume: None,
            read_only: true,
            data: dsk()
                .chunks(16 * 256)
                .map(|t| t.chunks(256).map(|s| BASE64.encode(s)).collect())
                .collect(),
        };
        r.disk.set_disk(0, &disk).unwrap();
        assert!(r.disk.drive(0).unwrap().is_read_only());
        r.disk.io_switch(0x0D, None);
        assert_eq!(r.disk.io_switch(0x0E, None), Some(0xFF));
        assert!(matches!(r.disk.rwts(0, 0, 0, Some(&[0; 256])), Err(DiskError::ReadOnly)));
    }

    #[test]
    fn test_nibble_write_mode() {
        let mut r = rig();
        r.disk.set_binary(0, "t", "dsk", &dsk()).unwrap();
        r.disk.io_switch(0x09, None);
        r.disk.io_switch(0x0F, None); // Q7H
        r.disk.io_switch(0x0D, Some(0x96)); // Q6H + データ
        r.disk.io_switch(0x0C, None); // Q6L で書き込み
        let d = r.disk.drive(0).unwrap();
        assert!(d.is_dirty());
        assert_eq!(d.head(), 1);
        assert_eq!(r.disk.drives[0].image.as_ref().unwrap().tracks[0][0], 0x96);
    }

    #[test]
    fn test_sequencer_shift_right_fills_write_protect() {
        let mut r = rig();
        r.disk.insert(0, "woz", raw_image(vec![1; 512], true)).unwrap();
        r.disk.io_switch(0x09, None);
        r.disk.io_switch(0x0D, None);
        r.clock.set(10);
        assert_eq!(r.disk.io_switch(0x0E, None), Some(0xFF));

        let mut r = rig();
        r.disk.insert(0, "woz", raw_image(vec![1; 512], false)).unwrap();
        r.disk.io_switch(0x09, None);
        r.disk.io_switch(0x0D, Some(0xFF));
        r.clock.set(10);
        assert_eq!(r.disk.io_switch(0x0E, None), Some(0x00));
    }

    #[test]
    fn test_raw_head_advances_once_per_four_cycles() {
        let mut r = rig();
        r.disk.insert(0, "woz", raw_image(vec![1; 100], false)).unwrap();
        r.disk.io_switch(0x09, None);
        r.clock.set(40);
        r.disk.tick();
        assert_eq!(r.disk.drive(0).unwrap().head(), 10);
    }

    #[test]
    fn test_unknown_format_leaves_drive_untouched() {
        let mut r = rig();
        r.disk.set_binary(0, "a", "dsk", &dsk()).unwrap();
        let err = r.disk.set_binary(0, "b", "img", &[0; 10]).unwrap_err();
        assert_eq!(err, DiskError::UnknownFormat("img".into()));
        assert!(r.disk.set_binary(0, "c", "dsk", &[0; 10]).is_err());
        assert_eq!(r.disk.drive(0).unwrap().name(), "a");
        assert_eq!(r.disk.get_binary(0).unwrap(), dsk());
        assert!(matches!(r.disk.set_binary(2, "d", "dsk", &dsk()), Err(DiskError::NoDrive(2))));
        assert_eq!(r.disk.get_binary(1), Err(DiskError::NoDisk));
    }

    #[test]
    fn test_rwts_roundtrip() {
        let mut r = rig();
        let original = dsk();
        r.disk.set_binary(0, "t", "dsk", &original).unwrap();
        let sector: [u8; 256] = std::array::from_fn(|i| (255 - i) as u8);
        assert_eq!(r.disk.rwts(0, 17, 3, Some(&sector)).unwrap(), Some(sector));
        assert_eq!(r.disk.rwts(0, 17, 3, None).unwrap(), Some(sector));
        assert!(r.disk.drive(0).unwrap().is_dirty());

        let binary = r.disk.get_binary(0).unwrap();
        let offset = (17 * 16 + 3) * 256;
        assert_eq!(&binary[offset..offset + 256], &sector[..]);
        assert_eq!(&binary[..offset], &original[..offset]);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut r = rig();
        r.disk.set_binary(1, "t", "dsk", &dsk()).unwrap();
        r.disk.io_switch(0x0B, None);
        r.disk.io_switch(0x09, None);
        r.disk.io_switch(0x03, None);
        for _ in 0..7 {
            r.disk.io_switch(0x0C, None);
        }
        let state = r.disk.get_state();

        let mut other = rig();
        other.disk.set_state(&state).unwrap();
        assert_eq!(other.disk.get_state(), state);
        for _ in 0..50 {
            assert_eq!(r.disk.io_switch(0x0C, None), other.disk.io_switch(0x0C, None));
        }
        assert_eq!(other.disk.get_binary(1).unwrap(), dsk());
    }

    #[test]
    fn test_boot_rom() {
        let mut r = rig();
        assert!(r.disk.load_boot_rom(&[0; 256]).is_err());
        assert!(r.disk.load_boot_rom(&[0xA2, 0x20]).is_err());
        let mut rom = [0u8; 256];
        rom[0] = 0xA2;
        rom[1] = 0x20;
        rom[0xFF] = 0x0A;
        r.disk.load_boot_rom(&rom).unwrap();
        assert!(r.disk.is_boot_rom_loaded());
        assert_eq!(r.disk.read(0xC6, 0xFF), 0x0A);
    }

    #[test]
    fn test_reset_stops_motor_and_phases() {
        let mut r = rig();
        r.disk.io_switch(0x09, None);
        r.disk.io_switch(0x01, None);
        r.disk.io_switch(0x08, None);
        r.disk.reset();
        assert!(!r.disk.is_motor_on());
        assert_eq!(r.sched.borrow().pending(), 0);
        assert_eq!(r.disk.drive(0).unwrap().phases, [false; 4]);
    }
}
