//! Apple IIe memory management unit
//!
//! 64KBのアドレス空間をメイン/補助RAM、ランゲージカードRAM、内部ROM、
//! スロットI/Oに割り当てる。ソフトスイッチが変わるたびに
//! `update_banks` でページ毎の読み書き先を計算し直す。

use crate::io::Io;
use crate::langcard::BankSwitch;
use crate::memory::{Capabilities, Clock, Memory, Ram, RamState, Rom, StateError};
use crate::video::SharedVideo;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// VERTBLANK が立っているサイクル数
const VBL_CYCLES: u64 = 1000;

/// ページの読み書き先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Main,
    Aux,
    /// $D000 バンク1（true なら補助側）
    Bank1(bool),
    Bank2(bool),
    /// $E000-$FFFF
    High(bool),
    Rom,
    Io,
    Nothing,
}

/// IIe固有のソフトスイッチ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MmuFlags {
    pub altzp: bool,
    pub aux_ram_read: bool,
    pub aux_ram_write: bool,
    pub store80: bool,
    pub page2: bool,
    pub hires: bool,
    pub intcxrom: bool,
    pub slot3rom: bool,
    pub intc8rom: bool,
    pub iou_disable: bool,
}

impl Default for MmuFlags {
    fn default() -> Self {
        MmuFlags {
            altzp: false,
            aux_ram_read: false,
            aux_ram_write: false,
            store80: false,
            page2: false,
            hires: false,
            intcxrom: false,
            slot3rom: false,
            intc8rom: false,
            iou_disable: true,
        }
    }
}

/// MMUのスナップショット
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MmuState {
    pub switch: BankSwitch,
    pub flags: MmuFlags,
    pub main: RamState,
    pub aux: RamState,
    pub main_bank1: RamState,
    pub main_bank2: RamState,
    pub main_high: RamState,
    pub aux_bank1: RamState,
    pub aux_bank2: RamState,
    pub aux_high: RamState,
}

/// ランゲージカード領域のRAM一式
struct LcRam {
    bank1: Ram,
    bank2: Ram,
    high: Ram,
}

impl LcRam {
    fn new() -> Self {
        LcRam {
            bank1: Ram::new(0xD0, 0xDF),
            bank2: Ram::new(0xD0, 0xDF),
            high: Ram::new(0xE0, 0xFF),
        }
    }
}

pub struct Mmu {
    io: Rc<RefCell<Io>>,
    video: SharedVideo,
    clock: Clock,
    main: Ram,
    aux: Ram,
    main_lc: LcRam,
    aux_lc: LcRam,
    rom: Rom,
    switch: BankSwitch,
    flags: MmuFlags,
    vb_end: u64,
    read_map: [Source; 256],
    write_map: [Source; 256],
}

fn bit7(on: bool) -> u8 {
    if on {
        0x80
    } else {
        0x00
    }
}

impl Mmu {
    /// `rom` は $C000-$FFFF の16KB（短ければ末尾に合わせる）
    pub fn new(io: Rc<RefCell<Io>>, clock: Clock, rom: &[u8]) -> Self {
        let video = io.borrow().video();
        let mut mmu = Mmu {
            io,
            video,
            clock,
            main: Ram::new(0x00, 0xBF),
            aux: Ram::new(0x00, 0xBF),
            main_lc: LcRam::new(),
            aux_lc: LcRam::new(),
            rom: Rom::new(0xC0, 0xFF, rom),
            switch: BankSwitch::default(),
            flags: MmuFlags::default(),
            vb_end: 0,
            read_map: [Source::Nothing; 256],
            write_map: [Source::Nothing; 256],
        };
        mmu.update_banks();
        mmu
    }

    pub fn load_rom(&mut self, rom: &[u8]) {
        self.rom = Rom::new(0xC0, 0xFF, rom);
    }

    pub fn io(&self) -> Rc<RefCell<Io>> {
        self.io.clone()
    }

    pub fn flags(&self) -> MmuFlags {
        self.flags
    }

    pub fn bank_switch(&self) -> BankSwitch {
        self.switch
    }

    /// 垂直帰線期間の開始（ホストのフレーム毎）
    pub fn reset_vb(&mut self) {
        self.vb_end = self.clock.get() + VBL_CYCLES;
    }

    /// ソフトスイッチからページ毎の読み書き先を再計算
    fn update_banks(&mut self) {
        let f = self.flags;

        let zp = if f.altzp { Source::Aux } else { Source::Main };
        for page in 0x00..=0x01 {
            self.read_map[page] = zp;
            self.write_map[page] = zp;
        }

        let read = if f.aux_ram_read { Source::Aux } else { Source::Main };
        let write = if f.aux_ram_write { Source::Aux } else { Source::Main };
        for page in 0x02..=0xBF {
            self.read_map[page] = read;
            self.write_map[page] = write;
        }

        // 80STOREが有効ならPAGE2で表示ページだけ補助側に
        if f.store80 {
            let display = if f.page2 { Source::Aux } else { Source::Main };
            let mut pages = vec![0x04..=0x07];
            if f.hires {
                pages.push(0x20..=0x3F);
            }
            for page in pages.into_iter().flatten() {
                self.read_map[page] = display;
                self.write_map[page] = display;
            }
        }

        self.read_map[0xC0] = Source::Io;
        self.write_map[0xC0] = Source::Io;
        for page in 0xC1..=0xCF {
            let internal = f.intcxrom
                || (page == 0xC3 && !f.slot3rom)
                || (page >= 0xC8 && f.intc8rom);
            if internal {
                self.read_map[page] = Source::Rom;
                self.write_map[page] = Source::Nothing;
            } else {
                self.read_map[page] = Source::Io;
                self.write_map[page] = Source::Io;
            }
        }

        let aux = f.altzp;
        for page in 0xD0..=0xFF {
            let ram = if page >= 0xE0 {
                Source::High(aux)
            } else if self.switch.bank1 {
                Source::Bank1(aux)
            } else {
                Source::Bank2(aux)
            };
            self.read_map[page] = if self.switch.readbsr { ram } else { Source::Rom };
            self.write_map[page] = if self.switch.writebsr { ram } else { Source::Nothing };
        }
    }

    fn lc(&mut self, aux: bool) -> &mut LcRam {
        if aux {
            &mut self.aux_lc
        } else {
            &mut self.main_lc
        }
    }

    fn read_source(&mut self, source: Source, page: u8, off: u8) -> u8 {
        match source {
            Source::Main => self.main.read(page, off),
            Source::Aux => self.aux.read(page, off),
            Source::Bank1(aux) => self.lc(aux).bank1.read(page, off),
            Source::Bank2(aux) => self.lc(aux).bank2.read(page, off),
            Source::High(aux) => self.lc(aux).high.read(page, off),
            Source::Rom => self.rom.read(page, off),
            Source::Io => self.io.borrow_mut().read(page, off),
            Source::Nothing => 0,
        }
    }

    fn write_source(&mut self, source: Source, page: u8, off: u8, val: u8) {
        match source {
            Source::Main => self.main.write(page, off, val),
            Source::Aux => self.aux.write(page, off, val),
            Source::Bank1(aux) => self.lc(aux).bank1.write(page, off, val),
            Source::Bank2(aux) => self.lc(aux).bank2.write(page, off, val),
            Source::High(aux) => self.lc(aux).high.write(page, off, val),
            Source::Io => self.io.borrow_mut().write(page, off, val),
            Source::Rom | Source::Nothing => {}
        }
    }

    /// $C3xx と $CFFF のアクセスによる $C800 ROM の切り替え
    fn cx_access(&mut self, page: u8, off: u8) {
        if page == 0xC3 && !self.flags.slot3rom && !self.flags.intc8rom {
            self.flags.intc8rom = true;
            self.update_banks();
        }
        if page == 0xCF && off == 0xFF {
            if self.flags.intc8rom {
                self.flags.intc8rom = false;
                self.update_banks();
            }
            self.io.borrow_mut().release_expansion_rom();
        }
    }

    /// $C0xx のソフトスイッチ
    pub fn access(&mut self, off: u8, val: Option<u8>) -> u8 {
        let write = val.is_some();
        let f = &mut self.flags;
        match off {
            0x00..=0x0B if write => {
                let on = off & 0x01 != 0;
                match off >> 1 {
                    0 => f.store80 = on,
                    1 => f.aux_ram_read = on,
                    2 => f.aux_ram_write = on,
                    3 => f.intcxrom = on,
                    4 => f.altzp = on,
                    _ => f.slot3rom = on,
                }
                log::debug!("mmu: ${:04X} write {:?}", 0xC000 | off as u16, self.flags);
                self.update_banks();
                0x00
            }
            0x11..=0x1F if !write => {
                let video = *self.video.borrow();
                let status = match off {
                    0x11 => !self.switch.bank1,
                    0x12 => self.switch.readbsr,
                    0x13 => f.aux_ram_read,
                    0x14 => f.aux_ram_write,
                    0x15 => f.intcxrom,
                    0x16 => f.altzp,
                    0x17 => f.slot3rom,
                    0x18 => f.store80,
                    0x19 => self.clock.get() < self.vb_end,
                    0x1A => video.text,
                    0x1B => video.mixed,
                    0x1C => f.page2,
                    0x1D => f.hires,
                    0x1E => video.altchar,
                    _ => video.col80,
                };
                bit7(status) | (self.io.borrow().keyboard() & 0x7F)
            }
            0x54 | 0x55 => {
                f.page2 = off == 0x55;
                let store80 = f.store80;
                self.update_banks();
                if !store80 {
                    self.io.borrow_mut().access(off, val);
                }
                0x00
            }
            0x56 | 0x57 => {
                f.hires = off == 0x57;
                self.update_banks();
                self.io.borrow_mut().access(off, val)
            }
            // IOUDIS中はDHIRES、それ以外はアナンシエータ3
            0x5E | 0x5F if f.iou_disable => {
                self.video.borrow_mut().dhires = off == 0x5E;
                0x00
            }
            0x7E | 0x7F if write => {
                f.iou_disable = off == 0x7E;
                0x00
            }
            0x7E if !write => bit7(f.iou_disable),
            0x7F if !write => bit7(self.video.borrow().dhires),
            0x80..=0x8F => {
                self.switch.access(off, write);
                self.update_banks();
                0x00
            }
            _ => self.io.borrow_mut().access(off, val),
        }
    }

    pub fn get_state(&self) -> MmuState {
        MmuState {
            switch: self.switch,
            flags: self.flags,
            main: self.main.get_state(),
            aux: self.aux.get_state(),
            main_bank1: self.main_lc.bank1.get_state(),
            main_bank2: self.main_lc.bank2.get_state(),
            main_high: self.main_lc.high.get_state(),
            aux_bank1: self.aux_lc.bank1.get_state(),
            aux_bank2: self.aux_lc.bank2.get_state(),
            aux_high: self.aux_lc.high.get_state(),
        }
    }

    /// 復元後すぐにページ割り当てを再計算する
    pub fn set_state(&mut self, state: &MmuState) -> Result<(), StateError> {
        self.main.set_state(&state.main)?;
        self.aux.set_state(&state.aux)?;
        self.main_lc.bank1.set_state(&state.main_bank1)?;
        self.main_lc.bank2.set_state(&state.main_bank2)?;
        self.main_lc.high.set_state(&state.main_high)?;
        self.aux_lc.bank1.set_state(&state.aux_bank1)?;
        self.aux_lc.bank2.set_state(&state.aux_bank2)?;
        self.aux_lc.high.set_state(&state.aux_high)?;
        self.switch = state.switch;
        self.flags = state.flags;
        self.update_banks();
        Ok(())
    }
}

impl Memory for Mmu {
    fn start(&self) -> u8 {
        0x00
    }

    fn end(&self) -> u8 {
        0xFF
    }

    fn read(&mut self, page: u8, off: u8) -> u8 {
        match page {
            0xC0 => self.access(off, None),
            0xC1..=0xCF => {
                self.cx_access(page, off);
                self.read_source(self.read_map[page as usize], page, off)
            }
            _ => self.read_source(self.read_map[page as usize], page, off),
        }
    }

    fn write(&mut self, page: u8, off: u8, val: u8) {
        match page {
            0xC0 => {
                self.access(off, Some(val));
            }
            0xC1..=0xCF => {
                self.cx_access(page, off);
                self.write_source(self.write_map[page as usize], page, off, val);
            }
            _ => self.write_source(self.write_map[page as usize], page, off, val),
        }
    }

    fn reset(&mut self) {
        self.switch.reset();
        self.flags = MmuFlags::default();
        self.update_banks();
        self.io.borrow_mut().reset();
        log::debug!("mmu: reset");
    }

    fn tick(&mut self) {
        self.io.borrow_mut().tick();
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::VideoModes;
    use std::cell::Cell;

    fn setup() -> (Mmu, Clock) {
        let clock: Clock = Rc::new(Cell::new(0));
        let video = Rc::new(RefCell::new(VideoModes::default()));
        let io = Rc::new(RefCell::new(Io::new(video, clock.clone(), true)));
        let mut rom = vec![0u8; 0x4000];
        for (i, b) in rom.iter_mut().enumerate() {
            *b = (i >> 8) as u8 | 0x80;
        }
        let mut mmu = Mmu::new(io, clock.clone(), &rom);
        mmu.reset();
        (mmu, clock)
    }

    #[test]
    fn test_aux_ram_switches() {
        let (mut mmu, _) = setup();
        mmu.write(0x20, 0x00, 0x11);
        mmu.write(0xC0, 0x05, 0); // RAMWRT on
        mmu.write(0x20, 0x00, 0x22);
        assert_eq!(mmu.read(0x20, 0x00), 0x11);
        mmu.write(0xC0, 0x03, 0); // RAMRD on
        assert_eq!(mmu.read(0x20, 0x00), 0x22);
        assert_eq!(mmu.read(0xC0, 0x13), 0x80);
        assert_eq!(mmu.read(0xC0, 0x14), 0x80);
        // ゼロページはALTZPのみに従う
        mmu.write(0x00, 0x10, 0x33);
        mmu.write(0xC0, 0x02, 0);
        mmu.write(0xC0, 0x04, 0);
        assert_eq!(mmu.read(0x00, 0x10), 0x33);
    }

    #[test]
    fn test_altzp() {
        let (mut mmu, _) = setup();
        mmu.write(0x01, 0xFF, 0xAA);
        mmu.write(0xC0, 0x09, 0);
        assert_eq!(mmu.read(0x01, 0xFF), 0x00);
        mmu.write(0x01, 0xFF, 0xBB);
        mmu.write(0xC0, 0x08, 0);
        assert_eq!(mmu.read(0x01, 0xFF), 0xAA);
        assert_eq!(mmu.read(0xC0, 0x16), 0x00);
    }

    #[test]
    fn test_80store_page2_selects_aux_text_page() {
        let (mut mmu, _) = setup();
        mmu.write(0xC0, 0x01, 0); // 80STORE on
        mmu.read(0xC0, 0x55); // PAGE2
        mmu.write(0x04, 0x00, 0xC1);
        mmu.write(0x20, 0x00, 0x44);
        mmu.read(0xC0, 0x54);
        assert_eq!(mmu.read(0x04, 0x00), 0x00);
        assert_eq!(mmu.read(0x20, 0x00), 0x44);
        // 表示ページは80STORE中は切り替わらない
        assert!(!mmu.video.borrow().page2);

        mmu.read(0xC0, 0x57); // HIRES
        mmu.read(0xC0, 0x55);
        mmu.write(0x20, 0x00, 0x55);
        mmu.read(0xC0, 0x54);
        assert_eq!(mmu.read(0x20, 0x00), 0x44);
    }

    #[test]
    fn test_language_card_debounce() {
        let (mut mmu, _) = setup();
        assert_eq!(mmu.read(0xD0, 0x00), 0x90);
        mmu.read(0xC0, 0x8B);
        mmu.read(0xC0, 0x8B);
        mmu.write(0xD0, 0x00, 0x42);
        assert_eq!(mmu.read(0xD0, 0x00), 0x42);
        assert_eq!(mmu.read(0xC0, 0x11), 0x00);
        assert_eq!(mmu.read(0xC0, 0x12), 0x80);

        // 1回読み→書き込み では有効にならない
        let (mut mmu, _) = setup();
        mmu.read(0xC0, 0x8B);
        mmu.write(0xC0, 0x8B, 0);
        mmu.write(0xD0, 0x00, 0x42);
        assert_eq!(mmu.read(0xD0, 0x00), 0x00);
    }

    #[test]
    fn test_altzp_selects_aux_language_card() {
        let (mut mmu, _) = setup();
        mmu.read(0xC0, 0x83);
        mmu.read(0xC0, 0x83);
        mmu.write(0xE0, 0x00, 0x01);
        mmu.write(0xC0, 0x09, 0);
        mmu.write(0xE0, 0x00, 0x02);
        assert_eq!(mmu.read(0xE0, 0x00), 0x02);
        mmu.write(0xC0, 0x08, 0);
        assert_eq!(mmu.read(0xE0, 0x00), 0x01);
    }

    #[test]
    fn test_internal_rom_switches() {
        let (mut mmu, _) = setup();
        // 空きスロットは0
        assert_eq!(mmu.read(0xC6, 0x00), 0x00);
        mmu.write(0xC0, 0x07, 0); // INTCXROM on
        assert_eq!(mmu.read(0xC6, 0x00), 0x86);
        assert_eq!(mmu.read(0xC0, 0x15), 0x80);
        mmu.write(0xC0, 0x06, 0);
        assert_eq!(mmu.read(0xC6, 0x00), 0x00);
    }

    #[test]
    fn test_intc8rom_latch() {
        let (mut mmu, _) = setup();
        assert_eq!(mmu.read(0xC8, 0x00), 0x00);
        // SLOTC3ROM off: $C3xxは内部ROMで、$C800も内部ROMになる
        assert_eq!(mmu.read(0xC3, 0x00), 0x83);
        assert!(mmu.flags().intc8rom);
        assert_eq!(mmu.read(0xC8, 0x00), 0x88);
        mmu.read(0xCF, 0xFF);
        assert!(!mmu.flags().intc8rom);
        assert_eq!(mmu.read(0xC8, 0x00), 0x00);

        mmu.write(0xC0, 0x0B, 0); // SLOTC3ROM on
        mmu.read(0xC3, 0x00);
        assert!(!mmu.flags().intc8rom);
    }

    #[test]
    fn test_vertical_blank() {
        let (mut mmu, clock) = setup();
        clock.set(5000);
        mmu.reset_vb();
        clock.set(5999);
        assert_eq!(mmu.read(0xC0, 0x19) & 0x80, 0x80);
        clock.set(6000);
        assert_eq!(mmu.read(0xC0, 0x19) & 0x80, 0x00);
    }

    #[test]
    fn test_dhires_follows_iou_disable() {
        let (mut mmu, _) = setup();
        // リセット直後はIOUDIS有効
        assert_eq!(mmu.read(0xC0, 0x7E), 0x80);
        mmu.write(0xC0, 0x0D, 0);
        mmu.write(0xC0, 0x5E, 0);
        assert!(mmu.video.borrow().dhires);
        assert_eq!(mmu.read(0xC0, 0x7F), 0x80);
        mmu.read(0xC0, 0x5F);
        assert!(!mmu.video.borrow().dhires);
        assert!(!mmu.io.borrow().annunciator(3));

        // IOUDIS無効ならアナンシエータ3へ
        mmu.write(0xC0, 0x7F, 0);
        mmu.read(0xC0, 0x5F);
        assert!(mmu.io.borrow().annunciator(3));
        mmu.read(0xC0, 0x5E);
        assert!(!mmu.io.borrow().annunciator(3));
        assert!(!mmu.video.borrow().dhires);
        assert_eq!(mmu.read(0xC0, 0x7E), 0x00);
    }

    #[test]
    fn test_state_roundtrip_rebuilds_maps() {
        let (mut mmu, _) = setup();
        mmu.write(0xC0, 0x05, 0);
        mmu.write(0x30, 0x00, 0x99);
        mmu.read(0xC0, 0x83);
        mmu.read(0xC0, 0x83);
        mmu.write(0xD1, 0x00, 0x77);
        let state = mmu.get_state();

        let (mut other, _) = setup();
        other.set_state(&state).unwrap();
        assert_eq!(other.flags(), mmu.flags());
        assert_eq!(other.read(0xD1, 0x00), 0x77);
        other.write(0xC0, 0x03, 0);
        assert_eq!(other.read(0x30, 0x00), 0x99);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let (mut mmu, _) = setup();
        mmu.write(0xC0, 0x09, 0);
        mmu.read(0xC0, 0x8B);
        mmu.reset();
        assert_eq!(mmu.flags(), MmuFlags::default());
        assert_eq!(mmu.bank_switch(), BankSwitch::default());
        assert_eq!(mmu.read(0xFF, 0xFC), 0xBF | 0x80);
    }
}
