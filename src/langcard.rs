//! Language card
//!
//! $C080-$C08F の16KBランゲージカード。書き込み許可は同じ
//! 書き込みスイッチを2回連続で読んだ時だけ有効になる（デバウンス）。
//! IIeのMMUも `BankSwitch` を共有する。

use crate::memory::{Capabilities, Memory, Ram, RamState, Rom, StateError};
use serde::{Deserialize, Serialize};

/// バンク切り替えの状態
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankSwitch {
    /// $D000 にバンク1を出す
    pub bank1: bool,
    /// $D000-$FFFF の読み取りをRAMから
    pub readbsr: bool,
    /// $D000-$FFFF の書き込みをRAMへ
    pub writebsr: bool,
    /// 書き込みスイッチを1回読んだ
    pub prewrite: bool,
}

impl BankSwitch {
    /// $C08x へのアクセス
    ///
    /// bit 0: 書き込みスイッチ、bit 1: 読み取り側のROM/RAM反転、bit 3: バンク1
    pub fn access(&mut self, off: u8, write: bool) {
        let write_switch = off & 0x01 != 0;
        let off_switch = off & 0x02 != 0;
        let bank1_switch = off & 0x08 != 0;

        if write_switch {
            if write {
                self.prewrite = false;
            } else {
                if self.prewrite {
                    self.writebsr = true;
                }
                self.prewrite = true;
            }
            self.readbsr = off_switch;
        } else {
            self.writebsr = false;
            self.prewrite = false;
            self.readbsr = !off_switch;
        }
        self.bank1 = bank1_switch;

        log::trace!(
            "langcard: ${:02X} {} bank{} read={} write={}",
            0x80 | (off & 0x0F),
            if write { "W" } else { "R" },
            if self.bank1 { 1 } else { 2 },
            self.readbsr,
            self.writebsr
        );
    }

    pub fn reset(&mut self) {
        *self = BankSwitch::default();
    }
}

/// II/II+用のランゲージカード（スロット0、$D0-$FF）
pub struct LanguageCard {
    switch: BankSwitch,
    rom: Rom,
    /// $D000 バンク1
    bank1: Ram,
    /// $D000 バンク2
    bank2: Ram,
    /// $E000-$FFFF
    ram: Ram,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageCardState {
    pub switch: BankSwitch,
    pub bank1: RamState,
    pub bank2: RamState,
    pub ram: RamState,
}

impl LanguageCard {
    /// `rom` は $D000-$FFFF の12KB
    pub fn new(rom: &[u8]) -> Self {
        LanguageCard {
            switch: BankSwitch::default(),
            rom: Rom::new(0xD0, 0xFF, rom),
            bank1: Ram::new(0xD0, 0xDF),
            bank2: Ram::new(0xD0, 0xDF),
            ram: Ram::new(0xE0, 0xFF),
        }
    }

    pub fn load_rom(&mut self, rom: &[u8]) {
        self.rom = Rom::new(0xD0, 0xFF, rom);
    }

    pub fn switch(&self) -> BankSwitch {
        self.switch
    }

    fn bank_for(&mut self, page: u8) -> &mut Ram {
        if page >= 0xE0 {
            &mut self.ram
        } else if self.switch.bank1 {
            &mut self.bank1
        } else {
            &mut self.bank2
        }
    }

    pub fn get_state(&self) -> LanguageCardState {
        LanguageCardState {
            switch: self.switch,
            bank1: self.bank1.get_state(),
            bank2: self.bank2.get_state(),
            ram: self.ram.get_state(),
        }
    }

    pub fn set_state(&mut self, state: &LanguageCardState) -> Result<(), StateError> {
        self.bank1.set_state(&state.bank1)?;
        self.bank2.set_state(&state.bank2)?;
        self.ram.set_state(&state.ram)?;
        self.switch = state.switch;
        Ok(())
    }
}

impl Memory for LanguageCard {
    fn start(&self) -> u8 {
        0xD0
    }

    fn end(&self) -> u8 {
        0xFF
    }

    fn read(&mut self, page: u8, off: u8) -> u8 {
        if self.switch.readbsr {
            self.bank_for(page).read(page, off)
        } else {
            self.rom.read(page, off)
        }
    }

    fn write(&mut self, page: u8, off: u8, val: u8) {
        if self.switch.writebsr {
            self.bank_for(page).write(page, off, val);
        }
    }

    fn reset(&mut self) {
        self.switch.reset();
    }

    fn io_switch(&mut self, off: u8, val: Option<u8>) -> Option<u8> {
        self.switch.access(off, val.is_some());
        None
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::WRITE | Capabilities::RESET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> LanguageCard {
        LanguageCard::new(&[0xEA; 0x3000])
    }

    #[test]
    fn test_double_read_enables_write() {
        let mut lc = card();
        lc.io_switch(0x0B, None);
        lc.io_switch(0x0B, None);
        lc.write(0xD0, 0x00, 0x42);
        assert_eq!(lc.read(0xD0, 0x00), 0x42);
        assert!(lc.switch().bank1);
    }

    #[test]
    fn test_read_then_write_does_not_enable() {
        let mut lc = card();
        lc.io_switch(0x0B, None);
        lc.io_switch(0x0B, Some(0));
        assert!(!lc.switch().writebsr);
        lc.write(0xD0, 0x00, 0x42);
        assert_eq!(lc.read(0xD0, 0x00), 0x00);
    }

    #[test]
    fn test_reassert_keeps_write_enabled() {
        let mut lc = card();
        for _ in 0..5 {
            lc.io_switch(0x03, None);
        }
        assert!(lc.switch().writebsr);
        lc.io_switch(0x03, Some(0));
        assert!(lc.switch().writebsr);
        assert!(!lc.switch().prewrite);
    }

    #[test]
    fn test_rom_read_write_ram() {
        let mut lc = card();
        // $C081 x2: ROM読み取り、RAM書き込み
        lc.io_switch(0x01, None);
        lc.io_switch(0x01, None);
        lc.write(0xF0, 0x00, 0x11);
        assert_eq!(lc.read(0xF0, 0x00), 0xEA);
        // $C080: RAM読み取り、書き込み禁止
        lc.io_switch(0x00, None);
        assert_eq!(lc.read(0xF0, 0x00), 0x11);
        assert!(!lc.switch().writebsr);
    }

    #[test]
    fn test_banks_are_separate() {
        let mut lc = card();
        lc.io_switch(0x03, None);
        lc.io_switch(0x03, None);
        lc.write(0xD0, 0x10, 0x22);
        lc.io_switch(0x0B, None);
        lc.io_switch(0x0B, None);
        lc.write(0xD0, 0x10, 0x11);
        assert_eq!(lc.read(0xD0, 0x10), 0x11);
        lc.io_switch(0x03, None);
        assert_eq!(lc.read(0xD0, 0x10), 0x22);
    }

    #[test]
    fn test_reset_selects_rom() {
        let mut lc = card();
        lc.io_switch(0x03, None);
        lc.reset();
        assert_eq!(lc.switch(), BankSwitch::default());
        assert_eq!(lc.read(0xFF, 0xFF), 0xEA);
    }
}
