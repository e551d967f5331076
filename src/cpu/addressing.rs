//! アドレッシングモードの実装
//!
//! オペランドの解決は3種類：値を読む（read系命令）、アドレスを返す
//! （store/RMW/ジャンプ系）、分岐。ページ跨ぎペナルティは読み取り時のみ。

use super::Cpu;
use serde::{Deserialize, Serialize};

/// アドレッシングモードの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressingMode {
    /// 暗黙的
    Implied,
    /// アキュムレータ - A
    Accumulator,
    /// 即値 - #$nn
    Immediate,
    /// 相対（ブランチ命令用） - $nn
    Relative,
    /// ゼロページ - $nn
    ZeroPage,
    /// ゼロページ,X - $nn,X
    ZeroPageX,
    /// ゼロページ,Y - $nn,Y
    ZeroPageY,
    /// 絶対 - $nnnn
    Absolute,
    /// 絶対,X - $nnnn,X
    AbsoluteX,
    /// 絶対,Y - $nnnn,Y
    AbsoluteY,
    /// 間接 - ($nnnn)
    Indirect,
    /// 間接,X（プリインデックス） - ($nn,X)
    IndirectX,
    /// 間接,Y（ポストインデックス） - ($nn),Y
    IndirectY,
    /// 間接（ゼロページ、65C02のみ） - ($nn)
    IndirectZeroPage,
    /// 絶対インデックス間接（65C02のみ） - ($nnnn,X)
    AbsoluteIndexedIndirect,
    /// ゼロページ＋相対（BBR/BBS） - $nn,$rr
    ZeroPageRelative,
}

impl AddressingMode {
    /// オペランドのバイト数
    pub fn operand_bytes(self) -> u16 {
        use AddressingMode::*;
        match self {
            Implied | Accumulator => 0,
            Immediate | Relative | ZeroPage | ZeroPageX | ZeroPageY | IndirectX | IndirectY
            | IndirectZeroPage => 1,
            Absolute | AbsoluteX | AbsoluteY | Indirect | AbsoluteIndexedIndirect
            | ZeroPageRelative => 2,
        }
    }
}

impl Cpu {
    /// ベースにインデックスを加算。`penalty` ならページ跨ぎで+1サイクル
    fn indexed(&mut self, base: u16, index: u8, penalty: bool) -> u16 {
        let addr = base.wrapping_add(index as u16);
        if penalty && (addr ^ base) & 0xFF00 != 0 {
            self.cycles += 1;
        }
        addr
    }

    /// ゼロページ上のポインタ（上位バイトもゼロページ内で折り返す）
    fn read_zp_word(&self, zp: u8) -> u16 {
        let lo = self.read_byte(zp as u16) as u16;
        let hi = self.read_byte(zp.wrapping_add(1) as u16) as u16;
        hi << 8 | lo
    }

    /// 実効アドレスを解決（ペナルティなし）
    pub(super) fn operand_address(&mut self, mode: AddressingMode) -> u16 {
        use AddressingMode::*;
        match mode {
            Immediate => {
                let addr = self.regs.pc;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                addr
            }
            ZeroPage => self.fetch_byte() as u16,
            ZeroPageX => self.fetch_byte().wrapping_add(self.regs.x) as u16,
            ZeroPageY => self.fetch_byte().wrapping_add(self.regs.y) as u16,
            Absolute => self.fetch_word(),
            AbsoluteX => {
                let base = self.fetch_word();
                self.indexed(base, self.regs.x, false)
            }
            AbsoluteY => {
                let base = self.fetch_word();
                self.indexed(base, self.regs.y, false)
            }
            IndirectX => {
                let zp = self.fetch_byte().wrapping_add(self.regs.x);
                self.read_zp_word(zp)
            }
            IndirectY => {
                let zp = self.fetch_byte();
                let base = self.read_zp_word(zp);
                self.indexed(base, self.regs.y, false)
            }
            IndirectZeroPage => {
                let zp = self.fetch_byte();
                self.read_zp_word(zp)
            }
            Indirect => {
                let ptr = self.fetch_word();
                if self.is_65c02() {
                    self.read_word(ptr)
                } else {
                    // NMOS: ($xxFF) の上位バイトは同じページの$xx00から
                    let lo = self.read_byte(ptr) as u16;
                    let hi = self.read_byte((ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF)) as u16;
                    hi << 8 | lo
                }
            }
            AbsoluteIndexedIndirect => {
                let ptr = self.fetch_word().wrapping_add(self.regs.x as u16);
                self.read_word(ptr)
            }
            Implied | Accumulator | Relative | ZeroPageRelative => 0,
        }
    }

    /// オペランド値を読む（インデックス系はページ跨ぎで+1）
    pub(super) fn read_operand(&mut self, mode: AddressingMode) -> u8 {
        use AddressingMode::*;
        let addr = match mode {
            Immediate => return self.fetch_byte(),
            AbsoluteX => {
                let base = self.fetch_word();
                self.indexed(base, self.regs.x, true)
            }
            AbsoluteY => {
                let base = self.fetch_word();
                self.indexed(base, self.regs.y, true)
            }
            IndirectY => {
                let zp = self.fetch_byte();
                let base = self.read_zp_word(zp);
                self.indexed(base, self.regs.y, true)
            }
            _ => self.operand_address(mode),
        };
        self.read_byte(addr)
    }

    /// シフト/ローテート命令の対象アドレス
    ///
    /// 65C02の abs,X は6サイクル＋ページ跨ぎ。
    pub(super) fn shift_address(&mut self, mode: AddressingMode) -> u16 {
        if mode == AddressingMode::AbsoluteX && self.is_65c02() {
            let base = self.fetch_word();
            self.indexed(base, self.regs.x, true)
        } else {
            self.operand_address(mode)
        }
    }

    /// 相対分岐
    ///
    /// 成立で+1、次の命令とページが異なれば更に+1。
    pub(super) fn branch(&mut self, condition: bool) {
        let offset = self.fetch_byte() as i8;
        if condition {
            let next = self.regs.pc;
            let target = next.wrapping_add(offset as i16 as u16);
            self.cycles += 1;
            if (next ^ target) & 0xFF00 != 0 {
                self.cycles += 1;
            }
            self.regs.pc = target;
        }
    }
}
