//! Opcode descriptor tables
//!
//! 6502の256エントリ表と、それに差分を重ねた65C02表。
//! 未定義オペコードは6502では1サイクルの無動作、65C02では2サイクルのNOP。

use super::addressing::AddressingMode::{self, *};
use super::Cpu;

/// 命令の実行関数
pub type Exec = fn(&mut Cpu, AddressingMode);

/// オペコード表の1エントリ
#[derive(Clone, Copy)]
pub struct Opcode {
    pub name: &'static str,
    pub exec: Exec,
    pub mode: AddressingMode,
    /// 基本サイクル数
    pub cycles: u8,
}

impl Opcode {
    /// 未定義オペコードか
    pub const fn is_undefined(&self) -> bool {
        let name = self.name.as_bytes();
        name.len() == 3 && name[0] == b'?'
    }

    /// オペコードを含む命令長
    pub fn size_bytes(&self) -> u16 {
        1 + self.mode.operand_bytes()
    }
}

impl std::fmt::Debug for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Opcode")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("cycles", &self.cycles)
            .finish()
    }
}

const fn op(name: &'static str, exec: Exec, mode: AddressingMode, cycles: u8) -> Opcode {
    Opcode {
        name,
        exec,
        mode,
        cycles,
    }
}

const UNDEFINED_6502: Opcode = op("???", Cpu::unknown, Implied, 1);
const UNDEFINED_65C02: Opcode = op("???", Cpu::nop, Implied, 2);

const BASE: [Opcode; 256] = base_table();

pub static OPCODES_6502: [Opcode; 256] = BASE;
pub static OPCODES_65C02: [Opcode; 256] = cmos_table(BASE);

const fn base_table() -> [Opcode; 256] {
    let mut t = [UNDEFINED_6502; 256];

    t[0x69] = op("ADC", Cpu::adc, Immediate, 2);
    t[0x65] = op("ADC", Cpu::adc, ZeroPage, 3);
    t[0x75] = op("ADC", Cpu::adc, ZeroPageX, 4);
    t[0x6D] = op("ADC", Cpu::adc, Absolute, 4);
    t[0x7D] = op("ADC", Cpu::adc, AbsoluteX, 4);
    t[0x79] = op("ADC", Cpu::adc, AbsoluteY, 4);
    t[0x61] = op("ADC", Cpu::adc, IndirectX, 6);
    t[0x71] = op("ADC", Cpu::adc, IndirectY, 5);

    t[0x29] = op("AND", Cpu::and, Immediate, 2);
    t[0x25] = op("AND", Cpu::and, ZeroPage, 3);
    t[0x35] = op("AND", Cpu::and, ZeroPageX, 4);
    t[0x2D] = op("AND", Cpu::and, Absolute, 4);
    t[0x3D] = op("AND", Cpu::and, AbsoluteX, 4);
    t[0x39] = op("AND", Cpu::and, AbsoluteY, 4);
    t[0x21] = op("AND", Cpu::and, IndirectX, 6);
    t[0x31] = op("AND", Cpu::and, IndirectY, 5);

    t[0x0A] = op("ASL", Cpu::asl, Accumulator, 2);
    t[0x06] = op("ASL", Cpu::asl, ZeroPage, 5);
    t[0x16] = op("ASL", Cpu::asl, ZeroPageX, 6);
    t[0x0E] = op("ASL", Cpu::asl, Absolute, 6);
    t[0x1E] = op("ASL", Cpu::asl, AbsoluteX, 7);

    t[0x10] = op("BPL", Cpu::bpl, Relative, 2);
    t[0x30] = op("BMI", Cpu::bmi, Relative, 2);
    t[0x50] = op("BVC", Cpu::bvc, Relative, 2);
    t[0x70] = op("BVS", Cpu::bvs, Relative, 2);
    t[0x90] = op("BCC", Cpu::bcc, Relative, 2);
    t[0xB0] = op("BCS", Cpu::bcs, Relative, 2);
    t[0xD0] = op("BNE", Cpu::bne, Relative, 2);
    t[0xF0] = op("BEQ", Cpu::beq, Relative, 2);

    t[0x24] = op("BIT", Cpu::bit, ZeroPage, 3);
    t[0x2C] = op("BIT", Cpu::bit, Absolute, 4);

    t[0x00] = op("BRK", Cpu::brk, Implied, 7);

    t[0x18] = op("CLC", Cpu::clc, Implied, 2);
    t[0xD8] = op("CLD", Cpu::cld, Implied, 2);
    t[0x58] = op("CLI", Cpu::cli, Implied, 2);
    t[0xB8] = op("CLV", Cpu::clv, Implied, 2);
    t[0x38] = op("SEC", Cpu::sec, Implied, 2);
    t[0xF8] = op("SED", Cpu::sed, Implied, 2);
    t[0x78] = op("SEI", Cpu::sei, Implied, 2);

    t[0xC9] = op("CMP", Cpu::cmp, Immediate, 2);
    t[0xC5] = op("CMP", Cpu::cmp, ZeroPage, 3);
    t[0xD5] = op("CMP", Cpu::cmp, ZeroPageX, 4);
    t[0xCD] = op("CMP", Cpu::cmp, Absolute, 4);
    t[0xDD] = op("CMP", Cpu::cmp, AbsoluteX, 4);
    t[0xD9] = op("CMP", Cpu::cmp, AbsoluteY, 4);
    t[0xC1] = op("CMP", Cpu::cmp, IndirectX, 6);
    t[0xD1] = op("CMP", Cpu::cmp, IndirectY, 5);

    t[0xE0] = op("CPX", Cpu::cpx, Immediate, 2);
    t[0xE4] = op("CPX", Cpu::cpx, ZeroPage, 3);
    t[0xEC] = op("CPX", Cpu::cpx, Absolute, 4);
    t[0xC0] = op("CPY", Cpu::cpy, Immediate, 2);
    t[0xC4] = op("CPY", Cpu::cpy, ZeroPage, 3);
    t[0xCC] = op("CPY", Cpu::cpy, Absolute, 4);

    t[0xC6] = op("DEC", Cpu::dec, ZeroPage, 5);
    t[0xD6] = op("DEC", Cpu::dec, ZeroPageX, 6);
    t[0xCE] = op("DEC", Cpu::dec, Absolute, 6);
    t[0xDE] = op("DEC", Cpu::dec, AbsoluteX, 7);
    t[0xCA] = op("DEX", Cpu::dex, Implied, 2);
    t[0x88] = op("DEY", Cpu::dey, Implied, 2);

    t[0xE6] = op("INC", Cpu::inc, ZeroPage, 5);
    t[0xF6] = op("INC", Cpu::inc, ZeroPageX, 6);
    t[0xEE] = op("INC", Cpu::inc, Absolute, 6);
    t[0xFE] = op("INC", Cpu::inc, AbsoluteX, 7);
    t[0xE8] = op("INX", Cpu::inx, Implied, 2);
    t[0xC8] = op("INY", Cpu::iny, Implied, 2);

    t[0x49] = op("EOR", Cpu::eor, Immediate, 2);
    t[0x45] = op("EOR", Cpu::eor, ZeroPage, 3);
    t[0x55] = op("EOR", Cpu::eor, ZeroPageX, 4);
    t[0x4D] = op("EOR", Cpu::eor, Absolute, 4);
    t[0x5D] = op("EOR", Cpu::eor, AbsoluteX, 4);
    t[0x59] = op("EOR", Cpu::eor, AbsoluteY, 4);
    t[0x41] = op("EOR", Cpu::eor, IndirectX, 6);
    t[0x51] = op("EOR", Cpu::eor, IndirectY, 5);

    t[0x4C] = op("JMP", Cpu::jmp, Absolute, 3);
    t[0x6C] = op("JMP", Cpu::jmp, Indirect, 5);
    t[0x20] = op("JSR", Cpu::jsr, Absolute, 6);
    t[0x60] = op("RTS", Cpu::rts, Implied, 6);
    t[0x40] = op("RTI", Cpu::rti, Implied, 6);

    t[0xA9] = op("LDA", Cpu::lda, Immediate, 2);
    t[0xA5] = op("LDA", Cpu::lda, ZeroPage, 3);
    t[0xB5] = op("LDA", Cpu::lda, ZeroPageX, 4);
    t[0xAD] = op("LDA", Cpu::lda, Absolute, 4);
    t[0xBD] = op("LDA", Cpu::lda, AbsoluteX, 4);
    t[0xB9] = op("LDA", Cpu::lda, AbsoluteY, 4);
    t[0xA1] = op("LDA", Cpu::lda, IndirectX, 6);
    t[0xB1] = op("LDA", Cpu::lda, IndirectY, 5);

    t[0xA2] = op("LDX", Cpu::ldx, Immediate, 2);
    t[0xA6] = op("LDX", Cpu::ldx, ZeroPage, 3);
    t[0xB6] = op("LDX", Cpu::ldx, ZeroPageY, 4);
    t[0xAE] = op("LDX", Cpu::ldx, Absolute, 4);
    t[0xBE] = op("LDX", Cpu::ldx, AbsoluteY, 4);

    t[0xA0] = op("LDY", Cpu::ldy, Immediate, 2);
    t[0xA4] = op("LDY", Cpu::ldy, ZeroPage, 3);
    t[0xB4] = op("LDY", Cpu::ldy, ZeroPageX, 4);
    t[0xAC] = op("LDY", Cpu::ldy, Absolute, 4);
    t[0xBC] = op("LDY", Cpu::ldy, AbsoluteX, 4);

    t[0x4A] = op("LSR", Cpu::lsr, Accumulator, 2);
    t[0x46] = op("LSR", Cpu::lsr, ZeroPage, 5);
    t[0x56] = op("LSR", Cpu::lsr, ZeroPageX, 6);
    t[0x4E] = op("LSR", Cpu::lsr, Absolute, 6);
    t[0x5E] = op("LSR", Cpu::lsr, AbsoluteX, 7);

    t[0xEA] = op("NOP", Cpu::nop, Implied, 2);

    t[0x09] = op("ORA", Cpu::ora, Immediate, 2);
    t[0x05] = op("ORA", Cpu::ora, ZeroPage, 3);
    t[0x15] = op("ORA", Cpu::ora, ZeroPageX, 4);
    t[0x0D] = op("ORA", Cpu::ora, Absolute, 4);
    t[0x1D] = op("ORA", Cpu::ora, AbsoluteX, 4);
    t[0x19] = op("ORA", Cpu::ora, AbsoluteY, 4);
    t[0x01] = op("ORA", Cpu::ora, IndirectX, 6);
    t[0x11] = op("ORA", Cpu::ora, IndirectY, 5);

    t[0x48] = op("PHA", Cpu::pha, Implied, 3);
    t[0x08] = op("PHP", Cpu::php, Implied, 3);
    t[0x68] = op("PLA", Cpu::pla, Implied, 4);
    t[0x28] = op("PLP", Cpu::plp, Implied, 4);

    t[0x2A] = op("ROL", Cpu::rol, Accumulator, 2);
    t[0x26] = op("ROL", Cpu::rol, ZeroPage, 5);
    t[0x36] = op("ROL", Cpu::rol, ZeroPageX, 6);
    t[0x2E] = op("ROL", Cpu::rol, Absolute, 6);
    t[0x3E] = op("ROL", Cpu::rol, AbsoluteX, 7);

    t[0x6A] = op("ROR", Cpu::ror, Accumulator, 2);
    t[0x66] = op("ROR", Cpu::ror, ZeroPage, 5);
    t[0x76] = op("ROR", Cpu::ror, ZeroPageX, 6);
    t[0x6E] = op("ROR", Cpu::ror, Absolute, 6);
    t[0x7E] = op("ROR", Cpu::ror, AbsoluteX, 7);

    t[0xE9] = op("SBC", Cpu::sbc, Immediate, 2);
    t[0xE5] = op("SBC", Cpu::sbc, ZeroPage, 3);
    t[0xF5] = op("SBC", Cpu::sbc, ZeroPageX, 4);
    t[0xED] = op("SBC", Cpu::sbc, Absolute, 4);
    t[0xFD] = op("SBC", Cpu::sbc, AbsoluteX, 4);
    t[0xF9] = op("SBC", Cpu::sbc, AbsoluteY, 4);
    t[0xE1] = op("SBC", Cpu::sbc, IndirectX, 6);
    t[0xF1] = op("SBC", Cpu::sbc, IndirectY, 5);

    t[0x85] = op("STA", Cpu::sta, ZeroPage, 3);
    t[0x95] = op("STA", Cpu::sta, ZeroPageX, 4);
    t[0x8D] = op("STA", Cpu::sta, Absolute, 4);
    t[0x9D] = op("STA", Cpu::sta, AbsoluteX, 5);
    t[0x99] = op("STA", Cpu::sta, AbsoluteY, 5);
    t[0x81] = op("STA", Cpu::sta, IndirectX, 6);
    t[0x91] = op("STA", Cpu::sta, IndirectY, 6);

    t[0x86] = op("STX", Cpu::stx, ZeroPage, 3);
    t[0x96] = op("STX", Cpu::stx, ZeroPageY, 4);
    t[0x8E] = op("STX", Cpu::stx, Absolute, 4);
    t[0x84] = op("STY", Cpu::sty, ZeroPage, 3);
    t[0x94] = op("STY", Cpu::sty, ZeroPageX, 4);
    t[0x8C] = op("STY", Cpu::sty, Absolute, 4);

    t[0xAA] = op("TAX", Cpu::tax, Implied, 2);
    t[0xA8] = op("TAY", Cpu::tay, Implied, 2);
    t[0xBA] = op("TSX", Cpu::tsx, Implied, 2);
    t[0x8A] = op("TXA", Cpu::txa, Implied, 2);
    t[0x9A] = op("TXS", Cpu::txs, Implied, 2);
    t[0x98] = op("TYA", Cpu::tya, Implied, 2);

    t
}

/// 6502表に65C02の追加・変更を重ねる
const fn cmos_table(base: [Opcode; 256]) -> [Opcode; 256] {
    let mut t = base;

    let mut i = 0;
    while i < 256 {
        if t[i].is_undefined() {
            t[i] = UNDEFINED_65C02;
        }
        i += 1;
    }

    // ($zp)
    t[0x12] = op("ORA", Cpu::ora, IndirectZeroPage, 5);
    t[0x32] = op("AND", Cpu::and, IndirectZeroPage, 5);
    t[0x52] = op("EOR", Cpu::eor, IndirectZeroPage, 5);
    t[0x72] = op("ADC", Cpu::adc, IndirectZeroPage, 5);
    t[0x92] = op("STA", Cpu::sta, IndirectZeroPage, 5);
    t[0xB2] = op("LDA", Cpu::lda, IndirectZeroPage, 5);
    t[0xD2] = op("CMP", Cpu::cmp, IndirectZeroPage, 5);
    t[0xF2] = op("SBC", Cpu::sbc, IndirectZeroPage, 5);

    t[0x89] = op("BIT", Cpu::bit, Immediate, 2);
    t[0x34] = op("BIT", Cpu::bit, ZeroPageX, 4);
    t[0x3C] = op("BIT", Cpu::bit, AbsoluteX, 4);

    t[0x80] = op("BRA", Cpu::bra, Relative, 2);

    t[0x1A] = op("INC", Cpu::inc, Accumulator, 2);
    t[0x3A] = op("DEC", Cpu::dec, Accumulator, 2);

    // ($xxFF) のバグ修正で1サイクル増える
    t[0x6C] = op("JMP", Cpu::jmp, Indirect, 6);
    t[0x7C] = op("JMP", Cpu::jmp, AbsoluteIndexedIndirect, 6);

    t[0xDA] = op("PHX", Cpu::phx, Implied, 3);
    t[0x5A] = op("PHY", Cpu::phy, Implied, 3);
    t[0xFA] = op("PLX", Cpu::plx, Implied, 4);
    t[0x7A] = op("PLY", Cpu::ply, Implied, 4);

    t[0x64] = op("STZ", Cpu::stz, ZeroPage, 3);
    t[0x74] = op("STZ", Cpu::stz, ZeroPageX, 4);
    t[0x9C] = op("STZ", Cpu::stz, Absolute, 4);
    t[0x9E] = op("STZ", Cpu::stz, AbsoluteX, 5);

    t[0x04] = op("TSB", Cpu::tsb, ZeroPage, 5);
    t[0x0C] = op("TSB", Cpu::tsb, Absolute, 6);
    t[0x14] = op("TRB", Cpu::trb, ZeroPage, 5);
    t[0x1C] = op("TRB", Cpu::trb, Absolute, 6);

    t[0x1E] = op("ASL", Cpu::asl, AbsoluteX, 6);
    t[0x5E] = op("LSR", Cpu::lsr, AbsoluteX, 6);
    t[0x3E] = op("ROL", Cpu::rol, AbsoluteX, 6);
    t[0x7E] = op("ROR", Cpu::ror, AbsoluteX, 6);

    // RMBn/SMBn/BBRn/BBSn
    let mut bit = 0;
    while bit < 8 {
        t[0x07 + bit * 0x10] = op("RMB", Cpu::rmb, ZeroPage, 5);
        t[0x87 + bit * 0x10] = op("SMB", Cpu::smb, ZeroPage, 5);
        t[0x0F + bit * 0x10] = op("BBR", Cpu::bbr, ZeroPageRelative, 5);
        t[0x8F + bit * 0x10] = op("BBS", Cpu::bbs, ZeroPageRelative, 5);
        bit += 1;
    }

    // 複数バイトNOP
    t[0x02] = op("NOP", Cpu::nop, Immediate, 2);
    t[0x22] = op("NOP", Cpu::nop, Immediate, 2);
    t[0x42] = op("NOP", Cpu::nop, Immediate, 2);
    t[0x62] = op("NOP", Cpu::nop, Immediate, 2);
    t[0x82] = op("NOP", Cpu::nop, Immediate, 2);
    t[0xC2] = op("NOP", Cpu::nop, Immediate, 2);
    t[0xE2] = op("NOP", Cpu::nop, Immediate, 2);
    t[0x44] = op("NOP", Cpu::nop, ZeroPage, 3);
    t[0x54] = op("NOP", Cpu::nop, ZeroPageX, 4);
    t[0xD4] = op("NOP", Cpu::nop, ZeroPageX, 4);
    t[0xF4] = op("NOP", Cpu::nop, ZeroPageX, 4);
    t[0x5C] = op("NOP", Cpu::nop, Absolute, 8);
    t[0xDC] = op("NOP", Cpu::nop, Absolute, 4);
    t[0xFC] = op("NOP", Cpu::nop, Absolute, 4);

    t
}
