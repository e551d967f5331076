//! 命令の実装
//!
//! すべて `fn(&mut Cpu, AddressingMode)` の形でオペコード表から呼ばれる。
//! 基本サイクルは表側で加算する。

use super::addressing::AddressingMode;
use super::{Cpu, Status, IRQ_VECTOR};

impl Cpu {
    //--------------------------------------------------
    // ロード/ストア
    //--------------------------------------------------

    pub(super) fn lda(&mut self, mode: AddressingMode) {
        self.regs.a = self.read_operand(mode);
        self.regs.update_zero_negative_flags(self.regs.a);
    }

    pub(super) fn ldx(&mut self, mode: AddressingMode) {
        self.regs.x = self.read_operand(mode);
        self.regs.update_zero_negative_flags(self.regs.x);
    }

    pub(super) fn ldy(&mut self, mode: AddressingMode) {
        self.regs.y = self.read_operand(mode);
        self.regs.update_zero_negative_flags(self.regs.y);
    }

    pub(super) fn sta(&mut self, mode: AddressingMode) {
        let addr = self.operand_address(mode);
        self.write_byte(addr, self.regs.a);
    }

    pub(super) fn stx(&mut self, mode: AddressingMode) {
        let addr = self.operand_address(mode);
        self.write_byte(addr, self.regs.x);
    }

    pub(super) fn sty(&mut self, mode: AddressingMode) {
        let addr = self.operand_address(mode);
        self.write_byte(addr, self.regs.y);
    }

    pub(super) fn stz(&mut self, mode: AddressingMode) {
        let addr = self.operand_address(mode);
        self.write_byte(addr, 0);
    }

    //--------------------------------------------------
    // 算術・論理
    //--------------------------------------------------

    pub(super) fn adc(&mut self, mode: AddressingMode) {
        let value = self.read_operand(mode);
        self.add(value, false);
    }

    pub(super) fn sbc(&mut self, mode: AddressingMode) {
        let value = self.read_operand(mode);
        self.add(value, true);
    }

    /// ADC/SBC共通。Dフラグ時はKEGS方式のBCD補正
    fn add(&mut self, operand: u8, sub: bool) {
        let a = self.regs.a as u16;
        let b = (if sub { operand ^ 0xFF } else { operand }) as u16;
        let carry = self.regs.get_flag(Status::CARRY) as u16;

        let (c, v) = if self.regs.get_flag(Status::DECIMAL) {
            let mut c = (a & 0x0F) + (b & 0x0F) + carry;
            let v;
            if sub {
                if c < 0x10 {
                    c = c.wrapping_sub(0x06) & 0x0F;
                }
                c += (a & 0xF0) + (b & 0xF0);
                v = (c >> 1) ^ c;
                if c < 0x100 {
                    c = (c + 0xA0) & 0xFF;
                }
            } else {
                if c > 0x09 {
                    c = (c - 0x0A) | 0x10;
                }
                c += (a & 0xF0) + (b & 0xF0);
                v = (c >> 1) ^ c;
                if c > 0x99 {
                    c += 0x60;
                }
            }
            if self.is_65c02() {
                self.cycles += 1;
            }
            (c, v)
        } else {
            let c = a + b + carry;
            (c, (c ^ a) & 0x80)
        };
        let v = if (a ^ b) & 0x80 != 0 { 0 } else { v };

        self.regs.set_flag(Status::CARRY, c > 0xFF);
        self.regs.set_flag(Status::OVERFLOW, v & 0x80 != 0);
        self.regs.a = c as u8;
        self.regs.update_zero_negative_flags(self.regs.a);
    }

    pub(super) fn and(&mut self, mode: AddressingMode) {
        self.regs.a &= self.read_operand(mode);
        self.regs.update_zero_negative_flags(self.regs.a);
    }

    pub(super) fn ora(&mut self, mode: AddressingMode) {
        self.regs.a |= self.read_operand(mode);
        self.regs.update_zero_negative_flags(self.regs.a);
    }

    pub(super) fn eor(&mut self, mode: AddressingMode) {
        self.regs.a ^= self.read_operand(mode);
        self.regs.update_zero_negative_flags(self.regs.a);
    }

    /// BIT。即値モード（65C02）はZのみ
    pub(super) fn bit(&mut self, mode: AddressingMode) {
        let value = self.read_operand(mode);
        self.regs.set_flag(Status::ZERO, self.regs.a & value == 0);
        if mode != AddressingMode::Immediate {
            self.regs.set_flag(Status::NEGATIVE, value & 0x80 != 0);
            self.regs.set_flag(Status::OVERFLOW, value & 0x40 != 0);
        }
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.regs.set_flag(Status::CARRY, register >= value);
        self.regs
            .update_zero_negative_flags(register.wrapping_sub(value));
    }

    pub(super) fn cmp(&mut self, mode: AddressingMode) {
        let value = self.read_operand(mode);
        self.compare(self.regs.a, value);
    }

    pub(super) fn cpx(&mut self, mode: AddressingMode) {
        let value = self.read_operand(mode);
        self.compare(self.regs.x, value);
    }

    pub(super) fn cpy(&mut self, mode: AddressingMode) {
        let value = self.read_operand(mode);
        self.compare(self.regs.y, value);
    }

    //--------------------------------------------------
    // シフト・ローテート・インクリメント（RMW）
    //--------------------------------------------------

    /// アキュムレータまたはメモリに `f` を適用し、結果でN/Zを更新
    fn modify<F>(&mut self, mode: AddressingMode, shift: bool, f: F)
    where
        F: FnOnce(&mut Cpu, u8) -> u8,
    {
        if mode == AddressingMode::Accumulator {
            let a = self.regs.a;
            let result = f(self, a);
            self.regs.a = result;
            self.regs.update_zero_negative_flags(result);
        } else {
            let addr = if shift {
                self.shift_address(mode)
            } else {
                self.operand_address(mode)
            };
            let value = self.read_byte(addr);
            let result = f(self, value);
            self.write_byte(addr, result);
            self.regs.update_zero_negative_flags(result);
        }
    }

    pub(super) fn asl(&mut self, mode: AddressingMode) {
        self.modify(mode, true, |cpu, v| {
            cpu.regs.set_flag(Status::CARRY, v & 0x80 != 0);
            v << 1
        });
    }

    pub(super) fn lsr(&mut self, mode: AddressingMode) {
        self.modify(mode, true, |cpu, v| {
            cpu.regs.set_flag(Status::CARRY, v & 0x01 != 0);
            v >> 1
        });
    }

    pub(super) fn rol(&mut self, mode: AddressingMode) {
        self.modify(mode, true, |cpu, v| {
            let carry = cpu.regs.get_flag(Status::CARRY) as u8;
            cpu.regs.set_flag(Status::CARRY, v & 0x80 != 0);
            v << 1 | carry
        });
    }

    pub(super) fn ror(&mut self, mode: AddressingMode) {
        self.modify(mode, true, |cpu, v| {
            let carry = cpu.regs.get_flag(Status::CARRY) as u8;
            cpu.regs.set_flag(Status::CARRY, v & 0x01 != 0);
            v >> 1 | carry << 7
        });
    }

    pub(super) fn inc(&mut self, mode: AddressingMode) {
        self.modify(mode, false, |_, v| v.wrapping_add(1));
    }

    pub(super) fn dec(&mut self, mode: AddressingMode) {
        self.modify(mode, false, |_, v| v.wrapping_sub(1));
    }

    pub(super) fn inx(&mut self, _mode: AddressingMode) {
        self.regs.x = self.regs.x.wrapping_add(1);
        self.regs.update_zero_negative_flags(self.regs.x);
    }

    pub(super) fn iny(&mut self, _mode: AddressingMode) {
        self.regs.y = self.regs.y.wrapping_add(1);
        self.regs.update_zero_negative_flags(self.regs.y);
    }

    pub(super) fn dex(&mut self, _mode: AddressingMode) {
        self.regs.x = self.regs.x.wrapping_sub(1);
        self.regs.update_zero_negative_flags(self.regs.x);
    }

    pub(super) fn dey(&mut self, _mode: AddressingMode) {
        self.regs.y = self.regs.y.wrapping_sub(1);
        self.regs.update_zero_negative_flags(self.regs.y);
    }

    /// TSB（65C02）
    pub(super) fn tsb(&mut self, mode: AddressingMode) {
        let addr = self.operand_address(mode);
        let value = self.read_byte(addr);
        self.regs.set_flag(Status::ZERO, value & self.regs.a == 0);
        self.write_byte(addr, value | self.regs.a);
    }

    /// TRB（65C02）
    pub(super) fn trb(&mut self, mode: AddressingMode) {
        let addr = self.operand_address(mode);
        let value = self.read_byte(addr);
        self.regs.set_flag(Status::ZERO, value & self.regs.a == 0);
        self.write_byte(addr, value & !self.regs.a);
    }

    /// RMBn（ビット番号はオペコードの上位ニブルから）
    pub(super) fn rmb(&mut self, mode: AddressingMode) {
        let mask = 1u8 << ((self.opcode >> 4) & 0x07);
        let addr = self.operand_address(mode);
        let value = self.read_byte(addr);
        self.write_byte(addr, value & !mask);
    }

    /// SMBn
    pub(super) fn smb(&mut self, mode: AddressingMode) {
        let mask = 1u8 << ((self.opcode >> 4) & 0x07);
        let addr = self.operand_address(mode);
        let value = self.read_byte(addr);
        self.write_byte(addr, value | mask);
    }

    //--------------------------------------------------
    // 転送・スタック
    //--------------------------------------------------

    pub(super) fn tax(&mut self, _mode: AddressingMode) {
        self.regs.x = self.regs.a;
        self.regs.update_zero_negative_flags(self.regs.x);
    }

    pub(super) fn tay(&mut self, _mode: AddressingMode) {
        self.regs.y = self.regs.a;
        self.regs.update_zero_negative_flags(self.regs.y);
    }

    pub(super) fn txa(&mut self, _mode: AddressingMode) {
        self.regs.a = self.regs.x;
        self.regs.update_zero_negative_flags(self.regs.a);
    }

    pub(super) fn tya(&mut self, _mode: AddressingMode) {
        self.regs.a = self.regs.y;
        self.regs.update_zero_negative_flags(self.regs.a);
    }

    pub(super) fn tsx(&mut self, _mode: AddressingMode) {
        self.regs.x = self.regs.sp;
        self.regs.update_zero_negative_flags(self.regs.x);
    }

    pub(super) fn txs(&mut self, _mode: AddressingMode) {
        self.regs.sp = self.regs.x;
    }

    pub(super) fn pha(&mut self, _mode: AddressingMode) {
        self.push_byte(self.regs.a);
    }

    pub(super) fn phx(&mut self, _mode: AddressingMode) {
        self.push_byte(self.regs.x);
    }

    pub(super) fn phy(&mut self, _mode: AddressingMode) {
        self.push_byte(self.regs.y);
    }

    /// PHPはBフラグを立ててプッシュ
    pub(super) fn php(&mut self, _mode: AddressingMode) {
        let status = self.regs.status | Status::BREAK | Status::UNUSED;
        self.push_byte(status.bits());
    }

    pub(super) fn pla(&mut self, _mode: AddressingMode) {
        self.regs.a = self.pop_byte();
        self.regs.update_zero_negative_flags(self.regs.a);
    }

    pub(super) fn plx(&mut self, _mode: AddressingMode) {
        self.regs.x = self.pop_byte();
        self.regs.update_zero_negative_flags(self.regs.x);
    }

    pub(super) fn ply(&mut self, _mode: AddressingMode) {
        self.regs.y = self.pop_byte();
        self.regs.update_zero_negative_flags(self.regs.y);
    }

    pub(super) fn plp(&mut self, _mode: AddressingMode) {
        let value = self.pop_byte();
        self.regs.status = (Status::from_bits_retain(value) - Status::BREAK) | Status::UNUSED;
    }

    //--------------------------------------------------
    // フラグ
    //--------------------------------------------------

    pub(super) fn clc(&mut self, _mode: AddressingMode) {
        self.regs.set_flag(Status::CARRY, false);
    }

    pub(super) fn sec(&mut self, _mode: AddressingMode) {
        self.regs.set_flag(Status::CARRY, true);
    }

    pub(super) fn cli(&mut self, _mode: AddressingMode) {
        self.regs.set_flag(Status::IRQ_DISABLE, false);
    }

    pub(super) fn sei(&mut self, _mode: AddressingMode) {
        self.regs.set_flag(Status::IRQ_DISABLE, true);
    }

    pub(super) fn cld(&mut self, _mode: AddressingMode) {
        self.regs.set_flag(Status::DECIMAL, false);
    }

    pub(super) fn sed(&mut self, _mode: AddressingMode) {
        self.regs.set_flag(Status::DECIMAL, true);
    }

    pub(super) fn clv(&mut self, _mode: AddressingMode) {
        self.regs.set_flag(Status::OVERFLOW, false);
    }

    //--------------------------------------------------
    // 分岐・ジャンプ
    //--------------------------------------------------

    pub(super) fn bpl(&mut self, _mode: AddressingMode) {
        self.branch(!self.regs.get_flag(Status::NEGATIVE));
    }

    pub(super) fn bmi(&mut self, _mode: AddressingMode) {
        self.branch(self.regs.get_flag(Status::NEGATIVE));
    }

    pub(super) fn bvc(&mut self, _mode: AddressingMode) {
        self.branch(!self.regs.get_flag(Status::OVERFLOW));
    }

    pub(super) fn bvs(&mut self, _mode: AddressingMode) {
        self.branch(self.regs.get_flag(Status::OVERFLOW));
    }

    pub(super) fn bcc(&mut self, _mode: AddressingMode) {
        self.branch(!self.regs.get_flag(Status::CARRY));
    }

    pub(super) fn bcs(&mut self, _mode: AddressingMode) {
        self.branch(self.regs.get_flag(Status::CARRY));
    }

    pub(super) fn bne(&mut self, _mode: AddressingMode) {
        self.branch(!self.regs.get_flag(Status::ZERO));
    }

    pub(super) fn beq(&mut self, _mode: AddressingMode) {
        self.branch(self.regs.get_flag(Status::ZERO));
    }

    pub(super) fn bra(&mut self, _mode: AddressingMode) {
        self.branch(true);
    }

    /// BBRn（65C02）
    pub(super) fn bbr(&mut self, _mode: AddressingMode) {
        let mask = 1u8 << ((self.opcode >> 4) & 0x07);
        let zp = self.fetch_byte();
        let value = self.read_byte(zp as u16);
        self.branch(value & mask == 0);
    }

    /// BBSn（65C02）
    pub(super) fn bbs(&mut self, _mode: AddressingMode) {
        let mask = 1u8 << ((self.opcode >> 4) & 0x07);
        let zp = self.fetch_byte();
        let value = self.read_byte(zp as u16);
        self.branch(value & mask != 0);
    }

    pub(super) fn jmp(&mut self, mode: AddressingMode) {
        self.regs.pc = self.operand_address(mode);
    }

    pub(super) fn jsr(&mut self, mode: AddressingMode) {
        let addr = self.operand_address(mode);
        self.push_word(self.regs.pc.wrapping_sub(1));
        self.regs.pc = addr;
    }

    pub(super) fn rts(&mut self, _mode: AddressingMode) {
        self.regs.pc = self.pop_word().wrapping_add(1);
    }

    pub(super) fn rti(&mut self, _mode: AddressingMode) {
        let value = self.pop_byte();
        self.regs.status = (Status::from_bits_retain(value) - Status::BREAK) | Status::UNUSED;
        self.regs.pc = self.pop_word();
    }

    /// BRK。パディングバイトを飛ばし、Bフラグ付きでプッシュ
    pub(super) fn brk(&mut self, _mode: AddressingMode) {
        let pc = self.regs.pc.wrapping_add(1);
        self.push_word(pc);
        let status = self.regs.status | Status::BREAK | Status::UNUSED;
        self.push_byte(status.bits());
        self.regs.set_flag(Status::IRQ_DISABLE, true);
        if self.is_65c02() {
            self.regs.set_flag(Status::DECIMAL, false);
        }
        self.regs.pc = self.read_word(IRQ_VECTOR);
    }

    //--------------------------------------------------
    // NOP・未定義
    //--------------------------------------------------

    /// NOP（65C02の複数バイトNOPはオペランドを読み飛ばす）
    pub(super) fn nop(&mut self, mode: AddressingMode) {
        if mode != AddressingMode::Implied {
            self.operand_address(mode);
        }
    }

    /// 未定義オペコード：何もしない
    pub(super) fn unknown(&mut self, _mode: AddressingMode) {
        log::trace!(
            "cpu: undefined opcode ${:02X} at ${:04X}",
            self.opcode,
            self.regs.pc.wrapping_sub(1)
        );
    }
}
