//! MOS 6502/65C02 CPU Emulator
//!
//! Apple IIで使用される6502/65C02のテーブル駆動エミュレーション。
//! 命令毎に基本サイクル＋ページ跨ぎ・分岐ペナルティを加算する。

pub mod addressing;
mod instructions;
pub mod opcodes;

use crate::bus::Bus;
use crate::memory::{Address, Clock, Handler};
use opcodes::{Opcode, OPCODES_6502, OPCODES_65C02};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;

pub use addressing::AddressingMode;

bitflags::bitflags! {
    /// ステータスレジスタ (N V - B D I Z C)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const CARRY = 0b0000_0001;
        const ZERO = 0b0000_0010;
        const IRQ_DISABLE = 0b0000_0100;
        const DECIMAL = 0b0000_1000;
        const BREAK = 0b0001_0000;
        /// 常に1
        const UNUSED = 0b0010_0000;
        const OVERFLOW = 0b0100_0000;
        const NEGATIVE = 0b1000_0000;
    }
}

/// ベクタ
pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// CPUの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuType {
    /// オリジナルのNMOS 6502 (Apple II, II+, IIe)
    Cpu6502,
    /// CMOS 65C02 (Apple IIe Enhanced)
    Cpu65C02,
}

/// CPUレジスタの状態
#[derive(Debug, Clone)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    /// スタックポインタ（$0100ページ）
    pub sp: u8,
    pub pc: u16,
    pub status: Status,
}

impl Default for Registers {
    fn default() -> Self {
        Registers {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD, // スタックは$01FDから開始
            pc: 0,
            status: Status::UNUSED | Status::IRQ_DISABLE,
        }
    }
}

impl Registers {
    /// フラグをセット
    pub fn set_flag(&mut self, flag: Status, value: bool) {
        self.status.set(flag, value);
    }

    /// フラグを取得
    pub fn get_flag(&self, flag: Status) -> bool {
        self.status.contains(flag)
    }

    /// ゼロフラグと負数フラグを値に基づいて更新
    pub fn update_zero_negative_flags(&mut self, value: u8) {
        self.set_flag(Status::ZERO, value == 0);
        self.set_flag(Status::NEGATIVE, value & 0x80 != 0);
    }
}

/// `get_state`/`set_state` 用のスナップショット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    /// ステータスレジスタ
    pub s: u8,
    pub pc: u16,
    pub sp: u8,
    pub cycles: u64,
}

/// 6502 CPUエミュレータ
///
/// ページテーブル（[`Bus`]）を所有し、すべてのメモリアクセスはそこを経由する。
pub struct Cpu {
    pub regs: Registers,
    pub cpu_type: CpuType,
    /// 累積サイクル数
    pub cycles: u64,
    /// 実行中の命令のオペコード
    pub(crate) opcode: u8,
    bus: Bus,
    table: &'static [Opcode; 256],
    clock: Clock,
    /// トレースコールバック実行中
    tracing: bool,
}

impl Cpu {
    /// 新しいCPUインスタンスを作成
    pub fn new(cpu_type: CpuType) -> Self {
        let table = match cpu_type {
            CpuType::Cpu6502 => &OPCODES_6502,
            CpuType::Cpu65C02 => &OPCODES_65C02,
        };
        Cpu {
            regs: Registers::default(),
            cpu_type,
            cycles: 0,
            opcode: 0,
            bus: Bus::new(),
            table,
            clock: Rc::new(Cell::new(0)),
            tracing: false,
        }
    }

    #[inline]
    pub fn is_65c02(&self) -> bool {
        self.cpu_type == CpuType::Cpu65C02
    }

    /// サイクルカウンタの共有ビュー（デバイス用）
    pub fn clock(&self) -> Clock {
        self.clock.clone()
    }

    pub fn add_page_handler(&mut self, handler: Handler) {
        self.bus.add_page_handler(handler);
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn read(&self, page: u8, off: u8) -> u8 {
        self.bus.read(page, off)
    }

    pub fn write(&self, page: u8, off: u8, val: u8) {
        self.bus.write(page, off, val);
    }

    #[inline]
    pub(crate) fn read_byte(&self, addr: u16) -> u8 {
        let addr = Address::from_word(addr);
        self.bus.read(addr.page(), addr.offset())
    }

    #[inline]
    pub(crate) fn write_byte(&self, addr: u16, val: u8) {
        let addr = Address::from_word(addr);
        self.bus.write(addr.page(), addr.offset(), val);
    }

    pub(crate) fn read_word(&self, addr: u16) -> u16 {
        let lo = self.read_byte(addr);
        let hi = self.read_byte(addr.wrapping_add(1));
        Address::from_bytes(lo, hi).word()
    }

    #[inline]
    pub(crate) fn fetch_byte(&mut self) -> u8 {
        let value = self.read_byte(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    pub(crate) fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch_byte();
        let hi = self.fetch_byte();
        Address::from_bytes(lo, hi).word()
    }

    pub(crate) fn push_byte(&mut self, value: u8) {
        self.write_byte(0x0100 | self.regs.sp as u16, value);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    pub(crate) fn pop_byte(&mut self) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        self.read_byte(0x0100 | self.regs.sp as u16)
    }

    pub(crate) fn push_word(&mut self, value: u16) {
        self.push_byte((value >> 8) as u8);
        self.push_byte(value as u8);
    }

    pub(crate) fn pop_word(&mut self) -> u16 {
        let lo = self.pop_byte();
        let hi = self.pop_byte();
        Address::from_bytes(lo, hi).word()
    }

    /// CPUをリセット
    ///
    /// 先に全ハンドラへリセットを通知し（MMUがROMを戻す）、
    /// その後リセットベクタからPCを読み込む。
    pub fn reset(&mut self) {
        self.bus.reset();
        self.regs = Registers::default();
        self.regs.pc = self.read_word(RESET_VECTOR);
        self.clock.set(self.cycles);
        log::debug!("cpu: reset pc=${:04X}", self.regs.pc);
    }

    /// IRQ（Iフラグがセットされていれば無視）
    pub fn irq(&mut self) {
        if !self.regs.get_flag(Status::IRQ_DISABLE) {
            self.interrupt(IRQ_VECTOR);
        }
    }

    /// NMI
    pub fn nmi(&mut self) {
        self.interrupt(NMI_VECTOR);
    }

    fn interrupt(&mut self, vector: u16) {
        self.push_word(self.regs.pc);
        let status = (self.regs.status - Status::BREAK) | Status::UNUSED;
        self.push_byte(status.bits());
        self.regs.set_flag(Status::IRQ_DISABLE, true);
        if self.is_65c02() {
            self.regs.set_flag(Status::DECIMAL, false);
        }
        self.regs.pc = self.read_word(vector);
        self.cycles += 7;
        self.clock.set(self.cycles);
    }

    /// 1命令を実行して消費サイクルを返す
    fn execute(&mut self) -> u64 {
        let start = self.cycles;
        self.opcode = self.fetch_byte();
        let op = self.table[self.opcode as usize];
        (op.exec)(self, op.mode);
        self.cycles += op.cycles as u64;
        self.clock.set(self.cycles);
        self.cycles - start
    }

    /// 1命令実行
    pub fn step(&mut self) -> u64 {
        if self.tracing {
            return 0;
        }
        self.execute()
    }

    /// `count` 命令実行
    pub fn step_n(&mut self, count: usize) -> u64 {
        if self.tracing {
            return 0;
        }
        (0..count).map(|_| self.execute()).sum()
    }

    /// 累積サイクルが `budget` 増えるまで実行
    pub fn step_cycles(&mut self, budget: u64) -> u64 {
        if self.tracing {
            return 0;
        }
        let start = self.cycles;
        let end = start + budget;
        while self.cycles < end {
            self.execute();
        }
        self.cycles - start
    }

    /// 命令毎に `trace` を呼ぶ `step_cycles`
    ///
    /// コールバック内からのステップ呼び出しは何もしない。
    pub fn step_cycles_debug<F>(&mut self, budget: u64, mut trace: F) -> u64
    where
        F: FnMut(&mut Cpu),
    {
        if self.tracing {
            return 0;
        }
        let start = self.cycles;
        let end = start + budget;
        while self.cycles < end {
            self.execute();
            self.tracing = true;
            trace(self);
            self.tracing = false;
        }
        self.cycles - start
    }

    pub fn get_state(&self) -> CpuState {
        CpuState {
            a: self.regs.a,
            x: self.regs.x,
            y: self.regs.y,
            s: self.regs.status.bits(),
            pc: self.regs.pc,
            sp: self.regs.sp,
            cycles: self.cycles,
        }
    }

    pub fn set_state(&mut self, state: &CpuState) {
        self.regs.a = state.a;
        self.regs.x = state.x;
        self.regs.y = state.y;
        self.regs.status = Status::from_bits_retain(state.s) | Status::UNUSED;
        self.regs.pc = state.pc;
        self.regs.sp = state.sp;
        self.cycles = state.cycles;
        self.clock.set(self.cycles);
    }

    /// 現在のオペコード表の項目
    pub fn opcode_info(&self, opcode: u8) -> &'static Opcode {
        &self.table[opcode as usize]
    }
}
