//! Memory capability and RAM/ROM blocks
//!
//! ページ単位（256バイト）でアドレス空間を受け持つハンドラの共通インターフェース。
//! Bus・MMU・スロットカードはすべてこのトレイトを通して呼び出される。

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

bitflags::bitflags! {
    /// ハンドラがBusに登録される対象
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const READ  = 0b0001;
        const WRITE = 0b0010;
        const RESET = 0b0100;
        const TICK  = 0b1000;
    }
}

/// ページハンドラ
///
/// `start()..=end()` のページを受け持つ。`read` は副作用を持つこと
/// （ソフトスイッチ）があるため `&mut self` を取る。
pub trait Memory {
    /// 先頭ページ
    fn start(&self) -> u8;
    /// 最終ページ（含む）
    fn end(&self) -> u8;
    /// 1バイト読み取り
    fn read(&mut self, page: u8, off: u8) -> u8;
    /// 1バイト書き込み
    fn write(&mut self, page: u8, off: u8, val: u8);

    /// リセット通知
    fn reset(&mut self) {}

    /// ホストのフレーム毎の通知
    fn tick(&mut self) {}

    /// スロットI/O ($C0n0-$C0nF)。`val` が `None` なら読み取り
    fn io_switch(&mut self, _off: u8, _val: Option<u8>) -> Option<u8> {
        None
    }

    /// Busへの登録対象
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::WRITE
    }
}

/// 共有ハンドラ
pub type Handler = Rc<RefCell<dyn Memory>>;

/// CPUサイクルカウンタの共有ビュー
///
/// CPUが命令毎に更新し、ディスクのシーケンサやVBLステータスが参照する。
pub type Clock = Rc<Cell<u64>>;

/// 16ビットアドレス
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address(u16);

impl Address {
    pub fn from_word(word: u16) -> Self {
        Address(word)
    }

    /// リトルエンディアンの2バイトから
    pub fn from_bytes(lo: u8, hi: u8) -> Self {
        Address(u16::from_le_bytes([lo, hi]))
    }

    pub fn page(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn offset(self) -> u8 {
        self.0 as u8
    }

    pub fn word(self) -> u16 {
        self.0
    }
}

/// RAMブロック
#[derive(Debug, Clone)]
pub struct Ram {
    start: u8,
    end: u8,
    mem: Vec<u8>,
}

/// RAMブロックのスナップショット
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RamState {
    pub start: u8,
    pub end: u8,
    /// base64
    pub mem: String,
}

impl Ram {
    pub fn new(start: u8, end: u8) -> Self {
        let pages = end as usize - start as usize + 1;
        Ram {
            start,
            end,
            mem: vec![0; pages * 256],
        }
    }

    #[inline]
    fn index(&self, page: u8, off: u8) -> usize {
        ((page - self.start) as usize) << 8 | off as usize
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mem
    }

    pub fn get_state(&self) -> RamState {
        RamState {
            start: self.start,
            end: self.end,
            mem: BASE64.encode(&self.mem),
        }
    }

    /// サイズが一致しないスナップショットは拒否する
    pub fn set_state(&mut self, state: &RamState) -> Result<(), StateError> {
        let mem = BASE64
            .decode(&state.mem)
            .map_err(|e| StateError::Encoding(e.to_string()))?;
        if state.start != self.start || state.end != self.end || mem.len() != self.mem.len() {
            return Err(StateError::Mismatch("RAM block"));
        }
        self.mem = mem;
        Ok(())
    }
}

impl Memory for Ram {
    fn start(&self) -> u8 {
        self.start
    }

    fn end(&self) -> u8 {
        self.end
    }

    fn read(&mut self, page: u8, off: u8) -> u8 {
        self.mem[self.index(page, off)]
    }

    fn write(&mut self, page: u8, off: u8, val: u8) {
        let idx = self.index(page, off);
        self.mem[idx] = val;
    }
}

/// ROMブロック（書き込みは無視）
#[derive(Debug, Clone)]
pub struct Rom {
    start: u8,
    end: u8,
    data: Vec<u8>,
}

impl Rom {
    /// `data` が範囲より短い場合は末尾に合わせて配置する
    /// （12KBのII+ ROMを$D000に置くため）
    pub fn new(start: u8, end: u8, data: &[u8]) -> Self {
        let size = (end as usize - start as usize + 1) * 256;
        let mut rom = vec![0; size];
        let len = data.len().min(size);
        rom[size - len..].copy_from_slice(&data[data.len() - len..]);
        Rom {
            start,
            end,
            data: rom,
        }
    }
}

impl Memory for Rom {
    fn start(&self) -> u8 {
        self.start
    }

    fn end(&self) -> u8 {
        self.end
    }

    fn read(&mut self, page: u8, off: u8) -> u8 {
        self.data[((page - self.start) as usize) << 8 | off as usize]
    }

    fn write(&mut self, _page: u8, _off: u8, _val: u8) {}

    fn capabilities(&self) -> Capabilities {
        Capabilities::READ
    }
}

/// ステート復元のエラー
#[derive(Debug, Clone, PartialEq)]
pub enum StateError {
    /// JSONまたはbase64の破損
    Encoding(String),
    /// 保存時と構成が異なる
    Mismatch(&'static str),
    /// 未対応のバージョン
    Version(u32),
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::Encoding(msg) => write!(f, "corrupt state data: {}", msg),
            StateError::Mismatch(what) => write!(f, "state does not match machine: {}", what),
            StateError::Version(v) => write!(f, "unsupported state version {}", v),
        }
    }
}

impl std::error::Error for StateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ram_pages() {
        let mut ram = Ram::new(0x20, 0x3F);
        ram.write(0x20, 0x00, 0x11);
        ram.write(0x3F, 0xFF, 0x22);
        assert_eq!(ram.read(0x20, 0x00), 0x11);
        assert_eq!(ram.read(0x3F, 0xFF), 0x22);
        assert_eq!(ram.as_slice().len(), 0x20 * 256);
    }

    #[test]
    fn test_rom_ignores_writes() {
        let mut rom = Rom::new(0xF8, 0xFF, &[0xEA; 0x800]);
        rom.write(0xF8, 0x00, 0x00);
        assert_eq!(rom.read(0xF8, 0x00), 0xEA);
        assert!(!rom.capabilities().contains(Capabilities::WRITE));
    }

    #[test]
    fn test_short_rom_is_right_aligned() {
        let mut data = vec![0u8; 0x3000];
        data[0x2FFC] = 0x62;
        let mut rom = Rom::new(0xC0, 0xFF, &data);
        assert_eq!(rom.read(0xFF, 0xFC), 0x62);
        assert_eq!(rom.read(0xC0, 0x00), 0x00);
    }

    #[test]
    fn test_ram_state_roundtrip() {
        let mut ram = Ram::new(0x00, 0x01);
        ram.write(0x01, 0xFF, 0x5A);
        let state = ram.get_state();
        let mut other = Ram::new(0x00, 0x01);
        other.set_state(&state).unwrap();
        assert_eq!(other.read(0x01, 0xFF), 0x5A);

        let mut wrong = Ram::new(0x00, 0x02);
        assert!(wrong.set_state(&state).is_err());
    }

    #[test]
    fn test_address_constructors() {
        let a = Address::from_bytes(0x34, 0x12);
        assert_eq!(a, Address::from_word(0x1234));
        assert_eq!(a.page(), 0x12);
        assert_eq!(a.offset(), 0x34);
    }
}
