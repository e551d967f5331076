//! セーブステート機能
//!
//! マシン全体の状態をJSONで保存・復元する。RAMとトラックはbase64。
//! 乱数ビット生成器の状態は含まない。

use crate::apple2::Model;
use crate::cpu::CpuState;
use crate::disk::DiskControllerState;
use crate::io::IoState;
use crate::langcard::LanguageCardState;
use crate::memory::{RamState, StateError};
use crate::mmu::MmuState;
use serde::{Deserialize, Serialize};

/// メモリ構成毎の状態
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryState {
    /// II / II+: メインRAMとランゲージカード
    Plus {
        ram: RamState,
        language_card: LanguageCardState,
    },
    /// IIe: MMU
    Iie(MmuState),
}

/// 完全なエミュレータ状態
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveState {
    /// セーブフォーマットのバージョン
    pub version: u32,
    pub model: Model,
    pub cpu: CpuState,
    pub memory: MemoryState,
    pub io: IoState,
    pub disk: DiskControllerState,
    pub frame_count: u64,
}

#[derive(Deserialize)]
struct Header {
    version: u32,
}

impl SaveState {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn to_json(&self) -> Result<String, StateError> {
        serde_json::to_string(self).map_err(|e| StateError::Encoding(e.to_string()))
    }

    /// バージョンを先に確認してから全体を読む
    pub fn from_json(json: &str) -> Result<Self, StateError> {
        let header: Header =
            serde_json::from_str(json).map_err(|e| StateError::Encoding(e.to_string()))?;
        if header.version != Self::CURRENT_VERSION {
            return Err(StateError::Version(header.version));
        }
        serde_json::from_str(json).map_err(|e| StateError::Encoding(e.to_string()))
    }
}
