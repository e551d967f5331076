//! A2Core - Apple II emulation core
//!
//! 6502 / 65C02 CPU をページテーブル方式のバスに載せ、Apple II、II+
//! (ランゲージカード) および IIe (MMU と補助メモリ) の各機種を組み立てる。
//! Disk II コントローラは DSK/DO/PO/D13/NIB/2MG/WOZ のイメージを扱い、
//! マシン全体の状態は JSON として保存・復元できる。
//!
//! 描画・音声・入力デバイスはホスト側の責務。

pub mod apple2;
pub mod bus;
pub mod config;
pub mod cpu;
pub mod disk;
pub mod formats;
pub mod io;
pub mod langcard;
pub mod memory;
pub mod mmu;
pub mod nibble;
pub mod savestate;
pub mod scheduler;
pub mod video;
