//! I/O space ($C000-$CFFF)
//!
//! キーボード・スピーカー・アナンシエータ・表示モード・ゲームポートの
//! ソフトスイッチと、スロットカードへの振り分け。
//! $C800-$CFFF は最後にROMをアクセスしたスロットが受け持つ。

use crate::memory::{Capabilities, Clock, Handler, Memory};
use crate::video::{SharedVideo, VideoModes};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// パドル値1あたりのタイマーサイクル
const PADDLE_CYCLES_PER_UNIT: u64 = 11;

/// 取り出されないクリックはこの数を超えると古い順に捨てる
pub const MAX_SPEAKER_CLICKS: usize = 8192;

/// スロット数（0はランゲージカード）
pub const SLOTS: usize = 8;

/// I/Oコントローラ
pub struct Io {
    video: SharedVideo,
    clock: Clock,
    iie: bool,
    keyboard: u8,
    speaker: bool,
    /// スピーカーがトグルしたサイクル（ホストが取り出す）
    speaker_clicks: VecDeque<u64>,
    annunciators: [bool; 4],
    buttons: [bool; 3],
    paddles: [u8; 4],
    paddle_trigger: u64,
    slots: [Option<Handler>; SLOTS],
    /// $C800-$CFFF を受け持つスロット
    active_slot: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoState {
    pub keyboard: u8,
    pub annunciators: [bool; 4],
    pub paddle_trigger: u64,
    pub active_slot: Option<usize>,
    pub video: VideoModes,
}

fn bit7(on: bool) -> u8 {
    if on {
        0x80
    } else {
        0x00
    }
}

impl Io {
    pub fn new(video: SharedVideo, clock: Clock, iie: bool) -> Self {
        Io {
            video,
            clock,
            iie,
            keyboard: 0,
            speaker: false,
            speaker_clicks: VecDeque::with_capacity(MAX_SPEAKER_CLICKS),
            annunciators: [false; 4],
            buttons: [false; 3],
            paddles: [128; 4],
            paddle_trigger: 0,
            slots: Default::default(),
            active_slot: None,
        }
    }

    /// スロットにカードを挿す
    pub fn set_slot(&mut self, slot: usize, card: Handler) {
        log::debug!("io: card in slot {}", slot);
        self.slots[slot & (SLOTS - 1)] = Some(card);
    }

    pub fn video(&self) -> SharedVideo {
        self.video.clone()
    }

    pub fn set_key(&mut self, key: u8) {
        self.keyboard = key | 0x80;
    }

    /// キーストローブが有効か
    pub fn has_key_strobe(&self) -> bool {
        self.keyboard & 0x80 != 0
    }

    pub fn set_button(&mut self, button: usize, pressed: bool) {
        if let Some(b) = self.buttons.get_mut(button) {
            *b = pressed;
        }
    }

    /// パドル値 (0-255, 128が中央)
    pub fn set_paddle(&mut self, paddle: usize, value: u8) {
        if let Some(p) = self.paddles.get_mut(paddle) {
            *p = value;
        }
    }

    pub fn annunciator(&self, n: usize) -> bool {
        self.annunciators[n & 3]
    }

    pub fn take_speaker_clicks(&mut self) -> Vec<u64> {
        self.speaker_clicks.drain(..).collect()
    }

    /// キーボードラッチ（ストローブはクリアしない）
    pub fn keyboard(&self) -> u8 {
        self.keyboard
    }

    pub fn active_slot(&self) -> Option<usize> {
        self.active_slot
    }

    /// $CFFF: 拡張ROMの選択を解除
    pub fn release_expansion_rom(&mut self) {
        self.active_slot = None;
    }

    /// $C0xx のソフトスイッチ。`val` が `None` なら読み取り
    pub fn access(&mut self, off: u8, val: Option<u8>) -> u8 {
        let write = val.is_some();
        match off {
            0x00..=0x0F => {
                if write && self.iie {
                    let mut video = self.video.borrow_mut();
                    match off {
                        0x0C => video.col80 = false,
                        0x0D => video.col80 = true,
                        0x0E => video.altchar = false,
                        0x0F => video.altchar = true,
                        _ => {}
                    }
                }
                self.keyboard
            }
            0x10..=0x1F => {
                // キーストローブクリア
                let result = self.keyboard;
                self.keyboard &= 0x7F;
                result
            }
            0x20..=0x2F => 0x00, // カセット出力
            0x30..=0x3F => {
                self.speaker = !self.speaker;
                if self.speaker_clicks.len() == MAX_SPEAKER_CLICKS {
                    self.speaker_clicks.pop_front();
                }
                self.speaker_clicks.push_back(self.clock.get());
                0x00
            }
            0x50..=0x57 => {
                let on = off & 0x01 != 0;
                let mut video = self.video.borrow_mut();
                match off & 0x06 {
                    0x00 => video.text = on,
                    0x02 => video.mixed = on,
                    0x04 => video.page2 = on,
                    _ => video.hires = on,
                }
                0x00
            }
            0x58..=0x5F => {
                let n = ((off - 0x58) >> 1) as usize;
                let on = off & 0x01 != 0;
                self.annunciators[n] = on;
                if n == 3 {
                    self.video.borrow_mut().an3 = on;
                }
                0x00
            }
            0x61..=0x63 => bit7(self.buttons[(off - 0x61) as usize]),
            0x64..=0x67 => {
                let value = self.paddles[(off - 0x64) as usize] as u64;
                let elapsed = self.clock.get().saturating_sub(self.paddle_trigger);
                bit7(elapsed < value * PADDLE_CYCLES_PER_UNIT)
            }
            0x70..=0x7F => {
                self.paddle_trigger = self.clock.get();
                0x00
            }
            0x80..=0xFF => {
                let slot = ((off >> 4) & 0x07) as usize;
                match &self.slots[slot] {
                    Some(card) => card.borrow_mut().io_switch(off & 0x0F, val).unwrap_or(0),
                    None => 0x00,
                }
            }
            _ => 0x00,
        }
    }

    /// $C1xx-$CFxx のスロットROM読み書き
    fn slot_rom(&mut self, page: u8, off: u8, val: Option<u8>) -> u8 {
        let slot = if page < 0xC8 {
            let slot = (page & 0x07) as usize;
            self.active_slot = Some(slot);
            Some(slot)
        } else {
            self.active_slot
        };
        let result = match slot.and_then(|s| self.slots[s].as_ref()) {
            Some(card) => {
                let mut card = card.borrow_mut();
                match val {
                    Some(v) => {
                        card.write(page, off, v);
                        0
                    }
                    None => card.read(page, off),
                }
            }
            None => 0x00,
        };
        if page == 0xCF && off == 0xFF {
            self.release_expansion_rom();
        }
        result
    }

    pub fn get_state(&self) -> IoState {
        IoState {
            keyboard: self.keyboard,
            annunciators: self.annunciators,
            paddle_trigger: self.paddle_trigger,
            active_slot: self.active_slot,
            video: *self.video.borrow(),
        }
    }

    pub fn set_state(&mut self, state: &IoState) {
        self.keyboard = state.keyboard;
        self.annunciators = state.annunciators;
        self.paddle_trigger = state.paddle_trigger;
        self.active_slot = state.active_slot;
        *self.video.borrow_mut() = state.video;
    }

    /// スロット1-7のカードへ通知（スロット0はBusに直接登録される）
    fn for_each_card(&self, caps: Capabilities, mut f: impl FnMut(&mut dyn Memory)) {
        for card in self.slots[1..].iter().flatten() {
            let mut card = card.borrow_mut();
            if card.capabilities().contains(caps) {
                f(&mut *card);
            }
        }
    }
}

impl Memory for Io {
    fn start(&self) -> u8 {
        0xC0
    }

    fn end(&self) -> u8 {
        0xCF
    }

    fn read(&mut self, page: u8, off: u8) -> u8 {
        if page == 0xC0 {
            self.access(off, None)
        } else {
            self.slot_rom(page, off, None)
        }
    }

    fn write(&mut self, page: u8, off: u8, val: u8) {
        if page == 0xC0 {
            self.access(off, Some(val));
        } else {
            self.slot_rom(page, off, Some(val));
        }
    }

    fn reset(&mut self) {
        self.active_slot = None;
        *self.video.borrow_mut() = VideoModes::default();
        self.annunciators = [false; 4];
        self.for_each_card(Capabilities::RESET, |card| card.reset());
    }

    fn tick(&mut self) {
        self.for_each_card(Capabilities::TICK, |card| card.tick());
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }
}
