//! Video mode flags
//!
//! 画面描画そのものはホスト側の責務。ここではソフトスイッチで切り替わる
//! 表示モードだけを保持し、I/OとMMUの両方から共有する。

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// 表示モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoModes {
    pub text: bool,
    pub mixed: bool,
    pub page2: bool,
    pub hires: bool,
    pub col80: bool,
    pub altchar: bool,
    pub dhires: bool,
    /// アナンシエータ3（IIeではDHIRES制御に使われる）
    pub an3: bool,
}

impl Default for VideoModes {
    fn default() -> Self {
        VideoModes {
            text: true, // 起動時はテキストモード
            mixed: false,
            page2: false,
            hires: false,
            col80: false,
            altchar: false,
            dhires: false,
            an3: true,
        }
    }
}

/// 共有ビュー
pub type SharedVideo = Rc<RefCell<VideoModes>>;

/// 描画モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Text40,
    Text80,
    LoRes,
    DoubleLoRes,
    HiRes,
    DoubleHiRes,
}

impl VideoModes {
    /// 現在の描画モード（MIXEDなら下4行は `text_mode()`）
    pub fn graphics_mode(&self) -> DisplayMode {
        if self.text {
            return self.text_mode();
        }
        match (self.hires, self.dhires && self.col80) {
            (true, true) => DisplayMode::DoubleHiRes,
            (true, false) => DisplayMode::HiRes,
            (false, true) => DisplayMode::DoubleLoRes,
            (false, false) => DisplayMode::LoRes,
        }
    }

    pub fn text_mode(&self) -> DisplayMode {
        if self.col80 {
            DisplayMode::Text80
        } else {
            DisplayMode::Text40
        }
    }

    /// 表示ページの先頭アドレス
    pub fn page_base(&self) -> u16 {
        match (self.text || !self.hires, self.page2) {
            (true, false) => 0x0400,
            (true, true) => 0x0800,
            (false, false) => 0x2000,
            (false, true) => 0x4000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_text() {
        let modes = VideoModes::default();
        assert_eq!(modes.graphics_mode(), DisplayMode::Text40);
        assert_eq!(modes.page_base(), 0x0400);
    }

    #[test]
    fn test_graphics_modes() {
        let mut modes = VideoModes {
            text: false,
            hires: true,
            ..Default::default()
        };
        assert_eq!(modes.graphics_mode(), DisplayMode::HiRes);
        modes.page2 = true;
        assert_eq!(modes.page_base(), 0x4000);
        modes.dhires = true;
        assert_eq!(modes.graphics_mode(), DisplayMode::HiRes);
        modes.col80 = true;
        assert_eq!(modes.graphics_mode(), DisplayMode::DoubleHiRes);
        modes.hires = false;
        assert_eq!(modes.graphics_mode(), DisplayMode::DoubleLoRes);
    }
}
