//! Page table bus
//!
//! 256ページそれぞれの読み書き先ハンドラを保持する。
//! 未登録ページは0を返し、書き込みは捨てる。

use crate::memory::{Capabilities, Handler};

/// ページテーブル
pub struct Bus {
    read_pages: Vec<Option<Handler>>,
    write_pages: Vec<Option<Handler>>,
    reset_handlers: Vec<Handler>,
    tick_handlers: Vec<Handler>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Bus {
            read_pages: vec![None; 256],
            write_pages: vec![None; 256],
            reset_handlers: Vec::new(),
            tick_handlers: Vec::new(),
        }
    }

    /// ハンドラを `start..=end` の各ページに登録
    ///
    /// 後から登録したハンドラが同じページを上書きする。
    pub fn add_page_handler(&mut self, handler: Handler) {
        let (start, end, caps) = {
            let h = handler.borrow();
            (h.start(), h.end(), h.capabilities())
        };
        log::debug!(
            "bus: pages ${:02X}-${:02X} {:?}",
            start,
            end,
            caps
        );
        for page in start..=end {
            if caps.contains(Capabilities::READ) {
                self.read_pages[page as usize] = Some(handler.clone());
            }
            if caps.contains(Capabilities::WRITE) {
                self.write_pages[page as usize] = Some(handler.clone());
            }
        }
        if caps.contains(Capabilities::RESET) {
            self.reset_handlers.push(handler.clone());
        }
        if caps.contains(Capabilities::TICK) {
            self.tick_handlers.push(handler);
        }
    }

    #[inline]
    pub fn read(&self, page: u8, off: u8) -> u8 {
        match &self.read_pages[page as usize] {
            Some(handler) => handler.borrow_mut().read(page, off),
            None => 0,
        }
    }

    #[inline]
    pub fn write(&self, page: u8, off: u8, val: u8) {
        if let Some(handler) = &self.write_pages[page as usize] {
            handler.borrow_mut().write(page, off, val);
        }
    }

    /// 登録順にリセットを通知
    pub fn reset(&self) {
        for handler in &self.reset_handlers {
            handler.borrow_mut().reset();
        }
    }

    pub fn tick(&self) {
        for handler in &self.tick_handlers {
            handler.borrow_mut().tick();
        }
    }
}
