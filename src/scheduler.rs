//! Deferred callbacks
//!
//! ドライブのモーター停止（1秒後）などの遅延処理を登録する。
//! 実時間ではなくホストが進めた時間で発火させるので、テストでも決定的に動く。

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// 登録済みコールバックの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// 遅延コールバックの登録先
pub trait Scheduler {
    /// `delay` 後に `callback` を呼ぶ
    fn schedule(&mut self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle;
    /// 未発火のコールバックを取り消す（発火済みなら何もしない）
    fn cancel(&mut self, handle: TimerHandle);
}

/// 共有スケジューラ
pub type SharedScheduler = Rc<RefCell<dyn Scheduler>>;

struct Pending {
    handle: TimerHandle,
    due: Duration,
    callback: Box<dyn FnOnce()>,
}

/// `advance` で時間を進める決定的スケジューラ
#[derive(Default)]
pub struct ManualScheduler {
    now: Duration,
    next_id: u64,
    pending: Vec<Pending>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// 未発火の件数
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// 時間を進め、期限の来たコールバックを期限順に取り出す
    ///
    /// コールバックの実行は呼び出し側が借用を解いてから行う
    /// （コールバックが同じスケジューラに登録し直せるように）。
    fn take_due(&mut self, by: Duration) -> Vec<Box<dyn FnOnce()>> {
        self.now += by;
        let now = self.now;
        let (mut due, rest): (Vec<_>, Vec<_>) = self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = rest;
        due.sort_by_key(|p| (p.due, p.handle.0));
        due.into_iter().map(|p| p.callback).collect()
    }

    /// 共有スケジューラの時間を進めてコールバックを実行
    pub fn advance(this: &Rc<RefCell<ManualScheduler>>, by: Duration) {
        let callbacks = this.borrow_mut().take_due(by);
        for callback in callbacks {
            callback();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.pending.push(Pending {
            handle,
            due: self.now + delay,
            callback,
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.pending.retain(|p| p.handle != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_fires_when_due() {
        let sched = Rc::new(RefCell::new(ManualScheduler::new()));
        let fired = Rc::new(Cell::new(0));
        let f = fired.clone();
        sched
            .borrow_mut()
            .schedule(Duration::from_secs(1), Box::new(move || f.set(f.get() + 1)));

        ManualScheduler::advance(&sched, Duration::from_millis(999));
        assert_eq!(fired.get(), 0);
        ManualScheduler::advance(&sched, Duration::from_millis(1));
        assert_eq!(fired.get(), 1);
        ManualScheduler::advance(&sched, Duration::from_secs(5));
        assert_eq!(fired.get(), 1);
        assert_eq!(sched.borrow().pending(), 0);
    }

    #[test]
    fn test_cancel() {
        let sched = Rc::new(RefCell::new(ManualScheduler::new()));
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let handle = sched
            .borrow_mut()
            .schedule(Duration::from_millis(10), Box::new(move || f.set(true)));
        sched.borrow_mut().cancel(handle);
        ManualScheduler::advance(&sched, Duration::from_secs(1));
        assert!(!fired.get());
    }

    #[test]
    fn test_callback_may_reschedule() {
        let sched = Rc::new(RefCell::new(ManualScheduler::new()));
        let inner = sched.clone();
        sched.borrow_mut().schedule(
            Duration::from_millis(5),
            Box::new(move || {
                inner
                    .borrow_mut()
                    .schedule(Duration::from_millis(5), Box::new(|| {}));
            }),
        );
        ManualScheduler::advance(&sched, Duration::from_millis(5));
        assert_eq!(sched.borrow().pending(), 1);
        assert_eq!(sched.borrow().now(), Duration::from_millis(5));
    }
}
