//! The toolkit callback table.
//!
//! Everything that normally comes from the embedding toolkit - timers,
//! idle callbacks, a monotonic clock, monitor geometry - is reached
//! through the [`Toolkit`] trait. All callbacks fire on the one logical
//! thread the components run on.
//!
//! [`LoopToolkit`] is the reference implementation: a manual clock with an
//! ordered timer queue. Tests and headless embedders drive it with
//! [`LoopToolkit::advance`]; real embedders wrap their main loop instead.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use crate::geometry::Rect;

/// Identifies a scheduled timer; never reused within a toolkit instance.
pub type TimerId = u64;

/// Scheduled timer callback; returning `true` keeps the timer repeating.
pub type TimerCallback = Box<dyn FnMut() -> bool>;

/// Callback table provided by the embedder.
pub trait Toolkit {
    /// Schedule `callback` every `interval`, first firing one interval
    /// from now.
    fn start_timer(&self, interval: Duration, callback: TimerCallback) -> TimerId;

    fn stop_timer(&self, id: TimerId);

    /// Run once when the main loop is idle.
    fn idle_run(&self, callback: Box<dyn FnOnce()>);

    /// Monotonic time since an arbitrary epoch.
    fn now(&self) -> Duration;

    /// Can windows fade/blend? Without compositing, opacity transitions
    /// collapse to instant switches.
    fn is_composited(&self) -> bool {
        true
    }

    /// Geometry of all monitors.
    fn monitor_rects(&self) -> Vec<Rect>;

    /// Usable work area of a monitor.
    fn workarea_rect(&self, monitor: usize) -> Rect;

    fn active_monitor(&self) -> usize {
        0
    }

    fn primary_monitor(&self) -> usize {
        0
    }

    /// System drag threshold in pixels.
    fn drag_threshold(&self) -> f64 {
        8.0
    }
}

struct ScheduledTimer {
    due: Duration,
    interval: Duration,
    callback: TimerCallback,
}

#[derive(Default)]
struct LoopState {
    now: Duration,
    next_id: TimerId,
    /// (due, id) orders expiry; BTreeMap keeps equal deadlines in
    /// schedule order.
    timers: BTreeMap<(Duration, TimerId), ScheduledTimer>,
    idle: Vec<Box<dyn FnOnce()>>,
}

/// Deterministic single-threaded toolkit with a manually advanced clock.
#[derive(Clone, Default)]
pub struct LoopToolkit {
    state: Rc<RefCell<LoopState>>,
    monitors: Rc<RefCell<Vec<Rect>>>,
    composited: Rc<RefCell<bool>>,
}

impl LoopToolkit {
    pub fn new() -> Self {
        let tk = Self::default();
        *tk.composited.borrow_mut() = true;
        tk.set_monitors(vec![Rect::new(0.0, 0.0, 1920.0, 1080.0)]);
        tk
    }

    pub fn set_monitors(&self, monitors: Vec<Rect>) {
        *self.monitors.borrow_mut() = monitors;
    }

    pub fn set_composited(&self, composited: bool) {
        *self.composited.borrow_mut() = composited;
    }

    /// Advance the clock, firing due timers and idle callbacks in order.
    pub fn advance(&self, delta: Duration) {
        let target = self.state.borrow().now + delta;
        loop {
            self.run_idle();

            let next = {
                let state = self.state.borrow();
                state.timers.keys().next().copied()
            };
            match next {
                Some((due, id)) if due <= target => {
                    {
                        let mut state = self.state.borrow_mut();
                        state.now = state.now.max(due);
                    }
                    self.fire(due, id);
                }
                _ => break,
            }
        }
        self.state.borrow_mut().now = target;
        self.run_idle();
    }

    /// Current number of scheduled timers.
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    fn run_idle(&self) {
        loop {
            let callbacks: Vec<_> = {
                let mut state = self.state.borrow_mut();
                std::mem::take(&mut state.idle)
            };
            if callbacks.is_empty() {
                break;
            }
            for callback in callbacks {
                callback();
            }
        }
    }

    fn fire(&self, due: Duration, id: TimerId) {
        let timer = self.state.borrow_mut().timers.remove(&(due, id));
        let Some(mut timer) = timer else {
            return;
        };

        // run outside the borrow, the callback may start/stop timers
        let repeat = (timer.callback)();
        if repeat {
            let mut state = self.state.borrow_mut();
            timer.due = state.now + timer.interval;
            let key = (timer.due, id);
            state.timers.insert(key, timer);
        }
    }
}

impl Toolkit for LoopToolkit {
    fn start_timer(&self, interval: Duration, callback: TimerCallback) -> TimerId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        let due = state.now + interval;
        state.timers.insert(
            (due, id),
            ScheduledTimer {
                due,
                interval,
                callback,
            },
        );
        id
    }

    fn stop_timer(&self, id: TimerId) {
        let mut state = self.state.borrow_mut();
        let key = state
            .timers
            .keys()
            .find(|(_, timer_id)| *timer_id == id)
            .copied();
        if let Some(key) = key {
            state.timers.remove(&key);
        }
    }

    fn idle_run(&self, callback: Box<dyn FnOnce()>) {
        self.state.borrow_mut().idle.push(callback);
    }

    fn now(&self) -> Duration {
        self.state.borrow().now
    }

    fn is_composited(&self) -> bool {
        *self.composited.borrow()
    }

    fn monitor_rects(&self) -> Vec<Rect> {
        self.monitors.borrow().clone()
    }

    fn workarea_rect(&self, monitor: usize) -> Rect {
        let monitors = self.monitors.borrow();
        monitors
            .get(monitor)
            .or_else(|| monitors.first())
            .copied()
            .unwrap_or_default()
    }
}
