//! Component-owned timers.
//!
//! A [`Timer`] owns its callback and registers a thin trampoline with the
//! toolkit. Stopping is synchronous, and [`Timer::finish`] runs a pending
//! callback immediately - the receiver relies on that to flush a delayed
//! sequence begin before handling the matching update or end.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::toolkit::{TimerId, Toolkit};

type Callback = Box<dyn FnMut() -> bool>;

#[derive(Default)]
struct TimerState {
    callback: Option<Callback>,
    timer_id: Option<TimerId>,
    /// Bumped on every start/stop; a stale trampoline firing after a
    /// restart must not touch the new registration.
    generation: u64,
}

/// A restartable one-shot/repeating timer owned by one component.
#[derive(Clone)]
pub struct Timer {
    toolkit: Rc<dyn Toolkit>,
    state: Rc<RefCell<TimerState>>,
}

impl Timer {
    pub fn new(toolkit: Rc<dyn Toolkit>) -> Self {
        Self {
            toolkit,
            state: Rc::new(RefCell::new(TimerState::default())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().timer_id.is_some()
    }

    /// Start (or restart) with `callback`; returning `true` keeps the
    /// timer repeating at `interval`.
    pub fn start(&self, interval: Duration, callback: impl FnMut() -> bool + 'static) {
        self.stop();

        let generation = {
            let mut state = self.state.borrow_mut();
            state.callback = Some(Box::new(callback));
            state.generation += 1;
            state.generation
        };

        let state_rc = Rc::downgrade(&self.state);
        let id = self.toolkit.start_timer(
            interval,
            Box::new(move || {
                let Some(state_rc) = state_rc.upgrade() else {
                    return false;
                };

                // take the callback out so it may start/stop this very
                // timer without re-entering the borrow
                let callback = {
                    let mut state = state_rc.borrow_mut();
                    if state.generation != generation {
                        return false; // restarted behind our back
                    }
                    state.callback.take()
                };
                let Some(mut callback) = callback else {
                    return false;
                };

                let repeat = callback();

                let mut state = state_rc.borrow_mut();
                if state.generation != generation {
                    // the callback itself restarted the timer
                    return false;
                }
                if repeat {
                    state.callback = Some(callback);
                    true
                } else {
                    state.callback = None;
                    state.timer_id = None;
                    false
                }
            }),
        );

        let mut state = self.state.borrow_mut();
        if state.generation == generation {
            state.timer_id = Some(id);
        } else {
            // restarted from within a zero-delay fire; drop the stale
            // registration
            self.toolkit.stop_timer(id);
        }
    }

    pub fn stop(&self) {
        let id = {
            let mut state = self.state.borrow_mut();
            state.callback = None;
            state.generation += 1;
            state.timer_id.take()
        };
        if let Some(id) = id {
            self.toolkit.stop_timer(id);
        }
    }

    /// If the timer is pending, stop it and run the callback now.
    ///
    /// Cancellation stays synchronous with the cancelling code path; no
    /// delayed event can race past this call.
    pub fn finish(&self) {
        let callback = {
            let mut state = self.state.borrow_mut();
            if state.timer_id.is_none() {
                return;
            }
            state.callback.take()
        };
        self.stop();
        if let Some(mut callback) = callback {
            callback();
        }
    }
}
