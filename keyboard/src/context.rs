//! Shared context threaded through every component.
//!
//! Only the configuration and the toolkit callback table are
//! process-wide; components receive both through this value instead of
//! reaching for globals.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::config::Config;
use crate::toolkit::Toolkit;

#[derive(Clone)]
pub struct Context {
    pub toolkit: Rc<dyn Toolkit>,
    pub config: Rc<RefCell<Config>>,
}

impl Context {
    pub fn new(toolkit: Rc<dyn Toolkit>, config: Config) -> Self {
        Self {
            toolkit,
            config: Rc::new(RefCell::new(config)),
        }
    }

    /// Monotonic milliseconds, for update-time stamps and timeouts.
    pub fn now_ms(&self) -> u64 {
        self.toolkit.now().as_millis() as u64
    }

    pub fn now(&self) -> Duration {
        self.toolkit.now()
    }
}
