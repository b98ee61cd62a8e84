//! Auto-hide on external key presses.
//!
//! When a hardware keyboard is typed on, the on-screen keyboard gets out
//! of the way: it hides and a timed auto-show lock keeps it hidden for a
//! configured pause.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use crate::autoshow::AutoShow;
use crate::context::Context;
use crate::event::Event;

/// Lock reason used for hide-on-key-press.
pub const LOCK_REASON: &str = "hide-on-key-press";

pub struct AutoHide {
    context: Context,
    auto_show: Rc<RefCell<AutoShow>>,
    /// Names of real keyboard devices reported by the device tracker;
    /// empty means "trust every key event".
    keyboard_device_names: Vec<String>,
    /// Hotkeys reserved for tablet-mode switching; they never auto-hide.
    tablet_mode_enter_keycode: u32,
    tablet_mode_leave_keycode: u32,
}

impl AutoHide {
    pub fn new(context: Context, auto_show: Rc<RefCell<AutoShow>>) -> Self {
        Self {
            context,
            auto_show,
            keyboard_device_names: Vec::new(),
            tablet_mode_enter_keycode: 0,
            tablet_mode_leave_keycode: 0,
        }
    }

    /// Update the list of known physical keyboard devices.
    pub fn on_devices_updated(&mut self, names: Vec<String>) {
        let tablet_detection = self
            .context
            .config
            .borrow()
            .auto_show
            .tablet_mode_detection_enabled;
        self.keyboard_device_names = if tablet_detection {
            names.into_iter().map(|n| n.to_lowercase()).collect()
        } else {
            Vec::new()
        };
        debug!(devices = ?self.keyboard_device_names, "keyboard devices updated");
    }

    pub fn set_tablet_mode_keycodes(&mut self, enter: u32, leave: u32) {
        self.tablet_mode_enter_keycode = enter;
        self.tablet_mode_leave_keycode = leave;
    }

    /// A key press arrived from outside the on-screen keyboard.
    pub fn on_key_press(&self, event: &Event) {
        let (enabled, tablet_detection, pause) = {
            let config = self.context.config.borrow();
            (
                config.auto_show.hide_on_key_press,
                config.auto_show.tablet_mode_detection_enabled,
                config.auto_show.hide_on_key_press_pause,
            )
        };
        if !enabled {
            return;
        }

        // Kernel drivers can send hotkeys when switching tablet mode;
        // those belong to tablet-mode detection, not auto-hide.
        if tablet_detection && !self.is_real_keyboard_event(event) {
            return;
        }
        if event.keycode != 0
            && (event.keycode == self.tablet_mode_enter_keycode
                || event.keycode == self.tablet_mode_leave_keycode)
        {
            return;
        }

        let duration = Duration::from_secs_f64(pause.max(0.0));
        AutoShow::lock_and_hide(&self.auto_show, LOCK_REASON, Some(duration));
    }

    pub fn is_auto_show_locked(&self) -> bool {
        self.auto_show.borrow().is_locked(LOCK_REASON)
    }

    pub fn auto_show_unlock(&self) {
        AutoShow::unlock(&self.auto_show, LOCK_REASON);
    }

    fn is_real_keyboard_event(&self, event: &Event) -> bool {
        if self.keyboard_device_names.is_empty() {
            return true;
        }
        let name = event.source_device_name.to_lowercase();
        self.keyboard_device_names.iter().any(|n| *n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoshow::VisibilityControl;
    use crate::config::Config;
    use crate::event::EventType;
    use crate::toolkit::LoopToolkit;

    #[derive(Default)]
    struct VisibilityLog {
        transitions: Vec<bool>,
    }

    impl VisibilityControl for VisibilityLog {
        fn begin_visibility_transition(&mut self, show: bool) {
            self.transitions.push(show);
        }
        fn stop_auto_positioning(&mut self) {}
        fn is_keyboard_visible(&self) -> bool {
            self.transitions.last().copied().unwrap_or(false)
        }
    }

    #[test]
    fn key_press_hides_and_locks() {
        let toolkit = Rc::new(LoopToolkit::new());
        let context = Context::new(toolkit.clone(), Config::default());
        let sink: Rc<RefCell<VisibilityLog>> = Rc::new(RefCell::new(VisibilityLog::default()));
        let sink_dyn: Rc<RefCell<dyn VisibilityControl>> = sink.clone();
        let auto_show = AutoShow::new(context.clone(), Rc::downgrade(&sink_dyn));
        let auto_hide = AutoHide::new(context, auto_show.clone());

        let mut key = Event::new(EventType::KeyPress);
        key.keycode = 30;
        auto_hide.on_key_press(&key);

        assert!(auto_hide.is_auto_show_locked());
        assert!(auto_show.borrow().is_show_locked());
        assert!(!auto_show.borrow().is_hide_locked());

        // the hide transition started immediately
        assert_eq!(sink.borrow().transitions, vec![false]);

        // lock auto-releases after the configured pause (1.8 s default)
        toolkit.advance(Duration::from_millis(1900));
        assert!(!auto_hide.is_auto_show_locked());

        // keep sink_dyn alive until here
        drop(sink_dyn);
    }
}
