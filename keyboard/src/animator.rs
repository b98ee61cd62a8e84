//! Drives visibility, opacity and position transitions of the keyboard
//! view.
//!
//! Four transition variables (visible, active, x, y) advance on a 20 ms
//! step timer with sine-eased interpolation. When all variables are done
//! the target visibility is committed to the backing window and the
//! inactivity timer is re-armed.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::debug;

use crate::context::Context;
use crate::geometry::{Point, Rect};
use crate::timer::Timer;

pub const TRANSITION_DURATION_MOVE: Duration = Duration::from_millis(250);
pub const TRANSITION_DURATION_SLIDE: Duration = Duration::from_millis(250);
pub const TRANSITION_DURATION_OPACITY_HIDE: Duration = Duration::from_millis(300);

/// Milliseconds between transition steps.
const TRANSITION_STEP: Duration = Duration::from_millis(20);

/// What the animator drives; implemented by the keyboard view.
pub trait AnimatorTarget {
    fn is_visible(&self) -> bool;
    fn set_visible(&mut self, visible: bool);

    fn get_rect(&self) -> Rect;
    fn reposition(&mut self, pt: Point);

    /// Apply a new opacity; returns true when it actually changed.
    fn set_opacity(&mut self, opacity: f64) -> bool;

    fn get_visible_rect(&self) -> Rect;
    fn get_docking_hideout_rect(&self) -> Rect;
    /// Re-resolve the docking monitor; returns true when it changed.
    fn update_docking_monitor_index(&mut self) -> bool;

    fn close_key_popup(&mut self) {}
    fn stop_auto_positioning(&mut self) {}
    fn begin_inactivity_timer_transition(&mut self, _active: bool) {}
    fn on_transition_done(&mut self, _visible_before: bool, _visible_later: bool) {}
}

/// One variable taking part in opacity/position transitions.
#[derive(Debug, Clone, Default)]
struct TransitionVariable {
    value: f64,
    target_value: f64,
    start_value: f64,
    start_time: Duration,
    duration: Duration,
    done: bool,
}

impl TransitionVariable {
    fn start_transition(&mut self, target: f64, duration: Duration, now: Duration) {
        self.start_value = self.value;
        self.target_value = target;
        self.start_time = now;
        self.duration = duration;
        self.done = false;
    }

    /// Update `value` from the elapsed time since `start_transition`.
    fn update(&mut self, now: Duration) {
        let range = self.target_value - self.start_value;

        let lin_progress = if range != 0.0 && !self.duration.is_zero() {
            let elapsed = now.saturating_sub(self.start_time);
            (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
        } else {
            1.0
        };

        let sin_progress = ((lin_progress * std::f64::consts::PI - std::f64::consts::PI / 2.0)
            .sin()
            + 1.0)
            / 2.0;
        self.value = self.start_value + sin_progress * range;
        self.done = lin_progress >= 1.0;
    }
}

/// All state variables involved in transitions.
#[derive(Debug)]
struct TransitionState {
    visible: TransitionVariable,
    /// Opacity factor of the inactivity fade.
    active: TransitionVariable,
    x: TransitionVariable,
    y: TransitionVariable,
    target_visibility: bool,
}

impl Default for TransitionState {
    fn default() -> Self {
        // the keyboard starts out "active"; the inactivity fade lowers
        // this later
        let mut active = TransitionVariable::default();
        active.value = 1.0;
        active.target_value = 1.0;
        Self {
            visible: TransitionVariable::default(),
            active,
            x: TransitionVariable::default(),
            y: TransitionVariable::default(),
            target_visibility: false,
        }
    }
}

impl TransitionState {
    fn update(&mut self, now: Duration) {
        self.visible.update(now);
        self.active.update(now);
        self.x.update(now);
        self.y.update(now);
    }

    fn is_done(&self) -> bool {
        self.visible.done && self.active.done && self.x.done && self.y.done
    }

    fn max_pending_duration(&self) -> Duration {
        let mut d = Duration::ZERO;
        for var in [&self.visible, &self.active, &self.x, &self.y] {
            if !var.done {
                d = d.max(var.duration);
            }
        }
        d
    }

    fn set_all_done(&mut self) {
        self.visible.done = true;
        self.active.done = true;
        self.x.done = true;
        self.y.done = true;
    }
}

pub struct KeyboardAnimator {
    context: Context,
    weak: Weak<RefCell<KeyboardAnimator>>,
    target: Weak<RefCell<dyn AnimatorTarget>>,

    state: TransitionState,
    transition_timer: Timer,
}

impl KeyboardAnimator {
    pub fn new(
        context: Context,
        target: Weak<RefCell<dyn AnimatorTarget>>,
    ) -> Rc<RefCell<KeyboardAnimator>> {
        Rc::new_cyclic(|weak| {
            RefCell::new(KeyboardAnimator {
                transition_timer: Timer::new(context.toolkit.clone()),
                context,
                weak: weak.clone(),
                target,
                state: TransitionState::default(),
            })
        })
    }

    /// Current target visibility of the running/last transition.
    pub fn target_visibility(&self) -> bool {
        self.state.target_visibility
    }

    /// Begin a show/hide transition; returns true when any variable
    /// started changing.
    pub fn transition_visible_to(
        this: &Rc<RefCell<KeyboardAnimator>>,
        visible: bool,
        opacity_duration: Option<Duration>,
        slide_duration: Option<Duration>,
    ) -> bool {
        let target_rc = this.borrow().target.upgrade();
        let Some(target_rc) = target_rc else {
            return false;
        };

        let mut animator = this.borrow_mut();
        let mut target = target_rc.borrow_mut();
        let now = animator.context.now();
        let mut result = false;

        // hide the popup, it doesn't survive transitions
        if !visible {
            target.close_key_popup();
            target.stop_auto_positioning();
        }

        let docking_enabled = animator.context.config.borrow().window.docking_enabled;

        let mut opacity_duration = opacity_duration;
        let opacity_visible;

        if docking_enabled {
            let slide_duration = slide_duration.unwrap_or(TRANSITION_DURATION_SLIDE);
            opacity_duration = Some(Duration::ZERO);
            opacity_visible = true;

            let visible_before = target.is_visible();
            let visible_later = visible;

            let hideout_old_mon = target.get_docking_hideout_rect();
            let mon_changed = target.update_docking_monitor_index();
            let hideout_new_mon = if mon_changed {
                target.get_docking_hideout_rect()
            } else {
                hideout_old_mon
            };

            // Only position here when visibility or the docking monitor
            // changed; auto-positioning moves the visible keyboard.
            let mut begin_rect = Rect::default();
            let mut end_rect = Rect::default();
            if visible_before != visible_later || mon_changed {
                if visible {
                    begin_rect = hideout_new_mon;
                    end_rect = target.get_visible_rect();
                } else {
                    begin_rect = target.get_rect();
                    end_rect = hideout_old_mon;
                }
            }

            animator.state.x.value = begin_rect.x;
            animator.state.y.value = begin_rect.y;
            let x = end_rect.x;
            let y = end_rect.y;

            result |= animator.init_transition_x(x, slide_duration, now);
            result |= animator.init_transition_y(y, slide_duration, now);
        } else {
            opacity_visible = visible;
        }

        let opacity_duration = opacity_duration.unwrap_or(if opacity_visible {
            // no duration when showing, don't fight the compositor
            Duration::ZERO
        } else {
            TRANSITION_DURATION_OPACITY_HIDE
        });

        result |= animator.init_opacity_transition_visible(opacity_visible, opacity_duration, now);
        animator.state.target_visibility = visible;

        result
    }

    /// Fade between active and inactive opacity.
    pub fn transition_active_to(
        this: &Rc<RefCell<KeyboardAnimator>>,
        active: bool,
        duration: Option<Duration>,
    ) -> bool {
        let duration = duration.unwrap_or(if active {
            Duration::from_millis(150)
        } else {
            Duration::from_millis(300)
        });

        let mut animator = this.borrow_mut();
        let now = animator.context.now();
        let is_composited = animator.context.toolkit.is_composited();
        let duration = if is_composited { duration } else { Duration::ZERO };
        let target_value = if active { 1.0 } else { 0.0 };
        let state = &mut animator.state;
        Self::init_transition(&mut state.active, target_value, duration, now)
    }

    /// Slide to a new position.
    pub fn transition_position_to(this: &Rc<RefCell<KeyboardAnimator>>, pt: Point) -> bool {
        let target_rc = this.borrow().target.upgrade();
        let Some(target_rc) = target_rc else {
            return false;
        };
        let begin_rect = target_rc.borrow().get_rect();

        let mut animator = this.borrow_mut();
        let now = animator.context.now();
        animator.state.x.value = begin_rect.x;
        animator.state.y.value = begin_rect.y;

        let mut result = false;
        result |= animator.init_transition_x(pt.x, TRANSITION_DURATION_MOVE, now);
        result |= animator.init_transition_y(pt.y, TRANSITION_DURATION_MOVE, now);
        result
    }

    /// Adopt a rect moved by other means, without animating.
    pub fn sync_transition_position(&mut self, rect: Rect) {
        self.state.x.value = rect.x;
        self.state.y.value = rect.y;
        self.state.x.target_value = rect.x;
        self.state.y.target_value = rect.y;
    }

    fn init_opacity_transition_visible(
        &mut self,
        visible: bool,
        duration: Duration,
        now: Duration,
    ) -> bool {
        // no fade for screens that can't fade
        let duration = if self.context.toolkit.is_composited() {
            duration
        } else {
            Duration::ZERO
        };
        let target_value = if visible { 1.0 } else { 0.0 };
        Self::init_transition(&mut self.state.visible, target_value, duration, now)
    }

    fn init_transition_x(&mut self, target: f64, duration: Duration, now: Duration) -> bool {
        Self::init_transition(&mut self.state.x, target, duration, now)
    }

    fn init_transition_y(&mut self, target: f64, duration: Duration, now: Duration) -> bool {
        Self::init_transition(&mut self.state.y, target, duration, now)
    }

    fn init_transition(
        var: &mut TransitionVariable,
        target_value: f64,
        duration: Duration,
        now: Duration,
    ) -> bool {
        // transition not yet in progress?
        if var.target_value != target_value {
            var.start_transition(target_value, duration, now);
            return true;
        }
        false
    }

    /// Start stepping; zero-duration transitions are applied at once.
    pub fn commit_transition(this: &Rc<RefCell<KeyboardAnimator>>) {
        let duration = this.borrow().state.max_pending_duration();
        if duration.is_zero() {
            Self::on_transition_step(this);
        } else {
            let timer = this.borrow().transition_timer.clone();
            let weak = this.borrow().weak.clone();
            timer.start(TRANSITION_STEP, move || match weak.upgrade() {
                Some(this) => Self::on_transition_step(&this),
                None => false,
            });
        }
    }

    fn on_transition_step(this: &Rc<RefCell<KeyboardAnimator>>) -> bool {
        let target_rc = this.borrow().target.upgrade();
        let Some(target_rc) = target_rc else {
            return false;
        };

        let (done, opacity, pt, visible_later) = {
            let mut animator = this.borrow_mut();
            let now = animator.context.now();
            animator.state.update(now);

            let config = animator.context.config.borrow();
            let active_opacity = config.window.transparency;
            let inactive_opacity = config.window.inactive_transparency;
            drop(config);

            let state = &animator.state;
            let mut opacity =
                inactive_opacity + state.active.value * (active_opacity - inactive_opacity);
            opacity *= state.visible.value;

            (
                state.is_done(),
                opacity,
                Point::new(state.x.value, state.y.value),
                state.target_visibility,
            )
        };

        let mut target = target_rc.borrow_mut();

        if target.set_opacity(opacity) {
            debug!(opacity, "transition opacity");
        }

        let visible_before = target.is_visible();

        // move
        if target.get_rect().position() != pt {
            target.reposition(pt);
        }

        // show/hide
        let visible = ((visible_before || visible_later) && !done) || (visible_later && done);
        if target.is_visible() != visible {
            target.set_visible(visible);

            // Leaving the pointer inside the window doesn't start the
            // inactivity timer; do it when hiding.
            if !visible {
                target.begin_inactivity_timer_transition(false);
            }

            if done {
                target.on_transition_done(visible_before, visible_later);
            }
        }

        if done {
            // keep finished variables out of max_pending_duration
            this.borrow_mut().state.set_all_done();
        }

        !done
    }

    /// Run any pending step now; no delayed callback can race after this.
    pub fn finish(this: &Rc<RefCell<KeyboardAnimator>>) {
        let timer = this.borrow().transition_timer.clone();
        timer.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::toolkit::LoopToolkit;

    #[derive(Default)]
    struct FakeView {
        visible: bool,
        opacity: f64,
        rect: Rect,
        transitions_done: usize,
    }

    impl AnimatorTarget for FakeView {
        fn is_visible(&self) -> bool {
            self.visible
        }
        fn set_visible(&mut self, visible: bool) {
            self.visible = visible;
        }
        fn get_rect(&self) -> Rect {
            self.rect
        }
        fn reposition(&mut self, pt: Point) {
            self.rect = self.rect.with_position(pt);
        }
        fn set_opacity(&mut self, opacity: f64) -> bool {
            let changed = (self.opacity - opacity).abs() > f64::EPSILON;
            self.opacity = opacity;
            changed
        }
        fn get_visible_rect(&self) -> Rect {
            Rect::new(0.0, 800.0, 1000.0, 280.0)
        }
        fn get_docking_hideout_rect(&self) -> Rect {
            Rect::new(0.0, 1090.0, 1000.0, 280.0)
        }
        fn update_docking_monitor_index(&mut self) -> bool {
            false
        }
        fn on_transition_done(&mut self, _before: bool, _later: bool) {
            self.transitions_done += 1;
        }
    }

    fn setup() -> (
        Rc<LoopToolkit>,
        Rc<RefCell<FakeView>>,
        Rc<RefCell<KeyboardAnimator>>,
    ) {
        let toolkit = Rc::new(LoopToolkit::new());
        let context = Context::new(toolkit.clone(), Config::default());
        let view = Rc::new(RefCell::new(FakeView::default()));
        let view_dyn: Rc<RefCell<dyn AnimatorTarget>> = view.clone();
        let animator = KeyboardAnimator::new(context, Rc::downgrade(&view_dyn));
        (toolkit, view, animator)
    }

    #[test]
    fn show_is_instant_hide_fades() {
        let (toolkit, view, animator) = setup();

        assert!(KeyboardAnimator::transition_visible_to(
            &animator, true, None, None
        ));
        KeyboardAnimator::commit_transition(&animator);
        assert!(view.borrow().visible);
        assert!((view.borrow().opacity - 1.0).abs() < 1e-9);

        assert!(KeyboardAnimator::transition_visible_to(
            &animator, false, None, None
        ));
        KeyboardAnimator::commit_transition(&animator);
        // still fading
        assert!(view.borrow().visible);

        toolkit.advance(Duration::from_millis(400));
        assert!(!view.borrow().visible);
        assert!(view.borrow().opacity.abs() < 1e-9);
    }

    #[test]
    fn docked_transition_slides() {
        let (toolkit, view, animator) = setup();
        animator
            .borrow()
            .context
            .config
            .borrow_mut()
            .window
            .docking_enabled = true;
        view.borrow_mut().rect = Rect::new(0.0, 1090.0, 1000.0, 280.0);

        KeyboardAnimator::transition_visible_to(&animator, true, None, None);
        KeyboardAnimator::commit_transition(&animator);

        toolkit.advance(Duration::from_millis(125));
        let mid_y = view.borrow().rect.y;
        assert!(mid_y < 1090.0, "sliding up, y = {}", mid_y);

        toolkit.advance(Duration::from_millis(300));
        assert_eq!(view.borrow().rect.y, 800.0);
        assert!(view.borrow().visible);
    }
}
