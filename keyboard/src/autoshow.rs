//! Auto-show: reveal and dismiss the keyboard in response to focus
//! changes, guarded by named visibility locks.
//!
//! Each lock has a unique reason string, optional auto-release timer and
//! independent show/hide flags. Visibility requests made while a lock is
//! active are remembered per lock, so releasing it can apply the change
//! that arrived in the meantime.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::debug;

use crate::config::RepositionMethod;
use crate::context::Context;
use crate::geometry::{limit_position, Border, Point, Rect};
use crate::timer::Timer;

/// Delay from the last focus event until the keyboard is shown.
pub const SHOW_REACTION_TIME: Duration = Duration::from_millis(0);
/// Delay from the last focus event until the keyboard is hidden; raised
/// to reduce flicker on rapid focus changes.
pub const HIDE_REACTION_TIME: Duration = Duration::from_millis(300);

/// Geometry of the focused text entry.
#[derive(Debug, Clone, Default)]
pub struct UiElement {
    /// Extents of the entry widget itself.
    pub extents: Rect,
    /// Extents of the entry's top-level frame/window.
    pub frame_extents: Rect,
    pub single_line: bool,
}

/// What auto-show drives on the keyboard view.
pub trait VisibilityControl {
    fn begin_visibility_transition(&mut self, show: bool);
    fn stop_auto_positioning(&mut self);
    fn is_keyboard_visible(&self) -> bool;
}

struct AutoShowLock {
    timer: Option<Timer>,
    lock_show: bool,
    lock_hide: bool,
    /// Last visibility request made while this lock was active.
    visibility_change: Option<bool>,
}

pub struct AutoShow {
    context: Context,
    weak: Weak<RefCell<AutoShow>>,
    sink: Weak<RefCell<dyn VisibilityControl>>,

    enabled: bool,
    lock_visible: bool,
    /// Insertion-ordered; reasons are unique.
    locks: Vec<(String, AutoShowLock)>,
    auto_show_timer: Timer,

    active_element: Option<UiElement>,
    tablet_mode: Option<bool>,
    keyboard_device_detected: Option<bool>,
}

impl AutoShow {
    pub fn new(
        context: Context,
        sink: Weak<RefCell<dyn VisibilityControl>>,
    ) -> Rc<RefCell<AutoShow>> {
        Rc::new_cyclic(|weak| {
            RefCell::new(AutoShow {
                auto_show_timer: Timer::new(context.toolkit.clone()),
                context,
                weak: weak.clone(),
                sink,
                enabled: false,
                lock_visible: false,
                locks: Vec::new(),
                active_element: None,
                tablet_mode: None,
                keyboard_device_detected: None,
            })
        })
    }

    pub fn reset(&mut self) {
        self.auto_show_timer.stop();
        self.unlock_all();
    }

    pub fn enable(&mut self, enable: bool) {
        self.enabled = enable;
        if enable {
            self.lock_visible = false;
            self.locks.clear();
        } else {
            self.active_element = None;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Lock showing and/or hiding.
    ///
    /// There is one independent lock per unique `reason`; locking again
    /// replaces timer and flags. With a duration the lock auto-releases
    /// on expiry and applies the visibility change requested in between.
    pub fn lock(
        this: &Rc<RefCell<AutoShow>>,
        reason: &str,
        duration: Option<Duration>,
        lock_show: bool,
        lock_hide: bool,
    ) {
        let mut auto_show = this.borrow_mut();

        // discard pending hide/show actions
        auto_show.auto_show_timer.stop();

        let timer = duration.map(|duration| {
            let timer = Timer::new(auto_show.context.toolkit.clone());
            let weak = auto_show.weak.clone();
            let reason = reason.to_string();
            timer.start(duration, move || {
                if let Some(this) = weak.upgrade() {
                    AutoShow::on_lock_timer(&this, &reason);
                }
                false
            });
            timer
        });

        match auto_show.find_lock(reason) {
            Some(index) => {
                let lock = &mut auto_show.locks[index].1;
                if let Some(old) = lock.timer.take() {
                    old.stop();
                }
                lock.timer = timer;
                lock.lock_show = lock_show;
                lock.lock_hide = lock_hide;
            }
            None => {
                auto_show.locks.push((
                    reason.to_string(),
                    AutoShowLock {
                        timer,
                        lock_show,
                        lock_hide,
                        visibility_change: None,
                    },
                ));
            }
        }

        debug!(reason, lock_show, lock_hide, "auto-show lock");
    }

    fn on_lock_timer(this: &Rc<RefCell<AutoShow>>, reason: &str) {
        let change = AutoShow::unlock(this, reason);
        // apply the request deferred while the lock was held
        if let Some(visible) = change {
            AutoShow::request_keyboard_visible(this, visible, None);
        }
    }

    /// Remove the lock named `reason`.
    ///
    /// Returns the visibility change requested during the lock's
    /// lifetime, `None` for no change.
    pub fn unlock(this: &Rc<RefCell<AutoShow>>, reason: &str) -> Option<bool> {
        let mut auto_show = this.borrow_mut();
        let index = auto_show.find_lock(reason)?;
        let (_, lock) = auto_show.locks.remove(index);
        if let Some(timer) = lock.timer {
            timer.stop();
        }
        debug!(reason, "auto-show unlock");
        lock.visibility_change
    }

    pub fn unlock_all(&mut self) {
        for (_, lock) in &self.locks {
            if let Some(timer) = &lock.timer {
                timer.stop();
            }
        }
        self.locks.clear();
    }

    pub fn is_locked(&self, reason: &str) -> bool {
        self.find_lock(reason).is_some()
    }

    pub fn is_show_locked(&self) -> bool {
        self.locks.iter().any(|(_, lock)| lock.lock_show)
    }

    pub fn is_hide_locked(&self) -> bool {
        self.locks.iter().any(|(_, lock)| lock.lock_hide)
    }

    fn find_lock(&self, reason: &str) -> Option<usize> {
        self.locks.iter().position(|(r, _)| r == reason)
    }

    /// Lock the window permanently visible in response to the user
    /// showing it; optionally freeze hiding/showing for `thaw_time`.
    pub fn lock_visible(this: &Rc<RefCell<AutoShow>>, lock: bool, thaw_time: Option<Duration>) {
        let thaw_time = thaw_time.unwrap_or(Duration::from_secs(1));

        {
            let mut auto_show = this.borrow_mut();
            auto_show.lock_visible = lock;
        }

        if !thaw_time.is_zero() {
            AutoShow::lock(this, "lock_visible", Some(thaw_time), true, true);
        }

        // leave the window in its current state, discard pending actions
        let sink = {
            let auto_show = this.borrow_mut();
            auto_show.auto_show_timer.stop();
            if lock {
                auto_show.sink.upgrade()
            } else {
                None
            }
        };
        if let Some(sink) = sink {
            sink.borrow_mut().stop_auto_positioning();
        }
    }

    pub fn is_visibility_locked(&self) -> bool {
        self.lock_visible
    }

    pub fn is_text_entry_active(&self) -> bool {
        self.active_element.is_some()
    }

    pub fn active_element(&self) -> Option<UiElement> {
        self.active_element.clone()
    }

    pub fn can_hide_keyboard(&self) -> bool {
        !self.is_hide_locked()
    }

    pub fn can_show_keyboard(&self) -> bool {
        if self.is_show_locked() {
            return false;
        }

        let config = self.context.config.borrow();
        if config.auto_show.tablet_mode_detection_enabled && self.tablet_mode == Some(false) {
            return false;
        }
        if config.auto_show.keyboard_device_detection_enabled
            && self.keyboard_device_detected == Some(true)
        {
            return false;
        }
        true
    }

    /// A text entry gained or lost focus.
    pub fn on_text_entry_activated(this: &Rc<RefCell<AutoShow>>, element: Option<UiElement>) {
        let visible = element.is_some();
        this.borrow_mut().active_element = element;
        AutoShow::request_keyboard_visible(this, visible, None);
    }

    /// Show the keyboard on click of an already focused single-line
    /// entry, without bothering longer documents.
    pub fn on_text_caret_moved(this: &Rc<RefCell<AutoShow>>) {
        let element = {
            let auto_show = this.borrow();
            if !auto_show.context.config.borrow().auto_show.enabled {
                return;
            }
            let visible = auto_show
                .sink
                .upgrade()
                .map(|s| s.borrow().is_keyboard_visible())
                .unwrap_or(false);
            if visible {
                return;
            }
            auto_show.active_element.clone()
        };

        if let Some(element) = element {
            if element.single_line {
                AutoShow::on_text_entry_activated(this, Some(element));
            }
        }
    }

    pub fn on_tablet_mode_changed(this: &Rc<RefCell<AutoShow>>, active: bool) {
        this.borrow_mut().tablet_mode = Some(active);
        AutoShow::handle_tablet_mode_changed(this, active);
    }

    pub fn on_keyboard_device_detection_changed(this: &Rc<RefCell<AutoShow>>, detected: bool) {
        this.borrow_mut().keyboard_device_detected = Some(detected);
        AutoShow::handle_tablet_mode_changed(this, !detected);
    }

    fn handle_tablet_mode_changed(this: &Rc<RefCell<AutoShow>>, tablet_mode_active: bool) {
        let show = if tablet_mode_active {
            this.borrow().is_text_entry_active()
        } else {
            // hide even if it was locked visible
            AutoShow::lock_visible(this, false, Some(Duration::ZERO));
            false
        };
        AutoShow::request_keyboard_visible(this, show, None);
    }

    /// Called on an external key press: hide immediately and keep hidden
    /// for `duration`.
    pub fn lock_and_hide(this: &Rc<RefCell<AutoShow>>, reason: &str, duration: Option<Duration>) {
        if !this.borrow().is_locked(reason) {
            AutoShow::request_keyboard_visible(this, false, Some(Duration::ZERO));
        }
        // block showing the keyboard
        AutoShow::lock(this, reason, duration, true, false);
    }

    /// Request a visibility change, honoring locks and reaction times.
    pub fn request_keyboard_visible(
        this: &Rc<RefCell<AutoShow>>,
        visible: bool,
        delay: Option<Duration>,
    ) {
        let (apply, sink) = {
            let mut auto_show = this.borrow_mut();

            // Remember the request per lock; that tells each lock the
            // span in which its visibility change occurred.
            for (_, lock) in &mut auto_show.locks {
                lock.visibility_change = Some(visible);
            }

            // Always allow showing even when locked visible.
            let visible = if auto_show.lock_visible { true } else { visible };

            let can_hide = auto_show.can_hide_keyboard();
            let can_show = auto_show.can_show_keyboard();
            debug!(visible, can_hide, can_show, "request keyboard visible");

            let apply = (!visible && can_hide) || (visible && can_show);
            (apply.then_some(visible), auto_show.sink.upgrade())
        };

        if let Some(visible) = apply {
            AutoShow::show_keyboard(this, visible, delay);
        }

        // The active element changed; tracking the previous one would
        // cause erratic movement during quick focus changes.
        if let Some(sink) = sink {
            sink.borrow_mut().stop_auto_positioning();
        }
    }

    /// Begin the show/hide transition after the reaction time.
    fn show_keyboard(this: &Rc<RefCell<AutoShow>>, show: bool, delay: Option<Duration>) {
        // Don't act on each and every focus message; only the last of a
        // quick burst wins.
        let delay = delay.unwrap_or(if show {
            SHOW_REACTION_TIME
        } else {
            HIDE_REACTION_TIME
        });

        let timer = this.borrow().auto_show_timer.clone();
        if delay.is_zero() {
            timer.stop();
            AutoShow::begin_transition(this, show);
        } else {
            let weak = this.borrow().weak.clone();
            timer.start(delay, move || {
                if let Some(this) = weak.upgrade() {
                    AutoShow::begin_transition(&this, show);
                }
                false
            });
        }
    }

    fn begin_transition(this: &Rc<RefCell<AutoShow>>, show: bool) {
        let sink = this.borrow().sink.upgrade();
        if let Some(sink) = sink {
            sink.borrow_mut().begin_visibility_transition(show);
        }
    }

    /// The window rect suggested by auto-show repositioning, `None` when
    /// no repositioning is required.
    #[allow(clippy::too_many_arguments)]
    pub fn get_repositioned_window_rect(
        &self,
        method: RepositionMethod,
        home: Rect,
        limit_rects: &[Rect],
        test_clearance: Border,
        move_clearance: Border,
        horizontal: bool,
        vertical: bool,
    ) -> Option<Rect> {
        let element = self.active_element.as_ref()?;
        let acc_rect = element.extents;
        if acc_rect.is_empty() || self.lock_visible {
            return None;
        }

        let pt = match method {
            RepositionMethod::ReduceTravel => self.find_close_position(
                home,
                element.frame_extents,
                acc_rect,
                limit_rects,
                test_clearance,
                move_clearance,
                horizontal,
                vertical,
            ),
            RepositionMethod::PreventOcclusion => self.find_non_occluding_position(
                home,
                acc_rect,
                limit_rects,
                test_clearance,
                move_clearance,
                horizontal,
                vertical,
            ),
            RepositionMethod::None => None,
        };

        pt.map(|pt| Rect::new(pt.x, pt.y, home.w, home.h))
    }

    /// "Follow the active window": prefer positions near the focused
    /// entry, fall back to occlusion avoidance.
    #[allow(clippy::too_many_arguments)]
    fn find_close_position(
        &self,
        home: Rect,
        app_rect: Rect,
        acc_rect: Rect,
        limit_rects: &[Rect],
        test_clearance: Border,
        move_clearance: Border,
        horizontal: bool,
        vertical: bool,
    ) -> Option<Point> {
        // Closer clearance for toplevels; there's usually nothing that
        // can be obscured next to them.
        let move_clearance_frame = Border::uniform(10.0);

        let ra = acc_rect.inflate(move_clearance);
        let rp = if !app_rect.is_empty() {
            app_rect.inflate(move_clearance_frame)
        } else {
            Rect::default()
        };

        struct Candidate {
            pt: Point,
            collision: Rect,
        }
        let mut candidates: Vec<Candidate> = Vec::new();

        if vertical {
            let mut xc = acc_rect.center().x - home.w / 2.0;
            if app_rect.w > home.w {
                xc = xc.max(app_rect.left());
                xc = xc.min(app_rect.right() - home.w);
            }

            if !app_rect.is_empty() {
                // below the window
                candidates.push(Candidate {
                    pt: Point::new(xc, rp.bottom()),
                    collision: app_rect,
                });
                // above the window
                candidates.push(Candidate {
                    pt: Point::new(xc, rp.top() - home.h),
                    collision: app_rect,
                });
            }

            // inside a maximized window, y at home.y
            candidates.push(Candidate {
                pt: Point::new(xc, home.y),
                collision: acc_rect,
            });
            // below the text entry
            candidates.push(Candidate {
                pt: Point::new(xc, ra.bottom()),
                collision: acc_rect,
            });
            // above the text entry
            candidates.push(Candidate {
                pt: Point::new(xc, ra.top() - home.h),
                collision: acc_rect,
            });
        }

        for c in candidates {
            let pl = limit_position(c.pt, home.size(), limit_rects);
            let r = Rect::new(pl.x, pl.y, home.w, home.h);
            if !r.intersects(&c.collision) && !r.intersects(&acc_rect) {
                return Some(r.position());
            }
        }

        // try again, this time horizontally and vertically
        self.find_non_occluding_position(
            home,
            acc_rect,
            limit_rects,
            test_clearance,
            move_clearance,
            horizontal,
            vertical,
        )
    }

    /// "Only move when necessary": leave home only when it would occlude
    /// the focused entry; the candidate closest to home wins.
    #[allow(clippy::too_many_arguments)]
    fn find_non_occluding_position(
        &self,
        home: Rect,
        acc_rect: Rect,
        limit_rects: &[Rect],
        test_clearance: Border,
        move_clearance: Border,
        horizontal: bool,
        vertical: bool,
    ) -> Option<Point> {
        // Clearance accounts for window frames and position errors of
        // the reported extents.
        let ra = acc_rect.inflate(test_clearance);
        if !home.intersects(&ra) {
            return None;
        }

        // leave a different clearance for the new positions
        let ra = acc_rect.inflate(move_clearance);
        let pt = home.position();

        let mut candidates: Vec<Point> = Vec::new();
        if horizontal {
            candidates.push(Point::new(ra.left() - home.w, pt.y)); // west
            candidates.push(Point::new(ra.right(), pt.y)); // east
        }
        if vertical {
            candidates.push(Point::new(pt.x, ra.top() - home.h)); // north
            candidates.push(Point::new(pt.x, ra.bottom())); // south
        }

        // limited, non-intersecting candidate rectangles
        let mut valid: Vec<Rect> = Vec::new();
        for p in candidates {
            let pl = limit_position(p, home.size(), limit_rects);
            let r = Rect::new(pl.x, pl.y, home.w, home.h);
            if !r.intersects(&ra) {
                valid.push(r);
            }
        }

        // the candidate with the smallest center-to-center distance wins
        let ch = home.center();
        valid
            .into_iter()
            .min_by(|a, b| {
                let da = ch.distance2(&a.center());
                let db = ch.distance2(&b.center());
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|r| r.position())
    }
}
