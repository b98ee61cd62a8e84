//! The keyboard view: a composite of layout views with interactive
//! show/hide, dwell activation, long-press popups, docking and window
//! manipulation.
//!
//! The view implements the animator target and the manipulatable frame;
//! thin bridge types adapt it to the receiver's [`SequenceTarget`] and
//! auto-show's [`VisibilityControl`] so that callbacks arriving from
//! those components can re-enter the view without conflicting borrows.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::animator::{AnimatorTarget, KeyboardAnimator};
use crate::autoshow::{AutoShow, VisibilityControl};
use crate::button::{ButtonAction, ButtonController, ButtonId};
use crate::config::{DockingEdge, DockingMonitor};
use crate::context::Context;
use crate::event::Event;
use crate::geometry::{limit_position, Border, Offset, Point, Rect, Size};
use crate::manipulator::{
    CursorType, Handle, HandleFunction, Manipulatable, ViewManipulator,
};
use crate::receiver::{CoordinateFrame, InputEventReceiver, SequenceTarget};
use crate::sequence::{InputSequence, InputSequencePtr};
use crate::timer::Timer;

/// Fallback dwell delay when no hover-click delay is configured.
const DWELL_DELAY_FALLBACK: Duration = Duration::from_secs(4);

/// How often dwell progress is refreshed.
const DWELL_UPDATE_INTERVAL: Duration = Duration::from_millis(50);

/// Distance the pointer must leave a dwelled key before it may dwell
/// again.
const DWELL_THRESHOLD: f64 = 5.0;

/// Delay before a popup closes after a release outside its keys.
const POPUP_UNPRESS_DELAY: Duration = Duration::from_millis(150);

/// Delay before the home rect is persisted after a move/resize.
const SAVE_POSITION_DELAY: Duration = Duration::from_secs(1);

/// Nominal popup size when the monitor reports no usable geometry.
const FALLBACK_POPUP_SIZE: f64 = 150.0;

/// Clearance between dock and hideout rect.
const HIDEOUT_CLEARANCE: f64 = 10.0;

/// One key of a layout.
#[derive(Debug, Clone, Default)]
pub struct LayoutKey {
    pub id: String,
    /// Canvas coordinates relative to the keyboard view.
    pub rect: Rect,
    /// Characters offered by the long-press popup.
    pub alternatives: Vec<String>,
    /// May this key activate through hovering?
    pub dwellable: bool,
}

impl LayoutKey {
    pub fn new(id: &str, rect: Rect) -> Self {
        Self {
            id: id.to_string(),
            rect,
            alternatives: Vec::new(),
            dwellable: false,
        }
    }

    pub fn with_alternatives(mut self, alternatives: &[&str]) -> Self {
        self.alternatives = alternatives.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn dwellable(mut self) -> Self {
        self.dwellable = true;
        self
    }
}

/// One keyboard layer rendered into the keyboard canvas.
#[derive(Debug, Clone, Default)]
pub struct LayoutView {
    pub rect: Rect,
    pub keys: Vec<LayoutKey>,
}

impl LayoutView {
    pub fn new(rect: Rect, keys: Vec<LayoutKey>) -> Self {
        Self { rect, keys }
    }

    pub fn hit_key(&self, pt: Point) -> Option<&LayoutKey> {
        self.keys.iter().find(|k| k.rect.contains(pt))
    }
}

/// Window operations supplied by the embedder.
pub trait ViewBackend {
    fn set_visible(&mut self, visible: bool);
    fn set_opacity(&mut self, opacity: f64);
    fn move_resize(&mut self, rect: Rect);
    fn queue_draw(&mut self);
    fn set_cursor_type(&mut self, _cursor: Option<CursorType>) {}
    fn grab_pointer(&mut self) -> bool {
        // failed grabs degrade silently to un-grabbed behavior
        false
    }
    fn ungrab_pointer(&mut self) {}
    /// Reserve screen space for a docked keyboard; no-op where struts
    /// aren't supported.
    fn set_struts(&mut self, _edge: Option<(DockingEdge, f64)>) {}
}

/// Receives semantic key activations.
pub trait KeySink {
    fn on_key_down(&mut self, key_id: &str);
    /// `cancelled` suppresses the key action, e.g. after a long press.
    fn on_key_up(&mut self, key_id: &str, cancelled: bool);
}

/// Long-press popup showing alternative characters of a key.
#[derive(Debug, Clone)]
pub struct LayoutPopup {
    /// Root coordinates.
    pub rect: Rect,
    pub keys: Vec<LayoutKey>,
    pub source_key: String,
    got_motion: bool,
}

impl LayoutPopup {
    fn hit_key(&self, canvas_pt: Point) -> Option<&LayoutKey> {
        self.keys.iter().find(|k| k.rect.contains(canvas_pt))
    }
}

/// Translation-only coordinate frame of a top-level rect.
#[derive(Debug, Clone, Copy)]
pub struct FrameOrigin(pub Point);

impl CoordinateFrame for FrameOrigin {
    fn canvas_to_root(&self, pt: Point) -> Point {
        pt + self.0
    }
    fn root_to_canvas(&self, pt: Point) -> Point {
        pt - self.0
    }
}

/// Saved window geometry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SavedPosition {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

/// The manipulatable window frame of the keyboard.
///
/// Split out of the view so the manipulator can mutate it while its own
/// drag state is borrowed.
pub struct ViewFrame {
    context: Context,
    backend: Rc<RefCell<dyn ViewBackend>>,
    pub rect: Rect,
    /// Combined aspect change applied by the dock's aspect handles;
    /// `None` until the user shrank the dock, meaning full width.
    pub aspect_change: Option<f64>,
    aspect_drag_start_width: f64,
    base_aspect: f64,
    moved_or_resized: bool,
}

impl ViewFrame {
    fn is_dock_expanded(&self) -> bool {
        let config = self.context.config.borrow();
        config.window.docking_enabled && config.window.docking_expand
    }
}

impl Manipulatable for ViewFrame {
    fn get_position(&self) -> Point {
        self.rect.position()
    }

    fn get_size(&self) -> Size {
        self.rect.size()
    }

    fn get_resize_frame_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.rect.w, self.rect.h)
    }

    fn get_handle_function(&self, handle: Handle) -> HandleFunction {
        if self.is_dock_expanded() && matches!(handle, Handle::East | Handle::West) {
            HandleFunction::AspectRatio
        } else {
            HandleFunction::NormalResize
        }
    }

    fn limit_position(&self, pt: Point) -> Point {
        let monitors = self.context.toolkit.monitor_rects();
        limit_position(pt, self.rect.size(), &monitors)
    }

    fn move_to(&mut self, pt: Point) {
        self.rect = self.rect.with_position(pt);
        self.moved_or_resized = true;
        self.backend.borrow_mut().move_resize(self.rect);
    }

    fn move_resize(&mut self, rect: Rect) {
        self.rect = rect;
        self.moved_or_resized = true;
        self.backend.borrow_mut().move_resize(self.rect);
    }

    fn set_cursor_type(&mut self, cursor: Option<CursorType>) {
        self.backend.borrow_mut().set_cursor_type(cursor);
    }

    fn get_drag_threshold(&self) -> f64 {
        self.context.toolkit.drag_threshold()
    }

    fn on_handle_aspect_ratio_pressed(&mut self) {
        self.aspect_drag_start_width = self.rect.w;
    }

    fn on_handle_aspect_ratio_motion(&mut self, delta: Offset) {
        let height = self.rect.h.max(1.0);
        let base = self.base_aspect.max(0.01);

        let new_frame_width = self.aspect_drag_start_width + delta.x;
        let mut aspect_change = new_frame_width / (height * base);

        let (min_aspect, max_aspect) = {
            let config = self.context.config.borrow();
            config.window.docking_aspect_change_range
        };
        let min_aspect = min_aspect.max(0.75);

        // snap to the screen sides within 5%
        let span = (max_aspect - min_aspect).max(0.0);
        if (aspect_change - max_aspect).abs() <= span * 0.05 {
            aspect_change = max_aspect;
        }
        if (aspect_change - min_aspect).abs() <= span * 0.05 {
            aspect_change = min_aspect;
        }

        self.aspect_change = Some(aspect_change.clamp(min_aspect, max_aspect));
    }
}

pub struct KeyboardView {
    context: Context,
    weak: Weak<RefCell<KeyboardView>>,
    key_sink: Rc<RefCell<dyn KeySink>>,

    /// Set right after construction; the animator needs the view's Rc.
    animator: Option<Rc<RefCell<KeyboardAnimator>>>,
    auto_show: Option<Rc<RefCell<AutoShow>>>,
    receiver: Option<Rc<RefCell<InputEventReceiver>>>,

    pub frame: ViewFrame,
    manipulator: ViewManipulator,
    layout_views: Vec<LayoutView>,

    home_rect: Rect,
    visible: bool,
    opacity: f64,

    visibility_locked: bool,
    visibility_requested: Option<bool>,

    // dwell
    dwell_key: Option<String>,
    last_dwelled_key: Option<String>,
    dwell_started: Option<Duration>,
    dwell_delay: Duration,
    dwell_end_point: Point,
    dwell_update_timer: Timer,

    // long press / popup
    long_press_timer: Timer,
    popup: Option<LayoutPopup>,
    popup_unpress_timer: Timer,

    // inactivity fade
    inactivity_timer: Timer,

    // auto positioning
    auto_position_poll_timer: Timer,
    auto_position_started: Option<Duration>,

    // docking
    docking_enabled: bool,
    docking_monitor_index: Option<usize>,

    // position persistence
    save_position_timer: Timer,
    position_file: Option<PathBuf>,
}

impl KeyboardView {
    pub fn new(
        context: Context,
        backend: Rc<RefCell<dyn ViewBackend>>,
        key_sink: Rc<RefCell<dyn KeySink>>,
        home_rect: Rect,
    ) -> Rc<RefCell<KeyboardView>> {
        let view = Rc::new_cyclic(|weak: &Weak<RefCell<KeyboardView>>| {
            RefCell::new(KeyboardView {
                frame: ViewFrame {
                    context: context.clone(),
                    backend,
                    rect: home_rect,
                    aspect_change: None,
                    aspect_drag_start_width: home_rect.w,
                    base_aspect: if home_rect.h > 0.0 {
                        home_rect.w / home_rect.h
                    } else {
                        1.0
                    },
                    moved_or_resized: false,
                },
                manipulator: ViewManipulator::new(context.clone()),
                dwell_update_timer: Timer::new(context.toolkit.clone()),
                long_press_timer: Timer::new(context.toolkit.clone()),
                popup_unpress_timer: Timer::new(context.toolkit.clone()),
                inactivity_timer: Timer::new(context.toolkit.clone()),
                auto_position_poll_timer: Timer::new(context.toolkit.clone()),
                auto_position_started: None,
                save_position_timer: Timer::new(context.toolkit.clone()),
                context,
                weak: weak.clone(),
                key_sink,
                animator: None,
                auto_show: None,
                receiver: None,
                layout_views: Vec::new(),
                home_rect,
                visible: false,
                opacity: 0.0,
                visibility_locked: false,
                visibility_requested: None,
                dwell_key: None,
                last_dwelled_key: None,
                dwell_started: None,
                dwell_delay: DWELL_DELAY_FALLBACK,
                dwell_end_point: Point::default(),
                popup: None,
                docking_enabled: false,
                docking_monitor_index: None,
                position_file: None,
            })
        });

        let animator = KeyboardAnimator::new(
            view.borrow().context.clone(),
            Rc::downgrade(&(view.clone() as Rc<RefCell<dyn AnimatorTarget>>)),
        );
        animator.borrow_mut().sync_transition_position(home_rect);
        view.borrow_mut().animator = Some(animator);
        view
    }

    pub fn set_auto_show(&mut self, auto_show: Rc<RefCell<AutoShow>>) {
        self.auto_show = Some(auto_show);
    }

    pub fn set_receiver(&mut self, receiver: Rc<RefCell<InputEventReceiver>>) {
        self.receiver = Some(receiver);
    }

    pub fn animator(&self) -> Rc<RefCell<KeyboardAnimator>> {
        self.animator.clone().expect("animator wired in new()")
    }

    pub fn set_layout_views(&mut self, views: Vec<LayoutView>) {
        self.layout_views = views;
    }

    pub fn manipulator_mut(&mut self) -> &mut ViewManipulator {
        &mut self.manipulator
    }

    /// Adapter for the receiver: the view as sequence target.
    pub fn sequence_target(this: &Rc<RefCell<KeyboardView>>) -> Rc<RefCell<KeyboardViewTarget>> {
        Rc::new(RefCell::new(KeyboardViewTarget { view: this.clone() }))
    }

    /// Adapter for auto-show: the view as visibility sink.
    pub fn visibility_control(
        this: &Rc<RefCell<KeyboardView>>,
    ) -> Rc<RefCell<dyn VisibilityControl>> {
        Rc::new(RefCell::new(VisibilityBridge {
            view: Rc::downgrade(this),
        }))
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn get_rect(&self) -> Rect {
        self.frame.rect
    }

    /// The resting rect, aware of docking.
    pub fn get_home_rect(&self) -> Rect {
        if self.context.config.borrow().window.docking_enabled {
            self.get_dock_rect()
        } else {
            self.home_rect
        }
    }

    pub fn set_home_rect(&mut self, rect: Rect) {
        self.home_rect = rect;
        self.start_save_position_timer();
    }

    /// Rect the keyboard occupies while shown.
    pub fn get_visible_rect(&self) -> Rect {
        self.get_home_rect()
    }

    // ----- visibility ---------------------------------------------------

    /// Keep the current visibility; remember requests for later.
    ///
    /// Held while keys are pressed so the keyboard cannot disappear from
    /// under a finger; released with the last input sequence, applying
    /// the change requested in between.
    pub fn lock_visibility(&mut self) {
        self.visibility_locked = true;
    }

    pub fn unlock_visibility(&mut self) {
        self.visibility_locked = false;
        self.visibility_requested = None;
    }

    pub fn unlock_and_apply_visibility(this: &Rc<RefCell<KeyboardView>>) {
        let request = {
            let mut view = this.borrow_mut();
            if !view.visibility_locked {
                return;
            }
            let request = view.visibility_requested;
            view.visibility_locked = false;
            view.visibility_requested = None;
            request
        };
        if let Some(visible) = request {
            KeyboardView::set_visible_with_transition(this, visible);
        }
    }

    /// Release the key-press visibility lock once no input sequences
    /// remain open.
    fn maybe_release_visibility_lock(this: &Rc<RefCell<KeyboardView>>) {
        let end_of_input = {
            let view = this.borrow();
            match &view.receiver {
                Some(receiver) => !receiver.borrow().has_input_sequences(),
                None => true,
            }
        };
        if end_of_input {
            KeyboardView::unlock_and_apply_visibility(this);
        }
    }

    /// Show or hide with a transition, deferring while locked.
    pub fn set_visible_with_transition(this: &Rc<RefCell<KeyboardView>>, visible: bool) {
        let animator = {
            let mut view = this.borrow_mut();
            if view.visibility_locked {
                view.visibility_requested = Some(visible);
                return;
            }
            view.animator()
        };

        KeyboardAnimator::transition_visible_to(&animator, visible, None, None);
        if visible {
            KeyboardView::auto_position(this);
        }
        KeyboardAnimator::commit_transition(&animator);
    }

    /// The user asked for a visibility change: unlock, pin auto-show and
    /// start the transition.
    pub fn set_visible_interactive(this: &Rc<RefCell<KeyboardView>>, visible: bool) {
        let auto_show = {
            let mut view = this.borrow_mut();
            view.unlock_visibility();
            view.auto_show.clone()
        };
        if let Some(auto_show) = auto_show {
            AutoShow::lock_visible(&auto_show, visible, None);
        }
        KeyboardView::set_visible_with_transition(this, visible);
    }

    // ----- docking ------------------------------------------------------

    fn get_docking_monitor_rects(&self) -> (Rect, Rect) {
        let monitor = self.resolve_docking_monitor_index();
        let area = self.context.toolkit.workarea_rect(monitor);
        let geom = self
            .context
            .toolkit
            .monitor_rects()
            .get(monitor)
            .copied()
            .unwrap_or(area);
        (area, geom)
    }

    fn resolve_docking_monitor_index(&self) -> usize {
        if let Some(index) = self.docking_monitor_index {
            return index;
        }
        self.compute_docking_monitor_index()
    }

    fn compute_docking_monitor_index(&self) -> usize {
        let config = self.context.config.borrow();
        let num_monitors = self.context.toolkit.monitor_rects().len().max(1);
        let index = match config.window.docking_monitor {
            DockingMonitor::Active => self.context.toolkit.active_monitor(),
            DockingMonitor::Primary => self.context.toolkit.primary_monitor(),
            DockingMonitor::Index(i) => i.min(config.docking_monitor_index_limit()),
        };
        index.min(num_monitors - 1)
    }

    /// Where the docked keyboard rests.
    pub fn get_dock_rect(&self) -> Rect {
        let (area, _geom) = self.get_docking_monitor_rects();
        let edge = self.context.config.borrow().window.docking_edge;

        let size = self.home_rect.size();
        let mut rect = Rect::new(area.x, area.y, area.w, size.h);
        if edge == DockingEdge::Bottom {
            rect.y = area.y + area.h - size.h;
        }

        if self.is_dock_expanded() {
            // full width unless the aspect handles shrank the dock
            rect.w = match self.frame.aspect_change {
                Some(aspect) => (size.h * self.frame.base_aspect * aspect).min(area.w),
                None => area.w,
            };
            rect.x = area.x + (area.w - rect.w) / 2.0;
        } else {
            rect.w = size.w.min(area.w);
            rect.x = area.x + (area.w - rect.w) / 2.0;
        }
        rect
    }

    pub fn is_dock_expanded(&self) -> bool {
        self.frame.is_dock_expanded()
    }

    /// The resting place of a hidden dock: one screen height beyond the
    /// docking edge.
    pub fn get_docking_hideout_rect(&self, reference: Option<Rect>) -> Rect {
        let (_area, geom) = self.get_docking_monitor_rects();
        let rect = self.get_dock_rect();
        let mut hideout = rect;

        let mc = geom.center();
        let c = reference.filter(|r| !r.is_empty()).unwrap_or(rect).center();

        if c.y > mc.y {
            hideout.y = geom.bottom() + HIDEOUT_CLEARANCE; // below bottom
        } else {
            hideout.y = geom.top() - rect.h - HIDEOUT_CLEARANCE; // above top
        }
        hideout
    }

    /// Re-read docking config; realizes struts and the dock position on
    /// change.
    pub fn update_docking(&mut self) {
        let (enable, shrink, edge) = {
            let config = self.context.config.borrow();
            (
                config.window.docking_enabled,
                config.window.docking_shrink_workarea,
                config.window.docking_edge,
            )
        };
        let monitor_index = self.compute_docking_monitor_index();

        if self.docking_enabled != enable || self.docking_monitor_index != Some(monitor_index) {
            self.docking_monitor_index = Some(monitor_index);
            self.docking_enabled = enable;

            if enable {
                let rect = self.get_dock_rect();
                self.frame
                    .backend
                    .borrow_mut()
                    .set_struts(shrink.then_some((edge, rect.h)));
                self.frame.move_resize(rect);
            } else {
                self.frame.backend.borrow_mut().set_struts(None);
                let home = self.home_rect;
                self.frame.move_resize(home);
            }
            debug!(enable, monitor_index, "docking updated");
        }
    }

    /// Re-resolve the docking monitor; true when it changed.
    pub fn update_docking_monitor_index(&mut self) -> bool {
        let before = self.docking_monitor_index;
        let now = self.compute_docking_monitor_index();
        self.docking_monitor_index = Some(now);
        before.is_some() && before != Some(now)
    }

    // ----- auto positioning --------------------------------------------

    /// Track the focused text entry for a while; polls with doubling
    /// intervals because focus geometry settles late.
    pub fn auto_position(this: &Rc<RefCell<KeyboardView>>) {
        {
            let mut view = this.borrow_mut();
            view.auto_position_started = Some(view.context.now());
        }
        KeyboardView::update_position(this);
        KeyboardView::start_auto_position_poll(this, Duration::from_millis(100));
    }

    fn start_auto_position_poll(this: &Rc<RefCell<KeyboardView>>, delay: Duration) {
        let view = this.borrow();
        let Some(started) = view.auto_position_started else {
            return;
        };

        let next_delay = (delay * 2).min(Duration::from_millis(1000));
        if view.context.now() + next_delay < started + Duration::from_millis(3000) {
            let weak = view.weak.clone();
            view.auto_position_poll_timer.start(delay, move || {
                if let Some(this) = weak.upgrade() {
                    KeyboardView::update_position(&this);
                    KeyboardView::start_auto_position_poll(&this, next_delay);
                }
                false
            });
        }
    }

    pub fn stop_auto_positioning(&mut self) {
        self.auto_position_started = None;
        self.auto_position_poll_timer.stop();
    }

    /// Apply the auto-show repositioned rect, if any.
    pub fn update_position(this: &Rc<RefCell<KeyboardView>>) {
        let (animator, target) = {
            let view = this.borrow();
            let Some(auto_show) = view.auto_show.clone() else {
                return;
            };

            let home = view.get_home_rect();
            let docking = view.context.config.borrow().window.docking_enabled;
            let config = view.context.config.borrow();
            let method = if docking {
                config.auto_show.reposition_method_docked
            } else {
                config.auto_show.reposition_method_floating
            };
            let clearance = Border::uniform(config.auto_show.widget_clearance);

            // No vertical test clearance when docked; jumping out of the
            // dock must stay hard.
            let test_clearance = if docking {
                Border::new(clearance.left, 0.0, clearance.right, 0.0)
            } else {
                clearance
            };
            drop(config);

            let limit_rects = if docking {
                vec![view.get_docking_monitor_rects().0]
            } else {
                view.context.toolkit.monitor_rects()
            };

            let (horizontal, vertical) = if docking && view.is_dock_expanded() {
                (false, true)
            } else {
                (true, true)
            };

            let target = auto_show.borrow().get_repositioned_window_rect(
                method,
                home,
                &limit_rects,
                test_clearance,
                clearance,
                horizontal,
                vertical,
            );

            (view.animator(), target.unwrap_or(home))
        };

        if this.borrow().get_rect().position() != target.position() {
            KeyboardAnimator::transition_position_to(&animator, target.position());
            KeyboardAnimator::commit_transition(&animator);
        }
    }

    // ----- dwell --------------------------------------------------------

    pub fn is_dwelling(&self) -> bool {
        self.dwell_key.is_some()
    }

    fn already_dwelled(&self, key_id: &str) -> bool {
        self.last_dwelled_key.as_deref() == Some(key_id)
    }

    fn reset_already_dwelled(&mut self) {
        self.last_dwelled_key = None;
    }

    fn maybe_start_dwelling(&mut self, key_id: &str, dwellable: bool, point: Point) {
        if self.is_dwelling() {
            return;
        }

        // allow the same key again once the pointer left it far enough
        if self.already_dwelled(key_id)
            && self.dwell_end_point.distance2(&point) > DWELL_THRESHOLD * DWELL_THRESHOLD
        {
            self.reset_already_dwelled();
        }
        if self.already_dwelled(key_id) {
            return;
        }

        let can_dwell = dwellable
            || ButtonId::from_key_id(key_id)
                .map(|id| ButtonController::new(id).can_dwell())
                .unwrap_or(false);
        if !can_dwell {
            return;
        }

        self.dwell_key = Some(key_id.to_string());
        self.last_dwelled_key = Some(key_id.to_string());
        self.dwell_started = Some(self.context.now());
        self.dwell_end_point = point;

        let weak = self.weak.clone();
        self.dwell_update_timer
            .start(DWELL_UPDATE_INTERVAL, move || {
                match weak.upgrade() {
                    Some(this) => KeyboardView::on_dwell_update_timer(&this),
                    None => false,
                }
            });
    }

    fn maybe_cancel_dwelling(&mut self, key_id: Option<&str>) {
        let Some(key_id) = key_id else {
            // off the keys: stop an active dwell but keep the re-dwell
            // distance bookkeeping
            self.stop_dwelling();
            return;
        };
        let other_dwell = self
            .dwell_key
            .as_deref()
            .map(|k| k != key_id)
            .unwrap_or(false);
        let other_last = self
            .last_dwelled_key
            .as_deref()
            .map(|k| k != key_id)
            .unwrap_or(false);
        if other_dwell || other_last {
            self.cancel_dwelling();
        }
    }

    pub fn cancel_dwelling(&mut self) {
        self.stop_dwelling();
        self.reset_already_dwelled();
    }

    fn stop_dwelling(&mut self) {
        if self.dwell_key.take().is_some() {
            self.dwell_update_timer.stop();
            self.dwell_started = None;
            self.frame.backend.borrow_mut().queue_draw(); // remove progress
        }
    }

    /// Dwell progress in [0, 1].
    pub fn dwell_progress(&self) -> f64 {
        match self.dwell_started {
            Some(started) => {
                let elapsed = self.context.now().saturating_sub(started);
                (elapsed.as_secs_f64() / self.dwell_delay.as_secs_f64()).min(1.0)
            }
            None => 0.0,
        }
    }

    fn on_dwell_update_timer(this: &Rc<RefCell<KeyboardView>>) -> bool {
        let finished_key = {
            let mut view = this.borrow_mut();
            let Some(key) = view.dwell_key.clone() else {
                return false;
            };
            view.frame.backend.borrow_mut().queue_draw(); // progress

            if view.dwell_progress() >= 1.0 {
                view.stop_dwelling();
                Some(key)
            } else {
                None
            }
        };

        match finished_key {
            Some(key) => {
                // synthetic left-button tap
                let sink = this.borrow().key_sink.clone();
                sink.borrow_mut().on_key_down(&key);
                sink.borrow_mut().on_key_up(&key, false);
                false
            }
            None => true,
        }
    }

    // ----- popup --------------------------------------------------------

    pub fn has_key_popup(&self) -> bool {
        self.popup.is_some()
    }

    pub fn close_key_popup(&mut self) {
        self.popup_unpress_timer.stop();
        if self.popup.take().is_some() {
            self.frame.backend.borrow_mut().queue_draw();
        }
    }

    /// Open the long-press popup for `key`; keys line up left to right
    /// above the pressed key.
    fn open_key_popup(&mut self, key: &LayoutKey) {
        let n = key.alternatives.len().max(1);
        let key_size = key.rect.size();
        let width = key_size.w * n as f64;

        let origin = self.frame.rect.position();
        let mut rect = Rect::new(
            origin.x + key.rect.x,
            origin.y + key.rect.y - key_size.h,
            width,
            key_size.h,
        );

        // keep the popup on the monitor; fall back to a nominal size on
        // degenerate geometry
        let monitors = self.context.toolkit.monitor_rects();
        let monitor = monitors.first().copied().unwrap_or_default();
        if monitor.is_empty() {
            rect.w = FALLBACK_POPUP_SIZE;
            rect.h = FALLBACK_POPUP_SIZE;
        } else {
            let pt = limit_position(rect.position(), rect.size(), &monitors);
            rect = rect.with_position(pt);
        }

        let keys = key
            .alternatives
            .iter()
            .enumerate()
            .map(|(i, alt)| {
                LayoutKey::new(
                    alt,
                    Rect::new(i as f64 * key_size.w, 0.0, key_size.w, key_size.h),
                )
            })
            .collect();

        self.popup = Some(LayoutPopup {
            rect,
            keys,
            source_key: key.id.clone(),
            got_motion: false,
        });
        self.frame.backend.borrow_mut().queue_draw();
        debug!(key = %key.id, "key popup opened");
    }

    fn hit_layout_key(&self, canvas_pt: Point) -> Option<LayoutKey> {
        self.layout_views
            .iter()
            .find_map(|v| v.hit_key(canvas_pt))
            .cloned()
    }

    // ----- sequence handling -------------------------------------------

    fn on_sequence_begin(this: &Rc<RefCell<KeyboardView>>, sequence: &InputSequencePtr) {
        let (pressed_key, sink) = {
            let mut view = this.borrow_mut();
            view.cancel_dwelling();

            let s = sequence.borrow();
            let point = s.point;
            let primary = s.primary;
            drop(s);

            // window manipulation first: handles win over keys
            if primary {
                let KeyboardView {
                    manipulator, frame, ..
                } = &mut *view;
                let hit = manipulator.hit_test_move_resize(frame, point);
                if hit.is_some() {
                    manipulator.handle_press(frame, sequence, false);
                    return;
                }
            }

            let Some(key) = view.hit_layout_key(point) else {
                // background press moves the floating keyboard
                if primary && !view.context.config.borrow().window.docking_enabled {
                    let KeyboardView {
                        manipulator, frame, ..
                    } = &mut *view;
                    manipulator.handle_press(frame, sequence, true);
                }
                return;
            };

            {
                let mut s = sequence.borrow_mut();
                s.active_key = Some(key.id.clone());
                s.initial_active_key = Some(key.id.clone());
            }

            // no show/hide while a key is pressed; requests arriving in
            // between apply on release
            view.lock_visibility();

            // arm the long press
            let delay = view.context.config.borrow().keyboard.long_press_delay;
            if !key.alternatives.is_empty() && delay > 0.0 {
                let weak = view.weak.clone();
                let seq = sequence.clone();
                view.long_press_timer
                    .start(Duration::from_secs_f64(delay), move || {
                        if let Some(this) = weak.upgrade() {
                            KeyboardView::on_long_press(&this, &seq);
                        }
                        false
                    });
            }

            (key.id.clone(), view.key_sink.clone())
        };

        sink.borrow_mut().on_key_down(&pressed_key);
    }

    fn on_long_press(this: &Rc<RefCell<KeyboardView>>, sequence: &InputSequencePtr) {
        let (released_key, sink) = {
            let mut view = this.borrow_mut();
            let Some(key_id) = sequence.borrow().active_key.clone() else {
                return;
            };
            let Some(key) = view
                .layout_views
                .iter()
                .find_map(|v| v.keys.iter().find(|k| k.id == key_id))
                .cloned()
            else {
                return;
            };

            view.open_key_popup(&key);

            // the original key is released without action
            sequence.borrow_mut().cancel_key_action = true;
            sequence.borrow_mut().active_key = None;

            (key_id, view.key_sink.clone())
        };

        sink.borrow_mut().on_key_up(&released_key, true);
    }

    fn on_sequence_update(this: &Rc<RefCell<KeyboardView>>, sequence: &InputSequencePtr) {
        // popup open: updates belong to the popup
        if this.borrow().popup.is_some() {
            KeyboardView::redirect_update_to_popup(this, sequence);
            return;
        }

        let hovered = {
            let mut view = this.borrow_mut();

            // drag in progress?
            if view.manipulator.is_drag_initiated() {
                let KeyboardView {
                    manipulator, frame, ..
                } = &mut *view;
                manipulator.handle_motion(frame, sequence);
                return;
            }

            let s = sequence.borrow();
            let pressed = s.state.intersects(crate::event::StateMask::BUTTON123)
                || s.active_key.is_some();
            let point = s.point;
            drop(s);

            if pressed {
                // slide typing: the pressed key follows the pointer
                let hit = view.hit_layout_key(point).map(|k| k.id);
                let active = sequence.borrow().active_key.clone();
                if hit != active {
                    let sink = view.key_sink.clone();
                    view.long_press_timer.stop();
                    sequence.borrow_mut().active_key = hit.clone();
                    drop(view);
                    if let Some(old) = active {
                        sink.borrow_mut().on_key_up(&old, true);
                    }
                    if let Some(new) = hit {
                        sink.borrow_mut().on_key_down(&new);
                    }
                    return;
                }
                None
            } else {
                if view.is_dwelling() {
                    view.dwell_end_point = point;
                }
                view.hit_layout_key(point).map(|k| (k.id, k.dwellable, point))
            }
        };

        // hover: dwell bookkeeping
        if let Some((key_id, dwellable, point)) = hovered {
            let mut view = this.borrow_mut();
            view.maybe_cancel_dwelling(Some(&key_id));
            view.maybe_start_dwelling(&key_id, dwellable, point);
        } else {
            this.borrow_mut().maybe_cancel_dwelling(None);
        }
    }

    fn redirect_update_to_popup(this: &Rc<RefCell<KeyboardView>>, sequence: &InputSequencePtr) {
        let (receiver, src, dst) = {
            let view = this.borrow();
            let Some(receiver) = view.receiver.clone() else {
                return;
            };
            let popup = view.popup.as_ref().expect("popup checked open");
            (
                receiver,
                FrameOrigin(view.frame.rect.position()),
                FrameOrigin(popup.rect.position()),
            )
        };

        let mut redirected = None;
        InputEventReceiver::redirect_sequence_update(&receiver, sequence, &src, &dst, |s| {
            redirected = Some(s.clone())
        });

        if let Some(redirected) = redirected {
            let mut view = this.borrow_mut();
            let point = redirected.borrow().point;
            if let Some(popup) = view.popup.as_mut() {
                popup.got_motion = true;
                let hit = popup.hit_key(point).map(|k| k.id.clone());
                redirected.borrow_mut().active_key = hit;
            }
        }
    }

    fn on_sequence_end(this: &Rc<RefCell<KeyboardView>>, sequence: &InputSequencePtr) {
        // popup open: the release belongs to the popup
        if this.borrow().popup.is_some() {
            KeyboardView::redirect_end_to_popup(this, sequence);
            return;
        }

        let drag_done = {
            let mut view = this.borrow_mut();
            view.long_press_timer.stop();

            if view.manipulator.is_drag_initiated() {
                let KeyboardView {
                    manipulator, frame, ..
                } = &mut *view;
                manipulator.stop_drag(frame);
                if frame.moved_or_resized {
                    frame.moved_or_resized = false;
                    let rect = frame.rect;
                    view.set_home_rect(rect);
                }
                Some((view.animator(), view.frame.rect))
            } else {
                None
            }
        };
        if let Some((animator, rect)) = drag_done {
            // the next transition starts from where the drag left us
            animator.borrow_mut().sync_transition_position(rect);
            return;
        }

        let released = {
            let s = sequence.borrow();
            s.active_key.clone().map(|k| (k, s.cancel_key_action))
        };
        if let Some((key_id, cancelled)) = released {
            sequence.borrow_mut().active_key = None;
            let sink = this.borrow().key_sink.clone();
            sink.borrow_mut().on_key_up(&key_id, cancelled);
        }

        KeyboardView::maybe_release_visibility_lock(this);
    }

    fn redirect_end_to_popup(this: &Rc<RefCell<KeyboardView>>, sequence: &InputSequencePtr) {
        let (receiver, src, dst) = {
            let view = this.borrow();
            let Some(receiver) = view.receiver.clone() else {
                return;
            };
            let popup = view.popup.as_ref().expect("popup checked open");
            (
                receiver,
                FrameOrigin(view.frame.rect.position()),
                FrameOrigin(popup.rect.position()),
            )
        };

        let mut redirected = None;
        InputEventReceiver::redirect_sequence_end(&receiver, sequence, &src, &dst, |s| {
            redirected = Some(s.clone())
        });
        let Some(redirected) = redirected else {
            return;
        };

        let point = redirected.borrow().point;
        let (hit, sink) = {
            let view = this.borrow();
            let popup = view.popup.as_ref().expect("popup checked open");
            (
                popup.hit_key(point).map(|k| k.id.clone()),
                view.key_sink.clone(),
            )
        };

        match hit {
            Some(key_id) => {
                // activate the popup key and close
                sink.borrow_mut().on_key_down(&key_id);
                sink.borrow_mut().on_key_up(&key_id, false);
                this.borrow_mut().close_key_popup();
            }
            None => {
                // release elsewhere: close shortly after; a popup that
                // never saw motion closes almost immediately
                let view = this.borrow();
                let got_motion = view
                    .popup
                    .as_ref()
                    .map(|p| p.got_motion)
                    .unwrap_or(false);
                let delay = if got_motion {
                    POPUP_UNPRESS_DELAY
                } else {
                    Duration::from_millis(20)
                };
                let weak = view.weak.clone();
                view.popup_unpress_timer.start(delay, move || {
                    if let Some(this) = weak.upgrade() {
                        this.borrow_mut().close_key_popup();
                    }
                    false
                });
            }
        }

        KeyboardView::maybe_release_visibility_lock(this);
    }

    // ----- inactivity ---------------------------------------------------

    fn start_inactivity_timer(&self) {
        let delay = {
            let config = self.context.config.borrow();
            Duration::from_secs_f64(config.window.inactive_transparency_delay.max(0.0))
        };
        let weak = self.weak.clone();
        self.inactivity_timer.start(delay, move || {
            if let Some(this) = weak.upgrade() {
                let animator = this.borrow().animator();
                KeyboardAnimator::transition_active_to(&animator, false, None);
                KeyboardAnimator::commit_transition(&animator);
            }
            false
        });
    }

    fn on_pointer_enter(this: &Rc<RefCell<KeyboardView>>) {
        let animator = {
            let view = this.borrow();
            view.inactivity_timer.stop();
            view.animator()
        };
        KeyboardAnimator::transition_active_to(&animator, true, None);
        KeyboardAnimator::commit_transition(&animator);
    }

    fn on_pointer_leave(this: &Rc<RefCell<KeyboardView>>) {
        {
            let mut view = this.borrow_mut();
            view.maybe_cancel_dwelling(None);
            view.start_inactivity_timer();
        }
    }

    // ----- position persistence ----------------------------------------

    pub fn set_position_file(&mut self, path: PathBuf) {
        self.position_file = Some(path);
    }

    /// Restore the home rect saved by an earlier session.
    pub fn restore_position(&mut self) {
        let Some(path) = &self.position_file else {
            return;
        };
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<SavedPosition>(&text) {
                Ok(saved) => {
                    self.home_rect = Rect::new(saved.x, saved.y, saved.w, saved.h);
                    let home = self.home_rect;
                    self.frame.move_resize(home);
                }
                Err(e) => warn!(error = %e, "ignoring malformed position file"),
            },
            Err(_) => {} // first run
        }
    }

    fn start_save_position_timer(&self) {
        let weak = self.weak.clone();
        self.save_position_timer.start(SAVE_POSITION_DELAY, move || {
            if let Some(this) = weak.upgrade() {
                this.borrow().save_position();
            }
            false
        });
    }

    fn save_position(&self) {
        let Some(path) = &self.position_file else {
            return;
        };
        let r = self.home_rect;
        let saved = SavedPosition {
            x: r.x,
            y: r.y,
            w: r.w,
            h: r.h,
        };
        match serde_json::to_string(&saved) {
            Ok(text) => {
                if let Err(e) = std::fs::write(path, text) {
                    warn!(error = %e, "could not save window position");
                }
            }
            Err(e) => warn!(error = %e, "could not serialize window position"),
        }
    }

    /// Execute a toolbar button action against the owned components.
    pub fn apply_button_action(this: &Rc<RefCell<KeyboardView>>, action: ButtonAction) {
        match action {
            ButtonAction::StartMove => {
                this.borrow_mut().manipulator.start_move_undecided();
            }
            ButtonAction::StopMove => {
                let (animator, rect) = {
                    let mut view = this.borrow_mut();
                    let KeyboardView {
                        manipulator, frame, ..
                    } = &mut *view;
                    manipulator.stop_move(frame);
                    (view.animator(), view.frame.rect)
                };
                animator.borrow_mut().sync_transition_position(rect);
            }
            ButtonAction::HideKeyboard => {
                KeyboardView::set_visible_interactive(this, false);
            }
            _ => {}
        }
    }
}

impl AnimatorTarget for KeyboardView {
    fn is_visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            self.visible = visible;
            self.frame.backend.borrow_mut().set_visible(visible);
        }
    }

    fn get_rect(&self) -> Rect {
        self.frame.rect
    }

    fn reposition(&mut self, pt: Point) {
        self.frame.move_to(pt);
        self.frame.moved_or_resized = false; // not a user move
    }

    fn set_opacity(&mut self, opacity: f64) -> bool {
        let changed = (self.opacity - opacity).abs() > 1e-9;
        if changed {
            self.opacity = opacity;
            self.frame.backend.borrow_mut().set_opacity(opacity);
        }
        changed
    }

    fn get_visible_rect(&self) -> Rect {
        KeyboardView::get_visible_rect(self)
    }

    fn get_docking_hideout_rect(&self) -> Rect {
        KeyboardView::get_docking_hideout_rect(self, None)
    }

    fn update_docking_monitor_index(&mut self) -> bool {
        KeyboardView::update_docking_monitor_index(self)
    }

    fn close_key_popup(&mut self) {
        KeyboardView::close_key_popup(self)
    }

    fn stop_auto_positioning(&mut self) {
        KeyboardView::stop_auto_positioning(self)
    }

    fn begin_inactivity_timer_transition(&mut self, active: bool) {
        if !active {
            self.start_inactivity_timer();
        }
    }

    fn on_transition_done(&mut self, _visible_before: bool, visible_later: bool) {
        if visible_later {
            self.update_docking();
        }
    }
}

/// Receiver-facing adapter of the keyboard view.
pub struct KeyboardViewTarget {
    view: Rc<RefCell<KeyboardView>>,
}

impl SequenceTarget for KeyboardViewTarget {
    fn on_input_sequence_begin(&mut self, sequence: &InputSequencePtr) {
        KeyboardView::on_sequence_begin(&self.view, sequence);
    }

    fn on_input_sequence_update(&mut self, sequence: &InputSequencePtr) {
        KeyboardView::on_sequence_update(&self.view, sequence);
    }

    fn on_input_sequence_end(&mut self, sequence: &InputSequencePtr) {
        KeyboardView::on_sequence_end(&self.view, sequence);
    }

    fn on_enter_notify(&mut self, _event: &Event) {
        KeyboardView::on_pointer_enter(&self.view);
    }

    fn on_leave_notify(&mut self, _event: &Event) {
        KeyboardView::on_pointer_leave(&self.view);
    }

    fn can_delay_sequence_begin(&self, sequence: &InputSequence) -> bool {
        // move/resize handles must react instantly
        let view = self.view.borrow();
        view.manipulator
            .hit_test_move_resize(&view.frame, sequence.point)
            .is_none()
    }
}

/// Auto-show-facing adapter of the keyboard view.
struct VisibilityBridge {
    view: Weak<RefCell<KeyboardView>>,
}

impl VisibilityControl for VisibilityBridge {
    fn begin_visibility_transition(&mut self, show: bool) {
        if let Some(view) = self.view.upgrade() {
            KeyboardView::set_visible_with_transition(&view, show);
        }
    }

    fn stop_auto_positioning(&mut self) {
        if let Some(view) = self.view.upgrade() {
            view.borrow_mut().stop_auto_positioning();
        }
    }

    fn is_keyboard_visible(&self) -> bool {
        self.view
            .upgrade()
            .map(|v| v.borrow().is_visible())
            .unwrap_or(false)
    }
}
