//! Converts pointer drags into window moves, resizes and aspect-ratio
//! changes.
//!
//! Drag state machine: a press on a handle *requests* the drag, the first
//! motion *initiates* it, and crossing the drag threshold makes it
//! *active*. Threshold protection suppresses accidental drags; the first
//! crossing arms a temporary unlock so follow-up drags start instantly.

use std::time::Duration;

use crate::context::Context;
use crate::geometry::{Offset, Point, Rect, Size};
use crate::sequence::InputSequencePtr;

/// Time after a drag within which threshold protection stays unlocked.
pub const TEMPORARY_UNLOCK_DELAY: Duration = Duration::from_secs(6);

/// Default distance in pixels before a protected drag activates.
pub const DEFAULT_DRAG_THRESHOLD: f64 = 8.0;

/// Distance at which an activating drag jumps to the pointer instead of
/// shifting its start point.
pub const DEFAULT_DRAG_SNAP_THRESHOLD: f64 = 16.0;

/// Marker for "unlocked during the current drag"; replaced with the real
/// time when the drag ends.
const UNLOCK_ARMED: Duration = Duration::from_secs(1);

/// The nine grab areas of the resize frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    North,
    South,
    West,
    East,
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
    Move,
}

impl Handle {
    pub const ALL: [Handle; 9] = [
        Handle::North,
        Handle::South,
        Handle::West,
        Handle::East,
        Handle::NorthWest,
        Handle::NorthEast,
        Handle::SouthWest,
        Handle::SouthEast,
        Handle::Move,
    ];

    pub const CORNERS: [Handle; 4] = [
        Handle::NorthWest,
        Handle::NorthEast,
        Handle::SouthEast,
        Handle::SouthWest,
    ];

    pub const EDGES: [Handle; 4] = [Handle::West, Handle::East, Handle::North, Handle::South];

    pub fn is_corner(&self) -> bool {
        Handle::CORNERS.contains(self)
    }

    pub fn is_edge(&self) -> bool {
        Handle::EDGES.contains(self)
    }
}

/// What dragging a handle does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleFunction {
    NormalResize,
    /// East/west handles of an expanded dock change the aspect instead.
    AspectRatio,
}

/// Mouse cursor shapes requested while hovering/dragging handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorType {
    Default,
    NwResize,
    NorthResize,
    NeResize,
    WestResize,
    EastResize,
    SwResize,
    SouthResize,
    SeResize,
    MoveOrResize,
}

pub fn cursor_for_handle(handle: Handle) -> CursorType {
    match handle {
        Handle::NorthWest => CursorType::NwResize,
        Handle::North => CursorType::NorthResize,
        Handle::NorthEast => CursorType::NeResize,
        Handle::West => CursorType::WestResize,
        Handle::East => CursorType::EastResize,
        Handle::SouthWest => CursorType::SwResize,
        Handle::South => CursorType::SouthResize,
        Handle::SouthEast => CursorType::SeResize,
        Handle::Move => CursorType::MoveOrResize,
    }
}

/// The view being moved and resized.
pub trait Manipulatable {
    fn get_position(&self) -> Point;
    fn get_size(&self) -> Size;

    /// Rect the resize handles attach to, in canvas coordinates.
    fn get_resize_frame_rect(&self) -> Rect;

    fn get_handle_function(&self, _handle: Handle) -> HandleFunction {
        HandleFunction::NormalResize
    }

    /// Clamp an origin so the view stays on screen.
    fn limit_position(&self, pt: Point) -> Point;

    fn move_to(&mut self, pt: Point);
    fn move_resize(&mut self, rect: Rect);

    fn set_cursor_type(&mut self, _cursor: Option<CursorType>) {}

    fn get_drag_threshold(&self) -> f64 {
        DEFAULT_DRAG_THRESHOLD
    }

    /// First hit-test chance for view-specific handles.
    fn hit_test_move_resize(&self, _point: Point) -> Option<Handle> {
        None
    }

    fn on_drag_initiated(&mut self) {}
    fn on_drag_activated(&mut self) {}
    fn on_drag_done(&mut self) {}

    fn on_handle_aspect_ratio_pressed(&mut self) {}
    fn on_handle_aspect_ratio_motion(&mut self, _delta: Offset) {}
}

pub struct ViewManipulator {
    context: Context,

    hit_frame_width: f64,
    drag_protection: bool,
    temporary_unlock_time: Option<Duration>,

    min_view_size: Size,

    drag_start_point: Point,
    drag_start_offset: Offset,
    drag_start_rect: Rect,
    drag_handle: Option<Handle>,
    last_drag_handle: Option<Handle>,
    drag_handles: Vec<Handle>,
    /// Waiting for the initial motion event.
    drag_requested: bool,
    /// Start point known, dragging may begin.
    drag_initiated: bool,
    /// The window actually moves/resizes.
    drag_active: bool,
    drag_threshold: f64,
    drag_snap_threshold: f64,

    lock_x_axis: bool,
    lock_y_axis: bool,
}

impl ViewManipulator {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            hit_frame_width: 10.0,
            drag_protection: true,
            temporary_unlock_time: None,
            min_view_size: Size::new(50.0, 50.0),
            drag_start_point: Point::default(),
            drag_start_offset: Offset::default(),
            drag_start_rect: Rect::default(),
            drag_handle: None,
            last_drag_handle: None,
            drag_handles: Handle::ALL.to_vec(),
            drag_requested: false,
            drag_initiated: false,
            drag_active: false,
            drag_threshold: DEFAULT_DRAG_THRESHOLD,
            drag_snap_threshold: DEFAULT_DRAG_SNAP_THRESHOLD,
            lock_x_axis: false,
            lock_y_axis: false,
        }
    }

    pub fn set_min_view_size(&mut self, size: Size) {
        self.min_view_size = size;
    }

    pub fn get_min_view_size(&self) -> Size {
        self.min_view_size
    }

    pub fn get_hit_frame_width(&self) -> f64 {
        self.hit_frame_width
    }

    pub fn enable_drag_protection(&mut self, enable: bool) {
        self.drag_protection = enable;
    }

    pub fn reset_drag_protection(&mut self) {
        self.temporary_unlock_time = None;
    }

    pub fn get_drag_handles(&self) -> &[Handle] {
        &self.drag_handles
    }

    pub fn set_drag_handles(&mut self, handles: Vec<Handle>) {
        self.drag_handles = handles;
    }

    /// Constrain movement to the y axis.
    pub fn lock_x_axis(&mut self, lock: bool) {
        self.lock_x_axis = lock;
    }

    /// Constrain movement to the x axis.
    pub fn lock_y_axis(&mut self, lock: bool) {
        self.lock_y_axis = lock;
    }

    pub fn is_drag_requested(&self) -> bool {
        self.drag_requested
    }

    pub fn is_drag_initiated(&self) -> bool {
        self.drag_initiated
    }

    pub fn is_drag_active(&self) -> bool {
        self.drag_initiated && self.drag_active
    }

    pub fn is_moving(&self) -> bool {
        self.drag_initiated && self.drag_handle == Some(Handle::Move)
    }

    pub fn was_moving(&self) -> bool {
        self.last_drag_handle == Some(Handle::Move)
    }

    pub fn is_resizing(&self) -> bool {
        self.drag_initiated
            && self.drag_handle.is_some()
            && self.drag_handle != Some(Handle::Move)
    }

    /// Press on the view; returns true when a drag was requested.
    pub fn handle_press(
        &mut self,
        view: &mut dyn Manipulatable,
        sequence: &InputSequencePtr,
        move_on_background: bool,
    ) -> bool {
        let (point, root_point) = {
            let s = sequence.borrow();
            (s.point, s.root_point)
        };

        if let Some(hit) = self.hit_test_move_resize(&*view, point) {
            if hit == Handle::Move {
                self.start_move(view, root_point);
            } else {
                self.start_resize(view, hit, root_point);
                if view.get_handle_function(hit) == HandleFunction::AspectRatio {
                    view.on_handle_aspect_ratio_pressed();
                }
            }
            return true;
        }

        if move_on_background && self.drag_handles.contains(&Handle::Move) {
            self.start_move(view, root_point);
            return true;
        }

        false
    }

    /// Motion while pressed; moves/resizes once the drag is active.
    pub fn handle_motion(&mut self, view: &mut dyn Manipulatable, sequence: &InputSequencePtr) {
        let pt = sequence.borrow().root_point;

        if self.is_drag_requested() && !self.is_drag_initiated() {
            self.start_drag(view, pt);
        }
        if !self.is_drag_initiated() {
            return;
        }

        let delta = pt - self.drag_start_point;

        // distance threshold, protection from accidental drags
        if !self.drag_active {
            let d = delta.length();
            let mut drag_active = !self.drag_protection;

            if self.drag_protection {
                if self.temporary_unlock_time.is_none() && d >= self.drag_threshold {
                    self.temporary_unlock_time = Some(UNLOCK_ARMED);

                    // Snap to the pointer for large thresholds; smoother
                    // without snapping, but the window must not end up
                    // far from the cursor or even off-screen.
                    if d < self.drag_snap_threshold {
                        self.drag_start_offset += delta;
                    }
                }
                if self.temporary_unlock_time.is_some() {
                    drag_active = true;
                }
            } else {
                // unlock for touch handles too
                self.temporary_unlock_time = Some(UNLOCK_ARMED);
            }

            self.drag_active |= drag_active;
        }

        if self.drag_active {
            self.handle_motion_fallback(view, delta);
            view.on_drag_activated();
        }
    }

    fn handle_motion_fallback(&mut self, view: &mut dyn Manipulatable, mut delta: Offset) {
        if !self.is_drag_initiated() {
            return;
        }
        let Some(drag_handle) = self.drag_handle else {
            return;
        };

        if view.get_handle_function(drag_handle) == HandleFunction::AspectRatio {
            if drag_handle == Handle::West {
                delta.x *= -1.0;
            }
            view.on_handle_aspect_ratio_motion(delta);
            return;
        }

        let p = self.drag_start_point + delta - self.drag_start_offset;

        if drag_handle == Handle::Move {
            let mut p = p;
            // constrain axis movement
            if self.lock_x_axis {
                p.x = view.get_position().x;
            }
            if self.lock_y_axis {
                p.y = view.get_position().y;
            }
            let pt = view.limit_position(p);
            view.move_to(pt);
        } else {
            // resize: the handle decides which edges move
            let szmin = self.min_view_size;
            let rect = self.drag_start_rect;
            let mut p0 = rect.left_top();
            let mut p1 = rect.right_bottom();
            let sz = rect.size();

            if matches!(
                drag_handle,
                Handle::North | Handle::NorthWest | Handle::NorthEast
            ) {
                p0.y = p.y.min(p1.y - szmin.h);
            }
            if matches!(
                drag_handle,
                Handle::West | Handle::NorthWest | Handle::SouthWest
            ) {
                p0.x = p.x.min(p1.x - szmin.w);
            }
            if matches!(
                drag_handle,
                Handle::East | Handle::NorthEast | Handle::SouthEast
            ) {
                p1.x = (p.x + sz.w).max(p0.x + szmin.w);
            }
            if matches!(
                drag_handle,
                Handle::South | Handle::SouthWest | Handle::SouthEast
            ) {
                p1.y = (p.y + sz.h).max(p0.y + szmin.h);
            }

            view.move_resize(Rect::new(p0.x, p0.y, p1.x - p0.x, p1.y - p0.y));
        }
    }

    /// Set the cursor for the handle under `point`.
    pub fn set_drag_cursor_at(
        &self,
        view: &mut dyn Manipulatable,
        point: Point,
        allow_drag_cursors: bool,
    ) {
        let cursor = if allow_drag_cursors || self.drag_handle.is_some() {
            self.get_drag_cursor_at(&*view, point)
        } else {
            None
        };
        view.set_cursor_type(cursor);
    }

    pub fn reset_drag_cursor(&self, view: &mut dyn Manipulatable) {
        if self.drag_handle.is_none() {
            view.set_cursor_type(Some(CursorType::Default));
        }
    }

    fn get_drag_cursor_at(&self, view: &dyn Manipulatable, point: Point) -> Option<CursorType> {
        let hit = match self.drag_handle {
            Some(handle) => Some(handle),
            None => self.hit_test_move_resize(view, point),
        };

        match hit {
            // delay the move cursor until the drag actually runs
            Some(Handle::Move) if !self.is_drag_active() => None,
            Some(handle) => Some(cursor_for_handle(handle)),
            None => None,
        }
    }

    /// Begin a move without a known start point; the first motion event
    /// supplies it (used by the move button).
    pub fn start_move_undecided(&mut self) {
        self.drag_requested = true;
        self.drag_handle = Some(Handle::Move);
        self.last_drag_handle = self.drag_handle;
    }

    fn start_move(&mut self, view: &mut dyn Manipulatable, point: Point) {
        self.start_drag(view, point);
        self.drag_handle = Some(Handle::Move);
        self.last_drag_handle = self.drag_handle;
    }

    fn start_resize(&mut self, view: &mut dyn Manipulatable, handle: Handle, point: Point) {
        self.start_drag(view, point);
        self.drag_handle = Some(handle);
        self.last_drag_handle = self.drag_handle;
    }

    fn start_drag(&mut self, view: &mut dyn Manipulatable, point: Point) {
        // remember pointer and view positions
        let view_pt = view.get_position();
        self.drag_start_point = point;
        self.drag_start_offset = point - view_pt;
        self.drag_start_rect = Rect::from_position_size(view.get_position(), view.get_size());

        // not yet actually moving the window
        self.drag_requested = true;
        self.drag_initiated = true;
        self.drag_active = false;

        self.drag_threshold = view.get_drag_threshold();

        // expire the temporary threshold unlock
        if !self.drag_protection {
            self.temporary_unlock_time = None;
        } else if let Some(t) = self.temporary_unlock_time {
            if self.context.now().saturating_sub(t) > TEMPORARY_UNLOCK_DELAY {
                self.temporary_unlock_time = None;
            }
        }

        view.on_drag_initiated();
    }

    pub fn stop_move(&mut self, view: &mut dyn Manipulatable) {
        self.stop_drag(view);
    }

    pub fn stop_drag(&mut self, view: &mut dyn Manipulatable) {
        if !self.is_drag_initiated() {
            return;
        }

        if self.temporary_unlock_time.is_none() {
            // snap back to the start position
            if self.drag_protection {
                view.move_resize(self.drag_start_rect);
            }
        } else {
            // restart the temporary unlock period
            self.temporary_unlock_time = Some(self.context.now());
        }

        self.drag_start_offset = Offset::default();
        self.drag_handle = None;
        self.drag_requested = false;
        self.drag_initiated = false;
        self.drag_active = false;

        self.move_into_view(view);
        view.on_drag_done();
    }

    /// Move back into view if the window somehow ended up off-screen.
    fn move_into_view(&mut self, view: &mut dyn Manipulatable) {
        let pt = view.get_position();
        let ptl = view.limit_position(pt);
        if pt != ptl {
            view.move_to(ptl);
        }
    }

    /// Which handle, if any, is under `point`; corners win over edges.
    pub fn hit_test_move_resize(&self, view: &dyn Manipulatable, point: Point) -> Option<Handle> {
        if let Some(handle) = view.hit_test_move_resize(point) {
            return Some(handle);
        }

        let canvas_rect = view.get_resize_frame_rect();

        let w = (canvas_rect.w / 2.0).min(self.hit_frame_width);
        let h = (canvas_rect.h / 2.0).min(self.hit_frame_width);

        let x = point.x;
        let y = point.y;
        let x0 = canvas_rect.left();
        let y0 = canvas_rect.top();
        let x1 = canvas_rect.right();
        let y1 = canvas_rect.bottom();

        // corners first
        for &handle in &self.drag_handles {
            match handle {
                Handle::NorthWest if x >= x0 && x < x0 + w && y >= y0 && y < y0 + h => {
                    return Some(handle)
                }
                Handle::NorthEast if x <= x1 && x > x1 - w && y >= y0 && y < y0 + h => {
                    return Some(handle)
                }
                Handle::SouthEast if x <= x1 && x > x1 - w && y <= y1 && y > y1 - h => {
                    return Some(handle)
                }
                Handle::SouthWest if x >= x0 && x < x0 + w && y <= y1 && y > y1 - h => {
                    return Some(handle)
                }
                _ => {}
            }
        }

        // then the edges; both axes stay bounded so points outside the
        // frame never claim a handle
        let in_x = x >= x0 - 1.0 && x <= x1 + 1.0;
        let in_y = y >= y0 - 1.0 && y <= y1 + 1.0;
        for &handle in &self.drag_handles {
            match handle {
                Handle::West if x < x0 + w && x >= x0 - 1.0 && in_y => return Some(handle),
                Handle::East if x > x1 - w && x <= x1 + 1.0 && in_y => return Some(handle),
                Handle::North if y < y0 + h && y >= y0 - 1.0 && in_x => return Some(handle),
                Handle::South if y > y1 - h && y <= y1 + 1.0 && in_x => return Some(handle),
                _ => {}
            }
        }

        None
    }
}
