// Drag threshold protection and handle hit-testing.

use std::rc::Rc;
use std::time::Duration;

use softboard_keyboard::manipulator::{Handle, Manipulatable};
use softboard_keyboard::sequence::InputSequence;
use softboard_keyboard::{
    Config, Context, InputSequencePtr, LoopToolkit, Point, Rect, Size, ViewManipulator,
};

/// Minimal window standing in for the keyboard frame.
struct TestWindow {
    rect: Rect,
    moves: Vec<Point>,
}

impl TestWindow {
    fn new() -> Self {
        Self {
            rect: Rect::new(500.0, 500.0, 100.0, 100.0),
            moves: Vec::new(),
        }
    }
}

impl Manipulatable for TestWindow {
    fn get_position(&self) -> Point {
        self.rect.position()
    }
    fn get_size(&self) -> Size {
        self.rect.size()
    }
    fn get_resize_frame_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.rect.w, self.rect.h)
    }
    fn limit_position(&self, pt: Point) -> Point {
        pt
    }
    fn move_to(&mut self, pt: Point) {
        self.rect = self.rect.with_position(pt);
        self.moves.push(pt);
    }
    fn move_resize(&mut self, rect: Rect) {
        self.rect = rect;
        self.moves.push(rect.position());
    }
}

fn context() -> Context {
    Context::new(Rc::new(LoopToolkit::new()), Config::default())
}

fn sequence_at(canvas: Point, root: Point) -> InputSequencePtr {
    let mut s = InputSequence::default();
    s.point = canvas;
    s.root_point = root;
    s.primary = true;
    s.shared()
}

#[test]
fn motion_below_threshold_never_activates() {
    let ctx = context();
    let mut manipulator = ViewManipulator::new(ctx);
    let mut window = TestWindow::new();

    let press = sequence_at(Point::new(50.0, 50.0), Point::new(550.0, 550.0));
    assert!(manipulator.handle_press(&mut window, &press, true));
    assert!(manipulator.is_drag_initiated());
    assert!(!manipulator.is_drag_active());

    // |delta| < threshold (8): nothing moves
    let motion = sequence_at(Point::new(53.0, 53.0), Point::new(553.0, 553.0));
    manipulator.handle_motion(&mut window, &motion);
    assert!(!manipulator.is_drag_active());
    assert!(window.moves.is_empty());
}

#[test]
fn crossing_the_threshold_activates_smoothly() {
    let ctx = context();
    let mut manipulator = ViewManipulator::new(ctx);
    let mut window = TestWindow::new();

    let press = sequence_at(Point::new(50.0, 50.0), Point::new(550.0, 550.0));
    manipulator.handle_press(&mut window, &press, true);

    // |delta| = 10 >= 8 but below the snap threshold (16): the start
    // point shifts so the window does not jump
    let motion = sequence_at(Point::new(60.0, 50.0), Point::new(560.0, 550.0));
    manipulator.handle_motion(&mut window, &motion);
    assert!(manipulator.is_drag_active());
    assert_eq!(window.rect.position(), Point::new(500.0, 500.0));

    // further motion moves 1:1
    let motion = sequence_at(Point::new(65.0, 50.0), Point::new(565.0, 550.0));
    manipulator.handle_motion(&mut window, &motion);
    assert_eq!(window.rect.position(), Point::new(505.0, 500.0));
}

#[test]
fn crossing_the_snap_threshold_jumps_to_the_pointer() {
    let ctx = context();
    let mut manipulator = ViewManipulator::new(ctx);
    let mut window = TestWindow::new();

    let press = sequence_at(Point::new(50.0, 50.0), Point::new(550.0, 550.0));
    manipulator.handle_press(&mut window, &press, true);

    // |delta| = 20 >= snap threshold (16): no start-point shift
    let motion = sequence_at(Point::new(70.0, 50.0), Point::new(570.0, 550.0));
    manipulator.handle_motion(&mut window, &motion);
    assert!(manipulator.is_drag_active());
    assert_eq!(window.rect.position(), Point::new(520.0, 500.0));
}

#[test]
fn disabled_protection_activates_on_any_motion() {
    let ctx = context();
    let mut manipulator = ViewManipulator::new(ctx);
    manipulator.enable_drag_protection(false);
    let mut window = TestWindow::new();

    let press = sequence_at(Point::new(50.0, 50.0), Point::new(550.0, 550.0));
    manipulator.handle_press(&mut window, &press, true);

    let motion = sequence_at(Point::new(51.0, 50.0), Point::new(551.0, 550.0));
    manipulator.handle_motion(&mut window, &motion);
    assert!(manipulator.is_drag_active());
    assert_eq!(window.rect.position(), Point::new(501.0, 500.0));
}

#[test]
fn temporary_unlock_lets_the_next_drag_start_immediately() {
    let toolkit = Rc::new(LoopToolkit::new());
    let ctx = Context::new(toolkit.clone(), Config::default());
    let mut manipulator = ViewManipulator::new(ctx);
    let mut window = TestWindow::new();

    // first drag crosses the threshold, then ends
    let press = sequence_at(Point::new(50.0, 50.0), Point::new(550.0, 550.0));
    manipulator.handle_press(&mut window, &press, true);
    let motion = sequence_at(Point::new(70.0, 50.0), Point::new(570.0, 550.0));
    manipulator.handle_motion(&mut window, &motion);
    manipulator.stop_drag(&mut window);

    // within the 6 s unlock period a new drag activates on first motion
    toolkit.advance(Duration::from_secs(2));
    let press = sequence_at(Point::new(50.0, 50.0), Point::new(570.0, 550.0));
    manipulator.handle_press(&mut window, &press, true);
    let motion = sequence_at(Point::new(52.0, 50.0), Point::new(572.0, 550.0));
    manipulator.handle_motion(&mut window, &motion);
    assert!(manipulator.is_drag_active());
}

#[test]
fn snap_back_when_the_threshold_was_never_crossed() {
    let ctx = context();
    let mut manipulator = ViewManipulator::new(ctx);
    let mut window = TestWindow::new();

    let press = sequence_at(Point::new(50.0, 50.0), Point::new(550.0, 550.0));
    manipulator.handle_press(&mut window, &press, true);
    let motion = sequence_at(Point::new(53.0, 50.0), Point::new(553.0, 550.0));
    manipulator.handle_motion(&mut window, &motion);

    manipulator.stop_drag(&mut window);
    assert_eq!(window.rect.position(), Point::new(500.0, 500.0));
    assert!(!manipulator.is_drag_initiated());
}

#[test]
fn corners_win_over_edges() {
    let ctx = context();
    let manipulator = ViewManipulator::new(ctx);
    let window = &mut TestWindow::new();

    // top-left corner: both West and North would match as edges
    assert_eq!(
        manipulator.hit_test_move_resize(window, Point::new(5.0, 5.0)),
        Some(Handle::NorthWest)
    );
    assert_eq!(
        manipulator.hit_test_move_resize(window, Point::new(95.0, 95.0)),
        Some(Handle::SouthEast)
    );

    // plain edges away from the corners
    assert_eq!(
        manipulator.hit_test_move_resize(window, Point::new(5.0, 50.0)),
        Some(Handle::West)
    );
    assert_eq!(
        manipulator.hit_test_move_resize(window, Point::new(50.0, 95.0)),
        Some(Handle::South)
    );

    // inside: no handle
    assert_eq!(
        manipulator.hit_test_move_resize(window, Point::new(50.0, 50.0)),
        None
    );

    // outside the frame inflated by the hit width: no handle
    assert_eq!(
        manipulator.hit_test_move_resize(window, Point::new(150.0, 50.0)),
        None
    );
    assert_eq!(
        manipulator.hit_test_move_resize(window, Point::new(-20.0, 50.0)),
        None
    );

    // within an edge band but far outside along the other axis
    assert_eq!(
        manipulator.hit_test_move_resize(window, Point::new(5.0, -500.0)),
        None
    );
    assert_eq!(
        manipulator.hit_test_move_resize(window, Point::new(-500.0, 5.0)),
        None
    );
    assert_eq!(
        manipulator.hit_test_move_resize(window, Point::new(95.0, 300.0)),
        None
    );
}

#[test]
fn resize_clamps_to_the_minimum_size() {
    let ctx = context();
    let mut manipulator = ViewManipulator::new(ctx);
    manipulator.enable_drag_protection(false);
    let mut window = TestWindow::new();

    // grab the south-east corner
    let press = sequence_at(Point::new(95.0, 95.0), Point::new(595.0, 595.0));
    assert!(manipulator.handle_press(&mut window, &press, false));
    assert!(manipulator.is_resizing());

    // drag far past the opposite corner
    let motion = sequence_at(Point::new(-200.0, -200.0), Point::new(300.0, 300.0));
    manipulator.handle_motion(&mut window, &motion);

    assert_eq!(window.rect.size(), Size::new(50.0, 50.0));
}

#[test]
fn axis_locks_constrain_movement() {
    let ctx = context();
    let mut manipulator = ViewManipulator::new(ctx);
    manipulator.enable_drag_protection(false);
    manipulator.lock_y_axis(true);
    let mut window = TestWindow::new();

    let press = sequence_at(Point::new(50.0, 50.0), Point::new(550.0, 550.0));
    manipulator.handle_press(&mut window, &press, true);
    let motion = sequence_at(Point::new(70.0, 80.0), Point::new(570.0, 580.0));
    manipulator.handle_motion(&mut window, &motion);

    // y stays put, x follows
    assert_eq!(window.rect.position(), Point::new(520.0, 500.0));
}
