// Named visibility locks: timed auto-release and deferred requests.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use softboard_keyboard::autoshow::VisibilityControl;
use softboard_keyboard::{AutoShow, Config, Context, LoopToolkit};

#[derive(Default)]
struct VisibilityLog {
    transitions: Vec<bool>,
    visible: bool,
}

impl VisibilityControl for VisibilityLog {
    fn begin_visibility_transition(&mut self, show: bool) {
        self.transitions.push(show);
        self.visible = show;
    }
    fn stop_auto_positioning(&mut self) {}
    fn is_keyboard_visible(&self) -> bool {
        self.visible
    }
}

struct Fixture {
    toolkit: Rc<LoopToolkit>,
    sink: Rc<RefCell<VisibilityLog>>,
    // keeps the trait-object Rc alive for the sink's Weak
    _sink_dyn: Rc<RefCell<dyn VisibilityControl>>,
    auto_show: Rc<RefCell<AutoShow>>,
}

fn fixture() -> Fixture {
    let toolkit = Rc::new(LoopToolkit::new());
    let context = Context::new(toolkit.clone(), Config::default());
    let sink: Rc<RefCell<VisibilityLog>> = Rc::new(RefCell::new(VisibilityLog::default()));
    let sink_dyn: Rc<RefCell<dyn VisibilityControl>> = sink.clone();
    let auto_show = AutoShow::new(context, Rc::downgrade(&sink_dyn));
    Fixture {
        toolkit,
        sink,
        _sink_dyn: sink_dyn,
        auto_show,
    }
}

#[test]
fn unlock_returns_the_request_made_during_the_lock() {
    let f = fixture();

    AutoShow::lock(
        &f.auto_show,
        "test-reason",
        Some(Duration::from_secs(10)),
        true,
        true,
    );

    AutoShow::request_keyboard_visible(&f.auto_show, true, None);
    AutoShow::request_keyboard_visible(&f.auto_show, false, None);

    f.toolkit.advance(Duration::from_secs(1)); // D' < D
    assert!(f.auto_show.borrow().is_locked("test-reason"));

    // the most recent request during the lock's lifetime
    assert_eq!(AutoShow::unlock(&f.auto_show, "test-reason"), Some(false));

    // nothing reached the sink while both directions were locked
    assert!(f.sink.borrow().transitions.is_empty());
}

#[test]
fn unlock_without_requests_returns_none() {
    let f = fixture();
    AutoShow::lock(&f.auto_show, "idle", None, true, true);
    assert_eq!(AutoShow::unlock(&f.auto_show, "idle"), None);
    assert_eq!(AutoShow::unlock(&f.auto_show, "idle"), None); // already gone
}

#[test]
fn lock_expires_after_its_duration() {
    let f = fixture();
    AutoShow::lock(
        &f.auto_show,
        "timed",
        Some(Duration::from_millis(500)),
        true,
        true,
    );
    assert!(f.auto_show.borrow().is_locked("timed"));

    f.toolkit.advance(Duration::from_millis(600)); // D' > D
    assert!(!f.auto_show.borrow().is_locked("timed"));
}

#[test]
fn relocking_replaces_the_previous_lock() {
    let f = fixture();
    AutoShow::lock(
        &f.auto_show,
        "reason",
        Some(Duration::from_millis(100)),
        true,
        true,
    );
    // replace with a longer duration before the first expires
    AutoShow::lock(
        &f.auto_show,
        "reason",
        Some(Duration::from_millis(1000)),
        true,
        false,
    );

    f.toolkit.advance(Duration::from_millis(500));
    assert!(f.auto_show.borrow().is_locked("reason"));
    assert!(!f.auto_show.borrow().is_hide_locked());

    f.toolkit.advance(Duration::from_millis(600));
    assert!(!f.auto_show.borrow().is_locked("reason"));
}

#[test]
fn hide_on_key_press_scenario() {
    let f = fixture();

    // the keyboard is up
    AutoShow::request_keyboard_visible(&f.auto_show, true, None);
    assert_eq!(f.sink.borrow().transitions, vec![true]);

    // external key press: hide now, block showing for 1.8 s
    AutoShow::lock_and_hide(
        &f.auto_show,
        "hide-on-key-press",
        Some(Duration::from_millis(1800)),
    );
    assert_eq!(f.sink.borrow().transitions, vec![true, false]);

    // a focus change during the lock is suppressed...
    AutoShow::request_keyboard_visible(&f.auto_show, true, None);
    f.toolkit.advance(Duration::from_millis(100));
    assert_eq!(f.sink.borrow().transitions, vec![true, false]);

    // ...and applied when the lock auto-releases
    f.toolkit.advance(Duration::from_millis(1800));
    assert!(!f.auto_show.borrow().is_locked("hide-on-key-press"));
    assert_eq!(f.sink.borrow().transitions, vec![true, false, true]);
}

#[test]
fn hide_stays_possible_while_only_show_is_locked() {
    let f = fixture();
    AutoShow::lock(&f.auto_show, "show-only", None, true, false);

    assert!(f.auto_show.borrow().can_hide_keyboard());
    assert!(!f.auto_show.borrow().can_show_keyboard());

    AutoShow::request_keyboard_visible(&f.auto_show, false, Some(Duration::ZERO));
    assert_eq!(f.sink.borrow().transitions, vec![false]);
}

#[test]
fn lock_visible_pins_the_keyboard() {
    let f = fixture();
    AutoShow::lock_visible(&f.auto_show, true, Some(Duration::ZERO));

    // hide requests turn into show requests while pinned
    AutoShow::request_keyboard_visible(&f.auto_show, false, Some(Duration::ZERO));
    assert_eq!(f.sink.borrow().transitions, vec![true]);
}
