// Long-press popups with sequence redirection, and dwell activation.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use softboard_keyboard::view::{KeySink, ViewBackend};
use softboard_keyboard::{
    Config, Context, Event, EventType, InputEventReceiver, KeyboardView, LayoutKey, LayoutView,
    LoopToolkit, Rect, StateMask, TouchInputMode,
};

#[derive(Default)]
struct RecordingBackend {
    visible: Option<bool>,
    rect: Option<Rect>,
}

impl ViewBackend for RecordingBackend {
    fn set_visible(&mut self, visible: bool) {
        self.visible = Some(visible);
    }
    fn set_opacity(&mut self, _opacity: f64) {}
    fn move_resize(&mut self, rect: Rect) {
        self.rect = Some(rect);
    }
    fn queue_draw(&mut self) {}
}

#[derive(Default)]
struct RecordingSink {
    log: Vec<String>,
}

impl KeySink for RecordingSink {
    fn on_key_down(&mut self, key_id: &str) {
        self.log.push(format!("down:{}", key_id));
    }
    fn on_key_up(&mut self, key_id: &str, cancelled: bool) {
        if cancelled {
            self.log.push(format!("up:{}:cancelled", key_id));
        } else {
            self.log.push(format!("up:{}", key_id));
        }
    }
}

struct Fixture {
    toolkit: Rc<LoopToolkit>,
    backend: Rc<RefCell<RecordingBackend>>,
    sink: Rc<RefCell<RecordingSink>>,
    view: Rc<RefCell<KeyboardView>>,
    receiver: Rc<RefCell<InputEventReceiver>>,
}

fn fixture() -> Fixture {
    let toolkit = Rc::new(LoopToolkit::new());
    let mut config = Config::default();
    // pointer-driven test, no begin delay
    config.keyboard.touch_input = TouchInputMode::Single;
    config.keyboard.long_press_delay = 0.5;
    let context = Context::new(toolkit.clone(), config);

    let backend = Rc::new(RefCell::new(RecordingBackend::default()));
    let sink = Rc::new(RefCell::new(RecordingSink::default()));

    let view = KeyboardView::new(
        context.clone(),
        backend.clone(),
        sink.clone(),
        Rect::new(100.0, 100.0, 400.0, 200.0),
    );

    let keys = vec![
        LayoutKey::new("a", Rect::new(0.0, 0.0, 40.0, 40.0)).with_alternatives(&["à", "á"]),
        LayoutKey::new("b", Rect::new(40.0, 0.0, 40.0, 40.0)),
        LayoutKey::new("hover", Rect::new(80.0, 0.0, 40.0, 40.0)).dwellable(),
    ];
    view.borrow_mut()
        .set_layout_views(vec![LayoutView::new(Rect::new(0.0, 0.0, 400.0, 200.0), keys)]);

    let target = KeyboardView::sequence_target(&view);
    let receiver = InputEventReceiver::new(context, target);
    view.borrow_mut().set_receiver(receiver.clone());

    Fixture {
        toolkit,
        backend,
        sink,
        view,
        receiver,
    }
}

fn press(x: f64, y: f64, time: u64) -> Event {
    Event::new(EventType::ButtonPress)
        .at(x, y)
        .with_root(x + 100.0, y + 100.0)
        .with_button(1)
        .with_time(time)
}

fn motion(x: f64, y: f64, time: u64) -> Event {
    Event::new(EventType::Motion)
        .at(x, y)
        .with_root(x + 100.0, y + 100.0)
        .with_state(StateMask::BUTTON1)
        .with_time(time)
}

fn hover(x: f64, y: f64, time: u64) -> Event {
    Event::new(EventType::Motion)
        .at(x, y)
        .with_root(x + 100.0, y + 100.0)
        .with_time(time)
}

fn release(x: f64, y: f64, time: u64) -> Event {
    Event::new(EventType::ButtonRelease)
        .at(x, y)
        .with_root(x + 100.0, y + 100.0)
        .with_button(1)
        .with_time(time)
}

#[test]
fn long_press_opens_popup_and_redirects_to_it() {
    let f = fixture();

    // press the key and hold
    InputEventReceiver::on_event(&f.receiver, &press(20.0, 20.0, 10_000));
    assert_eq!(f.sink.borrow().log, vec!["down:a"]);

    // long press: popup opens, the original key unpresses without action
    f.toolkit.advance(Duration::from_millis(600));
    assert!(f.view.borrow().has_key_popup());
    assert_eq!(f.sink.borrow().log, vec!["down:a", "up:a:cancelled"]);

    // slide into the popup (key "á" sits above-right of the pressed key)
    InputEventReceiver::on_event(&f.receiver, &motion(55.0, -25.0, 10_700));

    // release on the popup key activates it and closes the popup
    InputEventReceiver::on_event(&f.receiver, &release(55.0, -25.0, 10_750));
    assert_eq!(
        f.sink.borrow().log,
        vec!["down:a", "up:a:cancelled", "down:á", "up:á"]
    );
    assert!(!f.view.borrow().has_key_popup());
    assert!(!f.receiver.borrow().has_input_sequences());
}

#[test]
fn release_outside_popup_closes_it_after_the_unpress_delay() {
    let f = fixture();

    InputEventReceiver::on_event(&f.receiver, &press(20.0, 20.0, 10_000));
    f.toolkit.advance(Duration::from_millis(600));
    assert!(f.view.borrow().has_key_popup());

    InputEventReceiver::on_event(&f.receiver, &motion(200.0, 150.0, 10_700));
    InputEventReceiver::on_event(&f.receiver, &release(200.0, 150.0, 10_750));

    // still open right after the release...
    assert!(f.view.borrow().has_key_popup());

    // ...gone after the unpress delay
    f.toolkit.advance(Duration::from_millis(200));
    assert!(!f.view.borrow().has_key_popup());

    // no key was activated
    assert_eq!(f.sink.borrow().log, vec!["down:a", "up:a:cancelled"]);
}

#[test]
fn short_press_activates_normally() {
    let f = fixture();

    InputEventReceiver::on_event(&f.receiver, &press(60.0, 20.0, 10_000));
    InputEventReceiver::on_event(&f.receiver, &release(60.0, 20.0, 10_100));

    assert_eq!(f.sink.borrow().log, vec!["down:b", "up:b"]);
    assert!(!f.view.borrow().has_key_popup());
}

#[test]
fn dwell_taps_after_the_delay() {
    let f = fixture();

    // hover onto the dwellable key
    InputEventReceiver::on_event(&f.receiver, &hover(90.0, 20.0, 10_000));
    assert!(f.view.borrow().is_dwelling());

    // progress advances, then a synthetic tap fires
    f.toolkit.advance(Duration::from_secs(2));
    assert!(f.view.borrow().dwell_progress() > 0.3);
    assert!(f.sink.borrow().log.is_empty());

    f.toolkit.advance(Duration::from_secs(3));
    assert_eq!(f.sink.borrow().log, vec!["down:hover", "up:hover"]);
    assert!(!f.view.borrow().is_dwelling());
}

#[test]
fn same_key_needs_distance_before_dwelling_again() {
    let f = fixture();

    InputEventReceiver::on_event(&f.receiver, &hover(90.0, 20.0, 10_000));
    f.toolkit.advance(Duration::from_secs(5));
    assert_eq!(f.sink.borrow().log.len(), 2); // one tap

    // hovering in place must not re-dwell
    InputEventReceiver::on_event(&f.receiver, &hover(91.0, 20.0, 16_000));
    assert!(!f.view.borrow().is_dwelling());

    // leaving by more than the dwell threshold re-arms the key
    InputEventReceiver::on_event(&f.receiver, &hover(110.0, 20.0, 17_000));
    assert!(f.view.borrow().is_dwelling());
}

#[test]
fn visibility_change_during_key_press_applies_on_release() {
    let f = fixture();

    InputEventReceiver::on_event(&f.receiver, &press(60.0, 20.0, 10_000));

    // a show decision arriving while the key is held stays pending
    KeyboardView::set_visible_with_transition(&f.view, true);
    assert_eq!(f.backend.borrow().visible, None);
    assert!(!f.view.borrow().is_visible());

    // releasing the key ends the input and applies the request
    InputEventReceiver::on_event(&f.receiver, &release(60.0, 20.0, 10_100));
    assert_eq!(f.backend.borrow().visible, Some(true));
    assert!(f.view.borrow().is_visible());
}

#[test]
fn sliding_between_keys_represses(){
    let f = fixture();

    InputEventReceiver::on_event(&f.receiver, &press(20.0, 20.0, 10_000));
    // slide from "a" onto "b" before the long press fires
    InputEventReceiver::on_event(&f.receiver, &motion(60.0, 20.0, 10_200));
    InputEventReceiver::on_event(&f.receiver, &release(60.0, 20.0, 10_300));

    assert_eq!(
        f.sink.borrow().log,
        vec!["down:a", "up:a:cancelled", "down:b", "up:b"]
    );
}
