// Multi-touch gesture detection and sequence lifecycle.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use softboard_keyboard::receiver::SequenceTarget;
use softboard_keyboard::{
    Config, Context, DeviceType, Event, EventType, InputEventReceiver, InputSequencePtr,
    LoopToolkit, StateMask,
};

#[derive(Default)]
struct RecordingTarget {
    log: Vec<String>,
}

impl RecordingTarget {
    fn log_of(&self, prefix: &str) -> Vec<String> {
        self.log
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl SequenceTarget for RecordingTarget {
    fn on_input_sequence_begin(&mut self, sequence: &InputSequencePtr) {
        self.log.push(format!("begin:{}", sequence.borrow().id));
    }
    fn on_input_sequence_update(&mut self, sequence: &InputSequencePtr) {
        self.log.push(format!("update:{}", sequence.borrow().id));
    }
    fn on_input_sequence_end(&mut self, sequence: &InputSequencePtr) {
        self.log.push(format!("end:{}", sequence.borrow().id));
    }
    fn on_tap_gesture(&mut self, num_touches: usize) -> bool {
        self.log.push(format!("tap:{}", num_touches));
        true
    }
    fn on_drag_gesture_begin(&mut self, num_touches: usize) -> bool {
        self.log.push(format!("drag-begin:{}", num_touches));
        true
    }
    fn on_drag_gesture_end(&mut self, num_touches: usize) -> bool {
        self.log.push(format!("drag-end:{}", num_touches));
        true
    }
}

struct Fixture {
    toolkit: Rc<LoopToolkit>,
    target: Rc<RefCell<RecordingTarget>>,
    receiver: Rc<RefCell<InputEventReceiver>>,
}

fn fixture() -> Fixture {
    let toolkit = Rc::new(LoopToolkit::new());
    let context = Context::new(toolkit.clone(), Config::default());
    let target = Rc::new(RefCell::new(RecordingTarget::default()));
    let receiver = InputEventReceiver::new(context, target.clone());
    Fixture {
        toolkit,
        target,
        receiver,
    }
}

fn touch(event_type: EventType, id: u64, x: f64, y: f64, time: u64) -> Event {
    Event::new(event_type)
        .at(x, y)
        .with_sequence(id)
        .with_time(time)
        .with_state(StateMask::BUTTON1)
        .from_device(5, DeviceType::Touchscreen)
}

#[test]
fn two_finger_tap_suppresses_the_first_press() {
    let f = fixture();

    // first touch; the begin is held back for gesture detection
    InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchBegin, 1, 10.0, 10.0, 10_000));
    assert!(f.target.borrow().log.is_empty());

    // second touch 50 ms later: gesture detected, delayed begin dropped
    InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchBegin, 2, 60.0, 10.0, 10_050));
    f.toolkit.advance(Duration::from_millis(200));
    assert!(
        f.target.borrow().log_of("begin").is_empty(),
        "no press may be delivered for an intercepted touch: {:?}",
        f.target.borrow().log
    );

    // joint release within 300 ms of the first begin: two-finger tap
    InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchEnd, 1, 10.0, 10.0, 10_200));
    InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchEnd, 2, 60.0, 10.0, 10_250));

    assert_eq!(f.target.borrow().log_of("tap"), vec!["tap:2"]);
    assert!(!f.receiver.borrow().has_input_sequences());
}

#[test]
fn slow_second_touch_does_not_form_a_gesture() {
    let f = fixture();

    InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchBegin, 1, 10.0, 10.0, 10_000));
    // the delayed begin fires after the detection span
    f.toolkit.advance(Duration::from_millis(150));
    assert_eq!(f.target.borrow().log_of("begin"), vec!["begin:1"]);

    // a second touch outside the detection span is just another press
    InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchBegin, 2, 60.0, 10.0, 10_400));
    assert_eq!(
        f.target.borrow().log_of("begin"),
        vec!["begin:1", "begin:2"]
    );

    InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchEnd, 1, 10.0, 10.0, 10_500));
    InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchEnd, 2, 60.0, 10.0, 10_550));
    assert_eq!(f.target.borrow().log_of("end"), vec!["end:1", "end:2"]);
    assert!(f.target.borrow().log_of("tap").is_empty());
    assert!(!f.receiver.borrow().has_input_sequences());
}

#[test]
fn two_finger_drag_reports_begin_and_end() {
    let f = fixture();

    InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchBegin, 1, 10.0, 10.0, 10_000));
    InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchBegin, 2, 60.0, 10.0, 10_040));

    // move beyond the 40 px drag threshold
    InputEventReceiver::on_event(
        &f.receiver,
        &touch(EventType::TouchUpdate, 1, 10.0, 60.0, 10_080),
    );
    assert_eq!(f.target.borrow().log_of("drag-begin"), vec!["drag-begin:2"]);

    InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchEnd, 1, 10.0, 60.0, 10_300));
    InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchEnd, 2, 60.0, 10.0, 10_350));
    assert_eq!(f.target.borrow().log_of("drag-end"), vec!["drag-end:0"]);

    // drags never deliver key presses
    assert!(f.target.borrow().log_of("begin").is_empty());
    assert!(!f.receiver.borrow().has_input_sequences());
}

#[test]
fn delivered_begins_are_balanced_by_exactly_one_end() {
    let f = fixture();

    for round in 0..3u64 {
        let t = 10_000 + round * 5_000;
        InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchBegin, 1, 5.0, 5.0, t));
        f.toolkit.advance(Duration::from_millis(150));
        InputEventReceiver::on_event(
            &f.receiver,
            &touch(EventType::TouchUpdate, 1, 6.0, 5.0, t + 50),
        );
        InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchEnd, 1, 6.0, 5.0, t + 80));
        assert!(!f.receiver.borrow().has_input_sequences());
    }

    let target = f.target.borrow();
    assert_eq!(target.log_of("begin").len(), 3);
    assert_eq!(target.log_of("end").len(), 3);
}

#[test]
fn touch_cancel_ends_the_sequence() {
    let f = fixture();

    InputEventReceiver::on_event(&f.receiver, &touch(EventType::TouchBegin, 9, 5.0, 5.0, 10_000));
    f.toolkit.advance(Duration::from_millis(150));
    InputEventReceiver::on_event(
        &f.receiver,
        &touch(EventType::TouchCancel, 9, 5.0, 5.0, 10_100),
    );

    let target = f.target.borrow();
    assert_eq!(target.log_of("begin"), vec!["begin:9"]);
    assert_eq!(target.log_of("end"), vec!["end:9"]);
    assert!(!f.receiver.borrow().has_input_sequences());
}
