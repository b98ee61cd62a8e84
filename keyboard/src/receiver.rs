//! Dispatches raw pointer/touch events to a target as input sequences.
//!
//! Responsibilities:
//! - sequence lifecycle: BEGIN strictly before all UPDATEs, strictly
//!   before exactly one END/CANCEL per sequence id
//! - multi-finger gesture detection with a delayed first begin, so a
//!   two-finger gesture never presses a key
//! - drag/tap classification and stale-sequence cleanup
//! - redirection of sequences between views (e.g. onto a long-press
//!   popup)

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use ahash::AHashMap;
use tracing::{debug, warn};

use crate::context::Context;
use crate::event::{DeviceId, Event, EventTime, EventType, SequenceId, StateMask};
use crate::geometry::Point;
use crate::sequence::{InputSequence, InputSequencePtr, POINTER_SEQUENCE};
use crate::timer::Timer;

/// Span within which a second touch turns the interaction into a gesture.
pub const GESTURE_DETECTION_SPAN: Duration = Duration::from_millis(100);

/// Suspend delayed sequence begins for this long after the last key press.
pub const GESTURE_DELAY_PAUSE: Duration = Duration::from_millis(3000);

/// No delivery of key-presses after gesture detection, but delays
/// press-down.
const DELAY_SEQUENCE_BEGIN: bool = true;

/// Squared distance in pixels until a drag gesture is detected.
pub const DRAG_GESTURE_THRESHOLD2: f64 = 40.0 * 40.0;

/// Taps must end within this many milliseconds of the first begin.
const TAP_MAX_DURATION_MS: EventTime = 300;

/// Sequences without updates for this long are dropped; defends against
/// lost END events.
const STALE_SEQUENCE_MS: u64 = 30_000;

/// Receiver callbacks; the keyboard view implements this.
pub trait SequenceTarget {
    fn on_input_sequence_begin(&mut self, sequence: &InputSequencePtr);
    fn on_input_sequence_update(&mut self, sequence: &InputSequencePtr);
    fn on_input_sequence_end(&mut self, sequence: &InputSequencePtr);

    fn on_enter_notify(&mut self, _event: &Event) {}
    fn on_leave_notify(&mut self, _event: &Event) {}

    fn on_tap_gesture(&mut self, _num_touches: usize) -> bool {
        false
    }
    fn on_drag_gesture_begin(&mut self, _num_touches: usize) -> bool {
        false
    }
    fn on_drag_gesture_end(&mut self, _num_touches: usize) -> bool {
        false
    }

    /// Veto point for the delayed begin, e.g. for move buttons that must
    /// react instantly.
    fn can_delay_sequence_begin(&self, _sequence: &InputSequence) -> bool {
        true
    }
}

/// Coordinate transforms of a view, for sequence redirection.
pub trait CoordinateFrame {
    fn canvas_to_root(&self, pt: Point) -> Point;
    fn root_to_canvas(&self, pt: Point) -> Point;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gesture {
    None,
    Drag,
}

/// Gesture outcome computed while the receiver is borrowed, delivered
/// afterwards so the target may call back into it.
enum GestureEnd {
    Tap(usize),
    DragEnd(usize),
}

pub struct InputEventReceiver {
    context: Context,
    weak: Weak<RefCell<InputEventReceiver>>,
    target: Rc<RefCell<dyn SequenceTarget>>,

    sequences: AHashMap<SequenceId, InputSequencePtr>,
    gesture_timer: Timer,

    last_event_was_touch: bool,
    touch_active: Vec<DeviceId>,

    gesture: Gesture,
    gesture_detected: bool,
    gesture_cancelled: bool,
    num_tap_sequences: usize,
    gesture_begin_point: Point,
    gesture_begin_time: EventTime,
    last_sequence_time: EventTime,
}

impl InputEventReceiver {
    pub fn new(
        context: Context,
        target: Rc<RefCell<dyn SequenceTarget>>,
    ) -> Rc<RefCell<InputEventReceiver>> {
        Rc::new_cyclic(|weak| {
            RefCell::new(InputEventReceiver {
                gesture_timer: Timer::new(context.toolkit.clone()),
                context,
                weak: weak.clone(),
                target,
                sequences: AHashMap::new(),
                last_event_was_touch: false,
                touch_active: Vec::new(),
                gesture: Gesture::None,
                gesture_detected: false,
                gesture_cancelled: false,
                num_tap_sequences: 0,
                gesture_begin_point: Point::default(),
                gesture_begin_time: 0,
                last_sequence_time: 0,
            })
        })
    }

    pub fn has_input_sequences(&self) -> bool {
        !self.sequences.is_empty()
    }

    pub fn last_event_was_touch(&self) -> bool {
        self.last_event_was_touch
    }

    /// Touch-screens that emit touch events get their synthesized pointer
    /// events suppressed.
    pub fn set_device_touch_active(&mut self, device_id: DeviceId) {
        if !self.touch_active.contains(&device_id) {
            self.touch_active.push(device_id);
        }
    }

    pub fn is_device_touch_active(&self, device_id: DeviceId) -> bool {
        self.touch_active.contains(&device_id)
    }

    pub fn clear_touch_active(&mut self) {
        self.touch_active.clear();
    }

    fn can_handle_pointer_event(&self, event: &Event) -> bool {
        !self.context.config.borrow().are_touch_events_enabled()
            || event.source_device_type != crate::event::DeviceType::Touchscreen
            || !self.is_device_touch_active(event.source_device_id)
    }

    fn can_handle_touch_event(&self) -> bool {
        self.context.config.borrow().are_touch_events_enabled()
    }

    fn in_gesture_detection_delay(&self, time: EventTime) -> bool {
        time.saturating_sub(self.gesture_begin_time) < GESTURE_DETECTION_SPAN.as_millis() as u64
    }

    /// Entry point for all raw events.
    pub fn on_event(this: &Rc<RefCell<Self>>, event: &Event) {
        match event.event_type {
            EventType::ButtonPress => Self::on_button_press_event(this, event),
            EventType::ButtonRelease => Self::on_button_release_event(this, event),
            EventType::Motion => Self::on_motion_event(this, event),
            EventType::TouchBegin
            | EventType::TouchUpdate
            | EventType::TouchEnd
            | EventType::TouchCancel => Self::on_touch_event(this, event),
            EventType::Enter => {
                let target = this.borrow().target.clone();
                target.borrow_mut().on_enter_notify(event);
            }
            EventType::Leave => {
                let target = this.borrow().target.clone();
                target.borrow_mut().on_leave_notify(event);
            }
            _ => {
                warn!(?event.event_type, "unknown event received");
            }
        }
    }

    fn on_button_press_event(this: &Rc<RefCell<Self>>, event: &Event) {
        {
            let receiver = this.borrow();
            if !receiver.can_handle_pointer_event(event) {
                return;
            }
        }

        // Double clicks are handled here, not by the toolkit; ignore
        // wheel buttons.
        if (1..=3).contains(&event.button) {
            let now_ms = this.borrow().context.now_ms();
            let mut sequence = InputSequence::from_button_event(event, now_ms);
            sequence.primary = true;
            this.borrow_mut().last_event_was_touch = false;

            Self::input_sequence_begin(this, sequence.shared());
        }
    }

    fn on_button_release_event(this: &Rc<RefCell<Self>>, event: &Event) {
        let sequence = this.borrow().sequences.get(&POINTER_SEQUENCE).cloned();
        if let Some(sequence) = sequence {
            {
                let mut s = sequence.borrow_mut();
                s.point = event.point;
                s.root_point = event.root_point;
                s.time = event.time;
            }
            Self::input_sequence_end(this, sequence);
        }
    }

    fn on_motion_event(this: &Rc<RefCell<Self>>, event: &Event) {
        let sequence = {
            let receiver = this.borrow();
            if !receiver.can_handle_pointer_event(event) {
                return;
            }
            receiver.sequences.get(&POINTER_SEQUENCE).cloned()
        };

        let sequence = match sequence {
            Some(sequence) => {
                let now_ms = this.borrow().context.now_ms();
                let mut s = sequence.borrow_mut();
                s.point = event.point;
                s.root_point = event.root_point;
                s.state = event.state;
                s.time = event.time;
                s.event_type = Some(event.event_type);
                s.update_time = now_ms;
                drop(s);
                Some(sequence)
            }
            None if !event.state.intersects(StateMask::BUTTON123) => {
                // hover: a transient primary sequence, never tracked
                let now_ms = this.borrow().context.now_ms();
                let mut s = InputSequence::from_motion_event(event, now_ms);
                s.primary = true;
                Some(s.shared())
            }
            None => None,
        };

        if let Some(sequence) = sequence {
            this.borrow_mut().last_event_was_touch = false;
            Self::input_sequence_update(this, sequence);
        }
    }

    fn on_touch_event(this: &Rc<RefCell<Self>>, event: &Event) {
        // Mark the device touch-active to block processing of its pointer
        // events. Devices that emit both kinds send the touch event
        // first.
        this.borrow_mut().set_device_touch_active(event.source_device_id);

        if !this.borrow().can_handle_touch_event() {
            return;
        }

        this.borrow_mut().last_event_was_touch = true;
        let now_ms = this.borrow().context.now_ms();

        match event.event_type {
            EventType::TouchBegin => {
                let mut sequence = InputSequence::from_touch_event(event, now_ms);
                if this.borrow().sequences.is_empty() {
                    sequence.primary = true;
                }
                Self::input_sequence_begin(this, sequence.shared());
            }
            EventType::TouchUpdate => {
                let sequence = this.borrow().sequences.get(&event.sequence_id).cloned();
                if let Some(sequence) = sequence {
                    {
                        let mut s = sequence.borrow_mut();
                        s.point = event.point;
                        s.root_point = event.root_point;
                        s.time = event.time;
                        s.update_time = now_ms;
                    }
                    Self::input_sequence_update(this, sequence);
                }
            }
            EventType::TouchEnd | EventType::TouchCancel => {
                let sequence = this.borrow().sequences.get(&event.sequence_id).cloned();
                if let Some(sequence) = sequence {
                    sequence.borrow_mut().time = event.time;
                    Self::input_sequence_end(this, sequence);
                }
            }
            _ => {}
        }
    }

    fn input_sequence_begin(this: &Rc<RefCell<Self>>, sequence: InputSequencePtr) {
        debug!(id = sequence.borrow().id, "input sequence begin");

        enum Action {
            Delay,
            Deliver,
            Nothing,
        }

        let (action, timer, target) = {
            let mut receiver = this.borrow_mut();
            receiver.gesture_sequence_begin(&sequence);

            let first_sequence = receiver.sequences.is_empty();
            let multi_touch_enabled = receiver.context.config.borrow().is_multi_touch_enabled();

            if !(first_sequence || multi_touch_enabled) {
                return;
            }

            let s_time = sequence.borrow().time;
            receiver
                .sequences
                .insert(sequence.borrow().id, sequence.clone());

            let mut action = Action::Nothing;
            if !receiver.gesture_detected {
                let pause_elapsed = s_time.saturating_sub(receiver.last_sequence_time)
                    > GESTURE_DELAY_PAUSE.as_millis() as u64;
                let can_delay = first_sequence
                    && multi_touch_enabled
                    && DELAY_SEQUENCE_BEGIN
                    && pause_elapsed
                    && receiver
                        .target
                        .borrow()
                        .can_delay_sequence_begin(&sequence.borrow());

                action = if can_delay {
                    Action::Delay
                } else {
                    Action::Deliver
                };
            }

            receiver.last_sequence_time = s_time;
            (
                action,
                receiver.gesture_timer.clone(),
                receiver.target.clone(),
            )
        };

        match action {
            Action::Delay => {
                // Delay the first tap; it may have to be stopped from
                // reaching the keyboard.
                let weak = this.borrow().weak.clone();
                let seq = sequence.clone();
                let point = sequence.borrow().point;
                timer.start(GESTURE_DETECTION_SPAN, move || {
                    if let Some(this) = weak.upgrade() {
                        Self::on_delayed_sequence_begin(&this, &seq, point);
                    }
                    false // one-shot
                });
            }
            Action::Deliver => {
                // tell the keyboard right away
                Self::deliver_begin(&target, &sequence);
            }
            Action::Nothing => {}
        }
    }

    fn on_delayed_sequence_begin(
        this: &Rc<RefCell<Self>>,
        sequence: &InputSequencePtr,
        point: Point,
    ) {
        let target = {
            let mut receiver = this.borrow_mut();
            if receiver.gesture_detected {
                return;
            }
            // return to the original begin point
            sequence.borrow_mut().point = point;
            receiver.gesture_cancelled = true;
            receiver.target.clone()
        };
        Self::deliver_begin(&target, sequence);
    }

    fn deliver_begin(target: &Rc<RefCell<dyn SequenceTarget>>, sequence: &InputSequencePtr) {
        target.borrow_mut().on_input_sequence_begin(sequence);
        sequence.borrow_mut().delivered = true;
    }

    fn input_sequence_update(this: &Rc<RefCell<Self>>, sequence: InputSequencePtr) {
        let (drag_begin, deliver, timer, target) = {
            let mut receiver = this.borrow_mut();
            let drag_begin = receiver.gesture_sequence_update(&sequence);

            let s = sequence.borrow();
            let deliver = !s.state.intersects(StateMask::BUTTON123)
                || !receiver.in_gesture_detection_delay(s.time);
            drop(s);

            (
                drag_begin,
                deliver,
                receiver.gesture_timer.clone(),
                receiver.target.clone(),
            )
        };

        if let Some(num_touches) = drag_begin {
            target.borrow_mut().on_drag_gesture_begin(num_touches);
        }

        if deliver {
            timer.finish(); // run a delayed begin before the update
            target.borrow_mut().on_input_sequence_update(&sequence);
        }
    }

    fn input_sequence_end(this: &Rc<RefCell<Self>>, sequence: InputSequencePtr) {
        debug!(id = sequence.borrow().id, "input sequence end");

        let (gesture_end, timer, target) = {
            let mut receiver = this.borrow_mut();
            let gesture_end = receiver.gesture_sequence_end(&sequence);
            (
                gesture_end,
                receiver.gesture_timer.clone(),
                receiver.target.clone(),
            )
        };

        match gesture_end {
            Some(GestureEnd::Tap(n)) => {
                target.borrow_mut().on_tap_gesture(n);
            }
            Some(GestureEnd::DragEnd(n)) => {
                target.borrow_mut().on_drag_gesture_end(n);
            }
            None => {}
        }

        timer.finish(); // run a delayed begin before the end

        let deliver_end = {
            let mut receiver = this.borrow_mut();
            let id = sequence.borrow().id;
            if receiver.sequences.remove(&id).is_some() {
                sequence.borrow().delivered
            } else {
                false
            }
        };

        if deliver_end {
            target.borrow_mut().on_input_sequence_end(&sequence);
        }

        let mut receiver = this.borrow_mut();
        if !receiver.sequences.is_empty() {
            receiver.discard_stuck_input_sequences();
        }
        receiver.last_sequence_time = sequence.borrow().time;
    }

    /// Sequence handling requires balanced begin/update/end events; aged
    /// sequences are cleared out so a lost END cannot leave the keyboard
    /// unresponsive.
    fn discard_stuck_input_sequences(&mut self) {
        let expired = self.context.now_ms().saturating_sub(STALE_SEQUENCE_MS);
        self.sequences.retain(|id, sequence| {
            let stale = sequence.borrow().update_time < expired;
            if stale {
                warn!(id, "discarding expired input sequence");
            }
            !stale
        });
    }

    fn gesture_sequence_begin(&mut self, sequence: &InputSequencePtr) {
        let s = sequence.borrow();
        if self.num_tap_sequences == 0 {
            // first tap
            self.gesture = Gesture::None;
            self.gesture_detected = false;
            self.gesture_cancelled = false;
            self.gesture_begin_point = s.point;
            self.gesture_begin_time = s.time;
        } else {
            // subsequent taps
            if self.in_gesture_detection_delay(s.time) && !self.gesture_cancelled {
                self.gesture_timer.stop(); // cancel the delayed begin
                self.gesture_detected = true;
            }
        }
        self.num_tap_sequences += 1;
    }

    /// Returns the touch count when a drag gesture begins.
    fn gesture_sequence_update(&mut self, sequence: &InputSequencePtr) -> Option<usize> {
        let s = sequence.borrow();
        if self.gesture_detected
            && s.state.intersects(StateMask::BUTTON123)
            && self.gesture == Gesture::None
        {
            let d2 = self.gesture_begin_point.distance2(&s.point);
            if d2 >= DRAG_GESTURE_THRESHOLD2 {
                self.gesture = Gesture::Drag;
                return Some(self.sequences.len());
            }
        }
        None
    }

    fn gesture_sequence_end(&mut self, sequence: &InputSequencePtr) -> Option<GestureEnd> {
        let mut result = None;
        if self.sequences.len() == 1 {
            // last sequence of the gesture
            if self.gesture_detected {
                match self.gesture {
                    Gesture::None => {
                        let elapsed = sequence
                            .borrow()
                            .time
                            .saturating_sub(self.gesture_begin_time);
                        if elapsed <= TAP_MAX_DURATION_MS {
                            result = Some(GestureEnd::Tap(self.num_tap_sequences));
                        }
                    }
                    Gesture::Drag => {
                        result = Some(GestureEnd::DragEnd(0));
                    }
                }
            }
            self.num_tap_sequences = 0;
        }
        result
    }

    /// Redirect an update from `src` to `dst`, e.g. when a finger slides
    /// from the keyboard onto a long-press popup.
    pub fn redirect_sequence_update(
        this: &Rc<RefCell<Self>>,
        sequence: &InputSequencePtr,
        src: &dyn CoordinateFrame,
        dst: &dyn CoordinateFrame,
        func: impl FnOnce(&InputSequencePtr),
    ) {
        let redirected = this
            .borrow_mut()
            .get_redir_sequence(sequence, src, dst);
        func(&redirected);
    }

    /// Redirect an end; the tracked entry is removed first so that
    /// `has_input_sequences` reports false inside `func`.
    pub fn redirect_sequence_end(
        this: &Rc<RefCell<Self>>,
        sequence: &InputSequencePtr,
        src: &dyn CoordinateFrame,
        dst: &dyn CoordinateFrame,
        func: impl FnOnce(&InputSequencePtr),
    ) {
        let redirected = {
            let mut receiver = this.borrow_mut();
            let redirected = receiver.get_redir_sequence(sequence, src, dst);
            let id = sequence.borrow().id;
            receiver.sequences.remove(&id);
            redirected
        };
        func(&redirected);
    }

    fn get_redir_sequence(
        &mut self,
        sequence: &InputSequencePtr,
        src: &dyn CoordinateFrame,
        dst: &dyn CoordinateFrame,
    ) -> InputSequencePtr {
        let id = sequence.borrow().id;
        let redirected = match self.sequences.get(&id) {
            Some(existing) => existing.clone(),
            None => {
                let mut clone = sequence.borrow().clone();
                clone.initial_active_key = None;
                clone.active_key = None;
                clone.cancel_key_action = false; // cancelled by long press
                let clone = clone.shared();
                self.sequences.insert(id, clone.clone());
                clone
            }
        };

        // The root point is not always filled in; derive it from the
        // source view instead.
        let pt = src.canvas_to_root(sequence.borrow().point);
        redirected.borrow_mut().point = dst.root_to_canvas(pt);

        redirected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::toolkit::LoopToolkit;

    #[derive(Default)]
    struct RecordingTarget {
        log: Vec<String>,
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

    fn make_receiver() -> (
        Rc<LoopToolkit>,
        Rc<RefCell<RecordingTarget>>,
        Rc<RefCell<InputEventReceiver>>,
    ) {
        let toolkit = Rc::new(LoopToolkit::new());
        let context = Context::new(toolkit.clone(), Config::default());
        let target = Rc::new(RefCell::new(RecordingTarget::default()));
        let receiver = InputEventReceiver::new(context, target.clone());
        (toolkit, target, receiver)
    }

    #[test]
    fn button_press_release_is_balanced() {
        let (_tk, target, receiver) = make_receiver();

        let press = Event::new(EventType::ButtonPress)
            .at(10.0, 10.0)
            .with_button(1)
            .with_time(10_000);
        InputEventReceiver::on_event(&receiver, &press);
        assert!(receiver.borrow().has_input_sequences());

        let release = Event::new(EventType::ButtonRelease)
            .at(10.0, 10.0)
            .with_button(1)
            .with_time(10_050);
        InputEventReceiver::on_event(&receiver, &release);

        assert!(!receiver.borrow().has_input_sequences());
        assert_eq!(target.borrow().log, vec!["begin:0", "end:0"]);
    }

    #[test]
    fn touch_active_device_suppresses_pointer_events() {
        let (_tk, target, receiver) = make_receiver();

        let touch = Event::new(EventType::TouchBegin)
            .at(5.0, 5.0)
            .with_sequence(7)
            .with_time(10_000)
            .from_device(3, crate::event::DeviceType::Touchscreen);
        InputEventReceiver::on_event(&receiver, &touch);

        // synthesized pointer press from the same touch-screen: ignored
        let press = Event::new(EventType::ButtonPress)
            .at(5.0, 5.0)
            .with_button(1)
            .with_time(10_001)
            .from_device(3, crate::event::DeviceType::Touchscreen);
        InputEventReceiver::on_event(&receiver, &press);

        let end = Event::new(EventType::TouchEnd)
            .with_sequence(7)
            .with_time(10_050)
            .from_device(3, crate::event::DeviceType::Touchscreen);
        InputEventReceiver::on_event(&receiver, &end);

        let log = &target.borrow().log;
        assert_eq!(
            log.iter().filter(|e| e.starts_with("begin")).count(),
            1,
            "log: {:?}",
            log
        );
        assert!(receiver.borrow().last_event_was_touch());
    }
}
