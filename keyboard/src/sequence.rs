//! Input sequences: one pointer or touch interaction from begin to end.

use std::cell::RefCell;
use std::rc::Rc;

use crate::event::{Event, EventTime, EventType, MouseButton, SequenceId, StateMask};
use crate::geometry::Point;

/// Sequence id of the mouse pointer; touch ids are opaque and non-zero.
pub const POINTER_SEQUENCE: SequenceId = 0;

/// A pointer or touch interaction tracked from BEGIN through UPDATEs to
/// END/CANCEL.
///
/// Shared between the receiver (while tracked in the open-sequence map)
/// and any view it was delivered to.
#[derive(Debug, Clone, Default)]
pub struct InputSequence {
    pub id: SequenceId,
    pub point: Point,
    pub root_point: Point,
    pub button: MouseButton,
    pub event_type: Option<EventType>,
    pub state: StateMask,
    /// Event time in milliseconds.
    pub time: EventTime,
    /// Wall-clock milliseconds of the last update; feeds stale-sequence
    /// cleanup only.
    pub update_time: EventTime,

    /// Only primary sequences may move/resize windows.
    pub primary: bool,
    /// Has the begin been sent to the target?
    pub delivered: bool,

    /// Key currently pressed by this sequence.
    pub active_key: Option<String>,
    /// First key pressed by this sequence.
    pub initial_active_key: Option<String>,
    /// Cancel the key action on release, e.g. after a long press.
    pub cancel_key_action: bool,
}

pub type InputSequencePtr = Rc<RefCell<InputSequence>>;

impl InputSequence {
    pub fn from_button_event(event: &Event, update_time: EventTime) -> Self {
        Self {
            id: POINTER_SEQUENCE,
            point: event.point,
            root_point: event.root_point,
            button: MouseButton::from_number(event.button),
            event_type: Some(event.event_type),
            state: event.state,
            time: event.time,
            update_time,
            ..Default::default()
        }
    }

    pub fn from_motion_event(event: &Event, update_time: EventTime) -> Self {
        Self {
            id: POINTER_SEQUENCE,
            point: event.point,
            root_point: event.root_point,
            button: MouseButton::None,
            event_type: Some(event.event_type),
            state: event.state,
            time: event.time,
            update_time,
            ..Default::default()
        }
    }

    pub fn from_touch_event(event: &Event, update_time: EventTime) -> Self {
        Self {
            id: event.sequence_id,
            point: event.point,
            root_point: event.root_point,
            button: MouseButton::Left,
            event_type: Some(event.event_type),
            state: event.state,
            time: event.time,
            update_time,
            ..Default::default()
        }
    }

    pub fn is_touch(&self) -> bool {
        self.id != POINTER_SEQUENCE
    }

    pub fn shared(self) -> InputSequencePtr {
        Rc::new(RefCell::new(self))
    }
}
