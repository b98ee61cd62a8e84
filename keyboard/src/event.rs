//! Structured input events as delivered by the embedder.

use bitflags::bitflags;

use crate::geometry::Point;

/// Milliseconds, as stamped by the input backend.
pub type EventTime = u64;

/// Opaque device identifier.
pub type DeviceId = u32;

/// Identifies one touch sequence; 0 is the pointer sequence.
pub type SequenceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    ButtonPress,
    ButtonRelease,
    Motion,
    TouchBegin,
    TouchUpdate,
    TouchEnd,
    TouchCancel,
    Enter,
    Leave,
    KeyPress,
    KeyRelease,
    DeviceAdded,
    DeviceRemoved,
    DeviceChanged,
    SlaveAttached,
    SlaveDetached,
}

/// Class of the source device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Pointer,
    Touchscreen,
    Keyboard,
    Unknown,
}

bitflags! {
    /// Button and modifier state at event time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StateMask: u32 {
        const SHIFT = 1 << 0;
        const CONTROL = 1 << 2;
        const MOD1 = 1 << 3;
        const BUTTON1 = 1 << 8;
        const BUTTON2 = 1 << 9;
        const BUTTON3 = 1 << 10;

        const BUTTON123 = Self::BUTTON1.bits() | Self::BUTTON2.bits() | Self::BUTTON3.bits();
    }
}

/// Pointer/keyboard button number; 1 for touch contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseButton {
    #[default]
    None,
    Left,
    Middle,
    Right,
    Other(u32),
}

impl MouseButton {
    pub fn from_number(button: u32) -> Self {
        match button {
            0 => MouseButton::None,
            1 => MouseButton::Left,
            2 => MouseButton::Middle,
            3 => MouseButton::Right,
            n => MouseButton::Other(n),
        }
    }

    pub fn number(&self) -> u32 {
        match self {
            MouseButton::None => 0,
            MouseButton::Left => 1,
            MouseButton::Middle => 2,
            MouseButton::Right => 3,
            MouseButton::Other(n) => *n,
        }
    }
}

/// One structured input event.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    /// Position in view (canvas) coordinates.
    pub point: Point,
    /// Position in root (screen) coordinates.
    pub root_point: Point,
    pub button: u32,
    pub state: StateMask,
    /// Event time in milliseconds.
    pub time: EventTime,
    /// Touch sequence this event belongs to; meaningless for pointer
    /// events.
    pub sequence_id: SequenceId,
    pub source_device_id: DeviceId,
    pub source_device_type: DeviceType,
    pub source_device_name: String,
    /// Hardware keycode for key events.
    pub keycode: u32,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            point: Point::default(),
            root_point: Point::default(),
            button: 0,
            state: StateMask::empty(),
            time: 0,
            sequence_id: 0,
            source_device_id: 0,
            source_device_type: DeviceType::Pointer,
            source_device_name: String::new(),
            keycode: 0,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.point = Point::new(x, y);
        self.root_point = Point::new(x, y);
        self
    }

    pub fn with_root(mut self, x: f64, y: f64) -> Self {
        self.root_point = Point::new(x, y);
        self
    }

    pub fn with_button(mut self, button: u32) -> Self {
        self.button = button;
        self
    }

    pub fn with_state(mut self, state: StateMask) -> Self {
        self.state = state;
        self
    }

    pub fn with_time(mut self, time: EventTime) -> Self {
        self.time = time;
        self
    }

    pub fn with_sequence(mut self, sequence_id: SequenceId) -> Self {
        self.sequence_id = sequence_id;
        self
    }

    pub fn from_device(mut self, id: DeviceId, device_type: DeviceType) -> Self {
        self.source_device_id = id;
        self.source_device_type = device_type;
        self
    }

    /// Is this a positional update that may be coalesced with a newer
    /// event of the same kind from the same device?
    pub fn is_coalescable(&self) -> bool {
        matches!(self.event_type, EventType::Motion | EventType::TouchUpdate)
    }
}
