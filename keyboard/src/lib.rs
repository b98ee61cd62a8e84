//! softboard-keyboard
//!
//! Input-event and keyboard-view core of the softboard on-screen
//! keyboard: a multi-touch-aware event receiver with gesture detection,
//! auto-show/auto-hide with named visibility locks, a window manipulator
//! with threshold protection, and the keyboard view with its animator,
//! docking, dwell and popup lifecycles.
//!
//! Everything runs on one logical thread; the only concurrency is the
//! raw-event reader thread behind [`queue::EventQueue`]. Timers and idle
//! callbacks come from the embedder through the [`toolkit::Toolkit`]
//! callback table; [`toolkit::LoopToolkit`] is a deterministic
//! implementation for tests and headless use.
//!
//! Public API:
//! - [`Context`] - toolkit + configuration handle threaded everywhere
//! - [`InputEventReceiver`] - sequence lifecycle and gesture detection
//! - [`AutoShow`] / [`AutoHide`] - visibility policies and locks
//! - [`ViewManipulator`] - move/resize/aspect dragging
//! - [`KeyboardView`] / [`KeyboardAnimator`] - the composite view and
//!   its transitions

pub mod geometry;
pub use geometry::{Border, Offset, Point, Rect, Size};

pub mod toolkit;
pub use toolkit::{LoopToolkit, TimerId, Toolkit};

pub mod timer;
pub use timer::Timer;

pub mod config;
pub use config::{
    Config, DockingEdge, DockingMonitor, InputEventSourceKind, KeyAction, RepositionMethod,
    TouchInputMode,
};

pub mod context;
pub use context::Context;

pub mod event;
pub use event::{DeviceId, DeviceType, Event, EventTime, EventType, SequenceId, StateMask};

pub mod sequence;
pub use sequence::{InputSequence, InputSequencePtr, POINTER_SEQUENCE};

pub mod queue;
pub use queue::{EventQueue, EventSource, RawEventRead};

pub mod receiver;
pub use receiver::{CoordinateFrame, InputEventReceiver, SequenceTarget};

pub mod autoshow;
pub use autoshow::{AutoShow, UiElement, VisibilityControl};

pub mod autohide;
pub use autohide::AutoHide;

pub mod manipulator;
pub use manipulator::{CursorType, Handle, HandleFunction, Manipulatable, ViewManipulator};

pub mod animator;
pub use animator::{AnimatorTarget, KeyboardAnimator};

pub mod button;
pub use button::{ButtonAction, ButtonController, ButtonId};

pub mod view;
pub use view::{
    FrameOrigin, KeySink, KeyboardView, LayoutKey, LayoutPopup, LayoutView, ViewBackend,
};
