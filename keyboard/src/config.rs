//! Keyboard, auto-show and window configuration.
//!
//! A typed key/value store with TOML round-trip; every component reads it
//! through the shared [`crate::Context`].

use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a key press does by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAction {
    SingleStroke,
    DelayedStroke,
}

/// Which kinds of touch input are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TouchInputMode {
    None,
    Single,
    Multi,
}

/// Where raw events come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputEventSourceKind {
    Gtk,
    XInput,
}

/// Auto-show repositioning method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepositionMethod {
    None,
    PreventOcclusion,
    ReduceTravel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DockingEdge {
    Top,
    Bottom,
}

/// Monitor the dock lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DockingMonitor {
    Active,
    Primary,
    Index(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardSection {
    pub show_click_buttons: bool,
    /// Seconds until sticky keys release on their own.
    pub sticky_key_release_delay: f64,
    /// Seconds until sticky keys release when the keyboard hides.
    pub sticky_key_release_on_hide_delay: f64,
    /// Seconds a key must be held for a long press.
    pub long_press_delay: f64,
    pub default_key_action: KeyAction,
    pub touch_input: TouchInputMode,
    pub input_event_source: InputEventSourceKind,
}

impl Default for KeyboardSection {
    fn default() -> Self {
        Self {
            show_click_buttons: false,
            sticky_key_release_delay: 0.0,
            sticky_key_release_on_hide_delay: 5.0,
            long_press_delay: 0.5,
            default_key_action: KeyAction::SingleStroke,
            touch_input: TouchInputMode::Multi,
            input_event_source: InputEventSourceKind::Gtk,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoShowSection {
    pub enabled: bool,
    pub reposition_method_floating: RepositionMethod,
    pub reposition_method_docked: RepositionMethod,
    /// Clearance around the focused widget in pixels.
    pub widget_clearance: f64,
    pub hide_on_key_press: bool,
    /// Seconds the keyboard stays hidden after an external key press.
    pub hide_on_key_press_pause: f64,
    pub tablet_mode_detection_enabled: bool,
    pub keyboard_device_detection_enabled: bool,
}

impl Default for AutoShowSection {
    fn default() -> Self {
        Self {
            enabled: false,
            reposition_method_floating: RepositionMethod::PreventOcclusion,
            reposition_method_docked: RepositionMethod::PreventOcclusion,
            widget_clearance: 25.0,
            hide_on_key_press: true,
            hide_on_key_press_pause: 1.8,
            tablet_mode_detection_enabled: false,
            keyboard_device_detection_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSection {
    /// Opacity of the active window, 0..1.
    pub transparency: f64,
    pub background_transparency: f64,
    /// Opacity while inactive, 0..1.
    pub inactive_transparency: f64,
    /// Seconds of inactivity before fading.
    pub inactive_transparency_delay: f64,
    pub docking_enabled: bool,
    pub docking_edge: DockingEdge,
    pub docking_monitor: DockingMonitor,
    pub docking_shrink_workarea: bool,
    /// Expand the dock to the full work-area width.
    pub docking_expand: bool,
    /// Allowed combined-aspect range for the dock's aspect handles.
    pub docking_aspect_change_range: (f64, f64),
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            transparency: 1.0,
            background_transparency: 1.0,
            inactive_transparency: 0.5,
            inactive_transparency_delay: 8.0,
            docking_enabled: false,
            docking_edge: DockingEdge::Bottom,
            docking_monitor: DockingMonitor::Active,
            docking_shrink_workarea: true,
            docking_expand: true,
            docking_aspect_change_range: (0.75, 3.0),
        }
    }
}

/// The configuration tree of the keyboard core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub keyboard: KeyboardSection,
    pub auto_show: AutoShowSection,
    pub window: WindowSection,
}

impl Config {
    pub fn load_toml(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_toml(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn are_touch_events_enabled(&self) -> bool {
        self.keyboard.touch_input != TouchInputMode::None
    }

    pub fn is_multi_touch_enabled(&self) -> bool {
        self.keyboard.touch_input == TouchInputMode::Multi
    }

    /// Clamp the configured monitor choice to the 0..=8 index range.
    pub fn docking_monitor_index_limit(&self) -> usize {
        8
    }
}
