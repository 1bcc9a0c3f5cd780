//! Probe for a graphical environment before any window is created.

use std::env;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayCapability {
    Available,
    Unavailable(String),
}

impl DisplayCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

impl fmt::Display for DisplayCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => f.write_str("display available"),
            Self::Unavailable(reason) => write!(f, "no display: {reason}"),
        }
    }
}

/// Checks the process environment.
pub fn probe_display() -> DisplayCapability {
    probe_display_with(|name| env::var_os(name).is_some_and(|value| !value.is_empty()))
}

/// X11 and Wayland sessions advertise themselves through `DISPLAY` and
/// `WAYLAND_DISPLAY`; other platforms always have a compositor.
pub fn probe_display_with(is_set: impl Fn(&str) -> bool) -> DisplayCapability {
    if !cfg!(all(unix, not(target_os = "macos"), not(target_os = "ios"), not(target_os = "android"))) {
        return DisplayCapability::Available;
    }
    if is_set("DISPLAY") || is_set("WAYLAND_DISPLAY") {
        DisplayCapability::Available
    } else {
        DisplayCapability::Unavailable("neither DISPLAY nor WAYLAND_DISPLAY is set".into())
    }
}
