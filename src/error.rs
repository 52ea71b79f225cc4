//! Error types shared across the input core.

use thiserror::Error;

use crate::event::DeviceId;
use crate::idle::WatchId;

/// Errors reported by the input core.
///
/// Callback panics are deliberately not caught anywhere in the crate:
/// a filter or constraint callback that panics is a host-plugin bug and
/// propagates, since catching it could leave pointer state corrupted.
#[derive(Debug, Error)]
pub enum InputError {
    /// Device could not be opened. It is marked unavailable and not
    /// retried automatically.
    #[error("device unavailable: {path}")]
    DeviceUnavailable { path: String },

    /// Host denied access to the device node. Propagated, no retry.
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// Device node exists but is exclusively held elsewhere.
    #[error("device busy: {path}")]
    DeviceBusy { path: String },

    /// A filter with the same identity is already registered. The
    /// previous registration remains active.
    #[error("filter already registered")]
    DuplicateFilter,

    /// Layout index outside `[0, layout_count)`. The previous layout is
    /// retained.
    #[error("layout index {index} out of range (keymap has {count} layouts)")]
    InvalidLayoutIndex { index: usize, count: usize },

    /// Idle watch id does not name a live watch.
    #[error("idle watch {0} not found")]
    WatchNotFound(WatchId),

    /// Device id does not name a registered device.
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),
}

pub type Result<T> = std::result::Result<T, InputError>;
