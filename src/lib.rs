//! evseat - native input backend core
//!
//! Mediates between raw hardware input devices and a windowing system's
//! event consumers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Event Loop (one thread)             │
//! ├─────────────────────────────────────────────────────────┤
//! │ device → Gateway → Filter Chain → Translator → consumer │
//! │                                   (constraint)          │
//! │            Idle Watches ← every accepted raw event      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything on the hot path runs on a single thread driven by a
//! readiness loop: raw events are queued on [`SeatCore`], drained with
//! [`SeatCore::process_pending`], and timer-backed state (idle watches,
//! key repeat) is advanced with [`SeatCore::dispatch_timers`]. Filter and
//! constraint callbacks run inline and must not block.

pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod filter;
pub mod idle;
pub mod keyboard;
pub mod pointer;
pub mod seat;
pub mod translate;

#[cfg(target_os = "linux")]
pub mod backend;

pub use config::InputConfig;
pub use device::{DeviceGateway, DeviceStrategy};
pub use error::{InputError, Result};
pub use event::{
    ButtonState, Capabilities, DeviceId, EventKind, KeyState, RawEvent, RawEventKind, UnifiedEvent,
};
pub use filter::{EventFilter, FilterChain, FilterResult};
pub use idle::{IdleRegistry, WatchId};
pub use keyboard::{KeyboardState, Keymap, RepeatConfig};
pub use pointer::{PointerConstraint, PointerPosition, RegionConstraint};
pub use seat::SeatCore;
pub use translate::Translator;
