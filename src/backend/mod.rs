//! Hardware backends.
//!
//! Glue between real device sources and the seat core:
//! - libinput-based reader producing raw events (feature `libinput`)
//! - udev hotplug monitor for /dev/input (feature `libinput`)
//! - libseat device strategy for rootless operation (feature `seatd`)

#[cfg(feature = "libinput")]
pub mod hotplug;
#[cfg(feature = "libinput")]
pub mod libinput;
#[cfg(feature = "seatd")]
pub mod seatd;
