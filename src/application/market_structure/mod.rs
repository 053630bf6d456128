//! Market-structure engine: volume profile, VWAP, anchor pivot and low-volume areas.

pub mod volume_profile;
pub mod vwap;

pub use volume_profile::{ProfileSettings, compute_profile, find_low_volume_area};
pub use vwap::{anchored_window, compute_vwap, find_anchor_pivot, swing_extremes};
