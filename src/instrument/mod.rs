//! Instrument drivers.
pub mod hp4280a;
