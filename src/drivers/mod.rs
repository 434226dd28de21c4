//! Output drivers.

pub mod indicator;
