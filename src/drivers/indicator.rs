//! Binary indicator output.
//!
//! Wraps any `embedded_hal` [`OutputPin`].  The pin sits behind a mutex so
//! HTTP handlers and the startup task can both drive it; the logical state
//! is mirrored in an atomic so reads never block.
//!
//! On ESP-IDF the pin is a `PinDriver<Output>`; host tests use a mock.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::app::ports::IndicatorPort;

pub struct Indicator<P: OutputPin + Send> {
    pin: Mutex<P>,
    on: AtomicBool,
}

impl<P: OutputPin + Send> Indicator<P> {
    /// Take ownership of `pin` and drive it low.
    pub fn new(pin: P) -> Self {
        let indicator = Self {
            pin: Mutex::new(pin),
            on: AtomicBool::new(false),
        };
        indicator.set(false);
        indicator
    }
}

impl<P: OutputPin + Send> IndicatorPort for Indicator<P> {
    fn set(&self, on: bool) {
        let mut pin = self.pin.lock().unwrap_or_else(PoisonError::into_inner);
        let result = if on { pin.set_high() } else { pin.set_low() };
        match result {
            Ok(()) => {
                if self.on.swap(on, Ordering::AcqRel) != on {
                    info!("Indicator: {}", if on { "ON" } else { "OFF" });
                }
            }
            Err(e) => warn!("Indicator: pin write failed: {e:?}"),
        }
    }

    fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }
}
