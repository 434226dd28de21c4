//! Fuzz target: HTTP route dispatch
//!
//! Splits the input into (method selector, URI, body) and dispatches it
//! against in-memory collaborators.
//!
//! Invariants checked:
//! - No panics under any URI or body
//! - Bodies longer than `MAX_VALUE_LEN` are never stored
//! - The stored value never exceeds the slot capacity
//!
//! cargo fuzz run fuzz_http_route

#![no_main]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use libfuzzer_sys::fuzz_target;
use skynet_node::adapters::http::{HttpMethod, MAX_VALUE_LEN, route};
use skynet_node::app::ports::{IndicatorPort, KeyValueStore, StorageError};

#[derive(Default)]
struct Led(AtomicBool);

impl IndicatorPort for Led {
    fn set(&self, on: bool) {
        self.0.store(on, Ordering::Relaxed);
    }
    fn is_on(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct Slot(Mutex<heapless::String<64>>);

impl KeyValueStore for Slot {
    fn get(&self) -> heapless::String<64> {
        self.0.lock().unwrap().clone()
    }
    fn set(&self, value: &str) -> Result<(), StorageError> {
        *self.0.lock().unwrap() =
            heapless::String::try_from(value).map_err(|_| StorageError::TooLong)?;
        Ok(())
    }
    fn delete(&self) -> Result<(), StorageError> {
        self.0.lock().unwrap().clear();
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let method = match selector % 3 {
        0 => HttpMethod::Get,
        1 => HttpMethod::Post,
        _ => HttpMethod::Delete,
    };
    let split = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    let Ok(uri) = core::str::from_utf8(&rest[..split]) else {
        return;
    };
    let body = rest.get(split + 1..).unwrap_or_default();

    let led = Led::default();
    let slot = Slot::default();
    let reply = route(method, uri, body, &led, &slot);

    if body.len() > MAX_VALUE_LEN {
        assert!(slot.get().is_empty());
    }
    assert!(matches!(reply.status, 200 | 400 | 404 | 500));
});
