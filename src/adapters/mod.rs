//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter  | Implements         | Connects to                 |
//! |----------|--------------------|-----------------------------|
//! | `nimble` | GapPort            | NimBLE host GAP procedures  |
//! | `wifi`   | StationPort        | ESP-IDF WiFi STA + events   |
//! | `nvs`    | ConfigPort         | NVS / in-memory store       |
//! |          | KeyValueStore      |                             |
//! | `http`   | RequestServer      | ESP-IDF HTTP server         |

pub mod http;
pub mod nimble;
pub mod nvs;
pub(crate) mod utils;
pub mod wifi;
