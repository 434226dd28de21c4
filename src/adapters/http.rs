//! HTTP request server.
//!
//! Route handling is split from the transport.  [`route`] maps a method,
//! URI and body onto the indicator and the stored string and returns a
//! [`Reply`]; it runs the same on the host as on the device.
//! [`HttpServer`] registers one ESP-IDF handler per route that reads the
//! request, calls [`route`] and writes the reply.
//!
//! | Route          | Method | Effect                                     |
//! |----------------|--------|--------------------------------------------|
//! | `/`            | GET    | HTML status page                           |
//! | `/pin`         | GET    | `?state=on` / `?state=off` drive indicator |
//! | `/value`       | GET    | stored string, or `(empty)`                |
//! | `/value`       | POST   | save body (`value=` prefix optional)       |
//! | `/value`       | POST   | `?delete=1` deletes                        |
//! | `/value`       | DELETE | delete                                     |

use core::fmt::Write as _;
use std::sync::Arc;

use log::{info, warn};

use crate::app::ports::{IndicatorPort, KeyValueStore, RequestServer, ServerError};

/// Largest accepted POST body.  Matches the stored-string slot minus its
/// terminator.
pub const MAX_VALUE_LEN: usize = 63;

const TEXT: &str = "text/plain";
const HTML: &str = "text/html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    fn text(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: TEXT,
            body: body.into(),
        }
    }

    fn error(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: TEXT,
            body: body.to_owned(),
        }
    }
}

/// Value of `key` in the query part of `uri`, `+` decoded as space.
pub fn query_param(uri: &str, key: &str) -> Option<String> {
    let query = uri.split_once('?')?.1;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let name = parts.next()?;
        let value = parts.next().unwrap_or_default();
        if name == key {
            return Some(value.replace('+', " "));
        }
    }
    None
}

fn path(uri: &str) -> &str {
    uri.split_once('?').map_or(uri, |(p, _)| p)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Dispatch one request.
pub fn route(
    method: HttpMethod,
    uri: &str,
    body: &[u8],
    indicator: &dyn IndicatorPort,
    store: &dyn KeyValueStore,
) -> Reply {
    match (method, path(uri)) {
        (HttpMethod::Get, "/") => status_page(indicator, store),
        (HttpMethod::Get, "/pin") => pin(uri, indicator),
        (HttpMethod::Get, "/value") => {
            let value = store.get();
            if value.is_empty() {
                Reply::text("(empty)\n")
            } else {
                Reply::text(value.as_str())
            }
        }
        (HttpMethod::Post, "/value") => save_value(uri, body, store),
        (HttpMethod::Delete, "/value") => delete_value(store),
        _ => Reply::error(404, "Not found\n"),
    }
}

fn status_page(indicator: &dyn IndicatorPort, store: &dyn KeyValueStore) -> Reply {
    let value = store.get();
    let shown = if value.is_empty() {
        "(empty)".to_owned()
    } else {
        escape_html(&value)
    };
    let mut page = String::with_capacity(768);
    let _ = write!(
        page,
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><title>Skynet Node</title></head>\n\
         <body>\n\
         <h1>Skynet Node</h1>\n\
         <p>Indicator is currently: {}</p>\n\
         <p>\n\
         \x20 <a href=\"/pin?state=on\">Turn indicator ON</a><br>\n\
         \x20 <a href=\"/pin?state=off\">Turn indicator OFF</a>\n\
         </p>\n\
         <p>Stored value: '{}'</p>\n\
         <p>\n\
         \x20 <form method=\"POST\" action=\"/value\">\n\
         \x20   New value: <input type=\"text\" name=\"value\">\n\
         \x20   <input type=\"submit\" value=\"Save\">\n\
         \x20 </form>\n\
         </p>\n\
         <p>\n\
         \x20 <form method=\"POST\" action=\"/value?delete=1\">\n\
         \x20   <input type=\"submit\" value=\"Delete value\">\n\
         \x20 </form>\n\
         </p>\n\
         </body>\n\
         </html>\n",
        if indicator.is_on() { "ON" } else { "OFF" },
        shown,
    );
    Reply {
        status: 200,
        content_type: HTML,
        body: page,
    }
}

fn pin(uri: &str, indicator: &dyn IndicatorPort) -> Reply {
    match query_param(uri, "state").as_deref() {
        Some("on") => {
            indicator.set(true);
            Reply::text("Indicator turned ON\n")
        }
        Some("off") => {
            indicator.set(false);
            Reply::text("Indicator turned OFF\n")
        }
        _ => Reply::text("Use /pin?state=on or /pin?state=off\n"),
    }
}

fn save_value(uri: &str, body: &[u8], store: &dyn KeyValueStore) -> Reply {
    if query_param(uri, "delete").as_deref() == Some("1") {
        return delete_value(store);
    }
    if body.len() > MAX_VALUE_LEN {
        return Reply::error(400, "String too long\n");
    }
    let Ok(text) = core::str::from_utf8(body) else {
        return Reply::error(400, "Body is not UTF-8\n");
    };
    let value = text.strip_prefix("value=").unwrap_or(text);
    match store.set(value) {
        Ok(()) => Reply::text("String saved\n"),
        Err(e) => {
            warn!("HTTP: save failed: {e}");
            Reply::error(500, "Save failed\n")
        }
    }
}

fn delete_value(store: &dyn KeyValueStore) -> Reply {
    match store.delete() {
        Ok(()) => Reply::text("String deleted\n"),
        Err(e) => {
            warn!("HTTP: delete failed: {e}");
            Reply::error(500, "Delete failed\n")
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Server
// ───────────────────────────────────────────────────────────────

pub struct HttpServer<I, K>
where
    I: IndicatorPort + 'static,
    K: KeyValueStore + 'static,
{
    indicator: Arc<I>,
    store: Arc<K>,
    #[cfg(target_os = "espidf")]
    server: Option<esp_idf_svc::http::server::EspHttpServer<'static>>,
    #[cfg(not(target_os = "espidf"))]
    running: bool,
}

impl<I, K> HttpServer<I, K>
where
    I: IndicatorPort + 'static,
    K: KeyValueStore + 'static,
{
    pub fn new(indicator: Arc<I>, store: Arc<K>) -> Self {
        Self {
            indicator,
            store,
            #[cfg(target_os = "espidf")]
            server: None,
            #[cfg(not(target_os = "espidf"))]
            running: false,
        }
    }

    /// Route a request against this server's collaborators.
    pub fn handle(&self, method: HttpMethod, uri: &str, body: &[u8]) -> Reply {
        route(method, uri, body, &*self.indicator, &*self.store)
    }
}

#[cfg(target_os = "espidf")]
mod esp {
    use super::{route, HttpMethod, MAX_VALUE_LEN};
    use crate::app::ports::{IndicatorPort, KeyValueStore};
    use embedded_svc::io::{Read, Write};
    use esp_idf_svc::http::server::{EspHttpConnection, Request};

    pub(super) fn serve(
        mut req: Request<&mut EspHttpConnection<'_>>,
        method: HttpMethod,
        indicator: &dyn IndicatorPort,
        store: &dyn KeyValueStore,
    ) -> anyhow::Result<()> {
        let uri = req.uri().to_string();
        // One byte past the limit is enough for `route` to reject it.
        let len = (req.content_len().unwrap_or(0) as usize).min(MAX_VALUE_LEN + 1);
        let mut body = [0u8; MAX_VALUE_LEN + 1];
        if len > 0 {
            req.read_exact(&mut body[..len])?;
        }
        let reply = route(method, &uri, &body[..len], indicator, store);
        req.into_response(reply.status, None, &[("Content-Type", reply.content_type)])?
            .write_all(reply.body.as_bytes())?;
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
impl<I, K> RequestServer for HttpServer<I, K>
where
    I: IndicatorPort + 'static,
    K: KeyValueStore + 'static,
{
    fn start(&mut self) -> Result<(), ServerError> {
        use embedded_svc::http::Method;
        use esp_idf_svc::http::server::{Configuration as HttpConfiguration, EspHttpServer};

        if self.server.is_some() {
            info!("HTTP: server already running");
            return Ok(());
        }

        let conf = HttpConfiguration::default();
        let mut server =
            EspHttpServer::new(&conf).map_err(|e| ServerError::StartFailed(e.code()))?;

        let routes = [
            ("/", Method::Get, HttpMethod::Get),
            ("/pin", Method::Get, HttpMethod::Get),
            ("/value", Method::Get, HttpMethod::Get),
            ("/value", Method::Post, HttpMethod::Post),
            ("/value", Method::Delete, HttpMethod::Delete),
        ];
        for (uri, method, kind) in routes {
            let indicator = Arc::clone(&self.indicator);
            let store = Arc::clone(&self.store);
            server
                .fn_handler::<anyhow::Error, _>(uri, method, move |req| {
                    esp::serve(req, kind, &*indicator, &*store)
                })
                .map_err(|e| ServerError::RegisterFailed(e.code()))?;
        }

        self.server = Some(server);
        info!("HTTP: server started");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.server.is_some()
    }
}

#[cfg(not(target_os = "espidf"))]
impl<I, K> RequestServer for HttpServer<I, K>
where
    I: IndicatorPort + 'static,
    K: KeyValueStore + 'static,
{
    fn start(&mut self) -> Result<(), ServerError> {
        if self.running {
            info!("HTTP(sim): server already running");
            return Ok(());
        }
        self.running = true;
        info!("HTTP(sim): server started");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
