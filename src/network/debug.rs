//! Diagnostic output for debug mode
//! Dumps outbound requests and inbound responses as HTTP/1.1 style text

use reqwest::header::HeaderMap;
use reqwest::{Request, Version};
use std::io::Write;
use std::sync::Mutex;

use super::response::Response;

/// Destination for request and response dumps.
///
/// Each dump is delivered as a single call. Closures taking `&str` can be
/// used directly as sinks.
pub trait DiagnosticSink: Send + Sync {
    fn write_dump(&self, dump: &str);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn write_dump(&self, dump: &str) {
        self(dump)
    }
}

/// Default sink: forwards dumps to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn write_dump(&self, dump: &str) {
        log::info!(target: "esrest::dump", "{}", dump);
    }
}

/// Sink writing each dump as a line to any `Write` implementation.
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> DiagnosticSink for WriterSink<W> {
    fn write_dump(&self, dump: &str) {
        let mut writer = match self.writer.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(writer, "{}", dump) {
            log::warn!("⚠️ Failed to write debug dump: {}", e);
        }
    }
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

fn write_headers(out: &mut String, headers: &HeaderMap) {
    for (name, value) in headers {
        out.push_str(&format!("{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes())));
    }
}

fn write_body(out: &mut String, body: &[u8]) {
    out.push_str("\r\n");
    out.push_str(&String::from_utf8_lossy(body));
}

/// Render an outbound request, body included.
pub fn dump_request(request: &Request) -> String {
    let url = request.url();
    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut out = String::new();
    out.push_str(&format!("{} {} HTTP/1.1\r\n", request.method(), target));
    if let Some(host) = url.host_str() {
        match url.port() {
            Some(port) => out.push_str(&format!("Host: {}:{}\r\n", host, port)),
            None => out.push_str(&format!("Host: {}\r\n", host)),
        }
    }
    write_headers(&mut out, request.headers());

    let body = request.body().and_then(|b| b.as_bytes()).unwrap_or_default();
    write_body(&mut out, body);
    out
}

/// Render a buffered response, body included.
pub fn dump_response(response: &Response) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} {}\r\n", version_str(response.version), response.status));
    write_headers(&mut out, &response.headers);
    write_body(&mut out, response.body());
    out
}
