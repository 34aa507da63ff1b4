//! Fluent HTTP requests with JSON bodies and responses.
//!
//! ```no_run
//! # async fn run() -> Result<(), esrest::Error> {
//! #[derive(serde::Deserialize)]
//! struct Echo {
//!     args: std::collections::HashMap<String, String>,
//! }
//!
//! let (response, echo): (_, Echo) = esrest::new()
//!     .get("http://httpbin.org/get")
//!     .query("param1", "value")
//!     .execute_json()
//!     .await?;
//! assert_eq!(response.status, 200);
//! assert_eq!(echo.args["param1"], "value");
//! # Ok(())
//! # }
//! ```

pub mod network;

pub use network::{
    Body, ClientConfig, ConfigError, Credentials, DiagnosticSink, Error, HttpClient, LogSink,
    RequestBuilder, Response, Transport, WriterSink, DEFAULT_CONTENT_TYPE, DEFAULT_TIMEOUT,
};

/// Start a new request with default settings
pub fn new() -> RequestBuilder {
    RequestBuilder::new()
}
