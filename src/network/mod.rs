pub mod debug;
pub mod error;
pub mod http_client;
pub mod request;
pub mod response;

pub use debug::{DiagnosticSink, LogSink, WriterSink};
pub use error::{ConfigError, Error};
pub use http_client::{ClientConfig, HttpClient, Transport, DEFAULT_TIMEOUT};
pub use request::{Body, Credentials, RequestBuilder, DEFAULT_CONTENT_TYPE};
pub use response::Response;
