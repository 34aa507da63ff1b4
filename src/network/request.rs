//! Fluent request builder and executor

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Request, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::debug::{dump_request, dump_response, DiagnosticSink, LogSink};
use super::error::{ConfigError, Error};
use super::http_client::{ClientConfig, HttpClient, Transport};
use super::response::Response;

/// Content-Type sent when the caller does not set one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// A request payload, normalized to bytes as soon as it is created.
///
/// Text and byte sequences are kept verbatim, structured values are
/// serialized as JSON. Use [`Body::json`] for any `Serialize` type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body(Vec<u8>);

impl Body {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        serde_json::to_vec(value).map(Body).map_err(Error::Body)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body(text.as_bytes().to_vec())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body(text.into_bytes())
    }
}

impl From<&String> for Body {
    fn from(text: &String) -> Self {
        Body(text.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body(bytes)
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Body(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Body {
    fn from(bytes: &[u8; N]) -> Self {
        Body(bytes.to_vec())
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::from(&value)
    }
}

impl From<&serde_json::Value> for Body {
    fn from(value: &serde_json::Value) -> Self {
        // A Value has string keys only, so rendering it cannot fail.
        Body(value.to_string().into_bytes())
    }
}

/// Username and password sent as HTTP Basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }

    fn header_value(&self) -> Result<HeaderValue, Error> {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        let mut value = HeaderValue::from_str(&format!("Basic {}", encoded))
            .map_err(|_| ConfigError::InvalidHeaderValue(AUTHORIZATION.to_string()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Builder pattern for creating and sending requests.
///
/// Every setter consumes the builder and returns it, so a request reads as a
/// single chain ending in [`execute`](Self::execute) or
/// [`execute_json`](Self::execute_json):
///
/// ```no_run
/// # async fn run() -> Result<(), esrest::Error> {
/// let response = esrest::new()
///     .post("http://httpbin.org/post")
///     .header("X-Trace", "1")
///     .body(r#"{"message":"ok"}"#)
///     .execute()
///     .await?;
/// assert!(response.is_success());
/// # Ok(())
/// # }
/// ```
///
/// Setters never fail. Invalid header names or values and bodies that cannot
/// be serialized are remembered and reported when the request is built.
pub struct RequestBuilder {
    url: String,
    method: Option<Method>,
    headers: HeaderMap,
    queries: BTreeMap<String, String>,
    body: Body,
    timeout: Option<Duration>,
    debug: bool,
    basic_auth: Option<Credentials>,
    logger: Arc<dyn DiagnosticSink>,
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    error: Option<Error>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Start from a client configuration. Unless [`timeout`](Self::timeout)
    /// is called, requests use the timeout from `config`.
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            url: String::new(),
            method: None,
            headers: HeaderMap::new(),
            queries: BTreeMap::new(),
            body: Body::default(),
            timeout: None,
            debug: false,
            basic_auth: None,
            logger: Arc::new(LogSink),
            config,
            transport: None,
            error: None,
        }
    }

    fn verb(mut self, method: Method, url: &str) -> Self {
        self.url = url.to_string();
        self.method = Some(method);
        self
    }

    pub fn get(self, url: &str) -> Self {
        self.verb(Method::GET, url)
    }

    pub fn post(self, url: &str) -> Self {
        self.verb(Method::POST, url)
    }

    pub fn put(self, url: &str) -> Self {
        self.verb(Method::PUT, url)
    }

    pub fn delete(self, url: &str) -> Self {
        self.verb(Method::DELETE, url)
    }

    pub fn head(self, url: &str) -> Self {
        self.verb(Method::HEAD, url)
    }

    /// Set a header, replacing any earlier value for the same name
    pub fn header(mut self, key: &str, value: &str) -> Self {
        let name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(_) => return self.fail(ConfigError::InvalidHeaderName(key.to_string()).into()),
        };
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
                self
            }
            Err(_) => self.fail(ConfigError::InvalidHeaderValue(key.to_string()).into()),
        }
    }

    /// Set a query parameter, replacing any earlier value for the same key
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.queries.insert(key.to_string(), value.to_string());
        self
    }

    /// Set the request body from text, bytes or a JSON value
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the request body to the JSON encoding of `value`
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match Body::json(value) {
            Ok(body) => {
                self.body = body;
                self
            }
            Err(e) => self.fail(e),
        }
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Replace the sink receiving debug dumps
    pub fn logger(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.logger = Arc::new(sink);
        self
    }

    /// Override the deadline for this request. `Duration::ZERO` disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn basic_auth(mut self, username: &str, password: &str) -> Self {
        self.basic_auth = Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        self
    }

    /// Send through `transport` instead of a client built from the config
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Send through `client`, whose config supplies the default timeout
    pub fn client(mut self, client: HttpClient) -> Self {
        self.config = client.config().clone();
        self.transport(Arc::new(client))
    }

    fn fail(mut self, error: Error) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn queries(&self) -> &BTreeMap<String, String> {
        &self.queries
    }

    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_bytes()
    }

    /// Deadline that applies to the request; zero means none
    pub fn timeout_duration(&self) -> Duration {
        self.timeout.unwrap_or(self.config.timeout)
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    fn validate(&self) -> Result<(), Error> {
        if self.url.is_empty() {
            return Err(ConfigError::EmptyUrl.into());
        }
        Ok(())
    }

    fn resolve_url(&self) -> Result<Url, Error> {
        let mut url = Url::parse(&self.url).map_err(|source| ConfigError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;

        if !self.queries.is_empty() {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| !self.queries.contains_key(k.as_ref()))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();

            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (k, v) in &kept {
                pairs.append_pair(k, v);
            }
            for (k, v) in &self.queries {
                pairs.append_pair(k, v);
            }
        }

        Ok(url)
    }

    /// Validate the configuration and materialize the request without
    /// sending it.
    pub fn build_request(mut self) -> Result<Request, Error> {
        self.validate()?;
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let url = self.resolve_url()?;
        let method = self.method.take().unwrap_or(Method::GET);
        let mut request = Request::new(method, url);

        if !self.body.is_empty() {
            *request.body_mut() = Some(self.body.0.into());
        }

        let headers = request.headers_mut();
        if !self.headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        }
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }

        if let Some(ref credentials) = self.basic_auth {
            if !credentials.is_empty() {
                headers.insert(AUTHORIZATION, credentials.header_value()?);
            }
        }

        // Without an override the client's own timeout applies.
        if let Some(timeout) = self.timeout.filter(|t| !t.is_zero()) {
            *request.timeout_mut() = Some(timeout);
        }
        Ok(request)
    }

    /// Send the request and buffer the whole response.
    pub async fn execute(self) -> Result<Response, Error> {
        let debug = self.debug;
        let logger = Arc::clone(&self.logger);
        let injected = self.transport.clone();
        let mut config = self.config.clone();
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }

        let request = self.build_request()?;

        let transport: Arc<dyn Transport> = match injected {
            Some(transport) => transport,
            None => Arc::new(HttpClient::with_config(config)?),
        };

        if debug {
            logger.write_dump(&dump_request(&request));
        }

        let response = transport.send(request).await?;

        if debug {
            logger.write_dump(&dump_response(&response));
        }

        Ok(response)
    }

    /// Send the request and decode the response body as JSON.
    ///
    /// The response is returned alongside the decoded value and its body
    /// stays readable. Callers wanting a best-effort decode can use
    /// [`execute`](Self::execute) followed by [`Response::json`].
    pub async fn execute_json<T: DeserializeOwned>(self) -> Result<(Response, T), Error> {
        let response = self.execute().await?;
        let value = response.json()?;
        Ok((response, value))
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("queries", &self.queries)
            .field("body_len", &self.body.as_bytes().len())
            .field("timeout", &self.timeout)
            .field("debug", &self.debug)
            .field("basic_auth", &self.basic_auth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn body_of(request: &Request) -> &[u8] {
        request.body().and_then(|b| b.as_bytes()).unwrap_or_default()
    }

    #[test]
    fn fresh_builder_has_defaults() {
        let builder = RequestBuilder::new();
        assert!(builder.url().is_empty());
        assert!(builder.method().is_none());
        assert!(builder.headers().is_empty());
        assert!(builder.queries().is_empty());
        assert!(builder.body_bytes().is_empty());
        assert_eq!(builder.timeout_duration(), Duration::from_secs(20));
        assert!(!builder.is_debug());
    }

    #[test]
    fn verbs_set_url_and_method() {
        let cases = [
            (RequestBuilder::new().get("http://a/"), Method::GET),
            (RequestBuilder::new().post("http://a/"), Method::POST),
            (RequestBuilder::new().put("http://a/"), Method::PUT),
            (RequestBuilder::new().delete("http://a/"), Method::DELETE),
            (RequestBuilder::new().head("http://a/"), Method::HEAD),
        ];
        for (builder, method) in cases {
            assert_eq!(builder.url(), "http://a/");
            assert_eq!(builder.method(), Some(&method));
        }

        let twice = RequestBuilder::new().put("http://a/").put("http://a/");
        assert_eq!(twice.method(), Some(&Method::PUT));
        assert_eq!(twice.url(), "http://a/");
    }

    #[test]
    fn text_body_is_kept_verbatim() {
        let request = RequestBuilder::new()
            .post("http://localhost/")
            .body("raw-text")
            .build_request()
            .unwrap();
        assert_eq!(body_of(&request), "raw-text".as_bytes());
    }

    #[test]
    fn structured_body_is_json_encoded() {
        #[derive(Serialize)]
        struct Message {
            message: &'static str,
        }

        let from_struct = RequestBuilder::new()
            .post("http://localhost/")
            .json(&Message { message: "ok" })
            .build_request()
            .unwrap();
        assert_eq!(body_of(&from_struct), br#"{"message":"ok"}"#);

        let mut map = HashMap::new();
        map.insert("message", "ok");
        let from_map = RequestBuilder::new()
            .post("http://localhost/")
            .json(&map)
            .build_request()
            .unwrap();
        assert_eq!(body_of(&from_map), br#"{"message":"ok"}"#);

        let from_value = RequestBuilder::new()
            .post("http://localhost/")
            .body(json!({"message": "ok"}))
            .build_request()
            .unwrap();
        assert_eq!(body_of(&from_value), br#"{"message":"ok"}"#);
    }

    #[test]
    fn byte_body_is_unmodified() {
        let bytes = vec![0u8, 159, 146, 150, 255];
        let request = RequestBuilder::new()
            .post("http://localhost/")
            .body(bytes.clone())
            .build_request()
            .unwrap();
        assert_eq!(body_of(&request), bytes.as_slice());
    }

    #[test]
    fn empty_body_sends_nothing() {
        let request = RequestBuilder::new()
            .get("http://localhost/")
            .build_request()
            .unwrap();
        assert!(request.body().is_none());
    }

    #[test]
    fn unserializable_body_is_reported() {
        let mut map = HashMap::new();
        map.insert(vec![1u8], "value");
        let result = RequestBuilder::new()
            .post("http://localhost/")
            .json(&map)
            .build_request();
        assert!(matches!(result, Err(Error::Body(_))));
    }

    #[test]
    fn content_type_defaults_to_json() {
        let request = RequestBuilder::new()
            .get("http://localhost/")
            .build_request()
            .unwrap();
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn caller_content_type_wins() {
        let request = RequestBuilder::new()
            .post("http://localhost/")
            .header("content-type", "text/plain")
            .build_request()
            .unwrap();
        let values: Vec<_> = request.headers().get_all(CONTENT_TYPE).iter().collect();
        assert_eq!(values, vec!["text/plain"]);
    }

    #[test]
    fn last_header_write_wins() {
        let request = RequestBuilder::new()
            .get("http://localhost/")
            .header("X-Test", "one")
            .header("x-test", "two")
            .build_request()
            .unwrap();
        assert_eq!(request.headers()["x-test"], "two");
        assert_eq!(request.headers().get_all("x-test").iter().count(), 1);
    }

    #[test]
    fn invalid_header_is_reported_at_build() {
        let result = RequestBuilder::new()
            .get("http://localhost/")
            .header("bad header", "v")
            .header("X-Ok", "fine")
            .build_request();
        match result {
            Err(Error::Config(ConfigError::InvalidHeaderName(name))) => assert_eq!(name, "bad header"),
            other => panic!("unexpected: {:?}", other),
        }

        let result = RequestBuilder::new()
            .get("http://localhost/")
            .header("X-Bad", "line\nbreak")
            .build_request();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidHeaderValue(_)))
        ));
    }

    #[test]
    fn empty_url_fails_validation() {
        let err = RequestBuilder::new().build_request().unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::EmptyUrl)));
        assert_eq!(err.to_string(), "url is empty");
    }

    #[test]
    fn unparsable_url_fails_validation() {
        let err = RequestBuilder::new().get("dummy").build_request().unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn queries_are_encoded() {
        let request = RequestBuilder::new()
            .get("http://localhost/search")
            .query("q", "a b&c")
            .query("page", "2")
            .build_request()
            .unwrap();
        assert_eq!(request.url().query(), Some("page=2&q=a+b%26c"));
    }

    #[test]
    fn existing_query_pairs_are_kept_unless_overridden() {
        let request = RequestBuilder::new()
            .get("http://localhost/search?keep=1&page=1")
            .query("page", "2")
            .build_request()
            .unwrap();
        let pairs: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("keep".to_string(), "1".to_string()),
                ("page".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn url_without_queries_is_untouched() {
        let request = RequestBuilder::new()
            .get("http://localhost/path?raw=%7E")
            .build_request()
            .unwrap();
        assert_eq!(request.url().as_str(), "http://localhost/path?raw=%7E");
    }

    #[test]
    fn basic_auth_header_round_trips() {
        let request = RequestBuilder::new()
            .get("http://localhost/")
            .basic_auth("user", "p@ss:word")
            .build_request()
            .unwrap();
        let value = request.headers()[AUTHORIZATION].to_str().unwrap();
        let encoded = value.strip_prefix("Basic ").unwrap();
        let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded, "user:p@ss:word");
        assert!(request.headers()[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn empty_credentials_are_skipped() {
        let request = RequestBuilder::new()
            .get("http://localhost/")
            .basic_auth("", "")
            .build_request()
            .unwrap();
        assert!(!request.headers().contains_key(AUTHORIZATION));
    }

    #[test]
    fn timeout_is_applied_to_request() {
        let request = RequestBuilder::new()
            .get("http://localhost/")
            .timeout(Duration::from_millis(1500))
            .build_request()
            .unwrap();
        assert_eq!(request.timeout(), Some(&Duration::from_millis(1500)));
    }

    #[test]
    fn zero_timeout_leaves_request_without_deadline() {
        let request = RequestBuilder::new()
            .get("http://localhost/")
            .timeout(Duration::ZERO)
            .build_request()
            .unwrap();
        assert_eq!(request.timeout(), None);
    }

    #[test]
    fn unset_timeout_defers_to_client() {
        let builder = RequestBuilder::new().get("http://localhost/");
        assert_eq!(builder.timeout_duration(), Duration::from_secs(20));
        let request = builder.build_request().unwrap();
        assert_eq!(request.timeout(), None);
    }

    #[test]
    fn injected_client_supplies_timeout() {
        let client = HttpClient::with_config(ClientConfig {
            timeout: Duration::from_secs(3),
            ..ClientConfig::default()
        })
        .unwrap();
        let builder = RequestBuilder::new().client(client);
        assert_eq!(builder.timeout_duration(), Duration::from_secs(3));

        let overridden = builder.timeout(Duration::from_secs(9));
        assert_eq!(overridden.timeout_duration(), Duration::from_secs(9));
    }

    #[test]
    fn config_timeout_becomes_default() {
        let config = ClientConfig {
            timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        };
        let builder = RequestBuilder::with_config(config);
        assert_eq!(builder.timeout_duration(), Duration::from_secs(5));
    }
}
