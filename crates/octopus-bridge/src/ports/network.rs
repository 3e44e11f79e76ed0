//! Network port: HTTP-like requests

use bytes::Bytes;
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use once_cell::sync::OnceCell;
use std::fmt;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, trace};

/// Network port failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    /// The request could not be built (bad URL, header or method)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The request was sent but the exchange failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

/// Outgoing request handed to a [`WebRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Request headers, in order
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Bytes,
}

impl HttpRequest {
    /// Create a request with no headers and an empty body
    pub fn new<S: Into<String>>(method: Method, url: S) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Create a GET request
    pub fn get<S: Into<String>>(url: S) -> Self {
        Self::new(Method::GET, url)
    }

    /// Append a header
    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    pub fn with_body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }
}

/// Response returned by a [`WebRequest`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, in order
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Body as UTF-8 text, replacing invalid sequences
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network capability consumed by the engine
///
/// Calls block the caller until the exchange completes; implementations may
/// use threads internally.
pub trait WebRequest: Send + Sync + fmt::Debug {
    /// Perform `request` and return the response
    fn request(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError>;
}

/// Default [`WebRequest`] built on the Hyper client
///
/// Plain HTTP only. Runs each exchange to completion on a private
/// current-thread Tokio runtime created on first use.
pub struct DefaultWebRequest {
    timeout: Duration,
    runtime: OnceCell<Runtime>,
}

impl DefaultWebRequest {
    /// Create a client with a 30 second timeout
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a client with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            runtime: OnceCell::new(),
        }
    }

    /// Get the configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn runtime(&self) -> Result<&Runtime, NetworkError> {
        self.runtime.get_or_try_init(|| {
            debug!("Starting network runtime");
            Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| NetworkError::Transport(format!("Failed to start runtime: {e}")))
        })
    }

    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        let uri: Uri = request
            .url
            .parse()
            .map_err(|e| NetworkError::InvalidRequest(format!("Invalid URL '{}': {e}", request.url)))?;

        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let req = builder
            .body(Full::new(request.body.clone()))
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;

        let client: Client<HttpConnector, Full<Bytes>> = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(HttpConnector::new());

        let exchange = async {
            let response = client
                .request(req)
                .await
                .map_err(|e| NetworkError::Transport(e.to_string()))?;
            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| NetworkError::Transport(e.to_string()))?
                .to_bytes();
            Ok::<_, NetworkError>((parts, body))
        };

        let (parts, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| NetworkError::Timeout(self.timeout))??;

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            headers: parts
                .headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            body,
        })
    }
}

impl Default for DefaultWebRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultWebRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultWebRequest")
            .field("timeout", &self.timeout)
            .field("runtime_started", &self.runtime.get().is_some())
            .finish()
    }
}

impl WebRequest for DefaultWebRequest {
    fn request(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        trace!(method = %request.method, url = %request.url, "Sending request");
        let runtime = self.runtime()?;

        // block_on panics inside another runtime's context; hop to a plain thread
        if Handle::try_current().is_ok() {
            std::thread::scope(|scope| {
                scope
                    .spawn(|| runtime.block_on(self.send(request)))
                    .join()
                    .map_err(|_| NetworkError::Transport("Request thread panicked".to_string()))?
            })
        } else {
            runtime.block_on(self.send(request))
        }
    }
}
