//! ## Configuration for the engine.io client
//!
//! #### Example :
//! ```rust
//! # use engineioxide_client::config::SocketConfig;
//! # use engineioxide_client::{ProtocolVersion, TransportType};
//! # use std::time::Duration;
//! let config = SocketConfig::builder()
//!     .hostname("example.com")
//!     .secure(true)
//!     .protocol(ProtocolVersion::V3)
//!     .transports([TransportType::Polling, TransportType::Websocket])
//!     .upgrade_timeout(Duration::from_secs(5))
//!     .build();
//! assert_eq!(config.port, None);
//! ```
use std::{fmt, sync::Arc, time::Duration};

use engineioxide_core::{ProtocolVersion, TransportType};

/// The path of the engine.io endpoint, either fixed or computed for each request.
#[derive(Clone)]
pub enum RequestPath {
    /// A fixed path
    Static(String),
    /// A path computed each time an url is built
    Dynamic(Arc<dyn Fn() -> String + Send + Sync>),
}

impl RequestPath {
    /// Get the path to use for the next request
    pub fn get(&self) -> String {
        match self {
            RequestPath::Static(path) => path.clone(),
            RequestPath::Dynamic(f) => f(),
        }
    }
}

impl fmt::Debug for RequestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestPath::Static(path) => f.debug_tuple("Static").field(path).finish(),
            RequestPath::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl Default for RequestPath {
    fn default() -> Self {
        RequestPath::Static("/engine.io/".to_string())
    }
}

/// Normalize a path to always end with a single slash
impl From<&str> for RequestPath {
    fn from(path: &str) -> Self {
        RequestPath::Static(format!("{}/", path.trim_end_matches('/')))
    }
}
impl From<String> for RequestPath {
    fn from(path: String) -> Self {
        RequestPath::from(path.as_str())
    }
}

/// The configuration of a [`Socket`](crate::Socket)
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// The hostname of the server. IPv6 addresses are bracketed automatically.
    /// Defaults to "localhost".
    pub hostname: String,

    /// The port of the server, omitted from the urls if it is the default port of the scheme.
    /// Defaults to `None`.
    pub port: Option<u16>,

    /// Use `https` / `wss` urls.
    /// Defaults to false.
    pub secure: bool,

    /// The path of the engine.io endpoint.
    /// Defaults to "/engine.io/".
    pub path: RequestPath,

    /// Extra query parameters sent with every request, before the engine.io ones.
    pub query: Vec<(String, String)>,

    /// The engine.io protocol version to use.
    /// Defaults to [`ProtocolVersion::V4`].
    pub protocol: ProtocolVersion,

    /// The transports to use, in order of priority.
    /// The first one opens the connection, the next ones are candidates for the upgrade.
    ///
    /// Defaults to `[TransportType::Polling, TransportType::Websocket]`
    pub transports: Vec<TransportType>,

    /// Try to upgrade the connection to a better transport offered by the server.
    /// Defaults to true.
    pub upgrade: bool,

    /// Encode binary packets in base64 even if the transport supports binary.
    /// Defaults to false.
    pub force_base64: bool,

    /// Add a cache-busting timestamp parameter to every request.
    /// Defaults to true.
    pub timestamp_requests: bool,

    /// The name of the cache-busting timestamp parameter.
    /// Defaults to "t".
    pub timestamp_param: String,

    /// The time given to a probe transport to complete the upgrade.
    /// Defaults to 10 seconds.
    pub upgrade_timeout: Duration,

    /// The time given to the transport to close gracefully before it is dropped.
    /// Defaults to 5 seconds.
    pub close_timeout: Duration,

    /// The maximum number of packets that can be buffered before being sent to the server.
    ///
    /// If the buffer if full the `emit()` method will return an error
    ///
    /// Defaults to 128 packets
    pub max_buffer_size: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: None,
            secure: false,
            path: RequestPath::default(),
            query: Vec::new(),
            protocol: ProtocolVersion::V4,
            transports: vec![TransportType::Polling, TransportType::Websocket],
            upgrade: true,
            force_base64: false,
            timestamp_requests: true,
            timestamp_param: "t".to_string(),
            upgrade_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
            max_buffer_size: 128,
        }
    }
}

impl SocketConfig {
    /// Create a new [`SocketConfigBuilder`]
    pub fn builder() -> SocketConfigBuilder {
        SocketConfigBuilder::new()
    }

    /// Check if a [`TransportType`] is enabled in the [`SocketConfig`]
    #[inline(always)]
    pub fn allowed_transport(&self, transport: TransportType) -> bool {
        self.transports.contains(&transport)
    }
}

/// An invalid url was given to [`SocketConfigBuilder::from_url`]
#[derive(Debug, thiserror::Error)]
pub enum UrlError {
    /// The url could not be parsed
    #[error("invalid url: {0}")]
    Parse(#[from] url::ParseError),
    /// The scheme is not one of http, https, ws, wss
    #[error("unsupported url scheme: {0}")]
    Scheme(String),
    /// The url has no host
    #[error("missing host in url")]
    MissingHost,
}

/// A builder for [`SocketConfig`]
pub struct SocketConfigBuilder {
    config: SocketConfig,
}

impl SocketConfigBuilder {
    /// Create a new builder with a default config
    pub fn new() -> Self {
        Self {
            config: SocketConfig::default(),
        }
    }

    /// Create a builder from an url such as `https://example.com:8443/?token=abc`.
    ///
    /// The scheme sets [`secure`](SocketConfig::secure), the host, port and query pairs
    /// are taken from the url. The url path is ignored, use [`path`](Self::path).
    pub fn from_url(url: &str) -> Result<Self, UrlError> {
        let url = url::Url::parse(url)?;
        let secure = match url.scheme() {
            "http" | "ws" => false,
            "https" | "wss" => true,
            scheme => return Err(UrlError::Scheme(scheme.to_string())),
        };
        let hostname = match url.host().ok_or(UrlError::MissingHost)? {
            url::Host::Domain(domain) => domain.to_string(),
            url::Host::Ipv4(ip) => ip.to_string(),
            url::Host::Ipv6(ip) => ip.to_string(),
        };
        let mut builder = Self::new().secure(secure).hostname(hostname);
        builder.config.port = url.port();
        builder.config.query = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok(builder)
    }

    /// The hostname of the server.
    /// Defaults to "localhost".
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = hostname.into();
        self
    }

    /// The port of the server.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    /// Use `https` / `wss` urls.
    pub fn secure(mut self, secure: bool) -> Self {
        self.config.secure = secure;
        self
    }

    /// The path of the engine.io endpoint. A trailing slash is always added.
    /// Defaults to "/engine.io/".
    pub fn path(mut self, path: impl Into<RequestPath>) -> Self {
        self.config.path = path.into();
        self
    }

    /// A path computed every time a request url is built.
    pub fn dynamic_path(mut self, f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.config.path = RequestPath::Dynamic(Arc::new(f));
        self
    }

    /// Add a query parameter sent with every request.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.query.push((key.into(), value.into()));
        self
    }

    /// The engine.io protocol version to use.
    /// Defaults to [`ProtocolVersion::V4`].
    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// The transports to use, in order of priority.
    ///
    /// Defaults to :
    /// `[TransportType::Polling, TransportType::Websocket]`
    pub fn transports<const N: usize>(mut self, transports: [TransportType; N]) -> Self {
        assert!(N > 0, "at least one transport is required");
        self.config.transports = transports.to_vec();
        self
    }

    /// Try to upgrade the connection to a better transport.
    /// Defaults to true.
    pub fn upgrade(mut self, upgrade: bool) -> Self {
        self.config.upgrade = upgrade;
        self
    }

    /// Always encode binary packets in base64.
    /// Defaults to false.
    pub fn force_base64(mut self, force_base64: bool) -> Self {
        self.config.force_base64 = force_base64;
        self
    }

    /// Add a cache-busting timestamp parameter to every request.
    /// Defaults to true.
    pub fn timestamp_requests(mut self, timestamp_requests: bool) -> Self {
        self.config.timestamp_requests = timestamp_requests;
        self
    }

    /// The name of the cache-busting timestamp parameter.
    /// Defaults to "t".
    pub fn timestamp_param(mut self, timestamp_param: impl Into<String>) -> Self {
        self.config.timestamp_param = timestamp_param.into();
        self
    }

    /// The time given to a probe transport to complete the upgrade.
    /// Defaults to 10 seconds.
    pub fn upgrade_timeout(mut self, upgrade_timeout: Duration) -> Self {
        self.config.upgrade_timeout = upgrade_timeout;
        self
    }

    /// The time given to the transport to close gracefully.
    /// Defaults to 5 seconds.
    pub fn close_timeout(mut self, close_timeout: Duration) -> Self {
        self.config.close_timeout = close_timeout;
        self
    }

    /// The maximum number of packets that can be buffered before being sent to the server.
    ///
    /// If the buffer if full the `emit()` method will return an error
    pub fn max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.config.max_buffer_size = max_buffer_size;
        self
    }

    /// Build the config
    pub fn build(self) -> SocketConfig {
        self.config
    }
}
impl Default for SocketConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
