use std::sync::Arc;

use engineioxide_core::{Sid, TransportType};
use url::form_urlencoded;

use crate::{config::SocketConfig, yeast::Yeast};

/// Builds the request urls of the transports of a socket
#[derive(Debug, Clone)]
pub(crate) struct UriBuilder {
    config: Arc<SocketConfig>,
    yeast: Arc<Yeast>,
}

impl UriBuilder {
    pub fn new(config: Arc<SocketConfig>) -> Self {
        Self {
            config,
            yeast: Arc::new(Yeast::default()),
        }
    }

    /// `<scheme>://<host>[:<port>]<path>?<query>&EIO=<v>&transport=<name>[&sid=<sid>][&t=<id>][&b64=1]`
    pub fn build(&self, transport: TransportType, sid: Option<&Sid>, supports_binary: bool) -> String {
        let config = &self.config;
        let scheme = match (transport, config.secure) {
            (TransportType::Polling, false) => "http",
            (TransportType::Polling, true) => "https",
            (_, false) => "ws",
            (_, true) => "wss",
        };

        let mut query = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &config.query {
            query.append_pair(key, value);
        }
        query.append_pair("EIO", config.protocol.as_str());
        query.append_pair("transport", transport.as_str());
        if let Some(sid) = sid {
            query.append_pair("sid", sid.as_str());
        }
        if transport == TransportType::Polling && config.timestamp_requests {
            query.append_pair(&config.timestamp_param, &self.yeast.next());
        }
        if !supports_binary && sid.is_none() {
            query.append_pair("b64", "1");
        }

        let host = if config.hostname.contains(':') {
            format!("[{}]", config.hostname)
        } else {
            config.hostname.clone()
        };
        let default_port = if config.secure { 443 } else { 80 };
        let port = match config.port {
            Some(port) if port != default_port => format!(":{port}"),
            _ => String::new(),
        };

        format!(
            "{scheme}://{host}{port}{path}?{query}",
            path = config.path.get(),
            query = query.finish()
        )
    }
}
