use std::{fmt, str::FromStr};

/// The type of `transport` used to connect to the server.
///
/// It is represented as a bitfield so that a set of transports can be stored in a single `u8`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Polling transport
    Polling = 0x01,
    /// Websocket transport
    Websocket = 0x02,
    /// WebTransport transport
    WebTransport = 0x04,
}

impl TransportType {
    /// The name of the transport, as sent in the `transport` query parameter
    /// and in the `upgrades` list of the handshake.
    pub const fn as_str(self) -> &'static str {
        match self {
            TransportType::Polling => "polling",
            TransportType::Websocket => "websocket",
            TransportType::WebTransport => "webtransport",
        }
    }
}

impl From<u8> for TransportType {
    fn from(t: u8) -> Self {
        match t {
            0x01 => TransportType::Polling,
            0x02 => TransportType::Websocket,
            0x04 => TransportType::WebTransport,
            _ => panic!("unknown transport type"),
        }
    }
}

/// Cannot determine the transport type to connect to the server.
#[derive(Debug, Copy, Clone)]
pub struct UnknownTransportError;
impl fmt::Display for UnknownTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown transport type")
    }
}
impl std::error::Error for UnknownTransportError {}

impl FromStr for TransportType {
    type Err = UnknownTransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "websocket" => Ok(TransportType::Websocket),
            "polling" => Ok(TransportType::Polling),
            "webtransport" => Ok(TransportType::WebTransport),
            _ => Err(UnknownTransportError),
        }
    }
}
impl From<TransportType> for &'static str {
    fn from(t: TransportType) -> Self {
        t.as_str()
    }
}
impl From<TransportType> for String {
    fn from(t: TransportType) -> Self {
        t.as_str().into()
    }
}
impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The protocol version is not supported.
#[derive(Debug)]
pub struct UnknownProtocolVersionError;
impl fmt::Display for UnknownProtocolVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown protocol version")
    }
}
impl std::error::Error for UnknownProtocolVersionError {}

/// The engine.io protocol version
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// The protocol version 3
    V3 = 3,
    /// The protocol version 4
    #[default]
    V4 = 4,
}

impl ProtocolVersion {
    /// The value of the `EIO` query parameter
    pub const fn as_str(self) -> &'static str {
        match self {
            ProtocolVersion::V3 => "3",
            ProtocolVersion::V4 => "4",
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = UnknownProtocolVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3" => Ok(ProtocolVersion::V3),
            "4" => Ok(ProtocolVersion::V4),
            _ => Err(UnknownProtocolVersionError),
        }
    }
}
impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_names() {
        for t in [
            TransportType::Polling,
            TransportType::Websocket,
            TransportType::WebTransport,
        ] {
            assert_eq!(TransportType::from_str(t.as_str()).unwrap(), t);
            assert_eq!(TransportType::from(t as u8), t);
        }
        assert!(TransportType::from_str("flashsocket").is_err());
    }

    #[test]
    fn protocol_versions() {
        assert_eq!(ProtocolVersion::from_str("3").unwrap(), ProtocolVersion::V3);
        assert_eq!(ProtocolVersion::V4.to_string(), "4");
        assert!(ProtocolVersion::from_str("5").is_err());
    }
}
