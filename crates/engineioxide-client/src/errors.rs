use engineioxide_core::TransportType;
use tokio_tungstenite::tungstenite;

pub use engineioxide_core::PacketParseError;

/// A boxed error returned by a custom http client or transport connector.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The errors that can occur on a [`Socket`](crate::Socket) or one of its transports.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("error decoding packet: {0}")]
    PacketParse(#[from] PacketParseError),
    #[error("http error: {0}")]
    Http(#[from] http::Error),
    #[error("http client error: {0}")]
    HttpClient(BoxError),
    #[error("unexpected http status: {0}")]
    HttpStatus(http::StatusCode),
    #[error("ws transport error: {0}")]
    WsTransport(#[from] Box<tungstenite::Error>),
    #[error("transport error: {0}")]
    Transport(BoxError),
    #[error("no connector available for the {0} transport")]
    UnsupportedTransport(TransportType),
    #[error("transport closed")]
    TransportClosed,

    #[error("heartbeat timeout")]
    HeartbeatTimeout,
    #[error("upgrade timeout")]
    UpgradeTimeout,
    #[error("probe error: unexpected response to the upgrade probe")]
    UpgradeFailed,
    #[error("handshake error: {0}")]
    Handshake(String),
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        Error::WsTransport(Box::new(err))
    }
}

/// The category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The underlying channel failed (http request, websocket, ...)
    Transport,
    /// A packet or a payload could not be decoded, or the server broke the protocol
    Protocol,
    /// The heartbeat or the upgrade probe timed out
    Timeout,
    /// The initial open packet is missing or invalid
    Handshake,
}

impl Error {
    /// Get the [`ErrorKind`] of this error
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            Http(_) | HttpClient(_) | HttpStatus(_) | WsTransport(_) | Transport(_)
            | UnsupportedTransport(_) | TransportClosed => ErrorKind::Transport,
            PacketParse(_) | UpgradeFailed => ErrorKind::Protocol,
            HeartbeatTimeout | UpgradeTimeout => ErrorKind::Timeout,
            Handshake(_) => ErrorKind::Handshake,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CloseReason;

    #[test]
    fn error_kinds() {
        assert_eq!(Error::HeartbeatTimeout.kind(), ErrorKind::Timeout);
        assert_eq!(Error::UpgradeTimeout.kind(), ErrorKind::Timeout);
        assert_eq!(
            Error::HttpStatus(http::StatusCode::BAD_REQUEST).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            Error::PacketParse(PacketParseError::InvalidPacketLen).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(Error::Handshake("".into()).kind(), ErrorKind::Handshake);
    }

    #[test]
    fn error_fatality() {
        let reason: Option<CloseReason> = (&Error::HeartbeatTimeout).into();
        assert_eq!(reason, Some(CloseReason::HeartbeatTimeout));
        let reason: Option<CloseReason> = (&Error::TransportClosed).into();
        assert_eq!(reason, Some(CloseReason::TransportClose));
        let reason: Option<CloseReason> =
            (&Error::PacketParse(PacketParseError::InvalidPacketLen)).into();
        assert_eq!(reason, None);
        let reason: Option<CloseReason> = (&Error::UpgradeTimeout).into();
        assert_eq!(reason, None);
    }
}
