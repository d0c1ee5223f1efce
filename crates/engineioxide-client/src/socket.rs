//! ## A [`Socket`] represents the connection to the engine.io server
//!
//! It is a cheap clonable handle to the socket task. It can be used to :
//! * Emit binary or string data
//! * Get the handshake sent by the server
//! * Get the current state and transport of the connection
//! * Close the connection
use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU8, Ordering},
};

use bytes::Bytes;
use engineioxide_core::{OpenPacket, Packet, PacketBuf, ProtocolVersion, Sid, Str, TransportType};
use smallvec::smallvec;
use tokio::sync::{Notify, mpsc, mpsc::error::TrySendError};

use crate::{
    config::SocketConfig,
    engine::Engine,
    errors::Error,
    handler::SocketHandler,
    transport::{Connectors, PollingSvc},
};

/// The state of a [`Socket`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Waiting for the handshake
    Opening = 0,
    /// The handshake is done, packets can be exchanged
    Open = 1,
    /// The socket is flushing its buffer and closing its transport
    Closing = 2,
    /// The socket is closed, it will never reopen
    Closed = 3,
}

impl From<u8> for SocketState {
    fn from(state: u8) -> Self {
        match state {
            0 => SocketState::Opening,
            1 => SocketState::Open,
            2 => SocketState::Closing,
            _ => SocketState::Closed,
        }
    }
}

/// A [`CloseReason`] represents the reason why a [`Socket`] was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// [`Socket::close`] was called
    ForcedClose,
    /// The server closed the connection
    TransportClose,
    /// An error occurred in the transport layer
    TransportError,
    /// The server did not respond to the heartbeat
    HeartbeatTimeout,
    /// The server did not send a valid handshake
    HandshakeError,
}

/// Convert an [`Error`] to a [`CloseReason`] if possible
/// This is used to notify the [`SocketHandler`] of the reason why a [`Socket`] was closed
/// If the error cannot be converted to a [`CloseReason`] it means that the error was not fatal and the [`Socket`] can be kept alive
impl From<&Error> for Option<CloseReason> {
    fn from(err: &Error) -> Self {
        use Error::*;
        match err {
            Http(_) | HttpClient(_) | HttpStatus(_) | WsTransport(_) | Transport(_)
            | UnsupportedTransport(_) => Some(CloseReason::TransportError),
            TransportClosed => Some(CloseReason::TransportClose),
            HeartbeatTimeout => Some(CloseReason::HeartbeatTimeout),
            Handshake(_) => Some(CloseReason::HandshakeError),
            PacketParse(_) | UpgradeTimeout | UpgradeFailed => None,
        }
    }
}

/// State shared between the [`Socket`] handles and the socket task
#[derive(Debug)]
pub(crate) struct Shared {
    state: AtomicU8,
    /// The transport type represented as a bitfield
    /// so it can be shared between threads without any mutex
    transport: AtomicU8,
    handshake: OnceLock<OpenPacket>,
    pub(crate) close: Notify,
    /// Notified once the socket is closed
    pub(crate) closed: Notify,
    protocol: ProtocolVersion,
}

impl Shared {
    pub(crate) fn set_state(&self, state: SocketState) {
        self.state.store(state as u8, Ordering::Release);
    }
    pub(crate) fn set_transport(&self, transport: TransportType) {
        self.transport.store(transport as u8, Ordering::Release);
    }
    pub(crate) fn set_handshake(&self, handshake: OpenPacket) {
        self.handshake.set(handshake).ok();
    }
}

/// A [`Socket`] is a handle to an engine.io connection.
/// It is agnostic to the [`TransportType`] and survives transport upgrades.
///
/// Cloning it is cheap, every clone refers to the same connection.
#[derive(Debug, Clone)]
pub struct Socket {
    /// Channel to send [`PacketBuf`] to the socket task
    ///
    /// The channel is made of a [`SmallVec`](smallvec::SmallVec) of [`Packet`]s so that adjacent packets are sent atomically.
    tx: mpsc::Sender<PacketBuf>,
    shared: Arc<Shared>,
}

impl Socket {
    /// Connect to an engine.io server with the default http client and websocket connector.
    ///
    /// The connection is driven by a spawned task, this function returns immediately
    /// with a socket in the [`Opening`](SocketState::Opening) state.
    ///
    /// # Panics
    /// If called outside of a tokio runtime.
    pub fn connect<H: SocketHandler>(config: SocketConfig, handler: Arc<H>) -> Socket {
        Self::connect_with(config, handler, Connectors::default())
    }

    /// Connect to an engine.io server with custom transport [`Connectors`].
    ///
    /// # Panics
    /// If called outside of a tokio runtime.
    pub fn connect_with<H: SocketHandler, S: PollingSvc>(
        config: SocketConfig,
        handler: Arc<H>,
        connectors: Connectors<S>,
    ) -> Socket {
        let (tx, rx) = mpsc::channel(config.max_buffer_size);
        let transport = config
            .transports
            .first()
            .copied()
            .unwrap_or(TransportType::Polling);
        let shared = Arc::new(Shared {
            state: AtomicU8::new(SocketState::Opening as u8),
            transport: AtomicU8::new(transport as u8),
            handshake: OnceLock::new(),
            close: Notify::new(),
            closed: Notify::new(),
            protocol: config.protocol,
        });
        let socket = Socket { tx, shared };
        let engine = Engine::new(config, handler, connectors, socket.clone(), rx);
        tokio::spawn(engine.run());
        socket
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// The session id sent by the server, once the handshake is done
    pub fn id(&self) -> Option<&Sid> {
        self.handshake().map(|h| &h.sid)
    }

    /// The handshake sent by the server, once it is received
    pub fn handshake(&self) -> Option<&OpenPacket> {
        self.shared.handshake.get()
    }

    /// The protocol version used by the socket
    pub fn protocol(&self) -> ProtocolVersion {
        self.shared.protocol
    }

    /// The current [`SocketState`]
    pub fn state(&self) -> SocketState {
        SocketState::from(self.shared.state.load(Ordering::Acquire))
    }

    /// Returns the current [`TransportType`] of the [`Socket`]
    pub fn transport_type(&self) -> TransportType {
        TransportType::from(self.shared.transport.load(Ordering::Acquire))
    }

    /// Sends packets to the socket task.
    fn send(&self, packet: Packet) -> Result<(), TrySendError<Packet>> {
        #[cfg(feature = "tracing")]
        tracing::trace!(sid = ?self.id(), ?packet, "sending packet");
        self.tx
            .try_send(smallvec![packet])
            .map_err(|e| match e {
                TrySendError::Full(mut p) => TrySendError::Full(p.swap_remove(0)),
                TrySendError::Closed(mut p) => TrySendError::Closed(p.swap_remove(0)),
            })
    }

    /// Emits a message to the server.
    ///
    /// Messages emitted before the handshake or during an upgrade are buffered
    /// and sent in order as soon as possible.
    ///
    /// ⚠️ If the buffer is full or the socket is closing, an error will be returned with the original data
    pub fn emit(&self, msg: impl Into<Str>) -> Result<(), TrySendError<Str>> {
        self.send(Packet::Message(msg.into())).map_err(|e| match e {
            TrySendError::Full(p) => TrySendError::Full(p.into_message()),
            TrySendError::Closed(p) => TrySendError::Closed(p.into_message()),
        })
    }

    /// Emits a binary message to the server.
    ///
    /// If the transport does not support binary, the data is sent **encoded in base64**.
    ///
    /// ⚠️ If the buffer is full or the socket is closing, an error will be returned with the original data
    pub fn emit_binary(&self, data: impl Into<Bytes>) -> Result<(), TrySendError<Bytes>> {
        self.send(Packet::Binary(data.into())).map_err(|e| match e {
            TrySendError::Full(p) => TrySendError::Full(p.into_binary()),
            TrySendError::Closed(p) => TrySendError::Closed(p.into_binary()),
        })
    }

    /// Gracefully closes the socket: buffered packets are flushed, then the transport is closed.
    ///
    /// Calling it more than once has no effect.
    pub fn close(&self) {
        self.shared.close.notify_one();
    }

    /// Returns true if the socket does not accept packets anymore (it is closing or closed)
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait for the socket to be fully closed
    pub async fn closed(&self) {
        let notified = self.shared.closed.notified();
        if self.state() != SocketState::Closed {
            notified.await;
        }
    }
}
