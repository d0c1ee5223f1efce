//! ## Transports carry packets between the socket task and the server
//!
//! Each transport runs in its own task. The socket task drives it with [`TransportCmd`]s
//! and receives its [`TransportEvent`]s through a channel shared by all the transports of the socket,
//! so that events keep their order across an upgrade.
//!
//! There is two kinds of transports:
//! * [`polling`]: http long-polling, the connection is opened with it.
//! * [`duplex`]: socket-style transports (websocket, webtransport) plugged through a [`Connector`].

use std::{fmt, future::Future, sync::Arc};

use engineioxide_core::{Codec, Packet, Sid, TransportType};
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::errors::Error;

pub mod duplex;
pub mod polling;
pub mod ws;

mod uri;

pub use duplex::{Channel, Connector};
pub use polling::{HyperClient, PollingSvc};
pub(crate) use uri::UriBuilder;
pub use ws::WsConnector;

/// Identifies a transport instance within a socket
pub(crate) type TransportId = u64;

/// The state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// The transport is connecting
    Opening,
    /// The transport can send and receive packets
    Open,
    /// A close was requested and is deferred until the transport is open
    Closing,
    /// The transport is closed and its task is terminated
    Closed,
    /// Waiting for in-flight requests before being paused
    Pausing,
    /// The transport neither sends nor receives packets until it is resumed
    Paused,
}

/// Commands sent by the socket task to a transport
#[derive(Debug)]
pub(crate) enum TransportCmd {
    /// Send packets. Never sent while a previous write is not drained.
    Write(Vec<Packet>),
    Pause,
    Resume,
    Close,
}

/// Events sent by a transport to the socket task
#[derive(Debug)]
pub(crate) enum TransportEvent {
    Open,
    Packet(Packet),
    /// The last write is complete, the transport is writable again
    Drain,
    Paused,
    OutOfBand(String),
    Error(Error),
    Close,
}

#[derive(Debug)]
pub(crate) struct TransportMsg {
    pub id: TransportId,
    pub event: TransportEvent,
}

/// State and helpers shared by every transport variant
pub(crate) struct TransportBase {
    pub id: TransportId,
    pub kind: TransportType,
    pub state: TransportState,
    pub codec: &'static dyn Codec,
    /// The session id, known from the start for probes
    /// or set from the handshake for the first transport
    pub sid: Option<Sid>,
    uri: UriBuilder,
    events: mpsc::UnboundedSender<TransportMsg>,
}

impl TransportBase {
    pub fn new(
        id: TransportId,
        kind: TransportType,
        codec: &'static dyn Codec,
        sid: Option<Sid>,
        uri: UriBuilder,
        events: mpsc::UnboundedSender<TransportMsg>,
    ) -> Self {
        Self {
            id,
            kind,
            state: TransportState::Opening,
            codec,
            sid,
            uri,
            events,
        }
    }

    /// The url of the next request
    pub fn url(&self, supports_binary: bool) -> String {
        self.uri.build(self.kind, self.sid.as_ref(), supports_binary)
    }

    fn emit(&self, event: TransportEvent) {
        // The socket task may be gone, the transport will then be dropped with its command channel
        self.events.send(TransportMsg { id: self.id, event }).ok();
    }

    pub fn on_open(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(id = self.id, transport = ?self.kind, "transport open");
        self.state = TransportState::Open;
        self.emit(TransportEvent::Open);
    }

    pub fn on_packet(&self, packet: Packet) {
        #[cfg(feature = "tracing")]
        tracing::trace!(id = self.id, ?packet, "received packet");
        self.emit(TransportEvent::Packet(packet));
    }

    pub fn on_drain(&self) {
        self.emit(TransportEvent::Drain);
    }

    pub fn on_paused(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(id = self.id, transport = ?self.kind, "transport paused");
        self.state = TransportState::Paused;
        self.emit(TransportEvent::Paused);
    }

    pub fn on_out_of_band(&self, data: String) {
        self.emit(TransportEvent::OutOfBand(data));
    }

    pub fn on_error(&self, err: Error) {
        #[cfg(feature = "tracing")]
        tracing::debug!(id = self.id, transport = ?self.kind, "transport error: {err}");
        self.emit(TransportEvent::Error(err));
    }

    /// Error from which the transport cannot recover
    pub fn on_fatal(&mut self, err: Error) {
        self.on_error(err);
        self.on_close();
    }

    pub fn on_close(&mut self) {
        if self.state != TransportState::Closed {
            #[cfg(feature = "tracing")]
            tracing::debug!(id = self.id, transport = ?self.kind, "transport closed");
            self.state = TransportState::Closed;
            self.emit(TransportEvent::Close);
        }
    }
}

impl fmt::Debug for TransportBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportBase")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("sid", &self.sid)
            .finish()
    }
}

/// A transport variant. It embeds a [`TransportBase`] and runs in its own task.
pub(crate) trait Transport: Send + Sized + 'static {
    fn base(&self) -> &TransportBase;

    /// Run the transport until it is closed or its command channel is dropped
    fn run(self, cmds: mpsc::UnboundedReceiver<TransportCmd>) -> impl Future<Output = ()> + Send;
}

/// The socket task side of a running transport.
///
/// Dropping it drops the command channel: the transport task stops without sending anything.
#[derive(Debug)]
pub(crate) struct TransportHandle {
    pub id: TransportId,
    pub kind: TransportType,
    tx: mpsc::UnboundedSender<TransportCmd>,
}

impl TransportHandle {
    fn cmd(&self, cmd: TransportCmd) {
        self.tx.send(cmd).ok();
    }
    pub fn write(&self, packets: Vec<Packet>) {
        self.cmd(TransportCmd::Write(packets));
    }
    pub fn pause(&self) {
        self.cmd(TransportCmd::Pause);
    }
    pub fn resume(&self) {
        self.cmd(TransportCmd::Resume);
    }
    pub fn close(&self) {
        self.cmd(TransportCmd::Close);
    }
}

/// Spawn the transport task
pub(crate) fn spawn<T: Transport>(transport: T) -> TransportHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let base = transport.base();
    let handle = TransportHandle {
        id: base.id,
        kind: base.kind,
        tx,
    };
    #[cfg(feature = "tracing")]
    tracing::debug!(
        id = handle.id,
        transport = ?handle.kind,
        "spawning transport"
    );
    tokio::spawn(transport.run(rx));
    handle
}

/// Resolves to the output of the in-flight future, or never if there is none.
pub(crate) async fn maybe<T>(fut: &mut Option<BoxFuture<'static, T>>) -> T {
    match fut {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

/// The transports a [`Socket`](crate::Socket) can use.
///
/// The polling transport is always available, socket-style transports
/// are available only if a [`Connector`] is set for them.
#[derive(Clone)]
pub struct Connectors<S = HyperClient> {
    /// The http client used by the polling transport
    pub polling: S,
    /// The websocket connector. Defaults to [`WsConnector`].
    pub websocket: Option<Arc<dyn Connector>>,
    /// The webtransport connector. There is none by default.
    pub webtransport: Option<Arc<dyn Connector>>,
}

impl<S: PollingSvc> Connectors<S> {
    /// Create connectors with a custom http client for the polling transport
    /// and the default websocket connector.
    pub fn new(polling: S) -> Self {
        Self {
            polling,
            websocket: Some(Arc::new(WsConnector)),
            webtransport: None,
        }
    }

    /// Set the websocket connector
    pub fn websocket(mut self, connector: impl Connector) -> Self {
        self.websocket = Some(Arc::new(connector));
        self
    }

    /// Set the webtransport connector
    pub fn webtransport(mut self, connector: impl Connector) -> Self {
        self.webtransport = Some(Arc::new(connector));
        self
    }

    /// Disable a socket-style transport
    pub fn without(mut self, transport: TransportType) -> Self {
        match transport {
            TransportType::Websocket => self.websocket = None,
            TransportType::WebTransport => self.webtransport = None,
            TransportType::Polling => {}
        }
        self
    }

    /// Check if the transport can be used
    pub fn supports(&self, transport: TransportType) -> bool {
        match transport {
            TransportType::Polling => true,
            _ => self.connector(transport).is_some(),
        }
    }

    pub(crate) fn connector(&self, transport: TransportType) -> Option<Arc<dyn Connector>> {
        match transport {
            TransportType::Polling => None,
            TransportType::Websocket => self.websocket.clone(),
            TransportType::WebTransport => self.webtransport.clone(),
        }
    }
}

impl Default for Connectors<HyperClient> {
    fn default() -> Self {
        Self::new(HyperClient::new())
    }
}

impl<S> fmt::Debug for Connectors<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connectors")
            .field("websocket", &self.websocket.is_some())
            .field("webtransport", &self.webtransport.is_some())
            .finish()
    }
}
