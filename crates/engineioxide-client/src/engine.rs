//! ## The socket task
//!
//! The [`Engine`] owns the active transport and the upgrade probe. It runs the handshake,
//! the heartbeat, the upgrade and the close sequence, and calls the [`SocketHandler`].
//!
//! Every transport sends its events to the same channel, tagged with its id.
//! Events of a transport that is neither active nor probing are ignored.
use std::{collections::VecDeque, sync::Arc, time::Duration};

use engineioxide_core::{Codec, Heartbeat, OpenPacket, Packet, PacketBuf, TransportType};
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};

use crate::{
    CloseReason, Socket, SocketState,
    config::SocketConfig,
    errors::Error,
    handler::SocketHandler,
    transport::{
        Connectors, PollingSvc, TransportEvent, TransportHandle, TransportId, TransportMsg,
        UriBuilder, duplex::Duplex, polling::Polling, spawn,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    /// The probe transport is connecting
    Opening,
    /// The ping probe was sent, waiting for the pong probe
    Probing,
    /// The pong probe was received, waiting for the active transport to pause
    Pausing,
}

/// A transport being tested before replacing the active one
#[derive(Debug)]
struct Probe {
    handle: TransportHandle,
    state: ProbeState,
    deadline: Instant,
    /// Packets received on the probe before the swap
    received: Vec<Packet>,
}

/// Resolves at the deadline, or never if there is none
async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub(crate) struct Engine<H, S> {
    config: Arc<SocketConfig>,
    codec: &'static dyn Codec,
    handler: Arc<H>,
    socket: Socket,
    connectors: Connectors<S>,
    uri: UriBuilder,

    state: SocketState,
    handshake: Option<OpenPacket>,

    next_id: TransportId,
    events_tx: mpsc::UnboundedSender<TransportMsg>,
    events: mpsc::UnboundedReceiver<TransportMsg>,
    /// Packets emitted by the application
    app_rx: mpsc::Receiver<PacketBuf>,

    transport: Option<TransportHandle>,
    /// The active transport has no write in flight
    writable: bool,
    write_buffer: VecDeque<Packet>,
    /// The active transport is pausing for an upgrade
    upgrading: bool,
    probe: Option<Probe>,

    /// The connection is lost if nothing is heard from the server before this deadline
    heartbeat: Option<Instant>,
    /// When to send the next ping (engine.io v3)
    ping_at: Option<Instant>,

    closing: Option<CloseReason>,
    close_requested: bool,
    close_deadline: Option<Instant>,
}

impl<H: SocketHandler, S: PollingSvc> Engine<H, S> {
    pub fn new(
        config: SocketConfig,
        handler: Arc<H>,
        connectors: Connectors<S>,
        socket: Socket,
        app_rx: mpsc::Receiver<PacketBuf>,
    ) -> Self {
        let config = Arc::new(config);
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            codec: config.protocol.codec(),
            uri: UriBuilder::new(config.clone()),
            config,
            handler,
            socket,
            connectors,
            state: SocketState::Opening,
            handshake: None,
            next_id: 0,
            events_tx,
            events,
            app_rx,
            transport: None,
            writable: false,
            write_buffer: VecDeque::new(),
            upgrading: false,
            probe: None,
            heartbeat: None,
            ping_at: None,
            closing: None,
            close_requested: false,
            close_deadline: None,
        }
    }

    /// Drive the socket until it is closed
    pub async fn run(mut self) {
        self.open();
        while self.state != SocketState::Closed {
            let probe_deadline = self.probe.as_ref().map(|p| p.deadline);
            tokio::select! {
                Some(msg) = self.events.recv() => self.on_transport_msg(msg),
                Some(packets) = self.app_rx.recv(), if self.state == SocketState::Open && self.can_flush() => {
                    self.write_buffer.extend(packets);
                    self.flush();
                }
                _ = self.socket.shared().close.notified() => self.close(CloseReason::ForcedClose),
                _ = deadline(self.heartbeat) => self.on_heartbeat_timeout(),
                _ = deadline(self.ping_at) => self.ping(),
                _ = deadline(probe_deadline) => self.fail_probe(Error::UpgradeTimeout),
                _ = deadline(self.close_deadline) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(sid = ?self.socket.id(), "close timeout, dropping transport");
                    self.finalize(self.closing.unwrap_or(CloseReason::ForcedClose));
                }
            }
        }
    }

    fn set_state(&mut self, state: SocketState) {
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.socket.id(), ?state, "socket state");
        self.state = state;
        self.socket.shared().set_state(state);
    }

    fn open(&mut self) {
        let kind = self
            .config
            .transports
            .first()
            .copied()
            .unwrap_or(TransportType::Polling);
        match self.create_transport(kind) {
            Ok(handle) => {
                self.socket.shared().set_transport(kind);
                self.transport = Some(handle);
            }
            Err(e) => {
                self.handler.on_error(&e, &self.socket);
                self.finalize(CloseReason::TransportError);
            }
        }
    }

    fn create_transport(&mut self, kind: TransportType) -> Result<TransportHandle, Error> {
        let id = self.next_id;
        self.next_id += 1;
        let sid = self.handshake.as_ref().map(|h| h.sid.clone());
        let base = crate::transport::TransportBase::new(
            id,
            kind,
            self.codec,
            sid,
            self.uri.clone(),
            self.events_tx.clone(),
        );
        let supports_binary = !self.config.force_base64;
        match kind {
            TransportType::Polling => Ok(spawn(Polling::new(
                base,
                self.connectors.polling.clone(),
                supports_binary,
            ))),
            kind => {
                let connector = self
                    .connectors
                    .connector(kind)
                    .ok_or(Error::UnsupportedTransport(kind))?;
                Ok(spawn(Duplex::new(base, connector, supports_binary)))
            }
        }
    }

    fn on_transport_msg(&mut self, TransportMsg { id, event }: TransportMsg) {
        if self.transport.as_ref().is_some_and(|t| t.id == id) {
            self.on_transport_event(event);
        } else if self.probe.as_ref().is_some_and(|p| p.handle.id == id) {
            self.on_probe_event(event);
        } else {
            #[cfg(feature = "tracing")]
            tracing::trace!(id, ?event, "ignoring event of a discarded transport");
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {}
            TransportEvent::Packet(packet) => self.on_packet(packet),
            TransportEvent::Drain => {
                self.writable = true;
                if self.state == SocketState::Closing && self.write_buffer.is_empty() {
                    self.maybe_close_transport();
                } else {
                    self.flush();
                }
            }
            TransportEvent::Paused => {
                if self
                    .probe
                    .as_ref()
                    .is_some_and(|p| p.state == ProbeState::Pausing)
                {
                    self.complete_upgrade();
                }
            }
            TransportEvent::OutOfBand(data) => self.handler.on_out_of_band(data, &self.socket),
            TransportEvent::Error(err) => self.on_error(err),
            TransportEvent::Close => {
                let reason = match self.state {
                    SocketState::Closing => self.closing.unwrap_or(CloseReason::ForcedClose),
                    _ => CloseReason::TransportClose,
                };
                self.finalize(reason);
            }
        }
    }

    fn on_error(&mut self, err: Error) {
        if self.state == SocketState::Opening {
            // Any error before the handshake is fatal
            let err = match err {
                Error::PacketParse(e) => Error::Handshake(e.to_string()),
                err => err,
            };
            self.handler.on_error(&err, &self.socket);
            let reason: Option<CloseReason> = (&err).into();
            self.finalize(reason.unwrap_or(CloseReason::HandshakeError));
            return;
        }
        self.handler.on_error(&err, &self.socket);
        if let Some(reason) = (&err).into() {
            self.finalize(reason);
        }
    }

    fn on_packet(&mut self, packet: Packet) {
        if self.state == SocketState::Closed {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(sid = ?self.socket.id(), ?packet, "received packet");

        if self.codec.heartbeat() == Heartbeat::ClientPing {
            if let Some(h) = &self.handshake {
                self.heartbeat = Some(Instant::now() + heartbeat_timeout(h));
            }
        }

        match packet {
            Packet::Open(open) if self.state == SocketState::Opening => self.on_handshake(open),
            packet if self.state == SocketState::Opening => {
                let err = Error::Handshake(format!("expected an open packet, got {packet:?}"));
                self.handler.on_error(&err, &self.socket);
                self.finalize(CloseReason::HandshakeError);
            }
            Packet::Ping => {
                if let Some(h) = &self.handshake {
                    self.heartbeat = Some(Instant::now() + heartbeat_timeout(h));
                }
                self.send_packet(Packet::Pong);
                self.handler.on_ping(&self.socket);
            }
            Packet::Pong => {
                if let Some(h) = &self.handshake {
                    self.ping_at = Some(Instant::now() + Duration::from_millis(h.ping_interval));
                }
                self.handler.on_pong(&self.socket);
            }
            Packet::Message(msg) => self.handler.on_message(msg, &self.socket),
            Packet::Binary(data) => self.handler.on_binary(data, &self.socket),
            _packet => {
                #[cfg(feature = "tracing")]
                tracing::trace!(sid = ?self.socket.id(), packet = ?_packet, "ignoring packet");
            }
        }
    }

    fn on_handshake(&mut self, open: OpenPacket) {
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?open.sid, upgrades = ?open.upgrades, "handshake");
        let now = Instant::now();
        self.heartbeat = Some(now + heartbeat_timeout(&open));
        if self.codec.heartbeat() == Heartbeat::ClientPing {
            self.ping_at = Some(now + Duration::from_millis(open.ping_interval));
        }
        let upgrade = self.upgrade_candidate(&open);
        self.socket.shared().set_handshake(open.clone());
        self.handshake = Some(open);
        self.writable = true;

        self.set_state(SocketState::Open);
        self.handler.on_open(&self.socket);
        self.flush();

        if let Some(kind) = upgrade {
            if self.state == SocketState::Open {
                self.start_probe(kind);
            }
        }
    }

    /// The first configured transport offered by the server that can be used
    fn upgrade_candidate(&self, open: &OpenPacket) -> Option<TransportType> {
        let active = self.transport.as_ref()?.kind;
        if !self.config.upgrade || active != TransportType::Polling {
            return None;
        }
        self.config.transports.iter().copied().find(|&kind| {
            kind != TransportType::Polling
                && open.upgrades.iter().any(|u| u == kind.as_str())
                && self.connectors.supports(kind)
        })
    }

    fn start_probe(&mut self, kind: TransportType) {
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.socket.id(), transport = ?kind, "probing transport");
        match self.create_transport(kind) {
            Ok(handle) => {
                self.probe = Some(Probe {
                    handle,
                    state: ProbeState::Opening,
                    deadline: Instant::now() + self.config.upgrade_timeout,
                    received: Vec::new(),
                })
            }
            Err(e) => self.handler.on_upgrade_error(&e, &self.socket),
        }
    }

    fn on_probe_event(&mut self, event: TransportEvent) {
        let Some(probe) = self.probe.as_mut() else {
            return;
        };
        match (probe.state, event) {
            (ProbeState::Opening, TransportEvent::Open) => {
                probe.handle.write(vec![Packet::PingUpgrade]);
                probe.state = ProbeState::Probing;
            }
            (ProbeState::Probing, TransportEvent::Packet(Packet::PongUpgrade)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(sid = ?self.socket.id(), "probe succeeded, pausing active transport");
                probe.state = ProbeState::Pausing;
                self.upgrading = true;
                if let Some(transport) = &self.transport {
                    transport.pause();
                }
            }
            (ProbeState::Pausing, TransportEvent::Packet(packet)) => probe.received.push(packet),
            (_, TransportEvent::Packet(_)) => self.fail_probe(Error::UpgradeFailed),
            (_, TransportEvent::Error(err)) => self.fail_probe(err),
            (_, TransportEvent::Close) => self.fail_probe(Error::TransportClosed),
            (_, TransportEvent::Open | TransportEvent::Drain | TransportEvent::Paused) => {}
            (_, TransportEvent::OutOfBand(data)) => self.handler.on_out_of_band(data, &self.socket),
        }
    }

    /// Swap the paused active transport for the probe
    fn complete_upgrade(&mut self) {
        let Some(probe) = self.probe.take() else {
            return;
        };
        let kind = probe.handle.kind;
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.socket.id(), transport = ?kind, "upgraded");

        if let Some(old) = self.transport.replace(probe.handle) {
            old.close();
        }
        self.upgrading = false;
        self.writable = false;
        if let Some(transport) = &self.transport {
            transport.write(vec![Packet::Upgrade]);
        }
        self.socket.shared().set_transport(kind);
        self.handler.on_upgrade(kind, &self.socket);

        for packet in probe.received {
            self.on_packet(packet);
        }
        if self.state == SocketState::Closing {
            self.maybe_close_transport();
        }
    }

    /// Discard the probe, the active transport is kept
    fn fail_probe(&mut self, err: Error) {
        let Some(probe) = self.probe.take() else {
            return;
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.socket.id(), transport = ?probe.handle.kind, "probe failed: {err}");
        probe.handle.close();
        if self.upgrading {
            self.upgrading = false;
            if let Some(transport) = &self.transport {
                transport.resume();
            }
        }
        self.handler.on_upgrade_error(&err, &self.socket);
        match self.state {
            SocketState::Closing => self.maybe_close_transport(),
            _ => self.flush(),
        }
    }

    fn send_packet(&mut self, packet: Packet) {
        if matches!(self.state, SocketState::Opening | SocketState::Open) {
            self.write_buffer.push_back(packet);
            self.flush();
        }
    }

    fn can_flush(&self) -> bool {
        self.transport.is_some() && self.writable && !self.upgrading
    }

    /// Send the buffered packets to the active transport if it is writable
    fn flush(&mut self) {
        if !matches!(self.state, SocketState::Open | SocketState::Closing) || !self.can_flush() {
            return;
        }
        if self.state == SocketState::Open {
            while let Ok(packets) = self.app_rx.try_recv() {
                self.write_buffer.extend(packets);
            }
        }
        if self.write_buffer.is_empty() {
            return;
        }
        let count = self.writable_packets();
        let packets: Vec<Packet> = self.write_buffer.drain(..count).collect();
        #[cfg(feature = "tracing")]
        tracing::trace!(sid = ?self.socket.id(), count, "flushing packets");
        if let Some(transport) = &self.transport {
            self.writable = false;
            transport.write(packets);
        }
    }

    /// The number of buffered packets fitting in the `maxPayload` of a polling request
    fn writable_packets(&self) -> usize {
        let max_payload = self.handshake.as_ref().map_or(0, |h| h.max_payload) as usize;
        let polling = self
            .transport
            .as_ref()
            .is_some_and(|t| t.kind == TransportType::Polling);
        if !polling || max_payload == 0 || self.write_buffer.len() <= 1 {
            return self.write_buffer.len();
        }
        let mut size = 1;
        for (i, packet) in self.write_buffer.iter().enumerate() {
            size += packet.get_size_hint(true);
            if i > 0 && size > max_payload {
                return i;
            }
            size += 2;
        }
        self.write_buffer.len()
    }

    fn ping(&mut self) {
        self.ping_at = None;
        if let Some(h) = &self.handshake {
            self.heartbeat = Some(Instant::now() + Duration::from_millis(h.ping_timeout));
        }
        self.send_packet(Packet::Ping);
    }

    fn on_heartbeat_timeout(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.socket.id(), "heartbeat timeout");
        self.handler.on_error(&Error::HeartbeatTimeout, &self.socket);
        self.finalize(CloseReason::HeartbeatTimeout);
    }

    /// Start a graceful close: buffered packets are flushed before the transport is closed
    fn close(&mut self, reason: CloseReason) {
        if matches!(self.state, SocketState::Closing | SocketState::Closed) {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.socket.id(), ?reason, "closing socket");
        let opening = self.state == SocketState::Opening;
        self.set_state(SocketState::Closing);
        self.closing = Some(reason);
        self.close_deadline = Some(Instant::now() + self.config.close_timeout);

        self.app_rx.close();
        while let Ok(packets) = self.app_rx.try_recv() {
            if !opening {
                self.write_buffer.extend(packets);
            }
        }
        if !self.upgrading {
            if let Some(probe) = self.probe.take() {
                probe.handle.close();
            }
        }

        if opening {
            // Nothing was sent yet, the transport sends the close packet once it knows the session id
            self.request_transport_close();
        } else {
            self.flush();
            self.maybe_close_transport();
        }
    }

    fn maybe_close_transport(&mut self) {
        if self.write_buffer.is_empty() && self.writable && !self.upgrading {
            self.request_transport_close();
        }
    }

    fn request_transport_close(&mut self) {
        if !self.close_requested {
            self.close_requested = true;
            if let Some(transport) = &self.transport {
                transport.close();
            }
        }
    }

    /// Release everything and notify the handler. Called exactly once.
    fn finalize(&mut self, reason: CloseReason) {
        if self.state == SocketState::Closed {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.socket.id(), ?reason, "socket closed");
        self.set_state(SocketState::Closed);
        self.heartbeat = None;
        self.ping_at = None;
        self.close_deadline = None;
        self.app_rx.close();
        self.write_buffer.clear();

        if let Some(probe) = self.probe.take() {
            probe.handle.close();
        }
        if let Some(transport) = self.transport.take() {
            if !self.close_requested {
                transport.close();
            }
        }
        self.handler.on_close(reason, &self.socket);
        self.socket.shared().closed.notify_waiters();
    }
}

/// The maximum time between two server packets
fn heartbeat_timeout(open: &OpenPacket) -> Duration {
    Duration::from_millis(open.ping_interval + open.ping_timeout)
}
