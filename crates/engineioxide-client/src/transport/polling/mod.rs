//! ## The http long-polling transport
//!
//! A `GET` request is always in flight while the transport is open, its response carries the packets
//! sent by the server. Packets sent by the client are aggregated into a single `POST` request.
//!
//! The engine.io v3 text responses go through the out-of-band framer before being decoded.
use std::ops::ControlFlow;

use bytes::Bytes;
use engineioxide_core::{Framing, Packet, PacketParseError, Str, payload::Payload};
use futures_util::{FutureExt, future::BoxFuture};
use http::{Request, header::CONTENT_TYPE};
use http_body_util::Full;
use tokio::sync::mpsc;

use super::{Transport, TransportBase, TransportCmd, TransportState, maybe};
use crate::errors::Error;

mod payload;
mod svc;

pub use svc::{HyperClient, PollingSvc};

type Pending = Option<BoxFuture<'static, Result<Payload, Error>>>;

pub(crate) struct Polling<S> {
    base: TransportBase,
    svc: S,
    supports_binary: bool,
    /// The in-flight `GET` request
    poll: Pending,
    /// The in-flight `POST` request
    write: Pending,
    /// A close was requested before the handshake
    close_pending: bool,
}

impl<S: PollingSvc> Polling<S> {
    pub fn new(base: TransportBase, svc: S, supports_binary: bool) -> Self {
        Self {
            base,
            svc,
            supports_binary,
            poll: None,
            write: None,
            close_pending: false,
        }
    }

    fn request(
        &self,
        req: Result<Request<Full<Bytes>>, http::Error>,
    ) -> BoxFuture<'static, Result<Payload, Error>> {
        match req {
            Ok(req) => self.svc.send(req),
            Err(e) => futures_util::future::ready(Err(e.into())).boxed(),
        }
    }

    fn do_poll(&mut self) {
        let url = self.base.url(self.supports_binary);
        #[cfg(feature = "tracing")]
        tracing::trace!(id = self.base.id, %url, "polling");
        let req = Request::get(url).body(Full::default());
        self.poll = Some(self.request(req));
    }

    fn post(&self, packets: Vec<Packet>) -> BoxFuture<'static, Result<Payload, Error>> {
        let payload = self
            .base
            .codec
            .encode_payload(packets, self.supports_binary);
        let req = Request::post(self.base.url(self.supports_binary))
            .header(CONTENT_TYPE, payload.content_type())
            .body(Full::new(payload.data));
        self.request(req)
    }

    fn do_write(&mut self, packets: Vec<Packet>) {
        #[cfg(feature = "tracing")]
        tracing::trace!(id = self.base.id, count = packets.len(), "writing packets");
        self.write = Some(self.post(packets));
    }

    /// Decode a response, forwarding the packets to the socket task
    fn on_data(&mut self, payload: Payload) {
        let codec = self.base.codec;
        let (payload, out_of_band) = match codec.framing() {
            Framing::LengthPrefixed if !payload.has_binary => {
                let data = match Str::try_from(payload.data) {
                    Ok(data) => data,
                    Err(e) => {
                        self.base.on_error(PacketParseError::from(e).into());
                        return;
                    }
                };
                let framed = payload::separate(data);
                (Payload::new(framed.clean, false), framed.out_of_band)
            }
            _ => (payload, None),
        };

        if !payload.data.is_empty() {
            let base = &mut self.base;
            let res = codec.decode_payload(payload, &mut |packet| {
                if let Packet::Open(open) = &packet {
                    match base.state {
                        TransportState::Opening => {
                            base.sid = Some(open.sid.clone());
                            base.on_open();
                        }
                        // The close is deferred until the session id is known
                        TransportState::Closing => {
                            base.sid = Some(open.sid.clone());
                            return ControlFlow::Break(());
                        }
                        _ => {}
                    }
                }
                if base.state == TransportState::Closing {
                    return ControlFlow::Continue(());
                }
                if let Packet::Close = packet {
                    base.on_close();
                    return ControlFlow::Break(());
                }
                base.on_packet(packet);
                ControlFlow::Continue(())
            });
            if let Err(e) = res {
                self.base.on_error(e.into());
            }
        }

        if let Some(data) = out_of_band {
            if self.base.state != TransportState::Closed {
                #[cfg(feature = "tracing")]
                tracing::debug!(id = self.base.id, len = data.len(), "out-of-band data");
                self.base.on_out_of_band(data);
            }
        }

        if self.close_pending && self.base.sid.is_some() {
            self.close_pending = false;
            self.send_close();
        }
    }

    fn on_poll(&mut self, res: Result<Payload, Error>) {
        match res {
            Ok(payload) => {
                self.on_data(payload);
                match self.base.state {
                    TransportState::Open => self.do_poll(),
                    TransportState::Pausing => self.check_paused(),
                    _ => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(id = self.base.id, state = ?self.base.state, "ignoring poll");
                    }
                }
            }
            Err(e) => self.base.on_fatal(e),
        }
    }

    fn on_write(&mut self, res: Result<Payload, Error>) {
        match res {
            Ok(payload) => {
                // engine.io v3 servers may answer a post with packets
                if self.base.codec.framing() == Framing::LengthPrefixed {
                    self.on_data(payload);
                }
                if self.base.state != TransportState::Closed {
                    self.base.on_drain();
                    self.check_paused();
                }
            }
            Err(e) => self.base.on_fatal(e),
        }
    }

    fn pause(&mut self) {
        if matches!(self.base.state, TransportState::Open) {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                id = self.base.id,
                poll = self.poll.is_some(),
                write = self.write.is_some(),
                "pausing"
            );
            self.base.state = TransportState::Pausing;
            self.check_paused();
        }
    }

    /// The transport is paused once no request is in flight
    fn check_paused(&mut self) {
        if self.base.state == TransportState::Pausing && self.poll.is_none() && self.write.is_none()
        {
            self.base.on_paused();
        }
    }

    fn resume(&mut self) {
        if matches!(
            self.base.state,
            TransportState::Pausing | TransportState::Paused
        ) {
            #[cfg(feature = "tracing")]
            tracing::debug!(id = self.base.id, "resuming");
            self.base.state = TransportState::Open;
            if self.poll.is_none() {
                self.do_poll();
            }
        }
    }

    /// Post a close packet without waiting for the response, then close the transport
    fn send_close(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(id = self.base.id, "writing close packet");
        let req = self.post(vec![Packet::Close]);
        tokio::spawn(async move {
            if let Err(_e) = req.await {
                #[cfg(feature = "tracing")]
                tracing::debug!("error sending close packet: {_e}");
            }
        });
        self.base.on_close();
    }

    fn close(&mut self) {
        match self.base.state {
            TransportState::Open => self.send_close(),
            TransportState::Opening => {
                #[cfg(feature = "tracing")]
                tracing::debug!(id = self.base.id, "transport not open, deferring close");
                self.base.state = TransportState::Closing;
                self.close_pending = true;
            }
            // A paused transport was replaced by an upgrade, the server already dropped it
            TransportState::Pausing | TransportState::Paused => self.base.on_close(),
            TransportState::Closing | TransportState::Closed => {}
        }
    }
}

impl<S: PollingSvc> Transport for Polling<S> {
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn run(mut self, mut cmds: mpsc::UnboundedReceiver<TransportCmd>) {
        self.do_poll();
        while self.base.state != TransportState::Closed {
            tokio::select! {
                res = maybe(&mut self.poll) => {
                    self.poll = None;
                    self.on_poll(res);
                }
                res = maybe(&mut self.write) => {
                    self.write = None;
                    self.on_write(res);
                }
                cmd = cmds.recv() => match cmd {
                    Some(TransportCmd::Write(packets)) => self.do_write(packets),
                    Some(TransportCmd::Pause) => self.pause(),
                    Some(TransportCmd::Resume) => self.resume(),
                    Some(TransportCmd::Close) => self.close(),
                    // The socket dropped the transport, in-flight requests are abandoned
                    None => return,
                },
            }
        }
    }
}
