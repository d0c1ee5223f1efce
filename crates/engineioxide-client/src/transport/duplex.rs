//! Socket-style transports: websocket and webtransport.
//!
//! The connection itself is opened by a [`Connector`] which returns a [`Channel`] of [`Fragment`]s.
//! Every fragment carries exactly one packet, there is no payload framing.
use std::{fmt, ops::ControlFlow, pin::Pin, sync::Arc};

use engineioxide_core::{Fragment, Packet};
use futures_core::Stream;
use futures_util::{Sink, SinkExt, StreamExt, future::BoxFuture};
use tokio::sync::mpsc;

use super::{Transport, TransportBase, TransportCmd, TransportState};
use crate::errors::Error;

/// A frame-oriented, full-duplex connection to the server
pub struct Channel {
    /// Frames sent to the server
    pub sink: Pin<Box<dyn Sink<Fragment, Error = Error> + Send>>,
    /// Frames received from the server. The channel is closed when the stream ends.
    pub stream: Pin<Box<dyn Stream<Item = Result<Fragment, Error>> + Send>>,
}

impl Channel {
    /// Create a channel from a frame sink and a frame stream
    pub fn new(
        sink: impl Sink<Fragment, Error = Error> + Send + 'static,
        stream: impl Stream<Item = Result<Fragment, Error>> + Send + 'static,
    ) -> Self {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}

/// Opens a [`Channel`] to the given url.
///
/// Implement it to plug a webtransport client or a custom websocket client
/// into [`Connectors`](super::Connectors).
pub trait Connector: Send + Sync + 'static {
    /// Connect to the server. The url already contains the engine.io query parameters.
    fn connect(&self, url: String) -> BoxFuture<'static, Result<Channel, Error>>;
}

pub(crate) struct Duplex {
    base: TransportBase,
    connector: Arc<dyn Connector>,
    supports_binary: bool,
}

impl Duplex {
    pub fn new(base: TransportBase, connector: Arc<dyn Connector>, supports_binary: bool) -> Self {
        Self {
            base,
            connector,
            supports_binary,
        }
    }

    /// Wait for the connector. Returns `None` if the transport was closed meanwhile.
    async fn connect(
        &mut self,
        cmds: &mut mpsc::UnboundedReceiver<TransportCmd>,
    ) -> Option<Channel> {
        let mut connect = self.connector.connect(self.base.url(self.supports_binary));
        loop {
            tokio::select! {
                res = &mut connect => match res {
                    Ok(channel) => return Some(channel),
                    Err(e) => {
                        self.base.on_fatal(e);
                        return None;
                    }
                },
                cmd = cmds.recv() => match cmd {
                    Some(TransportCmd::Close) => {
                        self.base.on_close();
                        return None;
                    }
                    None => return None,
                    // Nothing can be written nor paused before the transport is open
                    Some(_) => {}
                },
            }
        }
    }

    fn on_frame(&mut self, frame: Fragment) -> ControlFlow<()> {
        match self.base.codec.decode_packet(frame) {
            Ok(Packet::Close) => {
                self.base.on_close();
                return ControlFlow::Break(());
            }
            Ok(packet) => self.base.on_packet(packet),
            Err(e) => self.base.on_error(e.into()),
        }
        ControlFlow::Continue(())
    }

    async fn write(&mut self, sink: &mut Channel, packets: Vec<Packet>) -> Result<(), Error> {
        for packet in packets {
            let frame = self.base.codec.encode_packet(packet, self.supports_binary);
            sink.sink.feed(frame).await?;
        }
        sink.sink.flush().await
    }
}

impl Transport for Duplex {
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn run(mut self, mut cmds: mpsc::UnboundedReceiver<TransportCmd>) {
        let Some(mut channel) = self.connect(&mut cmds).await else {
            return;
        };
        self.base.on_open();

        loop {
            tokio::select! {
                frame = channel.stream.next() => match frame {
                    Some(Ok(frame)) => {
                        if self.on_frame(frame).is_break() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        self.base.on_fatal(e);
                        return;
                    }
                    None => {
                        self.base.on_close();
                        return;
                    }
                },
                cmd = cmds.recv() => match cmd {
                    Some(TransportCmd::Write(packets)) => {
                        if let Err(e) = self.write(&mut channel, packets).await {
                            self.base.on_fatal(e);
                            return;
                        }
                        self.base.on_drain();
                    }
                    Some(TransportCmd::Pause) => self.base.on_paused(),
                    Some(TransportCmd::Resume) => self.base.state = TransportState::Open,
                    Some(TransportCmd::Close) => {
                        channel.sink.close().await.ok();
                        self.base.on_close();
                        return;
                    }
                    None => return,
                },
            }
        }
    }
}
