//! ## A [`SocketHandler`] to get event calls for an engine.io client socket
//!
//! Every method is called from the socket task, in the order the events occurred.
//! Handlers should not block: spawn a task for long running work.
//!
//! #### Example :
//! ```rust,no_run
//! # use bytes::Bytes;
//! # use engineioxide_client::handler::SocketHandler;
//! # use engineioxide_client::{Socket, CloseReason, Str};
//! # use engineioxide_client::config::SocketConfig;
//! # use std::sync::Arc;
//! # use std::sync::atomic::{AtomicUsize, Ordering};
//! #[derive(Debug, Default)]
//! struct MyHandler {
//!     msg_cnt: AtomicUsize,
//! }
//!
//! impl SocketHandler for MyHandler {
//!     fn on_open(&self, socket: &Socket) {
//!         socket.emit("hello").ok();
//!     }
//!     fn on_message(&self, msg: Str, socket: &Socket) {
//!         let cnt = self.msg_cnt.fetch_add(1, Ordering::Relaxed) + 1;
//!         println!("message {cnt}: {msg}");
//!     }
//!     fn on_binary(&self, data: Bytes, socket: &Socket) {
//!         socket.emit_binary(data).ok();
//!     }
//!     fn on_close(&self, reason: CloseReason, _socket: &Socket) {
//!         println!("closed: {reason:?}");
//!     }
//! }
//!
//! # async fn doc() {
//! let socket = Socket::connect(SocketConfig::default(), Arc::new(MyHandler::default()));
//! socket.closed().await;
//! # }
//! ```
use bytes::Bytes;
use engineioxide_core::{Str, TransportType};

use crate::{CloseReason, Socket, errors::Error};

/// The [`SocketHandler`] trait can be implemented on any struct to handle socket events
pub trait SocketHandler: std::fmt::Debug + Send + Sync + 'static {
    /// Called when the handshake is complete and the socket is open.
    fn on_open(&self, socket: &Socket);

    /// Called when a message is received from the server.
    fn on_message(&self, msg: Str, socket: &Socket);

    /// Called when a binary message is received from the server.
    fn on_binary(&self, data: Bytes, socket: &Socket);

    /// Called once when the socket is closed with a [`CloseReason`]
    fn on_close(&self, reason: CloseReason, socket: &Socket);

    /// Called when an error occurs on the active transport.
    /// A call to [`on_close`](Self::on_close) follows if the error is fatal.
    fn on_error(&self, err: &Error, socket: &Socket) {
        let _ = (err, socket);
    }

    /// Called when a ping is received from the server (engine.io v4).
    fn on_ping(&self, socket: &Socket) {
        let _ = socket;
    }

    /// Called when a pong is received from the server (engine.io v3).
    fn on_pong(&self, socket: &Socket) {
        let _ = socket;
    }

    /// Called when the connection is upgraded to a new transport.
    fn on_upgrade(&self, transport: TransportType, socket: &Socket) {
        let _ = (transport, socket);
    }

    /// Called when a transport upgrade failed. The socket keeps its current transport.
    fn on_upgrade_error(&self, err: &Error, socket: &Socket) {
        let _ = (err, socket);
    }

    /// Called with data found in a polling response that does not belong to the engine.io payload.
    fn on_out_of_band(&self, data: String, socket: &Socket) {
        let _ = (data, socket);
    }
}
