//! The websocket [`Connector`], backed by `tokio-tungstenite`.
use engineioxide_core::{Fragment, Str};
use futures_util::{FutureExt, SinkExt, StreamExt, future::BoxFuture};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{Message, Utf8Bytes},
};

use super::{Channel, Connector};
use crate::errors::Error;

/// Connects with [`tokio_tungstenite::connect_async`]. Plain and tls urls are supported
/// if the matching `tokio-tungstenite` features are enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: String) -> BoxFuture<'static, Result<Channel, Error>> {
        async move {
            #[cfg(feature = "tracing")]
            tracing::debug!(%url, "connecting websocket");
            let (ws, _res) = tokio_tungstenite::connect_async(url).await?;
            Ok(channel(ws))
        }
        .boxed()
    }
}

/// Wrap an established websocket into a [`Channel`].
///
/// Text frames carry text packets and binary frames carry binary packets.
/// Control frames are handled by the websocket itself.
pub fn channel<S>(ws: WebSocketStream<S>) -> Channel
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = ws.split();
    let sink = tx
        .sink_map_err(Error::from)
        .with(|frame: Fragment| async move {
            Ok::<_, Error>(match frame {
                Fragment::Text(text) => Message::Text(Utf8Bytes::from(String::from(text))),
                Fragment::Binary(data) => Message::Binary(data),
            })
        });
    let stream = rx.filter_map(|msg| async move {
        match msg {
            // SAFETY: tungstenite already checked that text frames are valid utf8
            Ok(Message::Text(text)) => Some(Ok(Fragment::Text(unsafe {
                Str::from_bytes_unchecked(text.into())
            }))),
            Ok(Message::Binary(data)) => Some(Ok(Fragment::Binary(data))),
            Ok(_) => None,
            Err(e) => Some(Err(Error::from(e))),
        }
    });
    Channel::new(sink, stream)
}
