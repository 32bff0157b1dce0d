//! Transport-neutral view of a duplex WebSocket connection.
//!
//! Both sides of a call are WebSockets, but from different crates: the
//! telephony side is an `axum` server socket and the realtime side a
//! `tokio-tungstenite` client socket. The bridge only ever exchanges text
//! frames, so each socket is adapted into a [`Link`]: a sink of outgoing text
//! and a stream of incoming text that ends when the peer closes.

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures_util::{SinkExt, StreamExt, future, sink::Sink, stream::Stream};
use std::pin::Pin;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, tungstenite::protocol::Message as WsMessage,
};
use tracing::trace;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("websocket transport error: {0}")]
    Transport(String),
    #[error("link closed")]
    Closed,
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = LinkError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, LinkError>> + Send>>;

/// One side of a call, split into its write and read halves.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Link {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }

    /// Adapts the server socket accepted from the telephony platform.
    pub fn from_axum(socket: WebSocket) -> Self {
        let (tx, rx) = socket.split();
        let sink = tx
            .sink_map_err(|e| LinkError::Transport(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, LinkError>(AxumMessage::Text(text.into()))));
        let stream = rx
            .take_while(|msg| future::ready(!matches!(msg, Ok(AxumMessage::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(AxumMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(other) => {
                        trace!(?other, "Ignoring non-text telephony frame");
                        None
                    }
                    Err(e) => Some(Err(LinkError::Transport(e.to_string()))),
                })
            });
        Self::new(Box::pin(sink), Box::pin(stream))
    }

    /// Adapts the client socket opened to the realtime endpoint.
    pub fn from_tungstenite(socket: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        let (tx, rx) = socket.split();
        let sink = tx
            .sink_map_err(|e| LinkError::Transport(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, LinkError>(WsMessage::Text(text.into()))));
        let stream = rx
            .take_while(|msg| future::ready(!matches!(msg, Ok(WsMessage::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(WsMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(other) => {
                        trace!(?other, "Ignoring non-text realtime frame");
                        None
                    }
                    Err(e) => Some(Err(LinkError::Transport(e.to_string()))),
                })
            });
        Self::new(Box::pin(sink), Box::pin(stream))
    }
}
