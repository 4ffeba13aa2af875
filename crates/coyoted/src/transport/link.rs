//! WebSocket write half as a [`DeviceLink`].

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::session::{DeviceLink, LinkError};

/// Sends device frames as WebSocket text messages.
pub struct WsLink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> WsLink<S> {
    pub fn new(sink: SplitSink<WebSocketStream<S>, Message>) -> Self {
        Self { sink }
    }
}

fn link_error(err: WsError) -> LinkError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => LinkError::Closed,
        other => LinkError::Io(other.to_string()),
    }
}

#[async_trait]
impl<S> DeviceLink for WsLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_text(&mut self, text: String) -> Result<(), LinkError> {
        self.sink.send(Message::Text(text)).await.map_err(link_error)
    }

    async fn ping(&mut self) -> Result<(), LinkError> {
        self.sink.send(Message::Ping(Vec::new())).await.map_err(link_error)
    }

    async fn close(&mut self) {
        // The peer may already be gone.
        let _ = self.sink.close().await;
    }
}
