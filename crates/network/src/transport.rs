// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Transport seam over a duplex framed stream.
//!
//! The connection loop only ever sees [`Transport`], [`TransportSink`] and
//! [`TransportStream`] trait objects, keeping tungstenite out of everything
//! above this module. The production implementation is
//! [`TungsteniteTransport`]; tests substitute their own.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderName, HeaderValue},
    },
};

use crate::error::{WsError, WsResult};

/// A single frame on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A UTF-8 text frame.
    Text(String),
    /// A binary frame.
    Binary(Vec<u8>),
    /// A keepalive ping with its payload.
    Ping(Vec<u8>),
    /// A keepalive pong with its payload.
    Pong(Vec<u8>),
    /// A close frame.
    Close,
}

impl Frame {
    /// Returns the text payload if this is a text frame.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Opens duplex framed connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a connection to `url`, returning the sink and stream halves.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> WsResult<(Box<dyn TransportSink>, Box<dyn TransportStream>)>;
}

/// The outbound half of an open connection.
#[async_trait]
pub trait TransportSink: Send {
    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    async fn send(&mut self, frame: Frame) -> WsResult<()>;

    /// Closes the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    async fn close(&mut self) -> WsResult<()>;
}

/// The inbound half of an open connection.
#[async_trait]
pub trait TransportStream: Send {
    /// Receives the next frame, blocking until one arrives.
    ///
    /// Returns `None` when the stream has ended.
    async fn next(&mut self) -> Option<WsResult<Frame>>;
}

fn message_into_frame(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text.to_string())),
        Message::Binary(data) => Some(Frame::Binary(data.to_vec())),
        Message::Ping(data) => Some(Frame::Ping(data.to_vec())),
        Message::Pong(data) => Some(Frame::Pong(data.to_vec())),
        Message::Close(_) => Some(Frame::Close),
        Message::Frame(_) => None,
    }
}

fn frame_into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data.into()),
        Frame::Ping(data) => Message::Ping(data.into()),
        Frame::Pong(data) => Message::Pong(data.into()),
        Frame::Close => Message::Close(None),
    }
}

/// Production [`Transport`] backed by `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteTransport;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

struct TungsteniteSink {
    inner: WsSink,
}

struct TungsteniteStream {
    inner: WsStream,
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> WsResult<(Box<dyn TransportSink>, Box<dyn TransportStream>)> {
        let mut request = url.into_client_request().map_err(WsError::from)?;
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WsError::Protocol(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| WsError::Protocol(format!("invalid header value: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let (ws, _response) = connect_async(request).await.map_err(WsError::from)?;
        let (sink, stream) = ws.split();

        Ok((
            Box::new(TungsteniteSink { inner: sink }),
            Box::new(TungsteniteStream { inner: stream }),
        ))
    }
}

#[async_trait]
impl TransportSink for TungsteniteSink {
    async fn send(&mut self, frame: Frame) -> WsResult<()> {
        self.inner
            .send(frame_into_message(frame))
            .await
            .map_err(WsError::from)
    }

    async fn close(&mut self) -> WsResult<()> {
        self.inner.close().await.map_err(WsError::from)
    }
}

#[async_trait]
impl TransportStream for TungsteniteStream {
    async fn next(&mut self) -> Option<WsResult<Frame>> {
        loop {
            match self.inner.next().await? {
                Ok(message) => {
                    if let Some(frame) = message_into_frame(message) {
                        return Some(Ok(frame));
                    }
                    // Raw frames are surfaced only with special flags; skip
                }
                Err(e) => return Some(Err(WsError::from(e))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_text_frame_round_trip() {
        let frame = Frame::Text("{\"op\":\"ping\"}".to_string());
        let message = frame_into_message(frame.clone());
        assert_eq!(message_into_frame(message), Some(frame));
    }

    #[rstest]
    fn test_binary_frame_round_trip() {
        let frame = Frame::Binary(vec![1, 2, 3]);
        let message = frame_into_message(frame.clone());
        assert_eq!(message_into_frame(message), Some(frame));
    }

    #[rstest]
    fn test_close_maps_to_close_frame() {
        assert_eq!(
            message_into_frame(Message::Close(None)),
            Some(Frame::Close)
        );
    }

    #[rstest]
    fn test_as_text() {
        assert_eq!(
            Frame::Text("hello".to_string()).as_text(),
            Some("hello")
        );
        assert_eq!(Frame::Binary(vec![0]).as_text(), None);
    }
}
