//! Connection seam between the channel state machine and the network.
//!
//! The driver only sees [`Connector`] and [`Transport`]. Production code
//! plugs in [`WsConnector`], which opens a real WebSocket through
//! [`crate::ws`]; tests plug in scripted fakes.

use anyhow::Result;
use async_trait::async_trait;

use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// One open notification channel.
#[async_trait]
pub trait Transport: Send + std::fmt::Debug {
    /// Next inbound frame, `None` once the stream has ended.
    ///
    /// Must be cancel-safe: the driver drops a pending `recv` whenever
    /// another event wins the `select!`.
    async fn recv(&mut self) -> Option<Result<WsMessage>>;

    /// Answer a server ping.
    async fn send_pong(&mut self, data: Vec<u8>) -> Result<()>;

    /// Close the channel with `code` and `reason`.
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

/// Opens transports. Called once per connect attempt.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Open a channel to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// [`Transport`] over a `tokio-tungstenite` WebSocket.
#[derive(Debug)]
pub struct WsTransport {
    writer: WsWriter,
    reader: WsReader,
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<Result<WsMessage>> {
        self.reader.recv().await
    }

    async fn send_pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.writer.send_pong(data).await
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.writer.close(code, reason).await
    }
}

/// [`Connector`] that opens real WebSocket connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

const USER_AGENT: &str = concat!("campus-connect/", env!("CARGO_PKG_VERSION"));

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let (writer, reader) = ws::connect(url, &[("User-Agent", USER_AGENT)]).await?;
        Ok(Box::new(WsTransport { writer, reader }))
    }
}
