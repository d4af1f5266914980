use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpStream,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use crate::serial::{
    codecs::lines::{LinesCodec, StringCodec},
    error::SerialPortError,
};

fn codec() -> StringCodec {
    LinesCodec::newline().into_string_codec(true)
}

/// The receiving half of a [`HubClient`].
#[derive(Debug)]
pub struct HubReader {
    lines: FramedRead<OwnedReadHalf, StringCodec>,
}

impl HubReader {
    /// The next line the hub sent, without its delimiter.
    /// `None` when the hub closed the connection.
    pub async fn next_line(&mut self) -> Option<Result<String, SerialPortError>> {
        self.lines.next().await
    }
}

/// The sending half of a [`HubClient`].
#[derive(Debug)]
pub struct HubWriter {
    sink: FramedWrite<OwnedWriteHalf, StringCodec>,
}

impl HubWriter {
    /// Send a line to the hub, which forwards it to the device.
    /// A newline is appended.
    pub async fn write_line<S: Into<String>>(&mut self, line: S) -> Result<(), SerialPortError> {
        let line: String = line.into();
        self.sink.send(line).await
    }
}

/// A connection to a running hub.
#[derive(Debug)]
pub struct HubClient {
    reader: HubReader,
    writer: HubWriter,
}

impl HubClient {
    /// Connect to a hub.
    pub async fn new(address: &str, port: u16) -> Result<Self, SerialPortError> {
        let stream = TcpStream::connect((address, port)).await?;
        Ok(Self::from_stream(stream))
    }

    /// Connect to a hub at a known socket address.
    pub async fn connect(addr: SocketAddr) -> Result<Self, SerialPortError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: TcpStream) -> Self {
        if let Ok(addr) = stream.local_addr() {
            debug!(%addr, "Connected to hub");
        }

        let (reader, writer) = stream.into_split();

        Self {
            reader: HubReader {
                lines: FramedRead::new(reader, codec()),
            },
            writer: HubWriter {
                sink: FramedWrite::new(writer, codec()),
            },
        }
    }

    /// See [`HubReader::next_line`].
    pub async fn next_line(&mut self) -> Option<Result<String, SerialPortError>> {
        self.reader.next_line().await
    }

    /// See [`HubWriter::write_line`].
    pub async fn write_line<S: Into<String>>(&mut self, line: S) -> Result<(), SerialPortError> {
        self.writer.write_line(line).await
    }

    /// Split into halves which can be used from different tasks.
    pub fn into_split(self) -> (HubReader, HubWriter) {
        (self.reader, self.writer)
    }
}
