//! The shared device.
//!
//! There is exactly one reader of the device (the pump) but any number of writers
//! (one per connected client). Writers never touch the device directly: they hand
//! whole lines to a single writer task which owns the write half, so lines from
//! different clients can never interleave on the wire.

use std::fmt::Debug;

use futures::{stream::BoxStream, SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info_span, trace, Instrument};

use crate::{
    config::Config,
    error::Error,
    serial::{codecs::lines::LinesCodec, error::SerialPortError, serial_port, SerialMessage},
};

/// Lines as they come from the device, delimiters removed.
pub type DeviceLines = BoxStream<'static, Result<SerialMessage, SerialPortError>>;

/// The task putting lines on the wire.
/// Only returns when every [`DeviceWriter`] is gone, or on a write error.
pub type DeviceWriterTask = JoinHandle<Result<(), SerialPortError>>;

/// A cloneable handle for writing lines to the device.
#[derive(Debug, Clone)]
pub struct DeviceWriter {
    lines: mpsc::Sender<SerialMessage>,
}

impl DeviceWriter {
    /// Queue a line for the device.
    /// A single `\n` is appended when it is put on the wire.
    ///
    /// Waits if the device is behind on writing.
    pub async fn write(&self, line: SerialMessage) -> Result<(), Error> {
        self.lines
            .send(line)
            .await
            .map_err(|_| Error::DeviceWriterGone)
    }
}

/// An opened device.
pub struct Device {
    name: String,
    lines: DeviceLines,
    writer: DeviceWriter,
    writer_task: DeviceWriterTask,
}

impl Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("writer", &self.writer)
            .finish()
    }
}

async fn write_lines<W>(
    mut sink: FramedWrite<W, LinesCodec>,
    mut lines: mpsc::Receiver<SerialMessage>,
) -> Result<(), SerialPortError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        trace!(%line, "To device");

        // Sending through the sink also flushes.
        sink.send(line).await?;
    }

    debug!("No writers left");

    Ok(())
}

impl Device {
    /// Wrap any duplex byte stream as a device.
    ///
    /// Spawns the writer task, so this must be called from within a tokio runtime.
    pub fn new<S>(name: impl Into<String>, stream: S, write_capacity: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let name = name.into();
        let (reader, writer) = tokio::io::split(stream);

        let lines = FramedRead::new(reader, LinesCodec::newline()).boxed();
        let sink = FramedWrite::new(writer, LinesCodec::newline());

        let (lines_tx, lines_rx) = mpsc::channel(write_capacity.max(1));

        let writer_task = tokio::spawn(
            write_lines(sink, lines_rx).instrument(info_span!("device-writer", %name)),
        );

        Self {
            name,
            lines,
            writer: DeviceWriter { lines: lines_tx },
            writer_task,
        }
    }

    /// Open the serial port described by the configuration.
    pub fn open(config: &Config) -> Result<Self, Error> {
        let stream = serial_port::open(&config.device)?;

        Ok(Self::new(
            config.device.path.to_string_lossy(),
            stream,
            config.device_write_capacity,
        ))
    }

    /// Some human readable identifier of the device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a writer for the device.
    pub fn writer(&self) -> DeviceWriter {
        self.writer.clone()
    }

    /// Split the device into its line stream, a writer, and the writer task.
    pub fn into_parts(self) -> (DeviceLines, DeviceWriter, DeviceWriterTask) {
        (self.lines, self.writer, self.writer_task)
    }
}
