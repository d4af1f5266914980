//! A mock device, useful to run the hub without the actual serial port.
//!
//! The hub gets a regular [`Device`] backed by an in-memory pipe.
//! The other end of the pipe is a [`MockHandle`], which plays the role of the hardware:
//! it can emit lines (which clients will see) and read the lines clients wrote.

use futures::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    device::Device,
    serial::{codecs::lines::LinesCodec, error::SerialPortError, SerialMessage},
};

/// How many bytes may sit in the in-memory pipe in each direction.
const PIPE_BUFFER: usize = 64 * 1024;

/// Builder for a mocked [`Device`].
#[derive(Debug)]
pub struct MockBuilder {
    name: String,
    write_capacity: usize,
}

impl MockBuilder {
    /// Start a new builder.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            write_capacity: 256,
        }
    }

    /// How many client lines may wait to be written to the mock.
    pub fn set_write_capacity(mut self, capacity: usize) -> Self {
        self.write_capacity = capacity;
        self
    }

    /// A device for the hub, and the hardware side of it.
    #[must_use]
    pub fn build(self) -> (Device, MockHandle) {
        info!(%self.name, "Running mock");

        let (hub_side, hardware_side) = tokio::io::duplex(PIPE_BUFFER);

        let device = Device::new(format!("mock:{}", self.name), hub_side, self.write_capacity);

        let handle = MockHandle {
            wire: Framed::new(hardware_side, LinesCodec::newline()),
        };

        (device, handle)
    }

    /// A device which answers every line written to it with that same line.
    ///
    /// Since answers are device output, every client sees them,
    /// including the one that wrote the line.
    #[must_use]
    pub fn build_loopback(self) -> Device {
        let span = info_span!("mock-loopback", name = %self.name);
        let (device, mut handle) = self.build();

        tokio::spawn(
            async move {
                while let Some(line) = handle.next_written().await {
                    debug!(%line, "Looping back");

                    if let Err(e) = handle.emit(line).await {
                        warn!(?e, "Could not loop back");
                        break;
                    }
                }

                warn!("Mock device stopped");
            }
            .instrument(span),
        );

        device
    }
}

/// The hardware side of a mocked device.
///
/// Dropping this ends the device stream, just like unplugging the real thing.
#[derive(Debug)]
pub struct MockHandle {
    wire: Framed<DuplexStream, LinesCodec>,
}

impl MockHandle {
    /// Produce a line, as if the hardware wrote it.
    pub async fn emit<M: Into<SerialMessage>>(&mut self, line: M) -> Result<(), SerialPortError> {
        self.wire.send(line.into()).await
    }

    /// The next line a client wrote to the device.
    /// `None` if the hub side is gone.
    pub async fn next_written(&mut self) -> Option<SerialMessage> {
        match self.wire.next().await {
            Some(Ok(line)) => Some(line),
            Some(Err(e)) => {
                warn!(?e, "Mock read problem");
                None
            }
            None => None,
        }
    }
}
