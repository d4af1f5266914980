use std::io;

use thiserror::Error;

use crate::serial::error::SerialPortError;

/// Errors that may occur in this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The device could not be opened.
    #[error("Could not open device at `{path}`. Problem: {problem}")]
    DeviceOpen {
        /// Where we tried to open the device.
        path: String,

        /// What went wrong.
        problem: String,
    },

    /// The listening socket could not be bound.
    #[error("Could not listen on `{address}`")]
    Bind {
        /// The address we tried to bind.
        address: String,

        /// The underlying problem.
        #[source]
        source: io::Error,
    },

    /// The device stopped producing lines.
    #[error("The device stream ended")]
    DeviceClosed,

    /// Reading from or writing to the device failed.
    #[error("Device problem")]
    Device(#[from] SerialPortError),

    /// The task writing to the device is gone,
    /// so lines can no longer be put on the wire.
    #[error("The device writer has stopped")]
    DeviceWriterGone,

    /// The configuration is not usable.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// A configuration file could not be read.
    #[error("Could not read configuration file")]
    ConfigIo(#[source] io::Error),

    /// A configuration file could not be parsed.
    #[error("Could not parse configuration")]
    ConfigParse(#[from] ron::error::SpannedError),
}

impl Error {
    /// Get the message of a [`Error::BadConfig`], if that's what this is.
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(v) = self {
            Ok(v)
        } else {
            Err(self)
        }
    }
}
