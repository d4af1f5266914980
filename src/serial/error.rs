use std::{io, string};

use thiserror::Error;

/// Problems reading or writing a line stream.
#[derive(Debug, Error)]
pub enum SerialPortError {
    /// IO related errors.
    #[error("Underlying IO problem")]
    IO(#[from] io::Error),

    /// Utf8 related errors.
    #[error("Problem with UTF8 conversion")]
    Utf8(#[from] string::FromUtf8Error),

    /// A line grew past the configured maximum without a delimiter.
    #[error("Line exceeded {0} bytes without a delimiter")]
    LineTooLong(usize),
}
