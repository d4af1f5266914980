use std::fmt::Display;

use bytes::Bytes;

/// Serial port related errors.
pub mod error;

/// Opening the serial port.
pub mod serial_port;

/// Codecs for encoding/decoding messages to/from wire.
pub mod codecs;

/// One line of text, without its delimiter.
///
/// Cheap to clone, since the same line is handed to every connected client.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SerialMessage(Bytes);

impl SerialMessage {
    /// Create a message from raw bytes.
    pub fn new<B: Into<Bytes>>(bytes: B) -> Self {
        Self(bytes.into())
    }

    /// Borrow the line's bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Turn the message into its underlying bytes.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// The line as text, replacing any bad utf8.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    /// The number of bytes in the line.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the line is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SerialMessage {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for SerialMessage {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<Vec<u8>> for SerialMessage {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl Display for SerialMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = String::from_utf8_lossy(&self.0)
            .chars()
            .take(48)
            .collect::<String>();

        write!(f, "{}", s.trim())
    }
}
