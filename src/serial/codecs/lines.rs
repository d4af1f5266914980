use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::serial::{error::SerialPortError, SerialMessage};

/// Lines longer than this without a delimiter are treated as a broken stream.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// This codec has a configurable delimiter character for reading,
/// and optionally adds a character to each line it encodes.
#[derive(Debug, Clone)]
pub struct LinesCodec {
    /// How far we have looked for a newline into the buffer
    cursor: usize,

    /// How to delimit incoming byte streams.
    /// This delimiter is not included in the yielded frames.
    read_delimiter: u8,

    /// If provided, which byte to append when writing (encoding) messages.
    /// If `None`, forwards the data as-is.
    write_delimiter: Option<u8>,

    /// Drop a `\r` directly before the read delimiter.
    strip_carriage_return: bool,

    max_length: usize,
}

impl LinesCodec {
    /// Create a new codec.
    pub fn new(read_delimiter: u8, write_delimiter: Option<u8>) -> Self {
        Self {
            cursor: 0,
            read_delimiter,
            write_delimiter,
            strip_carriage_return: false,
            max_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Newline delimited in both directions, tolerating `\r\n` on read.
    /// This is what the hub speaks to both the device and clients.
    pub fn newline() -> Self {
        Self::new(b'\n', Some(b'\n')).strip_carriage_return(true)
    }

    /// Whether a `\r` right before the read delimiter should be discarded.
    pub fn strip_carriage_return(mut self, strip: bool) -> Self {
        self.strip_carriage_return = strip;
        self
    }

    /// Set how long a line may grow before decoding fails.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Return a [StringCodec], which does the same thing as the underlying [LinesCodec].
    /// The difference is that it reads strings instead of [`SerialMessage`]s.
    /// It is configurable whether bad utf8 should result in an error,
    /// or be replaced with some lossy character.
    pub fn into_string_codec(self, lossy: bool) -> StringCodec {
        StringCodec {
            lossy,
            wrapped: self,
        }
    }

    fn take_line(&self, mut line: BytesMut) -> SerialMessage {
        if self.strip_carriage_return && line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }

        SerialMessage::new(line.freeze())
    }
}

impl Default for LinesCodec {
    fn default() -> Self {
        Self::new(b'\n', None)
    }
}

impl Decoder for LinesCodec {
    type Item = SerialMessage;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let read_to = src.len();

        let look_at = &src[self.cursor.min(read_to)..read_to];

        if let Some(position) = look_at.iter().position(|&byte| byte == self.read_delimiter) {
            // Since we might "start late" in the buffer (from the cursor),
            // the "global" position within the buffer has to be calculated.
            let actual_position = self.cursor + position;

            // Next time we need to start over.
            self.cursor = 0;

            // Split at the delimiter, getting the bytes before it.
            let line = src.split_to(actual_position);

            // Discard the delimiter by advancing the source buffer beyond it.
            src.advance(1);

            Ok(Some(self.take_line(line)))
        } else if read_to > self.max_length {
            Err(SerialPortError::LineTooLong(self.max_length))
        } else {
            // We did not find a full frame.
            // The next time we are called the same buffer `src` will be provided to us (same starting point),
            // but possibly with more data.
            // Since our job is to find the delimiter, we don't need to re-read the bytes we have already looked at.
            self.cursor = read_to;

            // Indicate that we need more bytes to look at.
            Ok(None)
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        // A final line without a delimiter is still a line.
        if src.is_empty() {
            Ok(None)
        } else {
            self.cursor = 0;
            let line = src.split_to(src.len());
            Ok(Some(self.take_line(line)))
        }
    }
}

impl Encoder<SerialMessage> for LinesCodec {
    type Error = SerialPortError;

    fn encode(&mut self, item: SerialMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 1);
        dst.extend_from_slice(item.as_bytes());

        if let Some(character) = self.write_delimiter {
            dst.extend_from_slice(&[character]);
        }
        Ok(())
    }
}

/// This does the same thing as the underlying [LinesCodec].
/// The difference is that it reads strings, and it is configurable whether bad utf8
/// should result in an error, or be replaced with some lossy character.
///
/// It can write and read strings.
#[derive(Debug, Clone)]
pub struct StringCodec {
    lossy: bool,
    wrapped: LinesCodec,
}

impl Decoder for StringCodec {
    type Item = String;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let line = self.wrapped.decode(src)?;
        line.map(|line| self.stringify(line)).transpose()
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let line = self.wrapped.decode_eof(src)?;
        line.map(|line| self.stringify(line)).transpose()
    }
}

impl StringCodec {
    fn stringify(&self, line: SerialMessage) -> Result<String, SerialPortError> {
        if self.lossy {
            Ok(line.to_string_lossy())
        } else {
            Ok(String::from_utf8(line.into_bytes().to_vec())?)
        }
    }
}

impl Encoder<String> for StringCodec {
    type Error = SerialPortError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.wrapped.encode(SerialMessage::from(item), dst)
    }
}

impl Encoder<SerialMessage> for StringCodec {
    type Error = SerialPortError;

    fn encode(&mut self, item: SerialMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.wrapped.encode(item, dst)
    }
}
