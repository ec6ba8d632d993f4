//! Fixed-size message framing.
//!
//! Every message is exactly [`FRAME_LEN`] bytes:
//!
//! ```text
//! +----------------------+-----------------+
//! | text (UTF-8, no NUL) | NUL padding ... |
//! +----------------------+-----------------+
//! ```
//!
//! [`Frame`] is the in-memory form. [`FrameReader`] and [`FrameWriter`]
//! move frames over blocking streams; the non-blocking server side
//! accumulates frames itself.

use std::borrow::Cow;
use std::fmt;
use std::io::{ErrorKind, Read, Write};

use chatdir_core::{truncate_bytes, until_nul};

use crate::error::{ProtocolError, ProtocolResult};
use crate::{FRAME_LEN, MAX_TEXT_LEN};

/// One wire message: [`FRAME_LEN`] bytes, NUL padded.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// A frame with no text.
    pub const EMPTY: Frame = Frame([0; FRAME_LEN]);

    /// Builds a frame from raw bytes, copying at most [`FRAME_LEN`] of them.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; FRAME_LEN];
        let len = bytes.len().min(FRAME_LEN);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self(buf)
    }

    /// Builds a frame from text, cut to [`MAX_TEXT_LEN`] bytes so at least
    /// one NUL always terminates it.
    pub fn from_text(text: &str) -> Self {
        let (text, _) = truncate_bytes(text, MAX_TEXT_LEN);
        Self::from_bytes(text.as_bytes())
    }

    /// All [`FRAME_LEN`] bytes, padding included.
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// The bytes before the first NUL.
    pub fn payload(&self) -> &[u8] {
        until_nul(&self.0)
    }

    /// The frame text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.payload())
    }

    /// True if the frame carries no text.
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl From<[u8; FRAME_LEN]> for Frame {
    fn from(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Frame").field(&self.text()).finish()
    }
}

/// Reads whole frames from a blocking byte stream.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: Read> FrameReader<R> {
    /// Creates a new FrameReader wrapping the given reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads a single frame.
    ///
    /// Returns `Ok(None)` on a clean EOF at a frame boundary and
    /// [`ProtocolError::IncompleteFrame`] if the stream ends mid-frame.
    pub fn read_frame(&mut self) -> ProtocolResult<Option<Frame>> {
        let mut buf = [0u8; FRAME_LEN];
        let mut filled = 0;
        while filled < FRAME_LEN {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(ProtocolError::IncompleteFrame {
                        expected: FRAME_LEN,
                        received: filled,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(Frame(buf)))
    }
}

/// Writes whole frames to a blocking byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    /// Creates a new FrameWriter wrapping the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a single frame.
    pub fn write_frame(&mut self, frame: &Frame) -> ProtocolResult<()> {
        self.writer.write_all(frame.as_bytes())?;
        Ok(())
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> ProtocolResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn text_is_nul_padded() {
        let frame = Frame::from_text("cl");
        assert_eq!(&frame.as_bytes()[..3], b"cl\0");
        assert!(frame.as_bytes()[2..].iter().all(|&b| b == 0));
        assert_eq!(frame.text(), "cl");
    }

    #[test]
    fn overlong_text_keeps_a_terminator() {
        let long = "x".repeat(150);
        let frame = Frame::from_text(&long);
        assert_eq!(frame.payload().len(), MAX_TEXT_LEN);
        assert_eq!(frame.as_bytes()[FRAME_LEN - 1], 0);
    }

    #[test]
    fn raw_bytes_may_fill_the_frame() {
        let frame = Frame::from_bytes(&[b'a'; 120]);
        assert_eq!(frame.payload().len(), FRAME_LEN);
    }

    #[test]
    fn empty_frame() {
        assert!(Frame::EMPTY.is_empty());
        assert!(Frame::from_text("").is_empty());
        assert!(!Frame::from_text("x").is_empty());
    }

    #[test]
    fn reader_reads_consecutive_frames() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(Frame::from_text("one").as_bytes());
        bytes.extend_from_slice(Frame::from_text("two").as_bytes());

        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_frame().unwrap().unwrap().text(), "one");
        assert_eq!(reader.read_frame().unwrap().unwrap().text(), "two");
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn reader_rejects_truncated_frame() {
        let bytes = Frame::from_text("half").as_bytes()[..40].to_vec();
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.read_frame(),
            Err(ProtocolError::IncompleteFrame { received: 40, .. })
        ));
    }

    #[test]
    fn writer_emits_full_frames() {
        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            writer.write_frame(&Frame::from_text("hi")).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(buffer.len(), FRAME_LEN);
        assert_eq!(&buffer[..2], b"hi");
    }
}
