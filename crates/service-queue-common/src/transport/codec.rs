use std::io::{ErrorKind, Read, Write};

use crate::protocol::error::{BrokerError, Result};
use crate::transport::{Frame, Multipart};

/// Maximum size of a single frame (100 MB).
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Set on every frame except the last frame of a message.
const FLAG_MORE: u8 = 0x01;

const HEADER_LEN: usize = 5;

/// Encoder/decoder for multi-frame messages on a byte stream.
///
/// # Example
///
/// ```
/// use service_queue_common::transport::FrameCodec;
///
/// let mut wire = Vec::new();
/// FrameCodec::write_message(&mut wire, &[b"id".to_vec(), b"body".to_vec()]).unwrap();
///
/// let decoded = FrameCodec::read_message(&mut wire.as_slice()).unwrap();
/// assert_eq!(decoded, Some(vec![b"id".to_vec(), b"body".to_vec()]));
/// ```
pub struct FrameCodec;

impl FrameCodec {
    /// Writes every frame of `frames` and flushes the writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the message has no frames, a frame exceeds
    /// [`MAX_FRAME_SIZE`], or writing fails.
    pub fn write_message<W: Write>(writer: &mut W, frames: &[Frame]) -> Result<()> {
        if frames.is_empty() {
            return Err(BrokerError::InvalidMessage(
                "message must contain at least one frame".to_string(),
            ));
        }

        let last = frames.len() - 1;
        for (index, frame) in frames.iter().enumerate() {
            if frame.len() > MAX_FRAME_SIZE {
                return Err(BrokerError::FrameTooLarge {
                    len: frame.len(),
                    max: MAX_FRAME_SIZE,
                });
            }

            let flags = if index < last { FLAG_MORE } else { 0 };
            let mut header = [0u8; HEADER_LEN];
            header[0] = flags;
            header[1..].copy_from_slice(&(frame.len() as u32).to_be_bytes());

            writer.write_all(&header)?;
            writer.write_all(frame)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Reads frames until one without the `MORE` flag.
    ///
    /// Returns `Ok(None)` if the stream ends cleanly before the first frame
    /// of a message. A stream ending in the middle of a message is an error.
    pub fn read_message<R: Read>(reader: &mut R) -> Result<Option<Multipart>> {
        let mut frames = Vec::new();

        loop {
            let mut header = [0u8; HEADER_LEN];
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof && frames.is_empty() => {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
            if len > MAX_FRAME_SIZE {
                return Err(BrokerError::FrameTooLarge {
                    len,
                    max: MAX_FRAME_SIZE,
                });
            }

            let mut frame = vec![0u8; len];
            reader.read_exact(&mut frame)?;
            frames.push(frame);

            if header[0] & FLAG_MORE == 0 {
                return Ok(Some(frames));
            }
        }
    }
}
