//! A buffered, peekable byte-stream reader.
//!
//! Frame resynchronisation needs backtracking: after adopting a marker byte
//! the reader inspects a whole candidate frame, and on a CRC mismatch must
//! rescan the very same bytes for the next marker. [`std::io::BufRead`]
//! cannot request more data without consuming what is buffered, so this type
//! keeps its own buffer and separates `peek_exact` (top up, don't consume)
//! from `consume` (commit).

use std::io::Read;

use crate::error::MessageReadError;

/// Wraps a [`Read`] with an internal buffer sized for the largest possible
/// frame (`MAX_FRAME_SIZE`).
pub struct PeekReader<R, const BUFFER_SIZE: usize = 280> {
    buffer: [u8; BUFFER_SIZE],
    // next byte handed out
    cursor: usize,
    // next free slot
    top: usize,
    reader: R,
}

impl<R: Read, const BUFFER_SIZE: usize> PeekReader<R, BUFFER_SIZE> {
    pub fn new(reader: R) -> Self {
        Self {
            buffer: [0; BUFFER_SIZE],
            cursor: 0,
            top: 0,
            reader,
        }
    }

    /// Returns `amount` bytes without consuming them, reading from the
    /// underlying stream as needed. EOF before `amount` bytes are available
    /// is an `UnexpectedEof` error.
    pub fn peek_exact(&mut self, amount: usize) -> Result<&[u8], MessageReadError> {
        self.fetch(amount, false)
    }

    /// Returns and consumes `amount` bytes. No data is consumed on error.
    pub fn read_exact(&mut self, amount: usize) -> Result<&[u8], MessageReadError> {
        self.fetch(amount, true)
    }

    pub fn read_u8(&mut self) -> Result<u8, MessageReadError> {
        let buf = self.read_exact(1)?;
        Ok(buf[0])
    }

    /// Consumes up to `amount` already-buffered bytes.
    pub fn consume(&mut self, amount: usize) -> usize {
        let amount = amount.min(self.top - self.cursor);
        self.cursor += amount;
        amount
    }

    fn fetch(&mut self, amount: usize, consume: bool) -> Result<&[u8], MessageReadError> {
        loop {
            let buffered = self.top - self.cursor;

            if buffered >= amount {
                break;
            }

            let bytes_to_read = amount - buffered;
            assert!(bytes_to_read < BUFFER_SIZE);

            // compact before the buffer tail runs out
            if self.top + bytes_to_read > BUFFER_SIZE {
                self.buffer.copy_within(self.cursor..self.top, 0);
                self.top = buffered;
                self.cursor = 0;
            }

            let end_pos = self.top + bytes_to_read;
            let bytes_read = self.reader.read(&mut self.buffer[self.top..end_pos])?;

            if bytes_read == 0 {
                return Err(MessageReadError::eof());
            }

            self.top += bytes_read;
        }

        let result = &self.buffer[self.cursor..self.cursor + amount];
        if consume {
            self.cursor += amount;
        }
        Ok(result)
    }
}
