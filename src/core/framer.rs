// src/core/framer.rs

//! Bounded line framing over any byte source.
//!
//! [`LineFramer`] owns a fixed buffer sized for the longest accepted line plus
//! its terminator. Bytes are read into the free tail; complete lines are cut
//! from the front. A line that cannot fit is discarded up to its terminator
//! and reported once as [`FrameEvent::Overlong`], after which framing resumes
//! with whatever followed it.
//!
//! The caller alternates between [`LineFramer::next_event`], until it returns
//! `None`, and [`LineFramer::fill_from`], until that reports end of input, then
//! calls [`LineFramer::finish`] once.

use std::io::{self, ErrorKind, Read};
use thiserror::Error;

const TERMINATOR: u8 = b'\n';

/// Unrecoverable input failures.
#[derive(Error, Debug)]
pub enum FramerError {
    #[error("Failed to read input: {0}")]
    Read(#[from] io::Error),
}

/// Something the framer has to say about the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A complete line, without its terminator. Bytes are passed through
    /// untouched, whatever their encoding.
    Line(Vec<u8>),
    /// A line longer than the limit was dropped.
    Overlong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramerState {
    /// Collecting bytes of a line that still fits.
    Accumulating,
    /// Dropping the rest of an over-length line until its terminator.
    Recovering,
}

/// Incremental line splitter with a fixed maximum line length.
///
/// Invariant: `consumed <= scanned <= filled <= buffer.len()`. Bytes before
/// `consumed` belong to lines already delivered; bytes in
/// `consumed..scanned` are known to contain no terminator.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Box<[u8]>,
    consumed: usize,
    filled: usize,
    scanned: usize,
    state: FramerState,
}

impl LineFramer {
    /// Creates a framer accepting lines of up to `max_line_length` bytes.
    pub fn new(max_line_length: usize) -> Self {
        let capacity = max_line_length.saturating_add(1).max(2);
        Self {
            buffer: vec![0; capacity].into_boxed_slice(),
            consumed: 0,
            filled: 0,
            scanned: 0,
            state: FramerState::Accumulating,
        }
    }

    /// Longest line this framer delivers.
    pub fn max_line_length(&self) -> usize {
        self.buffer.len() - 1
    }

    /// Cuts the next event out of the bytes already buffered, if any.
    pub fn next_event(&mut self) -> Option<FrameEvent> {
        let unscanned = self.buffer.get(self.scanned..self.filled).unwrap_or_default();
        let Some(offset) = unscanned.iter().position(|&b| b == TERMINATOR) else {
            self.scanned = self.filled;
            if self.state == FramerState::Recovering {
                // Nothing here belongs to a deliverable line.
                self.consumed = self.filled;
            }
            return None;
        };

        let end = self.scanned + offset;
        let start = self.consumed;
        self.consumed = end + 1;
        self.scanned = self.consumed;

        match self.state {
            FramerState::Accumulating => {
                let line = self.buffer.get(start..end).unwrap_or_default().to_vec();
                log::trace!("Framed a line of {} bytes.", line.len());
                Some(FrameEvent::Line(line))
            }
            FramerState::Recovering => {
                log::trace!("Found the end of an over-length line; resuming.");
                self.state = FramerState::Accumulating;
                Some(FrameEvent::Overlong)
            }
        }
    }

    /// Reads more input into the buffer, making room first. Returns the number
    /// of bytes read; zero means end of input.
    ///
    /// Reads interrupted by a signal are retried.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> Result<usize, FramerError> {
        self.make_room();

        let free = self.buffer.get_mut(self.filled..).unwrap_or_default();
        let read = loop {
            match reader.read(free) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    log::trace!("Read interrupted by a signal; retrying.");
                }
                Err(e) => return Err(FramerError::Read(e)),
            }
        };

        self.filled += read;
        Ok(read)
    }

    /// Flushes whatever is left at end of input: an unterminated last line, or
    /// the report for an over-length line that never ended.
    pub fn finish(&mut self) -> Option<FrameEvent> {
        let event = match self.state {
            FramerState::Recovering => Some(FrameEvent::Overlong),
            FramerState::Accumulating if self.consumed < self.filled => {
                let line = self.buffer.get(self.consumed..self.filled).unwrap_or_default();
                Some(FrameEvent::Line(line.to_vec()))
            }
            FramerState::Accumulating => None,
        };
        self.reset();
        self.state = FramerState::Accumulating;
        event
    }

    fn reset(&mut self) {
        self.consumed = 0;
        self.filled = 0;
        self.scanned = 0;
    }

    /// Guarantees free space at the end of the buffer.
    fn make_room(&mut self) {
        if self.consumed == self.filled {
            self.reset();
        } else if self.filled == self.buffer.len() {
            if self.consumed == 0 {
                // The whole buffer is one unterminated line.
                log::trace!(
                    "Line exceeds {} bytes; discarding until its end.",
                    self.max_line_length()
                );
                self.state = FramerState::Recovering;
                self.reset();
            } else {
                log::trace!("Compacting {} pending bytes.", self.filled - self.consumed);
                self.buffer.copy_within(self.consumed..self.filled, 0);
                self.filled -= self.consumed;
                self.scanned -= self.consumed;
                self.consumed = 0;
            }
        }
    }
}
