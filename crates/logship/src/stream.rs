// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line tap over a job's output stream.
//!
//! [`LineTap`] sits between the job and wherever its output goes. Bytes are
//! buffered up to each `\n`; the whole line, terminator included, is then
//! forwarded and flushed exactly as written before a cleaned copy is shipped.
//! What the job's own output shows never depends on shipping.
//!
//! A `write` that fails part way reports only the lines it forwarded, so a
//! caller retrying the rest never duplicates output. Dropping the tap closes
//! it.

use std::io::{self, Write};

use tracing::debug;

use crate::console::strip_markers;
use crate::writer::LogWriter;

pub struct LineTap<W: Write> {
    /// Taken only by [`LineTap::finish`].
    inner: Option<W>,
    buffer: Vec<u8>,
    writer: Option<LogWriter>,
    closed: bool,
}

fn released() -> io::Error {
    io::Error::other("line tap no longer owns its stream")
}

impl<W: Write> LineTap<W> {
    pub fn new(inner: W, writer: LogWriter) -> Self {
        Self {
            inner: Some(inner),
            buffer: Vec::new(),
            writer: Some(writer),
            closed: false,
        }
    }

    /// A tap that forwards without shipping anything.
    pub fn passthrough(inner: W) -> Self {
        Self {
            inner: Some(inner),
            buffer: Vec::new(),
            writer: None,
            closed: false,
        }
    }

    pub fn writer_mut(&mut self) -> Option<&mut LogWriter> {
        self.writer.as_mut()
    }

    /// Forwards and ships any unterminated trailing bytes, then closes the
    /// writer. The writer stays readable through [`LineTap::writer_mut`].
    pub fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        let result = if self.buffer.is_empty() {
            self.flush_inner()
        } else {
            self.forward().and_then(|line| {
                let flushed = self.flush_inner();
                self.ship(&line);
                flushed
            })
        };
        if let Some(writer) = self.writer.as_mut() {
            writer.close();
        }
        result
    }

    /// Closes the tap and hands back the wrapped stream.
    pub fn finish(mut self) -> io::Result<W> {
        self.close()?;
        self.inner.take().ok_or_else(released)
    }

    /// Writes the buffered line to the wrapped stream. The buffer is kept when
    /// that fails.
    fn forward(&mut self) -> io::Result<Vec<u8>> {
        let inner = self.inner.as_mut().ok_or_else(released)?;
        inner.write_all(&self.buffer)?;
        Ok(std::mem::take(&mut self.buffer))
    }

    fn flush_inner(&mut self) -> io::Result<()> {
        self.inner.as_mut().ok_or_else(released)?.flush()
    }

    fn ship(&mut self, line: &[u8]) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if writer.is_broken() {
            return;
        }
        let text = strip_markers(&String::from_utf8_lossy(line));
        let text = text.trim();
        if !text.is_empty() {
            writer.write_line(text);
        }
    }
}

impl<W: Write> Write for LineTap<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut consumed = 0;
        while let Some(pos) = buf[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + pos + 1;
            let pending = self.buffer.len();
            self.buffer.extend_from_slice(&buf[consumed..end]);

            let line = match self.forward() {
                Ok(line) => line,
                Err(e) => {
                    self.buffer.truncate(pending);
                    return if consumed == 0 { Err(e) } else { Ok(consumed) };
                }
            };
            consumed = end;

            let flushed = self.flush_inner();
            self.ship(&line);
            if let Err(e) = flushed {
                debug!("LOGSHIP | Unable to flush forwarded output: {e}");
                return Ok(consumed);
            }
        }
        self.buffer.extend_from_slice(&buf[consumed..]);
        Ok(buf.len())
    }

    /// Flushes the wrapped stream. A partial line stays buffered until its
    /// terminator arrives or the tap is closed.
    fn flush(&mut self) -> io::Result<()> {
        self.flush_inner()
    }
}

impl<W: Write> Drop for LineTap<W> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.close() {
            debug!("LOGSHIP | Unable to close line tap: {e}");
        }
    }
}
