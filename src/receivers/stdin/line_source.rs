// SPDX-License-Identifier: Apache-2.0

//! Splits a byte stream into text lines.

use crate::receivers::stdin::error::LineSourceError;
use std::io::ErrorKind;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Read buffer size. Lines longer than this are assembled over several reads.
const READ_BUF_SIZE: usize = 8 * 1024;

/// Pull-based line reader over an async byte stream.
///
/// Both `\n` and `\r\n` terminate a line and are stripped. A final line
/// without a terminator is still returned once the stream closes. Bytes that
/// are not valid UTF-8 are replaced, the line itself is never rejected.
pub struct LineSource<R> {
    reader: BufReader<R>,
    max_line_bytes: usize,
    lines_read: u64,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineSource<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_BUF_SIZE, reader),
            max_line_bytes,
            lines_read: 0,
            pending: Vec::new(),
        }
    }

    /// Number of lines returned so far
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Returns the next line, or `None` once the stream has closed.
    ///
    /// Cancel safe: bytes of a partially read line are kept and the next call
    /// continues where the cancelled one stopped.
    pub async fn next_line(&mut self) -> Result<Option<String>, LineSourceError> {
        loop {
            let available = match self.reader.fill_buf().await {
                Ok(buf) => buf,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(LineSourceError::Io(e)),
            };

            if available.is_empty() {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return self.take_line().map(Some);
            }

            match available.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.pending.extend_from_slice(&available[..pos]);
                    self.reader.consume(pos + 1);
                    return self.take_line().map(Some);
                }
                None => {
                    let len = available.len();
                    self.pending.extend_from_slice(available);
                    self.reader.consume(len);

                    // One extra byte of room for a '\r' whose '\n' has not arrived yet
                    if self.pending.len() > self.max_line_bytes + 1 {
                        return Err(self.line_too_long());
                    }
                }
            }
        }
    }

    fn take_line(&mut self) -> Result<String, LineSourceError> {
        let mut bytes = std::mem::take(&mut self.pending);
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }

        if bytes.len() > self.max_line_bytes {
            return Err(self.line_too_long());
        }

        self.lines_read += 1;
        Ok(match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    fn line_too_long(&self) -> LineSourceError {
        LineSourceError::LineTooLong {
            line: self.lines_read + 1,
            max_line_bytes: self.max_line_bytes,
        }
    }
}
