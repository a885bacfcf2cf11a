// SPDX-License-Identifier: Apache-2.0

//! Resumable reader for a single day's log file.
//!
//! A `SegmentReader` starts at a persisted byte offset and yields batches of
//! completed lines, each paired with the offset just past the last delimiter it
//! consumed. Lines that straddle two reads are carried over and completed by the
//! next one. Persisting a batch's offset therefore never splits a line.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use crate::receivers::gamelog::error::{Error, Result};

/// Size of each read from the log file
pub const READ_BUFFER_SIZE: usize = 128 * 1024;

/// Lines completed by one read, plus the offset to persist once they are delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineBatch {
    pub lines: Vec<String>,
    pub offset: u64,
}

/// SegmentReader reads new lines from one file, starting at a given offset
pub struct SegmentReader {
    /// Path to the file
    path: PathBuf,
    /// The open file handle
    file: File,
    /// Read buffer, reused across reads
    buffer: Vec<u8>,
    /// Bytes of an unfinished line from previous reads
    carry: Vec<u8>,
    /// Offset of the next byte to read from the file
    read_offset: u64,
    /// Offset just past the last consumed delimiter
    committed: u64,
    /// Whether the reader has finished (EOF or stopped)
    done: bool,
}

impl SegmentReader {
    /// Open `path` at `offset`. A missing file is not an error: logs for a
    /// day that hasn't been written yet simply don't exist.
    pub async fn open(path: impl AsRef<Path>, offset: u64) -> Result<Option<Self>> {
        Self::with_buffer_size(path, offset, READ_BUFFER_SIZE).await
    }

    /// Open with a custom read size
    pub async fn with_buffer_size(
        path: impl AsRef<Path>,
        offset: u64,
        buffer_size: usize,
    ) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let mut file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = ?path, "Log file does not exist");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let actual = file.seek(SeekFrom::Start(offset)).await?;
        if actual != offset {
            return Err(Error::SeekMismatch {
                path,
                requested: offset,
                actual,
            });
        }

        Ok(Some(Self {
            path,
            file,
            buffer: vec![0; buffer_size.max(1)],
            carry: Vec::new(),
            read_offset: offset,
            committed: offset,
            done: false,
        }))
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset just past the last line handed out
    pub fn offset(&self) -> u64 {
        self.committed
    }

    /// Read until at least one delimiter has been consumed and return the
    /// completed lines. `stop` is checked before every read; once it returns
    /// true the reader is finished and yields nothing more.
    ///
    /// At EOF, bytes without a trailing delimiter are returned as a final
    /// single-line batch whose offset is the end of the file.
    pub async fn next_batch<F>(&mut self, stop: F) -> Result<Option<LineBatch>>
    where
        F: Fn() -> bool,
    {
        loop {
            if self.done {
                return Ok(None);
            }

            if stop() {
                debug!(path = ?self.path, "Reader stopped");
                self.done = true;
                return Ok(None);
            }

            let read = self.file.read(&mut self.buffer).await?;
            if read == 0 {
                self.done = true;
                return Ok(self.flush_tail());
            }

            let chunk_start = self.read_offset;
            self.read_offset += read as u64;

            let (lines, consumed) = split_chunk(&self.buffer[..read], &mut self.carry);
            if let Some(consumed) = consumed {
                self.committed = chunk_start + consumed as u64;
                return Ok(Some(LineBatch {
                    lines,
                    offset: self.committed,
                }));
            }
        }
    }

    fn flush_tail(&mut self) -> Option<LineBatch> {
        if self.carry.is_empty() {
            return None;
        }

        let line = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        self.committed = self.read_offset;

        warn!(
            path = ?self.path,
            offset = self.committed,
            line = %line,
            "Log file has no trailing line terminator"
        );

        Some(LineBatch {
            lines: vec![line],
            offset: self.committed,
        })
    }
}

/// Split a chunk on `\n` / `\r`, completing any carried-over prefix.
///
/// Returns the completed lines and the number of chunk bytes consumed up to
/// and including the last delimiter, or `None` if the chunk had no delimiter.
/// Zero-length runs between delimiters are skipped. Bytes after the last
/// delimiter are appended to `carry`.
fn split_chunk(chunk: &[u8], carry: &mut Vec<u8>) -> (Vec<String>, Option<usize>) {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut consumed = None;

    for (i, b) in chunk.iter().enumerate() {
        if *b != b'\n' && *b != b'\r' {
            continue;
        }

        consumed = Some(i + 1);
        let segment = &chunk[start..i];

        if carry.is_empty() {
            if !segment.is_empty() {
                lines.push(String::from_utf8_lossy(segment).into_owned());
            }
        } else {
            carry.extend_from_slice(segment);
            lines.push(String::from_utf8_lossy(carry).into_owned());
            carry.clear();
        }

        start = i + 1;
    }

    if start < chunk.len() {
        carry.extend_from_slice(&chunk[start..]);
    }

    (lines, consumed)
}
