//! Trace file iterators.
//!
//! Trace files are gzip-compressed newline-delimited text, one instruction
//! per line. Two iterators are provided: [`BufferedTrace`] reads and parses
//! the entire file up front and can be restarted for free, while
//! [`StreamingTrace`] yields one instruction per line and rewinds by
//! reopening the file. Both yield `Result` items so a malformed line aborts
//! the run with its line number.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use thiserror::Error;

use crate::instruction::{Instruction, ParseError};

/// Error raised while reading a trace file.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The file could not be opened or read.
    #[error("trace i/o error: {0}")]
    Io(#[from] io::Error),
    /// A line did not parse as an instruction.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A fully parsed trace, restartable for free.
#[derive(Debug, Clone)]
pub struct BufferedTrace {
    instructions: Vec<Instruction>,
    cursor: usize,
}

impl BufferedTrace {
    /// Reads and parses an entire gzip trace file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(MultiGzDecoder::new(file));
        let mut instructions = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            instructions.push(Instruction::parse(&line, index as u64 + 1)?);
        }
        Ok(BufferedTrace {
            instructions,
            cursor: 0,
        })
    }

    /// Builds a trace from instructions already in memory.
    pub fn from_instructions(instructions: Vec<Instruction>) -> Self {
        BufferedTrace {
            instructions,
            cursor: 0,
        }
    }

    /// Restarts the iterator from the first instruction.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Number of instructions in the trace.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the trace holds no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The parsed instructions in trace order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
}

impl Iterator for BufferedTrace {
    type Item = Result<Instruction, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let instruction = self.instructions.get(self.cursor)?;
        self.cursor += 1;
        Some(Ok(instruction.clone()))
    }
}

/// A trace iterator that does not require the file to be pre-loaded.
///
/// Holds the open decoder and a reusable line buffer; `rewind` reopens the
/// file so the trace can be replayed. The file handle is dropped when the
/// iterator is exhausted.
#[derive(Debug)]
pub struct StreamingTrace {
    path: PathBuf,
    reader: Option<BufReader<MultiGzDecoder<File>>>,
    line_buffer: String,
    line_no: u64,
}

impl StreamingTrace {
    /// Opens a gzip trace file for streaming.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let mut trace = StreamingTrace {
            path: path.as_ref().to_path_buf(),
            reader: None,
            line_buffer: String::with_capacity(256),
            line_no: 0,
        };
        trace.rewind()?;
        Ok(trace)
    }

    /// Restarts the iterator by reopening the file.
    pub fn rewind(&mut self) -> Result<(), TraceError> {
        let file = File::open(&self.path)?;
        self.reader = Some(BufReader::new(MultiGzDecoder::new(file)));
        self.line_no = 0;
        Ok(())
    }
}

impl Iterator for StreamingTrace {
    type Item = Result<Instruction, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let reader = self.reader.as_mut()?;
            self.line_buffer.clear();
            match reader.read_line(&mut self.line_buffer) {
                Ok(0) => {
                    // Exhausted; drop the file handle.
                    self.reader = None;
                    return None;
                }
                Ok(_) => {
                    self.line_no += 1;
                    if self.line_buffer.trim().is_empty() {
                        continue;
                    }
                    return Some(
                        Instruction::parse(&self.line_buffer, self.line_no).map_err(Into::into),
                    );
                }
                Err(e) => {
                    self.reader = None;
                    return Some(Err(TraceError::Io(e)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn write_trace(lines: &str) -> PathBuf {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let path = std::env::temp_dir().join(format!(
            "edge-sim-trace-{}-{}.gz",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let file = File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(lines.as_bytes()).unwrap();
        encoder.finish().unwrap();
        path
    }

    const TRACE: &str = "CON 0 cdn1\nITERATION 0\nREQ 0 cdn1 img/a.png\nGET_STATS\n";

    #[test]
    fn test_buffered_trace_reads_all() {
        let path = write_trace(TRACE);
        let trace = BufferedTrace::from_path(&path).unwrap();
        assert_eq!(trace.len(), 4);
        assert_eq!(
            trace.instructions()[2],
            Instruction::Request {
                user_id: "0".into(),
                node_id: "cdn1".into(),
                identifier: "img/a.png".into(),
            }
        );
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_buffered_trace_resets() {
        let path = write_trace(TRACE);
        let mut trace = BufferedTrace::from_path(&path).unwrap();
        assert_eq!(trace.by_ref().count(), 4);
        assert_eq!(trace.by_ref().count(), 0);
        trace.reset();
        assert_eq!(trace.by_ref().count(), 4);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_streaming_matches_buffered() {
        let path = write_trace(TRACE);
        let buffered: Vec<Instruction> = BufferedTrace::from_path(&path)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        let streamed: Vec<Instruction> = StreamingTrace::from_path(&path)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(buffered, streamed);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_streaming_rewind_replays() {
        let path = write_trace(TRACE);
        let mut trace = StreamingTrace::from_path(&path).unwrap();
        assert_eq!(trace.by_ref().count(), 4);
        trace.rewind().unwrap();
        assert_eq!(trace.by_ref().count(), 4);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_malformed_line_aborts_with_line_number() {
        let path = write_trace("CON 0 cdn1\nNONSENSE here\n");
        let err = BufferedTrace::from_path(&path).unwrap_err();
        match err {
            TraceError::Parse(ParseError::UnknownKeyword { line, keyword }) => {
                assert_eq!(line, 2);
                assert_eq!(keyword, "NONSENSE");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let path = write_trace("\nCON 0 cdn1\n\nGET_STATS\n");
        let trace = BufferedTrace::from_path(&path).unwrap();
        assert_eq!(trace.len(), 2);
        std::fs::remove_file(path).unwrap();
    }
}
