//! `ChunkSource`: the trait boundary standing in for the physical RS-232
//! line producer, which this engine does not own. Production wiring to a
//! real serial port is the caller's concern; this module only provides the
//! testing/replay implementations.

use std::collections::VecDeque;
use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};

/// Yields one optional chunk per call: the main loop reads at most one
/// chunk per iteration so it stays responsive to the business-hours gate.
pub trait ChunkSource {
    fn next_chunk(&mut self) -> Result<Option<String>>;
}

/// Replays a file of chunks, one per line -- used for integration tests and
/// for replaying a `MonitorMode` capture.
pub struct FileChunkSource {
    lines: VecDeque<String>,
}

impl FileChunkSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening chunk replay file {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        let lines = reader
            .lines()
            .collect::<std::io::Result<VecDeque<String>>>()
            .with_context(|| format!("reading chunk replay file {}", path.display()))?;
        Ok(FileChunkSource { lines })
    }
}

impl ChunkSource for FileChunkSource {
    fn next_chunk(&mut self) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

/// In-memory source for unit and scenario tests.
pub struct VecChunkSource {
    chunks: VecDeque<String>,
}

impl VecChunkSource {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VecChunkSource {
            chunks: chunks.into_iter().map(Into::into).collect(),
        }
    }
}

impl ChunkSource for VecChunkSource {
    fn next_chunk(&mut self) -> Result<Option<String>> {
        Ok(self.chunks.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_source_yields_in_order_then_none() {
        let mut src = VecChunkSource::new(["a", "b"]);
        assert_eq!(src.next_chunk().unwrap(), Some("a".to_string()));
        assert_eq!(src.next_chunk().unwrap(), Some("b".to_string()));
        assert_eq!(src.next_chunk().unwrap(), None);
    }

    #[test]
    fn file_source_replays_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "line one").unwrap();
        writeln!(file, "line two").unwrap();
        let mut src = FileChunkSource::open(file.path()).unwrap();
        assert_eq!(src.next_chunk().unwrap(), Some("line one".to_string()));
        assert_eq!(src.next_chunk().unwrap(), Some("line two".to_string()));
        assert_eq!(src.next_chunk().unwrap(), None);
    }
}
