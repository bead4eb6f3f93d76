use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

/// Fixed-size character windows with a fixed overlap.
///
/// A window ends at the last whitespace inside it when that still leaves
/// room for the overlap; otherwise it is cut at the exact size. Consecutive
/// windows always share at most `overlap` characters and never leave a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 || overlap >= size {
            return Err(Error::InvalidConfig(format!("invalid chunk window: size {size}, overlap {overlap}")));
        }
        Ok(Self { size, overlap })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Character spans `[start, end)` covering `text`.
    pub fn spans(&self, text: &str) -> Vec<(usize, usize)> {
        let chars: Vec<char> = text.chars().collect();
        let n = chars.len();
        if n == 0 {
            return Vec::new();
        }
        if n <= self.size {
            return vec![(0, n)];
        }

        let mut spans = Vec::new();
        let mut start = 0usize;
        loop {
            let mut end = (start + self.size).min(n);
            if end < n {
                let floor = start + self.overlap;
                if let Some(ws) = (floor + 1..end).rev().find(|&i| chars[i].is_whitespace()) {
                    end = ws;
                }
            }
            spans.push((start, end));
            if end >= n {
                break;
            }
            let next = end - self.overlap;
            start = if next > start { next } else { end };
        }
        spans
    }

    pub fn chunk(&self, doc: &Document) -> Vec<Chunk> {
        let spans = self.spans(&doc.text);
        if spans.is_empty() {
            return Vec::new();
        }
        let offsets: Vec<usize> = doc
            .text
            .char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(doc.text.len()))
            .collect();
        spans
            .into_iter()
            .enumerate()
            .map(|(seq, (start, end))| Chunk {
                id: Chunk::make_id(&doc.id, seq),
                doc_id: doc.id.clone(),
                seq,
                text: doc.text[offsets[start]..offsets[end]].to_string(),
                char_start: start,
                char_end: end,
            })
            .collect()
    }
}
