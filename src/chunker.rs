//! Recursive character chunking of extracted document text.
//!
//! Splitting walks an ordered list of boundaries (paragraph, then word, then
//! a hard character cut), recursing into oversized parts with the next
//! boundary and greedily re-merging small neighbours up to the budget. Each
//! emitted chunk after the first carries the previous chunk's tail as an
//! overlap prefix so retrieval keeps cross-boundary context.

use std::ops::Range;

use thiserror::Error;

/// Default maximum chunk length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap carried between neighbouring chunks, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// A bounded contiguous span of document text used as a retrieval unit.
///
/// `text` includes the overlap prefix; `offset` is the byte offset of that
/// prefix in the source text, so `source_text[offset..offset + text.len()]`
/// always reproduces `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Name of the document this chunk was cut from.
    pub source: String,
    /// Position of the chunk in source order, starting at zero.
    pub ordinal: usize,
    /// Byte offset of the chunk start (overlap included) in the source text.
    pub offset: usize,
    /// The chunk text, overlap prefix included.
    pub text: String,
}

/// Configuration errors caught when constructing a [`Chunker`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("chunk size must be non-zero")]
    ZeroChunkSize,
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Splits raw text into overlapping, size-bounded chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
    boundaries: Vec<String>,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
            boundaries: default_boundaries(),
        }
    }
}

fn default_boundaries() -> Vec<String> {
    vec!["\n".to_string(), " ".to_string(), String::new()]
}

impl Chunker {
    /// Creates a chunker with the given maximum chunk length and overlap,
    /// both in characters, using the default boundary list
    /// (`"\n"`, `" "`, then a hard cut).
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkerError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
            boundaries: default_boundaries(),
        })
    }

    /// Replaces the boundary list. Boundaries are tried in order; an empty
    /// string means a hard cut at the length budget and is always applied as
    /// the final fallback even when absent from the list.
    #[must_use]
    pub fn with_boundaries(mut self, boundaries: Vec<String>) -> Self {
        self.boundaries = boundaries;
        self
    }

    /// Maximum chunk length, in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap between neighbouring chunks, in characters.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits `text` into chunks annotated with `source` provenance.
    ///
    /// Chunks come back in source order, none empty, each at most
    /// `chunk_size` characters. Concatenating the first chunk with every
    /// later chunk minus its overlap prefix reconstructs `text` exactly.
    pub fn split(&self, source: &str, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        // Fresh-content budget per segment; the overlap prefix tops each
        // chunk back up to at most chunk_size.
        let budget = self.chunk_size - self.overlap;
        let mut atoms = Vec::new();
        atomize(text, 0, budget, &self.boundaries, &mut atoms);
        let segments = merge_atoms(atoms, budget);

        let mut chunks = Vec::with_capacity(segments.len());
        for (ordinal, segment) in segments.iter().enumerate() {
            let start = if ordinal == 0 || self.overlap == 0 {
                segment.range.start
            } else {
                overlap_start(text, segment.range.start, self.overlap)
            };
            chunks.push(Chunk {
                source: source.to_string(),
                ordinal,
                offset: start,
                text: text[start..segment.range.end].to_string(),
            });
        }
        chunks
    }
}

/// A contiguous byte range of the source text plus its character count.
#[derive(Debug, Clone)]
struct Atom {
    range: Range<usize>,
    chars: usize,
}

/// Recursively cuts `text` (located at `base` in the source) into atoms of at
/// most `budget` characters, preferring earlier boundaries.
fn atomize(text: &str, base: usize, budget: usize, boundaries: &[String], out: &mut Vec<Atom>) {
    if text.is_empty() {
        return;
    }
    let chars = text.chars().count();
    if chars <= budget {
        out.push(Atom {
            range: base..base + text.len(),
            chars,
        });
        return;
    }

    let Some((boundary, rest)) = boundaries.split_first() else {
        hard_cut(text, base, budget, out);
        return;
    };
    if boundary.is_empty() {
        hard_cut(text, base, budget, out);
        return;
    }
    if !text.contains(boundary.as_str()) {
        atomize(text, base, budget, rest, out);
        return;
    }

    // split_inclusive keeps the boundary attached to the preceding part, so
    // atom ranges always cover the text without gaps.
    let mut start = 0;
    for part in text.split_inclusive(boundary.as_str()) {
        let part_chars = part.chars().count();
        if part_chars <= budget {
            out.push(Atom {
                range: base + start..base + start + part.len(),
                chars: part_chars,
            });
        } else {
            atomize(part, base + start, budget, rest, out);
        }
        start += part.len();
    }
}

/// Cuts `text` into pieces of exactly `budget` characters (the last piece may
/// be shorter), respecting character boundaries.
fn hard_cut(text: &str, base: usize, budget: usize, out: &mut Vec<Atom>) {
    let mut seg_start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == budget {
            out.push(Atom {
                range: base + seg_start..base + idx,
                chars: count,
            });
            seg_start = idx;
            count = 0;
        }
        count += 1;
    }
    if count > 0 {
        out.push(Atom {
            range: base + seg_start..base + text.len(),
            chars: count,
        });
    }
}

/// Greedily merges adjacent atoms while the combined length stays within the
/// budget. Atoms are contiguous, so merging is a range extension.
fn merge_atoms(atoms: Vec<Atom>, budget: usize) -> Vec<Atom> {
    let mut merged: Vec<Atom> = Vec::with_capacity(atoms.len());
    for atom in atoms {
        match merged.last_mut() {
            Some(last) if last.chars + atom.chars <= budget => {
                last.range.end = atom.range.end;
                last.chars += atom.chars;
            }
            _ => merged.push(atom),
        }
    }
    merged
}

/// Byte index of the overlap prefix: at most `overlap` characters back from
/// `segment_start`, clamped to the start of the text.
fn overlap_start(text: &str, segment_start: usize, overlap: usize) -> usize {
    text[..segment_start]
        .char_indices()
        .rev()
        .nth(overlap - 1)
        .map_or(0, |(idx, _)| idx)
}
