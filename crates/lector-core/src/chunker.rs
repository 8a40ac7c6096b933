//! Boundary-aware text chunking with fixed character overlap.
//!
//! Chunks are contiguous slices of the input: each chunk after the first
//! starts exactly `overlap` characters before the previous chunk's end, so
//! concatenating chunks with the overlaps collapsed reconstructs the
//! original text losslessly.

use crate::error::ChunkerError;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum chunk length in characters.
    pub max_size: usize,
    /// Characters repeated from the end of one chunk at the start of the next.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            overlap: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub index: usize,
    /// Char offset of the chunk start in the original text.
    pub start: usize,
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// # Errors
    ///
    /// Returns [`ChunkerError::InvalidConfig`] if `max_size` is zero or
    /// `overlap >= max_size`.
    pub fn new(config: ChunkerConfig) -> Result<Self, ChunkerError> {
        if config.max_size == 0 {
            return Err(ChunkerError::InvalidConfig("max_size must be > 0".into()));
        }
        if config.overlap >= config.max_size {
            return Err(ChunkerError::InvalidConfig(format!(
                "overlap ({}) must be smaller than max_size ({})",
                config.overlap, config.max_size
            )));
        }
        Ok(Self { config })
    }

    /// Split `text` into ordered chunks.
    ///
    /// Boundaries are chosen by priority: paragraph break, then sentence
    /// ending, then line break, then clause punctuation. When none of
    /// these appears in the size window a hard character split is forced.
    /// Empty or whitespace-only input yields no chunks.
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let max_size = self.config.max_size;
        let overlap = self.config.overlap;

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let window_end = (start + max_size).min(chars.len());
            let end = if window_end == chars.len() {
                window_end
            } else {
                // A boundary only counts if it leaves more than `overlap`
                // characters of progress, otherwise chunking would stall.
                find_boundary(&chars, start, window_end, start + overlap + 1)
                    .unwrap_or(window_end)
            };

            chunks.push(Chunk {
                text: chars[start..end].iter().collect(),
                index: chunks.len(),
                start,
            });

            if end == chars.len() {
                break;
            }
            start = end - overlap;
        }

        chunks
    }
}

/// Boundary priority levels, strongest first. Each entry is checked at
/// every position of the window before falling through to the next level.
#[derive(Clone, Copy)]
enum BoundaryLevel {
    Paragraph,
    Sentence,
    Line,
    Clause,
}

const LEVELS: [BoundaryLevel; 4] = [
    BoundaryLevel::Paragraph,
    BoundaryLevel::Sentence,
    BoundaryLevel::Line,
    BoundaryLevel::Clause,
];

/// Chunk end position implied by a boundary starting at `i`, if any.
fn boundary_end(chars: &[char], i: usize, level: BoundaryLevel) -> Option<usize> {
    let next = chars.get(i + 1).copied();
    match level {
        BoundaryLevel::Paragraph => {
            (chars[i] == '\n' && next == Some('\n')).then_some(i + 2)
        }
        BoundaryLevel::Sentence => {
            let ends_sentence = matches!(chars[i], '.' | '!' | '?') && next == Some(' ')
                || chars[i] == '.' && next == Some('\n');
            ends_sentence.then_some(i + 2)
        }
        BoundaryLevel::Line => (chars[i] == '\n').then_some(i + 1),
        BoundaryLevel::Clause => {
            (matches!(chars[i], ';' | ':' | ',') && next == Some(' ')).then_some(i + 2)
        }
    }
}

/// Find the latest acceptable boundary in `[start, window_end)`, trying
/// each priority level across the whole window before the next. A
/// boundary is acceptable when the resulting chunk end lies in
/// `[min_end, window_end]`.
fn find_boundary(
    chars: &[char],
    start: usize,
    window_end: usize,
    min_end: usize,
) -> Option<usize> {
    for level in LEVELS {
        for i in (start..window_end).rev() {
            if let Some(end) = boundary_end(chars, i, level) {
                if end >= min_end && end <= window_end {
                    return Some(end);
                }
            }
        }
    }
    None
}
