//! Sentence Splitter
//!
//! Splits documents into token-bounded chunks on sentence boundaries
//! (UAX #29). Consecutive chunks share trailing sentences up to the
//! configured overlap. A sentence longer than a whole chunk is split on word
//! boundaries.
//!
//! # Usage
//!
//! ```ignore
//! use room_assistant_rag::chunker::{SentenceSplitter, SplitterConfig};
//!
//! let splitter = SentenceSplitter::new(SplitterConfig::default())?;
//! let chunks = splitter.split("Long document text...");
//! ```

use room_assistant_core::estimate_tokens;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::RagError;

/// Configuration for sentence splitting
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Maximum chunk size in tokens (approximate)
    pub chunk_size: usize,
    /// Tokens shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_overlap: 200,
        }
    }
}

/// A single chunk of text with its position in the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Chunk text, sliced verbatim from the source
    pub text: String,
    /// Index of this chunk in the document
    pub index: usize,
    /// Start byte offset in the source
    pub start_char: usize,
    /// End byte offset in the source
    pub end_char: usize,
    /// Estimated token count
    pub token_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    tokens: usize,
}

/// Sentence-aware text splitter
#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    config: SplitterConfig,
}

impl SentenceSplitter {
    pub fn new(config: SplitterConfig) -> Result<Self, RagError> {
        if config.chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk size must be positive".to_string(),
            ));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split a document into chunks
    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let spans = self.sentence_spans(text);
        let mut chunks = Vec::new();
        let mut current: Vec<Span> = Vec::new();
        let mut current_tokens = 0;

        for span in spans {
            if !current.is_empty() && current_tokens + span.tokens > self.config.chunk_size {
                chunks.push(make_chunk(text, &current, chunks.len()));

                let (mut kept, mut kept_tokens) = self.overlap_tail(&current);
                while !kept.is_empty() && kept_tokens + span.tokens > self.config.chunk_size {
                    kept_tokens -= kept.remove(0).tokens;
                }
                current = kept;
                current_tokens = kept_tokens;
            }

            current.push(span);
            current_tokens += span.tokens;
        }

        if !current.is_empty() {
            chunks.push(make_chunk(text, &current, chunks.len()));
        }

        chunks
    }

    /// Trailing spans of a finished chunk that fit in the overlap budget
    fn overlap_tail(&self, spans: &[Span]) -> (Vec<Span>, usize) {
        let mut kept = Vec::new();
        let mut tokens = 0;

        for span in spans.iter().rev() {
            if tokens + span.tokens > self.config.chunk_overlap {
                break;
            }
            tokens += span.tokens;
            kept.push(*span);
        }

        kept.reverse();
        (kept, tokens)
    }

    fn sentence_spans(&self, text: &str) -> Vec<Span> {
        let mut spans = Vec::new();

        for (offset, sentence) in text.split_sentence_bound_indices() {
            let trimmed_start = sentence.len() - sentence.trim_start().len();
            let trimmed = sentence.trim();
            if trimmed.is_empty() {
                continue;
            }

            let start = offset + trimmed_start;
            let end = start + trimmed.len();
            let tokens = estimate_tokens(trimmed);

            if tokens > self.config.chunk_size {
                spans.extend(self.split_oversized(text, start, end));
            } else {
                spans.push(Span { start, end, tokens });
            }
        }

        spans
    }

    /// Break one long sentence into word-bounded pieces of at most a chunk
    fn split_oversized(&self, text: &str, start: usize, end: usize) -> Vec<Span> {
        let max_graphemes = self.config.chunk_size * 4;
        let mut pieces = Vec::new();
        let mut piece_start: Option<usize> = None;
        let mut piece_end = start;
        let mut graphemes = 0;

        for (offset, word) in text[start..end].split_word_bound_indices() {
            let word_graphemes = word.graphemes(true).count();

            if let Some(ps) = piece_start {
                if graphemes + word_graphemes > max_graphemes {
                    pieces.push(span_of(text, ps, piece_end));
                    piece_start = None;
                    graphemes = 0;
                }
            }

            if piece_start.is_none() {
                if word.trim().is_empty() {
                    continue;
                }
                piece_start = Some(start + offset);
            }

            graphemes += word_graphemes;
            if !word.trim().is_empty() {
                piece_end = start + offset + word.len();
            }
        }

        if let Some(ps) = piece_start {
            pieces.push(span_of(text, ps, piece_end));
        }

        pieces
    }
}

fn span_of(text: &str, start: usize, end: usize) -> Span {
    Span {
        start,
        end,
        tokens: estimate_tokens(&text[start..end]),
    }
}

fn make_chunk(text: &str, spans: &[Span], index: usize) -> TextChunk {
    let start = spans.first().map(|s| s.start).unwrap_or(0);
    let end = spans.last().map(|s| s.end).unwrap_or(start);
    let chunk_text = text[start..end].to_string();
    let token_count = estimate_tokens(&chunk_text);

    TextChunk {
        text: chunk_text,
        index,
        start_char: start,
        end_char: end,
        token_count,
    }
}
