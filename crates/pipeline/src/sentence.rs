//! Sentence chunking for streamed LLM output
//!
//! Text deltas are buffered and complete sentences handed out as soon as
//! their terminator is followed by whitespace, so TTS can start on the first
//! sentence while the model is still generating.

/// Sentence terminators
const TERMINATORS: &[char] = &['.', '!', '?', '।', '॥'];

/// Closing marks kept with the sentence they end
const CLOSERS: &[char] = &['"', '\'', ')', ']', '\u{201D}', '\u{2019}'];

#[derive(Debug, Clone)]
pub struct SentenceChunker {
    buffer: String,
    /// Force a split at the last space once the buffer grows past this
    max_buffer_chars: usize,
}

impl Default for SentenceChunker {
    fn default() -> Self {
        Self::new(500)
    }
}

impl SentenceChunker {
    pub fn new(max_buffer_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            max_buffer_chars: max_buffer_chars.max(1),
        }
    }

    /// Add a delta, returning any sentences it completed
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);

        let mut sentences = Vec::new();
        while let Some(end) = self.sentence_end() {
            let rest = self.buffer.split_off(end);
            let sentence = std::mem::replace(&mut self.buffer, rest);
            push_trimmed(&mut sentences, &sentence);
        }

        if self.buffer.chars().count() > self.max_buffer_chars {
            if let Some(space) = self.buffer.rfind(char::is_whitespace) {
                let rest = self.buffer.split_off(space);
                let head = std::mem::replace(&mut self.buffer, rest);
                push_trimmed(&mut sentences, &head);
            }
        }

        sentences
    }

    /// Whatever remains at end of stream
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }

    /// Byte offset just past the first complete sentence
    fn sentence_end(&self) -> Option<usize> {
        let mut chars = self.buffer.char_indices().peekable();

        while let Some((_, c)) = chars.next() {
            if !TERMINATORS.contains(&c) {
                continue;
            }
            while let Some(&(_, next)) = chars.peek() {
                if TERMINATORS.contains(&next) || CLOSERS.contains(&next) {
                    chars.next();
                } else {
                    break;
                }
            }
            match chars.peek() {
                Some(&(i, next)) if next.is_whitespace() => return Some(i),
                _ => {}
            }
        }
        None
    }
}

fn push_trimmed(out: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        out.push(text.to_string());
    }
}

/// Split complete text into sentences
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut chunker = SentenceChunker::default();
    let mut sentences = chunker.push(text);
    sentences.extend(chunker.flush());
    sentences
}
