use crate::types::Span;

/// Immutable, character-indexed reference with precomputed anchors.
#[derive(Debug, Clone)]
pub struct ReferenceTranscript {
    text: String,
    chars: Vec<char>,
    /// Offsets just past every terminator character, ascending.
    punctuation_anchors: Vec<usize>,
    /// Start offsets of maximal non-whitespace runs, ascending.
    word_starts: Vec<usize>,
    /// End offsets (exclusive) of maximal non-whitespace runs, ascending.
    word_ends: Vec<usize>,
}

impl ReferenceTranscript {
    pub fn new(text: impl Into<String>, ending_punctuations: &str) -> Self {
        let text = text.into();
        let chars: Vec<char> = text.chars().collect();

        let mut punctuation_anchors = Vec::new();
        let mut word_starts = Vec::new();
        let mut word_ends = Vec::new();
        let mut in_word = false;
        for (i, &c) in chars.iter().enumerate() {
            if ending_punctuations.contains(c) {
                punctuation_anchors.push(i + 1);
            }
            let is_space = c.is_whitespace();
            if !is_space && !in_word {
                word_starts.push(i);
            }
            if is_space && in_word {
                word_ends.push(i);
            }
            in_word = !is_space;
        }
        if in_word {
            word_ends.push(chars.len());
        }

        Self {
            text,
            chars,
            punctuation_anchors,
            word_starts,
            word_ends,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn slice_chars(&self, span: Span) -> &[char] {
        let end = span.end.min(self.chars.len());
        let begin = span.begin.min(end);
        &self.chars[begin..end]
    }

    pub fn slice(&self, span: Span) -> String {
        self.slice_chars(span).iter().collect()
    }

    pub fn char_at(&self, offset: usize) -> Option<char> {
        self.chars.get(offset).copied()
    }

    /// Punctuation anchors in `[from, to]`.
    pub fn punctuation_anchors_in(&self, from: usize, to: usize) -> &[usize] {
        range_of(&self.punctuation_anchors, from, to)
    }

    pub fn word_starts_in(&self, from: usize, to: usize) -> &[usize] {
        range_of(&self.word_starts, from, to)
    }

    pub fn word_ends_in(&self, from: usize, to: usize) -> &[usize] {
        range_of(&self.word_ends, from, to)
    }

    /// First punctuation anchor strictly after `offset`.
    pub fn next_punctuation_anchor(&self, offset: usize) -> Option<usize> {
        let idx = self.punctuation_anchors.partition_point(|&a| a <= offset);
        self.punctuation_anchors.get(idx).copied()
    }

    /// First non-whitespace offset at or after `offset`, or `len()` if none.
    pub fn skip_whitespace(&self, offset: usize) -> usize {
        let mut pos = offset.min(self.chars.len());
        while pos < self.chars.len() && self.chars[pos].is_whitespace() {
            pos += 1;
        }
        pos
    }
}

fn range_of(sorted: &[usize], from: usize, to: usize) -> &[usize] {
    if from > to {
        return &[];
    }
    let lo = sorted.partition_point(|&x| x < from);
    let hi = sorted.partition_point(|&x| x <= to);
    &sorted[lo..hi]
}
