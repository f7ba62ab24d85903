use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Ordinal position; indices must be strictly increasing across a run.
    pub index: u64,
    pub predicted_text: String,
    pub duration: Option<f64>,
    pub audio_filepath: Option<String>,
    /// Ground-truth text, when the collaborator supplies one.
    pub text: Option<String>,
}

impl Chunk {
    pub fn new(index: u64, predicted_text: impl Into<String>) -> Self {
        Self {
            index,
            predicted_text: predicted_text.into(),
            duration: None,
            audio_filepath: None,
            text: None,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Character-offset interval `[begin, end)` into the working transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub begin: usize,
    pub end: usize,
}

impl Span {
    pub fn new(begin: usize, end: usize) -> Self {
        debug_assert!(begin <= end, "span begin {begin} > end {end}");
        Self { begin, end }
    }

    pub fn empty_at(offset: usize) -> Self {
        Self {
            begin: offset,
            end: offset,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// The window reached the end of the transcript without an acceptable candidate.
    ExhaustedWindow,
    BelowThresholdAfterRetries,
    /// Nothing left to compare after cleaning the chunk's prediction.
    EmptyPrediction,
}

impl UnmatchedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExhaustedWindow => "exhausted_window",
            Self::BelowThresholdAfterRetries => "below_threshold_after_retries",
            Self::EmptyPrediction => "empty_prediction",
        }
    }
}

/// Per-chunk state in the greedy driver. `Pending` is never recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    Matched,
    Unmatched(UnmatchedReason),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub chunk_index: u64,
    pub span: Span,
    /// Transcript text covered by `span`.
    pub text: String,
    /// Cleaned prediction the span was scored against.
    pub chunk_text: String,
    /// Best CER observed for this chunk, in [0, 1].
    pub cer: f64,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmatched_reason: Option<UnmatchedReason>,
    /// Number of windows searched (1 + expansions).
    pub attempts: u32,
}

impl ChunkMatch {
    pub fn state(&self) -> ChunkState {
        match (self.accepted, self.unmatched_reason) {
            (true, _) => ChunkState::Matched,
            (false, Some(reason)) => ChunkState::Unmatched(reason),
            (false, None) => ChunkState::Unmatched(UnmatchedReason::BelowThresholdAfterRetries),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlignmentInput {
    pub chunks: Vec<Chunk>,
    /// `None` synthesizes a working transcript from the chunks themselves.
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentOutput {
    /// One entry per processed chunk, in chunk order.
    pub matches: Vec<ChunkMatch>,
    /// The transcript every span refers to (cleaned or combined).
    pub transcript: String,
    pub transcript_combined: bool,
    /// Where each chunk's own text sits in a combined transcript, by chunk
    /// position. Empty when a reference was supplied.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_spans: Vec<Span>,
    /// True when the run stopped early; `matches` then covers a prefix of the chunks.
    pub cancelled: bool,
}

impl AlignmentOutput {
    pub fn accepted(&self) -> impl Iterator<Item = &ChunkMatch> {
        self.matches.iter().filter(|m| m.accepted)
    }
}
