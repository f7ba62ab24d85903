use rayon::prelude::*;

use crate::alignment::normalize::{CompareOptions, PreparedHypothesis};
use crate::alignment::transcript::ReferenceTranscript;
use crate::alignment::window::SearchWindow;
use crate::config::AlignerConfig;
use crate::pipeline::traits::ErrorRateMetric;
use crate::types::Span;

/// Below this many candidates, scoring on the calling thread is faster than
/// fanning out to the rayon pool.
const PARALLEL_SCORING_THRESHOLD: usize = 64;
const SCORE_TIE_EPSILON: f64 = 1e-9;
/// Sliding end-point increment is `predicted_len / FALLBACK_END_DIVISOR`.
const FALLBACK_END_DIVISOR: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub span: Span,
    pub cer: f64,
}

impl Candidate {
    pub fn text(&self, transcript: &ReferenceTranscript) -> String {
        transcript.slice(self.span)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateLimits {
    pub max_start_anchors: usize,
    pub min_punctuation_anchors: usize,
    pub max_candidates: usize,
}

impl CandidateLimits {
    pub fn from_config(config: &AlignerConfig) -> Self {
        Self {
            max_start_anchors: config.max_start_anchors,
            min_punctuation_anchors: config.min_punctuation_anchors,
            max_candidates: config.max_candidates.max(1),
        }
    }
}

pub struct CandidateGenerator<'a> {
    transcript: &'a ReferenceTranscript,
    metric: &'a dyn ErrorRateMetric,
    compare: CompareOptions,
    limits: CandidateLimits,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(
        transcript: &'a ReferenceTranscript,
        metric: &'a dyn ErrorRateMetric,
        compare: CompareOptions,
        limits: CandidateLimits,
    ) -> Self {
        Self {
            transcript,
            metric,
            compare,
            limits,
        }
    }

    /// Candidate begin offsets: the first word at or after `reach_back`,
    /// every word start between it and the window start, then up to
    /// `max_start_anchors` word starts inside the window.
    pub fn begin_anchors(&self, window: SearchWindow, reach_back: usize) -> Vec<usize> {
        let first = self.transcript.skip_whitespace(reach_back.min(window.start));
        if first >= window.end {
            return Vec::new();
        }
        let mut begins = vec![first];
        if first < window.start {
            begins.extend_from_slice(self.transcript.word_starts_in(first + 1, window.start));
        }
        let inside_from = first.max(window.start) + 1;
        begins.extend(
            self.transcript
                .word_starts_in(inside_from, window.end.saturating_sub(1))
                .iter()
                .take(self.limits.max_start_anchors),
        );
        begins
    }

    /// Candidate end offsets after `begin`: punctuation anchors first, then
    /// word ends, then fixed increments while too few anchors exist.
    pub fn end_anchors(&self, window: SearchWindow, begin: usize, predicted_len: usize) -> Vec<usize> {
        if begin >= window.end {
            return Vec::new();
        }
        let lo = begin + 1;
        let mut ends: Vec<usize> = self
            .transcript
            .punctuation_anchors_in(lo, window.end)
            .to_vec();

        if ends.len() < self.limits.min_punctuation_anchors {
            ends.extend_from_slice(self.transcript.word_ends_in(lo, window.end));
            ends.sort_unstable();
            ends.dedup();
        }
        if ends.len() < self.limits.min_punctuation_anchors {
            let step = (predicted_len / FALLBACK_END_DIVISOR).max(1);
            ends.extend((begin + step..=window.end).step_by(step));
            ends.sort_unstable();
            ends.dedup();
        }
        ends
    }

    /// All begin/end pairs, capped at `max_candidates` keeping the spans
    /// whose length is closest to the predicted length.
    pub fn enumerate(
        &self,
        window: SearchWindow,
        reach_back: usize,
        predicted_len: usize,
    ) -> Vec<Span> {
        let mut spans = Vec::new();
        for begin in self.begin_anchors(window, reach_back) {
            for end in self.end_anchors(window, begin, predicted_len) {
                spans.push(Span::new(begin, end));
            }
        }

        if spans.len() > self.limits.max_candidates {
            tracing::debug!(
                generated = spans.len(),
                kept = self.limits.max_candidates,
                "candidates: truncating to candidate ceiling"
            );
            spans.sort_by_key(|span| (span.len().abs_diff(predicted_len), span.begin, span.end));
            spans.truncate(self.limits.max_candidates);
        }
        spans
    }

    /// Scores every candidate in the window and returns the best one.
    pub fn best(
        &self,
        window: SearchWindow,
        reach_back: usize,
        hypothesis: &PreparedHypothesis,
    ) -> Option<Candidate> {
        let spans = self.enumerate(window, reach_back, hypothesis.chars.len());
        if spans.is_empty() {
            return None;
        }

        let score = |span: &Span| {
            let reference = self
                .compare
                .prepare_reference(self.transcript.slice_chars(*span), hypothesis);
            Candidate {
                span: *span,
                cer: self.metric.error_rate(&reference, &hypothesis.chars),
            }
        };

        let scored: Vec<Candidate> = if spans.len() >= PARALLEL_SCORING_THRESHOLD {
            spans.par_iter().map(score).collect()
        } else {
            spans.iter().map(score).collect()
        };

        let best = scored.into_iter().reduce(prefer)?;
        tracing::debug!(
            window_start = window.start,
            window_end = window.end,
            candidates = spans.len(),
            best_begin = best.span.begin,
            best_end = best.span.end,
            best_cer = format!("{:.3}", best.cer),
            "candidates: selected best span"
        );
        Some(best)
    }
}

/// Lower CER wins; ties go to the shorter span, then the earlier begin.
pub(crate) fn prefer(current: Candidate, challenger: Candidate) -> Candidate {
    if challenger.cer < current.cer - SCORE_TIE_EPSILON {
        return challenger;
    }
    if (challenger.cer - current.cer).abs() <= SCORE_TIE_EPSILON {
        let challenger_key = (challenger.span.len(), challenger.span.begin);
        let current_key = (current.span.len(), current.span.begin);
        if challenger_key < current_key {
            return challenger;
        }
    }
    current
}
