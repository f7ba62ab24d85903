use crate::alignment::candidates::{prefer, Candidate, CandidateGenerator, CandidateLimits};
use crate::alignment::normalize::CompareOptions;
use crate::alignment::transcript::ReferenceTranscript;
use crate::alignment::window::{Expansion, WindowManager, WindowPolicy};
use crate::config::AlignerConfig;
use crate::pipeline::cancellation::CancellationToken;
use crate::pipeline::traits::{ErrorRateMetric, LanguageProfile};
use crate::types::{Chunk, ChunkMatch, ChunkState, Span, UnmatchedReason};


/// Result of driving the matcher over a chunk list.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverOutcome {
    pub matches: Vec<ChunkMatch>,
    pub cancelled: bool,
}

/// Greedy, non-backtracking chunk-to-span matcher.
///
/// Each chunk moves through `Pending -> Matched | Unmatched` exactly once;
/// recorded matches are never revisited.
pub struct GreedyMatcher<'a> {
    transcript: &'a ReferenceTranscript,
    generator: CandidateGenerator<'a>,
    window: WindowManager,
    profile: &'a dyn LanguageProfile,
    compare: CompareOptions,
    cer_threshold: f64,
    retry_ceiling: u32,
    lost_search_cer: f64,
    lost_streak: usize,
    high_cer_streak: usize,
    opened_first: bool,
}

impl<'a> GreedyMatcher<'a> {
    pub fn new(
        transcript: &'a ReferenceTranscript,
        metric: &'a dyn ErrorRateMetric,
        profile: &'a dyn LanguageProfile,
        config: &AlignerConfig,
    ) -> Self {
        let compare = CompareOptions::from_config(config);
        Self {
            transcript,
            generator: CandidateGenerator::new(
                transcript,
                metric,
                compare,
                CandidateLimits::from_config(config),
            ),
            window: WindowManager::new(WindowPolicy::from_config(config), transcript.len()),
            profile,
            compare,
            cer_threshold: config.cer_threshold,
            retry_ceiling: config.retry_ceiling,
            lost_search_cer: config.lost_search_cer,
            lost_streak: config.lost_streak,
            high_cer_streak: 0,
            opened_first: false,
        }
    }

    /// Drives every chunk in order. Cancellation is checked before each chunk,
    /// so the returned prefix only holds fully committed records.
    pub fn run(
        &mut self,
        chunks: &[Chunk],
        cancel: &CancellationToken,
        on_match: &mut dyn FnMut(&ChunkMatch),
    ) -> DriverOutcome {
        let mut matches = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if cancel.is_cancelled() {
                tracing::info!(
                    processed = matches.len(),
                    total = chunks.len(),
                    "matcher: cancelled at chunk boundary"
                );
                return DriverOutcome {
                    matches,
                    cancelled: true,
                };
            }
            let record = self.match_chunk(chunk);
            on_match(&record);
            matches.push(record);
        }
        DriverOutcome {
            matches,
            cancelled: false,
        }
    }

    pub fn match_chunk(&mut self, chunk: &Chunk) -> ChunkMatch {
        let chunk_text = self.profile.clean_prediction(&chunk.predicted_text);
        let hypothesis = self.compare.prepare_hypothesis(&chunk_text);
        let predicted_len = chunk_text.chars().count();

        let mut state = ChunkState::Pending;
        let mut best: Option<Candidate> = None;
        let mut attempts = 0u32;

        if hypothesis.chars.is_empty() {
            state = ChunkState::Unmatched(UnmatchedReason::EmptyPrediction);
        } else {
            let opened = if self.opened_first {
                self.window.open(self.transcript, predicted_len)
            } else {
                self.opened_first = true;
                self.window.initial_window(self.transcript, predicted_len)
            };

            if let Some(mut window) = opened {
                loop {
                    attempts += 1;
                    if let Some(candidate) =
                        self.generator.best(window, self.window.reach_back(), &hypothesis)
                    {
                        best = Some(match best {
                            Some(current) => prefer(current, candidate),
                            None => candidate,
                        });
                    }
                    if best.is_some_and(|c| c.cer <= self.cer_threshold) {
                        state = ChunkState::Matched;
                        break;
                    }
                    if attempts > self.retry_ceiling {
                        break;
                    }
                    match self.window.expand(self.transcript) {
                        Expansion::Expanded => window = self.window.window(),
                        Expansion::AtMaximum | Expansion::Exhausted => break,
                    }
                }
            }

            if state == ChunkState::Pending {
                let reason = if self.window.window().end >= self.transcript.len() {
                    UnmatchedReason::ExhaustedWindow
                } else {
                    UnmatchedReason::BelowThresholdAfterRetries
                };
                state = ChunkState::Unmatched(reason);
            }
        }

        let record = self.commit(chunk, chunk_text, state, best, attempts, predicted_len);
        self.track_lost(&record);
        record
    }

    fn commit(
        &mut self,
        chunk: &Chunk,
        chunk_text: String,
        state: ChunkState,
        best: Option<Candidate>,
        attempts: u32,
        predicted_len: usize,
    ) -> ChunkMatch {
        let fallback_span = Span::empty_at(self.window.window().start);
        let (span, cer) = best.map_or((fallback_span, 1.0), |c| (c.span, c.cer));

        let reason = match state {
            ChunkState::Matched => None,
            ChunkState::Unmatched(reason) => Some(reason),
            ChunkState::Pending => Some(UnmatchedReason::BelowThresholdAfterRetries),
        };

        let Some(reason) = reason else {
            let span = self.profile.adjust_span(self.transcript, span, self.window.floor());
            self.window.advance(span);
            tracing::debug!(
                chunk_index = chunk.index,
                begin = span.begin,
                end = span.end,
                cer = format!("{:.3}", cer),
                attempts,
                "matcher: accepted"
            );
            return ChunkMatch {
                chunk_index: chunk.index,
                span,
                text: self.transcript.slice(span),
                chunk_text,
                cer,
                accepted: true,
                unmatched_reason: None,
                attempts,
            };
        };

        if reason != UnmatchedReason::EmptyPrediction {
            self.window.fallback(predicted_len);
        }
        tracing::warn!(
            chunk_index = chunk.index,
            reason = reason.as_str(),
            best_cer = format!("{:.3}", cer),
            attempts,
            chunk_text = chunk_text.as_str(),
            "matcher: chunk left unmatched"
        );
        ChunkMatch {
            chunk_index: chunk.index,
            span,
            text: self.transcript.slice(span),
            chunk_text,
            cer,
            accepted: false,
            unmatched_reason: Some(reason),
            attempts,
        }
    }

    fn track_lost(&mut self, record: &ChunkMatch) {
        if record.cer > self.lost_search_cer {
            self.high_cer_streak += 1;
        } else {
            self.high_cer_streak = 0;
        }
        if self.lost_streak > 0 && self.high_cer_streak == self.lost_streak {
            tracing::warn!(
                chunk_index = record.chunk_index,
                streak = self.high_cer_streak,
                lost_search_cer = self.lost_search_cer,
                "matcher: alignment looks lost, consecutive chunks above lost_search_cer"
            );
        }
    }
}
