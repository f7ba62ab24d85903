use crate::alignment::combiner::combine_chunks;
use crate::alignment::matcher::GreedyMatcher;
use crate::alignment::transcript::ReferenceTranscript;
use crate::config::AlignerConfig;
use crate::error::AlignmentError;
use crate::pipeline::cancellation::CancellationToken;
use crate::pipeline::traits::{ErrorRateMetric, LanguageProfile};
use crate::types::{AlignmentInput, AlignmentOutput, Chunk, ChunkMatch, Span};

pub struct ChunkAligner {
    config: AlignerConfig,
    ending_punctuations: String,
    metric: Box<dyn ErrorRateMetric>,
    profile: Box<dyn LanguageProfile>,
}

pub(crate) struct ChunkAlignerParts {
    pub config: AlignerConfig,
    pub ending_punctuations: String,
    pub metric: Box<dyn ErrorRateMetric>,
    pub profile: Box<dyn LanguageProfile>,
}

impl ChunkAligner {
    pub(crate) fn from_parts(parts: ChunkAlignerParts) -> Self {
        Self {
            config: parts.config,
            ending_punctuations: parts.ending_punctuations,
            metric: parts.metric,
            profile: parts.profile,
        }
    }

    pub fn config(&self) -> &AlignerConfig {
        &self.config
    }

    /// Terminator set in effect: the configured one, else the profile's.
    pub fn ending_punctuations(&self) -> &str {
        &self.ending_punctuations
    }

    pub fn language_id(&self) -> &str {
        self.profile.id()
    }

    pub fn align(&self, input: &AlignmentInput) -> Result<AlignmentOutput, AlignmentError> {
        self.align_observed(input, &CancellationToken::new(), &mut |_| {})
    }

    pub fn align_with_cancellation(
        &self,
        input: &AlignmentInput,
        cancel: &CancellationToken,
    ) -> Result<AlignmentOutput, AlignmentError> {
        self.align_observed(input, cancel, &mut |_| {})
    }

    /// Runs the alignment, reporting every committed match to `on_match` as
    /// soon as it is recorded.
    pub fn align_observed(
        &self,
        input: &AlignmentInput,
        cancel: &CancellationToken,
        on_match: &mut dyn FnMut(&ChunkMatch),
    ) -> Result<AlignmentOutput, AlignmentError> {
        if input.chunks.is_empty() {
            return Err(AlignmentError::degenerate("chunk list is empty"));
        }
        validate_chunk_order(&input.chunks)?;

        let (text, source_spans) = self.working_transcript(input);
        let transcript_combined = source_spans.is_some();
        if text.is_empty() {
            return Err(AlignmentError::degenerate(if transcript_combined {
                "combined transcript is empty"
            } else {
                "reference transcript is empty"
            }));
        }

        let transcript = ReferenceTranscript::new(text, &self.ending_punctuations);
        tracing::info!(
            chunks = input.chunks.len(),
            transcript_chars = transcript.len(),
            transcript_combined,
            language = self.profile.id(),
            cer_threshold = self.config.cer_threshold,
            "aligner: starting run"
        );

        let mut matcher = GreedyMatcher::new(
            &transcript,
            self.metric.as_ref(),
            self.profile.as_ref(),
            &self.config,
        );
        let outcome = matcher.run(&input.chunks, cancel, on_match);

        let accepted = outcome.matches.iter().filter(|m| m.accepted).count();
        tracing::info!(
            processed = outcome.matches.len(),
            accepted,
            cancelled = outcome.cancelled,
            "aligner: run finished"
        );

        Ok(AlignmentOutput {
            matches: outcome.matches,
            transcript: transcript.as_str().to_string(),
            transcript_combined,
            source_spans: source_spans.unwrap_or_default(),
            cancelled: outcome.cancelled,
        })
    }

    /// Cleaned reference, or the combined chunk texts with each chunk's span.
    fn working_transcript(&self, input: &AlignmentInput) -> (String, Option<Vec<Span>>) {
        match &input.reference {
            Some(reference) => (self.profile.clean_reference(reference), None),
            None => {
                let combined = combine_chunks(
                    &input.chunks,
                    self.profile.as_ref(),
                    &self.ending_punctuations,
                );
                (combined.text, Some(combined.spans))
            }
        }
    }
}

/// Chunk indices must be strictly increasing.
pub fn validate_chunk_order(chunks: &[Chunk]) -> Result<(), AlignmentError> {
    for (position, pair) in chunks.windows(2).enumerate() {
        if pair[1].index <= pair[0].index {
            return Err(AlignmentError::MalformedChunkOrder {
                position: position + 1,
                previous: pair[0].index,
                current: pair[1].index,
            });
        }
    }
    Ok(())
}
