use crate::alignment::cer::cer_chars;
use crate::alignment::normalize::{clean_prediction_text, clean_reference_text};
use crate::alignment::transcript::ReferenceTranscript;
use crate::config::LanguageId;
use crate::pipeline::traits::{ErrorRateMetric, LanguageProfile};
use crate::types::Span;

pub struct CharacterErrorRate;

impl ErrorRateMetric for CharacterErrorRate {
    fn error_rate(&self, reference: &[char], hypothesis: &[char]) -> f64 {
        cer_chars(reference, hypothesis)
    }
}

pub struct DefaultLanguageProfile;

impl LanguageProfile for DefaultLanguageProfile {
    fn id(&self) -> &str {
        LanguageId::Default.as_str()
    }

    fn ending_punctuations(&self) -> &str {
        ",;:!?."
    }

    fn clean_prediction(&self, text: &str) -> String {
        clean_prediction_text(text)
    }

    fn clean_reference(&self, text: &str) -> String {
        clean_reference_text(text)
    }
}

/// Armenian: `։` (verjaket) ends sentences, and the digraph `ու` must not be
/// split at a span boundary.
pub struct ArmenianLanguageProfile;

const ARMENIAN_VERJAKET: char = '։';

impl LanguageProfile for ArmenianLanguageProfile {
    fn id(&self) -> &str {
        LanguageId::Armenian.as_str()
    }

    fn ending_punctuations(&self) -> &str {
        "․,։"
    }

    fn clean_prediction(&self, text: &str) -> String {
        clean_prediction_text(&text.replace("Ե ՛վ", "Եվ"))
    }

    fn clean_reference(&self, text: &str) -> String {
        let text = clean_reference_text(text).replace(':', &ARMENIAN_VERJAKET.to_string());
        text.replace(" և ", " եւ ")
    }

    fn adjust_span(&self, transcript: &ReferenceTranscript, span: Span, floor: usize) -> Span {
        if span.begin > floor
            && transcript.char_at(span.begin) == Some('ւ')
            && transcript.char_at(span.begin - 1) == Some('ո')
        {
            return Span::new(span.begin - 1, span.end);
        }
        span
    }
}

pub fn profile_for(language: LanguageId) -> Box<dyn LanguageProfile> {
    match language {
        LanguageId::Default => Box::new(DefaultLanguageProfile),
        LanguageId::Armenian => Box::new(ArmenianLanguageProfile),
    }
}
