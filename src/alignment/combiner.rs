use crate::pipeline::traits::LanguageProfile;
use crate::types::{Chunk, Span};

const FALLBACK_TERMINATOR: char = '.';

/// Working transcript synthesized from chunk texts.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedTranscript {
    pub text: String,
    /// One span per input chunk; empty chunks get an empty span at the join point.
    pub spans: Vec<Span>,
}

/// Joins chunk texts in order, terminating each one so sentence anchors exist
/// between chunks. Ground-truth `text` wins over `predicted_text`.
///
/// Each piece goes through `profile.clean_reference` before it is measured,
/// so `spans` index the returned text exactly.
pub fn combine_chunks(
    chunks: &[Chunk],
    profile: &dyn LanguageProfile,
    ending_punctuations: &str,
) -> CombinedTranscript {
    let terminator = ending_punctuations
        .chars()
        .last()
        .unwrap_or(FALLBACK_TERMINATOR);

    let mut text = String::new();
    let mut offset = 0usize;
    let mut spans = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let source = chunk.text.as_deref().unwrap_or(&chunk.predicted_text);
        let mut piece = profile.clean_reference(source);
        if piece.is_empty() {
            spans.push(Span::empty_at(offset));
            continue;
        }
        if !piece
            .chars()
            .last()
            .is_some_and(|c| ending_punctuations.contains(c))
        {
            piece.push(terminator);
        }

        if !text.is_empty() {
            text.push(' ');
            offset += 1;
        }
        let len = piece.chars().count();
        spans.push(Span::new(offset, offset + len));
        text.push_str(&piece);
        offset += len;
    }

    tracing::debug!(
        chunks = chunks.len(),
        chars = offset,
        language = profile.id(),
        "combiner: synthesized working transcript"
    );
    CombinedTranscript { text, spans }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::defaults::{ArmenianLanguageProfile, DefaultLanguageProfile};

    fn slice(text: &str, span: Span) -> String {
        text.chars().skip(span.begin).take(span.len()).collect()
    }

    #[test]
    fn appends_default_terminator_and_joins_with_spaces() {
        let chunks = vec![
            Chunk::new(0, "once upon a time"),
            Chunk::new(1, "in a faraway land,"),
            Chunk::new(2, "  there   lived a king "),
        ];
        let combined = combine_chunks(&chunks, &DefaultLanguageProfile, ",;:!?.");
        assert_eq!(
            combined.text,
            "once upon a time. in a faraway land, there lived a king."
        );
        assert_eq!(combined.spans[0], Span::new(0, 17));
        assert_eq!(combined.spans[1], Span::new(18, 36));
        assert_eq!(combined.spans[2], Span::new(37, 56));
    }

    #[test]
    fn ground_truth_text_takes_precedence() {
        let mut chunk = Chunk::new(0, "wunce apon");
        chunk.text = Some("Once upon".to_string());
        let combined = combine_chunks(&[chunk], &DefaultLanguageProfile, ".");
        assert_eq!(combined.text, "Once upon.");
    }

    #[test]
    fn empty_chunks_keep_a_span_but_add_no_text() {
        let chunks = vec![
            Chunk::new(0, "first"),
            Chunk::new(1, "   "),
            Chunk::new(2, "second"),
        ];
        let combined = combine_chunks(&chunks, &DefaultLanguageProfile, "։");
        assert_eq!(combined.text, "first։ second։");
        assert!(combined.spans[1].is_empty());
        assert_eq!(combined.spans[2], Span::new(7, 14));
    }

    #[test]
    fn spans_are_character_offsets() {
        let chunks = vec![Chunk::new(0, "Բարեւ"), Chunk::new(1, "ձեզ")];
        let combined = combine_chunks(&chunks, &ArmenianLanguageProfile, "․,։");
        assert_eq!(slice(&combined.text, combined.spans[1]), "ձեզ։");
    }

    #[test]
    fn spans_follow_language_cleanup_that_changes_length() {
        let chunks = vec![
            Chunk::new(0, "նա և ես"),
            Chunk::new(1, "այո:"),
            Chunk::new(2, "լավ"),
        ];
        let combined = combine_chunks(&chunks, &ArmenianLanguageProfile, "․,։");
        assert_eq!(combined.text, "նա եւ ես։ այո։ լավ։");
        assert_eq!(combined.spans[0], Span::new(0, 9));
        let pieces: Vec<String> = combined
            .spans
            .iter()
            .map(|span| slice(&combined.text, *span))
            .collect();
        assert_eq!(pieces, vec!["նա եւ ես։", "այո։", "լավ։"]);
    }
}
