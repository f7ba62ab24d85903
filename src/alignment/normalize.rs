use crate::config::AlignerConfig;

const ELLIPSIS: [char; 3] = ['.', '.', '.'];

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Predicted-text cleanup: dash artifacts become spaces, whitespace collapses.
pub fn clean_prediction_text(text: &str) -> String {
    let text = text
        .replace(" - ", " ")
        .replace(" -", " ")
        .replace("- ", " ");
    collapse_whitespace(&text)
}

/// Reference-text cleanup: line breaks and em-dash separators become spaces.
pub fn clean_reference_text(text: &str) -> String {
    let text = text
        .replace('\n', " ")
        .replace(" — ", " ")
        .replace("— ", " ")
        .replace(" —", " ");
    collapse_whitespace(&text)
}

/// Normalization applied to both sides right before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    pub case_insensitive: bool,
    /// Drop `...` from the reference side when the prediction has none.
    pub ignore_ellipsis: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            case_insensitive: true,
            ignore_ellipsis: true,
        }
    }
}

impl CompareOptions {
    pub fn from_config(config: &AlignerConfig) -> Self {
        Self {
            case_insensitive: config.case_insensitive,
            ignore_ellipsis: config.ignore_ellipsis,
        }
    }

    pub fn prepare_hypothesis(&self, text: &str) -> PreparedHypothesis {
        let chars = self.fold(text.chars());
        let has_ellipsis = contains_ellipsis(&chars);
        PreparedHypothesis {
            chars,
            has_ellipsis,
        }
    }

    pub fn prepare_reference(&self, span_chars: &[char], hypothesis: &PreparedHypothesis) -> Vec<char> {
        let folded = self.fold(span_chars.iter().copied());
        if self.ignore_ellipsis && !hypothesis.has_ellipsis {
            strip_ellipsis(&folded)
        } else {
            folded
        }
    }

    fn fold(&self, chars: impl Iterator<Item = char>) -> Vec<char> {
        if self.case_insensitive {
            chars.flat_map(char::to_lowercase).collect()
        } else {
            chars.collect()
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreparedHypothesis {
    pub chars: Vec<char>,
    has_ellipsis: bool,
}

fn contains_ellipsis(chars: &[char]) -> bool {
    chars.windows(ELLIPSIS.len()).any(|w| w == ELLIPSIS)
}

fn strip_ellipsis(chars: &[char]) -> Vec<char> {
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i..].starts_with(&ELLIPSIS) {
            i += ELLIPSIS.len();
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}
