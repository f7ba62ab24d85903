use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AlignmentError;

/// Built-in language profiles selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageId {
    #[default]
    Default,
    Armenian,
}

impl LanguageId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Armenian => "hy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignerConfig {
    /// A candidate is accepted when its CER is at or below this value.
    #[serde(default = "default_cer_threshold")]
    pub cer_threshold: f64,
    /// Window length as a multiple of the chunk's predicted length.
    #[serde(default = "default_initial_window_factor")]
    pub initial_window_factor: f64,
    /// Hard cap on the window length, as a multiple of the predicted length.
    #[serde(default = "default_max_window_expansion_factor")]
    pub max_window_expansion_factor: f64,
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,
    /// Characters the next window is pulled back after a fallback step.
    #[serde(default = "default_overlap_pullback")]
    pub overlap_pullback: usize,
    /// Sentence/clause terminators. `None` uses the language profile's set.
    /// The last character is the terminator the combiner appends.
    #[serde(default)]
    pub ending_punctuations: Option<String>,
    #[serde(default = "default_max_start_anchors")]
    pub max_start_anchors: usize,
    #[serde(default = "default_min_punctuation_anchors")]
    pub min_punctuation_anchors: usize,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_true")]
    pub case_insensitive: bool,
    #[serde(default = "default_true")]
    pub ignore_ellipsis: bool,
    /// CER above which a chunk counts towards the lost-alignment streak.
    #[serde(default = "default_lost_search_cer")]
    pub lost_search_cer: f64,
    #[serde(default = "default_lost_streak")]
    pub lost_streak: usize,
    #[serde(default)]
    pub language: LanguageId,
}

impl AlignerConfig {
    pub const DEFAULT_CER_THRESHOLD: f64 = 0.35;
    pub const DEFAULT_INITIAL_WINDOW_FACTOR: f64 = 2.0;
    pub const DEFAULT_MAX_WINDOW_EXPANSION_FACTOR: f64 = 6.0;
    pub const DEFAULT_RETRY_CEILING: u32 = 3;
    pub const DEFAULT_OVERLAP_PULLBACK: usize = 8;
    pub const DEFAULT_MAX_START_ANCHORS: usize = 6;
    pub const DEFAULT_MIN_PUNCTUATION_ANCHORS: usize = 3;
    pub const DEFAULT_MAX_CANDIDATES: usize = 512;
    pub const DEFAULT_LOST_SEARCH_CER: f64 = 0.5;
    pub const DEFAULT_LOST_STREAK: usize = 15;

    pub fn load(path: &Path) -> Result<Self, AlignmentError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| AlignmentError::io("read aligner config", e))?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| AlignmentError::json("parse aligner config", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AlignmentError> {
        if !(0.0..1.0).contains(&self.cer_threshold) {
            return Err(AlignmentError::invalid_config(format!(
                "cer_threshold must be in [0, 1), got {}",
                self.cer_threshold
            )));
        }
        if !self.initial_window_factor.is_finite() || self.initial_window_factor < 1.0 {
            return Err(AlignmentError::invalid_config(format!(
                "initial_window_factor must be >= 1, got {}",
                self.initial_window_factor
            )));
        }
        if !self.max_window_expansion_factor.is_finite()
            || self.max_window_expansion_factor < self.initial_window_factor
        {
            return Err(AlignmentError::invalid_config(format!(
                "max_window_expansion_factor ({}) must be >= initial_window_factor ({})",
                self.max_window_expansion_factor, self.initial_window_factor
            )));
        }
        if self.max_candidates == 0 {
            return Err(AlignmentError::invalid_config(
                "max_candidates must be at least 1",
            ));
        }
        if let Some(punctuations) = &self.ending_punctuations {
            if punctuations.chars().any(char::is_whitespace) || punctuations.is_empty() {
                return Err(AlignmentError::invalid_config(
                    "ending_punctuations must be a non-empty set of non-whitespace characters",
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.lost_search_cer) {
            return Err(AlignmentError::invalid_config(format!(
                "lost_search_cer must be in [0, 1], got {}",
                self.lost_search_cer
            )));
        }
        Ok(())
    }
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            cer_threshold: Self::DEFAULT_CER_THRESHOLD,
            initial_window_factor: Self::DEFAULT_INITIAL_WINDOW_FACTOR,
            max_window_expansion_factor: Self::DEFAULT_MAX_WINDOW_EXPANSION_FACTOR,
            retry_ceiling: Self::DEFAULT_RETRY_CEILING,
            overlap_pullback: Self::DEFAULT_OVERLAP_PULLBACK,
            ending_punctuations: None,
            max_start_anchors: Self::DEFAULT_MAX_START_ANCHORS,
            min_punctuation_anchors: Self::DEFAULT_MIN_PUNCTUATION_ANCHORS,
            max_candidates: Self::DEFAULT_MAX_CANDIDATES,
            case_insensitive: true,
            ignore_ellipsis: true,
            lost_search_cer: Self::DEFAULT_LOST_SEARCH_CER,
            lost_streak: Self::DEFAULT_LOST_STREAK,
            language: LanguageId::Default,
        }
    }
}

fn default_cer_threshold() -> f64 {
    AlignerConfig::DEFAULT_CER_THRESHOLD
}
fn default_initial_window_factor() -> f64 {
    AlignerConfig::DEFAULT_INITIAL_WINDOW_FACTOR
}
fn default_max_window_expansion_factor() -> f64 {
    AlignerConfig::DEFAULT_MAX_WINDOW_EXPANSION_FACTOR
}
fn default_retry_ceiling() -> u32 {
    AlignerConfig::DEFAULT_RETRY_CEILING
}
fn default_overlap_pullback() -> usize {
    AlignerConfig::DEFAULT_OVERLAP_PULLBACK
}
fn default_max_start_anchors() -> usize {
    AlignerConfig::DEFAULT_MAX_START_ANCHORS
}
fn default_min_punctuation_anchors() -> usize {
    AlignerConfig::DEFAULT_MIN_PUNCTUATION_ANCHORS
}
fn default_max_candidates() -> usize {
    AlignerConfig::DEFAULT_MAX_CANDIDATES
}
fn default_true() -> bool {
    true
}
fn default_lost_search_cer() -> f64 {
    AlignerConfig::DEFAULT_LOST_SEARCH_CER
}
fn default_lost_streak() -> usize {
    AlignerConfig::DEFAULT_LOST_STREAK
}
