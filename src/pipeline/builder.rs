use crate::config::AlignerConfig;
use crate::error::AlignmentError;
use crate::pipeline::defaults::{profile_for, CharacterErrorRate};
use crate::pipeline::runtime::{ChunkAligner, ChunkAlignerParts};
use crate::pipeline::traits::{ErrorRateMetric, LanguageProfile};

pub struct AlignerBuilder {
    config: AlignerConfig,
    metric: Option<Box<dyn ErrorRateMetric>>,
    language_profile: Option<Box<dyn LanguageProfile>>,
}

impl AlignerBuilder {
    pub fn new(config: AlignerConfig) -> Self {
        Self {
            config,
            metric: None,
            language_profile: None,
        }
    }

    pub fn with_metric(mut self, metric: Box<dyn ErrorRateMetric>) -> Self {
        self.metric = Some(metric);
        self
    }

    /// Overrides the profile selected by `config.language`.
    pub fn with_language_profile(mut self, profile: Box<dyn LanguageProfile>) -> Self {
        self.language_profile = Some(profile);
        self
    }

    pub fn build(self) -> Result<ChunkAligner, AlignmentError> {
        self.config.validate()?;

        let profile = self
            .language_profile
            .unwrap_or_else(|| profile_for(self.config.language));
        let ending_punctuations = self
            .config
            .ending_punctuations
            .clone()
            .unwrap_or_else(|| profile.ending_punctuations().to_string());
        if ending_punctuations.is_empty() {
            return Err(AlignmentError::invalid_config(format!(
                "language profile '{}' has no ending punctuations",
                profile.id()
            )));
        }

        Ok(ChunkAligner::from_parts(ChunkAlignerParts {
            config: self.config,
            ending_punctuations,
            metric: self.metric.unwrap_or_else(|| Box::new(CharacterErrorRate)),
            profile,
        }))
    }
}
